use thiserror::Error;

use crate::state::ConnectionState;

#[derive(Debug, Error)]
pub enum ConnectionError {
    /// `start` was called on a manager that already left `Idle`.
    #[error("connection manager already started (state: {state})")]
    AlreadyStarted { state: ConnectionState },

    /// The session ended; the manager cannot be restarted.
    #[error("connection session has ended")]
    Ended,
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
