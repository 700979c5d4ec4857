use tether_connection::{ConnectionError, SessionEnd};
use tether_session::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway was assembled without a required part.
    #[error("Gateway configuration error: {0}")]
    Config(String),

    /// Session bootstrap failed; no connection was attempted.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The connection session ended for good.
    #[error("Session terminated: {0:?}")]
    Terminal(SessionEnd),

    #[error("Gateway not started")]
    NotStarted,
}

pub type Result<T> = std::result::Result<T, GatewayError>;
