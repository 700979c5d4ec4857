use thiserror::Error;

use crate::close::CloseReason;

/// Errors that can occur inside a messaging client implementation.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The underlying transport could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The remote side closed the session with a classified reason.
    #[error("Connection closed: {0}")]
    Closed(CloseReason),

    /// A message could not be delivered to the remote endpoint.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// An operation exceeded its allowed time budget.
    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The peer sent something that does not follow the wire format.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No live connection to send through.
    #[error("Not connected")]
    NotConnected,
}

impl ClientError {
    /// Close reason a failed connect attempt maps to.
    ///
    /// Anything not explicitly classified is retryable.
    pub fn close_reason(&self) -> CloseReason {
        match self {
            ClientError::Closed(reason) => *reason,
            ClientError::ConnectionFailed(_) | ClientError::Timeout { .. } => {
                CloseReason::NetworkLost
            }
            _ => CloseReason::Unknown,
        }
    }
}
