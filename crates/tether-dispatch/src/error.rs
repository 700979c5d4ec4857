use tether_client::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// An outbound call into the messaging client failed or timed out.
    #[error("Send failed: {0}")]
    Send(#[from] ClientError),

    /// Conversation state did not match the shape the handler asked for.
    #[error("Conversation state error: {0}")]
    State(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
