use thiserror::Error;

/// Errors raised while loading, fetching or persisting session credentials.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No local session and no remote reference to bootstrap from.
    #[error("Fatal configuration error: {0}")]
    FatalConfig(String),

    /// The credential blob is malformed or lacks required keys.
    #[error("Credential integrity error: {0}")]
    Integrity(String),

    /// The remote credential download failed at the transport level.
    #[error("Network error: {0}")]
    Network(String),

    /// The remote credential download did not finish in time.
    #[error("Download timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
