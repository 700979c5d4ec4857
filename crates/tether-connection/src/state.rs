use std::fmt;

use serde::Serialize;

/// Lifecycle state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    ClosingRetryable,
    ClosingTerminal,
}

impl ConnectionState {
    /// Legal edges of the lifecycle graph.
    ///
    /// ```text
    /// Idle -> Connecting -> Open
    /// Connecting | Open -> ClosingRetryable -> Connecting
    /// Connecting | Open -> ClosingTerminal
    /// ```
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Open)
                | (Connecting, ClosingRetryable)
                | (Connecting, ClosingTerminal)
                | (Open, ClosingRetryable)
                | (Open, ClosingTerminal)
                | (ClosingRetryable, Connecting)
        )
    }

    /// `ClosingTerminal` has no outgoing edges.
    pub fn is_terminal(self) -> bool {
        self == ConnectionState::ClosingTerminal
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::ClosingRetryable => "closing_retryable",
            ConnectionState::ClosingTerminal => "closing_terminal",
        };
        f.write_str(s)
    }
}
