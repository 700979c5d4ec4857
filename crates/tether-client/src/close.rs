use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a connection closed. Closed set; every disconnect maps to one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The device was unlinked; the stored credentials are dead.
    LoggedOut,
    /// The account is banned or otherwise refused.
    Forbidden,
    /// Transport dropped or timed out.
    NetworkLost,
    /// The server asks for a fresh connection (usually right after pairing).
    RestartRequired,
    Unknown,
}

/// Whether a close ends the session or schedules a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDisposition {
    Terminal,
    Retryable,
}

impl CloseReason {
    pub fn disposition(&self) -> CloseDisposition {
        match self {
            CloseReason::LoggedOut | CloseReason::Forbidden => CloseDisposition::Terminal,
            CloseReason::NetworkLost | CloseReason::RestartRequired | CloseReason::Unknown => {
                CloseDisposition::Retryable
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.disposition() == CloseDisposition::Terminal
    }

    /// Reconnect without waiting for the backoff timer.
    pub fn reconnects_immediately(&self) -> bool {
        matches!(self, CloseReason::RestartRequired)
    }

    /// Map a network disconnect status code onto the taxonomy.
    ///
    /// | Code | Reason |
    /// |------|--------|
    /// | 401 | `LoggedOut` |
    /// | 403 | `Forbidden` |
    /// | 515 | `RestartRequired` |
    /// | 408, 428, 500, 503 | `NetworkLost` |
    /// | anything else | `Unknown` |
    pub fn from_status_code(code: u16) -> Self {
        match code {
            401 => CloseReason::LoggedOut,
            403 => CloseReason::Forbidden,
            515 => CloseReason::RestartRequired,
            408 | 428 | 500 | 503 => CloseReason::NetworkLost,
            _ => CloseReason::Unknown,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::LoggedOut => write!(f, "logged out"),
            CloseReason::Forbidden => write!(f, "forbidden"),
            CloseReason::NetworkLost => write!(f, "network lost"),
            CloseReason::RestartRequired => write!(f, "restart required"),
            CloseReason::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logout_and_forbidden_are_terminal() {
        assert!(CloseReason::LoggedOut.is_terminal());
        assert!(CloseReason::Forbidden.is_terminal());
    }

    #[test]
    fn everything_else_retries() {
        for reason in [
            CloseReason::NetworkLost,
            CloseReason::RestartRequired,
            CloseReason::Unknown,
        ] {
            assert_eq!(reason.disposition(), CloseDisposition::Retryable);
        }
    }

    #[test]
    fn only_restart_required_skips_backoff() {
        assert!(CloseReason::RestartRequired.reconnects_immediately());
        assert!(!CloseReason::NetworkLost.reconnects_immediately());
        assert!(!CloseReason::Unknown.reconnects_immediately());
    }

    #[test]
    fn status_codes_map_to_reasons() {
        assert_eq!(CloseReason::from_status_code(401), CloseReason::LoggedOut);
        assert_eq!(CloseReason::from_status_code(403), CloseReason::Forbidden);
        assert_eq!(CloseReason::from_status_code(515), CloseReason::RestartRequired);
        assert_eq!(CloseReason::from_status_code(428), CloseReason::NetworkLost);
        assert_eq!(CloseReason::from_status_code(440), CloseReason::Unknown);
    }
}
