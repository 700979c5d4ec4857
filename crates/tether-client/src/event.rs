use tether_core::Credentials;

use crate::close::CloseReason;
use crate::envelope::RawMessage;

/// Connection lifecycle notification from the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionUpdate {
    /// Handshake in progress; informational only.
    Connecting,
    /// Authenticated and ready to send/receive.
    Open,
    Closed(CloseReason),
}

/// Everything a live connection reports, in arrival order.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    ConnectionUpdate(ConnectionUpdate),
    /// Rotated key material; must be persisted before the next restart.
    CredentialsUpdate(Credentials),
    MessagesUpsert(Vec<RawMessage>),
}
