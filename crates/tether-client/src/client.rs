use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_core::Credentials;
use tokio::sync::mpsc;

use crate::envelope::MessageKey;
use crate::error::ClientError;
use crate::event::ClientEvent;

/// Outbound message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundPayload {
    Text {
        text: String,
        /// Message shown as quoted above the reply.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quoted: Option<MessageKey>,
    },
    Reaction {
        emoji: String,
        key: MessageKey,
    },
}

impl OutboundPayload {
    pub fn text(text: impl Into<String>) -> Self {
        OutboundPayload::Text {
            text: text.into(),
            quoted: None,
        }
    }

    pub fn reply(text: impl Into<String>, quoted: &MessageKey) -> Self {
        OutboundPayload::Text {
            text: text.into(),
            quoted: Some(quoted.clone()),
        }
    }

    pub fn reaction(emoji: impl Into<String>, key: &MessageKey) -> Self {
        OutboundPayload::Reaction {
            emoji: emoji.into(),
            key: key.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub participants: Vec<GroupParticipant>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupParticipant {
    pub id: String,
    /// `"admin"` / `"superadmin"` when elevated.
    #[serde(default)]
    pub admin: Option<String>,
}

/// Outbound half of a live connection.
///
/// Methods take `&self` so one handle can be shared by every in-flight
/// handler task.
#[async_trait]
pub trait ClientHandle: Send + Sync {
    async fn send_message(&self, chat_id: &str, payload: OutboundPayload)
        -> Result<(), ClientError>;

    /// Mark messages as read (blue ticks / status seen).
    async fn read_messages(&self, keys: &[MessageKey]) -> Result<(), ClientError>;

    async fn fetch_group_metadata(&self, chat_id: &str) -> Result<GroupMetadata, ClientError>;

    /// Tear down the transport. Idempotent.
    async fn close(&self);
}

/// Result of a successful connect: the outbound handle plus the single
/// inbound event stream.
pub struct Connection {
    pub handle: Arc<dyn ClientHandle>,
    pub events: mpsc::Receiver<ClientEvent>,
}

/// Factory for connections to the messaging network.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Stable lowercase identifier used in logs (e.g. `"bridge"`).
    fn name(&self) -> &str;

    /// Start a connection authenticated with `creds`.
    ///
    /// Returning `Ok` means the transport is up; the session is only usable
    /// after `ConnectionUpdate::Open` arrives on the event stream.
    async fn connect(&self, creds: &Credentials) -> Result<Connection, ClientError>;
}

/// Slot holding the handle of the currently live connection.
///
/// Cloned into every reply capability so sends made after a reconnect go
/// through the new connection.
#[derive(Clone, Default)]
pub struct SharedHandle {
    slot: Arc<std::sync::RwLock<Option<Arc<dyn ClientHandle>>>>,
}

impl SharedHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle of the live connection, or `NotConnected`.
    pub fn current(&self) -> Result<Arc<dyn ClientHandle>, ClientError> {
        let guard = self.slot.read().unwrap_or_else(|e| e.into_inner());
        guard.clone().ok_or(ClientError::NotConnected)
    }

    pub fn set(&self, handle: Arc<dyn ClientHandle>) {
        let mut guard = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(handle);
    }

    /// Empty the slot, returning what was there.
    pub fn take(&self) -> Option<Arc<dyn ClientHandle>> {
        let mut guard = self.slot.write().unwrap_or_else(|e| e.into_inner());
        guard.take()
    }

    pub fn is_connected(&self) -> bool {
        self.slot
            .read()
            .map(|g| g.is_some())
            .unwrap_or_else(|e| e.into_inner().is_some())
    }
}
