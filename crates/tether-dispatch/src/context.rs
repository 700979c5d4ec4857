use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tether_client::{ClientError, GroupMetadata, MessageKey, OutboundPayload, SharedHandle};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::command::CommandRegistry;
use crate::conversation::ConversationStore;
use crate::message::InboundMessage;

/// Process-wide state handlers may read. Frozen once routing starts.
pub struct SharedState {
    pub prefix: String,
    pub alive_message: Option<String>,
    pub registry: CommandRegistry,
    pub conversations: Arc<ConversationStore>,
    pub started_at: Instant,
}

/// Outbound capability bound to one inbound message.
///
/// Every call goes through the live connection at the time of the call and
/// is bounded by the configured send timeout.
#[derive(Clone)]
pub struct Replier {
    handle: SharedHandle,
    chat_id: String,
    key: MessageKey,
    timeout: Duration,
}

impl Replier {
    pub fn new(handle: SharedHandle, chat_id: String, key: MessageKey, timeout: Duration) -> Self {
        Self {
            handle,
            chat_id,
            key,
            timeout,
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Send an arbitrary payload to the originating chat.
    pub async fn send(&self, payload: OutboundPayload) -> Result<(), ClientError> {
        self.send_to(&self.chat_id, payload).await
    }

    /// Send to another chat (owner notices, forwarding).
    pub async fn send_to(&self, chat_id: &str, payload: OutboundPayload) -> Result<(), ClientError> {
        let handle = self.handle.current()?;
        self.bounded(handle.send_message(chat_id, payload)).await
    }

    /// Text reply quoting the inbound message.
    pub async fn reply(&self, text: impl Into<String>) -> Result<(), ClientError> {
        self.send(OutboundPayload::reply(text, &self.key)).await
    }

    /// React to the inbound message.
    pub async fn react(&self, emoji: &str) -> Result<(), ClientError> {
        self.send(OutboundPayload::reaction(emoji, &self.key)).await
    }

    /// Mark the inbound message as read.
    pub async fn mark_read(&self) -> Result<(), ClientError> {
        let handle = self.handle.current()?;
        let keys = [self.key.clone()];
        self.bounded(handle.read_messages(&keys)).await
    }

    async fn group_metadata(&self) -> Result<GroupMetadata, ClientError> {
        let handle = self.handle.current()?;
        self.bounded(handle.fetch_group_metadata(&self.chat_id)).await
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(ClientError::Timeout {
                ms: self.timeout.as_millis() as u64,
            }))
    }
}

/// Everything a handler gets to see about one inbound message.
#[derive(Clone)]
pub struct DispatchContext {
    pub message: Arc<InboundMessage>,
    /// Lowercased command token; empty when the body is not a command.
    pub command: String,
    pub args: Vec<String>,
    /// Text after the command token, trimmed.
    pub query: String,
    pub is_owner: bool,
    pub is_group: bool,
    pub replier: Replier,
    state: Arc<SharedState>,
    group: Arc<OnceCell<GroupMetadata>>,
}

impl DispatchContext {
    pub fn new(
        message: Arc<InboundMessage>,
        command: String,
        args: Vec<String>,
        query: String,
        is_owner: bool,
        replier: Replier,
        state: Arc<SharedState>,
    ) -> Self {
        let is_group = message.is_group;
        Self {
            message,
            command,
            args,
            query,
            is_owner,
            is_group,
            replier,
            state,
            group: Arc::new(OnceCell::new()),
        }
    }

    pub fn body(&self) -> &str {
        &self.message.body
    }

    pub fn sender(&self) -> &str {
        &self.message.sender_id
    }

    pub fn chat_id(&self) -> &str {
        &self.message.chat_id
    }

    pub fn prefix(&self) -> &str {
        &self.state.prefix
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.state.conversations
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.state.registry
    }

    pub fn alive_message(&self) -> Option<&str> {
        self.state.alive_message.as_deref()
    }

    pub fn uptime(&self) -> Duration {
        self.state.started_at.elapsed()
    }

    pub async fn reply(&self, text: impl Into<String>) -> Result<(), ClientError> {
        self.replier.reply(text).await
    }

    pub async fn react(&self, emoji: &str) -> Result<(), ClientError> {
        self.replier.react(emoji).await
    }

    pub async fn send(&self, payload: OutboundPayload) -> Result<(), ClientError> {
        self.replier.send(payload).await
    }

    /// Group metadata, fetched on first use and cached for this message.
    ///
    /// `None` in direct chats.
    pub async fn group_metadata(&self) -> Result<Option<&GroupMetadata>, ClientError> {
        if !self.is_group {
            return Ok(None);
        }
        let meta = self
            .group
            .get_or_try_init(|| async {
                debug!(chat = %self.message.chat_id, "fetching group metadata");
                self.replier.group_metadata().await
            })
            .await?;
        Ok(Some(meta))
    }
}
