//! Fakes shared by the unit tests of this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tether_client::{
    ClientError, ClientHandle, GroupMetadata, MessageContent, MessageKey, OutboundPayload,
    RawMessage, SharedHandle,
};

use crate::command::CommandRegistry;
use crate::context::{DispatchContext, Replier, SharedState};
use crate::conversation::ConversationStore;
use crate::message::InboundMessage;
use crate::router::parse_command;

pub const SENDER: &str = "94770000001@s.whatsapp.net";

/// Records every outbound call.
#[derive(Default)]
pub struct FakeHandle {
    pub(crate) sent: Mutex<Vec<(String, OutboundPayload)>>,
    pub(crate) reads: Mutex<Vec<MessageKey>>,
    pub group: Option<GroupMetadata>,
    pub group_fetches: AtomicUsize,
    pub fail_sends: bool,
    /// Stall sends and reads for this long before completing.
    pub delay: Option<Duration>,
}

impl FakeHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn shared(self: &Arc<Self>) -> SharedHandle {
        let shared = SharedHandle::new();
        shared.set(self.clone());
        shared
    }

    pub fn sent(&self) -> Vec<(String, OutboundPayload)> {
        self.sent.lock().unwrap().clone()
    }

    /// Text bodies of sent messages, in order.
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|(_, p)| match p {
                OutboundPayload::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn reads(&self) -> Vec<MessageKey> {
        self.reads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientHandle for FakeHandle {
    async fn send_message(&self, chat_id: &str, payload: OutboundPayload) -> Result<(), ClientError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sends {
            return Err(ClientError::SendFailed("offline".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), payload));
        Ok(())
    }

    async fn read_messages(&self, keys: &[MessageKey]) -> Result<(), ClientError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reads.lock().unwrap().extend_from_slice(keys);
        Ok(())
    }

    async fn fetch_group_metadata(&self, _chat_id: &str) -> Result<GroupMetadata, ClientError> {
        self.group_fetches.fetch_add(1, Ordering::SeqCst);
        self.group.clone().ok_or(ClientError::NotConnected)
    }

    async fn close(&self) {}
}

pub fn raw_message(chat: &str, participant: Option<&str>, body: &str) -> RawMessage {
    RawMessage {
        key: MessageKey {
            remote_jid: chat.to_string(),
            from_me: false,
            id: "MSG1".to_string(),
            participant: participant.map(str::to_string),
        },
        message: Some(MessageContent::text(body)),
        push_name: None,
        message_timestamp: None,
    }
}

pub fn state(registry: CommandRegistry) -> Arc<SharedState> {
    Arc::new(SharedState {
        prefix: ".".to_string(),
        alive_message: None,
        registry,
        conversations: Arc::new(ConversationStore::new()),
        started_at: Instant::now(),
    })
}

/// Context for a direct-chat message from [`SENDER`].
pub fn context(handle: &Arc<FakeHandle>, body: &str, is_owner: bool) -> DispatchContext {
    context_with(handle, body, is_owner, state(CommandRegistry::new()))
}

pub fn context_with(
    handle: &Arc<FakeHandle>,
    body: &str,
    is_owner: bool,
    state: Arc<SharedState>,
) -> DispatchContext {
    context_in(handle, SENDER, None, body, is_owner, state)
}

pub fn context_in(
    handle: &Arc<FakeHandle>,
    chat: &str,
    participant: Option<&str>,
    body: &str,
    is_owner: bool,
    state: Arc<SharedState>,
) -> DispatchContext {
    let message = InboundMessage::from_raw(raw_message(chat, participant, body))
        .expect("text message normalizes");
    let parsed = parse_command(&state.prefix, body).unwrap_or_default();
    let replier = Replier::new(
        handle.shared(),
        message.chat_id.clone(),
        message.key().clone(),
        Duration::from_secs(1),
    );
    DispatchContext::new(
        Arc::new(message),
        parsed.token,
        parsed.args,
        parsed.query,
        is_owner,
        replier,
        state,
    )
}
