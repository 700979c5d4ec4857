use std::sync::Arc;

use chrono::{DateTime, Utc};
use tether_client::{MessageKey, RawMessage};
use tether_core::types::{is_status_broadcast, jid_user, ChatKind};

use crate::normalize::extract_text;

/// A normalized inbound message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    pub chat_id: String,
    /// Author JID: the participant in groups and broadcasts, the chat otherwise.
    pub sender_id: String,
    pub is_group: bool,
    pub from_me: bool,
    pub push_name: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Canonical text body; empty for media without caption.
    pub body: String,
    pub raw: Arc<RawMessage>,
}

impl InboundMessage {
    /// Normalize a raw envelope. `None` when it carries no content at all
    /// (receipts, protocol stubs).
    pub fn from_raw(raw: RawMessage) -> Option<Self> {
        let body = extract_text(raw.message.as_ref()?);
        let key = &raw.key;
        Some(Self {
            id: key.id.clone(),
            chat_id: key.remote_jid.clone(),
            sender_id: key.sender().to_string(),
            is_group: ChatKind::of(&key.remote_jid).is_group(),
            from_me: key.from_me,
            push_name: raw.push_name.clone(),
            timestamp: raw
                .message_timestamp
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
            body,
            raw: Arc::new(raw),
        })
    }

    pub fn key(&self) -> &MessageKey {
        &self.raw.key
    }

    pub fn is_status(&self) -> bool {
        is_status_broadcast(&self.chat_id)
    }

    /// Sender phone number: JID user part without device suffix.
    pub fn sender_number(&self) -> &str {
        jid_user(&self.sender_id)
    }
}
