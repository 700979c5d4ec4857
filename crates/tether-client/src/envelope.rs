//! Inbound message envelope as delivered by the network.
//!
//! Field names follow the network's JSON rendering (camelCase). Only the
//! variants the router understands are modelled; unknown fields are ignored
//! during deserialization.

use serde::{Deserialize, Serialize};

/// Addressing of a single message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    /// Chat the message belongs to (user, group or broadcast JID).
    pub remote_jid: String,
    #[serde(default)]
    pub from_me: bool,
    pub id: String,
    /// Author inside a group or broadcast; absent in direct chats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
}

impl MessageKey {
    /// JID of the author: participant when present, chat otherwise.
    pub fn sender(&self) -> &str {
        self.participant
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.remote_jid)
    }
}

/// One entry of a `messages.upsert` batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub key: MessageKey,
    #[serde(default)]
    pub message: Option<MessageContent>,
    #[serde(default)]
    pub push_name: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub message_timestamp: Option<i64>,
}

/// Content union. At most one variant is normally populated; wrappers nest a
/// further `MessageContent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageContent {
    pub conversation: Option<String>,
    pub extended_text_message: Option<TextMessage>,
    pub image_message: Option<MediaMessage>,
    pub video_message: Option<MediaMessage>,
    pub document_message: Option<MediaMessage>,
    pub buttons_response_message: Option<ButtonsResponse>,
    pub list_response_message: Option<ListResponse>,
    pub template_button_reply_message: Option<TemplateButtonReply>,
    pub ephemeral_message: Option<Box<WrappedMessage>>,
    pub view_once_message: Option<Box<WrappedMessage>>,
    pub view_once_message_v2: Option<Box<WrappedMessage>>,
    pub document_with_caption_message: Option<Box<WrappedMessage>>,
}

impl MessageContent {
    /// Plain text shortcut used by tests and simple clients.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            conversation: Some(body.into()),
            ..Default::default()
        }
    }

    /// Name of the first populated variant, for logging.
    pub fn kind(&self) -> &'static str {
        if self.ephemeral_message.is_some() {
            "ephemeralMessage"
        } else if self.view_once_message.is_some() || self.view_once_message_v2.is_some() {
            "viewOnceMessage"
        } else if self.document_with_caption_message.is_some() {
            "documentWithCaptionMessage"
        } else if self.conversation.is_some() {
            "conversation"
        } else if self.extended_text_message.is_some() {
            "extendedTextMessage"
        } else if self.image_message.is_some() {
            "imageMessage"
        } else if self.video_message.is_some() {
            "videoMessage"
        } else if self.document_message.is_some() {
            "documentMessage"
        } else if self.buttons_response_message.is_some() {
            "buttonsResponseMessage"
        } else if self.list_response_message.is_some() {
            "listResponseMessage"
        } else if self.template_button_reply_message.is_some() {
            "templateButtonReplyMessage"
        } else {
            "unknown"
        }
    }
}

/// Wrapper envelope (ephemeral, view-once, document-with-caption).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrappedMessage {
    pub message: Option<MessageContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextMessage {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaMessage {
    pub caption: Option<String>,
    pub mimetype: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ButtonsResponse {
    pub selected_button_id: Option<String>,
    pub selected_display_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListResponse {
    pub title: Option<String>,
    pub single_select_reply: Option<SingleSelectReply>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SingleSelectReply {
    pub selected_row_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateButtonReply {
    pub selected_id: Option<String>,
    pub selected_display_text: Option<String>,
}
