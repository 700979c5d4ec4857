//! Canonical text body extraction.
//!
//! Wrappers (ephemeral, view-once, document-with-caption) are peeled off
//! first, then the body is taken from the first populated text-bearing
//! variant in a fixed precedence order.

use tether_client::MessageContent;

/// Wrapper levels peeled before giving up. Real traffic nests at most two.
pub const MAX_WRAPPER_DEPTH: usize = 4;

/// Strip wrapper envelopes down to the innermost content.
pub fn unwrap_content(content: &MessageContent) -> &MessageContent {
    let mut current = content;
    for _ in 0..MAX_WRAPPER_DEPTH {
        let inner = [
            &current.ephemeral_message,
            &current.view_once_message,
            &current.view_once_message_v2,
            &current.document_with_caption_message,
        ]
        .into_iter()
        .flatten()
        .find_map(|w| w.message.as_ref());

        match inner {
            Some(next) => current = next,
            None => break,
        }
    }
    current
}

/// Text body of `content`, or an empty string for variants without text.
///
/// Precedence: conversation, extended text, image caption, video caption,
/// document caption, button reply id, list reply row id, template button id.
pub fn extract_text(content: &MessageContent) -> String {
    let c = unwrap_content(content);

    let candidates = [
        c.conversation.as_deref(),
        c.extended_text_message
            .as_ref()
            .and_then(|m| m.text.as_deref()),
        c.image_message.as_ref().and_then(|m| m.caption.as_deref()),
        c.video_message.as_ref().and_then(|m| m.caption.as_deref()),
        c.document_message
            .as_ref()
            .and_then(|m| m.caption.as_deref()),
        c.buttons_response_message
            .as_ref()
            .and_then(|m| m.selected_button_id.as_deref()),
        c.list_response_message
            .as_ref()
            .and_then(|m| m.single_select_reply.as_ref())
            .and_then(|r| r.selected_row_id.as_deref()),
        c.template_button_reply_message
            .as_ref()
            .and_then(|m| m.selected_id.as_deref()),
    ];

    candidates
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}
