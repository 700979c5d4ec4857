//! Status (story) posts: optional auto-view and auto-react. Nothing else
//! ever sees these messages.

use rand::seq::SliceRandom;
use tether_core::config::StatusConfig;
use tracing::{debug, warn};

use crate::context::Replier;
use crate::message::InboundMessage;

#[derive(Debug, Clone, Default)]
pub struct StatusResponder {
    auto_seen: bool,
    auto_react: bool,
    emojis: Vec<String>,
}

/// What the responder did with one status post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusActions {
    pub seen: bool,
    pub reacted: Option<String>,
}

impl StatusResponder {
    pub fn from_config(config: &StatusConfig) -> Self {
        Self {
            auto_seen: config.auto_seen,
            auto_react: config.auto_react,
            emojis: config
                .react_emojis
                .iter()
                .filter(|e| !e.trim().is_empty())
                .cloned()
                .collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.auto_seen || (self.auto_react && !self.emojis.is_empty())
    }

    /// Uniformly random emoji from the configured set.
    pub fn pick_emoji(&self) -> Option<&str> {
        self.emojis
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }

    pub async fn handle(&self, msg: &InboundMessage, replier: &Replier) -> StatusActions {
        let mut actions = StatusActions::default();
        if msg.from_me {
            debug!("own status post ignored");
            return actions;
        }

        if self.auto_seen {
            match replier.mark_read().await {
                Ok(()) => actions.seen = true,
                Err(e) => warn!(sender = %msg.sender_id, error = %e, "status mark-read failed"),
            }
        }

        if self.auto_react {
            if let Some(emoji) = self.pick_emoji() {
                match replier.react(emoji).await {
                    Ok(()) => actions.reacted = Some(emoji.to_string()),
                    Err(e) => warn!(sender = %msg.sender_id, error = %e, "status reaction failed"),
                }
            }
        }

        debug!(sender = %msg.sender_id, ?actions, "status post handled");
        actions
    }
}
