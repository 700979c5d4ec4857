//! `tether-dispatch`: inbound message routing and command dispatch.
//!
//! Raw envelopes are normalized into an [`InboundMessage`], classified as a
//! status post or an ordinary chat message, and handed to the
//! [`CommandRegistry`] and [`ReplyHandlerChain`]. Every dispatch runs on its
//! own task; handler errors and panics stop at the dispatch boundary.

pub mod builtin;
pub mod command;
pub mod context;
pub mod conversation;
pub mod error;
pub mod message;
pub mod normalize;
pub mod reply;
pub mod router;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use command::{handler_fn, Command, CommandRegistry, DispatchOutcome, Handler};
pub use context::{DispatchContext, Replier, SharedState};
pub use conversation::ConversationStore;
pub use error::{DispatchError, Result};
pub use message::InboundMessage;
pub use reply::{ReplyHandlerChain, ReplyOutcome};
pub use router::{MessageRouter, ParsedCommand, Route};
pub use status::StatusResponder;
