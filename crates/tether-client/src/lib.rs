//! Messaging-network collaborator interface.
//!
//! The gateway never talks to the network protocol directly. It drives a
//! [`MessagingClient`], consumes [`ClientEvent`]s from the returned
//! [`Connection`], and sends through a shared [`ClientHandle`]. The
//! [`bridge`] module provides one implementation that talks to a protocol
//! sidecar over a WebSocket.

pub mod bridge;
pub mod client;
pub mod close;
pub mod envelope;
pub mod error;
pub mod event;

pub use client::{
    ClientHandle, Connection, GroupMetadata, GroupParticipant, MessagingClient, OutboundPayload,
    SharedHandle,
};
pub use close::{CloseDisposition, CloseReason};
pub use envelope::{MessageContent, MessageKey, RawMessage};
pub use error::ClientError;
pub use event::{ClientEvent, ConnectionUpdate};
