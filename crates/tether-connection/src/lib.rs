//! `tether-connection`: connection lifecycle and reconnect supervision.
//!
//! [`ConnectionManager`] owns the single live connection to the messaging
//! network. It classifies every close, persists rotated credentials, forwards
//! inbound message batches, and schedules reconnects with capped exponential
//! backoff. At most one reconnect is pending at any time, and events from a
//! superseded connection are discarded by epoch.

pub mod error;
pub mod manager;
pub mod policy;
pub mod state;

pub use error::{ConnectionError, Result};
pub use manager::{ConnectionManager, LifecycleListener, SessionEnd};
pub use policy::ReconnectPolicy;
pub use state::ConnectionState;
