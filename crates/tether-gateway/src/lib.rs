//! `tether-gateway`: composition root.
//!
//! Wires the session store, connection manager and message router together
//! and runs them until the session ends or [`Gateway::stop`] is called.

pub mod error;
pub mod gateway;
pub mod notify;
pub mod plugin;

pub use error::{GatewayError, Result};
pub use gateway::{Gateway, GatewayBuilder};
pub use plugin::Plugin;
