//! Shared configuration, error root and identifier helpers for the Tether
//! gateway crates.

pub mod config;
pub mod credentials;
pub mod error;
pub mod types;

pub use config::TetherConfig;
pub use credentials::Credentials;
pub use error::{Result, TetherError};
pub use types::{ChatKind, OperatingMode};
