//! `tether-session`: local credential storage with remote bootstrap.
//!
//! The store keeps a single `creds.json` under the configured session
//! directory. Writes are atomic and serialized; a blob that fails validation
//! is never written and never reported as present.

pub mod error;
pub mod fetch;
pub mod store;

pub use error::{Result, SessionError};
pub use fetch::{CredentialFetcher, HttpFetcher};
pub use store::SessionStore;
