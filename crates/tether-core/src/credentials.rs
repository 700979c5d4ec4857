//! Opaque session credential blob.
//!
//! The internal layout belongs to the messaging client; Tether only checks
//! that the blob is a JSON object carrying a configured set of keys and reads
//! the `registered` flag.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TetherError};

/// Key holding the registration flag inside the blob.
pub const REGISTERED_KEY: &str = "registered";

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(Map<String, Value>);

impl Credentials {
    /// Parse and validate a credential blob.
    ///
    /// Fails when the bytes are not a JSON object or when any of
    /// `required_keys` is missing.
    pub fn from_slice(bytes: &[u8], required_keys: &[String]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| TetherError::InvalidCredentials(format!("not valid JSON: {e}")))?;
        Self::from_value(value, required_keys)
    }

    pub fn from_value(value: Value, required_keys: &[String]) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(TetherError::InvalidCredentials(
                "expected a JSON object".to_string(),
            ));
        };

        let missing: Vec<&str> = required_keys
            .iter()
            .filter(|k| !map.contains_key(k.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(TetherError::InvalidCredentials(format!(
                "missing keys: {}",
                missing.join(", ")
            )));
        }

        Ok(Self(map))
    }

    /// Whether the device finished pairing.
    pub fn is_registered(&self) -> bool {
        self.0
            .get(REGISTERED_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.0)?)
    }
}

// Never print key material.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("keys", &self.0.len())
            .field("registered", &self.is_registered())
            .finish()
    }
}
