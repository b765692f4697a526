//! Relay configuration

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};

/// Marker that distinguishes call payloads from user text
pub const CALL_PREFIX: &str = "__CALL__:";

/// Chat relay settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Prefix of every message carrying a signaling payload
    pub prefix: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            prefix: CALL_PREFIX.to_string(),
        }
    }
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn validate(&self) -> RelayResult<()> {
        if self.prefix.trim().is_empty() {
            return Err(RelayError::config("call prefix must not be empty"));
        }
        Ok(())
    }
}
