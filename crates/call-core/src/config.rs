//! Controller configuration
//!
//! ```rust
//! use vault_call_core::{CallConfig, IceServer};
//!
//! let config = CallConfig::new()
//!     .with_ice_server(IceServer::turn("turn:turn.example.org:3478", "vault", "secret"))
//!     .with_event_capacity(32);
//! assert_eq!(config.ice_servers.len(), 2);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CallError, CallResult};
use crate::platform::PeerConfig;

/// Public STUN server used when nothing else is configured
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// Default capacity of the controller's event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// A STUN/TURN server entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: vec![url.into()],
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }
}

/// Configuration for a [`crate::CallController`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Servers handed to every new peer connection
    pub ice_servers: Vec<IceServer>,
    /// Capacity of the [`crate::CallEvent`] broadcast channel
    pub event_capacity: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer::stun(DEFAULT_STUN_URL)],
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl CallConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a server to the list
    pub fn with_ice_server(mut self, server: IceServer) -> Self {
        self.ice_servers.push(server);
        self
    }

    /// Replace the server list
    pub fn with_ice_servers(mut self, servers: Vec<IceServer>) -> Self {
        self.ice_servers = servers;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Load from a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> CallResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CallError::config(format!("invalid call config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CallResult<()> {
        if self.event_capacity == 0 {
            return Err(CallError::config("event_capacity must be greater than zero"));
        }
        if let Some(server) = self.ice_servers.iter().find(|s| s.urls.is_empty()) {
            return Err(CallError::config(format!(
                "ICE server entry without urls (username: {:?})",
                server.username
            )));
        }
        Ok(())
    }

    pub(crate) fn peer_config(&self) -> PeerConfig {
        PeerConfig {
            ice_servers: self.ice_servers.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_public_stun() {
        let config = CallConfig::default();
        assert_eq!(config.ice_servers, vec![IceServer::stun(DEFAULT_STUN_URL)]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_keeps_defaults_for_missing_fields() {
        let config = CallConfig::from_json(r#"{"event_capacity": 8}"#).unwrap();
        assert_eq!(config.event_capacity, 8);
        assert_eq!(config.ice_servers.len(), 1);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = CallConfig::new().with_event_capacity(0).validate().unwrap_err();
        assert!(matches!(err, CallError::Configuration { .. }));
    }

    #[test]
    fn empty_urls_are_rejected() {
        let config = CallConfig::new().with_ice_servers(vec![IceServer {
            urls: vec![],
            username: Some("u".into()),
            credential: None,
        }]);
        assert!(config.validate().is_err());
    }
}
