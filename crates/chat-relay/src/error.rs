//! Error types for the chat relay

use thiserror::Error;
use vault_call_core::CallError;

/// Result type for chat relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors carrying call signaling through a chat channel
#[derive(Debug, Error)]
pub enum RelayError {
    /// The chat backend refused or failed to post a message
    #[error("Chat transport error: {message}")]
    Transport { message: String },

    /// A prefixed message body was not a valid signaling payload
    #[error("Malformed call payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Relay settings are unusable
    #[error("Relay configuration error: {message}")]
    Configuration { message: String },
}

impl RelayError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl From<RelayError> for CallError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Malformed(e) => CallError::Serialization(e),
            RelayError::Configuration { message } => CallError::config(message),
            other => CallError::relay(other.to_string()),
        }
    }
}
