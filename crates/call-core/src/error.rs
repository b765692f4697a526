//! Error types for the call controller
//!
//! Only capture failures ([`MediaError`]) are meant to reach the user through
//! the controller's pending error. Everything signaling-related is absorbed
//! and logged by the controller itself.

use thiserror::Error;

/// Result type for call controller operations
pub type CallResult<T> = Result<T, CallError>;

/// Failures acquiring local capture from the host platform
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// The platform exposes no capture API at all
    #[error("Media devices API unavailable")]
    Unavailable,

    /// The user (or a policy) refused access to the camera/microphone
    #[error("Permission denied for camera/microphone")]
    PermissionDenied,

    /// Any other device failure reported by the platform
    #[error("Media device error: {message}")]
    Device { message: String },
}

impl MediaError {
    /// Create a device error
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device {
            message: message.into(),
        }
    }

    /// Whether retrying on the same device can succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, MediaError::Unavailable)
    }
}

/// Failures reported by the host peer-connection primitive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    /// The connection could not be created
    #[error("Failed to open peer connection: {reason}")]
    Open { reason: String },

    /// Creating or applying a session description failed
    #[error("Session description {operation} failed: {reason}")]
    Description { operation: String, reason: String },

    /// The transport rejected a network candidate
    #[error("Rejected ICE candidate: {reason}")]
    Candidate { reason: String },

    /// The connection was already closed
    #[error("Peer connection closed")]
    Closed,
}

impl PeerError {
    /// Create an open error
    pub fn open(reason: impl Into<String>) -> Self {
        Self::Open {
            reason: reason.into(),
        }
    }

    /// Create a description error for the named operation
    pub fn description(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Description {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a candidate error
    pub fn candidate(reason: impl Into<String>) -> Self {
        Self::Candidate {
            reason: reason.into(),
        }
    }
}

/// Errors returned by [`crate::CallController`] operations
#[derive(Debug, Error)]
pub enum CallError {
    /// Local capture could not be acquired
    #[error(transparent)]
    Media(#[from] MediaError),

    /// Connection negotiation failed
    #[error(transparent)]
    Peer(#[from] PeerError),

    /// The signaling relay could not deliver a payload
    #[error("Signal relay error: {message}")]
    Relay { message: String },

    /// The operation is not allowed in the current phase
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// A later operation (hang-up, new offer, new call) superseded this one
    #[error("Operation superseded by a newer call operation")]
    Superseded,

    /// Payload (de)serialization failed
    #[error("Signal serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl CallError {
    /// Create a relay error
    pub fn relay(message: impl Into<String>) -> Self {
        Self::Relay {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_messages_match_user_facing_text() {
        assert_eq!(MediaError::Unavailable.to_string(), "Media devices API unavailable");
        assert_eq!(
            MediaError::PermissionDenied.to_string(),
            "Permission denied for camera/microphone"
        );
    }

    #[test]
    fn unavailable_is_not_retryable() {
        assert!(!MediaError::Unavailable.is_retryable());
        assert!(MediaError::PermissionDenied.is_retryable());
        assert!(MediaError::device("busy").is_retryable());
    }

    #[test]
    fn call_error_wraps_media_transparently() {
        let err: CallError = MediaError::PermissionDenied.into();
        assert_eq!(err.to_string(), "Permission denied for camera/microphone");
    }
}
