//! # Vault Call Core - Peer Call Controller
//!
//! Drives a single peer-to-peer audio/video call between two chat
//! participants. The controller captures local media, negotiates a peer
//! connection through offer/answer/candidate exchange and tears everything
//! down on hang-up. It never talks to the network itself: outbound payloads
//! go through an injected [`SignalRelay`], inbound payloads are fed to
//! [`CallController::handle_signal`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vault_call_core::{
//!     CallController, CallConfig, MediaDevices, PeerConnectionFactory, SignalRelay,
//! };
//!
//! async fn place_call(
//!     relay: Arc<dyn SignalRelay>,
//!     media: Arc<dyn MediaDevices>,
//!     peers: Arc<dyn PeerConnectionFactory>,
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = CallController::new(CallConfig::default(), relay, media, peers);
//!     controller.start_call(true).await?;
//!
//!     // ...feed inbound payloads with controller.handle_signal(..)
//!
//!     controller.end_call().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`state_table`]: which trigger is legal in which phase
//! - [`controller`]: the session owner; every mutation goes through the table
//! - [`platform`]: capture, peer connection and relay capabilities supplied by the host
//! - [`signal`]: the JSON payloads exchanged with the remote party
//! - [`events`]: phase, media and error notifications for UI integration

pub mod builder;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod logging;
pub mod platform;
pub mod session;
pub mod signal;
pub mod state_table;

#[cfg(any(test, feature = "mock-platform"))]
pub mod mock;

// Re-export main types
pub use builder::CallControllerBuilder;
pub use config::{CallConfig, IceServer, DEFAULT_EVENT_CAPACITY, DEFAULT_STUN_URL};
pub use controller::CallController;
pub use error::{CallError, CallResult, MediaError, PeerError};
pub use events::{CallEvent, CallEventStream};
pub use logging::{parse_log_level, setup_logging, LoggingConfig};
pub use platform::{
    MediaConstraints, MediaDevices, MediaStream, MediaStreamHandle, PeerConfig, PeerConnection,
    PeerConnectionFactory, PeerConnectionHandle, PeerEvent, PeerEventSender, SdpType,
    SessionDescription, SignalRelay, TrackKind,
};
pub use session::{CallSnapshot, SessionId};
pub use signal::{IceCandidateInit, SignalKind, SignalMessage};
pub use state_table::{CallPhase, CallRole, Trigger, CALL_TABLE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
