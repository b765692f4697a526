//! Host platform capabilities consumed by the controller
//!
//! The controller never captures media or negotiates transports itself. The
//! hosting application hands it implementations of these traits (a browser
//! binding, a native WebRTC stack, or the scripted [`crate::mock`] platform).
//!
//! Push-style platform callbacks (`onicecandidate`, `ontrack`) are not
//! closures here: the factory receives a [`PeerEventSender`] and posts
//! [`PeerEvent`]s into the controller's event queue instead.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::IceServer;
use crate::error::{CallResult, MediaError, PeerError};
use crate::signal::{IceCandidateInit, SignalMessage};

/// What to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    /// Audio always, video on request
    pub fn for_call(wants_video: bool) -> Self {
        Self {
            audio: true,
            video: wants_video,
        }
    }
}

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A captured or received audio/video stream
pub trait MediaStream: Send + Sync + fmt::Debug {
    /// Platform identifier of the stream
    fn id(&self) -> &str;

    /// Kinds of the tracks carried by this stream
    fn track_kinds(&self) -> Vec<TrackKind>;

    /// Stop every track. Must be idempotent.
    fn stop(&self);
}

/// Shared handle to a stream
pub type MediaStreamHandle = Arc<dyn MediaStream>;

/// Capture device access
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaStreamHandle, MediaError>;
}

/// Offer or answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    Offer,
    Answer,
}

/// A session description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Parameters handed to the factory for every new connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    pub ice_servers: Vec<IceServer>,
}

/// A negotiated (or negotiating) peer transport
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Attach every track of a local stream
    fn add_stream(&self, stream: &MediaStreamHandle) -> Result<(), PeerError>;

    async fn create_offer(&self) -> Result<SessionDescription, PeerError>;

    async fn create_answer(&self) -> Result<SessionDescription, PeerError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerError>;

    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<(), PeerError>;

    /// Close the transport. Must be idempotent.
    fn close(&self);
}

/// Shared handle to a peer connection
pub type PeerConnectionHandle = Arc<dyn PeerConnection>;

/// Creates peer connections
pub trait PeerConnectionFactory: Send + Sync {
    fn create(
        &self,
        config: &PeerConfig,
        events: PeerEventSender,
    ) -> Result<PeerConnectionHandle, PeerError>;
}

/// Events the platform pushes for an open connection
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// The transport discovered a local network candidate
    LocalCandidate(IceCandidateInit),
    /// A remote stream arrived
    RemoteTrack(MediaStreamHandle),
}

/// Posts [`PeerEvent`]s for one session epoch into the controller's queue
#[derive(Debug, Clone)]
pub struct PeerEventSender {
    epoch: u64,
    tx: mpsc::UnboundedSender<(u64, PeerEvent)>,
}

impl PeerEventSender {
    pub(crate) fn new(epoch: u64, tx: mpsc::UnboundedSender<(u64, PeerEvent)>) -> Self {
        Self { epoch, tx }
    }

    /// Epoch of the session this sender belongs to
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Queue an event. Returns false once the controller is gone.
    pub fn send(&self, event: PeerEvent) -> bool {
        self.tx.send((self.epoch, event)).is_ok()
    }

    pub fn local_candidate(&self, candidate: IceCandidateInit) -> bool {
        self.send(PeerEvent::LocalCandidate(candidate))
    }

    pub fn remote_track(&self, stream: MediaStreamHandle) -> bool {
        self.send(PeerEvent::RemoteTrack(stream))
    }
}

/// The `sendSignal` capability: delivers a payload to the remote party
///
/// Delivery is best-effort; the controller logs failures and carries on.
#[async_trait]
pub trait SignalRelay: Send + Sync {
    async fn send_signal(&self, message: SignalMessage) -> CallResult<()>;
}
