//! Scripted host platform
//!
//! In-memory [`MediaDevices`], [`PeerConnectionFactory`] and [`SignalRelay`]
//! implementations that record what the controller did to them. Used by the
//! crate's own tests and by hosts exercising their integration without a
//! browser or native WebRTC stack.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Notify};
use uuid::Uuid;

use crate::error::{CallError, CallResult, MediaError, PeerError};
use crate::platform::{
    MediaConstraints, MediaDevices, MediaStream, MediaStreamHandle, PeerConfig, PeerConnection,
    PeerConnectionFactory, PeerConnectionHandle, PeerEventSender, SdpType, SessionDescription,
    SignalRelay, TrackKind,
};
use crate::signal::{IceCandidateInit, SignalMessage};

/// A stream whose tracks only record being stopped
#[derive(Debug)]
pub struct MockStream {
    id: String,
    kinds: Vec<TrackKind>,
    stopped: AtomicBool,
}

impl MockStream {
    pub fn new(kinds: Vec<TrackKind>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            kinds,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn for_constraints(constraints: MediaConstraints) -> Arc<Self> {
        let mut kinds = Vec::new();
        if constraints.audio {
            kinds.push(TrackKind::Audio);
        }
        if constraints.video {
            kinds.push(TrackKind::Video);
        }
        Self::new(kinds)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl MediaStream for MockStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn track_kinds(&self) -> Vec<TrackKind> {
        self.kinds.clone()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Holds one capture request until released
pub struct CaptureGate {
    requested: Arc<Notify>,
    release: oneshot::Sender<()>,
}

impl CaptureGate {
    /// Wait until the controller is suspended on this capture
    pub async fn wait_requested(&self) {
        self.requested.notified().await;
    }

    /// Let the capture complete
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

enum CaptureScript {
    Grant,
    Deny(MediaError),
    Hold {
        requested: Arc<Notify>,
        release: oneshot::Receiver<()>,
    },
}

/// Capture devices that grant by default and can be scripted per request
#[derive(Default)]
pub struct MockMediaDevices {
    script: Mutex<VecDeque<CaptureScript>>,
    requests: Mutex<Vec<MediaConstraints>>,
    granted: Mutex<Vec<Arc<MockStream>>>,
}

impl MockMediaDevices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next capture with `error`
    pub fn deny_next(&self, error: MediaError) {
        self.script.lock().push_back(CaptureScript::Deny(error));
    }

    /// Suspend the next capture until the returned gate is released
    pub fn hold_next(&self) -> CaptureGate {
        let requested = Arc::new(Notify::new());
        let (tx, rx) = oneshot::channel();
        self.script.lock().push_back(CaptureScript::Hold {
            requested: Arc::clone(&requested),
            release: rx,
        });
        CaptureGate {
            requested,
            release: tx,
        }
    }

    /// Constraints of every capture request, in order
    pub fn requests(&self) -> Vec<MediaConstraints> {
        self.requests.lock().clone()
    }

    /// Every stream handed out, in order
    pub fn granted(&self) -> Vec<Arc<MockStream>> {
        self.granted.lock().clone()
    }

    /// No granted stream is still capturing
    pub fn all_stopped(&self) -> bool {
        self.granted.lock().iter().all(|s| s.is_stopped())
    }

    fn grant(&self, constraints: MediaConstraints) -> MediaStreamHandle {
        let stream = MockStream::for_constraints(constraints);
        self.granted.lock().push(Arc::clone(&stream));
        stream
    }
}

#[async_trait]
impl MediaDevices for MockMediaDevices {
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaStreamHandle, MediaError> {
        self.requests.lock().push(constraints);
        let script = self.script.lock().pop_front().unwrap_or(CaptureScript::Grant);
        match script {
            CaptureScript::Grant => Ok(self.grant(constraints)),
            CaptureScript::Deny(error) => Err(error),
            CaptureScript::Hold { requested, release } => {
                requested.notify_one();
                let _ = release.await;
                Ok(self.grant(constraints))
            }
        }
    }
}

/// A peer connection that records every call made on it
pub struct MockPeer {
    label: String,
    events: PeerEventSender,
    streams: Mutex<Vec<MediaStreamHandle>>,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidateInit>>,
    gather: Vec<IceCandidateInit>,
    reject_candidates: AtomicBool,
    reject_remote: AtomicBool,
    closed: AtomicBool,
}

impl MockPeer {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn epoch(&self) -> u64 {
        self.events.epoch()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    pub fn added_candidates(&self) -> Vec<IceCandidateInit> {
        self.candidates.lock().clone()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }

    /// Make later `add_ice_candidate` calls fail
    pub fn reject_candidates(&self) {
        self.reject_candidates.store(true, Ordering::SeqCst);
    }

    /// Push a remote track event as the platform would
    pub fn emit_remote_track(&self, stream: MediaStreamHandle) -> bool {
        self.events.remote_track(stream)
    }

    /// Push a local candidate event as the platform would
    pub fn emit_local_candidate(&self, candidate: IceCandidateInit) -> bool {
        self.events.local_candidate(candidate)
    }

    fn ensure_open(&self) -> Result<(), PeerError> {
        if self.is_closed() {
            Err(PeerError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PeerConnection for MockPeer {
    fn add_stream(&self, stream: &MediaStreamHandle) -> Result<(), PeerError> {
        self.ensure_open()?;
        self.streams.lock().push(Arc::clone(stream));
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, PeerError> {
        self.ensure_open()?;
        Ok(SessionDescription::offer(format!("offer:{}", self.label)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, PeerError> {
        self.ensure_open()?;
        let has_offer = matches!(
            self.remote.lock().as_ref(),
            Some(SessionDescription {
                sdp_type: SdpType::Offer,
                ..
            })
        );
        if !has_offer {
            return Err(PeerError::description("create_answer", "no remote offer"));
        }
        Ok(SessionDescription::answer(format!("answer:{}", self.label)))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        self.ensure_open()?;
        *self.local.lock() = Some(desc);
        for candidate in &self.gather {
            self.events.local_candidate(candidate.clone());
        }
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        self.ensure_open()?;
        if self.reject_remote.load(Ordering::SeqCst) {
            return Err(PeerError::description(
                "set_remote_description",
                "rejected by script",
            ));
        }
        *self.remote.lock() = Some(desc);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<(), PeerError> {
        self.ensure_open()?;
        if self.reject_candidates.load(Ordering::SeqCst) || self.remote.lock().is_none() {
            return Err(PeerError::candidate(candidate.candidate));
        }
        self.candidates.lock().push(candidate);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Factory handing out [`MockPeer`]s named `<name>-<n>`
pub struct MockPeerFactory {
    name: String,
    counter: AtomicUsize,
    gather: Mutex<Vec<IceCandidateInit>>,
    reject_remote: AtomicBool,
    fail_open: AtomicBool,
    configs: Mutex<Vec<PeerConfig>>,
    peers: Mutex<Vec<Arc<MockPeer>>>,
}

impl MockPeerFactory {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            counter: AtomicUsize::new(0),
            gather: Mutex::new(Vec::new()),
            reject_remote: AtomicBool::new(false),
            fail_open: AtomicBool::new(false),
            configs: Mutex::new(Vec::new()),
            peers: Mutex::new(Vec::new()),
        })
    }

    /// Candidates every new connection "discovers" once its local description is set
    pub fn gather_candidates(&self, candidates: Vec<IceCandidateInit>) {
        *self.gather.lock() = candidates;
    }

    /// New connections reject every remote description
    pub fn reject_remote_descriptions(&self, reject: bool) {
        self.reject_remote.store(reject, Ordering::SeqCst);
    }

    /// New connections cannot be created
    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn peers(&self) -> Vec<Arc<MockPeer>> {
        self.peers.lock().clone()
    }

    pub fn last(&self) -> Option<Arc<MockPeer>> {
        self.peers.lock().last().cloned()
    }

    pub fn configs(&self) -> Vec<PeerConfig> {
        self.configs.lock().clone()
    }

    /// No connection handed out is still open
    pub fn all_closed(&self) -> bool {
        self.peers.lock().iter().all(|p| p.is_closed())
    }
}

impl PeerConnectionFactory for MockPeerFactory {
    fn create(
        &self,
        config: &PeerConfig,
        events: PeerEventSender,
    ) -> Result<PeerConnectionHandle, PeerError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(PeerError::open("scripted failure"));
        }
        self.configs.lock().push(config.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let peer = Arc::new(MockPeer {
            label: format!("{}-{}", self.name, n),
            events,
            streams: Mutex::new(Vec::new()),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            gather: self.gather.lock().clone(),
            reject_candidates: AtomicBool::new(false),
            reject_remote: AtomicBool::new(self.reject_remote.load(Ordering::SeqCst)),
            closed: AtomicBool::new(false),
        });
        self.peers.lock().push(Arc::clone(&peer));
        Ok(peer)
    }
}

/// Relay that records every payload and optionally forwards it
#[derive(Default)]
pub struct RecordingRelay {
    sent: Mutex<Vec<SignalMessage>>,
    forward: Mutex<Option<mpsc::UnboundedSender<SignalMessage>>>,
    fail: AtomicBool,
}

impl RecordingRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Also deliver every payload to the returned receiver
    pub fn forwarding() -> (Arc<Self>, mpsc::UnboundedReceiver<SignalMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let relay = Self::default();
        *relay.forward.lock() = Some(tx);
        (Arc::new(relay), rx)
    }

    /// Make every later send fail
    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SignalMessage> {
        self.sent.lock().clone()
    }

    /// Number of sent payloads of the given kind
    pub fn count(&self, kind: crate::signal::SignalKind) -> usize {
        self.sent.lock().iter().filter(|m| m.kind() == kind).count()
    }
}

#[async_trait]
impl SignalRelay for RecordingRelay {
    async fn send_signal(&self, message: SignalMessage) -> CallResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CallError::relay("scripted send failure"));
        }
        self.sent.lock().push(message.clone());
        if let Some(tx) = self.forward.lock().as_ref() {
            let _ = tx.send(message);
        }
        Ok(())
    }
}
