//! Peer call controller
//!
//! Drives exactly one call session through capture acquisition, offer/answer
//! negotiation and teardown. Local intents ([`CallController::start_call`],
//! [`CallController::end_call`]) and inbound payloads
//! ([`CallController::handle_signal`]) all go through the state table; outbound
//! payloads leave through the injected [`SignalRelay`].
//!
//! # Interleaving
//!
//! Operations suspend while the platform captures media or builds
//! descriptions, and other operations may run in the meantime. Every
//! operation claims an epoch when it starts; after each suspension point it
//! re-checks that its epoch is still current. A result that resolves under a
//! stale epoch is released (stream stopped, connection closed) and dropped.
//!
//! ```text
//!   start_call ──► capture ──► open peer ──► offer ──► AwaitingAnswer ──► send
//!                     ▲                                     │ answer (may beat the send)
//!        end_call ────┘ (epoch bumped: capture is stopped   ▼
//!                        on arrival)                    Connected
//! ```
//!
//! A session is committed before its description is sent, so a reply that
//! overtakes the relay's acknowledgement still finds it. Local candidates
//! stay held until the description is out; a failed send rolls back to Idle.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::CallConfig;
use crate::error::{CallError, CallResult, PeerError};
use crate::events::{CallEvent, CallEventStream, EventPublisher};
use crate::platform::{
    MediaConstraints, MediaDevices, MediaStreamHandle, PeerConnectionFactory,
    PeerConnectionHandle, PeerEvent, PeerEventSender, SessionDescription, SignalRelay,
};
use crate::session::{CallSnapshot, Negotiation, SessionState};
use crate::signal::{IceCandidateInit, SignalMessage};
use crate::state_table::{CallPhase, CallRole, Trigger, CALL_TABLE};

struct ControllerState {
    /// Bumped by every operation that claims the session slot and by teardown
    epoch: u64,
    session: SessionState,
    negotiation: Option<Negotiation>,
    pending_error: Option<String>,
}

impl ControllerState {
    fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    /// Invalidate in-flight work, releasing whatever it had acquired
    fn claim_epoch(&mut self) -> u64 {
        self.epoch += 1;
        if let Some(negotiation) = self.negotiation.take() {
            negotiation.release();
        }
        self.epoch
    }

    fn negotiation_mut(&mut self, epoch: u64) -> Option<&mut Negotiation> {
        self.negotiation.as_mut().filter(|n| n.epoch == epoch)
    }
}

struct Inner {
    config: CallConfig,
    relay: Arc<dyn SignalRelay>,
    media: Arc<dyn MediaDevices>,
    peers: Arc<dyn PeerConnectionFactory>,
    state: Mutex<ControllerState>,
    events: EventPublisher,
    peer_events: mpsc::UnboundedSender<(u64, PeerEvent)>,
}

/// Controller for a single peer-to-peer audio/video call
///
/// Must be created inside a tokio runtime: platform events are drained by a
/// task spawned at construction.
pub struct CallController {
    inner: Arc<Inner>,
    driver: JoinHandle<()>,
}

impl CallController {
    /// Create a controller. See [`crate::CallControllerBuilder`] for a
    /// validating alternative.
    pub fn new(
        config: CallConfig,
        relay: Arc<dyn SignalRelay>,
        media: Arc<dyn MediaDevices>,
        peers: Arc<dyn PeerConnectionFactory>,
    ) -> Self {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            events: EventPublisher::new(config.event_capacity.max(1)),
            config,
            relay,
            media,
            peers,
            state: Mutex::new(ControllerState {
                epoch: 0,
                session: SessionState::Idle,
                negotiation: None,
                pending_error: None,
            }),
            peer_events: peer_tx,
        });
        let driver = tokio::spawn(drive_peer_events(Arc::downgrade(&inner), peer_rx));
        Self { inner, driver }
    }

    /// Originate a call.
    ///
    /// Captures audio (and video if `wants_video`), opens a peer connection,
    /// sends exactly one offer and leaves the controller in
    /// [`CallPhase::AwaitingAnswer`].
    ///
    /// # Errors
    ///
    /// * [`CallError::InvalidState`] - a session is already active
    /// * [`CallError::Media`] - capture failed; also recorded as the pending error
    /// * [`CallError::Peer`] / [`CallError::Relay`] - negotiation failed, controller back to Idle
    /// * [`CallError::Superseded`] - hung up or replaced before the offer went out
    pub async fn start_call(&self, wants_video: bool) -> CallResult<()> {
        self.inner.start_call(wants_video).await
    }

    /// Feed one inbound signaling payload. Never fails: stale or unknown
    /// payloads are ignored and negotiation problems are logged.
    pub async fn handle_signal(&self, message: SignalMessage) {
        self.inner.handle_signal(message).await
    }

    /// Feed one inbound payload without waiting for slow work.
    ///
    /// An offer claims the session right away and is answered on a spawned
    /// task, so payloads fed after it (candidates, `end`) already apply to
    /// the new negotiation. Returns that task; every other payload is handled
    /// before returning.
    pub async fn dispatch_signal(&self, message: SignalMessage) -> Option<JoinHandle<()>> {
        match message {
            SignalMessage::Offer { sdp, video } => {
                debug!("Inbound offer signal (dispatched)");
                let epoch = self.inner.claim_offer(video)?;
                let inner = Arc::clone(&self.inner);
                Some(tokio::spawn(async move {
                    inner.finish_offer(epoch, sdp, video).await
                }))
            }
            other => {
                self.inner.handle_signal(other).await;
                None
            }
        }
    }

    /// Parse and feed a raw JSON payload body; malformed bodies are dropped
    pub async fn handle_signal_json(&self, body: &str) {
        match SignalMessage::from_json(body) {
            Ok(message) => self.inner.handle_signal(message).await,
            Err(e) => debug!("Dropping malformed signal payload: {}", e),
        }
    }

    /// Hang up. Safe from any phase; always sends one `end` payload.
    pub async fn end_call(&self) {
        if self.inner.end_session(Trigger::LocalEnd) {
            self.inner.send_best_effort(SignalMessage::End).await;
        }
    }

    /// Tear down because the owner is going away. Sends `end` only if a
    /// session was live. Dropping the controller does the same.
    pub async fn shutdown(&self) {
        if self.inner.end_session(Trigger::Discard) {
            self.inner.send_best_effort(SignalMessage::End).await;
        }
    }

    pub fn phase(&self) -> CallPhase {
        self.inner.state.lock().session.phase()
    }

    pub fn pending_error(&self) -> Option<String> {
        self.inner.state.lock().pending_error.clone()
    }

    pub fn snapshot(&self) -> CallSnapshot {
        let st = self.inner.state.lock();
        let call = st.session.call();
        CallSnapshot {
            session_id: call.map(|c| c.id),
            phase: st.session.phase(),
            role: call.map(|c| c.role).unwrap_or(CallRole::Idle),
            wants_video: call.map(|c| c.wants_video).unwrap_or(false),
            has_local_media: call.is_some(),
            has_remote_media: call.map(|c| c.remote_media.is_some()).unwrap_or(false),
            pending_error: st.pending_error.clone(),
        }
    }

    /// Local preview stream of the live session
    pub fn local_media(&self) -> Option<MediaStreamHandle> {
        let st = self.inner.state.lock();
        st.session.call().map(|c| c.local_media.clone())
    }

    /// Remote stream of the live session, once a track arrived
    pub fn remote_media(&self) -> Option<MediaStreamHandle> {
        let st = self.inner.state.lock();
        st.session.call().and_then(|c| c.remote_media.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> CallEventStream {
        CallEventStream::new(self.subscribe())
    }
}

impl Drop for CallController {
    fn drop(&mut self) {
        self.driver.abort();
        if !self.inner.end_session(Trigger::Discard) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let relay = Arc::clone(&self.inner.relay);
                handle.spawn(async move {
                    if let Err(e) = relay.send_signal(SignalMessage::End).await {
                        debug!("Could not deliver end on discard: {}", e);
                    }
                });
            }
            Err(_) => debug!("No runtime available to deliver end on discard"),
        }
    }
}

async fn drive_peer_events(
    inner: Weak<Inner>,
    mut rx: mpsc::UnboundedReceiver<(u64, PeerEvent)>,
) {
    while let Some((epoch, event)) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.on_peer_event(epoch, event).await;
    }
}

impl Inner {
    async fn start_call(&self, wants_video: bool) -> CallResult<()> {
        let (epoch, id) = {
            let mut st = self.state.lock();
            let phase = st.session.phase();
            if !CALL_TABLE.accepts(phase, Trigger::StartCall) {
                return Err(CallError::invalid_state(format!(
                    "cannot start a call while {phase}"
                )));
            }
            let epoch = st.claim_epoch();
            let negotiation = Negotiation::new(epoch, CallRole::Caller, wants_video);
            let id = negotiation.id;
            st.negotiation = Some(negotiation);
            (epoch, id)
        };
        info!(
            "Starting {} call {}",
            if wants_video { "video" } else { "audio" },
            id
        );

        let stream = self.acquire_media(epoch, wants_video).await?;
        let peer = self.open_peer(epoch, &stream)?;

        let offer = self.step(epoch, peer.create_offer().await)?;
        self.step(epoch, peer.set_local_description(offer.clone()).await)?;

        // The answer may come back before the relay acknowledges the offer
        self.commit(epoch, CallPhase::AwaitingAnswer)?;

        if let Err(e) = self
            .relay
            .send_signal(SignalMessage::offer(offer.sdp, wants_video))
            .await
        {
            warn!("Failed to send offer for {}: {}", id, e);
            self.roll_back(epoch);
            return Err(e);
        }

        self.flush_held_candidates(epoch).await;
        Ok(())
    }

    async fn handle_signal(&self, message: SignalMessage) {
        debug!("Inbound {} signal", message.kind());
        match message {
            SignalMessage::Offer { sdp, video } => self.accept_offer(sdp, video).await,
            SignalMessage::Answer { sdp } => self.apply_answer(sdp).await,
            SignalMessage::Candidate { candidate } => self.add_remote_candidate(candidate).await,
            SignalMessage::End => {
                self.end_session(Trigger::RemoteEnd);
            }
            SignalMessage::Unknown => debug!("Ignoring unrecognized signal"),
        }
    }

    async fn accept_offer(&self, sdp: String, wants_video: bool) {
        if let Some(epoch) = self.claim_offer(wants_video) {
            self.finish_offer(epoch, sdp, wants_video).await;
        }
    }

    /// Claim the session slot for an inbound offer
    fn claim_offer(&self, wants_video: bool) -> Option<u64> {
        let mut st = self.state.lock();
        let phase = st.session.phase();
        let Some(transition) = CALL_TABLE.get(phase, Trigger::RemoteOffer) else {
            debug!("Ignoring offer while {}", phase);
            return None;
        };
        if transition.replaces_session {
            info!("Offer received while {}; replacing the current session", phase);
            self.teardown_locked(&mut st);
        }
        let epoch = st.claim_epoch();
        st.negotiation = Some(Negotiation::new(epoch, CallRole::Callee, wants_video));
        Some(epoch)
    }

    async fn finish_offer(&self, epoch: u64, sdp: String, wants_video: bool) {
        match self.answer_offer(epoch, sdp, wants_video).await {
            Ok(()) => {}
            Err(CallError::Superseded) => debug!("Answering offer superseded (epoch {})", epoch),
            // Already recorded as the pending error
            Err(CallError::Media(_)) => {}
            Err(e) => warn!("Failed to answer offer: {}", e),
        }
    }

    async fn answer_offer(&self, epoch: u64, sdp: String, wants_video: bool) -> CallResult<()> {
        let stream = self.acquire_media(epoch, wants_video).await?;
        let peer = self.open_peer(epoch, &stream)?;

        self.step(
            epoch,
            peer.set_remote_description(SessionDescription::offer(sdp)).await,
        )?;
        let queued = {
            let mut st = self.state.lock();
            let Some(negotiation) = st.negotiation_mut(epoch) else {
                return Err(CallError::Superseded);
            };
            negotiation.remote_described = true;
            std::mem::take(&mut negotiation.remote_candidates)
        };
        for candidate in queued {
            apply_candidate(&peer, candidate).await;
        }

        let answer = self.step(epoch, peer.create_answer().await)?;
        self.step(epoch, peer.set_local_description(answer.clone()).await)?;

        if let Err(e) = self.relay.send_signal(SignalMessage::answer(answer.sdp)).await {
            self.abandon(epoch);
            return Err(e);
        }

        self.commit(epoch, CallPhase::Connected)?;
        self.flush_held_candidates(epoch).await;
        Ok(())
    }

    async fn apply_answer(&self, sdp: String) {
        let (epoch, id, peer) = {
            let mut st = self.state.lock();
            let phase = st.session.phase();
            if !CALL_TABLE.accepts(phase, Trigger::RemoteAnswer) {
                debug!("Ignoring answer while {}", phase);
                return;
            }
            let epoch = st.epoch;
            let Some(call) = st.session.call_mut() else {
                return;
            };
            if call.answer_in_flight {
                debug!("Ignoring duplicate answer for {}", call.id);
                return;
            }
            call.answer_in_flight = true;
            (epoch, call.id, Arc::clone(&call.peer))
        };

        let result = peer
            .set_remote_description(SessionDescription::answer(sdp))
            .await;

        let hang_up = {
            let mut st = self.state.lock();
            if !st.is_current(epoch) {
                debug!("Answer for {} resolved after teardown", id);
                return;
            }
            match result {
                Ok(()) => {
                    if st.session.promote() {
                        info!("Call {} connected", id);
                        self.events.phase_changed(
                            id,
                            CallRole::Caller,
                            CallPhase::AwaitingAnswer,
                            CallPhase::Connected,
                        );
                    }
                    false
                }
                Err(e) => {
                    warn!("Failed to apply answer for {}: {}; hanging up", id, e);
                    self.teardown_locked(&mut st);
                    true
                }
            }
        };
        if hang_up {
            self.send_best_effort(SignalMessage::End).await;
        }
    }

    async fn add_remote_candidate(&self, candidate: IceCandidateInit) {
        let peer = {
            let mut st = self.state.lock();
            let phase = st.session.phase();
            if CALL_TABLE.accepts(phase, Trigger::RemoteCandidate) {
                st.session.call().map(|c| Arc::clone(&c.peer))
            } else if let Some(negotiation) = st
                .negotiation
                .as_mut()
                .filter(|n| n.role == CallRole::Callee)
            {
                if negotiation.remote_described {
                    negotiation.peer.clone()
                } else {
                    debug!("Queueing remote candidate until the offer is applied");
                    negotiation.remote_candidates.push(candidate);
                    return;
                }
            } else {
                None
            }
        };
        match peer {
            Some(peer) => apply_candidate(&peer, candidate).await,
            None => debug!("Ignoring candidate: no peer connection"),
        }
    }

    async fn on_peer_event(&self, epoch: u64, event: PeerEvent) {
        match event {
            PeerEvent::LocalCandidate(candidate) => {
                {
                    let mut st = self.state.lock();
                    if !st.is_current(epoch) {
                        debug!("Dropping local candidate from stale epoch {}", epoch);
                        return;
                    }
                    if let Some(negotiation) = st.negotiation_mut(epoch) {
                        negotiation.local_candidates.push(candidate);
                        return;
                    }
                    let Some(call) = st.session.call_mut() else {
                        return;
                    };
                    if let Some(held) = call.held_candidates.as_mut() {
                        held.push(candidate);
                        return;
                    }
                }
                self.send_best_effort(SignalMessage::candidate(candidate)).await;
            }
            PeerEvent::RemoteTrack(stream) => {
                let mut st = self.state.lock();
                if !st.is_current(epoch) {
                    stream.stop();
                    return;
                }
                if let Some(negotiation) = st.negotiation_mut(epoch) {
                    negotiation.remote_media = Some(stream);
                    return;
                }
                if let Some(call) = st.session.call_mut() {
                    let previous = call.remote_media.replace(Arc::clone(&stream));
                    if let Some(previous) = previous.filter(|p| p.id() != stream.id()) {
                        previous.stop();
                    }
                    debug!("Remote stream {} attached to {}", stream.id(), call.id);
                    self.events.publish(CallEvent::RemoteMedia {
                        session_id: call.id,
                        stream,
                    });
                }
            }
        }
    }

    /// Capture local media for the negotiation claimed under `epoch`
    async fn acquire_media(&self, epoch: u64, wants_video: bool) -> CallResult<MediaStreamHandle> {
        let result = self
            .media
            .get_user_media(MediaConstraints::for_call(wants_video))
            .await;

        let mut st = self.state.lock();
        match result {
            Err(e) => {
                error!("Error accessing user media: {}", e);
                if st.is_current(epoch) {
                    if let Some(negotiation) = st.negotiation.take() {
                        negotiation.release();
                    }
                    st.pending_error = Some(e.to_string());
                    self.events.publish(CallEvent::Error {
                        message: e.to_string(),
                    });
                }
                Err(e.into())
            }
            Ok(stream) => {
                let Some(negotiation) = st.negotiation_mut(epoch) else {
                    debug!("Capture resolved for superseded epoch {}; stopping it", epoch);
                    stream.stop();
                    return Err(CallError::Superseded);
                };
                negotiation.local_media = Some(Arc::clone(&stream));
                let id = negotiation.id;
                st.pending_error = None;
                self.events.publish(CallEvent::LocalMedia {
                    session_id: id,
                    stream: Arc::clone(&stream),
                });
                Ok(stream)
            }
        }
    }

    /// Open a peer connection carrying `stream` for the negotiation under `epoch`
    fn open_peer(
        &self,
        epoch: u64,
        stream: &MediaStreamHandle,
    ) -> CallResult<PeerConnectionHandle> {
        let sender = PeerEventSender::new(epoch, self.peer_events.clone());
        let peer = self
            .peers
            .create(&self.config.peer_config(), sender)
            .map_err(|e| self.fail(epoch, e))?;
        if let Err(e) = peer.add_stream(stream) {
            peer.close();
            return Err(self.fail(epoch, e));
        }

        let mut st = self.state.lock();
        match st.negotiation_mut(epoch) {
            Some(negotiation) => {
                negotiation.peer = Some(Arc::clone(&peer));
                Ok(peer)
            }
            None => {
                peer.close();
                Err(CallError::Superseded)
            }
        }
    }

    /// Check a platform result after a suspension point
    fn step<T>(&self, epoch: u64, result: Result<T, PeerError>) -> CallResult<T> {
        if !self.state.lock().is_current(epoch) {
            return Err(CallError::Superseded);
        }
        result.map_err(|e| self.fail(epoch, e))
    }

    /// Abandon the negotiation under `epoch` because the platform failed
    fn fail(&self, epoch: u64, e: PeerError) -> CallError {
        if self.abandon(epoch) {
            warn!("Negotiation failed: {}", e);
            e.into()
        } else {
            CallError::Superseded
        }
    }

    fn abandon(&self, epoch: u64) -> bool {
        let mut st = self.state.lock();
        if !st.is_current(epoch) {
            return false;
        }
        if let Some(negotiation) = st.negotiation.take() {
            negotiation.release();
        }
        true
    }

    /// Turn the negotiation under `epoch` into the live session. Local
    /// candidates stay held until [`Inner::flush_held_candidates`].
    fn commit(&self, epoch: u64, phase: CallPhase) -> CallResult<()> {
        let id = {
            let mut st = self.state.lock();
            if !st.is_current(epoch) {
                return Err(CallError::Superseded);
            }
            let Some(negotiation) = st.negotiation.take() else {
                return Err(CallError::Superseded);
            };
            let call = match negotiation.into_call() {
                Ok(call) => call,
                Err(incomplete) => {
                    incomplete.release();
                    return Err(CallError::invalid_state(
                        "negotiation finished without its handles",
                    ));
                }
            };
            if let Some(stale) = st.session.take() {
                warn!("Replacing unexpected live session {}", stale.id);
                stale.release();
            }
            let (id, role) = (call.id, call.role);
            let remote = call.remote_media.clone();
            st.session = match phase {
                CallPhase::AwaitingAnswer => SessionState::AwaitingAnswer(call),
                _ => SessionState::Connected(call),
            };
            self.events
                .phase_changed(id, role, CallPhase::Idle, st.session.phase());
            if let Some(stream) = remote {
                self.events.publish(CallEvent::RemoteMedia {
                    session_id: id,
                    stream,
                });
            }
            id
        };
        info!("Call {} is {}", id, phase);
        Ok(())
    }

    /// Our description is out: send the held local candidates and stop holding
    async fn flush_held_candidates(&self, epoch: u64) {
        let held = {
            let mut st = self.state.lock();
            if !st.is_current(epoch) {
                return;
            }
            st.session
                .call_mut()
                .and_then(|call| call.held_candidates.take())
                .unwrap_or_default()
        };
        for candidate in held {
            self.send_best_effort(SignalMessage::candidate(candidate))
                .await;
        }
    }

    /// Undo a commit whose description never reached the remote party
    fn roll_back(&self, epoch: u64) {
        let mut st = self.state.lock();
        if st.is_current(epoch) {
            self.teardown_locked(&mut st);
        }
    }

    /// Tear down for `trigger`. Returns whether the remote party should be
    /// told with an `end` payload.
    fn end_session(&self, trigger: Trigger) -> bool {
        let mut st = self.state.lock();
        let phase = st.session.phase();
        let notify = CALL_TABLE
            .get(phase, trigger)
            .map(|t| t.notify_remote)
            .unwrap_or(false);
        if self.teardown_locked(&mut st) {
            info!("Call torn down from {} ({:?})", phase, trigger);
        }
        notify
    }

    /// Release everything and return to Idle. Returns whether anything was live.
    fn teardown_locked(&self, st: &mut ControllerState) -> bool {
        st.epoch += 1;
        st.pending_error = None;
        let had_negotiation = match st.negotiation.take() {
            Some(negotiation) => {
                negotiation.release();
                true
            }
            None => false,
        };
        let previous = st.session.phase();
        match st.session.take() {
            Some(call) => {
                let (id, role) = (call.id, call.role);
                call.release();
                self.events.phase_changed(id, role, previous, CallPhase::Ended);
                self.events.phase_changed(id, role, CallPhase::Ended, CallPhase::Idle);
                true
            }
            None => had_negotiation,
        }
    }

    async fn send_best_effort(&self, message: SignalMessage) {
        let kind = message.kind();
        if let Err(e) = self.relay.send_signal(message).await {
            warn!("Failed to send {} signal: {}", kind, e);
        }
    }
}

async fn apply_candidate(peer: &PeerConnectionHandle, candidate: IceCandidateInit) {
    if let Err(e) = peer.add_ice_candidate(candidate).await {
        error!("Error adding candidate: {}", e);
    }
}
