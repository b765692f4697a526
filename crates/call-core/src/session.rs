//! Call session state
//!
//! The session is a tagged union: handles only exist inside the phases that
//! own them, so "peer connection present iff AwaitingAnswer or Connected" and
//! "local media present only while a session is live" hold by construction.
//!
//! Work that has not been committed yet (capture in progress, descriptions
//! being created) lives in a [`Negotiation`] next to the session. Whatever a
//! negotiation already acquired is released by whoever supersedes it.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::platform::{MediaStreamHandle, PeerConnectionHandle};
use crate::signal::IceCandidateInit;
use crate::state_table::{CallPhase, CallRole};

/// Identifier of one call session, for logs and events
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

/// A committed call and the handles it owns
pub(crate) struct ActiveCall {
    pub id: SessionId,
    pub epoch: u64,
    pub role: CallRole,
    pub wants_video: bool,
    pub local_media: MediaStreamHandle,
    pub remote_media: Option<MediaStreamHandle>,
    pub peer: PeerConnectionHandle,
    /// An answer is being applied; duplicates are ignored
    pub answer_in_flight: bool,
    /// Local candidates held until our description has gone out
    pub held_candidates: Option<Vec<IceCandidateInit>>,
}

impl ActiveCall {
    /// Close the transport and stop every track
    pub fn release(self) {
        debug!("Releasing handles of {}", self.id);
        self.peer.close();
        self.local_media.stop();
        if let Some(remote) = self.remote_media {
            remote.stop();
        }
    }
}

/// The session as seen by the state table
pub(crate) enum SessionState {
    Idle,
    AwaitingAnswer(ActiveCall),
    Connected(ActiveCall),
}

impl SessionState {
    pub fn phase(&self) -> CallPhase {
        match self {
            SessionState::Idle => CallPhase::Idle,
            SessionState::AwaitingAnswer(_) => CallPhase::AwaitingAnswer,
            SessionState::Connected(_) => CallPhase::Connected,
        }
    }

    pub fn call(&self) -> Option<&ActiveCall> {
        match self {
            SessionState::Idle => None,
            SessionState::AwaitingAnswer(call) | SessionState::Connected(call) => Some(call),
        }
    }

    pub fn call_mut(&mut self) -> Option<&mut ActiveCall> {
        match self {
            SessionState::Idle => None,
            SessionState::AwaitingAnswer(call) | SessionState::Connected(call) => Some(call),
        }
    }

    /// Leave the session Idle and hand back whatever call it held
    pub fn take(&mut self) -> Option<ActiveCall> {
        match std::mem::replace(self, SessionState::Idle) {
            SessionState::Idle => None,
            SessionState::AwaitingAnswer(call) | SessionState::Connected(call) => Some(call),
        }
    }

    /// Move an AwaitingAnswer session to Connected
    pub fn promote(&mut self) -> bool {
        match std::mem::replace(self, SessionState::Idle) {
            SessionState::AwaitingAnswer(mut call) => {
                call.answer_in_flight = false;
                *self = SessionState::Connected(call);
                true
            }
            other => {
                *self = other;
                false
            }
        }
    }
}

/// An operation that has claimed the session slot but not committed yet
pub(crate) struct Negotiation {
    pub id: SessionId,
    pub epoch: u64,
    pub role: CallRole,
    pub wants_video: bool,
    pub local_media: Option<MediaStreamHandle>,
    pub peer: Option<PeerConnectionHandle>,
    pub remote_media: Option<MediaStreamHandle>,
    /// Local candidates gathered before our description went out
    pub local_candidates: Vec<IceCandidateInit>,
    /// Remote candidates received before the remote description was applied
    pub remote_candidates: Vec<IceCandidateInit>,
    pub remote_described: bool,
}

impl Negotiation {
    pub fn new(epoch: u64, role: CallRole, wants_video: bool) -> Self {
        Self {
            id: SessionId::new(),
            epoch,
            role,
            wants_video,
            local_media: None,
            peer: None,
            remote_media: None,
            local_candidates: Vec::new(),
            remote_candidates: Vec::new(),
            remote_described: false,
        }
    }

    pub fn release(self) {
        debug!("Abandoning negotiation {} (epoch {})", self.id, self.epoch);
        if let Some(peer) = self.peer {
            peer.close();
        }
        if let Some(local) = self.local_media {
            local.stop();
        }
        if let Some(remote) = self.remote_media {
            remote.stop();
        }
    }

    /// Turn a finished negotiation into a committed call.
    ///
    /// Local candidates gathered so far stay held on the call until the
    /// owner flushes them. Hands the negotiation back if it never acquired
    /// its handles.
    pub fn into_call(self) -> Result<ActiveCall, Negotiation> {
        match self {
            Negotiation {
                id,
                epoch,
                role,
                wants_video,
                local_media: Some(local_media),
                peer: Some(peer),
                remote_media,
                local_candidates,
                ..
            } => Ok(ActiveCall {
                id,
                epoch,
                role,
                wants_video,
                local_media,
                remote_media,
                peer,
                answer_in_flight: false,
                held_candidates: Some(local_candidates),
            }),
            incomplete => Err(incomplete),
        }
    }
}

/// Point-in-time view of the controller, for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSnapshot {
    pub session_id: Option<SessionId>,
    pub phase: CallPhase,
    pub role: CallRole,
    pub wants_video: bool,
    pub has_local_media: bool,
    pub has_remote_media: bool,
    pub pending_error: Option<String>,
}

impl CallSnapshot {
    /// A call is on screen
    pub fn is_active(&self) -> bool {
        self.phase.has_session()
    }
}
