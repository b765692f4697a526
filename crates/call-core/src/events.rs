//! Events published by the controller for UI integration

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::platform::MediaStreamHandle;
use crate::session::SessionId;
use crate::state_table::{CallPhase, CallRole};

/// Something observable happened to the call
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// The session moved between phases
    PhaseChanged {
        session_id: SessionId,
        role: CallRole,
        previous: CallPhase,
        current: CallPhase,
    },

    /// Local capture is ready to be previewed
    LocalMedia {
        session_id: SessionId,
        stream: MediaStreamHandle,
    },

    /// The remote party's stream arrived
    RemoteMedia {
        session_id: SessionId,
        stream: MediaStreamHandle,
    },

    /// A user-visible failure (capture could not be acquired)
    Error { message: String },
}

/// Stream of controller events; lagging receivers see `Err(Lagged)` items
pub type CallEventStream = BroadcastStream<CallEvent>;

pub(crate) struct EventPublisher {
    tx: broadcast::Sender<CallEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.tx.subscribe()
    }

    /// Publish; having no subscribers is fine
    pub fn publish(&self, event: CallEvent) {
        let _ = self.tx.send(event);
    }

    pub fn phase_changed(
        &self,
        session_id: SessionId,
        role: CallRole,
        previous: CallPhase,
        current: CallPhase,
    ) {
        self.publish(CallEvent::PhaseChanged {
            session_id,
            role,
            previous,
            current,
        });
    }
}
