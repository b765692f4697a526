//! Call state table
//!
//! Single source of truth for which triggers a phase accepts and where they
//! lead. The controller looks up every mutation here before touching the
//! session; a missing entry means the trigger is rejected (local intents) or
//! ignored (remote signals).
//!
//! | Phase          | Trigger         | Next           | Notes                         |
//! |----------------|-----------------|----------------|-------------------------------|
//! | Idle           | StartCall       | AwaitingAnswer | role = Caller                 |
//! | Idle           | RemoteOffer     | Connected      | role = Callee                 |
//! | AwaitingAnswer | RemoteOffer     | Connected      | replaces the pending call     |
//! | Connected      | RemoteOffer     | Connected      | replaces the active call      |
//! | AwaitingAnswer | RemoteAnswer    | Connected      |                               |
//! | AwaitingAnswer | RemoteCandidate | (stay)         |                               |
//! | Connected      | RemoteCandidate | (stay)         |                               |
//! | any            | LocalEnd        | Ended -> Idle  | sends `end`                   |
//! | any            | RemoteEnd       | Ended -> Idle  |                               |
//! | any            | Discard         | Ended -> Idle  | owner dropped, one best-effort `end` |

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// Position of the session in the call state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallPhase {
    /// No session
    Idle,
    /// Offer sent, waiting for the callee's answer
    AwaitingAnswer,
    /// Both descriptions applied
    Connected,
    /// Teardown in progress; never observed between operations
    Ended,
}

impl CallPhase {
    /// Whether a session (and therefore a peer connection) exists
    pub fn has_session(&self) -> bool {
        matches!(self, CallPhase::AwaitingAnswer | CallPhase::Connected)
    }
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How the current session started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallRole {
    Idle,
    Caller,
    Callee,
}

/// Inputs that drive the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    StartCall,
    RemoteOffer,
    RemoteAnswer,
    RemoteCandidate,
    RemoteEnd,
    LocalEnd,
    Discard,
}

/// Lookup key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub phase: CallPhase,
    pub trigger: Trigger,
}

/// What an accepted trigger does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Phase after the trigger completes; `None` stays put
    pub next_phase: Option<CallPhase>,
    /// Release the current session before building the new one
    pub replaces_session: bool,
    /// Send `end` to the remote party
    pub notify_remote: bool,
}

impl Transition {
    fn to(next: CallPhase) -> Self {
        Self {
            next_phase: Some(next),
            replaces_session: false,
            notify_remote: false,
        }
    }

    fn stay() -> Self {
        Self {
            next_phase: None,
            replaces_session: false,
            notify_remote: false,
        }
    }

    fn replacing(mut self) -> Self {
        self.replaces_session = true;
        self
    }

    fn notifying(mut self) -> Self {
        self.notify_remote = true;
        self
    }
}

/// The transition table
#[derive(Debug, Default)]
pub struct StateTable {
    transitions: HashMap<StateKey, Transition>,
}

impl StateTable {
    pub fn get(&self, phase: CallPhase, trigger: Trigger) -> Option<&Transition> {
        self.transitions.get(&StateKey { phase, trigger })
    }

    pub fn accepts(&self, phase: CallPhase, trigger: Trigger) -> bool {
        self.get(phase, trigger).is_some()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    fn add(&mut self, phase: CallPhase, trigger: Trigger, transition: Transition) {
        self.transitions
            .insert(StateKey { phase, trigger }, transition);
    }
}

lazy_static! {
    /// The call state table
    pub static ref CALL_TABLE: StateTable = build_call_table();
}

fn build_call_table() -> StateTable {
    use CallPhase::*;
    use Trigger::*;

    let mut table = StateTable::default();

    // Caller side
    table.add(Idle, StartCall, Transition::to(AwaitingAnswer));
    table.add(AwaitingAnswer, RemoteAnswer, Transition::to(Connected));
    table.add(AwaitingAnswer, RemoteCandidate, Transition::stay());

    // Callee side; a new offer mid-session wins over the old session
    table.add(Idle, RemoteOffer, Transition::to(Connected));
    table.add(AwaitingAnswer, RemoteOffer, Transition::to(Connected).replacing());
    table.add(Connected, RemoteOffer, Transition::to(Connected).replacing());
    table.add(Connected, RemoteCandidate, Transition::stay());

    // Teardown from anywhere, including Idle so in-flight work is cancelled
    for phase in [Idle, AwaitingAnswer, Connected] {
        table.add(phase, LocalEnd, Transition::to(Idle).notifying());
        table.add(phase, RemoteEnd, Transition::to(Idle));
    }
    for phase in [AwaitingAnswer, Connected] {
        table.add(phase, Discard, Transition::to(Idle).notifying());
    }
    table.add(Idle, Discard, Transition::to(Idle));

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_flow() {
        let t = CALL_TABLE.get(CallPhase::Idle, Trigger::StartCall).unwrap();
        assert_eq!(t.next_phase, Some(CallPhase::AwaitingAnswer));
        let t = CALL_TABLE
            .get(CallPhase::AwaitingAnswer, Trigger::RemoteAnswer)
            .unwrap();
        assert_eq!(t.next_phase, Some(CallPhase::Connected));
    }

    #[test]
    fn callee_goes_straight_to_connected() {
        let t = CALL_TABLE.get(CallPhase::Idle, Trigger::RemoteOffer).unwrap();
        assert_eq!(t.next_phase, Some(CallPhase::Connected));
        assert!(!t.replaces_session);
    }

    #[test]
    fn start_call_only_from_idle() {
        assert!(!CALL_TABLE.accepts(CallPhase::AwaitingAnswer, Trigger::StartCall));
        assert!(!CALL_TABLE.accepts(CallPhase::Connected, Trigger::StartCall));
    }

    #[test]
    fn stale_signals_have_no_entry() {
        assert!(!CALL_TABLE.accepts(CallPhase::Idle, Trigger::RemoteAnswer));
        assert!(!CALL_TABLE.accepts(CallPhase::Connected, Trigger::RemoteAnswer));
        assert!(!CALL_TABLE.accepts(CallPhase::Idle, Trigger::RemoteCandidate));
    }

    #[test]
    fn offer_mid_session_replaces() {
        for phase in [CallPhase::AwaitingAnswer, CallPhase::Connected] {
            let t = CALL_TABLE.get(phase, Trigger::RemoteOffer).unwrap();
            assert!(t.replaces_session);
            assert!(!t.notify_remote);
        }
    }

    #[test]
    fn every_phase_can_end() {
        for phase in [CallPhase::Idle, CallPhase::AwaitingAnswer, CallPhase::Connected] {
            let local = CALL_TABLE.get(phase, Trigger::LocalEnd).unwrap();
            assert_eq!(local.next_phase, Some(CallPhase::Idle));
            assert!(local.notify_remote);
            let remote = CALL_TABLE.get(phase, Trigger::RemoteEnd).unwrap();
            assert!(!remote.notify_remote);
        }
    }

    #[test]
    fn discard_notifies_only_live_sessions() {
        assert!(!CALL_TABLE.get(CallPhase::Idle, Trigger::Discard).unwrap().notify_remote);
        assert!(CALL_TABLE.get(CallPhase::Connected, Trigger::Discard).unwrap().notify_remote);
    }

    #[test]
    fn ended_is_never_a_table_source() {
        for trigger in [
            Trigger::StartCall,
            Trigger::RemoteOffer,
            Trigger::RemoteAnswer,
            Trigger::RemoteCandidate,
            Trigger::RemoteEnd,
            Trigger::LocalEnd,
            Trigger::Discard,
        ] {
            assert!(!CALL_TABLE.accepts(CallPhase::Ended, trigger));
        }
    }
}
