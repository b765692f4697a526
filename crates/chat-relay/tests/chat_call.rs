//! Two parties calling each other through a shared in-memory chat channel

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use vault_call_core::mock::{MockMediaDevices, MockPeerFactory};
use vault_call_core::{CallConfig, CallPhase, CallRole, IceCandidateInit};
use vault_chat_relay::{
    visible_messages, CallChannel, ChatMessage, ChatTransport, RelayConfig, RelayError,
    RelayResult, CALL_PREFIX,
};

/// Channel history shared by every participant
#[derive(Default)]
struct ChatRoom {
    history: Mutex<Vec<ChatMessage>>,
}

impl ChatRoom {
    fn post(&self, sender_id: &str, text: String) {
        let mut history = self.history.lock();
        let id = format!("msg-{}", history.len() + 1);
        history.push(ChatMessage {
            id,
            sender_id: sender_id.to_string(),
            sender_name: sender_id.to_string(),
            text: Some(text),
            created_at: Utc::now(),
        });
    }

    fn snapshot(&self) -> Vec<ChatMessage> {
        self.history.lock().clone()
    }
}

/// One participant's connection to the room
struct Member {
    room: Arc<ChatRoom>,
    user_id: String,
}

#[async_trait]
impl ChatTransport for Member {
    async fn send_message(&self, channel_id: &str, text: String) -> RelayResult<()> {
        if channel_id != "room-1" {
            return Err(RelayError::transport(format!("unknown channel {channel_id}")));
        }
        self.room.post(&self.user_id, text);
        Ok(())
    }
}

struct Participant {
    channel: CallChannel,
    peers: Arc<MockPeerFactory>,
    media: Arc<MockMediaDevices>,
}

fn join(room: &Arc<ChatRoom>, user_id: &str) -> Participant {
    let transport = Arc::new(Member {
        room: Arc::clone(room),
        user_id: user_id.to_string(),
    });
    let media = MockMediaDevices::new();
    let peers = MockPeerFactory::new(user_id);
    let channel = CallChannel::connect(
        transport,
        "room-1",
        user_id,
        &RelayConfig::default(),
        CallConfig::default(),
        media.clone(),
        peers.clone(),
    )
    .unwrap();
    Participant {
        channel,
        peers,
        media,
    }
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Everyone re-reads the history until no new payload is handled
async fn sync(room: &ChatRoom, parties: &[&Participant]) {
    loop {
        settle().await;
        let mut handled = 0;
        for party in parties {
            handled += party.channel.on_messages(&room.snapshot()).await;
        }
        if handled == 0 {
            break;
        }
    }
}

#[tokio::test]
async fn test_call_over_chat_history() {
    let room = Arc::new(ChatRoom::default());
    let alice = join(&room, "alice");
    let bob = join(&room, "bob");
    alice
        .peers
        .gather_candidates(vec![IceCandidateInit::new("candidate:a 1 udp 1 10.0.0.1 5000 typ host")]);
    bob.peers
        .gather_candidates(vec![IceCandidateInit::new("candidate:b 1 udp 1 10.0.0.2 6000 typ host")]);
    room.post("bob", "call me?".to_string());

    alice.channel.controller().start_call(false).await.unwrap();
    sync(&room, &[&alice, &bob]).await;

    assert_eq!(alice.channel.controller().phase(), CallPhase::Connected);
    assert_eq!(bob.channel.controller().phase(), CallPhase::Connected);
    assert_eq!(bob.channel.controller().snapshot().role, CallRole::Callee);
    assert!(!bob.media.requests()[0].video);
    assert_eq!(alice.peers.last().unwrap().added_candidates().len(), 1);
    assert_eq!(bob.peers.last().unwrap().added_candidates().len(), 1);

    bob.channel.controller().end_call().await;
    sync(&room, &[&alice, &bob]).await;

    assert_eq!(alice.channel.controller().phase(), CallPhase::Idle);
    assert_eq!(bob.channel.controller().phase(), CallPhase::Idle);

    // Only the user's own words are shown in the chat view
    let history = room.snapshot();
    let visible = visible_messages(CALL_PREFIX, &history);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].text.as_deref(), Some("call me?"));
    assert!(history.len() > 1);
}

#[tokio::test]
async fn test_replayed_history_is_not_reprocessed() {
    let room = Arc::new(ChatRoom::default());
    let alice = join(&room, "alice");
    let bob = join(&room, "bob");

    alice.channel.controller().start_call(true).await.unwrap();
    sync(&room, &[&alice, &bob]).await;
    assert_eq!(bob.peers.peers().len(), 1);

    // A refetch delivers the same history again
    assert_eq!(bob.channel.on_messages(&room.snapshot()).await, 0);
    assert_eq!(bob.peers.peers().len(), 1);
    assert_eq!(bob.channel.controller().phase(), CallPhase::Connected);
}

#[tokio::test]
async fn test_run_consumes_snapshots() {
    let room = Arc::new(ChatRoom::default());
    let bob = join(&room, "bob");
    room.post(
        "alice",
        r#"__CALL__:{"type":"offer","sdp":"offer:alice-1","video":true}"#.to_string(),
    );
    room.post("alice", "__CALL__:{broken".to_string());

    let snapshots = futures::stream::iter(vec![room.snapshot(), room.snapshot()]);
    bob.channel.run(snapshots).await;
    settle().await;

    assert_eq!(bob.channel.controller().phase(), CallPhase::Connected);
    assert!(bob.channel.controller().snapshot().wants_video);
    assert_eq!(bob.peers.peers().len(), 1);
}

#[tokio::test]
async fn test_hang_up_reaches_callee_stuck_on_capture() {
    let room = Arc::new(ChatRoom::default());
    let bob = join(&room, "bob");
    let gate = bob.media.hold_next();
    room.post(
        "alice",
        r#"__CALL__:{"type":"offer","sdp":"offer:alice-1","video":false}"#.to_string(),
    );

    // Returns while the capture is still pending
    assert_eq!(bob.channel.on_messages(&room.snapshot()).await, 1);
    gate.wait_requested().await;

    room.post("alice", r#"__CALL__:{"type":"end"}"#.to_string());
    assert_eq!(bob.channel.on_messages(&room.snapshot()).await, 1);
    gate.release();
    settle().await;

    assert_eq!(bob.channel.controller().phase(), CallPhase::Idle);
    assert!(bob.media.all_stopped());
    assert!(bob.peers.peers().is_empty());
    assert!(room.snapshot().iter().all(|m| !m.is_from("bob")));
}
