//! End-to-end call flows between two controllers over the scripted platform

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use vault_call_core::mock::{MockMediaDevices, MockPeerFactory, MockStream, RecordingRelay};
use vault_call_core::{
    CallConfig, CallController, CallControllerBuilder, CallEvent, CallPhase, CallRole,
    IceCandidateInit, SignalKind, SignalMessage, TrackKind,
};

struct Party {
    controller: CallController,
    relay: Arc<RecordingRelay>,
    outbox: mpsc::UnboundedReceiver<SignalMessage>,
    media: Arc<MockMediaDevices>,
    peers: Arc<MockPeerFactory>,
}

fn party(name: &str) -> Party {
    let (relay, outbox) = RecordingRelay::forwarding();
    let media = MockMediaDevices::new();
    let peers = MockPeerFactory::new(name);
    let controller = CallControllerBuilder::new()
        .config(CallConfig::default())
        .relay(relay.clone())
        .media_devices(media.clone())
        .peer_factory(peers.clone())
        .build()
        .unwrap();
    Party {
        controller,
        relay,
        outbox,
        media,
        peers,
    }
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Deliver queued payloads both ways until nothing moves
async fn exchange(a: &mut Party, b: &mut Party) {
    loop {
        settle().await;
        let mut moved = false;
        while let Ok(message) = a.outbox.try_recv() {
            b.controller.handle_signal(message).await;
            moved = true;
        }
        while let Ok(message) = b.outbox.try_recv() {
            a.controller.handle_signal(message).await;
            moved = true;
        }
        if !moved {
            break;
        }
    }
}

fn candidate(label: &str, port: u16) -> IceCandidateInit {
    IceCandidateInit::new(format!("candidate:{label} 1 udp 2122260223 10.0.0.1 {port} typ host"))
        .with_mid("0", 0)
}

#[tokio::test]
async fn test_video_call_between_two_parties() {
    let mut alice = party("alice");
    let mut bob = party("bob");
    let alice_candidate = candidate("a1", 5000);
    let bob_candidate = candidate("b1", 6000);
    alice.peers.gather_candidates(vec![alice_candidate.clone()]);
    bob.peers.gather_candidates(vec![bob_candidate.clone()]);

    alice.controller.start_call(true).await.unwrap();
    assert_eq!(alice.controller.phase(), CallPhase::AwaitingAnswer);

    exchange(&mut alice, &mut bob).await;

    assert_eq!(alice.controller.phase(), CallPhase::Connected);
    assert_eq!(bob.controller.phase(), CallPhase::Connected);
    assert_eq!(bob.controller.snapshot().role, CallRole::Callee);
    assert!(bob.controller.snapshot().wants_video);
    assert_eq!(bob.media.requests()[0].video, true);

    assert_eq!(alice.relay.count(SignalKind::Offer), 1);
    assert_eq!(bob.relay.count(SignalKind::Answer), 1);

    let alice_peer = alice.peers.last().unwrap();
    let bob_peer = bob.peers.last().unwrap();
    assert_eq!(alice_peer.added_candidates(), vec![bob_candidate]);
    assert_eq!(bob_peer.added_candidates(), vec![alice_candidate]);
    assert_eq!(
        bob_peer.remote_description().map(|d| d.sdp),
        Some("offer:alice-1".to_string())
    );
    assert_eq!(
        alice_peer.remote_description().map(|d| d.sdp),
        Some("answer:bob-1".to_string())
    );

    alice.controller.end_call().await;
    exchange(&mut alice, &mut bob).await;

    assert_eq!(alice.controller.phase(), CallPhase::Idle);
    assert_eq!(bob.controller.phase(), CallPhase::Idle);
    assert_eq!(alice.relay.count(SignalKind::End), 1);
    assert_eq!(bob.relay.count(SignalKind::End), 0);
    assert!(alice.peers.all_closed() && bob.peers.all_closed());
    assert!(alice.media.all_stopped() && bob.media.all_stopped());
}

#[tokio::test]
async fn test_phase_events_follow_the_call() {
    let alice = party("alice");
    let mut events = alice.controller.subscribe();

    alice.controller.start_call(false).await.unwrap();
    alice
        .controller
        .handle_signal(SignalMessage::answer("answer:bob-1"))
        .await;
    alice.controller.end_call().await;

    let mut phases = Vec::new();
    let mut saw_local_media = false;
    while let Ok(event) = events.try_recv() {
        match event {
            CallEvent::PhaseChanged {
                previous, current, ..
            } => phases.push((previous, current)),
            CallEvent::LocalMedia { .. } => saw_local_media = true,
            _ => {}
        }
    }

    assert!(saw_local_media);
    assert_eq!(
        phases,
        vec![
            (CallPhase::Idle, CallPhase::AwaitingAnswer),
            (CallPhase::AwaitingAnswer, CallPhase::Connected),
            (CallPhase::Connected, CallPhase::Ended),
            (CallPhase::Ended, CallPhase::Idle),
        ]
    );
}

#[tokio::test]
async fn test_remote_track_is_published() {
    let bob = party("bob");
    let mut events = bob.controller.subscribe();
    bob.controller
        .handle_signal(SignalMessage::offer("offer:alice-1", true))
        .await;

    let remote = MockStream::new(vec![TrackKind::Audio, TrackKind::Video]);
    bob.peers.last().unwrap().emit_remote_track(remote.clone());
    settle().await;

    let attached = bob.controller.remote_media().unwrap();
    assert_eq!(attached.track_kinds(), vec![TrackKind::Audio, TrackKind::Video]);
    assert!(bob.controller.snapshot().has_remote_media);

    let mut published = false;
    while let Ok(event) = events.try_recv() {
        if let CallEvent::RemoteMedia { .. } = event {
            published = true;
        }
    }
    assert!(published);

    bob.controller.end_call().await;
    assert!(remote.is_stopped());
}

#[tokio::test]
async fn test_new_offer_replaces_session() {
    let alice = party("alice");
    alice.controller.start_call(false).await.unwrap();
    let first = alice.peers.last().unwrap();

    alice
        .controller
        .handle_signal(SignalMessage::offer("offer:carol-1", true))
        .await;

    assert!(first.is_closed());
    assert!(alice.media.granted()[0].is_stopped());
    assert_eq!(alice.controller.phase(), CallPhase::Connected);
    assert_eq!(alice.controller.snapshot().role, CallRole::Callee);
    assert_eq!(alice.relay.count(SignalKind::Answer), 1);
    assert_eq!(alice.relay.count(SignalKind::End), 0);
    assert_eq!(alice.peers.peers().len(), 2);
}

#[tokio::test]
async fn test_back_to_back_offers_keep_one_session() {
    let bob = party("bob");
    bob.controller
        .handle_signal(SignalMessage::offer("offer:alice-1", false))
        .await;
    bob.controller
        .handle_signal(SignalMessage::offer("offer:alice-2", false))
        .await;

    let peers = bob.peers.peers();
    assert_eq!(peers.len(), 2);
    assert!(peers[0].is_closed());
    assert!(!peers[1].is_closed());
    assert_eq!(bob.controller.phase(), CallPhase::Connected);
    assert_eq!(bob.relay.count(SignalKind::Answer), 2);
}

#[tokio::test]
async fn test_dropping_controller_sends_end() {
    let alice = party("alice");
    alice.controller.start_call(true).await.unwrap();
    let Party {
        controller,
        relay,
        media,
        peers,
        ..
    } = alice;

    drop(controller);
    settle().await;

    assert_eq!(relay.count(SignalKind::End), 1);
    assert!(peers.all_closed());
    assert!(media.all_stopped());
}

#[tokio::test]
async fn test_dropping_idle_controller_is_silent() {
    let alice = party("alice");
    let relay = alice.relay.clone();

    drop(alice);
    settle().await;

    assert!(relay.sent().is_empty());
}

#[tokio::test]
async fn test_builder_requires_platform() {
    let result = CallControllerBuilder::new()
        .relay(RecordingRelay::new())
        .build();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_event_stream_reports_capture_failure() {
    let alice = party("alice");
    let mut events = alice.controller.events();
    alice
        .media
        .deny_next(vault_call_core::MediaError::PermissionDenied);

    assert!(alice.controller.start_call(true).await.is_err());

    match events.next().await {
        Some(Ok(CallEvent::Error { message })) => {
            assert_eq!(message, "Permission denied for camera/microphone");
        }
        other => panic!("expected an error event, got {other:?}"),
    }
    assert_eq!(
        alice.controller.pending_error().as_deref(),
        Some("Permission denied for camera/microphone")
    );
}
