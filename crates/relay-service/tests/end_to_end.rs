//! End-to-end tests: real client sessions against a real relay actor,
//! wired over in-memory channels instead of WebSockets. Media and
//! negotiation use the inspectable doubles from `client_core::testing`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use client_core::testing::{MockMedia, MockNegotiator};
use client_core::{
    CaptureConstraints, IceServerConfig, MediaSource, NegotiationEvent, Negotiator, RemoteStream,
    RoomSession, RoomSessionHandle, SessionConfig, SessionEvent, SessionPhase,
};
use relay_service::actors::{RelayActor, RelayActorHandle};
use signal_protocol::{ClientMessage, IceCandidate, SdpKind, SessionId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Client {
    sid: SessionId,
    handle: RoomSessionHandle,
    events: mpsc::Receiver<SessionEvent>,
    negotiator: Arc<MockNegotiator>,
    media: Arc<MockMedia>,
}

impl Client {
    async fn event(&mut self) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed")
    }

    async fn join(&mut self, room: &str) {
        self.handle.join(room.to_string()).await.unwrap();
        match self.event().await {
            SessionEvent::Joined { .. } => {}
            other => panic!("expected Joined, got {other:?}"),
        }
    }
}

/// Connect a full client session to the relay over in-memory pumps, the
/// way the WebSocket layer would.
async fn attach(relay: &RelayActorHandle) -> Client {
    let sid = SessionId::new();

    let (server_tx, server_rx) = mpsc::channel(64);
    relay.connected(sid, server_tx).await.unwrap();

    let (client_tx, mut client_rx) = mpsc::channel::<ClientMessage>(64);
    let pump_relay = relay.clone();
    tokio::spawn(async move {
        while let Some(message) = client_rx.recv().await {
            if pump_relay.from_client(sid, message).await.is_err() {
                break;
            }
        }
        // Channel gone: the session left or died.
        let _ = pump_relay.disconnected(sid).await;
    });

    let negotiator = Arc::new(MockNegotiator::new());
    let media = Arc::new(MockMedia::new());
    let (event_tx, event_rx) = mpsc::channel(64);
    let (handle, _task) = RoomSession::spawn(
        SessionConfig {
            negotiator: Arc::clone(&negotiator) as Arc<dyn Negotiator>,
            media: Arc::clone(&media) as Arc<dyn MediaSource>,
            ice_servers: vec![IceServerConfig {
                urls: vec!["stun:stun.example.org:3478".to_string()],
            }],
            capture: CaptureConstraints::default(),
        },
        client_tx,
        server_rx,
        event_tx,
        CancellationToken::new(),
    );

    Client {
        sid,
        handle,
        events: event_rx,
        negotiator,
        media,
    }
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

fn spawn_relay(max_members: usize) -> RelayActorHandle {
    let (relay, _task) = RelayActor::spawn(
        "relay-e2e".to_string(),
        max_members,
        64 * 1024,
        CancellationToken::new(),
    );
    relay
}

#[tokio::test]
async fn test_two_party_meeting_full_lifecycle() {
    let relay = spawn_relay(2);

    let mut a = attach(&relay).await;
    a.join("standup").await;

    // B arrives; the pair negotiates through the relay. A was already
    // in the room, so A produces the offer and B the answer.
    let mut b = attach(&relay).await;
    b.join("standup").await;

    wait_until("offer/answer exchange to settle", || {
        let a_done = a
            .negotiator
            .link(0)
            .is_some_and(|l| l.state().remote.is_some_and(|d| d.kind == SdpKind::Answer));
        let b_done = b
            .negotiator
            .link(0)
            .is_some_and(|l| l.state().remote.is_some_and(|d| d.kind == SdpKind::Offer));
        a_done && b_done
    })
    .await;

    // Both sides attached their capture tracks before negotiating.
    assert_eq!(a.negotiator.link(0).unwrap().state().tracks.len(), 2);
    assert_eq!(b.negotiator.link(0).unwrap().state().tracks.len(), 2);

    // A's gathered candidate crosses the relay into B's transport.
    a.negotiator
        .link(0)
        .unwrap()
        .emit(NegotiationEvent::LocalCandidate(IceCandidate {
            candidate: "candidate:host-a".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        }))
        .await;
    wait_until("candidate to reach the peer", || {
        b.negotiator
            .link(0)
            .is_some_and(|l| l.state().candidates.len() == 1)
    })
    .await;

    // A third participant is turned away without disturbing the pair.
    let mut c = attach(&relay).await;
    c.handle.join("standup".to_string()).await.unwrap();
    match c.event().await {
        SessionEvent::JoinRejected { .. } => {}
        other => panic!("expected JoinRejected, got {other:?}"),
    }
    assert_eq!(c.handle.snapshot().await.unwrap().phase, SessionPhase::Idle);
    assert!(c.media.all_stopped());

    // Shared notes replicate to the other member only.
    a.handle.edit_notes("hi".to_string()).await.unwrap();
    match b.event().await {
        SessionEvent::NotesChanged { text } => assert_eq!(text, "hi"),
        other => panic!("expected NotesChanged, got {other:?}"),
    }

    // Either member may end the meeting; everyone, including the
    // trigger, receives the final notes and tears down.
    b.handle.end_meeting().await.unwrap();
    for client in [&mut a, &mut b] {
        match client.event().await {
            SessionEvent::MeetingEnded { notes } => assert_eq!(notes, "hi"),
            other => panic!("expected MeetingEnded, got {other:?}"),
        }
        let snapshot = client.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Ended);
        assert_eq!(snapshot.notes, "hi");
        assert_eq!(snapshot.peer_count, 0);
        assert!(client.media.all_stopped());
        assert!(client.negotiator.link(0).unwrap().state().closed);
    }

    relay.cancel();
}

#[tokio::test]
async fn test_remote_media_surfaces_across_the_relay() {
    let relay = spawn_relay(2);
    let mut a = attach(&relay).await;
    a.join("screening").await;
    let mut b = attach(&relay).await;
    b.join("screening").await;

    wait_until("links on both sides", || {
        a.negotiator.link_count() == 1 && b.negotiator.link_count() == 1
    })
    .await;

    b.negotiator
        .link(0)
        .unwrap()
        .emit(NegotiationEvent::RemoteMedia(RemoteStream { tracks: vec![] }))
        .await;

    match b.event().await {
        SessionEvent::RemoteMediaAdded { sid, .. } => assert_eq!(sid, a.sid),
        other => panic!("expected RemoteMediaAdded, got {other:?}"),
    }
    relay.cancel();
}

#[tokio::test]
async fn test_leaving_client_is_announced_to_the_peer() {
    let relay = spawn_relay(2);
    let mut a = attach(&relay).await;
    a.join("standup").await;
    let mut b = attach(&relay).await;
    b.join("standup").await;

    wait_until("links on both sides", || {
        a.negotiator.link_count() == 1 && b.negotiator.link_count() == 1
    })
    .await;

    // B closes its session; the relay notices the channel drop and
    // tells A, which tears down its half of the link.
    let b_sid = b.sid;
    b.handle.leave();

    match a.event().await {
        SessionEvent::PeerRemoved { sid } => assert_eq!(sid, b_sid),
        other => panic!("expected PeerRemoved, got {other:?}"),
    }
    assert!(b.media.all_stopped());
    wait_until("A's link to close", || {
        a.negotiator.link(0).is_some_and(|l| l.state().closed)
    })
    .await;
    assert_eq!(a.handle.snapshot().await.unwrap().peer_count, 0);
    relay.cancel();
}

#[tokio::test]
async fn test_rejected_client_can_join_elsewhere() {
    let relay = spawn_relay(2);
    let mut a = attach(&relay).await;
    a.join("busy").await;
    let mut b = attach(&relay).await;
    b.join("busy").await;

    let mut c = attach(&relay).await;
    c.handle.join("busy".to_string()).await.unwrap();
    match c.event().await {
        SessionEvent::JoinRejected { .. } => {}
        other => panic!("expected JoinRejected, got {other:?}"),
    }

    // Back to idle, so a second attempt at a free room succeeds.
    c.join("overflow").await;
    assert_eq!(
        c.handle.snapshot().await.unwrap().phase,
        SessionPhase::Member
    );
    relay.cancel();
}
