//! Peer connection manager.
//!
//! Owns every active peer link for one session, keyed by the remote
//! session ID. The manager consumes relay instructions (`initiate`,
//! relayed signals, peer departures) and drives the matching
//! [`PeerTransport`] through offer/answer and candidate application.
//!
//! A failed negotiation step closes the affected link only; the rest of
//! the session is untouched.

use crate::errors::{ClientError, NegotiationError};
use crate::media::{
    IceServerConfig, LocalMedia, NegotiationEvent, Negotiator, PeerTransport, RemoteStream,
};

use signal_protocol::{ClientMessage, SdpKind, SessionId, SignalPayload};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Negotiation progress of one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Negotiating,
    Connected,
}

/// One live peer link.
struct PeerLink {
    transport: Box<dyn PeerTransport>,
    /// Cancels this link's event forwarder.
    cancel: CancellationToken,
    state: LinkState,
}

/// What the owner should do after a transport event was absorbed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkUpdate {
    /// Nothing to surface.
    None,
    /// Remote media arrived; expose it to the presentation layer.
    RemoteMedia(RemoteStream),
    /// The link failed and was closed; remove its surface.
    Removed,
}

/// Manages the set of peer links for one room session.
pub struct PeerManager {
    negotiator: Arc<dyn Negotiator>,
    ice_servers: Vec<IceServerConfig>,
    /// Signaling messages bound for the relay.
    outbound: mpsc::Sender<ClientMessage>,
    /// Multiplexed transport events, tagged with the owning peer.
    events: mpsc::Sender<(SessionId, NegotiationEvent)>,
    /// Parent token for all link forwarders.
    cancel_token: CancellationToken,
    links: HashMap<SessionId, PeerLink>,
}

impl PeerManager {
    pub fn new(
        negotiator: Arc<dyn Negotiator>,
        ice_servers: Vec<IceServerConfig>,
        outbound: mpsc::Sender<ClientMessage>,
        events: mpsc::Sender<(SessionId, NegotiationEvent)>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            negotiator,
            ice_servers,
            outbound,
            events,
            cancel_token,
            links: HashMap::new(),
        }
    }

    /// Number of live links.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Create a link toward `peer_sid`, attaching the local tracks and,
    /// when instructed, producing the offer.
    ///
    /// A duplicate instruction for a peer that already has a link replaces
    /// the old link with a fresh one.
    pub async fn initiate(
        &mut self,
        peer_sid: SessionId,
        create_offer: bool,
        local_media: Option<&Arc<dyn LocalMedia>>,
    ) -> Result<(), ClientError> {
        if self.links.contains_key(&peer_sid) {
            debug!(
                target: "client.peer",
                peer_sid = %peer_sid,
                "Replacing existing link on repeated initiate"
            );
            self.close(peer_sid).await;
        }

        let (mut transport, mut event_rx) = self.negotiator.connect(&self.ice_servers)?;

        if let Some(media) = local_media {
            for track in media.tracks() {
                transport.add_track(track);
            }
        }

        // Forward this transport's events into the shared stream, tagged
        // with the peer they belong to.
        let cancel = self.cancel_token.child_token();
        let forward_cancel = cancel.clone();
        let forward_tx = self.events.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = forward_cancel.cancelled() => break,
                    event = event_rx.recv() => {
                        let Some(event) = event else { break };
                        if forward_tx.send((peer_sid, event)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        if create_offer {
            if let Err(error) = self.run_offer(&mut transport, peer_sid).await {
                warn!(
                    target: "client.peer",
                    peer_sid = %peer_sid,
                    error = %error,
                    "Offer creation failed; dropping link"
                );
                cancel.cancel();
                transport.close().await;
                return Err(error.into());
            }
        }

        self.links.insert(
            peer_sid,
            PeerLink {
                transport,
                cancel,
                state: LinkState::Negotiating,
            },
        );
        Ok(())
    }

    async fn run_offer(
        &self,
        transport: &mut Box<dyn PeerTransport>,
        peer_sid: SessionId,
    ) -> Result<(), NegotiationError> {
        let offer = transport.create_offer().await?;
        transport.set_local_description(offer.clone()).await?;
        self.send_signal(peer_sid, SignalPayload::Sdp { sdp: offer })
            .await;
        Ok(())
    }

    /// Apply a relayed signal from `sender_sid` to its link.
    ///
    /// Signals for unknown peers are dropped. A step failure closes the
    /// link it arrived on.
    pub async fn handle_signal(&mut self, sender_sid: SessionId, payload: SignalPayload) {
        if !self.links.contains_key(&sender_sid) {
            debug!(
                target: "client.peer",
                sender_sid = %sender_sid,
                "Dropping signal for unknown peer"
            );
            return;
        }

        if let Err(error) = self.apply_signal(sender_sid, payload).await {
            warn!(
                target: "client.peer",
                sender_sid = %sender_sid,
                error = %error,
                "Negotiation step failed; closing link"
            );
            self.close(sender_sid).await;
        }
    }

    async fn apply_signal(
        &mut self,
        sender_sid: SessionId,
        payload: SignalPayload,
    ) -> Result<(), NegotiationError> {
        let link = self
            .links
            .get_mut(&sender_sid)
            .ok_or(NegotiationError::Closed)?;

        match payload {
            SignalPayload::Sdp { sdp } => {
                let kind = sdp.kind;
                link.transport.set_remote_description(sdp).await?;
                if kind == SdpKind::Offer {
                    let answer = link.transport.create_answer().await?;
                    link.transport.set_local_description(answer.clone()).await?;
                    self.send_signal(sender_sid, SignalPayload::Sdp { sdp: answer })
                        .await;
                }
            }
            SignalPayload::Candidate { candidate } => {
                link.transport.add_ice_candidate(candidate).await?;
            }
        }
        Ok(())
    }

    /// Absorb one transport event that surfaced on the shared stream.
    pub async fn handle_event(&mut self, peer_sid: SessionId, event: NegotiationEvent) -> LinkUpdate {
        match event {
            NegotiationEvent::LocalCandidate(candidate) => {
                if self.links.contains_key(&peer_sid) {
                    self.send_signal(peer_sid, SignalPayload::Candidate { candidate })
                        .await;
                }
                LinkUpdate::None
            }
            NegotiationEvent::RemoteMedia(stream) => {
                if self.links.contains_key(&peer_sid) {
                    LinkUpdate::RemoteMedia(stream)
                } else {
                    LinkUpdate::None
                }
            }
            NegotiationEvent::Connected => {
                if let Some(link) = self.links.get_mut(&peer_sid) {
                    link.state = LinkState::Connected;
                    debug!(target: "client.peer", peer_sid = %peer_sid, "Peer link connected");
                }
                LinkUpdate::None
            }
            NegotiationEvent::Failed(reason) => {
                if self.links.contains_key(&peer_sid) {
                    warn!(
                        target: "client.peer",
                        peer_sid = %peer_sid,
                        reason = %reason,
                        "Peer link failed"
                    );
                    self.close(peer_sid).await;
                    LinkUpdate::Removed
                } else {
                    LinkUpdate::None
                }
            }
        }
    }

    /// Close one link. No-op if the peer has no link.
    pub async fn close(&mut self, peer_sid: SessionId) {
        if let Some(mut link) = self.links.remove(&peer_sid) {
            link.cancel.cancel();
            link.transport.close().await;
            debug!(target: "client.peer", peer_sid = %peer_sid, "Peer link closed");
        }
    }

    /// Close every link.
    pub async fn close_all(&mut self) {
        let peers: Vec<SessionId> = self.links.keys().copied().collect();
        for peer_sid in peers {
            self.close(peer_sid).await;
        }
    }

    async fn send_signal(&self, target_sid: SessionId, signal: SignalPayload) {
        let message = ClientMessage::Signal { target_sid, signal };
        if self.outbound.send(message).await.is_err() {
            debug!(
                target: "client.peer",
                target_sid = %target_sid,
                "Dropping signal; session channel closed"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::media::{CaptureConstraints, MediaSource};
    use crate::testing::{MockMedia, MockNegotiator};
    use signal_protocol::{IceCandidate, SdpKind, SessionDescription};

    fn new_manager(
        negotiator: Arc<MockNegotiator>,
    ) -> (
        PeerManager,
        mpsc::Receiver<ClientMessage>,
        mpsc::Receiver<(SessionId, NegotiationEvent)>,
    ) {
        let (outbound_tx, outbound_rx) = mpsc::channel(16);
        let (events_tx, events_rx) = mpsc::channel(16);
        let manager = PeerManager::new(
            negotiator,
            vec![IceServerConfig {
                urls: vec!["stun:stun.example.org:3478".to_string()],
            }],
            outbound_tx,
            events_tx,
            CancellationToken::new(),
        );
        (manager, outbound_rx, events_rx)
    }

    fn offer() -> SignalPayload {
        SignalPayload::Sdp {
            sdp: SessionDescription {
                kind: SdpKind::Offer,
                sdp: "v=0 offer".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_initiate_with_offer_sends_offer_signal() {
        let negotiator = Arc::new(MockNegotiator::new());
        let (mut manager, mut outbound_rx, _events_rx) = new_manager(Arc::clone(&negotiator));
        let peer = SessionId::new();

        manager.initiate(peer, true, None).await.unwrap();

        let sent = outbound_rx.recv().await.unwrap();
        match sent {
            ClientMessage::Signal {
                target_sid,
                signal: SignalPayload::Sdp { sdp },
            } => {
                assert_eq!(target_sid, peer);
                assert_eq!(sdp.kind, SdpKind::Offer);
            }
            other => panic!("expected offer signal, got {other:?}"),
        }

        // The offer was also applied locally.
        let probe = negotiator.link(0).unwrap();
        let state = probe.state();
        assert_eq!(state.local.as_ref().unwrap().kind, SdpKind::Offer);
    }

    #[tokio::test]
    async fn test_initiate_without_offer_waits_silently() {
        let negotiator = Arc::new(MockNegotiator::new());
        let (mut manager, mut outbound_rx, _events_rx) = new_manager(Arc::clone(&negotiator));

        manager.initiate(SessionId::new(), false, None).await.unwrap();

        assert_eq!(manager.link_count(), 1);
        assert!(outbound_rx.try_recv().is_err());
        assert!(negotiator.link(0).unwrap().state().local.is_none());
    }

    #[tokio::test]
    async fn test_initiate_attaches_local_tracks() {
        let negotiator = Arc::new(MockNegotiator::new());
        let (mut manager, _outbound_rx, _events_rx) = new_manager(Arc::clone(&negotiator));
        let media = MockMedia::new();
        let local = media.capture(&CaptureConstraints::default()).await.unwrap();

        manager
            .initiate(SessionId::new(), false, Some(&local))
            .await
            .unwrap();

        let probe = negotiator.link(0).unwrap();
        assert_eq!(probe.state().tracks.len(), 2);
    }

    #[tokio::test]
    async fn test_incoming_offer_produces_answer() {
        let negotiator = Arc::new(MockNegotiator::new());
        let (mut manager, mut outbound_rx, _events_rx) = new_manager(Arc::clone(&negotiator));
        let peer = SessionId::new();

        manager.initiate(peer, false, None).await.unwrap();
        manager.handle_signal(peer, offer()).await;

        let sent = outbound_rx.recv().await.unwrap();
        match sent {
            ClientMessage::Signal {
                target_sid,
                signal: SignalPayload::Sdp { sdp },
            } => {
                assert_eq!(target_sid, peer);
                assert_eq!(sdp.kind, SdpKind::Answer);
            }
            other => panic!("expected answer signal, got {other:?}"),
        }

        let probe = negotiator.link(0).unwrap();
        let state = probe.state();
        assert_eq!(state.remote.as_ref().unwrap().kind, SdpKind::Offer);
        assert_eq!(state.local.as_ref().unwrap().kind, SdpKind::Answer);
    }

    #[tokio::test]
    async fn test_incoming_answer_sets_remote_only() {
        let negotiator = Arc::new(MockNegotiator::new());
        let (mut manager, mut outbound_rx, _events_rx) = new_manager(Arc::clone(&negotiator));
        let peer = SessionId::new();

        manager.initiate(peer, true, None).await.unwrap();
        let _offer = outbound_rx.recv().await.unwrap();

        manager
            .handle_signal(
                peer,
                SignalPayload::Sdp {
                    sdp: SessionDescription {
                        kind: SdpKind::Answer,
                        sdp: "v=0 answer".to_string(),
                    },
                },
            )
            .await;

        assert!(outbound_rx.try_recv().is_err());
        let probe = negotiator.link(0).unwrap();
        assert_eq!(probe.state().remote.as_ref().unwrap().kind, SdpKind::Answer);
    }

    #[tokio::test]
    async fn test_candidate_applied_to_link() {
        let negotiator = Arc::new(MockNegotiator::new());
        let (mut manager, _outbound_rx, _events_rx) = new_manager(Arc::clone(&negotiator));
        let peer = SessionId::new();

        manager.initiate(peer, false, None).await.unwrap();
        manager
            .handle_signal(
                peer,
                SignalPayload::Candidate {
                    candidate: IceCandidate {
                        candidate: "candidate:1".to_string(),
                        sdp_mid: Some("0".to_string()),
                        sdp_mline_index: Some(0),
                    },
                },
            )
            .await;

        let probe = negotiator.link(0).unwrap();
        assert_eq!(probe.state().candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_signal_from_unknown_peer_is_dropped() {
        let negotiator = Arc::new(MockNegotiator::new());
        let (mut manager, mut outbound_rx, _events_rx) = new_manager(Arc::clone(&negotiator));

        manager.handle_signal(SessionId::new(), offer()).await;

        assert!(outbound_rx.try_recv().is_err());
        assert_eq!(negotiator.link_count(), 0);
    }

    #[tokio::test]
    async fn test_repeated_initiate_replaces_link() {
        let negotiator = Arc::new(MockNegotiator::new());
        let (mut manager, _outbound_rx, _events_rx) = new_manager(Arc::clone(&negotiator));
        let peer = SessionId::new();

        manager.initiate(peer, false, None).await.unwrap();
        manager.initiate(peer, false, None).await.unwrap();

        assert_eq!(manager.link_count(), 1);
        assert_eq!(negotiator.link_count(), 2);
        assert!(negotiator.link(0).unwrap().state().closed);
        assert!(!negotiator.link(1).unwrap().state().closed);
    }

    #[tokio::test]
    async fn test_failed_negotiation_step_closes_only_that_link() {
        let negotiator = Arc::new(MockNegotiator::new());
        let (mut manager, _outbound_rx, _events_rx) = new_manager(Arc::clone(&negotiator));
        let broken = SessionId::new();
        let healthy = SessionId::new();

        manager.initiate(broken, false, None).await.unwrap();
        manager.initiate(healthy, false, None).await.unwrap();

        negotiator.link(0).unwrap().fail_next_step();
        manager.handle_signal(broken, offer()).await;

        assert_eq!(manager.link_count(), 1);
        assert!(negotiator.link(0).unwrap().state().closed);
        assert!(!negotiator.link(1).unwrap().state().closed);
    }

    #[tokio::test]
    async fn test_local_candidate_event_is_forwarded_to_relay() {
        let negotiator = Arc::new(MockNegotiator::new());
        let (mut manager, mut outbound_rx, _events_rx) = new_manager(Arc::clone(&negotiator));
        let peer = SessionId::new();

        manager.initiate(peer, false, None).await.unwrap();
        let update = manager
            .handle_event(
                peer,
                NegotiationEvent::LocalCandidate(IceCandidate {
                    candidate: "candidate:host".to_string(),
                    sdp_mid: None,
                    sdp_mline_index: None,
                }),
            )
            .await;

        assert_eq!(update, LinkUpdate::None);
        match outbound_rx.recv().await.unwrap() {
            ClientMessage::Signal {
                target_sid,
                signal: SignalPayload::Candidate { candidate },
            } => {
                assert_eq!(target_sid, peer);
                assert_eq!(candidate.candidate, "candidate:host");
            }
            other => panic!("expected candidate signal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_event_removes_link() {
        let negotiator = Arc::new(MockNegotiator::new());
        let (mut manager, _outbound_rx, _events_rx) = new_manager(Arc::clone(&negotiator));
        let peer = SessionId::new();

        manager.initiate(peer, false, None).await.unwrap();
        let update = manager
            .handle_event(peer, NegotiationEvent::Failed("ice failure".to_string()))
            .await;

        assert_eq!(update, LinkUpdate::Removed);
        assert_eq!(manager.link_count(), 0);
        assert!(negotiator.link(0).unwrap().state().closed);
    }

    #[tokio::test]
    async fn test_close_all_is_idempotent() {
        let negotiator = Arc::new(MockNegotiator::new());
        let (mut manager, _outbound_rx, _events_rx) = new_manager(Arc::clone(&negotiator));

        manager.initiate(SessionId::new(), false, None).await.unwrap();
        manager.initiate(SessionId::new(), false, None).await.unwrap();

        manager.close_all().await;
        manager.close_all().await;

        assert_eq!(manager.link_count(), 0);
        assert!(negotiator.link(0).unwrap().state().closed);
        assert!(negotiator.link(1).unwrap().state().closed);
    }

    #[tokio::test]
    async fn test_transport_events_reach_shared_stream() {
        let negotiator = Arc::new(MockNegotiator::new());
        let (mut manager, _outbound_rx, mut events_rx) = new_manager(Arc::clone(&negotiator));
        let peer = SessionId::new();

        manager.initiate(peer, false, None).await.unwrap();
        negotiator
            .link(0)
            .unwrap()
            .emit(NegotiationEvent::Connected)
            .await;

        let (from, event) = events_rx.recv().await.unwrap();
        assert_eq!(from, peer);
        assert!(matches!(event, NegotiationEvent::Connected));
    }
}
