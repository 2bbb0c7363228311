//! Inspectable test doubles for the platform capability traits.
//!
//! Compiled for this crate's own tests and, behind the `test-utils`
//! feature, for consumers' integration tests. Every double records what
//! was done to it so tests assert on observed state instead of timing.

use crate::errors::{MediaError, NegotiationError};
use crate::media::{
    CaptureConstraints, IceServerConfig, LocalMedia, MediaSource, MediaTrack, NegotiationEvent,
    Negotiator, PeerTransport, TrackKind,
};

use async_trait::async_trait;
use signal_protocol::{IceCandidate, SdpKind, SessionDescription};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Event channel depth per mock transport.
const MOCK_EVENT_BUFFER: usize = 32;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything a [`MockTransport`] has been asked to do.
#[derive(Debug, Clone, Default)]
pub struct MockTransportState {
    pub local: Option<SessionDescription>,
    pub remote: Option<SessionDescription>,
    pub candidates: Vec<IceCandidate>,
    pub tracks: Vec<MediaTrack>,
    pub closed: bool,
    /// When set, the next fallible step errors and clears the flag.
    pub fail_next: bool,
    descriptions_created: u32,
}

/// Handle for inspecting and driving one mock transport from a test.
#[derive(Clone)]
pub struct MockLinkProbe {
    state: Arc<Mutex<MockTransportState>>,
    events: mpsc::Sender<NegotiationEvent>,
}

impl MockLinkProbe {
    /// Snapshot of the transport's recorded state.
    #[must_use]
    pub fn state(&self) -> MockTransportState {
        lock(&self.state).clone()
    }

    /// Make the next negotiation step on this transport fail.
    pub fn fail_next_step(&self) {
        lock(&self.state).fail_next = true;
    }

    /// Emit a transport event, as the platform would.
    pub async fn emit(&self, event: NegotiationEvent) {
        let _ = self.events.send(event).await;
    }
}

/// In-memory [`PeerTransport`].
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransport {
    fn step(&self) -> Result<(), NegotiationError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(NegotiationError::Closed);
        }
        if state.fail_next {
            state.fail_next = false;
            return Err(NegotiationError::Backend("mock step failure".to_string()));
        }
        Ok(())
    }

    fn describe(&self, kind: SdpKind) -> SessionDescription {
        let mut state = lock(&self.state);
        state.descriptions_created += 1;
        let n = state.descriptions_created;
        SessionDescription {
            kind,
            sdp: format!("v=0 mock-{n}"),
        }
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn create_offer(&mut self) -> Result<SessionDescription, NegotiationError> {
        self.step()?;
        Ok(self.describe(SdpKind::Offer))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, NegotiationError> {
        self.step()?;
        Ok(self.describe(SdpKind::Answer))
    }

    async fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.step()?;
        lock(&self.state).local = Some(description);
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.step()?;
        lock(&self.state).remote = Some(description);
        Ok(())
    }

    async fn add_ice_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<(), NegotiationError> {
        self.step()?;
        lock(&self.state).candidates.push(candidate);
        Ok(())
    }

    fn add_track(&mut self, track: MediaTrack) {
        lock(&self.state).tracks.push(track);
    }

    async fn close(&mut self) {
        lock(&self.state).closed = true;
    }
}

/// [`Negotiator`] that records every transport it hands out.
#[derive(Default)]
pub struct MockNegotiator {
    links: Mutex<Vec<MockLinkProbe>>,
    /// When set, `connect` itself fails.
    refuse: AtomicBool,
}

impl MockNegotiator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `connect` call fail.
    pub fn refuse_connections(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    /// Number of transports created so far.
    #[must_use]
    pub fn link_count(&self) -> usize {
        lock(&self.links).len()
    }

    /// Probe for the `index`-th transport, in creation order.
    #[must_use]
    pub fn link(&self, index: usize) -> Option<MockLinkProbe> {
        lock(&self.links).get(index).cloned()
    }
}

impl Negotiator for MockNegotiator {
    fn connect(
        &self,
        _ice_servers: &[IceServerConfig],
    ) -> Result<(Box<dyn PeerTransport>, mpsc::Receiver<NegotiationEvent>), NegotiationError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(NegotiationError::Backend(
                "mock negotiator refused".to_string(),
            ));
        }
        let state = Arc::new(Mutex::new(MockTransportState::default()));
        let (events_tx, events_rx) = mpsc::channel(MOCK_EVENT_BUFFER);
        lock(&self.links).push(MockLinkProbe {
            state: Arc::clone(&state),
            events: events_tx,
        });
        Ok((Box::new(MockTransport { state }), events_rx))
    }
}

/// One captured mock stream: an audio and a video track.
pub struct MockLocalMedia {
    tracks: Vec<MediaTrack>,
    stopped: AtomicBool,
}

impl MockLocalMedia {
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl LocalMedia for MockLocalMedia {
    fn tracks(&self) -> Vec<MediaTrack> {
        self.tracks.clone()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// [`MediaSource`] that hands out inspectable capture streams.
#[derive(Default)]
pub struct MockMedia {
    streams: Mutex<Vec<Arc<MockLocalMedia>>>,
    deny: AtomicBool,
}

impl MockMedia {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose every capture attempt is denied.
    #[must_use]
    pub fn unavailable() -> Self {
        let media = Self::default();
        media.deny.store(true, Ordering::SeqCst);
        media
    }

    /// Number of streams handed out so far.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        lock(&self.streams).len()
    }

    /// True when every handed-out stream has been stopped.
    #[must_use]
    pub fn all_stopped(&self) -> bool {
        lock(&self.streams).iter().all(|s| s.is_stopped())
    }
}

#[async_trait]
impl MediaSource for MockMedia {
    async fn capture(
        &self,
        _constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn LocalMedia>, MediaError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied);
        }
        let stream_no = self.stream_count();
        let stream = Arc::new(MockLocalMedia {
            tracks: vec![
                MediaTrack {
                    id: format!("mock-audio-{stream_no}"),
                    kind: TrackKind::Audio,
                },
                MediaTrack {
                    id: format!("mock-video-{stream_no}"),
                    kind: TrackKind::Video,
                },
            ],
            stopped: AtomicBool::new(false),
        });
        lock(&self.streams).push(Arc::clone(&stream));
        Ok(stream)
    }
}
