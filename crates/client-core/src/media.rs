//! Capability traits at the platform seam.
//!
//! The session controller and peer manager are written against these
//! traits so the protocol logic never touches a concrete media stack.
//! A browser embedding implements them over its WebRTC objects; tests
//! implement them with inspectable in-memory doubles.

use crate::errors::{MediaError, NegotiationError};

use async_trait::async_trait;
use signal_protocol::{IceCandidate, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Requested capture parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

/// Whether a track carries audio or video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// One captured or received media track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
}

/// A remote participant's media, as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub tracks: Vec<MediaTrack>,
}

/// One ICE server entry handed to the negotiation backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
}

/// A live set of local capture tracks.
///
/// `stop` releases the underlying devices and must be idempotent.
pub trait LocalMedia: Send + Sync {
    fn tracks(&self) -> Vec<MediaTrack>;
    fn stop(&self);
}

/// Acquires local capture media.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn capture(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn LocalMedia>, MediaError>;
}

/// Asynchronous notifications from one peer transport.
#[derive(Debug, Clone)]
pub enum NegotiationEvent {
    /// The transport gathered a local ICE candidate to forward.
    LocalCandidate(IceCandidate),

    /// Remote media arrived on the link.
    RemoteMedia(RemoteStream),

    /// Connectivity established.
    Connected,

    /// The link failed and will not recover.
    Failed(String),
}

/// One peer link's negotiation surface.
///
/// Mirrors the operations an `RTCPeerConnection` exposes, narrowed to
/// what the session controller actually drives.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_offer(&mut self) -> Result<SessionDescription, NegotiationError>;
    async fn create_answer(&mut self) -> Result<SessionDescription, NegotiationError>;
    async fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError>;
    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError>;
    async fn add_ice_candidate(&mut self, candidate: IceCandidate)
        -> Result<(), NegotiationError>;

    /// Attach a local track for sending. Must precede the offer/answer
    /// that should carry it.
    fn add_track(&mut self, track: MediaTrack);

    /// Tear the link down. Idempotent.
    async fn close(&mut self);
}

/// Creates peer transports.
pub trait Negotiator: Send + Sync {
    /// Build one transport plus the receiver for its asynchronous events.
    fn connect(
        &self,
        ice_servers: &[IceServerConfig],
    ) -> Result<(Box<dyn PeerTransport>, mpsc::Receiver<NegotiationEvent>), NegotiationError>;
}
