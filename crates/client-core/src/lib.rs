//! Parley client core.
//!
//! Protocol-side logic for a meeting client, written against capability
//! traits so it runs identically under a real WebRTC stack or in-memory
//! test doubles:
//!
//! - [`session::RoomSession`]: the per-channel actor owning the join
//!   lifecycle, shared notes and peer set
//! - [`peer::PeerManager`]: one peer link per remote session, driven by
//!   relay instructions and relayed signals
//! - [`media`]: the traits a platform embedding implements
//!
//! ```text
//!  presentation layer
//!        | commands            ^ SessionEvent
//!        v                     |
//!   +---------------------------------+
//!   |          RoomSession            |
//!   |  phase / notes / PeerManager    |
//!   +---------------------------------+
//!        | ClientMessage       ^ ServerMessage
//!        v                     |
//!            session channel (relay)
//! ```

pub mod errors;
pub mod media;
pub mod peer;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use errors::{ClientError, MediaError, NegotiationError};
pub use media::{
    CaptureConstraints, IceServerConfig, LocalMedia, MediaSource, MediaTrack, NegotiationEvent,
    Negotiator, PeerTransport, RemoteStream, TrackKind,
};
pub use peer::PeerManager;
pub use session::{
    RoomSession, RoomSessionHandle, SessionConfig, SessionEvent, SessionPhase, SessionSnapshot,
};
