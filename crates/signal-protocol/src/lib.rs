//! Parley signaling wire protocol.
//!
//! Pure data crate shared by the relay and the client: session/room
//! identifiers, the message envelopes exchanged over a session channel,
//! and the opaque SDP/ICE signal payload relayed between peers.
//!
//! Messages serialize as `{"event": "...", "data": {...}}` frames so a
//! single text frame maps to one named event on the channel.

#![warn(clippy::pedantic)]

pub mod messages;
pub mod types;

pub use messages::{
    ClientMessage, IceCandidate, ServerMessage, SessionDescription, SdpKind, SignalPayload,
};
pub use types::{RoomName, RoomNameError, SessionId, MAX_ROOM_NAME_LEN};
