//! Message envelopes exchanged over a session channel.
//!
//! Every frame is one named event: `{"event": "join", "data": {"room":
//! "standup"}}`. [`ClientMessage`] flows client to relay, [`ServerMessage`]
//! relay to client; `signal` appears in both directions with the addressing
//! field rewritten by the relay (`target_sid` in, `sender_sid` out).
//!
//! The relay never interprets a [`SignalPayload`]; only the two clients at
//! either end of a peer link do.

use crate::types::SessionId;
use serde::{Deserialize, Serialize};

/// Messages sent from a client to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request to join the named room. The name is validated relay-side.
    Join { room: String },

    /// Opaque negotiation payload addressed to another session.
    Signal {
        target_sid: SessionId,
        signal: SignalPayload,
    },

    /// Full-text replacement of the room's shared notes.
    NotesUpdate { text: String },

    /// Request termination of the sender's current room.
    EndMeeting,
}

/// Messages sent from the relay to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join accepted; snapshot of the room's current notes.
    RoomState { notes: String },

    /// Join rejected: the room is at capacity.
    RoomFull { message: String },

    /// Join rejected: the room name failed validation.
    RoomError { message: String },

    /// Instruction to create a peer link toward `peer_sid`.
    ///
    /// Exactly one side of each pair receives `create_offer: true` (the
    /// member that was already in the room when the other arrived), so
    /// exactly one offer is produced per pair.
    InitiatePeerConnection {
        peer_sid: SessionId,
        create_offer: bool,
    },

    /// Relayed negotiation payload, tagged with its origin.
    Signal {
        sender_sid: SessionId,
        signal: SignalPayload,
    },

    /// A room member left or disconnected.
    PeerLeft { sid: SessionId },

    /// Another member replaced the shared notes.
    NotesUpdate { text: String },

    /// The meeting ended; final notes snapshot. The room is gone.
    MeetingEnded { notes: String },
}

/// Opaque negotiation payload: either a session description or an ICE
/// candidate, matching the two shapes browsers emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalPayload {
    Sdp { sdp: SessionDescription },
    Candidate { candidate: IceCandidate },
}

/// One half of the offer/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

/// Which half of the exchange a description is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A connectivity-assistance datum, forwarded verbatim between peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u32>,
}
