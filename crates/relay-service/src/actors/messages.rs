//! Mailbox types for the relay actor.

use crate::registry::RoomInfo;
use signal_protocol::{ClientMessage, ServerMessage, SessionId};
use tokio::sync::{mpsc, oneshot};

/// Messages sent to the `RelayActor`.
#[derive(Debug)]
pub enum RelayMessage {
    /// A client channel connected; register its outbound sender.
    Connected {
        sid: SessionId,
        outbound: mpsc::Sender<ServerMessage>,
    },

    /// A client channel closed for any reason. Treated as an implicit
    /// leave: remaining room members are notified exactly as for an
    /// explicit departure.
    Disconnected { sid: SessionId },

    /// A message arrived from a connected client.
    FromClient {
        sid: SessionId,
        message: ClientMessage,
    },

    /// Get current relay status (for health/debugging).
    Status {
        respond_to: oneshot::Sender<RelayStatus>,
    },
}

/// Snapshot of relay state.
#[derive(Debug, Clone)]
pub struct RelayStatus {
    /// Connected client channels.
    pub client_count: usize,
    /// Live rooms.
    pub room_count: usize,
    /// Per-room summaries.
    pub rooms: Vec<RoomInfo>,
}
