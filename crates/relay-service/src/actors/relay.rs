//! `RelayActor` - singleton actor that owns all signaling state.
//!
//! The actor:
//! - Owns the [`RoomRegistry`] (membership, notes, capacity)
//! - Owns one outbound sender per connected client channel
//! - Translates registry outcomes into addressed [`ServerMessage`]s
//! - Forwards opaque peer-to-peer signal payloads by session identifier
//!
//! Because every membership mutation passes through this mailbox, a join
//! racing a capacity-reaching join is serialized: at most `max_members`
//! sessions ever join a room successfully.

use crate::errors::RelayError;
use crate::registry::RoomRegistry;

use super::messages::{RelayMessage, RelayStatus};

use signal_protocol::{ClientMessage, ServerMessage, SessionId, SignalPayload};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the relay mailbox.
const RELAY_CHANNEL_BUFFER: usize = 1000;

/// Handle to the `RelayActor`.
///
/// Cloned into every connection task; all methods are async and go through
/// the actor mailbox.
#[derive(Clone)]
pub struct RelayActorHandle {
    sender: mpsc::Sender<RelayMessage>,
    cancel_token: CancellationToken,
}

impl RelayActorHandle {
    /// Register a newly connected client channel.
    pub async fn connected(
        &self,
        sid: SessionId,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Result<(), RelayError> {
        self.sender
            .send(RelayMessage::Connected { sid, outbound })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))
    }

    /// Notify the relay that a client channel closed.
    pub async fn disconnected(&self, sid: SessionId) -> Result<(), RelayError> {
        self.sender
            .send(RelayMessage::Disconnected { sid })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))
    }

    /// Deliver a message received from a client.
    pub async fn from_client(
        &self,
        sid: SessionId,
        message: ClientMessage,
    ) -> Result<(), RelayError> {
        self.sender
            .send(RelayMessage::FromClient { sid, message })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))
    }

    /// Get current relay status.
    pub async fn status(&self) -> Result<RelayStatus, RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RelayMessage::Status { respond_to: tx })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the relay actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `RelayActor` implementation.
pub struct RelayActor {
    /// Relay instance ID (for logging).
    relay_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<RelayMessage>,
    /// Cancellation token for graceful shutdown.
    cancel_token: CancellationToken,
    /// Outbound sender per connected session.
    clients: HashMap<SessionId, mpsc::Sender<ServerMessage>>,
    /// Room membership and shared-notes state.
    registry: RoomRegistry,
}

impl RelayActor {
    /// Spawn the relay actor.
    ///
    /// Returns a handle and the task join handle.
    #[must_use]
    pub fn spawn(
        relay_id: String,
        max_room_members: usize,
        max_notes_bytes: usize,
        cancel_token: CancellationToken,
    ) -> (RelayActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(RELAY_CHANNEL_BUFFER);

        let actor = Self {
            relay_id,
            receiver,
            cancel_token: cancel_token.clone(),
            clients: HashMap::new(),
            registry: RoomRegistry::new(max_room_members, max_notes_bytes),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RelayActorHandle {
            sender,
            cancel_token,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "relay.actor", fields(relay_id = %self.relay_id))]
    async fn run(mut self) {
        info!(target: "relay.actor", relay_id = %self.relay_id, "RelayActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "relay.actor",
                        relay_id = %self.relay_id,
                        clients = self.clients.len(),
                        rooms = self.registry.room_count(),
                        "RelayActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            info!(
                                target: "relay.actor",
                                relay_id = %self.relay_id,
                                "RelayActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(target: "relay.actor", relay_id = %self.relay_id, "RelayActor stopped");
    }

    /// Handle a single mailbox message.
    async fn handle_message(&mut self, message: RelayMessage) {
        match message {
            RelayMessage::Connected { sid, outbound } => {
                debug!(target: "relay.actor", sid = %sid, "Client channel connected");
                self.clients.insert(sid, outbound);
            }

            RelayMessage::Disconnected { sid } => {
                self.handle_disconnect(sid).await;
            }

            RelayMessage::FromClient { sid, message } => match message {
                ClientMessage::Join { room } => self.handle_join(sid, &room).await,
                ClientMessage::Signal { target_sid, signal } => {
                    self.handle_signal(sid, target_sid, signal).await;
                }
                ClientMessage::NotesUpdate { text } => self.handle_notes_update(sid, text).await,
                ClientMessage::EndMeeting => self.handle_end_meeting(sid).await,
            },

            RelayMessage::Status { respond_to } => {
                let _ = respond_to.send(RelayStatus {
                    client_count: self.clients.len(),
                    room_count: self.registry.room_count(),
                    rooms: self.registry.room_infos(),
                });
            }
        }
    }

    /// Handle a join request.
    ///
    /// On success the joiner gets the room snapshot, and each prior member
    /// is paired with the newcomer: the prior member (already present, so
    /// it cannot also be told to wait) creates the offer, the newcomer
    /// answers. On failure only the joiner hears about it.
    #[instrument(skip_all, fields(sid = %sid))]
    async fn handle_join(&mut self, sid: SessionId, raw_room: &str) {
        match self.registry.join(sid, raw_room) {
            Ok(outcome) => {
                if let Some(vacated) = &outcome.vacated {
                    for member in &vacated.remaining {
                        self.send_to(*member, ServerMessage::PeerLeft { sid }).await;
                    }
                }

                self.send_to(
                    sid,
                    ServerMessage::RoomState {
                        notes: outcome.notes.clone(),
                    },
                )
                .await;

                if !outcome.rejoined {
                    for member in &outcome.peers {
                        self.send_to(
                            *member,
                            ServerMessage::InitiatePeerConnection {
                                peer_sid: sid,
                                create_offer: true,
                            },
                        )
                        .await;
                        self.send_to(
                            sid,
                            ServerMessage::InitiatePeerConnection {
                                peer_sid: *member,
                                create_offer: false,
                            },
                        )
                        .await;
                    }
                }

                info!(
                    target: "relay.actor",
                    room = %outcome.room,
                    prior_members = outcome.peers.len(),
                    rejoined = outcome.rejoined,
                    "Session joined room"
                );
            }
            Err(err @ RelayError::RoomFull) => {
                debug!(target: "relay.actor", room = raw_room, "Join rejected: room full");
                self.send_to(
                    sid,
                    ServerMessage::RoomFull {
                        message: err.client_message(),
                    },
                )
                .await;
            }
            Err(err) => {
                debug!(
                    target: "relay.actor",
                    room = raw_room,
                    error = %err,
                    "Join rejected: invalid room"
                );
                self.send_to(
                    sid,
                    ServerMessage::RoomError {
                        message: err.client_message(),
                    },
                )
                .await;
            }
        }
    }

    /// Forward an opaque signal payload to its target, tagged with the
    /// sender. Unknown or disconnected targets drop the message silently;
    /// that is not an error to the sender.
    async fn handle_signal(&mut self, sender: SessionId, target: SessionId, signal: SignalPayload) {
        if self.clients.contains_key(&target) {
            self.send_to(
                target,
                ServerMessage::Signal {
                    sender_sid: sender,
                    signal,
                },
            )
            .await;
        } else {
            debug!(
                target: "relay.actor",
                sender = %sender,
                recipient = %target,
                "Dropping signal for unknown session"
            );
        }
    }

    /// Broadcast a notes replacement to every other member of the
    /// sender's room.
    async fn handle_notes_update(&mut self, sender: SessionId, text: String) {
        let Some(fanout) = self.registry.update_notes(sender, &text) else {
            debug!(target: "relay.actor", sid = %sender, "Notes update from session not in a room");
            return;
        };
        for member in fanout.recipients {
            self.send_to(member, ServerMessage::NotesUpdate { text: text.clone() })
                .await;
        }
    }

    /// Terminate the sender's room: every member, including the trigger,
    /// receives the final notes snapshot, then the room is destroyed.
    #[instrument(skip_all, fields(sid = %sid))]
    async fn handle_end_meeting(&mut self, sid: SessionId) {
        let Some(ended) = self.registry.end_for(sid) else {
            debug!(target: "relay.actor", "End meeting from session not in a room");
            return;
        };

        info!(
            target: "relay.actor",
            room = %ended.room,
            members = ended.members.len(),
            "Meeting ended"
        );

        for member in ended.members {
            self.send_to(
                member,
                ServerMessage::MeetingEnded {
                    notes: ended.notes.clone(),
                },
            )
            .await;
        }
    }

    /// Handle a channel disconnect: same membership path as an explicit
    /// leave, plus departure notices to the remaining members.
    async fn handle_disconnect(&mut self, sid: SessionId) {
        self.clients.remove(&sid);

        if let Some(outcome) = self.registry.leave(sid) {
            info!(
                target: "relay.actor",
                sid = %sid,
                room = %outcome.room,
                remaining = outcome.remaining.len(),
                "Session disconnected, left room"
            );
            for member in outcome.remaining {
                self.send_to(member, ServerMessage::PeerLeft { sid }).await;
            }
        } else {
            debug!(target: "relay.actor", sid = %sid, "Session disconnected (not in a room)");
        }
    }

    /// Send a message to one client's outbound channel. A closed channel
    /// (client vanished mid-dispatch) is logged and otherwise ignored;
    /// the disconnect path will clean up.
    async fn send_to(&self, sid: SessionId, message: ServerMessage) {
        if let Some(outbound) = self.clients.get(&sid) {
            if outbound.send(message).await.is_err() {
                warn!(
                    target: "relay.actor",
                    sid = %sid,
                    "Client outbound channel closed mid-send"
                );
            }
        } else {
            debug!(
                target: "relay.actor",
                sid = %sid,
                "Dropping message for unregistered session"
            );
        }
    }
}
