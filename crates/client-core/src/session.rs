//! Room session controller.
//!
//! One actor per session channel. It owns the client-side lifecycle:
//! idle until a join is requested, joining while the relay decides,
//! member while in the room, ended after the meeting terminates. All
//! relay messages, user commands and peer transport events funnel
//! through its run loop, so session state needs no locking.
//!
//! Leaving a room has no wire message; the application drops the
//! session (or cancels it), which closes the channel, and the relay's
//! disconnect path does the rest.

use crate::errors::ClientError;
use crate::media::{
    CaptureConstraints, IceServerConfig, LocalMedia, MediaSource, NegotiationEvent, Negotiator,
    RemoteStream,
};
use crate::peer::{LinkUpdate, PeerManager};

use signal_protocol::{ClientMessage, ServerMessage, SessionId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Depth of the command mailbox.
const SESSION_CHANNEL_BUFFER: usize = 64;
/// Depth of the multiplexed peer transport event stream.
const PEER_EVENT_BUFFER: usize = 256;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Not in a room; a join may be requested.
    Idle,
    /// Join sent, awaiting the relay's verdict.
    Joining,
    /// Active room member.
    Member,
    /// The meeting ended; final state is readable, nothing else works.
    Ended,
}

/// Platform bindings and negotiation parameters for one session.
pub struct SessionConfig {
    pub negotiator: Arc<dyn Negotiator>,
    pub media: Arc<dyn MediaSource>,
    pub ice_servers: Vec<IceServerConfig>,
    pub capture: CaptureConstraints,
}

/// Point-in-time view of session state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub notes: String,
    pub peer_count: usize,
    pub has_local_media: bool,
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Join accepted; `notes` is the room's current shared text.
    Joined { notes: String },
    /// Join rejected (room full or invalid name); back to idle.
    JoinRejected { reason: String },
    /// The shared notes changed remotely.
    NotesChanged { text: String },
    /// A peer link delivered remote media.
    RemoteMediaAdded {
        sid: SessionId,
        stream: RemoteStream,
    },
    /// A peer left, or its link failed; remove its surface.
    PeerRemoved { sid: SessionId },
    /// The meeting ended; `notes` is the final shared text.
    MeetingEnded { notes: String },
    /// Capture failed; the session continues without local media.
    MediaUnavailable { reason: String },
    /// The channel to the relay is gone; the session is over.
    ChannelLost,
}

/// Commands accepted by a running session.
enum SessionCommand {
    Join {
        room: String,
    },
    EditNotes {
        text: String,
    },
    SetNotesFocus {
        focused: bool,
    },
    EndMeeting,
    Snapshot {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
}

/// Handle to a running [`RoomSession`].
#[derive(Clone)]
pub struct RoomSessionHandle {
    sender: mpsc::Sender<SessionCommand>,
    cancel_token: CancellationToken,
}

impl RoomSessionHandle {
    /// Request to join the named room.
    pub async fn join(&self, room: String) -> Result<(), ClientError> {
        self.send(SessionCommand::Join { room }).await
    }

    /// Replace the shared notes with locally edited text.
    pub async fn edit_notes(&self, text: String) -> Result<(), ClientError> {
        self.send(SessionCommand::EditNotes { text }).await
    }

    /// Track whether the local user has the notes editor focused.
    /// Remote notes updates are suppressed while focused.
    pub async fn set_notes_focus(&self, focused: bool) -> Result<(), ClientError> {
        self.send(SessionCommand::SetNotesFocus { focused }).await
    }

    /// Ask the relay to end the meeting for everyone.
    pub async fn end_meeting(&self) -> Result<(), ClientError> {
        self.send(SessionCommand::EndMeeting).await
    }

    /// Snapshot of current session state.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, ClientError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot { respond_to }).await?;
        rx.await.map_err(|_| ClientError::ChannelClosed)
    }

    /// Tear the session down: peer links close, media stops, the
    /// channel drops. This is how a client leaves a room.
    pub fn leave(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn send(&self, command: SessionCommand) -> Result<(), ClientError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| ClientError::ChannelClosed)
    }
}

/// The session actor.
pub struct RoomSession {
    receiver: mpsc::Receiver<SessionCommand>,
    /// Messages from the relay.
    inbound: mpsc::Receiver<ServerMessage>,
    /// Messages to the relay.
    outbound: mpsc::Sender<ClientMessage>,
    /// Notifications to the presentation layer.
    events: mpsc::Sender<SessionEvent>,
    peers: PeerManager,
    peer_events: mpsc::Receiver<(SessionId, NegotiationEvent)>,
    media: Arc<dyn MediaSource>,
    capture: CaptureConstraints,
    local_media: Option<Arc<dyn LocalMedia>>,
    phase: SessionPhase,
    notes: String,
    notes_focused: bool,
    /// Remote notes that arrived between join and acceptance.
    deferred_notes: Vec<String>,
    cancel_token: CancellationToken,
}

impl RoomSession {
    /// Spawn a session actor over an established channel.
    ///
    /// `outbound`/`inbound` are the two directions of the session
    /// channel; `events` receives presentation-layer notifications.
    pub fn spawn(
        config: SessionConfig,
        outbound: mpsc::Sender<ClientMessage>,
        inbound: mpsc::Receiver<ServerMessage>,
        events: mpsc::Sender<SessionEvent>,
        cancel_token: CancellationToken,
    ) -> (RoomSessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (peer_events_tx, peer_events_rx) = mpsc::channel(PEER_EVENT_BUFFER);

        let peers = PeerManager::new(
            config.negotiator,
            config.ice_servers,
            outbound.clone(),
            peer_events_tx,
            cancel_token.clone(),
        );

        let session = Self {
            receiver,
            inbound,
            outbound,
            events,
            peers,
            peer_events: peer_events_rx,
            media: config.media,
            capture: config.capture,
            local_media: None,
            phase: SessionPhase::Idle,
            notes: String::new(),
            notes_focused: false,
            deferred_notes: Vec::new(),
            cancel_token: cancel_token.clone(),
        };

        let task = tokio::spawn(session.run());

        (
            RoomSessionHandle {
                sender,
                cancel_token,
            },
            task,
        )
    }

    #[instrument(skip_all, name = "room_session")]
    async fn run(mut self) {
        debug!(target: "client.session", "Session started");
        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "client.session", "Session cancelled");
                    break;
                }
                command = self.receiver.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command).await;
                }
                message = self.inbound.recv() => {
                    let Some(message) = message else {
                        warn!(target: "client.session", "Session channel lost");
                        self.teardown().await;
                        self.emit(SessionEvent::ChannelLost).await;
                        return;
                    };
                    self.handle_server(message).await;
                }
                peer_event = self.peer_events.recv() => {
                    // The manager holds a sender, so this stays open.
                    if let Some((peer_sid, event)) = peer_event {
                        self.handle_peer_event(peer_sid, event).await;
                    }
                }
            }
        }
        self.teardown().await;
        debug!(target: "client.session", "Session stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Join { room } => self.handle_join(room).await,
            SessionCommand::EditNotes { text } => self.handle_edit_notes(text).await,
            SessionCommand::SetNotesFocus { focused } => {
                self.notes_focused = focused;
            }
            SessionCommand::EndMeeting => {
                if self.phase == SessionPhase::Member {
                    self.send(ClientMessage::EndMeeting).await;
                } else {
                    debug!(target: "client.session", phase = ?self.phase, "Ignoring end_meeting");
                }
            }
            SessionCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(SessionSnapshot {
                    phase: self.phase,
                    notes: self.notes.clone(),
                    peer_count: self.peers.link_count(),
                    has_local_media: self.local_media.is_some(),
                });
            }
        }
    }

    async fn handle_join(&mut self, room: String) {
        if self.phase != SessionPhase::Idle {
            debug!(target: "client.session", phase = ?self.phase, "Ignoring join");
            return;
        }

        // Capture before joining so tracks exist when initiate
        // instructions arrive. A denial degrades to receive-only.
        match self.media.capture(&self.capture).await {
            Ok(stream) => self.local_media = Some(stream),
            Err(error) => {
                warn!(target: "client.session", error = %error, "Local media unavailable");
                self.emit(SessionEvent::MediaUnavailable {
                    reason: error.to_string(),
                })
                .await;
            }
        }

        self.deferred_notes.clear();
        self.phase = SessionPhase::Joining;
        info!(target: "client.session", room = %room, "Joining room");
        self.send(ClientMessage::Join { room }).await;
    }

    async fn handle_edit_notes(&mut self, text: String) {
        if self.phase != SessionPhase::Member {
            debug!(target: "client.session", phase = ?self.phase, "Ignoring notes edit");
            return;
        }
        self.notes = text.clone();
        self.send(ClientMessage::NotesUpdate { text }).await;
    }

    async fn handle_server(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::RoomState { notes } => {
                if self.phase != SessionPhase::Joining {
                    debug!(target: "client.session", phase = ?self.phase, "Ignoring room_state");
                    return;
                }
                self.phase = SessionPhase::Member;
                // Updates that raced the join snapshot are newer than it.
                self.notes = notes;
                if let Some(latest) = self.deferred_notes.pop() {
                    self.notes = latest;
                }
                self.deferred_notes.clear();
                info!(target: "client.session", "Join accepted");
                self.emit(SessionEvent::Joined {
                    notes: self.notes.clone(),
                })
                .await;
            }
            ServerMessage::RoomFull { message } | ServerMessage::RoomError { message } => {
                if self.phase != SessionPhase::Joining {
                    return;
                }
                info!(target: "client.session", reason = %message, "Join rejected");
                self.phase = SessionPhase::Idle;
                self.deferred_notes.clear();
                self.release_media();
                self.emit(SessionEvent::JoinRejected { reason: message }).await;
            }
            ServerMessage::InitiatePeerConnection {
                peer_sid,
                create_offer,
            } => {
                if self.phase != SessionPhase::Member {
                    debug!(
                        target: "client.session",
                        phase = ?self.phase,
                        "Ignoring initiate_peer_connection"
                    );
                    return;
                }
                info!(
                    target: "client.session",
                    peer_sid = %peer_sid,
                    create_offer,
                    "Initiating peer link"
                );
                if let Err(error) = self
                    .peers
                    .initiate(peer_sid, create_offer, self.local_media.as_ref())
                    .await
                {
                    warn!(
                        target: "client.session",
                        peer_sid = %peer_sid,
                        error = %error,
                        "Peer link setup failed"
                    );
                    self.emit(SessionEvent::PeerRemoved { sid: peer_sid }).await;
                }
            }
            ServerMessage::Signal { sender_sid, signal } => {
                self.peers.handle_signal(sender_sid, signal).await;
            }
            ServerMessage::PeerLeft { sid } => {
                self.peers.close(sid).await;
                self.emit(SessionEvent::PeerRemoved { sid }).await;
            }
            ServerMessage::NotesUpdate { text } => self.handle_notes_update(text).await,
            ServerMessage::MeetingEnded { notes } => {
                info!(target: "client.session", "Meeting ended");
                self.phase = SessionPhase::Ended;
                self.notes = notes.clone();
                self.teardown().await;
                self.emit(SessionEvent::MeetingEnded { notes }).await;
            }
        }
    }

    async fn handle_notes_update(&mut self, text: String) {
        match self.phase {
            SessionPhase::Joining => self.deferred_notes.push(text),
            SessionPhase::Member => {
                if self.notes_focused {
                    // The local editor wins while the user is typing.
                    debug!(target: "client.session", "Suppressing remote notes while focused");
                    return;
                }
                self.notes = text.clone();
                self.emit(SessionEvent::NotesChanged { text }).await;
            }
            SessionPhase::Idle | SessionPhase::Ended => {
                debug!(target: "client.session", phase = ?self.phase, "Ignoring notes_update");
            }
        }
    }

    async fn handle_peer_event(&mut self, peer_sid: SessionId, event: NegotiationEvent) {
        match self.peers.handle_event(peer_sid, event).await {
            LinkUpdate::None => {}
            LinkUpdate::RemoteMedia(stream) => {
                self.emit(SessionEvent::RemoteMediaAdded {
                    sid: peer_sid,
                    stream,
                })
                .await;
            }
            LinkUpdate::Removed => {
                self.emit(SessionEvent::PeerRemoved { sid: peer_sid }).await;
            }
        }
    }

    /// Close all peer links and release capture devices.
    async fn teardown(&mut self) {
        self.peers.close_all().await;
        self.release_media();
    }

    fn release_media(&mut self) {
        if let Some(media) = self.local_media.take() {
            media.stop();
        }
    }

    async fn send(&self, message: ClientMessage) {
        if self.outbound.send(message).await.is_err() {
            // The inbound side closing will surface ChannelLost.
            debug!(target: "client.session", "Dropping message; channel closed");
        }
    }

    async fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event).await;
    }
}
