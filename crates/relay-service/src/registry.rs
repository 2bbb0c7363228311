//! Room membership and shared-notes state.
//!
//! `RoomRegistry` is the single source of truth for which session is in
//! which room. It is owned by the relay actor and only mutated through the
//! methods here, so membership changes are applied atomically with respect
//! to concurrent join/leave/end traffic: the actor loop is the per-room
//! critical section.
//!
//! Invariants:
//! - a session identifier belongs to at most one room at a time
//! - member order is join order (the earlier member of a pair is the one
//!   assigned the offer-creation role by the relay)
//! - an empty room does not exist: the last leave destroys it

use crate::errors::RelayError;
use signal_protocol::{RoomName, SessionId};
use std::collections::HashMap;
use tracing::debug;

/// One live room.
#[derive(Debug)]
struct Room {
    /// Members in join order.
    members: Vec<SessionId>,
    /// Shared notes buffer, replicated to every member. Last writer wins.
    notes: String,
    /// Creation timestamp (unix seconds).
    created_at: i64,
}

/// Result of a successful join.
#[derive(Debug)]
pub struct JoinOutcome {
    /// The validated room name.
    pub room: RoomName,
    /// Snapshot of the room's notes at join time.
    pub notes: String,
    /// Members that were present before this join, in join order.
    pub peers: Vec<SessionId>,
    /// True when the session was already a member of this room and the
    /// join changed nothing. The relay re-sends the room snapshot but must
    /// not re-issue peer-connection instructions.
    pub rejoined: bool,
    /// Set when joining implied leaving a different room first.
    pub vacated: Option<LeaveOutcome>,
}

/// Result of removing a session from its room.
#[derive(Debug)]
pub struct LeaveOutcome {
    /// The vacated room.
    pub room: RoomName,
    /// Members remaining after the departure. Empty means the room was
    /// destroyed.
    pub remaining: Vec<SessionId>,
}

/// Final snapshot of a terminated room.
#[derive(Debug)]
pub struct EndedRoom {
    pub room: RoomName,
    /// Notes text at the moment of termination.
    pub notes: String,
    /// Every member at the moment of termination, including the trigger.
    pub members: Vec<SessionId>,
}

/// Fan-out targets for a notes update.
#[derive(Debug)]
pub struct NotesFanout {
    pub room: RoomName,
    /// Every member except the sender.
    pub recipients: Vec<SessionId>,
}

/// Per-room summary for status reporting.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room: RoomName,
    pub member_count: usize,
    pub created_at: i64,
}

/// Owned collections mapping room names to member sets and shared state.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: HashMap<RoomName, Room>,
    sid_to_room: HashMap<SessionId, RoomName>,
    max_members: usize,
    max_notes_bytes: usize,
}

impl RoomRegistry {
    /// Create an empty registry with the given per-room capacity and
    /// notes size bound.
    #[must_use]
    pub fn new(max_members: usize, max_notes_bytes: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            sid_to_room: HashMap::new(),
            max_members,
            max_notes_bytes,
        }
    }

    /// Add a session to the named room, creating the room if absent.
    ///
    /// Re-joining the current room is idempotent. Joining while a member
    /// of a different room leaves that room first; the departure is
    /// reported in `vacated` so the caller can notify the old room.
    ///
    /// # Errors
    ///
    /// `RelayError::InvalidRoom` when the name fails validation,
    /// `RelayError::RoomFull` when the room is at capacity. Neither
    /// changes any state.
    pub fn join(&mut self, sid: SessionId, raw_name: &str) -> Result<JoinOutcome, RelayError> {
        let name = RoomName::parse(raw_name)?;

        if self.sid_to_room.get(&sid) == Some(&name) {
            // Idempotent membership: the member set is unchanged.
            let room = self
                .rooms
                .get(&name)
                .ok_or_else(|| RelayError::Internal("membership index out of sync".to_string()))?;
            return Ok(JoinOutcome {
                room: name.clone(),
                notes: room.notes.clone(),
                peers: room.members.iter().copied().filter(|m| *m != sid).collect(),
                rejoined: true,
                vacated: None,
            });
        }

        // Capacity is checked before any state changes so that a rejected
        // join leaves the session's existing membership intact.
        if let Some(room) = self.rooms.get(&name) {
            if room.members.len() >= self.max_members {
                return Err(RelayError::RoomFull);
            }
        }

        let vacated = self.leave(sid);

        let room = self.rooms.entry(name.clone()).or_insert_with(|| Room {
            members: Vec::new(),
            notes: String::new(),
            created_at: chrono::Utc::now().timestamp(),
        });
        let peers = room.members.clone();
        room.members.push(sid);
        let notes = room.notes.clone();
        self.sid_to_room.insert(sid, name.clone());

        debug!(
            target: "relay.registry",
            room = %name,
            sid = %sid,
            members = room.members.len(),
            "Session joined room"
        );

        Ok(JoinOutcome {
            room: name,
            notes,
            peers,
            rejoined: false,
            vacated,
        })
    }

    /// Remove a session from whatever room it occupies, destroying the
    /// room if it becomes empty. Returns `None` when the session is not
    /// in any room.
    pub fn leave(&mut self, sid: SessionId) -> Option<LeaveOutcome> {
        let name = self.sid_to_room.remove(&sid)?;
        let room = self.rooms.get_mut(&name)?;
        room.members.retain(|m| *m != sid);
        let remaining = room.members.clone();

        if remaining.is_empty() {
            self.rooms.remove(&name);
            debug!(target: "relay.registry", room = %name, "Room destroyed (last member left)");
        } else {
            debug!(
                target: "relay.registry",
                room = %name,
                sid = %sid,
                remaining = remaining.len(),
                "Session left room"
            );
        }

        Some(LeaveOutcome {
            room: name,
            remaining,
        })
    }

    /// Terminate the named room: capture a final snapshot and destroy it.
    ///
    /// Idempotent; ending a nonexistent (or already-ended) room is a no-op
    /// returning `None`.
    pub fn end_room(&mut self, name: &RoomName) -> Option<EndedRoom> {
        let room = self.rooms.remove(name)?;
        for member in &room.members {
            self.sid_to_room.remove(member);
        }
        debug!(
            target: "relay.registry",
            room = %name,
            members = room.members.len(),
            "Room ended"
        );
        Some(EndedRoom {
            room: name.clone(),
            notes: room.notes,
            members: room.members,
        })
    }

    /// Terminate the room the given session occupies, if any.
    pub fn end_for(&mut self, sid: SessionId) -> Option<EndedRoom> {
        let name = self.sid_to_room.get(&sid)?.clone();
        self.end_room(&name)
    }

    /// Replace the notes of the sender's room verbatim.
    ///
    /// Fails silently (returns `None`) when the sender is not in a room or
    /// the text exceeds the size bound.
    pub fn update_notes(&mut self, sender: SessionId, text: &str) -> Option<NotesFanout> {
        if text.len() > self.max_notes_bytes {
            debug!(
                target: "relay.registry",
                sid = %sender,
                len = text.len(),
                max = self.max_notes_bytes,
                "Oversized notes update ignored"
            );
            return None;
        }
        let name = self.sid_to_room.get(&sender)?.clone();
        let room = self.rooms.get_mut(&name)?;
        room.notes.clear();
        room.notes.push_str(text);
        Some(NotesFanout {
            recipients: room
                .members
                .iter()
                .copied()
                .filter(|m| *m != sender)
                .collect(),
            room: name,
        })
    }

    /// The room a session currently occupies.
    #[must_use]
    pub fn room_of(&self, sid: SessionId) -> Option<&RoomName> {
        self.sid_to_room.get(&sid)
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Member count of the named room, if it exists.
    #[must_use]
    pub fn member_count(&self, name: &RoomName) -> Option<usize> {
        self.rooms.get(name).map(|r| r.members.len())
    }

    /// Current notes of the named room, if it exists.
    #[must_use]
    pub fn notes(&self, name: &RoomName) -> Option<&str> {
        self.rooms.get(name).map(|r| r.notes.as_str())
    }

    /// Per-room summaries for status reporting.
    #[must_use]
    pub fn room_infos(&self) -> Vec<RoomInfo> {
        self.rooms
            .iter()
            .map(|(name, room)| RoomInfo {
                room: name.clone(),
                member_count: room.members.len(),
                created_at: room.created_at,
            })
            .collect()
    }
}
