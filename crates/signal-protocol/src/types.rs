//! Identifiers shared by the relay and clients.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Maximum accepted room name length, in characters.
pub const MAX_ROOM_NAME_LEN: usize = 64;

/// Opaque identifier for one connected client channel.
///
/// Assigned by the relay when a channel connects and valid for the
/// lifetime of that connection. Used as the foreign key everywhere a
/// participant is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A validated room name.
///
/// Room names are user supplied; validation happens once, at the relay,
/// and the rest of the system only ever sees the validated form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RoomName(String);

/// Why a raw room name was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomNameError {
    /// Empty after trimming surrounding whitespace.
    #[error("room name is empty")]
    Empty,

    /// Longer than [`MAX_ROOM_NAME_LEN`] characters.
    #[error("room name exceeds {MAX_ROOM_NAME_LEN} characters")]
    TooLong,

    /// Contains a character outside `[A-Za-z0-9._-]`.
    #[error("room name contains invalid character {0:?}")]
    InvalidChar(char),
}

impl RoomName {
    /// Validate a raw, user-supplied room name.
    ///
    /// Surrounding whitespace is trimmed; the trimmed name must be
    /// non-empty, at most [`MAX_ROOM_NAME_LEN`] characters, and restricted
    /// to ASCII alphanumerics plus `.`, `_` and `-`.
    pub fn parse(raw: &str) -> Result<Self, RoomNameError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RoomNameError::Empty);
        }
        if trimmed.chars().count() > MAX_ROOM_NAME_LEN {
            return Err(RoomNameError::TooLong);
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(RoomNameError::InvalidChar(bad));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The validated name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_uniqueness() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_room_name_accepts_reasonable_names() {
        for name in ["standup", "team-42", "a", "daily_sync.v2", "X"] {
            let parsed = RoomName::parse(name).unwrap();
            assert_eq!(parsed.as_str(), name);
        }
    }

    #[test]
    fn test_room_name_trims_whitespace() {
        let parsed = RoomName::parse("  standup \n").unwrap();
        assert_eq!(parsed.as_str(), "standup");
    }

    #[test]
    fn test_room_name_rejects_empty() {
        assert_eq!(RoomName::parse(""), Err(RoomNameError::Empty));
        assert_eq!(RoomName::parse("   "), Err(RoomNameError::Empty));
    }

    #[test]
    fn test_room_name_rejects_too_long() {
        let long = "x".repeat(MAX_ROOM_NAME_LEN + 1);
        assert_eq!(RoomName::parse(&long), Err(RoomNameError::TooLong));

        let max = "x".repeat(MAX_ROOM_NAME_LEN);
        assert!(RoomName::parse(&max).is_ok());
    }

    #[test]
    fn test_room_name_rejects_invalid_chars() {
        assert_eq!(
            RoomName::parse("stand up"),
            Err(RoomNameError::InvalidChar(' '))
        );
        assert_eq!(
            RoomName::parse("room/1"),
            Err(RoomNameError::InvalidChar('/'))
        );
        assert_eq!(
            RoomName::parse("caf\u{e9}"),
            Err(RoomNameError::InvalidChar('\u{e9}'))
        );
    }
}
