//! Relay error types.
//!
//! Validation failures are terminal for the triggering request only and
//! never affect other room members. Internal details are logged server-side
//! and kept out of client-facing messages.

use signal_protocol::RoomNameError;
use thiserror::Error;

/// Signaling relay error type.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Room name failed validation.
    #[error("invalid room: {0}")]
    InvalidRoom(#[from] RoomNameError),

    /// Room exists and is at capacity.
    #[error("room is full")]
    RoomFull,

    /// Actor mailbox or response channel failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Client-safe message for join rejections.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RelayError::InvalidRoom(reason) => reason.to_string(),
            RelayError::RoomFull => "Room is full".to_string(),
            RelayError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}
