//! Error types for the client core.

use thiserror::Error;

/// Why local media capture failed or was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// The user or platform denied access to capture devices.
    #[error("media capture permission denied")]
    PermissionDenied,

    /// No capture device matched the requested constraints.
    #[error("no capture device available")]
    NoDevice,

    /// Backend-specific failure.
    #[error("media backend error: {0}")]
    Backend(String),
}

/// Why a peer negotiation step failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// A description or candidate was applied in a state that does not
    /// accept it.
    #[error("invalid negotiation state: {0}")]
    InvalidState(String),

    /// Backend-specific failure.
    #[error("negotiation backend error: {0}")]
    Backend(String),

    /// The underlying transport was already closed.
    #[error("peer transport closed")]
    Closed,
}

/// Errors surfaced by session-level operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),

    /// The channel to the relay is gone.
    #[error("session channel closed")]
    ChannelClosed,
}
