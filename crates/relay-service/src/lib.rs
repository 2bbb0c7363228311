//! Parley Signaling Relay library.
//!
//! The relay is the stateful half of Parley's signaling plane:
//!
//! - Pairs arriving participants in named rooms and assigns the
//!   offer-creation role so exactly one offer is produced per pair
//! - Forwards opaque SDP/ICE payloads between session identifiers
//! - Replicates the room's shared-notes buffer (last writer wins)
//! - Tracks room capacity and lifecycle, including meeting termination
//!
//! # Architecture
//!
//! A single `RelayActor` owns all mutable state:
//!
//! ```text
//! RelayActor (singleton per relay instance)
//! ├── RoomRegistry        room membership, notes, capacity
//! └── client channels     one outbound sender per connected session
//! ```
//!
//! Every WebSocket connection gets its own task that feeds the actor's
//! mailbox and pumps the outbound channel back to the socket; membership
//! changes are therefore serialized on the actor loop, which is what makes
//! concurrent joins against a nearly-full room safe.
//!
//! # Modules
//!
//! - [`actors`] - the relay actor and its mailbox types
//! - [`registry`] - room membership and shared-notes state
//! - [`ws`] - axum WebSocket binding and client bootstrap config
//! - [`config`] - service configuration from environment
//! - [`errors`] - relay error types
//! - [`observability`] - health endpoints

pub mod actors;
pub mod config;
pub mod errors;
pub mod observability;
pub mod registry;
pub mod ws;
