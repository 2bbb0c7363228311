//! Relay actor.
//!
//! All mutable relay state lives behind one mailbox: connection tasks send
//! [`RelayMessage`]s, the actor applies them in arrival order. Request-reply
//! uses `tokio::sync::oneshot`.

mod messages;
mod relay;

pub use messages::{RelayMessage, RelayStatus};
pub use relay::{RelayActor, RelayActorHandle};
