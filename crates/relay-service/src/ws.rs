//! WebSocket binding for the session channel.
//!
//! Each accepted socket becomes one session: the connection task assigns a
//! fresh [`SessionId`], registers an outbound sender with the relay actor,
//! then pumps frames both ways until the socket closes. Socket close or
//! error feeds the relay's disconnect path, which doubles as the implicit
//! leave.
//!
//! `GET /config` serves the ICE server list so clients build their
//! negotiation objects from relay configuration instead of hard-coding it.

use crate::actors::RelayActorHandle;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use signal_protocol::{ClientMessage, ServerMessage, SessionId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Buffer size for each client's outbound channel.
const CLIENT_OUTBOUND_BUFFER: usize = 64;

/// Shared router state.
#[derive(Clone)]
pub struct WsState {
    pub relay: RelayActorHandle,
    pub ice_servers: Arc<Vec<String>>,
}

/// Bootstrap configuration served to clients.
#[derive(Debug, Serialize)]
struct ClientBootstrap {
    ice_servers: Vec<String>,
}

/// Router exposing the signaling socket and client bootstrap config.
pub fn signaling_router(state: WsState) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/config", get(client_config))
        .with_state(state)
}

async fn client_config(State(state): State<WsState>) -> Json<ClientBootstrap> {
    Json(ClientBootstrap {
        ice_servers: state.ice_servers.as_ref().clone(),
    })
}

async fn ws_upgrade(State(state): State<WsState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state.relay, socket))
}

/// Drive one client connection to completion.
async fn handle_socket(relay: RelayActorHandle, socket: WebSocket) {
    let sid = SessionId::new();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(CLIENT_OUTBOUND_BUFFER);

    if relay.connected(sid, outbound_tx).await.is_err() {
        // Relay is shutting down; nothing to serve.
        return;
    }

    debug!(target: "relay.ws", sid = %sid, "WebSocket session opened");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Outbound pump: relay -> socket, one JSON text frame per message.
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(text) => {
                    if ws_tx.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!(target: "relay.ws", error = %error, "Failed to encode server message");
                }
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    // Inbound pump: socket -> relay. A malformed frame is terminal for
    // that frame only.
    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    if relay.from_client(sid, message).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!(
                        target: "relay.ws",
                        sid = %sid,
                        error = %error,
                        "Ignoring malformed client frame"
                    );
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // binary/ping/pong: nothing to do
            Err(error) => {
                debug!(target: "relay.ws", sid = %sid, error = %error, "WebSocket read error");
                break;
            }
        }
    }

    let _ = relay.disconnected(sid).await;
    writer.abort();
    debug!(target: "relay.ws", sid = %sid, "WebSocket session closed");
}
