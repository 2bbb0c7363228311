//! Parley Signaling Relay
//!
//! Stateful WebSocket server pairing room participants for peer-to-peer
//! media and replicating a shared-notes buffer.
//!
//! # Servers
//!
//! - WebSocket + bootstrap config server (default: 0.0.0.0:5050)
//! - HTTP server for health endpoints (default: 0.0.0.0:8081)
//!
//! # Startup flow
//!
//! 1. Load configuration from environment
//! 2. Spawn the `RelayActor`
//! 3. Start the health HTTP server
//! 4. Start the WebSocket server
//! 5. Wait for shutdown signal, cancel the actor, drain

#![warn(clippy::pedantic)]

use std::sync::Arc;
use std::time::Duration;

use relay_service::actors::RelayActor;
use relay_service::config::Config;
use relay_service::observability::{health_router, HealthState};
use relay_service::ws::{signaling_router, WsState};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for the relay actor to drain on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Parley Signaling Relay");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        relay_id = %config.relay_id,
        bind_address = %config.bind_address,
        health_bind_address = %config.health_bind_address,
        max_room_members = config.max_room_members,
        max_notes_bytes = config.max_notes_bytes,
        ice_servers = ?config.ice_servers,
        "Configuration loaded successfully"
    );

    let health_state = Arc::new(HealthState::new());
    let cancel_token = CancellationToken::new();

    // Spawn the relay actor
    let (relay, relay_task) = RelayActor::spawn(
        config.relay_id.clone(),
        config.max_room_members,
        config.max_notes_bytes,
        cancel_token.clone(),
    );

    // Health server
    let health_listener = tokio::net::TcpListener::bind(&config.health_bind_address).await?;
    info!(address = %config.health_bind_address, "Health server listening");
    let health_app = health_router(Arc::clone(&health_state));
    let health_token = cancel_token.clone();
    let health_task = tokio::spawn(async move {
        let result = axum::serve(health_listener, health_app)
            .with_graceful_shutdown(async move { health_token.cancelled().await })
            .await;
        if let Err(e) = result {
            error!(error = %e, "Health server terminated with error");
        }
    });

    // Signaling server
    let ws_listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Signaling server listening");
    let ws_app = signaling_router(WsState {
        relay: relay.clone(),
        ice_servers: Arc::new(config.ice_servers.clone()),
    })
    .layer(TraceLayer::new_for_http());
    let ws_token = cancel_token.clone();
    let ws_task = tokio::spawn(async move {
        let result = axum::serve(ws_listener, ws_app)
            .with_graceful_shutdown(async move { ws_token.cancelled().await })
            .await;
        if let Err(e) = result {
            error!(error = %e, "Signaling server terminated with error");
        }
    });

    health_state.set_ready();
    info!("Relay ready");

    shutdown_signal().await;
    info!("Shutdown signal received");
    health_state.set_not_ready();
    cancel_token.cancel();

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, relay_task)
        .await
        .is_err()
    {
        warn!("Relay actor did not drain within shutdown timeout");
    }
    let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, health_task).await;
    let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, ws_task).await;

    info!("Relay stopped");
    Ok(())
}

/// Wait for ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
