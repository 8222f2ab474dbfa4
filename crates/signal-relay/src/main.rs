//! Signal Relay
//!
//! Role-based WebSocket signaling relay for peer-to-peer connection setup.
//!
//! # Servers
//!
//! - WebSocket server for peer signaling (default: 0.0.0.0:8080)
//! - Ops HTTP server for health, metrics and the admin API (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Initialize tracing
//! 2. Load configuration from environment
//! 3. Initialize Prometheus metrics recorder
//! 4. Initialize actor system (`RoomDispatcherActorHandle`)
//! 5. Start ops HTTP server (liveness, readiness, metrics, admin)
//! 6. Start WebSocket signaling server
//! 7. Mark ready and wait for shutdown signal

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use signal_relay::actors::{ActorMetrics, DispatcherSettings, RoomDispatcherActorHandle};
use signal_relay::config::{Config, LogFormat};
use signal_relay::observability::{init_metrics_recorder, HealthState};
use signal_relay::transport::{ops_router, signaling_router, AppState};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting Signal Relay");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        health_bind_address = %config.health_bind_address,
        ice_servers = config.ice_server_urls.len(),
        role_connections = config.role_connections.len(),
        max_rooms = config.max_rooms,
        peer_channel_buffer = config.peer_channel_buffer,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());

    // Initialize actor system
    info!("Initializing actor system...");
    let actor_metrics = ActorMetrics::new();
    let dispatcher = Arc::new(RoomDispatcherActorHandle::new(
        DispatcherSettings::new(config.room_options(), config.max_rooms),
        Arc::clone(&actor_metrics),
    ));
    info!("Actor system initialized");

    // Child of the dispatcher's token so a dispatcher shutdown also stops the listeners
    let shutdown_token = dispatcher.child_token();

    // Start ops HTTP server (MUST succeed - fail startup if it doesn't)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let ops_app = ops_router(
        Arc::clone(&health_state),
        prometheus_handle,
        Arc::clone(&dispatcher),
    );

    // Bind listener BEFORE spawning to fail fast on bind errors
    let ops_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind ops server");
            format!("Failed to bind ops server to {health_addr}: {e}")
        })?;
    info!(addr = %health_addr, "Ops server bound successfully");

    let ops_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %health_addr, "Ops server starting");
        let server = axum::serve(ops_listener, ops_app).with_graceful_shutdown(async move {
            ops_shutdown_token.cancelled().await;
            info!("Ops server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Ops server failed");
        }
    });

    // Start WebSocket signaling server
    let ws_addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        format!("Invalid bind address: {e}")
    })?;

    let ws_app = signaling_router(AppState {
        dispatcher: Arc::clone(&dispatcher),
        metrics: Arc::clone(&actor_metrics),
        peer_channel_buffer: config.peer_channel_buffer,
    })
    .layer(TraceLayer::new_for_http());

    let ws_listener = tokio::net::TcpListener::bind(ws_addr).await.map_err(|e| {
        error!(error = %e, addr = %ws_addr, "Failed to bind signaling server");
        format!("Failed to bind signaling server to {ws_addr}: {e}")
    })?;
    info!(addr = %ws_addr, "Signaling server bound successfully");

    let ws_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %ws_addr, "Signaling server starting");
        let server = axum::serve(ws_listener, ws_app).with_graceful_shutdown(async move {
            ws_shutdown_token.cancelled().await;
            info!("Signaling server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Signaling server failed");
        }
    });

    health_state.set_ready();
    info!("Signal Relay running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so load balancers stop sending peers
    health_state.set_not_ready();

    shutdown_token.cancel();

    // Drain rooms; this also cancels every open socket
    let deadline = Duration::from_secs(config.shutdown_timeout_seconds);
    if let Err(e) = dispatcher.shutdown(deadline).await {
        warn!(error = %e, "Actor system shutdown error");
    }

    let drain_deadline = tokio::time::Instant::now() + deadline;
    while actor_metrics.room_count() > 0 && tokio::time::Instant::now() < drain_deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    info!(
        rooms_remaining = actor_metrics.room_count(),
        "Room drain finished"
    );

    info!("Signal Relay shutdown complete");
    Ok(())
}

/// Install the global subscriber. `RELAY_LOG_FORMAT` is read here directly
/// because logging starts before configuration is validated.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "signal_relay=debug,relay=debug,tower_http=debug".into());

    let format = std::env::var("RELAY_LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse::<LogFormat>().ok())
        .unwrap_or_default();

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
