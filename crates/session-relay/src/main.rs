//! Session Relay
//!
//! Real-time session relay over WebSockets.
//!
//! # Servers
//!
//! - WebSocket gateway for clients (default: 0.0.0.0:8000, path `/ws`)
//! - HTTP server for health endpoints and metrics (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing
//! 3. Initialize Prometheus metrics recorder
//! 4. Spawn the relay actor
//! 5. Start health HTTP server (liveness, readiness, metrics)
//! 6. Start WebSocket gateway, then mark ready
//! 7. Wait for shutdown signal

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use session_relay::actors::RelayActorHandle;
use session_relay::config::Config;
use session_relay::coordinator::SessionCoordinator;
use session_relay::errors::RelayError;
use session_relay::gateway::{gateway_router, GatewayState};
use session_relay::observability::{health_router, init_metrics_recorder, HealthState};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Deadline handed to the relay actor for answering queued requests.
const RELAY_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

/// How long to wait for servers to finish after cancellation.
const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration first: it decides the log format.
    let config = Config::from_env().map_err(RelayError::from)?;

    let json_logs = config.observability.json_logs;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_new(
            &config.observability.log_filter,
        )?)
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    info!("Starting Session Relay");
    info!(
        relay_id = %config.relay_id,
        bind_address = %config.bind_address,
        health_bind_address = %config.health_bind_address,
        connection_buffer = config.connection_buffer,
        report_moderation_denials = config.report_moderation_denials,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());

    // Root of the cancellation tree: relay actor, servers and connections
    // all hang off it.
    let root_token = CancellationToken::new();

    let (relay_handle, relay_task) = RelayActorHandle::spawn(
        config.relay_id.clone(),
        SessionCoordinator::new(config.report_moderation_denials),
        root_token.child_token(),
    );
    info!("Relay actor started");

    // Start health HTTP server (fail startup if it can't bind)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let health_app = health_router(Arc::clone(&health_state), Some(prometheus_handle));

    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;
    info!(addr = %health_addr, "Health server bound successfully");

    let health_shutdown_token = root_token.child_token();
    let health_task = tokio::spawn(async move {
        let server = axum::serve(health_listener, health_app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    // Start WebSocket gateway
    let gateway_addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid gateway bind address");
        format!("Invalid gateway bind address: {e}")
    })?;

    let gateway_app = gateway_router(GatewayState {
        relay: relay_handle.clone(),
        connection_buffer: config.connection_buffer,
        cancel_token: relay_handle.child_token(),
    });

    let gateway_listener = tokio::net::TcpListener::bind(gateway_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %gateway_addr, "Failed to bind gateway");
            format!("Failed to bind gateway to {gateway_addr}: {e}")
        })?;
    info!(addr = %gateway_addr, "Gateway bound successfully");

    let gateway_shutdown_token = root_token.child_token();
    let gateway_task = tokio::spawn(async move {
        let server = axum::serve(gateway_listener, gateway_app).with_graceful_shutdown(
            async move {
                gateway_shutdown_token.cancelled().await;
                info!("Gateway shutting down");
            },
        );
        if let Err(e) = server.await {
            error!(error = %e, "Gateway failed");
        }
    });

    health_state.set_ready();
    info!("Session Relay running - press Ctrl+C to shutdown");

    shutdown_signal().await;
    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so load balancers stop sending traffic
    health_state.set_not_ready();

    // Relay first: it closes every connection mailbox, which ends the
    // per-socket writers before the servers stop.
    if let Err(e) = relay_handle.shutdown(RELAY_SHUTDOWN_DEADLINE).await {
        warn!(error = %e, "Relay shutdown error");
    }
    root_token.cancel();

    for (name, task) in [
        ("relay", relay_task),
        ("gateway", gateway_task),
        ("health", health_task),
    ] {
        match tokio::time::timeout(SERVER_SHUTDOWN_TIMEOUT, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(task = name, error = %e, "Task failed during shutdown"),
            Err(_) => warn!(task = name, "Task shutdown timed out"),
        }
    }

    info!("Session Relay shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
