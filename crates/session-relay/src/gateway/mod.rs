//! WebSocket gateway: binds the relay to real transport connections.
//!
//! `GET /ws` upgrades to a WebSocket. Each socket becomes one relay
//! connection with a freshly minted [`ConnectionId`](common::types::ConnectionId).
//! Frames are JSON text in the format of [`crate::events`].

pub mod handler;

use crate::actors::RelayActorHandle;

use axum::{routing::get, Router};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared state for gateway handlers.
#[derive(Debug, Clone)]
pub struct GatewayState {
    pub relay: RelayActorHandle,
    /// Outbound mailbox capacity per connection.
    pub connection_buffer: usize,
    /// Cancelled on process shutdown; open sockets close when it fires.
    pub cancel_token: CancellationToken,
}

/// Build the gateway router.
pub fn gateway_router(state: GatewayState) -> Router {
    Router::new()
        .route("/ws", get(handler::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
