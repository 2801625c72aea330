//! Message types for the relay actor mailbox.
//!
//! Request/reply messages carry a `tokio::sync::oneshot` sender. Inbound
//! events and disconnects are fire-and-forget.

use super::metrics::MailboxLevel;
use crate::errors::RelayError;
use crate::events::InboundEvent;
use crate::state::ConnectionSink;

use common::types::ConnectionId;
use std::time::Duration;
use tokio::sync::oneshot;

/// Messages sent to `RelayActor`.
#[derive(Debug)]
pub enum RelayMessage {
    /// Register a newly accepted connection and its outbound mailbox.
    Connect {
        conn_id: ConnectionId,
        sink: ConnectionSink,
        respond_to: oneshot::Sender<Result<(), RelayError>>,
    },

    /// An event decoded from a connection's transport.
    Inbound {
        conn_id: ConnectionId,
        event: InboundEvent,
    },

    /// The connection's transport closed.
    Disconnect { conn_id: ConnectionId },

    /// Get current relay status (for health checks and tests).
    GetStatus {
        respond_to: oneshot::Sender<RelayStatus>,
    },

    /// Initiate graceful shutdown.
    Shutdown {
        /// Deadline for shutdown.
        deadline: Duration,
        respond_to: oneshot::Sender<Result<(), RelayError>>,
    },
}

/// Relay status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStatus {
    pub session_count: usize,
    pub connection_count: usize,
    pub archived_messages: usize,
    /// Messages waiting in the relay mailbox.
    pub mailbox_depth: usize,
    pub mailbox_level: MailboxLevel,
    /// Whether the relay is refusing new connections.
    pub is_draining: bool,
}
