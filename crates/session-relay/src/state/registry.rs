//! Connection registry: one record per live transport link.
//!
//! A record is created when the transport accepts a link and removed on
//! disconnect. Identifiers are never reused, so a removed record is gone for
//! good.

use crate::events::OutboundEvent;

use chrono::{DateTime, Utc};
use common::types::ConnectionId;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

/// Outcome of handing an event to a connection's mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Accepted by the mailbox.
    Queued,
    /// Mailbox full; event discarded.
    Full,
    /// Receiving side already gone; event discarded.
    Closed,
}

/// Outbound mailbox of a single connection.
///
/// Delivery never waits: a slow reader loses events instead of stalling the
/// relay for every other connection.
#[derive(Debug, Clone)]
pub struct ConnectionSink {
    sender: mpsc::Sender<OutboundEvent>,
}

impl ConnectionSink {
    #[must_use]
    pub fn new(sender: mpsc::Sender<OutboundEvent>) -> Self {
        Self { sender }
    }

    /// Create a sink and its receiving half.
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<OutboundEvent>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self::new(sender), receiver)
    }

    /// Try to queue an event without waiting.
    pub fn deliver(&self, event: OutboundEvent) -> DeliveryOutcome {
        match self.sender.try_send(event) {
            Ok(()) => DeliveryOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => DeliveryOutcome::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => DeliveryOutcome::Closed,
        }
    }
}

/// A registered connection.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    /// Wall-clock registration time (reported in diagnostics).
    pub registered_at: DateTime<Utc>,
    /// Monotonic registration time (used for elapsed-online).
    connected_at: Instant,
    sink: ConnectionSink,
}

impl Connection {
    /// Time since the connection was registered.
    #[must_use]
    pub fn elapsed_online(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Live connections by ID.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection with the current time.
    ///
    /// Returns false (and keeps the existing record) if the ID is already live.
    pub fn register(&mut self, conn_id: ConnectionId, sink: ConnectionSink) -> bool {
        if self.connections.contains_key(&conn_id) {
            debug!(
                target: "relay.registry",
                conn_id = %conn_id,
                "Connection already registered"
            );
            return false;
        }

        let connection = Connection {
            id: conn_id.clone(),
            registered_at: Utc::now(),
            connected_at: Instant::now(),
            sink,
        };
        self.connections.insert(conn_id, connection);
        true
    }

    /// Remove and return a connection. Unknown IDs are a no-op.
    pub fn unregister(&mut self, conn_id: &ConnectionId) -> Option<Connection> {
        self.connections.remove(conn_id)
    }

    #[must_use]
    pub fn contains(&self, conn_id: &ConnectionId) -> bool {
        self.connections.contains_key(conn_id)
    }

    /// Time since registration, if the connection is live.
    #[must_use]
    pub fn elapsed_online(&self, conn_id: &ConnectionId) -> Option<Duration> {
        self.connections.get(conn_id).map(Connection::elapsed_online)
    }

    /// Mailbox of a live connection.
    #[must_use]
    pub fn sink(&self, conn_id: &ConnectionId) -> Option<&ConnectionSink> {
        self.connections.get(conn_id).map(|c| &c.sink)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Drop every record (process shutdown).
    pub fn clear(&mut self) {
        self.connections.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_unregister() {
        let mut registry = ConnectionRegistry::new();
        let (sink, _rx) = ConnectionSink::channel(4);

        assert!(registry.register(ConnectionId::from("a"), sink));
        assert!(registry.contains(&ConnectionId::from("a")));
        assert_eq!(registry.len(), 1);

        let removed = registry.unregister(&ConnectionId::from("a")).unwrap();
        assert_eq!(removed.id, ConnectionId::from("a"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let mut registry = ConnectionRegistry::new();
        assert!(registry.unregister(&ConnectionId::from("ghost")).is_none());
    }

    #[test]
    fn test_duplicate_register_keeps_first_record() {
        let mut registry = ConnectionRegistry::new();
        let (first, mut first_rx) = ConnectionSink::channel(4);
        let (second, _second_rx) = ConnectionSink::channel(4);

        assert!(registry.register(ConnectionId::from("a"), first));
        assert!(!registry.register(ConnectionId::from("a"), second));

        let sink = registry.sink(&ConnectionId::from("a")).unwrap();
        assert_eq!(
            sink.deliver(OutboundEvent::EndSession),
            DeliveryOutcome::Queued
        );
        assert_eq!(first_rx.try_recv().unwrap(), OutboundEvent::EndSession);
    }

    #[test]
    fn test_elapsed_online_only_for_live_connections() {
        let mut registry = ConnectionRegistry::new();
        let (sink, _rx) = ConnectionSink::channel(4);
        registry.register(ConnectionId::from("a"), sink);

        assert!(registry.elapsed_online(&ConnectionId::from("a")).is_some());
        assert!(registry.elapsed_online(&ConnectionId::from("b")).is_none());
    }

    #[test]
    fn test_sink_reports_full_and_closed() {
        let (sink, rx) = ConnectionSink::channel(1);

        assert_eq!(sink.deliver(OutboundEvent::EndSession), DeliveryOutcome::Queued);
        assert_eq!(sink.deliver(OutboundEvent::EndSession), DeliveryOutcome::Full);

        drop(rx);
        assert_eq!(sink.deliver(OutboundEvent::EndSession), DeliveryOutcome::Closed);
    }
}
