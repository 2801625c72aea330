//! Relay dispatcher: addresses outbound events to connections.
//!
//! Callers pass a membership snapshot taken before dispatch starts, so a
//! membership change made while a fan-out is in progress never affects it.
//! Delivery is fire-and-forget: a full or closed mailbox loses the event and
//! the loss is counted, nothing is retried.

use crate::events::OutboundEvent;
use crate::state::{ConnectionRegistry, DeliveryOutcome};

use common::types::ConnectionId;
use tracing::{debug, trace};

/// Tally of one or more dispatch calls.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Events accepted by a mailbox.
    pub delivered: usize,
    /// Events lost to a full or closed mailbox.
    pub dropped: usize,
    /// Recipients with no registry entry (already disconnected).
    pub unknown: usize,
}

impl DispatchReport {
    /// Add another report's counts to this one.
    pub fn merge(&mut self, other: DispatchReport) {
        self.delivered += other.delivered;
        self.dropped += other.dropped;
        self.unknown += other.unknown;
    }
}

/// Stateless addressing over a [`ConnectionRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct RelayDispatcher<'a> {
    registry: &'a ConnectionRegistry,
}

impl<'a> RelayDispatcher<'a> {
    #[must_use]
    pub fn new(registry: &'a ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Send `event` to a single connection.
    pub fn emit_to(&self, conn_id: &ConnectionId, event: OutboundEvent) -> DispatchReport {
        let mut report = DispatchReport::default();

        let Some(sink) = self.registry.sink(conn_id) else {
            trace!(
                target: "relay.dispatch",
                conn_id = %conn_id,
                event = event.name(),
                "Recipient not registered, event discarded"
            );
            report.unknown = 1;
            return report;
        };

        let name = event.name();
        match sink.deliver(event) {
            DeliveryOutcome::Queued => report.delivered = 1,
            outcome @ (DeliveryOutcome::Full | DeliveryOutcome::Closed) => {
                debug!(
                    target: "relay.dispatch",
                    conn_id = %conn_id,
                    event = name,
                    outcome = ?outcome,
                    "Outbound event dropped"
                );
                report.dropped = 1;
            }
        }
        report
    }

    /// Send `event` to every connection in `members`.
    pub fn emit_to_all(&self, members: &[ConnectionId], event: &OutboundEvent) -> DispatchReport {
        self.fan_out(members.iter(), event)
    }

    /// Send `event` to every connection in `members` except `excluded`.
    pub fn emit_to_all_except(
        &self,
        members: &[ConnectionId],
        excluded: &ConnectionId,
        event: &OutboundEvent,
    ) -> DispatchReport {
        self.fan_out(members.iter().filter(|m| *m != excluded), event)
    }

    fn fan_out<'m>(
        &self,
        recipients: impl Iterator<Item = &'m ConnectionId>,
        event: &OutboundEvent,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        for conn_id in recipients {
            report.merge(self.emit_to(conn_id, event.clone()));
        }
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::state::ConnectionSink;
    use tokio::sync::mpsc;

    fn registry_with(
        ids: &[&str],
        buffer: usize,
    ) -> (ConnectionRegistry, Vec<mpsc::Receiver<OutboundEvent>>) {
        let mut registry = ConnectionRegistry::new();
        let mut receivers = Vec::new();
        for id in ids {
            let (sink, rx) = ConnectionSink::channel(buffer);
            registry.register(ConnectionId::from(*id), sink);
            receivers.push(rx);
        }
        (registry, receivers)
    }

    fn ids(raw: &[&str]) -> Vec<ConnectionId> {
        raw.iter().map(|s| ConnectionId::from(*s)).collect()
    }

    #[test]
    fn test_emit_to_single_recipient() {
        let (registry, mut rx) = registry_with(&["a", "b"], 4);
        let dispatcher = RelayDispatcher::new(&registry);

        let report = dispatcher.emit_to(&ConnectionId::from("b"), OutboundEvent::EndSession);

        assert_eq!(report.delivered, 1);
        assert!(rx[0].try_recv().is_err());
        assert_eq!(rx[1].try_recv().unwrap(), OutboundEvent::EndSession);
    }

    #[test]
    fn test_emit_to_unknown_is_counted_not_delivered() {
        let (registry, _rx) = registry_with(&["a"], 4);
        let dispatcher = RelayDispatcher::new(&registry);

        let report = dispatcher.emit_to(&ConnectionId::from("ghost"), OutboundEvent::EndSession);
        assert_eq!(
            report,
            DispatchReport {
                delivered: 0,
                dropped: 0,
                unknown: 1
            }
        );
    }

    #[test]
    fn test_emit_to_all_and_except() {
        let (registry, mut rx) = registry_with(&["a", "b", "c"], 4);
        let dispatcher = RelayDispatcher::new(&registry);
        let members = ids(&["a", "b", "c"]);
        let event = OutboundEvent::Reaction("wave".to_string());

        let all = dispatcher.emit_to_all(&members, &event);
        assert_eq!(all.delivered, 3);

        let except = dispatcher.emit_to_all_except(&members, &ConnectionId::from("b"), &event);
        assert_eq!(except.delivered, 2);

        let counts: Vec<usize> = rx
            .iter_mut()
            .map(|r| std::iter::from_fn(|| r.try_recv().ok()).count())
            .collect();
        assert_eq!(counts, vec![2, 1, 2]);
    }

    #[test]
    fn test_full_mailbox_drops_without_blocking() {
        let (registry, mut rx) = registry_with(&["slow", "fast"], 1);
        let dispatcher = RelayDispatcher::new(&registry);
        let members = ids(&["slow", "fast"]);

        // Fill "slow" but drain "fast" in between.
        dispatcher.emit_to_all(&members, &OutboundEvent::EndSession);
        rx[1].try_recv().unwrap();

        let report = dispatcher.emit_to_all(&members, &OutboundEvent::EndSession);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
    }
}
