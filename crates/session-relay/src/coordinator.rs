//! Session coordinator: applies inbound events to relay state.
//!
//! The coordinator owns the connection registry, session table and message
//! archive, and turns each inbound event into zero or more outbound events
//! via the [`RelayDispatcher`]. It is synchronous and single-owner; the
//! relay actor serializes calls into it.
//!
//! Unknown senders, unauthorized moderation commands and duplicate authority
//! claims are not errors. They are logged and the event has no effect (apart
//! from the optional `moderation-denied` report).

use crate::dispatch::{DispatchReport, RelayDispatcher};
use crate::events::{ChatEntry, InboundEvent, ModerationCommand, ModerationTarget, OutboundEvent};
use crate::observability::metrics;
use crate::state::{ConnectionRegistry, ConnectionSink, JoinOutcome, MessageArchive, SessionTable};

use common::types::{CallerId, ConnectionId, SessionId};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Owner of all relay state.
#[derive(Debug, Default)]
pub struct SessionCoordinator {
    registry: ConnectionRegistry,
    sessions: SessionTable,
    archive: MessageArchive,
    /// Send `moderation-denied` back to senders of refused commands.
    report_moderation_denials: bool,
}

impl SessionCoordinator {
    #[must_use]
    pub fn new(report_moderation_denials: bool) -> Self {
        Self {
            report_moderation_denials,
            ..Self::default()
        }
    }

    /// Register a newly accepted connection.
    ///
    /// Returns false if the ID is already registered.
    pub fn connect(&mut self, conn_id: ConnectionId, sink: ConnectionSink) -> bool {
        let registered = self.registry.register(conn_id.clone(), sink);
        if registered {
            debug!(
                target: "relay.coordinator",
                conn_id = %conn_id,
                connections = self.registry.len(),
                "Connection registered"
            );
            metrics::set_connections_active(self.registry.len());
        }
        registered
    }

    /// Apply one inbound event from `conn_id`.
    #[instrument(skip_all, name = "relay.coordinator.event", fields(conn_id = %conn_id, event = event.name()))]
    pub fn handle_event(&mut self, conn_id: &ConnectionId, event: InboundEvent) -> DispatchReport {
        let started = Instant::now();
        let name = event.name();

        if !self.registry.contains(conn_id) {
            debug!(
                target: "relay.coordinator",
                conn_id = %conn_id,
                event = name,
                "Event from unregistered connection dropped"
            );
            return DispatchReport::default();
        }

        let report = match event {
            InboundEvent::Join(session_id) => self.handle_join(conn_id, &session_id),
            InboundEvent::ClaimAuthority {
                session_id,
                caller_id,
            } => self.handle_claim_authority(conn_id, &session_id, &caller_id),
            InboundEvent::Chat {
                payload,
                sender_name,
            } => self.handle_chat(conn_id, payload, sender_name),
            InboundEvent::Typing(state) => {
                self.broadcast_except_sender(conn_id, name, &OutboundEvent::Typing(state))
            }
            InboundEvent::HandRaise(state) => {
                self.broadcast(conn_id, name, &OutboundEvent::HandRaise(state))
            }
            InboundEvent::Reaction(emoji) => {
                self.broadcast(conn_id, name, &OutboundEvent::Reaction(emoji))
            }
            InboundEvent::RecordingStarted(state) => {
                self.broadcast(conn_id, name, &OutboundEvent::RecordingStarted(state))
            }
            InboundEvent::RecordingStopped(state) => {
                self.broadcast(conn_id, name, &OutboundEvent::RecordingStopped(state))
            }
            InboundEvent::Presence(signal) => {
                self.broadcast(conn_id, name, &OutboundEvent::Presence(signal))
            }
            InboundEvent::MuteTarget(target) => self.handle_targeted_moderation(
                conn_id,
                ModerationCommand::MuteTarget,
                target,
                OutboundEvent::MuteTarget,
            ),
            InboundEvent::RemoveTarget(target) => self.handle_targeted_moderation(
                conn_id,
                ModerationCommand::RemoveTarget,
                target,
                OutboundEvent::RemoveTarget,
            ),
            InboundEvent::EndSession {
                claimed_authority_id,
            } => self.handle_end_session(conn_id, &claimed_authority_id),
            InboundEvent::Signal {
                target_conn_id,
                payload,
            } => self.dispatcher().emit_to(
                &target_conn_id,
                OutboundEvent::Signal {
                    from: conn_id.clone(),
                    payload,
                },
            ),
        };

        metrics::record_deliveries_dropped(report.dropped);
        metrics::record_event(name, started.elapsed());
        report
    }

    /// Remove a connection after its transport closed.
    ///
    /// Remaining members of its session receive `member-left`. Unknown IDs
    /// are a no-op.
    #[instrument(skip_all, name = "relay.coordinator.disconnect", fields(conn_id = %conn_id))]
    pub fn disconnect(&mut self, conn_id: &ConnectionId) -> DispatchReport {
        let started = Instant::now();
        let mut report = DispatchReport::default();

        if let Some(session_id) = self.sessions.find_session_of(conn_id).cloned() {
            if let Some(outcome) = self.sessions.leave(&session_id, conn_id) {
                report = self.dispatcher().emit_to_all(
                    &outcome.remaining,
                    &OutboundEvent::MemberLeft {
                        conn_id: conn_id.clone(),
                    },
                );

                if outcome.session_closed {
                    let discarded = self.archive.remove(&session_id);
                    info!(
                        target: "relay.coordinator",
                        session_id = %session_id,
                        discarded_messages = discarded,
                        "Session closed"
                    );
                    metrics::set_sessions_active(self.sessions.len());
                }
            }
        }

        match self.registry.unregister(conn_id) {
            Some(connection) => {
                info!(
                    target: "relay.coordinator",
                    conn_id = %conn_id,
                    registered_at = %connection.registered_at,
                    elapsed_online_ms = u64::try_from(connection.elapsed_online().as_millis())
                        .unwrap_or(u64::MAX),
                    "Connection closed"
                );
                metrics::set_connections_active(self.registry.len());
            }
            None => {
                debug!(
                    target: "relay.coordinator",
                    conn_id = %conn_id,
                    "Disconnect for unknown connection ignored"
                );
            }
        }

        metrics::record_deliveries_dropped(report.dropped);
        metrics::record_event("disconnect", started.elapsed());
        report
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Total archived chat messages across sessions.
    #[must_use]
    pub fn archived_messages(&self) -> usize {
        self.archive.total_messages()
    }

    /// Membership snapshot of a session in join order.
    #[must_use]
    pub fn members(&self, session_id: &SessionId) -> Vec<ConnectionId> {
        self.sessions.members(session_id)
    }

    /// Session a connection currently belongs to.
    #[must_use]
    pub fn session_of(&self, conn_id: &ConnectionId) -> Option<&SessionId> {
        self.sessions.find_session_of(conn_id)
    }

    /// Discard all state (shutdown). Dropping the sinks closes every mailbox.
    pub fn clear(&mut self) {
        self.sessions.clear();
        self.archive.clear();
        self.registry.clear();
        metrics::set_sessions_active(0);
        metrics::set_connections_active(0);
    }

    fn dispatcher(&self) -> RelayDispatcher<'_> {
        RelayDispatcher::new(&self.registry)
    }

    fn handle_join(&mut self, conn_id: &ConnectionId, session_id: &SessionId) -> DispatchReport {
        let JoinOutcome::Joined {
            members,
            is_first_member,
        } = self.sessions.join(session_id, conn_id)
        else {
            // Already in another session; the table logged it.
            return DispatchReport::default();
        };

        info!(
            target: "relay.coordinator",
            conn_id = %conn_id,
            session_id = %session_id,
            members = members.len(),
            is_first_member,
            "Connection joined session"
        );
        if is_first_member {
            metrics::set_sessions_active(self.sessions.len());
        }

        let dispatcher = self.dispatcher();
        let mut report = dispatcher.emit_to_all(
            &members,
            &OutboundEvent::MemberJoined {
                conn_id: conn_id.clone(),
                members: members.clone(),
            },
        );

        // History goes to the joiner only, in send order, as one mailbox
        // entry regardless of its length.
        let history: Vec<ChatEntry> = self
            .archive
            .all(session_id)
            .iter()
            .map(|message| ChatEntry {
                payload: message.payload.clone(),
                sender_name: message.sender_name.clone(),
                sender: message.sender.clone(),
            })
            .collect();
        if !history.is_empty() {
            report.merge(dispatcher.emit_to(conn_id, OutboundEvent::History(history)));
        }

        report
    }

    fn handle_claim_authority(
        &mut self,
        conn_id: &ConnectionId,
        session_id: &SessionId,
        caller_id: &CallerId,
    ) -> DispatchReport {
        let granted = self.sessions.claim_authority(session_id, caller_id);

        info!(
            target: "relay.coordinator",
            conn_id = %conn_id,
            session_id = %session_id,
            caller_id = %caller_id,
            granted,
            "Authority claim decided"
        );
        metrics::record_authority_claim(granted);

        self.dispatcher()
            .emit_to(conn_id, OutboundEvent::AuthorityResult { granted })
    }

    fn handle_chat(
        &mut self,
        conn_id: &ConnectionId,
        payload: Value,
        sender_name: String,
    ) -> DispatchReport {
        let Some(session_id) = self.sessions.find_session_of(conn_id).cloned() else {
            debug!(
                target: "relay.coordinator",
                conn_id = %conn_id,
                "Chat from connection outside any session dropped"
            );
            return DispatchReport::default();
        };

        let sequence = self.archive.append(
            &session_id,
            conn_id.clone(),
            sender_name.clone(),
            payload.clone(),
        );
        debug!(
            target: "relay.coordinator",
            conn_id = %conn_id,
            session_id = %session_id,
            sequence,
            "Chat message archived"
        );

        let members = self.sessions.members(&session_id);
        self.dispatcher().emit_to_all(
            &members,
            &OutboundEvent::Chat {
                payload,
                sender_name,
                sender: conn_id.clone(),
            },
        )
    }

    /// Relay to every member of the sender's session, sender included.
    fn broadcast(
        &self,
        conn_id: &ConnectionId,
        name: &'static str,
        event: &OutboundEvent,
    ) -> DispatchReport {
        match self.sessions.find_session_of(conn_id) {
            Some(session_id) => {
                let members = self.sessions.members(session_id);
                self.dispatcher().emit_to_all(&members, event)
            }
            None => {
                Self::log_sessionless(conn_id, name);
                DispatchReport::default()
            }
        }
    }

    /// Relay to every member of the sender's session except the sender.
    fn broadcast_except_sender(
        &self,
        conn_id: &ConnectionId,
        name: &'static str,
        event: &OutboundEvent,
    ) -> DispatchReport {
        match self.sessions.find_session_of(conn_id) {
            Some(session_id) => {
                let members = self.sessions.members(session_id);
                self.dispatcher().emit_to_all_except(&members, conn_id, event)
            }
            None => {
                Self::log_sessionless(conn_id, name);
                DispatchReport::default()
            }
        }
    }

    /// Forward a moderation command to its target only, if the claimed
    /// authority matches the sender's session holder.
    fn handle_targeted_moderation(
        &self,
        conn_id: &ConnectionId,
        command: ModerationCommand,
        target: ModerationTarget,
        into_event: fn(ModerationTarget) -> OutboundEvent,
    ) -> DispatchReport {
        let Some(session_id) = self.sessions.find_session_of(conn_id) else {
            Self::log_sessionless(conn_id, command.as_str());
            return DispatchReport::default();
        };

        if !self
            .sessions
            .is_authority(session_id, &target.claimed_authority_id)
        {
            return self.deny_moderation(conn_id, session_id, command);
        }

        info!(
            target: "relay.coordinator",
            conn_id = %conn_id,
            session_id = %session_id,
            target_conn_id = %target.target_conn_id,
            command = command.as_str(),
            "Moderation command relayed"
        );

        let target_conn_id = target.target_conn_id.clone();
        self.dispatcher()
            .emit_to(&target_conn_id, into_event(target))
    }

    fn handle_end_session(
        &self,
        conn_id: &ConnectionId,
        claimed_authority_id: &CallerId,
    ) -> DispatchReport {
        let command = ModerationCommand::EndSession;
        let Some(session_id) = self.sessions.find_session_of(conn_id) else {
            Self::log_sessionless(conn_id, command.as_str());
            return DispatchReport::default();
        };

        if !self.sessions.is_authority(session_id, claimed_authority_id) {
            return self.deny_moderation(conn_id, session_id, command);
        }

        info!(
            target: "relay.coordinator",
            conn_id = %conn_id,
            session_id = %session_id,
            "Session ended by authority holder"
        );

        let members = self.sessions.members(session_id);
        self.dispatcher()
            .emit_to_all(&members, &OutboundEvent::EndSession)
    }

    fn deny_moderation(
        &self,
        conn_id: &ConnectionId,
        session_id: &SessionId,
        command: ModerationCommand,
    ) -> DispatchReport {
        warn!(
            target: "relay.coordinator",
            conn_id = %conn_id,
            session_id = %session_id,
            command = command.as_str(),
            "Moderation command denied"
        );
        metrics::record_moderation_denied(command.as_str());

        if self.report_moderation_denials {
            self.dispatcher()
                .emit_to(conn_id, OutboundEvent::ModerationDenied { command })
        } else {
            DispatchReport::default()
        }
    }

    fn log_sessionless(conn_id: &ConnectionId, event: &'static str) {
        debug!(
            target: "relay.coordinator",
            conn_id = %conn_id,
            event,
            "Event from connection outside any session dropped"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::events::TypingState;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn connect(
        coordinator: &mut SessionCoordinator,
        id: &str,
    ) -> (ConnectionId, mpsc::Receiver<OutboundEvent>) {
        let (sink, rx) = ConnectionSink::channel(64);
        let conn_id = ConnectionId::from(id);
        assert!(coordinator.connect(conn_id.clone(), sink));
        (conn_id, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<OutboundEvent>) -> Vec<OutboundEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn test_duplicate_connect_rejected() {
        let mut coordinator = SessionCoordinator::new(false);
        let _a = connect(&mut coordinator, "a");
        let (sink, _rx) = ConnectionSink::channel(4);
        assert!(!coordinator.connect(ConnectionId::from("a"), sink));
        assert_eq!(coordinator.connection_count(), 1);
    }

    #[test]
    fn test_join_broadcasts_snapshot_to_everyone() {
        let mut coordinator = SessionCoordinator::new(false);
        let (a, mut rx_a) = connect(&mut coordinator, "a");
        let (b, mut rx_b) = connect(&mut coordinator, "b");
        let room = SessionId::from("R1");

        coordinator.handle_event(&a, InboundEvent::Join(room.clone()));
        coordinator.handle_event(&b, InboundEvent::Join(room.clone()));

        let expected = OutboundEvent::MemberJoined {
            conn_id: b.clone(),
            members: vec![a.clone(), b.clone()],
        };
        assert_eq!(drain(&mut rx_a).last(), Some(&expected));
        assert_eq!(drain(&mut rx_b), vec![expected]);
    }

    #[test]
    fn test_event_from_unregistered_connection_dropped() {
        let mut coordinator = SessionCoordinator::new(false);
        let report = coordinator.handle_event(
            &ConnectionId::from("ghost"),
            InboundEvent::Join(SessionId::from("R1")),
        );
        assert_eq!(report, DispatchReport::default());
        assert_eq!(coordinator.session_count(), 0);
    }

    #[test]
    fn test_typing_skips_sender() {
        let mut coordinator = SessionCoordinator::new(false);
        let (a, mut rx_a) = connect(&mut coordinator, "a");
        let (b, mut rx_b) = connect(&mut coordinator, "b");
        coordinator.handle_event(&a, InboundEvent::Join(SessionId::from("R1")));
        coordinator.handle_event(&b, InboundEvent::Join(SessionId::from("R1")));
        drain(&mut rx_a);
        drain(&mut rx_b);

        let typing = TypingState {
            caller_id: CallerId::from("user-a"),
            display_name: "Ana".to_string(),
            is_typing: true,
        };
        coordinator.handle_event(&a, InboundEvent::Typing(typing.clone()));

        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec![OutboundEvent::Typing(typing)]);
    }

    #[test]
    fn test_signal_is_point_to_point_without_session() {
        let mut coordinator = SessionCoordinator::new(false);
        let (a, mut rx_a) = connect(&mut coordinator, "a");
        let (b, mut rx_b) = connect(&mut coordinator, "b");

        coordinator.handle_event(
            &a,
            InboundEvent::Signal {
                target_conn_id: b.clone(),
                payload: json!({"sdp": "offer"}),
            },
        );

        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(
            drain(&mut rx_b),
            vec![OutboundEvent::Signal {
                from: a,
                payload: json!({"sdp": "offer"}),
            }]
        );
    }

    #[test]
    fn test_denied_moderation_reported_when_enabled() {
        let mut coordinator = SessionCoordinator::new(true);
        let (a, mut rx_a) = connect(&mut coordinator, "a");
        let (b, mut rx_b) = connect(&mut coordinator, "b");
        coordinator.handle_event(&a, InboundEvent::Join(SessionId::from("R1")));
        coordinator.handle_event(&b, InboundEvent::Join(SessionId::from("R1")));
        drain(&mut rx_a);
        drain(&mut rx_b);

        coordinator.handle_event(
            &b,
            InboundEvent::RemoveTarget(ModerationTarget {
                target_conn_id: a.clone(),
                claimed_authority_id: CallerId::from("user-b"),
            }),
        );

        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(
            drain(&mut rx_b),
            vec![OutboundEvent::ModerationDenied {
                command: ModerationCommand::RemoveTarget
            }]
        );
    }

    #[test]
    fn test_disconnect_unknown_is_noop() {
        let mut coordinator = SessionCoordinator::new(false);
        let report = coordinator.disconnect(&ConnectionId::from("ghost"));
        assert_eq!(report, DispatchReport::default());
    }

    #[test]
    fn test_clear_closes_mailboxes() {
        let mut coordinator = SessionCoordinator::new(false);
        let (a, mut rx_a) = connect(&mut coordinator, "a");
        coordinator.handle_event(&a, InboundEvent::Join(SessionId::from("R1")));
        drain(&mut rx_a);

        coordinator.clear();

        assert_eq!(coordinator.session_count(), 0);
        assert_eq!(coordinator.connection_count(), 0);
        assert!(matches!(
            rx_a.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
