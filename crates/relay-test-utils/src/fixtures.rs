//! Test connections and inbound event builders.

use common::types::{CallerId, ConnectionId, SessionId};
use serde_json::{json, Value};
use session_relay::coordinator::SessionCoordinator;
use session_relay::events::{ChatEntry, InboundEvent, ModerationTarget, OutboundEvent};
use session_relay::state::ConnectionSink;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;

/// Mailbox capacity used unless a test asks for something else.
pub const TEST_CONNECTION_BUFFER: usize = 64;

/// How long `next_event` waits before failing the test.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// A connection whose outbound mailbox the test reads directly.
///
/// Events are read as the client would see them on the wire: a history
/// batch comes out as its individual `chat` events.
#[derive(Debug)]
pub struct TestConnection {
    pub id: ConnectionId,
    pub sink: ConnectionSink,
    rx: mpsc::Receiver<OutboundEvent>,
    pending: VecDeque<OutboundEvent>,
}

impl TestConnection {
    /// Create a connection with the given ID and the default buffer.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_buffer(id, TEST_CONNECTION_BUFFER)
    }

    /// Create a connection with a specific mailbox capacity.
    #[must_use]
    pub fn with_buffer(id: impl Into<String>, buffer: usize) -> Self {
        let (sink, rx) = ConnectionSink::channel(buffer);
        Self {
            id: ConnectionId::from(id.into()),
            sink,
            rx,
            pending: VecDeque::new(),
        }
    }

    /// Create a connection and register it with `coordinator`.
    ///
    /// # Panics
    ///
    /// Panics if the ID is already registered.
    pub fn attach(coordinator: &mut SessionCoordinator, id: impl Into<String>) -> Self {
        let conn = Self::new(id);
        assert!(
            coordinator.connect(conn.id.clone(), conn.sink.clone()),
            "connection {} already registered",
            conn.id
        );
        conn
    }

    /// Everything currently queued, without waiting.
    pub fn drain(&mut self) -> Vec<OutboundEvent> {
        let mut events: Vec<OutboundEvent> = self.pending.drain(..).collect();
        while let Ok(event) = self.rx.try_recv() {
            events.extend(event.into_frames());
        }
        events
    }

    /// Names of everything currently queued (drains the mailbox).
    pub fn event_names(&mut self) -> Vec<&'static str> {
        self.drain().iter().map(OutboundEvent::name).collect()
    }

    /// Wait for the next event.
    ///
    /// # Panics
    ///
    /// Panics if nothing arrives within [`RECV_TIMEOUT`] or the mailbox closed.
    pub async fn next_event(&mut self) -> OutboundEvent {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return event;
            }
            match tokio::time::timeout(RECV_TIMEOUT, self.rx.recv()).await {
                Ok(Some(event)) => self.pending.extend(event.into_frames()),
                Ok(None) => panic!("mailbox of {} closed", self.id),
                Err(_) => panic!("no event for {} within {RECV_TIMEOUT:?}", self.id),
            }
        }
    }

    /// Drop this side's sink and wait for the relay to release the mailbox.
    ///
    /// Queued events are discarded. Returns false if the mailbox is still
    /// open after [`RECV_TIMEOUT`].
    pub async fn wait_closed(self) -> bool {
        let Self { sink, mut rx, .. } = self;
        drop(sink);
        loop {
            match tokio::time::timeout(RECV_TIMEOUT, rx.recv()).await {
                Ok(Some(_)) => {}
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }
}

#[must_use]
pub fn join(session_id: &str) -> InboundEvent {
    InboundEvent::Join(SessionId::from(session_id))
}

#[must_use]
pub fn claim(session_id: &str, caller_id: &str) -> InboundEvent {
    InboundEvent::ClaimAuthority {
        session_id: SessionId::from(session_id),
        caller_id: CallerId::from(caller_id),
    }
}

/// Chat with a plain-text body.
#[must_use]
pub fn chat(text: &str, sender_name: &str) -> InboundEvent {
    InboundEvent::Chat {
        payload: json!(text),
        sender_name: sender_name.to_string(),
    }
}

#[must_use]
pub fn mute(target: &ConnectionId, claimed_authority_id: &str) -> InboundEvent {
    InboundEvent::MuteTarget(moderation_target(target, claimed_authority_id))
}

#[must_use]
pub fn remove(target: &ConnectionId, claimed_authority_id: &str) -> InboundEvent {
    InboundEvent::RemoveTarget(moderation_target(target, claimed_authority_id))
}

#[must_use]
pub fn end_session(claimed_authority_id: &str) -> InboundEvent {
    InboundEvent::EndSession {
        claimed_authority_id: CallerId::from(claimed_authority_id),
    }
}

#[must_use]
pub fn signal(target: &ConnectionId, payload: Value) -> InboundEvent {
    InboundEvent::Signal {
        target_conn_id: target.clone(),
        payload,
    }
}

#[must_use]
pub fn moderation_target(target: &ConnectionId, claimed_authority_id: &str) -> ModerationTarget {
    ModerationTarget {
        target_conn_id: target.clone(),
        claimed_authority_id: CallerId::from(claimed_authority_id),
    }
}
