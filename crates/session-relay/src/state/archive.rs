//! Per-session chat history, replayed to late joiners.

use common::types::{ConnectionId, SessionId};
use serde_json::Value;
use std::collections::HashMap;

/// One archived chat message. Appended once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub sender_name: String,
    pub payload: Value,
    pub sender: ConnectionId,
    /// Position within the session's log, starting at 0.
    pub sequence: u64,
}

/// Ordered chat logs keyed by session.
#[derive(Debug, Default)]
pub struct MessageArchive {
    logs: HashMap<SessionId, Vec<ChatMessage>>,
}

impl MessageArchive {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, creating the session's log if needed.
    ///
    /// Returns the assigned sequence number.
    pub fn append(
        &mut self,
        session_id: &SessionId,
        sender: ConnectionId,
        sender_name: String,
        payload: Value,
    ) -> u64 {
        let log = self.logs.entry(session_id.clone()).or_default();
        let sequence = log.len() as u64;
        log.push(ChatMessage {
            sender_name,
            payload,
            sender,
            sequence,
        });
        sequence
    }

    /// Full history in send order (empty if none).
    #[must_use]
    pub fn all(&self, session_id: &SessionId) -> &[ChatMessage] {
        self.logs.get(session_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Drop a session's history. Called when the session is deleted.
    pub fn remove(&mut self, session_id: &SessionId) -> usize {
        self.logs.remove(session_id).map_or(0, |log| log.len())
    }

    /// Total archived messages across all sessions.
    #[must_use]
    pub fn total_messages(&self) -> usize {
        self.logs.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.logs.clear();
    }
}
