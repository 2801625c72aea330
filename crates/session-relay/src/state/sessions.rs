//! Session table: membership and authority per session.
//!
//! Sessions are created lazily on first join and deleted as soon as their
//! member list becomes empty. A reverse index (connection -> session) is
//! updated in the same call as every membership change, so lookups by
//! connection never scan the table.

use common::types::{CallerId, ConnectionId, SessionId};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Authority decision for one session lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Authority {
    /// No claim has succeeded yet.
    Undecided,
    /// First successful claim. Never changes until the session is deleted.
    Held(CallerId),
}

#[derive(Debug)]
struct SessionEntry {
    /// Join order, no duplicates.
    members: Vec<ConnectionId>,
    authority: Authority,
}

/// Result of [`SessionTable::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Joined (or was already a member of) the session.
    Joined {
        /// Full membership snapshot in join order.
        members: Vec<ConnectionId>,
        /// True if this join took the session from empty to non-empty.
        is_first_member: bool,
    },
    /// The connection already belongs to a different session.
    AlreadyInOtherSession(SessionId),
}

/// Result of [`SessionTable::leave`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// Members still present after the removal, in join order.
    pub remaining: Vec<ConnectionId>,
    /// True if the session was deleted (membership became empty).
    pub session_closed: bool,
}

/// Sessions by ID plus the connection -> session reverse index.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<SessionId, SessionEntry>,
    membership: HashMap<ConnectionId, SessionId>,
}

impl SessionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn_id` to `session_id`, creating the session if absent.
    ///
    /// Joining a session the connection is already in is idempotent. A
    /// connection belongs to at most one session at a time.
    pub fn join(&mut self, session_id: &SessionId, conn_id: &ConnectionId) -> JoinOutcome {
        if let Some(current) = self.membership.get(conn_id) {
            if current != session_id {
                warn!(
                    target: "relay.sessions",
                    conn_id = %conn_id,
                    current_session = %current,
                    requested_session = %session_id,
                    "Connection already belongs to another session"
                );
                return JoinOutcome::AlreadyInOtherSession(current.clone());
            }
        }

        let entry = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| SessionEntry {
                members: Vec::new(),
                authority: Authority::Undecided,
            });

        let is_first_member = entry.members.is_empty();
        if !entry.members.contains(conn_id) {
            entry.members.push(conn_id.clone());
            self.membership.insert(conn_id.clone(), session_id.clone());
        }

        JoinOutcome::Joined {
            members: entry.members.clone(),
            is_first_member,
        }
    }

    /// Remove `conn_id` from `session_id`.
    ///
    /// Returns `None` if the connection was not a member. When the last
    /// member leaves, the session and its authority decision are deleted.
    pub fn leave(&mut self, session_id: &SessionId, conn_id: &ConnectionId) -> Option<LeaveOutcome> {
        let entry = self.sessions.get_mut(session_id)?;
        let position = entry.members.iter().position(|m| m == conn_id)?;

        entry.members.remove(position);
        self.membership.remove(conn_id);

        let remaining = entry.members.clone();
        let session_closed = remaining.is_empty();
        if session_closed {
            self.sessions.remove(session_id);
            debug!(
                target: "relay.sessions",
                session_id = %session_id,
                "Last member left, session deleted"
            );
        }

        Some(LeaveOutcome {
            remaining,
            session_closed,
        })
    }

    /// Session the connection currently belongs to.
    #[must_use]
    pub fn find_session_of(&self, conn_id: &ConnectionId) -> Option<&SessionId> {
        self.membership.get(conn_id)
    }

    /// Membership snapshot in join order (empty if the session does not exist).
    #[must_use]
    pub fn members(&self, session_id: &SessionId) -> Vec<ConnectionId> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.members.clone())
            .unwrap_or_default()
    }

    /// Try to become the session's authority holder.
    ///
    /// Granted only when the session exists, has exactly one member, and no
    /// claim has succeeded before. After the first grant every later claim is
    /// denied for the rest of the session's lifetime, including repeat claims
    /// by the holder.
    pub fn claim_authority(&mut self, session_id: &SessionId, caller_id: &CallerId) -> bool {
        let Some(entry) = self.sessions.get_mut(session_id) else {
            return false;
        };

        match entry.authority {
            Authority::Held(_) => false,
            Authority::Undecided if entry.members.len() == 1 => {
                entry.authority = Authority::Held(caller_id.clone());
                true
            }
            Authority::Undecided => false,
        }
    }

    /// Whether `caller_id` is the recorded authority holder of the session.
    #[must_use]
    pub fn is_authority(&self, session_id: &SessionId, caller_id: &CallerId) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|entry| entry.authority == Authority::Held(caller_id.clone()))
    }

    /// Whether the session currently exists.
    #[must_use]
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every session (process shutdown).
    pub fn clear(&mut self) {
        self.sessions.clear();
        self.membership.clear();
    }
}
