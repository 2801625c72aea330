//! Inbound and outbound relay events.
//!
//! Every event has a kebab-case name and a payload. On the wire they are
//! adjacently tagged JSON objects:
//!
//! ```text
//! {"event": "join", "data": "R1"}
//! {"event": "chat", "data": {"payload": "hi", "sender_name": "Ana"}}
//! ```
//!
//! Payloads the relay never inspects (chat bodies, signaling blobs, presence
//! signals) are carried as [`serde_json::Value`].

use common::types::{CallerId, ConnectionId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Typing indicator, relayed unchanged to everyone except the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingState {
    pub caller_id: CallerId,
    pub display_name: String,
    pub is_typing: bool,
}

/// Hand-raise toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandRaiseState {
    pub caller_id: CallerId,
    pub is_raised: bool,
}

/// Recording status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingState {
    pub caller_id: CallerId,
}

/// Point-to-point moderation command payload.
///
/// `claimed_authority_id` is supplied by the caller and compared against the
/// session's recorded authority holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationTarget {
    pub target_conn_id: ConnectionId,
    pub claimed_authority_id: CallerId,
}

/// Moderation command kinds, used for denial reports and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModerationCommand {
    MuteTarget,
    RemoveTarget,
    EndSession,
}

impl ModerationCommand {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ModerationCommand::MuteTarget => "mute-target",
            ModerationCommand::RemoveTarget => "remove-target",
            ModerationCommand::EndSession => "end-session",
        }
    }
}

/// Event received from a live connection.
///
/// A transport-level disconnect is not an `InboundEvent`; transports report
/// it separately so it can never be forged by a client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum InboundEvent {
    /// Join the named session.
    Join(SessionId),
    /// Ask to become the session's authority holder.
    ClaimAuthority {
        session_id: SessionId,
        caller_id: CallerId,
    },
    /// Chat message to the sender's session.
    Chat { payload: Value, sender_name: String },
    Typing(TypingState),
    HandRaise(HandRaiseState),
    /// Emoji reaction.
    Reaction(String),
    RecordingStarted(RecordingState),
    RecordingStopped(RecordingState),
    /// Generic presence signal, broadcast unchanged.
    Presence(Value),
    MuteTarget(ModerationTarget),
    RemoveTarget(ModerationTarget),
    EndSession { claimed_authority_id: CallerId },
    /// Opaque WebRTC signaling payload for a single peer.
    Signal {
        target_conn_id: ConnectionId,
        payload: Value,
    },
}

impl InboundEvent {
    /// Wire name of the event (bounded set, safe as a metric label).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            InboundEvent::Join(_) => "join",
            InboundEvent::ClaimAuthority { .. } => "claim-authority",
            InboundEvent::Chat { .. } => "chat",
            InboundEvent::Typing(_) => "typing",
            InboundEvent::HandRaise(_) => "hand-raise",
            InboundEvent::Reaction(_) => "reaction",
            InboundEvent::RecordingStarted(_) => "recording-started",
            InboundEvent::RecordingStopped(_) => "recording-stopped",
            InboundEvent::Presence(_) => "presence",
            InboundEvent::MuteTarget(_) => "mute-target",
            InboundEvent::RemoveTarget(_) => "remove-target",
            InboundEvent::EndSession { .. } => "end-session",
            InboundEvent::Signal { .. } => "signal",
        }
    }
}

/// One archived chat message inside a [`OutboundEvent::History`] batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub payload: Value,
    pub sender_name: String,
    pub sender: ConnectionId,
}

impl From<ChatEntry> for OutboundEvent {
    fn from(entry: ChatEntry) -> Self {
        OutboundEvent::Chat {
            payload: entry.payload,
            sender_name: entry.sender_name,
            sender: entry.sender,
        }
    }
}

/// Event addressed to one connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum OutboundEvent {
    /// Hello frame telling a client its own connection ID.
    Connected { conn_id: ConnectionId },
    /// `conn_id` joined; `members` is the full membership in join order.
    MemberJoined {
        conn_id: ConnectionId,
        members: Vec<ConnectionId>,
    },
    AuthorityResult { granted: bool },
    Chat {
        payload: Value,
        sender_name: String,
        sender: ConnectionId,
    },
    Typing(TypingState),
    HandRaise(HandRaiseState),
    Reaction(String),
    RecordingStarted(RecordingState),
    RecordingStopped(RecordingState),
    Presence(Value),
    MuteTarget(ModerationTarget),
    RemoveTarget(ModerationTarget),
    EndSession,
    Signal { from: ConnectionId, payload: Value },
    MemberLeft { conn_id: ConnectionId },
    /// Sent only when moderation denial reporting is enabled.
    ModerationDenied { command: ModerationCommand },
    /// Transport-level problem with a frame sent by this connection.
    Error { code: i32, message: String },
    /// Archived chat for a joiner, queued as a single mailbox entry so the
    /// replay never competes with live traffic for mailbox slots. Transports
    /// write it as one `chat` frame per entry; see [`OutboundEvent::into_frames`].
    #[serde(skip)]
    History(Vec<ChatEntry>),
}

impl OutboundEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            OutboundEvent::Connected { .. } => "connected",
            OutboundEvent::MemberJoined { .. } => "member-joined",
            OutboundEvent::AuthorityResult { .. } => "authority-result",
            OutboundEvent::Chat { .. } => "chat",
            OutboundEvent::Typing(_) => "typing",
            OutboundEvent::HandRaise(_) => "hand-raise",
            OutboundEvent::Reaction(_) => "reaction",
            OutboundEvent::RecordingStarted(_) => "recording-started",
            OutboundEvent::RecordingStopped(_) => "recording-stopped",
            OutboundEvent::Presence(_) => "presence",
            OutboundEvent::MuteTarget(_) => "mute-target",
            OutboundEvent::RemoveTarget(_) => "remove-target",
            OutboundEvent::EndSession => "end-session",
            OutboundEvent::Signal { .. } => "signal",
            OutboundEvent::MemberLeft { .. } => "member-left",
            OutboundEvent::ModerationDenied { .. } => "moderation-denied",
            OutboundEvent::Error { .. } => "error",
            OutboundEvent::History(_) => "history",
        }
    }

    /// Wire frames for this event, in order.
    ///
    /// Everything is a single frame except [`OutboundEvent::History`], which
    /// expands to one `chat` per archived message.
    #[must_use]
    pub fn into_frames(self) -> Vec<OutboundEvent> {
        match self {
            OutboundEvent::History(entries) => entries.into_iter().map(Into::into).collect(),
            event => vec![event],
        }
    }
}
