//! In-memory relay state: connections, sessions and chat archives.
//!
//! Nothing here is shared across tasks. The coordinator owns one instance of
//! each table and mutates them from a single task.

pub mod archive;
pub mod registry;
pub mod sessions;

pub use archive::{ChatMessage, MessageArchive};
pub use registry::{Connection, ConnectionRegistry, ConnectionSink, DeliveryOutcome};
pub use sessions::{JoinOutcome, LeaveOutcome, SessionTable};
