//! Actor wrapper around the session coordinator.
//!
//! ```text
//! RelayActor (one per relay process)
//! └── owns SessionCoordinator
//!     ├── ConnectionRegistry (one ConnectionSink per gateway connection)
//!     ├── SessionTable
//!     └── MessageArchive
//! ```
//!
//! - **Single owner**: all state lives in one task, so events are applied in
//!   mailbox order without locks.
//! - **CancellationToken propagation**: the actor's token is a child of the
//!   process root token; gateway connections hold children of the actor's.
//! - **Mailbox monitoring**: depth is tracked from enqueue to completion.
//!
//! # Modules
//!
//! - [`relay`] - `RelayActor` and its `RelayActorHandle`
//! - [`messages`] - Mailbox message types
//! - [`metrics`] - Mailbox depth monitoring

pub mod messages;
pub mod metrics;
pub mod relay;

pub use messages::{RelayMessage, RelayStatus};
pub use metrics::{MailboxLevel, MailboxMonitor};
pub use relay::{RelayActor, RelayActorHandle};
