//! # Relay Test Utilities
//!
//! Shared test utilities for the Session Relay.
//!
//! - `fixtures` - Test connections with inspectable mailboxes, event builders
//! - `harness` - A running relay actor for async tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_test_utils::*;
//!
//! let mut coordinator = SessionCoordinator::new(false);
//! let mut alice = TestConnection::attach(&mut coordinator, "alice");
//!
//! coordinator.handle_event(&alice.id, join("R1"));
//! assert_eq!(alice.event_names(), vec!["member-joined"]);
//! ```

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::TestRelay;
