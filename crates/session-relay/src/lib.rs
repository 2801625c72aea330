//! Session Relay Library
//!
//! Real-time session relay: tracks which connections belong to which named
//! session, elects one authority holder per session, archives chat and
//! replays it to late joiners, fans out presence and control events, and
//! relays opaque WebRTC signaling payloads between peers.
//!
//! # Architecture
//!
//! ```text
//! gateway (one task per WebSocket)
//!   └── RelayActorHandle ──mpsc──> RelayActor (single owner)
//!                                    └── SessionCoordinator
//!                                          ├── ConnectionRegistry
//!                                          ├── SessionTable
//!                                          ├── MessageArchive
//!                                          └── RelayDispatcher ──> ConnectionSink (per connection)
//! ```
//!
//! The relay keeps no state across restarts and never sees media.
//!
//! # Modules
//!
//! - [`actors`] - Actor that serializes all state changes
//! - [`config`] - Service configuration from environment
//! - [`coordinator`] - Event handling over relay state
//! - [`dispatch`] - Addressing of outbound events
//! - [`errors`] - Error types with wire error codes
//! - [`events`] - Inbound and outbound wire events
//! - [`gateway`] - WebSocket transport
//! - [`observability`] - Metrics and health endpoints
//! - [`state`] - Registry, session table and chat archive

pub mod actors;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod observability;
pub mod state;
