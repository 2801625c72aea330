//! Observability for the session relay: Prometheus metrics and health probes.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `relay_connections_active` | Gauge | none | Registered connections |
//! | `relay_sessions_active` | Gauge | none | Live sessions |
//! | `relay_events_total` | Counter | `event` | Inbound events handled |
//! | `relay_event_latency_seconds` | Histogram | `event` | Time to handle one event |
//! | `relay_deliveries_dropped_total` | Counter | none | Outbound events lost to full or closed mailboxes |
//! | `relay_authority_claims_total` | Counter | `result` | Authority claim outcomes |
//! | `relay_moderation_denied_total` | Counter | `command` | Refused moderation commands |
//!
//! Log fields never include chat bodies or signaling payloads.

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::{
    init_metrics_recorder, record_authority_claim, record_deliveries_dropped, record_event,
    record_moderation_denied, set_connections_active, set_sessions_active,
};
