//! Observability for the signal relay.
//!
//! # Privacy by Default
//!
//! Instrumentation uses `#[instrument(skip_all)]` with explicit fields. Signal
//! payloads are never logged or labelled; room names and peer ids appear in
//! logs only, never as metric labels.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `relay_rooms_active` | Gauge | none | Live rooms |
//! | `relay_connections_active` | Gauge | none | Live WebSocket connections |
//! | `relay_actor_mailbox_depth` | Histogram | `actor_type` | Backlog seen by each actor when it takes a message |
//! | `relay_signals_total` | Counter | `outcome` | Signals relayed or dropped |
//! | `relay_messages_dropped_total` | Counter | `reason` | Events lost to full or closed peer queues |
//! | `relay_actor_panics_total` | Counter | `actor_type` | Actor panics (bugs) |
//! | `relay_message_latency_seconds` | Histogram | `message_type` | Room mailbox processing time |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use self::metrics::{
    init_metrics_recorder, record_actor_mailbox_depth, record_actor_panic, record_message_dropped,
    record_message_latency, record_signal, set_connections_active, set_rooms_active,
};
