//! Actor metrics and mailbox monitoring.
//!
//! Mailbox depth thresholds:
//!
//! | Actor Type | Normal | Warning | Critical |
//! |------------|--------|---------|----------|
//! | Dispatcher | < 100  | 100-500 | > 500    |
//! | Room       | < 100  | 100-500 | > 500    |
//! | Connection | < 50   | 50-200  | > 200    |
//!
//! Counters here are the in-process source of truth; every change is also
//! mirrored to the Prometheus gauges in [`crate::observability::metrics`].

use crate::observability::metrics as prom;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mailbox depth thresholds for room and dispatcher actors.
pub const ROOM_MAILBOX_NORMAL: usize = 100;
pub const ROOM_MAILBOX_WARNING: usize = 500;

/// Mailbox depth thresholds for connection actors.
pub const CONNECTION_MAILBOX_NORMAL: usize = 50;
pub const CONNECTION_MAILBOX_WARNING: usize = 200;

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// RoomDispatcherActor (singleton).
    Dispatcher,
    /// RoomActor (one per room).
    Room,
    /// ConnectionActor (one per WebSocket).
    Connection,
}

impl ActorType {
    /// Returns the actor type as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Dispatcher => "dispatcher",
            ActorType::Room => "room",
            ActorType::Connection => "connection",
        }
    }

    #[must_use]
    pub const fn warning_threshold(&self) -> usize {
        match self {
            ActorType::Dispatcher | ActorType::Room => ROOM_MAILBOX_WARNING,
            ActorType::Connection => CONNECTION_MAILBOX_WARNING,
        }
    }

    #[must_use]
    pub const fn normal_threshold(&self) -> usize {
        match self {
            ActorType::Dispatcher | ActorType::Room => ROOM_MAILBOX_NORMAL,
            ActorType::Connection => CONNECTION_MAILBOX_NORMAL,
        }
    }
}

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    /// Below normal threshold.
    Normal,
    /// Between normal and warning thresholds.
    Warning,
    /// Above warning threshold.
    Critical,
}

/// Tracks queue depth and throughput for one actor.
///
/// Depth is sampled by the owning actor each time it takes a message, so it
/// reflects the backlog the actor is working through.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    /// Room name, peer id, etc.
    actor_id: String,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    messages_processed: AtomicU64,
    messages_dropped: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    /// Record one message taken off the mailbox. `backlog` is the number
    /// of messages still queued behind it (`Receiver::len`).
    pub fn record_dequeue(&self, backlog: usize) {
        let previous = self.depth.swap(backlog, Ordering::Relaxed);
        self.peak_depth.fetch_max(backlog, Ordering::Relaxed);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        prom::record_actor_mailbox_depth(self.actor_type.as_str(), backlog);

        let level = self.level_for_depth(backlog);
        if level == self.level_for_depth(previous) {
            return;
        }
        match level {
            MailboxLevel::Critical => warn!(
                target: "relay.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = backlog,
                threshold = self.actor_type.warning_threshold(),
                "Mailbox depth critical"
            ),
            MailboxLevel::Warning => debug!(
                target: "relay.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = backlog,
                "Mailbox depth elevated"
            ),
            MailboxLevel::Normal => debug!(
                target: "relay.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = backlog,
                "Mailbox depth back to normal"
            ),
        }
    }

    /// Record a message dropped due to backpressure.
    pub fn record_drop(&self) {
        let dropped = self.messages_dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            target: "relay.actor.mailbox",
            actor_type = self.actor_type.as_str(),
            actor_id = %self.actor_id,
            dropped,
            "Message dropped due to backpressure"
        );
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level_for_depth(self.current_depth())
    }

    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > self.actor_type.warning_threshold() {
            MailboxLevel::Critical
        } else if depth > self.actor_type.normal_threshold() {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Counters shared by every actor in the system.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    /// Rooms currently live.
    pub active_rooms: AtomicUsize,
    /// WebSocket connections currently live.
    pub active_connections: AtomicUsize,
    /// Actor panics (each one is a bug).
    pub actor_panics: AtomicU64,
    /// Messages processed across all actors.
    pub total_messages_processed: AtomicU64,
}

impl ActorMetrics {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn room_created(&self) {
        let count = self.active_rooms.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_rooms_active(count as u64);
    }

    pub fn room_removed(&self) {
        let count = decrement(&self.active_rooms);
        prom::set_rooms_active(count as u64);
    }

    pub fn connection_created(&self) {
        let count = self.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_connections_active(count as u64);
    }

    pub fn connection_closed(&self) {
        let count = decrement(&self.active_connections);
        prom::set_connections_active(count as u64);
    }

    /// Record an actor panic.
    pub fn record_panic(&self, actor_type: ActorType) {
        let total = self.actor_panics.fetch_add(1, Ordering::Relaxed) + 1;
        prom::record_actor_panic(actor_type.as_str());
        tracing::error!(
            target: "relay.actor.panic",
            actor_type = actor_type.as_str(),
            total_panics = total,
            "Actor panic detected - indicates bug, investigation required"
        );
    }

    pub fn record_message_processed(&self) {
        self.total_messages_processed
            .fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.active_rooms.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }
}

/// Saturating decrement; returns the new value.
fn decrement(counter: &AtomicUsize) -> usize {
    counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| Some(c.saturating_sub(1)))
        .map_or(0, |previous| previous.saturating_sub(1))
}
