//! Peer fixtures.
//!
//! A [`TestPeer`] builds a real [`Peer`] whose outbound queue is read by a
//! [`PeerInbox`] instead of a socket.

use serde_json::Value;
use signal_relay::room::{events, OutboundEvent, Peer, PeerId};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// How long inbox assertions wait for an event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(1);

/// Test peer fixture.
#[derive(Debug, Clone)]
pub struct TestPeer {
    /// Peer ID.
    pub id: PeerId,
    /// Declared roles (empty means default).
    pub roles: Vec<String>,
    /// Outbound queue length.
    pub buffer: usize,
}

impl TestPeer {
    /// Create a new test peer with the given ID and no roles.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: PeerId::new(id),
            roles: Vec::new(),
            buffer: 64,
        }
    }

    /// Create a test peer with a random ID.
    #[must_use]
    pub fn random() -> Self {
        Self::new(format!("peer-{}", Uuid::new_v4()))
    }

    /// Add a role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Set the outbound queue length.
    #[must_use]
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    /// Build the peer and the inbox reading its events.
    #[must_use]
    pub fn build(self) -> (Peer, PeerInbox) {
        let (peer, rx) = Peer::channel(self.id.clone(), self.roles, self.buffer);
        (peer, PeerInbox { id: self.id, rx })
    }
}

/// Receiving end of a test peer's outbound queue.
#[derive(Debug)]
pub struct PeerInbox {
    id: PeerId,
    rx: mpsc::Receiver<OutboundEvent>,
}

impl PeerInbox {
    /// ID of the peer this inbox belongs to.
    #[must_use]
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Next queued event, if any, without waiting.
    pub fn try_next(&mut self) -> Option<OutboundEvent> {
        self.rx.try_recv().ok()
    }

    /// Every event queued so far.
    pub fn drain(&mut self) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_next() {
            events.push(event);
        }
        events
    }

    /// Wait for the next event.
    ///
    /// # Panics
    ///
    /// Panics if nothing arrives within [`EVENT_TIMEOUT`] or the queue closes.
    pub async fn next_event(&mut self) -> OutboundEvent {
        match tokio::time::timeout(EVENT_TIMEOUT, self.rx.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => panic!("inbox of {} closed while waiting for an event", self.id),
            Err(_) => panic!("no event for {} within {:?}", self.id, EVENT_TIMEOUT),
        }
    }

    /// Wait for the next event, assert its name and return its payload.
    pub async fn expect_event(&mut self, name: &str) -> Option<Value> {
        let event = self.next_event().await;
        assert_eq!(
            event.event, name,
            "{} received {:?}, expected {name}",
            self.id, event
        );
        event.data
    }

    /// Assert the next event announces `peer`.
    pub async fn expect_add_peer(&mut self, peer: &PeerId) {
        let data = self.expect_event(events::ADD_PEER).await;
        assert_eq!(
            data.as_ref().and_then(|d| d.get("id")).and_then(Value::as_str),
            Some(peer.as_str()),
            "{} got add-peer for the wrong peer: {data:?}",
            self.id
        );
    }

    /// Assert the next event reports that `peer` left.
    pub async fn expect_peer_disconnected(&mut self, peer: &PeerId) {
        let data = self.expect_event(events::PEER_DISCONNECTED).await;
        assert_eq!(
            data.as_ref().and_then(|d| d.get("id")).and_then(Value::as_str),
            Some(peer.as_str()),
            "{} got peer-disconnected for the wrong peer: {data:?}",
            self.id
        );
    }

    /// Assert the next event is a signal from `source` and return its payload.
    pub async fn expect_signal_from(&mut self, source: &PeerId) -> Value {
        let data = self
            .expect_event(events::SIGNAL)
            .await
            .unwrap_or_else(|| panic!("{} got a signal without data", self.id));
        assert_eq!(
            data.get("source").and_then(Value::as_str),
            Some(source.as_str()),
            "{} got a signal from the wrong source: {data:?}",
            self.id
        );
        data.get("signal").cloned().unwrap_or(Value::Null)
    }

    /// Assert nothing is queued.
    pub fn assert_empty(&mut self) {
        let pending = self.drain();
        assert!(
            pending.is_empty(),
            "{} has unexpected events: {pending:?}",
            self.id
        );
    }
}
