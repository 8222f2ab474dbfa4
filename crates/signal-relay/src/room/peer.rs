//! Peer identity, declared roles and outbound delivery capability.
//!
//! A `Peer` is created by the transport when a connection is accepted. It is
//! not part of any room until explicitly registered. Other peers only ever
//! see its public serialization, [`PeerInfo`].

use crate::errors::RelayError;
use crate::room::role_graph::normalize_role;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Role assigned to peers that declare no role.
pub const DEFAULT_ROLE: &str = "default";

/// Event names emitted by the relay.
pub mod events {
    /// A newly registered peer is visible to the recipient.
    pub const ADD_PEER: &str = "add-peer";
    /// A peer visible to the recipient left the room.
    pub const PEER_DISCONNECTED: &str = "peer-disconnected";
    /// Relayed negotiation payload, `{ source, signal }`.
    pub const SIGNAL: &str = "signal";
    /// Acknowledgment of a connection request.
    pub const CONNECT_ACCEPTED: &str = "connect-accepted";
}

/// Opaque peer identifier, assigned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap a transport-assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Public serialization of a peer: id and roles, nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub roles: BTreeSet<String>,
}

/// A single event delivered to one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    /// Event name.
    pub event: String,
    /// Optional payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Acknowledgment id, set only on replies to a client request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
}

impl OutboundEvent {
    #[must_use]
    pub fn new(event: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event: event.into(),
            data,
            ack: None,
        }
    }

    /// Reply to a client request carrying acknowledgment id `ack`.
    #[must_use]
    pub fn reply(event: impl Into<String>, ack: Option<u64>, data: Option<Value>) -> Self {
        Self {
            event: event.into(),
            data,
            ack,
        }
    }
}

/// One connected participant.
///
/// Cloning a `Peer` clones the outbound sender, not the connection.
#[derive(Debug, Clone)]
pub struct Peer {
    id: PeerId,
    roles: BTreeSet<String>,
    outbound: mpsc::Sender<OutboundEvent>,
}

impl Peer {
    /// Create a peer. Blank role names are discarded; an empty role set
    /// becomes `{"default"}`.
    pub fn new<I, S>(id: PeerId, roles: I, outbound: mpsc::Sender<OutboundEvent>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut roles: BTreeSet<String> = roles
            .into_iter()
            .filter_map(|r| normalize_role(&r.into()).map(str::to_string))
            .collect();
        if roles.is_empty() {
            roles.insert(DEFAULT_ROLE.to_string());
        }

        Self {
            id,
            roles,
            outbound,
        }
    }

    /// Create a peer together with the receiving end of its outbound queue.
    pub fn channel<I, S>(
        id: PeerId,
        roles: I,
        buffer: usize,
    ) -> (Self, mpsc::Receiver<OutboundEvent>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(id, roles, tx), rx)
    }

    #[must_use]
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    #[must_use]
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        normalize_role(role).is_some_and(|role| self.roles.contains(role))
    }

    /// Public serialization (id + roles).
    #[must_use]
    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            id: self.id.clone(),
            roles: self.roles.clone(),
        }
    }

    /// Deliver a named event to this peer without waiting.
    pub fn emit(&self, event: &str, data: Option<Value>) -> Result<(), RelayError> {
        self.deliver(OutboundEvent::new(event, data))
    }

    /// Deliver a prepared event to this peer without waiting.
    ///
    /// Fails if the transport side is gone or its queue is full; the event is
    /// dropped in both cases.
    pub fn deliver(&self, event: OutboundEvent) -> Result<(), RelayError> {
        self.outbound.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => RelayError::PeerBackpressure(self.id.to_string()),
            TrySendError::Closed(_) => RelayError::PeerChannelClosed(self.id.to_string()),
        })
    }

    /// Whether the transport side has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}
