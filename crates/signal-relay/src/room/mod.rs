//! Room: peer registry, role graph and signal relay for one namespace.
//!
//! A `Room` is plain single-owner state. It performs no I/O beyond pushing
//! events into peers' outbound queues (fire-and-forget) and queueing
//! lifecycle events for whoever owns it (see [`Room::take_events`]). The
//! [`RoomActor`](crate::actors::RoomActor) serialises access to it.
//!
//! # Authorization
//!
//! Peer X is authorized relative to peer Y iff X != Y and some role of X is
//! connected to some role of Y in the role graph. Discovery (`add-peer`,
//! `peer-disconnected`) and signal relay go through this predicate.
//! Administrative sends ([`Room::send_to`]) do not.

pub mod options;
pub mod peer;
pub mod policy;
pub mod role_graph;
mod role_index;

pub use options::{ConnectResponse, IceServer, RoomOptions};
pub use peer::{events, OutboundEvent, Peer, PeerId, PeerInfo, DEFAULT_ROLE};
pub use policy::{ConnectionPolicy, RegisterOnConnect};
pub use role_graph::{normalize_role, RoleGraph};

use crate::errors::RelayError;
use crate::observability::metrics;
use role_index::RoleIndex;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::{debug, info};

/// Target of an administrative send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SendTarget {
    /// One registered peer.
    Peer { id: PeerId },
    /// Every registered peer holding the role.
    Role { name: String },
}

impl From<&Peer> for SendTarget {
    fn from(peer: &Peer) -> Self {
        SendTarget::Peer {
            id: peer.id().clone(),
        }
    }
}

impl From<PeerId> for SendTarget {
    fn from(id: PeerId) -> Self {
        SendTarget::Peer { id }
    }
}

impl From<&PeerId> for SendTarget {
    fn from(id: &PeerId) -> Self {
        SendTarget::Peer { id: id.clone() }
    }
}

impl From<&str> for SendTarget {
    fn from(role: &str) -> Self {
        SendTarget::Role {
            name: role.to_string(),
        }
    }
}

impl From<String> for SendTarget {
    fn from(role: String) -> Self {
        SendTarget::Role { name: role }
    }
}

/// Signal-forwarding request from a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRequest {
    pub target: PeerId,
    /// Opaque negotiation payload, forwarded verbatim. Absent is `null`.
    #[serde(default)]
    pub signal: Value,
}

/// Lifecycle events queued for the room's owner.
#[derive(Debug)]
pub enum RoomEvent {
    /// A peer asked to connect. It is not registered yet.
    Connection {
        peer: Peer,
        payload: Option<Value>,
    },
    /// A registered peer disconnected and has been unregistered.
    Disconnect { peer: PeerInfo },
}

/// Point-in-time view of a room.
#[derive(Debug, Clone, Serialize)]
pub struct RoomState {
    pub name: String,
    pub created_at: i64,
    pub peers: Vec<PeerInfo>,
    pub role_connections: Vec<(String, String)>,
}

/// One isolated signaling namespace.
#[derive(Debug)]
pub struct Room {
    name: String,
    options: RoomOptions,
    created_at: i64,
    peers: HashMap<PeerId, Peer>,
    role_graph: RoleGraph,
    role_index: RoleIndex,
    events: VecDeque<RoomEvent>,
}

impl Room {
    /// Create a room seeded with `default <-> default` and the configured
    /// role connections.
    pub fn new(name: impl Into<String>, options: RoomOptions) -> Self {
        let mut role_graph = RoleGraph::new();
        role_graph.connect(DEFAULT_ROLE, DEFAULT_ROLE);
        for (a, b) in &options.role_connections {
            role_graph.connect(a, b);
        }

        Self {
            name: name.into(),
            options,
            created_at: chrono::Utc::now().timestamp(),
            peers: HashMap::new(),
            role_graph,
            role_index: RoleIndex::default(),
            events: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    // ------------------------------------------------------------------
    // Role graph
    // ------------------------------------------------------------------

    pub fn connect_roles(&mut self, a: &str, b: &str) {
        if self.role_graph.connect(a, b) {
            debug!(target: "relay.room", room = %self.name, role_a = %a, role_b = %b, "Roles connected");
        }
    }

    pub fn disconnect_roles(&mut self, a: &str, b: &str) {
        if self.role_graph.disconnect(a, b) {
            debug!(target: "relay.room", room = %self.name, role_a = %a, role_b = %b, "Roles disconnected");
        }
    }

    #[must_use]
    pub fn are_roles_connected(&self, a: &str, b: &str) -> bool {
        self.role_graph.are_connected(a, b)
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register `peer`, first announcing it (`add-peer`) to every peer
    /// already authorized to see it. The newcomer itself is not told about
    /// existing peers here.
    ///
    /// Returns `false` if a peer with the same id is already registered.
    pub fn register(&mut self, peer: Peer) -> bool {
        if self.peers.contains_key(peer.id()) {
            debug!(target: "relay.room", room = %self.name, peer_id = %peer.id(), "Peer already registered");
            return false;
        }

        let announced = self.notify_authorized(
            peer.id(),
            peer.roles(),
            events::ADD_PEER,
            to_payload(&peer.info()),
        );

        self.role_index.insert(peer.id(), peer.roles());
        info!(
            target: "relay.room",
            room = %self.name,
            peer_id = %peer.id(),
            roles = ?peer.roles(),
            announced,
            "Peer registered"
        );
        self.peers.insert(peer.id().clone(), peer);
        true
    }

    /// Remove a peer, then tell every peer that was authorized to see it
    /// (`peer-disconnected`).
    ///
    /// Returns `false` (and notifies nobody) if the peer is not registered.
    pub fn unregister(&mut self, id: &PeerId) -> bool {
        let Some(peer) = self.peers.remove(id) else {
            return false;
        };
        self.role_index.remove(peer.id(), peer.roles());

        let notified = self.notify_authorized(
            peer.id(),
            peer.roles(),
            events::PEER_DISCONNECTED,
            to_payload(&peer.info()),
        );

        info!(
            target: "relay.room",
            room = %self.name,
            peer_id = %id,
            notified,
            remaining_peers = self.peers.len(),
            "Peer unregistered"
        );
        true
    }

    #[must_use]
    pub fn is_registered(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    // ------------------------------------------------------------------
    // Authorization
    // ------------------------------------------------------------------

    /// Registered peers currently authorized relative to `peer`, ordered by id.
    ///
    /// `peer` need not be registered itself.
    #[must_use]
    pub fn authorized_peers_of(&self, peer: &Peer) -> Vec<PeerInfo> {
        self.authorized_ids(peer.id(), peer.roles())
            .iter()
            .filter_map(|id| self.peers.get(id))
            .map(Peer::info)
            .collect()
    }

    /// Same as [`Room::authorized_peers_of`] for a registered peer id.
    pub fn authorized_peers_for(&self, id: &PeerId) -> Result<Vec<PeerInfo>, RelayError> {
        let peer = self
            .peers
            .get(id)
            .ok_or_else(|| RelayError::PeerNotFound(id.to_string()))?;
        Ok(self.authorized_peers_of(peer))
    }

    /// Whether `a` and `b` may signal each other.
    #[must_use]
    pub fn is_authorized(&self, a: &Peer, b: &Peer) -> bool {
        a.id() != b.id() && self.roles_authorized(a.roles(), b.roles())
    }

    fn roles_authorized(&self, a: &BTreeSet<String>, b: &BTreeSet<String>) -> bool {
        a.iter()
            .any(|ra| b.iter().any(|rb| self.role_graph.are_connected(ra, rb)))
    }

    /// Index-backed lookup: for each role, each connected role, each holder.
    fn authorized_ids(&self, source: &PeerId, roles: &BTreeSet<String>) -> BTreeSet<PeerId> {
        let mut ids = BTreeSet::new();
        for role in roles {
            for neighbor in self.role_graph.neighbors(role) {
                ids.extend(
                    self.role_index
                        .peers_with_role(neighbor)
                        .filter(|id| *id != source)
                        .cloned(),
                );
            }
        }
        ids
    }

    /// Pairwise scan over the registry; reference for `authorized_ids`.
    #[cfg(test)]
    fn authorized_ids_by_scan(&self, source: &PeerId, roles: &BTreeSet<String>) -> BTreeSet<PeerId> {
        self.peers
            .values()
            .filter(|candidate| {
                candidate.id() != source && self.roles_authorized(roles, candidate.roles())
            })
            .map(|candidate| candidate.id().clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------

    /// Administrative push to a peer or every holder of a role. Ignores the
    /// role graph. Returns the number of peers the event was queued for.
    pub fn send_to(&self, target: impl Into<SendTarget>, event: &str, data: Option<Value>) -> usize {
        self.send_to_many([target.into()], event, data)
    }

    /// [`Room::send_to`] over several targets; each recipient gets the event
    /// once even if matched by several targets.
    pub fn send_to_many<I>(&self, targets: I, event: &str, data: Option<Value>) -> usize
    where
        I: IntoIterator,
        I::Item: Into<SendTarget>,
    {
        let mut recipients = BTreeSet::new();
        for target in targets {
            match target.into() {
                SendTarget::Peer { id } => {
                    if self.peers.contains_key(&id) {
                        recipients.insert(id);
                    }
                }
                SendTarget::Role { name } => {
                    if let Some(role) = normalize_role(&name) {
                        recipients.extend(self.role_index.peers_with_role(role).cloned());
                    }
                }
            }
        }

        recipients
            .iter()
            .filter_map(|id| self.peers.get(id))
            .filter(|peer| self.emit_to(peer, OutboundEvent::new(event, data.clone())))
            .count()
    }

    fn notify_authorized(
        &self,
        source: &PeerId,
        roles: &BTreeSet<String>,
        event: &str,
        data: Option<Value>,
    ) -> usize {
        self.authorized_ids(source, roles)
            .iter()
            .filter_map(|id| self.peers.get(id))
            .filter(|peer| self.emit_to(peer, OutboundEvent::new(event, data.clone())))
            .count()
    }

    fn emit_to(&self, peer: &Peer, event: OutboundEvent) -> bool {
        match peer.deliver(event) {
            Ok(()) => true,
            Err(e) => {
                debug!(
                    target: "relay.room",
                    room = %self.name,
                    peer_id = %peer.id(),
                    error = %e,
                    "Outbound event dropped"
                );
                metrics::record_message_dropped(match e {
                    RelayError::PeerBackpressure(_) => "backpressure",
                    _ => "channel_closed",
                });
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Inbound transport events
    // ------------------------------------------------------------------

    /// A peer asks to connect. Queues a [`RoomEvent::Connection`] for the
    /// owner and returns the acknowledgment payload. Does not register.
    pub fn handle_connect_request(&mut self, peer: Peer, payload: Option<Value>) -> ConnectResponse {
        debug!(target: "relay.room", room = %self.name, peer_id = %peer.id(), "Connection request");
        self.events.push_back(RoomEvent::Connection { peer, payload });
        ConnectResponse {
            ice_servers: self.options.ice_servers.clone(),
        }
    }

    /// Forward `request.signal` from `source` to `request.target`, tagged
    /// with the source id.
    ///
    /// Returns `false` when the signal is dropped: unregistered source or
    /// target, peers not authorized, or target queue unavailable.
    pub fn handle_signal(&self, source: &PeerId, request: SignalRequest) -> bool {
        let relayed = self.relay_signal(source, request);
        metrics::record_signal(if relayed { "relayed" } else { "dropped" });
        relayed
    }

    fn relay_signal(&self, source: &PeerId, request: SignalRequest) -> bool {
        let Some(source_peer) = self.peers.get(source) else {
            return false;
        };
        let Some(target_peer) = self.peers.get(&request.target) else {
            return false;
        };
        if !self.is_authorized(source_peer, target_peer) {
            return false;
        }

        debug!(
            target: "relay.room",
            room = %self.name,
            source = %source,
            target = %request.target,
            "Relaying signal"
        );
        let data = json!({
            "source": source,
            "signal": request.signal,
        });
        self.emit_to(target_peer, OutboundEvent::new(events::SIGNAL, Some(data)))
    }

    /// Transport-level disconnect. Queues a [`RoomEvent::Disconnect`] and
    /// unregisters the peer; duplicate or unknown disconnects are absorbed.
    pub fn handle_disconnect(&mut self, id: &PeerId) -> bool {
        let Some(info) = self.peers.get(id).map(Peer::info) else {
            return false;
        };
        self.events.push_back(RoomEvent::Disconnect { peer: info });
        self.unregister(id)
    }

    /// Drain queued lifecycle events, oldest first.
    pub fn take_events(&mut self) -> Vec<RoomEvent> {
        self.events.drain(..).collect()
    }

    #[must_use]
    pub fn state(&self) -> RoomState {
        let mut peers: Vec<PeerInfo> = self.peers.values().map(Peer::info).collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));

        RoomState {
            name: self.name.clone(),
            created_at: self.created_at,
            peers,
            role_connections: self.role_graph.edges().into_iter().collect(),
        }
    }
}

fn to_payload(info: &PeerInfo) -> Option<Value> {
    serde_json::to_value(info).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tokio::sync::mpsc;

    fn peer(id: &str, roles: &[&str]) -> (Peer, mpsc::Receiver<OutboundEvent>) {
        Peer::channel(PeerId::from(id), roles.iter().copied(), 32)
    }

    fn drain(rx: &mut mpsc::Receiver<OutboundEvent>) -> Vec<OutboundEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn room() -> Room {
        Room::new("lobby", RoomOptions::default())
    }

    fn signal(target: &str) -> SignalRequest {
        SignalRequest {
            target: PeerId::from(target),
            signal: json!({"sdp": "offer"}),
        }
    }

    #[test]
    fn test_default_role_peers_are_authorized() {
        let mut room = room();
        let (p1, _rx1) = peer("p1", &[]);
        let (p2, _rx2) = peer("p2", &[]);
        room.register(p1.clone());
        room.register(p2.clone());

        assert!(room.is_authorized(&p1, &p2));
        assert!(room.is_authorized(&p2, &p1));
    }

    #[test]
    fn test_peer_never_authorized_with_itself() {
        let mut room = room();
        let (p1, _rx1) = peer("p1", &["host", "default"]);
        room.connect_roles("host", "host");
        room.register(p1.clone());

        assert!(!room.is_authorized(&p1, &p1));
        assert!(room.authorized_peers_of(&p1).is_empty());
    }

    #[test]
    fn test_authorization_is_symmetric() {
        let mut room = room();
        room.connect_roles("host", "guest");
        room.connect_roles("viewer", "viewer");

        let role_sets: [&[&str]; 6] = [
            &[],
            &["host"],
            &["guest"],
            &["viewer"],
            &["host", "viewer"],
            &["other"],
        ];
        let peers: Vec<Peer> = role_sets
            .iter()
            .enumerate()
            .map(|(i, roles)| peer(&format!("p{i}"), roles).0)
            .collect();

        for a in &peers {
            for b in &peers {
                assert_eq!(room.is_authorized(a, b), room.is_authorized(b, a));
            }
        }
    }

    #[test]
    fn test_register_announces_to_authorized_peers_only() {
        let mut room = room();
        room.connect_roles("host", "guest");

        let (host, mut host_rx) = peer("host-1", &["host"]);
        let (other, mut other_rx) = peer("other-1", &["other"]);
        room.register(host);
        room.register(other);

        let (guest, mut guest_rx) = peer("guest-1", &["guest"]);
        assert!(room.register(guest));

        let host_events = drain(&mut host_rx);
        assert_eq!(host_events.len(), 1);
        assert_eq!(host_events[0].event, events::ADD_PEER);
        assert_eq!(
            host_events[0].data,
            Some(json!({"id": "guest-1", "roles": ["guest"]}))
        );

        assert!(drain(&mut other_rx).is_empty());
        // The newcomer is not told about existing peers by register itself
        assert!(drain(&mut guest_rx).is_empty());
    }

    #[test]
    fn test_duplicate_register_is_noop() {
        let mut room = room();
        let (p1, _rx1) = peer("p1", &[]);
        let (p2, mut rx2) = peer("p2", &[]);
        room.register(p2);
        assert!(room.register(p1.clone()));
        assert_eq!(drain(&mut rx2).len(), 1);

        assert!(!room.register(p1));
        assert!(drain(&mut rx2).is_empty());
        assert_eq!(room.peer_count(), 2);
    }

    #[test]
    fn test_unregister_notifies_once() {
        let mut room = room();
        let (p1, _rx1) = peer("p1", &[]);
        let (p2, mut rx2) = peer("p2", &[]);
        room.register(p2);
        room.register(p1.clone());
        drain(&mut rx2);

        assert!(room.unregister(p1.id()));
        let events = drain(&mut rx2);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, events::PEER_DISCONNECTED);
        assert_eq!(events[0].data, Some(json!({"id": "p1", "roles": ["default"]})));

        assert!(!room.unregister(p1.id()));
        assert!(drain(&mut rx2).is_empty());
    }

    #[test]
    fn test_unregister_unknown_peer_is_noop() {
        let mut room = room();
        let (p2, mut rx2) = peer("p2", &[]);
        room.register(p2);

        assert!(!room.unregister(&PeerId::from("never-registered")));
        assert!(drain(&mut rx2).is_empty());
    }

    #[test]
    fn test_register_then_unregister_leaves_no_residue() {
        let mut room = room();
        let (p1, _rx1) = peer("p1", &[]);
        let (p2, _rx2) = peer("p2", &[]);
        room.register(p2.clone());
        room.register(p1.clone());
        room.unregister(p1.id());

        assert!(!room.is_registered(p1.id()));
        assert!(room.authorized_peers_of(&p2).is_empty());
        assert_eq!(room.send_to("default", "ping", None), 1);
    }

    #[test]
    fn test_host_guest_signal_follows_role_graph() {
        let mut room = room();
        room.connect_roles("host", "guest");

        let (host, _host_rx) = peer("h", &["host"]);
        let (guest, mut guest_rx) = peer("g", &["guest"]);
        room.register(host.clone());
        room.register(guest);

        assert!(room.handle_signal(host.id(), signal("g")));
        let events = drain(&mut guest_rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, events::SIGNAL);
        assert_eq!(
            events[0].data,
            Some(json!({"source": "h", "signal": {"sdp": "offer"}}))
        );

        room.disconnect_roles("host", "guest");
        assert!(!room.handle_signal(host.id(), signal("g")));
        assert!(drain(&mut guest_rx).is_empty());
    }

    #[test]
    fn test_signal_via_other_connected_role_survives_disconnect() {
        let mut room = room();
        room.connect_roles("host", "guest");
        room.connect_roles("moderator", "guest");

        let (host, _host_rx) = peer("h", &["host", "moderator"]);
        let (guest, _guest_rx) = peer("g", &["guest"]);
        room.register(host.clone());
        room.register(guest.clone());

        room.disconnect_roles("host", "guest");
        assert!(room.is_authorized(&host, &guest));
        assert!(room.handle_signal(host.id(), signal("g")));
    }

    #[test]
    fn test_signal_dropped_for_unknown_or_unregistered_peers() {
        let mut room = room();
        let (p1, _rx1) = peer("p1", &[]);
        let (p2, mut rx2) = peer("p2", &[]);
        room.register(p2.clone());

        // Source not registered
        assert!(!room.handle_signal(p1.id(), signal("p2")));
        assert!(drain(&mut rx2).is_empty());

        room.register(p1.clone());
        drain(&mut rx2);

        // Target unknown
        assert!(!room.handle_signal(p1.id(), signal("ghost")));

        // Target left
        room.unregister(p2.id());
        assert!(!room.handle_signal(p1.id(), signal("p2")));
        assert!(drain(&mut rx2).is_empty());
    }

    #[test]
    fn test_signal_payload_forwarded_opaquely() {
        let mut room = room();
        let (p1, _rx1) = peer("p1", &[]);
        let (p2, mut rx2) = peer("p2", &[]);
        room.register(p1.clone());
        room.register(p2);

        let odd = json!([1, "two", null, {"nested": [true]}]);
        assert!(room.handle_signal(
            p1.id(),
            SignalRequest {
                target: PeerId::from("p2"),
                signal: odd.clone(),
            }
        ));
        let events = drain(&mut rx2);
        assert_eq!(events[0].data, Some(json!({"source": "p1", "signal": odd})));
    }

    #[test]
    fn test_signal_without_payload_is_relayed_as_null() {
        let mut room = room();
        let (p1, _rx1) = peer("p1", &[]);
        let (p2, mut rx2) = peer("p2", &[]);
        room.register(p1.clone());
        room.register(p2);

        let request: SignalRequest = serde_json::from_value(json!({"target": "p2"})).unwrap();
        assert!(room.handle_signal(p1.id(), request));

        let events = drain(&mut rx2);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, Some(json!({"source": "p1", "signal": null})));
    }

    #[test]
    fn test_padded_role_names_match_peer_roles() {
        let mut room = room();
        room.connect_roles(" host", "guest ");

        let (host, _host_rx) = peer("host-1", &[" host"]);
        let (guest, mut guest_rx) = peer("guest-1", &["guest "]);
        room.register(host.clone());
        room.register(guest.clone());

        assert!(room.are_roles_connected("host", "guest"));
        assert!(room.is_authorized(&host, &guest));
        assert!(room.handle_signal(host.id(), signal("guest-1")));
        assert_eq!(drain(&mut guest_rx).len(), 1);
        assert_eq!(room.send_to(" guest", "ping", None), 1);

        room.disconnect_roles("guest", "  host  ");
        assert!(!room.is_authorized(&host, &guest));
        assert!(room.state().role_connections.iter().all(|(a, _)| a == DEFAULT_ROLE));
    }

    #[test]
    fn test_send_to_role_ignores_role_graph() {
        let mut room = room();
        let (g1, mut g1_rx) = peer("g1", &["guest"]);
        let (g2, mut g2_rx) = peer("g2", &["guest", "viewer"]);
        let (h, mut h_rx) = peer("h", &["host"]);
        room.register(g1);
        room.register(g2);
        room.register(h);

        assert_eq!(room.send_to("guest", "kick", Some(json!({"why": "test"}))), 2);
        assert_eq!(drain(&mut g1_rx).len(), 1);
        let g2_events = drain(&mut g2_rx);
        assert_eq!(g2_events.len(), 1);
        assert_eq!(g2_events[0].event, "kick");
        assert!(drain(&mut h_rx).is_empty());
    }

    #[test]
    fn test_send_to_many_deduplicates_and_skips_unregistered() {
        let mut room = room();
        let (g, mut g_rx) = peer("g", &["guest", "viewer"]);
        let (outsider, mut outsider_rx) = peer("x", &["guest"]);
        room.register(g.clone());

        let targets = vec![
            SendTarget::from("guest"),
            SendTarget::from("viewer"),
            SendTarget::from(&g),
            SendTarget::from(&outsider),
        ];
        assert_eq!(room.send_to_many(targets, "notice", None), 1);
        assert_eq!(drain(&mut g_rx).len(), 1);
        assert!(drain(&mut outsider_rx).is_empty());

        assert_eq!(room.send_to(&outsider, "notice", None), 0);
    }

    #[test]
    fn test_closed_peer_does_not_block_others() {
        let mut room = room();
        let (p1, rx1) = peer("p1", &[]);
        let (p2, mut rx2) = peer("p2", &[]);
        room.register(p1);
        room.register(p2);
        drop(rx1);
        drain(&mut rx2);

        assert_eq!(room.send_to("default", "ping", None), 1);
        assert_eq!(drain(&mut rx2).len(), 1);
    }

    #[test]
    fn test_connect_request_queues_event_without_registering() {
        let options = RoomOptions {
            ice_servers: vec![IceServer::new("stun:stun.example.com:3478")],
            role_connections: Vec::new(),
        };
        let mut room = Room::new("lobby", options);
        let (p1, _rx1) = peer("p1", &["host"]);

        let response = room.handle_connect_request(p1.clone(), Some(json!({"name": "alice"})));
        assert_eq!(response.ice_servers.len(), 1);
        assert!(!room.is_registered(p1.id()));

        let events = room.take_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            RoomEvent::Connection { peer, payload } => {
                assert_eq!(peer.id(), p1.id());
                assert_eq!(payload, &Some(json!({"name": "alice"})));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(room.take_events().is_empty());
    }

    #[test]
    fn test_disconnect_is_absorbed_after_first() {
        let mut room = room();
        let (p1, _rx1) = peer("p1", &[]);
        let (p2, mut rx2) = peer("p2", &[]);
        room.register(p2);
        room.register(p1.clone());
        drain(&mut rx2);

        assert!(room.handle_disconnect(p1.id()));
        assert!(!room.handle_disconnect(p1.id()));

        let disconnects: Vec<_> = drain(&mut rx2)
            .into_iter()
            .filter(|e| e.event == events::PEER_DISCONNECTED)
            .collect();
        assert_eq!(disconnects.len(), 1);

        let events = room.take_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], RoomEvent::Disconnect { peer } if peer.id == *p1.id()));
    }

    #[test]
    fn test_configured_role_connections_seeded() {
        let options = RoomOptions {
            ice_servers: Vec::new(),
            role_connections: vec![("host".to_string(), "guest".to_string())],
        };
        let room = Room::new("stage", options);

        assert!(room.are_roles_connected("default", "default"));
        assert!(room.are_roles_connected("guest", "host"));

        let state = room.state();
        assert_eq!(state.name, "stage");
        assert_eq!(
            state.role_connections,
            vec![
                ("default".to_string(), "default".to_string()),
                ("guest".to_string(), "host".to_string()),
            ]
        );
    }

    #[test]
    fn test_authorized_peers_for_unknown_id() {
        let room = room();
        assert!(matches!(
            room.authorized_peers_for(&PeerId::from("ghost")),
            Err(RelayError::PeerNotFound(_))
        ));
    }

    #[test]
    fn test_role_index_matches_scan() {
        const ROLES: [&str; 5] = ["default", "host", "guest", "viewer", "bot"];
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut room = room();
        let mut receivers = Vec::new();
        let mut known: Vec<Peer> = Vec::new();

        for step in 0..400 {
            match rng.gen_range(0..4) {
                0 => {
                    let roles: Vec<&str> = ROLES
                        .iter()
                        .copied()
                        .filter(|_| rng.gen_bool(0.3))
                        .collect();
                    let (p, rx) = peer(&format!("p{step}"), &roles);
                    receivers.push(rx);
                    room.register(p.clone());
                    known.push(p);
                }
                1 if !known.is_empty() => {
                    let i = rng.gen_range(0..known.len());
                    room.unregister(known[i].id());
                }
                2 => {
                    let a = ROLES[rng.gen_range(0..ROLES.len())];
                    let b = ROLES[rng.gen_range(0..ROLES.len())];
                    room.connect_roles(a, b);
                }
                _ => {
                    let a = ROLES[rng.gen_range(0..ROLES.len())];
                    let b = ROLES[rng.gen_range(0..ROLES.len())];
                    room.disconnect_roles(a, b);
                }
            }

            for p in &known {
                assert_eq!(
                    room.authorized_ids(p.id(), p.roles()),
                    room.authorized_ids_by_scan(p.id(), p.roles()),
                    "index and scan disagree at step {step}"
                );
            }
        }
    }
}
