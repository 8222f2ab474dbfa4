//! What happens when a peer asks to connect or disconnects.
//!
//! The room itself only announces connection requests. Whether (and how) the
//! newcomer is registered is decided by a [`ConnectionPolicy`] owned by the
//! room actor.

use super::peer::{events, Peer};
use super::Room;
use crate::room::PeerInfo;

use serde_json::Value;
use tracing::debug;

/// Reaction to room lifecycle events.
pub trait ConnectionPolicy: Send + 'static {
    /// A peer sent a connection request. `payload` is whatever it attached.
    fn on_connection(&mut self, room: &mut Room, peer: Peer, payload: Option<Value>);

    /// A registered peer disconnected and has already been unregistered.
    fn on_disconnect(&mut self, _room: &mut Room, _peer: &PeerInfo) {}
}

/// Register every peer that asks, then tell it about each peer it is
/// already authorized to see.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterOnConnect;

impl ConnectionPolicy for RegisterOnConnect {
    fn on_connection(&mut self, room: &mut Room, peer: Peer, _payload: Option<Value>) {
        if !room.register(peer.clone()) {
            return;
        }

        for info in room.authorized_peers_of(&peer) {
            if let Err(e) = peer.emit(events::ADD_PEER, serde_json::to_value(&info).ok()) {
                debug!(
                    target: "relay.room",
                    room = %room.name(),
                    peer_id = %peer.id(),
                    error = %e,
                    "Could not announce existing peer to newcomer"
                );
                break;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::room::{OutboundEvent, PeerId, RoomEvent, RoomOptions};
    use serde_json::json;
    use tokio::sync::mpsc;

    fn drain(rx: &mut mpsc::Receiver<OutboundEvent>) -> Vec<OutboundEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn run_pending(room: &mut Room, policy: &mut impl ConnectionPolicy) {
        for event in room.take_events() {
            match event {
                RoomEvent::Connection { peer, payload } => policy.on_connection(room, peer, payload),
                RoomEvent::Disconnect { peer } => policy.on_disconnect(room, &peer),
            }
        }
    }

    #[test]
    fn test_register_on_connect_introduces_both_sides() {
        let mut room = Room::new("lobby", RoomOptions::default());
        room.connect_roles("host", "guest");
        let mut policy = RegisterOnConnect;

        let (host, mut host_rx) = Peer::channel(PeerId::from("h"), ["host"], 8);
        let (viewer, mut viewer_rx) = Peer::channel(PeerId::from("v"), ["viewer"], 8);
        room.handle_connect_request(host, None);
        room.handle_connect_request(viewer, None);
        run_pending(&mut room, &mut policy);
        assert!(drain(&mut host_rx).is_empty());

        let (guest, mut guest_rx) = Peer::channel(PeerId::from("g"), ["guest"], 8);
        room.handle_connect_request(guest.clone(), Some(json!({"name": "gail"})));
        run_pending(&mut room, &mut policy);

        assert!(room.is_registered(guest.id()));

        let to_host = drain(&mut host_rx);
        assert_eq!(to_host.len(), 1);
        assert_eq!(to_host[0].data, Some(json!({"id": "g", "roles": ["guest"]})));

        let to_guest = drain(&mut guest_rx);
        assert_eq!(to_guest.len(), 1);
        assert_eq!(to_guest[0].event, events::ADD_PEER);
        assert_eq!(to_guest[0].data, Some(json!({"id": "h", "roles": ["host"]})));

        assert!(drain(&mut viewer_rx).is_empty());
    }

    #[test]
    fn test_repeated_connect_request_does_not_reannounce() {
        let mut room = Room::new("lobby", RoomOptions::default());
        let mut policy = RegisterOnConnect;

        let (p1, mut rx1) = Peer::channel(PeerId::from("p1"), Vec::<String>::new(), 8);
        let (p2, mut rx2) = Peer::channel(PeerId::from("p2"), Vec::<String>::new(), 8);
        room.handle_connect_request(p1.clone(), None);
        room.handle_connect_request(p2.clone(), None);
        run_pending(&mut room, &mut policy);
        drain(&mut rx1);
        drain(&mut rx2);

        room.handle_connect_request(p2, None);
        run_pending(&mut room, &mut policy);
        assert!(drain(&mut rx1).is_empty());
        assert!(drain(&mut rx2).is_empty());
        assert_eq!(room.peer_count(), 2);
    }
}
