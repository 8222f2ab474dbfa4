//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via `tokio::sync::mpsc`.
//! Response patterns use `tokio::sync::oneshot` for request-reply semantics.

use crate::errors::RelayError;
use crate::room::{ConnectResponse, Peer, PeerId, PeerInfo, RoomState, SendTarget, SignalRequest};

use super::room::RoomActorHandle;

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;

/// Messages sent to `RoomDispatcherActor`.
#[derive(Debug)]
pub enum DispatcherMessage {
    /// Return the room with this name, creating it if absent.
    GetOrCreateRoom {
        name: String,
        respond_to: oneshot::Sender<Result<RoomActorHandle, RelayError>>,
    },

    /// Return an existing room.
    GetRoom {
        name: String,
        respond_to: oneshot::Sender<Result<RoomActorHandle, RelayError>>,
    },

    /// Stop a room and forget it.
    RemoveRoom {
        name: String,
        respond_to: oneshot::Sender<Result<(), RelayError>>,
    },

    /// Summaries of every live room.
    ListRooms {
        respond_to: oneshot::Sender<Vec<RoomInfo>>,
    },

    /// Dispatcher status (for readiness and the admin API).
    GetStatus {
        respond_to: oneshot::Sender<DispatcherStatus>,
    },

    /// Stop accepting rooms and drain existing ones.
    Shutdown {
        /// How long to wait for room actors to stop.
        deadline: Duration,
        respond_to: oneshot::Sender<Result<(), RelayError>>,
    },
}

/// Messages sent to `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    /// A connected peer asked to join.
    ConnectRequest {
        peer: Peer,
        payload: Option<Value>,
        respond_to: oneshot::Sender<ConnectResponse>,
    },

    /// Forward a signal from `source`.
    Signal {
        source: PeerId,
        request: SignalRequest,
    },

    /// The transport for `peer_id` went away.
    Disconnect { peer_id: PeerId },

    ConnectRoles {
        a: String,
        b: String,
        respond_to: oneshot::Sender<()>,
    },

    DisconnectRoles {
        a: String,
        b: String,
        respond_to: oneshot::Sender<()>,
    },

    /// Administrative push, bypassing the role graph.
    SendTo {
        targets: Vec<SendTarget>,
        event: String,
        data: Option<Value>,
        /// Number of peers the event was queued for.
        respond_to: oneshot::Sender<usize>,
    },

    AuthorizedPeers {
        peer_id: PeerId,
        respond_to: oneshot::Sender<Result<Vec<PeerInfo>, RelayError>>,
    },

    IsRegistered {
        peer_id: PeerId,
        respond_to: oneshot::Sender<bool>,
    },

    GetState {
        respond_to: oneshot::Sender<RoomState>,
    },
}

impl RoomMessage {
    /// Bounded label for latency metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            RoomMessage::ConnectRequest { .. } => "connect_request",
            RoomMessage::Signal { .. } => "signal",
            RoomMessage::Disconnect { .. } => "disconnect",
            RoomMessage::ConnectRoles { .. } => "connect_roles",
            RoomMessage::DisconnectRoles { .. } => "disconnect_roles",
            RoomMessage::SendTo { .. } => "send_to",
            RoomMessage::AuthorizedPeers { .. } => "authorized_peers",
            RoomMessage::IsRegistered { .. } => "is_registered",
            RoomMessage::GetState { .. } => "get_state",
        }
    }
}

/// Summary of one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    pub name: String,
    pub peer_count: usize,
    pub created_at: i64,
}

/// Dispatcher status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatcherStatus {
    pub room_count: usize,
    pub connection_count: usize,
    pub is_draining: bool,
    pub mailbox_depth: usize,
}
