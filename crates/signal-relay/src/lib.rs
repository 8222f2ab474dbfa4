//! Signal Relay Library
//!
//! Role-based signaling relay for peer-to-peer connection setup. Peers join a
//! named room over a WebSocket, declare roles, and exchange opaque negotiation
//! payloads (SDP offers/answers, ICE candidates) with the peers their roles
//! are connected to. The relay never looks inside those payloads.
//!
//! # Architecture
//!
//! ```text
//! RoomDispatcherActor (room registry, create-if-absent)
//! └── RoomActor (one per room name)
//!     ├── owns Room: peer registry, RoleGraph, role index
//!     ├── ConnectionPolicy decides who gets registered
//!     └── ConnectionActor (one per WebSocket)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Synchronous core**: [`room::Room`] is plain data with no I/O; every
//!   mutation runs to completion inside its actor's mailbox loop
//! - **Authorization is symmetric**: two peers see each other iff one role of
//!   each is connected in the room's role graph
//! - **Unauthorized is silent**: signals to unknown or unauthorized peers are
//!   dropped, never reported back
//! - **Admin sends bypass the graph**: `send_to` addresses peers and roles directly
//!
//! # Modules
//!
//! - [`room`] - Peer, `RoleGraph`, `Room` and connection policies
//! - [`actors`] - Actor runtime (dispatcher, rooms, connections)
//! - [`transport`] - WebSocket endpoint, wire frames, admin API
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with appropriate error codes
//! - [`observability`] - Health probes and Prometheus metrics

pub mod actors;
pub mod config;
pub mod errors;
pub mod observability;
pub mod room;
pub mod transport;
