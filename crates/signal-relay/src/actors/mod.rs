//! Actor runtime around the synchronous [`Room`](crate::room::Room) core.
//!
//! ```text
//! RoomDispatcherActor (singleton per relay instance)
//! └── supervises N RoomActors
//!     └── RoomActor (one per room name)
//!         ├── owns the Room (registry, role graph, role index)
//!         └── ConnectionActor (one per WebSocket, token child of the room)
//! ```
//!
//! # Key Design Decisions
//!
//! - **One room, one mailbox**: every operation on a room is serialised through its actor
//! - **Create-if-absent in the dispatcher**: concurrent joins to a new name share one room
//! - **CancellationToken propagation**: parent actors pass child tokens for graceful shutdown
//! - **Mailbox monitoring**: Depth thresholds with metrics (Room: 100/500, Connection: 50/200)
//!
//! # Modules
//!
//! - [`dispatcher`] - `RoomDispatcherActor` singleton, the room registry
//! - [`room`] - `RoomActor` per room
//! - [`connection`] - `ConnectionActor` per WebSocket
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod connection;
pub mod dispatcher;
pub mod messages;
pub mod metrics;
pub mod room;

pub use connection::{ConnectionActor, ConnectionActorHandle};
pub use dispatcher::{
    validate_room_name, DispatcherSettings, PolicyFactory, RoomDispatcherActor,
    RoomDispatcherActorHandle,
};
pub use messages::*;
pub use self::metrics::{ActorMetrics, ActorType, MailboxMonitor};
pub use room::{RoomActor, RoomActorHandle};
