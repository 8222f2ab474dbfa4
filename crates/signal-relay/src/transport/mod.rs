//! Network surfaces around the actor runtime.
//!
//! - [`ws`] - WebSocket signaling endpoint (`/rooms/{room}/ws`)
//! - [`wire`] - client frame decoding
//! - [`admin`] - admin API and the combined ops router

pub mod admin;
pub mod wire;
pub mod ws;

pub use admin::{admin_router, ops_router, RolePair, SendRequest, SendResponse};
pub use wire::{parse_frame, ClientFrame};
pub use ws::{parse_roles, signaling_router, AppState, ConnectQuery};
