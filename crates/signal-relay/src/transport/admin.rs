//! Administrative HTTP API, served on the ops listener.
//!
//! - `GET /status` - dispatcher status
//! - `GET /rooms` - live rooms
//! - `GET /rooms/{room}` - room state (peers and role connections)
//! - `DELETE /rooms/{room}` - stop a room and close its sockets
//! - `GET /rooms/{room}/peers/{peer}/authorized` - peers visible to `peer`
//! - `POST /rooms/{room}/roles/connect` / `.../roles/disconnect` - `{"a","b"}`
//! - `POST /rooms/{room}/send` - push an event to peers or roles
//!
//! Admin calls never create rooms. Sends bypass the role graph.

use crate::actors::{DispatcherStatus, RoomDispatcherActorHandle, RoomInfo};
use crate::errors::RelayError;
use crate::observability::{health_router, HealthState};
use crate::room::{PeerId, PeerInfo, RoomState, SendTarget};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Body of the role connect/disconnect endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RolePair {
    pub a: String,
    pub b: String,
}

/// Body of `POST /rooms/{room}/send`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SendRequest {
    pub targets: Vec<SendTarget>,
    pub event: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SendResponse {
    /// Peers the event was queued for.
    pub delivered: usize,
}

/// Router with the admin endpoints.
pub fn admin_router(dispatcher: Arc<RoomDispatcherActorHandle>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/rooms", get(list_rooms))
        .route("/rooms/:room", get(room_state).delete(remove_room))
        .route(
            "/rooms/:room/peers/:peer/authorized",
            get(authorized_peers),
        )
        .route("/rooms/:room/roles/connect", post(connect_roles))
        .route("/rooms/:room/roles/disconnect", post(disconnect_roles))
        .route("/rooms/:room/send", post(send))
        .with_state(dispatcher)
}

/// Everything served on the ops listener: probes, `/metrics` and the admin API.
pub fn ops_router(
    health_state: Arc<HealthState>,
    prometheus_handle: PrometheusHandle,
    dispatcher: Arc<RoomDispatcherActorHandle>,
) -> Router {
    let metrics_router = Router::new().route(
        "/metrics",
        get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );

    health_router(health_state)
        .merge(metrics_router)
        .merge(admin_router(dispatcher))
}

type Dispatcher = State<Arc<RoomDispatcherActorHandle>>;

async fn status(State(dispatcher): Dispatcher) -> Result<Json<DispatcherStatus>, RelayError> {
    Ok(Json(dispatcher.get_status().await?))
}

async fn list_rooms(State(dispatcher): Dispatcher) -> Result<Json<Vec<RoomInfo>>, RelayError> {
    Ok(Json(dispatcher.list_rooms().await?))
}

async fn room_state(
    State(dispatcher): Dispatcher,
    Path(room): Path<String>,
) -> Result<Json<RoomState>, RelayError> {
    let room = dispatcher.get_room(room).await?;
    Ok(Json(room.get_state().await?))
}

async fn remove_room(
    State(dispatcher): Dispatcher,
    Path(room): Path<String>,
) -> Result<StatusCode, RelayError> {
    info!(target: "relay.transport.admin", room = %room, "Removing room");
    dispatcher.remove_room(room).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn authorized_peers(
    State(dispatcher): Dispatcher,
    Path((room, peer)): Path<(String, String)>,
) -> Result<Json<Vec<PeerInfo>>, RelayError> {
    let room = dispatcher.get_room(room).await?;
    Ok(Json(room.authorized_peers(PeerId::new(peer)).await?))
}

async fn connect_roles(
    State(dispatcher): Dispatcher,
    Path(room): Path<String>,
    Json(pair): Json<RolePair>,
) -> Result<StatusCode, RelayError> {
    let room = dispatcher.get_room(room).await?;
    room.connect_roles(pair.a, pair.b).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn disconnect_roles(
    State(dispatcher): Dispatcher,
    Path(room): Path<String>,
    Json(pair): Json<RolePair>,
) -> Result<StatusCode, RelayError> {
    let room = dispatcher.get_room(room).await?;
    room.disconnect_roles(pair.a, pair.b).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn send(
    State(dispatcher): Dispatcher,
    Path(room): Path<String>,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>, RelayError> {
    let room = dispatcher.get_room(room).await?;
    let delivered = room
        .send_to(request.targets, request.event, request.data)
        .await?;
    Ok(Json(SendResponse { delivered }))
}
