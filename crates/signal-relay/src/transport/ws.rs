//! WebSocket signaling endpoint.
//!
//! `GET /rooms/{room}/ws?roles=a,b` upgrades to a WebSocket. Each socket
//! becomes one [`Peer`] with a fresh UUID. The write half is handed to a
//! [`ConnectionActor`]; the read half stays in the upgrade task, which turns
//! client frames into room actor calls.

use crate::actors::{
    ActorMetrics, ActorType, ConnectionActor, RoomActorHandle, RoomDispatcherActorHandle,
};
use crate::errors::RelayError;
use crate::room::{events, normalize_role, OutboundEvent, Peer, PeerId};

use super::wire::{parse_frame, ClientFrame};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::future::ready;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// How long the upgrade task waits for its connection actor to finish.
const CONNECTION_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared by the signaling routes.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<RoomDispatcherActorHandle>,
    pub metrics: Arc<ActorMetrics>,
    /// Outbound queue size per peer.
    pub peer_channel_buffer: usize,
}

/// Query string of the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    #[serde(default)]
    pub roles: Option<String>,
}

/// Split a comma-separated role list. Blank entries are dropped; the peer
/// falls back to the default role when nothing is left.
#[must_use]
pub fn parse_roles(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .filter_map(normalize_role)
        .map(str::to_string)
        .collect()
}

/// Router serving the WebSocket endpoint.
pub fn signaling_router(state: AppState) -> Router {
    Router::new()
        .route("/rooms/:room/ws", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room): Path<String>,
    Query(query): Query<ConnectQuery>,
    State(state): State<AppState>,
) -> Result<Response, RelayError> {
    // Resolve the room before upgrading so registry errors become HTTP errors
    let room = state.dispatcher.get_or_create_room(room).await?;
    let roles = parse_roles(query.roles.as_deref());

    Ok(ws.on_upgrade(move |socket| serve_socket(socket, room, roles, state)))
}

#[instrument(skip_all, name = "relay.transport.ws", fields(room = %room.name()))]
async fn serve_socket(socket: WebSocket, room: RoomActorHandle, roles: Vec<String>, state: AppState) {
    let peer_id = PeerId::random();
    let (peer, outbound) = Peer::channel(peer_id.clone(), roles, state.peer_channel_buffer);

    info!(
        target: "relay.transport.ws",
        peer_id = %peer_id,
        room = %room.name(),
        roles = ?peer.roles(),
        "WebSocket accepted"
    );

    let (sink, mut stream) = socket.split();
    let sink = sink.with(|text: String| ready(Ok::<_, axum::Error>(Message::Text(text))));

    let (connection, connection_task) = ConnectionActor::spawn(
        peer_id.clone(),
        room.name().to_string(),
        outbound,
        sink,
        room.child_token(),
        Arc::clone(&state.metrics),
    );

    loop {
        tokio::select! {
            () = connection.cancelled() => {
                debug!(
                    target: "relay.transport.ws",
                    peer_id = %peer_id,
                    "Connection cancelled, closing reader"
                );
                break;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => handle_text(&text, &peer, &room).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    // Pings are answered by axum; binary frames carry nothing we understand
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(
                            target: "relay.transport.ws",
                            peer_id = %peer_id,
                            error = %e,
                            "WebSocket read failed"
                        );
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = room.disconnect(peer_id.clone()).await {
        debug!(
            target: "relay.transport.ws",
            peer_id = %peer_id,
            error = %e,
            "Room gone before disconnect"
        );
    }

    connection.cancel();
    match tokio::time::timeout(CONNECTION_JOIN_TIMEOUT, connection_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.is_panic() => {
            error!(
                target: "relay.transport.ws",
                peer_id = %peer_id,
                "ConnectionActor panicked"
            );
            state.metrics.record_panic(ActorType::Connection);
        }
        Ok(Err(_)) => {}
        Err(_) => {
            warn!(
                target: "relay.transport.ws",
                peer_id = %peer_id,
                "ConnectionActor did not stop in time"
            );
        }
    }

    info!(
        target: "relay.transport.ws",
        peer_id = %peer_id,
        room = %room.name(),
        "WebSocket closed"
    );
}

async fn handle_text(text: &str, peer: &Peer, room: &RoomActorHandle) {
    let frame = match parse_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(
                target: "relay.transport.ws",
                peer_id = %peer.id(),
                error = %e,
                "Ignoring unparseable frame"
            );
            return;
        }
    };

    match frame {
        ClientFrame::ConnectRequest { ack, data } => {
            let response = match room.connect_request(peer.clone(), data).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(
                        target: "relay.transport.ws",
                        peer_id = %peer.id(),
                        error = %e,
                        "Connect request failed"
                    );
                    return;
                }
            };

            let payload = match serde_json::to_value(&response) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(
                        target: "relay.transport.ws",
                        error = %e,
                        "Failed to encode connect response"
                    );
                    None
                }
            };
            if let Err(e) = peer.deliver(OutboundEvent::reply(events::CONNECT_ACCEPTED, ack, payload)) {
                debug!(
                    target: "relay.transport.ws",
                    peer_id = %peer.id(),
                    error = %e,
                    "Connect acknowledgment dropped"
                );
            }
        }
        ClientFrame::Signal { data } => {
            if let Err(e) = room.signal(peer.id().clone(), data).await {
                debug!(
                    target: "relay.transport.ws",
                    peer_id = %peer.id(),
                    error = %e,
                    "Signal not forwarded to room"
                );
            }
        }
    }
}
