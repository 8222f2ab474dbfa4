//! End-to-end WebSocket tests.
//!
//! Runs the real signaling router on `TestRelayServer` and talks to it with
//! `tokio-tungstenite` clients.

use anyhow::{anyhow, Context};
use futures::{SinkExt, StreamExt};
use relay_test_utils::TestRelayServer;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(server: &TestRelayServer, room: &str, roles: &[&str]) -> Result<Client, anyhow::Error> {
    let (socket, _) = connect_async(server.ws_url(room, roles)).await?;
    Ok(socket)
}

async fn send(client: &mut Client, frame: Value) -> Result<(), anyhow::Error> {
    client.send(Message::Text(frame.to_string())).await?;
    Ok(())
}

/// Next JSON text frame, skipping control frames.
async fn recv(client: &mut Client) -> Result<Value, anyhow::Error> {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .context("timed out waiting for a frame")?
            .ok_or_else(|| anyhow!("socket closed"))??;
        if let Message::Text(text) = message {
            return Ok(serde_json::from_str(&text)?);
        }
    }
}

/// Connect, ask to join and wait until the room has `expected_peers`.
async fn join(
    server: &TestRelayServer,
    room: &str,
    roles: &[&str],
    expected_peers: usize,
) -> Result<Client, anyhow::Error> {
    let mut client = connect(server, room, roles).await?;
    send(&mut client, json!({"event": "connect-request", "ack": 1})).await?;
    server.wait_for_peer_count(room, expected_peers).await;
    Ok(client)
}

async fn peer_ids(server: &TestRelayServer, room: &str) -> Result<Vec<String>, anyhow::Error> {
    let handle = server.dispatcher().get_room(room.to_string()).await?;
    Ok(handle
        .get_state()
        .await?
        .peers
        .into_iter()
        .map(|p| p.id.to_string())
        .collect())
}

#[tokio::test]
async fn test_connect_request_is_acknowledged_with_ice_servers() -> Result<(), anyhow::Error> {
    let server = TestRelayServer::spawn_with_vars(HashMap::from([(
        "RELAY_ICE_SERVERS".to_string(),
        "stun:stun.example.org:3478".to_string(),
    )]))
    .await?;

    let mut client = connect(&server, "lobby", &[]).await?;
    send(&mut client, json!({"event": "connect-request", "ack": 7, "data": {"name": "ana"}})).await?;

    let ack = recv(&mut client).await?;
    assert_eq!(ack["event"], "connect-accepted");
    assert_eq!(ack["ack"], 7);
    assert_eq!(
        ack["data"],
        json!({"iceServers": [{"urls": ["stun:stun.example.org:3478"]}]})
    );

    Ok(())
}

#[tokio::test]
async fn test_two_peers_discover_each_other_and_exchange_signals() -> Result<(), anyhow::Error> {
    let server = TestRelayServer::spawn().await?;

    let mut alice = join(&server, "lobby", &[], 1).await?;
    assert_eq!(recv(&mut alice).await?["event"], "connect-accepted");
    let alice_id = peer_ids(&server, "lobby").await?.remove(0);

    let mut bob = join(&server, "lobby", &[], 2).await?;

    // Bob learns about alice before his acknowledgment
    let announced = recv(&mut bob).await?;
    assert_eq!(announced["event"], "add-peer");
    assert_eq!(announced["data"]["id"], alice_id.as_str());
    assert_eq!(announced["data"]["roles"], json!(["default"]));
    assert_eq!(recv(&mut bob).await?["event"], "connect-accepted");

    // Alice learns about bob
    let announced = recv(&mut alice).await?;
    assert_eq!(announced["event"], "add-peer");
    let bob_id = announced["data"]["id"]
        .as_str()
        .ok_or_else(|| anyhow!("add-peer without id"))?
        .to_string();

    send(
        &mut alice,
        json!({"event": "signal", "data": {"target": bob_id, "signal": {"type": "offer"}}}),
    )
    .await?;
    let relayed = recv(&mut bob).await?;
    assert_eq!(relayed["event"], "signal");
    assert_eq!(relayed["data"]["source"], alice_id.as_str());
    assert_eq!(relayed["data"]["signal"], json!({"type": "offer"}));

    // Closing bob's socket tells alice
    bob.close(None).await?;
    let gone = recv(&mut alice).await?;
    assert_eq!(gone["event"], "peer-disconnected");
    assert_eq!(gone["data"]["id"], bob_id.as_str());
    server.wait_for_peer_count("lobby", 1).await;

    Ok(())
}

#[tokio::test]
async fn test_unparseable_frames_are_ignored() -> Result<(), anyhow::Error> {
    let server = TestRelayServer::spawn().await?;
    let mut client = connect(&server, "lobby", &["host"]).await?;

    client.send(Message::Text("not json".to_string())).await?;
    send(&mut client, json!({"event": "no-such-event"})).await?;
    send(&mut client, json!({"event": "connect-request", "ack": 2})).await?;

    // The socket survived and the later request was served
    let ack = recv(&mut client).await?;
    assert_eq!(ack["event"], "connect-accepted");
    assert_eq!(ack["ack"], 2);

    Ok(())
}

#[tokio::test]
async fn test_invalid_room_name_is_rejected() -> Result<(), anyhow::Error> {
    let server = TestRelayServer::spawn().await?;

    let result = connect_async(server.ws_url("bad%20name", &[])).await;
    assert!(result.is_err(), "upgrade should be refused");
    assert!(server.dispatcher().list_rooms().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_removing_room_closes_sockets() -> Result<(), anyhow::Error> {
    let server = TestRelayServer::spawn().await?;
    let mut client = join(&server, "doomed", &[], 1).await?;
    assert_eq!(recv(&mut client).await?["event"], "connect-accepted");

    server.dispatcher().remove_room("doomed".to_string()).await?;

    // The server side closes; the stream ends with a close frame or EOF
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(message) = client.next().await {
            match message {
                Ok(Message::Close(_)) | Err(_) => return,
                Ok(_) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "socket was not closed");

    Ok(())
}
