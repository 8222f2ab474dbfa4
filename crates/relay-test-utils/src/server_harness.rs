//! Test server harness for E2E testing
//!
//! Provides `TestRelayServer` for spawning a real relay in tests.

use signal_relay::actors::{ActorMetrics, DispatcherSettings, RoomDispatcherActorHandle};
use signal_relay::config::Config;
use signal_relay::transport::{admin_router, signaling_router, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Test harness serving the signaling and admin routers on one random port.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_join() -> Result<(), anyhow::Error> {
///     let server = TestRelayServer::spawn().await?;
///     let (mut socket, _) = tokio_tungstenite::connect_async(server.ws_url("lobby", &["host"])).await?;
///     Ok(())
/// }
/// ```
pub struct TestRelayServer {
    addr: SocketAddr,
    config: Config,
    dispatcher: Arc<RoomDispatcherActorHandle>,
    metrics: Arc<ActorMetrics>,
    _handle: JoinHandle<()>,
}

impl TestRelayServer {
    /// Spawn with default configuration (no ICE servers).
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(HashMap::from([(
            "RELAY_ICE_SERVERS".to_string(),
            String::new(),
        )]))
        .await
    }

    /// Spawn with configuration built from `vars`.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    pub async fn spawn_with_vars(mut vars: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        vars.insert("RELAY_BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string());

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let metrics = ActorMetrics::new();
        let dispatcher = Arc::new(RoomDispatcherActorHandle::new(
            DispatcherSettings::new(config.room_options(), config.max_rooms),
            Arc::clone(&metrics),
        ));

        let app = signaling_router(AppState {
            dispatcher: Arc::clone(&dispatcher),
            metrics: Arc::clone(&metrics),
            peer_channel_buffer: config.peer_channel_buffer,
        })
        .merge(admin_router(Arc::clone(&dispatcher)));

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        // Spawn server in background
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            dispatcher,
            metrics,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket URL joining `room` with `roles`.
    pub fn ws_url(&self, room: &str, roles: &[&str]) -> String {
        if roles.is_empty() {
            format!("ws://{}/rooms/{}/ws", self.addr, room)
        } else {
            format!("ws://{}/rooms/{}/ws?roles={}", self.addr, room, roles.join(","))
        }
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The room registry behind the server.
    pub fn dispatcher(&self) -> &Arc<RoomDispatcherActorHandle> {
        &self.dispatcher
    }

    pub fn metrics(&self) -> &Arc<ActorMetrics> {
        &self.metrics
    }

    /// Poll until `room` has `count` registered peers.
    ///
    /// # Panics
    ///
    /// Panics if the count is not reached within one second.
    pub async fn wait_for_peer_count(&self, room: &str, count: usize) {
        for _ in 0..100 {
            if let Ok(handle) = self.dispatcher.get_room(room.to_string()).await {
                if let Ok(state) = handle.get_state().await {
                    if state.peers.len() == count {
                        return;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("room {room} never reached {count} peers");
    }
}

impl Drop for TestRelayServer {
    fn drop(&mut self) {
        // Abort the HTTP server task so the port is released when the test ends
        self._handle.abort();
        self.dispatcher.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let server = TestRelayServer::spawn().await?;

        assert!(server.url().starts_with("http://127.0.0.1:"));
        assert!(server.addr().ip().is_loopback());
        assert!(server.addr().port() > 0);
        assert!(server.config().ice_server_urls.is_empty());
        assert!(server.dispatcher().list_rooms().await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_ws_url_includes_roles() -> Result<(), anyhow::Error> {
        let server = TestRelayServer::spawn().await?;
        let addr = server.addr();

        assert_eq!(server.ws_url("lobby", &[]), format!("ws://{addr}/rooms/lobby/ws"));
        assert_eq!(
            server.ws_url("lobby", &["host", "guest"]),
            format!("ws://{addr}/rooms/lobby/ws?roles=host,guest")
        );

        Ok(())
    }
}
