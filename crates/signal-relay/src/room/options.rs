//! Room-scoped configuration forwarded to peers on connection.

use serde::{Deserialize, Serialize};

/// A network-assist server, in the browser `RTCIceServer` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// A server without credentials (typically STUN).
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Options applied to every room created by the registry.
#[derive(Debug, Clone, Default)]
pub struct RoomOptions {
    /// Forwarded verbatim in the connection acknowledgment.
    pub ice_servers: Vec<IceServer>,
    /// Role pairs connected at room creation, on top of `default <-> default`.
    pub role_connections: Vec<(String, String)>,
}

/// Payload of the connection-accepted acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub ice_servers: Vec<IceServer>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connect_response_shape() {
        let response = ConnectResponse {
            ice_servers: vec![
                IceServer::new("stun:stun.example.com:3478"),
                IceServer {
                    urls: vec!["turn:turn.example.com:3478".to_string()],
                    username: Some("relay".to_string()),
                    credential: Some("pw".to_string()),
                },
            ],
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "iceServers": [
                    {"urls": ["stun:stun.example.com:3478"]},
                    {"urls": ["turn:turn.example.com:3478"], "username": "relay", "credential": "pw"}
                ]
            })
        );
    }
}
