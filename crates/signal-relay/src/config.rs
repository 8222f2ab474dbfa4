//! Signal relay configuration.
//!
//! Configuration is loaded from environment variables. The TURN credential is
//! redacted in Debug output.

use crate::room::{normalize_role, IceServer, RoomOptions};

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default WebSocket signaling bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default ops (health, metrics, admin) bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default ICE server list.
pub const DEFAULT_ICE_SERVERS: &str = "stun:stun.l.google.com:19302";

/// Default registry capacity.
pub const DEFAULT_MAX_ROOMS: usize = 1000;

/// Default per-peer outbound queue length.
pub const DEFAULT_PEER_CHANNEL_BUFFER: usize = 200;

/// Default time allowed for rooms to drain on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::InvalidValue(format!(
                "RELAY_LOG_FORMAT must be 'pretty' or 'json', got '{other}'"
            ))),
        }
    }
}

/// Signal relay configuration.
#[derive(Clone)]
pub struct Config {
    /// WebSocket signaling bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Ops server bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// ICE server URLs forwarded to peers on connection.
    pub ice_server_urls: Vec<String>,

    /// Username attached to `turn:`/`turns:` URLs.
    pub turn_username: Option<String>,

    /// Credential attached to `turn:`/`turns:` URLs.
    pub turn_credential: Option<SecretString>,

    /// Role pairs connected in every new room, on top of `default <-> default`.
    pub role_connections: Vec<(String, String)>,

    /// Maximum number of live rooms.
    pub max_rooms: usize,

    /// Outbound queue length per peer.
    pub peer_channel_buffer: usize,

    /// Time allowed for rooms to drain on shutdown.
    pub shutdown_timeout_seconds: u64,

    pub log_format: LogFormat,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("health_bind_address", &self.health_bind_address)
            .field("ice_server_urls", &self.ice_server_urls)
            .field("turn_username", &self.turn_username)
            .field(
                "turn_credential",
                &self.turn_credential.as_ref().map(|_| "[REDACTED]"),
            )
            .field("role_connections", &self.role_connections)
            .field("max_rooms", &self.max_rooms)
            .field("peer_channel_buffer", &self.peer_channel_buffer)
            .field("shutdown_timeout_seconds", &self.shutdown_timeout_seconds)
            .field("log_format", &self.log_format)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("RELAY_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("RELAY_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let ice_server_urls = split_list(
            vars.get("RELAY_ICE_SERVERS")
                .map_or(DEFAULT_ICE_SERVERS, String::as_str),
        );

        let turn_username = vars
            .get("RELAY_TURN_USERNAME")
            .filter(|s| !s.is_empty())
            .cloned();
        let turn_credential = vars
            .get("RELAY_TURN_CREDENTIAL")
            .filter(|s| !s.is_empty())
            .map(|s| SecretString::from(s.clone()));

        let role_connections = match vars.get("RELAY_ROLE_CONNECTIONS") {
            Some(raw) => parse_role_connections(raw)?,
            None => Vec::new(),
        };

        let max_rooms = parse_positive(vars, "RELAY_MAX_ROOMS", DEFAULT_MAX_ROOMS)?;
        let peer_channel_buffer =
            parse_positive(vars, "RELAY_PEER_CHANNEL_BUFFER", DEFAULT_PEER_CHANNEL_BUFFER)?;

        let shutdown_timeout_seconds = match vars.get("RELAY_SHUTDOWN_TIMEOUT_SECONDS") {
            Some(raw) => raw.trim().parse().map_err(|e| {
                ConfigError::InvalidValue(format!(
                    "RELAY_SHUTDOWN_TIMEOUT_SECONDS must be a number of seconds: {e}"
                ))
            })?,
            None => DEFAULT_SHUTDOWN_TIMEOUT_SECONDS,
        };

        let log_format = match vars.get("RELAY_LOG_FORMAT") {
            Some(raw) => raw.parse()?,
            None => LogFormat::default(),
        };

        Ok(Config {
            bind_address,
            health_bind_address,
            ice_server_urls,
            turn_username,
            turn_credential,
            role_connections,
            max_rooms,
            peer_channel_buffer,
            shutdown_timeout_seconds,
            log_format,
        })
    }

    /// Options applied to every room. TURN credentials are attached only to
    /// `turn:`/`turns:` URLs, and only when both username and credential are set.
    #[must_use]
    pub fn room_options(&self) -> RoomOptions {
        let ice_servers = self
            .ice_server_urls
            .iter()
            .map(|url| {
                let mut server = IceServer::new(url.clone());
                if is_turn_url(url) {
                    if let (Some(username), Some(credential)) =
                        (&self.turn_username, &self.turn_credential)
                    {
                        server.username = Some(username.clone());
                        server.credential = Some(credential.expose_secret().to_string());
                    }
                }
                server
            })
            .collect();

        RoomOptions {
            ice_servers,
            role_connections: self.role_connections.clone(),
        }
    }
}

fn is_turn_url(url: &str) -> bool {
    url.starts_with("turn:") || url.starts_with("turns:")
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parse `a:b,c:c` into role pairs.
fn parse_role_connections(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    split_list(raw)
        .into_iter()
        .map(|pair| {
            let (a, b) = pair.split_once(':').ok_or_else(|| {
                ConfigError::InvalidValue(format!(
                    "RELAY_ROLE_CONNECTIONS entry '{pair}' must look like 'role:role'"
                ))
            })?;
            match (normalize_role(a), normalize_role(b)) {
                (Some(a), Some(b)) if !b.contains(':') => Ok((a.to_string(), b.to_string())),
                _ => Err(ConfigError::InvalidValue(format!(
                    "RELAY_ROLE_CONNECTIONS entry '{pair}' must look like 'role:role'"
                ))),
            }
        })
        .collect()
}

fn parse_positive(
    vars: &HashMap<String, String>,
    name: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    let Some(raw) = vars.get(name) else {
        return Ok(default);
    };
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(ConfigError::InvalidValue(format!(
            "{name} must be greater than zero"
        ))),
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::InvalidValue(format!(
            "{name} must be a positive integer: {e}"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load successfully");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.health_bind_address, DEFAULT_HEALTH_BIND_ADDRESS);
        assert_eq!(config.ice_server_urls, vec![DEFAULT_ICE_SERVERS.to_string()]);
        assert!(config.turn_username.is_none());
        assert!(config.turn_credential.is_none());
        assert!(config.role_connections.is_empty());
        assert_eq!(config.max_rooms, DEFAULT_MAX_ROOMS);
        assert_eq!(config.peer_channel_buffer, DEFAULT_PEER_CHANNEL_BUFFER);
        assert_eq!(config.shutdown_timeout_seconds, DEFAULT_SHUTDOWN_TIMEOUT_SECONDS);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_from_vars_custom_values() {
        let config = Config::from_vars(&vars(&[
            ("RELAY_BIND_ADDRESS", "127.0.0.1:9000"),
            ("RELAY_HEALTH_BIND_ADDRESS", "127.0.0.1:9001"),
            ("RELAY_ICE_SERVERS", "stun:a.example:3478, turn:b.example:3478"),
            ("RELAY_ROLE_CONNECTIONS", "host:guest, viewer:viewer"),
            ("RELAY_MAX_ROOMS", "5"),
            ("RELAY_PEER_CHANNEL_BUFFER", "16"),
            ("RELAY_SHUTDOWN_TIMEOUT_SECONDS", "3"),
            ("RELAY_LOG_FORMAT", "JSON"),
        ]))
        .expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.health_bind_address, "127.0.0.1:9001");
        assert_eq!(
            config.ice_server_urls,
            vec!["stun:a.example:3478".to_string(), "turn:b.example:3478".to_string()]
        );
        assert_eq!(
            config.role_connections,
            vec![
                ("host".to_string(), "guest".to_string()),
                ("viewer".to_string(), "viewer".to_string()),
            ]
        );
        assert_eq!(config.max_rooms, 5);
        assert_eq!(config.peer_channel_buffer, 16);
        assert_eq!(config.shutdown_timeout_seconds, 3);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_empty_ice_servers_means_none() {
        let config = Config::from_vars(&vars(&[("RELAY_ICE_SERVERS", "")])).unwrap();
        assert!(config.ice_server_urls.is_empty());
        assert!(config.room_options().ice_servers.is_empty());
    }

    #[test]
    fn test_malformed_role_connections_rejected() {
        for raw in ["host", "host:", ":guest", "a:b:c", "host:guest,lonely"] {
            let result = Config::from_vars(&vars(&[("RELAY_ROLE_CONNECTIONS", raw)]));
            assert!(
                matches!(result, Err(ConfigError::InvalidValue(_))),
                "'{raw}' should be rejected"
            );
        }
    }

    #[test]
    fn test_invalid_limits_rejected() {
        for (name, raw) in [
            ("RELAY_MAX_ROOMS", "lots"),
            ("RELAY_MAX_ROOMS", "0"),
            ("RELAY_PEER_CHANNEL_BUFFER", "-1"),
            ("RELAY_SHUTDOWN_TIMEOUT_SECONDS", "soon"),
            ("RELAY_LOG_FORMAT", "xml"),
        ] {
            let result = Config::from_vars(&vars(&[(name, raw)]));
            assert!(
                matches!(result, Err(ConfigError::InvalidValue(_))),
                "{name}={raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_turn_credentials_only_on_turn_urls() {
        let config = Config::from_vars(&vars(&[
            ("RELAY_ICE_SERVERS", "stun:a.example:3478,turn:b.example:3478,turns:c.example:5349"),
            ("RELAY_TURN_USERNAME", "relay"),
            ("RELAY_TURN_CREDENTIAL", "s3cret"),
        ]))
        .unwrap();

        let servers = config.room_options().ice_servers;
        assert_eq!(servers.len(), 3);
        assert!(servers[0].username.is_none());
        assert!(servers[0].credential.is_none());
        assert_eq!(servers[1].username.as_deref(), Some("relay"));
        assert_eq!(servers[1].credential.as_deref(), Some("s3cret"));
        assert_eq!(servers[2].username.as_deref(), Some("relay"));
    }

    #[test]
    fn test_turn_username_without_credential_not_applied() {
        let config = Config::from_vars(&vars(&[
            ("RELAY_ICE_SERVERS", "turn:b.example:3478"),
            ("RELAY_TURN_USERNAME", "relay"),
        ]))
        .unwrap();

        let servers = config.room_options().ice_servers;
        assert!(servers[0].username.is_none());
    }

    #[test]
    fn test_room_options_carry_role_connections() {
        let config =
            Config::from_vars(&vars(&[("RELAY_ROLE_CONNECTIONS", "host:guest")])).unwrap();
        assert_eq!(
            config.room_options().role_connections,
            vec![("host".to_string(), "guest".to_string())]
        );
    }

    #[test]
    fn test_debug_redacts_turn_credential() {
        let config = Config::from_vars(&vars(&[
            ("RELAY_TURN_USERNAME", "relay"),
            ("RELAY_TURN_CREDENTIAL", "super-secret-value"),
        ]))
        .unwrap();

        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret-value"));
    }
}
