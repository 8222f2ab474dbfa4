//! Signal relay error types.
//!
//! Error types map to signaling `ErrorCode` values for client responses and to
//! HTTP status codes on the admin API. Internal details are logged server-side
//! but not exposed to clients.
//!
//! Authorization outcomes are deliberately absent from this enum: a signal to a
//! peer that is unknown or not role-connected is dropped silently, so that
//! the existence of peers is never leaked to unauthorized parties.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Signal relay error type.
///
/// Maps to signaling `ErrorCode` values:
/// - `InvalidRoomName`: `INVALID_REQUEST` (1)
/// - `RoomNotFound`, `PeerNotFound`: `NOT_FOUND` (4)
/// - `Internal`, `Config`, `PeerChannelClosed`: `INTERNAL_ERROR` (6)
/// - `CapacityExceeded`, `Draining`, `PeerBackpressure`: `CAPACITY_EXCEEDED` (7)
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Room name failed validation.
    #[error("Invalid room name: {0}")]
    InvalidRoomName(String),

    /// Room not found in the registry.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Peer not registered in the room.
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// The registry refuses to create more rooms.
    #[error("Room capacity exceeded (max {max_rooms})")]
    CapacityExceeded { max_rooms: usize },

    /// The registry is draining (graceful shutdown).
    #[error("Relay is draining")]
    Draining,

    /// The peer's outbound channel is closed (transport gone).
    #[error("Peer channel closed: {0}")]
    PeerChannelClosed(String),

    /// The peer's outbound channel is full.
    #[error("Peer channel full: {0}")]
    PeerBackpressure(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns the signaling `ErrorCode` value for this error.
    pub fn error_code(&self) -> i32 {
        match self {
            RelayError::InvalidRoomName(_) => 1, // INVALID_REQUEST
            RelayError::RoomNotFound(_) | RelayError::PeerNotFound(_) => 4, // NOT_FOUND
            RelayError::Config(_) | RelayError::Internal(_) | RelayError::PeerChannelClosed(_) => {
                6 // INTERNAL_ERROR
            }
            RelayError::CapacityExceeded { .. }
            | RelayError::Draining
            | RelayError::PeerBackpressure(_) => 7, // CAPACITY_EXCEEDED
        }
    }

    /// Returns a client-safe error message (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            RelayError::Config(_)
            | RelayError::Internal(_)
            | RelayError::PeerChannelClosed(_)
            | RelayError::PeerBackpressure(_) => "An internal error occurred".to_string(),
            RelayError::InvalidRoomName(_) => "Invalid room name".to_string(),
            RelayError::RoomNotFound(_) => "Room not found".to_string(),
            RelayError::PeerNotFound(_) => "Peer not found".to_string(),
            RelayError::CapacityExceeded { .. } => {
                "Server is at capacity, please try again".to_string()
            }
            RelayError::Draining => "Server is shutting down, please reconnect".to_string(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidRoomName(_) => StatusCode::BAD_REQUEST,
            RelayError::RoomNotFound(_) | RelayError::PeerNotFound(_) => StatusCode::NOT_FOUND,
            RelayError::CapacityExceeded { .. } | RelayError::Draining => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RelayError::Config(_)
            | RelayError::Internal(_)
            | RelayError::PeerChannelClosed(_)
            | RelayError::PeerBackpressure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<crate::config::ConfigError> for RelayError {
    fn from(e: crate::config::ConfigError) -> Self {
        RelayError::Config(e.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: i32,
    message: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Log actual error server-side, return generic message to client
            tracing::error!(target: "relay.errors", error = %self, "Request failed");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.error_code(),
                message: self.client_message(),
            },
        };

        (status, Json(body)).into_response()
    }
}
