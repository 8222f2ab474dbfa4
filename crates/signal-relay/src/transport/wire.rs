//! JSON frames sent by clients.
//!
//! Server-to-client frames are [`OutboundEvent`](crate::room::OutboundEvent)
//! values and are written by the connection actor.

use crate::room::SignalRequest;

use serde::Deserialize;
use serde_json::Value;

/// A frame received from a client, tagged by `event`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// `{"event":"connect-request","ack":N?,"data":any?}`
    ConnectRequest {
        #[serde(default)]
        ack: Option<u64>,
        #[serde(default)]
        data: Option<Value>,
    },
    /// `{"event":"signal","data":{"target":"<peer id>","signal":any?}}`
    Signal { data: SignalRequest },
}

/// Parse one text frame.
///
/// # Errors
///
/// Returns the JSON error for malformed frames and unknown events. Callers
/// log and ignore it.
pub fn parse_frame(text: &str) -> Result<ClientFrame, serde_json::Error> {
    serde_json::from_str(text)
}
