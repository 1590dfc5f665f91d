//! Text-frame codec for protocol messages.

use crate::error::{GraphQLError, Result};

use super::message::WsMessage;

/// Encode a message as one JSON text frame.
pub fn encode(message: &WsMessage) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Decode one JSON text frame.
///
/// Malformed frames (bad JSON, unknown `type`, missing `id`) surface as a
/// protocol violation so the session can close with the invalid-message
/// status rather than a plain JSON error.
pub fn decode(frame: &str) -> Result<WsMessage> {
    serde_json::from_str(frame).map_err(|e| GraphQLError::Protocol(format!("invalid message: {e}")))
}
