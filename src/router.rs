//! Inbound message router.
//!
//! One dispatch table keyed by the envelope's type string. Unknown types
//! route to `Ok(None)`; malformed envelopes or payloads produce a
//! [`ProtocolError`] that callers log and drop.

use crate::error::ProtocolError;
use crate::protocol::{Envelope, InboundMessage};
use serde::de::DeserializeOwned;

/// Decode a text frame into a typed inbound message.
pub fn route(text: &str) -> Result<Option<InboundMessage>, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::Envelope)?;
    dispatch(envelope)
}

/// Decode an already-parsed envelope.
pub fn dispatch(envelope: Envelope) -> Result<Option<InboundMessage>, ProtocolError> {
    let Envelope { kind, payload } = envelope;
    let message = match kind.as_str() {
        "matchmaking_connected" => InboundMessage::MatchmakingConnected,
        "queue_joined" => InboundMessage::QueueJoined(decode(&kind, payload)?),
        "queue_status" => InboundMessage::QueueStatus(decode(&kind, payload)?),
        "match_found" => InboundMessage::MatchFound(decode(&kind, payload)?),
        "queue_cancelled" => InboundMessage::QueueCancelled,
        "match_cancelled" => InboundMessage::MatchCancelled,
        "heartbeat_ping" => InboundMessage::HeartbeatPing,
        "health_ping" => InboundMessage::HealthPing,
        "error" => InboundMessage::Error(decode(&kind, payload)?),
        _ => return Ok(None),
    };
    Ok(Some(message))
}

fn decode<T: DeserializeOwned>(kind: &str, payload: serde_json::Value) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(|source| ProtocolError::Payload {
        kind: kind.to_string(),
        source,
    })
}
