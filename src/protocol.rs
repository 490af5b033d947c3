//! Wire types for the matchmaking channel.
//!
//! Every frame is a JSON envelope `{"type": ..., "payload": {...}}`. Inbound
//! payloads are decoded per type by [`crate::router`]; outbound messages are
//! adjacently tagged so unit-like messages still carry an empty payload object.

use serde::{Deserialize, Serialize};

/// Raw `{type, payload}` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Typed inbound messages.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    MatchmakingConnected,
    QueueJoined(QueueJoined),
    QueueStatus(QueueStatusUpdate),
    MatchFound(MatchFound),
    QueueCancelled,
    MatchCancelled,
    HeartbeatPing,
    HealthPing,
    Error(ServerError),
}

impl InboundMessage {
    /// Wire name of this message type
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::MatchmakingConnected => "matchmaking_connected",
            InboundMessage::QueueJoined(_) => "queue_joined",
            InboundMessage::QueueStatus(_) => "queue_status",
            InboundMessage::MatchFound(_) => "match_found",
            InboundMessage::QueueCancelled => "queue_cancelled",
            InboundMessage::MatchCancelled => "match_cancelled",
            InboundMessage::HeartbeatPing => "heartbeat_ping",
            InboundMessage::HealthPing => "health_ping",
            InboundMessage::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueJoined {
    pub ticket_id: String,
    pub position: u32,
    pub queue_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueStatusUpdate {
    /// Seconds spent in queue so far, as reported by the server
    #[serde(default)]
    pub elapsed: Option<u64>,
    pub position: u32,
    #[serde(default)]
    pub estimated_wait: Option<u32>,
    pub queue_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MatchFound {
    pub lobby_code: String,
    pub opponent_id: String,
    pub opponent_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerError {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Messages sent from the client to the matchmaking service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Enter the queue for a category/map pair.
    QueueJoin { category: String, map_slug: String },

    /// Leave the queue.
    LeaveQueue {},

    /// Reply to a business heartbeat.
    HeartbeatPong {},

    /// Reply to an infrastructure liveness probe.
    HealthPong {},
}

impl OutboundMessage {
    /// Encode as a JSON text frame
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_join_encoding() {
        let msg = OutboundMessage::QueueJoin {
            category: "fortnite".to_string(),
            map_slug: "arena-1".to_string(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "queue_join",
                "payload": {"category": "fortnite", "map_slug": "arena-1"}
            })
        );
    }

    #[test]
    fn test_unit_messages_carry_empty_payload() {
        let value: serde_json::Value =
            serde_json::from_str(&OutboundMessage::HeartbeatPong {}.to_json().unwrap()).unwrap();
        assert_eq!(value, serde_json::json!({"type": "heartbeat_pong", "payload": {}}));

        let value: serde_json::Value =
            serde_json::from_str(&OutboundMessage::LeaveQueue {}.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "leave_queue");
    }

    #[test]
    fn test_envelope_payload_defaults_to_null() {
        let env: Envelope = serde_json::from_str(r#"{"type":"queue_cancelled"}"#).unwrap();
        assert_eq!(env.kind, "queue_cancelled");
        assert!(env.payload.is_null());
    }
}
