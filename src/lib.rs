//! # matchmaking-client
//!
//! A resilient client for a real-time matchmaking queue.
//!
//! ## Features
//!
//! - **Queue lifecycle** from join through match handoff, driven by server pushes
//! - **Bounded reconnection** on a fixed backoff schedule, with the join resumed
//! - **Business heartbeat** monitoring that forces a reconnect on silence
//! - **Resync** of the queue ticket over REST after a genuine reconnect
//! - **Cooldown** tracking seeded from REST and refreshed by server errors
//! - **Metrics** for observability
//!
//! The state machine ([`ConnectionManager`]) is transport-free: it consumes
//! [`Event`]s and returns [`Action`]s. [`MatchmakingClient`] runs it on one
//! tokio task against a WebSocket transport and an HTTP API.
//!
//! ## Example
//!
//! ```ignore
//! use matchmaking_client::{ClientConfig, MatchHandler, MatchResult, MatchmakingClient};
//!
//! struct Navigator;
//!
//! impl MatchHandler for Navigator {
//!     async fn on_match_ready(&self, result: MatchResult) {
//!         println!("go to /lobby/{}", result.lobby_code);
//!     }
//! }
//!
//! let config = ClientConfig::builder()
//!     .ws_url("wss://play.example.com/ws/matchmaking")
//!     .api_base_url("https://play.example.com/api")
//!     .credential(token)
//!     .build()?;
//!
//! let client = MatchmakingClient::new(config, Navigator)?;
//! client.join_queue("fortnite", "arena-1").await?;
//! ```

mod api;
mod client;
mod config;
mod connection;
mod cooldown;
mod error;
mod handler;
mod heartbeat;
mod manager;
mod metrics;
mod protocol;
mod queue;
mod resync;
mod router;
mod session;
mod timers;

pub use api::{CooldownResponse, HttpMatchmakingApi, MatchmakingApi, QueueStatusResponse};
pub use client::MatchmakingClient;
pub use config::{
    BackoffConfig, ClientConfig, ClientConfigBuilder, ConfigError, CooldownConfig, Credential,
    EndpointConfig, HeartbeatConfig,
};
pub use connection::{ConnectRequest, ConnectionCommand, Connector, WebSocketConnector};
pub use cooldown::parse_cooldown_code;
pub use error::{ConnectionError, Error, ErrorKind, ProtocolError};
pub use handler::MatchHandler;
pub use manager::{Action, CloseCode, CloseInfo, ConnectionManager, Event, QueueSnapshot};
pub use metrics::{Metrics, MetricsSnapshot, SessionMetrics};
pub use protocol::{
    Envelope, InboundMessage, MatchFound, OutboundMessage, QueueJoined, QueueStatusUpdate, ServerError,
};
pub use queue::{ConnectionStatus, MatchResult, QueueTicket};
pub use router::{dispatch, route};
pub use session::{JoinParams, SessionId};
pub use timers::TimerKind;

/// Result type for matchmaking-client operations
pub type Result<T> = std::result::Result<T, Error>;
