//! REST collaborator for queue status, cooldown and the durable leave call.

use crate::config::{Credential, EndpointConfig};
use crate::error::Error;
use serde::Deserialize;
use std::future::Future;
use tracing::{debug, warn};

const STATUS_PATH: &str = "/matchmaking/status";
const COOLDOWN_PATH: &str = "/matchmaking/cooldown";
const LEAVE_PATH: &str = "/matchmaking/leave";

/// Authoritative queue status used for resync after a reconnect
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QueueStatusResponse {
    pub in_queue: bool,
    #[serde(default)]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub estimated_wait: Option<u32>,
    #[serde(default)]
    pub queue_size: Option<u32>,
}

/// Server-side cooldown state
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CooldownResponse {
    pub active: bool,
    #[serde(default)]
    pub remaining_seconds: Option<u32>,
}

impl CooldownResponse {
    /// Remaining seconds if the cooldown is active
    pub fn remaining(&self) -> Option<u32> {
        if self.active {
            self.remaining_seconds.filter(|s| *s > 0)
        } else {
            None
        }
    }
}

/// The REST calls the client depends on.
///
/// Implementations must be cheap to share; the client calls them from
/// spawned tasks and never awaits them on the event loop.
pub trait MatchmakingApi: Send + Sync + 'static {
    /// Get the caller's current queue status.
    fn queue_status(&self) -> impl Future<Output = Result<QueueStatusResponse, Error>> + Send;

    /// Get the caller's queue cooldown.
    fn cooldown(&self) -> impl Future<Output = Result<CooldownResponse, Error>> + Send;

    /// Remove the caller from the queue.
    fn leave_queue(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// `reqwest`-backed implementation of [`MatchmakingApi`]
pub struct HttpMatchmakingApi {
    client: reqwest::Client,
    base_url: String,
    credential: Option<Credential>,
}

impl HttpMatchmakingApi {
    /// Create a new HTTP API client
    pub fn new(config: &EndpointConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            credential: config.credential.clone(),
        })
    }

    /// Request builder with the bearer header attached
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let req = self.client.request(method, url);
        match &self.credential {
            Some(token) => req.bearer_auth(token.expose()),
            None => req,
        }
    }

    /// Map non-success statuses to [`Error::Api`]
    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let message = resp.text().await.unwrap_or_else(|e| {
            warn!("Failed to read error body: {}", e);
            String::new()
        });
        Err(Error::Api {
            status: status.as_u16(),
            message,
        })
    }
}

impl MatchmakingApi for HttpMatchmakingApi {
    async fn queue_status(&self) -> Result<QueueStatusResponse, Error> {
        let resp = self.request(reqwest::Method::GET, STATUS_PATH).send().await?;
        let status = Self::check_response(resp).await?.json().await?;
        debug!("Queue status: {:?}", status);
        Ok(status)
    }

    async fn cooldown(&self) -> Result<CooldownResponse, Error> {
        let resp = self.request(reqwest::Method::GET, COOLDOWN_PATH).send().await?;
        let cooldown = Self::check_response(resp).await?.json().await?;
        debug!("Cooldown: {:?}", cooldown);
        Ok(cooldown)
    }

    async fn leave_queue(&self) -> Result<(), Error> {
        let resp = self.request(reqwest::Method::POST, LEAVE_PATH).send().await?;
        Self::check_response(resp).await?;
        debug!("Left queue via REST");
        Ok(())
    }
}
