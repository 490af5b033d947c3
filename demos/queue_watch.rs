//! Example: join a matchmaking queue and watch its state
//!
//! Reads the endpoint from the environment:
//!
//! - `MATCHMAKING_WS_URL` (default `ws://127.0.0.1:8080/ws/matchmaking`)
//! - `MATCHMAKING_API_URL` (default `http://127.0.0.1:8080/api`)
//! - `MATCHMAKING_TOKEN` (optional bearer credential)
//!
//! Run with: cargo run --example queue_watch -- fortnite arena-1

use matchmaking_client::{
    ClientConfig, ConnectionError, ConnectionStatus, MatchHandler, MatchResult, MatchmakingClient,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Forwards the handoff to `main` so it can exit
struct Navigator {
    done: mpsc::UnboundedSender<MatchResult>,
}

impl MatchHandler for Navigator {
    async fn on_match_ready(&self, result: MatchResult) {
        info!(
            "Navigating to /lobby/{} against {} ({})",
            result.lobby_code, result.opponent_name, result.opponent_id
        );
        let _ = self.done.send(result);
    }

    async fn on_connection_lost(&self, error: ConnectionError) {
        warn!("Gave up on matchmaking: {}", error);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,matchmaking_client=debug")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let category = args.next().unwrap_or_else(|| "fortnite".to_string());
    let map_slug = args.next().unwrap_or_else(|| "arena-1".to_string());

    let mut builder = ClientConfig::builder();
    if let Ok(url) = std::env::var("MATCHMAKING_WS_URL") {
        builder = builder.ws_url(url);
    }
    if let Ok(url) = std::env::var("MATCHMAKING_API_URL") {
        builder = builder.api_base_url(url);
    }
    if let Ok(token) = std::env::var("MATCHMAKING_TOKEN") {
        builder = builder.credential(token);
    }
    let config = builder.build()?;

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let client = MatchmakingClient::new(config, Navigator { done: done_tx })?;
    let mut updates = client.subscribe();

    info!("Joining {}/{}", category, map_slug);
    client.join_queue(category, map_slug).await?;

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                match (&snapshot.status, &snapshot.ticket) {
                    (ConnectionStatus::Queuing, Some(ticket)) => info!(
                        "Position {}/{} (estimated wait {:?}s, connected: {})",
                        ticket.position, ticket.queue_size, ticket.estimated_wait, snapshot.connected
                    ),
                    (status, _) => info!("Status: {}", status),
                }
                if let Some(remaining) = snapshot.cooldown_remaining {
                    info!("Cooldown: {}s", remaining);
                }
                if snapshot.connection_error.is_some() {
                    break;
                }
            }
            Some(result) = done_rx.recv() => {
                info!("Matched into lobby {}", result.lobby_code);
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Leaving queue");
                client.leave_queue().await?;
                break;
            }
        }
    }

    let snapshot = client.metrics().snapshot();
    info!("Final metrics:");
    info!("  Connections: {}", snapshot.connections_total);
    info!("  Reconnect attempts: {}", snapshot.reconnect_attempts_total);
    info!("  Messages received: {}", snapshot.messages_received_total);
    info!("  Heartbeat timeouts: {}", snapshot.heartbeat_timeouts_total);

    client.shutdown().await;
    Ok(())
}
