use crate::error::ConnectionError;
use crate::queue::MatchResult;
use std::future::Future;

/// Trait that users implement to receive the match handoff.
///
/// This is the navigation sink between the matchmaking client and the
/// presentation layer. The client owns the connection lifecycle, reconnection
/// and queue state; the handler only decides where the player goes once a
/// match is confirmed. Handler calls run on spawned tasks, so a panicking or
/// slow handler never stalls the client.
///
/// # Example
///
/// ```ignore
/// use matchmaking_client::{MatchHandler, MatchResult};
///
/// struct Router;
///
/// impl MatchHandler for Router {
///     async fn on_match_ready(&self, result: MatchResult) {
///         println!("navigating to /lobby/{}", result.lobby_code);
///     }
/// }
/// ```
pub trait MatchHandler: Send + Sync + 'static {
    /// Called exactly once per match, after the handoff delay.
    ///
    /// By the time this runs the client is already back to idle.
    fn on_match_ready(&self, result: MatchResult) -> impl Future<Output = ()> + Send;

    /// Called when the reconnect budget is exhausted.
    ///
    /// The same error is also visible in the queue snapshot.
    fn on_connection_lost(&self, _error: ConnectionError) -> impl Future<Output = ()> + Send {
        async {}
    }
}
