use crate::api::{HttpMatchmakingApi, MatchmakingApi};
use crate::config::ClientConfig;
use crate::connection::{ConnectRequest, ConnectionCommand, Connector, WebSocketConnector};
use crate::error::Error;
use crate::handler::MatchHandler;
use crate::manager::{Action, ConnectionManager, Event, QueueSnapshot};
use crate::metrics::Metrics;
use crate::queue::ConnectionStatus;
use crate::session::{JoinParams, SessionId};
use crate::timers::Timers;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default channel buffer size for user commands
const DEFAULT_CHANNEL_SIZE: usize = 100;

enum ClientCommand {
    Join(JoinParams),
    Leave,
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running matchmaking client.
///
/// All state lives in a single driver task, so every transport event, timer
/// and REST completion is processed in order. The handle only sends commands
/// and reads the published [`QueueSnapshot`].
///
/// Dropping the handle stops the driver and closes any open transport.
pub struct MatchmakingClient {
    command_tx: mpsc::Sender<ClientCommand>,
    snapshot_rx: watch::Receiver<QueueSnapshot>,
    metrics: Arc<Metrics>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MatchmakingClient {
    /// Start a client with the WebSocket transport and HTTP API.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<H: MatchHandler>(config: ClientConfig, handler: H) -> Result<Self, Error> {
        let metrics = Arc::new(Metrics::new());
        let api = HttpMatchmakingApi::new(&config.endpoint)?;
        let connector = WebSocketConnector::new(metrics.clone());
        Ok(Self::with_parts(config, handler, api, connector, metrics))
    }

    /// Start a client with custom transport and API implementations.
    pub fn with_parts<H, A, C>(
        config: ClientConfig,
        handler: H,
        api: A,
        connector: C,
        metrics: Arc<Metrics>,
    ) -> Self
    where
        H: MatchHandler,
        A: MatchmakingApi,
        C: Connector,
    {
        let (command_tx, command_rx) = mpsc::channel(DEFAULT_CHANNEL_SIZE);
        let (events_tx, events_rx) = mpsc::channel(config.event_channel_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(QueueSnapshot::default());

        let driver = Driver {
            manager: ConnectionManager::new(config.clone(), metrics.clone()),
            config,
            handler: Arc::new(handler),
            api: Arc::new(api),
            connector,
            timers: Timers::new(),
            transports: HashMap::new(),
            events_tx,
            events_rx,
            commands: command_rx,
            snapshot_tx,
            metrics: metrics.clone(),
        };
        let task = tokio::spawn(driver.run());

        Self {
            command_tx,
            snapshot_rx,
            metrics,
            task: Mutex::new(Some(task)),
        }
    }

    /// Enter the queue for a category and map.
    ///
    /// Rejected silently (with a warning) while a cooldown is active.
    pub async fn join_queue(
        &self,
        category: impl Into<String>,
        map_slug: impl Into<String>,
    ) -> Result<(), Error> {
        self.send(ClientCommand::Join(JoinParams::new(category, map_slug)))
            .await
    }

    /// Leave the queue and close the connection.
    pub async fn leave_queue(&self) -> Result<(), Error> {
        self.send(ClientCommand::Leave).await
    }

    async fn send(&self, command: ClientCommand) -> Result<(), Error> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| Error::ShuttingDown)
    }

    /// Current queue state
    pub fn snapshot(&self) -> QueueSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.snapshot_rx.borrow().status
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Get the metrics for this client
    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Cancel all timers, close the transport and wait for the driver to exit.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.command_tx.send(ClientCommand::Shutdown(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Matchmaking driver task failed: {:?}", e);
            }
        }
    }
}

/// The single task that owns the state machine and executes its actions
struct Driver<H, A, C> {
    manager: ConnectionManager,
    config: ClientConfig,
    handler: Arc<H>,
    api: Arc<A>,
    connector: C,
    timers: Timers,
    transports: HashMap<SessionId, mpsc::Sender<ConnectionCommand>>,
    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
    commands: mpsc::Receiver<ClientCommand>,
    snapshot_tx: watch::Sender<QueueSnapshot>,
    metrics: Arc<Metrics>,
}

impl<H: MatchHandler, A: MatchmakingApi, C: Connector> Driver<H, A, C> {
    async fn run(mut self) {
        debug!("Matchmaking driver started");
        let actions = self.manager.initialize();
        self.execute(actions);

        loop {
            let actions = tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(ClientCommand::Join(params)) => self.manager.join_queue(params),
                    Some(ClientCommand::Leave) => self.manager.leave_queue(),
                    Some(ClientCommand::Shutdown(done)) => {
                        self.stop();
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        debug!("Client handle dropped");
                        self.stop();
                        break;
                    }
                },
                Some(event) = self.events_rx.recv() => {
                    if let Event::Closed(id, _) = &event {
                        self.transports.remove(id);
                    }
                    self.manager.handle(event)
                }
                kind = self.timers.expired() => self.manager.handle(Event::TimerFired(kind)),
            };

            self.execute(actions);
            self.publish();
        }

        info!("Matchmaking driver stopped");
    }

    fn stop(&mut self) {
        let actions = self.manager.shutdown();
        self.execute(actions);
        self.timers.cancel_all();
        self.publish();
    }

    fn publish(&self) {
        let snapshot = self.manager.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Connect(id) => {
                    let request = ConnectRequest {
                        session_id: id,
                        url: self.config.endpoint.ws_url.clone(),
                        credential: self.config.endpoint.credential.clone(),
                        connect_timeout: self.config.endpoint.connect_timeout,
                    };
                    let command_tx = self.connector.open(request, self.events_tx.clone());
                    self.transports.insert(id, command_tx);
                }
                Action::Send(id, message) => match message.to_json() {
                    Ok(text) => self.command(id, ConnectionCommand::Send(text)),
                    Err(e) => {
                        self.metrics.record_error();
                        error!(
                            "[SESSION-{}] Dropping outbound message ({:?}): {}",
                            id,
                            e.kind(),
                            e
                        );
                    }
                },
                Action::Close(id, code) => self.command(id, ConnectionCommand::Close(code)),
                Action::ArmTimer(kind, after) => self.timers.arm(kind, after),
                Action::CancelTimer(kind) => self.timers.cancel(kind),
                Action::Navigate(result) => {
                    let handler = self.handler.clone();
                    spawn_guarded("on_match_ready", async move {
                        handler.on_match_ready(result).await
                    });
                }
                Action::ConnectionLost(err) => {
                    let handler = self.handler.clone();
                    spawn_guarded("on_connection_lost", async move {
                        handler.on_connection_lost(err).await
                    });
                }
                Action::Resync(id) => {
                    let api = self.api.clone();
                    let events = self.events_tx.clone();
                    tokio::spawn(async move {
                        let response = match api.queue_status().await {
                            Ok(status) => Some(status),
                            Err(e) => {
                                debug!("[SESSION-{}] Queue status resync failed: {}", id, e);
                                None
                            }
                        };
                        let _ = events.send(Event::ResyncCompleted(id, response)).await;
                    });
                }
                Action::FetchCooldown => {
                    let api = self.api.clone();
                    let events = self.events_tx.clone();
                    tokio::spawn(async move {
                        let event = match api.cooldown().await {
                            Ok(cooldown) => Event::CooldownFetched(cooldown.remaining()),
                            Err(e) => {
                                warn!("Cooldown lookup failed: {}", e);
                                Event::CooldownFetchFailed
                            }
                        };
                        let _ = events.send(event).await;
                    });
                }
                Action::LeaveViaRest => {
                    let api = self.api.clone();
                    let metrics = self.metrics.clone();
                    tokio::spawn(async move {
                        if let Err(e) = api.leave_queue().await {
                            metrics.record_error();
                            warn!("Leave queue request failed: {}", e);
                        }
                    });
                }
            }
        }
    }

    /// Non-blocking so a transport stuck on a full event channel cannot
    /// deadlock the driver.
    fn command(&self, id: SessionId, command: ConnectionCommand) {
        let Some(tx) = self.transports.get(&id) else {
            debug!("[SESSION-{}] No live transport for {:?}", id, command);
            return;
        };
        if let Err(e) = tx.try_send(command) {
            warn!("[SESSION-{}] Transport command dropped: {}", id, e);
        }
    }
}

/// Run a handler callback on its own task, logging panics instead of
/// propagating them.
fn spawn_guarded<F>(name: &'static str, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let result = tokio::spawn(AssertUnwindSafe(fut)).await;
        if let Err(e) = result {
            if e.is_panic() {
                error!("Handler.{} panicked: {:?}", name, e);
            } else {
                warn!("Handler.{} task failed: {:?}", name, e);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CooldownResponse, QueueStatusResponse};
    use crate::error::ConnectionError;
    use crate::manager::{CloseCode, CloseInfo};
    use crate::queue::MatchResult;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{Duration, Instant};

    struct FakeTransport {
        id: SessionId,
        events: mpsc::Sender<Event>,
        commands: mpsc::Receiver<ConnectionCommand>,
    }

    impl FakeTransport {
        async fn open(&self) {
            self.events.send(Event::Opened(self.id)).await.unwrap();
        }

        async fn push(&self, kind: &str, payload: serde_json::Value) {
            let text = json!({"type": kind, "payload": payload}).to_string();
            self.events.send(Event::Message(self.id, text)).await.unwrap();
        }

        async fn drop_connection(&self) {
            self.events
                .send(Event::Closed(self.id, CloseInfo::failed("reset")))
                .await
                .unwrap();
        }

        async fn next_sent(&mut self) -> serde_json::Value {
            match self.commands.recv().await {
                Some(ConnectionCommand::Send(text)) => serde_json::from_str(&text).unwrap(),
                other => panic!("expected send, got {:?}", other),
            }
        }
    }

    struct FakeConnector {
        opened: mpsc::UnboundedSender<FakeTransport>,
    }

    impl Connector for FakeConnector {
        fn open(
            &self,
            request: ConnectRequest,
            events: mpsc::Sender<Event>,
        ) -> mpsc::Sender<ConnectionCommand> {
            let (tx, rx) = mpsc::channel(16);
            let _ = self.opened.send(FakeTransport {
                id: request.session_id,
                events,
                commands: rx,
            });
            tx
        }
    }

    #[derive(Default)]
    struct FakeApi {
        cooldown_seconds: Option<u32>,
        status: Option<QueueStatusResponse>,
        leave_calls: Arc<AtomicUsize>,
    }

    impl MatchmakingApi for FakeApi {
        async fn queue_status(&self) -> Result<QueueStatusResponse, Error> {
            self.status.clone().ok_or(Error::Api {
                status: 503,
                message: "unavailable".to_string(),
            })
        }

        async fn cooldown(&self) -> Result<CooldownResponse, Error> {
            Ok(CooldownResponse {
                active: self.cooldown_seconds.is_some(),
                remaining_seconds: self.cooldown_seconds,
            })
        }

        async fn leave_queue(&self) -> Result<(), Error> {
            self.leave_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeHandler {
        matches: mpsc::UnboundedSender<MatchResult>,
        lost: mpsc::UnboundedSender<ConnectionError>,
    }

    impl MatchHandler for FakeHandler {
        async fn on_match_ready(&self, result: MatchResult) {
            let _ = self.matches.send(result);
        }

        async fn on_connection_lost(&self, error: ConnectionError) {
            let _ = self.lost.send(error);
        }
    }

    struct Harness {
        client: MatchmakingClient,
        transports: mpsc::UnboundedReceiver<FakeTransport>,
        matches: mpsc::UnboundedReceiver<MatchResult>,
        lost: mpsc::UnboundedReceiver<ConnectionError>,
    }

    fn harness(api: FakeApi) -> Harness {
        let (opened_tx, transports) = mpsc::unbounded_channel();
        let (matches_tx, matches) = mpsc::unbounded_channel();
        let (lost_tx, lost) = mpsc::unbounded_channel();
        let client = MatchmakingClient::with_parts(
            ClientConfig::default(),
            FakeHandler {
                matches: matches_tx,
                lost: lost_tx,
            },
            api,
            FakeConnector { opened: opened_tx },
            Arc::new(Metrics::new()),
        );
        Harness {
            client,
            transports,
            matches,
            lost,
        }
    }

    /// Join, open, greet and get queued at position 5.
    async fn queued(h: &mut Harness) -> FakeTransport {
        h.client.join_queue("fortnite", "arena-1").await.unwrap();
        let mut transport = h.transports.recv().await.unwrap();
        transport.open().await;
        transport.push("matchmaking_connected", json!({})).await;
        let join = transport.next_sent().await;
        assert_eq!(join["type"], "queue_join");
        transport
            .push(
                "queue_joined",
                json!({"ticket_id": "t1", "position": 5, "queue_size": 10}),
            )
            .await;
        h.client
            .subscribe()
            .wait_for(|s| s.status == ConnectionStatus::Queuing)
            .await
            .unwrap();
        transport
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_handoff_after_delay() {
        let mut h = harness(FakeApi::default());
        let mut transport = queued(&mut h).await;
        let mut rx = h.client.subscribe();

        transport
            .push(
                "queue_status",
                json!({"elapsed": 4, "position": 2, "estimated_wait": 30, "queue_size": 8}),
            )
            .await;
        rx.wait_for(|s| s.ticket.as_ref().is_some_and(|t| t.position == 2))
            .await
            .unwrap();

        transport
            .push(
                "match_found",
                json!({"lobby_code": "ABCD", "opponent_id": "u2", "opponent_name": "Bob"}),
            )
            .await;
        rx.wait_for(|s| s.status == ConnectionStatus::MatchFound)
            .await
            .unwrap();
        let found_at = Instant::now();

        let result = h.matches.recv().await.unwrap();
        assert_eq!(found_at.elapsed(), Duration::from_millis(3000));
        assert_eq!(
            result,
            MatchResult {
                lobby_code: "ABCD".to_string(),
                opponent_id: "u2".to_string(),
                opponent_name: "Bob".to_string(),
            }
        );

        rx.wait_for(|s| s.status == ConnectionStatus::Idle)
            .await
            .unwrap();
        assert!(h.client.snapshot().match_result.is_none());
        assert_eq!(
            transport.commands.recv().await,
            Some(ConnectionCommand::Close(CloseCode::Normal))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_then_fatal() {
        let mut h = harness(FakeApi::default());
        let transport = queued(&mut h).await;

        transport.drop_connection().await;
        let mut dropped_at = Instant::now();

        for expected in [1, 2, 4] {
            let next = h.transports.recv().await.unwrap();
            assert_eq!(dropped_at.elapsed(), Duration::from_secs(expected));
            assert_eq!(h.client.status(), ConnectionStatus::Queuing);

            // Reconnect attempt fails before opening
            next.drop_connection().await;
            dropped_at = Instant::now();
        }

        let err = h.lost.recv().await.unwrap();
        assert_eq!(err, ConnectionError::ReconnectExhausted { attempts: 3 });

        let snapshot = h
            .client
            .subscribe()
            .wait_for(|s| s.connection_error.is_some())
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.status, ConnectionStatus::Idle);
        assert!(snapshot.ticket.is_none());
        assert_eq!(h.client.metrics().reconnect_attempts(), 3);
        assert_eq!(h.client.metrics().fatal_errors(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_after_reconnect() {
        let api = FakeApi {
            status: Some(QueueStatusResponse {
                in_queue: true,
                ticket_id: Some("t1".to_string()),
                position: Some(2),
                estimated_wait: Some(12),
                queue_size: Some(7),
            }),
            ..Default::default()
        };
        let mut h = harness(api);
        let transport = queued(&mut h).await;

        transport.drop_connection().await;
        let mut next = h.transports.recv().await.unwrap();
        next.open().await;

        let snapshot = h
            .client
            .subscribe()
            .wait_for(|s| s.ticket.as_ref().is_some_and(|t| t.position == 2))
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.status, ConnectionStatus::Queuing);
        assert!(snapshot.connected);
        assert_eq!(h.client.metrics().resyncs(), 1);

        // Join resumes on the new transport
        next.push("matchmaking_connected", json!({})).await;
        let join = next.next_sent().await;
        assert_eq!(join["type"], "queue_join");
        assert_eq!(join["payload"]["map_slug"], "arena-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_timeout_forces_reconnect() {
        let mut h = harness(FakeApi::default());
        let mut transport = queued(&mut h).await;

        transport.push("heartbeat_ping", json!({})).await;
        let pong = transport.next_sent().await;
        assert_eq!(pong["type"], "heartbeat_pong");
        let pinged_at = Instant::now();

        // Health pings are answered but do not keep the heartbeat alive
        transport.push("health_ping", json!({})).await;
        let pong = transport.next_sent().await;
        assert_eq!(pong["type"], "health_pong");

        assert_eq!(
            transport.commands.recv().await,
            Some(ConnectionCommand::Close(CloseCode::HeartbeatTimeout))
        );
        assert_eq!(pinged_at.elapsed(), Duration::from_secs(30));

        transport
            .events
            .send(Event::Closed(
                transport.id,
                CloseInfo::new(4000, "heartbeat timeout"),
            ))
            .await
            .unwrap();
        let closed_at = Instant::now();
        let next = h.transports.recv().await.unwrap();
        assert_eq!(closed_at.elapsed(), Duration::from_secs(1));
        assert_ne!(next.id, transport.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_before_open_still_calls_rest() {
        let leave_calls = Arc::new(AtomicUsize::new(0));
        let mut h = harness(FakeApi {
            leave_calls: leave_calls.clone(),
            ..Default::default()
        });

        h.client.join_queue("fortnite", "arena-1").await.unwrap();
        let mut transport = h.transports.recv().await.unwrap();
        h.client.leave_queue().await.unwrap();

        assert_eq!(
            transport.commands.recv().await,
            Some(ConnectionCommand::Close(CloseCode::Normal))
        );
        for _ in 0..10 {
            if leave_calls.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(leave_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.client.status(), ConnectionStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_when_open_sends_message_then_closes() {
        let mut h = harness(FakeApi::default());
        let mut transport = queued(&mut h).await;

        h.client.leave_queue().await.unwrap();
        let leave = transport.next_sent().await;
        assert_eq!(leave["type"], "leave_queue");
        assert_eq!(
            transport.commands.recv().await,
            Some(ConnectionCommand::Close(CloseCode::Normal))
        );

        let snapshot = h
            .client
            .subscribe()
            .wait_for(|s| s.status == ConnectionStatus::Idle)
            .await
            .unwrap()
            .clone();
        assert!(snapshot.ticket.is_none());
        assert!(snapshot.connection_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_blocks_join_until_expired() {
        let mut h = harness(FakeApi {
            cooldown_seconds: Some(3),
            ..Default::default()
        });
        let mut rx = h.client.subscribe();

        rx.wait_for(|s| s.cooldown_remaining == Some(3)).await.unwrap();
        h.client.join_queue("fortnite", "arena-1").await.unwrap();

        rx.wait_for(|s| s.cooldown_remaining == Some(2)).await.unwrap();
        assert!(h.transports.try_recv().is_err());
        assert_eq!(h.client.status(), ConnectionStatus::Idle);

        rx.wait_for(|s| s.cooldown_remaining.is_none()).await.unwrap();
        h.client.join_queue("fortnite", "arena-1").await.unwrap();
        assert!(h.transports.recv().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_transport() {
        let mut h = harness(FakeApi::default());
        let mut transport = queued(&mut h).await;

        h.client.shutdown().await;
        assert_eq!(
            transport.commands.recv().await,
            Some(ConnectionCommand::Close(CloseCode::Normal))
        );
        assert!(matches!(
            h.client.join_queue("fortnite", "arena-1").await,
            Err(Error::ShuttingDown)
        ));

        // Idempotent
        h.client.shutdown().await;
    }
}
