//! Transport-free matchmaking state machine.
//!
//! [`ConnectionManager`] consumes one serialized stream of [`Event`]s and
//! user commands and answers each with a list of [`Action`]s for the driver to
//! execute. It owns the session, the queue state, the heartbeat monitor, the
//! cooldown tracker and the resync coordinator, so every rule about ordering,
//! retries and teardown lives here and can be tested without a socket.

use crate::api::QueueStatusResponse;
use crate::config::ClientConfig;
use crate::cooldown::{parse_cooldown_code, CooldownTracker};
use crate::error::ConnectionError;
use crate::heartbeat::HeartbeatMonitor;
use crate::metrics::Metrics;
use crate::protocol::{InboundMessage, OutboundMessage, ServerError};
use crate::queue::{ConnectionStatus, MatchResult, QueueStateMachine, QueueTicket};
use crate::resync::ResyncCoordinator;
use crate::router;
use crate::session::{JoinParams, Session, SessionId};
use crate::timers::TimerKind;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Close codes the client sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// Intentional departure; the server must not re-queue the player
    Normal,
    /// Business heartbeat went silent; the client will reconnect
    HeartbeatTimeout,
}

impl CloseCode {
    pub fn as_u16(self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::HeartbeatTimeout => 4000,
        }
    }
}

/// How a transport ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code, `None` if the connection failed or dropped without one
    pub code: Option<u16>,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            reason: reason.into(),
        }
    }

    /// A connect attempt or live connection that failed without a close frame
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            code: None,
            reason: reason.into(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.code == Some(CloseCode::Normal.as_u16())
    }
}

/// Inputs to the state machine besides user commands
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Transport for this session finished its handshake
    Opened(SessionId),
    /// Text frame received
    Message(SessionId, String),
    /// Transport ended (or never opened)
    Closed(SessionId, CloseInfo),
    /// A timer armed through [`Action::ArmTimer`] expired
    TimerFired(TimerKind),
    /// REST status call finished; `None` on failure
    ResyncCompleted(SessionId, Option<QueueStatusResponse>),
    /// REST cooldown call finished; `None` if the server reports no cooldown
    CooldownFetched(Option<u32>),
    /// REST cooldown call failed; local cooldown state is kept
    CooldownFetchFailed,
}

/// Side effects requested by the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Connect(SessionId),
    Send(SessionId, OutboundMessage),
    Close(SessionId, CloseCode),
    ArmTimer(TimerKind, Duration),
    CancelTimer(TimerKind),
    Navigate(MatchResult),
    ConnectionLost(ConnectionError),
    Resync(SessionId),
    FetchCooldown,
    LeaveViaRest,
}

/// Observable client state for presentation code
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub status: ConnectionStatus,
    pub ticket: Option<QueueTicket>,
    pub match_result: Option<MatchResult>,
    pub connection_error: Option<ConnectionError>,
    pub cooldown_remaining: Option<u32>,
    pub connected: bool,
}

/// The matchmaking connection state machine
pub struct ConnectionManager {
    config: ClientConfig,
    metrics: Arc<Metrics>,
    queue: QueueStateMachine,
    heartbeat: HeartbeatMonitor,
    cooldown: CooldownTracker,
    resync: ResyncCoordinator,
    session: Option<Session>,
    next_session_id: u64,
    reconnect_pending: bool,
    connection_error: Option<ConnectionError>,
}

impl ConnectionManager {
    pub fn new(config: ClientConfig, metrics: Arc<Metrics>) -> Self {
        let heartbeat = HeartbeatMonitor::new(config.heartbeat.clone());
        Self {
            config,
            metrics,
            queue: QueueStateMachine::new(),
            heartbeat,
            cooldown: CooldownTracker::new(),
            resync: ResyncCoordinator::new(),
            session: None,
            next_session_id: 0,
            reconnect_pending: false,
            connection_error: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.queue.status()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            status: self.queue.status(),
            ticket: self.queue.ticket().cloned(),
            match_result: self.queue.match_result().cloned(),
            connection_error: self.connection_error.clone(),
            cooldown_remaining: self.cooldown.remaining_seconds(),
            connected: self.session.as_ref().is_some_and(Session::is_open),
        }
    }

    /// Actions to run once when the client starts
    pub fn initialize(&mut self) -> Vec<Action> {
        vec![Action::FetchCooldown]
    }

    /// Enter the queue, opening a transport if needed.
    pub fn join_queue(&mut self, params: JoinParams) -> Vec<Action> {
        let mut actions = Vec::new();

        if let Some(remaining) = self.cooldown.remaining_seconds() {
            warn!(
                "Queue join for {}/{} rejected, cooldown active ({}s left)",
                params.category, params.map_slug, remaining
            );
            return actions;
        }

        if self.queue.status() == ConnectionStatus::MatchFound {
            debug!("Ignoring queue join while a match handoff is pending");
            return actions;
        }

        match self.session.as_mut() {
            Some(session) if session.is_open() => {
                session.set_pending(params);
                if let Some(params) = session.take_join() {
                    info!(
                        "[SESSION-{}] Joining queue {}/{}",
                        session.id(),
                        params.category,
                        params.map_slug
                    );
                    actions.push(Action::Send(session.id(), queue_join(params)));
                }
            }
            Some(session) => {
                debug!(
                    "[SESSION-{}] Transport not open yet, join deferred",
                    session.id()
                );
                session.set_pending(params);
            }
            None => {
                let id = self.allocate_session_id();
                info!(
                    "[SESSION-{}] Connecting to matchmaking for {}/{}",
                    id, params.category, params.map_slug
                );
                self.session = Some(Session::first(id, params));
                actions.push(Action::Connect(id));
            }
        }

        actions
    }

    /// Leave the queue: best-effort message, durable REST fallback, clean close.
    pub fn leave_queue(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();

        if let Some(session) = self.session.as_ref().filter(|s| s.is_open()) {
            actions.push(Action::Send(session.id(), OutboundMessage::LeaveQueue {}));
        }
        actions.push(Action::LeaveViaRest);

        info!("Leaving matchmaking queue");
        self.connection_error = None;
        self.teardown(&mut actions);
        actions
    }

    /// Owner teardown: cancel every timer and close cleanly.
    pub fn shutdown(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        self.teardown(&mut actions);
        actions.push(Action::CancelTimer(TimerKind::CooldownTick));
        actions
    }

    /// Feed one event through the state machine.
    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        let mut actions = Vec::new();
        match event {
            Event::Opened(id) => self.on_open(id, &mut actions),
            Event::Message(id, text) => self.on_text(id, &text, &mut actions),
            Event::Closed(id, info) => self.on_close(id, info, &mut actions),
            Event::TimerFired(kind) => self.on_timer(kind, &mut actions),
            Event::ResyncCompleted(id, response) => {
                if response.is_none() {
                    self.metrics.record_resync_failure();
                }
                if self.resync.complete(id, response, &mut self.queue) {
                    info!("[SESSION-{}] Queue state resynced with server", id);
                }
            }
            Event::CooldownFetched(seconds) => {
                if self.cooldown.seed(seconds) {
                    info!("Queue cooldown active: {}s", seconds.unwrap_or_default());
                    actions.push(Action::ArmTimer(
                        TimerKind::CooldownTick,
                        self.config.cooldown.tick_interval,
                    ));
                }
            }
            Event::CooldownFetchFailed => {
                debug!(
                    "Cooldown lookup failed, keeping {:?}",
                    self.cooldown.remaining_seconds()
                );
            }
        }
        actions
    }

    fn allocate_session_id(&mut self) -> SessionId {
        self.next_session_id += 1;
        SessionId(self.next_session_id)
    }

    fn is_current(&self, id: SessionId) -> bool {
        self.session.as_ref().is_some_and(|s| s.id() == id)
    }

    fn on_open(&mut self, id: SessionId, actions: &mut Vec<Action>) {
        let Some(session) = self.session.as_mut().filter(|s| s.id() == id) else {
            debug!("[SESSION-{}] Ignoring open of stale session", id);
            return;
        };

        let attempts_before_open = session.mark_open();
        self.connection_error = None;
        self.metrics
            .update_session(|s| s.reconnect_attempt = attempts_before_open);
        actions.push(Action::ArmTimer(TimerKind::Heartbeat, self.heartbeat.start()));

        if self.resync.begin(id, attempts_before_open) {
            info!(
                "[SESSION-{}] Reconnected after {} attempt(s), resyncing queue state",
                id, attempts_before_open
            );
            self.metrics.record_resync();
            actions.push(Action::Resync(id));
        } else {
            info!("[SESSION-{}] Connected", id);
        }
    }

    fn on_text(&mut self, id: SessionId, text: &str, actions: &mut Vec<Action>) {
        if !self.is_current(id) {
            debug!("[SESSION-{}] Ignoring message on stale session", id);
            return;
        }

        match router::route(text) {
            Ok(Some(message)) => self.on_message(id, message, actions),
            Ok(None) => {
                self.metrics.record_unknown_message();
                debug!("[SESSION-{}] Ignoring message of unknown type", id);
            }
            Err(e) => {
                self.metrics.record_malformed_message();
                warn!("[SESSION-{}] Dropping malformed message: {}", id, e);
            }
        }
    }

    fn on_message(&mut self, id: SessionId, message: InboundMessage, actions: &mut Vec<Action>) {
        debug!("[SESSION-{}] Received {}", id, message.kind());

        match message {
            InboundMessage::MatchmakingConnected => {
                self.touch_heartbeat(actions);
                match self.session.as_mut().and_then(Session::take_join) {
                    Some(params) => {
                        info!(
                            "[SESSION-{}] Joining queue {}/{}",
                            id, params.category, params.map_slug
                        );
                        actions.push(Action::Send(id, queue_join(params)));
                    }
                    None => debug!("[SESSION-{}] No join owed, greeting ignored", id),
                }
            }
            InboundMessage::HeartbeatPing => {
                self.metrics.record_heartbeat_ping();
                if let Some(session) = self.session.as_mut() {
                    session.record_heartbeat();
                }
                actions.push(Action::Send(id, OutboundMessage::HeartbeatPong {}));
                if let Some(timeout) = self.heartbeat.record_ping() {
                    actions.push(Action::ArmTimer(TimerKind::Heartbeat, timeout));
                }
            }
            InboundMessage::HealthPing => {
                self.metrics.record_health_ping();
                actions.push(Action::Send(id, OutboundMessage::HealthPong {}));
            }
            InboundMessage::QueueJoined(joined) => {
                self.touch_heartbeat(actions);
                info!(
                    "[SESSION-{}] Queued with ticket {} at position {}/{}",
                    id, joined.ticket_id, joined.position, joined.queue_size
                );
                self.queue.on_joined(joined);
            }
            InboundMessage::QueueStatus(update) => {
                self.touch_heartbeat(actions);
                if !self.queue.on_status(&update) {
                    debug!("[SESSION-{}] Queue status without a ticket, ignored", id);
                }
            }
            InboundMessage::MatchFound(found) => {
                let lobby = found.lobby_code.clone();
                if self.queue.on_match_found(found) {
                    info!(
                        "[SESSION-{}] Match found in lobby {}, handing off in {:?}",
                        id, lobby, self.config.match_handoff_delay
                    );
                    self.heartbeat.stop();
                    actions.push(Action::CancelTimer(TimerKind::Heartbeat));
                    actions.push(Action::ArmTimer(
                        TimerKind::Handoff,
                        self.config.match_handoff_delay,
                    ));
                } else {
                    debug!("[SESSION-{}] Duplicate match_found for {} ignored", id, lobby);
                }
            }
            InboundMessage::QueueCancelled => {
                info!("[SESSION-{}] Queue cancelled by server", id);
                self.teardown(actions);
            }
            InboundMessage::MatchCancelled => {
                self.touch_heartbeat(actions);
                info!(
                    "[SESSION-{}] Match cancelled, server re-queued us; awaiting status",
                    id
                );
            }
            InboundMessage::Error(err) => self.on_server_error(id, err, actions),
        }
    }

    fn on_server_error(&mut self, id: SessionId, err: ServerError, actions: &mut Vec<Action>) {
        match parse_cooldown_code(&err.code, &self.config.cooldown.error_prefix) {
            Some(seconds) => {
                warn!("[SESSION-{}] Queue cooldown from server: {}s", id, seconds);
                if self.cooldown.overwrite(seconds) {
                    actions.push(Action::ArmTimer(
                        TimerKind::CooldownTick,
                        self.config.cooldown.tick_interval,
                    ));
                }
            }
            None => warn!("[SESSION-{}] Server error {}: {}", id, err.code, err.message),
        }
        self.teardown(actions);
    }

    fn on_close(&mut self, id: SessionId, info: CloseInfo, actions: &mut Vec<Action>) {
        let Some(session) = self.session.as_mut().filter(|s| s.id() == id) else {
            debug!("[SESSION-{}] Ignoring close of stale session", id);
            return;
        };
        session.mark_closed();
        self.heartbeat.stop();
        self.resync.cancel();
        actions.push(Action::CancelTimer(TimerKind::Heartbeat));

        match self.queue.status() {
            ConnectionStatus::Queuing if !info.is_clean() => self.schedule_reconnect(info, actions),
            ConnectionStatus::Queuing => {
                info!("[SESSION-{}] Server closed the queue session cleanly", id);
                self.teardown(actions);
            }
            ConnectionStatus::MatchFound => {
                debug!("[SESSION-{}] Transport closed during match handoff", id);
                self.session = None;
            }
            ConnectionStatus::Idle => {
                debug!("[SESSION-{}] Transport closed while idle ({:?})", id, info);
                self.session = None;
            }
        }
    }

    fn schedule_reconnect(&mut self, info: CloseInfo, actions: &mut Vec<Action>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let id = session.id();
        let attempts = session.reconnect_attempts();

        if !self.config.backoff.allows(attempts) {
            error!(
                "[SESSION-{}] Giving up after {} reconnect attempts ({})",
                id, attempts, info.reason
            );
            let err = ConnectionError::ReconnectExhausted { attempts };
            self.metrics.record_fatal_error();
            self.teardown(actions);
            self.connection_error = Some(err.clone());
            actions.push(Action::ConnectionLost(err));
            return;
        }

        let attempt = session.record_failed_attempt();
        let delay = self.config.backoff.delay_for_attempt(attempt);
        warn!(
            "[SESSION-{}] Connection lost ({:?}: {}), reconnecting in {:?} (attempt {}/{})",
            id,
            info.code,
            info.reason,
            delay,
            attempt + 1,
            self.config.backoff.max_attempts
        );
        self.metrics.record_reconnect_attempt();
        self.reconnect_pending = true;
        actions.push(Action::ArmTimer(TimerKind::Reconnect, delay));
    }

    fn on_timer(&mut self, kind: TimerKind, actions: &mut Vec<Action>) {
        match kind {
            TimerKind::Heartbeat => {
                // Left armed during the join handshake; queue_joined re-arms it
                if self.queue.status() != ConnectionStatus::Queuing || !self.heartbeat.expire() {
                    return;
                }
                if let Some(session) = self.session.as_ref().filter(|s| s.is_open()) {
                    warn!(
                        "[SESSION-{}] No heartbeat for {:?}, forcing reconnect",
                        session.id(),
                        self.config.heartbeat.timeout
                    );
                    self.metrics.record_heartbeat_timeout();
                    actions.push(Action::Close(session.id(), CloseCode::HeartbeatTimeout));
                }
            }
            TimerKind::Reconnect => {
                if !std::mem::take(&mut self.reconnect_pending)
                    || self.queue.status() != ConnectionStatus::Queuing
                {
                    return;
                }
                let Some(previous) = self.session.take() else {
                    return;
                };
                let id = self.allocate_session_id();
                info!(
                    "[SESSION-{}] Reconnecting (attempt {})",
                    id,
                    previous.reconnect_attempts()
                );
                self.session = Some(Session::reconnect(id, previous));
                actions.push(Action::Connect(id));
            }
            TimerKind::CooldownTick => {
                if self.cooldown.tick() {
                    actions.push(Action::ArmTimer(
                        TimerKind::CooldownTick,
                        self.config.cooldown.tick_interval,
                    ));
                } else {
                    info!("Queue cooldown expired");
                }
            }
            TimerKind::Handoff => {
                if let Some(result) = self.queue.take_match() {
                    info!("Handing off to lobby {}", result.lobby_code);
                    self.teardown(actions);
                    actions.push(Action::Navigate(result));
                }
            }
        }
    }

    fn touch_heartbeat(&mut self, actions: &mut Vec<Action>) {
        if let Some(timeout) = self.heartbeat.record_signal() {
            actions.push(Action::ArmTimer(TimerKind::Heartbeat, timeout));
        }
    }

    /// Return to idle: drop queue state, stop the episode's timers and close
    /// the session with the clean code.
    fn teardown(&mut self, actions: &mut Vec<Action>) {
        self.queue.reset();
        self.heartbeat.stop();
        self.resync.cancel();
        self.reconnect_pending = false;
        actions.push(Action::CancelTimer(TimerKind::Heartbeat));
        actions.push(Action::CancelTimer(TimerKind::Reconnect));
        actions.push(Action::CancelTimer(TimerKind::Handoff));
        if let Some(session) = self.session.take() {
            actions.push(Action::Close(session.id(), CloseCode::Normal));
        }
    }
}

fn queue_join(params: JoinParams) -> OutboundMessage {
    OutboundMessage::QueueJoin {
        category: params.category,
        map_slug: params.map_slug,
    }
}
