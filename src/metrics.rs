use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Metrics for observability
///
/// This struct provides counters and gauges for monitoring the matchmaking
/// connection. Use `snapshot()` to get a point-in-time view of all metrics,
/// or use individual getter methods for specific values.
///
/// # Example
/// ```ignore
/// let metrics = client.metrics();
///
/// println!("Reconnect attempts: {}", metrics.reconnect_attempts());
/// println!("Malformed messages: {}", metrics.malformed_messages());
///
/// let snapshot = metrics.snapshot();
/// ```
#[derive(Debug, Default)]
pub struct Metrics {
    // Counter fields - private, exposed via getters
    connections_total: AtomicU64,
    reconnect_attempts_total: AtomicU64,
    messages_received_total: AtomicU64,
    messages_sent_total: AtomicU64,
    malformed_messages_total: AtomicU64,
    unknown_messages_total: AtomicU64,
    heartbeat_pings_total: AtomicU64,
    heartbeat_timeouts_total: AtomicU64,
    health_pings_total: AtomicU64,
    resyncs_total: AtomicU64,
    resync_failures_total: AtomicU64,
    fatal_errors_total: AtomicU64,
    errors_total: AtomicU64,

    /// Gauges for the current session
    session: RwLock<SessionMetrics>,
}

/// Metrics for the current session
#[derive(Debug, Clone, Default)]
pub struct SessionMetrics {
    /// Current session identifier
    pub session_id: u64,
    /// Whether the transport is currently open
    pub is_connected: bool,
    /// Duration since last successful open (None if never connected)
    pub time_since_connected: Option<Duration>,
    /// Duration since last message received (None if no messages)
    pub time_since_last_message: Option<Duration>,
    /// Reconnect attempt that produced this session (0 if first connect)
    pub reconnect_attempt: u32,
    /// Total connected time across sessions
    pub total_uptime: Duration,
    #[doc(hidden)]
    pub(crate) last_connected_at: Option<Instant>,
    #[doc(hidden)]
    pub(crate) last_message_at: Option<Instant>,
}

impl SessionMetrics {
    /// Create a snapshot with computed durations
    fn snapshot(&self) -> SessionMetrics {
        SessionMetrics {
            time_since_connected: self.last_connected_at.map(|t| t.elapsed()),
            time_since_last_message: self.last_message_at.map(|t| t.elapsed()),
            ..self.clone()
        }
    }
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Getters ==========

    /// Get total transport opens
    pub fn connections(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }

    /// Get total reconnect attempts scheduled
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts_total.load(Ordering::Relaxed)
    }

    /// Get total text messages received
    pub fn messages_received(&self) -> u64 {
        self.messages_received_total.load(Ordering::Relaxed)
    }

    /// Get total messages sent
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent_total.load(Ordering::Relaxed)
    }

    /// Get total malformed messages dropped
    pub fn malformed_messages(&self) -> u64 {
        self.malformed_messages_total.load(Ordering::Relaxed)
    }

    /// Get total messages with an unknown type
    pub fn unknown_messages(&self) -> u64 {
        self.unknown_messages_total.load(Ordering::Relaxed)
    }

    /// Get total heartbeat pings received
    pub fn heartbeat_pings(&self) -> u64 {
        self.heartbeat_pings_total.load(Ordering::Relaxed)
    }

    /// Get total heartbeat timeouts that forced a close
    pub fn heartbeat_timeouts(&self) -> u64 {
        self.heartbeat_timeouts_total.load(Ordering::Relaxed)
    }

    /// Get total infrastructure health pings
    pub fn health_pings(&self) -> u64 {
        self.health_pings_total.load(Ordering::Relaxed)
    }

    /// Get total resyncs issued
    pub fn resyncs(&self) -> u64 {
        self.resyncs_total.load(Ordering::Relaxed)
    }

    /// Get total resync calls that failed
    pub fn resync_failures(&self) -> u64 {
        self.resync_failures_total.load(Ordering::Relaxed)
    }

    /// Get total exhausted reconnect budgets
    pub fn fatal_errors(&self) -> u64 {
        self.fatal_errors_total.load(Ordering::Relaxed)
    }

    /// Get total errors
    pub fn errors(&self) -> u64 {
        self.errors_total.load(Ordering::Relaxed)
    }

    // ========== Recording methods (called internally) ==========

    pub(crate) fn record_connection(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect_attempt(&self) {
        self.reconnect_attempts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message_received(&self) {
        self.messages_received_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message_sent(&self) {
        self.messages_sent_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed_message(&self) {
        self.malformed_messages_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unknown_message(&self) {
        self.unknown_messages_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_heartbeat_ping(&self) {
        self.heartbeat_pings_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_heartbeat_timeout(&self) {
        self.heartbeat_timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_health_ping(&self) {
        self.health_pings_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_resync(&self) {
        self.resyncs_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_resync_failure(&self) {
        self.resync_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fatal_error(&self) {
        self.fatal_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Update the current session gauges
    pub(crate) fn update_session(&self, update_fn: impl FnOnce(&mut SessionMetrics)) {
        update_fn(&mut self.session.write());
    }

    /// Get the current session gauges with computed durations
    pub fn session(&self) -> SessionMetrics {
        self.session.read().snapshot()
    }

    /// Get a point-in-time snapshot of all metrics for export
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Acquire),
            reconnect_attempts_total: self.reconnect_attempts_total.load(Ordering::Acquire),
            messages_received_total: self.messages_received_total.load(Ordering::Acquire),
            messages_sent_total: self.messages_sent_total.load(Ordering::Acquire),
            malformed_messages_total: self.malformed_messages_total.load(Ordering::Acquire),
            unknown_messages_total: self.unknown_messages_total.load(Ordering::Acquire),
            heartbeat_pings_total: self.heartbeat_pings_total.load(Ordering::Acquire),
            heartbeat_timeouts_total: self.heartbeat_timeouts_total.load(Ordering::Acquire),
            health_pings_total: self.health_pings_total.load(Ordering::Acquire),
            resyncs_total: self.resyncs_total.load(Ordering::Acquire),
            resync_failures_total: self.resync_failures_total.load(Ordering::Acquire),
            fatal_errors_total: self.fatal_errors_total.load(Ordering::Acquire),
            errors_total: self.errors_total.load(Ordering::Acquire),
            session: self.session(),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub reconnect_attempts_total: u64,
    pub messages_received_total: u64,
    pub messages_sent_total: u64,
    pub malformed_messages_total: u64,
    pub unknown_messages_total: u64,
    pub heartbeat_pings_total: u64,
    pub heartbeat_timeouts_total: u64,
    pub health_pings_total: u64,
    pub resyncs_total: u64,
    pub resync_failures_total: u64,
    pub fatal_errors_total: u64,
    pub errors_total: u64,
    pub session: SessionMetrics,
}
