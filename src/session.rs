use std::fmt;
use tokio::time::Instant;

/// Identifies one transport connection attempt.
///
/// Events tagged with an id other than the current session's are stale and
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Queue parameters remembered so a reconnect can resume the join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinParams {
    pub category: String,
    pub map_slug: String,
}

impl JoinParams {
    pub fn new(category: impl Into<String>, map_slug: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            map_slug: map_slug.into(),
        }
    }
}

/// The single owned connection context.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    /// Whether the transport reported a successful open
    open: bool,
    /// Failed reconnects in the current queuing episode
    reconnect_attempts: u32,
    /// Last heartbeat ping observed on this session
    last_heartbeat: Option<Instant>,
    /// Parameters to (re)send once the server greets us
    pending: Option<JoinParams>,
    /// Set until `matchmaking_connected` triggers the join send
    awaiting_join: bool,
}

impl Session {
    /// First session of a queuing episode
    pub fn first(id: SessionId, params: JoinParams) -> Self {
        Self {
            id,
            open: false,
            reconnect_attempts: 0,
            last_heartbeat: None,
            pending: Some(params),
            awaiting_join: true,
        }
    }

    /// Replacement session for a reconnect attempt.
    ///
    /// The backoff counter and pending parameters carry over; the join is
    /// re-armed so the queue entry is resumed on the new transport.
    pub fn reconnect(id: SessionId, previous: Session) -> Self {
        let awaiting_join = previous.pending.is_some();
        Self {
            id,
            open: false,
            reconnect_attempts: previous.reconnect_attempts,
            last_heartbeat: None,
            pending: previous.pending,
            awaiting_join,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.last_heartbeat
    }

    pub fn pending(&self) -> Option<&JoinParams> {
        self.pending.as_ref()
    }

    /// Mark the transport open.
    ///
    /// Returns the attempt count observed immediately before the reset, so the
    /// caller can tell a genuine reconnect from a first connect.
    pub fn mark_open(&mut self) -> u32 {
        self.open = true;
        std::mem::take(&mut self.reconnect_attempts)
    }

    pub fn mark_closed(&mut self) {
        self.open = false;
    }

    /// Count one more failed reconnect; returns the attempt index used for
    /// the backoff lookup.
    pub fn record_failed_attempt(&mut self) -> u32 {
        let attempt = self.reconnect_attempts;
        self.reconnect_attempts += 1;
        attempt
    }

    pub fn record_heartbeat(&mut self) {
        self.last_heartbeat = Some(Instant::now());
    }

    /// Replace the parameters and re-arm the join
    pub fn set_pending(&mut self, params: JoinParams) {
        self.pending = Some(params);
        self.awaiting_join = true;
    }

    /// Take the join parameters if a join is still owed.
    ///
    /// Clears the flag so a repeated greeting never sends a second join.
    pub fn take_join(&mut self) -> Option<JoinParams> {
        if !self.awaiting_join {
            return None;
        }
        self.awaiting_join = false;
        self.pending.clone()
    }
}
