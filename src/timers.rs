use tokio::time::{sleep_until, Duration, Instant};

/// The four independently cancellable timers of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Business heartbeat silence timeout
    Heartbeat,
    /// Delay before the next reconnect attempt
    Reconnect,
    /// One-second cooldown countdown
    CooldownTick,
    /// Delay before the match navigation handoff
    Handoff,
}

impl TimerKind {
    pub const ALL: [TimerKind; 4] = [
        TimerKind::Heartbeat,
        TimerKind::Reconnect,
        TimerKind::CooldownTick,
        TimerKind::Handoff,
    ];

    fn index(self) -> usize {
        match self {
            TimerKind::Heartbeat => 0,
            TimerKind::Reconnect => 1,
            TimerKind::CooldownTick => 2,
            TimerKind::Handoff => 3,
        }
    }
}

/// Deadline slots polled by the driver loop.
///
/// Arming replaces any previous deadline of the same kind; cancelling clears it.
#[derive(Debug, Default)]
pub struct Timers {
    deadlines: [Option<Instant>; 4],
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, kind: TimerKind, after: Duration) {
        self.deadlines[kind.index()] = Some(Instant::now() + after);
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.deadlines[kind.index()] = None;
    }

    pub fn cancel_all(&mut self) {
        self.deadlines = [None; 4];
    }

    #[cfg(test)]
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadlines[kind.index()].is_some()
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.deadlines[kind.index()]
    }

    /// Earliest armed timer
    pub fn next(&self) -> Option<(TimerKind, Instant)> {
        TimerKind::ALL
            .iter()
            .filter_map(|kind| self.deadline(*kind).map(|at| (*kind, at)))
            .min_by_key(|(_, at)| *at)
    }

    /// Sleep until the earliest deadline, then clear and return it.
    ///
    /// Pends forever when nothing is armed. Cancel-safe: dropping the future
    /// before it completes leaves the slot untouched.
    pub async fn expired(&mut self) -> TimerKind {
        match self.next() {
            Some((kind, at)) => {
                sleep_until(at).await;
                self.cancel(kind);
                kind
            }
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_and_cancel() {
        let mut timers = Timers::new();
        timers.arm(TimerKind::Reconnect, Duration::from_secs(1));
        assert!(timers.is_armed(TimerKind::Reconnect));
        assert!(!timers.is_armed(TimerKind::Heartbeat));

        timers.cancel(TimerKind::Reconnect);
        assert!(timers.next().is_none());
    }

    #[test]
    fn test_next_is_earliest() {
        let mut timers = Timers::new();
        timers.arm(TimerKind::Heartbeat, Duration::from_secs(30));
        timers.arm(TimerKind::Handoff, Duration::from_secs(3));
        timers.arm(TimerKind::CooldownTick, Duration::from_secs(1));

        assert_eq!(timers.next().map(|(k, _)| k), Some(TimerKind::CooldownTick));
        timers.cancel_all();
        assert!(timers.next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_fires_in_order() {
        let mut timers = Timers::new();
        timers.arm(TimerKind::Handoff, Duration::from_millis(3000));
        timers.arm(TimerKind::Reconnect, Duration::from_millis(1000));

        let start = Instant::now();
        assert_eq!(timers.expired().await, TimerKind::Reconnect);
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
        assert_eq!(timers.expired().await, TimerKind::Handoff);
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
        assert!(timers.next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_deadline() {
        let mut timers = Timers::new();
        timers.arm(TimerKind::Heartbeat, Duration::from_secs(30));
        tokio::time::advance(Duration::from_secs(20)).await;
        timers.arm(TimerKind::Heartbeat, Duration::from_secs(30));

        let start = Instant::now();
        timers.expired().await;
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }
}
