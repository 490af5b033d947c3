use crate::config::HeartbeatConfig;
use tokio::time::Duration;

/// Tracks business-level liveness for the open session.
///
/// The monitor only keeps state; the driver owns the actual timer and reports
/// its expiry back through [`HeartbeatMonitor::expire`].
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,

    /// Whether a timeout is currently armed
    active: bool,

    /// Set once the armed timeout fired, until the next start
    expired: bool,
}

impl HeartbeatMonitor {
    /// Create a new, inactive monitor
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            active: false,
            expired: false,
        }
    }

    /// Arm the timeout for a freshly opened transport.
    ///
    /// Returns the duration the driver should arm.
    pub fn start(&mut self) -> Duration {
        self.active = true;
        self.expired = false;
        self.config.timeout
    }

    /// Disarm. Later expiries are ignored.
    pub fn stop(&mut self) {
        self.active = false;
    }

    /// Record a `heartbeat_ping`.
    ///
    /// Returns the duration to re-arm, or `None` if the monitor is inactive.
    pub fn record_ping(&mut self) -> Option<Duration> {
        self.record_signal()
    }

    /// Record any other business signal that proves liveness.
    pub fn record_signal(&mut self) -> Option<Duration> {
        self.active.then_some(self.config.timeout)
    }

    /// Handle expiry of the armed timeout.
    ///
    /// Returns `true` exactly once per armed period; the monitor disarms itself
    /// so a stale or repeated expiry never triggers a second force-close.
    pub fn expire(&mut self) -> bool {
        if !self.active || self.expired {
            return false;
        }
        self.active = false;
        self.expired = true;
        true
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> HeartbeatConfig {
        HeartbeatConfig {
            timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_initial_state() {
        let mut monitor = HeartbeatMonitor::new(test_config());
        assert!(!monitor.is_active());
        assert!(!monitor.expire()); // Nothing armed
        assert_eq!(monitor.record_ping(), None);
    }

    #[test]
    fn test_start_arms_timeout() {
        let mut monitor = HeartbeatMonitor::new(test_config());
        assert_eq!(monitor.start(), Duration::from_millis(200));
        assert!(monitor.is_active());
    }

    #[test]
    fn test_ping_rearms() {
        let mut monitor = HeartbeatMonitor::new(test_config());
        monitor.start();
        assert_eq!(monitor.record_ping(), Some(Duration::from_millis(200)));
        assert_eq!(monitor.record_signal(), Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_expire_fires_once() {
        let mut monitor = HeartbeatMonitor::new(test_config());
        monitor.start();

        assert!(monitor.expire());
        assert!(!monitor.expire());
        assert!(!monitor.is_active());

        // Restart for a new session arms again
        monitor.start();
        assert!(monitor.expire());
    }

    #[test]
    fn test_stop_suppresses_expiry() {
        let mut monitor = HeartbeatMonitor::new(test_config());
        monitor.start();
        monitor.stop();
        assert!(!monitor.expire());
        assert_eq!(monitor.record_signal(), None);
    }
}
