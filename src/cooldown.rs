//! Local cooldown countdown, seeded and corrected by the server.

/// Parse a cooldown-coded server error such as `QUEUE_COOLDOWN:45`.
pub fn parse_cooldown_code(code: &str, prefix: &str) -> Option<u32> {
    let rest = code.strip_prefix(prefix)?.strip_prefix(':')?;
    rest.trim().parse().ok()
}

/// Remaining cooldown, decremented once per tick.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    remaining_seconds: Option<u32>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the local value with a server-supplied one.
    ///
    /// Returns `true` if a countdown is now running and the tick should be armed.
    pub fn overwrite(&mut self, seconds: u32) -> bool {
        if seconds == 0 {
            self.remaining_seconds = None;
            return false;
        }
        self.remaining_seconds = Some(seconds);
        true
    }

    /// Seed from the REST cooldown endpoint; `None` means no cooldown.
    pub fn seed(&mut self, seconds: Option<u32>) -> bool {
        match seconds {
            Some(s) => self.overwrite(s),
            None => {
                self.remaining_seconds = None;
                false
            }
        }
    }

    /// Advance the countdown by one tick.
    ///
    /// Returns `true` while the countdown is still running.
    pub fn tick(&mut self) -> bool {
        match self.remaining_seconds {
            Some(s) if s > 1 => {
                self.remaining_seconds = Some(s - 1);
                true
            }
            _ => {
                self.remaining_seconds = None;
                false
            }
        }
    }

    pub fn remaining_seconds(&self) -> Option<u32> {
        self.remaining_seconds
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.remaining_seconds.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cooldown_code() {
        assert_eq!(parse_cooldown_code("QUEUE_COOLDOWN:45", "QUEUE_COOLDOWN"), Some(45));
        assert_eq!(parse_cooldown_code("QUEUE_COOLDOWN: 7", "QUEUE_COOLDOWN"), Some(7));
        assert_eq!(parse_cooldown_code("QUEUE_COOLDOWN", "QUEUE_COOLDOWN"), None);
        assert_eq!(parse_cooldown_code("QUEUE_COOLDOWN:abc", "QUEUE_COOLDOWN"), None);
        assert_eq!(parse_cooldown_code("QUEUE_COOLDOWNX:5", "QUEUE_COOLDOWN"), None);
        assert_eq!(parse_cooldown_code("BANNED", "QUEUE_COOLDOWN"), None);
    }

    #[test]
    fn test_tick_counts_down_and_clears() {
        let mut tracker = CooldownTracker::new();
        assert!(tracker.overwrite(3));

        assert!(tracker.tick());
        assert_eq!(tracker.remaining_seconds(), Some(2));
        assert!(tracker.tick());
        assert_eq!(tracker.remaining_seconds(), Some(1));
        assert!(!tracker.tick());
        assert_eq!(tracker.remaining_seconds(), None);

        // Ticking an inactive tracker is harmless
        assert!(!tracker.tick());
    }

    #[test]
    fn test_server_value_wins() {
        let mut tracker = CooldownTracker::new();
        tracker.overwrite(10);
        tracker.tick();
        tracker.tick();
        assert_eq!(tracker.remaining_seconds(), Some(8));

        assert!(tracker.overwrite(45));
        assert_eq!(tracker.remaining_seconds(), Some(45));
    }

    #[test]
    fn test_seed() {
        let mut tracker = CooldownTracker::new();
        assert!(!tracker.seed(None));
        assert!(!tracker.is_active());
        assert!(tracker.seed(Some(12)));
        assert_eq!(tracker.remaining_seconds(), Some(12));
        assert!(!tracker.seed(Some(0)));
        assert!(!tracker.is_active());
    }
}
