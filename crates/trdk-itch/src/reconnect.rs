//! Reconnect backoff.
//!
//! An attempt that would follow the previous one within `min_interval` is
//! delayed by `delay`; otherwise it starts right away.

use std::time::Duration;

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub min_interval: Duration,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { min_interval: DEFAULT_MIN_INTERVAL, delay: DEFAULT_DELAY }
    }
}

impl ReconnectPolicy {
    /// Wait before the next attempt, given the time since the last one
    /// (`None` if there was none).
    pub fn delay_for(&self, since_last_attempt: Option<Duration>) -> Duration {
        match since_last_attempt {
            Some(elapsed) if elapsed <= self.min_interval => self.delay,
            _ => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_attempt_is_delayed() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(Some(Duration::from_secs(10))), Duration::from_secs(30));
        assert_eq!(policy.delay_for(Some(Duration::from_secs(60))), Duration::from_secs(30));
    }

    #[test]
    fn old_attempt_reconnects_immediately() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(Some(Duration::from_secs(90))), Duration::ZERO);
        assert_eq!(policy.delay_for(None), Duration::ZERO);
    }

    #[test]
    fn custom_policy() {
        let policy = ReconnectPolicy {
            min_interval: Duration::from_secs(5),
            delay: Duration::from_millis(200),
        };
        assert_eq!(policy.delay_for(Some(Duration::from_secs(1))), Duration::from_millis(200));
        assert_eq!(policy.delay_for(Some(Duration::from_secs(6))), Duration::ZERO);
    }
}
