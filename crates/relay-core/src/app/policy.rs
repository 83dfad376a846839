//! Poll policy: decides how long to sleep between listing passes.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("poll interval must be greater than zero")]
    ZeroInterval,

    #[error("max wait {max_wait:?} is shorter than the poll interval {interval:?}")]
    WaitShorterThanInterval { max_wait: Duration, interval: Duration },

    #[error("backoff multiplier must be finite and >= 1.0, got {0}")]
    InvalidMultiplier(f64),

    #[error("max interval {max_interval:?} is shorter than the poll interval {interval:?}")]
    MaxIntervalTooShort {
        max_interval: Duration,
        interval: Duration,
    },
}

/// Poll policy for AwaitResult.
///
/// `multiplier == 1.0` gives a fixed interval. Anything larger backs off
/// exponentially up to `max_interval`; the overall `max_wait` bound holds
/// either way.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay after the first poll.
    pub interval: Duration,

    /// Total budget measured from submission.
    pub max_wait: Duration,

    pub multiplier: f64,
    pub max_interval: Duration,

    /// Transient failures tolerated in a row before giving up.
    pub max_consecutive_failures: u32,
}

impl Default for PollPolicy {
    /// Reference behaviour: every 2s for up to 120s (60 polls).
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(120),
            multiplier: 1.0,
            max_interval: Duration::from_secs(2),
            max_consecutive_failures: 3,
        }
    }
}

impl PollPolicy {
    /// Fixed-interval policy.
    pub fn fixed(interval: Duration, max_wait: Duration) -> Result<Self, PolicyError> {
        let policy = Self {
            interval,
            max_wait,
            max_interval: interval,
            ..Self::default()
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Switch to exponential backoff.
    pub fn with_backoff(
        mut self,
        multiplier: f64,
        max_interval: Duration,
    ) -> Result<Self, PolicyError> {
        self.multiplier = multiplier;
        self.max_interval = max_interval;
        self.validate()?;
        Ok(self)
    }

    pub fn with_failure_budget(mut self, max_consecutive_failures: u32) -> Self {
        self.max_consecutive_failures = max_consecutive_failures;
        self
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.interval.is_zero() {
            return Err(PolicyError::ZeroInterval);
        }
        if self.max_wait < self.interval {
            return Err(PolicyError::WaitShorterThanInterval {
                max_wait: self.max_wait,
                interval: self.interval,
            });
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(PolicyError::InvalidMultiplier(self.multiplier));
        }
        if self.max_interval < self.interval {
            return Err(PolicyError::MaxIntervalTooShort {
                max_interval: self.max_interval,
                interval: self.interval,
            });
        }
        Ok(())
    }

    /// Sleep before the next poll, given how many polls have been made.
    ///
    /// delay = interval * multiplier^(polls - 1), capped at `max_interval`.
    ///
    /// Example with interval=2s, multiplier=2.0, max_interval=10s:
    /// - after poll 1: 2s
    /// - after poll 2: 4s
    /// - after poll 3: 8s
    /// - after poll 4: 10s
    pub fn delay_after(&self, polls: u32) -> Duration {
        let exponent = polls.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.interval.as_secs_f64() * self.multiplier.powi(exponent);
        let cap = self.max_interval.max(self.interval);
        if !secs.is_finite() || secs >= cap.as_secs_f64() {
            return cap;
        }
        Duration::from_secs_f64(secs)
    }

    /// Sleep before the next poll, or `None` once the wait should end.
    ///
    /// The wait ends when at most one base `interval` of budget is left.
    /// Otherwise the backoff delay is clamped to the remaining budget, so a
    /// backed-off wait still makes its last poll at `max_wait`. With a fixed
    /// interval this gives exactly `max_wait / interval` polls.
    pub fn next_sleep(&self, polls: u32, elapsed: Duration) -> Option<Duration> {
        let remaining = self.max_wait.saturating_sub(elapsed);
        if remaining <= self.interval {
            return None;
        }
        Some(self.delay_after(polls).min(remaining))
    }

    /// Number of polls an unsuccessful wait makes, assuming sleeps are exact.
    pub fn tick_budget(&self) -> u32 {
        if self.interval.is_zero() {
            return 1;
        }
        let mut elapsed = Duration::ZERO;
        let mut polls = 0u32;
        loop {
            polls += 1;
            match self.next_sleep(polls, elapsed) {
                Some(delay) if polls < u32::MAX => elapsed += delay,
                _ => return polls,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_policy_matches_reference_behaviour() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(2));
        assert_eq!(policy.max_wait, Duration::from_secs(120));
        assert_eq!(policy.tick_budget(), 60);
        assert!(policy.validate().is_ok());
    }

    #[rstest]
    #[case::reference(2, 120, 60)]
    #[case::short(2, 4, 2)]
    #[case::scenario(2, 10, 5)]
    #[case::uneven(3, 10, 4)]
    #[case::single(5, 5, 1)]
    fn fixed_tick_budget(#[case] interval: u64, #[case] max_wait: u64, #[case] expected: u32) {
        let policy =
            PollPolicy::fixed(Duration::from_secs(interval), Duration::from_secs(max_wait))
                .unwrap();
        assert_eq!(policy.tick_budget(), expected);
    }

    #[test]
    fn exponential_backoff_increases_until_cap() {
        let policy = PollPolicy::fixed(Duration::from_secs(2), Duration::from_secs(120))
            .unwrap()
            .with_backoff(2.0, Duration::from_secs(10))
            .unwrap();

        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
        assert_eq!(policy.delay_after(4), Duration::from_secs(10));
        assert_eq!(policy.delay_after(400), Duration::from_secs(10));
    }

    #[test]
    fn backoff_still_respects_max_wait() {
        let policy = PollPolicy::fixed(Duration::from_secs(1), Duration::from_secs(20))
            .unwrap()
            .with_backoff(2.0, Duration::from_secs(8))
            .unwrap();
        // sleeps 1, 2, 4, 8 -> 15s; the last sleep is clamped to 5s -> poll at 20s
        assert_eq!(policy.tick_budget(), 6);
    }

    #[test]
    fn last_backoff_sleep_is_clamped_to_remaining_budget() {
        let policy = PollPolicy::fixed(Duration::from_secs(1), Duration::from_secs(120))
            .unwrap()
            .with_backoff(2.0, Duration::from_secs(120))
            .unwrap();

        assert_eq!(
            policy.next_sleep(7, Duration::from_secs(63)),
            Some(Duration::from_secs(57))
        );
        assert_eq!(policy.next_sleep(8, Duration::from_secs(120)), None);
        assert_eq!(policy.tick_budget(), 8);
    }

    #[rstest]
    #[case::plenty_left(0, Some(2))]
    #[case::exactly_one_interval_left(118, None)]
    #[case::jitter_past_last_slot(119, None)]
    #[case::past_deadline(125, None)]
    fn fixed_next_sleep(#[case] elapsed: u64, #[case] expected: Option<u64>) {
        let policy = PollPolicy::default();
        assert_eq!(
            policy.next_sleep(1, Duration::from_secs(elapsed)),
            expected.map(Duration::from_secs)
        );
    }

    #[test]
    fn invalid_policies_are_rejected() {
        assert_eq!(
            PollPolicy::fixed(Duration::ZERO, Duration::from_secs(1)),
            Err(PolicyError::ZeroInterval)
        );
        assert!(matches!(
            PollPolicy::fixed(Duration::from_secs(5), Duration::from_secs(1)),
            Err(PolicyError::WaitShorterThanInterval { .. })
        ));
        let base = PollPolicy::default();
        assert_eq!(
            base.clone().with_backoff(0.5, Duration::from_secs(4)),
            Err(PolicyError::InvalidMultiplier(0.5))
        );
        assert!(matches!(
            base.with_backoff(2.0, Duration::from_secs(1)),
            Err(PolicyError::MaxIntervalTooShort { .. })
        ));
    }
}
