//! Exponential backoff with optional jitter.

use rand::Rng;
use std::time::Duration;

/// First retry delay.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(100);
/// Delay cap. Five minutes, matching how long a throttled store is worth
/// waiting on before another probe.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5 * 60);
const DEFAULT_FACTOR: f64 = 2.0;

/// Per-worker retry delay generator.
///
/// The delay grows as `min * factor^attempt`, capped at `max`. With jitter
/// enabled (the default) each delay is drawn uniformly from `[min, computed]`
/// so that workers throttled at the same instant don't reissue their
/// requests in lockstep. [`reset`](Self::reset) drops back to the minimum
/// and is called after any successful operation.
///
/// One instance belongs to exactly one retry sequence; it is never shared
/// between workers.
#[derive(Clone, Debug)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    factor: f64,
    jitter: bool,
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max, factor: DEFAULT_FACTOR, jitter: true, attempt: 0 }
    }

    /// Disable jitter. Retry sequences become deterministic; used by tests
    /// and nothing else so far.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Number of delays handed out since construction or the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The delay for the current attempt; advances the internal counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Drop back to the minimum delay. Called after any success.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        // Past ~64 doublings the cap dominates; clamping keeps the
        // exponent finite for indefinitely-throttled workers.
        let exponent = attempt.min(64);
        let grown = self.min.as_secs_f64() * self.factor.powi(exponent as i32);
        let capped = grown.min(self.max.as_secs_f64());
        let min = self.min.as_secs_f64();
        if !self.jitter || capped <= min {
            return Duration::from_secs_f64(capped);
        }
        Duration::from_secs_f64(rand::rng().random_range(min..=capped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn fixed() -> Backoff {
        Backoff::new(Duration::from_millis(100), Duration::from_secs(1)).without_jitter()
    }

    #[rstest]
    #[case(0, Duration::from_millis(100))]
    #[case(1, Duration::from_millis(200))]
    #[case(2, Duration::from_millis(400))]
    #[case(3, Duration::from_millis(800))]
    #[case(4, Duration::from_secs(1))]
    #[case(5, Duration::from_secs(1))]
    fn test_growth_and_cap(#[case] attempt: u32, #[case] expected: Duration) {
        let mut backoff = fixed();
        let mut delay = Duration::ZERO;
        for _ in 0..=attempt {
            delay = backoff.next_delay();
        }
        assert_eq!(delay, expected);
    }

    #[test]
    fn test_delays_are_non_decreasing_until_cap() {
        let mut backoff = fixed();
        let mut previous = Duration::ZERO;
        for _ in 0..10 {
            let delay = backoff.next_delay();
            assert!(delay >= previous);
            previous = delay;
        }
        assert_eq!(previous, Duration::from_secs(1));
    }

    #[test]
    fn test_reset_returns_to_minimum() {
        let mut backoff = fixed();
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_jittered_delay_stays_within_bounds() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        for attempt in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_millis(100), "attempt {attempt}: {delay:?}");
            assert!(delay <= Duration::from_secs(1), "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn test_huge_attempt_counts_stay_capped() {
        let mut backoff = fixed();
        for _ in 0..10_000 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
