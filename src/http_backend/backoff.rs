//! Jittered exponential backoff for retrying one envelope.

use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng, rngs::StdRng};

use super::config::BackoffPolicy;

const MIN_SLEEP: Duration = Duration::from_millis(10);

/// Tracks consecutive failures and produces jittered retry delays.
///
/// The window doubles after every failure up to `cap`. Once failures have
/// persisted for `deadline` the envelope is abandoned. The worker resets the
/// state once an envelope reaches any final outcome.
pub struct BackoffState {
    policy: BackoffPolicy,
    current: Duration,
    failure_since: Option<Instant>,
    rng: StdRng,
}

impl BackoffState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self::with_rng(policy, StdRng::from_entropy())
    }

    fn with_rng(policy: BackoffPolicy, rng: StdRng) -> Self {
        Self {
            current: policy.base,
            failure_since: None,
            rng,
            policy,
        }
    }

    /// Forget accumulated failures.
    pub fn reset(&mut self) {
        self.current = self.policy.base;
        self.failure_since = None;
    }

    /// Delay before the next attempt, or `None` once the deadline passed.
    pub fn next_sleep(&mut self, now: Instant) -> Option<Duration> {
        let start = *self.failure_since.get_or_insert(now);
        if now.duration_since(start) >= self.policy.deadline {
            self.reset();
            return None;
        }
        let window = self.current.max(MIN_SLEEP);
        self.current = self.current.saturating_mul(2).min(self.policy.cap);

        let max_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        let min_ms = u64::try_from(MIN_SLEEP.as_millis()).unwrap_or(0);
        Some(Duration::from_millis(self.rng.gen_range(min_ms..=max_ms)))
    }
}
