//! Wall-clock sources used for timestamps and rate-limit expiry.
//!
//! The dispatcher and the [`RateLimiter`](crate::rate_limiter::RateLimiter)
//! read time through the [`Clock`] trait so tests can pin or advance it.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    /// Return the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shared clock handle used by components that read the same time source.
pub type SharedClock = Arc<dyn Clock>;

/// Return a [`SharedClock`] wrapping [`SystemClock`].
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

#[cfg(any(test, feature = "test-util"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "test-util"))]
mod manual {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};
    use parking_lot::Mutex;

    use super::Clock;

    /// Clock whose time only moves when a test moves it.
    ///
    /// Clones share the same underlying instant.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        current: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock frozen at `start`.
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                current: Arc::new(Mutex::new(start)),
            }
        }

        /// Move the clock forward by `by`.
        pub fn advance(&self, by: std::time::Duration) {
            let step = Duration::from_std(by).unwrap_or(Duration::MAX);
            let mut current = self.current.lock();
            *current = current.checked_add_signed(step).unwrap_or(*current);
        }

        /// Jump to an absolute instant.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.current.lock() = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.current.lock()
        }
    }
}

impl fmt::Debug for dyn Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock").field("now", &self.now()).finish()
    }
}
