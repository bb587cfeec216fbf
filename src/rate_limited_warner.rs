//! Throttled warnings about envelopes a backend had to drop.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default spacing between drop warnings.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Counts dropped envelopes and reports them at most once per interval.
///
/// Callers bump the counter with [`record_drop`](Self::record_drop) and then
/// call [`warn_if_due`](Self::warn_if_due), which invokes the callback with
/// the accumulated count once the interval has elapsed.
pub struct RateLimitedWarner {
    interval_secs: u64,
    last_warn: AtomicU64,
    dropped: AtomicU64,
}

impl RateLimitedWarner {
    /// Create a warner whose first warning fires immediately.
    pub fn new(interval: Duration) -> Self {
        let interval_secs = interval.as_secs();
        Self {
            interval_secs,
            last_warn: AtomicU64::new(now_secs().saturating_sub(interval_secs)),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Call `warn` with the pending drop count if the interval has elapsed.
    pub fn warn_if_due(&self, warn: impl FnOnce(u64)) {
        let now = now_secs();
        let prev = self.last_warn.load(Ordering::Relaxed);
        if now.saturating_sub(prev) < self.interval_secs {
            return;
        }
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
            self.last_warn.store(now, Ordering::Relaxed);
        }
    }

    /// Report pending drops regardless of the interval.
    pub fn flush(&self, warn: impl FnOnce(u64)) {
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
            self.last_warn.store(now_secs(), Ordering::Relaxed);
        }
    }
}

impl Default for RateLimitedWarner {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}
