//! Configuration consumed by [`HttpBackend`](super::HttpBackend).
//!
//! [`ConfigurationBuilder`](crate::config::ConfigurationBuilder) derives these
//! values from the transport options; tests construct them directly.

use std::time::Duration;

use crate::{auth::USER_AGENT, rate_limited_warner::DEFAULT_WARN_INTERVAL};

/// Default bounded queue capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 30;
/// Default connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
/// Default whole-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
/// Default base delay for exponential backoff retries.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(100);
/// Default maximum delay for exponential backoff retries.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(10);
/// Default absolute deadline for retrying one envelope.
pub const DEFAULT_BACKOFF_DEADLINE: Duration = Duration::from_secs(30);

/// Content encoding applied to request bodies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Encoding {
    /// Gzip bodies above the compression threshold.
    #[default]
    Gzip,
    /// Always send bodies as-is.
    Identity,
}

/// Exponential backoff policy for retryable failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub deadline: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            cap: DEFAULT_BACKOFF_CAP,
            deadline: DEFAULT_BACKOFF_DEADLINE,
        }
    }
}

/// Configuration object describing how to construct an
/// [`HttpBackend`](super::HttpBackend).
#[derive(Clone, Debug)]
pub struct HttpBackendConfig {
    /// Envelope URL used when a send carries no endpoint override.
    pub url: Option<String>,
    /// Bounded queue capacity between callers and the worker.
    pub capacity: usize,
    /// Timeout for establishing connections.
    pub connect_timeout: Duration,
    /// Timeout for a whole request.
    pub timeout: Duration,
    /// Verify TLS certificates and host names.
    pub ssl_verification: bool,
    pub encoding: Encoding,
    pub backoff: BackoffPolicy,
    /// Interval between rate-limited drop warnings.
    pub warn_interval: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            capacity: DEFAULT_CHANNEL_CAPACITY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            ssl_verification: true,
            encoding: Encoding::default(),
            backoff: BackoffPolicy::default(),
            warn_interval: DEFAULT_WARN_INTERVAL,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl HttpBackendConfig {
    /// Target `url` by default.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}
