//! Delivery core for Sentry events.
//!
//! A [`Transport`] gates each [`Event`] on configuration and server rate
//! limits, encodes it as an envelope, and hands the bytes to a [`Backend`].

pub mod auth;
pub mod backend;
pub mod clock;
pub mod config;
pub mod dsn;
pub mod envelope;
pub mod event;
pub mod http_backend;
pub mod rate_limit_headers;
mod rate_limited_warner;
pub mod rate_limiter;
pub mod spool_backend;
pub mod transport;

/// `log` target used for every diagnostic this crate emits.
pub const LOGGER_TARGET: &str = "sentry";

pub use auth::generate_auth_header;
pub use backend::{
    Backend, BackendError, NoopBackend, RecordedSend, RecordingBackend, SendOptions,
    UnimplementedBackend,
};
#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use clock::{Clock, SharedClock, SystemClock, system_clock};
pub use config::{BackendKind, ConfigError, Configuration, ConfigurationBuilder, TransportOptions};
pub use dsn::{Dsn, DsnError};
pub use envelope::{Envelope, EnvelopeError, SdkMeta, encode, encode_event};
pub use event::{Event, EventError, EventKind};
pub use http_backend::{BackoffPolicy, Encoding, HttpBackend, HttpBackendConfig};
pub use rate_limiter::{DataCategory, RateLimitDirective, RateLimitKey, RateLimiter};
pub use spool_backend::SpoolBackend;
pub use transport::{SendOutcome, Transport, TransportBuilder, TransportError};
