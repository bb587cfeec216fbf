//! Buffered HTTP backend.
//!
//! [`HttpBackend`] queues encoded envelopes on a bounded channel and a
//! worker thread POSTs them to the envelope endpoint.
//!
//! # Response handling
//!
//! - **Any status**: `X-Sentry-Rate-Limits` directives, when present, are
//!   applied to the shared rate limiter.
//! - **2xx**: success, backoff reset.
//! - **429**: `Retry-After` (or a 60 s default) limits every category when no
//!   structured header was sent; the envelope is dropped.
//! - **5xx** and network errors: retried with jittered exponential backoff
//!   until the backoff deadline.
//! - **Other 4xx**: dropped with a warning carrying `X-Sentry-Error`.

mod backoff;
mod compression;
mod config;
mod handler;
mod worker;


pub use compression::GZIP_THRESHOLD;
pub use config::{BackoffPolicy, Encoding, HttpBackendConfig};
pub use handler::HttpBackend;
pub use worker::{ENVELOPE_CONTENT_TYPE, ResponseClass};
