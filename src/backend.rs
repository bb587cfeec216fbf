//! Backend contract and the in-process backends.
//!
//! A backend receives fully encoded envelopes from the
//! [`Transport`](crate::transport::Transport) and is solely responsible for
//! getting them somewhere. Network backends may report server rate limits
//! back into the shared [`RateLimiter`](crate::rate_limiter::RateLimiter).

use std::{any::Any, io, sync::Arc, time::Duration};

use parking_lot::Mutex;
use thiserror::Error;

/// Errors a backend may return from [`Backend::send_data`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// The bare contract was invoked without a concrete backend.
    #[error("no transport backend configured; send_data is not implemented")]
    NotImplemented,
    /// The backend queue is at capacity and the envelope was dropped.
    #[error("backend queue is full")]
    QueueFull,
    /// The backend has been shut down.
    #[error("backend is closed")]
    Closed,
    /// Neither the call nor the backend configuration names an endpoint.
    #[error("no endpoint to send to")]
    MissingEndpoint,
    /// Local I/O failure (e.g. writing a spool file).
    #[error(transparent)]
    Io(#[from] io::Error),
    /// TLS setup for a network backend failed.
    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),
}

/// Per-call options supplied by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Value for the `X-Sentry-Auth` header, generated for this send.
    pub auth_header: Option<String>,
    /// Overrides the backend's configured endpoint.
    pub endpoint: Option<String>,
}

impl SendOptions {
    pub fn with_auth_header(mut self, header: impl Into<String>) -> Self {
        self.auth_header = Some(header.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

/// Capability implemented by every concrete sender.
///
/// Implementations are shared across threads; `send_data` runs on the
/// caller's thread and should return quickly.
pub trait Backend: Send + Sync {
    /// Deliver or enqueue one encoded envelope.
    fn send_data(&self, data: &[u8], options: &SendOptions) -> Result<(), BackendError>;

    /// Wait up to `timeout` for buffered envelopes to be handed off.
    ///
    /// Returns `false` if the backend could not confirm within the timeout.
    fn flush(&self, _timeout: Duration) -> bool {
        true
    }

    /// Downcast support for tests and diagnostics.
    fn as_any(&self) -> &dyn Any;
}

/// The contract with nothing behind it.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnimplementedBackend;

impl Backend for UnimplementedBackend {
    fn send_data(&self, _data: &[u8], _options: &SendOptions) -> Result<(), BackendError> {
        Err(BackendError::NotImplemented)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Accepts and discards every envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackend;

impl Backend for NoopBackend {
    fn send_data(&self, _data: &[u8], _options: &SendOptions) -> Result<(), BackendError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One envelope captured by [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSend {
    pub data: Vec<u8>,
    pub options: SendOptions,
}

/// Keeps every envelope in memory.
///
/// Clones share the same store, so a test can keep one handle while the
/// transport owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    sends: Arc<Mutex<Vec<RecordedSend>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything received so far.
    pub fn sends(&self) -> Vec<RecordedSend> {
        self.sends.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.sends.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sends.lock().is_empty()
    }

    pub fn clear(&self) {
        self.sends.lock().clear();
    }
}

impl Backend for RecordingBackend {
    fn send_data(&self, data: &[u8], options: &SendOptions) -> Result<(), BackendError> {
        self.sends.lock().push(RecordedSend {
            data: data.to_vec(),
            options: options.clone(),
        });
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
