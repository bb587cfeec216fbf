//! Public backend type exported by the crate.

use std::{any::Any, sync::Arc, thread, time::Duration};

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::{
    LOGGER_TARGET,
    backend::{Backend, BackendError, SendOptions},
    clock::SharedClock,
    rate_limited_warner::RateLimitedWarner,
    rate_limiter::RateLimiter,
};

use super::{
    config::HttpBackendConfig,
    worker::{HttpCommand, WorkerContext, build_agent, enqueue_envelope, flush_queue, spawn_worker},
};

/// Buffered backend that POSTs envelopes from a background thread.
///
/// `send_data` only enqueues, so callers never wait on the network. Rate
/// limit headers observed by the worker are applied to the shared
/// [`RateLimiter`].
pub struct HttpBackend {
    tx: Mutex<Option<Sender<HttpCommand>>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    warner: RateLimitedWarner,
    /// Bound on how long `close` waits for the worker to drain.
    shutdown_timeout: Duration,
}

impl HttpBackend {
    /// Start the worker thread.
    ///
    /// # Errors
    ///
    /// Fails if the TLS connector cannot be built or the thread cannot be
    /// spawned.
    pub fn new(
        config: HttpBackendConfig,
        rate_limiter: Arc<RateLimiter>,
        clock: SharedClock,
    ) -> Result<Self, BackendError> {
        let shutdown_timeout = config.timeout.saturating_mul(2);
        let warner = RateLimitedWarner::new(config.warn_interval);
        let agent = build_agent(&config)?;
        let (tx, handle) = spawn_worker(WorkerContext {
            config,
            agent,
            rate_limiter,
            clock,
        })?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            warner,
            shutdown_timeout,
        })
    }

    /// Drain queued envelopes and stop the worker.
    ///
    /// Later sends fail with [`BackendError::Closed`].
    pub fn close(&self) {
        self.request_shutdown();
        self.join_worker();
    }

    fn sender(&self) -> Option<Sender<HttpCommand>> {
        self.tx.lock().clone()
    }

    fn request_shutdown(&self) {
        let Some(tx) = self.tx.lock().take() else {
            return;
        };
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if tx.send(HttpCommand::Shutdown(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.recv_timeout(self.shutdown_timeout);
    }

    fn join_worker(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.join().is_err() {
            log::warn!(target: LOGGER_TARGET, "HTTP transport worker thread panicked");
        }
    }
}

impl Backend for HttpBackend {
    fn send_data(&self, data: &[u8], options: &SendOptions) -> Result<(), BackendError> {
        let Some(tx) = self.sender() else {
            self.warner.record_drop();
            self.warner.warn_if_due(|count| {
                log::warn!(
                    target: LOGGER_TARGET,
                    "HTTP transport dropped {count} envelopes after shutdown"
                );
            });
            return Err(BackendError::Closed);
        };
        enqueue_envelope(&tx, data, options, &self.warner)
    }

    fn flush(&self, timeout: Duration) -> bool {
        let Some(tx) = self.sender() else {
            return false;
        };
        self.warner.flush(|count| {
            log::warn!(
                target: LOGGER_TARGET,
                "HTTP transport dropped {count} envelopes in the last interval"
            );
        });
        flush_queue(&tx, timeout)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for HttpBackend {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("open", &self.tx.lock().is_some())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}
