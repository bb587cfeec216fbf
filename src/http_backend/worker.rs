//! Worker thread driving HTTP I/O.
//!
//! The worker owns a ureq [`Agent`] for connection pooling, feeds rate-limit
//! headers back into the shared [`RateLimiter`], and retries transient
//! failures with exponential backoff.

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use log::{debug, warn};
use ureq::{Agent, AgentBuilder};

use crate::{
    LOGGER_TARGET,
    backend::{BackendError, SendOptions},
    clock::SharedClock,
    rate_limit_headers::{RATE_LIMITS_HEADER, RETRY_AFTER_HEADER, directives_from_response},
    rate_limited_warner::RateLimitedWarner,
    rate_limiter::RateLimiter,
};

use super::{backoff::BackoffState, compression::encode_body, config::HttpBackendConfig};

/// Content type of envelope request bodies.
pub const ENVELOPE_CONTENT_TYPE: &str = "application/x-sentry-envelope";
/// Header the server uses to explain rejected envelopes.
pub const SENTRY_ERROR_HEADER: &str = "x-sentry-error";

/// Commands processed by the worker thread.
#[derive(Debug)]
pub enum HttpCommand {
    Envelope { data: Vec<u8>, options: SendOptions },
    Flush(Sender<()>),
    Shutdown(Sender<()>),
}

/// Classification of an HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx responses.
    Success,
    /// 429: the server applied a rate limit; the envelope is dropped.
    RateLimited,
    /// 5xx: retry with backoff.
    Retryable,
    /// Any other status: drop without retry.
    Permanent,
}

/// Classify an HTTP status code.
pub(crate) fn classify_status(status: u16) -> ResponseClass {
    match status {
        200..=299 => ResponseClass::Success,
        429 => ResponseClass::RateLimited,
        500..=599 => ResponseClass::Retryable,
        _ => ResponseClass::Permanent,
    }
}

/// Shared state handed to the worker thread at spawn time.
pub(crate) struct WorkerContext {
    pub config: HttpBackendConfig,
    pub agent: Agent,
    pub rate_limiter: Arc<RateLimiter>,
    pub clock: SharedClock,
}

/// Build the ureq agent, honouring `ssl_verification`.
pub(crate) fn build_agent(config: &HttpBackendConfig) -> Result<Agent, BackendError> {
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(!config.ssl_verification)
        .danger_accept_invalid_hostnames(!config.ssl_verification)
        .build()?;
    Ok(AgentBuilder::new()
        .timeout_connect(config.connect_timeout)
        .timeout(config.timeout)
        .tls_connector(Arc::new(tls))
        .build())
}

/// Spawn the worker thread and return its command channel.
pub(crate) fn spawn_worker(
    context: WorkerContext,
) -> Result<(Sender<HttpCommand>, thread::JoinHandle<()>), BackendError> {
    let (tx, rx) = bounded(context.config.capacity);
    let handle = thread::Builder::new()
        .name("sentry-http-transport".into())
        .spawn(move || Worker::new(context).run(rx))?;
    Ok((tx, handle))
}

struct Worker {
    context: WorkerContext,
    backoff: BackoffState,
    warner: RateLimitedWarner,
}

/// What one request attempt observed.
struct Attempt {
    class: ResponseClass,
    detail: Option<String>,
}

impl Worker {
    fn new(context: WorkerContext) -> Self {
        let backoff = BackoffState::new(context.config.backoff.clone());
        let warner = RateLimitedWarner::new(context.config.warn_interval);
        Self {
            context,
            backoff,
            warner,
        }
    }

    fn run(mut self, rx: Receiver<HttpCommand>) {
        loop {
            match rx.recv() {
                Ok(HttpCommand::Envelope { data, options }) => self.deliver(&data, &options),
                Ok(HttpCommand::Flush(ack)) => {
                    let _ = ack.send(());
                }
                Ok(HttpCommand::Shutdown(ack)) => {
                    self.drain_pending(&rx);
                    let _ = ack.send(());
                    break;
                }
                Err(_) => {
                    self.drain_pending(&rx);
                    break;
                }
            }
        }
        self.warner.flush(|count| {
            warn!(target: LOGGER_TARGET, "HTTP transport dropped {count} envelopes before shutdown");
        });
    }

    fn drain_pending(&mut self, rx: &Receiver<HttpCommand>) {
        loop {
            match rx.try_recv() {
                Ok(HttpCommand::Envelope { data, options }) => self.deliver(&data, &options),
                Ok(HttpCommand::Flush(ack)) | Ok(HttpCommand::Shutdown(ack)) => {
                    let _ = ack.send(());
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn deliver(&mut self, data: &[u8], options: &SendOptions) {
        self.attempt_delivery(data, options);
        // Each envelope gets its own retry deadline.
        self.backoff.reset();
    }

    fn attempt_delivery(&mut self, data: &[u8], options: &SendOptions) {
        let Some(url) = options
            .endpoint
            .clone()
            .or_else(|| self.context.config.url.clone())
        else {
            self.drop_envelope("no endpoint configured");
            return;
        };
        let body = match encode_body(data, self.context.config.encoding) {
            Ok(body) => body,
            Err(err) => {
                self.drop_envelope(&format!("compression failed: {err}"));
                return;
            }
        };

        loop {
            let now = Instant::now();
            let attempt = self.execute(&url, &body.bytes, body.content_encoding, options);
            match attempt {
                Ok(Attempt {
                    class: ResponseClass::Success,
                    ..
                }) => return,
                Ok(Attempt {
                    class: ResponseClass::RateLimited,
                    ..
                }) => {
                    self.drop_envelope("server rate limited the request");
                    return;
                }
                Ok(Attempt {
                    class: ResponseClass::Permanent,
                    detail,
                }) => {
                    self.drop_envelope(&format!(
                        "server rejected envelope: {}",
                        detail.unwrap_or_default()
                    ));
                    return;
                }
                Ok(Attempt {
                    class: ResponseClass::Retryable,
                    detail,
                }) => {
                    let reason = detail.unwrap_or_else(|| "server error".into());
                    if !self.sleep_and_should_retry(&reason, now) {
                        return;
                    }
                }
                Err(err) => {
                    if !self.sleep_and_should_retry(&err, now) {
                        return;
                    }
                }
            }
        }
    }

    fn execute(
        &self,
        url: &str,
        body: &[u8],
        content_encoding: Option<&str>,
        options: &SendOptions,
    ) -> Result<Attempt, String> {
        let mut request = self
            .context
            .agent
            .post(url)
            .set("Content-Type", ENVELOPE_CONTENT_TYPE)
            .set("User-Agent", &self.context.config.user_agent);
        if let Some(auth) = &options.auth_header {
            request = request.set("X-Sentry-Auth", auth);
        }
        if let Some(encoding) = content_encoding {
            request = request.set("Content-Encoding", encoding);
        }

        let response = match request.send_bytes(body) {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => return Err(err.to_string()),
        };
        Ok(self.observe(response))
    }

    fn observe(&self, response: ureq::Response) -> Attempt {
        let status = response.status();
        let directives = directives_from_response(
            status,
            response.header(RATE_LIMITS_HEADER),
            response.header(RETRY_AFTER_HEADER),
            self.context.clock.now(),
        );
        self.context.rate_limiter.apply_directives(&directives);

        let class = classify_status(status);
        let detail = match class {
            ResponseClass::Success => None,
            _ => Some(match response.header(SENTRY_ERROR_HEADER) {
                Some(reason) => format!("HTTP {status}: {reason}"),
                None => format!("HTTP {status}"),
            }),
        };
        debug!(target: LOGGER_TARGET, "HTTP transport received status {status}");
        Attempt { class, detail }
    }

    /// Log the failure, sleep for the next backoff delay, and report whether
    /// to try again. Returns `false` once the retry deadline has passed.
    fn sleep_and_should_retry(&mut self, err: &str, now: Instant) -> bool {
        warn!(target: LOGGER_TARGET, "HTTP transport request failed: {err}");
        let Some(delay) = self.backoff.next_sleep(now) else {
            self.drop_envelope("retry deadline exhausted");
            return false;
        };
        thread::sleep(delay);
        true
    }

    fn drop_envelope(&self, reason: &str) {
        self.warner.record_drop();
        self.warner.warn_if_due(|count| {
            warn!(target: LOGGER_TARGET, "HTTP transport dropped {count} envelopes ({reason})");
        });
    }
}

/// Enqueue an envelope without blocking.
///
/// # Errors
///
/// * [`BackendError::QueueFull`] - the queue is at capacity
/// * [`BackendError::Closed`] - the worker has shut down
pub(crate) fn enqueue_envelope(
    tx: &Sender<HttpCommand>,
    data: &[u8],
    options: &SendOptions,
    warner: &RateLimitedWarner,
) -> Result<(), BackendError> {
    let command = HttpCommand::Envelope {
        data: data.to_vec(),
        options: options.clone(),
    };
    match tx.try_send(command) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => {
            warner.record_drop();
            warner.warn_if_due(|count| {
                warn!(target: LOGGER_TARGET, "HTTP transport queue full; dropped {count} envelopes");
            });
            Err(BackendError::QueueFull)
        }
        Err(TrySendError::Disconnected(_)) => Err(BackendError::Closed),
    }
}

/// Send a flush marker and wait for the worker to reach it.
///
/// The marker queues behind every earlier envelope, so an acknowledgement
/// means all of them have been attempted. The total wait never exceeds
/// `timeout`.
pub(crate) fn flush_queue(tx: &Sender<HttpCommand>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let (ack_tx, ack_rx) = bounded(1);
    if tx.send_timeout(HttpCommand::Flush(ack_tx), timeout).is_err() {
        return false;
    }
    let remaining = deadline.saturating_duration_since(Instant::now());
    ack_rx.recv_timeout(remaining).is_ok()
}
