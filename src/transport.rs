//! Send path from a captured [`Event`] to a [`Backend`].
//!
//! [`Transport::send_event`] checks the configuration gate and the rate
//! limiter, encodes the envelope, and hands it to the backend together with
//! a freshly generated auth header. It never retries; retry policy belongs to
//! the backend.

use std::{fmt, sync::Arc, time::Duration};

use log::{debug, info};
use thiserror::Error;

use crate::{
    LOGGER_TARGET,
    auth::generate_auth_header,
    backend::{Backend, BackendError, NoopBackend, SendOptions, UnimplementedBackend},
    clock::{SharedClock, system_clock},
    config::{BackendKind, Configuration},
    envelope::{EnvelopeError, encode_event},
    event::Event,
    http_backend::HttpBackend,
    rate_limiter::RateLimiter,
    spool_backend::SpoolBackend,
};

/// Failures surfaced by [`Transport::send_event`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The event payload could not be encoded.
    #[error(transparent)]
    Serialization(#[from] EnvelopeError),
    /// No concrete backend is wired up.
    #[error("no transport backend configured")]
    NotImplemented,
    /// The backend failed to accept the envelope, or could not be started.
    #[error("transport backend failed: {0}")]
    Backend(#[source] BackendError),
}

impl From<BackendError> for TransportError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotImplemented => Self::NotImplemented,
            other => Self::Backend(other),
        }
    }
}

/// Result of a send that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Handed to the backend. This means accepted for sending, not delivered.
    Sent(Event),
    /// Sending is disabled by configuration; carries the reason.
    Suppressed(String),
    /// A server-imposed rate limit is active for the event's category.
    RateLimited,
}

impl SendOutcome {
    /// The event, if it was handed to the backend.
    pub fn into_event(self) -> Option<Event> {
        match self {
            Self::Sent(event) => Some(event),
            Self::Suppressed(_) | Self::RateLimited => None,
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent(_))
    }
}

/// Dispatcher owning a configuration snapshot, a backend and the rate
/// limiter shared with that backend.
pub struct Transport {
    config: Arc<Configuration>,
    backend: Arc<dyn Backend>,
    rate_limiter: Arc<RateLimiter>,
    clock: SharedClock,
}

impl Transport {
    /// Start building a transport around `config`.
    pub fn builder(config: Configuration) -> TransportBuilder {
        TransportBuilder::new(config)
    }

    /// Wire the backend named by [`Configuration::backend`].
    ///
    /// The HTTP backend shares this transport's rate limiter so server
    /// directives it observes gate later sends. Without a DSN there is
    /// nowhere to send, so the HTTP kind falls back to [`NoopBackend`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Backend`] if the backend cannot start.
    pub fn from_config(config: Configuration) -> Result<Self, TransportError> {
        let clock = system_clock();
        let rate_limiter = Arc::new(RateLimiter::new(Arc::clone(&clock)));
        let backend: Arc<dyn Backend> = match config.backend() {
            BackendKind::Http if config.dsn().is_none() => {
                debug!(target: LOGGER_TARGET, "No DSN configured; using no-op backend");
                Arc::new(NoopBackend)
            }
            BackendKind::Http => Arc::new(HttpBackend::new(
                config.http_backend_config(),
                Arc::clone(&rate_limiter),
                Arc::clone(&clock),
            )?),
            BackendKind::Noop => Arc::new(NoopBackend),
            BackendKind::Spool { dir } => {
                Arc::new(SpoolBackend::new(dir.clone(), Arc::clone(&clock))?)
            }
        };
        Ok(Self::builder(config)
            .with_backend(backend)
            .with_clock(clock)
            .with_rate_limiter(rate_limiter)
            .build())
    }

    /// Send one event.
    ///
    /// Returns [`SendOutcome::Suppressed`] when the configuration disallows
    /// sending and [`SendOutcome::RateLimited`] when the event's category is
    /// under an active limit; neither touches the backend.
    ///
    /// # Errors
    ///
    /// * [`TransportError::Serialization`] - the payload could not be encoded
    /// * [`TransportError::NotImplemented`] - no concrete backend is wired
    /// * [`TransportError::Backend`] - the backend rejected the envelope
    pub fn send_event(&self, event: Event) -> Result<SendOutcome, TransportError> {
        let dsn = match self.config.dsn() {
            Some(dsn) if self.config.sending_allowed() => dsn,
            _ => {
                let reason = self.config.error_messages();
                debug!(target: LOGGER_TARGET, "Event not sent: {reason}");
                return Ok(SendOutcome::Suppressed(reason));
            }
        };
        if self.rate_limiter.is_rate_limited(&event) {
            return Ok(SendOutcome::RateLimited);
        }

        let now = self.clock.now();
        let data = encode_event(&event, dsn, self.config.sdk(), now)?;
        info!(
            target: LOGGER_TARGET,
            "Sending {} {} to Sentry",
            event.kind(),
            event.event_id()
        );
        let options = SendOptions::default().with_auth_header(generate_auth_header(
            dsn,
            self.config.sdk(),
            now,
        ));
        self.backend.send_data(&data, &options)?;
        Ok(SendOutcome::Sent(event))
    }

    /// Auth header for the configured DSN at the current time.
    pub fn generate_auth_header(&self) -> Option<String> {
        self.config
            .dsn()
            .map(|dsn| generate_auth_header(dsn, self.config.sdk(), self.clock.now()))
    }

    /// Encode `event` exactly as [`send_event`](Self::send_event) would.
    ///
    /// Returns `Ok(None)` when no DSN is configured.
    pub fn encode(&self, event: &Event) -> Result<Option<Vec<u8>>, TransportError> {
        let Some(dsn) = self.config.dsn() else {
            return Ok(None);
        };
        Ok(Some(encode_event(
            event,
            dsn,
            self.config.sdk(),
            self.clock.now(),
        )?))
    }

    /// Wait up to `timeout` for the backend to hand off buffered envelopes.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.backend.flush(timeout)
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("config", &self.config)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

/// Explicit wiring for a [`Transport`].
///
/// Anything left unset gets a default: [`UnimplementedBackend`], the system
/// clock, and a fresh rate limiter on that clock.
pub struct TransportBuilder {
    config: Configuration,
    backend: Option<Arc<dyn Backend>>,
    clock: Option<SharedClock>,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl TransportBuilder {
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            backend: None,
            clock: None,
            rate_limiter: None,
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share `rate_limiter` instead of creating one.
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    pub fn build(self) -> Transport {
        let clock = self.clock.unwrap_or_else(system_clock);
        let rate_limiter = self
            .rate_limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::new(Arc::clone(&clock))));
        Transport {
            config: Arc::new(self.config),
            backend: self
                .backend
                .unwrap_or_else(|| Arc::new(UnimplementedBackend)),
            rate_limiter,
            clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rstest::{fixture, rstest};
    use serde::ser::{Error as _, Serialize, Serializer};

    use super::*;
    use crate::{
        backend::RecordingBackend,
        clock::{Clock, ManualClock},
        config::ConfigurationBuilder,
        envelope::{Envelope, SdkMeta},
        event::EventKind,
        rate_limiter::{DataCategory, RateLimitDirective},
    };

    const DSN: &str = "https://public@example.com/7";

    #[fixture]
    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap())
    }

    fn transport(clock: &ManualClock, backend: &RecordingBackend) -> Transport {
        let config = ConfigurationBuilder::new().with_dsn(DSN).build().unwrap();
        Transport::builder(config)
            .with_backend(Arc::new(backend.clone()))
            .with_clock(Arc::new(clock.clone()))
            .build()
    }

    #[rstest]
    fn sent_event_is_returned_unchanged(clock: ManualClock) {
        let backend = RecordingBackend::new();
        let event = Event::error().with_field("message", "boom");
        let outcome = transport(&clock, &backend)
            .send_event(event.clone())
            .unwrap();
        assert_eq!(outcome, SendOutcome::Sent(event.clone()));
        assert_eq!(outcome.into_event(), Some(event));
        assert_eq!(backend.len(), 1);
    }

    #[rstest]
    fn backend_receives_envelope_and_auth_header(clock: ManualClock) {
        let backend = RecordingBackend::new();
        let event = Event::transaction();
        transport(&clock, &backend).send_event(event.clone()).unwrap();

        let sent = backend.sends().remove(0);
        let envelope = Envelope::from_slice(&sent.data).unwrap();
        assert_eq!(envelope.header.event_id, event.event_id());
        assert_eq!(envelope.header.dsn, DSN);
        assert_eq!(envelope.header.sent_at, "2024-05-06T07:08:09Z");
        assert_eq!(envelope.items[0].header.kind, EventKind::Transaction);
        let auth = sent.options.auth_header.expect("auth header");
        assert!(auth.contains("sentry_timestamp=1714979289"), "{auth}");
        assert!(auth.contains("sentry_key=public"));
        assert_eq!(sent.options.endpoint, None);
    }

    #[rstest]
    fn auth_header_names_configured_sdk(clock: ManualClock) {
        let backend = RecordingBackend::new();
        let config = ConfigurationBuilder::new()
            .with_dsn(DSN)
            .with_sdk(SdkMeta {
                name: "sentry.rust.custom".into(),
                version: "2.3.4".into(),
            })
            .build()
            .unwrap();
        let transport = Transport::builder(config)
            .with_backend(Arc::new(backend.clone()))
            .with_clock(Arc::new(clock))
            .build();
        transport.send_event(Event::error()).unwrap();

        let sent = backend.sends().remove(0);
        let auth = sent.options.auth_header.expect("auth header");
        assert!(auth.contains("sentry_client=sentry.rust.custom/2.3.4"), "{auth}");
        let envelope = Envelope::from_slice(&sent.data).unwrap();
        assert_eq!(envelope.header.sdk.name, "sentry.rust.custom");
    }

    #[rstest]
    fn suppressed_when_sending_not_allowed(clock: ManualClock) {
        let backend = RecordingBackend::new();
        let config = ConfigurationBuilder::new().build().unwrap();
        let transport = Transport::builder(config)
            .with_backend(Arc::new(backend.clone()))
            .with_clock(Arc::new(clock))
            .build();
        let outcome = transport.send_event(Event::error()).unwrap();
        assert_eq!(outcome, SendOutcome::Suppressed("DSN not set".into()));
        assert!(backend.is_empty());
    }

    #[rstest]
    fn rate_limited_event_is_not_sent(clock: ManualClock) {
        let backend = RecordingBackend::new();
        let transport = transport(&clock, &backend);
        transport.rate_limiter().apply_directives(&[RateLimitDirective::category(
            DataCategory::Error,
            Duration::from_secs(30),
        )]);
        assert_eq!(
            transport.send_event(Event::error()).unwrap(),
            SendOutcome::RateLimited
        );
        assert!(transport.send_event(Event::transaction()).unwrap().is_sent());
        assert_eq!(backend.len(), 1);
    }

    #[rstest]
    fn limit_lifts_once_expired(clock: ManualClock) {
        let backend = RecordingBackend::new();
        let transport = transport(&clock, &backend);
        transport
            .rate_limiter()
            .apply_directives(&[RateLimitDirective::all(Duration::from_secs(5))]);
        assert_eq!(
            transport.send_event(Event::error()).unwrap(),
            SendOutcome::RateLimited
        );
        clock.advance(Duration::from_secs(5));
        assert!(transport.send_event(Event::error()).unwrap().is_sent());
    }

    #[rstest]
    fn missing_backend_is_not_implemented(clock: ManualClock) {
        let config = ConfigurationBuilder::new().with_dsn(DSN).build().unwrap();
        let transport = Transport::builder(config)
            .with_clock(Arc::new(clock))
            .build();
        assert!(matches!(
            transport.send_event(Event::error()),
            Err(TransportError::NotImplemented)
        ));
    }

    #[rstest]
    fn backend_failures_propagate(clock: ManualClock) {
        struct Full;
        impl Backend for Full {
            fn send_data(&self, _: &[u8], _: &SendOptions) -> Result<(), BackendError> {
                Err(BackendError::QueueFull)
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }
        let config = ConfigurationBuilder::new().with_dsn(DSN).build().unwrap();
        let transport = Transport::builder(config)
            .with_backend(Arc::new(Full))
            .with_clock(Arc::new(clock))
            .build();
        assert!(matches!(
            transport.send_event(Event::error()),
            Err(TransportError::Backend(BackendError::QueueFull))
        ));
    }

    #[rstest]
    fn serialization_failure_propagates(clock: ManualClock) {
        struct Broken;
        impl Serialize for Broken {
            fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(S::Error::custom("unserialisable"))
            }
        }
        let err: TransportError = crate::envelope::encode(
            "id",
            &EventKind::Event,
            &Broken,
            &DSN.parse::<crate::dsn::Dsn>().unwrap(),
            &Default::default(),
            clock.now(),
        )
        .unwrap_err()
        .into();
        assert!(matches!(err, TransportError::Serialization(_)));
    }

    #[rstest]
    fn encode_and_auth_header_use_the_clock(clock: ManualClock) {
        let backend = RecordingBackend::new();
        let transport = transport(&clock, &backend);
        let event = Event::error();
        let bytes = transport.encode(&event).unwrap().expect("dsn configured");
        assert_eq!(
            Envelope::from_slice(&bytes).unwrap().header.event_id,
            event.event_id()
        );
        let header = transport.generate_auth_header().expect("dsn configured");
        assert!(header.starts_with("Sentry sentry_version=5, "));
        assert!(header.contains("sentry_timestamp=1714979289"));
    }

    #[rstest]
    fn from_config_selects_backend() {
        let noop = ConfigurationBuilder::new()
            .with_dsn(DSN)
            .with_backend(BackendKind::Noop)
            .build()
            .unwrap();
        let transport = Transport::from_config(noop).unwrap();
        assert!(transport.backend().as_any().is::<NoopBackend>());

        let dir = tempfile::tempdir().unwrap();
        let spool = ConfigurationBuilder::new()
            .with_dsn(DSN)
            .with_backend(BackendKind::Spool {
                dir: dir.path().to_path_buf(),
            })
            .build()
            .unwrap();
        let transport = Transport::from_config(spool).unwrap();
        assert!(transport.backend().as_any().is::<SpoolBackend>());
        assert!(transport.send_event(Event::error()).unwrap().is_sent());

        let no_dsn = ConfigurationBuilder::new().build().unwrap();
        let transport = Transport::from_config(no_dsn).unwrap();
        assert!(transport.backend().as_any().is::<NoopBackend>());
    }
}
