//! Configuration values read by the transport.

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use crate::{
    dsn::{Dsn, DsnError},
    envelope::SdkMeta,
    http_backend::{BackoffPolicy, Encoding, HttpBackendConfig},
};

/// Environment assumed when none is configured.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Errors that may occur while building a [`Configuration`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The DSN string could not be parsed.
    #[error("invalid DSN: {0}")]
    InvalidDsn(#[from] DsnError),
    /// A transport option is out of range.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),
}

/// Which backend [`Transport::from_config`](crate::transport::Transport::from_config)
/// wires up.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Buffered HTTP delivery to the DSN's envelope endpoint.
    #[default]
    Http,
    /// Discard every envelope.
    Noop,
    /// Write envelopes into `dir`.
    Spool { dir: PathBuf },
}

/// Options for network delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportOptions {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Connection timeout.
    pub open_timeout: Duration,
    pub ssl_verification: bool,
    pub encoding: Encoding,
    /// Envelopes buffered ahead of the network worker.
    pub capacity: usize,
    pub backoff: BackoffPolicy,
    pub warn_interval: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        let http = HttpBackendConfig::default();
        Self {
            timeout: http.timeout,
            open_timeout: http.connect_timeout,
            ssl_verification: http.ssl_verification,
            encoding: http.encoding,
            capacity: http.capacity,
            backoff: http.backoff,
            warn_interval: http.warn_interval,
        }
    }
}

impl TransportOptions {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "capacity must be greater than zero".into(),
            ));
        }
        for (field, value) in [("timeout", self.timeout), ("open_timeout", self.open_timeout)] {
            if value.is_zero() {
                return Err(ConfigError::InvalidConfig(format!(
                    "{field} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

/// Read-only snapshot the transport consults on every send.
#[derive(Clone, Debug)]
pub struct Configuration {
    pub(crate) dsn: Option<Dsn>,
    pub(crate) environment: String,
    pub(crate) enabled_environments: Vec<String>,
    pub(crate) sdk: SdkMeta,
    pub(crate) transport: TransportOptions,
    pub(crate) backend: BackendKind,
}

impl Configuration {
    pub fn dsn(&self) -> Option<&Dsn> {
        self.dsn.as_ref()
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn enabled_environments(&self) -> &[String] {
        &self.enabled_environments
    }

    pub fn sdk(&self) -> &SdkMeta {
        &self.sdk
    }

    pub fn transport(&self) -> &TransportOptions {
        &self.transport
    }

    pub fn backend(&self) -> &BackendKind {
        &self.backend
    }

    /// Whether the current environment is allowed to send.
    ///
    /// An empty allow-list enables every environment.
    pub fn enabled_in_current_env(&self) -> bool {
        self.enabled_environments.is_empty()
            || self.enabled_environments.iter().any(|e| *e == self.environment)
    }

    /// True when a DSN is set and the environment is enabled.
    pub fn sending_allowed(&self) -> bool {
        self.dsn.is_some() && self.enabled_in_current_env()
    }

    /// Every reason sending is disabled, in a fixed order.
    pub fn sending_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.dsn.is_none() {
            errors.push("DSN not set".to_string());
        }
        if !self.enabled_in_current_env() {
            errors.push(format!(
                "Not configured to send/capture in environment '{}'",
                self.environment
            ));
        }
        errors
    }

    /// [`sending_errors`](Self::sending_errors) joined for logging.
    pub fn error_messages(&self) -> String {
        self.sending_errors().join(", ")
    }

    /// HTTP backend settings derived from the DSN and transport options.
    pub fn http_backend_config(&self) -> HttpBackendConfig {
        HttpBackendConfig {
            url: self.dsn.as_ref().map(Dsn::envelope_url),
            capacity: self.transport.capacity,
            connect_timeout: self.transport.open_timeout,
            timeout: self.transport.timeout,
            ssl_verification: self.transport.ssl_verification,
            encoding: self.transport.encoding,
            backoff: self.transport.backoff.clone(),
            warn_interval: self.transport.warn_interval,
            user_agent: self.sdk.user_agent(),
        }
    }
}

/// Builder for [`Configuration`].
///
/// The DSN stays a raw string until [`build`](Self::build) parses it.
#[derive(Clone, Debug, Default)]
pub struct ConfigurationBuilder {
    pub(crate) dsn: Option<String>,
    pub(crate) environment: Option<String>,
    pub(crate) enabled_environments: Vec<String>,
    pub(crate) sdk: Option<SdkMeta>,
    pub(crate) transport: TransportOptions,
    pub(crate) backend: BackendKind,
}

impl ConfigurationBuilder {
    /// Create a new `ConfigurationBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the DSN, replacing any previous value.
    pub fn with_dsn(mut self, dsn: impl Into<String>) -> Self {
        self.dsn = Some(dsn.into());
        self
    }

    /// Set the current environment name.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Restrict sending to these environments.
    ///
    /// This replaces any existing list. An empty list enables every
    /// environment.
    pub fn with_enabled_environments<I, S>(mut self, environments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_environments = environments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sdk(mut self, sdk: SdkMeta) -> Self {
        self.sdk = Some(sdk);
        self
    }

    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }
}
