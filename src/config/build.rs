//! Validation and finalisation of configuration.

use std::env;

use log::debug;

use crate::{LOGGER_TARGET, dsn::Dsn};

use super::types::{Configuration, ConfigurationBuilder, ConfigError, DEFAULT_ENVIRONMENT};

/// Variable holding the DSN.
pub const DSN_ENV_VAR: &str = "SENTRY_DSN";
/// Variable holding the current environment name.
pub const ENVIRONMENT_ENV_VAR: &str = "SENTRY_ENVIRONMENT";

impl ConfigurationBuilder {
    /// Pre-fill the DSN and environment from the process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    /// Pre-fill from `lookup` instead of the process environment.
    ///
    /// Empty values are treated as unset.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut builder = Self::new();
        if let Some(dsn) = read(DSN_ENV_VAR) {
            builder = builder.with_dsn(dsn);
        }
        if let Some(environment) = read(ENVIRONMENT_ENV_VAR) {
            builder = builder.with_environment(environment);
        }
        builder
    }

    /// Validate the settings and produce an immutable [`Configuration`].
    ///
    /// # Errors
    ///
    /// * [`ConfigError::InvalidDsn`] - the DSN string does not parse
    /// * [`ConfigError::InvalidConfig`] - a transport option is out of range
    pub fn build(&self) -> Result<Configuration, ConfigError> {
        self.transport.validate()?;
        let dsn = self
            .dsn
            .as_deref()
            .map(str::parse::<Dsn>)
            .transpose()?;
        let config = Configuration {
            dsn,
            environment: self
                .environment
                .clone()
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
            enabled_environments: self.enabled_environments.clone(),
            sdk: self.sdk.clone().unwrap_or_default(),
            transport: self.transport.clone(),
            backend: self.backend.clone(),
        };
        if !config.sending_allowed() {
            debug!(
                target: LOGGER_TARGET,
                "Sending disabled: {}",
                config.error_messages()
            );
        }
        Ok(config)
    }
}
