//! Configuration consumed by the transport.

mod build;
mod types;

pub use build::{DSN_ENV_VAR, ENVIRONMENT_ENV_VAR};
pub use types::{
    BackendKind, ConfigError, Configuration, ConfigurationBuilder, DEFAULT_ENVIRONMENT,
    TransportOptions,
};

#[cfg(test)]
mod config_tests;
