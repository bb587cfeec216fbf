//! `X-Sentry-Auth` header generation.

use chrono::{DateTime, Utc};

use crate::{dsn::Dsn, envelope::SdkMeta};

/// Protocol version advertised on every request.
pub const PROTOCOL_VERSION: &str = "5";
/// Default SDK name, shared by the envelope `sdk` header and the user agent.
pub const CLIENT_NAME: &str = "sentry-transport-rs";
/// User agent of the default [`SdkMeta`].
pub const USER_AGENT: &str = concat!("sentry-transport-rs/", env!("CARGO_PKG_VERSION"));

/// Build the authentication header for `dsn` at `now`.
///
/// `sentry_client` is the user agent of `sdk`. `sentry_secret` is appended
/// last, and only when the DSN carries one.
pub fn generate_auth_header(dsn: &Dsn, sdk: &SdkMeta, now: DateTime<Utc>) -> String {
    let mut fields = vec![
        ("sentry_version", PROTOCOL_VERSION.to_string()),
        ("sentry_client", sdk.user_agent()),
        ("sentry_timestamp", now.timestamp().to_string()),
        ("sentry_key", dsn.public_key().to_string()),
    ];
    if let Some(secret) = dsn.secret_key() {
        fields.push(("sentry_secret", secret.to_string()));
    }
    let joined = fields
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Sentry {joined}")
}
