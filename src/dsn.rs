//! Data Source Name parsing.
//!
//! A DSN bundles the credentials and destination for a project:
//! `https://<public>[:<secret>]@<host>[:<port>]/<path>/<project_id>`.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Errors raised while parsing a DSN string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DsnError {
    /// The scheme separator is missing or the scheme is not http/https.
    #[error("unsupported DSN scheme: {0:?}")]
    InvalidScheme(String),
    /// No `<public>@` credential segment.
    #[error("DSN is missing the public key")]
    MissingPublicKey,
    /// No host after the credential segment.
    #[error("DSN is missing the host")]
    MissingHost,
    /// The port is not a valid number.
    #[error("invalid DSN port: {0:?}")]
    InvalidPort(String),
    /// The path has no trailing project id.
    #[error("DSN is missing the project id")]
    MissingProjectId,
}

/// Parsed DSN credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    raw: String,
    scheme: String,
    public_key: String,
    secret_key: Option<String>,
    host: String,
    port: Option<u16>,
    path: String,
    project_id: String,
}

impl Dsn {
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn secret_key(&self) -> Option<&str> {
        self.secret_key.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// `scheme://host[:port]`.
    pub fn server(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.scheme, self.host, port),
            None => format!("{}://{}", self.scheme, self.host),
        }
    }

    /// Path component of the envelope ingestion endpoint.
    pub fn envelope_endpoint(&self) -> String {
        format!("{}/api/{}/envelope/", self.path, self.project_id)
    }

    /// Absolute envelope ingestion URL.
    pub fn envelope_url(&self) -> String {
        format!("{}{}", self.server(), self.envelope_endpoint())
    }
}

impl FromStr for Dsn {
    type Err = DsnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| DsnError::InvalidScheme(String::new()))?;
        if scheme != "http" && scheme != "https" {
            return Err(DsnError::InvalidScheme(scheme.to_string()));
        }

        let (credentials, location) = rest.rsplit_once('@').ok_or(DsnError::MissingPublicKey)?;
        let (public_key, secret_key) = match credentials.split_once(':') {
            Some((public, secret)) => (public, Some(secret).filter(|s| !s.is_empty())),
            None => (credentials, None),
        };
        if public_key.is_empty() {
            return Err(DsnError::MissingPublicKey);
        }

        let (authority, path) = match location.split_once('/') {
            Some((authority, path)) => (authority, path),
            None => (location, ""),
        };
        let (host, port) = parse_authority(authority)?;

        let path = path.trim_end_matches('/');
        let (prefix, project_id) = match path.rsplit_once('/') {
            Some((prefix, project)) => (format!("/{prefix}"), project),
            None => (String::new(), path),
        };
        if project_id.is_empty() {
            return Err(DsnError::MissingProjectId);
        }

        Ok(Self {
            raw: raw.to_string(),
            scheme: scheme.to_string(),
            public_key: public_key.to_string(),
            secret_key: secret_key.map(str::to_string),
            host,
            port,
            path: prefix,
            project_id: project_id.to_string(),
        })
    }
}

fn parse_authority(authority: &str) -> Result<(String, Option<u16>), DsnError> {
    // Bracketed IPv6 hosts carry colons of their own.
    let split = match authority.rfind(']') {
        Some(end) => authority[end..].find(':').map(|i| end + i),
        None => authority.rfind(':'),
    };
    let (host, port) = match split {
        Some(at) => {
            let port = &authority[at + 1..];
            let port = port
                .parse::<u16>()
                .map_err(|_| DsnError::InvalidPort(port.to_string()))?;
            (&authority[..at], Some(port))
        }
        None => (authority, None),
    };
    if host.is_empty() {
        return Err(DsnError::MissingHost);
    }
    Ok((host.to_string(), port))
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
