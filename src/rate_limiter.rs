//! Server-driven backoff windows.
//!
//! The server scopes backoff to a data category or to every category at
//! once. [`RateLimiter`] keeps one absolute expiry per key and checks it
//! lazily against the injected clock; nothing decays in the background.
use std::{collections::HashMap, fmt, time::Duration};

use chrono::{DateTime, Utc};
use log::debug;
use parking_lot::Mutex;

use crate::{
    LOGGER_TARGET,
    clock::SharedClock,
    event::{Event, EventKind},
};

/// Bucket names used by the server when scoping rate limits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataCategory {
    Default,
    Error,
    Transaction,
    Security,
    Attachment,
    Session,
    Profile,
    Replay,
    Monitor,
    /// A category this client does not know yet.
    Unknown(String),
}

impl DataCategory {
    /// Parse a category name from a rate-limit header.
    pub fn from_name(name: &str) -> Self {
        match name {
            "default" => Self::Default,
            "error" => Self::Error,
            "transaction" => Self::Transaction,
            "security" => Self::Security,
            "attachment" => Self::Attachment,
            "session" => Self::Session,
            "profile" => Self::Profile,
            "replay" => Self::Replay,
            "monitor" => Self::Monitor,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Default => "default",
            Self::Error => "error",
            Self::Transaction => "transaction",
            Self::Security => "security",
            Self::Attachment => "attachment",
            Self::Session => "session",
            Self::Profile => "profile",
            Self::Replay => "replay",
            Self::Monitor => "monitor",
            Self::Unknown(name) => name,
        }
    }

    /// Bucket consulted for an event of `kind`.
    ///
    /// Error reports travel as type `"event"` but are limited under
    /// `"error"`. Kinds without a bucket only honour the global limit.
    pub fn for_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Event => Some(Self::Error),
            EventKind::Transaction => Some(Self::Transaction),
            EventKind::Other(_) => None,
        }
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of one backoff window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    /// Applies to every category.
    AllCategories,
    Category(DataCategory),
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllCategories => f.write_str("all categories"),
            Self::Category(category) => write!(f, "{category}"),
        }
    }
}

/// Server instruction to hold back a key for `retry_after`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDirective {
    pub key: RateLimitKey,
    pub retry_after: Duration,
}

impl RateLimitDirective {
    pub fn new(key: RateLimitKey, retry_after: Duration) -> Self {
        Self { key, retry_after }
    }

    /// Directive covering every category.
    pub fn all(retry_after: Duration) -> Self {
        Self::new(RateLimitKey::AllCategories, retry_after)
    }

    pub fn category(category: DataCategory, retry_after: Duration) -> Self {
        Self::new(RateLimitKey::Category(category), retry_after)
    }
}

/// Per-key expiry map shared by the dispatcher and any backend that reports
/// server responses back.
pub struct RateLimiter {
    limits: Mutex<HashMap<RateLimitKey, DateTime<Utc>>>,
    clock: SharedClock,
}

impl RateLimiter {
    /// Create an empty limiter reading time from `clock`.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            limits: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Whether `event` falls inside an active backoff window.
    pub fn is_rate_limited(&self, event: &Event) -> bool {
        self.is_kind_limited(&event.kind())
    }

    /// Whether events of `kind` are currently held back.
    ///
    /// A category entry, even an expired one, takes precedence over the
    /// global entry. The global entry is consulted only when the category
    /// has no entry at all.
    pub fn is_kind_limited(&self, kind: &EventKind) -> bool {
        let now = self.clock.now();
        let limits = self.limits.lock();
        let expiry = DataCategory::for_event_kind(kind)
            .and_then(|category| limits.get(&RateLimitKey::Category(category)))
            .or_else(|| limits.get(&RateLimitKey::AllCategories));
        expiry.is_some_and(|until| *until > now)
    }

    /// Record server directives, each expiring `retry_after` from now.
    ///
    /// The newest directive for a key replaces the previous expiry, even when
    /// it is shorter.
    pub fn apply_directives(&self, directives: &[RateLimitDirective]) {
        if directives.is_empty() {
            return;
        }
        let now = self.clock.now();
        let mut limits = self.limits.lock();
        for directive in directives {
            let window = chrono::Duration::from_std(directive.retry_after)
                .unwrap_or(chrono::Duration::MAX);
            let until = now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC);
            debug!(
                target: LOGGER_TARGET,
                "rate limit for {} set until {}", directive.key, until
            );
            limits.insert(directive.key.clone(), until);
        }
    }

    /// Current expiry stored for `key`, if any.
    pub fn expiry(&self, key: &RateLimitKey) -> Option<DateTime<Utc>> {
        self.limits.lock().get(key).copied()
    }

    /// Snapshot of every stored expiry.
    pub fn snapshot(&self) -> HashMap<RateLimitKey, DateTime<Utc>> {
        self.limits.lock().clone()
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limits", &*self.limits.lock())
            .finish()
    }
}
