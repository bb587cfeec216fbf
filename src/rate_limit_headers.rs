//! Parsing of rate-limit response headers into [`RateLimitDirective`]s.
//!
//! `X-Sentry-Rate-Limits` carries comma separated entries of the form
//! `<retry_after>:<categories>:<scope>[:<reason>]` where `<categories>` is a
//! `;` separated list and an empty list means every category.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::rate_limiter::{DataCategory, RateLimitDirective, RateLimitKey};

/// Header carrying structured rate limits.
pub const RATE_LIMITS_HEADER: &str = "x-sentry-rate-limits";
/// Standard HTTP retry header consulted on 429 without structured limits.
pub const RETRY_AFTER_HEADER: &str = "retry-after";
/// Backoff applied when a 429 carries no usable retry information.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Parse an `X-Sentry-Rate-Limits` value.
///
/// Entries with an unparseable delay are skipped.
pub fn parse_rate_limits(header: &str) -> Vec<RateLimitDirective> {
    let mut directives = Vec::new();
    for entry in header.split(',') {
        let mut parts = entry.trim().split(':');
        let Some(retry_after) = parts.next().and_then(parse_seconds) else {
            continue;
        };
        let categories = parts.next().unwrap_or_default().trim();
        if categories.is_empty() {
            directives.push(RateLimitDirective::all(retry_after));
            continue;
        }
        directives.extend(
            categories
                .split(';')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| {
                    RateLimitDirective::new(
                        RateLimitKey::Category(DataCategory::from_name(name)),
                        retry_after,
                    )
                }),
        );
    }
    directives
}

/// Parse a `Retry-After` value given in seconds or as an HTTP date.
///
/// Dates in the past yield a zero delay. Anything unparseable yields
/// [`DEFAULT_RETRY_AFTER`].
pub fn parse_retry_after(header: Option<&str>, now: DateTime<Utc>) -> Duration {
    let Some(raw) = header.map(str::trim) else {
        return DEFAULT_RETRY_AFTER;
    };
    if let Some(delay) = parse_seconds(raw) {
        return delay;
    }
    match DateTime::parse_from_rfc2822(raw) {
        Ok(at) => (at.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::ZERO),
        Err(_) => DEFAULT_RETRY_AFTER,
    }
}

/// Directives derived from a response's headers.
///
/// Structured limits win whenever present. Otherwise only a 429 produces a
/// global directive from `Retry-After`.
pub fn directives_from_response(
    status: u16,
    rate_limits: Option<&str>,
    retry_after: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<RateLimitDirective> {
    if let Some(header) = rate_limits {
        return parse_rate_limits(header);
    }
    if status == 429 {
        return vec![RateLimitDirective::all(parse_retry_after(retry_after, now))];
    }
    Vec::new()
}

fn parse_seconds(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs.ceil()).ok()
}
