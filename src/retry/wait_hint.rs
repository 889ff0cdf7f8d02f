//! Parsing of server-requested wait durations.
//!
//! Catalog services signal rate limiting in two ways: a `Retry-After` header on
//! the HTTP response, or a human-readable message inside an otherwise normal
//! response ("please retry in 5 seconds", "请 5 秒后再试"). Both are turned into
//! a [`Duration`] here, capped at [`MAX_SERVER_WAIT`].

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, instrument, warn};

/// Maximum honored server wait (10 minutes).
pub const MAX_SERVER_WAIT: Duration = Duration::from_secs(600);

static WAIT_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:秒|seconds?\b|secs?\b|s\b)")
        .unwrap_or_else(|e| panic!("invalid static regex: {e}"))
});

/// Extracts a wait duration from a free-text server message.
///
/// Returns the first number followed by a seconds unit.
///
/// ```
/// use std::time::Duration;
/// use songsync_core::retry::parse_wait_hint;
///
/// assert_eq!(parse_wait_hint("please retry in 5 seconds"), Some(Duration::from_secs(5)));
/// assert_eq!(parse_wait_hint("请 3 秒后再试"), Some(Duration::from_secs(3)));
/// assert_eq!(parse_wait_hint("wait 2s"), Some(Duration::from_secs(2)));
/// assert_eq!(parse_wait_hint("song not found"), None);
/// ```
#[must_use]
pub fn parse_wait_hint(message: &str) -> Option<Duration> {
    let caps = WAIT_HINT_RE.captures(message)?;
    let seconds: f64 = caps.get(1)?.as_str().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let wait = Duration::try_from_secs_f64(seconds).ok()?;
    Some(cap_wait(wait))
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports integer seconds and HTTP-date (RFC 7231). Returns `None` for
/// unparseable or negative values; dates in the past yield zero.
///
/// ```
/// use std::time::Duration;
/// use songsync_core::retry::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        let Ok(seconds) = u64::try_from(seconds) else {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        };
        return Some(cap_wait(Duration::from_secs(seconds)));
    }

    let Ok(datetime) = httpdate::parse_http_date(header_value) else {
        debug!(header_value, "unparseable Retry-After value");
        return None;
    };
    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) => Some(cap_wait(duration)),
        Err(_) => Some(Duration::ZERO),
    }
}

fn cap_wait(wait: Duration) -> Duration {
    if wait > MAX_SERVER_WAIT {
        warn!(
            requested_secs = wait.as_secs(),
            max_secs = MAX_SERVER_WAIT.as_secs(),
            "server wait exceeds maximum, capping"
        );
        return MAX_SERVER_WAIT;
    }
    wait
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wait_hint_english_variants() {
        assert_eq!(
            parse_wait_hint("Too many requests, retry after 10 seconds"),
            Some(Duration::from_secs(10))
        );
        assert_eq!(
            parse_wait_hint("wait 1 second"),
            Some(Duration::from_secs(1))
        );
        assert_eq!(parse_wait_hint("cooldown: 8 secs"), Some(Duration::from_secs(8)));
        assert_eq!(parse_wait_hint("WAIT 6S"), Some(Duration::from_secs(6)));
    }

    #[test]
    fn test_parse_wait_hint_fractional() {
        assert_eq!(
            parse_wait_hint("retry in 1.5s"),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_parse_wait_hint_chinese() {
        assert_eq!(parse_wait_hint("请求过于频繁，请 30 秒后再试"), Some(Duration::from_secs(30)));
        assert_eq!(parse_wait_hint("请30秒后重试"), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_parse_wait_hint_ignores_numbers_without_unit() {
        assert_eq!(parse_wait_hint("error code 429"), None);
        assert_eq!(parse_wait_hint("id 12345 not found"), None);
        assert_eq!(parse_wait_hint(""), None);
    }

    #[test]
    fn test_parse_wait_hint_caps_large_values() {
        assert_eq!(parse_wait_hint("wait 99999 seconds"), Some(MAX_SERVER_WAIT));
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after(" 15 "), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_parse_retry_after_negative_ignored() {
        assert_eq!(parse_retry_after("-5"), None);
    }

    #[test]
    fn test_parse_retry_after_caps_excessive() {
        assert_eq!(parse_retry_after("86400"), Some(MAX_SERVER_WAIT));
    }

    #[test]
    fn test_parse_retry_after_past_http_date_is_zero() {
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_parse_retry_after_future_http_date() {
        let future = std::time::SystemTime::now() + Duration::from_secs(120);
        let header = httpdate::fmt_http_date(future);
        let parsed = parse_retry_after(&header).unwrap();
        assert!(parsed <= Duration::from_secs(120));
        assert!(parsed >= Duration::from_secs(100));
    }
}
