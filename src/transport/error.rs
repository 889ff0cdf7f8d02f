//! Error types for the transport module.
//!
//! Every failure of a single HTTP exchange is reported as a [`TransportError`]
//! carrying the URL it happened on. Retry decisions are made by the caller via
//! [`Retryable`](crate::retry::Retryable), never here.

use std::time::Duration;

use thiserror::Error;

use crate::retry::{RetryClass, Retryable, parse_retry_after, parse_wait_hint};

/// Maximum number of characters kept from an error response body.
pub(crate) const BODY_EXCERPT_CHARS: usize = 200;

/// Errors that can occur during a single HTTP exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Network-level failure (DNS, refused connection, TLS, dropped stream).
    #[error("connection failure requesting {url}: {source}")]
    Connection {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx response other than an authorization refusal.
    #[error("HTTP {status} requesting {url}: {body_excerpt}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// First characters of the response body.
        body_excerpt: String,
        /// The Retry-After header value, if present.
        retry_after: Option<String>,
    },

    /// 401/403 response. Never retried.
    #[error("HTTP {status} (forbidden) requesting {url}")]
    Forbidden {
        /// The URL that refused access.
        url: String,
        /// The HTTP status code (401 or 403).
        status: u16,
    },

    /// Response was expected to be JSON but could not be parsed.
    #[error("malformed response body from {url}: {reason}")]
    MalformedBody {
        /// The URL whose body failed to parse.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The URL could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The client could not be built from its configuration.
    #[error("invalid HTTP client configuration: {reason}")]
    Config {
        /// What was rejected.
        reason: String,
    },
}

impl TransportError {
    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a connection error, promoting reqwest timeouts to [`TransportError::Timeout`].
    pub fn connection(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::Timeout { url: url.into() };
        }
        Self::Connection {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error, truncating the body to an excerpt.
    pub fn http_status(
        url: impl Into<String>,
        status: u16,
        body: &str,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            body_excerpt: excerpt(body),
            retry_after,
        }
    }

    /// Creates a forbidden error.
    pub fn forbidden(url: impl Into<String>, status: u16) -> Self {
        Self::Forbidden {
            url: url.into(),
            status,
        }
    }

    /// Creates a malformed body error.
    pub fn malformed_body(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedBody {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Returns the HTTP status code when the error came from a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } | Self::Forbidden { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-requested wait carried by a 429/503 response, if any.
    fn server_wait(&self) -> Option<Duration> {
        let Self::HttpStatus {
            status,
            body_excerpt,
            retry_after,
            ..
        } = self
        else {
            return None;
        };
        if !matches!(status, 429 | 503) {
            return None;
        }
        retry_after
            .as_deref()
            .and_then(parse_retry_after)
            .or_else(|| parse_wait_hint(body_excerpt))
    }
}

/// Classification of transport failures.
///
/// | Error | Class |
/// |-------|-------|
/// | Timeout | Transient |
/// | Connection | Transient |
/// | HTTP 401 / 403 | Fatal |
/// | HTTP 429 / 503 with a wait hint | ServerWait |
/// | Other HTTP status | Transient |
/// | MalformedBody | Transient |
/// | InvalidUrl | Fatal |
/// | Config | Fatal |
impl Retryable for TransportError {
    fn retry_class(&self) -> RetryClass {
        match self {
            Self::Forbidden { .. } | Self::InvalidUrl { .. } | Self::Config { .. } => {
                RetryClass::Fatal
            }
            Self::HttpStatus { .. } => self
                .server_wait()
                .map_or(RetryClass::Transient, RetryClass::ServerWait),
            Self::Timeout { .. } | Self::Connection { .. } | Self::MalformedBody { .. } => {
                RetryClass::Transient
            }
        }
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(BODY_EXCERPT_CHARS).collect();
    out.push_str("...");
    out
}
