//! Explicit configuration objects for the catalog client and the sync loop.
//!
//! Both are plain values built once by the caller and passed by reference;
//! nothing here reads the environment.

use std::fmt;
use std::time::Duration;

use crate::materialize::ExistingPolicy;
use crate::retry::RetryPolicy;
use crate::user_agent;

/// Default catalog API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.vkeys.cn/v2/music/tencent";

/// Extension used when the catalog gives no format hint.
pub const DEFAULT_FALLBACK_EXTENSION: &str = "mp3";

/// Pause between consecutive queries.
pub const DEFAULT_QUERY_PAUSE: Duration = Duration::from_secs(2);

/// Connect timeout for every request.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Whole-request timeout for JSON API calls.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(20);

/// Whole-request timeout for streamed payload downloads.
pub const DEFAULT_PAYLOAD_READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Connection settings for the remote catalog.
///
/// `headers` and `cookie` are credentials: they are attached only to
/// privileged calls and are redacted from `Debug` output.
#[derive(Clone)]
pub struct CatalogConfig {
    /// Base URL for search, detail and lyric calls.
    pub base_url: String,
    /// Endpoint of the privileged location API, if available.
    pub privileged_url: Option<String>,
    /// Extra request headers for privileged calls.
    pub headers: Vec<(String, String)>,
    /// Raw `name=value; name2=value2` cookie string for the privileged API.
    pub cookie: Option<String>,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Timeout for JSON API calls.
    pub read_timeout: Duration,
    /// Timeout for payload streams.
    pub payload_read_timeout: Duration,
    /// User-Agent header value.
    pub user_agent: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            privileged_url: None,
            headers: Vec::new(),
            cookie: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            payload_read_timeout: DEFAULT_PAYLOAD_READ_TIMEOUT,
            user_agent: user_agent::default_user_agent(),
        }
    }
}

impl CatalogConfig {
    /// Creates a config pointing at `base_url` with default timeouts.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Returns the base URL without a trailing slash.
    #[must_use]
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

impl fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("CatalogConfig")
            .field("base_url", &self.base_url)
            .field("privileged_url", &self.privileged_url)
            .field("headers", &header_names)
            .field("cookie", &self.cookie.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("payload_read_timeout", &self.payload_read_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Behavior switches for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Payload extension when neither the catalog nor the URL names one.
    pub fallback_extension: String,
    /// Pause inserted between consecutive queries.
    pub query_pause: Duration,
    /// Delete files outside the expected set after the run.
    pub prune: bool,
    /// How an already-present payload is trusted.
    pub existing_policy: ExistingPolicy,
    /// Retry policy for every remote call.
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            fallback_extension: DEFAULT_FALLBACK_EXTENSION.to_string(),
            query_pause: DEFAULT_QUERY_PAUSE,
            prune: true,
            existing_policy: ExistingPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Splits a `Name: value` header line.
///
/// Returns `None` when there is no colon or the name is empty.
#[must_use]
pub fn parse_header_line(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}
