//! HTTP client wrapper for catalog API calls and payload streams.
//!
//! [`HttpClient`] performs exactly one request per call. It maps every
//! failure to a [`TransportError`] and leaves retrying to
//! [`RetryExecutor`](crate::retry::RetryExecutor).

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, ClientBuilder, Proxy, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use super::error::TransportError;
use crate::config::CatalogConfig;

/// Whether a request carries the configured credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// No credential headers.
    Public,
    /// Attach the configured credential headers (cookies follow the jar's scope).
    Privileged,
}

/// HTTP client shared by every remote call of a run.
///
/// Created once from a [`CatalogConfig`] and reused so connections are pooled.
///
/// # Example
///
/// ```no_run
/// use songsync_core::config::CatalogConfig;
/// use songsync_core::transport::{Access, HttpClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new(&CatalogConfig::default())?;
/// let body: serde_json::Value = client
///     .get_json("https://api.vkeys.cn/v2/music/tencent?word=hello", Access::Public)
///     .await?;
/// println!("{body}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    credential_headers: HeaderMap,
    api_timeout: Duration,
    payload_timeout: Duration,
}

impl HttpClient {
    /// Builds a client from the catalog configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Config`] for an unusable header or cookie and
    /// [`TransportError::InvalidUrl`] when a cookie is scoped to an unparseable
    /// privileged URL.
    #[instrument(level = "debug", skip(config), fields(base_url = %config.base_url))]
    pub fn new(config: &CatalogConfig) -> Result<Self, TransportError> {
        let credential_headers = header_map(&config.headers)?;
        let cookie_jar = cookie_jar(config)?;
        let client = build_client(&config.user_agent, config.connect_timeout, cookie_jar)?;
        debug!(
            credential_headers = credential_headers.len(),
            "HTTP client ready"
        );
        Ok(Self {
            client,
            credential_headers,
            api_timeout: config.read_timeout,
            payload_timeout: config.payload_read_timeout,
        })
    }

    /// Sends a GET request and parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] for network failures, non-2xx statuses and
    /// bodies that are not valid JSON for `T`.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        access: Access,
    ) -> Result<T, TransportError> {
        let parsed = parse_url(url)?;
        let request = self
            .with_access(self.client.get(parsed), access)
            .timeout(self.api_timeout);
        let response = send(request, url).await?;
        read_json(response, url).await
    }

    /// Sends a POST request with a JSON body and parses the JSON response.
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    #[instrument(level = "debug", skip(self, body), fields(url = %url))]
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        access: Access,
        body: &serde_json::Value,
    ) -> Result<T, TransportError> {
        let parsed = parse_url(url)?;
        let request = self
            .with_access(self.client.post(parsed), access)
            .timeout(self.api_timeout)
            .json(body);
        let response = send(request, url).await?;
        read_json(response, url).await
    }

    /// Sends a HEAD request and returns the advertised `Content-Length`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the request fails or the status is not 2xx.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn head_length(&self, url: &str, access: Access) -> Result<Option<u64>, TransportError> {
        let parsed = parse_url(url)?;
        let request = self
            .with_access(self.client.head(parsed), access)
            .timeout(self.api_timeout);
        let response = send(request, url).await?;
        let length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        debug!(?length, "HEAD complete");
        Ok(length)
    }

    /// Sends a GET request and returns the response for incremental reading.
    ///
    /// The caller drains `bytes_stream()`; the request uses the payload timeout.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the request fails or the status is not 2xx.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn get_stream(&self, url: &str, access: Access) -> Result<Response, TransportError> {
        let parsed = parse_url(url)?;
        let request = self
            .with_access(self.client.get(parsed), access)
            .timeout(self.payload_timeout);
        send(request, url).await
    }

    fn with_access(&self, request: RequestBuilder, access: Access) -> RequestBuilder {
        match access {
            Access::Public => request,
            Access::Privileged => request.headers(self.credential_headers.clone()),
        }
    }
}

fn parse_url(url: &str) -> Result<Url, TransportError> {
    Url::parse(url).map_err(|_| TransportError::invalid_url(url))
}

async fn send(request: RequestBuilder, url: &str) -> Result<Response, TransportError> {
    let response = request
        .send()
        .await
        .map_err(|e| TransportError::connection(url, e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let status_code = status.as_u16();
    if matches!(status_code, 401 | 403) {
        return Err(TransportError::forbidden(url, status_code));
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(std::string::ToString::to_string);
    let body = response.text().await.unwrap_or_default();
    debug!(status = status_code, ?retry_after, "non-success response");
    Err(TransportError::http_status(url, status_code, &body, retry_after))
}

async fn read_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, TransportError> {
    let text = response
        .text()
        .await
        .map_err(|e| TransportError::connection(url, e))?;
    serde_json::from_str(&text).map_err(|e| TransportError::malformed_body(url, e.to_string()))
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::config(format!("invalid header name '{name}'")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::config(format!("invalid value for header '{name}'")))?;
        map.append(header_name, header_value);
    }
    Ok(map)
}

/// Loads the configured cookie string into a jar scoped to the privileged URL.
fn cookie_jar(config: &CatalogConfig) -> Result<Option<Arc<Jar>>, TransportError> {
    let Some(cookie) = config.cookie.as_deref().filter(|c| !c.trim().is_empty()) else {
        return Ok(None);
    };
    let Some(privileged_url) = config.privileged_url.as_deref() else {
        warn!("cookie configured without a privileged URL; ignoring it");
        return Ok(None);
    };
    let scope = parse_url(privileged_url)?;

    let jar = Jar::default();
    let mut loaded = 0usize;
    for pair in cookie.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        if !pair.contains('=') {
            return Err(TransportError::config("cookie entries must be name=value pairs"));
        }
        jar.add_cookie_str(pair, &scope);
        loaded += 1;
    }
    debug!(cookies = loaded, domain = ?scope.host_str(), "loaded cookies");
    Ok(Some(Arc::new(jar)))
}

fn build_client(
    user_agent: &str,
    connect_timeout: Duration,
    cookie_jar: Option<Arc<Jar>>,
) -> Result<Client, TransportError> {
    match try_build_client(user_agent, connect_timeout, cookie_jar.clone(), false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            warn!(
                "HTTP client builder panicked while loading system proxy settings; retrying with env-proxy fallback"
            );
            match try_build_client(user_agent, connect_timeout, cookie_jar, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Build(error)) => Err(TransportError::config(error.to_string())),
                Err(BuildClientFailure::Panic) => Err(TransportError::config(
                    "HTTP client builder panicked while applying env-proxy fallback",
                )),
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(TransportError::config(error.to_string())),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    user_agent: &str,
    connect_timeout: Duration,
    cookie_jar: Option<Arc<Jar>>,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let user_agent = user_agent.to_string();
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_client_builder(user_agent, connect_timeout, cookie_jar);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_client_builder(
    user_agent: String,
    connect_timeout: Duration,
    cookie_jar: Option<Arc<Jar>>,
) -> ClientBuilder {
    let mut builder = Client::builder()
        .connect_timeout(connect_timeout)
        .gzip(true)
        .user_agent(user_agent);
    if let Some(jar) = cookie_jar {
        builder = builder.cookie_provider(jar);
    }
    builder
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
