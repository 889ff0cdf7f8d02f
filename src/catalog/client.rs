//! Typed access to the catalog's search, detail, privileged and lyric calls.
//!
//! Every response is an envelope `{code, message|msg, data}`. `code == 200`
//! with non-empty `data` is success; anything else becomes
//! [`CatalogError::Business`]. Each call runs under the shared
//! [`RetryExecutor`].

use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use super::error::CatalogError;
use crate::config::CatalogConfig;
use crate::retry::{RetryError, RetryExecutor};
use crate::transport::{Access, HttpClient, TransportError};

const SUCCESS_CODE: i64 = 200;

/// One ranked search candidate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchHit {
    /// Catalog identifier.
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// Song title.
    #[serde(default)]
    pub song: String,
    /// Performing artist.
    #[serde(default)]
    pub singer: String,
}

/// A URL plus optional format, as found in detail and privileged responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LocationBlock {
    /// Direct payload URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Format hint such as `mp3` or `flac`.
    #[serde(default)]
    pub format: Option<String>,
}

/// The detail representation of one song.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DetailDocument {
    /// Embedded direct payload URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Format of the embedded URL.
    #[serde(default)]
    pub format: Option<String>,
    /// Structured metadata block with its own location.
    #[serde(default)]
    pub media: Option<LocationBlock>,
}

/// Lyric texts for one song. Either part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LyricBundle {
    /// Timed lyrics in LRC format.
    #[serde(default)]
    pub lrc: Option<String>,
    /// Translated lyrics.
    #[serde(default)]
    pub trans: Option<String>,
}

/// Client for the remote catalog API.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: HttpClient,
    retry: RetryExecutor,
    base_url: String,
    privileged_url: Option<String>,
}

impl CatalogClient {
    /// Creates a client for the catalog described by `config`.
    #[must_use]
    pub fn new(http: HttpClient, retry: RetryExecutor, config: &CatalogConfig) -> Self {
        Self {
            http,
            retry,
            base_url: config.base().to_string(),
            privileged_url: config
                .privileged_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
        }
    }

    /// The privileged endpoint, if configured.
    #[must_use]
    pub fn privileged_url(&self) -> Option<&str> {
        self.privileged_url.as_deref()
    }

    /// Searches the catalog; results keep the catalog's ranking.
    ///
    /// # Errors
    ///
    /// Returns the retry outcome of the last failed attempt. An empty result
    /// list surfaces as a fatal [`CatalogError::Business`].
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, RetryError<CatalogError>> {
        let url = with_params(&self.base_url, &[("word", query)]);
        let hits = self
            .retry
            .run("search", || self.search_once(&url))
            .await?;
        debug!(hits = hits.len(), "search complete");
        Ok(hits)
    }

    /// Fetches the detail document for `id`.
    ///
    /// # Errors
    ///
    /// Returns the retry outcome of the last failed attempt.
    #[instrument(skip(self))]
    pub async fn detail(&self, id: &str) -> Result<DetailDocument, RetryError<CatalogError>> {
        let url = with_params(&format!("{}/geturl", self.base_url), &[("id", id)]);
        self.retry.run("detail", || self.get_decoded(&url)).await
    }

    /// Asks the privileged API for a location of `id`.
    ///
    /// Returns `Ok(None)` when no privileged endpoint is configured.
    ///
    /// # Errors
    ///
    /// Returns the retry outcome of the last failed attempt.
    #[instrument(skip(self))]
    pub async fn privileged_location(
        &self,
        id: &str,
    ) -> Result<Option<LocationBlock>, RetryError<CatalogError>> {
        let Some(url) = self.privileged_url.as_deref() else {
            return Ok(None);
        };
        let body = json!({ "id": id });
        let block = self
            .retry
            .run("privileged", || self.post_decoded(url, &body))
            .await?;
        Ok(Some(block))
    }

    /// Fetches lyric texts for `id`.
    ///
    /// # Errors
    ///
    /// Returns the retry outcome of the last failed attempt.
    #[instrument(skip(self))]
    pub async fn lyrics(&self, id: &str) -> Result<LyricBundle, RetryError<CatalogError>> {
        let url = with_params(&format!("{}/lyric", self.base_url), &[("id", id)]);
        self.retry.run("lyric", || self.get_decoded(&url)).await
    }

    async fn get_data(&self, url: &str) -> Result<Value, CatalogError> {
        let body: Value = self.http.get_json(url, Access::Public).await?;
        open_envelope(url, body)
    }

    async fn get_decoded<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, CatalogError> {
        let data = self.get_data(url).await?;
        decode(url, data)
    }

    async fn search_once(&self, url: &str) -> Result<Vec<SearchHit>, CatalogError> {
        let data = self.get_data(url).await?;
        parse_hits(url, data)
    }

    async fn post_decoded<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        payload: &Value,
    ) -> Result<T, CatalogError> {
        let data = self.post_data(url, payload).await?;
        decode(url, data)
    }

    async fn post_data(&self, url: &str, payload: &Value) -> Result<Value, CatalogError> {
        let body: Value = self.http.post_json(url, Access::Privileged, payload).await?;
        open_envelope(url, body)
    }
}

/// Appends query parameters, falling back to the raw base on a parse error
/// so the transport reports the invalid URL.
fn with_params(base: &str, params: &[(&str, &str)]) -> String {
    match Url::parse(base) {
        Ok(mut url) => {
            url.query_pairs_mut().extend_pairs(params);
            url.to_string()
        }
        Err(_) => base.to_string(),
    }
}

/// Unwraps `{code, message|msg, data}`.
fn open_envelope(url: &str, body: Value) -> Result<Value, CatalogError> {
    let Value::Object(mut envelope) = body else {
        return Err(CatalogError::from(TransportError::malformed_body(
            url,
            "response is not a JSON object",
        )));
    };

    let code = envelope.get("code").and_then(|code| {
        code.as_i64()
            .or_else(|| code.as_str().and_then(|s| s.trim().parse().ok()))
    });
    let message = envelope
        .get("message")
        .or_else(|| envelope.get("msg"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let data = envelope.remove("data").unwrap_or(Value::Null);

    if code == Some(SUCCESS_CODE) && !is_empty_data(&data) {
        return Ok(data);
    }
    let message = if message.is_empty() {
        "response carried no data".to_string()
    } else {
        message
    };
    debug!(?code, message = %message, "catalog business failure");
    Err(CatalogError::business(url, code, message))
}

fn is_empty_data(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::String(text) => text.trim().is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn decode<T: for<'de> Deserialize<'de>>(url: &str, data: Value) -> Result<T, CatalogError> {
    serde_json::from_value(data).map_err(|e| CatalogError::schema(url, e.to_string()))
}

/// Accepts an array of hits or a single hit object; skips malformed entries.
fn parse_hits(url: &str, data: Value) -> Result<Vec<SearchHit>, CatalogError> {
    let items = match data {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        other => {
            return Err(CatalogError::schema(
                url,
                format!("expected a list of results, got {other}"),
            ));
        }
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<SearchHit>(item) {
            Ok(hit) => Some(hit),
            Err(error) => {
                debug!(error = %error, "skipping malformed search result");
                None
            }
        })
        .collect())
}

fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) if !id.trim().is_empty() => Ok(id.trim().to_string()),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number id, got {other}"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const URL: &str = "https://api.example.com/search";

    #[test]
    fn test_open_envelope_success() {
        let data = open_envelope(URL, json!({"code": 200, "data": [{"id": 1}]})).unwrap();
        assert_eq!(data, json!([{"id": 1}]));
    }

    #[test]
    fn test_open_envelope_accepts_string_code() {
        let data = open_envelope(URL, json!({"code": "200", "data": {"url": "x"}})).unwrap();
        assert_eq!(data["url"], "x");
    }

    #[test]
    fn test_open_envelope_non_success_code() {
        let error = open_envelope(URL, json!({"code": 500, "msg": "server busy"})).unwrap_err();
        match error {
            CatalogError::Business { code, message, .. } => {
                assert_eq!(code, Some(500));
                assert_eq!(message, "server busy");
            }
            other => panic!("expected Business, got {other:?}"),
        }
    }

    #[test]
    fn test_open_envelope_empty_data_is_business_failure() {
        let error = open_envelope(URL, json!({"code": 200, "data": []})).unwrap_err();
        assert!(matches!(error, CatalogError::Business { code: Some(200), .. }));

        let error = open_envelope(URL, json!({"code": 200, "data": null, "message": "ok"}))
            .unwrap_err();
        assert!(matches!(error, CatalogError::Business { .. }));
    }

    #[test]
    fn test_open_envelope_non_object_is_malformed() {
        let error = open_envelope(URL, json!([1, 2])).unwrap_err();
        assert!(matches!(
            error,
            CatalogError::Transport(TransportError::MalformedBody { .. })
        ));
    }

    #[test]
    fn test_parse_hits_list_and_single_object() {
        let hits = parse_hits(
            URL,
            json!([
                {"id": 101, "song": "晴天", "singer": "周杰伦"},
                {"id": "abc", "song": "Other", "singer": "Someone"}
            ]),
        )
        .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "101");
        assert_eq!(hits[1].id, "abc");

        let single = parse_hits(URL, json!({"id": 7, "song": "S", "singer": "A"})).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].song, "S");
    }

    #[test]
    fn test_parse_hits_skips_entries_without_id() {
        let hits = parse_hits(URL, json!([{"song": "no id"}, {"id": 3}])).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "3");
        assert_eq!(hits[0].song, "");
    }

    #[test]
    fn test_detail_document_decodes_media_block() {
        let detail: DetailDocument = decode(
            URL,
            json!({"format": "flac", "media": {"url": "https://cdn/x.flac"}}),
        )
        .unwrap();
        assert!(detail.url.is_none());
        assert_eq!(detail.format.as_deref(), Some("flac"));
        assert_eq!(
            detail.media.unwrap().url.as_deref(),
            Some("https://cdn/x.flac")
        );
    }

    #[test]
    fn test_with_params_encodes_query() {
        let url = with_params("https://api.example.com/v2/music", &[("word", "周杰伦 晴天")]);
        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs, vec![("word".to_string(), "周杰伦 晴天".to_string())]);
        assert_eq!(parsed.path(), "/v2/music");
    }
}
