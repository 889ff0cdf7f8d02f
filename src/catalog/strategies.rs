//! Ordered fallback chain for finding a song's payload location.
//!
//! Strategies run cheapest first and the chain stops at the first
//! [`LocateOutcome::Found`]. "Not found" and "failed" both fall through.

use async_trait::async_trait;
use tracing::debug;

use super::PayloadLocation;
use super::client::{CatalogClient, DetailDocument, LocationBlock};

/// Inputs shared by every strategy for one song.
#[derive(Debug, Clone, Copy)]
pub struct LocateContext<'a> {
    /// Catalog identifier of the song.
    pub identifier: &'a str,
    /// Detail document, when its fetch succeeded.
    pub detail: Option<&'a DetailDocument>,
}

/// A location plus the format hint that came with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundLocation {
    /// Where to fetch the payload.
    pub location: PayloadLocation,
    /// Format reported next to the URL, if any.
    pub format_hint: Option<String>,
}

/// Result of one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateOutcome {
    /// A usable location; stops the chain.
    Found(FoundLocation),
    /// This strategy had nothing to offer.
    NotFound,
    /// The strategy's remote call failed after retrying.
    Failed(String),
}

/// One way of turning a catalog identifier into a payload location.
///
/// Uses `async_trait` so strategies can be stored as `Box<dyn LocationStrategy>`.
#[async_trait]
pub trait LocationStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Attempts to produce a location.
    async fn locate(&self, catalog: &CatalogClient, ctx: &LocateContext<'_>) -> LocateOutcome;
}

/// Uses the URL embedded at the top level of the detail document.
#[derive(Debug, Default)]
pub struct EmbeddedUrlStrategy;

#[async_trait]
impl LocationStrategy for EmbeddedUrlStrategy {
    fn name(&self) -> &'static str {
        "embedded-url"
    }

    async fn locate(&self, _catalog: &CatalogClient, ctx: &LocateContext<'_>) -> LocateOutcome {
        let Some(detail) = ctx.detail else {
            return LocateOutcome::NotFound;
        };
        direct_from(detail.url.as_deref(), detail.format.as_deref())
    }
}

/// Uses the `media` block of the detail document.
#[derive(Debug, Default)]
pub struct MetadataBlockStrategy;

#[async_trait]
impl LocationStrategy for MetadataBlockStrategy {
    fn name(&self) -> &'static str {
        "metadata-block"
    }

    async fn locate(&self, _catalog: &CatalogClient, ctx: &LocateContext<'_>) -> LocateOutcome {
        let Some(block) = ctx.detail.and_then(|detail| detail.media.as_ref()) else {
            return LocateOutcome::NotFound;
        };
        let format = block
            .format
            .as_deref()
            .or_else(|| ctx.detail.and_then(|detail| detail.format.as_deref()));
        direct_from(block.url.as_deref(), format)
    }
}

/// Asks the privileged API; payloads found this way are fetched with credentials.
#[derive(Debug, Default)]
pub struct PrivilegedApiStrategy;

#[async_trait]
impl LocationStrategy for PrivilegedApiStrategy {
    fn name(&self) -> &'static str {
        "privileged-api"
    }

    async fn locate(&self, catalog: &CatalogClient, ctx: &LocateContext<'_>) -> LocateOutcome {
        match catalog.privileged_location(ctx.identifier).await {
            Ok(Some(LocationBlock {
                url: Some(url),
                format,
            })) if !url.trim().is_empty() => {
                let format_hint = format.or_else(|| {
                    ctx.detail.and_then(|detail| detail.format.clone())
                });
                LocateOutcome::Found(FoundLocation {
                    location: PayloadLocation::Privileged {
                        url: url.trim().to_string(),
                    },
                    format_hint,
                })
            }
            Ok(_) => LocateOutcome::NotFound,
            Err(error) => LocateOutcome::Failed(error.to_string()),
        }
    }
}

fn direct_from(url: Option<&str>, format: Option<&str>) -> LocateOutcome {
    match url.map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => LocateOutcome::Found(FoundLocation {
            location: PayloadLocation::Direct {
                url: url.to_string(),
            },
            format_hint: format.map(str::to_string),
        }),
        None => LocateOutcome::NotFound,
    }
}

/// Builds the default chain: embedded URL, metadata block, then the
/// privileged API when it is configured.
#[must_use]
pub fn default_strategies(privileged_available: bool) -> Vec<Box<dyn LocationStrategy>> {
    let mut chain: Vec<Box<dyn LocationStrategy>> =
        vec![Box::new(EmbeddedUrlStrategy), Box::new(MetadataBlockStrategy)];
    if privileged_available {
        chain.push(Box::new(PrivilegedApiStrategy));
    } else {
        debug!("privileged API not configured; chain has two strategies");
    }
    chain
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::CatalogConfig;
    use crate::retry::RetryExecutor;
    use crate::transport::HttpClient;

    fn offline_catalog() -> CatalogClient {
        let config = CatalogConfig::default();
        CatalogClient::new(
            HttpClient::new(&config).unwrap(),
            RetryExecutor::default(),
            &config,
        )
    }

    fn detail(url: Option<&str>, format: Option<&str>, media: Option<LocationBlock>) -> DetailDocument {
        DetailDocument {
            url: url.map(str::to_string),
            format: format.map(str::to_string),
            media,
        }
    }

    #[tokio::test]
    async fn test_embedded_url_found() {
        let doc = detail(Some("https://cdn/a.mp3"), Some("mp3"), None);
        let ctx = LocateContext {
            identifier: "1",
            detail: Some(&doc),
        };
        let outcome = EmbeddedUrlStrategy.locate(&offline_catalog(), &ctx).await;
        assert_eq!(
            outcome,
            LocateOutcome::Found(FoundLocation {
                location: PayloadLocation::Direct {
                    url: "https://cdn/a.mp3".to_string()
                },
                format_hint: Some("mp3".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn test_embedded_url_blank_is_not_found() {
        let doc = detail(Some("  "), None, None);
        let ctx = LocateContext {
            identifier: "1",
            detail: Some(&doc),
        };
        assert_eq!(
            EmbeddedUrlStrategy.locate(&offline_catalog(), &ctx).await,
            LocateOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_metadata_block_prefers_block_format() {
        let doc = detail(
            None,
            Some("mp3"),
            Some(LocationBlock {
                url: Some("https://cdn/a.flac".to_string()),
                format: Some("flac".to_string()),
            }),
        );
        let ctx = LocateContext {
            identifier: "1",
            detail: Some(&doc),
        };
        let LocateOutcome::Found(found) = MetadataBlockStrategy.locate(&offline_catalog(), &ctx).await
        else {
            panic!("expected Found");
        };
        assert_eq!(found.format_hint.as_deref(), Some("flac"));
    }

    #[tokio::test]
    async fn test_metadata_block_falls_back_to_detail_format() {
        let doc = detail(
            None,
            Some("m4a"),
            Some(LocationBlock {
                url: Some("https://cdn/a".to_string()),
                format: None,
            }),
        );
        let ctx = LocateContext {
            identifier: "1",
            detail: Some(&doc),
        };
        let LocateOutcome::Found(found) = MetadataBlockStrategy.locate(&offline_catalog(), &ctx).await
        else {
            panic!("expected Found");
        };
        assert_eq!(found.format_hint.as_deref(), Some("m4a"));
    }

    #[tokio::test]
    async fn test_strategies_without_detail_are_not_found() {
        let ctx = LocateContext {
            identifier: "1",
            detail: None,
        };
        let catalog = offline_catalog();
        assert_eq!(
            EmbeddedUrlStrategy.locate(&catalog, &ctx).await,
            LocateOutcome::NotFound
        );
        assert_eq!(
            MetadataBlockStrategy.locate(&catalog, &ctx).await,
            LocateOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_privileged_without_endpoint_is_not_found() {
        let ctx = LocateContext {
            identifier: "1",
            detail: None,
        };
        assert_eq!(
            PrivilegedApiStrategy.locate(&offline_catalog(), &ctx).await,
            LocateOutcome::NotFound
        );
    }

    #[test]
    fn test_default_strategies_order() {
        let names: Vec<&str> = default_strategies(true).iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["embedded-url", "metadata-block", "privileged-api"]);
        assert_eq!(default_strategies(false).len(), 2);
    }
}
