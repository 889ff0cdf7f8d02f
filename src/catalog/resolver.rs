//! Query to resource resolution.
//!
//! The [`CatalogResolver`] searches the catalog, takes the first-ranked hit
//! and walks its [`LocationStrategy`] chain in registration order until one
//! produces a payload location.

use tracing::{debug, info, instrument, warn};

use super::client::{CatalogClient, LyricBundle};
use super::error::{CatalogError, ResolveError};
use super::query::normalize_query;
use super::strategies::{LocateContext, LocateOutcome, LocationStrategy, default_strategies};
use super::ResolvedResource;
use crate::naming::{extension_from_url, sanitize_extension};

/// Resolves free-text queries into downloadable resources.
pub struct CatalogResolver {
    catalog: CatalogClient,
    strategies: Vec<Box<dyn LocationStrategy>>,
}

impl std::fmt::Debug for CatalogResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogResolver")
            .field("strategies", &self.strategy_names())
            .finish_non_exhaustive()
    }
}

impl CatalogResolver {
    /// Creates a resolver with the default strategy chain.
    #[must_use]
    pub fn new(catalog: CatalogClient) -> Self {
        let strategies = default_strategies(catalog.privileged_url().is_some());
        Self {
            catalog,
            strategies,
        }
    }

    /// Creates a resolver with an explicit strategy chain.
    #[must_use]
    pub fn with_strategies(
        catalog: CatalogClient,
        strategies: Vec<Box<dyn LocationStrategy>>,
    ) -> Self {
        Self {
            catalog,
            strategies,
        }
    }

    /// Appends a strategy to the end of the chain.
    #[tracing::instrument(skip(self, strategy), fields(strategy_name))]
    pub fn register(&mut self, strategy: Box<dyn LocationStrategy>) {
        tracing::Span::current().record("strategy_name", strategy.name());
        debug!(name = strategy.name(), "registering location strategy");
        self.strategies.push(strategy);
    }

    /// Names of the registered strategies, in order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Resolves `query` to the first-ranked catalog hit and its payload location.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::EmptyQuery`] when nothing remains after normalization (no request is made)
    /// - [`ResolveError::NoResults`] when the catalog has no match
    /// - [`ResolveError::Search`] when the search call fails after retrying
    /// - [`ResolveError::NoLocation`] when every strategy falls through
    #[instrument(skip(self))]
    pub async fn resolve(&self, query: &str) -> Result<ResolvedResource, ResolveError> {
        let normalized = normalize_query(query);
        if normalized.is_empty() {
            return Err(ResolveError::empty_query(query));
        }

        let hits = match self.catalog.search(&normalized).await {
            Ok(hits) => hits,
            Err(error)
                if error.is_fatal() && matches!(error.last_error(), CatalogError::Business { .. }) =>
            {
                debug!(error = %error, "search reported no match");
                return Err(ResolveError::no_results(&normalized));
            }
            Err(error) => return Err(ResolveError::search(&normalized, error)),
        };
        let Some(hit) = hits.into_iter().next() else {
            return Err(ResolveError::no_results(&normalized));
        };
        let title = if hit.song.trim().is_empty() {
            normalized.clone()
        } else {
            hit.song
        };
        let author = hit.singer;
        info!(id = %hit.id, title = %title, author = %author, "best match");

        let detail = match self.catalog.detail(&hit.id).await {
            Ok(detail) => Some(detail),
            Err(error) => {
                warn!(id = %hit.id, error = %error, "detail lookup failed");
                None
            }
        };
        let ctx = LocateContext {
            identifier: &hit.id,
            detail: detail.as_ref(),
        };

        for strategy in &self.strategies {
            debug!(strategy = strategy.name(), "trying location strategy");
            match strategy.locate(&self.catalog, &ctx).await {
                LocateOutcome::Found(found) => {
                    let format_hint = found
                        .format_hint
                        .as_deref()
                        .and_then(sanitize_extension)
                        .or_else(|| extension_from_url(found.location.url()));
                    info!(
                        strategy = strategy.name(),
                        format = ?format_hint,
                        "location resolved"
                    );
                    return Ok(ResolvedResource {
                        identifier: hit.id,
                        title,
                        author,
                        format_hint,
                        payload_location: found.location,
                    });
                }
                LocateOutcome::NotFound => {
                    debug!(strategy = strategy.name(), "strategy found nothing, trying next");
                }
                LocateOutcome::Failed(reason) => {
                    warn!(strategy = strategy.name(), reason = %reason, "strategy failed, trying next");
                }
            }
        }

        Err(ResolveError::no_location(hit.id, title, author))
    }

    /// Fetches lyric texts for `identifier`. Failures degrade to an empty bundle.
    #[instrument(skip(self))]
    pub async fn fetch_lyrics(&self, identifier: &str) -> LyricBundle {
        match self.catalog.lyrics(identifier).await {
            Ok(bundle) => bundle,
            Err(error) => {
                info!(error = %error, "no lyrics available");
                LyricBundle::default()
            }
        }
    }
}
