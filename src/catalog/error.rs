//! Error types for the catalog module.

use thiserror::Error;

use crate::retry::{RetryClass, RetryError, Retryable, parse_wait_hint};
use crate::transport::TransportError;

/// Failure of one catalog API call.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The HTTP exchange failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The envelope reported a non-success code or carried no data.
    #[error("catalog rejected {url} (code {code:?}): {message}")]
    Business {
        /// The request URL.
        url: String,
        /// The envelope `code`, when present.
        code: Option<i64>,
        /// The envelope `message` or `msg`, or a description of what was missing.
        message: String,
    },

    /// The `data` payload did not have the expected shape.
    #[error("unexpected catalog data from {url}: {reason}")]
    Schema {
        /// The request URL.
        url: String,
        /// Parser message.
        reason: String,
    },
}

impl CatalogError {
    /// Creates a business failure.
    pub fn business(url: impl Into<String>, code: Option<i64>, message: impl Into<String>) -> Self {
        Self::Business {
            url: url.into(),
            code,
            message: message.into(),
        }
    }

    /// Creates a schema failure.
    pub fn schema(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Business failures are retried only when the message names a wait.
impl Retryable for CatalogError {
    fn retry_class(&self) -> RetryClass {
        match self {
            Self::Transport(source) => source.retry_class(),
            Self::Business { message, .. } => {
                parse_wait_hint(message).map_or(RetryClass::Fatal, RetryClass::ServerWait)
            }
            Self::Schema { .. } => RetryClass::Fatal,
        }
    }
}

/// Why a query could not be turned into a downloadable resource.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The query was empty after normalization.
    #[error("query '{query}' is empty after normalization")]
    EmptyQuery {
        /// The original query.
        query: String,
    },

    /// The search call failed after retrying.
    #[error("search for '{query}' failed: {source}")]
    Search {
        /// The normalized query.
        query: String,
        /// The retry outcome.
        #[source]
        source: RetryError<CatalogError>,
    },

    /// The search returned no usable candidate.
    #[error("no results for '{query}'")]
    NoResults {
        /// The normalized query.
        query: String,
    },

    /// Every location strategy fell through.
    #[error("no download location for {title} - {author} (id {identifier})")]
    NoLocation {
        /// Catalog identifier.
        identifier: String,
        /// Song title.
        title: String,
        /// Song artist.
        author: String,
    },
}

impl ResolveError {
    /// Creates an empty-query error.
    pub fn empty_query(query: impl Into<String>) -> Self {
        Self::EmptyQuery {
            query: query.into(),
        }
    }

    /// Creates a search failure.
    pub fn search(query: impl Into<String>, source: RetryError<CatalogError>) -> Self {
        Self::Search {
            query: query.into(),
            source,
        }
    }

    /// Creates a no-results error.
    pub fn no_results(query: impl Into<String>) -> Self {
        Self::NoResults {
            query: query.into(),
        }
    }

    /// Creates a no-location error.
    pub fn no_location(
        identifier: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self::NoLocation {
            identifier: identifier.into(),
            title: title.into(),
            author: author.into(),
        }
    }
}
