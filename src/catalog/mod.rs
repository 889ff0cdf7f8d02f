//! Resolution of free-text queries against the remote music catalog.
//!
//! # Architecture
//!
//! - [`CatalogClient`] - typed search/detail/privileged/lyric calls, each retried
//! - [`CatalogResolver`] - first-ranked search hit plus an ordered location chain
//! - [`LocationStrategy`] - async trait implemented by each fallback stage
//! - [`ResolvedResource`] - what the sync loop needs to materialize one song
//!
//! Tie-break policy: the first search result always wins. There is no
//! re-ranking, so a poorly worded query downloads whatever the catalog ranks
//! first.

mod client;
mod error;
mod query;
mod resolver;
mod strategies;

pub use client::{CatalogClient, DetailDocument, LocationBlock, LyricBundle, SearchHit};
pub use error::{CatalogError, ResolveError};
pub use query::normalize_query;
pub use resolver::CatalogResolver;
pub use strategies::{
    EmbeddedUrlStrategy, FoundLocation, LocateContext, LocateOutcome, LocationStrategy,
    MetadataBlockStrategy, PrivilegedApiStrategy, default_strategies,
};

use crate::transport::Access;

/// Where a payload can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadLocation {
    /// Plain fetch.
    Direct {
        /// Payload URL.
        url: String,
    },
    /// Fetch with the configured credential headers attached.
    Privileged {
        /// Payload URL.
        url: String,
    },
}

impl PayloadLocation {
    /// Payload URL.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Direct { url } | Self::Privileged { url } => url,
        }
    }

    /// Access level for fetching this payload.
    #[must_use]
    pub fn access(&self) -> Access {
        match self {
            Self::Direct { .. } => Access::Public,
            Self::Privileged { .. } => Access::Privileged,
        }
    }
}

/// A song resolved to a concrete payload location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    /// Catalog identifier.
    pub identifier: String,
    /// Song title.
    pub title: String,
    /// Performing artist.
    pub author: String,
    /// Payload extension from metadata or the URL, if known.
    pub format_hint: Option<String>,
    /// Where to fetch the payload.
    pub payload_location: PayloadLocation,
}

impl ResolvedResource {
    /// Extension to save the payload with.
    #[must_use]
    pub fn extension_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.format_hint.as_deref().unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_location_access() {
        let direct = PayloadLocation::Direct {
            url: "https://cdn/a.mp3".to_string(),
        };
        let privileged = PayloadLocation::Privileged {
            url: "https://cdn/b.mp3".to_string(),
        };
        assert_eq!(direct.access(), Access::Public);
        assert_eq!(privileged.access(), Access::Privileged);
        assert_eq!(privileged.url(), "https://cdn/b.mp3");
    }

    #[test]
    fn test_extension_or_falls_back() {
        let mut resource = ResolvedResource {
            identifier: "1".to_string(),
            title: "T".to_string(),
            author: "A".to_string(),
            format_hint: None,
            payload_location: PayloadLocation::Direct {
                url: "https://cdn/stream".to_string(),
            },
        };
        assert_eq!(resource.extension_or("mp3"), "mp3");
        resource.format_hint = Some("flac".to_string());
        assert_eq!(resource.extension_or("mp3"), "flac");
    }
}
