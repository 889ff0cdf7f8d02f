//! songsync Core Library
//!
//! Keeps a local music directory in step with a declared list of songs:
//! each manifest query is resolved against a remote catalog, its audio and
//! lyric files are written under stable names, and files no longer declared
//! are removed.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`transport`] - single HTTP requests with typed failures
//! - [`retry`] - bounded retry with exponential and server-requested backoff
//! - [`catalog`] - query resolution through an ordered location strategy chain
//! - [`materialize`] - idempotent, temp-then-rename file placement
//! - [`manifest`] - plain list and Markdown table manifest parsing
//! - [`reconcile`] - set-difference cleanup of the destination directory
//! - [`sync`] - the sequential run loop tying the above together

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod config;
pub mod manifest;
pub mod materialize;
pub mod naming;
pub mod reconcile;
pub mod retry;
pub mod sync;
pub mod transport;

pub(crate) mod user_agent;

#[cfg(test)]
pub mod test_support;

// Re-export commonly used types
pub use catalog::{
    CatalogClient, CatalogError, CatalogResolver, LocationStrategy, PayloadLocation, ResolveError,
    ResolvedResource,
};
pub use config::{CatalogConfig, SyncOptions, parse_header_line};
pub use manifest::{ManifestError, ManifestFormat, load_manifest, parse_manifest};
pub use materialize::{ExistingPolicy, MaterializeError, Materialized, Materializer, TextOutcome};
pub use naming::{ArtifactName, sanitize};
pub use reconcile::{ExpectedSet, ReconcileReport, Reconciler};
pub use retry::{
    DEFAULT_MAX_RETRIES, RetryClass, RetryError, RetryExecutor, RetryPolicy, Retryable,
};
pub use sync::{
    FailureStage, QueryFailure, RunVerdict, SyncEngine, SyncError, SyncEvent, SyncObserver,
    SyncReport, TracingObserver,
};
pub use transport::{Access, HttpClient, TransportError};
