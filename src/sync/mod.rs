//! Run orchestration: manifest queries in, synchronized directory out.
//!
//! Queries are processed strictly one after another. Each query is resolved,
//! its payload materialized, then its lyric files. Every path that ends up on
//! disk for a successful query joins the run's [`ExpectedSet`]; once the loop
//! is over, the [`Reconciler`] deletes everything else in the destination.
//!
//! A failing query never aborts the loop. The only hard errors are the ones
//! that prevent a run from starting at all.

mod events;

pub use events::{FailureStage, PruneSkip, SyncEvent, SyncObserver, TracingObserver};

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{CatalogClient, CatalogResolver, LyricBundle, ResolvedResource};
use crate::config::{CatalogConfig, SyncOptions};
use crate::materialize::{Materializer, TextOutcome};
use crate::naming::ArtifactName;
use crate::reconcile::{ExpectedSet, ReconcileReport, Reconciler};
use crate::retry::RetryExecutor;
use crate::transport::{HttpClient, TransportError};

/// Errors that stop a run before any query is processed.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The HTTP client could not be built from the configuration.
    #[error(
        "failed to build HTTP client: {source}\n  Suggestion: check the configured headers, cookie and URLs"
    )]
    Client {
        /// The client construction error.
        #[source]
        source: TransportError,
    },

    /// The destination directory could not be created or resolved.
    #[error(
        "cannot prepare destination directory {path}: {source}\n  Suggestion: check the path and its permissions"
    )]
    Destination {
        /// The requested destination.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    fn destination(path: &Path, source: std::io::Error) -> Self {
        Self::Destination {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Overall outcome of a run, for the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunVerdict {
    /// No query failed (including an empty manifest).
    Success,
    /// Some queries failed, some succeeded.
    PartialFailure,
    /// Every query failed.
    Failure,
}

impl RunVerdict {
    /// Maps success and failure counts to a verdict.
    #[must_use]
    pub fn from_counts(succeeded: usize, failed: usize) -> Self {
        if failed == 0 {
            Self::Success
        } else if succeeded > 0 {
            Self::PartialFailure
        } else {
            Self::Failure
        }
    }
}

/// A query that did not produce its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFailure {
    /// The manifest query.
    pub query: String,
    /// Where it failed.
    pub stage: FailureStage,
    /// Human-readable cause.
    pub reason: String,
}

/// Summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Absolute destination directory.
    pub dest: PathBuf,
    /// Number of queries in the manifest.
    pub total: usize,
    /// Queries whose payload is on disk.
    pub succeeded: usize,
    /// Payloads downloaded in this run.
    pub fetched: usize,
    /// Payloads that were already present.
    pub already_present: usize,
    /// Queries satisfied by another query's file.
    pub collisions: usize,
    /// Lyric files newly written.
    pub lyrics_written: usize,
    /// Failed queries, in manifest order.
    pub failures: Vec<QueryFailure>,
    /// Paths the run intends to keep.
    pub expected: ExpectedSet,
    /// Cleanup result; `None` when cleanup did not run.
    pub reconcile: Option<ReconcileReport>,
}

impl SyncReport {
    /// Number of failed queries.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Number of files deleted by cleanup.
    #[must_use]
    pub fn pruned(&self) -> usize {
        self.reconcile.as_ref().map_or(0, |r| r.deleted.len())
    }

    /// Verdict derived from the success and failure counts.
    #[must_use]
    pub fn verdict(&self) -> RunVerdict {
        RunVerdict::from_counts(self.succeeded, self.failed())
    }
}

/// Drives resolver, materializer and reconciler for one manifest.
#[derive(Debug)]
pub struct SyncEngine {
    resolver: CatalogResolver,
    materializer: Materializer,
    options: SyncOptions,
}

impl SyncEngine {
    /// Builds the engine and its shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Client`] when the configuration is rejected
    /// (for example a malformed header or cookie).
    pub fn new(config: &CatalogConfig, options: SyncOptions) -> Result<Self, SyncError> {
        let http = HttpClient::new(config).map_err(|source| SyncError::Client { source })?;
        let retry = RetryExecutor::new(options.retry.clone());
        let catalog = CatalogClient::new(http.clone(), retry.clone(), config);
        let resolver = CatalogResolver::new(catalog);
        let materializer = Materializer::new(http, retry, options.existing_policy);
        Ok(Self::from_parts(resolver, materializer, options))
    }

    /// Assembles an engine from prepared parts.
    #[must_use]
    pub fn from_parts(
        resolver: CatalogResolver,
        materializer: Materializer,
        options: SyncOptions,
    ) -> Self {
        Self {
            resolver,
            materializer,
            options,
        }
    }

    /// The options this engine runs with.
    #[must_use]
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Synchronizes `dest` with `queries`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Destination`] when `dest` cannot be created.
    /// Per-query failures are reported in [`SyncReport::failures`] instead.
    #[instrument(skip(self, queries, observer), fields(queries = queries.len(), dest = %dest.display()))]
    pub async fn run(
        &self,
        queries: &[String],
        dest: &Path,
        observer: &dyn SyncObserver,
    ) -> Result<SyncReport, SyncError> {
        let dest = prepare_destination(dest).await?;
        let total = queries.len();
        observer.on_event(&SyncEvent::RunStarted {
            total,
            dest: dest.clone(),
        });

        let mut expected = ExpectedSet::new();
        let mut report = SyncReport {
            dest: dest.clone(),
            total,
            ..SyncReport::default()
        };

        for (index, query) in queries.iter().enumerate() {
            if index > 0 && !self.options.query_pause.is_zero() {
                tokio::time::sleep(self.options.query_pause).await;
            }
            observer.on_event(&SyncEvent::QueryStarted {
                index,
                total,
                query: query.clone(),
            });

            let succeeded = match self
                .process_query(index, query, &dest, &mut expected, &mut report, observer)
                .await
            {
                Ok(()) => {
                    report.succeeded += 1;
                    true
                }
                Err(failure) => {
                    observer.on_event(&SyncEvent::QueryFailed {
                        index,
                        query: failure.query.clone(),
                        stage: failure.stage,
                        reason: failure.reason.clone(),
                    });
                    report.failures.push(failure);
                    false
                }
            };
            observer.on_event(&SyncEvent::QueryFinished { index, succeeded });
        }

        let reconcile = self.prune(&dest, &expected, &report, observer).await;
        report.reconcile = reconcile;
        report.expected = expected;

        observer.on_event(&SyncEvent::RunFinished {
            succeeded: report.succeeded,
            failed: report.failed(),
            pruned: report.pruned(),
        });
        Ok(report)
    }

    async fn process_query(
        &self,
        index: usize,
        query: &str,
        dest: &Path,
        expected: &mut ExpectedSet,
        report: &mut SyncReport,
        observer: &dyn SyncObserver,
    ) -> Result<(), QueryFailure> {
        let failure = |stage, reason: String| QueryFailure {
            query: query.to_string(),
            stage,
            reason,
        };

        let resource = self
            .resolver
            .resolve(query)
            .await
            .map_err(|e| failure(FailureStage::Resolve, e.to_string()))?;
        observer.on_event(&SyncEvent::Resolved {
            index,
            identifier: resource.identifier.clone(),
            title: resource.title.clone(),
            author: resource.author.clone(),
        });

        let name = ArtifactName::new(&resource.title, &resource.author).ok_or_else(|| {
            failure(
                FailureStage::Naming,
                format!(
                    "title '{}' and author '{}' leave no usable file name",
                    resource.title, resource.author
                ),
            )
        })?;
        let extension = resource.extension_or(&self.options.fallback_extension);
        let payload_path = name.payload_path(dest, extension);

        if expected.contains(&payload_path) {
            report.collisions += 1;
            observer.on_event(&SyncEvent::Collision {
                index,
                path: payload_path,
            });
            return Ok(());
        }

        let materialized = self
            .materializer
            .materialize(&resource.payload_location, &payload_path)
            .await
            .map_err(|e| failure(FailureStage::Payload, e.to_string()))?;
        let fetched = materialized.was_fetched();
        if fetched {
            report.fetched += 1;
        } else {
            report.already_present += 1;
        }
        expected.insert(payload_path.clone());
        observer.on_event(&SyncEvent::PayloadReady {
            index,
            path: payload_path,
            fetched,
        });

        self.materialize_lyrics(index, &resource, &name, dest, expected, report, observer)
            .await;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn materialize_lyrics(
        &self,
        index: usize,
        resource: &ResolvedResource,
        name: &ArtifactName,
        dest: &Path,
        expected: &mut ExpectedSet,
        report: &mut SyncReport,
        observer: &dyn SyncObserver,
    ) {
        let lyric_path = name.lyric_path(dest);
        let translation_path = name.translation_path(dest);

        let bundle = if file_exists(&lyric_path).await && file_exists(&translation_path).await {
            debug!("both lyric files present, skipping lyric lookup");
            LyricBundle::default()
        } else {
            self.resolver.fetch_lyrics(&resource.identifier).await
        };

        for (content, path) in [(bundle.lrc, lyric_path), (bundle.trans, translation_path)] {
            let content = content.unwrap_or_default();
            match self.materializer.materialize_text(&content, &path).await {
                Ok(TextOutcome::Written(path)) => {
                    report.lyrics_written += 1;
                    expected.insert(path.clone());
                    observer.on_event(&SyncEvent::TextSaved {
                        index,
                        path,
                        preserved: false,
                    });
                }
                Ok(TextOutcome::Preserved(path)) => {
                    expected.insert(path.clone());
                    observer.on_event(&SyncEvent::TextSaved {
                        index,
                        path,
                        preserved: true,
                    });
                }
                Ok(TextOutcome::Skipped) => {}
                Err(error) => observer.on_event(&SyncEvent::TextFailed {
                    index,
                    path,
                    reason: error.to_string(),
                }),
            }
        }
    }

    async fn prune(
        &self,
        dest: &Path,
        expected: &ExpectedSet,
        report: &SyncReport,
        observer: &dyn SyncObserver,
    ) -> Option<ReconcileReport> {
        if !self.options.prune {
            observer.on_event(&SyncEvent::PruneSkipped {
                reason: PruneSkip::Disabled,
            });
            return None;
        }
        if report.total > 0 && report.succeeded == 0 {
            observer.on_event(&SyncEvent::PruneSkipped {
                reason: PruneSkip::NoSuccesses,
            });
            return None;
        }

        match Reconciler::reconcile(dest, expected).await {
            Ok(outcome) => {
                observer.on_event(&SyncEvent::Reconciled {
                    deleted: outcome.deleted.len(),
                    failed: outcome.failed.len(),
                    kept: outcome.kept,
                });
                Some(outcome)
            }
            Err(error) => {
                warn!(error = %error, "destination listing failed");
                observer.on_event(&SyncEvent::PruneFailed {
                    reason: error.to_string(),
                });
                None
            }
        }
    }
}

/// Creates `dest` if needed and returns it as an absolute path.
async fn prepare_destination(dest: &Path) -> Result<PathBuf, SyncError> {
    if !file_exists(dest).await {
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| SyncError::destination(dest, e))?;
        info!(dir = %dest.display(), "created destination directory");
    }
    std::path::absolute(dest).map_err(|e| SyncError::destination(dest, e))
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::events::RecordingObserver;
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    fn fast_options() -> SyncOptions {
        SyncOptions {
            query_pause: Duration::ZERO,
            retry: RetryPolicy::new(1, Duration::from_millis(5), 1.0),
            ..SyncOptions::default()
        }
    }

    fn engine_for(server: &MockServer, options: SyncOptions) -> SyncEngine {
        let config = CatalogConfig::with_base_url(format!("{}/music", server.uri()));
        SyncEngine::new(&config, options).unwrap()
    }

    async fn mount_song(server: &MockServer, query: &str, id: u64, title: &str, author: &str) {
        Mock::given(method("GET"))
            .and(path("/music"))
            .and(query_param("word", query))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "data": [{"id": id, "song": title, "singer": author}]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/music/geturl"))
            .and(query_param("id", id.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "data": {"url": format!("{}/files/{id}.mp3", server.uri()), "format": "mp3"}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/music/lyric"))
            .and(query_param("id", id.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "data": {"lrc": "[00:01.00]first line", "trans": ""}
            })))
            .mount(server)
            .await;
    }

    async fn mount_payload(server: &MockServer, id: u64, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/files/{id}.mp3")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"audio".to_vec()))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    async fn mount_no_match(server: &MockServer, query: &str) {
        Mock::given(method("GET"))
            .and(path("/music"))
            .and(query_param("word", query))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"code": 404, "msg": "no match"})),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn test_verdict_from_counts() {
        assert_eq!(RunVerdict::from_counts(3, 0), RunVerdict::Success);
        assert_eq!(RunVerdict::from_counts(0, 0), RunVerdict::Success);
        assert_eq!(RunVerdict::from_counts(2, 1), RunVerdict::PartialFailure);
        assert_eq!(RunVerdict::from_counts(0, 2), RunVerdict::Failure);
    }

    #[tokio::test]
    async fn test_run_downloads_and_prunes_stale_files() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        mount_song(&server, "Song A", 1, "Song A", "Artist A").await;
        mount_payload(&server, 1, 1).await;
        let dest = TempDir::new().unwrap();
        std::fs::write(dest.path().join("old.mp3"), b"stale").unwrap();

        let observer = RecordingObserver::default();
        let report = engine_for(&server, fast_options())
            .run(&["Song A".to_string()], dest.path(), &observer)
            .await
            .unwrap();

        assert_eq!(report.verdict(), RunVerdict::Success);
        assert_eq!(report.fetched, 1);
        assert_eq!(report.lyrics_written, 1);
        assert_eq!(report.pruned(), 1);
        assert!(dest.path().join("Song A - Artist A.mp3").exists());
        assert!(dest.path().join("Song A - Artist A.lrc").exists());
        assert!(!dest.path().join("Song A - Artist A.trans.txt").exists());
        assert!(!dest.path().join("old.mp3").exists());
        assert_eq!(report.expected.len(), 2);

        let events = observer.events.lock().unwrap();
        assert!(matches!(events.first(), Some(SyncEvent::RunStarted { total: 1, .. })));
        assert!(matches!(
            events.last(),
            Some(SyncEvent::RunFinished {
                succeeded: 1,
                failed: 0,
                pruned: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_second_run_does_not_refetch_payload() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        mount_song(&server, "Song A", 1, "Song A", "Artist A").await;
        mount_payload(&server, 1, 1).await;
        let dest = TempDir::new().unwrap();
        let engine = engine_for(&server, fast_options());
        let queries = vec!["Song A".to_string()];

        let first = engine.run(&queries, dest.path(), &TracingObserver).await.unwrap();
        let second = engine.run(&queries, dest.path(), &TracingObserver).await.unwrap();

        assert_eq!(first.fetched, 1);
        assert_eq!(second.fetched, 0);
        assert_eq!(second.already_present, 1);
        assert_eq!(second.pruned(), 0);
        assert_eq!(first.expected, second.expected);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_going() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        mount_no_match(&server, "Missing Song").await;
        mount_song(&server, "Song B", 2, "Song B", "Artist B").await;
        mount_payload(&server, 2, 1).await;
        let dest = TempDir::new().unwrap();

        let report = engine_for(&server, fast_options())
            .run(
                &["Missing Song".to_string(), "Song B".to_string()],
                dest.path(),
                &TracingObserver,
            )
            .await
            .unwrap();

        assert_eq!(report.verdict(), RunVerdict::PartialFailure);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].query, "Missing Song");
        assert_eq!(report.failures[0].stage, FailureStage::Resolve);
        assert!(dest.path().join("Song B - Artist B.mp3").exists());
    }

    #[tokio::test]
    async fn test_payload_failure_skips_lyrics() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        mount_song(&server, "Song A", 1, "Song A", "Artist A").await;
        Mock::given(method("GET"))
            .and(path("/files/1.mp3"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let dest = TempDir::new().unwrap();

        let report = engine_for(&server, fast_options())
            .run(&["Song A".to_string()], dest.path(), &TracingObserver)
            .await
            .unwrap();

        assert_eq!(report.verdict(), RunVerdict::Failure);
        assert_eq!(report.failures[0].stage, FailureStage::Payload);
        assert!(!dest.path().join("Song A - Artist A.lrc").exists());
        assert!(report.expected.is_empty());
    }

    #[tokio::test]
    async fn test_all_failures_leave_directory_untouched() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        mount_no_match(&server, "Nothing").await;
        mount_payload(&server, 1, 0).await;
        let dest = TempDir::new().unwrap();
        std::fs::write(dest.path().join("keep.mp3"), b"library").unwrap();

        let observer = RecordingObserver::default();
        let report = engine_for(&server, fast_options())
            .run(&["Nothing".to_string()], dest.path(), &observer)
            .await
            .unwrap();

        assert_eq!(report.verdict(), RunVerdict::Failure);
        assert!(report.expected.is_empty());
        assert!(report.reconcile.is_none());
        assert!(dest.path().join("keep.mp3").exists());
        assert!(observer.events.lock().unwrap().contains(&SyncEvent::PruneSkipped {
            reason: PruneSkip::NoSuccesses
        }));
    }

    #[tokio::test]
    async fn test_prune_disabled_keeps_stale_files() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        mount_song(&server, "Song A", 1, "Song A", "Artist A").await;
        mount_payload(&server, 1, 1).await;
        let dest = TempDir::new().unwrap();
        std::fs::write(dest.path().join("old.mp3"), b"stale").unwrap();

        let options = SyncOptions {
            prune: false,
            ..fast_options()
        };
        let report = engine_for(&server, options)
            .run(&["Song A".to_string()], dest.path(), &TracingObserver)
            .await
            .unwrap();

        assert!(report.reconcile.is_none());
        assert!(dest.path().join("old.mp3").exists());
    }

    #[tokio::test]
    async fn test_colliding_queries_share_one_file() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        mount_song(&server, "Song A", 1, "Song A", "Artist A").await;
        mount_song(&server, "Song A live", 1, "Song A", "Artist A").await;
        mount_payload(&server, 1, 1).await;
        let dest = TempDir::new().unwrap();

        let report = engine_for(&server, fast_options())
            .run(
                &["Song A".to_string(), "Song A live".to_string()],
                dest.path(),
                &TracingObserver,
            )
            .await
            .unwrap();

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.collisions, 1);
        assert_eq!(report.fetched, 1);
    }

    #[tokio::test]
    async fn test_existing_lyrics_are_preserved() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        mount_song(&server, "Song A", 1, "Song A", "Artist A").await;
        mount_payload(&server, 1, 1).await;
        let dest = TempDir::new().unwrap();
        let lrc = dest.path().join("Song A - Artist A.lrc");
        std::fs::write(&lrc, "hand edited").unwrap();

        let report = engine_for(&server, fast_options())
            .run(&["Song A".to_string()], dest.path(), &TracingObserver)
            .await
            .unwrap();

        assert_eq!(report.lyrics_written, 0);
        assert_eq!(std::fs::read_to_string(&lrc).unwrap(), "hand edited");
        assert!(report.expected.contains(&lrc));
    }

    #[tokio::test]
    async fn test_empty_manifest_prunes_everything() {
        let dest = TempDir::new().unwrap();
        std::fs::write(dest.path().join("old.mp3"), b"stale").unwrap();
        let engine = SyncEngine::new(&CatalogConfig::default(), fast_options()).unwrap();

        let report = engine.run(&[], dest.path(), &TracingObserver).await.unwrap();

        assert_eq!(report.verdict(), RunVerdict::Success);
        assert_eq!(report.pruned(), 1);
        assert!(!dest.path().join("old.mp3").exists());
    }

    #[tokio::test]
    async fn test_destination_is_created() {
        let root = TempDir::new().unwrap();
        let dest = root.path().join("nested").join("music");
        let engine = SyncEngine::new(&CatalogConfig::default(), fast_options()).unwrap();

        let report = engine.run(&[], &dest, &TracingObserver).await.unwrap();

        assert!(dest.is_dir());
        assert!(report.dest.is_absolute());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_between_queries() {
        let dest = TempDir::new().unwrap();
        let options = SyncOptions {
            query_pause: Duration::from_secs(2),
            ..fast_options()
        };
        let engine = SyncEngine::new(&CatalogConfig::default(), options).unwrap();
        let queries: Vec<String> = vec![" - ".into(), "/".into(), "|".into()];

        let start = tokio::time::Instant::now();
        let report = engine.run(&queries, dest.path(), &TracingObserver).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(4));
        assert_eq!(report.failed(), 3);
    }
}
