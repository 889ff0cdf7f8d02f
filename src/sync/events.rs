//! Progress events emitted by a sync run.

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

/// Stage at which a query failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// Search or location lookup.
    Resolve,
    /// Title and author sanitized to nothing.
    Naming,
    /// Payload download or write.
    Payload,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resolve => "resolve",
            Self::Naming => "naming",
            Self::Payload => "payload",
        })
    }
}

/// Why the cleanup pass did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneSkip {
    /// Pruning was turned off.
    Disabled,
    /// A non-empty manifest produced no successful query.
    NoSuccesses,
}

/// One observable step of a run. `index` is zero-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The destination is ready and the loop is about to start.
    RunStarted {
        /// Number of queries in the manifest.
        total: usize,
        /// Absolute destination directory.
        dest: PathBuf,
    },
    /// A query is about to be resolved.
    QueryStarted {
        /// Position in the manifest.
        index: usize,
        /// Number of queries in the manifest.
        total: usize,
        /// The query text as written in the manifest.
        query: String,
    },
    /// The catalog produced a match and a payload location.
    Resolved {
        /// Position in the manifest.
        index: usize,
        /// Catalog identifier.
        identifier: String,
        /// Song title.
        title: String,
        /// Performing artist.
        author: String,
    },
    /// The payload file is on disk.
    PayloadReady {
        /// Position in the manifest.
        index: usize,
        /// Payload path.
        path: PathBuf,
        /// True when it was downloaded in this run.
        fetched: bool,
    },
    /// A second query mapped onto a path an earlier query already produced.
    Collision {
        /// Position in the manifest.
        index: usize,
        /// The shared payload path.
        path: PathBuf,
    },
    /// A lyric file is on disk.
    TextSaved {
        /// Position in the manifest.
        index: usize,
        /// Lyric file path.
        path: PathBuf,
        /// True when an existing file was kept as-is.
        preserved: bool,
    },
    /// A lyric file could not be written. The query still succeeds.
    TextFailed {
        /// Position in the manifest.
        index: usize,
        /// Lyric file path.
        path: PathBuf,
        /// Error text.
        reason: String,
    },
    /// The query failed and contributes nothing to the expected set.
    QueryFailed {
        /// Position in the manifest.
        index: usize,
        /// The query text.
        query: String,
        /// Where it failed.
        stage: FailureStage,
        /// Error text.
        reason: String,
    },
    /// Processing of a query ended.
    QueryFinished {
        /// Position in the manifest.
        index: usize,
        /// Whether its payload is in the expected set.
        succeeded: bool,
    },
    /// The cleanup pass did not run.
    PruneSkipped {
        /// Why it was skipped.
        reason: PruneSkip,
    },
    /// The destination could not be listed for cleanup.
    PruneFailed {
        /// Error text.
        reason: String,
    },
    /// The cleanup pass finished.
    Reconciled {
        /// Files removed.
        deleted: usize,
        /// Files that could not be removed.
        failed: usize,
        /// Files left in place.
        kept: usize,
    },
    /// The run is over.
    RunFinished {
        /// Queries whose payload is present.
        succeeded: usize,
        /// Queries that failed.
        failed: usize,
        /// Files removed by the cleanup pass.
        pruned: usize,
    },
}

/// Receives [`SyncEvent`]s as a run progresses.
pub trait SyncObserver: Send + Sync {
    /// Called synchronously from the run loop.
    fn on_event(&self, event: &SyncEvent);
}

/// Writes every event as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::RunStarted { total, dest } => {
                info!(total, dest = %dest.display(), "sync started");
            }
            SyncEvent::QueryStarted {
                index,
                total,
                query,
            } => info!(n = index + 1, total, query = %query, "processing"),
            SyncEvent::Resolved {
                identifier,
                title,
                author,
                ..
            } => debug!(id = %identifier, title = %title, author = %author, "resolved"),
            SyncEvent::PayloadReady { path, fetched, .. } => {
                if *fetched {
                    info!(path = %path.display(), "downloaded");
                } else {
                    info!(path = %path.display(), "already present");
                }
            }
            SyncEvent::Collision { path, .. } => warn!(
                path = %path.display(),
                "query maps onto a file another query already produced"
            ),
            SyncEvent::TextSaved {
                path, preserved, ..
            } => debug!(path = %path.display(), preserved, "lyrics ready"),
            SyncEvent::TextFailed { path, reason, .. } => {
                warn!(path = %path.display(), reason = %reason, "lyrics not saved");
            }
            SyncEvent::QueryFailed {
                query,
                stage,
                reason,
                ..
            } => warn!(query = %query, stage = %stage, reason = %reason, "query failed"),
            SyncEvent::QueryFinished { .. } => {}
            SyncEvent::PruneSkipped { reason } => match reason {
                PruneSkip::Disabled => debug!("pruning disabled"),
                PruneSkip::NoSuccesses => {
                    warn!("no query succeeded; leaving destination directory untouched");
                }
            },
            SyncEvent::PruneFailed { reason } => warn!(reason = %reason, "cleanup skipped"),
            SyncEvent::Reconciled {
                deleted,
                failed,
                kept,
            } => info!(deleted, failed, kept, "destination reconciled"),
            SyncEvent::RunFinished {
                succeeded,
                failed,
                pruned,
            } => info!(succeeded, failed, pruned, "sync finished"),
        }
    }
}

/// Collects events in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingObserver {
    pub(crate) events: std::sync::Mutex<Vec<SyncEvent>>,
}

#[cfg(test)]
impl SyncObserver for RecordingObserver {
    fn on_event(&self, event: &SyncEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
