//! Set-difference cleanup of the destination directory.
//!
//! Only regular files directly inside the directory are candidates;
//! subdirectories and their contents are never touched. Deletion is
//! best-effort: a file that cannot be removed is reported and the rest are
//! still processed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Paths a run intends to have present when it finishes.
///
/// Grows monotonically during a run; iteration order is sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedSet {
    paths: BTreeSet<PathBuf>,
}

impl ExpectedSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a path. Returns false when it was already present.
    pub fn insert(&mut self, path: impl Into<PathBuf>) -> bool {
        self.paths.insert(path.into())
    }

    /// Returns true when `path` is expected.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    /// Number of expected paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns true when nothing is expected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Iterates expected paths in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }
}

impl FromIterator<PathBuf> for ExpectedSet {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}

impl Extend<PathBuf> for ExpectedSet {
    fn extend<I: IntoIterator<Item = PathBuf>>(&mut self, iter: I) {
        self.paths.extend(iter);
    }
}

/// The destination directory could not be listed.
#[derive(Debug, Error)]
#[error("cannot list {dir}: {source}")]
pub struct ReconcileError {
    /// Directory that was being listed.
    pub dir: PathBuf,
    /// The underlying IO error.
    #[source]
    pub source: std::io::Error,
}

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Files removed.
    pub deleted: Vec<PathBuf>,
    /// Files that could not be removed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    /// Files left in place because they are expected.
    pub kept: usize,
}

/// Deletes files in a directory that are not in an [`ExpectedSet`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler;

impl Reconciler {
    /// Lists files in `dir` that are not expected, in sorted order.
    ///
    /// A missing directory yields an empty plan. Nothing is modified.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when the directory exists but cannot be read.
    #[instrument(skip(expected), fields(dir = %dir.display(), expected = expected.len()))]
    pub async fn plan(dir: &Path, expected: &ExpectedSet) -> Result<Vec<PathBuf>, ReconcileError> {
        let actual = list_files(dir).await?;
        let stale: Vec<PathBuf> = actual
            .into_iter()
            .filter(|path| !expected.contains(path))
            .collect();
        debug!(stale = stale.len(), "reconcile plan computed");
        Ok(stale)
    }

    /// Deletes every file in `dir` that is not expected.
    ///
    /// Per-file failures are logged and collected in the report.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when the directory exists but cannot be read.
    #[instrument(skip(expected), fields(dir = %dir.display(), expected = expected.len()))]
    pub async fn reconcile(
        dir: &Path,
        expected: &ExpectedSet,
    ) -> Result<ReconcileReport, ReconcileError> {
        let actual = list_files(dir).await?;
        let mut report = ReconcileReport::default();

        for path in actual {
            if expected.contains(&path) {
                report.kept += 1;
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    info!(path = %path.display(), "deleted stale file");
                    report.deleted.push(path);
                }
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "could not delete stale file");
                    report.failed.push((path, error.to_string()));
                }
            }
        }

        info!(
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            kept = report.kept,
            "reconcile complete"
        );
        Ok(report)
    }
}

/// Regular files directly inside `dir`, sorted. Symlinks to files count as files.
async fn list_files(dir: &Path) -> Result<BTreeSet<PathBuf>, ReconcileError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            debug!("destination directory missing, nothing to reconcile");
            return Ok(BTreeSet::new());
        }
        Err(source) => {
            return Err(ReconcileError {
                dir: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut files = BTreeSet::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(source) => {
                return Err(ReconcileError {
                    dir: dir.to_path_buf(),
                    source,
                });
            }
        };
        let path = entry.path();
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                files.insert(path);
            }
            Ok(_) => {}
            Err(error) => debug!(path = %path.display(), error = %error, "skipping unreadable entry"),
        }
    }
    Ok(files)
}
