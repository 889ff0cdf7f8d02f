//! Idempotent placement of payload and lyric files on disk.
//!
//! A target that already exists is never fetched again. New payloads are
//! streamed into `<name>.part` next to the target and renamed into place only
//! after the body is complete and flushed, so an interrupted run leaves at
//! most a `.part` file behind.

mod error;

pub use error::MaterializeError;

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use crate::catalog::PayloadLocation;
use crate::retry::{RetryError, RetryExecutor};
use crate::transport::{HttpClient, TransportError};

/// Suffix of in-progress downloads.
pub const PARTIAL_SUFFIX: &str = "part";

/// How an already-present payload is trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExistingPolicy {
    /// Existence alone satisfies the artifact.
    #[default]
    TrustPresence,
    /// Compare the local size against the server's `Content-Length` and
    /// re-fetch on mismatch. A failed HEAD falls back to trusting presence.
    VerifyLength,
}

/// Successful payload materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    /// The file was already on disk; no payload request was made.
    AlreadyPresent {
        /// Local path of the artifact.
        path: PathBuf,
    },
    /// The file was downloaded in this call.
    Fetched {
        /// Local path of the artifact.
        path: PathBuf,
        /// Bytes written.
        bytes: u64,
    },
}

impl Materialized {
    /// Local path of the artifact.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::AlreadyPresent { path } | Self::Fetched { path, .. } => path,
        }
    }

    /// Returns true when a download happened.
    #[must_use]
    pub fn was_fetched(&self) -> bool {
        matches!(self, Self::Fetched { .. })
    }
}

/// Result of writing an auxiliary text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextOutcome {
    /// The content was written to the path.
    Written(PathBuf),
    /// The file already existed and was left untouched.
    Preserved(PathBuf),
    /// The content was blank; no file was created.
    Skipped,
}

impl TextOutcome {
    /// Path that now exists on disk, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Written(path) | Self::Preserved(path) => Some(path),
            Self::Skipped => None,
        }
    }
}

/// Writes artifacts into the destination directory.
#[derive(Debug, Clone)]
pub struct Materializer {
    client: HttpClient,
    retry: RetryExecutor,
    existing_policy: ExistingPolicy,
}

impl Materializer {
    /// Creates a materializer sharing the run's HTTP client.
    #[must_use]
    pub fn new(client: HttpClient, retry: RetryExecutor, existing_policy: ExistingPolicy) -> Self {
        Self {
            client,
            retry,
            existing_policy,
        }
    }

    /// Ensures `path` holds the payload at `location`.
    ///
    /// # Errors
    ///
    /// Returns the retry outcome of the last failed attempt. Write failures
    /// stop after one attempt.
    #[instrument(skip(self, location), fields(url = %location.url(), path = %path.display()))]
    pub async fn materialize(
        &self,
        location: &PayloadLocation,
        path: &Path,
    ) -> Result<Materialized, RetryError<MaterializeError>> {
        if let Some(local_len) = existing_file_len(path).await {
            if self.existing_satisfies(location, local_len).await {
                debug!(bytes = local_len, "payload already present, skipping fetch");
                return Ok(Materialized::AlreadyPresent {
                    path: path.to_path_buf(),
                });
            }
            info!(bytes = local_len, "local payload size differs from server, re-fetching");
        }

        let label = format!("fetch {}", path.display());
        let bytes = self
            .retry
            .run(&label, || self.fetch_once(location, path))
            .await?;

        info!(bytes, "payload saved");
        Ok(Materialized::Fetched {
            path: path.to_path_buf(),
            bytes,
        })
    }

    /// Writes `content` to `path` unless the file exists or the content is blank.
    ///
    /// # Errors
    ///
    /// Returns [`MaterializeError::Io`] when the file cannot be written.
    #[instrument(skip(self, content), fields(path = %path.display()))]
    pub async fn materialize_text(
        &self,
        content: &str,
        path: &Path,
    ) -> Result<TextOutcome, MaterializeError> {
        if existing_file_len(path).await.is_some() {
            debug!("text file already present, preserving");
            return Ok(TextOutcome::Preserved(path.to_path_buf()));
        }
        if content.trim().is_empty() {
            debug!("blank text content, nothing to write");
            return Ok(TextOutcome::Skipped);
        }

        let partial = partial_path(path);
        ensure_parent(path).await?;
        if let Err(error) = write_text_then_rename(content, &partial, path).await {
            remove_partial(&partial).await;
            return Err(error);
        }

        debug!(bytes = content.len(), "text file written");
        Ok(TextOutcome::Written(path.to_path_buf()))
    }

    async fn existing_satisfies(&self, location: &PayloadLocation, local_len: u64) -> bool {
        if self.existing_policy == ExistingPolicy::TrustPresence {
            return true;
        }
        match self.client.head_length(location.url(), location.access()).await {
            Ok(Some(remote_len)) => remote_len == local_len,
            Ok(None) => {
                debug!("server did not report Content-Length, trusting local file");
                true
            }
            Err(error) => {
                warn!(error = %error, "HEAD failed, trusting local file");
                true
            }
        }
    }

    async fn fetch_once(
        &self,
        location: &PayloadLocation,
        path: &Path,
    ) -> Result<u64, MaterializeError> {
        ensure_parent(path).await?;
        let url = location.url();
        let response = self
            .client
            .get_stream(url, location.access())
            .await
            .map_err(|e| MaterializeError::transport(path, e))?;
        let expected_len = response.content_length();

        let partial = partial_path(path);
        let result = stream_then_rename(response, url, &partial, path, expected_len).await;
        if result.is_err() {
            debug!(path = %partial.display(), "cleaning up partial file after error");
            remove_partial(&partial).await;
        }
        result
    }
}

async fn stream_then_rename(
    response: reqwest::Response,
    url: &str,
    partial: &Path,
    target: &Path,
    expected_len: Option<u64>,
) -> Result<u64, MaterializeError> {
    let file = File::create(partial)
        .await
        .map_err(|e| MaterializeError::io(partial, e))?;
    let bytes = stream_to_file(file, response, url, partial, target).await?;
    if let Some(expected) = expected_len
        && expected != bytes
    {
        return Err(MaterializeError::integrity(target, expected, bytes));
    }
    tokio::fs::rename(partial, target)
        .await
        .map_err(|e| MaterializeError::io(target, e))?;
    Ok(bytes)
}

async fn write_text_then_rename(
    content: &str,
    partial: &Path,
    target: &Path,
) -> Result<(), MaterializeError> {
    tokio::fs::write(partial, content.as_bytes())
        .await
        .map_err(|e| MaterializeError::io(partial, e))?;
    tokio::fs::rename(partial, target)
        .await
        .map_err(|e| MaterializeError::io(target, e))
}

/// Streams the response body into `file`, returning bytes written.
async fn stream_to_file(
    file: File,
    response: reqwest::Response,
    url: &str,
    partial: &Path,
    target: &Path,
) -> Result<u64, MaterializeError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result
            .map_err(|e| MaterializeError::transport(target, TransportError::connection(url, e)))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| MaterializeError::io(partial, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| MaterializeError::io(partial, e))?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(|e| MaterializeError::io(partial, e))?;

    Ok(bytes_written)
}

/// `dir/name.ext` becomes `dir/name.ext.part`.
#[must_use]
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

async fn existing_file_len(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

async fn ensure_parent(path: &Path) -> Result<(), MaterializeError> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| MaterializeError::io(parent, e))
}

async fn remove_partial(partial: &Path) {
    if let Err(error) = tokio::fs::remove_file(partial).await
        && error.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %partial.display(), error = %error, "could not remove partial file");
    }
}
