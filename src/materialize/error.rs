//! Error types for the materialize module.

use std::path::PathBuf;

use thiserror::Error;

use crate::retry::{RetryClass, Retryable};
use crate::transport::TransportError;

/// Errors that can occur while putting an artifact on disk.
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// The payload request or its body stream failed.
    #[error("fetch for {path} failed: {source}")]
    Transport {
        /// Target path of the artifact.
        path: PathBuf,
        /// The transport failure.
        #[source]
        source: TransportError,
    },

    /// The body ended before the advertised length was received.
    #[error(
        "incomplete download for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Target path of the artifact.
        path: PathBuf,
        /// Advertised size in bytes.
        expected_bytes: u64,
        /// Received size in bytes.
        actual_bytes: u64,
    },

    /// File system error (create, write, flush, rename).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl MaterializeError {
    /// Creates a transport error.
    pub fn transport(path: impl Into<PathBuf>, source: TransportError) -> Self {
        Self::Transport {
            path: path.into(),
            source,
        }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Write failures are fatal for the artifact; transport failures keep their own class.
impl Retryable for MaterializeError {
    fn retry_class(&self) -> RetryClass {
        match self {
            Self::Transport { source, .. } => source.retry_class(),
            Self::Integrity { .. } => RetryClass::Transient,
            Self::Io { .. } => RetryClass::Fatal,
        }
    }
}
