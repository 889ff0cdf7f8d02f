//! Error types for manifest loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("cannot read manifest {path}: {source}\n  Suggestion: check the path and that the file is UTF-8 text")]
    Read {
        /// Path that was requested.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// An unknown manifest format name was given.
    #[error("unknown manifest format '{name}'\n  Suggestion: use one of auto, plain, table")]
    UnknownFormat {
        /// The rejected name.
        name: String,
    },
}

impl ManifestError {
    /// Creates a read error.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}
