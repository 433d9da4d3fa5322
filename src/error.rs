//! Error types shared across the imprint engine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that may occur while generating, serializing, parsing, or checking imprints.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A filesystem read/list/stat failure on a path the caller required to exist.
    #[error("i/o error at {path:?}: {source}")]
    Io {
        /// The path the operation was attempting to act on.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A path exists but is neither a regular file nor a directory.
    #[error("unsupported path: {0:?}")]
    UnsupportedPath(PathBuf),

    /// A path is empty, lacks a filename where one is required, or contains
    /// the `.datim` field delimiter.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The `.datim` header is missing a required field or names an unknown one.
    #[error("bad datim header: {0}")]
    BadHeader(String),

    /// A `.datim` record has the wrong field count or a malformed value.
    #[error("bad datim record at line {line}: {reason}")]
    BadRecord {
        /// 1-based line number within the file.
        line: u64,
        /// Human-readable description of what was malformed.
        reason: String,
    },

    /// An imprint row was encountered before any base-path row while rebasing was requested.
    #[error("imprint row at line {line} seen before any base-path row")]
    MissingBasePath {
        /// 1-based line number of the offending imprint row.
        line: u64,
    },

    /// A record or result consumer returned an error.
    #[error("consumer error: {0}")]
    ConsumerError(String),
}

impl Error {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
