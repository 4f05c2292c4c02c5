//! Error taxonomy for the shuffle engine.
//!
//! Per-record failures ([`ShuffleError::UnsupportedRecordShape`],
//! [`ShuffleError::KeyExtraction`]) are recovered by the component that observes them: the
//! record is dropped, counted and optionally dead-lettered. Every other variant aborts the
//! operation that produced it. [`ShuffleError::Cancelled`] is never recovered.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ShuffleError>;

#[derive(Error, Debug)]
pub enum ShuffleError {
    /// A required configuration field is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The record's shape cannot be written to the line format.
    #[error("unsupported record shape: {0}")]
    UnsupportedRecordShape(String),

    /// The key function failed on a record or line.
    #[error("key extraction failed: {0}")]
    KeyExtraction(String),

    /// A configured input path does not exist.
    #[error("input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// The operation is not valid in the component's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The run was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,

    /// A shard does not fit into the configured memory budget.
    #[error("shard {} is {size} bytes, exceeding the memory budget of {budget} bytes", .path.display())]
    ShardTooLarge { path: PathBuf, size: u64, budget: u64 },

    #[error("{context} {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShuffleError {
    /// Attach a path and a short verb to an I/O error.
    pub fn io(context: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether this error is recovered per record rather than aborting the run.
    #[must_use]
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedRecordShape(_) | Self::KeyExtraction(_)
        )
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Extension for attaching path context to `io::Result`, in the spirit of
/// `anyhow::Context`.
pub(crate) trait IoContext<T> {
    fn with_path(self, context: &'static str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn with_path(self, context: &'static str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| ShuffleError::io(context, path, e))
    }
}
