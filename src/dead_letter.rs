//! Per-record drop accounting and dead-letter sinks.
//!
//! A record that cannot be processed is dropped without aborting the pass. Each drop is
//!
//! - counted per [`DropReason`] in [`DropCounters`],
//! - reported as a [`ShuffleEvent::RecordDropped`] event,
//! - and, if configured, appended to a [`DeadLetterSink`] so the loss is auditable.
//!
//! # Example
//!
//! ```no_run
//! use ironshuffle::dead_letter::{JsonlDeadLetters, MemoryDeadLetters};
//! use std::sync::Arc;
//!
//! # fn main() -> ironshuffle::Result<()> {
//! // Keep dropped records in memory...
//! let in_memory = Arc::new(MemoryDeadLetters::new());
//! // ...or append them to a JSONL file.
//! let on_disk = Arc::new(JsonlDeadLetters::create("/tmp/shuffle/dead_letters.jsonl")?);
//! # Ok(())
//! # }
//! ```

use crate::error::{IoContext, Result};
use crate::observe::{SharedSink, ShuffleEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Where in the shuffle a record was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Source,
    Partition,
    Sort,
    Merge,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Source => "source",
            Self::Partition => "partition",
            Self::Sort => "sort",
            Self::Merge => "merge",
        })
    }
}

/// Why a record was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// A transform expected a different record shape or arity.
    ShapeMismatch,
    /// A transform failed for any other reason.
    TransformFailed,
    /// The record has no line encoding.
    UnsupportedShape,
    /// The key function failed.
    KeyExtraction,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ShapeMismatch => "shape_mismatch",
            Self::TransformFailed => "transform_failed",
            Self::UnsupportedShape => "unsupported_shape",
            Self::KeyExtraction => "key_extraction",
        })
    }
}

/// Number of dropped records per reason.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCounters {
    pub shape_mismatch: u64,
    pub transform_failed: u64,
    pub unsupported_shape: u64,
    pub key_extraction: u64,
}

impl DropCounters {
    pub fn increment(&mut self, reason: DropReason) {
        match reason {
            DropReason::ShapeMismatch => self.shape_mismatch += 1,
            DropReason::TransformFailed => self.transform_failed += 1,
            DropReason::UnsupportedShape => self.unsupported_shape += 1,
            DropReason::KeyExtraction => self.key_extraction += 1,
        }
    }

    #[must_use]
    pub fn get(&self, reason: DropReason) -> u64 {
        match reason {
            DropReason::ShapeMismatch => self.shape_mismatch,
            DropReason::TransformFailed => self.transform_failed,
            DropReason::UnsupportedShape => self.unsupported_shape,
            DropReason::KeyExtraction => self.key_extraction,
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.shape_mismatch + self.transform_failed + self.unsupported_shape + self.key_extraction
    }

    /// Add another set of counters into this one.
    pub fn merge(&mut self, other: &Self) {
        self.shape_mismatch += other.shape_mismatch;
        self.transform_failed += other.transform_failed;
        self.unsupported_shape += other.unsupported_shape;
        self.key_extraction += other.key_extraction;
    }

    /// Counters as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "shape_mismatch": self.shape_mismatch,
            "transform_failed": self.transform_failed,
            "unsupported_shape": self.unsupported_shape,
            "key_extraction": self.key_extraction,
            "total": self.total(),
        })
    }
}

/// One dropped record, as handed to a [`DeadLetterSink`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub stage: Stage,
    pub reason: DropReason,
    /// Rendering of the dropped record (see [`Record::preview`](crate::Record::preview)).
    pub record: String,
    /// The error that caused the drop.
    pub detail: String,
}

/// Destination for dropped records.
pub trait DeadLetterSink: Send + Sync {
    /// Persist one dead letter.
    ///
    /// # Errors
    /// A failing sink aborts the pass; losing the audit trail is not a per-record failure.
    fn record(&self, letter: &DeadLetter) -> Result<()>;
}

/// Keeps dead letters in memory.
#[derive(Debug, Default)]
pub struct MemoryDeadLetters {
    letters: Mutex<Vec<DeadLetter>>,
}

impl MemoryDeadLetters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.letters.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeadLetterSink for MemoryDeadLetters {
    fn record(&self, letter: &DeadLetter) -> Result<()> {
        self.letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(letter.clone());
        Ok(())
    }
}

/// Appends dead letters to a JSONL file, one object per line.
pub struct JsonlDeadLetters {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlDeadLetters {
    /// Create (truncate) the file, creating parent directories as needed.
    ///
    /// # Errors
    /// Returns an I/O error if the directory or file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent).with_path("mkdir -p", parent)?;
        }
        let f = File::create(&path).with_path("create", &path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(f)),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeadLetterSink for JsonlDeadLetters {
    fn record(&self, letter: &DeadLetter) -> Result<()> {
        let mut w = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_writer(&mut *w, letter)?;
        w.write_all(b"\n").with_path("write", &self.path)?;
        // flush per letter: a dead-letter file must survive an aborted run
        w.flush().with_path("flush", &self.path)
    }
}

/// Bookkeeping shared by the components that drop records.
#[derive(Clone)]
pub(crate) struct DropRecorder {
    pub(crate) counters: DropCounters,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    events: SharedSink,
}

impl DropRecorder {
    pub(crate) fn new(
        events: SharedSink,
        dead_letters: Option<Arc<dyn DeadLetterSink>>,
    ) -> Self {
        Self {
            counters: DropCounters::default(),
            dead_letters,
            events,
        }
    }

    pub(crate) fn set_events(&mut self, events: SharedSink) {
        self.events = events;
    }

    pub(crate) fn set_dead_letters(&mut self, sink: Arc<dyn DeadLetterSink>) {
        self.dead_letters = Some(sink);
    }

    pub(crate) fn drop_record(
        &mut self,
        stage: Stage,
        reason: DropReason,
        record: String,
        detail: String,
    ) -> Result<()> {
        self.counters.increment(reason);
        self.events.emit(&ShuffleEvent::RecordDropped {
            stage,
            reason,
            record: record.clone(),
            detail: detail.clone(),
        });
        if let Some(sink) = &self.dead_letters {
            sink.record(&DeadLetter {
                stage,
                reason,
                record,
                detail,
            })?;
        }
        Ok(())
    }
}
