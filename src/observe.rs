//! Structured observability for shuffle components.
//!
//! Components never log through a process-wide logger. Each one is handed an
//! [`EventSink`] at construction and reports [`ShuffleEvent`]s into it:
//!
//! - [`TracingSink`] (the default) forwards events to `tracing` with structured fields
//! - [`MemorySink`] keeps events in memory, mainly for tests
//! - [`NullSink`] discards everything

use crate::dead_letter::{DropReason, Stage};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Something a shuffle component wants to report.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ShuffleEvent {
    /// Emitted periodically while a source is iterated.
    SourceProgress {
        source: String,
        length: u64,
        size: u64,
        percent: Option<f64>,
    },
    /// The source ran out of records.
    SourceExhausted {
        source: String,
        length: u64,
        size: u64,
        percent: Option<f64>,
    },
    /// A record was dropped without aborting the pass.
    RecordDropped {
        stage: Stage,
        reason: DropReason,
        record: String,
        detail: String,
    },
    PartitionStarted {
        source: String,
        shards: usize,
    },
    PartitionFinished {
        source: String,
        written: u64,
        dropped: u64,
    },
    /// One shard was sorted and written to its `.sorted` path.
    ShardSorted {
        path: PathBuf,
        sorted_path: PathBuf,
        lines: u64,
        bytes: u64,
    },
    SortFinished {
        shards: usize,
        total_lines: u64,
        total_bytes: u64,
        workers: usize,
    },
    /// Emitted every fixed batch of merged records.
    MergeProgress {
        emitted: u64,
        percent: Option<f64>,
    },
    MergeFinished {
        emitted: u64,
        total_lines: u64,
        total_bytes: u64,
    },
}

/// Destination for [`ShuffleEvent`]s.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ShuffleEvent);
}

/// Shared handle to an event sink, as stored by components.
pub type SharedSink = Arc<dyn EventSink>;

/// The default sink: a [`TracingSink`].
#[must_use]
pub fn default_sink() -> SharedSink {
    Arc::new(TracingSink)
}

/// Forwards events to `tracing`. Drops are `warn`, phase boundaries are `info`, progress is
/// `debug`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &ShuffleEvent) {
        match event {
            ShuffleEvent::SourceProgress {
                source,
                length,
                size,
                percent,
            } => tracing::debug!(source = %source, length, size, ?percent, "iterating source"),
            ShuffleEvent::SourceExhausted {
                source,
                length,
                size,
                percent,
            } => tracing::debug!(source = %source, length, size, ?percent, "source exhausted"),
            ShuffleEvent::RecordDropped {
                stage,
                reason,
                record,
                detail,
            } => tracing::warn!(%stage, %reason, record = %record, detail = %detail, "record dropped"),
            ShuffleEvent::PartitionStarted { source, shards } => {
                tracing::info!(source = %source, shards, "partitioning started");
            }
            ShuffleEvent::PartitionFinished {
                source,
                written,
                dropped,
            } => tracing::info!(source = %source, written, dropped, "partitioning finished"),
            ShuffleEvent::ShardSorted {
                path,
                sorted_path,
                lines,
                bytes,
            } => tracing::debug!(
                path = %path.display(),
                sorted = %sorted_path.display(),
                lines,
                bytes,
                "shard sorted"
            ),
            ShuffleEvent::SortFinished {
                shards,
                total_lines,
                total_bytes,
                workers,
            } => tracing::info!(shards, total_lines, total_bytes, workers, "all shards sorted"),
            ShuffleEvent::MergeProgress { emitted, percent } => {
                tracing::debug!(emitted, ?percent, "merging");
            }
            ShuffleEvent::MergeFinished {
                emitted,
                total_lines,
                total_bytes,
            } => tracing::info!(emitted, total_lines, total_bytes, "merge exhausted"),
        }
    }
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &ShuffleEvent) {}
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ShuffleEvent>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A copy of every event seen so far.
    #[must_use]
    pub fn events(&self) -> Vec<ShuffleEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Count events matching a predicate.
    pub fn count_where(&self, pred: impl Fn(&ShuffleEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| pred(e))
            .count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &ShuffleEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
