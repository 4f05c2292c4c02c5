//! One partitioning pass of a [`Source`] through a [`SplitStrategy`].
//!
//! Shard paths are fixed at construction. Output directories are used round-robin and
//! each shard is named `{source name}_{n}` with `n` counting from 1 and whitespace or path
//! separators in the name replaced by `_`:
//!
//! ```text
//! dirs = [/a, /b], name = "web logs", N = 3
//!   -> /a/web_logs_1, /b/web_logs_2, /a/web_logs_3
//! ```
//!
//! A partitioner runs at most once. A second [`run`](Partitioner::run) fails with
//! [`ShuffleError::InvalidState`] and writes nothing.

use crate::cancel::CancellationToken;
use crate::dead_letter::{DeadLetterSink, DropCounters, DropRecorder, Stage};
use crate::error::{IoContext, Result, ShuffleError};
use crate::io::lines::LineReader;
use crate::observe::{SharedSink, ShuffleEvent, default_sink};
use crate::record::{DEFAULT_DELIMITER, Record};
use crate::source::{Medium, RecordFn, Source, TransformError};
use crate::split::{RecordOutcome, SplitStrategy, Splitter};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lifecycle of a [`Partitioner`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionState {
    Pending,
    Invoked,
}

/// Summary of a finished partitioning pass.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PartitionReport {
    pub source: String,
    pub strategy: String,
    pub shard_paths: Vec<PathBuf>,
    /// Records read from the medium, before the source transform.
    pub source_records: u64,
    /// Records delivered by the source to the partitioner.
    pub records_in: u64,
    pub records_written: u64,
    pub shard_lines: Vec<u64>,
    pub shard_bytes: Vec<u64>,
    /// Drops inside the source (transform failures).
    pub source_drops: DropCounters,
    /// Drops inside the partitioner (line handler, key extraction, unsupported shape).
    pub partition_drops: DropCounters,
}

impl PartitionReport {
    #[must_use]
    pub fn total_dropped(&self) -> u64 {
        self.source_drops.total() + self.partition_drops.total()
    }

    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Replace whitespace and path separators so the name is usable as a file name prefix.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_whitespace() || c == '/' || c == '\\' {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Compute `count` shard paths over `dirs`, round-robin.
#[must_use]
pub fn shard_paths_for(name: &str, dirs: &[PathBuf], count: usize) -> Vec<PathBuf> {
    let name = sanitize_name(name);
    dirs.iter()
        .cycle()
        .take(count)
        .enumerate()
        .map(|(i, dir)| dir.join(format!("{name}_{}", i + 1)))
        .collect()
}

pub struct Partitioner<M, S> {
    source: Source<M>,
    strategy: Option<S>,
    delimiter: String,
    output_dirs: Vec<PathBuf>,
    shard_paths: Vec<PathBuf>,
    line_handler: Option<RecordFn>,
    state: PartitionState,
    events: SharedSink,
    drops: DropRecorder,
    cancel: CancellationToken,
    report: Option<PartitionReport>,
}

impl<M: Medium, S: SplitStrategy> Partitioner<M, S> {
    /// Prepare a pass of `source` into `shard_count` shards spread over `output_dirs`.
    ///
    /// Output directories are created if missing. The partitioner shares the source's
    /// cancellation token unless [`with_cancellation`](Self::with_cancellation) is used.
    ///
    /// # Errors
    /// Returns [`ShuffleError::Configuration`] if `shard_count` is zero or no output
    /// directory is given, and an I/O error if a directory cannot be created.
    pub fn new<P: AsRef<Path>>(
        source: Source<M>,
        shard_count: usize,
        output_dirs: &[P],
        strategy: S,
    ) -> Result<Self> {
        if shard_count == 0 {
            return Err(ShuffleError::Configuration(
                "shard count must be at least 1".into(),
            ));
        }
        if output_dirs.is_empty() {
            return Err(ShuffleError::Configuration(
                "at least one output directory is required".into(),
            ));
        }
        let output_dirs: Vec<PathBuf> = output_dirs.iter().map(|p| p.as_ref().to_path_buf()).collect();
        for dir in &output_dirs {
            create_dir_all(dir).with_path("mkdir -p", dir)?;
        }
        let shard_paths = shard_paths_for(source.name(), &output_dirs, shard_count);
        let events = default_sink();
        let cancel = source.cancellation().clone();
        Ok(Self {
            source,
            strategy: Some(strategy),
            delimiter: DEFAULT_DELIMITER.to_string(),
            output_dirs,
            shard_paths,
            line_handler: None,
            state: PartitionState::Pending,
            drops: DropRecorder::new(Arc::clone(&events), None),
            events,
            cancel,
            report: None,
        })
    }

    /// Delimiter for [`Record::Fields`] lines (default NUL).
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Transform applied to each record before assignment. Failures drop the record;
    /// [`TransformError::Cancelled`] aborts the pass.
    #[must_use]
    pub fn with_line_handler<F>(mut self, f: F) -> Self
    where
        F: FnMut(Record) -> std::result::Result<Record, TransformError> + Send + 'static,
    {
        self.line_handler = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: SharedSink) -> Self {
        self.drops.set_events(Arc::clone(&events));
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_dead_letters(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.drops.set_dead_letters(sink);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shard_paths.len()
    }

    /// Final shard paths, in shard index order.
    #[must_use]
    pub fn shard_paths(&self) -> &[PathBuf] {
        &self.shard_paths
    }

    #[must_use]
    pub fn output_dirs(&self) -> &[PathBuf] {
        &self.output_dirs
    }

    #[must_use]
    pub fn state(&self) -> PartitionState {
        self.state
    }

    #[must_use]
    pub fn source(&self) -> &Source<M> {
        &self.source
    }

    /// The report of the finished pass, if it completed.
    #[must_use]
    pub fn report(&self) -> Option<&PartitionReport> {
        self.report.as_ref()
    }

    /// Drive the source through the strategy once and flush every shard.
    ///
    /// The partitioner counts as invoked as soon as this is called, even if the pass fails.
    ///
    /// # Errors
    /// Returns [`ShuffleError::InvalidState`] on a second call, [`ShuffleError::Cancelled`]
    /// on cancellation, and I/O or dead-letter errors. Per-record failures do not error.
    pub fn run(&mut self) -> Result<PartitionReport> {
        if self.state == PartitionState::Invoked {
            return Err(ShuffleError::InvalidState(format!(
                "partitioner for {} already invoked",
                self.source.name()
            )));
        }
        self.state = PartitionState::Invoked;

        let Some(strategy) = self.strategy.take() else {
            return Err(ShuffleError::InvalidState("strategy already consumed".into()));
        };
        let mut splitter = Splitter::new(strategy, self.delimiter.clone());
        splitter.init(&self.shard_paths)?;
        self.events.emit(&ShuffleEvent::PartitionStarted {
            source: self.source.name().to_string(),
            shards: self.shard_paths.len(),
        });

        let mut records_in = 0u64;
        let mut written = 0u64;
        while let Some(record) = self.source.next() {
            self.cancel.check()?;
            let record = record?;
            records_in += 1;

            let record = match self.line_handler.as_mut() {
                None => record,
                Some(handler) => {
                    let preview = record.preview();
                    match handler(record) {
                        Ok(r) => r,
                        Err(e) => {
                            let Some(reason) = e.drop_reason() else {
                                return Err(ShuffleError::Cancelled);
                            };
                            self.drops
                                .drop_record(Stage::Partition, reason, preview, e.to_string())?;
                            continue;
                        }
                    }
                }
            };

            match splitter.split(&record)? {
                RecordOutcome::Written { .. } => written += 1,
                RecordOutcome::Dropped { reason, detail } => {
                    self.drops
                        .drop_record(Stage::Partition, reason, record.preview(), detail)?;
                }
            }
        }
        splitter.flush()?;

        let report = PartitionReport {
            source: self.source.name().to_string(),
            strategy: splitter.strategy().describe(),
            shard_paths: self.shard_paths.clone(),
            source_records: self.source.current_length(),
            records_in,
            records_written: written,
            shard_lines: splitter.writers().lines_written().to_vec(),
            shard_bytes: splitter.writers().bytes_written().to_vec(),
            source_drops: self.source.drops(),
            partition_drops: self.drops.counters,
        };
        self.events.emit(&ShuffleEvent::PartitionFinished {
            source: report.source.clone(),
            written,
            dropped: report.total_dropped(),
        });
        splitter.close()?;
        self.report = Some(report.clone());
        Ok(report)
    }

    /// Re-read every shard line, in shard order, without any processing.
    ///
    /// # Errors
    /// Returns [`ShuffleError::InvalidState`] before [`run`](Self::run).
    pub fn read_back(&self) -> Result<ReadBack> {
        if self.state != PartitionState::Invoked {
            return Err(ShuffleError::InvalidState(
                "read_back before the partitioner was invoked".into(),
            ));
        }
        Ok(ReadBack::new(self.shard_paths.clone()))
    }
}

/// Sequential reader over the lines of several files.
pub struct ReadBack {
    pending: VecDeque<PathBuf>,
    current: Option<LineReader>,
}

impl ReadBack {
    #[must_use]
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            pending: paths.into(),
            current: None,
        }
    }
}

impl Iterator for ReadBack {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                let path = self.pending.pop_front()?;
                match LineReader::open(&path) {
                    Ok(r) => self.current = Some(r),
                    Err(e) => return Some(Err(e)),
                }
            }
            let reader = self.current.as_mut()?;
            match reader.next() {
                Some(Ok((line, _))) => return Some(Ok(line)),
                Some(Err(e)) => return Some(Err(e)),
                None => self.current = None,
            }
        }
    }
}
