//! Record sources with progress accounting.
//!
//! A [`Source`] streams records from a [`Medium`] exactly once. For every record it
//! advances `current_length` by one and `current_size` by the medium's size estimate, then
//! applies the optional per-record transform:
//!
//! - [`TransformError::ShapeMismatch`] and [`TransformError::Failed`] drop the record, which
//!   is counted, reported and optionally dead-lettered; iteration continues
//! - [`TransformError::Cancelled`] (or a cancelled [`CancellationToken`]) ends iteration with
//!   [`ShuffleError::Cancelled`]
//!
//! Two media are provided. [`FileMedium`] concatenates text files line by line and
//! [`StoreMedium`] wraps any record cursor whose store reports a record count and an
//! average record size.
//!
//! # Example
//!
//! ```no_run
//! use ironshuffle::source::{FileMedium, Source, TransformError};
//! use ironshuffle::Record;
//!
//! # fn main() -> ironshuffle::Result<()> {
//! let medium = FileMedium::open(["logs/a.txt", "logs/b.txt"])?;
//! let source = Source::new("access logs", medium).with_transform(|r: Record| {
//!     let line = r.as_scalar().unwrap_or_default().trim_end().to_string();
//!     let fields: Vec<String> = line.split(' ').map(str::to_string).collect();
//!     if fields.len() != 3 {
//!         return Err(TransformError::ShapeMismatch(format!("{} fields", fields.len())));
//!     }
//!     Ok(Record::Fields(fields))
//! });
//! for record in source {
//!     let _record = record?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::cancel::CancellationToken;
use crate::dead_letter::{DeadLetterSink, DropCounters, DropReason, DropRecorder, Stage};
use crate::error::{IoContext, Result, ShuffleError};
use crate::observe::{SharedSink, ShuffleEvent, default_sink};
use crate::record::Record;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Emit a progress event every this many records.
pub const DEFAULT_PROGRESS_EVERY: u64 = 100_000;

/// Failure of a per-record transform.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The transform expected a different shape or arity.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    /// Any other transform failure.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
    /// The caller asked to stop. Never swallowed.
    #[error("cancelled")]
    Cancelled,
}

impl TransformError {
    pub(crate) fn drop_reason(&self) -> Option<DropReason> {
        match self {
            Self::ShapeMismatch(_) => Some(DropReason::ShapeMismatch),
            Self::Failed(_) => Some(DropReason::TransformFailed),
            Self::Cancelled => None,
        }
    }
}

/// A per-record transform, used both by [`Source`] and by the partitioner's line handler.
pub type RecordFn = Box<dyn FnMut(Record) -> std::result::Result<Record, TransformError> + Send>;

/// The underlying medium a [`Source`] reads from.
pub trait Medium {
    /// Human-readable identity of the medium, used in logs.
    fn describe(&self) -> String;

    /// Total size in bytes, or `0` if unknown.
    fn total_size(&self) -> u64;

    /// Total number of records, if known without a full scan.
    fn total_length(&self) -> Option<u64>;

    /// The next record and its size estimate in bytes.
    ///
    /// # Errors
    /// Returns an error if the medium fails to produce the next record.
    fn next_item(&mut self) -> Result<Option<(Record, u64)>>;
}

/// Concatenation of text files, one [`Record::Scalar`] per line.
///
/// Each record keeps its line terminator; its size estimate is the raw line byte length.
/// Invalid UTF-8 is replaced lossily.
pub struct FileMedium {
    paths: Vec<PathBuf>,
    total_size: u64,
    next_path: usize,
    current: Option<(PathBuf, BufReader<File>)>,
    buf: Vec<u8>,
}

impl FileMedium {
    /// Check every path and sum file sizes. Files are opened lazily, in order.
    ///
    /// # Errors
    /// Returns [`ShuffleError::InputNotFound`] if a path is not an existing file.
    pub fn open<I, P>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut checked = Vec::new();
        let mut total_size = 0u64;
        for p in paths {
            let p = p.as_ref();
            if !p.is_file() {
                return Err(ShuffleError::InputNotFound(p.to_path_buf()));
            }
            total_size += std::fs::metadata(p).with_path("stat", p)?.len();
            checked.push(p.to_path_buf());
        }
        Ok(Self {
            paths: checked,
            total_size,
            next_path: 0,
            current: None,
            buf: Vec::new(),
        })
    }

    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Medium for FileMedium {
    fn describe(&self) -> String {
        let paths: Vec<_> = self.paths.iter().map(|p| p.display().to_string()).collect();
        format!("files[{}]", paths.join(", "))
    }

    fn total_size(&self) -> u64 {
        self.total_size
    }

    fn total_length(&self) -> Option<u64> {
        None
    }

    fn next_item(&mut self) -> Result<Option<(Record, u64)>> {
        loop {
            if self.current.is_none() {
                let Some(path) = self.paths.get(self.next_path) else {
                    return Ok(None);
                };
                let f = File::open(path).with_path("open", path)?;
                self.current = Some((path.clone(), BufReader::new(f)));
                self.next_path += 1;
            }
            let Some((path, reader)) = self.current.as_mut() else {
                continue;
            };
            self.buf.clear();
            let n = reader.read_until(b'\n', &mut self.buf).with_path("read", &*path)?;
            if n == 0 {
                // exhausted: release the handle before moving on
                self.current = None;
                continue;
            }
            let line = String::from_utf8_lossy(&self.buf).into_owned();
            return Ok(Some((Record::Scalar(line), n as u64)));
        }
    }
}

/// A cursor over an external record store.
///
/// The store reports its record count and average record size up front; each record is
/// accounted at the average size.
pub struct StoreMedium<I> {
    description: String,
    cursor: I,
    count: u64,
    avg_record_size: u64,
}

impl<I: Iterator<Item = Record>> StoreMedium<I> {
    pub fn new(description: impl Into<String>, cursor: I, count: u64, avg_record_size: u64) -> Self {
        Self {
            description: description.into(),
            cursor,
            count,
            avg_record_size,
        }
    }
}

impl<I: Iterator<Item = Record>> Medium for StoreMedium<I> {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn total_size(&self) -> u64 {
        self.avg_record_size.saturating_mul(self.count)
    }

    fn total_length(&self) -> Option<u64> {
        Some(self.count)
    }

    fn next_item(&mut self) -> Result<Option<(Record, u64)>> {
        Ok(self.cursor.next().map(|r| (r, self.avg_record_size)))
    }
}

/// Snapshot of a source's progress.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ProgressDetails {
    pub current_size: u64,
    pub current_length: u64,
    pub total_size: u64,
    pub total_length: Option<u64>,
    pub percent: Option<f64>,
}

/// Percentage of `current` over `total`, or `None` when `total` is zero.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn percent(current: u64, total: u64) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(current as f64 * 100.0 / total as f64)
    }
}

/// A named, single-pass stream of records over a [`Medium`].
pub struct Source<M> {
    name: String,
    medium: M,
    transform: Option<RecordFn>,
    current_size: u64,
    current_length: u64,
    progress_every: u64,
    events: SharedSink,
    drops: DropRecorder,
    cancel: CancellationToken,
    finished: bool,
}

impl<M: Medium> Source<M> {
    pub fn new(name: impl Into<String>, medium: M) -> Self {
        let events = default_sink();
        Self {
            name: name.into(),
            medium,
            transform: None,
            current_size: 0,
            current_length: 0,
            progress_every: DEFAULT_PROGRESS_EVERY,
            drops: DropRecorder::new(Arc::clone(&events), None),
            events,
            cancel: CancellationToken::new(),
            finished: false,
        }
    }

    /// Apply `f` to every record. See the module docs for how failures are handled.
    #[must_use]
    pub fn with_transform<F>(mut self, f: F) -> Self
    where
        F: FnMut(Record) -> std::result::Result<Record, TransformError> + Send + 'static,
    {
        self.transform = Some(Box::new(f));
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

    /// Emit a progress event every `n` records (`0` disables periodic events).
    #[must_use]
    pub fn with_progress_every(mut self, n: u64) -> Self {
        self.progress_every = n;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of records, if the medium knows it.
    #[must_use]
    pub fn length(&self) -> Option<u64> {
        self.medium.total_length()
    }

    /// Size of the medium in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.medium.total_size()
    }

    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    #[must_use]
    pub fn current_length(&self) -> u64 {
        self.current_length
    }

    /// `current_size / size * 100`, or `None` if the size is zero or unknown.
    #[must_use]
    pub fn progress(&self) -> Option<f64> {
        percent(self.current_size, self.size())
    }

    #[must_use]
    pub fn progress_details(&self) -> ProgressDetails {
        ProgressDetails {
            current_size: self.current_size,
            current_length: self.current_length,
            total_size: self.size(),
            total_length: self.length(),
            percent: self.progress(),
        }
    }

    /// Records dropped by the transform so far.
    #[must_use]
    pub fn drops(&self) -> DropCounters {
        self.drops.counters
    }

    #[must_use]
    pub fn medium(&self) -> &M {
        &self.medium
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    fn progress_event(&self, exhausted: bool) -> ShuffleEvent {
        let (source, length, size, percent) = (
            self.name.clone(),
            self.current_length,
            self.current_size,
            self.progress(),
        );
        if exhausted {
            ShuffleEvent::SourceExhausted {
                source,
                length,
                size,
                percent,
            }
        } else {
            ShuffleEvent::SourceProgress {
                source,
                length,
                size,
                percent,
            }
        }
    }

    fn pull(&mut self) -> Result<Option<Record>> {
        loop {
            self.cancel.check()?;
            let Some((record, size)) = self.medium.next_item()? else {
                self.events.emit(&self.progress_event(true));
                return Ok(None);
            };
            self.current_size += size;
            self.current_length += 1;
            if self.progress_every > 0 && self.current_length.is_multiple_of(self.progress_every) {
                self.events.emit(&self.progress_event(false));
            }

            let Some(transform) = self.transform.as_mut() else {
                return Ok(Some(record));
            };
            let preview = record.preview();
            match transform(record) {
                Ok(out) => return Ok(Some(out)),
                Err(e) => match e.drop_reason() {
                    Some(reason) => {
                        self.drops
                            .drop_record(Stage::Source, reason, preview, e.to_string())?;
                    }
                    None => return Err(ShuffleError::Cancelled),
                },
            }
        }
    }
}

impl<M: Medium> Iterator for Source<M> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.pull() {
            Ok(Some(r)) => Some(Ok(r)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl<M: Medium> fmt::Debug for Source<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.name)
            .field("medium", &self.medium.describe())
            .field("current_length", &self.current_length)
            .field("current_size", &self.current_size)
            .finish_non_exhaustive()
    }
}
