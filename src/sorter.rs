//! Per-shard in-memory sort, followed by a k-way merge.
//!
//! A [`Sorter`] is either `Unsorted` or `Sorted`. [`sort`](Sorter::sort) reads each shard
//! fully into memory, stable-sorts its lines by key and writes them unchanged to
//! `<shard>.sorted`.
//! Calling it again is a no-op. [`merge`](Sorter::merge) is only valid once sorted and
//! returns a [`MergeIter`] over all shards in ascending key order.
//!
//! There is no spill inside a single shard: every shard has to fit into memory, which the
//! caller controls through the shard count. With a memory budget configured, a shard larger
//! than the budget is rejected with [`ShuffleError::ShardTooLarge`].
//!
//! Lines whose key cannot be extracted are kept at the end of their sorted shard, in their
//! original order, and dropped by the merge.
//!
//! # Example
//!
//! ```no_run
//! use ironshuffle::sorter::Sorter;
//!
//! # fn main() -> ironshuffle::Result<()> {
//! let mut sorter = Sorter::new(
//!     vec!["out/words_1".into(), "out/words_2".into()],
//!     |line: &str| -> anyhow::Result<String> {
//!         line.split_whitespace()
//!             .next()
//!             .map(str::to_string)
//!             .ok_or_else(|| anyhow::anyhow!("empty line"))
//!     },
//! );
//! sorter.sort()?;
//! for line in sorter.merge()? {
//!     println!("{}", line?);
//! }
//! # Ok(())
//! # }
//! ```

use crate::cancel::CancellationToken;
use crate::dead_letter::{DeadLetterSink, DropRecorder};
use crate::error::{IoContext, Result, ShuffleError};
use crate::io::lines::{LineReader, trim_line_end};
use crate::merge::MergeIter;
use crate::observe::{SharedSink, ShuffleEvent, default_sink};
use serde::Serialize;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Emit a merge progress event every this many records.
pub const DEFAULT_MERGE_PROGRESS_EVERY: u64 = 100_000;

/// Key function over shard lines (terminator stripped).
pub type LineKeyFn<K> = Arc<dyn Fn(&str) -> anyhow::Result<K> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortState {
    Unsorted,
    Sorted,
}

/// A sorted shard and its size, for progress reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ShardInfo {
    pub path: PathBuf,
    pub sorted_path: PathBuf,
    pub lines: u64,
    pub bytes: u64,
    /// Lines whose key could not be extracted.
    pub unkeyed: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SortReport {
    pub shards: Vec<ShardInfo>,
    pub total_lines: u64,
    pub total_bytes: u64,
    pub workers: usize,
    /// `true` when `sort()` found the shards already sorted and did nothing.
    pub skipped: bool,
}

/// `<path>.sorted`
#[must_use]
pub fn sorted_path_for(path: &Path) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(".sorted");
    PathBuf::from(s)
}

pub struct Sorter<K> {
    shard_paths: Vec<PathBuf>,
    key_fn: LineKeyFn<K>,
    state: SortState,
    shards: Vec<ShardInfo>,
    total_lines: u64,
    total_bytes: u64,
    workers: usize,
    memory_budget: Option<u64>,
    parallelism: usize,
    progress_every: u64,
    events: SharedSink,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    cancel: CancellationToken,
}

impl<K: Ord> Sorter<K> {
    /// A sorter over unsorted shard files.
    pub fn new<F>(shard_paths: Vec<PathBuf>, key_fn: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<K> + Send + Sync + 'static,
    {
        Self {
            shard_paths,
            key_fn: Arc::new(key_fn),
            state: SortState::Unsorted,
            shards: Vec::new(),
            total_lines: 0,
            total_bytes: 0,
            workers: 0,
            memory_budget: None,
            parallelism: 1,
            progress_every: DEFAULT_MERGE_PROGRESS_EVERY,
            events: default_sink(),
            dead_letters: None,
            cancel: CancellationToken::new(),
        }
    }

    /// A sorter over files that are already sorted by `key_fn`.
    ///
    /// The sorter starts `Sorted`; line counts and sizes are taken from the files.
    ///
    /// # Errors
    /// Returns [`ShuffleError::InputNotFound`] for a missing file and I/O errors.
    pub fn from_sorted<F>(sorted_paths: Vec<PathBuf>, key_fn: F) -> Result<Self>
    where
        F: Fn(&str) -> anyhow::Result<K> + Send + Sync + 'static,
    {
        let mut shards = Vec::with_capacity(sorted_paths.len());
        for p in &sorted_paths {
            if !p.is_file() {
                return Err(ShuffleError::InputNotFound(p.clone()));
            }
            let mut lines = 0u64;
            let mut bytes = 0u64;
            for line in LineReader::open(p)? {
                let (_, n) = line?;
                lines += 1;
                bytes += n;
            }
            shards.push(ShardInfo {
                path: p.clone(),
                sorted_path: p.clone(),
                lines,
                bytes,
                unkeyed: 0,
            });
        }
        let mut sorter = Self::new(sorted_paths, key_fn);
        sorter.total_lines = shards.iter().map(|s| s.lines).sum();
        sorter.total_bytes = shards.iter().map(|s| s.bytes).sum();
        sorter.shards = shards;
        sorter.state = SortState::Sorted;
        Ok(sorter)
    }

    /// Reject shards larger than `bytes`, and size the sort pool so that concurrently
    /// resident shards stay within it.
    #[must_use]
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    /// Sort up to `workers` shards concurrently; `0` means one per CPU. Without the
    /// `parallel-sort` feature shards are always sorted one at a time.
    #[must_use]
    pub fn with_parallelism(mut self, workers: usize) -> Self {
        self.parallelism = if workers == 0 {
            num_cpus::get().max(1)
        } else {
            workers
        };
        self
    }

    /// Emit a merge progress event every `n` records (`0` disables periodic events).
    #[must_use]
    pub fn with_progress_every(mut self, n: u64) -> Self {
        self.progress_every = n;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: SharedSink) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_dead_letters(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn state(&self) -> SortState {
        self.state
    }

    #[must_use]
    pub fn shard_paths(&self) -> &[PathBuf] {
        &self.shard_paths
    }

    /// Paths of the sorted shards; empty until sorted.
    #[must_use]
    pub fn sorted_paths(&self) -> Vec<PathBuf> {
        self.shards.iter().map(|s| s.sorted_path.clone()).collect()
    }

    #[must_use]
    pub fn shards(&self) -> &[ShardInfo] {
        &self.shards
    }

    #[must_use]
    pub fn total_lines(&self) -> u64 {
        self.total_lines
    }

    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    fn report(&self, skipped: bool) -> SortReport {
        SortReport {
            shards: self.shards.clone(),
            total_lines: self.total_lines,
            total_bytes: self.total_bytes,
            workers: self.workers,
            skipped,
        }
    }

    /// Number of shards sorted concurrently, given the shard sizes.
    fn plan_workers(&self, sizes: &[u64]) -> usize {
        let mut workers = self.parallelism.min(sizes.len()).max(1);
        if let Some(budget) = self.memory_budget {
            let largest = sizes.iter().copied().max().unwrap_or(0);
            if largest > 0 {
                let fit = usize::try_from(budget / largest).unwrap_or(usize::MAX);
                workers = workers.min(fit).max(1);
            }
        }
        if cfg!(feature = "parallel-sort") {
            workers
        } else {
            1
        }
    }

    /// Sort every shard into `<shard>.sorted`.
    ///
    /// Returns only after every shard is sorted. Already sorted: returns immediately with
    /// `skipped = true`.
    ///
    /// # Errors
    /// Returns [`ShuffleError::ShardTooLarge`] if a shard exceeds the memory budget,
    /// [`ShuffleError::Cancelled`] on cancellation, and I/O errors. Nothing is marked
    /// sorted on error.
    pub fn sort(&mut self) -> Result<SortReport> {
        if self.state == SortState::Sorted {
            return Ok(self.report(true));
        }

        let mut sizes = Vec::with_capacity(self.shard_paths.len());
        for p in &self.shard_paths {
            let size = std::fs::metadata(p).with_path("stat", p)?.len();
            if let Some(budget) = self.memory_budget
                && size > budget
            {
                return Err(ShuffleError::ShardTooLarge {
                    path: p.clone(),
                    size,
                    budget,
                });
            }
            sizes.push(size);
        }
        let workers = self.plan_workers(&sizes);

        let shards = if workers <= 1 {
            self.shard_paths
                .iter()
                .map(|p| sort_shard(p, &self.key_fn, &self.cancel))
                .collect::<Result<Vec<_>>>()?
        } else {
            self.sort_parallel(workers)?
        };

        for s in &shards {
            self.events.emit(&ShuffleEvent::ShardSorted {
                path: s.path.clone(),
                sorted_path: s.sorted_path.clone(),
                lines: s.lines,
                bytes: s.bytes,
            });
        }
        self.total_lines = shards.iter().map(|s| s.lines).sum();
        self.total_bytes = shards.iter().map(|s| s.bytes).sum();
        self.shards = shards;
        self.workers = workers;
        self.state = SortState::Sorted;
        self.events.emit(&ShuffleEvent::SortFinished {
            shards: self.shards.len(),
            total_lines: self.total_lines,
            total_bytes: self.total_bytes,
            workers,
        });
        Ok(self.report(false))
    }

    #[cfg(feature = "parallel-sort")]
    fn sort_parallel(&self, workers: usize) -> Result<Vec<ShardInfo>> {
        use rayon::prelude::*;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("shard-sort-{i}"))
            .build()
            .map_err(|e| ShuffleError::Configuration(format!("sort pool: {e}")))?;
        let key_fn = &self.key_fn;
        let cancel = &self.cancel;
        // par_iter + collect keeps shard order; install() returns once every shard is done
        pool.install(|| {
            self.shard_paths
                .par_iter()
                .map(|p| sort_shard(p, key_fn, cancel))
                .collect::<Result<Vec<_>>>()
        })
    }

    #[cfg(not(feature = "parallel-sort"))]
    fn sort_parallel(&self, _workers: usize) -> Result<Vec<ShardInfo>> {
        self.shard_paths
            .iter()
            .map(|p| sort_shard(p, &self.key_fn, &self.cancel))
            .collect()
    }

    /// A globally key-ordered stream over every sorted shard.
    ///
    /// Equal keys from different shards come out in ascending shard index order; within a
    /// shard, in file order.
    ///
    /// # Errors
    /// Returns [`ShuffleError::InvalidState`] before [`sort`](Self::sort), and an I/O error
    /// if a sorted shard cannot be opened.
    pub fn merge(&self) -> Result<MergeIter<K>> {
        if self.state != SortState::Sorted {
            return Err(ShuffleError::InvalidState(
                "merge requested before sort()".into(),
            ));
        }
        let readers = self
            .shards
            .iter()
            .map(|s| LineReader::open(&s.sorted_path))
            .collect::<Result<Vec<_>>>()?;
        let mut drops = DropRecorder::new(Arc::clone(&self.events), None);
        if let Some(sink) = &self.dead_letters {
            drops.set_dead_letters(Arc::clone(sink));
        }
        Ok(MergeIter::new(
            readers,
            Arc::clone(&self.key_fn),
            self.total_lines,
            self.total_bytes,
            self.progress_every,
            Arc::clone(&self.events),
            drops,
            self.cancel.clone(),
        ))
    }
}

/// Sort one shard file into its `.sorted` sibling.
///
/// Lines are copied byte for byte; only a missing final terminator is added.
fn sort_shard<K: Ord>(
    path: &Path,
    key_fn: &LineKeyFn<K>,
    cancel: &CancellationToken,
) -> Result<ShardInfo> {
    let mut keyed: Vec<(K, Vec<u8>)> = Vec::new();
    let mut unkeyed: Vec<Vec<u8>> = Vec::new();
    let mut bytes = 0u64;
    let mut reader = LineReader::open(path)?;
    while let Some(raw) = reader.next_bytes()? {
        cancel.check()?;
        bytes += raw.len() as u64;
        let mut raw = raw.to_vec();
        let key = key_fn(trim_line_end(&String::from_utf8_lossy(&raw)));
        if !raw.ends_with(b"\n") {
            raw.push(b'\n');
        }
        match key {
            Ok(k) => keyed.push((k, raw)),
            Err(_) => unkeyed.push(raw),
        }
    }
    // stable: equal keys keep their order within the shard
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    let sorted_path = sorted_path_for(path);
    let f = File::create(&sorted_path).with_path("create", &sorted_path)?;
    let mut w = BufWriter::new(f);
    let lines = keyed.len() as u64 + unkeyed.len() as u64;
    let unkeyed_count = unkeyed.len() as u64;
    for line in keyed.into_iter().map(|(_, l)| l).chain(unkeyed) {
        cancel.check()?;
        w.write_all(&line).with_path("write", &sorted_path)?;
    }
    w.flush().with_path("flush", &sorted_path)?;

    Ok(ShardInfo {
        path: path.to_path_buf(),
        sorted_path,
        lines,
        bytes,
        unkeyed: unkeyed_count,
    })
}
