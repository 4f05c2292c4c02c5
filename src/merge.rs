//! K-way merge over sorted shards.
//!
//! [`MergeIter`] keeps one open [`LineReader`] and at most one buffered head line per
//! shard. Heads live in a min-heap ordered by `(key, shard index)`. After a line is emitted
//! the heap is refilled from the shard it came from. Readers are closed as soon as their
//! shard is exhausted and all at once on cancellation or drop.
//!
//! Per-line key extraction failures drop only that line; the shard continues.

use crate::cancel::CancellationToken;
use crate::dead_letter::{DropCounters, DropReason, DropRecorder, Stage};
use crate::error::Result;
use crate::io::lines::LineReader;
use crate::observe::{SharedSink, ShuffleEvent};
use crate::sorter::LineKeyFn;
use crate::source::percent;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Head line of one shard.
struct HeapEntry<K> {
    key: K,
    shard: usize,
    line: String,
}

impl<K: Ord> PartialEq for HeapEntry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord> Eq for HeapEntry<K> {}

impl<K: Ord> PartialOrd for HeapEntry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord> Ord for HeapEntry<K> {
    // the payload never takes part in the ordering
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.shard.cmp(&other.shard))
    }
}

/// Globally key-ordered stream of lines. Created by
/// [`Sorter::merge`](crate::sorter::Sorter::merge).
///
/// Yields `Ok(line)` in ascending key order. An error (cancellation, I/O, dead-letter sink)
/// is yielded once and ends the stream.
pub struct MergeIter<K> {
    readers: Vec<Option<LineReader>>,
    heap: BinaryHeap<Reverse<HeapEntry<K>>>,
    key_fn: LineKeyFn<K>,
    total_lines: u64,
    total_bytes: u64,
    emitted: u64,
    progress_every: u64,
    events: SharedSink,
    drops: DropRecorder,
    cancel: CancellationToken,
    primed: bool,
    finished: bool,
}

impl<K: Ord> MergeIter<K> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        readers: Vec<LineReader>,
        key_fn: LineKeyFn<K>,
        total_lines: u64,
        total_bytes: u64,
        progress_every: u64,
        events: SharedSink,
        drops: DropRecorder,
        cancel: CancellationToken,
    ) -> Self {
        let n = readers.len();
        Self {
            readers: readers.into_iter().map(Some).collect(),
            heap: BinaryHeap::with_capacity(n),
            key_fn,
            total_lines,
            total_bytes,
            emitted: 0,
            progress_every,
            events,
            drops,
            cancel,
            primed: false,
            finished: false,
        }
    }

    /// Records emitted so far.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Shards whose reader is still open.
    #[must_use]
    pub fn open_readers(&self) -> usize {
        self.readers.iter().filter(|r| r.is_some()).count()
    }

    /// Lines dropped by the merge so far.
    #[must_use]
    pub fn drops(&self) -> DropCounters {
        self.drops.counters
    }

    /// Yield `(key, line)` pairs instead of bare lines.
    #[must_use]
    pub fn keyed(self) -> Keyed<K> {
        Keyed { inner: self }
    }

    /// Group consecutive lines with equal keys, as consumed by a reduce step.
    #[must_use]
    pub fn groups(self) -> Groups<K> {
        Groups {
            inner: self,
            pending: None,
        }
    }

    /// Buffer the next keyed line of `shard`, closing its reader when exhausted.
    fn refill(&mut self, shard: usize) -> Result<()> {
        loop {
            let Some(reader) = self.readers[shard].as_mut() else {
                return Ok(());
            };
            let Some(item) = reader.next() else {
                self.readers[shard] = None;
                return Ok(());
            };
            let (line, _) = item?;
            match (self.key_fn)(&line) {
                Ok(key) => {
                    self.heap.push(Reverse(HeapEntry { key, shard, line }));
                    return Ok(());
                }
                Err(e) => {
                    self.drops.drop_record(
                        Stage::Merge,
                        DropReason::KeyExtraction,
                        line,
                        format!("{e:#}"),
                    )?;
                }
            }
        }
    }

    fn close_all(&mut self) {
        self.finished = true;
        self.heap.clear();
        for r in &mut self.readers {
            *r = None;
        }
    }

    fn step(&mut self) -> Result<Option<(K, String)>> {
        self.cancel.check()?;
        if !self.primed {
            self.primed = true;
            for shard in 0..self.readers.len() {
                self.refill(shard)?;
            }
        }
        let Some(Reverse(entry)) = self.heap.pop() else {
            return Ok(None);
        };
        self.emitted += 1;
        if self.progress_every > 0 && self.emitted.is_multiple_of(self.progress_every) {
            self.events.emit(&ShuffleEvent::MergeProgress {
                emitted: self.emitted,
                percent: percent(self.emitted, self.total_lines),
            });
        }
        self.refill(entry.shard)?;
        Ok(Some((entry.key, entry.line)))
    }

    fn next_entry(&mut self) -> Option<Result<(K, String)>> {
        if self.finished {
            return None;
        }
        match self.step() {
            Ok(Some(kv)) => Some(Ok(kv)),
            Ok(None) => {
                self.close_all();
                self.events.emit(&ShuffleEvent::MergeFinished {
                    emitted: self.emitted,
                    total_lines: self.total_lines,
                    total_bytes: self.total_bytes,
                });
                None
            }
            Err(e) => {
                self.close_all();
                Some(Err(e))
            }
        }
    }
}

impl<K: Ord> Iterator for MergeIter<K> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().map(|r| r.map(|(_, line)| line))
    }
}

/// See [`MergeIter::keyed`].
pub struct Keyed<K> {
    inner: MergeIter<K>,
}

impl<K: Ord> Keyed<K> {
    #[must_use]
    pub fn merge(&self) -> &MergeIter<K> {
        &self.inner
    }
}

impl<K: Ord> Iterator for Keyed<K> {
    type Item = Result<(K, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next_entry()
    }
}

/// See [`MergeIter::groups`].
pub struct Groups<K> {
    inner: MergeIter<K>,
    pending: Option<(K, String)>,
}

impl<K: Ord> Groups<K> {
    #[must_use]
    pub fn merge(&self) -> &MergeIter<K> {
        &self.inner
    }
}

impl<K: Ord> Iterator for Groups<K> {
    type Item = Result<(K, Vec<String>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, first) = match self.pending.take() {
            Some(kv) => kv,
            None => match self.inner.next_entry()? {
                Ok(kv) => kv,
                Err(e) => return Some(Err(e)),
            },
        };
        let mut lines = vec![first];
        loop {
            match self.inner.next_entry() {
                None => break,
                Some(Err(e)) => return Some(Err(e)),
                Some(Ok((k, line))) if k == key => lines.push(line),
                Some(Ok(kv)) => {
                    self.pending = Some(kv);
                    break;
                }
            }
        }
        Some(Ok((key, lines)))
    }
}
