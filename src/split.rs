//! Shard assignment strategies and shard writers.
//!
//! A [`SplitStrategy`] is a decision function from a record to a shard index. It never
//! touches files; [`ShardWriters`] own the N output handles and encode records as lines
//! (see [`Record::to_line`]). [`Splitter`] combines the two and reports every record as an
//! explicit [`RecordOutcome`].
//!
//! Provided strategies:
//!
//! - [`HashSplit`]: `stable_hash(key_fn(record)) mod N`, with the pinned
//!   [`HashAlgorithm::Sha256V1`] by default
//! - [`RoundRobinSplit`]: ignores the record; a counter incremented *before* each assignment
//!   picks `counter mod N`, so the first record goes to shard `1 mod N`

use crate::dead_letter::DropReason;
use crate::error::{IoContext, Result, ShuffleError};
use crate::hash::{HashAlgorithm, KeyBytes};
use crate::record::{DEFAULT_DELIMITER, Record};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Decides which shard a record belongs to.
pub trait SplitStrategy: Send {
    /// Shard index in `0..shard_count` for `record`.
    ///
    /// # Errors
    /// Returns [`ShuffleError::KeyExtraction`] if the record's key cannot be extracted.
    fn assign(&mut self, record: &Record, shard_count: usize) -> Result<usize>;

    /// Short description for logs and reports.
    fn describe(&self) -> String;
}

/// Boxed key function over records.
pub type RecordKeyFn<K> = Box<dyn Fn(&Record) -> anyhow::Result<K> + Send + Sync>;

/// Hash partitioning on a caller-supplied key.
pub struct HashSplit<K> {
    key_fn: RecordKeyFn<K>,
    hash: HashAlgorithm,
}

impl<K: KeyBytes> HashSplit<K> {
    pub fn new<F>(key_fn: F) -> Self
    where
        F: Fn(&Record) -> anyhow::Result<K> + Send + Sync + 'static,
    {
        Self {
            key_fn: Box::new(key_fn),
            hash: HashAlgorithm::default(),
        }
    }

    #[must_use]
    pub fn with_hash(mut self, hash: HashAlgorithm) -> Self {
        self.hash = hash;
        self
    }

    #[must_use]
    pub fn hash_algorithm(&self) -> &HashAlgorithm {
        &self.hash
    }

    /// Shard index for an already extracted key.
    ///
    /// # Panics
    /// Panics if `shard_count` is zero.
    pub fn shard_for_key(&self, key: &K, shard_count: usize) -> usize {
        assert!(shard_count > 0, "shard_count must be positive");
        (self.hash.hash_key(key) % shard_count as u64) as usize
    }
}

impl<K: KeyBytes> SplitStrategy for HashSplit<K> {
    fn assign(&mut self, record: &Record, shard_count: usize) -> Result<usize> {
        if shard_count == 0 {
            return Err(ShuffleError::InvalidState("no shards to assign to".into()));
        }
        let key = (self.key_fn)(record).map_err(|e| ShuffleError::KeyExtraction(format!("{e:#}")))?;
        Ok(self.shard_for_key(&key, shard_count))
    }

    fn describe(&self) -> String {
        format!("hash({})", self.hash.id())
    }
}

/// Round-robin partitioning.
#[derive(Clone, Copy, Debug, Default)]
pub struct RoundRobinSplit {
    counter: u64,
}

impl RoundRobinSplit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of assignments made so far.
    #[must_use]
    pub fn counter(&self) -> u64 {
        self.counter
    }
}

impl SplitStrategy for RoundRobinSplit {
    fn assign(&mut self, _record: &Record, shard_count: usize) -> Result<usize> {
        if shard_count == 0 {
            return Err(ShuffleError::InvalidState("no shards to assign to".into()));
        }
        self.counter += 1;
        Ok((self.counter % shard_count as u64) as usize)
    }

    fn describe(&self) -> String {
        "round_robin".to_string()
    }
}

/// The N output handles of one partitioning pass.
///
/// Handles are opened (and truncated) once by [`init`](Self::init) and closed when the
/// writers are dropped or [`close`](Self::close)d.
pub struct ShardWriters {
    delimiter: String,
    paths: Vec<PathBuf>,
    writers: Vec<BufWriter<File>>,
    lines: Vec<u64>,
    bytes: Vec<u64>,
}

impl ShardWriters {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
            paths: Vec::new(),
            writers: Vec::new(),
            lines: Vec::new(),
            bytes: Vec::new(),
        }
    }

    /// Create one empty file per path.
    ///
    /// # Errors
    /// Returns [`ShuffleError::InvalidState`] if called twice and an I/O error if a file
    /// cannot be created.
    pub fn init<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<()> {
        if !self.writers.is_empty() {
            return Err(ShuffleError::InvalidState(
                "shard writers already initialized".into(),
            ));
        }
        for p in paths {
            let p = p.as_ref();
            let f = File::create(p).with_path("create", p)?;
            self.writers.push(BufWriter::new(f));
            self.paths.push(p.to_path_buf());
        }
        self.lines = vec![0; self.writers.len()];
        self.bytes = vec![0; self.writers.len()];
        Ok(())
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.writers.len()
    }

    #[must_use]
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Lines written per shard.
    #[must_use]
    pub fn lines_written(&self) -> &[u64] {
        &self.lines
    }

    /// Bytes written per shard.
    #[must_use]
    pub fn bytes_written(&self) -> &[u64] {
        &self.bytes
    }

    /// Encode `record` and append it to shard `index`.
    ///
    /// # Returns
    /// The number of bytes written.
    ///
    /// # Errors
    /// Returns [`ShuffleError::UnsupportedRecordShape`] (nothing is written),
    /// [`ShuffleError::InvalidState`] for an out-of-range index, or an I/O error.
    pub fn write(&mut self, index: usize, record: &Record) -> Result<u64> {
        if index >= self.writers.len() {
            return Err(ShuffleError::InvalidState(format!(
                "shard index {index} out of range for {} shards",
                self.writers.len()
            )));
        }
        let line = record.to_line(&self.delimiter)?;
        self.writers[index]
            .write_all(line.as_bytes())
            .with_path("write", &self.paths[index])?;
        let n = line.len() as u64;
        self.lines[index] += 1;
        self.bytes[index] += n;
        Ok(n)
    }

    /// Flush every shard so it can be read back.
    ///
    /// # Errors
    /// Returns an I/O error if any shard fails to flush.
    pub fn flush(&mut self) -> Result<()> {
        for (w, p) in self.writers.iter_mut().zip(&self.paths) {
            w.flush().with_path("flush", p)?;
        }
        Ok(())
    }

    /// Flush and release every handle.
    ///
    /// # Errors
    /// Returns an I/O error if any shard fails to flush.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }
}

impl Default for ShardWriters {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

/// Result of routing one record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Written { shard: usize, bytes: u64 },
    Dropped { reason: DropReason, detail: String },
}

/// A strategy bound to its shard writers.
pub struct Splitter<S> {
    strategy: S,
    writers: ShardWriters,
}

impl<S: SplitStrategy> Splitter<S> {
    pub fn new(strategy: S, delimiter: impl Into<String>) -> Self {
        Self {
            strategy,
            writers: ShardWriters::new(delimiter),
        }
    }

    /// Open the shard files. Must be called once before [`split`](Self::split).
    ///
    /// # Errors
    /// See [`ShardWriters::init`].
    pub fn init<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<()> {
        self.writers.init(paths)
    }

    /// Assign `record` to a shard and write it there.
    ///
    /// Key extraction failures and unsupported shapes become
    /// [`RecordOutcome::Dropped`]; nothing is written for them.
    ///
    /// # Errors
    /// Structural failures (I/O, uninitialized writers) are returned as errors.
    pub fn split(&mut self, record: &Record) -> Result<RecordOutcome> {
        let n = self.writers.shard_count();
        if n == 0 {
            return Err(ShuffleError::InvalidState(
                "splitter used before init".into(),
            ));
        }
        let shard = match self.strategy.assign(record, n) {
            Ok(shard) => shard,
            Err(ShuffleError::KeyExtraction(detail)) => {
                return Ok(RecordOutcome::Dropped {
                    reason: DropReason::KeyExtraction,
                    detail,
                });
            }
            Err(e) => return Err(e),
        };
        match self.writers.write(shard, record) {
            Ok(bytes) => Ok(RecordOutcome::Written { shard, bytes }),
            Err(ShuffleError::UnsupportedRecordShape(detail)) => Ok(RecordOutcome::Dropped {
                reason: DropReason::UnsupportedShape,
                detail,
            }),
            Err(e) => Err(e),
        }
    }

    /// # Errors
    /// See [`ShardWriters::flush`].
    pub fn flush(&mut self) -> Result<()> {
        self.writers.flush()
    }

    /// Flush and release the shard handles.
    ///
    /// # Errors
    /// See [`ShardWriters::close`].
    pub fn close(self) -> Result<()> {
        self.writers.close()
    }

    #[must_use]
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    #[must_use]
    pub fn writers(&self) -> &ShardWriters {
        &self.writers
    }
}
