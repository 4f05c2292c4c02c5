//! # Ironshuffle
//!
//! A **single-node, disk-backed shuffle engine**: the partition, sort and merge phase of a
//! MapReduce job, for inputs larger than memory.
//!
//! ## Key Features
//!
//! - **Sources with progress accounting** over files or any counted record store
//! - **Deterministic partitioning** by a pinned, versioned hash or round-robin
//! - **Per-shard stable sort** with optional parallel workers bounded by a memory budget
//! - **k-way merge** into one globally key-ordered stream, with a grouping adapter for reducers
//! - **Explicit per-record outcomes**: drops are counted, reported and optionally dead-lettered
//! - **Injected observability**: every component reports structured events to a sink
//!
//! ## Quick Start
//!
//! ```no_run
//! use ironshuffle::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let first_token = |line: &str| -> anyhow::Result<String> {
//!     line.split_whitespace()
//!         .next()
//!         .map(str::to_string)
//!         .ok_or_else(|| anyhow::anyhow!("no key in {line:?}"))
//! };
//!
//! // 1. stream the input
//! let source = Source::new("words", FileMedium::open(["input/words.txt"])?);
//!
//! // 2. partition into 4 shards by the first token
//! let strategy = HashSplit::new(move |r: &Record| first_token(r.as_scalar().unwrap_or("")));
//! let mut partitioner = Partitioner::new(source, 4, &["/tmp/shuffle"], strategy)?;
//! let report = partitioner.run()?;
//! println!("{}", report.to_json()?);
//!
//! // 3. sort every shard, then merge and group by key
//! let mut sorter = Sorter::new(partitioner.shard_paths().to_vec(), first_token);
//! sorter.sort()?;
//! for group in sorter.merge()?.groups() {
//!     let (word, lines) = group?;
//!     println!("{word}: {}", lines.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Source
//!
//! A [`Source`] is a named, single-pass iterator of [`Record`]s over a
//! [`Medium`](source::Medium). It counts records and bytes as they are read and may apply a
//! per-record transform. Transform failures drop the record; cancellation ends the stream.
//!
//! ### Partitioning
//!
//! A [`SplitStrategy`] maps a record to a shard index. [`HashSplit`] hashes a caller-supplied
//! key with [`HashAlgorithm::Sha256V1`] by default; [`RoundRobinSplit`] ignores the record. A
//! [`Partitioner`] drives a source through a strategy once and writes one file per shard.
//!
//! ### Sorting and merging
//!
//! A [`Sorter`] sorts each shard file in memory into `<shard>.sorted` and then merges the
//! sorted shards with a [`MergeIter`]. Equal keys from different shards come out in shard
//! index order.
//!
//! ### Outcomes and events
//!
//! Per-record failures never abort a pass. They show up in [`DropCounters`], as
//! [`ShuffleEvent::RecordDropped`] events and, when configured, in a
//! [`DeadLetterSink`]. Structural failures ([`ShuffleError`]) abort.
//!
//! ## Feature Flags
//!
//! - `glob-inputs` (default): glob patterns in [`JobConfig`] input paths
//! - `parallel-sort` (default): sort shards concurrently on a rayon pool

pub mod cancel;
pub mod config;
pub mod dead_letter;
pub mod error;
pub mod hash;
pub mod io;
pub mod merge;
pub mod observe;
pub mod partitioner;
pub mod record;
pub mod sorter;
pub mod source;
pub mod split;
pub mod testing;

pub use cancel::CancellationToken;
pub use config::{InputKind, JobConfig};
pub use dead_letter::{
    DeadLetter, DeadLetterSink, DropCounters, DropReason, JsonlDeadLetters, MemoryDeadLetters,
    Stage,
};
pub use error::{Result, ShuffleError};
pub use hash::{HashAlgorithm, KeyBytes};
pub use merge::{Groups, Keyed, MergeIter};
pub use observe::{EventSink, MemorySink, NullSink, SharedSink, ShuffleEvent, TracingSink};
pub use partitioner::{PartitionReport, PartitionState, Partitioner};
pub use record::{Record, RecordShape};
pub use sorter::{ShardInfo, SortReport, SortState, Sorter};
pub use source::{FileMedium, Medium, Source, StoreMedium, TransformError};
pub use split::{HashSplit, RecordOutcome, RoundRobinSplit, SplitStrategy};
