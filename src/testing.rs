//! Testing utilities for shuffle jobs.
//!
//! Helpers for writing tests against partitioned, sorted and merged output:
//!
//! - **Fixtures**: write line files, sample word-count input, deterministic generated lines
//! - **Assertions**: key-sortedness of a file or line sequence, multiset equality of lines
//! - **Key functions**: the common "first whitespace token" key
//!
//! # Quick Start
//!
//! ```no_run
//! use ironshuffle::*;
//! use ironshuffle::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let tmp = tempfile::tempdir()?;
//! let input = write_fixture_lines(tmp.path().join("in.txt"), &word_count_lines())?;
//!
//! let source = Source::new("words", FileMedium::open([&input])?);
//! let strategy = HashSplit::new(first_token_of_record);
//! let mut partitioner = Partitioner::new(source, 3, &[tmp.path()], strategy)?;
//! partitioner.run()?;
//!
//! let mut sorter = Sorter::new(partitioner.shard_paths().to_vec(), first_token);
//! sorter.sort()?;
//! for path in sorter.sorted_paths() {
//!     assert_file_sorted_by(&path, first_token);
//! }
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;

pub use crate::io::lines::read_lines;

use crate::record::Record;

/// The first whitespace-delimited token of `line`.
///
/// # Errors
/// Returns an error for a line without any token.
pub fn first_token(line: &str) -> anyhow::Result<String> {
    line.split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("no token in line {line:?}"))
}

/// [`first_token`] of a scalar record.
///
/// # Errors
/// Returns an error for a non-scalar record or a scalar without any token.
pub fn first_token_of_record(record: &Record) -> anyhow::Result<String> {
    let Some(line) = record.as_scalar() else {
        anyhow::bail!("expected a scalar record, got {}", record.shape());
    };
    first_token(line)
}
