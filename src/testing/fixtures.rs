//! Pre-built input data and fixture files.

use crate::error::{IoContext, Result};
use crate::io::lines::write_lines;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write `lines` to `path`, one per line, and return the path.
///
/// # Errors
/// Returns an I/O error if the file cannot be written.
///
/// # Example
///
/// ```no_run
/// use ironshuffle::testing::write_fixture_lines;
///
/// # fn main() -> ironshuffle::Result<()> {
/// let path = write_fixture_lines("/tmp/in.txt", &["apple 1", "banana 2"])?;
/// # let _ = path;
/// # Ok(())
/// # }
/// ```
pub fn write_fixture_lines<S: AsRef<str>>(path: impl AsRef<Path>, lines: &[S]) -> Result<PathBuf> {
    let path = path.as_ref();
    write_lines(path, lines)?;
    Ok(path.to_path_buf())
}

/// Sample word-count input: `"<word> <count>"` lines with repeated words.
///
/// ```
/// use ironshuffle::testing::word_count_lines;
///
/// let lines = word_count_lines();
/// assert!(lines.iter().filter(|l| l.starts_with("hello ")).count() > 1);
/// ```
#[must_use]
pub fn word_count_lines() -> Vec<String> {
    [
        "hello 1", "world 1", "hello 2", "rust 1", "data 1", "world 2", "hello 3", "of 1",
        "rust 2", "programming 1", "data 2", "world 3",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// `count` deterministic `"key_<k> <i>"` lines over `num_keys` keys, in a scrambled order.
///
/// Uses a fixed-seed LCG so runs are reproducible.
///
/// ```
/// use ironshuffle::testing::generated_lines;
///
/// let lines = generated_lines(100, 7);
/// assert_eq!(lines.len(), 100);
/// assert_eq!(lines, generated_lines(100, 7));
/// ```
#[must_use]
pub fn generated_lines(count: usize, num_keys: u32) -> Vec<String> {
    let mut seed: u32 = 12345;
    let num_keys = num_keys.max(1);
    (0..count)
        .map(|i| {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let k = (seed / 65536) % num_keys;
            format!("key_{k:04} {i}")
        })
        .collect()
}

/// A scratch job directory, removed on drop.
///
/// ```
/// use ironshuffle::testing::TempJob;
///
/// # fn main() -> ironshuffle::Result<()> {
/// let job = TempJob::new()?;
/// let input = job.write_input("words.txt", &["hello 1", "world 1"])?;
/// assert!(input.starts_with(job.input_dir()));
/// assert!(job.shard_dir().is_dir());
/// # Ok(())
/// # }
/// ```
pub struct TempJob {
    dir: TempDir,
    input: PathBuf,
    shards: PathBuf,
}

impl TempJob {
    /// Create a temp directory with `input/` and `shards/` subdirectories.
    ///
    /// # Errors
    /// Returns an I/O error if a directory cannot be created.
    pub fn new() -> Result<Self> {
        let dir = TempDir::new().with_path("create temp dir", std::env::temp_dir())?;
        let input = dir.path().join("input");
        let shards = dir.path().join("shards");
        create_dir_all(&input).with_path("mkdir -p", &input)?;
        create_dir_all(&shards).with_path("mkdir -p", &shards)?;
        Ok(Self { dir, input, shards })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn input_dir(&self) -> &Path {
        &self.input
    }

    #[must_use]
    pub fn shard_dir(&self) -> &Path {
        &self.shards
    }

    /// Write an input file under `input/`.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be written.
    pub fn write_input<S: AsRef<str>>(&self, name: &str, lines: &[S]) -> Result<PathBuf> {
        write_fixture_lines(self.input.join(name), lines)
    }
}
