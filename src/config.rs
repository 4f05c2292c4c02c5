//! Job configuration for a shuffle run.
//!
//! A [`JobConfig`] names the inputs, the output directories for shards, a temp path and a
//! memory budget. It can be built in code or loaded from JSON:
//!
//! ```json
//! {
//!   "name": "word count",
//!   "input_paths": ["data/*.txt"],
//!   "output_paths": ["/mnt/a/shuffle", "/mnt/b/shuffle"],
//!   "mem_limit": 268435456
//! }
//! ```
//!
//! Missing required fields are a hard error from [`JobConfig::validate`], never a warning.
//!
//! # Example
//!
//! ```no_run
//! use ironshuffle::config::JobConfig;
//!
//! # fn main() -> ironshuffle::Result<()> {
//! let config = JobConfig::builder()
//!     .name("word count")
//!     .input_path("data/part-0.txt")
//!     .output_path("/tmp/shuffle/out")
//!     .mem_limit(64 * 1024 * 1024)
//!     .build()?;
//! let source = config.open_file_source()?;
//! let shards = config.shard_count_for(source.size());
//! # let _ = shards;
//! # Ok(())
//! # }
//! ```

use crate::error::{IoContext, Result, ShuffleError};
use crate::record::DEFAULT_DELIMITER;
use crate::source::{FileMedium, Source};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default memory budget: 100 MiB.
pub const DEFAULT_MEM_LIMIT: u64 = 100 * 1024 * 1024;

/// Kind of medium the inputs live on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Local text files, one record per line.
    #[default]
    File,
    /// An external record store; the caller builds a
    /// [`StoreMedium`](crate::source::StoreMedium) for it.
    Store,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job name; also the shard file name prefix.
    #[serde(default)]
    pub name: String,
    /// Input files or glob patterns.
    #[serde(default)]
    pub input_paths: Vec<PathBuf>,
    /// Shard output directories, used round-robin.
    #[serde(default)]
    pub output_paths: Vec<PathBuf>,
    #[serde(default = "default_temp_path")]
    pub temp_path: PathBuf,
    #[serde(default)]
    pub input_kind: InputKind,
    /// Per-shard memory budget in bytes.
    #[serde(default = "default_mem_limit")]
    pub mem_limit: u64,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Concurrent shard sorts; `0` means one per CPU.
    #[serde(default = "default_sort_parallelism")]
    pub sort_parallelism: usize,
}

fn default_temp_path() -> PathBuf {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    std::env::temp_dir().join(format!("ironshuffle_{secs}"))
}

fn default_mem_limit() -> u64 {
    DEFAULT_MEM_LIMIT
}

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

fn default_sort_parallelism() -> usize {
    1
}

impl JobConfig {
    #[must_use]
    pub fn builder() -> JobConfigBuilder {
        JobConfigBuilder::default()
    }

    /// Load and validate a JSON config file.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read, [`ShuffleError::Json`] if it does not
    /// parse, and [`ShuffleError::Configuration`] if it fails validation.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_path("read", path)?;
        Self::from_json_str(&text)
    }

    /// Parse and validate a JSON config.
    ///
    /// # Errors
    /// See [`from_json_file`](Self::from_json_file).
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check required fields.
    ///
    /// # Errors
    /// Returns [`ShuffleError::Configuration`] naming the first missing or invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ShuffleError::Configuration("name is empty".into()));
        }
        if self.input_kind == InputKind::File && self.input_paths.is_empty() {
            return Err(ShuffleError::Configuration("input_paths is empty".into()));
        }
        if self.output_paths.is_empty() {
            return Err(ShuffleError::Configuration("output_paths is empty".into()));
        }
        if self.mem_limit == 0 {
            return Err(ShuffleError::Configuration(
                "mem_limit must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Number of shards needed so each holds at most `mem_limit` bytes of a
    /// `total_size`-byte input; at least 1.
    #[must_use]
    pub fn shard_count_for(&self, total_size: u64) -> usize {
        let n = total_size.div_ceil(self.mem_limit.max(1)).max(1);
        usize::try_from(n).unwrap_or(usize::MAX)
    }

    /// Resolve `input_paths` to concrete files, expanding glob patterns.
    ///
    /// # Errors
    /// Returns [`ShuffleError::InputNotFound`] for a missing file or a pattern with no match.
    pub fn resolve_inputs(&self) -> Result<Vec<PathBuf>> {
        #[cfg(feature = "glob-inputs")]
        {
            crate::io::glob::resolve_inputs(&self.input_paths)
        }
        #[cfg(not(feature = "glob-inputs"))]
        {
            for p in &self.input_paths {
                if !p.is_file() {
                    return Err(ShuffleError::InputNotFound(p.clone()));
                }
            }
            Ok(self.input_paths.clone())
        }
    }

    /// Build the file source described by this config.
    ///
    /// # Errors
    /// Returns [`ShuffleError::Configuration`] for [`InputKind::Store`] or an invalid config
    /// and [`ShuffleError::InputNotFound`] for missing inputs.
    pub fn open_file_source(&self) -> Result<Source<FileMedium>> {
        self.validate()?;
        if self.input_kind != InputKind::File {
            return Err(ShuffleError::Configuration(format!(
                "input kind {:?} has no built-in source; construct a StoreMedium",
                self.input_kind
            )));
        }
        let medium = FileMedium::open(self.resolve_inputs()?)?;
        Ok(Source::new(self.name.clone(), medium))
    }

    /// Create `temp_path` if missing.
    ///
    /// # Errors
    /// Returns an I/O error if the directory cannot be created.
    pub fn ensure_temp_path(&self) -> Result<&Path> {
        std::fs::create_dir_all(&self.temp_path).with_path("mkdir -p", &self.temp_path)?;
        Ok(&self.temp_path)
    }
}

/// Builder for [`JobConfig`]; [`build`](Self::build) validates.
#[derive(Clone, Debug, Default)]
pub struct JobConfigBuilder {
    name: Option<String>,
    input_paths: Vec<PathBuf>,
    output_paths: Vec<PathBuf>,
    temp_path: Option<PathBuf>,
    input_kind: InputKind,
    mem_limit: Option<u64>,
    delimiter: Option<String>,
    sort_parallelism: Option<usize>,
}

impl JobConfigBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn input_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_paths.push(path.into());
        self
    }

    #[must_use]
    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_paths.push(path.into());
        self
    }

    #[must_use]
    pub fn temp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn input_kind(mut self, kind: InputKind) -> Self {
        self.input_kind = kind;
        self
    }

    #[must_use]
    pub fn mem_limit(mut self, bytes: u64) -> Self {
        self.mem_limit = Some(bytes);
        self
    }

    #[must_use]
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    #[must_use]
    pub fn sort_parallelism(mut self, workers: usize) -> Self {
        self.sort_parallelism = Some(workers);
        self
    }

    /// # Errors
    /// Returns [`ShuffleError::Configuration`] if a required field is missing.
    pub fn build(self) -> Result<JobConfig> {
        let config = JobConfig {
            name: self.name.unwrap_or_default(),
            input_paths: self.input_paths,
            output_paths: self.output_paths,
            temp_path: self.temp_path.unwrap_or_else(default_temp_path),
            input_kind: self.input_kind,
            mem_limit: self.mem_limit.unwrap_or(DEFAULT_MEM_LIMIT),
            delimiter: self.delimiter.unwrap_or_else(default_delimiter),
            sort_parallelism: self.sort_parallelism.unwrap_or(1),
        };
        config.validate()?;
        Ok(config)
    }
}
