//! Input path resolution with glob support.
//!
//! Configured inputs may be plain paths or glob patterns such as `logs/*.txt` or
//! `data/day=*/part-*`. Patterns expand to matching files in sorted order, which keeps the
//! concatenation order of a [`FileMedium`](crate::source::FileMedium) deterministic.

use crate::error::{Result, ShuffleError};
use glob::glob;
use std::path::{Path, PathBuf};

/// Whether `s` contains glob metacharacters.
#[must_use]
pub fn is_pattern(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Expand a glob pattern into a sorted vector of matching file paths.
///
/// Directories are skipped. Zero matches is not an error here; see [`resolve_inputs`].
///
/// # Errors
/// Returns [`ShuffleError::Configuration`] for an invalid pattern and an I/O error if a
/// matched entry cannot be read.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern)
        .map_err(|e| ShuffleError::Configuration(format!("invalid glob pattern {pattern}: {e}")))?;

    let mut result = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| {
            let p = e.path().to_path_buf();
            ShuffleError::io("read glob entry", p, e.into())
        })?;
        if path.is_file() {
            result.push(path);
        }
    }
    result.sort();
    Ok(result)
}

/// Resolve configured inputs into concrete file paths, preserving the configured order.
///
/// Plain paths must name existing files. Patterns must match at least one file.
///
/// # Errors
/// Returns [`ShuffleError::InputNotFound`] for a missing path or an empty pattern.
pub fn resolve_inputs<P: AsRef<Path>>(inputs: &[P]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for input in inputs {
        let input = input.as_ref();
        match input.to_str() {
            Some(s) if is_pattern(s) => {
                let files = expand_glob(s)?;
                if files.is_empty() {
                    return Err(ShuffleError::InputNotFound(input.to_path_buf()));
                }
                out.extend(files);
            }
            _ => {
                if !input.is_file() {
                    return Err(ShuffleError::InputNotFound(input.to_path_buf()));
                }
                out.push(input.to_path_buf());
            }
        }
    }
    Ok(out)
}
