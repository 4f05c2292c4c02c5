//! Assertions over shard files and merged output.

use crate::io::lines::read_lines;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;

/// Assert that the keys of `lines` are non-decreasing. Lines whose key cannot be extracted
/// are ignored.
///
/// # Panics
///
/// Panics at the first pair of lines out of key order.
///
/// # Example
///
/// ```
/// use ironshuffle::testing::{assert_sorted_by, first_token};
///
/// assert_sorted_by(&["apple 1", "apple 3", "banana 2"], first_token);
/// ```
pub fn assert_sorted_by<S, K, F>(lines: &[S], key_fn: F)
where
    S: AsRef<str>,
    K: Ord + Debug,
    F: Fn(&str) -> anyhow::Result<K>,
{
    let mut prev: Option<(usize, K)> = None;
    for (i, line) in lines.iter().enumerate() {
        let Ok(key) = key_fn(line.as_ref()) else {
            continue;
        };
        if let Some((j, p)) = &prev {
            assert!(
                p <= &key,
                "Lines out of key order:\n  line {j} key: {p:?}\n  line {i} key: {key:?}\n  line {i}: {:?}",
                line.as_ref()
            );
        }
        prev = Some((i, key));
    }
}

/// [`assert_sorted_by`] over the lines of a file.
///
/// # Panics
///
/// Panics if the file cannot be read or is out of key order.
pub fn assert_file_sorted_by<K, F>(path: impl AsRef<Path>, key_fn: F)
where
    K: Ord + Debug,
    F: Fn(&str) -> anyhow::Result<K>,
{
    let path = path.as_ref();
    let lines = read_lines(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {e}", path.display()));
    assert_sorted_by(&lines, key_fn);
}

/// Assert that two line collections hold the same lines with the same multiplicities,
/// ignoring order.
///
/// # Panics
///
/// Panics if any line occurs a different number of times.
///
/// ```
/// use ironshuffle::testing::assert_same_lines;
///
/// assert_same_lines(&["b", "a", "a"], &["a", "b", "a"]);
/// ```
pub fn assert_same_lines<A: AsRef<str>, B: AsRef<str>>(actual: &[A], expected: &[B]) {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for l in actual {
        *counts.entry(l.as_ref()).or_default() += 1;
    }
    for l in expected {
        *counts.entry(l.as_ref()).or_default() -= 1;
    }
    let mut diff: Vec<(&str, i64)> = counts.into_iter().filter(|(_, n)| *n != 0).collect();
    diff.sort_unstable();
    assert!(
        diff.is_empty(),
        "Line multisets differ (positive = extra, negative = missing): {diff:?}\n  Actual length: {}\n  Expected length: {}",
        actual.len(),
        expected.len()
    );
}
