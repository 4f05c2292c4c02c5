//! Line-oriented file I/O shared by the partitioner, sorter and merge.
//!
//! Shard files hold one record per line. Readers strip the line terminator (`\n` or
//! `\r\n`) and decode invalid UTF-8 lossily; writers always terminate each line with `\n`.
//! [`LineReader::next_bytes`] gives the untouched bytes for callers that copy lines through.

use crate::error::{IoContext, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Strip one trailing `\n` or `\r\n`.
#[inline]
#[must_use]
pub fn trim_line_end(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Streaming reader over the lines of one file.
///
/// Yields `(line, raw_len)` where `line` has its terminator stripped and `raw_len` is the
/// number of bytes consumed from the file, terminator included.
pub struct LineReader {
    path: PathBuf,
    inner: BufReader<File>,
    buf: Vec<u8>,
}

impl LineReader {
    /// # Errors
    /// Returns an I/O error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let f = File::open(&path).with_path("open", &path)?;
        Ok(Self {
            path,
            inner: BufReader::new(f),
            buf: Vec::new(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the next line as raw bytes, terminator included.
    ///
    /// # Errors
    /// Returns an I/O error on read failure.
    pub fn next_bytes(&mut self) -> Result<Option<&[u8]>> {
        self.buf.clear();
        let n = self
            .inner
            .read_until(b'\n', &mut self.buf)
            .with_path("read", &self.path)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(&self.buf))
    }

    /// Read the next raw line, terminator included, decoded lossily.
    ///
    /// # Errors
    /// Returns an I/O error on read failure.
    pub fn next_raw(&mut self) -> Result<Option<(String, u64)>> {
        Ok(self
            .next_bytes()?
            .map(|b| (String::from_utf8_lossy(b).into_owned(), b.len() as u64)))
    }
}

impl Iterator for LineReader {
    type Item = Result<(String, u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_raw() {
            Ok(Some((mut line, n))) => {
                let keep = trim_line_end(&line).len();
                line.truncate(keep);
                Some(Ok((line, n)))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Read every line of a file into memory, terminators stripped.
///
/// # Errors
/// Returns an I/O error if the file cannot be opened or read.
pub fn read_lines(path: impl AsRef<Path>) -> Result<Vec<String>> {
    LineReader::open(path)?
        .map(|r| r.map(|(line, _)| line))
        .collect()
}

/// Write lines to a file (truncating it), terminating each with `\n`.
///
/// # Returns
/// The number of bytes written.
///
/// # Errors
/// Returns an I/O error if the file cannot be created or written.
pub fn write_lines<S: AsRef<str>>(path: impl AsRef<Path>, lines: &[S]) -> Result<u64> {
    let path = path.as_ref();
    let f = File::create(path).with_path("create", path)?;
    let mut w = BufWriter::new(f);
    let mut bytes = 0u64;
    for line in lines {
        let line = line.as_ref();
        w.write_all(line.as_bytes()).with_path("write", path)?;
        w.write_all(b"\n").with_path("write", path)?;
        bytes += line.len() as u64 + 1;
    }
    w.flush().with_path("flush", path)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_both_terminators() {
        assert_eq!(trim_line_end("a\n"), "a");
        assert_eq!(trim_line_end("a\r\n"), "a");
        assert_eq!(trim_line_end("a"), "a");
        assert_eq!(trim_line_end(""), "");
    }

    #[test]
    fn reader_reports_raw_lengths() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("f");
        std::fs::write(&p, "ab\r\ncd\nlast").unwrap();
        let got: Vec<_> = LineReader::open(&p)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(
            got,
            vec![
                ("ab".to_string(), 4),
                ("cd".to_string(), 3),
                ("last".to_string(), 4)
            ]
        );
    }

    #[test]
    fn next_bytes_keeps_terminators() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("f");
        std::fs::write(&p, b"a\r\n\xffb\n").unwrap();
        let mut r = LineReader::open(&p).unwrap();
        assert_eq!(r.next_bytes().unwrap(), Some(&b"a\r\n"[..]));
        assert_eq!(r.next_bytes().unwrap(), Some(&b"\xffb\n"[..]));
        assert_eq!(r.next_bytes().unwrap(), None);
    }
}
