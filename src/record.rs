//! Record shapes and their line encoding.
//!
//! Every record that reaches a shard is written as exactly one line:
//!
//! | Shape | Line |
//! |---|---|
//! | [`Record::Scalar`] | written verbatim; a `\n` is appended only if missing |
//! | [`Record::Fields`] | fields joined by the shard delimiter |
//! | [`Record::Mapping`] | compact JSON object |
//! | [`Record::Bytes`] | rejected with [`ShuffleError::UnsupportedRecordShape`] |
//!
//! A scalar with a newline before its end, or a field holding a newline or the delimiter,
//! cannot be written as one splittable line and is rejected like [`Record::Bytes`].

use crate::error::{Result, ShuffleError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;

/// Default delimiter for [`Record::Fields`]: a single NUL byte.
pub const DEFAULT_DELIMITER: &str = "\0";

/// An opaque unit of data flowing through the shuffle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Record {
    /// A raw string, usually one line read from a file (including its newline).
    Scalar(String),
    /// An ordered sequence of fields.
    Fields(Vec<String>),
    /// A key/value mapping.
    Mapping(Map<String, Value>),
    /// Binary payload. Cannot be represented in the line format.
    Bytes(Vec<u8>),
}

/// Discriminant of a [`Record`], used in logs and dead letters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordShape {
    Scalar,
    Fields,
    Mapping,
    Bytes,
}

impl fmt::Display for RecordShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scalar => "scalar",
            Self::Fields => "fields",
            Self::Mapping => "mapping",
            Self::Bytes => "bytes",
        };
        f.write_str(s)
    }
}

impl Record {
    #[must_use]
    pub fn shape(&self) -> RecordShape {
        match self {
            Self::Scalar(_) => RecordShape::Scalar,
            Self::Fields(_) => RecordShape::Fields,
            Self::Mapping(_) => RecordShape::Mapping,
            Self::Bytes(_) => RecordShape::Bytes,
        }
    }

    /// The scalar payload, if this is a [`Record::Scalar`].
    #[must_use]
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_fields(&self) -> Option<&[String]> {
        match self {
            Self::Fields(f) => Some(f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_mapping(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Encode this record as one newline-terminated line.
    ///
    /// # Errors
    /// Returns [`ShuffleError::UnsupportedRecordShape`] for [`Record::Bytes`], for a scalar
    /// with an interior newline and for a field holding a newline or the delimiter.
    /// Returns [`ShuffleError::Json`] if a mapping fails to serialize.
    pub fn to_line(&self, delimiter: &str) -> Result<Cow<'_, str>> {
        match self {
            Self::Scalar(s) => {
                let body = s.strip_suffix('\n').unwrap_or(s);
                if body.contains('\n') {
                    return Err(ShuffleError::UnsupportedRecordShape(format!(
                        "scalar spans {} lines",
                        body.matches('\n').count() + 1
                    )));
                }
                if s.ends_with('\n') {
                    Ok(Cow::Borrowed(s))
                } else {
                    Ok(Cow::Owned(format!("{s}\n")))
                }
            }
            Self::Fields(fields) => {
                if let Some(i) = fields
                    .iter()
                    .position(|f| f.contains('\n') || (!delimiter.is_empty() && f.contains(delimiter)))
                {
                    return Err(ShuffleError::UnsupportedRecordShape(format!(
                        "field {i} contains a newline or the delimiter {delimiter:?}"
                    )));
                }
                let mut line = fields.join(delimiter);
                line.push('\n');
                Ok(Cow::Owned(line))
            }
            Self::Mapping(map) => {
                let mut line = serde_json::to_string(map)?;
                line.push('\n');
                Ok(Cow::Owned(line))
            }
            Self::Bytes(b) => Err(ShuffleError::UnsupportedRecordShape(format!(
                "binary record of {} bytes has no line encoding",
                b.len()
            ))),
        }
    }

    /// Short human-readable rendering for logs and dead letters.
    #[must_use]
    pub fn preview(&self) -> String {
        match self {
            Self::Scalar(s) => s.trim_end_matches(['\r', '\n']).to_string(),
            Self::Fields(f) => serde_json::to_string(f).unwrap_or_default(),
            Self::Mapping(m) => serde_json::to_string(m).unwrap_or_default(),
            Self::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }
}

impl From<String> for Record {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<&str> for Record {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<Vec<String>> for Record {
    fn from(value: Vec<String>) -> Self {
        Self::Fields(value)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(value: Map<String, Value>) -> Self {
        Self::Mapping(value)
    }
}

impl From<Vec<u8>> for Record {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}
