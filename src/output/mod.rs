//! Writers for the aggregated result
//!
//! The retrieval engine hands a finished, ordered record list to a
//! [`RecordsWriter`] only after every window succeeded.

use crate::Record;
use std::str::FromStr;

pub mod json;

pub use json::JsonRecordsWriter;

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// On-disk layout of the records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFormat {
    /// One pretty-printed JSON array
    #[default]
    Json,
    /// One JSON document per line
    JsonLines,
}

impl std::fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordFormat::Json => write!(f, "json"),
            RecordFormat::JsonLines => write!(f, "jsonl"),
        }
    }
}

impl FromStr for RecordFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(RecordFormat::Json),
            "jsonl" | "ndjson" => Ok(RecordFormat::JsonLines),
            _ => Err(format!("Invalid record format: {s}. Valid options: json, jsonl")),
        }
    }
}

/// Persists a finished aggregate
pub trait RecordsWriter {
    /// Write the ordered records
    fn write_records(&mut self, records: &[Record]) -> OutputResult<()>;

    /// Finalize output; nothing is visible at the destination before this succeeds
    fn finish(self) -> OutputResult<()>;
}
