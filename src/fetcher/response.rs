//! Response shape normalization
//!
//! The reporting service has been observed to wrap records differently across
//! deployments and versions. Known shapes, tried in this order:
//!
//! 1. `{"result": {"requests": [...]}}`
//! 2. `{"result": {"records": [...]}}`
//! 3. `[...]` (bare top-level list)
//!
//! Anything else normalizes to an empty page rather than an error.

use crate::Record;
use serde_json::Value;
use tracing::warn;

/// Keys under `result` that may hold the record list, in priority order
const RESULT_RECORD_KEYS: [&str; 2] = ["requests", "records"];

/// Which known shape a response body matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `result.requests`
    ResultRequests,
    /// `result.records`
    ResultRecords,
    /// Bare top-level list
    BareList,
    /// No known shape; treated as an empty page
    Unrecognized,
}

/// Extract the record list from a response body
pub fn extract_records(body: Value) -> Vec<Record> {
    let (shape, records) = extract_records_with_shape(body);
    if shape == ResponseShape::Unrecognized {
        warn!("Response did not match any known shape, treating as empty page");
    }
    records
}

/// Extract the record list and report which shape matched
pub fn extract_records_with_shape(body: Value) -> (ResponseShape, Vec<Record>) {
    match body {
        Value::Array(records) => (ResponseShape::BareList, records),
        Value::Object(mut map) => {
            let Some(Value::Object(mut result)) = map.remove("result") else {
                return (ResponseShape::Unrecognized, Vec::new());
            };

            for (key, shape) in RESULT_RECORD_KEYS
                .iter()
                .zip([ResponseShape::ResultRequests, ResponseShape::ResultRecords])
            {
                if let Some(Value::Array(records)) = result.remove(*key) {
                    return (shape, records);
                }
            }

            (ResponseShape::Unrecognized, Vec::new())
        }
        _ => (ResponseShape::Unrecognized, Vec::new()),
    }
}
