//! # Open311 Downloader Library
//!
//! Exhaustive retrieval of service request history from paginated, rate-limited
//! Open311-style reporting APIs.
//!
//! Reporting endpoints cap the page size *and* silently cap the total number of
//! results a single query can page through. Fetching a multi-year history with one
//! query therefore loses data without any error. This crate partitions the requested
//! range into small time windows, pages through each window until it is exhausted,
//! throttles every outbound call, and concatenates the results in order.
//!
//! ## Quick Start
//!
//! ```no_run
//! use open311_downloader::downloader::{RetrievalEngine, RetrievalJob};
//! use open311_downloader::ReportFilter;
//! use chrono::{TimeDelta, TimeZone, Utc};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let job = RetrievalJob::new(
//!     Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
//!     Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
//!     TimeDelta::days(7),
//!     ReportFilter::new("Mayor's 24 Hour Hotline:Needle Program:Needle Pickup"),
//! );
//!
//! let engine = RetrievalEngine::with_defaults()?;
//! let aggregate = engine.run(&job, None).await?;
//! println!("retrieved {} records", aggregate.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`downloader::planner`] - splits the overall range into contiguous windows
//! - [`downloader::rate_limit`] - minimum spacing between outbound calls
//! - [`fetcher`] - one page per call, with response-shape normalization
//! - [`fetcher::pagination`] - exhausts all pages of a single window
//! - [`downloader::engine`] - composes the above into one ordered result
//! - [`output`] - writers that persist the finished result
//!
//! Records are opaque JSON documents ([`Record`]); the engine counts them but never
//! inspects their fields, and it does not deduplicate records that appear in two
//! adjacent windows.

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::Serialize;

/// CLI command implementations
pub mod cli;

/// Retrieval orchestration
pub mod downloader;

/// Page fetchers
pub mod fetcher;

/// Prometheus metrics and request correlation
pub mod metrics;

/// Writers for the aggregated result
pub mod output;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

pub use downloader::{AggregateResult, RetrievalEngine, RetrievalJob};

/// One opaque report document as returned by the API
pub type Record = serde_json::Value;

/// Half-open time interval `[start, end)` bounding one query's result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window, rejecting empty or inverted intervals
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, String> {
        if start >= end {
            return Err(format!(
                "Window end ({}) must be after window start ({})",
                format_timestamp(&end),
                format_timestamp(&start)
            ));
        }
        Ok(Self { start, end })
    }

    /// Inclusive lower bound
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive upper bound
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Length of the window
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Whether `ts` falls inside `[start, end)`
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {})",
            format_timestamp(&self.start),
            format_timestamp(&self.end)
        )
    }
}

/// Format a timestamp the way the API expects it (RFC 3339, UTC, whole seconds)
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Selects which report category to retrieve
///
/// The service code is the fixed category identifier (for example
/// `"Mayor's 24 Hour Hotline:Needle Program:Needle Pickup"`). Extra parameters are
/// forwarded verbatim on every page request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportFilter {
    /// Service category identifier
    pub service_code: String,
    /// Additional fixed query parameters
    pub extra_params: Vec<(String, String)>,
}

impl ReportFilter {
    /// Filter on a single service code
    pub fn new(service_code: impl Into<String>) -> Self {
        Self {
            service_code: service_code.into(),
            extra_params: Vec::new(),
        }
    }

    /// Add an extra fixed query parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.push((key.into(), value.into()));
        self
    }

    /// Validate filter contents
    pub fn validate(&self) -> Result<(), String> {
        if self.service_code.trim().is_empty() {
            return Err("Service code cannot be empty".to_string());
        }

        if let Some((key, _)) = self.extra_params.iter().find(|(k, _)| k.trim().is_empty()) {
            return Err(format!("Extra parameter name cannot be empty (got '{key}')"));
        }

        Ok(())
    }
}
