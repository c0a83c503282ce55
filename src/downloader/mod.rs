//! Retrieval orchestration and rate limiting
//!
//! # Overview
//!
//! A retrieval run follows a fixed pipeline:
//!
//! 1. **Planning**: [`planner::WindowPlanner`] splits the overall range into
//!    contiguous, half-open windows
//! 2. **Pagination**: [`crate::fetcher::WindowPaginator`] exhausts each window,
//!    throttling every call through [`rate_limit::RateLimiter`]
//! 3. **Aggregation**: [`engine::RetrievalEngine`] concatenates window batches in
//!    plan order into an [`AggregateResult`]
//! 4. **Handoff**: the finished aggregate is given, whole, to a
//!    [`crate::output::RecordsWriter`]
//!
//! # Error Handling
//!
//! Every fetch failure is fatal: the run returns `Err(DownloadError)` and no
//! aggregate is produced. There is no retry and no skip-and-continue.

pub mod config;
pub mod engine;
pub mod job;
pub mod planner;
pub mod rate_limit;

pub use engine::RetrievalEngine;
pub use job::{AggregateResult, RetrievalJob, RunStats};
pub use planner::{ChunkSpan, PlanError, WindowPlanner};
pub use rate_limit::RateLimiter;

use crate::fetcher::FetcherError;
use crate::output::OutputError;

/// Retrieval errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// A page call failed; the whole run is aborted
    #[error("fetch failed: {0}")]
    Fetcher(#[from] FetcherError),

    /// The overall range or chunk could not be planned
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),

    /// Job parameters rejected before any call was issued
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Shutdown was requested before the run finished
    #[error("retrieval cancelled: {0}")]
    Cancelled(String),

    /// Writing the finished aggregate failed
    #[error("output error: {0}")]
    Output(#[from] OutputError),
}
