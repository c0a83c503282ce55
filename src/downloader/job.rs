//! Retrieval job specification and run statistics

use crate::downloader::config::{DEFAULT_CHUNK_DAYS, DEFAULT_PAGE_SIZE};
use crate::downloader::planner::{PlanError, WindowPlanner};
use crate::{Record, ReportFilter};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

/// What to retrieve: one category over one overall range
#[derive(Debug, Clone)]
pub struct RetrievalJob {
    /// Inclusive start of the overall range
    pub start: DateTime<Utc>,
    /// Exclusive end of the overall range
    pub end: DateTime<Utc>,
    /// Window length
    pub chunk: TimeDelta,
    /// Category selection
    pub filter: ReportFilter,
    /// Records requested per page
    pub page_size: u32,
}

impl RetrievalJob {
    /// Create a job with the default page size
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        chunk: TimeDelta,
        filter: ReportFilter,
    ) -> Self {
        Self {
            start,
            end,
            chunk,
            filter,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Create a job with the default weekly chunk
    pub fn weekly(start: DateTime<Utc>, end: DateTime<Utc>, filter: ReportFilter) -> Self {
        Self::new(start, end, TimeDelta::days(DEFAULT_CHUNK_DAYS), filter)
    }

    /// Override the page size
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Window plan for this job
    pub fn planner(&self) -> Result<WindowPlanner, PlanError> {
        WindowPlanner::new(self.start, self.end, self.chunk)
    }

    /// Validate job parameters against the server's page size ceiling
    pub fn validate(&self, max_page_size: u32) -> Result<(), String> {
        self.planner().map_err(|e| e.to_string())?;
        self.filter.validate()?;

        if self.page_size == 0 || self.page_size > max_page_size {
            return Err(format!(
                "Page size {} must be between 1 and {}",
                self.page_size, max_page_size
            ));
        }

        Ok(())
    }
}

/// Counters for one retrieval run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Windows fully retrieved
    pub windows: u64,
    /// Page calls issued
    pub pages: u64,
    /// Records retrieved
    pub records: u64,
}

/// Every record of a run, in window order, page order, then in-page order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateResult {
    records: Vec<Record>,
    stats: RunStats,
}

impl AggregateResult {
    pub(crate) fn new(records: Vec<Record>, stats: RunStats) -> Self {
        Self { records, stats }
    }

    /// Ordered records
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Take ownership of the ordered records
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Run counters
    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the run retrieved nothing
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
