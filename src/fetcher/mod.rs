//! Page fetchers
//!
//! A [`PageFetcher`] performs exactly one bounded retrieval call per
//! [`PageQuery`] and returns the records of that page. [`http::HttpPageFetcher`]
//! is the production implementation; tests substitute scripted fetchers.

use crate::{Record, ReportFilter, TimeWindow};
use async_trait::async_trait;

pub mod api_config;
pub mod http;
pub mod pagination;
pub mod response;
pub mod shared_resources;

pub use api_config::{ApiConfig, WindowParams};
pub use http::HttpPageFetcher;
pub use pagination::{WindowBatch, WindowPaginator};

/// Fetcher errors
///
/// `Transport`, `HttpStatus`, and `Parse` are fatal to the whole retrieval run.
/// An empty page is not an error; it is the pagination termination signal.
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// The call never completed (connection refused, timeout, DNS)
    #[error("transport error: {0}")]
    Transport(String),

    /// The call completed with a non-success status
    #[error("HTTP status {status}: {body}")]
    HttpStatus {
        /// Status code returned by the server
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Response body is not valid JSON
    #[error("parse error: {0}")]
    Parse(String),

    /// Query rejected before any call was issued
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A window kept returning full pages past the safety ceiling
    #[error("window {window} exceeded {max_pages} pages without a short page")]
    PageLimitExceeded {
        /// Window being paginated
        window: TimeWindow,
        /// Ceiling that was hit
        max_pages: u32,
    },

    /// Shutdown was requested before the next call
    #[error("interrupted before window {window} page {page}")]
    Interrupted {
        /// Window being paginated
        window: TimeWindow,
        /// Page that would have been fetched next
        page: u32,
    },

    /// A page call failed; carries the window and page for diagnosis
    #[error("window {window} page {page}: {source}")]
    PageFailed {
        /// Window being paginated
        window: TimeWindow,
        /// 1-based page number of the failed call
        page: u32,
        /// Underlying failure
        #[source]
        source: Box<FetcherError>,
    },
}

impl FetcherError {
    /// Innermost error, unwrapping any `PageFailed` context
    pub fn root_cause(&self) -> &FetcherError {
        match self {
            FetcherError::PageFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Parameters of a single page call
#[derive(Debug, Clone, Copy)]
pub struct PageQuery<'a> {
    /// Category selection
    pub filter: &'a ReportFilter,
    /// Time bounds of the enclosing window
    pub window: TimeWindow,
    /// 1-based page number
    pub page: u32,
    /// Requested records per page
    pub page_size: u32,
}

/// Records of one page, in server order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResult {
    /// Page contents
    pub records: Vec<Record>,
}

impl PageResult {
    /// Wrap a list of records
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Number of records on this page
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the page carried no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether this page ends its window: empty, or shorter than requested
    pub fn is_last(&self, page_size: u32) -> bool {
        self.records.len() < page_size as usize
    }
}

/// Performs one bounded retrieval call
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a single page
    ///
    /// # Errors
    /// Returns [`FetcherError::Transport`], [`FetcherError::HttpStatus`], or
    /// [`FetcherError::Parse`]; no retry is attempted.
    async fn fetch_page(&self, query: &PageQuery<'_>) -> FetcherResult<PageResult>;

    /// Largest page size the server accepts
    fn max_page_size(&self) -> u32;
}
