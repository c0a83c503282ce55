//! Window pagination
//!
//! Drives a [`PageFetcher`] through every page of one time window:
//!
//! 1. `throttle()` on the shared rate limiter
//! 2. fetch page `n` (starting at 1)
//! 3. append its records
//! 4. stop when the page is empty or shorter than the page size, else `n += 1`
//!
//! When a window's record count is an exact multiple of the page size, the last
//! full page is followed by one more call that returns the empty terminating page.
//!
//! Includes safety mechanisms:
//! - A page ceiling per window against servers that never return a short page
//! - Shutdown checks before each call

use crate::downloader::config::MAX_PAGES_PER_WINDOW;
use crate::downloader::rate_limit::RateLimiter;
use crate::fetcher::{FetcherError, FetcherResult, PageFetcher, PageQuery};
use crate::shutdown::ShutdownCoordinator;
use crate::{Record, ReportFilter, TimeWindow};
use tracing::debug;

/// All records of one window, tagged with the window's position in the plan
#[derive(Debug, Clone, PartialEq)]
pub struct WindowBatch {
    /// Position of the window in the plan
    pub index: usize,
    /// Window the records belong to
    pub window: TimeWindow,
    /// Records in page order, then in-page order
    pub records: Vec<Record>,
    /// Number of page calls issued, including the terminating one
    pub pages: u32,
}

/// Exhausts all pages of one window
pub struct WindowPaginator<'a> {
    fetcher: &'a dyn PageFetcher,
    rate_limiter: &'a RateLimiter,
    page_size: u32,
    max_pages: u32,
    shutdown: Option<&'a ShutdownCoordinator>,
}

impl<'a> WindowPaginator<'a> {
    /// Create a paginator
    ///
    /// # Arguments
    /// * `fetcher` - Performs each page call
    /// * `rate_limiter` - Throttled once before every call
    /// * `page_size` - Records requested per page
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        rate_limiter: &'a RateLimiter,
        page_size: u32,
    ) -> Self {
        Self {
            fetcher,
            rate_limiter,
            page_size,
            max_pages: MAX_PAGES_PER_WINDOW,
            shutdown: None,
        }
    }

    /// Override the per-window page ceiling
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Stop before the next call once shutdown is requested
    pub fn with_shutdown(mut self, shutdown: Option<&'a ShutdownCoordinator>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Fetch every page of `window`
    ///
    /// # Errors
    /// The first failing call aborts the window with
    /// [`FetcherError::PageFailed`] naming the window and page.
    pub async fn paginate(
        &self,
        index: usize,
        filter: &ReportFilter,
        window: TimeWindow,
    ) -> FetcherResult<WindowBatch> {
        let mut records = Vec::new();
        let mut page: u32 = 1;

        loop {
            if page > self.max_pages {
                return Err(FetcherError::PageLimitExceeded {
                    window,
                    max_pages: self.max_pages,
                });
            }

            if self.shutdown.is_some_and(|s| s.is_shutdown_requested()) {
                return Err(FetcherError::Interrupted { window, page });
            }

            // A shutdown during a long throttle wait ends the window immediately.
            match self.shutdown {
                Some(shutdown) => {
                    tokio::select! {
                        _ = self.rate_limiter.throttle() => {}
                        _ = shutdown.wait_for_shutdown() => {
                            return Err(FetcherError::Interrupted { window, page });
                        }
                    }
                }
                None => self.rate_limiter.throttle().await,
            }

            let query = PageQuery {
                filter,
                window,
                page,
                page_size: self.page_size,
            };

            let result = self
                .fetcher
                .fetch_page(&query)
                .await
                .map_err(|source| FetcherError::PageFailed {
                    window,
                    page,
                    source: Box::new(source),
                })?;

            let count = result.len();
            let last = result.is_last(self.page_size);
            records.extend(result.records);

            debug!(
                window = %window,
                page,
                count,
                total = records.len(),
                "Page fetched"
            );

            if last {
                break;
            }
            page += 1;
        }

        debug!(
            window = %window,
            pages = page,
            records = records.len(),
            "Window exhausted"
        );

        Ok(WindowBatch {
            index,
            window,
            records,
            pages: page,
        })
    }
}
