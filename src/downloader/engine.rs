//! Retrieval engine
//!
//! Composes planning, pagination, and throttling into one ordered result. With
//! the default concurrency of one, window N is fully retrieved before window N+1
//! begins. With higher concurrency, windows are fetched through a bounded
//! unordered buffer, every batch carries its plan index, and batches are sorted
//! before concatenation. All workers share one [`RateLimiter`].

use crate::downloader::config::{
    DEFAULT_CONCURRENCY, DEFAULT_MIN_INTERVAL, MAX_CONCURRENCY, MAX_PAGES_PER_WINDOW,
};
use crate::downloader::{AggregateResult, DownloadError, RateLimiter, RetrievalJob, RunStats};
use crate::fetcher::{
    ApiConfig, FetcherError, HttpPageFetcher, PageFetcher, WindowBatch, WindowPaginator,
};
use crate::format_timestamp;
use crate::metrics::RetrievalMetrics;
use crate::output::RecordsWriter;
use crate::shutdown::SharedShutdown;
use futures::stream::{self, StreamExt, TryStreamExt};
use indicatif::ProgressBar;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

/// Runs retrieval jobs against one page fetcher
pub struct RetrievalEngine {
    fetcher: Arc<dyn PageFetcher>,
    rate_limiter: Arc<RateLimiter>,
    concurrency: usize,
    max_pages: u32,
    shutdown: Option<SharedShutdown>,
}

impl RetrievalEngine {
    /// Create an engine
    ///
    /// # Arguments
    /// * `fetcher` - Performs each page call
    /// * `rate_limiter` - Shared by every call the engine issues
    pub fn new(fetcher: Arc<dyn PageFetcher>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            fetcher,
            rate_limiter,
            concurrency: DEFAULT_CONCURRENCY,
            max_pages: MAX_PAGES_PER_WINDOW,
            shutdown: None,
        }
    }

    /// Engine for the default endpoint with the default 10 second spacing
    pub fn with_defaults() -> Result<Self, DownloadError> {
        let fetcher = HttpPageFetcher::with_config(ApiConfig::default())?;
        Ok(Self::new(
            Arc::new(fetcher),
            Arc::new(RateLimiter::new(DEFAULT_MIN_INTERVAL)),
        ))
    }

    /// Number of windows fetched at once, clamped to `1..=MAX_CONCURRENCY`
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    /// Override the per-window page ceiling
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Attach a shared shutdown handle for graceful cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Limiter shared by all calls of this engine
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Configured concurrency
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Retrieve every record of `job`
    ///
    /// The progress bar, if given, advances by one per completed window.
    ///
    /// # Errors
    /// Any failed call aborts the run; no partial aggregate is returned.
    pub async fn run(
        &self,
        job: &RetrievalJob,
        progress: Option<&ProgressBar>,
    ) -> Result<AggregateResult, DownloadError> {
        let span = tracing::info_span!(
            "retrieval",
            service_code = %job.filter.service_code,
            start = %format_timestamp(&job.start),
            end = %format_timestamp(&job.end),
        );

        async {
            let metrics = RetrievalMetrics::start(job.filter.service_code.as_str());

            match self.run_windows(job, progress).await {
                Ok(aggregate) => {
                    let stats = aggregate.stats();
                    metrics.record_success(stats.records, stats.windows, stats.pages);
                    Ok(aggregate)
                }
                Err(e) => {
                    metrics.record_failure(&e.to_string());
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Retrieve `job`, then hand the finished aggregate to `writer`
    ///
    /// The writer is only invoked after every window succeeded, so the output is
    /// either complete or absent.
    pub async fn execute<W: RecordsWriter>(
        &self,
        job: &RetrievalJob,
        mut writer: W,
        progress: Option<&ProgressBar>,
    ) -> Result<RunStats, DownloadError> {
        let aggregate = self.run(job, progress).await?;

        writer.write_records(aggregate.records())?;
        writer.finish()?;

        Ok(aggregate.stats())
    }

    async fn run_windows(
        &self,
        job: &RetrievalJob,
        progress: Option<&ProgressBar>,
    ) -> Result<AggregateResult, DownloadError> {
        job.validate(self.fetcher.max_page_size())
            .map_err(DownloadError::ValidationError)?;

        let planner = job.planner()?;
        let window_count = planner.window_count();

        info!(
            windows = window_count,
            chunk = %planner.chunk(),
            page_size = job.page_size,
            concurrency = self.concurrency,
            "Starting retrieval"
        );

        if let Some(pb) = progress {
            pb.set_length(window_count as u64);
        }

        let paginator = WindowPaginator::new(
            self.fetcher.as_ref(),
            self.rate_limiter.as_ref(),
            job.page_size,
        )
        .with_max_pages(self.max_pages)
        .with_shutdown(self.shutdown.as_deref());

        let paginator = &paginator;
        let filter = &job.filter;

        let mut batches: Vec<WindowBatch> = stream::iter(planner.windows().enumerate())
            .map(move |(index, window)| paginator.paginate(index, filter, window))
            .buffer_unordered(self.concurrency)
            .inspect_ok(|batch| {
                info!(
                    window = %batch.window,
                    records = batch.records.len(),
                    pages = batch.pages,
                    "Window complete"
                );
                if let Some(pb) = progress {
                    pb.inc(1);
                }
            })
            .try_collect()
            .await
            .map_err(|e| match e {
                FetcherError::Interrupted { .. } => {
                    warn!("Retrieval interrupted by shutdown request");
                    DownloadError::Cancelled(e.to_string())
                }
                other => DownloadError::Fetcher(other),
            })?;

        batches.sort_by_key(|batch| batch.index);

        let mut stats = RunStats {
            windows: batches.len() as u64,
            ..RunStats::default()
        };
        let mut records = Vec::with_capacity(batches.iter().map(|b| b.records.len()).sum());
        for batch in batches {
            stats.pages += u64::from(batch.pages);
            records.extend(batch.records);
        }
        stats.records = records.len() as u64;

        Ok(AggregateResult::new(records, stats))
    }
}
