//! Integration tests for rate limiting functionality

use async_trait::async_trait;
use chrono::{TimeDelta, TimeZone, Utc};
use open311_downloader::downloader::{RateLimiter, RetrievalEngine, RetrievalJob};
use open311_downloader::fetcher::{FetcherResult, PageFetcher, PageQuery, PageResult};
use open311_downloader::ReportFilter;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Records the instant of every call; each window holds `per_window` records
struct TimingFetcher {
    per_window: usize,
    calls: Mutex<Vec<Instant>>,
}

impl TimingFetcher {
    fn new(per_window: usize) -> Self {
        Self {
            per_window,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_times(&self) -> Vec<Instant> {
        let mut times = self.calls.lock().unwrap().clone();
        times.sort();
        times
    }
}

#[async_trait]
impl PageFetcher for TimingFetcher {
    async fn fetch_page(&self, query: &PageQuery<'_>) -> FetcherResult<PageResult> {
        self.calls.lock().unwrap().push(Instant::now());
        // Simulated network latency
        tokio::time::sleep(Duration::from_secs(3)).await;

        let size = query.page_size as usize;
        let from = ((query.page as usize - 1) * size).min(self.per_window);
        let to = (from + size).min(self.per_window);
        Ok(PageResult::new((from..to).map(|i| json!({ "seq": i })).collect()))
    }

    fn max_page_size(&self) -> u32 {
        100
    }
}

fn job(days: i64, page_size: u32) -> RetrievalJob {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    RetrievalJob::new(
        start,
        start + TimeDelta::days(days),
        TimeDelta::days(1),
        ReportFilter::new("Needle Pickup"),
    )
    .with_page_size(page_size)
}

fn assert_spaced(times: &[Instant], interval: Duration) {
    for pair in times.windows(2) {
        assert!(
            pair[1] - pair[0] >= interval,
            "calls only {:?} apart",
            pair[1] - pair[0]
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_sequential_calls_respect_interval() {
    let fetcher = Arc::new(TimingFetcher::new(5));
    let limiter = Arc::new(RateLimiter::new(Duration::from_secs(10)));
    let engine = RetrievalEngine::new(fetcher.clone(), limiter.clone());

    engine.run(&job(3, 2), None).await.unwrap();

    let times = fetcher.call_times();
    // ceil(5/2) calls per window
    assert_eq!(times.len(), 9);
    assert_eq!(limiter.throttle_count(), 9);
    assert_spaced(&times, Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_windows_share_one_limiter() {
    let fetcher = Arc::new(TimingFetcher::new(1));
    let limiter = Arc::new(RateLimiter::new(Duration::from_secs(10)));
    let engine = RetrievalEngine::new(fetcher.clone(), limiter.clone()).with_concurrency(4);

    let start = Instant::now();
    engine.run(&job(8, 10), None).await.unwrap();

    let times = fetcher.call_times();
    assert_eq!(times.len(), 8);
    assert_spaced(&times, Duration::from_secs(10));
    // The limiter, not latency, bounds the run: 7 spaced gaps plus the last call.
    assert!(Instant::now() - start >= Duration::from_secs(70));
}

#[tokio::test(start_paused = true)]
async fn test_per_minute_limiter_stays_within_quota() {
    let fetcher = Arc::new(TimingFetcher::new(0));
    let limiter = Arc::new(RateLimiter::per_minute(10));
    let engine = RetrievalEngine::new(fetcher.clone(), limiter);

    engine.run(&job(12, 100), None).await.unwrap();

    let times = fetcher.call_times();
    assert_eq!(times.len(), 12);
    // No 60 second span may contain 11 calls.
    for chunk in times.windows(11) {
        assert!(chunk[10] - chunk[0] > Duration::from_secs(60));
    }
}
