//! Integration tests for logging and tracing

use async_trait::async_trait;
use chrono::{TimeDelta, TimeZone, Utc};
use open311_downloader::downloader::{RateLimiter, RetrievalEngine, RetrievalJob};
use open311_downloader::fetcher::{FetcherResult, PageFetcher, PageQuery, PageResult};
use open311_downloader::ReportFilter;
use serde_json::json;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Collects formatted log output in memory
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// One record per window
struct SingleRecordFetcher;

#[async_trait]
impl PageFetcher for SingleRecordFetcher {
    async fn fetch_page(&self, query: &PageQuery<'_>) -> FetcherResult<PageResult> {
        Ok(PageResult::new(vec![
            json!({ "window_start": query.window.start().to_rfc3339() }),
        ]))
    }

    fn max_page_size(&self) -> u32 {
        100
    }
}

fn job() -> RetrievalJob {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    RetrievalJob::new(
        start,
        start + TimeDelta::days(3),
        TimeDelta::days(1),
        ReportFilter::new("Needle Pickup"),
    )
}

#[test]
fn test_env_filter_parsing() {
    for directive in [
        "info",
        "open311_downloader=debug",
        "warn,open311_downloader=trace",
    ] {
        assert!(EnvFilter::try_new(directive).is_ok(), "{directive}");
    }
}

#[tokio::test]
async fn test_run_emits_structured_events() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("open311_downloader=debug"))
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let engine = RetrievalEngine::new(
        Arc::new(SingleRecordFetcher),
        Arc::new(RateLimiter::unlimited()),
    );
    engine.run(&job(), None).await.unwrap();

    let output = logs.contents();
    assert!(output.contains("Starting retrieval"), "{output}");
    assert_eq!(output.matches("Window complete").count(), 3, "{output}");
    assert!(output.contains("Retrieval completed"), "{output}");
    assert!(output.contains("service_code=Needle Pickup"), "{output}");
}

#[tokio::test]
async fn test_json_log_lines_parse() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new("open311_downloader=info"))
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let engine = RetrievalEngine::new(
        Arc::new(SingleRecordFetcher),
        Arc::new(RateLimiter::unlimited()),
    );
    engine.run(&job(), None).await.unwrap();

    let output = logs.contents();
    let lines: Vec<serde_json::Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(!lines.is_empty());
    assert!(lines
        .iter()
        .any(|l| l["fields"]["message"] == "Retrieval completed" && l["fields"]["records"] == 3));
}
