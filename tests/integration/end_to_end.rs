//! End-to-end retrieval against a mock reporting API
//!
//! Tests verify:
//! - Exact call and throttle counts for a two-window run
//! - Order preservation across windows, pages, and in-page position
//! - The same order when windows are fetched concurrently
//! - Fail-fast: one failing window (bad status or unparseable body) means no
//!   output at all

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use open311_downloader::downloader::{DownloadError, RateLimiter, RetrievalEngine, RetrievalJob};
use open311_downloader::fetcher::{ApiConfig, FetcherError, HttpPageFetcher};
use open311_downloader::output::{JsonRecordsWriter, RecordFormat};
use open311_downloader::{Record, ReportFilter};
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const REQUESTS_PATH: &str = "/open311/v2/requests.json";

fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Serves `counts[i]` sequential markers for the i-th weekly window
struct MarkerResponder {
    counts: Vec<usize>,
    failure: Option<(usize, ResponseTemplate)>,
}

impl Respond for MarkerResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let params: HashMap<String, String> = request.url.query_pairs().into_owned().collect();
        let after = DateTime::parse_from_rfc3339(&params["updated_after"])
            .unwrap()
            .with_timezone(&Utc);
        let index = ((after - origin()).num_days() / 7) as usize;
        let page: usize = params["page"].parse().unwrap();
        let per_page: usize = params["per_page"].parse().unwrap();

        if let Some((window, response)) = &self.failure {
            if *window == index {
                return response.clone();
            }
        }

        let total = self.counts[index];
        let from = ((page - 1) * per_page).min(total);
        let to = (from + per_page).min(total);
        let records: Vec<_> = (from..to)
            .map(|seq| {
                json!({
                    "service_request_id": format!("{index}-{seq}"),
                    "window": index,
                    "seq": seq
                })
            })
            .collect();

        // Earlier windows answer slower so concurrent runs complete out of order.
        let delay = Duration::from_millis(((self.counts.len() - index) * 10) as u64);
        ResponseTemplate::new(200)
            .set_body_json(json!({ "result": { "requests": records } }))
            .set_delay(delay)
    }
}

async fn marker_server(
    counts: Vec<usize>,
    failure: Option<(usize, ResponseTemplate)>,
) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(REQUESTS_PATH))
        .respond_with(MarkerResponder {
            counts,
            failure,
        })
        .mount(&server)
        .await;
    server
}

fn engine(server: &MockServer, limiter: Arc<RateLimiter>) -> RetrievalEngine {
    let config = ApiConfig::default().with_endpoint(format!("{}{}", server.uri(), REQUESTS_PATH));
    let fetcher = HttpPageFetcher::with_config(config).unwrap();
    RetrievalEngine::new(Arc::new(fetcher), limiter)
}

fn job(weeks: i64, page_size: u32) -> RetrievalJob {
    RetrievalJob::weekly(
        origin(),
        origin() + TimeDelta::weeks(weeks),
        ReportFilter::new("Mayor's 24 Hour Hotline:Needle Program:Needle Pickup"),
    )
    .with_page_size(page_size)
}

fn markers(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| r["service_request_id"].as_str().unwrap().to_string())
        .collect()
}

fn expected_markers(counts: &[usize]) -> Vec<String> {
    counts
        .iter()
        .enumerate()
        .flat_map(|(w, &n)| (0..n).map(move |i| format!("{w}-{i}")))
        .collect()
}

#[tokio::test]
async fn test_two_window_scenario_counts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("updated_after", "2024-01-01T00:00:00Z"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "requests": [{ "id": "r1" }, { "id": "r2" }] }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("updated_after", "2024-01-01T00:00:00Z"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "requests": [{ "id": "r3" }] }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("updated_after", "2024-01-08T00:00:00Z"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "requests": [] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let limiter = Arc::new(RateLimiter::unlimited());
    let engine = engine(&server, limiter.clone());

    let aggregate = engine.run(&job(2, 2), None).await.unwrap();

    assert_eq!(
        aggregate.records(),
        &[json!({ "id": "r1" }), json!({ "id": "r2" }), json!({ "id": "r3" })]
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(limiter.throttle_count(), 3);
}

#[tokio::test]
async fn test_order_preserved_across_windows_and_pages() {
    let counts = vec![5, 0, 2, 7];
    let server = marker_server(counts.clone(), None).await;

    let aggregate = engine(&server, Arc::new(RateLimiter::unlimited()))
        .run(&job(4, 2), None)
        .await
        .unwrap();

    assert_eq!(markers(aggregate.records()), expected_markers(&counts));
    let stats = aggregate.stats();
    assert_eq!(stats.windows, 4);
    // ceil(5/2) + 1 + (2/2 + 1) + ceil(7/2)
    assert_eq!(stats.pages, 3 + 1 + 2 + 4);
    assert_eq!(stats.records, 14);
}

#[tokio::test]
async fn test_order_preserved_with_concurrent_windows() {
    let counts = vec![3, 6, 0, 1, 4, 2];
    let server = marker_server(counts.clone(), None).await;

    let aggregate = engine(&server, Arc::new(RateLimiter::unlimited()))
        .with_concurrency(3)
        .run(&job(6, 2), None)
        .await
        .unwrap();

    assert_eq!(markers(aggregate.records()), expected_markers(&counts));
}

#[tokio::test]
async fn test_failing_window_leaves_no_output() {
    let unavailable = ResponseTemplate::new(503).set_body_string("service unavailable");
    let server = marker_server(vec![2, 2, 2, 2, 2], Some((2, unavailable))).await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("reports.json");

    let writer = JsonRecordsWriter::new(&output, RecordFormat::Json).unwrap();
    let err = engine(&server, Arc::new(RateLimiter::unlimited()))
        .execute(&job(5, 5), writer, None)
        .await
        .unwrap_err();

    match &err {
        DownloadError::Fetcher(inner) => assert!(matches!(
            inner.root_cause(),
            FetcherError::HttpStatus { status: 503, .. }
        )),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("2024-01-15T00:00:00Z"));

    assert!(!output.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

    // Windows after the failing one are never requested.
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_html_body_in_window_aborts_run() {
    let maintenance = ResponseTemplate::new(200)
        .insert_header("content-type", "text/html")
        .set_body_string("<html><body>Down for maintenance</body></html>");
    let server = marker_server(vec![2, 2, 2, 2], Some((1, maintenance))).await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("reports.json");

    let writer = JsonRecordsWriter::new(&output, RecordFormat::Json).unwrap();
    let err = engine(&server, Arc::new(RateLimiter::unlimited()))
        .execute(&job(4, 5), writer, None)
        .await
        .unwrap_err();

    match &err {
        DownloadError::Fetcher(inner @ FetcherError::PageFailed { page: 1, .. }) => {
            assert!(matches!(inner.root_cause(), FetcherError::Parse(_)), "{err:?}")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("2024-01-08T00:00:00Z"));

    assert!(!output.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_successful_run_writes_pretty_array() {
    let counts = vec![2, 1];
    let server = marker_server(counts.clone(), None).await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("reports.json");

    let writer = JsonRecordsWriter::new(&output, RecordFormat::Json).unwrap();
    let stats = engine(&server, Arc::new(RateLimiter::unlimited()))
        .execute(&job(2, 100), writer, None)
        .await
        .unwrap();

    assert_eq!(stats.records, 3);
    let content = fs::read_to_string(&output).unwrap();
    assert!(content.starts_with("[\n  {"), "not indented: {content}");
    let records: Vec<Record> = serde_json::from_str(&content).unwrap();
    assert_eq!(markers(&records), expected_markers(&counts));
}

#[tokio::test]
async fn test_calls_are_spaced_by_limiter() {
    let server = marker_server(vec![1, 1, 1], None).await;
    let interval = Duration::from_millis(60);

    let started = std::time::Instant::now();
    engine(&server, Arc::new(RateLimiter::new(interval)))
        .run(&job(3, 10), None)
        .await
        .unwrap();

    // Three calls: the first is immediate, the next two wait a full interval.
    assert!(started.elapsed() >= interval * 2);
}
