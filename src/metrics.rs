//! Observability metrics for retrieval runs
//!
//! Metrics are recorded through the `metrics` facade and are no-ops until
//! [`init_metrics`] installs the Prometheus exporter, so library code records
//! unconditionally.
//!
//! - `http_requests_total{status}` / `http_request_duration_seconds`
//! - `throttle_calls_total` / `rate_limit_wait_seconds`
//! - `records_retrieved_total`
//! - `retrievals_completed_total` / `retrievals_failed_total`

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

static METRICS_INSTALLED: OnceCell<()> = OnceCell::new();

static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Metrics setup errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed (port in use, recorder already set)
    #[error("failed to install Prometheus exporter on {addr}: {reason}")]
    Install {
        /// Requested listen address
        addr: SocketAddr,
        /// Exporter error text
        reason: String,
    },
}

/// Install the Prometheus exporter and register metric descriptions
///
/// Idempotent: later calls return `Ok(())` without reinstalling, and concurrent
/// callers block until the first installation finishes. Must be called from
/// within a tokio runtime because the exporter spawns its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if METRICS_INSTALLED.get().is_some() {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    METRICS_INSTALLED
        .get_or_try_init(|| install_exporter(addr))
        .map(|_| ())
}

fn install_exporter(addr: SocketAddr) -> Result<(), MetricsError> {
    info!("Initializing metrics exporter on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install {
            addr,
            reason: e.to_string(),
        })?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of page requests sent to the reporting API"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "Page request duration in seconds"
    );
    describe_counter!(
        "throttle_calls_total",
        Unit::Count,
        "Total number of rate limiter throttle invocations"
    );
    describe_histogram!(
        "rate_limit_wait_seconds",
        Unit::Seconds,
        "Time spent waiting in the rate limiter before a call"
    );
    describe_counter!(
        "records_retrieved_total",
        Unit::Count,
        "Total number of records retrieved"
    );
    describe_counter!(
        "retrievals_completed_total",
        Unit::Count,
        "Total number of retrieval runs that completed"
    );
    describe_counter!(
        "retrievals_failed_total",
        Unit::Count,
        "Total number of retrieval runs that failed"
    );

    Ok(())
}

/// Whether the exporter has been installed
pub fn is_initialized() -> bool {
    METRICS_INSTALLED.get().is_some()
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing and outcome of one page request
pub struct HttpRequestMetrics {
    page: u32,
    start_time: Instant,
    correlation_id: String,
}

impl HttpRequestMetrics {
    /// Start recording a page request
    pub fn start(page: u32) -> Self {
        Self {
            page,
            start_time: Instant::now(),
            correlation_id: generate_correlation_id(),
        }
    }

    /// Record a completed request
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!("http_requests_total", "status" => status_code.to_string()).increment(1);
        histogram!("http_request_duration_seconds").record(duration.as_secs_f64());

        debug!(
            correlation_id = %self.correlation_id,
            page = self.page,
            status = status_code,
            duration_ms = duration.as_millis() as u64,
            "Page request completed"
        );
    }

    /// Record a request that never produced a status code
    pub fn record_transport_error(&self) {
        let duration = self.start_time.elapsed();

        counter!("http_requests_total", "status" => "transport_error").increment(1);
        histogram!("http_request_duration_seconds").record(duration.as_secs_f64());

        warn!(
            correlation_id = %self.correlation_id,
            page = self.page,
            duration_ms = duration.as_millis() as u64,
            "Page request failed before a response arrived"
        );
    }

    /// Correlation ID attached to this request's log lines
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record one throttle invocation and the time it waited
pub fn record_throttle(wait: Duration) {
    counter!("throttle_calls_total").increment(1);
    histogram!("rate_limit_wait_seconds").record(wait.as_secs_f64());
}

/// Lifecycle metrics of one retrieval run
pub struct RetrievalMetrics {
    service_code: String,
    start_time: Instant,
}

impl RetrievalMetrics {
    /// Start tracking a retrieval run
    pub fn start(service_code: impl Into<String>) -> Self {
        let service_code = service_code.into();
        info!(service_code = %service_code, "Retrieval started");

        Self {
            service_code,
            start_time: Instant::now(),
        }
    }

    /// Record a completed run
    pub fn record_success(&self, records: u64, windows: u64, pages: u64) {
        counter!("retrievals_completed_total").increment(1);
        counter!("records_retrieved_total").increment(records);

        info!(
            service_code = %self.service_code,
            records,
            windows,
            pages,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Retrieval completed"
        );
    }

    /// Record a failed run
    pub fn record_failure(&self, error: &str) {
        counter!("retrievals_failed_total").increment(1);

        error!(
            service_code = %self.service_code,
            error = %error,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Retrieval failed"
        );
    }
}
