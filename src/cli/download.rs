//! Download command implementation

use crate::downloader::config::{
    DEFAULT_CONCURRENCY, DEFAULT_MIN_INTERVAL, DEFAULT_PAGE_SIZE, MAX_CONCURRENCY,
};
use crate::downloader::{
    ChunkSpan, DownloadError, RateLimiter, RetrievalEngine, RetrievalJob, RunStats, WindowPlanner,
};
use crate::fetcher::api_config::{
    DEFAULT_ENDPOINT, DEFAULT_SERVICE_CODE, DEFAULT_USER_AGENT, MAX_PAGE_SIZE,
};
use crate::fetcher::{ApiConfig, HttpPageFetcher, WindowParams};
use crate::output::{JsonRecordsWriter, RecordFormat};
use crate::shutdown::SharedShutdown;
use crate::{format_timestamp, ReportFilter};
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::{CliError, PlanArgs};

/// Try to parse datetime from RFC3339 format
///
/// Handles both inputs with and without timezone designators:
/// - "2024-01-01T00:00:00Z" - explicit UTC
/// - "2024-01-01T00:00:00+01:00" - explicit offset
/// - "2024-01-01T00:00:00" - no timezone, assumed UTC
fn try_parse_datetime_rfc3339(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("{input}Z")) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

fn parse_date(input: &str, which: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid {which} time '{input}': {e}")))
}

/// Parse a start time from YYYY-MM-DD or RFC3339 datetime format.
///
/// For date-only format, uses start-of-day (00:00:00 UTC).
pub fn parse_start_time_flexible(input: &str) -> Result<DateTime<Utc>, CliError> {
    if let Some(ts) = try_parse_datetime_rfc3339(input) {
        return Ok(ts);
    }

    let date = parse_date(input, "start")?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| CliError::InvalidArgument("Invalid start time".to_string()))
}

/// Parse an end time from YYYY-MM-DD or RFC3339 datetime format.
///
/// The end bound is exclusive, so a date-only end resolves to midnight of the
/// following day and the named date is fully included.
pub fn parse_end_time_flexible(input: &str) -> Result<DateTime<Utc>, CliError> {
    if let Some(ts) = try_parse_datetime_rfc3339(input) {
        return Ok(ts);
    }

    let date = parse_date(input, "end")?;
    date.succ_opt()
        .and_then(|next| next.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| CliError::InvalidArgument("Invalid end time".to_string()))
}

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Parse a non-negative number of seconds, fractions allowed
fn parse_min_interval(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number of seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("'{s}' is not a valid interval"))
}

/// Parse a `key=value` pair
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in '{s}'"))?;
    if key.trim().is_empty() {
        return Err(format!("invalid KEY=value: empty key in '{s}'"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

/// Open311 downloader CLI
#[derive(Parser, Debug)]
#[command(name = "open311-downloader")]
#[command(
    about = "Download the complete history of an Open311 service category",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Records endpoint URL
    #[arg(long, global = true, env = "OPEN311_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// User-Agent header sent with every call
    #[arg(long, global = true, env = "OPEN311_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Window parameter names: updated, date, or custom:<after>,<before>
    #[arg(long, global = true, default_value = "updated")]
    pub window_params: WindowParams,

    /// Records requested per page (1-100)
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_PAGE_SIZE,
        value_parser = clap::value_parser!(u32).range(1..=100)
    )]
    pub page_size: u32,

    /// Minimum seconds between two outbound calls
    ///
    /// The default of 10 seconds keeps below 10 calls per minute.
    #[arg(
        long = "min-interval-secs",
        global = true,
        default_value = "10",
        value_parser = parse_min_interval
    )]
    pub min_interval: Duration,

    /// Pace calls by a per-minute ceiling instead of a fixed spacing
    #[arg(
        long,
        global = true,
        conflicts_with = "min_interval",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_calls_per_minute: Option<u32>,

    /// Number of windows fetched at once (default: 1, max: 8)
    ///
    /// All windows share one rate limiter, so higher values only overlap
    /// network latency. Output order is the same for every value.
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_CONCURRENCY,
        value_parser = parse_concurrency
    )]
    pub concurrency: usize,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// API configuration assembled from the global flags
    pub fn api_config(&self) -> Result<ApiConfig, CliError> {
        let config = ApiConfig::default()
            .with_endpoint(self.endpoint.clone())
            .with_user_agent(self.user_agent.clone())
            .with_window_params(self.window_params.clone());
        config.validate().map_err(CliError::ConfigurationError)?;
        Ok(config)
    }

    /// Install the Prometheus exporter when `--metrics-addr` is given
    pub fn init_metrics(&self) -> Result<(), CliError> {
        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr)?;
        }
        Ok(())
    }

    /// Rate limiter for the configured spacing
    pub fn rate_limiter(&self) -> RateLimiter {
        let limiter = match self.max_calls_per_minute {
            Some(max_calls) => RateLimiter::per_minute(max_calls),
            None => RateLimiter::new(self.min_interval),
        };
        if limiter.min_interval() < DEFAULT_MIN_INTERVAL {
            warn!(
                min_interval_ms = limiter.min_interval().as_millis() as u64,
                "Spacing below the default; the API may reject calls"
            );
        }
        limiter
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Retrieve every record in a time range and write it to a file
    Download(DownloadArgs),

    /// Print the window plan for a time range without calling the API
    Plan(PlanArgs),
}

/// Overall time range and window length
#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    /// Start time (YYYY-MM-DD or RFC3339), inclusive
    #[arg(long)]
    pub start: String,

    /// End time (YYYY-MM-DD or RFC3339), exclusive; a date-only end includes that date.
    /// Defaults to now.
    #[arg(long)]
    pub end: Option<String>,

    /// Window length (e.g. 7d, 12h, 2w)
    #[arg(long, default_value = "7d")]
    pub chunk: ChunkSpan,
}

impl RangeArgs {
    /// Resolve the start and end arguments
    pub fn resolve(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), CliError> {
        let start = parse_start_time_flexible(&self.start)?;
        let end = match &self.end {
            Some(end) => parse_end_time_flexible(end)?,
            // Whole seconds, matching the precision sent on the wire
            None => Utc::now().trunc_subsecs(0),
        };
        Ok((start, end))
    }

    /// Window plan for the resolved range
    pub fn planner(&self) -> Result<WindowPlanner, CliError> {
        let (start, end) = self.resolve()?;
        Ok(WindowPlanner::new(start, end, self.chunk.duration())?)
    }
}

/// Download command arguments
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Time range to retrieve
    #[command(flatten)]
    pub range: RangeArgs,

    /// Service category to retrieve
    #[arg(long, default_value = DEFAULT_SERVICE_CODE)]
    pub service_code: String,

    /// Extra fixed query parameter (KEY=value), repeatable
    #[arg(long = "param", value_parser = parse_key_val)]
    pub params: Vec<(String, String)>,

    /// Output file
    #[arg(long, default_value = "reports.json")]
    pub output: PathBuf,

    /// Record file format (json or jsonl)
    #[arg(long, default_value = "json")]
    pub format: RecordFormat,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

impl DownloadArgs {
    /// Build the retrieval job described by these arguments
    pub fn job(&self, cli: &Cli) -> Result<RetrievalJob, CliError> {
        let (start, end) = self.range.resolve()?;

        let filter = self
            .params
            .iter()
            .fold(ReportFilter::new(self.service_code.clone()), |filter, (k, v)| {
                filter.with_param(k.clone(), v.clone())
            });

        let job = RetrievalJob::new(start, end, self.range.chunk.duration(), filter)
            .with_page_size(cli.page_size);
        job.validate(MAX_PAGE_SIZE)
            .map_err(CliError::InvalidArgument)?;
        Ok(job)
    }

    /// Execute the download
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let job = self.job(cli)?;
        let window_count = job.planner()?.window_count();

        let fetcher = HttpPageFetcher::with_config(cli.api_config()?)?;
        let engine = RetrievalEngine::new(Arc::new(fetcher), Arc::new(cli.rate_limiter()))
            .with_concurrency(cli.concurrency)
            .with_shutdown(shutdown);

        info!(
            "Downloading {} windows of '{}' from {} to {} into {}",
            window_count,
            job.filter.service_code,
            format_timestamp(&job.start),
            format_timestamp(&job.end),
            self.output.display()
        );
        log_duration_estimate(window_count, engine.rate_limiter().min_interval());

        let writer = JsonRecordsWriter::new(&self.output, self.format)?;
        let progress = create_progress_bar(window_count as u64, &job.filter.service_code);

        let result = engine.execute(&job, writer, Some(&progress)).await;

        progress.finish_and_clear();

        match cli.output_format {
            OutputFormat::Json => self.output_json(&job, &result),
            OutputFormat::Human => self.output_human(&job, &result),
        }

        result.map(|_| ()).map_err(CliError::DownloadError)
    }

    /// Output result as a single JSON line
    fn output_json(&self, job: &RetrievalJob, result: &Result<RunStats, DownloadError>) {
        let (success, stats, err) = match result {
            Ok(stats) => (true, *stats, None),
            Err(e) => (false, RunStats::default(), Some(e.to_string())),
        };

        let output = serde_json::json!({
            "success": success,
            "service_code": job.filter.service_code,
            "start": format_timestamp(&job.start),
            "end": format_timestamp(&job.end),
            "chunk": self.range.chunk.to_string(),
            "output_path": self.output.display().to_string(),
            "format": self.format.to_string(),
            "windows": stats.windows,
            "pages": stats.pages,
            "records": stats.records,
            "error": err,
        });

        println!("{output}");
    }

    /// Output result in human-readable format
    fn output_human(&self, job: &RetrievalJob, result: &Result<RunStats, DownloadError>) {
        match result {
            Ok(stats) => {
                println!("\nDownload completed successfully!");
                println!("Service code: {}", job.filter.service_code);
                println!(
                    "Range: {} to {}",
                    format_timestamp(&job.start),
                    format_timestamp(&job.end)
                );
                println!("Output: {}", self.output.display());
                println!("Windows: {}", stats.windows);
                println!("Pages fetched: {}", stats.pages);
                println!("Records written: {}", stats.records);
            }
            Err(e) => {
                eprintln!("\nDownload failed!");
                eprintln!("Error: {e}");
                eprintln!("No output was written.");
                error!("Download failed: {}", e);
            }
        }
    }
}

/// Lower bound on run time: every window costs at least one spaced call
fn log_duration_estimate(window_count: usize, min_interval: Duration) {
    let spaced_calls = u32::try_from(window_count.saturating_sub(1)).unwrap_or(u32::MAX);
    let estimate = min_interval.saturating_mul(spaced_calls);
    info!(
        minimum_minutes = estimate.as_secs() / 60,
        "Minimum run time at one call per window"
    );
}

/// Create progress bar over windows
fn create_progress_bar(windows: u64, service_code: &str) -> ProgressBar {
    let pb = ProgressBar::new(windows);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} windows ({percent}%) {msg}")
            .expect("hardcoded template is valid")
            .progress_chars("#>-"),
    );
    pb.set_message(format!("Downloading {service_code}"));
    pb
}
