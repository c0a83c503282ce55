//! HTTP page fetcher for Open311-style reporting APIs
//!
//! Issues exactly one GET per page. No retry or backoff happens here: transport
//! failures, non-success statuses, and malformed bodies are all returned to the
//! caller, which aborts the run.

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::fetcher::api_config::ApiConfig;
use crate::fetcher::response::extract_records;
use crate::fetcher::shared_resources::global_http_client;
use crate::fetcher::{FetcherError, FetcherResult, PageFetcher, PageQuery, PageResult};
use crate::format_timestamp;
use crate::metrics::HttpRequestMetrics;

/// Page fetcher backed by `reqwest`
pub struct HttpPageFetcher {
    client: Arc<Client>,
    config: ApiConfig,
}

impl HttpPageFetcher {
    /// Create a fetcher with an explicit client
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client (Arc for cheap cloning)
    /// * `config` - Endpoint and parameter naming
    pub fn new(client: Arc<Client>, config: ApiConfig) -> Self {
        Self { client, config }
    }

    /// Create a fetcher using the process-wide client
    pub fn with_config(config: ApiConfig) -> FetcherResult<Self> {
        Ok(Self::new(global_http_client()?, config))
    }

    /// Configuration in use
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Build the query string for one page, in a stable order
    pub fn build_params(&self, query: &PageQuery<'_>) -> Vec<(String, String)> {
        let config = &self.config;
        let mut params = vec![
            (
                config.filter_param.to_string(),
                query.filter.service_code.clone(),
            ),
            (config.page_size_param.to_string(), query.page_size.to_string()),
            (config.page_param.to_string(), query.page.to_string()),
            (
                config.window_params.after.to_string(),
                format_timestamp(&query.window.start()),
            ),
            (
                config.window_params.before.to_string(),
                format_timestamp(&query.window.end()),
            ),
        ];
        params.extend(query.filter.extra_params.iter().cloned());
        params
    }

    fn check_query(&self, query: &PageQuery<'_>) -> FetcherResult<()> {
        if query.page == 0 {
            return Err(FetcherError::InvalidQuery(
                "page numbers are 1-based".to_string(),
            ));
        }

        if query.page_size == 0 || query.page_size > self.config.max_page_size {
            return Err(FetcherError::InvalidQuery(format!(
                "page size {} outside 1..={}",
                query.page_size, self.config.max_page_size
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, query: &PageQuery<'_>) -> FetcherResult<PageResult> {
        self.check_query(query)?;

        let params = self.build_params(query);
        let request_metrics = HttpRequestMetrics::start(query.page);

        debug!(
            correlation_id = request_metrics.correlation_id(),
            window = %query.window,
            page = query.page,
            "GET {}",
            self.config.endpoint
        );

        let response = self
            .client
            .get(&self.config.endpoint)
            .header(USER_AGENT, self.config.user_agent.as_str())
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                request_metrics.record_transport_error();
                FetcherError::Transport(e.to_string())
            })?;

        let status = response.status();
        request_metrics.record_complete(status.as_u16());

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
            warn!(
                correlation_id = request_metrics.correlation_id(),
                status = status.as_u16(),
                "Reporting API returned non-success status"
            );
            return Err(FetcherError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetcherError::Transport(format!("Failed to read response body: {e}")))?;

        let body: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| FetcherError::Parse(format!("Failed to parse response as JSON: {e}")))?;

        let records = extract_records(body);
        debug!(
            correlation_id = request_metrics.correlation_id(),
            records = records.len(),
            "Page received"
        );

        Ok(PageResult::new(records))
    }

    fn max_page_size(&self) -> u32 {
        self.config.max_page_size
    }
}
