//! Shared HTTP client for all page fetchers
//!
//! One `reqwest::Client` is reused by every fetcher so connection pooling works
//! across windows. The client carries explicit timeouts: without them a stalled
//! call would block the whole retrieval run indefinitely.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::fetcher::{FetcherError, FetcherResult};

/// HTTP connect timeout (seconds) - time to establish TCP connection
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds) - overall time for the entire request
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 60;

static GLOBAL_HTTP_CLIENT: Lazy<Result<Arc<Client>, String>> = Lazy::new(|| {
    build_http_client(
        Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS),
        Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS),
    )
    .map(Arc::new)
    .map_err(|e| e.to_string())
});

/// Build a client with the given timeouts
pub fn build_http_client(
    connect_timeout: Duration,
    request_timeout: Duration,
) -> FetcherResult<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .build()
        .map_err(|e| {
            FetcherError::Transport(format!(
                "Failed to build HTTP client: {e}. Check system TLS configuration."
            ))
        })
}

/// Get the process-wide HTTP client
///
/// Returns a clone of the Arc, which is cheap (just increments ref count)
pub fn global_http_client() -> FetcherResult<Arc<Client>> {
    GLOBAL_HTTP_CLIENT
        .as_ref()
        .map(Arc::clone)
        .map_err(|e| FetcherError::Transport(e.clone()))
}
