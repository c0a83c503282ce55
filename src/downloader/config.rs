//! Retrieval configuration constants

use std::time::Duration;

/// Default records requested per page (the API maximum).
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default spacing between outbound calls.
/// 10 seconds keeps the client under the reporting API's quota of
/// fewer than 10 calls per minute.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(10);

/// Default window length in days.
/// One week keeps each window's record count far below the hidden
/// per-query result cap even for busy service categories.
pub const DEFAULT_CHUNK_DAYS: i64 = 7;

/// Upper bound on pages fetched for one window before giving up.
/// A correct server always ends a window with a short or empty page;
/// 10,000 pages of 100 records is far past any plausible window.
pub const MAX_PAGES_PER_WINDOW: u32 = 10_000;

/// Default number of windows fetched at once.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Maximum number of windows fetched at once.
/// All workers share one rate limiter, so more workers only overlap
/// network latency; beyond a handful they just queue on the limiter.
pub const MAX_CONCURRENCY: usize = 8;
