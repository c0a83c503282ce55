//! Minimum-spacing rate limiter
//!
//! [`RateLimiter::throttle`] suspends the caller until at least `min_interval` has
//! passed since the previous throttle; the first call never waits. All callers
//! sharing one limiter (through `Arc`) are sequenced through a single gate, so the
//! outbound rate stays under the ceiling even when windows are fetched
//! concurrently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::metrics::record_throttle;

/// Spaces outbound calls at least `min_interval` apart
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
    throttle_count: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter with a fixed minimum spacing
    ///
    /// # Arguments
    /// * `min_interval` - Minimum time between two consecutive calls
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
            throttle_count: AtomicU64::new(0),
        }
    }

    /// Create a limiter that allows at most `max_calls` calls in any one minute
    ///
    /// The interval is rounded up so that `max_calls + 1` calls never fit inside
    /// one minute; `max_calls` of zero is treated as one.
    pub fn per_minute(max_calls: u32) -> Self {
        let max_calls = u64::from(max_calls.max(1));
        let millis = 60_000u64.div_ceil(max_calls) + 1;
        Self::new(Duration::from_millis(millis))
    }

    /// A limiter that never waits
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Configured spacing
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Number of times [`throttle`](Self::throttle) has been called
    pub fn throttle_count(&self) -> u64 {
        self.throttle_count.load(Ordering::SeqCst)
    }

    /// Wait until the next outbound call is allowed
    ///
    /// Call exactly once before every outbound request.
    pub async fn throttle(&self) {
        let mut last_call = self.last_call.lock().await;
        let started = Instant::now();

        if let Some(previous) = *last_call {
            let ready_at = previous + self.min_interval;
            if ready_at > started {
                debug!(
                    wait_ms = (ready_at - started).as_millis() as u64,
                    "Throttling before next call"
                );
                sleep_until(ready_at).await;
            }
        }

        let now = Instant::now();
        *last_call = Some(now);
        self.throttle_count.fetch_add(1, Ordering::SeqCst);
        record_throttle(now - started);
    }
}
