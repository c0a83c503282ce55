//! Window planning
//!
//! Splits an overall time range into contiguous, non-overlapping, ascending
//! half-open windows of at most `chunk` length. The final window is clipped so the
//! union is exactly `[start, end)`.
//!
//! The chunk size is a policy knob: it must be small enough that no single window's
//! true record count approaches the API's hidden per-query cap.

use crate::TimeWindow;
use chrono::{DateTime, TimeDelta, Utc};
use std::str::FromStr;

/// Planning errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// Overall range is empty or inverted
    #[error("invalid range: end ({end}) must be after start ({start})")]
    InvalidRange {
        /// Requested start
        start: DateTime<Utc>,
        /// Requested end
        end: DateTime<Utc>,
    },

    /// Chunk duration is zero or negative
    #[error("chunk duration must be positive, got {0}")]
    InvalidChunk(TimeDelta),
}

/// Plans the window sequence for one overall range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlanner {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    chunk: TimeDelta,
}

impl WindowPlanner {
    /// Create a planner for `[start, end)` split into `chunk`-sized windows
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        chunk: TimeDelta,
    ) -> Result<Self, PlanError> {
        if start >= end {
            return Err(PlanError::InvalidRange { start, end });
        }
        if chunk <= TimeDelta::zero() {
            return Err(PlanError::InvalidChunk(chunk));
        }
        Ok(Self { start, end, chunk })
    }

    /// Lazy iterator over the windows, ascending
    ///
    /// Each call starts a fresh sequence.
    pub fn windows(&self) -> Windows {
        Windows {
            cursor: self.start,
            end: self.end,
            chunk: self.chunk,
        }
    }

    /// Number of windows the plan produces
    pub fn window_count(&self) -> usize {
        self.windows().count()
    }

    /// Overall start
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Overall end
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Chunk duration
    pub fn chunk(&self) -> TimeDelta {
        self.chunk
    }
}

impl IntoIterator for &WindowPlanner {
    type Item = TimeWindow;
    type IntoIter = Windows;

    fn into_iter(self) -> Self::IntoIter {
        self.windows()
    }
}

/// Iterator produced by [`WindowPlanner::windows`]
#[derive(Debug, Clone)]
pub struct Windows {
    cursor: DateTime<Utc>,
    end: DateTime<Utc>,
    chunk: TimeDelta,
}

impl Iterator for Windows {
    type Item = TimeWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }

        // Overflowing the calendar clips to the overall end.
        let window_end = self
            .cursor
            .checked_add_signed(self.chunk)
            .map_or(self.end, |t| t.min(self.end));

        let window = TimeWindow::new(self.cursor, window_end).ok()?;
        self.cursor = window_end;
        Some(window)
    }
}

impl std::iter::FusedIterator for Windows {}

/// Chunk duration parsed from a compact span such as `7d`, `12h`, `2w`, `30m`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan(TimeDelta);

impl ChunkSpan {
    /// Wrap a positive duration
    pub fn new(duration: TimeDelta) -> Result<Self, String> {
        if duration <= TimeDelta::zero() {
            return Err(format!("Chunk span must be positive, got {duration}"));
        }
        Ok(Self(duration))
    }

    /// Underlying duration
    pub fn duration(&self) -> TimeDelta {
        self.0
    }
}

impl Default for ChunkSpan {
    fn default() -> Self {
        Self(TimeDelta::days(super::config::DEFAULT_CHUNK_DAYS))
    }
}

impl std::fmt::Display for ChunkSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let minutes = self.0.num_minutes();
        if self.0 != TimeDelta::minutes(minutes) {
            return write!(f, "{}s", self.0.num_seconds());
        }
        const WEEK: i64 = 7 * 24 * 60;
        const DAY: i64 = 24 * 60;
        if minutes % WEEK == 0 {
            write!(f, "{}w", minutes / WEEK)
        } else if minutes % DAY == 0 {
            write!(f, "{}d", minutes / DAY)
        } else if minutes % 60 == 0 {
            write!(f, "{}h", minutes / 60)
        } else {
            write!(f, "{minutes}m")
        }
    }
}

impl FromStr for ChunkSpan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("Invalid chunk span: {s}. Missing unit (s, m, h, d, w)"))?;
        let (number, unit) = s.split_at(split);

        let amount: i64 = number
            .parse()
            .map_err(|_| format!("Invalid chunk span: {s}. Expected e.g. 7d, 12h, 2w"))?;

        let duration = match unit {
            "s" => TimeDelta::try_seconds(amount),
            "m" => TimeDelta::try_minutes(amount),
            "h" => TimeDelta::try_hours(amount),
            "d" => TimeDelta::try_days(amount),
            "w" => TimeDelta::try_weeks(amount),
            _ => {
                return Err(format!(
                    "Invalid chunk span unit '{unit}' in {s}. Valid units: s, m, h, d, w"
                ))
            }
        }
        .ok_or_else(|| format!("Chunk span out of range: {s}"))?;

        ChunkSpan::new(duration)
    }
}
