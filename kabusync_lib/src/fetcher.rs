//! Incremental price fetching driven by the per-instrument cursor.

use std::time::Duration;

use chrono::NaiveDate;
use kabusync_sources::types::DailyBar;

use crate::cursor::CursorStore;
use crate::merge::MergeMode;
use crate::retry::{with_retry, with_timeout, RetryConfig};
use crate::sources::PriceSource;
use crate::store::BlobStore;

/// First date requested for a full-history fetch.
pub fn earliest_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Result of fetching one instrument. Only `Fetched` advances the cursor.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched {
        bars: Vec<DailyBar>,
        mode: MergeMode,
        /// Cursor value before this fetch advanced it.
        previous_cursor: Option<NaiveDate>,
    },
    /// The source had no bars for the requested range.
    Empty,
    /// The cursor is already at or past the run date; nothing was requested.
    Skipped,
    Failed {
        reason: String,
        /// The failure came from persisted state rather than the source.
        persistence: bool,
    },
}

pub struct IncrementalFetcher<'a, P, S: ?Sized> {
    source: &'a P,
    cursors: CursorStore<'a, S>,
    timeout: Duration,
    retry: RetryConfig,
}

impl<'a, P: PriceSource, S: BlobStore + ?Sized> IncrementalFetcher<'a, P, S> {
    pub fn new(source: &'a P, store: &'a S, timeout: Duration, retry: RetryConfig) -> Self {
        Self {
            source,
            cursors: CursorStore::new(store),
            timeout,
            retry,
        }
    }

    /// Fetches the bars `code` is missing up to and including `today`.
    ///
    /// Never returns an error: source and store failures come back as
    /// `FetchOutcome::Failed` so one instrument cannot halt the loop.
    pub async fn fetch(&self, code: &str, full: bool, today: NaiveDate) -> FetchOutcome {
        let previous = match self.cursors.get(code) {
            Ok(previous) => previous,
            Err(e) => {
                tracing::error!(code, "failed to read cursor: {}", e);
                return FetchOutcome::Failed {
                    reason: e.to_string(),
                    persistence: true,
                };
            }
        };

        let (start, mode) = match previous {
            Some(cursor) if !full => {
                let Some(start) = cursor.succ_opt() else {
                    return FetchOutcome::Skipped;
                };
                (start, MergeMode::Incremental)
            }
            _ => (earliest_date(), MergeMode::Full),
        };
        if start > today {
            tracing::debug!(code, cursor = ?previous, "cursor is current, skipping request");
            return FetchOutcome::Skipped;
        }

        let label = format!("prices {}", code);
        let result = with_retry(&self.retry, &label, || {
            with_timeout(&label, self.timeout, self.source.daily_bars(code, start, today))
        })
        .await;

        let bars = match result {
            Ok(bars) => normalize(bars, start, today),
            Err(e) => {
                tracing::warn!(code, %start, end = %today, "price fetch failed: {}", e);
                return FetchOutcome::Failed {
                    reason: e.to_string(),
                    persistence: false,
                };
            }
        };

        let Some(last) = bars.last().map(|b| b.date) else {
            tracing::info!(code, %start, end = %today, "no new bars");
            return FetchOutcome::Empty;
        };

        if let Err(e) = self.cursors.set(code, last) {
            tracing::error!(code, "failed to advance cursor: {}", e);
            return FetchOutcome::Failed {
                reason: e.to_string(),
                persistence: true,
            };
        }

        tracing::info!(code, rows = bars.len(), %mode, cursor = %last, "fetched bars");
        FetchOutcome::Fetched {
            bars,
            mode,
            previous_cursor: previous,
        }
    }
}

/// Keeps bars inside the requested window, ordered by date.
fn normalize(mut bars: Vec<DailyBar>, start: NaiveDate, end: NaiveDate) -> Vec<DailyBar> {
    let before = bars.len();
    bars.retain(|b| b.date >= start && b.date <= end);
    if bars.len() != before {
        tracing::debug!("dropped {} bars outside {}..={}", before - bars.len(), start, end);
    }
    bars.sort_by_key(|b| b.date);
    bars
}
