//! Combines freshly fetched bars with a stored series.
//!
//! Missing values are repaired rather than rejected: each field is
//! forward-filled from the previous day, then any leading gap is back-filled
//! from the first known value. This is an approximation; a repaired bar
//! repeats a neighbouring day's figure.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use kabusync_sources::types::DailyBar;
use serde::{Deserialize, Serialize};

use crate::series::PriceRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Incoming bars replace the stored series.
    Full,
    /// Incoming bars are appended; incoming wins on a shared date.
    Incremental,
}

impl std::fmt::Display for MergeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Incremental => write!(f, "incremental"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Merged {
    /// Nothing to write; the stored series stands as is.
    Unchanged,
    Rows(Vec<PriceRow>),
}

/// Merges `incoming` into `existing`.
///
/// An empty `incoming` is a no-op in both modes, so callers never rewrite a
/// series that did not change. The result is unique and ascending by date.
pub fn merge(existing: &[PriceRow], incoming: &[DailyBar], mode: MergeMode) -> Merged {
    if incoming.is_empty() {
        return Merged::Unchanged;
    }

    let mut by_date: BTreeMap<NaiveDate, DailyBar> = BTreeMap::new();
    if mode == MergeMode::Incremental {
        for row in existing {
            by_date.insert(row.date, to_bar(row));
        }
    }
    // Later inserts overwrite, so the last occurrence of a date wins.
    for bar in incoming {
        by_date.insert(bar.date, *bar);
    }

    let bars: Vec<DailyBar> = by_date.into_values().collect();
    Merged::Rows(repair(bars))
}

/// Fills gaps in date-ordered bars and converts them to stored rows. Bars
/// that still lack a value (the field is missing on every day) are dropped.
pub fn repair(mut bars: Vec<DailyBar>) -> Vec<PriceRow> {
    fill_forward(&mut bars);
    fill_backward(&mut bars);

    let mut out = Vec::with_capacity(bars.len());
    for bar in bars {
        match to_row(&bar) {
            Some(row) => out.push(row),
            None => {
                tracing::warn!(date = %bar.date, "dropping bar with unrecoverable missing values")
            }
        }
    }
    out
}

fn fill_forward(bars: &mut [DailyBar]) {
    let mut last = Slots::default();
    for bar in bars.iter_mut() {
        last.fill_into(bar);
        last.take_from(bar);
    }
}

fn fill_backward(bars: &mut [DailyBar]) {
    let mut next = Slots::default();
    for bar in bars.iter_mut().rev() {
        next.fill_into(bar);
        next.take_from(bar);
    }
}

#[derive(Default)]
struct Slots {
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<i64>,
}

impl Slots {
    fn fill_into(&self, bar: &mut DailyBar) {
        bar.open = bar.open.or(self.open);
        bar.high = bar.high.or(self.high);
        bar.low = bar.low.or(self.low);
        bar.close = bar.close.or(self.close);
        bar.volume = bar.volume.or(self.volume);
    }

    fn take_from(&mut self, bar: &DailyBar) {
        self.open = bar.open.or(self.open);
        self.high = bar.high.or(self.high);
        self.low = bar.low.or(self.low);
        self.close = bar.close.or(self.close);
        self.volume = bar.volume.or(self.volume);
    }
}

fn to_bar(row: &PriceRow) -> DailyBar {
    DailyBar {
        date: row.date,
        open: Some(row.open),
        high: Some(row.high),
        low: Some(row.low),
        close: Some(row.close),
        volume: Some(row.volume),
    }
}

fn to_row(bar: &DailyBar) -> Option<PriceRow> {
    Some(PriceRow {
        date: bar.date,
        open: bar.open?,
        high: bar.high?,
        low: bar.low?,
        close: bar.close?,
        volume: bar.volume?,
    })
}
