//! Persisted per-instrument price series.

use chrono::{DateTime, NaiveDate, Utc};
use kabusync_sources::types::ActionKind;
use serde::{Deserialize, Serialize};

use crate::store::{get_json, put_json, BlobStore, StoreError};

pub const SERIES_NAMESPACE: &str = "series";

/// One trading day. Stored rows never carry missing values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// A corporate action already folded into the stored rows. Entries written
/// before `kind` was recorded read back as splits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedAction {
    #[serde(default)]
    pub kind: ActionKind,
    pub effective_date: NaiveDate,
    pub ratio: f64,
    pub applied_at: DateTime<Utc>,
}

/// The whole persisted document for one instrument. Rows and the
/// applied-action ledger are written together in a single `put`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSeries {
    pub rows: Vec<PriceRow>,
    #[serde(default)]
    pub applied_actions: Vec<AppliedAction>,
}

impl StoredSeries {
    pub fn new(rows: Vec<PriceRow>) -> Self {
        Self {
            rows,
            applied_actions: Vec::new(),
        }
    }

    pub fn has_applied(&self, kind: ActionKind, effective_date: NaiveDate) -> bool {
        self.applied_actions
            .iter()
            .any(|a| a.kind == kind && a.effective_date == effective_date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }
}

/// True when dates are unique and strictly increasing.
pub fn is_strictly_increasing(rows: &[PriceRow]) -> bool {
    rows.windows(2).all(|pair| pair[0].date < pair[1].date)
}

pub struct SeriesStore<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: BlobStore + ?Sized> SeriesStore<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn load(&self, code: &str) -> Result<Option<StoredSeries>, StoreError> {
        get_json(self.store, SERIES_NAMESPACE, code)
    }

    pub fn save(&self, code: &str, series: &StoredSeries) -> Result<(), StoreError> {
        put_json(self.store, SERIES_NAMESPACE, code, series)
    }

    pub fn codes(&self) -> Result<Vec<String>, StoreError> {
        self.store.keys(SERIES_NAMESPACE)
    }
}
