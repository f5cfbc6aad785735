#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use chrono::NaiveDate;
use kabusync_lib::types::{ActionKind, ActionRow, DailyBar, DateFilter, DelistingRow, ListingRow};
use kabusync_lib::{
    ActionSource, BlobStore, Db, Instrument, ListingSource, MarketSegment, MemoryStore,
    PipelineSettings, PriceRow, PriceSource, RetryConfig, StoreError,
};
use kabusync_sources::Error;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn today() -> NaiveDate {
    date(2024, 1, 12)
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        http_timeout: Duration::from_secs(5),
        page_delay: Duration::ZERO,
        max_pages: 3,
        retry: RetryConfig::none(),
    }
}

pub fn open_test_db() -> Db {
    let db = Db::open_in_memory().expect("open in-memory db");
    db.init().expect("init schema");
    db
}

pub fn instrument(code: &str) -> Instrument {
    Instrument {
        code: code.to_string(),
        name: format!("Sample {}", code),
        market_segment: MarketSegment::Prime,
        listed_date: date(1949, 5, 16),
    }
}

pub fn row(date: NaiveDate, close: f64, volume: i64) -> PriceRow {
    PriceRow {
        date,
        open: close,
        high: close,
        low: close,
        close,
        volume,
    }
}

pub fn bar(date: NaiveDate, close: f64, volume: i64) -> DailyBar {
    DailyBar {
        date,
        open: Some(close),
        high: Some(close),
        low: Some(close),
        close: Some(close),
        volume: Some(volume),
    }
}

/// Serves canned bars per code and records every request.
#[derive(Default)]
pub struct FakePrices {
    bars: HashMap<String, Vec<DailyBar>>,
    failing: HashSet<String>,
    pub requests: Mutex<Vec<(String, NaiveDate, NaiveDate)>>,
}

impl FakePrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<DailyBar>) -> Self {
        self.bars.insert(code.to_string(), bars);
        self
    }

    pub fn failing(mut self, code: &str) -> Self {
        self.failing.insert(code.to_string());
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl PriceSource for FakePrices {
    async fn daily_bars(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, Error> {
        self.requests
            .lock()
            .unwrap()
            .push((code.to_string(), start, end));
        if self.failing.contains(code) {
            return Err(Error::PriceSource(format!("{}: no route to host", code)));
        }
        Ok(self
            .bars
            .get(code)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start && b.date <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeListings {
    pub new_listings: Vec<ListingRow>,
    pub delisted: Vec<DelistingRow>,
    pub fail: bool,
}

impl ListingSource for FakeListings {
    async fn new_listings(&self) -> Result<Vec<ListingRow>, Error> {
        if self.fail {
            return Err(Error::HttpStatus {
                status: 500,
                body: "internal error".into(),
            });
        }
        Ok(self.new_listings.clone())
    }

    async fn delisted(&self) -> Result<Vec<DelistingRow>, Error> {
        Ok(self.delisted.clone())
    }
}

/// Serves one page of split and merger rows and records every page request.
#[derive(Default)]
pub struct FakeActions {
    pub splits: Vec<ActionRow>,
    pub mergers: Vec<ActionRow>,
    pub calls: Mutex<Vec<(ActionKind, DateFilter, u32)>>,
}

fn action_row(
    kind: ActionKind,
    code: &str,
    effective_date: NaiveDate,
    ratio_text: &str,
) -> ActionRow {
    ActionRow {
        kind,
        effective_date: Some(effective_date),
        code: code.to_string(),
        name: String::new(),
        market_segment: "東証プライム".to_string(),
        ratio_text: ratio_text.to_string(),
    }
}

impl FakeActions {
    pub fn with_split(code: &str, effective_date: NaiveDate, ratio_text: &str) -> Self {
        Self {
            splits: vec![action_row(ActionKind::Split, code, effective_date, ratio_text)],
            ..Self::default()
        }
    }

    pub fn and_merger(mut self, code: &str, effective_date: NaiveDate, ratio_text: &str) -> Self {
        self.mergers
            .push(action_row(ActionKind::Merger, code, effective_date, ratio_text));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl ActionSource for FakeActions {
    async fn page(
        &self,
        kind: ActionKind,
        filter: DateFilter,
        page: u32,
    ) -> Result<Vec<ActionRow>, Error> {
        self.calls.lock().unwrap().push((kind, filter, page));
        if page != 1 {
            return Ok(Vec::new());
        }
        Ok(match kind {
            ActionKind::Split => self.splits.clone(),
            ActionKind::Merger => self.mergers.clone(),
        })
    }
}

/// Memory store whose series writes always fail.
#[derive(Default)]
pub struct FailingSeriesStore {
    pub inner: MemoryStore,
}

impl BlobStore for FailingSeriesStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(namespace, key)
    }

    fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if namespace == "series" {
            return Err(StoreError::Corrupt {
                namespace: namespace.to_string(),
                key: key.to_string(),
                reason: "disk full".to_string(),
            });
        }
        self.inner.put(namespace, key, value)
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<(), StoreError> {
        self.inner.delete(namespace, key)
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>, StoreError> {
        self.inner.keys(namespace)
    }
}
