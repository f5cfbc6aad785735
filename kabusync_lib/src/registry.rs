//! The tracked-instrument registry and same-day listing reconciliation.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use kabusync_sources::types::{DelistingRow, ListingRow};
use serde::{Deserialize, Serialize};

use crate::store::{get_json, put_json, BlobStore, StoreError};

pub const REGISTRY_NAMESPACE: &str = "registry";
pub const REGISTRY_KEY: &str = "active";

/// Qualifier the exchange appends to domestic common-stock segments.
pub const DOMESTIC_SUFFIX: &str = "（内国株式）";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarketSegment {
    Prime,
    Standard,
    Growth,
}

impl MarketSegment {
    pub const ALL: [MarketSegment; 3] = [Self::Prime, Self::Standard, Self::Growth];

    /// Recognizes exchange labels such as `プライム`, `グロース（内国株式）`
    /// or `東証スタンダード`, and the English names. Any other qualifier,
    /// e.g. `スタンダード（外国株式）`, is not a tracked segment.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        let label = label.strip_suffix(DOMESTIC_SUFFIX).unwrap_or(label);
        let label = label.strip_prefix("東証").unwrap_or(label).trim();
        match label {
            "プライム" => return Some(Self::Prime),
            "スタンダード" => return Some(Self::Standard),
            "グロース" => return Some(Self::Growth),
            _ => {}
        }
        match label.to_ascii_lowercase().as_str() {
            "prime" => Some(Self::Prime),
            "standard" => Some(Self::Standard),
            "growth" => Some(Self::Growth),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prime => "prime",
            Self::Standard => "standard",
            Self::Growth => "growth",
        }
    }
}

impl std::fmt::Display for MarketSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub code: String,
    pub name: String,
    pub market_segment: MarketSegment,
    pub listed_date: NaiveDate,
}

/// Active instruments keyed by code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Instrument>", into = "Vec<Instrument>")]
pub struct Registry {
    instruments: BTreeMap<String, Instrument>,
}

impl From<Vec<Instrument>> for Registry {
    fn from(instruments: Vec<Instrument>) -> Self {
        let mut registry = Registry::default();
        for instrument in instruments {
            registry.insert(instrument);
        }
        registry
    }
}

impl From<Registry> for Vec<Instrument> {
    fn from(registry: Registry) -> Self {
        registry.instruments.into_values().collect()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts unless the code is already present. Returns whether it was added.
    pub fn insert(&mut self, instrument: Instrument) -> bool {
        if self.instruments.contains_key(&instrument.code) {
            return false;
        }
        self.instruments.insert(instrument.code.clone(), instrument);
        true
    }

    pub fn remove(&mut self, code: &str) -> bool {
        self.instruments.remove(code).is_some()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.instruments.contains_key(code)
    }

    pub fn get(&self, code: &str) -> Option<&Instrument> {
        self.instruments.get(code)
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Codes in ascending order.
    pub fn codes(&self) -> Vec<String> {
        self.instruments.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    pub fn by_segment(&self, segment: MarketSegment) -> impl Iterator<Item = &Instrument> {
        self.iter().filter(move |i| i.market_segment == segment)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// New-listing rows ignored: already tracked or outside the tracked segments.
    pub ignored: usize,
}

/// Applies already date-filtered listing and delisting rows to `local`.
///
/// Additions skip codes already present, removals of absent codes are
/// no-ops, so replaying the same feeds changes nothing.
pub fn reconcile(
    mut local: Registry,
    new_listings: &[ListingRow],
    delisted: &[DelistingRow],
) -> (Registry, ReconcileSummary) {
    let mut summary = ReconcileSummary::default();

    for row in new_listings {
        let code = row.code.trim();
        if code.is_empty() || local.contains(code) {
            summary.ignored += 1;
            continue;
        }
        let Some(segment) = MarketSegment::from_label(&row.market_segment) else {
            tracing::warn!(
                code,
                segment = %row.market_segment,
                "ignoring listing in untracked segment"
            );
            summary.ignored += 1;
            continue;
        };
        local.insert(Instrument {
            code: code.to_string(),
            name: row.name.clone(),
            market_segment: segment,
            listed_date: row.effective_date,
        });
        summary.added.push(code.to_string());
    }

    for row in delisted {
        let code = row.code.trim();
        if local.remove(code) {
            summary.removed.push(code.to_string());
        }
    }

    (local, summary)
}

/// Keeps listing rows whose effective date is `run_date`.
pub fn listings_on(rows: Vec<ListingRow>, run_date: NaiveDate) -> Vec<ListingRow> {
    rows.into_iter()
        .filter(|r| r.effective_date == run_date)
        .collect()
}

/// Keeps delisting rows whose effective date is `run_date`.
pub fn delistings_on(rows: Vec<DelistingRow>, run_date: NaiveDate) -> Vec<DelistingRow> {
    rows.into_iter()
        .filter(|r| r.effective_date == run_date)
        .collect()
}

pub struct RegistryStore<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: BlobStore + ?Sized> RegistryStore<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// The persisted registry, or an empty one if none was saved yet.
    pub fn load(&self) -> Result<Registry, StoreError> {
        Ok(get_json(self.store, REGISTRY_NAMESPACE, REGISTRY_KEY)?.unwrap_or_default())
    }

    pub fn save(&self, registry: &Registry) -> Result<(), StoreError> {
        put_json(self.store, REGISTRY_NAMESPACE, REGISTRY_KEY, registry)
    }
}
