//! Scraped record types. Fields stay as close to the page text as possible;
//! the library crate decides what they mean.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One row of the exchange's "new listings" table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRow {
    pub effective_date: NaiveDate,
    pub name: String,
    pub code: String,
    pub market_segment: String,
}

/// One row of the exchange's "delisted" table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelistingRow {
    pub effective_date: NaiveDate,
    pub name: String,
    pub code: String,
    pub market_segment: String,
    pub reason: String,
}

/// Category of corporate action on the announcement site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    #[default]
    Split,
    Merger,
}

impl ActionKind {
    pub const ALL: [ActionKind; 2] = [ActionKind::Split, ActionKind::Merger];

    /// Value of the site's `type` query parameter.
    pub fn type_param(self) -> u8 {
        match self {
            Self::Split => 0,
            Self::Merger => 5,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Split => write!(f, "split"),
            Self::Merger => write!(f, "merger"),
        }
    }
}

/// The site's `seldate` announcement-window filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFilter {
    All,
    #[default]
    Today,
    Week,
    Month,
    ThreeMonths,
}

impl DateFilter {
    pub fn seldate_param(self) -> u8 {
        match self {
            Self::All => 0,
            Self::Today => 1,
            Self::Week => 2,
            Self::Month => 3,
            Self::ThreeMonths => 4,
        }
    }
}

/// One announcement row. The date is `None` when the cell did not parse;
/// the ratio is the raw `N:M` text, possibly with full-width characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRow {
    pub kind: ActionKind,
    pub effective_date: Option<NaiveDate>,
    pub code: String,
    pub name: String,
    pub market_segment: String,
    pub ratio_text: String,
}

/// A daily OHLCV bar as delivered by the price source. Any field may be
/// missing on days the source has partial data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
}
