//! Seeds the registry from the exchange's listed-companies CSV export.
//!
//! Only domestic common stock on the three main segments is kept; ETFs,
//! REITs, foreign stocks and PRO Market rows are skipped.

use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;

use crate::registry::{Instrument, MarketSegment, Registry, DOMESTIC_SUFFIX};

const DATE_COLUMN: &str = "日付";
const CODE_COLUMN: &str = "コード";
const NAME_COLUMN: &str = "銘柄名";
const SEGMENT_COLUMN: &str = "市場・商品区分";

#[derive(thiserror::Error, Debug)]
pub enum SeedError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing column '{0}'")]
    MissingColumn(&'static str),
}

#[derive(Debug, Default)]
pub struct SeedReport {
    pub instruments: Vec<Instrument>,
    /// Rows outside the tracked segments.
    pub filtered: usize,
    /// Rows in a tracked segment whose date or code could not be read.
    pub invalid: usize,
}

pub fn read_listed_companies_file(path: &Path) -> Result<SeedReport, SeedError> {
    let file = std::fs::File::open(path)?;
    read_listed_companies(file)
}

pub fn read_listed_companies<R: Read>(reader: R) -> Result<SeedReport, SeedError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h.trim().trim_start_matches('\u{feff}') == name)
            .ok_or(SeedError::MissingColumn(name))
    };
    let date_idx = column(DATE_COLUMN)?;
    let code_idx = column(CODE_COLUMN)?;
    let name_idx = column(NAME_COLUMN)?;
    let segment_idx = column(SEGMENT_COLUMN)?;

    let mut report = SeedReport::default();
    for record in rdr.records() {
        let record = record?;
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();

        let Some(segment) = tracked_segment(field(segment_idx)) else {
            report.filtered += 1;
            continue;
        };
        let code = normalize_code(field(code_idx));
        let date = NaiveDate::parse_from_str(field(date_idx), "%Y%m%d");
        match (code, date) {
            (Some(code), Ok(listed_date)) => report.instruments.push(Instrument {
                code,
                name: field(name_idx).to_string(),
                market_segment: segment,
                listed_date,
            }),
            _ => {
                tracing::warn!(
                    code = field(code_idx),
                    date = field(date_idx),
                    "skipping unreadable listed-company row"
                );
                report.invalid += 1;
            }
        }
    }
    Ok(report)
}

/// `プライム（内国株式）` and friends; anything else is untracked.
fn tracked_segment(label: &str) -> Option<MarketSegment> {
    let base = label.trim().strip_suffix(DOMESTIC_SUFFIX)?;
    MarketSegment::from_label(base)
}

/// Spreadsheet exports sometimes render codes as `7203.0`.
fn normalize_code(raw: &str) -> Option<String> {
    let code = raw.strip_suffix(".0").unwrap_or(raw);
    (!code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| code.to_ascii_uppercase())
}

/// Adds seeded instruments, leaving codes already tracked untouched.
/// Returns how many were added.
pub fn seed_registry(registry: &mut Registry, instruments: Vec<Instrument>) -> usize {
    instruments
        .into_iter()
        .filter(|instrument| registry.insert(instrument.clone()))
        .count()
}
