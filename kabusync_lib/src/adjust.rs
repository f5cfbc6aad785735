//! Back-adjusts stored series for corporate actions.

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::actions::CorporateActionRecord;
use crate::series::{AppliedAction, PriceRow, SeriesStore};
use crate::store::{BlobStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied { rows_adjusted: usize },
    /// The series ledger already records this action; nothing was touched.
    AlreadyApplied,
    /// No stored series for the instrument; nothing to adjust.
    MissingSeries,
}

impl ApplyOutcome {
    pub fn succeeded(&self) -> bool {
        !matches!(self, Self::MissingSeries)
    }
}

/// Scales every row dated strictly before `effective_date`: prices are
/// multiplied by `ratio`, volume is divided by it and rounded. Rows on or
/// after the effective date are left bit-for-bit unchanged. Returns the
/// number of rows adjusted.
pub fn adjust_rows(rows: &mut [PriceRow], effective_date: NaiveDate, ratio: f64) -> usize {
    let mut adjusted = 0;
    for row in rows.iter_mut().filter(|r| r.date < effective_date) {
        row.open *= ratio;
        row.high *= ratio;
        row.low *= ratio;
        row.close *= ratio;
        row.volume = (row.volume as f64 / ratio).round() as i64;
        adjusted += 1;
    }
    adjusted
}

pub struct AdjustmentApplier<'a, S: ?Sized> {
    series: SeriesStore<'a, S>,
    run_date: NaiveDate,
}

impl<'a, S: BlobStore + ?Sized> AdjustmentApplier<'a, S> {
    pub fn new(store: &'a S, run_date: NaiveDate) -> Self {
        Self {
            series: SeriesStore::new(store),
            run_date,
        }
    }

    /// Applies a ratio effective on the run date. `true` when the series now
    /// reflects the action, `false` when there was no series to adjust.
    pub fn apply(&self, code: &str, ratio: f64) -> Result<bool, StoreError> {
        let action = CorporateActionRecord {
            instrument_code: code.to_string(),
            effective_date: self.run_date,
            ratio,
            kind: kabusync_sources::types::ActionKind::Split,
        };
        Ok(self.apply_action(&action)?.succeeded())
    }

    /// Read-modify-write of the whole series. The adjusted rows and the
    /// ledger entry go out in the same `put`, so a replayed action is
    /// detected and skipped.
    pub fn apply_action(&self, action: &CorporateActionRecord) -> Result<ApplyOutcome, StoreError> {
        let code = action.instrument_code.as_str();
        let Some(mut doc) = self.series.load(code)? else {
            tracing::info!(code, "no stored series to adjust");
            return Ok(ApplyOutcome::MissingSeries);
        };
        if doc.has_applied(action.kind, action.effective_date) {
            tracing::info!(code, effective_date = %action.effective_date, "action already applied");
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        let rows_adjusted = adjust_rows(&mut doc.rows, action.effective_date, action.ratio);
        doc.applied_actions.push(AppliedAction {
            kind: action.kind,
            effective_date: action.effective_date,
            ratio: action.ratio,
            applied_at: Utc::now(),
        });
        self.series.save(code, &doc)?;

        tracing::info!(
            code,
            ratio = action.ratio,
            rows = rows_adjusted,
            kind = %action.kind,
            "applied corporate action"
        );
        Ok(ApplyOutcome::Applied { rows_adjusted })
    }
}
