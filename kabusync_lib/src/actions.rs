//! Resolves today's corporate-action announcements into adjustment records.

use std::time::Duration;

use chrono::NaiveDate;
use kabusync_sources::types::{ActionKind, ActionRow, DateFilter};
use kabusync_sources::ACTION_PAGE_SIZE;
use regex::Regex;
use serde::Serialize;

use crate::error::SyncError;
use crate::retry::{with_retry, with_timeout, RetryConfig};
use crate::sources::ActionSource;

/// A same-day split or merger with a usable ratio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorporateActionRecord {
    pub instrument_code: String,
    pub effective_date: NaiveDate,
    pub ratio: f64,
    pub kind: ActionKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolveReport {
    pub records: Vec<CorporateActionRecord>,
    /// Rows dropped because their ratio text did not parse.
    pub invalid_ratio: usize,
    /// Rows dropped because they were not effective on the run date.
    pub other_dates: usize,
    pub pages_fetched: u32,
}

/// Parses an `N:M` ratio into `N / M`.
///
/// Full-width digits, colon, period and spaces are accepted. Anything that
/// is not two non-negative decimals around a colon, a zero denominator, or
/// a non-positive result yields `None`; callers must skip such records
/// rather than default them.
pub fn parse_ratio(text: &str) -> Option<f64> {
    let normalized: String = text
        .chars()
        .filter(|c| *c != ' ' && *c != '\u{3000}')
        .map(|c| match c {
            '：' => ':',
            '．' => '.',
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            _ => c,
        })
        .collect();

    let re = Regex::new(r"^([0-9]+(?:\.[0-9]+)?):([0-9]+(?:\.[0-9]+)?)$").ok()?;
    let caps = re.captures(&normalized)?;
    let numerator: f64 = caps.get(1)?.as_str().parse().ok()?;
    let denominator: f64 = caps.get(2)?.as_str().parse().ok()?;
    if denominator == 0.0 {
        return None;
    }
    let ratio = numerator / denominator;
    (ratio.is_finite() && ratio > 0.0).then_some(ratio)
}

pub struct Resolver<'a, A> {
    source: &'a A,
    max_pages: u32,
    page_delay: Duration,
    timeout: Duration,
    retry: RetryConfig,
}

impl<'a, A: ActionSource> Resolver<'a, A> {
    pub fn new(
        source: &'a A,
        max_pages: u32,
        page_delay: Duration,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            source,
            max_pages,
            page_delay,
            timeout,
            retry,
        }
    }

    /// Pulls today's split and merger announcements and keeps the ones
    /// effective on `run_date` with a valid ratio.
    pub async fn resolve(&self, run_date: NaiveDate) -> Result<ResolveReport, SyncError> {
        let mut report = ResolveReport::default();
        for kind in ActionKind::ALL {
            let (rows, pages) = self.fetch_kind(kind).await?;
            report.pages_fetched += pages;
            for row in rows {
                self.classify(row, run_date, &mut report);
            }
        }
        tracing::info!(
            records = report.records.len(),
            invalid_ratio = report.invalid_ratio,
            other_dates = report.other_dates,
            "resolved corporate actions"
        );
        Ok(report)
    }

    async fn fetch_kind(&self, kind: ActionKind) -> Result<(Vec<ActionRow>, u32), SyncError> {
        let mut all = Vec::new();
        let mut pages = 0;
        for page in 1..=self.max_pages {
            if page > 1 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
            let label = format!("{} page {}", kind, page);
            let rows = with_retry(&self.retry, &label, || {
                with_timeout(
                    &label,
                    self.timeout,
                    self.source.page(kind, DateFilter::Today, page),
                )
            })
            .await?;
            pages += 1;

            let count = rows.len();
            all.extend(rows);
            if count < ACTION_PAGE_SIZE {
                break;
            }
            if page == self.max_pages {
                tracing::warn!("{} announcements hit the {} page cap", kind, self.max_pages);
            }
        }
        Ok((all, pages))
    }

    fn classify(&self, row: ActionRow, run_date: NaiveDate, report: &mut ResolveReport) {
        if row.effective_date != Some(run_date) {
            report.other_dates += 1;
            return;
        }
        let Some(ratio) = parse_ratio(&row.ratio_text) else {
            tracing::warn!(
                code = %row.code,
                ratio = %row.ratio_text,
                "skipping {} with invalid ratio",
                row.kind
            );
            report.invalid_ratio += 1;
            return;
        };
        report.records.push(CorporateActionRecord {
            instrument_code: row.code.trim().to_string(),
            effective_date: run_date,
            ratio,
            kind: row.kind,
        });
    }
}
