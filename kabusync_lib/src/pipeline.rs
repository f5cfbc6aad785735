//! Runs one day's sync: reconcile the registry, fetch and merge prices,
//! then apply same-day corporate actions.
//!
//! Each stage reports a boolean; a failed stage suppresses the stages after
//! it. The pipeline never returns an error, so callers can always render a
//! (possibly partial) outcome.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use kabusync_sources::types::DailyBar;
use serde::Serialize;
use tracing::Instrument;

use crate::actions::Resolver;
use crate::adjust::{AdjustmentApplier, ApplyOutcome};
use crate::config::Config;
use crate::cursor::CursorStore;
use crate::error::SyncError;
use crate::fetcher::{FetchOutcome, IncrementalFetcher};
use crate::merge::{merge, MergeMode, Merged};
use crate::registry::{delistings_on, listings_on, reconcile, RegistryStore};
use crate::retry::{with_retry, with_timeout, RetryConfig};
use crate::series::SeriesStore;
use crate::sources::{ActionSource, ListingSource, PriceSource};
use crate::store::{BlobStore, StoreError};

pub const META_LAST_RUN_DATE: &str = "last_run_date";
pub const META_LAST_UPDATED: &str = "last_updated";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub http_timeout: Duration,
    pub page_delay: Duration,
    pub max_pages: u32,
    pub retry: RetryConfig,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            http_timeout: config.http_timeout(),
            page_delay: config.page_delay(),
            max_pages: config.max_pages,
            retry: config.retry,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileCounters {
    pub added: usize,
    pub removed: usize,
    pub ignored: usize,
    pub registry_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchCounters {
    pub instruments: usize,
    pub fetched: usize,
    pub empty: usize,
    pub skipped: usize,
    pub failed: usize,
    pub persistence_failures: usize,
    pub rows_written: usize,
    /// Codes whose fetch or merge did not complete this run.
    #[serde(skip)]
    pub unsettled: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdjustCounters {
    pub actions: usize,
    pub applied: usize,
    pub already_applied: usize,
    pub missing_series: usize,
    pub invalid_ratio: usize,
    pub deferred: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageResult<C> {
    pub ok: bool,
    pub counters: C,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub reconcile: ReconcileCounters,
    pub fetch: FetchCounters,
    pub adjust: AdjustCounters,
}

/// Summary of one run. `overall` is true only when all three stages ran
/// and succeeded; a stage that did not run reports `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    pub run_date: NaiveDate,
    pub reconcile: bool,
    pub fetch: bool,
    pub adjust: bool,
    pub overall: bool,
    pub counters: RunCounters,
}

pub struct Pipeline<'a, S: ?Sized, P, L, A> {
    store: &'a S,
    prices: &'a P,
    listings: &'a L,
    actions: &'a A,
    settings: PipelineSettings,
    run_date: NaiveDate,
}

impl<'a, S, P, L, A> Pipeline<'a, S, P, L, A>
where
    S: BlobStore + ?Sized,
    P: PriceSource,
    L: ListingSource,
    A: ActionSource,
{
    pub fn new(
        store: &'a S,
        prices: &'a P,
        listings: &'a L,
        actions: &'a A,
        settings: PipelineSettings,
        run_date: NaiveDate,
    ) -> Self {
        Self {
            store,
            prices,
            listings,
            actions,
            settings,
            run_date,
        }
    }

    pub fn run_date(&self) -> NaiveDate {
        self.run_date
    }

    /// Reconcile, then fetch (if reconcile succeeded), then adjust (if both
    /// succeeded).
    pub async fn run(&self, full: bool) -> PipelineOutcome {
        tracing::info!(run_date = %self.run_date, full, "starting daily sync");
        let mut counters = RunCounters::default();

        let reconcile = self.reconcile_stage().await;
        counters.reconcile = reconcile.counters;

        let fetch_ok = if reconcile.ok {
            let fetch = self.fetch_stage(None, full).await;
            counters.fetch = fetch.counters;
            fetch.ok
        } else {
            tracing::warn!("registry reconciliation failed; skipping fetch and adjust");
            false
        };

        let adjust_ok = if reconcile.ok && fetch_ok {
            let adjust = self.adjust_stage(&counters.fetch.unsettled).await;
            counters.adjust = adjust.counters;
            adjust.ok
        } else {
            if reconcile.ok {
                tracing::warn!("price fetch failed; skipping corporate-action adjustment");
            }
            false
        };

        let outcome = PipelineOutcome {
            run_date: self.run_date,
            reconcile: reconcile.ok,
            fetch: fetch_ok,
            adjust: adjust_ok,
            overall: reconcile.ok && fetch_ok && adjust_ok,
            counters,
        };
        self.record_run(outcome.overall);
        tracing::info!(
            reconcile = outcome.reconcile,
            fetch = outcome.fetch,
            adjust = outcome.adjust,
            overall = outcome.overall,
            "daily sync finished"
        );
        outcome
    }

    pub async fn reconcile_stage(&self) -> StageResult<ReconcileCounters> {
        let span = tracing::info_span!("reconcile", run_date = %self.run_date);
        async {
            match self.try_reconcile().await {
                Ok(counters) => StageResult { ok: true, counters },
                Err(e) => {
                    tracing::error!("registry reconciliation failed: {}", e);
                    StageResult {
                        ok: false,
                        counters: ReconcileCounters::default(),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn try_reconcile(&self) -> Result<ReconcileCounters, SyncError> {
        let timeout = self.settings.http_timeout;
        let new_listings = with_retry(&self.settings.retry, "new listings", || {
            with_timeout("new listings", timeout, self.listings.new_listings())
        })
        .await?;
        let delisted = with_retry(&self.settings.retry, "delisted", || {
            with_timeout("delisted", timeout, self.listings.delisted())
        })
        .await?;

        let new_today = listings_on(new_listings, self.run_date);
        let delisted_today = delistings_on(delisted, self.run_date);
        tracing::info!(
            new = new_today.len(),
            delisted = delisted_today.len(),
            "same-day listing changes"
        );

        let registries = RegistryStore::new(self.store);
        let local = registries.load()?;
        let (updated, summary) = reconcile(local, &new_today, &delisted_today);
        if !summary.added.is_empty() || !summary.removed.is_empty() {
            registries.save(&updated)?;
        }
        for code in &summary.added {
            tracing::info!(code = %code, "instrument added");
        }
        for code in &summary.removed {
            tracing::info!(code = %code, "instrument removed");
        }

        Ok(ReconcileCounters {
            added: summary.added.len(),
            removed: summary.removed.len(),
            ignored: summary.ignored,
            registry_size: updated.len(),
        })
    }

    /// Fetches and merges prices for `codes`, or for the whole registry when
    /// `codes` is `None`. Instruments are processed one at a time.
    pub async fn fetch_stage(
        &self,
        codes: Option<&[String]>,
        full: bool,
    ) -> StageResult<FetchCounters> {
        let span = tracing::info_span!("fetch", run_date = %self.run_date, full);
        self.fetch_inner(codes, full).instrument(span).await
    }

    async fn fetch_inner(
        &self,
        codes: Option<&[String]>,
        full: bool,
    ) -> StageResult<FetchCounters> {
        let mut counters = FetchCounters::default();
        let codes = match codes {
            Some(codes) => codes.to_vec(),
            None => match RegistryStore::new(self.store).load() {
                Ok(registry) => registry.codes(),
                Err(e) => {
                    tracing::error!("failed to load registry: {}", e);
                    return StageResult { ok: false, counters };
                }
            },
        };
        if codes.is_empty() {
            tracing::warn!("registry is empty; nothing to fetch");
            return StageResult { ok: false, counters };
        }
        counters.instruments = codes.len();

        let fetcher = IncrementalFetcher::new(
            self.prices,
            self.store,
            self.settings.http_timeout,
            self.settings.retry,
        );
        let cursors = CursorStore::new(self.store);

        for code in &codes {
            match fetcher.fetch(code, full, self.run_date).await {
                FetchOutcome::Fetched {
                    bars,
                    mode,
                    previous_cursor,
                } => match self.store_bars(code, &bars, mode) {
                    Ok(rows) => {
                        counters.fetched += 1;
                        counters.rows_written += rows;
                    }
                    Err(e) => {
                        tracing::error!(code = %code, "failed to persist series: {}", e);
                        counters.failed += 1;
                        counters.persistence_failures += 1;
                        counters.unsettled.insert(code.clone());
                        // Put the cursor back so the delta is refetched next run.
                        if let Err(e) = cursors.restore(code, previous_cursor) {
                            tracing::error!(code = %code, "failed to restore cursor: {}", e);
                        }
                    }
                },
                FetchOutcome::Empty => counters.empty += 1,
                FetchOutcome::Skipped => counters.skipped += 1,
                FetchOutcome::Failed { persistence, .. } => {
                    counters.failed += 1;
                    counters.unsettled.insert(code.clone());
                    if persistence {
                        counters.persistence_failures += 1;
                    }
                }
            }
        }

        let ok = counters.persistence_failures == 0 && counters.failed < counters.instruments;
        tracing::info!(
            instruments = counters.instruments,
            fetched = counters.fetched,
            empty = counters.empty,
            skipped = counters.skipped,
            failed = counters.failed,
            "fetch stage done"
        );
        StageResult { ok, counters }
    }

    /// Merges `bars` into the stored series and writes it back. Returns the
    /// number of rows written, zero when the merge was a no-op.
    fn store_bars(
        &self,
        code: &str,
        bars: &[DailyBar],
        mode: MergeMode,
    ) -> Result<usize, StoreError> {
        let series = SeriesStore::new(self.store);
        let mut doc = series.load(code)?.unwrap_or_default();
        match merge(&doc.rows, bars, mode) {
            Merged::Unchanged => Ok(0),
            Merged::Rows(rows) => {
                let written = rows.len();
                doc.rows = rows;
                series.save(code, &doc)?;
                tracing::debug!(code, rows = written, "series written");
                Ok(written)
            }
        }
    }

    /// Applies today's corporate actions. Actions for codes in `unsettled`
    /// are deferred: their series is missing rows, so scaling it now would
    /// leave the later-fetched history on a different basis. Deferred actions
    /// fail the stage so the day is rerun.
    pub async fn adjust_stage(
        &self,
        unsettled: &BTreeSet<String>,
    ) -> StageResult<AdjustCounters> {
        let span = tracing::info_span!("adjust", run_date = %self.run_date);
        async {
            let mut counters = AdjustCounters::default();
            let resolver = Resolver::new(
                self.actions,
                self.settings.max_pages,
                self.settings.page_delay,
                self.settings.http_timeout,
                self.settings.retry,
            );
            let report = match resolver.resolve(self.run_date).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!("failed to resolve corporate actions: {}", e);
                    return StageResult { ok: false, counters };
                }
            };
            counters.actions = report.records.len();
            counters.invalid_ratio = report.invalid_ratio;

            let applier = AdjustmentApplier::new(self.store, self.run_date);
            for action in &report.records {
                if unsettled.contains(&action.instrument_code) {
                    tracing::warn!(
                        code = %action.instrument_code,
                        kind = %action.kind,
                        "price fetch incomplete; deferring corporate action"
                    );
                    counters.deferred += 1;
                    continue;
                }
                match applier.apply_action(action) {
                    Ok(ApplyOutcome::Applied { .. }) => counters.applied += 1,
                    Ok(ApplyOutcome::AlreadyApplied) => counters.already_applied += 1,
                    Ok(ApplyOutcome::MissingSeries) => counters.missing_series += 1,
                    Err(e) => {
                        tracing::error!(
                            code = %action.instrument_code,
                            "failed to adjust series: {}",
                            e
                        );
                        counters.failed += 1;
                    }
                }
            }
            StageResult {
                ok: counters.failed == 0 && counters.deferred == 0,
                counters,
            }
        }
        .instrument(span)
        .await
    }

    fn record_run(&self, overall: bool) {
        let run_date = self.run_date.format("%Y-%m-%d").to_string();
        if let Err(e) = self.store.set_meta(META_LAST_RUN_DATE, &run_date) {
            tracing::warn!("failed to record {}: {}", META_LAST_RUN_DATE, e);
        }
        if overall {
            if let Err(e) = self.store.set_meta(META_LAST_UPDATED, &Utc::now().to_rfc3339()) {
                tracing::warn!("failed to record {}: {}", META_LAST_UPDATED, e);
            }
        }
    }
}
