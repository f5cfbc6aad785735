//! Library layer for kabusync: incremental daily price sync for exchange
//! listed instruments.
//!
//! Keeps a registry of tracked instruments, a per-instrument fetch cursor and
//! one persisted price series per instrument, and back-adjusts stored prices
//! when a split or merger is announced. All state goes through [`BlobStore`],
//! backed by SQLite in production and memory in tests.

pub mod actions;
pub mod adjust;
pub mod config;
pub mod cursor;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod merge;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod seed;
pub mod series;
pub mod sources;
pub mod store;
pub mod validation;

pub use kabusync_sources;
pub use kabusync_sources::types;

pub use actions::{parse_ratio, CorporateActionRecord, ResolveReport, Resolver};
pub use adjust::{adjust_rows, AdjustmentApplier, ApplyOutcome};
pub use config::{Config, ConfigError};
pub use cursor::CursorStore;
pub use db::{Db, DbError};
pub use error::SyncError;
pub use fetcher::{earliest_date, FetchOutcome, IncrementalFetcher};
pub use merge::{merge, MergeMode, Merged};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineSettings, RunCounters, StageResult};
pub use registry::{reconcile, Instrument, MarketSegment, Registry, RegistryStore};
pub use retry::RetryConfig;
pub use seed::{
    read_listed_companies, read_listed_companies_file, seed_registry, SeedError, SeedReport,
};
pub use series::{PriceRow, SeriesStore, StoredSeries};
pub use sources::{ActionSource, ListingSource, PriceSource};
pub use store::{BlobStore, MemoryStore, StoreError};
