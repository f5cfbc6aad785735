//! The seams between the pipeline and its upstream feeds.
//!
//! The pipeline only sees these traits; the production clients from
//! `kabusync_sources` implement them here, and tests substitute fakes.

use chrono::NaiveDate;
use kabusync_sources::types::{
    ActionKind, ActionRow, DailyBar, DateFilter, DelistingRow, ListingRow,
};
use kabusync_sources::{ActionClient, Error, ListingClient, YahooPriceClient};

/// Daily OHLCV bars for one instrument, both range ends inclusive.
#[allow(async_fn_in_trait)]
pub trait PriceSource {
    async fn daily_bars(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, Error>;
}

/// The exchange's new-listing and delisting tables.
#[allow(async_fn_in_trait)]
pub trait ListingSource {
    async fn new_listings(&self) -> Result<Vec<ListingRow>, Error>;
    async fn delisted(&self) -> Result<Vec<DelistingRow>, Error>;
}

/// One page of corporate-action announcements.
#[allow(async_fn_in_trait)]
pub trait ActionSource {
    async fn page(
        &self,
        kind: ActionKind,
        filter: DateFilter,
        page: u32,
    ) -> Result<Vec<ActionRow>, Error>;
}

impl PriceSource for YahooPriceClient {
    async fn daily_bars(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, Error> {
        YahooPriceClient::daily_bars(self, code, start, end).await
    }
}

impl ListingSource for ListingClient {
    async fn new_listings(&self) -> Result<Vec<ListingRow>, Error> {
        ListingClient::new_listings(self).await
    }

    async fn delisted(&self) -> Result<Vec<DelistingRow>, Error> {
        ListingClient::delisted(self).await
    }
}

impl ActionSource for ActionClient {
    async fn page(
        &self,
        kind: ActionKind,
        filter: DateFilter,
        page: u32,
    ) -> Result<Vec<ActionRow>, Error> {
        ActionClient::page(self, kind, filter, page).await
    }
}
