//! Scraper for the exchange's new-listing and delisting pages.

use std::time::Duration;

use chrono::NaiveDate;

use crate::html::table_rows;
use crate::types::{DelistingRow, ListingRow};
use crate::user_agent::get_user_agent;
use crate::Error;

pub const DEFAULT_LISTINGS_BASE_URL: &str = "https://www.jpx.co.jp";
pub const NEW_LISTINGS_PATH: &str = "/listing/stocks/new/index.html";
pub const DELISTED_PATH: &str = "/listing/stocks/delisted/index.html";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the listing/delisting tables.
///
/// Both pages are fetched whole; they only ever show the recent window, so
/// there is no pagination.
pub struct ListingClient {
    new_listings_url: String,
    delisted_url: String,
    http: reqwest::Client,
}

impl ListingClient {
    /// Creates a client pointing at the production exchange site.
    pub fn new() -> Result<Self, Error> {
        Self::with_options(DEFAULT_LISTINGS_BASE_URL, REQUEST_TIMEOUT)
    }

    /// Creates a client with a custom base URL. Used for testing with wiremock.
    pub fn with_base_url(base_url: &str) -> Result<Self, Error> {
        Self::with_options(base_url, REQUEST_TIMEOUT)
    }

    pub fn with_options(base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let base = base_url.trim_end_matches('/');
        Self::with_urls(
            &format!("{}{}", base, NEW_LISTINGS_PATH),
            &format!("{}{}", base, DELISTED_PATH),
            timeout,
        )
    }

    /// Creates a client with explicit page URLs for each table.
    pub fn with_urls(
        new_listings_url: &str,
        delisted_url: &str,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(get_user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            new_listings_url: new_listings_url.to_string(),
            delisted_url: delisted_url.to_string(),
            http,
        })
    }

    /// Fetches every row currently shown on the new-listings page.
    pub async fn new_listings(&self) -> Result<Vec<ListingRow>, Error> {
        let html = self.fetch_html(&self.new_listings_url).await?;
        let rows = parse_new_listings(&html)?;
        tracing::debug!("parsed {} new-listing rows", rows.len());
        Ok(rows)
    }

    /// Fetches every row currently shown on the delisted page.
    pub async fn delisted(&self) -> Result<Vec<DelistingRow>, Error> {
        let html = self.fetch_html(&self.delisted_url).await?;
        let rows = parse_delisted(&html)?;
        tracing::debug!("parsed {} delisting rows", rows.len());
        Ok(rows)
    }

    async fn fetch_html(&self, url: &str) -> Result<String, Error> {
        let resp = self
            .http
            .get(url)
            .header("accept", "text/html,application/xhtml+xml")
            .header("accept-language", "ja,en-US;q=0.9,en;q=0.8")
            .header("cache-control", "no-cache")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!("listing page {} returned {}", url, status);
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        Ok(resp.text().await?)
    }
}

/// The new-listings table spreads each company over two rows: the first
/// carries date, name and code, the second carries the market segment.
pub(crate) fn parse_new_listings(html: &str) -> Result<Vec<ListingRow>, Error> {
    let mut out: Vec<ListingRow> = Vec::new();
    let mut awaiting_segment = false;

    for cells in table_rows(html, true)? {
        if cells.is_empty() {
            continue;
        }
        if cells.len() >= 3 {
            if let Some(date) = parse_listing_date(&cells[0]) {
                out.push(ListingRow {
                    effective_date: date,
                    name: clean_company_name(&cells[1]),
                    code: cells[2].trim().to_string(),
                    market_segment: String::new(),
                });
                awaiting_segment = true;
                continue;
            }
        }
        if awaiting_segment {
            if let Some(last) = out.last_mut() {
                last.market_segment = cells[0].trim().to_string();
            }
            awaiting_segment = false;
        } else {
            tracing::warn!("skipping unrecognised new-listing row: {:?}", cells);
        }
    }

    Ok(out)
}

pub(crate) fn parse_delisted(html: &str) -> Result<Vec<DelistingRow>, Error> {
    let mut out = Vec::new();
    for cells in table_rows(html, true)? {
        if cells.len() < 5 {
            continue;
        }
        let Some(date) = parse_listing_date(&cells[0]) else {
            tracing::warn!("skipping delisting row with unparseable date: {:?}", cells[0]);
            continue;
        };
        out.push(DelistingRow {
            effective_date: date,
            name: clean_company_name(&cells[1]),
            code: cells[2].trim().to_string(),
            market_segment: cells[3].trim().to_string(),
            reason: cells[4].trim().to_string(),
        });
    }
    Ok(out)
}

/// Date cells look like `2024/06/20` optionally followed by a note.
fn parse_listing_date(cell: &str) -> Option<NaiveDate> {
    let first = cell.split_whitespace().next()?;
    NaiveDate::parse_from_str(first, "%Y/%m/%d").ok()
}

fn clean_company_name(raw: &str) -> String {
    raw.replace("（株）", "")
        .replace("代表者インタビュー", "")
        .trim()
        .to_string()
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 500;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &body[..end])
}
