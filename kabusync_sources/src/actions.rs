//! Scraper for the corporate-action announcement site (stock splits and
//! mergers).

use std::time::Duration;

use chrono::NaiveDate;
use url::Url;

use crate::html::table_rows;
use crate::listings::truncate_body;
use crate::types::{ActionKind, ActionRow, DateFilter};
use crate::user_agent::get_user_agent;
use crate::Error;

pub const DEFAULT_ACTIONS_URL: &str = "https://ca.image.jp/matsui/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Rows per page on the announcement site. A shorter page is the last one.
pub const ACTION_PAGE_SIZE: usize = 20;

/// Client for one page of corporate-action announcements at a time.
/// Pagination is left to the caller so it can retry and pace page requests.
pub struct ActionClient {
    base_url: Url,
    http: reqwest::Client,
}

impl ActionClient {
    pub fn new() -> Result<Self, Error> {
        Self::with_options(DEFAULT_ACTIONS_URL, REQUEST_TIMEOUT)
    }

    /// Creates a client with a custom base URL. Used for testing with wiremock.
    pub fn with_base_url(base_url: &str) -> Result<Self, Error> {
        Self::with_options(base_url, REQUEST_TIMEOUT)
    }

    pub fn with_options(base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Parse(format!("invalid base url '{}': {}", base_url, e)))?;
        let http = reqwest::Client::builder()
            .user_agent(get_user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self { base_url, http })
    }

    /// Fetches one page of announcements, oldest first.
    pub async fn page(
        &self,
        kind: ActionKind,
        filter: DateFilter,
        page: u32,
    ) -> Result<Vec<ActionRow>, Error> {
        let type_param = kind.type_param().to_string();
        let seldate = filter.seldate_param().to_string();
        let page_param = page.to_string();

        let resp = self
            .http
            .get(self.base_url.clone())
            .query(&[
                ("type", type_param.as_str()),
                ("sort", "1"),
                ("seldate", seldate.as_str()),
                ("page", page_param.as_str()),
                ("word1", ""),
                ("word2", ""),
                ("serviceDatefrom", ""),
                ("serviceDateto", ""),
            ])
            .header("accept", "text/html,application/xhtml+xml")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!("{} page {} returned {}", kind, page, status);
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let html = resp.text().await?;
        let rows = parse_action_page(&html, kind)?;
        tracing::debug!("{} page {}: {} rows", kind, page, rows.len());
        Ok(rows)
    }
}

/// Each announcement row has at least seven cells: date, code, name,
/// segment, then the ratio split over three cells (`1`, `:`, `2`).
pub(crate) fn parse_action_page(html: &str, kind: ActionKind) -> Result<Vec<ActionRow>, Error> {
    if !html.contains("<table") && !html.contains("<TABLE") {
        return Ok(Vec::new());
    }
    let rows = table_rows(html, false)?;
    Ok(rows
        .into_iter()
        .filter(|cells| cells.len() >= 7)
        .map(|cells| {
            let ratio_text: String = cells[4..7]
                .concat()
                .chars()
                .filter(|c| *c != ' ' && *c != '\u{3000}')
                .collect();
            ActionRow {
                kind,
                effective_date: parse_announcement_date(&cells[0]),
                code: cells[1].trim().to_string(),
                name: cells[2].trim().to_string(),
                market_segment: cells[3].trim().to_string(),
                ratio_text,
            }
        })
        .collect())
}

fn parse_announcement_date(cell: &str) -> Option<NaiveDate> {
    let trimmed = cell.trim();
    ["%Y/%m/%d", "%Y-%m-%d", "%Y年%m月%d日"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}
