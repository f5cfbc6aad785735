//! Daily price bars from Yahoo Finance.

use chrono::{Duration as ChronoDuration, FixedOffset, NaiveDate, TimeZone};
use time::OffsetDateTime;

use crate::types::DailyBar;
use crate::Error;

/// Exchange-local offset (JST). Bar timestamps are converted with it so a
/// bar lands on its trading date rather than the previous UTC day.
const EXCHANGE_OFFSET_SECS: i32 = 9 * 3600;

/// Convert chrono::NaiveDate to time::OffsetDateTime at UTC midnight.
pub fn date_to_offset_datetime(date: NaiveDate) -> Result<OffsetDateTime, Error> {
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::PriceSource(format!("invalid date {}", date)))?;
    OffsetDateTime::from_unix_timestamp(datetime.and_utc().timestamp())
        .map_err(|_| Error::PriceSource(format!("invalid date {}", date)))
}

/// Convert time::OffsetDateTime to the exchange-local calendar date.
pub fn offset_datetime_to_date(dt: OffsetDateTime) -> Option<NaiveDate> {
    timestamp_to_exchange_date(dt.unix_timestamp())
}

fn timestamp_to_exchange_date(timestamp: i64) -> Option<NaiveDate> {
    let offset = FixedOffset::east_opt(EXCHANGE_OFFSET_SECS)?;
    offset
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.date_naive())
}

/// Maps a bare exchange code to the Yahoo symbol (`7203` -> `7203.T`).
/// Codes that already carry a suffix are passed through.
pub fn yahoo_symbol(code: &str) -> String {
    let code = code.trim();
    if !code.is_empty() && !code.contains('.') && code.chars().all(|c| c.is_ascii_alphanumeric()) {
        format!("{}.T", code)
    } else {
        code.to_string()
    }
}

/// Yahoo Finance daily-bar client.
pub struct YahooPriceClient {
    connector: yahoo_finance_api::YahooConnector,
}

impl YahooPriceClient {
    pub fn new() -> Result<Self, Error> {
        let connector = yahoo_finance_api::YahooConnector::new()?;
        Ok(Self { connector })
    }

    /// Fetches daily bars for `code` between `start` and `end`, both inclusive.
    /// A range with no trading days yields an empty vector, not an error.
    pub async fn daily_bars(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, Error> {
        let symbol = yahoo_symbol(code);
        let from = date_to_offset_datetime(start)?;
        let to = date_to_offset_datetime(end + ChronoDuration::days(1))?;

        let response = match self.connector.get_quote_history(&symbol, from, to).await {
            Ok(response) => response,
            Err(e) => return no_rows_or_error(&symbol, e),
        };
        let quotes = match response.quotes() {
            Ok(quotes) => quotes,
            Err(e) => return no_rows_or_error(&symbol, e),
        };

        let mut bars = Vec::with_capacity(quotes.len());
        for quote in quotes {
            let Some(date) = timestamp_to_exchange_date(quote.timestamp as i64) else {
                tracing::warn!(
                    "{}: dropping bar with invalid timestamp {}",
                    symbol,
                    quote.timestamp
                );
                continue;
            };
            if date < start || date > end {
                continue;
            }
            bars.push(DailyBar {
                date,
                open: present_price(quote.open),
                high: present_price(quote.high),
                low: present_price(quote.low),
                close: present_price(quote.close),
                volume: Some(quote.volume as i64),
            });
        }
        Ok(bars)
    }
}

/// Yahoo reports gaps as zero or NaN prices.
fn present_price(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}

/// The connector reports a range without trading days as an error.
fn no_rows_or_error(
    symbol: &str,
    err: yahoo_finance_api::YahooError,
) -> Result<Vec<DailyBar>, Error> {
    use yahoo_finance_api::YahooError;
    match err {
        YahooError::NoResult | YahooError::NoQuotes => Ok(Vec::new()),
        other => {
            tracing::warn!(symbol, "yahoo request failed: {}", other);
            Err(Error::Yahoo(other))
        }
    }
}
