use chrono::NaiveDate;

use crate::error::SyncError;
use crate::registry::MarketSegment;

/// Exchange codes are four characters: digits, or digits with one letter
/// (`130A`). Input is trimmed and upper-cased.
pub fn validate_code(input: &str) -> Result<String, SyncError> {
    let code = input.trim().to_ascii_uppercase();
    let valid = code.len() == 4
        && code.chars().all(|c| c.is_ascii_alphanumeric())
        && code.chars().next().is_some_and(|c| c.is_ascii_digit());
    if !valid {
        return Err(SyncError::InvalidInput(format!(
            "invalid instrument code '{}'. Expected 4 characters such as 7203 or 130A",
            input.trim()
        )));
    }
    Ok(code)
}

pub fn validate_date(input: &str) -> Result<NaiveDate, SyncError> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| {
        SyncError::InvalidInput(format!(
            "invalid date '{}'. Expected format: YYYY-MM-DD (e.g., 2024-06-01)",
            trimmed
        ))
    })
}

pub fn validate_segment(input: &str) -> Result<MarketSegment, SyncError> {
    MarketSegment::from_label(input).ok_or_else(|| {
        SyncError::InvalidInput(format!(
            "unknown market segment '{}'. Valid: prime, standard, growth",
            input.trim()
        ))
    })
}
