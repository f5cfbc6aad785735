//! Error types for the upstream clients.

/// Errors that can occur when talking to an upstream feed.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The request never produced a response (connect failure, timeout, TLS).
    #[error("request failed: {0}")]
    RequestFailed(String),
    /// The upstream returned a non-success status with a body snippet.
    #[error("request failed with status {status}")]
    HttpStatus { status: u16, body: String },
    /// The response arrived but could not be turned into records.
    #[error("parse error: {0}")]
    Parse(String),
    /// The price source rejected the request or returned garbage.
    #[error("price source error: {0}")]
    PriceSource(String),
    /// Error reported by the Yahoo connector, kept typed so transport
    /// failures can be told apart from rejected requests.
    #[error("yahoo error: {0}")]
    Yahoo(#[from] yahoo_finance_api::YahooError),
}

impl Error {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(_) => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Yahoo(yahoo_finance_api::YahooError::ConnectionFailed(_)) => true,
            Self::Parse(_) | Self::PriceSource(_) | Self::Yahoo(_) => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::RequestFailed(e.to_string())
    }
}
