//! Error types for the library layer.

use std::fmt;

use crate::store::StoreError;

/// Errors produced by the library layer, wrapping upstream source errors
/// and adding storage, timeout and input validation failures.
#[derive(Debug)]
pub enum SyncError {
    /// An error from one of the upstream feeds.
    Source(kabusync_sources::Error),
    /// Reading or writing persisted state failed.
    Store(StoreError),
    /// An upstream call did not finish within its time budget.
    Timeout { label: String, secs: u64 },
    /// User-provided input failed validation.
    InvalidInput(String),
}

impl SyncError {
    /// Whether retrying the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Source(e) => e.is_transient(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(e) => write!(f, "Source error: {}", e),
            Self::Store(e) => write!(f, "Store error: {}", e),
            Self::Timeout { label, secs } => write!(f, "{} timed out after {}s", label, secs),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Source(e) => Some(e),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<kabusync_sources::Error> for SyncError {
    fn from(e: kabusync_sources::Error) -> Self {
        Self::Source(e)
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
