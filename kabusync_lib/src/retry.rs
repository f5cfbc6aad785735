//! Retry with exponential backoff and per-call timeouts for upstream feeds.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 2000,
            max_delay_ms: 30000,
        }
    }
}

impl RetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_retries: parse_or(lookup("KABUSYNC_RETRY_MAX"), defaults.max_retries),
            base_delay_ms: parse_or(lookup("KABUSYNC_RETRY_BASE_MS"), defaults.base_delay_ms),
            max_delay_ms: parse_or(lookup("KABUSYNC_RETRY_MAX_MS"), defaults.max_delay_ms),
        }
    }

    /// No retries and no waiting. Handy for tests.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(30) as u32;
        let exp = 1u64 << shift;
        let base = self
            .base_delay_ms
            .saturating_mul(exp)
            .min(self.max_delay_ms);
        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        Duration::from_millis((base as f64 * jitter) as u64)
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Runs `fut` with a deadline, turning expiry into `SyncError::Timeout`.
pub async fn with_timeout<T, Fut>(label: &str, limit: Duration, fut: Fut) -> Result<T, SyncError>
where
    Fut: Future<Output = Result<T, kabusync_sources::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(SyncError::Timeout {
            label: label.to_string(),
            secs: limit.as_secs(),
        }),
    }
}

/// Retries `f` while it fails with a transient error (transport, timeout,
/// HTTP 429 or 5xx), up to `cfg.max_retries` extra attempts.
pub async fn with_retry<T, F, Fut>(cfg: &RetryConfig, label: &str, mut f: F) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut attempt = 0usize;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt > cfg.max_retries || !err.is_transient() {
                    return Err(err);
                }
                let delay = cfg.delay_for_attempt(attempt);
                tracing::warn!(
                    "{} request failed (attempt {}/{}), retrying in {:.1}s: {}",
                    label,
                    attempt,
                    cfg.max_retries,
                    delay.as_secs_f64(),
                    err
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
