//! Runtime configuration: built-in defaults, then an optional TOML file,
//! then `KABUSYNC_*` environment variables. Command-line flags are applied
//! by the binary on top of the result.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value '{value}' for {key}")]
    InvalidEnv { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub listings_url: String,
    pub delisted_url: String,
    pub actions_url: String,
    pub http_timeout_secs: u64,
    pub page_delay_ms: u64,
    pub max_pages: u32,
    pub log_level: String,
    #[serde(skip)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        let listings_base = kabusync_sources::DEFAULT_LISTINGS_BASE_URL;
        Self {
            db_path: PathBuf::from("kabusync.db"),
            listings_url: format!("{}{}", listings_base, kabusync_sources::NEW_LISTINGS_PATH),
            delisted_url: format!("{}{}", listings_base, kabusync_sources::DELISTED_PATH),
            actions_url: kabusync_sources::DEFAULT_ACTIONS_URL.to_string(),
            http_timeout_secs: 30,
            page_delay_ms: 1500,
            max_pages: 3,
            log_level: "kabusync=info".to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Loads the file (if given) and overlays the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("KABUSYNC_DB") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("KABUSYNC_LISTINGS_URL") {
            self.listings_url = v;
        }
        if let Some(v) = lookup("KABUSYNC_DELISTED_URL") {
            self.delisted_url = v;
        }
        if let Some(v) = lookup("KABUSYNC_ACTIONS_URL") {
            self.actions_url = v;
        }
        if let Some(v) = lookup("KABUSYNC_LOG") {
            self.log_level = v;
        }
        set_parsed(&lookup, "KABUSYNC_HTTP_TIMEOUT_SECS", &mut self.http_timeout_secs)?;
        set_parsed(&lookup, "KABUSYNC_PAGE_DELAY_MS", &mut self.page_delay_ms)?;
        set_parsed(&lookup, "KABUSYNC_MAX_PAGES", &mut self.max_pages)?;
        self.retry = RetryConfig::from_lookup(&lookup);
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

fn set_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup(key) {
        *target = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            key: key.to_string(),
            value,
        })?;
    }
    Ok(())
}
