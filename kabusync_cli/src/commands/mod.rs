//! CLI subcommand implementations.

pub mod cursors;
pub mod pipeline;
pub mod registry;
pub mod seed;
pub mod series;

use anyhow::{anyhow, Context as _, Result};
use chrono::{FixedOffset, NaiveDate, Utc};
use kabusync_lib::{validation, Config, Db};

use crate::output::OutputFormat;

/// Exchange time (JST) offset used to decide what "today" is.
const EXCHANGE_OFFSET_SECS: i32 = 9 * 3600;

pub struct Context {
    pub config: Config,
    pub format: OutputFormat,
    pub run_date: NaiveDate,
}

impl Context {
    pub fn open_db(&self) -> Result<Db> {
        let db = Db::open(&self.config.db_path)
            .with_context(|| format!("opening {}", self.config.db_path.display()))?;
        db.init()?;
        Ok(db)
    }
}

pub fn resolve_run_date(arg: Option<&str>) -> Result<NaiveDate> {
    match arg {
        Some(text) => Ok(validation::validate_date(text)?),
        None => {
            let offset = FixedOffset::east_opt(EXCHANGE_OFFSET_SECS)
                .ok_or_else(|| anyhow!("invalid exchange offset"))?;
            Ok(Utc::now().with_timezone(&offset).date_naive())
        }
    }
}
