//! The `series` subcommand: show the tail of one stored price series.

use anyhow::{anyhow, Result};
use clap::Args;
use kabusync_lib::series::SERIES_NAMESPACE;
use kabusync_lib::{validation, SeriesStore};

use super::Context;
use crate::output;

#[derive(Args)]
pub struct SeriesArgs {
    /// Instrument code
    #[arg(long)]
    pub code: String,

    /// Number of most recent rows to show (0 for all)
    #[arg(long, default_value = "20")]
    pub limit: usize,
}

pub fn run(args: &SeriesArgs, ctx: &Context) -> Result<()> {
    let code = validation::validate_code(&args.code)?;
    let db = ctx.open_db()?;
    let doc = SeriesStore::new(&db)
        .load(&code)?
        .ok_or_else(|| anyhow!("no stored series for {}", code))?;

    let skip = match args.limit {
        0 => 0,
        n => doc.rows.len().saturating_sub(n),
    };
    let written = db.updated_at(SERIES_NAMESPACE, &code)?.unwrap_or_default();
    eprintln!(
        "{}: {} rows, {} corporate actions applied, last written {}",
        code,
        doc.rows.len(),
        doc.applied_actions.len(),
        written
    );
    output::print_prices(&doc.rows[skip..], &ctx.format)
}
