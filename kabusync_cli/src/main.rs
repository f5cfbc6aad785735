mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kabusync_lib::Config;

use crate::commands::Context;
use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "kabusync")]
#[command(about = "Incremental daily price sync for exchange-listed stocks")]
struct Cli {
    /// Output format: table, markdown, json or csv
    #[arg(long, default_value = "table", global = true)]
    output: String,

    /// SQLite database path (overrides config and KABUSYNC_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Run date (YYYY-MM-DD); defaults to today in exchange time
    #[arg(long, global = true)]
    date: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the registry, fetch new prices, apply today's corporate actions
    Run(commands::pipeline::RunArgs),
    /// Apply today's new listings and delistings to the registry
    Reconcile,
    /// Fetch and merge prices for the registry or selected codes
    Fetch(commands::pipeline::FetchArgs),
    /// Apply today's splits and mergers to stored prices
    Adjust,
    /// Import the listed-companies CSV into the registry
    Seed(commands::seed::SeedArgs),
    /// List tracked instruments
    Registry(commands::registry::RegistryArgs),
    /// Show stored prices for one instrument
    Series(commands::series::SeriesArgs),
    /// List fetch cursors
    Cursors,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = OutputFormat::parse(&cli.output)?;
    let run_date = commands::resolve_run_date(cli.date.as_deref())?;
    let ctx = Context {
        config,
        format,
        run_date,
    };

    match &cli.command {
        Commands::Run(args) => commands::pipeline::run(args, &ctx).await?,
        Commands::Reconcile => commands::pipeline::reconcile(&ctx).await?,
        Commands::Fetch(args) => commands::pipeline::fetch(args, &ctx).await?,
        Commands::Adjust => commands::pipeline::adjust(&ctx).await?,
        Commands::Seed(args) => commands::seed::run(args, &ctx)?,
        Commands::Registry(args) => commands::registry::run(args, &ctx)?,
        Commands::Series(args) => commands::series::run(args, &ctx)?,
        Commands::Cursors => commands::cursors::run(&ctx)?,
    }

    Ok(())
}
