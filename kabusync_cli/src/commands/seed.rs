//! The `seed` subcommand: bulk-load the registry from the exchange's
//! listed-companies CSV.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use kabusync_lib::{read_listed_companies_file, seed_registry, RegistryStore};

use super::Context;

#[derive(Args)]
pub struct SeedArgs {
    /// Path to the listed-companies CSV (UTF-8, with header row)
    #[arg(long)]
    pub csv: PathBuf,
}

pub fn run(args: &SeedArgs, ctx: &Context) -> Result<()> {
    let report = read_listed_companies_file(&args.csv)?;
    let db = ctx.open_db()?;
    let registries = RegistryStore::new(&db);

    let mut registry = registries.load()?;
    let candidates = report.instruments.len();
    let added = seed_registry(&mut registry, report.instruments);
    if added > 0 {
        registries.save(&registry)?;
    }

    eprintln!(
        "Seeded {} of {} instruments ({} already tracked, {} outside tracked segments, {} unreadable). Registry now has {}.",
        added,
        candidates,
        candidates - added,
        report.filtered,
        report.invalid,
        registry.len()
    );
    Ok(())
}
