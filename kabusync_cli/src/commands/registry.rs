//! The `registry` subcommand.

use anyhow::Result;
use clap::Args;
use kabusync_lib::{validation, Instrument, RegistryStore};

use super::Context;
use crate::output;

#[derive(Args)]
pub struct RegistryArgs {
    /// Only show one segment: prime, standard or growth
    #[arg(long)]
    pub segment: Option<String>,
}

pub fn run(args: &RegistryArgs, ctx: &Context) -> Result<()> {
    let segment = args
        .segment
        .as_deref()
        .map(validation::validate_segment)
        .transpose()?;
    let db = ctx.open_db()?;
    let registry = RegistryStore::new(&db).load()?;

    let instruments: Vec<Instrument> = match segment {
        Some(segment) => registry.by_segment(segment).cloned().collect(),
        None => registry.iter().cloned().collect(),
    };
    eprintln!("{} instruments", instruments.len());
    output::print_instruments(&instruments, &ctx.format)
}
