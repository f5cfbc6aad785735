//! The `run`, `reconcile`, `fetch` and `adjust` subcommands.

use std::collections::BTreeSet;

use anyhow::{bail, Result};
use clap::Args;
use kabusync_lib::kabusync_sources::{ActionClient, ListingClient, YahooPriceClient};
use kabusync_lib::{validation, Db, Pipeline, PipelineSettings};

use super::Context;
use crate::output;

#[derive(Args)]
pub struct RunArgs {
    /// Refetch full price history for every instrument
    #[arg(long)]
    pub full: bool,
}

#[derive(Args)]
pub struct FetchArgs {
    /// Instrument code(s) to fetch; defaults to the whole registry
    #[arg(long = "code")]
    pub codes: Vec<String>,

    /// Ignore cursors and refetch full history
    #[arg(long)]
    pub full: bool,
}

struct Clients {
    prices: YahooPriceClient,
    listings: ListingClient,
    actions: ActionClient,
}

impl Clients {
    fn from_context(ctx: &Context) -> Result<Self> {
        let timeout = ctx.config.http_timeout();
        Ok(Self {
            prices: YahooPriceClient::new()?,
            listings: ListingClient::with_urls(
                &ctx.config.listings_url,
                &ctx.config.delisted_url,
                timeout,
            )?,
            actions: ActionClient::with_options(&ctx.config.actions_url, timeout)?,
        })
    }

    fn pipeline<'a>(
        &'a self,
        db: &'a Db,
        ctx: &Context,
    ) -> Pipeline<'a, Db, YahooPriceClient, ListingClient, ActionClient> {
        Pipeline::new(
            db,
            &self.prices,
            &self.listings,
            &self.actions,
            PipelineSettings::from(&ctx.config),
            ctx.run_date,
        )
    }
}

pub async fn run(args: &RunArgs, ctx: &Context) -> Result<()> {
    let db = ctx.open_db()?;
    let clients = Clients::from_context(ctx)?;
    eprintln!(
        "Running daily sync for {} into {}",
        ctx.run_date,
        ctx.config.db_path.display()
    );

    let outcome = clients.pipeline(&db, ctx).run(args.full).await;
    output::print_outcome(&outcome, &ctx.format)?;
    if !outcome.overall {
        bail!("daily sync did not complete for {}", ctx.run_date);
    }
    Ok(())
}

pub async fn reconcile(ctx: &Context) -> Result<()> {
    let db = ctx.open_db()?;
    let clients = Clients::from_context(ctx)?;
    let stage = clients.pipeline(&db, ctx).reconcile_stage().await;
    output::print_stage("reconcile", &stage, &ctx.format)?;
    if !stage.ok {
        bail!("registry reconciliation failed");
    }
    Ok(())
}

pub async fn fetch(args: &FetchArgs, ctx: &Context) -> Result<()> {
    let codes = args
        .codes
        .iter()
        .map(|c| validation::validate_code(c))
        .collect::<Result<Vec<_>, _>>()?;
    let db = ctx.open_db()?;
    let clients = Clients::from_context(ctx)?;
    let selected = (!codes.is_empty()).then_some(codes.as_slice());

    let stage = clients.pipeline(&db, ctx).fetch_stage(selected, args.full).await;
    output::print_stage("fetch", &stage, &ctx.format)?;
    if !stage.ok {
        bail!("price fetch failed");
    }
    Ok(())
}

/// Runs the adjust stage on its own. Prices are assumed settled by an
/// earlier `fetch`, so no action is deferred.
pub async fn adjust(ctx: &Context) -> Result<()> {
    let db = ctx.open_db()?;
    let clients = Clients::from_context(ctx)?;
    let stage = clients
        .pipeline(&db, ctx)
        .adjust_stage(&BTreeSet::new())
        .await;
    output::print_stage("adjust", &stage, &ctx.format)?;
    if !stage.ok {
        bail!("corporate-action adjustment failed");
    }
    Ok(())
}
