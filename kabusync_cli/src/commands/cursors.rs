//! The `cursors` subcommand.

use anyhow::Result;
use kabusync_lib::pipeline::{META_LAST_RUN_DATE, META_LAST_UPDATED};
use kabusync_lib::CursorStore;

use super::Context;
use crate::output;

pub fn run(ctx: &Context) -> Result<()> {
    let db = ctx.open_db()?;
    let cursors = CursorStore::new(&db).list()?;
    if let Some(last_run) = db.get_meta(META_LAST_RUN_DATE)? {
        eprintln!("Last run: {}", last_run);
    }
    if let Some(updated) = db.get_meta(META_LAST_UPDATED)? {
        eprintln!("Last complete update: {}", updated);
    }
    let stored: Vec<String> = db
        .namespace_counts()?
        .into_iter()
        .map(|(namespace, count)| format!("{}={}", namespace, count))
        .collect();
    eprintln!("Stored blobs: {}", stored.join(" "));
    output::print_cursors(&cursors, &ctx.format)
}
