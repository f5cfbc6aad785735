use std::io::Write;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use kabusync_lib::{Instrument, PipelineOutcome, PriceRow, StageResult};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Markdown,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => bail!("unknown output format '{}'. Valid: table, markdown, json, csv", other),
        }
    }
}

#[derive(Tabled, Serialize)]
struct StageRow {
    #[tabled(rename = "Stage")]
    #[serde(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Result")]
    #[serde(rename = "Result")]
    result: String,
    #[tabled(rename = "Details")]
    #[serde(rename = "Details")]
    details: String,
}

#[derive(Tabled, Serialize)]
struct InstrumentRow {
    #[tabled(rename = "Code")]
    #[serde(rename = "Code")]
    code: String,
    #[tabled(rename = "Name")]
    #[serde(rename = "Name")]
    name: String,
    #[tabled(rename = "Segment")]
    #[serde(rename = "Segment")]
    segment: String,
    #[tabled(rename = "Listed")]
    #[serde(rename = "Listed")]
    listed: String,
}

#[derive(Tabled, Serialize)]
struct PriceOutRow {
    #[tabled(rename = "Date")]
    #[serde(rename = "Date")]
    date: String,
    #[tabled(rename = "Open")]
    #[serde(rename = "Open")]
    open: String,
    #[tabled(rename = "High")]
    #[serde(rename = "High")]
    high: String,
    #[tabled(rename = "Low")]
    #[serde(rename = "Low")]
    low: String,
    #[tabled(rename = "Close")]
    #[serde(rename = "Close")]
    close: String,
    #[tabled(rename = "Volume")]
    #[serde(rename = "Volume")]
    volume: i64,
}

#[derive(Tabled, Serialize)]
struct CursorRow {
    #[tabled(rename = "Code")]
    #[serde(rename = "Code")]
    code: String,
    #[tabled(rename = "Last Fetched")]
    #[serde(rename = "Last Fetched")]
    last_fetched: String,
}

// -- Row builders --

fn stage_result(ok: bool, ran: bool) -> String {
    match (ran, ok) {
        (false, _) => "skipped".to_string(),
        (true, true) => "ok".to_string(),
        (true, false) => "FAILED".to_string(),
    }
}

/// Flattens a counters struct into `name=value` pairs, sorted by name.
fn describe_counters<T: Serialize>(counters: &T) -> String {
    match serde_json::to_value(counters) {
        Ok(serde_json::Value::Object(map)) => map
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

fn build_outcome_rows(outcome: &PipelineOutcome) -> Vec<StageRow> {
    let fetch_ran = outcome.reconcile;
    let adjust_ran = outcome.reconcile && outcome.fetch;
    vec![
        StageRow {
            stage: "reconcile".to_string(),
            result: stage_result(outcome.reconcile, true),
            details: describe_counters(&outcome.counters.reconcile),
        },
        StageRow {
            stage: "fetch".to_string(),
            result: stage_result(outcome.fetch, fetch_ran),
            details: describe_counters(&outcome.counters.fetch),
        },
        StageRow {
            stage: "adjust".to_string(),
            result: stage_result(outcome.adjust, adjust_ran),
            details: describe_counters(&outcome.counters.adjust),
        },
        StageRow {
            stage: "overall".to_string(),
            result: stage_result(outcome.overall, true),
            details: format!("run_date={}", outcome.run_date),
        },
    ]
}

fn build_instrument_rows(instruments: &[Instrument]) -> Vec<InstrumentRow> {
    instruments
        .iter()
        .map(|i| InstrumentRow {
            code: i.code.clone(),
            name: i.name.clone(),
            segment: i.market_segment.to_string(),
            listed: i.listed_date.to_string(),
        })
        .collect()
}

fn build_price_rows(rows: &[PriceRow]) -> Vec<PriceOutRow> {
    rows.iter()
        .map(|r| PriceOutRow {
            date: r.date.to_string(),
            open: format_price(r.open),
            high: format_price(r.high),
            low: format_price(r.low),
            close: format_price(r.close),
            volume: r.volume,
        })
        .collect()
}

fn build_cursor_rows(cursors: &[(String, NaiveDate)]) -> Vec<CursorRow> {
    cursors
        .iter()
        .map(|(code, date)| CursorRow {
            code: code.clone(),
            last_fetched: date.to_string(),
        })
        .collect()
}

// -- Printing --

pub fn print_outcome(outcome: &PipelineOutcome, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(outcome);
            Ok(())
        }
        _ => print_rows(build_outcome_rows(outcome), format),
    }
}

pub fn print_stage<C: Serialize>(
    name: &str,
    stage: &StageResult<C>,
    format: &OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(stage);
            Ok(())
        }
        _ => print_rows(
            vec![StageRow {
                stage: name.to_string(),
                result: stage_result(stage.ok, true),
                details: describe_counters(&stage.counters),
            }],
            format,
        ),
    }
}

pub fn print_instruments(instruments: &[Instrument], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(&instruments);
            Ok(())
        }
        _ => print_rows(build_instrument_rows(instruments), format),
    }
}

pub fn print_prices(rows: &[PriceRow], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(&rows);
            Ok(())
        }
        _ => print_rows(build_price_rows(rows), format),
    }
}

pub fn print_cursors(cursors: &[(String, NaiveDate)], format: &OutputFormat) -> Result<()> {
    print_rows(build_cursor_rows(cursors), format)
}

fn print_rows<R: Tabled + Serialize>(rows: Vec<R>, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", Table::new(rows)),
        OutputFormat::Markdown => {
            let mut table = Table::new(rows);
            table.with(Style::markdown());
            println!("{}", table);
        }
        OutputFormat::Csv => write_csv(std::io::stdout(), &rows)?,
        OutputFormat::Json => print_json(&rows),
    }
    Ok(())
}

fn write_csv<W: Write, R: Serialize>(writer: W, rows: &[R]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn print_json<T: serde::Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}

fn format_price(value: f64) -> String {
    format!("{:.2}", value)
}
