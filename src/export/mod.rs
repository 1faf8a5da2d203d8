//! CSV export of saved race history.
//!
//! One header row plus one row per saved race, rows joined with `\n`.
//! Money columns carry two decimals; the date column is the en-US short
//! date (`M/D/YYYY`) of the race timestamp in UTC. Text fields are quoted
//! RFC 4180 style when they contain a delimiter, quote or line break.

use chrono::NaiveDate;
use rust_decimal::prelude::*;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::types::{Snapshot, ToteError};

pub const CSV_HEADER: &str =
    "Date,Total Tickets,Total Revenue,Total Payout,Charity Profit,Payout %,Currency";

/// File name for an export produced on `date`, e.g. `tote-races-2024-06-10.csv`.
pub fn export_filename(date: NaiveDate) -> String {
    format!("tote-races-{}.csv", date.format("%Y-%m-%d"))
}

fn money(value: Decimal) -> String {
    let mut v = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    v.rescale(2);
    v.to_string()
}

/// Quote a text field if it would otherwise split the row.
fn csv_field(text: &str) -> Cow<'_, str> {
    if text.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", text.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(text)
    }
}

fn csv_row(race: &Snapshot) -> String {
    format!(
        "{},{},{},{},{},{}%,{}",
        race.timestamp.format("%-m/%-d/%Y"),
        race.total_tickets,
        money(race.total_revenue),
        money(race.total_payout),
        money(race.charity_profit),
        race.payout_percentage.normalize(),
        csv_field(&race.currency),
    )
}

/// Render the history as CSV text. `None` when there is nothing to export.
pub fn render_csv(history: &[Snapshot]) -> Option<String> {
    if history.is_empty() {
        return None;
    }
    let rows: Vec<String> = history.iter().map(csv_row).collect();
    Some(format!("{CSV_HEADER}\n{}", rows.join("\n")))
}

/// Write the CSV for `history` into `dir`, named for `date`.
/// Returns the written path, or `None` when the history is empty.
pub fn write_csv(
    dir: &Path,
    history: &[Snapshot],
    date: NaiveDate,
) -> Result<Option<PathBuf>, ToteError> {
    let Some(csv) = render_csv(history) else {
        return Ok(None);
    };

    std::fs::create_dir_all(dir)
        .map_err(|e| ToteError::Storage(format!("Failed to create {}: {e}", dir.display())))?;
    let path = dir.join(export_filename(date));
    std::fs::write(&path, csv)
        .map_err(|e| ToteError::Storage(format!("Failed to write {}: {e}", path.display())))?;

    info!(path = %path.display(), races = history.len(), "History exported");
    Ok(Some(path))
}
