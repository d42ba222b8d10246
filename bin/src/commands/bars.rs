//! Bars command implementation.
//!
//! Reads finalized bars for one symbol back out of a file store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tickbar_lib::prelude::*;

use crate::display::{Format, print_bar_table};

/// Prints the stored bars of `symbol`.
pub(crate) async fn show_bars(
    symbol: &str,
    store_dir: Option<PathBuf>,
    format: Format,
    limit: Option<usize>,
) -> Result<()> {
    let dir = store_dir.unwrap_or_else(FileBarStore::default_path);
    let store = FileBarStore::new(dir.clone())
        .with_context(|| format!("Failed to open bar store at {}", dir.display()))?;

    let mut bars = store
        .bars(symbol)
        .await
        .with_context(|| format!("Failed to read bars for {symbol}"))?;

    if let Some(limit) = limit {
        let skip = bars.len().saturating_sub(limit);
        bars.drain(..skip);
    }

    if bars.is_empty() {
        println!("No bars stored for {symbol}.");
        return Ok(());
    }

    match format {
        Format::Table => {
            print_bar_table(&bars);
            println!("\nTotal: {} bars", bars.len());
        }
        Format::Json => println!("{}", serde_json::to_string_pretty(&bars)?),
        Format::Ndjson => {
            for bar in &bars {
                println!("{}", serde_json::to_string(bar)?);
            }
        }
    }

    Ok(())
}
