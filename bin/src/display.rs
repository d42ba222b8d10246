//! Display utilities and output formatting for the tickbar CLI.

use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use tickbar_lib::prelude::*;
use tickbar_lib::ShutdownReport;

/// Output format for stored bars.
#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum Format {
    Table,
    Json,
    Ndjson,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Table => "table",
            Self::Json => "json",
            Self::Ndjson => "ndjson",
        };
        write!(f, "{name}")
    }
}

/// Creates the live ingest spinner, or a hidden one when output is quiet.
pub(crate) fn ingest_spinner(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner
}

/// One-line summary of the engine counters for the spinner.
pub(crate) fn progress_message(metrics: &MetricsSnapshot) -> String {
    format!(
        "{} ticks, {} rejected, {} late, {} bars, {} open",
        metrics.aggregator.ticks_ingested,
        metrics.aggregator.ticks_rejected,
        metrics.aggregator.late_ticks,
        metrics.aggregator.bars_finalized,
        metrics.aggregator.open_bars
    )
}

/// Prints the end-of-run summary to stderr.
pub(crate) fn print_summary(shutdown: &ShutdownReport) {
    let metrics = &shutdown.metrics;
    eprintln!();
    eprintln!("{:<20} {}", "Ticks ingested:", metrics.aggregator.ticks_ingested);
    eprintln!("{:<20} {}", "Ticks rejected:", metrics.aggregator.ticks_rejected);
    eprintln!("{:<20} {}", "Late ticks:", metrics.aggregator.late_ticks);
    eprintln!("{:<20} {}", "Bars finalized:", metrics.aggregator.bars_finalized);
    eprintln!("{:<20} {}", "Store writes:", metrics.store.store_writes);
    eprintln!(
        "{:<20} {} failed, {} timed out, {} recovered, {} abandoned",
        "Store errors:",
        metrics.store.store_failures,
        metrics.store.store_timeouts,
        metrics.retry.recovered,
        metrics.retry.abandoned
    );
    eprintln!(
        "{:<20} {} delivered, {} failed, {} timed out, {} panicked, {} dropped",
        "Subscribers:",
        metrics.notify.delivered,
        metrics.notify.failed,
        metrics.notify.timed_out,
        metrics.notify.panicked,
        metrics.notify.dropped
    );
    eprintln!(
        "{:<20} {} flushed, {} dropped in {:.2?}",
        "Shutdown:", shutdown.bars_flushed, shutdown.bars_dropped, shutdown.elapsed
    );
}

/// Prints bars as an aligned table.
pub(crate) fn print_bar_table(bars: &[Bar]) {
    println!(
        "{:<26} {:>12} {:>12} {:>12} {:>12} {:>12} {:>6}",
        "INTERVAL START", "OPEN", "HIGH", "LOW", "CLOSE", "VOLUME", "TICKS"
    );
    println!("{}", "-".repeat(100));

    for bar in bars {
        println!(
            "{:<26} {:>12} {:>12} {:>12} {:>12} {:>12} {:>6}",
            bar.interval_start().to_rfc3339(),
            bar.open(),
            bar.high(),
            bar.low(),
            bar.close(),
            bar.volume(),
            bar.tick_count()
        );
    }
}
