//! tickbar CLI - Streaming tick-to-OHLCV bar aggregation.

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tickbar_lib::Interval;

mod commands;
mod display;
mod logging;
mod subscribers;

use display::Format;

#[derive(Parser)]
#[command(name = "tickbar")]
#[command(about = "Streaming tick-to-OHLCV bar aggregation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (errors only, no progress or summary)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate an NDJSON tick feed into bars
    Run {
        /// Input file, or - for stdin
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Bar interval (s1, m1, m5, m15, m30, h1, h4, d1 or seconds)
        #[arg(long)]
        interval: Option<Interval>,

        /// TOML engine configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Bar store directory. Defaults to the platform data directory.
        #[arg(long, conflicts_with = "memory_store")]
        store_dir: Option<PathBuf>,

        /// Keep bars in memory instead of writing them to disk
        #[arg(long)]
        memory_store: bool,

        /// Number of aggregation shards
        #[arg(long)]
        shards: Option<usize>,

        /// Write each finalized bar to stdout as NDJSON
        #[arg(long)]
        print_bars: bool,
    },

    /// Show stored bars for a symbol
    Bars {
        /// Instrument symbol (e.g., AAPL)
        symbol: String,

        /// Bar store directory. Defaults to the platform data directory.
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: Format,

        /// Show only the most recent N bars
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// List supported bar intervals
    Intervals,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Show help if no command provided
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    logging::init(cli.verbose, cli.quiet, cli.log_json);

    match command {
        Commands::Run {
            input,
            interval,
            config,
            store_dir,
            memory_store,
            shards,
            print_bars,
        } => {
            let options = commands::run::RunOptions {
                input,
                interval,
                config,
                store_dir,
                memory_store,
                shards,
                print_bars,
            };
            commands::run::run(options, cli.verbose, cli.quiet).await
        }
        Commands::Bars {
            symbol,
            store_dir,
            format,
            limit,
        } => commands::bars::show_bars(&symbol, store_dir, format, limit).await,
        Commands::Intervals => {
            commands::intervals::list_intervals();
            Ok(())
        }
    }
}
