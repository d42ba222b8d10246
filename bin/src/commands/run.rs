//! Run command implementation.
//!
//! Streams NDJSON ticks from a file or stdin through the engine until the
//! input ends or the process is interrupted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tickbar_lib::prelude::*;
use tickbar_lib::FeedReport;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::display::{ingest_spinner, print_summary, progress_message};
use crate::subscribers::{BarLogSubscriber, StdoutSubscriber};

/// Options for [`run`].
pub(crate) struct RunOptions {
    pub(crate) input: PathBuf,
    pub(crate) interval: Option<Interval>,
    pub(crate) config: Option<PathBuf>,
    pub(crate) store_dir: Option<PathBuf>,
    pub(crate) memory_store: bool,
    pub(crate) shards: Option<usize>,
    pub(crate) print_bars: bool,
}

/// Builds an engine from the options and feeds it the input.
pub(crate) async fn run(options: RunOptions, verbose: u8, quiet: bool) -> Result<()> {
    let mut config = match &options.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(interval) = options.interval {
        config.interval = interval;
    }
    if let Some(shards) = options.shards {
        config.shards = shards;
    }
    config.validate().context("Invalid configuration")?;

    let store: Arc<dyn BarStore> = if options.memory_store {
        Arc::new(MemoryBarStore::new())
    } else {
        let dir = options
            .store_dir
            .clone()
            .unwrap_or_else(FileBarStore::default_path);
        let store = FileBarStore::new(dir.clone())
            .with_context(|| format!("Failed to open bar store at {}", dir.display()))?;
        info!(path = %dir.display(), "Writing bars to file store");
        Arc::new(store)
    };

    let mut builder = Engine::builder(config)
        .store(store)
        .subscriber(Arc::new(BarLogSubscriber));
    if options.print_bars {
        builder = builder.subscriber(Arc::new(StdoutSubscriber));
    }
    let engine = builder.build().context("Failed to start engine")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, shutting down");
                cancel.cancel();
            }
        }
    });

    let progress = ingest_spinner(quiet || verbose > 0);
    let feed = if is_stdin(&options.input) {
        feed_with_progress(&engine, BufReader::new(tokio::io::stdin()), &cancel, &progress).await
    } else {
        let file = tokio::fs::File::open(&options.input)
            .await
            .with_context(|| format!("Failed to open input {}", options.input.display()))?;
        feed_with_progress(&engine, BufReader::new(file), &cancel, &progress).await
    };
    progress.finish_with_message(format!(
        "Read {} lines ({} accepted, {} rejected)",
        feed.lines, feed.accepted, feed.rejected
    ));

    let shutdown = engine.shutdown().await;
    if !quiet {
        print_summary(&shutdown);
    }

    if shutdown.bars_dropped > 0 || shutdown.retry.abandoned > 0 {
        warn!(
            bars_dropped = shutdown.bars_dropped,
            writes_abandoned = shutdown.retry.abandoned,
            "Some bars were not persisted"
        );
    }

    Ok(())
}

async fn feed_with_progress<R>(
    engine: &Engine,
    reader: R,
    cancel: &CancellationToken,
    progress: &indicatif::ProgressBar,
) -> FeedReport
where
    R: AsyncBufRead + Unpin + Send,
{
    let feed = drive(engine, tick_stream(reader), cancel);
    tokio::pin!(feed);

    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    loop {
        tokio::select! {
            report = &mut feed => return report,
            _ = ticker.tick() => progress.set_message(progress_message(&engine.metrics())),
        }
    }
}

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}
