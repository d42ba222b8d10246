//! Sharded interval aggregation across symbols.
//!
//! Every symbol is routed by hash to exactly one shard task, and that task is
//! the only writer of the symbol's open bar. Shards never share state, so
//! ticks for symbols on different shards proceed in parallel.

use std::collections::{HashMap, VecDeque};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tickbar_types::{Bar, DEFAULT_SOURCE, Interval, Tick, TickError, TickMessage};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::{AggregatorStats, Apply, BarAccumulator};

/// Receives bars as they are finalized.
///
/// A shard awaits `accept` before handling its next tick, so one symbol's
/// bars arrive in increasing `interval_start` order.
#[async_trait]
pub trait BarSink: Send + Sync + 'static {
    /// Handles a finalized bar.
    async fn accept(&self, bar: Bar);
}

/// Errors returned by [`IntervalAggregator`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// The tick was malformed and was not applied.
    #[error("Rejected malformed tick: {0}")]
    Rejected(#[from] TickError),

    /// The aggregator has been shut down.
    #[error("Aggregator is shut down")]
    Closed,

    /// Invalid configuration.
    #[error("Invalid aggregator configuration: {0}")]
    Config(&'static str),
}

/// Configuration for the [`IntervalAggregator`].
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Bar interval.
    pub interval: Interval,
    /// Number of shard tasks.
    pub shards: usize,
    /// Queue depth per shard.
    pub queue_capacity: usize,
    /// Source tag stamped on every bar.
    pub source: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            interval: Interval::default(),
            shards: std::thread::available_parallelism().map_or(4, |n| n.get()),
            queue_capacity: 1024,
            source: DEFAULT_SOURCE.to_string(),
        }
    }
}

/// Result of [`OpenBars::ingest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new bar was opened for the symbol.
    Opened,
    /// The open bar was updated.
    Updated,
    /// The tick crossed a boundary: the previous bar was finalized and a new
    /// one opened with the tick.
    Rolled(Bar),
    /// The tick belongs to an interval that is already closed and was dropped.
    Late {
        /// Start of the symbol's open interval.
        open_interval: DateTime<Utc>,
        /// Start of the interval the tick belongs to.
        tick_interval: DateTime<Utc>,
    },
}

/// Map of open bars with a single owner.
///
/// This is the synchronous core of a shard; it is also usable directly when
/// ticks arrive on one thread.
#[derive(Debug)]
pub struct OpenBars {
    interval: Interval,
    source: Arc<str>,
    bars: HashMap<String, BarAccumulator>,
}

impl OpenBars {
    /// Creates an empty map.
    #[must_use]
    pub fn new(interval: Interval, source: impl Into<Arc<str>>) -> Self {
        Self {
            interval,
            source: source.into(),
            bars: HashMap::new(),
        }
    }

    /// Folds a tick into its symbol's bar.
    pub fn ingest(&mut self, tick: &Tick) -> IngestOutcome {
        let Some(accumulator) = self.bars.get_mut(&tick.symbol) else {
            let mut accumulator =
                BarAccumulator::new(tick.symbol.clone(), self.interval, Arc::clone(&self.source));
            accumulator.apply(tick);
            self.bars.insert(tick.symbol.clone(), accumulator);
            return IngestOutcome::Opened;
        };

        match accumulator.apply(tick) {
            Apply::Opened => IngestOutcome::Opened,
            Apply::Updated => IngestOutcome::Updated,
            Apply::NewInterval => accumulator
                .roll(tick)
                .map_or(IngestOutcome::Opened, IngestOutcome::Rolled),
            Apply::Late => IngestOutcome::Late {
                open_interval: accumulator
                    .open_interval()
                    .unwrap_or_else(|| self.interval.floor(tick.timestamp)),
                tick_interval: self.interval.floor(tick.timestamp),
            },
        }
    }

    /// Finalizes every open bar, leaving the map empty.
    ///
    /// Bars are returned sorted by symbol.
    pub fn drain(&mut self) -> Vec<Bar> {
        let mut bars: Vec<Bar> = self
            .bars
            .drain()
            .filter_map(|(_, mut accumulator)| accumulator.finish())
            .collect();
        bars.sort_by(|a, b| a.symbol().cmp(b.symbol()));
        bars
    }

    /// Returns the symbols with an open bar.
    #[must_use]
    pub fn symbols(&self) -> Vec<&str> {
        self.bars.keys().map(String::as_str).collect()
    }

    /// Returns the number of open bars.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Returns true if no bar is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

enum ShardCommand {
    Tick(Tick),
    Flush(oneshot::Sender<usize>),
}

/// Routes ticks to per-symbol shards and finalizes bars on boundaries.
#[derive(Debug)]
pub struct IntervalAggregator {
    interval: Interval,
    senders: Vec<mpsc::Sender<ShardCommand>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<AggregatorStats>,
}

impl IntervalAggregator {
    /// Spawns the shard tasks on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the shard count or queue capacity is zero.
    pub fn spawn(config: AggregatorConfig, sink: Arc<dyn BarSink>) -> Result<Self, AggregateError> {
        if config.shards == 0 {
            return Err(AggregateError::Config("shards must be at least 1"));
        }
        if config.queue_capacity == 0 {
            return Err(AggregateError::Config("queue_capacity must be at least 1"));
        }

        let stats = Arc::new(AggregatorStats::default());
        let source: Arc<str> = Arc::from(config.source.as_str());
        let mut senders = Vec::with_capacity(config.shards);
        let mut workers = Vec::with_capacity(config.shards);

        for index in 0..config.shards {
            let (tx, rx) = mpsc::channel(config.queue_capacity);
            let book = OpenBars::new(config.interval, Arc::clone(&source));
            workers.push(tokio::spawn(run_shard(
                index,
                rx,
                book,
                Arc::clone(&sink),
                Arc::clone(&stats),
            )));
            senders.push(tx);
        }

        Ok(Self {
            interval: config.interval,
            senders,
            workers,
            stats,
        })
    }

    /// Returns the interval being aggregated to.
    #[must_use]
    pub const fn interval(&self) -> Interval {
        self.interval
    }

    /// Returns the shared counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<AggregatorStats> {
        &self.stats
    }

    /// Returns the number of shards.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.senders.len()
    }

    /// Returns the shard that owns `symbol`.
    #[must_use]
    pub fn shard_for(&self, symbol: &str) -> usize {
        shard_index(symbol, self.senders.len())
    }

    /// Validates a tick and queues it on its symbol's shard.
    ///
    /// Waits only when that shard's queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Rejected`] for malformed ticks and
    /// [`AggregateError::Closed`] after shutdown.
    pub async fn ingest(&self, tick: Tick) -> Result<(), AggregateError> {
        if let Err(e) = tick.validate() {
            self.stats.record_rejected();
            warn!(symbol = %tick.symbol, error = %e, "Rejected malformed tick");
            return Err(e.into());
        }

        let shard = self.shard_for(&tick.symbol);
        self.senders[shard]
            .send(ShardCommand::Tick(tick))
            .await
            .map_err(|_| AggregateError::Closed)?;
        self.stats.record_ingested();
        Ok(())
    }

    /// Validates a raw feed message and ingests it.
    ///
    /// # Errors
    ///
    /// See [`IntervalAggregator::ingest`].
    pub async fn ingest_message(&self, message: TickMessage) -> Result<(), AggregateError> {
        match message.validate() {
            Ok(tick) => self.ingest(tick).await,
            Err(e) => {
                self.stats.record_rejected();
                warn!(error = %e, "Rejected malformed tick message");
                Err(e.into())
            }
        }
    }

    /// Counts a tick that was rejected before it reached the aggregator,
    /// such as an undecodable feed line.
    pub fn reject(&self, error: &TickError) {
        self.stats.record_rejected();
        warn!(error = %error, "Rejected malformed tick message");
    }

    /// Finalizes every open bar on every shard and hands each to the sink.
    ///
    /// Returns once all shards have delivered their bars. Ticks queued before
    /// the flush are applied first.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Closed`] if a shard has stopped.
    pub async fn flush(&self) -> Result<usize, AggregateError> {
        let mut replies = Vec::with_capacity(self.senders.len());
        for sender in &self.senders {
            let (tx, rx) = oneshot::channel();
            sender
                .send(ShardCommand::Flush(tx))
                .await
                .map_err(|_| AggregateError::Closed)?;
            replies.push(rx);
        }

        let mut flushed = 0;
        for reply in replies {
            flushed += reply.await.map_err(|_| AggregateError::Closed)?;
        }
        Ok(flushed)
    }

    /// Stops the shards, waiting up to `grace` for them to exit.
    ///
    /// Shards still running at the deadline are aborted. Returns the number
    /// of bars that were open but never delivered.
    pub async fn shutdown(self, grace: Duration) -> u64 {
        drop(self.senders);
        let deadline = tokio::time::Instant::now() + grace;

        for (index, mut worker) in self.workers.into_iter().enumerate() {
            match tokio::time::timeout_at(deadline, &mut worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(shard = index, error = %e, "Shard task failed"),
                Err(_) => {
                    worker.abort();
                    warn!(shard = index, "Shard did not stop before deadline, aborted");
                    // Dropping the shard's state logs the symbols it still held.
                    let _ = worker.await;
                }
            }
        }

        self.stats.open_bars()
    }
}

/// Bars owned by one shard task.
///
/// Whatever is still held when the task ends, including by abort at the
/// shutdown deadline, is logged by symbol as dropped.
struct ShardState {
    index: usize,
    book: OpenBars,
    pending: VecDeque<Bar>,
}

impl ShardState {
    fn uncommitted_symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self
            .pending
            .iter()
            .map(Bar::symbol)
            .chain(self.book.symbols())
            .collect();
        symbols.sort_unstable();
        symbols.dedup();
        symbols
    }
}

impl Drop for ShardState {
    fn drop(&mut self) {
        if self.book.is_empty() && self.pending.is_empty() {
            return;
        }
        warn!(
            shard = self.index,
            bars = self.book.len() + self.pending.len(),
            symbols = ?self.uncommitted_symbols(),
            "Shard stopped with uncommitted bars, dropping them"
        );
    }
}

async fn run_shard(
    index: usize,
    mut commands: mpsc::Receiver<ShardCommand>,
    book: OpenBars,
    sink: Arc<dyn BarSink>,
    stats: Arc<AggregatorStats>,
) {
    let mut state = ShardState {
        index,
        book,
        pending: VecDeque::new(),
    };

    while let Some(command) = commands.recv().await {
        match command {
            ShardCommand::Tick(tick) => match state.book.ingest(&tick) {
                IngestOutcome::Opened => stats.record_opened(),
                IngestOutcome::Updated => {}
                IngestOutcome::Rolled(bar) => {
                    debug!(shard = index, key = %bar.key(), "Bar finalized on boundary");
                    stats.record_finalized(1);
                    sink.accept(bar).await;
                }
                IngestOutcome::Late {
                    open_interval,
                    tick_interval,
                } => {
                    stats.record_late();
                    warn!(
                        symbol = %tick.symbol,
                        tick_interval = %tick_interval,
                        open_interval = %open_interval,
                        "Dropped late tick for closed interval"
                    );
                }
            },
            ShardCommand::Flush(reply) => {
                state.pending.extend(state.book.drain());
                let count = state.pending.len();
                // A bar leaves `pending` only once the sink has taken it.
                while let Some(bar) = state.pending.front().cloned() {
                    stats.record_finalized(1);
                    sink.accept(bar).await;
                    state.pending.pop_front();
                    stats.record_closed(1);
                }
                debug!(shard = index, bars = count, "Shard flushed");
                let _ = reply.send(count);
            }
        }
    }
}

/// Maps a symbol to a shard index.
fn shard_index(symbol: &str, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    symbol.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}
