//! Engine assembly and lifecycle.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tickbar_aggregate::{AggregateError, BarSink, IntervalAggregator};
use tickbar_notify::{Notifier, RegistryError, Subscriber, SubscriberRegistry};
use tickbar_store::{BarStore, MemoryBarStore, RetrySnapshot, StoreRetrier};
use tickbar_types::{Interval, Tick, TickError, TickMessage};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::{BarCommitter, ConfigError, EngineConfig, MetricsSnapshot};

/// Errors raised while building an [`Engine`].
#[derive(Error, Debug)]
pub enum EngineError {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A subscriber could not be registered.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The aggregator could not be started.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Summary of an engine shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Open bars finalized and committed by the final flush.
    pub bars_flushed: usize,
    /// Open bars that were never committed.
    pub bars_dropped: u64,
    /// Retrier counters after draining.
    pub retry: RetrySnapshot,
    /// True if the shutdown deadline passed before all work finished.
    pub timed_out: bool,
    /// Time spent shutting down.
    pub elapsed: Duration,
    /// Final engine counters.
    pub metrics: MetricsSnapshot,
}

/// Builder for an [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn BarStore>>,
    subscribers: Vec<Arc<dyn Subscriber>>,
}

impl EngineBuilder {
    /// Sets the bar store. Defaults to a [`MemoryBarStore`].
    #[must_use]
    pub fn store(mut self, store: Arc<dyn BarStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Appends a subscriber. Subscribers are invoked in the order added.
    #[must_use]
    pub fn subscriber(mut self, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Validates the configuration and starts the engine tasks.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration or a subscriber name
    /// that is empty or used twice.
    pub fn build(self) -> Result<Engine, EngineError> {
        self.config.validate()?;

        let mut registry = SubscriberRegistry::new();
        for subscriber in self.subscribers {
            registry.register(subscriber)?;
        }

        let store: Arc<dyn BarStore> = match self.store {
            Some(store) => store,
            None => {
                info!("No store configured, keeping bars in memory");
                Arc::new(MemoryBarStore::new())
            }
        };

        let names = registry.names().join(",");
        let notifier = Notifier::spawn(
            registry.freeze(),
            self.config.subscriber_timeout(),
            self.config.queue_capacity,
        );
        let retrier = StoreRetrier::spawn(
            Arc::clone(&store),
            self.config.retry,
            self.config.queue_capacity,
        );
        let committer = Arc::new(BarCommitter::new(
            store,
            notifier,
            retrier,
            self.config.store_timeout(),
        ));

        let aggregator = IntervalAggregator::spawn(
            self.config.aggregator_config(),
            Arc::clone(&committer) as Arc<dyn BarSink>,
        )?;

        info!(
            interval = %self.config.interval,
            shards = self.config.shards,
            subscribers = %names,
            source = %self.config.source,
            "Engine started"
        );

        Ok(Engine {
            config: self.config,
            aggregator,
            committer,
        })
    }
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.subscribers.iter().map(|s| s.name()).collect();
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("subscribers", &names)
            .finish()
    }
}

/// Running tick-to-bar engine.
///
/// Ticks are routed to the shard owning their symbol. Each finalized bar is
/// upserted into the store and then delivered to every subscriber.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    aggregator: IntervalAggregator,
    committer: Arc<BarCommitter>,
}

impl Engine {
    /// Starts building an engine with the given configuration.
    #[must_use]
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            store: None,
            subscribers: Vec::new(),
        }
    }

    /// Returns the configuration the engine was built with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the bar interval.
    #[must_use]
    pub const fn interval(&self) -> Interval {
        self.config.interval
    }

    /// Returns the store bars are written to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn BarStore> {
        self.committer.store()
    }

    /// Queues a tick for aggregation.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Rejected`] for a malformed tick and
    /// [`AggregateError::Closed`] once the engine has stopped.
    pub async fn ingest(&self, tick: Tick) -> Result<(), AggregateError> {
        self.aggregator.ingest(tick).await
    }

    /// Validates a raw feed message and queues it for aggregation.
    ///
    /// # Errors
    ///
    /// See [`Engine::ingest`].
    pub async fn ingest_message(&self, message: TickMessage) -> Result<(), AggregateError> {
        self.aggregator.ingest_message(message).await
    }

    /// Records a tick that could not be decoded.
    pub fn reject(&self, error: &TickError) {
        self.aggregator.reject(error);
    }

    /// Finalizes and commits every open bar.
    ///
    /// Returns the number of bars committed.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Closed`] if a shard has stopped.
    pub async fn flush(&self) -> Result<usize, AggregateError> {
        self.aggregator.flush().await
    }

    /// Collects every counter.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            aggregator: self.aggregator.stats().snapshot(),
            store: self.committer.snapshot(),
            retry: self.committer.retrier().stats().snapshot(),
            notify: self.committer.notifier().stats().snapshot(),
        }
    }

    /// Flushes open bars, drains pending retries and subscriber lanes, and
    /// stops every task.
    ///
    /// The whole sequence is bounded by `shutdown_timeout`. Anything left
    /// when the deadline passes is logged and counted as dropped.
    pub async fn shutdown(self) -> ShutdownReport {
        let started = Instant::now();
        let deadline = started + self.config.shutdown_timeout();
        let mut timed_out = false;

        info!(timeout = ?self.config.shutdown_timeout(), "Shutting down engine");

        let bars_flushed = match tokio::time::timeout_at(deadline, self.aggregator.flush()).await {
            Ok(Ok(count)) => count,
            Ok(Err(e)) => {
                error!(error = %e, "Final flush failed");
                0
            }
            Err(_) => {
                timed_out = true;
                warn!("Final flush did not finish before the shutdown deadline");
                0
            }
        };

        let retry = self.committer.retrier().close(deadline).await;
        if Instant::now() >= deadline {
            timed_out = true;
        }

        let aggregator_stats = Arc::clone(self.aggregator.stats());
        let grace = deadline.saturating_duration_since(Instant::now());
        let bars_dropped = self.aggregator.shutdown(grace).await;

        let notify = self.committer.notifier().close(deadline).await;
        if Instant::now() >= deadline {
            timed_out = true;
        }

        let report = ShutdownReport {
            bars_flushed,
            bars_dropped,
            retry,
            timed_out,
            elapsed: started.elapsed(),
            metrics: MetricsSnapshot {
                aggregator: aggregator_stats.snapshot(),
                store: self.committer.snapshot(),
                retry,
                notify,
            },
        };

        if bars_dropped > 0 || retry.abandoned > 0 {
            error!(
                bars_dropped,
                writes_abandoned = retry.abandoned,
                deliveries_dropped = notify.dropped,
                "Engine stopped with uncommitted bars"
            );
        } else if notify.dropped > 0 {
            warn!(
                deliveries_dropped = notify.dropped,
                "Engine stopped before every subscriber saw every bar"
            );
        } else {
            info!(
                bars_flushed,
                elapsed = ?report.elapsed,
                "Engine stopped"
            );
        }

        report
    }
}
