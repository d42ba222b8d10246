//! Persisting and publishing finalized bars.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tickbar_aggregate::BarSink;
use tickbar_notify::{NotifyReport, Notifier};
use tickbar_store::{BarStore, StoreRetrier, Upsert};
use tickbar_types::Bar;
use tracing::{debug, warn};

/// What happened to the store write of a committed bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The upsert completed.
    Written(Upsert),
    /// The upsert returned an error; the bar was handed to the retrier.
    Failed,
    /// The upsert did not finish in time; the bar was handed to the retrier.
    TimedOut,
}

/// Outcome of committing one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    /// Store write outcome.
    pub store: StoreOutcome,
    /// Subscriber lanes the bar was queued on.
    pub notify: NotifyReport,
}

/// Store-side counters of a [`BarCommitter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitSnapshot {
    /// Upserts that completed.
    pub store_writes: u64,
    /// Upserts that returned an error.
    pub store_failures: u64,
    /// Upserts that exceeded the store timeout.
    pub store_timeouts: u64,
}

#[derive(Debug, Default)]
struct CommitStats {
    store_writes: AtomicU64,
    store_failures: AtomicU64,
    store_timeouts: AtomicU64,
}

/// Writes each finalized bar to the store, then hands it to subscribers.
///
/// Notification does not wait for a successful write: a failed or slow
/// upsert is handed to the [`StoreRetrier`] and subscribers are notified
/// regardless. Nor does it wait for the subscribers themselves; the bar is
/// queued on each subscriber's lane.
#[derive(Debug)]
pub struct BarCommitter {
    store: Arc<dyn BarStore>,
    notifier: Notifier,
    retrier: StoreRetrier,
    store_timeout: Duration,
    stats: CommitStats,
}

impl BarCommitter {
    /// Creates a committer.
    #[must_use]
    pub fn new(
        store: Arc<dyn BarStore>,
        notifier: Notifier,
        retrier: StoreRetrier,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            retrier,
            store_timeout,
            stats: CommitStats::default(),
        }
    }

    /// Persists the bar and queues it for every subscriber.
    ///
    /// Waits at most `store_timeout`, never on a subscriber.
    pub async fn commit(&self, bar: Bar) -> CommitReport {
        let store = match tokio::time::timeout(self.store_timeout, self.store.upsert(&bar)).await {
            Ok(Ok(outcome)) => {
                self.stats.store_writes.fetch_add(1, Ordering::Relaxed);
                debug!(
                    symbol = bar.symbol(),
                    interval_start = %bar.interval_start(),
                    ?outcome,
                    "Stored bar"
                );
                StoreOutcome::Written(outcome)
            }
            Ok(Err(e)) => {
                self.stats.store_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    symbol = bar.symbol(),
                    interval_start = %bar.interval_start(),
                    error = %e,
                    "Bar write failed, queued for retry"
                );
                self.retrier.submit(bar.clone());
                StoreOutcome::Failed
            }
            Err(_) => {
                self.stats.store_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    symbol = bar.symbol(),
                    interval_start = %bar.interval_start(),
                    timeout = ?self.store_timeout,
                    "Bar write timed out, queued for retry"
                );
                self.retrier.submit(bar.clone());
                StoreOutcome::TimedOut
            }
        };

        let notify = self.notifier.notify(Arc::new(bar));
        CommitReport { store, notify }
    }

    /// Returns the store counters.
    #[must_use]
    pub fn snapshot(&self) -> CommitSnapshot {
        CommitSnapshot {
            store_writes: self.stats.store_writes.load(Ordering::Relaxed),
            store_failures: self.stats.store_failures.load(Ordering::Relaxed),
            store_timeouts: self.stats.store_timeouts.load(Ordering::Relaxed),
        }
    }

    /// Returns the subscriber notifier.
    #[must_use]
    pub const fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Returns the background retrier.
    #[must_use]
    pub const fn retrier(&self) -> &StoreRetrier {
        &self.retrier
    }

    /// Returns the store bars are written to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn BarStore> {
        &self.store
    }
}

#[async_trait]
impl BarSink for BarCommitter {
    async fn accept(&self, bar: Bar) {
        self.commit(bar).await;
    }
}
