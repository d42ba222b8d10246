//! Background re-attempts of failed bar writes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tickbar_types::{Bar, BarKey};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::BarStore;

/// Backoff schedule for re-attempting failed writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts made before a bar is abandoned.
    pub max_retries: u32,
    /// Delay before the first attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 200,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Returns the delay before retry number `attempt` (starting at 0).
    ///
    /// Exponential in `attempt`, capped at `max_delay_ms`, with up to 25%
    /// jitter in either direction. The jitter is derived from `seed`, so a
    /// given bar always gets the same schedule while bars with different
    /// seeds spread out.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, seed: u64) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(10))
            .min(self.max_delay_ms);

        let spread = exp / 4;
        let offset = if spread == 0 {
            0
        } else {
            let mixed = seed
                .wrapping_add(u64::from(attempt))
                .wrapping_mul(0x9E37_79B9_7F4A_7C15);
            (mixed >> 32) % (spread * 2 + 1)
        };

        Duration::from_millis((exp - spread + offset).min(self.max_delay_ms))
    }
}

/// Counters kept by a [`StoreRetrier`].
#[derive(Debug, Default)]
pub struct RetryStats {
    retries: AtomicU64,
    recovered: AtomicU64,
    abandoned: AtomicU64,
    pending: AtomicU64,
}

impl RetryStats {
    /// Takes a point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> RetrySnapshot {
        RetrySnapshot {
            retries: self.retries.load(Ordering::Relaxed),
            recovered: self.recovered.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
        }
    }

    fn finish(&self, recovered: bool) {
        self.pending.fetch_sub(1, Ordering::Relaxed);
        if recovered {
            self.recovered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.abandoned.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of [`RetryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetrySnapshot {
    /// Failed re-attempts.
    pub retries: u64,
    /// Bars eventually written.
    pub recovered: u64,
    /// Bars given up on.
    pub abandoned: u64,
    /// Bars queued or being retried.
    pub pending: u64,
}

/// Background task that re-attempts failed upserts.
///
/// Bars are retried one at a time in submission order. A full queue or a
/// closed retrier abandons the bar immediately instead of blocking the
/// caller.
#[derive(Debug)]
pub struct StoreRetrier {
    tx: mpsc::Sender<Bar>,
    stats: Arc<RetryStats>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StoreRetrier {
    /// Spawns the retry worker on the current tokio runtime.
    ///
    /// `capacity` bounds the number of bars waiting for a retry.
    #[must_use]
    pub fn spawn(store: Arc<dyn BarStore>, policy: RetryPolicy, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(RetryStats::default());
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(run_retrier(
            store,
            policy,
            rx,
            Arc::clone(&stats),
            cancel.clone(),
        ));

        Self {
            tx,
            stats,
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queues a bar whose write failed.
    pub fn submit(&self, bar: Bar) {
        self.stats.pending.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.tx.try_send(bar) {
            let reason = match &e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "retrier closed",
            };
            let bar = e.into_inner();
            error!(
                symbol = bar.symbol(),
                interval_start = %bar.interval_start(),
                reason,
                "Abandoning bar write"
            );
            self.stats.finish(false);
        }
    }

    /// Returns the retry counters.
    #[must_use]
    pub fn stats(&self) -> &RetryStats {
        &self.stats
    }

    /// Stops accepting bars and drains the queue until `deadline`.
    ///
    /// Bars still queued at the deadline are counted as abandoned.
    pub async fn close(&self, deadline: Instant) -> RetrySnapshot {
        self.cancel.cancel();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut worker) = worker {
            if tokio::time::timeout_at(deadline, &mut worker).await.is_err() {
                worker.abort();
                let dropped = self.stats.pending.swap(0, Ordering::Relaxed);
                self.stats.abandoned.fetch_add(dropped, Ordering::Relaxed);
                error!(dropped, "Retrier drain timed out");
            }
        }

        self.stats.snapshot()
    }
}

async fn run_retrier(
    store: Arc<dyn BarStore>,
    policy: RetryPolicy,
    mut rx: mpsc::Receiver<Bar>,
    stats: Arc<RetryStats>,
    cancel: CancellationToken,
) {
    loop {
        let bar = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            bar = rx.recv() => match bar {
                Some(bar) => bar,
                None => return,
            },
        };
        retry_bar(store.as_ref(), &policy, &bar, &stats).await;
    }

    rx.close();
    let mut drained = 0usize;
    while let Some(bar) = rx.recv().await {
        retry_bar(store.as_ref(), &policy, &bar, &stats).await;
        drained += 1;
    }
    debug!(drained, "Retrier drained");
}

/// Jitter seed for a bar, stable for its key.
pub(crate) fn jitter_seed(key: &BarKey) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

async fn retry_bar(store: &dyn BarStore, policy: &RetryPolicy, bar: &Bar, stats: &RetryStats) {
    let seed = jitter_seed(&bar.key());
    for attempt in 0..policy.max_retries {
        tokio::time::sleep(policy.delay_for(attempt, seed)).await;

        match store.upsert(bar).await {
            Ok(outcome) => {
                info!(
                    symbol = bar.symbol(),
                    interval_start = %bar.interval_start(),
                    attempt = attempt + 1,
                    ?outcome,
                    "Recovered bar write"
                );
                stats.finish(true);
                return;
            }
            Err(e) => {
                stats.retries.fetch_add(1, Ordering::Relaxed);
                warn!(
                    symbol = bar.symbol(),
                    interval_start = %bar.interval_start(),
                    attempt = attempt + 1,
                    error = %e,
                    "Bar write retry failed"
                );
            }
        }
    }

    error!(
        symbol = bar.symbol(),
        interval_start = %bar.interval_start(),
        attempts = policy.max_retries,
        "Abandoning bar write"
    );
    stats.finish(false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryBarStore, Result, StoreError, Upsert};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use tickbar_types::{BarKey, DEFAULT_SOURCE};

    /// Fails the first `failures` writes, then delegates to memory.
    #[derive(Debug, Default)]
    struct FlakyStore {
        failures: AtomicU64,
        inner: MemoryBarStore,
    }

    impl FlakyStore {
        fn failing(failures: u64) -> Self {
            Self {
                failures: AtomicU64::new(failures),
                inner: MemoryBarStore::new(),
            }
        }
    }

    #[async_trait]
    impl BarStore for FlakyStore {
        async fn upsert(&self, bar: &Bar) -> Result<Upsert> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("injected".to_string()));
            }
            self.inner.upsert(bar).await
        }

        async fn get(&self, key: &BarKey) -> Result<Option<Bar>> {
            self.inner.get(key).await
        }

        async fn bars(&self, symbol: &str) -> Result<Vec<Bar>> {
            self.inner.bars(symbol).await
        }
    }

    fn bar() -> Bar {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 14, 32, 0).unwrap();
        Bar::new(
            "AAPL",
            start,
            dec!(150.00),
            dec!(151.50),
            dec!(149.00),
            dec!(150.75),
            700,
            4,
            DEFAULT_SOURCE,
        )
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };

        let seed = jitter_seed(&bar().key());
        let first = policy.delay_for(0, seed);
        assert!(first >= Duration::from_millis(75) && first <= Duration::from_millis(125));

        let third = policy.delay_for(2, seed);
        assert!(third >= Duration::from_millis(300) && third <= Duration::from_millis(500));

        for attempt in 0..40 {
            assert!(policy.delay_for(attempt, seed) <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn test_jitter_depends_on_bar_key() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
        };
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 14, 32, 0).unwrap();

        let delays: Vec<Duration> = ["AAPL", "MSFT", "GOOG", "AMZN", "NVDA", "META"]
            .iter()
            .map(|symbol| policy.delay_for(0, jitter_seed(&BarKey::new(*symbol, start))))
            .collect();

        for delay in &delays {
            assert!(*delay >= Duration::from_millis(750) && *delay <= Duration::from_millis(1_250));
        }
        assert!(
            delays.iter().any(|d| *d != delays[0]),
            "every bar got the same delay: {delays:?}"
        );

        let key = BarKey::new("AAPL", start);
        assert_eq!(
            policy.delay_for(1, jitter_seed(&key)),
            policy.delay_for(1, jitter_seed(&key))
        );
    }

    #[test]
    fn test_policy_serde_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_retries": 2}"#).unwrap();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_delay_ms, RetryPolicy::default().base_delay_ms);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_failures() {
        let store = Arc::new(FlakyStore::failing(2));
        let retrier = StoreRetrier::spawn(store.clone(), policy(5), 8);

        retrier.submit(bar());
        let snapshot = retrier
            .close(Instant::now() + Duration::from_secs(10))
            .await;

        assert_eq!(snapshot.recovered, 1);
        assert_eq!(snapshot.retries, 2);
        assert_eq!(snapshot.abandoned, 0);
        assert_eq!(snapshot.pending, 0);
        assert_eq!(store.inner.get(&bar().key()).await.unwrap(), Some(bar()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandons_after_max_retries() {
        let store = Arc::new(FlakyStore::failing(u64::MAX));
        let retrier = StoreRetrier::spawn(store, policy(3), 8);

        retrier.submit(bar());
        let snapshot = retrier
            .close(Instant::now() + Duration::from_secs(10))
            .await;

        assert_eq!(snapshot.retries, 3);
        assert_eq!(snapshot.recovered, 0);
        assert_eq!(snapshot.abandoned, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_after_close_is_abandoned() {
        let store = Arc::new(MemoryBarStore::new());
        let retrier = StoreRetrier::spawn(store.clone(), policy(3), 8);

        retrier
            .close(Instant::now() + Duration::from_secs(1))
            .await;
        retrier.submit(bar());

        assert_eq!(retrier.stats().snapshot().abandoned, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_deadline_abandons_pending() {
        let store = Arc::new(FlakyStore::failing(u64::MAX));
        let retrier = StoreRetrier::spawn(
            store,
            RetryPolicy {
                max_retries: 100,
                base_delay_ms: 1_000,
                max_delay_ms: 1_000,
            },
            8,
        );

        retrier.submit(bar());
        retrier.submit(bar());
        let snapshot = retrier
            .close(Instant::now() + Duration::from_millis(50))
            .await;

        assert_eq!(snapshot.abandoned, 2);
        assert_eq!(snapshot.pending, 0);
    }
}
