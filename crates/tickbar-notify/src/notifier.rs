//! Fan-out of finalized bars to subscribers.
//!
//! Each subscriber owns a delivery lane: a bounded queue drained by its own
//! task. A bar is handed to the lanes in registration order and never waits
//! on a subscriber, so a slow or hung subscriber only delays itself. Within
//! a lane bars are delivered one at a time, in the order they were queued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tickbar_types::Bar;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::Subscriber;

/// Outcome of handing one bar to every subscriber lane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Lanes that accepted the bar.
    pub queued: u32,
    /// Lanes that were full or closed and dropped the bar.
    pub dropped: u32,
}

impl NotifyReport {
    /// Returns true if every subscriber will see the bar.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.dropped == 0
    }
}

/// Running totals across all deliveries.
#[derive(Debug, Default)]
pub struct NotifyStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    panicked: AtomicU64,
    dropped: AtomicU64,
    pending: AtomicU64,
}

impl NotifyStats {
    /// Takes a point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> NotifySnapshot {
        NotifySnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`NotifyStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotifySnapshot {
    /// Successful deliveries.
    pub delivered: u64,
    /// Deliveries that returned an error.
    pub failed: u64,
    /// Deliveries aborted at the timeout.
    pub timed_out: u64,
    /// Deliveries that panicked.
    pub panicked: u64,
    /// Deliveries never attempted: the lane was full, closed, or cut off at
    /// shutdown.
    pub dropped: u64,
    /// Deliveries queued or in progress.
    pub pending: u64,
}

struct Lane {
    name: Arc<str>,
    tx: mpsc::Sender<Arc<Bar>>,
}

/// Delivers bars to a fixed list of subscribers.
pub struct Notifier {
    lanes: Vec<Lane>,
    timeout: Duration,
    stats: Arc<NotifyStats>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Notifier {
    /// Spawns one delivery lane per subscriber on the current tokio runtime.
    ///
    /// `timeout` bounds each `on_bar` call and `capacity` bounds the bars
    /// waiting in each lane.
    #[must_use]
    pub fn spawn(
        subscribers: Arc<[Arc<dyn Subscriber>]>,
        timeout: Duration,
        capacity: usize,
    ) -> Self {
        let stats = Arc::new(NotifyStats::default());
        let cancel = CancellationToken::new();
        let mut lanes = Vec::with_capacity(subscribers.len());
        let mut workers = Vec::with_capacity(subscribers.len());

        for subscriber in subscribers.iter() {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            lanes.push(Lane {
                name: Arc::from(subscriber.name()),
                tx,
            });
            workers.push(tokio::spawn(run_lane(
                Arc::clone(subscriber),
                rx,
                timeout,
                Arc::clone(&stats),
                cancel.clone(),
            )));
        }

        Self {
            lanes,
            timeout,
            stats,
            cancel,
            workers: Mutex::new(workers),
        }
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    /// Returns true if there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Subscriber names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.lanes.iter().map(|lane| lane.name.as_ref()).collect()
    }

    /// Returns the running totals.
    #[must_use]
    pub fn stats(&self) -> &NotifyStats {
        &self.stats
    }

    /// Hands the bar to every subscriber lane in registration order.
    ///
    /// Never waits on a subscriber. A lane that is full or closed drops the
    /// bar for that subscriber only, and the drop is logged.
    pub fn notify(&self, bar: Arc<Bar>) -> NotifyReport {
        let mut report = NotifyReport::default();

        for lane in &self.lanes {
            self.stats.pending.fetch_add(1, Ordering::Relaxed);
            match lane.tx.try_send(Arc::clone(&bar)) {
                Ok(()) => report.queued += 1,
                Err(e) => {
                    let reason = match e {
                        mpsc::error::TrySendError::Full(_) => "lane full",
                        mpsc::error::TrySendError::Closed(_) => "notifier closed",
                    };
                    self.stats.pending.fetch_sub(1, Ordering::Relaxed);
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        subscriber = %lane.name,
                        bar = %bar.key(),
                        reason,
                        "Dropped bar for subscriber"
                    );
                    report.dropped += 1;
                }
            }
        }

        report
    }

    /// Stops accepting bars and lets every lane drain until `deadline`.
    ///
    /// Lanes still busy at the deadline are aborted; their queued and
    /// in-flight bars are counted as dropped.
    pub async fn close(&self, deadline: Instant) -> NotifySnapshot {
        self.cancel.cancel();

        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let mut cut_off = Vec::new();
        for (lane, mut worker) in self.lanes.iter().zip(workers) {
            match tokio::time::timeout_at(deadline, &mut worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(subscriber = %lane.name, error = %e, "Delivery lane failed"),
                Err(_) => {
                    worker.abort();
                    // Resolves once the lane and its queue are dropped.
                    let _ = worker.await;
                    cut_off.push(lane.name.as_ref());
                }
            }
        }

        if !cut_off.is_empty() {
            let dropped = self.stats.pending.swap(0, Ordering::Relaxed);
            self.stats.dropped.fetch_add(dropped, Ordering::Relaxed);
            error!(
                subscribers = ?cut_off,
                dropped,
                "Delivery lanes did not drain before the deadline"
            );
        }

        self.stats.snapshot()
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.names())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

async fn run_lane(
    subscriber: Arc<dyn Subscriber>,
    mut rx: mpsc::Receiver<Arc<Bar>>,
    timeout: Duration,
    stats: Arc<NotifyStats>,
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
        deliver(&subscriber, bar, timeout, &stats).await;
    }

    rx.close();
    let mut drained = 0usize;
    while let Some(bar) = rx.recv().await {
        deliver(&subscriber, bar, timeout, &stats).await;
        drained += 1;
    }
    debug!(subscriber = subscriber.name(), drained, "Delivery lane drained");
}

/// Aborts the wrapped task when dropped, including when the lane itself is
/// aborted mid-delivery.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn deliver(
    subscriber: &Arc<dyn Subscriber>,
    bar: Arc<Bar>,
    timeout: Duration,
    stats: &NotifyStats,
) {
    let name = subscriber.name();
    let task = {
        let subscriber = Arc::clone(subscriber);
        let bar = Arc::clone(&bar);
        tokio::spawn(async move { subscriber.on_bar(bar).await })
    };
    let _guard = AbortOnDrop(task.abort_handle());

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(()))) => {
            trace!(subscriber = name, bar = %bar.key(), "Delivered bar");
            stats.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Ok(Err(e))) => {
            warn!(subscriber = name, bar = %bar.key(), error = %e, "Subscriber failed");
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(e)) if e.is_panic() => {
            error!(subscriber = name, bar = %bar.key(), "Subscriber panicked");
            stats.panicked.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(e)) => {
            warn!(subscriber = name, bar = %bar.key(), error = %e, "Subscriber task cancelled");
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        Err(_) => {
            warn!(
                subscriber = name,
                bar = %bar.key(),
                timeout = ?timeout,
                "Subscriber timed out"
            );
            stats.timed_out.fetch_add(1, Ordering::Relaxed);
        }
    }

    stats.pending.fetch_sub(1, Ordering::Relaxed);
}
