//! Engine-wide counters.

use serde::Serialize;
use tickbar_aggregate::AggregatorSnapshot;
use tickbar_notify::NotifySnapshot;
use tickbar_store::RetrySnapshot;

use crate::CommitSnapshot;

/// Point-in-time view of every engine counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Tick ingestion and bar finalization.
    pub aggregator: AggregatorSnapshot,
    /// Store writes made while committing.
    pub store: CommitSnapshot,
    /// Background write retries.
    pub retry: RetrySnapshot,
    /// Subscriber deliveries.
    pub notify: NotifySnapshot,
}

impl MetricsSnapshot {
    /// Returns true if no write or delivery has failed so far.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.store.store_failures == 0
            && self.store.store_timeouts == 0
            && self.retry.abandoned == 0
            && self.notify.failed == 0
            && self.notify.timed_out == 0
            && self.notify.panicked == 0
            && self.notify.dropped == 0
    }
}
