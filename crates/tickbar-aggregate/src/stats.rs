//! Aggregation counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by the aggregator shards.
#[derive(Debug, Default)]
pub struct AggregatorStats {
    ticks_ingested: AtomicU64,
    ticks_rejected: AtomicU64,
    late_ticks: AtomicU64,
    bars_finalized: AtomicU64,
    open_bars: AtomicU64,
}

impl AggregatorStats {
    pub(crate) fn record_ingested(&self) {
        self.ticks_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.ticks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_late(&self) {
        self.late_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_opened(&self) {
        self.open_bars.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_finalized(&self, closed: u64) {
        self.bars_finalized.fetch_add(closed, Ordering::Relaxed);
    }

    pub(crate) fn record_closed(&self, closed: u64) {
        self.open_bars.fetch_sub(closed, Ordering::Relaxed);
    }

    /// Number of bars currently open across all shards.
    #[must_use]
    pub fn open_bars(&self) -> u64 {
        self.open_bars.load(Ordering::Relaxed)
    }

    /// Takes a point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> AggregatorSnapshot {
        AggregatorSnapshot {
            ticks_ingested: self.ticks_ingested.load(Ordering::Relaxed),
            ticks_rejected: self.ticks_rejected.load(Ordering::Relaxed),
            late_ticks: self.late_ticks.load(Ordering::Relaxed),
            bars_finalized: self.bars_finalized.load(Ordering::Relaxed),
            open_bars: self.open_bars.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`AggregatorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregatorSnapshot {
    /// Valid ticks accepted for aggregation.
    pub ticks_ingested: u64,
    /// Malformed ticks rejected at ingest.
    pub ticks_rejected: u64,
    /// Ticks dropped because their interval was already closed.
    pub late_ticks: u64,
    /// Bars finalized by boundary crossings or flushes.
    pub bars_finalized: u64,
    /// Bars currently open.
    pub open_bars: u64,
}
