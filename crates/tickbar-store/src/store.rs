//! The storage contract and its conflict policy.

use async_trait::async_trait;
use tickbar_types::{Bar, BarKey};

use crate::Result;

/// Outcome of a [`BarStore::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// No row existed for the key.
    Inserted,
    /// A row existed and was changed by the merge.
    Merged,
    /// A row existed and the merge left it as it was.
    Unchanged,
}

impl Upsert {
    /// Returns true if the stored row changed.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Durable bar storage keyed by `(symbol, interval_start)`.
///
/// Implementations must make `upsert` idempotent: writing the same bar any
/// number of times leaves exactly one row, equal to that bar.
#[async_trait]
pub trait BarStore: Send + Sync + std::fmt::Debug + 'static {
    /// Inserts the bar, or merges it into the existing row with [`merge`].
    async fn upsert(&self, bar: &Bar) -> Result<Upsert>;

    /// Fetches the row stored under `key`.
    async fn get(&self, key: &BarKey) -> Result<Option<Bar>>;

    /// Returns every stored bar for `symbol`, in interval order.
    async fn bars(&self, symbol: &str) -> Result<Vec<Bar>>;
}

/// Merges an incoming bar into the stored row with the same key.
///
/// The stored open is kept and the extremes widen; close, volume, tick
/// count and source come from the incoming bar.
#[must_use]
pub fn merge(existing: &Bar, incoming: &Bar) -> Bar {
    debug_assert_eq!(existing.key(), incoming.key());
    Bar::new(
        existing.symbol(),
        existing.interval_start(),
        existing.open(),
        existing.high().max(incoming.high()),
        existing.low().min(incoming.low()),
        incoming.close(),
        incoming.volume(),
        incoming.tick_count(),
        incoming.source(),
    )
}

/// Computes the row to store for `incoming` given what is already stored.
#[must_use]
pub fn resolve(existing: Option<&Bar>, incoming: &Bar) -> (Bar, Upsert) {
    match existing {
        None => (incoming.clone(), Upsert::Inserted),
        Some(existing) => {
            let merged = merge(existing, incoming);
            let outcome = if merged == *existing {
                Upsert::Unchanged
            } else {
                Upsert::Merged
            };
            (merged, outcome)
        }
    }
}
