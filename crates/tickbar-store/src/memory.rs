//! In-process bar store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tickbar_types::{Bar, BarKey};
use tokio::sync::RwLock;

use crate::{BarStore, Result, Upsert, resolve};

/// Bar store backed by an ordered in-memory map.
///
/// Useful for tests and for runs that only need the subscriber output.
#[derive(Debug, Default)]
pub struct MemoryBarStore {
    rows: RwLock<BTreeMap<BarKey, Bar>>,
    writes: AtomicU64,
}

impl MemoryBarStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of upserts that changed a row.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Returns every stored bar ordered by symbol, then interval.
    pub async fn all(&self) -> Vec<Bar> {
        self.rows.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl BarStore for MemoryBarStore {
    async fn upsert(&self, bar: &Bar) -> Result<Upsert> {
        let key = bar.key();
        let mut rows = self.rows.write().await;
        let (row, outcome) = resolve(rows.get(&key), bar);
        if outcome.is_write() {
            rows.insert(key, row);
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(outcome)
    }

    async fn get(&self, key: &BarKey) -> Result<Option<Bar>> {
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn bars(&self, symbol: &str) -> Result<Vec<Bar>> {
        let from = BarKey::new(symbol, DateTime::<Utc>::MIN_UTC);
        let rows = self.rows.read().await;
        Ok(rows
            .range(from..)
            .take_while(|(key, _)| key.symbol == symbol)
            .map(|(_, bar)| bar.clone())
            .collect())
    }
}
