//! Finalized OHLCV bar.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Source tag stamped on bars produced by this engine.
pub const DEFAULT_SOURCE: &str = "tickbar";

/// Storage identity of a bar.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BarKey {
    /// Instrument symbol.
    pub symbol: String,
    /// Interval-aligned bar start.
    pub interval_start: DateTime<Utc>,
}

impl BarKey {
    /// Creates a new bar key.
    #[must_use]
    pub fn new(symbol: impl Into<String>, interval_start: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            interval_start,
        }
    }
}

impl std::fmt::Display for BarKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.interval_start.to_rfc3339())
    }
}

/// Immutable OHLCV bar for one symbol over one interval.
///
/// Fields are read-only once the bar is built; subscribers typically receive
/// it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    symbol: String,
    interval_start: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: u64,
    tick_count: u32,
    source: String,
}

impl Bar {
    /// Creates a new bar.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        interval_start: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: u64,
        tick_count: u32,
        source: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            interval_start,
            open,
            high,
            low,
            close,
            volume,
            tick_count,
            source: source.into(),
        }
    }

    /// Returns the instrument symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Returns the interval-aligned bar start.
    #[must_use]
    pub const fn interval_start(&self) -> DateTime<Utc> {
        self.interval_start
    }

    /// Opening price (first tick of the interval).
    #[must_use]
    pub const fn open(&self) -> Decimal {
        self.open
    }

    /// Highest price during the interval.
    #[must_use]
    pub const fn high(&self) -> Decimal {
        self.high
    }

    /// Lowest price during the interval.
    #[must_use]
    pub const fn low(&self) -> Decimal {
        self.low
    }

    /// Closing price (last tick of the interval).
    #[must_use]
    pub const fn close(&self) -> Decimal {
        self.close
    }

    /// Total traded volume.
    #[must_use]
    pub const fn volume(&self) -> u64 {
        self.volume
    }

    /// Number of ticks folded into the bar.
    #[must_use]
    pub const fn tick_count(&self) -> u32 {
        self.tick_count
    }

    /// Tag identifying the producer of the bar.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the storage key `(symbol, interval_start)`.
    #[must_use]
    pub fn key(&self) -> BarKey {
        BarKey::new(self.symbol.clone(), self.interval_start)
    }

    /// Returns the price range (high - low).
    #[must_use]
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// Returns true if this is a bullish (green) bar.
    #[must_use]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Returns true if the OHLC invariants hold.
    ///
    /// `high` bounds open and close from above, `low` from below, and at
    /// least one tick contributed.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.tick_count >= 1
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
    }
}

impl std::fmt::Display for Bar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} O={} H={} L={} C={} V={} n={}",
            self.symbol,
            self.interval_start.to_rfc3339(),
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
            self.tick_count
        )
    }
}
