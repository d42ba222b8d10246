//! Benchmark utilities for tickbar.

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use tickbar_lib::Tick;

/// Shape of a synthetic tick feed.
#[derive(Debug, Clone, Copy)]
pub struct FeedShape {
    /// Number of distinct symbols, interleaved round-robin.
    pub symbols: usize,
    /// Total ticks to generate.
    pub ticks: usize,
    /// Milliseconds between consecutive ticks.
    pub step_ms: i64,
}

impl FeedShape {
    /// Creates a feed shape.
    #[must_use]
    pub const fn new(symbols: usize, ticks: usize, step_ms: i64) -> Self {
        Self {
            symbols,
            ticks,
            step_ms,
        }
    }
}

/// Symbol name used for the `index`th synthetic instrument.
#[must_use]
pub fn symbol_name(index: usize) -> String {
    format!("SYM{index:03}")
}

/// Generates an in-order tick feed starting at `start`.
///
/// Prices walk in a small deterministic zig-zag so highs and lows move.
#[must_use]
pub fn synthetic_ticks(shape: FeedShape, start: DateTime<Utc>) -> Vec<Tick> {
    let symbols: Vec<String> = (0..shape.symbols.max(1)).map(symbol_name).collect();
    let base = Decimal::new(10_000, 2);

    (0..shape.ticks)
        .map(|i| {
            let symbol = &symbols[i % symbols.len()];
            let offset = i64::try_from(i % 17).unwrap_or_default() - 8;
            let price = base + Decimal::new(offset, 2);
            let step = i64::try_from(i).unwrap_or(i64::MAX);
            let timestamp = start + TimeDelta::milliseconds(step.saturating_mul(shape.step_ms));
            Tick::new(symbol.clone(), price, 100, timestamp)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_ticks_are_valid_and_ordered() {
        let start = DateTime::from_timestamp(1_705_329_120, 0).unwrap();
        let ticks = synthetic_ticks(FeedShape::new(4, 100, 250), start);

        assert_eq!(ticks.len(), 100);
        assert!(ticks.iter().all(|t| t.validate().is_ok()));
        assert!(ticks.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(ticks[5].symbol, "SYM001");
    }
}
