//! Per-symbol tick-to-OHLCV folding.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tickbar_types::{Bar, Interval, Tick};

/// Result of offering a tick to a [`BarAccumulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Apply {
    /// No bar was open; the tick opened one.
    Opened,
    /// The tick was folded into the open bar.
    Updated,
    /// The tick belongs to a later interval. Nothing was changed; the caller
    /// must finalize the open bar before starting the next one.
    NewInterval,
    /// The tick belongs to an interval before the open one. Nothing was changed.
    Late,
}

/// Holds the in-progress bar of a single symbol.
#[derive(Debug)]
pub struct BarAccumulator {
    symbol: String,
    interval: Interval,
    source: Arc<str>,
    current: Option<PartialBar>,
}

impl BarAccumulator {
    /// Creates an empty accumulator for `symbol`.
    #[must_use]
    pub fn new(symbol: impl Into<String>, interval: Interval, source: Arc<str>) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
            source,
            current: None,
        }
    }

    /// Returns the symbol this accumulator owns.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Returns the interval being aggregated to.
    #[must_use]
    pub const fn interval(&self) -> Interval {
        self.interval
    }

    /// Returns the start of the open bar, if any.
    #[must_use]
    pub fn open_interval(&self) -> Option<DateTime<Utc>> {
        self.current.as_ref().map(|bar| bar.interval_start)
    }

    /// Returns true if a bar is currently open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Folds a tick into the open bar, or opens the first one.
    ///
    /// Ticks for any other interval are left untouched and reported through
    /// [`Apply::NewInterval`] or [`Apply::Late`].
    pub fn apply(&mut self, tick: &Tick) -> Apply {
        debug_assert_eq!(tick.symbol, self.symbol);
        let bar_start = self.interval.floor(tick.timestamp);

        match self.current.as_mut() {
            None => {
                self.current = Some(PartialBar::new(bar_start, tick));
                Apply::Opened
            }
            Some(bar) if bar.interval_start == bar_start => {
                bar.update(tick);
                Apply::Updated
            }
            Some(bar) if bar_start > bar.interval_start => Apply::NewInterval,
            Some(_) => Apply::Late,
        }
    }

    /// Finalizes the open bar and starts a new one from `tick`.
    ///
    /// Returns the finalized bar, or `None` if nothing was open.
    pub fn roll(&mut self, tick: &Tick) -> Option<Bar> {
        let completed = self.finish();
        let bar_start = self.interval.floor(tick.timestamp);
        self.current = Some(PartialBar::new(bar_start, tick));
        completed
    }

    /// Finalizes and clears the open bar.
    pub fn finish(&mut self) -> Option<Bar> {
        self.current
            .take()
            .map(|bar| bar.finish(&self.symbol, &self.source))
    }
}

/// Mutable aggregation state of the open bar.
#[derive(Debug)]
struct PartialBar {
    interval_start: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: u64,
    tick_count: u32,
}

impl PartialBar {
    /// Creates a new partial bar from the first tick.
    const fn new(interval_start: DateTime<Utc>, tick: &Tick) -> Self {
        Self {
            interval_start,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume: tick.volume,
            tick_count: 1,
        }
    }

    /// Updates the partial bar with a tick from the same interval.
    fn update(&mut self, tick: &Tick) {
        self.high = self.high.max(tick.price);
        self.low = self.low.min(tick.price);
        self.close = tick.price;
        self.volume = self.volume.saturating_add(tick.volume);
        self.tick_count = self.tick_count.saturating_add(1);
    }

    /// Snapshots the partial bar into an immutable bar.
    fn finish(self, symbol: &str, source: &str) -> Bar {
        Bar::new(
            symbol,
            self.interval_start,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
            self.tick_count,
            source,
        )
    }
}
