//! Streaming tick-to-OHLCV aggregation for tickbar.
//!
//! This crate provides per-symbol bar folding and sharded routing:
//!
//! - [`BarAccumulator`] - Folds one symbol's ticks into its open bar
//! - [`OpenBars`] - Single-owner map of open bars keyed by symbol
//! - [`IntervalAggregator`] - Shards symbols across tokio tasks and emits
//!   finalized bars to a [`BarSink`]
//! - [`AggregatorStats`] - Ingest and finalization counters

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tickbar/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod accumulator;
mod aggregator;
mod stats;

pub use accumulator::{Apply, BarAccumulator};
pub use aggregator::{
    AggregateError, AggregatorConfig, BarSink, IngestOutcome, IntervalAggregator, OpenBars,
};
pub use stats::{AggregatorSnapshot, AggregatorStats};
