//! Core types for the tickbar tick-to-bar aggregation engine.
//!
//! This crate provides the fundamental data structures used throughout tickbar:
//!
//! - [`Tick`] - A validated trade tick with symbol, price, volume and timestamp
//! - [`TickMessage`] - Raw tick message as delivered by an ingestion feed
//! - [`Interval`] - Bar aggregation interval
//! - [`Bar`] - Immutable finalized OHLCV bar
//! - [`BarKey`] - Storage identity of a bar, `(symbol, interval_start)`

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tickbar/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod bar;
mod error;
mod interval;
mod tick;

pub use bar::{Bar, BarKey, DEFAULT_SOURCE};
pub use error::{IntervalError, TickError};
pub use interval::Interval;
pub use tick::{Tick, TickMessage, TickTimestamp};
