//! Idempotent bar persistence for the tickbar aggregation engine.
//!
//! This crate provides the storage side of bar commits:
//!
//! - [`BarStore`] - Async upsert contract keyed by `(symbol, interval_start)`
//! - [`merge`] - Conflict policy applied on duplicate keys
//! - [`MemoryBarStore`] - In-process store
//! - [`FileBarStore`] - JSON files, one per symbol per UTC day
//! - [`StoreRetrier`] - Background re-attempts of failed writes with backoff

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tickbar/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod file;
mod memory;
mod retry;
mod store;

pub use error::{Result, StoreError};
pub use file::FileBarStore;
pub use memory::MemoryBarStore;
pub use retry::{RetryPolicy, RetrySnapshot, RetryStats, StoreRetrier};
pub use store::{BarStore, Upsert, merge, resolve};
