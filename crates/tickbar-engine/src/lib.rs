//! Tick-to-bar aggregation engine.
//!
//! This crate wires aggregation, storage and notification together:
//!
//! - [`Engine`] - Ingests ticks and commits finalized bars
//! - [`EngineConfig`] - Settings, loadable from TOML
//! - [`BarCommitter`] - Upserts a bar, then notifies subscribers
//! - [`MetricsSnapshot`] - Every engine counter in one value
//! - [`tick_stream`] / [`drive`] - NDJSON feed ingestion
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tickbar_engine::{Engine, EngineConfig, drive, tick_stream};
//! use tickbar_store::MemoryBarStore;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::builder(EngineConfig::default())
//!     .store(Arc::new(MemoryBarStore::new()))
//!     .build()?;
//!
//! let input = tokio::io::BufReader::new(tokio::io::stdin());
//! drive(&engine, tick_stream(input), &CancellationToken::new()).await;
//! let report = engine.shutdown().await;
//! println!("flushed {} bars", report.bars_flushed);
//! # Ok(())
//! # }
//! ```

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tickbar/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod commit;
mod config;
mod engine;
mod feed;
mod metrics;

pub use commit::{BarCommitter, CommitReport, CommitSnapshot, StoreOutcome};
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineBuilder, EngineError, ShutdownReport};
pub use feed::{FeedReport, drive, tick_stream};
pub use metrics::MetricsSnapshot;
