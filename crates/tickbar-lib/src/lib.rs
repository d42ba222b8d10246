//! Streaming tick-to-OHLCV bar aggregation.
//!
//! This is a facade crate that re-exports functionality from the tickbar
//! workspace crates for convenient access.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tickbar_lib::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::builder(EngineConfig::default())
//!         .store(Arc::new(MemoryBarStore::new()))
//!         .subscriber(Arc::new(FnSubscriber::new("print", |bar: &Bar| {
//!             println!("{bar}");
//!             Ok(())
//!         })))
//!         .build()?;
//!
//!     engine.ingest(Tick::from_json(
//!         r#"{"symbol":"AAPL","price":"150.00","volume":100,"timestamp":"2024-01-15T14:32:05Z"}"#,
//!     )?).await?;
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tickbar/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use tickbar_types::*;

// Re-export aggregation
#[cfg(feature = "aggregate")]
pub use tickbar_aggregate::{
    AggregateError, AggregatorConfig, AggregatorSnapshot, AggregatorStats, Apply, BarAccumulator,
    BarSink, IngestOutcome, IntervalAggregator, OpenBars,
};

// Re-export storage
#[cfg(feature = "store")]
pub use tickbar_store::{
    BarStore, FileBarStore, MemoryBarStore, RetryPolicy, RetrySnapshot, StoreError, StoreRetrier,
    Upsert, merge,
};

// Re-export notification
#[cfg(feature = "notify")]
pub use tickbar_notify::{
    FnSubscriber, Notifier, NotifyReport, NotifySnapshot, RegistryError, Subscriber,
    SubscriberError, SubscriberRegistry, SubscriberResult,
};

// Re-export the engine
#[cfg(feature = "engine")]
pub use tickbar_engine::{
    BarCommitter, CommitReport, CommitSnapshot, ConfigError, Engine, EngineBuilder, EngineConfig,
    EngineError, FeedReport, MetricsSnapshot, ShutdownReport, StoreOutcome, drive, tick_stream,
};

/// Prelude module for convenient imports.
///
/// ```
/// use tickbar_lib::prelude::*;
/// ```
pub mod prelude {
    pub use tickbar_types::{Bar, BarKey, Interval, Tick, TickError, TickMessage};

    #[cfg(feature = "aggregate")]
    pub use tickbar_aggregate::{BarSink, IntervalAggregator, OpenBars};

    #[cfg(feature = "store")]
    pub use tickbar_store::{BarStore, FileBarStore, MemoryBarStore, Upsert};

    #[cfg(feature = "notify")]
    pub use tickbar_notify::{FnSubscriber, Subscriber, SubscriberResult};

    #[cfg(feature = "engine")]
    pub use tickbar_engine::{Engine, EngineConfig, MetricsSnapshot, drive, tick_stream};
}
