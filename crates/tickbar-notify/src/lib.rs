//! Ordered, fault-isolated bar fan-out for tickbar.
//!
//! - [`Subscriber`] - Consumer contract for finalized bars
//! - [`FnSubscriber`] - Adapts a closure into a subscriber
//! - [`SubscriberRegistry`] - Ordered set of uniquely named subscribers
//! - [`Notifier`] - Per-subscriber delivery lanes for each bar

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tickbar/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod notifier;
mod registry;
mod subscriber;

pub use notifier::{NotifyReport, NotifySnapshot, NotifyStats, Notifier};
pub use registry::{RegistryError, SubscriberRegistry};
pub use subscriber::{FnSubscriber, Subscriber, SubscriberError, SubscriberResult};
