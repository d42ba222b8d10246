//! Subscriber contract.

use std::sync::Arc;

use async_trait::async_trait;
use tickbar_types::Bar;

/// Error returned by a subscriber.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// Result of delivering one bar to one subscriber.
pub type SubscriberResult = Result<(), SubscriberError>;

/// Consumer of finalized bars.
///
/// A subscriber sees each bar at most once per commit. Errors and panics are
/// contained by the [`Notifier`](crate::Notifier) and never retried, so
/// subscribers that need stronger delivery should track progress themselves.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    /// Unique name used in logs and for registration.
    fn name(&self) -> &str;

    /// Handles one finalized bar.
    async fn on_bar(&self, bar: Arc<Bar>) -> SubscriberResult;
}

/// Subscriber backed by a synchronous closure.
pub struct FnSubscriber<F> {
    name: String,
    f: F,
}

impl<F> FnSubscriber<F>
where
    F: Fn(&Bar) -> SubscriberResult + Send + Sync + 'static,
{
    /// Wraps `f` under the given name.
    #[must_use]
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> std::fmt::Debug for FnSubscriber<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSubscriber")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> Subscriber for FnSubscriber<F>
where
    F: Fn(&Bar) -> SubscriberResult + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_bar(&self, bar: Arc<Bar>) -> SubscriberResult {
        (self.f)(&bar)
    }
}
