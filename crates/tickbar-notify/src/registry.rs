//! Ordered subscriber registration.

use std::sync::Arc;

use thiserror::Error;

use crate::Subscriber;

/// Errors raised while registering subscribers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Subscriber names must not be empty.
    #[error("Subscriber name is empty")]
    EmptyName,

    /// Another subscriber already uses the name.
    #[error("Subscriber already registered: {0}")]
    Duplicate(String),
}

/// Builder for the list of subscribers, kept in registration order.
///
/// Once [`freeze`](Self::freeze)d the list is immutable and can be shared
/// across tasks without locking.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: Vec<Arc<dyn Subscriber>>,
}

impl SubscriberRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or already registered.
    pub fn register(&mut self, subscriber: Arc<dyn Subscriber>) -> Result<(), RegistryError> {
        let name = subscriber.name();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.subscribers.iter().any(|s| s.name() == name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }

        self.subscribers.push(subscriber);
        Ok(())
    }

    /// Names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.subscribers.iter().map(|s| s.name()).collect()
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Turns the registry into its read-only form.
    #[must_use]
    pub fn freeze(self) -> Arc<[Arc<dyn Subscriber>]> {
        self.subscribers.into()
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.names())
            .finish()
    }
}
