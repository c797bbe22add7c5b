//! Publish/subscribe events raised on a single host

use serde::{Deserialize, Serialize};

use super::entity::EntityId;
use super::math::Vec3;

/// Handle returned by [`EventDelegate::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

type Callback<T> = Box<dyn FnMut(&T) + Send>;

/// Typed multicast event. Subscribers run synchronously, in subscription
/// order, on the host that publishes.
pub struct EventDelegate<T> {
    next_handle: u64,
    subscribers: Vec<(SubscriptionHandle, Callback<T>)>,
}

impl<T> EventDelegate<T> {
    pub fn new() -> Self {
        Self {
            next_handle: 0,
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionHandle
    where
        F: FnMut(&T) + Send + 'static,
    {
        let handle = SubscriptionHandle(self.next_handle);
        self.next_handle += 1;
        self.subscribers.push((handle, Box::new(callback)));
        handle
    }

    /// Returns false if the handle was not subscribed
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(h, _)| *h != handle);
        self.subscribers.len() != before
    }

    pub fn broadcast(&mut self, event: &T) {
        for (_, callback) in self.subscribers.iter_mut() {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl<T> Default for EventDelegate<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Raised on every host when the authority launches a projectile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiredEvent {
    pub character: EntityId,
    pub weapon: EntityId,
    pub projectile: EntityId,
    pub direction: Vec3,
}
