//! Observables
//!
//! An [`Observable`] is the publish point guarding one value or container.
//! It does not hold the value itself: whatever instruments the value calls
//! [`depend`](Observable::depend) on every read and
//! [`notify`](Observable::notify) on every observable change.
//!
//! The observable side of each subscription lives in the thread's runtime,
//! keyed by [`ObservableId`]. Dropping the `Observable` handle drops that
//! list, so an observable lives exactly as long as the value owning it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::runtime::Runtime;
use super::ComputationId;
use crate::error::Result;

/// Unique identifier for an observable. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObservableId(u64);

impl ObservableId {
    /// Generate a new unique observable ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ObservableId {
    fn default() -> Self {
        Self::new()
    }
}

/// A publish point that computations subscribe to by reading it.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Computation, Mode, Observable};
///
/// let observable = Observable::new();
/// let reader = Computation::builder({
///     let id = observable.id();
///     move || Observable::depend_on(id)
/// })
/// .mode(Mode::render())
/// .build()
/// .unwrap();
///
/// assert!(reader.depends_on(observable.id()));
/// assert_eq!(observable.subscriber_count(), 1);
/// ```
pub struct Observable {
    id: ObservableId,
}

impl Observable {
    /// Create an observable with no subscribers.
    pub fn new() -> Self {
        let id = ObservableId::new();
        Runtime::allocate(id);
        Self { id }
    }

    /// Get the observable's unique ID.
    pub fn id(&self) -> ObservableId {
        self.id
    }

    /// Append a subscriber. Duplicates are the caller's concern.
    pub fn subscribe(&self, subscriber: ComputationId) {
        Runtime::subscribe(self.id, subscriber);
    }

    /// Remove the first matching subscriber; no-op if absent.
    pub fn unsubscribe(&self, subscriber: ComputationId) {
        Runtime::unsubscribe(self.id, subscriber);
    }

    /// Record this observable as a dependency of the active computation.
    ///
    /// Does nothing when no computation is recording.
    pub fn depend(&self) {
        Runtime::depend(self.id);
    }

    /// [`depend`](Observable::depend) by id, for callers that only kept the id.
    pub fn depend_on(id: ObservableId) {
        Runtime::depend(id);
    }

    /// Fire `update()` on every current subscriber.
    ///
    /// Every subscriber is updated. If internal computations that recompute
    /// synchronously fail, the first failure is returned afterwards.
    pub fn notify(&self) -> Result<()> {
        Runtime::notify(self.id)
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.id)
    }

    /// Current subscribers, in subscription order.
    pub fn subscribers(&self) -> Vec<ComputationId> {
        Runtime::subscribers(self.id)
    }
}

impl Default for Observable {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Observable {
    fn drop(&mut self) {
        Runtime::release(self.id);
    }
}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.id.0)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observable_ids_are_unique() {
        let o1 = Observable::new();
        let o2 = Observable::new();
        let o3 = Observable::new();

        assert_ne!(o1.id(), o2.id());
        assert_ne!(o2.id(), o3.id());
        assert!(o1.id() < o3.id());
    }

    #[test]
    fn notify_without_subscribers_is_a_no_op() {
        let observable = Observable::new();
        assert!(observable.notify().is_ok());
        assert_eq!(observable.subscriber_count(), 0);
    }

    #[test]
    fn subscribe_and_unsubscribe() {
        let observable = Observable::new();
        let id = ComputationId::new();

        observable.subscribe(id);
        assert_eq!(observable.subscribers(), vec![id]);

        observable.unsubscribe(id);
        assert_eq!(observable.subscriber_count(), 0);

        // Absent subscriber
        observable.unsubscribe(id);
        assert_eq!(observable.subscriber_count(), 0);
    }

    #[test]
    fn dropping_releases_subscriber_list() {
        let observable = Observable::new();
        let id = observable.id();
        observable.subscribe(ComputationId::new());
        assert_eq!(Runtime::subscriber_count(id), 1);

        drop(observable);
        assert_eq!(Runtime::subscriber_count(id), 0);
    }
}
