//! Subscriber identity and the type-erased computation interface.
//!
//! A subscriber is anything that records dependencies while it evaluates and
//! reacts when one of them notifies: in practice a [`Computation`] of some
//! value type. The graph and the scheduler only ever see subscribers through
//! the [`Subscriber`] trait, keyed by [`ComputationId`].
//!
//! [`Computation`]: super::Computation

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::ObservableId;
use crate::error::Result;

/// Unique identifier for a computation.
///
/// Ids come from a process-wide counter, increase monotonically and are never
/// reused. Their ordering is the firing order used when notification is
/// synchronous and the order the reference scheduler flushes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComputationId(u64);

impl ComputationId {
    /// Generate a new unique computation ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ComputationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ComputationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A computation as seen by observables, owners and the scheduler.
pub trait Subscriber {
    /// The subscriber's unique ID.
    fn id(&self) -> ComputationId;

    /// Whether the subscriber still reacts to notifications.
    fn is_active(&self) -> bool;

    /// Record a read of `observable` during the current evaluation.
    fn record_dependency(&self, observable: ObservableId);

    /// Invalidation entry point, called by `notify()`.
    fn update(&self) -> Result<()>;

    /// Hook the scheduler calls right before [`run`](Subscriber::run).
    fn before(&self) {}

    /// Recompute and fire the callback if the value changed.
    fn run(&self) -> Result<()>;

    /// Stop reacting and drop every subscription.
    fn teardown(&self);
}
