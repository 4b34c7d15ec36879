//! Computed Values
//!
//! A [`Computed`] is a cached derived value built on a pull-only
//! [`Computation`].
//!
//! # How It Works
//!
//! 1. Nothing runs until the first [`get`](Computed::get).
//!
//! 2. When an input changes, the computation is only marked dirty. Reading
//!    it again re-evaluates once; reading a clean value returns the cache.
//!
//! 3. A computed value never notifies anyone itself. When it is read inside
//!    another computation, the reader is subscribed directly to every input
//!    of the computed value, so it is invalidated whenever they change.

use std::fmt;

use super::computation::{Computation, Mode};
use super::owner::Owner;
use super::runtime::Runtime;
use super::watchable::Watchable;
use crate::error::{BoxError, ReactiveError, Result};

/// A lazily evaluated, cached derived value.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Computed, Signal};
///
/// let width = Signal::new(3);
/// let height = Signal::new(4);
///
/// let (w, h) = (width.clone(), height.clone());
/// let area = Computed::new(move || w.get() * h.get());
///
/// assert_eq!(area.get().unwrap(), 12);
/// width.set(5).unwrap();
/// assert!(area.is_dirty());
/// assert_eq!(area.get().unwrap(), 20);
/// ```
pub struct Computed<T> {
    computation: Computation<T>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            computation: self.computation.clone(),
        }
    }
}

impl<T: Watchable> Computed<T> {
    /// Create a computed value from an infallible producer.
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self {
            computation: Computation::builder(producer)
                .mode(Mode::pull_only())
                .build_deferred(),
        }
    }

    /// Create a computed value from a fallible producer. Failures are
    /// returned from [`get`](Computed::get).
    pub fn try_new<F>(producer: F) -> Self
    where
        F: Fn() -> std::result::Result<T, BoxError> + 'static,
    {
        Self {
            computation: Computation::try_builder(producer)
                .mode(Mode::pull_only())
                .build_deferred(),
        }
    }

    /// Create a computed value torn down together with `owner`.
    pub fn with_owner<F>(owner: &Owner, producer: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self {
            computation: Computation::builder(producer)
                .mode(Mode::pull_only())
                .owner(owner)
                .build_deferred(),
        }
    }

    /// Read the value, re-evaluating first if an input changed.
    ///
    /// Inside another computation, that computation becomes dependent on
    /// every input of this one.
    pub fn get(&self) -> Result<T> {
        let value = self.computation.pull()?;
        if Runtime::is_tracking() {
            self.computation.propagate_subscriptions();
        }
        value.ok_or_else(|| ReactiveError::Unavailable {
            expression: self.computation.expression().to_string(),
        })
    }

    /// Whether the next [`get`](Computed::get) re-evaluates.
    pub fn is_dirty(&self) -> bool {
        self.computation.is_dirty()
    }

    /// The underlying pull-only computation.
    pub fn computation(&self) -> &Computation<T> {
        &self.computation
    }

    /// Stop tracking inputs. The last value stays readable.
    pub fn dispose(&self) {
        self.computation.teardown();
    }
}

impl<T> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Computed").field(&self.computation).finish()
    }
}
