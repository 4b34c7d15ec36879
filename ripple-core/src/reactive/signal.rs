//! Signal Implementation
//!
//! A Signal is a reactive slot: one value guarded by one observable.
//!
//! # How Signals Work
//!
//! 1. Reading a signal inside a computation records its observable as a
//!    dependency. If the value is a container that carries observables of
//!    its own (an [`ArrayRef`](crate::value::ArrayRef) or
//!    [`ObjectRef`](crate::value::ObjectRef)), those are recorded too, so
//!    in-place mutations of the container reach the reader.
//!
//! 2. Writing a different value brings it under observation and notifies
//!    every subscriber. Writing the same value does nothing.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::observable::{Observable, ObservableId};
use super::watchable::{Observe, Watchable};
use crate::error::Result;

struct SignalInner<T> {
    value: RefCell<T>,
    dep: Observable,
}

/// A reactive value.
///
/// Cloning a `Signal` creates a new handle to the same slot.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// assert_eq!(count.get(), 0);
///
/// count.set(5).unwrap();
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Watchable + Observe> Signal<T> {
    /// Create a signal holding `value`, bringing it under observation.
    pub fn new(value: T) -> Self {
        value.observe();
        Self {
            inner: Rc::new(SignalInner {
                value: RefCell::new(value),
                dep: Observable::new(),
            }),
        }
    }

    /// The id of the observable guarding this slot.
    pub fn id(&self) -> ObservableId {
        self.inner.dep.id()
    }

    /// Read the value, recording the dependency.
    pub fn get(&self) -> T {
        self.track();
        self.inner.value.borrow().clone()
    }

    /// Read the value by reference, recording the dependency.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.borrow())
    }

    /// Read the value without recording anything.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Write a new value. Notifies subscribers unless it is the same value.
    pub fn set(&self, value: T) -> Result<()> {
        if self.inner.value.borrow().same_value(&value) {
            return Ok(());
        }
        value.observe();
        let previous = self.inner.value.replace(value);
        drop(previous);
        self.inner.dep.notify()
    }

    /// Write a value derived from the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        let next = f(&self.inner.value.borrow());
        self.set(next)
    }

    /// Number of computations subscribed to this slot.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.subscriber_count()
    }

    fn track(&self) {
        self.inner.dep.depend();
        // Borrow released before depend_nested calls back into the runtime.
        let value = self.inner.value.borrow().clone();
        value.depend_nested();
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.dep.id())
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Computation, Mode};
    use crate::value::Value;
    use std::cell::Cell;

    #[test]
    fn signal_basic_operations() {
        let signal = Signal::new(42);
        assert_eq!(signal.get(), 42);

        signal.set(100).unwrap();
        assert_eq!(signal.get(), 100);

        signal.update(|v| v + 1).unwrap();
        assert_eq!(signal.get_untracked(), 101);
    }

    #[test]
    fn clones_share_the_slot() {
        let a = Signal::new(String::from("x"));
        let b = a.clone();
        b.set("y".to_string()).unwrap();
        assert_eq!(a.get(), "y");
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn same_value_does_not_notify() {
        let signal = Signal::new(1);
        let runs = Rc::new(Cell::new(0));

        let (source, counter) = (signal.clone(), runs.clone());
        let _computation = Computation::builder(move || {
            counter.set(counter.get() + 1);
            source.get()
        })
        .mode(Mode::render().immediate())
        .build()
        .unwrap();

        signal.set(1).unwrap();
        assert_eq!(runs.get(), 1);
        signal.set(2).unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn untracked_read_does_not_subscribe() {
        let signal = Signal::new(1);
        let source = signal.clone();
        let computation = Computation::builder(move || source.get_untracked())
            .build()
            .unwrap();

        assert_eq!(computation.dependency_count(), 0);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn reading_a_container_depends_on_its_observable() {
        let list = Value::array(vec![Value::from(1)]);
        let signal = Signal::new(list.clone());
        let runs = Rc::new(Cell::new(0));

        let (source, counter) = (signal.clone(), runs.clone());
        let computation = Computation::builder(move || {
            counter.set(counter.get() + 1);
            source.get().as_array().map_or(0, |items| items.len())
        })
        .mode(Mode::render().immediate())
        .build()
        .unwrap();

        // Slot plus the array's own observable
        assert_eq!(computation.dependency_count(), 2);

        list.as_array().unwrap().push(Value::from(2)).unwrap();
        assert_eq!(runs.get(), 2);
        assert_eq!(computation.value(), Some(2));
    }
}
