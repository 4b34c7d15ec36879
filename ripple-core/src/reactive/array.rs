//! Observed Sequences
//!
//! Index and length access on a plain `Vec` cannot be intercepted, so
//! structural changes would go unnoticed. [`ObservedVec`] is the sequence
//! wrapper the runtime can see: it exposes the in-place mutating operations
//! explicitly and each one
//!
//! 1. brings the elements it inserts under observation,
//! 2. performs the real mutation,
//! 3. notifies the sequence's observable, whether or not anything changed,
//! 4. returns what the plain operation would have returned.
//!
//! A detached sequence (not yet observed) mutates silently. Observing it
//! later through [`Observe::observe`] attaches an observable.

use std::cell::{OnceCell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::observable::{Observable, ObservableId};
use super::watchable::{Observe, Traversal, Watchable};
use crate::error::Result;

/// A sequence whose structural mutations notify its observable.
pub struct ObservedVec<T> {
    items: RefCell<Vec<T>>,
    dep: OnceCell<Observable>,
}

impl<T> ObservedVec<T> {
    /// Create a sequence that is not observed yet.
    pub fn detached(items: Vec<T>) -> Self {
        Self {
            items: RefCell::new(items),
            dep: OnceCell::new(),
        }
    }

    /// Whether an observable is attached.
    pub fn is_observed(&self) -> bool {
        self.dep.get().is_some()
    }

    /// The id of the observable guarding this sequence, once observed.
    pub fn id(&self) -> Option<ObservableId> {
        self.dep.get().map(Observable::id)
    }

    fn depend(&self) {
        if let Some(dep) = self.dep.get() {
            dep.depend();
        }
    }

    /// Run `op` against the items, then notify if observed.
    fn intercept<R>(&self, method: &'static str, op: impl FnOnce(&mut Vec<T>) -> R) -> Result<R> {
        let result = op(&mut self.items.borrow_mut());
        if let Some(dep) = self.dep.get() {
            trace!(observable = dep.id().raw(), method, "sequence mutated");
            dep.notify()?;
        }
        Ok(result)
    }
}

impl<T: Watchable + Observe> ObservedVec<T> {
    /// Create an observed sequence, observing its elements.
    pub fn new(items: Vec<T>) -> Self {
        let vec = Self::detached(items);
        vec.observe();
        vec
    }

    /// Number of elements. Records a dependency.
    pub fn len(&self) -> usize {
        self.depend();
        self.items.borrow().len()
    }

    /// Whether the sequence is empty. Records a dependency.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone of the element at `index`. Records a dependency.
    pub fn get(&self, index: usize) -> Option<T> {
        self.depend();
        self.items.borrow().get(index).cloned()
    }

    /// Clone of every element. Records a dependency.
    pub fn to_vec(&self) -> Vec<T> {
        self.depend();
        self.items.borrow().clone()
    }

    /// Borrow the elements. Records a dependency.
    ///
    /// `f` must not mutate this sequence.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        self.depend();
        f(&self.items.borrow())
    }

    fn observe_inserted(&self, inserted: &[T]) {
        if self.is_observed() {
            inserted.iter().for_each(Observe::observe);
        }
    }

    /// Append one element. Returns the new length.
    pub fn push(&self, item: T) -> Result<usize> {
        self.observe_inserted(std::slice::from_ref(&item));
        self.intercept("push", |items| {
            items.push(item);
            items.len()
        })
    }

    /// Append several elements. Returns the new length.
    pub fn push_all(&self, new_items: Vec<T>) -> Result<usize> {
        self.observe_inserted(&new_items);
        self.intercept("push", |items| {
            items.extend(new_items);
            items.len()
        })
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Result<Option<T>> {
        self.intercept("pop", Vec::pop)
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Result<Option<T>> {
        self.intercept("shift", |items| {
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        })
    }

    /// Insert elements at the front, keeping their order. Returns the new
    /// length.
    pub fn unshift(&self, new_items: Vec<T>) -> Result<usize> {
        self.observe_inserted(&new_items);
        self.intercept("unshift", |items| {
            items.splice(0..0, new_items);
            items.len()
        })
    }

    /// Remove `delete_count` elements starting at `start` and insert
    /// `new_items` in their place. Returns the removed elements.
    ///
    /// `start` and `delete_count` are clamped to the sequence.
    pub fn splice(&self, start: usize, delete_count: usize, new_items: Vec<T>) -> Result<Vec<T>> {
        self.observe_inserted(&new_items);
        self.intercept("splice", |items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, new_items).collect()
        })
    }

    /// Sort in place with a comparator.
    pub fn sort_by(&self, compare: impl FnMut(&T, &T) -> Ordering) -> Result<()> {
        self.intercept("sort", |items| items.sort_by(compare))
    }

    /// Reverse in place.
    pub fn reverse(&self) -> Result<()> {
        self.intercept("reverse", |items| items.reverse())
    }

    /// Replace the element at `index`, or append when `index` is past the end.
    pub fn set(&self, index: usize, item: T) -> Result<()> {
        let replaced = {
            let items = self.items.borrow();
            usize::from(index < items.len())
        };
        self.splice(index, replaced, vec![item]).map(drop)
    }

    /// Remove and return the element at `index`.
    pub fn remove(&self, index: usize) -> Result<Option<T>> {
        let removed = self.splice(index, 1, Vec::new())?;
        Ok(removed.into_iter().next())
    }
}

impl<T: Watchable + Observe + Ord> ObservedVec<T> {
    /// Sort in place.
    pub fn sort(&self) -> Result<()> {
        self.sort_by(T::cmp)
    }
}

impl<T: Watchable + Observe> Observe for ObservedVec<T> {
    fn observe(&self) {
        if self.dep.get().is_some() {
            return;
        }
        // Attach before recursing so a sequence reachable from its own
        // elements is visited once.
        let _ = self.dep.set(Observable::new());
        self.items.borrow().iter().for_each(Observe::observe);
    }

    /// Depend on this sequence and, recursively, on the observables of its
    /// elements, since element reads cannot be intercepted.
    fn depend_nested(&self) {
        self.depend();
        self.items.borrow().iter().for_each(Observe::depend_nested);
    }
}

impl<T: Watchable + Observe> Watchable for Rc<ObservedVec<T>> {
    fn same_value(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }

    fn is_composite(&self) -> bool {
        true
    }

    fn traverse(&self, seen: &mut Traversal) {
        if !seen.first_visit(Rc::as_ptr(self)) {
            return;
        }
        self.depend();
        for item in self.items.borrow().iter() {
            item.traverse(seen);
        }
    }
}

impl<T: Watchable + Observe> Default for ObservedVec<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservedVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedVec")
            .field("id", &self.id())
            .field("items", &*self.items.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Computation, Mode};
    use crate::value::Value;
    use std::cell::Cell;

    /// An immediate computation reading `len()`, with a run counter.
    fn watch_len<T: Watchable + Observe>(vec: &Rc<ObservedVec<T>>) -> (Computation<usize>, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        let (source, counter) = (Rc::clone(vec), Rc::clone(&runs));
        let computation = Computation::builder(move || {
            counter.set(counter.get() + 1);
            source.len()
        })
        .mode(Mode::render().immediate())
        .build()
        .unwrap();
        (computation, runs)
    }

    #[test]
    fn push_notifies_once_and_returns_length() {
        let vec = Rc::new(ObservedVec::new(vec![1, 2, 3]));
        let (computation, runs) = watch_len(&vec);

        assert_eq!(vec.push(4).unwrap(), 4);
        assert_eq!(runs.get(), 2);
        assert_eq!(computation.value(), Some(4));
        assert_eq!(vec.to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn every_mutator_notifies() {
        let vec = Rc::new(ObservedVec::new(vec![3, 1, 2]));
        let (_computation, runs) = watch_len(&vec);

        vec.sort().unwrap();
        assert_eq!(vec.to_vec(), vec![1, 2, 3]);
        vec.reverse().unwrap();
        assert_eq!(vec.to_vec(), vec![3, 2, 1]);
        assert_eq!(vec.shift().unwrap(), Some(3));
        assert_eq!(vec.unshift(vec![7, 8]).unwrap(), 4);
        assert_eq!(vec.to_vec(), vec![7, 8, 2, 1]);
        assert_eq!(vec.pop().unwrap(), Some(1));

        assert_eq!(runs.get(), 6);
    }

    #[test]
    fn mutating_an_empty_sequence_still_notifies() {
        let vec: Rc<ObservedVec<i32>> = Rc::new(ObservedVec::new(Vec::new()));
        let (_computation, runs) = watch_len(&vec);

        assert_eq!(vec.pop().unwrap(), None);
        assert_eq!(vec.shift().unwrap(), None);
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn splice_returns_removed_and_clamps() {
        let vec = ObservedVec::new(vec![1, 2, 3, 4, 5]);

        assert_eq!(vec.splice(1, 2, vec![9]).unwrap(), vec![2, 3]);
        assert_eq!(vec.to_vec(), vec![1, 9, 4, 5]);

        assert_eq!(vec.splice(3, 100, Vec::new()).unwrap(), vec![5]);
        assert_eq!(vec.splice(100, 1, vec![6]).unwrap(), Vec::<i32>::new());
        assert_eq!(vec.to_vec(), vec![1, 9, 4, 6]);
    }

    #[test]
    fn set_replaces_or_appends() {
        let vec = ObservedVec::new(vec![1, 2]);
        vec.set(0, 10).unwrap();
        vec.set(5, 30).unwrap();
        assert_eq!(vec.to_vec(), vec![10, 2, 30]);
        assert_eq!(vec.remove(1).unwrap(), Some(2));
        assert_eq!(vec.remove(9).unwrap(), None);
    }

    #[test]
    fn detached_sequence_mutates_silently() {
        let vec = ObservedVec::detached(vec![1]);
        assert!(!vec.is_observed());
        assert_eq!(vec.push(2).unwrap(), 2);
        assert_eq!(vec.id(), None);

        vec.observe();
        assert!(vec.is_observed());
        let id = vec.id();
        vec.observe();
        assert_eq!(vec.id(), id);
    }

    #[test]
    fn inserted_composites_are_observed() {
        let vec = ObservedVec::new(Vec::new());
        let nested = Value::Array(Rc::new(ObservedVec::detached(vec![Value::from(1)])));

        vec.push(nested.clone()).unwrap();
        assert!(nested.as_array().is_some_and(|inner| inner.is_observed()));

        let spliced = Value::Array(Rc::new(ObservedVec::detached(Vec::new())));
        vec.splice(0, 0, vec![spliced.clone()]).unwrap();
        assert!(spliced.as_array().is_some_and(|inner| inner.is_observed()));
    }

    #[test]
    fn depend_nested_reaches_inner_sequences() {
        let inner = Rc::new(ObservedVec::new(vec![Value::from(1)]));
        let outer = Rc::new(ObservedVec::new(vec![Value::Array(Rc::clone(&inner))]));

        let source = Rc::clone(&outer);
        let computation = Computation::builder(move || source.depend_nested())
            .build()
            .unwrap();

        assert_eq!(computation.dependency_count(), 2);
        assert!(inner.id().is_some_and(|id| computation.depends_on(id)));
    }
}
