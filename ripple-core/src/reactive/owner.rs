//! Owners group computations for bulk teardown.
//!
//! An [`Owner`] keeps every computation created for it alive until the
//! computation is torn down or the owner is destroyed. Its name is passed to
//! the error handler as context.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::subscriber::{ComputationId, Subscriber};

struct OwnerInner {
    name: String,
    computations: RefCell<Vec<Rc<dyn Subscriber>>>,
    being_destroyed: Cell<bool>,
}

/// The logical owner of a set of computations.
///
/// Cloning an `Owner` creates a new handle to the same owner.
#[derive(Clone)]
pub struct Owner {
    inner: Rc<OwnerInner>,
}

impl Owner {
    /// Create an owner with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(OwnerInner {
                name: name.into(),
                computations: RefCell::new(Vec::new()),
                being_destroyed: Cell::new(false),
            }),
        }
    }

    /// The owner's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of computations currently owned.
    pub fn computation_count(&self) -> usize {
        self.inner.computations.borrow().len()
    }

    /// Whether [`destroy`](Owner::destroy) has been called.
    pub fn is_being_destroyed(&self) -> bool {
        self.inner.being_destroyed.get()
    }

    /// Tear down every owned computation. Idempotent.
    pub fn destroy(&self) {
        if self.inner.being_destroyed.replace(true) {
            return;
        }
        let computations = std::mem::take(&mut *self.inner.computations.borrow_mut());
        debug!(owner = %self.inner.name, count = computations.len(), "destroying owner");
        for computation in &computations {
            computation.teardown();
        }
    }

    pub(crate) fn adopt(&self, computation: Rc<dyn Subscriber>) {
        self.inner.computations.borrow_mut().push(computation);
    }

    pub(crate) fn downgrade(&self) -> WeakOwner {
        WeakOwner(Rc::downgrade(&self.inner))
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("name", &self.inner.name)
            .field("computation_count", &self.computation_count())
            .field("being_destroyed", &self.is_being_destroyed())
            .finish()
    }
}

/// Back-reference from a computation to its owner.
#[derive(Clone)]
pub(crate) struct WeakOwner(Weak<OwnerInner>);

impl WeakOwner {
    pub(crate) fn name(&self) -> Option<String> {
        self.0.upgrade().map(|inner| inner.name.clone())
    }

    /// Remove a computation from the owner's list.
    ///
    /// Skipped while the owner is being destroyed: the whole list is about to
    /// be discarded anyway.
    pub(crate) fn forget(&self, id: ComputationId) {
        let Some(inner) = self.0.upgrade() else {
            return;
        };
        if inner.being_destroyed.get() {
            return;
        }
        // Take the entry out before it is dropped so no borrow is held then.
        let removed = {
            let mut computations = inner.computations.borrow_mut();
            computations
                .iter()
                .position(|c| c.id() == id)
                .map(|pos| computations.remove(pos))
        };
        drop(removed);
    }
}
