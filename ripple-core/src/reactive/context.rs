//! Reactive Context
//!
//! The reactive context tracks which computation is currently recording its
//! dependencies. When an observable is read, the runtime asks the context for
//! the active computation and records the read against it.
//!
//! # Implementation
//!
//! A thread-local stack holds the active computation on top and the
//! previously active ones below it. Entering a context pushes, dropping the
//! returned guard pops, so the stack stays balanced on `?` returns and while
//! unwinding from a panic.
//!
//! An entry may be `None`: that is an untracked region, in which reads are
//! not recorded against anyone even if an outer computation is evaluating.
//!
//! The stack is per thread. Each thread therefore has its own active slot and
//! no locking is involved.

use std::cell::RefCell;

use super::ComputationId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<ComputationId>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
#[must_use = "the context is exited as soon as the guard is dropped"]
pub struct ReactiveContext {
    target: Option<ComputationId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given computation.
    ///
    /// While this context is active, any observable that is read records the
    /// computation as a dependent.
    pub fn enter(subscriber_id: ComputationId) -> Self {
        Self::push(Some(subscriber_id))
    }

    /// Enter a region where reads are not tracked.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(target: Option<ComputationId>) -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(target));
        Self { target }
    }

    /// Check if some computation is currently recording dependencies.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the computation currently recording dependencies, if any.
    pub fn current_subscriber() -> Option<ComputationId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().copied().flatten())
    }

    /// Number of nested contexts on this thread.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // The stack may already be gone if this runs during thread teardown.
        let _ = CONTEXT_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(
                popped,
                Some(self.target),
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.target,
                popped
            );
        });
    }
}

/// Run `f` without recording any of its reads.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}
