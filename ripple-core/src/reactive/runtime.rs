//! Reactive Runtime
//!
//! The runtime is the arena that connects observables and computations. It
//! owns the observable side of the subscription graph, the registry used to
//! turn a [`ComputationId`] back into a live computation, the configuration,
//! the scheduler batched computations are handed to, and the error handler
//! user-facing failures are reported through.
//!
//! # How It Works
//!
//! 1. Creating an [`Observable`](super::Observable) allocates an empty
//!    subscriber list keyed by its id. Dropping it removes the list.
//!
//! 2. Creating a computation registers a weak reference to it.
//!
//! 3. When an observable is read, [`Runtime::depend`] finds the active
//!    computation through the [`ReactiveContext`] and lets it record the read.
//!    The computation decides whether that means a new subscription.
//!
//! 4. When an observable changes, [`Runtime::notify`] snapshots its
//!    subscriber list and calls `update()` on each live subscriber.
//!
//! # Threading
//!
//! All state is thread-local. Each thread has an independent graph, and no
//! lock is held while user code runs: every access borrows the state, copies
//! out what it needs, and releases it before calling into a computation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::{error, trace, warn};

use super::context::ReactiveContext;
use super::observable::ObservableId;
use super::subscriber::{ComputationId, Subscriber};
use crate::config::RuntimeConfig;
use crate::error::{ErrorContext, ReactiveError, Result};
use crate::scheduler::{FlushQueue, Scheduler};

/// Subscriber ids of one observable. Most observables have a handful.
pub(crate) type SubscriberList = SmallVec<[ComputationId; 4]>;

/// Callback invoked instead of letting a user-facing failure escape.
pub type ErrorHandler = Rc<dyn Fn(&ReactiveError, &ErrorContext)>;

struct RuntimeState {
    config: RuntimeConfig,
    subscribers: HashMap<ObservableId, SubscriberList>,
    registry: HashMap<ComputationId, Weak<dyn Subscriber>>,
    scheduler: Rc<dyn Scheduler>,
    error_handler: ErrorHandler,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            config: RuntimeConfig::default(),
            subscribers: HashMap::new(),
            registry: HashMap::new(),
            scheduler: Rc::new(FlushQueue::new()),
            error_handler: Rc::new(log_error),
        }
    }
}

fn log_error(err: &ReactiveError, context: &ErrorContext) {
    error!(
        owner = context.owner.as_deref().unwrap_or("<none>"),
        info = %context.info,
        error = %err,
        "error in reactive computation"
    );
}

thread_local! {
    static STATE: RefCell<RuntimeState> = RefCell::new(RuntimeState::default());
}

/// Run `f` against this thread's runtime state.
///
/// Returns `None` once the thread-local has been destroyed, which only
/// happens while the thread exits and computations held by the scheduler are
/// dropped.
fn with_state<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> Option<R> {
    STATE.try_with(|state| f(&mut state.borrow_mut())).ok()
}

/// The per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Install a configuration for this thread.
    pub fn configure(config: RuntimeConfig) {
        with_state(|state| state.config = config);
    }

    /// The configuration currently installed on this thread.
    pub fn config() -> RuntimeConfig {
        with_state(|state| state.config.clone()).unwrap_or_default()
    }

    /// Replace the scheduler batched computations are handed to.
    ///
    /// Returns the previously installed scheduler.
    pub fn set_scheduler(scheduler: Rc<dyn Scheduler>) -> Option<Rc<dyn Scheduler>> {
        with_state(|state| std::mem::replace(&mut state.scheduler, scheduler))
    }

    /// The scheduler currently installed on this thread.
    pub fn scheduler() -> Option<Rc<dyn Scheduler>> {
        with_state(|state| Rc::clone(&state.scheduler))
    }

    /// Flush the installed scheduler.
    pub fn flush() -> Result<usize> {
        match Self::scheduler() {
            Some(scheduler) => scheduler.flush(),
            None => Ok(0),
        }
    }

    /// Replace the handler user-facing failures are reported to.
    pub fn set_error_handler(handler: ErrorHandler) {
        // The old handler may own computations; drop it outside the borrow.
        let previous = with_state(|state| std::mem::replace(&mut state.error_handler, handler));
        drop(previous);
    }

    /// Report a failure through the installed error handler.
    pub fn report_error(err: &ReactiveError, context: &ErrorContext) {
        let handler = with_state(|state| Rc::clone(&state.error_handler));
        match handler {
            Some(handler) => handler(err, context),
            None => log_error(err, context),
        }
    }

    /// Check if some computation is currently recording dependencies.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Get the computation currently recording dependencies, if any.
    pub fn current_subscriber() -> Option<ComputationId> {
        ReactiveContext::current_subscriber()
    }

    /// Number of computations subscribed to `observable`.
    pub fn subscriber_count(observable: ObservableId) -> usize {
        with_state(|state| state.subscribers.get(&observable).map_or(0, |subs| subs.len()))
            .unwrap_or(0)
    }

    /// Snapshot of the computations subscribed to `observable`, in
    /// subscription order.
    pub fn subscribers(observable: ObservableId) -> Vec<ComputationId> {
        with_state(|state| {
            state
                .subscribers
                .get(&observable)
                .map(|subs| subs.to_vec())
                .unwrap_or_default()
        })
        .unwrap_or_default()
    }

    /// Register a computation so notifications can reach it by id.
    pub(crate) fn register(subscriber: &Rc<dyn Subscriber>) {
        let id = subscriber.id();
        with_state(|state| state.registry.insert(id, Rc::downgrade(subscriber)));
    }

    /// Forget a computation. Called when it is dropped.
    pub(crate) fn unregister(id: ComputationId) {
        with_state(|state| state.registry.remove(&id));
    }

    /// Resolve a computation id to the live computation.
    pub(crate) fn lookup(id: ComputationId) -> Option<Rc<dyn Subscriber>> {
        with_state(|state| state.registry.get(&id).and_then(Weak::upgrade)).flatten()
    }

    /// Allocate the subscriber list of a new observable.
    pub(crate) fn allocate(observable: ObservableId) {
        with_state(|state| state.subscribers.insert(observable, SubscriberList::new()));
    }

    /// Drop the subscriber list of an observable that no longer exists.
    pub(crate) fn release(observable: ObservableId) {
        with_state(|state| state.subscribers.remove(&observable));
    }

    /// Append `subscriber` to the observable's list.
    ///
    /// Does not check for duplicates: computations de-duplicate through their
    /// own dependency sets before subscribing.
    pub(crate) fn subscribe(observable: ObservableId, subscriber: ComputationId) {
        trace!(observable = observable.raw(), computation = subscriber.raw(), "subscribe");
        with_state(|state| {
            if let Some(subs) = state.subscribers.get_mut(&observable) {
                subs.push(subscriber);
            }
        });
    }

    /// Remove the first matching entry from the observable's list.
    pub(crate) fn unsubscribe(observable: ObservableId, subscriber: ComputationId) {
        trace!(observable = observable.raw(), computation = subscriber.raw(), "unsubscribe");
        with_state(|state| {
            if let Some(subs) = state.subscribers.get_mut(&observable) {
                if let Some(pos) = subs.iter().position(|id| *id == subscriber) {
                    subs.remove(pos);
                }
            }
        });
    }

    /// Record a read of `observable` against the active computation.
    pub(crate) fn depend(observable: ObservableId) {
        let Some(current) = ReactiveContext::current_subscriber() else {
            return;
        };
        if let Some(subscriber) = Self::lookup(current) {
            subscriber.record_dependency(observable);
        }
    }

    /// Call `update()` on every subscriber of `observable`.
    ///
    /// The subscriber list is copied before anything fires, so subscribers
    /// added or removed by the updates themselves do not affect this round.
    /// With `async_flush` disabled the copy is sorted by ascending id.
    ///
    /// Every subscriber in the copy is updated even when one fails; the
    /// first failure is returned once all of them have been reached.
    pub(crate) fn notify(observable: ObservableId) -> Result<()> {
        let snapshot = with_state(|state| {
            let subs = state.subscribers.get(&observable).cloned().unwrap_or_default();
            (subs, state.config.async_flush)
        });
        let Some((mut subs, async_flush)) = snapshot else {
            return Ok(());
        };
        if !async_flush {
            subs.sort_unstable();
        }

        let mut first_error = None;
        for id in subs {
            let Some(subscriber) = Self::lookup(id) else {
                continue;
            };
            if let Err(err) = subscriber.update() {
                if first_error.is_none() {
                    first_error = Some(err);
                } else {
                    warn!(computation = id.raw(), error = %err, "further failure during notify");
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
