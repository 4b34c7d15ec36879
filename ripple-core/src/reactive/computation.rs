//! Computation Implementation
//!
//! A [`Computation`] wraps a producer, records every observable the producer
//! reads, and reacts when one of them notifies.
//!
//! # How Computations Work
//!
//! 1. On construction the computation registers with the runtime and with its
//!    owner, then evaluates once (unless it is pull-only) to establish its
//!    value and its first dependency set.
//!
//! 2. Evaluation pushes the computation onto the [`ReactiveContext`], runs
//!    the producer, optionally walks the result (deep mode), pops, and
//!    reconciles dependencies: observables read for the first time are
//!    subscribed to as they are read, observables no longer read are
//!    unsubscribed from afterwards.
//!
//! 3. When a dependency notifies, [`update`](Computation::update) dispatches
//!    on the trigger: pull-only computations mark themselves dirty, immediate
//!    ones recompute on the spot, batched ones hand themselves to the
//!    scheduler.
//!
//! 4. Recomputing ([`run`](Computation::run)) evaluates again and fires the
//!    callback with the new and old value when the value changed, is
//!    composite, or the computation is deep.
//!
//! # Failures
//!
//! User-facing computations report producer and callback failures through
//! the runtime's error handler and carry on with their previous value.
//! Internal computations return the failure to whoever triggered them.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::context::ReactiveContext;
use super::observable::ObservableId;
use super::owner::{Owner, WeakOwner};
use super::runtime::Runtime;
use super::subscriber::{ComputationId, Subscriber};
use super::watchable::{Traversal, Watchable};
use crate::error::{BoxError, ErrorContext, ReactiveError, Result};
use crate::value::{Path, Value};

type Producer<T> = Box<dyn Fn() -> std::result::Result<T, BoxError>>;
type Callback<T> = Box<dyn Fn(&T, Option<&T>) -> std::result::Result<(), BoxError>>;
type Hook = Box<dyn Fn()>;

type IdBuffer = SmallVec<[ObservableId; 8]>;

/// How a computation reacts to invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Hand the computation to the scheduler.
    Batched,
    /// Recompute synchronously inside `notify()`.
    Immediate,
    /// Mark dirty and wait to be pulled.
    PullOnly,
}

/// Who observes the computation's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// User code: failures are reported and never escape.
    User,
    /// An internal side effect: failures propagate to the caller.
    Internal,
}

/// The full mode of a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub trigger: Trigger,
    pub origin: Origin,
    /// Walk the whole result so nested observables become dependencies.
    pub deep: bool,
}

impl Mode {
    /// Batched internal computation, e.g. a render pass.
    pub const fn render() -> Self {
        Self {
            trigger: Trigger::Batched,
            origin: Origin::Internal,
            deep: false,
        }
    }

    /// Batched user-facing watch.
    pub const fn user() -> Self {
        Self {
            trigger: Trigger::Batched,
            origin: Origin::User,
            deep: false,
        }
    }

    /// Pull-only internal computation, e.g. a cached derived value.
    pub const fn pull_only() -> Self {
        Self {
            trigger: Trigger::PullOnly,
            origin: Origin::Internal,
            deep: false,
        }
    }

    /// Same mode with deep traversal enabled.
    pub const fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    /// Same mode recomputing synchronously. Pull-only modes stay pull-only.
    pub const fn immediate(mut self) -> Self {
        if !matches!(self.trigger, Trigger::PullOnly) {
            self.trigger = Trigger::Immediate;
        }
        self
    }

    /// Same mode with the given origin.
    pub const fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::render()
    }
}

/// Dependencies of the previous evaluation and of the one in progress.
#[derive(Default)]
struct DependencySets {
    current: IndexSet<ObservableId>,
    pending: IndexSet<ObservableId>,
}

struct Inner<T> {
    id: ComputationId,
    mode: Mode,
    expression: String,
    producer: Producer<T>,
    callback: Option<Callback<T>>,
    before: Option<Hook>,
    owner: Option<WeakOwner>,
    value: RefCell<Option<T>>,
    active: Cell<bool>,
    dirty: Cell<bool>,
    evaluating: Cell<bool>,
    deps: RefCell<DependencySets>,
}

/// Reconciles dependencies when an evaluation ends, however it ends.
struct Collecting<'a, T> {
    inner: &'a Inner<T>,
}

impl<T> Drop for Collecting<'_, T> {
    fn drop(&mut self) {
        self.inner.evaluating.set(false);
        self.inner.cleanup_deps();
    }
}

impl<T> Inner<T> {
    fn record(&self, observable: ObservableId) {
        if !self.active.get() {
            return;
        }
        let subscribe = {
            let mut deps = self.deps.borrow_mut();
            deps.pending.insert(observable) && !deps.current.contains(&observable)
        };
        if subscribe {
            Runtime::subscribe(observable, self.id);
        }
    }

    fn cleanup_deps(&self) {
        let stale: IdBuffer = {
            let mut deps = self.deps.borrow_mut();
            let DependencySets { current, pending } = &mut *deps;
            if self.active.get() {
                let stale = current
                    .iter()
                    .filter(|id| !pending.contains(*id))
                    .copied()
                    .collect();
                std::mem::swap(current, pending);
                pending.clear();
                stale
            } else {
                // Torn down mid-evaluation: drop whatever was picked up since.
                current.clear();
                pending.drain(..).collect()
            }
        };
        for observable in stale {
            Runtime::unsubscribe(observable, self.id);
        }
    }

    fn context(&self, stage: &str) -> ErrorContext {
        ErrorContext {
            owner: self.owner.as_ref().and_then(WeakOwner::name),
            info: format!("{stage} for watcher \"{}\"", self.expression),
        }
    }

    fn fail(&self, err: ReactiveError, stage: &str) -> Result<()> {
        match self.mode.origin {
            Origin::User => {
                Runtime::report_error(&err, &self.context(stage));
                Ok(())
            }
            Origin::Internal => Err(err),
        }
    }
}

impl<T: Watchable> Inner<T> {
    /// Tracked evaluation. `Ok(None)` means no new value: the computation is
    /// inactive, is already evaluating, or a user-facing producer failed and
    /// was reported.
    ///
    /// A request to evaluate while an evaluation is in progress (the producer
    /// wrote to one of its own dependencies) only marks the computation dirty.
    fn get(&self) -> Result<Option<T>> {
        if !self.active.get() {
            return Ok(None);
        }
        if self.evaluating.get() {
            trace!(computation = self.id.raw(), "re-entered, deferring");
            self.dirty.set(true);
            return Ok(None);
        }
        self.evaluating.set(true);
        debug!(computation = self.id.raw(), expression = %self.expression, "evaluate");

        let outcome = {
            let _collecting = Collecting { inner: self };
            let _ctx = ReactiveContext::enter(self.id);
            let outcome = (self.producer)();
            if self.mode.deep {
                if let Ok(value) = &outcome {
                    value.traverse(&mut Traversal::new());
                }
            }
            outcome
        };

        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(source) => {
                let err = ReactiveError::Evaluation {
                    expression: self.expression.clone(),
                    source,
                };
                self.fail(err, "getter").map(|()| None)
            }
        }
    }

    /// Evaluate, then evaluate again for as long as the producer invalidated
    /// itself while running. Pull-only computations leave that to the next
    /// pull.
    fn settle(&self) -> Result<Option<T>> {
        let mut outcome = self.get()?;
        // Inside our own evaluation: the outer settle picks up the dirty flag.
        if self.evaluating.get() || self.mode.trigger == Trigger::PullOnly {
            return Ok(outcome);
        }
        let limit = Runtime::config().max_update_count;
        let mut reruns = 0;
        while self.dirty.replace(false) {
            reruns += 1;
            if reruns > limit {
                warn!(computation = self.id.raw(), count = reruns, "computation keeps invalidating itself");
                let err = ReactiveError::CircularUpdate {
                    id: self.id,
                    count: reruns,
                };
                return self.fail(err, "getter").map(|()| None);
            }
            outcome = self.get()?;
        }
        Ok(outcome)
    }

    fn run(&self) -> Result<()> {
        if !self.active.get() {
            return Ok(());
        }
        let Some(value) = self.settle()? else {
            return Ok(());
        };

        let changed = self
            .value
            .borrow()
            .as_ref()
            .map_or(true, |held| !value.same_value(held));
        if !(changed || value.is_composite() || self.mode.deep) {
            return Ok(());
        }

        let old = self.value.replace(Some(value.clone()));
        self.invoke(&value, old.as_ref())
    }

    fn invoke(&self, value: &T, old: Option<&T>) -> Result<()> {
        let Some(callback) = &self.callback else {
            return Ok(());
        };
        match callback(value, old) {
            Ok(()) => Ok(()),
            Err(source) => {
                let err = ReactiveError::Callback {
                    expression: self.expression.clone(),
                    source,
                };
                self.fail(err, "callback")
            }
        }
    }

    fn pull(&self) -> Result<Option<T>> {
        // Cleared up front so a write to an input during the evaluation
        // leaves it dirty for the next pull.
        if self.dirty.replace(false) {
            match self.get() {
                Ok(Some(value)) => *self.value.borrow_mut() = Some(value),
                Ok(None) => {}
                Err(err) => {
                    self.dirty.set(true);
                    return Err(err);
                }
            }
        }
        Ok(self.value.borrow().clone())
    }
}

impl<T: Watchable> Subscriber for Inner<T> {
    fn id(&self) -> ComputationId {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }

    fn record_dependency(&self, observable: ObservableId) {
        self.record(observable);
    }

    fn update(&self) -> Result<()> {
        if !self.active.get() {
            return Ok(());
        }
        match self.mode.trigger {
            Trigger::PullOnly => {
                self.dirty.set(true);
                Ok(())
            }
            Trigger::Immediate => self.run(),
            Trigger::Batched => {
                if let (Some(job), Some(scheduler)) = (Runtime::lookup(self.id), Runtime::scheduler()) {
                    scheduler.enqueue(job);
                }
                Ok(())
            }
        }
    }

    fn before(&self) {
        if let Some(hook) = &self.before {
            hook();
        }
    }

    fn run(&self) -> Result<()> {
        Inner::run(self)
    }

    fn teardown(&self) {
        if !self.active.replace(false) {
            return;
        }
        if let Some(owner) = &self.owner {
            owner.forget(self.id);
        }
        let deps: IdBuffer = self.deps.borrow_mut().current.drain(..).collect();
        for observable in deps {
            Runtime::unsubscribe(observable, self.id);
        }
        debug!(computation = self.id.raw(), expression = %self.expression, "torn down");
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        let DependencySets { current, pending } = self.deps.get_mut();
        for observable in current.drain(..).chain(pending.drain(..)) {
            Runtime::unsubscribe(observable, self.id);
        }
        Runtime::unregister(self.id);
    }
}

/// A unit of work that records its own dependencies and re-runs when they
/// change.
///
/// Cloning a `Computation` creates a new handle to the same computation.
/// Dropping the last handle (and the owner's reference, if any) unsubscribes
/// it from everything.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use ripple_core::reactive::{Computation, Mode, Signal};
///
/// let count = Signal::new(1);
/// let seen = Rc::new(Cell::new(0));
///
/// let source = count.clone();
/// let sink = Rc::clone(&seen);
/// let doubled = Computation::builder(move || source.get() * 2)
///     .mode(Mode::user().immediate())
///     .callback(move |new, _old| sink.set(*new))
///     .build()
///     .unwrap();
///
/// count.set(5).unwrap();
/// assert_eq!(seen.get(), 10);
/// assert_eq!(doubled.value(), Some(10));
/// ```
pub struct Computation<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Computation<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Watchable> Computation<T> {
    /// Start building a computation around an infallible producer.
    pub fn builder<F>(producer: F) -> ComputationBuilder<T>
    where
        F: Fn() -> T + 'static,
    {
        let expression = std::any::type_name::<F>().to_string();
        ComputationBuilder::new(Box::new(move || Ok(producer())), expression)
    }

    /// Start building a computation around a fallible producer.
    pub fn try_builder<F>(producer: F) -> ComputationBuilder<T>
    where
        F: Fn() -> std::result::Result<T, BoxError> + 'static,
    {
        let expression = std::any::type_name::<F>().to_string();
        ComputationBuilder::new(Box::new(producer), expression)
    }

    /// The computation's unique ID.
    pub fn id(&self) -> ComputationId {
        self.inner.id
    }

    /// The computation's mode.
    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    /// The expression used in diagnostics.
    pub fn expression(&self) -> &str {
        &self.inner.expression
    }

    /// False once torn down.
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Whether the computation was invalidated and has not re-evaluated since.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// The last computed value, without evaluating.
    pub fn value(&self) -> Option<T> {
        self.inner.value.borrow().clone()
    }

    /// Run the producer under tracking and reconcile dependencies.
    ///
    /// Returns the produced value without storing it. `Ok(None)` means no new
    /// value: the computation is inactive, or it is user-facing and the
    /// producer failure was reported.
    pub fn evaluate(&self) -> Result<Option<T>> {
        self.inner.get()
    }

    /// React to a dependency change according to the mode.
    pub fn update(&self) -> Result<()> {
        Subscriber::update(&*self.inner)
    }

    /// Recompute and fire the callback if warranted. No-op when inactive.
    pub fn run(&self) -> Result<()> {
        self.inner.run()
    }

    /// Re-evaluate if dirty, then return the held value.
    pub fn pull(&self) -> Result<Option<T>> {
        self.inner.pull()
    }

    /// Make the active computation depend on everything this one depends on.
    pub fn propagate_subscriptions(&self) {
        let deps: IdBuffer = self.inner.deps.borrow().current.iter().copied().collect();
        for observable in deps {
            Runtime::depend(observable);
        }
    }

    /// Stop reacting: leave the owner, unsubscribe everywhere, go inactive.
    /// Idempotent.
    pub fn teardown(&self) {
        Subscriber::teardown(&*self.inner);
    }

    /// Number of observables this computation currently depends on.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().current.len()
    }

    /// Observables this computation currently depends on, in read order.
    pub fn dependencies(&self) -> Vec<ObservableId> {
        self.inner.deps.borrow().current.iter().copied().collect()
    }

    /// Whether `observable` is among the current dependencies.
    pub fn depends_on(&self, observable: ObservableId) -> bool {
        self.inner.deps.borrow().current.contains(&observable)
    }
}

impl Computation<Value> {
    /// Start building a computation that reads a dot-delimited path below
    /// `root`, e.g. `"user.address.city"`.
    ///
    /// A path that cannot be parsed logs a warning and produces a
    /// computation that always yields [`Value::Undefined`].
    pub fn path_builder(root: Value, path: &str) -> ComputationBuilder<Value> {
        let producer: Producer<Value> = match Path::parse(path) {
            Ok(parsed) => Box::new(move || Ok(parsed.resolve(&root))),
            Err(err) => {
                warn!(path, error = %err, "failed watching path");
                Box::new(|| Ok(Value::Undefined))
            }
        };
        ComputationBuilder::new(producer, path.to_string())
    }
}

impl<T> fmt::Debug for Computation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("id", &self.inner.id)
            .field("expression", &self.inner.expression)
            .field("mode", &self.inner.mode)
            .field("active", &self.inner.active.get())
            .field("dirty", &self.inner.dirty.get())
            .field("dependency_count", &self.inner.deps.borrow().current.len())
            .finish()
    }
}

/// Builder for [`Computation`].
pub struct ComputationBuilder<T> {
    producer: Producer<T>,
    expression: String,
    mode: Mode,
    callback: Option<Callback<T>>,
    before: Option<Hook>,
    owner: Option<Owner>,
}

impl<T: Watchable> ComputationBuilder<T> {
    fn new(producer: Producer<T>, expression: String) -> Self {
        Self {
            producer,
            expression,
            mode: Mode::default(),
            callback: None,
            before: None,
            owner: None,
        }
    }

    /// Set the mode. Defaults to [`Mode::render`].
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the expression shown in diagnostics.
    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = expression.into();
        self
    }

    /// Register the computation with `owner`.
    pub fn owner(mut self, owner: &Owner) -> Self {
        self.owner = Some(owner.clone());
        self
    }

    /// Callback fired with `(new, old)` when the value changes.
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        self.callback = Some(Box::new(move |new, old| {
            callback(new, old);
            Ok(())
        }));
        self
    }

    /// Fallible variant of [`callback`](ComputationBuilder::callback).
    pub fn try_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T, Option<&T>) -> std::result::Result<(), BoxError> + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Hook the scheduler runs right before each batched recompute.
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn() + 'static,
    {
        self.before = Some(Box::new(hook));
        self
    }

    /// Create the computation and, unless it is pull-only, evaluate it once.
    ///
    /// A failing internal producer tears the new computation down and
    /// returns the error.
    pub fn build(self) -> Result<Computation<T>> {
        let computation = self.build_deferred();
        if computation.inner.mode.trigger == Trigger::PullOnly {
            return Ok(computation);
        }
        match computation.inner.settle() {
            Ok(Some(value)) => {
                *computation.inner.value.borrow_mut() = Some(value);
                Ok(computation)
            }
            Ok(None) => Ok(computation),
            Err(err) => {
                computation.teardown();
                Err(err)
            }
        }
    }

    /// Create the computation without evaluating it.
    pub(crate) fn build_deferred(self) -> Computation<T> {
        let Self {
            producer,
            expression,
            mode,
            callback,
            before,
            owner,
        } = self;

        let inner = Rc::new(Inner {
            id: ComputationId::new(),
            mode,
            expression,
            producer,
            callback,
            before,
            owner: owner.as_ref().map(Owner::downgrade),
            value: RefCell::new(None),
            active: Cell::new(true),
            dirty: Cell::new(mode.trigger == Trigger::PullOnly),
            evaluating: Cell::new(false),
            deps: RefCell::new(DependencySets::default()),
        });

        let subscriber: Rc<dyn Subscriber> = inner.clone();
        Runtime::register(&subscriber);
        if let Some(owner) = &owner {
            owner.adopt(subscriber);
        }
        debug!(computation = inner.id.raw(), expression = %inner.expression, ?mode, "created");

        Computation { inner }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
