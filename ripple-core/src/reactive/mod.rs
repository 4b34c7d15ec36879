//! Reactive Primitives
//!
//! This module implements the dependency-tracking and invalidation engine:
//! observables, computations, and the tracker connecting them.
//!
//! # Concepts
//!
//! ## Observables
//!
//! An [`Observable`] is the publish point guarding one value. Reading the
//! value inside a computation calls `depend()`, which records the
//! computation as a subscriber. Changing the value calls `notify()`, which
//! tells every subscriber.
//!
//! ## Computations
//!
//! A [`Computation`] wraps a producer. It records every observable the
//! producer reads, drops subscriptions it no longer needs after each
//! evaluation, and reacts to notifications according to its [`Mode`]:
//! recompute now, wait for the scheduler, or mark itself dirty until pulled.
//!
//! ## Observed Sequences
//!
//! An [`ObservedVec`] turns in-place structural mutation (push, splice,
//! sort, ...) into notifications, which plain reassignment tracking cannot
//! see.
//!
//! ## Built on Top
//!
//! [`Signal`] is a single reactive slot, [`Computed`] a cached derived value,
//! [`watch`] a user-facing callback on a source, and [`Owner`] groups
//! computations for bulk teardown.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic: a thread-local stack (the
//! [`ReactiveContext`]) holds the computation currently evaluating, and every
//! `depend()` records against whatever is on top. Everything lives in
//! thread-local state addressed by stable ids, so a notification never holds
//! a borrow while user code runs.

mod array;
mod computation;
mod computed;
mod context;
mod observable;
mod owner;
mod runtime;
mod signal;
mod subscriber;
mod watch;
mod watchable;

pub use array::ObservedVec;
pub use computation::{Computation, ComputationBuilder, Mode, Origin, Trigger};
pub use computed::Computed;
pub use context::{untracked, ReactiveContext};
pub use observable::{Observable, ObservableId};
pub use owner::Owner;
pub use runtime::{ErrorHandler, Runtime};
pub use signal::Signal;
pub use subscriber::{ComputationId, Subscriber};
pub use watch::{try_watch, watch, watch_path, WatchHandle, WatchOptions};
pub use watchable::{Observe, Traversal, Watchable};
