//! Ripple Core
//!
//! This crate provides a fine-grained reactive dependency runtime. It tracks
//! which computations read which observable values and re-runs exactly the
//! affected computations when those values change.
//!
//! It implements:
//!
//! - Observables and the active-computation tracker
//! - Computations with pull-only, immediate and batched modes
//! - Observed sequences that turn in-place mutation into notifications
//! - A de-duplicating flush queue for batched recomputation
//! - A JSON-like instrumented value model for watching paths
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Observables, computations, signals, watches, owners
//! - `scheduler`: The scheduler contract and the default flush queue
//! - `value`: Instrumented objects, arrays and watch paths
//! - `config`: Per-thread runtime configuration
//! - `error`: The crate-wide error type
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use ripple_core::reactive::{watch, Computed, Runtime, Signal, WatchOptions};
//!
//! // Create a signal
//! let count = Signal::new(1);
//!
//! // Create a derived value
//! let source = count.clone();
//! let doubled = Computed::new(move || source.get() * 2);
//!
//! // Watch it
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//! let derived = doubled.clone();
//! let _handle = watch(
//!     None,
//!     move || derived.get().unwrap_or_default(),
//!     move |new: &i32, _old: Option<&i32>| sink.borrow_mut().push(*new),
//!     WatchOptions::default(),
//! )
//! .unwrap();
//!
//! // Update the signal, then let the scheduler run the watch
//! count.set(5).unwrap();
//! Runtime::flush().unwrap();
//! assert_eq!(*seen.borrow(), vec![10]);
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod scheduler;
pub mod value;

pub use config::RuntimeConfig;
pub use error::{BoxError, ErrorContext, ReactiveError, Result};
pub use value::Value;
