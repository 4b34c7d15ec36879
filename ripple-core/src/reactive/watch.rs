//! User-Facing Watches
//!
//! [`watch`] builds a user-origin [`Computation`] around a source and a
//! callback. Failures inside either are reported through the runtime's
//! error handler and never reach the caller of `notify()`.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::computation::{Computation, ComputationBuilder, Mode};
use super::context::untracked;
use super::owner::Owner;
use super::runtime::Runtime;
use super::watchable::Watchable;
use crate::error::{BoxError, ErrorContext, ReactiveError, Result};
use crate::value::Value;

type WatchCallback<T> = dyn Fn(&T, Option<&T>) -> std::result::Result<(), BoxError>;

/// Options accepted by [`watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Track everything reachable from the source's value, and fire on every
    /// recompute.
    pub deep: bool,
    /// Call the callback once right away with the initial value.
    pub immediate: bool,
    /// Recompute synchronously inside `notify()` instead of batching.
    pub sync: bool,
}

impl WatchOptions {
    /// The computation mode these options select.
    pub fn mode(&self) -> Mode {
        let mut mode = Mode::user();
        if self.sync {
            mode = mode.immediate();
        }
        if self.deep {
            mode = mode.deep();
        }
        mode
    }
}

/// Handle returned by [`watch`]. Dropping it stops the watch unless an owner
/// still holds the computation.
#[must_use = "dropping a watch handle without an owner stops the watch"]
pub struct WatchHandle<T> {
    computation: Computation<T>,
}

impl<T: Watchable> WatchHandle<T> {
    /// Stop watching. Idempotent.
    pub fn unwatch(&self) {
        self.computation.teardown();
    }

    /// Whether the watch is still live.
    pub fn is_active(&self) -> bool {
        self.computation.is_active()
    }

    /// The underlying computation.
    pub fn computation(&self) -> &Computation<T> {
        &self.computation
    }
}

/// Watch `source` and call `callback(new, old)` whenever it changes.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use ripple_core::reactive::{watch, Runtime, Signal, WatchOptions};
///
/// let name = Signal::new(String::from("ada"));
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let (source, sink) = (name.clone(), log.clone());
/// let _handle = watch(
///     None,
///     move || source.get(),
///     move |new: &String, old: Option<&String>| {
///         sink.borrow_mut().push(format!("{} -> {new}", old.map_or("", |s| s.as_str())));
///     },
///     WatchOptions::default(),
/// )
/// .unwrap();
///
/// name.set("grace".to_string()).unwrap();
/// Runtime::flush().unwrap();
/// assert_eq!(*log.borrow(), vec!["ada -> grace"]);
/// ```
pub fn watch<T, S, C>(owner: Option<&Owner>, source: S, callback: C, options: WatchOptions) -> Result<WatchHandle<T>>
where
    T: Watchable,
    S: Fn() -> T + 'static,
    C: Fn(&T, Option<&T>) + 'static,
{
    let callback: Rc<WatchCallback<T>> = Rc::new(move |new: &T, old: Option<&T>| {
        callback(new, old);
        Ok(())
    });
    install(Computation::builder(source), owner, callback, options)
}

/// Fallible variant of [`watch`].
pub fn try_watch<T, S, C>(owner: Option<&Owner>, source: S, callback: C, options: WatchOptions) -> Result<WatchHandle<T>>
where
    T: Watchable,
    S: Fn() -> std::result::Result<T, BoxError> + 'static,
    C: Fn(&T, Option<&T>) -> std::result::Result<(), BoxError> + 'static,
{
    install(Computation::try_builder(source), owner, Rc::new(callback), options)
}

/// Watch a dot-delimited path below `root`, e.g. `"user.address.city"`.
///
/// An unparsable path logs a warning and watches [`Value::Undefined`].
pub fn watch_path<C>(
    owner: Option<&Owner>,
    root: Value,
    path: &str,
    callback: C,
    options: WatchOptions,
) -> Result<WatchHandle<Value>>
where
    C: Fn(&Value, Option<&Value>) + 'static,
{
    let callback: Rc<WatchCallback<Value>> = Rc::new(move |new: &Value, old: Option<&Value>| {
        callback(new, old);
        Ok(())
    });
    install(Computation::path_builder(root, path), owner, callback, options)
}

fn install<T: Watchable>(
    builder: ComputationBuilder<T>,
    owner: Option<&Owner>,
    callback: Rc<WatchCallback<T>>,
    options: WatchOptions,
) -> Result<WatchHandle<T>> {
    let builder = match owner {
        Some(owner) => builder.owner(owner),
        None => builder,
    };
    let on_change = Rc::clone(&callback);
    let computation = builder
        .mode(options.mode())
        .try_callback(move |new, old| on_change(new, old))
        .build()?;

    if options.immediate {
        if let Some(value) = computation.value() {
            if let Err(source) = untracked(|| callback(&value, None)) {
                let expression = computation.expression().to_string();
                let context = ErrorContext {
                    owner: owner.map(|o| o.name().to_string()),
                    info: format!("callback for immediate watcher \"{expression}\""),
                };
                Runtime::report_error(&ReactiveError::Callback { expression, source }, &context);
            }
        }
    }

    Ok(WatchHandle { computation })
}
