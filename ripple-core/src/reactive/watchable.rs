//! Value traits the runtime relies on.
//!
//! [`Watchable`] tells a computation how to compare successive results and how
//! to walk a result for deep tracking. [`Observe`] is the hook through which
//! newly inserted container elements are brought under observation.
//!
//! Plain owned values (numbers, strings, vectors of them) compare by
//! equality and are never composite: a clone cannot be mutated behind the
//! computation's back. Shared handles such as
//! [`ArrayRef`](crate::value::ArrayRef) are composite, and a computation
//! producing one fires its callback on every recompute.

use std::collections::HashSet;
use std::rc::Rc;

/// Seen-set for deep traversal, so cyclic value graphs terminate.
#[derive(Debug, Default)]
pub struct Traversal {
    seen: HashSet<usize>,
}

impl Traversal {
    /// Create an empty traversal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the composite at `ptr` as visited. Returns `false` if it was
    /// already visited during this traversal.
    pub fn first_visit<T: ?Sized>(&mut self, ptr: *const T) -> bool {
        self.seen.insert(ptr as *const () as usize)
    }

    /// Number of distinct composites visited.
    pub fn visited(&self) -> usize {
        self.seen.len()
    }
}

/// A value a computation can produce.
pub trait Watchable: Clone + 'static {
    /// Whether `self` and `other` count as the same value for change detection.
    fn same_value(&self, other: &Self) -> bool;

    /// Composite values are shared handles that may change in place without
    /// changing identity. Computations always fire for them.
    fn is_composite(&self) -> bool {
        false
    }

    /// Read every nested observable so the active computation depends on it.
    fn traverse(&self, _seen: &mut Traversal) {}
}

/// The recursive-observe primitive.
pub trait Observe {
    /// Bring this value, and everything nested in it, under observation.
    /// Must be idempotent.
    fn observe(&self) {}

    /// Depend on this value's own observable and, for sequences, on those of
    /// its elements. Called by instrumented getters that hand out this value.
    fn depend_nested(&self) {}
}

macro_rules! impl_plain {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Watchable for $ty {
                fn same_value(&self, other: &Self) -> bool {
                    self == other
                }
            }

            impl Observe for $ty {}
        )*
    };
}

impl_plain!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    String,
    &'static str,
);

macro_rules! impl_float {
    ($($ty:ty),*) => {
        $(
            impl Watchable for $ty {
                fn same_value(&self, other: &Self) -> bool {
                    self == other || (self.is_nan() && other.is_nan())
                }
            }

            impl Observe for $ty {}
        )*
    };
}

impl_float!(f32, f64);

impl<T: Watchable> Watchable for Option<T> {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same_value(b),
            (None, None) => true,
            _ => false,
        }
    }

    fn is_composite(&self) -> bool {
        self.as_ref().is_some_and(Watchable::is_composite)
    }

    fn traverse(&self, seen: &mut Traversal) {
        if let Some(value) = self {
            value.traverse(seen);
        }
    }
}

impl<T: Observe> Observe for Option<T> {
    fn observe(&self) {
        if let Some(value) = self {
            value.observe();
        }
    }

    fn depend_nested(&self) {
        if let Some(value) = self {
            value.depend_nested();
        }
    }
}

impl<T: Watchable> Watchable for Vec<T> {
    fn same_value(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.same_value(b))
    }

    fn traverse(&self, seen: &mut Traversal) {
        for item in self {
            item.traverse(seen);
        }
    }
}

impl<T: Observe> Observe for Vec<T> {
    fn observe(&self) {
        self.iter().for_each(Observe::observe);
    }
}

impl<A: Watchable, B: Watchable> Watchable for (A, B) {
    fn same_value(&self, other: &Self) -> bool {
        self.0.same_value(&other.0) && self.1.same_value(&other.1)
    }

    fn is_composite(&self) -> bool {
        self.0.is_composite() || self.1.is_composite()
    }

    fn traverse(&self, seen: &mut Traversal) {
        self.0.traverse(seen);
        self.1.traverse(seen);
    }
}

impl<T: Observe + ?Sized> Observe for Rc<T> {
    fn observe(&self) {
        (**self).observe();
    }

    fn depend_nested(&self) {
        (**self).depend_nested();
    }
}
