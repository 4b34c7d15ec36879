//! Instrumented Value Model
//!
//! [`Value`] is a dynamically typed, JSON-like value whose containers carry
//! observables. It is the reference instrumentation layer: object property
//! reads call `depend()`, property writes and sequence mutations call
//! `notify()`, and [`observe`] brings fresh containers under observation.
//!
//! # Identity
//!
//! Primitives compare by value (`NaN` equals `NaN`). Arrays and objects are
//! shared handles and compare by identity: two separately built `[1]` arrays
//! are different values, and a computation producing a container always
//! fires its callback.

mod object;
mod path;

pub use object::ObjectRef;
pub use path::Path;

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use serde_json::{Map, Number};

use crate::reactive::{ObservedVec, Observe, Traversal, Watchable};

/// Shared handle to an observed sequence of values.
pub type ArrayRef = Rc<ObservedVec<Value>>;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(ArrayRef),
    Object(ObjectRef),
}

/// Bring `value`, and every container nested in it, under observation.
/// Idempotent.
pub fn observe(value: &Value) {
    value.observe();
}

impl Value {
    /// Build an observed array.
    pub fn array(items: Vec<Value>) -> Self {
        Self::Array(Rc::new(ObservedVec::new(items)))
    }

    /// Build an observed object from key/value pairs.
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::Object(ObjectRef::from_fields(fields))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Build an observed value from a JSON document.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::array(items.into_iter().map(Self::from_json).collect()),
            serde_json::Value::Object(fields) => {
                Self::object(fields.into_iter().map(|(key, value)| (key, Self::from_json(value))))
            }
        }
    }

    /// Convert to a JSON document, recording every read.
    ///
    /// `Undefined` object fields are skipped, `Undefined` array elements and
    /// non-finite numbers become `null`, and a container reached again while
    /// it is being converted (a cycle) becomes `null`.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_inner(&mut HashSet::new())
    }

    fn to_json_inner(&self, path: &mut HashSet<*const ()>) -> serde_json::Value {
        match self {
            Self::Undefined | Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(array) => {
                let ptr = Rc::as_ptr(array).cast::<()>();
                if !path.insert(ptr) {
                    return serde_json::Value::Null;
                }
                let items = array.to_vec().iter().map(|item| item.to_json_inner(path)).collect();
                path.remove(&ptr);
                serde_json::Value::Array(items)
            }
            Self::Object(object) => {
                let ptr = object.as_ptr();
                if !path.insert(ptr) {
                    return serde_json::Value::Null;
                }
                let mut fields = Map::new();
                for key in object.keys() {
                    let value = object.get(&key);
                    if !value.is_undefined() {
                        fields.insert(key, value.to_json_inner(path));
                    }
                }
                path.remove(&ptr);
                serde_json::Value::Object(fields)
            }
        }
    }

    fn fmt_untracked(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Array(array) => write!(f, "{array:?}"),
            Self::Object(object) => write!(f, "{object:?}"),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if n.fract() == 0.0 && n.abs() <= MAX_EXACT {
        return serde_json::Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

impl Watchable for Value {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a.same_value(b),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => ObjectRef::ptr_eq(a, b),
            _ => false,
        }
    }

    fn is_composite(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Object(_))
    }

    fn traverse(&self, seen: &mut Traversal) {
        match self {
            Self::Array(array) => array.traverse(seen),
            Self::Object(object) => object.traverse(seen),
            _ => {}
        }
    }
}

impl Observe for Value {
    fn observe(&self) {
        match self {
            Self::Array(array) => array.observe(),
            Self::Object(object) => object.observe(),
            _ => {}
        }
    }

    fn depend_nested(&self) {
        match self {
            Self::Array(array) => array.depend_nested(),
            Self::Object(object) => object.depend_nested(),
            _ => {}
        }
    }
}

impl PartialEq for Value {
    /// Same as [`Watchable::same_value`]: containers compare by identity.
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_untracked(f)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl FromStr for Value {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        serde_json::from_str(s).map(Self::from_json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Self::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(i32, i64, u32, u64, usize, f32, f64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::array(items)
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Self::Object(object)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Self::from_json(json)
    }
}
