//! Observed Objects
//!
//! An [`ObjectRef`] is a shared, ordered string-keyed map instrumented the
//! way the runtime expects:
//!
//! - every property has its own observable, depended on by reads of that
//!   property and notified when it is reassigned;
//! - the object itself has one more observable, notified when keys are added
//!   or removed and depended on by anything that reads the key set (or a
//!   key that is not there yet).
//!
//! Reading a property that holds a container also depends on the
//! container's own observable, so in-place mutations reach the reader.

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::Value;
use crate::error::Result;
use crate::reactive::{Observable, ObservableId, Observe, Runtime, Traversal, Watchable};

struct Property {
    value: Value,
    dep: Option<Observable>,
}

struct ObjectInner {
    fields: RefCell<IndexMap<String, Property>>,
    dep: OnceCell<Observable>,
}

/// A shared, observed object.
///
/// Cloning an `ObjectRef` creates a new handle to the same object.
#[derive(Clone)]
pub struct ObjectRef {
    inner: Rc<ObjectInner>,
}

impl ObjectRef {
    /// Create an empty observed object.
    pub fn new() -> Self {
        let object = Self::detached();
        object.observe();
        object
    }

    /// Create an empty object that is not observed yet.
    pub fn detached() -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                fields: RefCell::new(IndexMap::new()),
                dep: OnceCell::new(),
            }),
        }
    }

    /// Create an observed object from key/value pairs, observing the values.
    pub fn from_fields<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let object = Self::detached();
        object.inner.fields.borrow_mut().extend(fields.into_iter().map(|(key, value)| {
            (key.into(), Property { value, dep: None })
        }));
        object.observe();
        object
    }

    /// Whether both handles point to the same object.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// Whether the object is observed.
    pub fn is_observed(&self) -> bool {
        self.inner.dep.get().is_some()
    }

    /// The id of the object's own observable, once observed.
    pub fn id(&self) -> Option<ObservableId> {
        self.inner.dep.get().map(Observable::id)
    }

    /// The id of the observable guarding `key`, if the property exists and
    /// is observed.
    pub fn property_id(&self, key: &str) -> Option<ObservableId> {
        let fields = self.inner.fields.borrow();
        fields.get(key).and_then(|prop| prop.dep.as_ref()).map(Observable::id)
    }

    /// Depend on the object's own observable.
    pub fn depend(&self) {
        if let Some(dep) = self.inner.dep.get() {
            dep.depend();
        }
    }

    /// Read a property. Missing properties read as [`Value::Undefined`] and
    /// depend on the object's own observable, so adding them later is seen.
    pub fn get(&self, key: &str) -> Value {
        let found = {
            let fields = self.inner.fields.borrow();
            fields
                .get(key)
                .map(|prop| (prop.dep.as_ref().map(Observable::id), prop.value.clone()))
        };
        match found {
            Some((dep, value)) => {
                if let Some(id) = dep {
                    Observable::depend_on(id);
                }
                value.depend_nested();
                value
            }
            None => {
                self.depend();
                Value::Undefined
            }
        }
    }

    /// Read a property without recording anything.
    pub fn get_untracked(&self, key: &str) -> Option<Value> {
        self.inner.fields.borrow().get(key).map(|prop| prop.value.clone())
    }

    /// Whether `key` exists. Depends on the key set.
    pub fn contains_key(&self, key: &str) -> bool {
        self.depend();
        self.inner.fields.borrow().contains_key(key)
    }

    /// Keys in insertion order. Depends on the key set.
    pub fn keys(&self) -> Vec<String> {
        self.depend();
        self.inner.fields.borrow().keys().cloned().collect()
    }

    /// Number of properties. Depends on the key set.
    pub fn len(&self) -> usize {
        self.depend();
        self.inner.fields.borrow().len()
    }

    /// Whether the object has no properties. Depends on the key set.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Assign a property.
    ///
    /// Reassigning an existing property notifies its observable unless the
    /// value is the same. Adding a new property notifies the object's own
    /// observable. On an observed object the new value is observed first.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        let observed = self.is_observed();
        if observed {
            value.observe();
        }

        let (notify, previous) = {
            let mut fields = self.inner.fields.borrow_mut();
            match fields.get_mut(&key) {
                Some(prop) => {
                    if prop.value.same_value(&value) {
                        return Ok(());
                    }
                    let dep = prop.dep.as_ref().map(Observable::id);
                    (dep, Some(std::mem::replace(&mut prop.value, value)))
                }
                None => {
                    let dep = observed.then(Observable::new);
                    fields.insert(key, Property { value, dep });
                    (self.id(), None)
                }
            }
        };
        // Replaced values may own the last handle to other observables.
        drop(previous);

        match notify {
            Some(id) => Runtime::notify(id),
            None => Ok(()),
        }
    }

    /// Remove a property, returning its value.
    ///
    /// Notifies the object's own observable, then the removed property's.
    /// Both are notified even if the first fails; the first failure wins.
    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        let removed = self.inner.fields.borrow_mut().shift_remove(key);
        let Some(prop) = removed else {
            return Ok(None);
        };
        let keys = self.inner.dep.get().map_or(Ok(()), Observable::notify);
        let property = prop.dep.as_ref().map_or(Ok(()), Observable::notify);
        keys.and(property)?;
        Ok(Some(prop.value))
    }

    pub(crate) fn traverse(&self, seen: &mut Traversal) {
        if !seen.first_visit(Rc::as_ptr(&self.inner)) {
            return;
        }
        self.depend();
        let entries: SmallVec<[(Option<ObservableId>, Value); 8]> = self
            .inner
            .fields
            .borrow()
            .values()
            .map(|prop| (prop.dep.as_ref().map(Observable::id), prop.value.clone()))
            .collect();
        for (dep, value) in entries {
            if let Some(id) = dep {
                Observable::depend_on(id);
            }
            value.traverse(seen);
        }
    }

    /// Visit every property in order without recording anything.
    pub(crate) fn for_each_untracked(&self, mut f: impl FnMut(&str, &Value)) {
        for (key, prop) in self.inner.fields.borrow().iter() {
            f(key, &prop.value);
        }
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.inner).cast()
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

impl Observe for ObjectRef {
    fn observe(&self) {
        if self.inner.dep.get().is_some() {
            return;
        }
        let _ = self.inner.dep.set(Observable::new());

        let values: SmallVec<[Value; 8]> = {
            let mut fields = self.inner.fields.borrow_mut();
            fields
                .values_mut()
                .map(|prop| {
                    prop.dep.get_or_insert_with(Observable::new);
                    prop.value.clone()
                })
                .collect()
        };
        values.iter().for_each(Observe::observe);
    }

    fn depend_nested(&self) {
        self.depend();
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.fields.try_borrow() {
            Ok(fields) => f
                .debug_map()
                .entries(fields.iter().map(|(key, prop)| (key, &prop.value)))
                .finish(),
            Err(_) => f.write_str("{..}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Computation, Mode};
    use std::cell::Cell;

    fn counted<T: Watchable>(producer: impl Fn() -> T + 'static) -> (Computation<T>, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&runs);
        let computation = Computation::builder(move || {
            counter.set(counter.get() + 1);
            producer()
        })
        .mode(Mode::render().immediate())
        .build()
        .unwrap();
        (computation, runs)
    }

    #[test]
    fn property_reads_depend_on_the_property() {
        let object = ObjectRef::from_fields([("a", Value::from(1)), ("b", Value::from(2))]);

        let source = object.clone();
        let (computation, runs) = counted(move || source.get("a"));
        assert_eq!(computation.dependencies(), vec![object.property_id("a").unwrap()]);

        object.set("b", Value::from(3)).unwrap();
        assert_eq!(runs.get(), 1);

        object.set("a", Value::from(5)).unwrap();
        assert_eq!(runs.get(), 2);
        assert_eq!(computation.value(), Some(Value::from(5)));

        // Same value
        object.set("a", Value::from(5)).unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn adding_a_key_notifies_readers_of_missing_keys() {
        let object = ObjectRef::new();

        let source = object.clone();
        let (computation, runs) = counted(move || source.get("late"));
        assert_eq!(computation.value(), Some(Value::Undefined));

        object.set("late", Value::from("here")).unwrap();
        assert_eq!(runs.get(), 2);
        assert_eq!(computation.value(), Some(Value::from("here")));
    }

    #[test]
    fn removing_a_key_notifies_property_and_key_set() {
        let object = ObjectRef::from_fields([("a", Value::from(1))]);

        let (reader, source) = (object.clone(), object.clone());
        let (_value, value_runs) = counted(move || reader.get("a"));
        let (keys, key_runs) = counted(move || source.keys());

        assert_eq!(object.remove("a").unwrap(), Some(Value::from(1)));
        assert_eq!(value_runs.get(), 2);
        assert_eq!(key_runs.get(), 2);
        assert_eq!(keys.value(), Some(Vec::<String>::new()));

        assert_eq!(object.remove("a").unwrap(), None);
    }

    #[test]
    fn removal_reaches_property_readers_when_key_readers_fail() {
        let object = ObjectRef::from_fields([("a", Value::from(1))]);

        let source = object.clone();
        let _failing = Computation::try_builder(move || {
            if source.contains_key("a") {
                Ok(())
            } else {
                Err("key missing".into())
            }
        })
        .mode(Mode::render().immediate())
        .build()
        .unwrap();

        let reader = object.clone();
        let (value, value_runs) = counted(move || reader.get("a"));

        assert!(object.remove("a").is_err());
        assert_eq!(value_runs.get(), 2);
        assert_eq!(value.value(), Some(Value::Undefined));
    }

    #[test]
    fn nested_container_reads_depend_on_the_container() {
        let items = Value::array(vec![Value::from(1)]);
        let object = ObjectRef::from_fields([("items", items.clone())]);

        let source = object.clone();
        let (_computation, runs) = counted(move || source.get("items"));

        items.as_array().unwrap().push(Value::from(2)).unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn detached_object_mutates_silently() {
        let object = ObjectRef::detached();
        object.set("a", Value::from(1)).unwrap();
        assert!(!object.is_observed());
        assert_eq!(object.property_id("a"), None);

        object.observe();
        assert!(object.is_observed());
        assert!(object.property_id("a").is_some());
    }

    #[test]
    fn observing_assigned_values() {
        let object = ObjectRef::new();
        let child = ObjectRef::detached();
        object.set("child", Value::Object(child.clone())).unwrap();
        assert!(child.is_observed());
    }

    #[test]
    fn keys_keep_insertion_order() {
        let object = ObjectRef::new();
        for key in ["z", "a", "m"] {
            object.set(key, Value::Null).unwrap();
        }
        object.remove("a").unwrap();
        assert_eq!(object.keys(), vec!["z", "m"]);
        assert_eq!(object.len(), 2);
    }
}
