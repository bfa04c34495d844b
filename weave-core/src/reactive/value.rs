//! Reactive Values
//!
//! A small dynamic state tree used for component props and any state that
//! needs deep watching. Every field of a [`ReactiveObject`] owns a dep that
//! is tracked on read and notified on write. Objects and arrays also carry
//! an observer dep, notified on structural change (keys added or removed,
//! elements pushed or spliced) and tracked whenever the container is read
//! through a parent field.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::dep::{Dep, DepId};
use super::traverse::Traverse;
use crate::component::VNode;
use crate::diagnostics::{self, Diagnostic};

/// A dynamically typed reactive value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(ReactiveArray),
    Object(ReactiveObject),
    /// Virtual nodes are opaque to traversal.
    VNode(VNode),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ReactiveObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ReactiveArray> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Track the observer dep of a container read through a parent field.
    fn track_child(&self) {
        match self {
            Value::Object(o) if !o.is_frozen() => o.observer_dep().track(),
            Value::Array(a) => a.observer_dep().track(),
            _ => {}
        }
    }

    /// Snapshot as JSON without tracking. Cycles and vnodes become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_inner(&mut HashSet::new())
    }

    fn to_json_inner(&self, seen: &mut HashSet<DepId>) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null | Value::VNode(_) => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Value::Str(s) => Json::String(s.to_string()),
            Value::Array(a) => {
                if !seen.insert(a.observer_dep().id()) {
                    return Json::Null;
                }
                let items = a.inner.items.borrow().clone();
                let json = items.iter().map(|v| v.to_json_inner(seen)).collect();
                seen.remove(&a.observer_dep().id());
                Json::Array(json)
            }
            Value::Object(o) => {
                if !seen.insert(o.observer_dep().id()) {
                    return Json::Null;
                }
                let fields: Vec<(String, Value)> = o
                    .inner
                    .fields
                    .borrow()
                    .iter()
                    .map(|(k, f)| (k.clone(), f.value.clone()))
                    .collect();
                let map = fields
                    .into_iter()
                    .map(|(k, v)| (k, v.to_json_inner(seen)))
                    .collect();
                seen.remove(&o.observer_dep().id());
                Json::Object(map)
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::VNode(a), Value::VNode(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Array(a) => write!(f, "Array(len={})", a.inner.items.borrow().len()),
            Value::Object(o) => write!(f, "Object(keys={})", o.inner.fields.borrow().len()),
            Value::VNode(v) => write!(f, "VNode({:?})", v.tag()),
        }
    }
}

impl Traverse for Value {
    fn traverse_into(&self, seen: &mut HashSet<DepId>) {
        match self {
            Value::Array(a) => a.traverse_into(seen),
            Value::Object(o) => o.traverse_into(seen),
            _ => {}
        }
    }

    fn is_compound(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<ReactiveObject> for Value {
    fn from(o: ReactiveObject) -> Self {
        Value::Object(o)
    }
}

impl From<ReactiveArray> for Value {
    fn from(a: ReactiveArray) -> Self {
        Value::Array(a)
    }
}

impl From<VNode> for Value {
    fn from(v: VNode) -> Self {
        Value::VNode(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
            Json::String(s) => Value::from(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => Value::Object(map.into_iter().collect()),
        }
    }
}

// ----------------------------------------------------------------------------
// Objects
// ----------------------------------------------------------------------------

struct Field {
    dep: Dep,
    value: Value,
}

struct ObjectInner {
    dep: Dep,
    frozen: Cell<bool>,
    fields: RefCell<IndexMap<String, Field>>,
}

/// A reactive string-keyed object.
#[derive(Clone)]
pub struct ReactiveObject {
    inner: Rc<ObjectInner>,
}

impl ReactiveObject {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                dep: Dep::new(),
                frozen: Cell::new(false),
                fields: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// Dep notified when keys are added or removed.
    pub fn observer_dep(&self) -> &Dep {
        &self.inner.dep
    }

    /// Dep of a single field.
    pub fn field_dep(&self, key: &str) -> Option<Dep> {
        self.inner.fields.borrow().get(key).map(|f| f.dep.clone())
    }

    /// Read a field, tracking it.
    ///
    /// Reading a missing key tracks the observer dep, so the reader is
    /// notified once the key is added.
    pub fn get(&self, key: &str) -> Option<Value> {
        if self.is_frozen() {
            return self.get_untracked(key);
        }
        let found = {
            let fields = self.inner.fields.borrow();
            fields.get(key).map(|field| (field.dep.clone(), field.value.clone()))
        };
        let Some((dep, value)) = found else {
            self.inner.dep.track();
            return None;
        };
        dep.track();
        value.track_child();
        Some(value)
    }

    pub fn get_untracked(&self, key: &str) -> Option<Value> {
        self.inner.fields.borrow().get(key).map(|f| f.value.clone())
    }

    /// Write a field. Unchanged values do not notify.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        if self.is_frozen() {
            diagnostics::report(Diagnostic::FrozenWrite { key: key.to_string() });
            return;
        }
        let value = value.into();
        let changed = {
            let mut fields = self.inner.fields.borrow_mut();
            match fields.get_mut(key) {
                Some(field) if field.value == value => return,
                Some(field) => {
                    field.value = value;
                    Some(field.dep.clone())
                }
                None => {
                    fields.insert(
                        key.to_string(),
                        Field {
                            dep: Dep::new(),
                            value,
                        },
                    );
                    None
                }
            }
        };
        match changed {
            Some(dep) => dep.notify(),
            None => self.inner.dep.notify(),
        }
    }

    /// Remove a field, notifying the observer dep.
    pub fn remove(&self, key: &str) -> Option<Value> {
        if self.is_frozen() {
            diagnostics::report(Diagnostic::FrozenWrite { key: key.to_string() });
            return None;
        }
        let removed = self.inner.fields.borrow_mut().shift_remove(key)?;
        self.inner.dep.notify();
        Some(removed.value)
    }

    /// Keys in insertion order. Tracks structural changes.
    pub fn keys(&self) -> Vec<String> {
        if !self.is_frozen() {
            self.inner.dep.track();
        }
        self.inner.fields.borrow().keys().cloned().collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.fields.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.fields.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.fields.borrow().is_empty()
    }

    /// Stop observing this object. Reads no longer track and writes are
    /// rejected.
    pub fn freeze(&self) {
        self.inner.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.get()
    }
}

impl Default for ReactiveObject {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ReactiveObject {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ReactiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveObject")
            .field("dep", &self.inner.dep.id())
            .field("keys", &self.inner.fields.borrow().keys().collect::<Vec<_>>())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ReactiveObject {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = Self::new();
        {
            let mut fields = object.inner.fields.borrow_mut();
            for (key, value) in iter {
                fields.insert(
                    key.into(),
                    Field {
                        dep: Dep::new(),
                        value: value.into(),
                    },
                );
            }
        }
        object
    }
}

impl Traverse for ReactiveObject {
    fn traverse_into(&self, seen: &mut HashSet<DepId>) {
        if self.is_frozen() || !seen.insert(self.inner.dep.id()) {
            return;
        }
        let keys: Vec<String> = self.inner.fields.borrow().keys().cloned().collect();
        for key in keys.iter().rev() {
            if let Some(value) = self.get(key) {
                value.traverse_into(seen);
            }
        }
    }

    fn is_compound(&self) -> bool {
        true
    }
}

// ----------------------------------------------------------------------------
// Arrays
// ----------------------------------------------------------------------------

struct ArrayInner {
    dep: Dep,
    items: RefCell<Vec<Value>>,
}

/// A reactive list. Element reads and structural changes share one dep.
#[derive(Clone)]
pub struct ReactiveArray {
    inner: Rc<ArrayInner>,
}

impl ReactiveArray {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ArrayInner {
                dep: Dep::new(),
                items: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn observer_dep(&self) -> &Dep {
        &self.inner.dep
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.dep.track();
        let value = self.inner.items.borrow().get(index).cloned()?;
        value.track_child();
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.inner.dep.track();
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.dep.track();
        self.inner.items.borrow().clone()
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.inner.items.borrow_mut().push(value.into());
        self.inner.dep.notify();
    }

    pub fn pop(&self) -> Option<Value> {
        let popped = self.inner.items.borrow_mut().pop()?;
        self.inner.dep.notify();
        Some(popped)
    }

    pub fn set(&self, index: usize, value: impl Into<Value>) -> bool {
        let value = value.into();
        {
            let mut items = self.inner.items.borrow_mut();
            match items.get_mut(index) {
                Some(slot) if *slot == value => return true,
                Some(slot) => *slot = value,
                None => return false,
            }
        }
        self.inner.dep.notify();
        true
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        {
            let mut items = self.inner.items.borrow_mut();
            let index = index.min(items.len());
            items.insert(index, value.into());
        }
        self.inner.dep.notify();
    }

    pub fn remove(&self, index: usize) -> Option<Value> {
        let removed = {
            let mut items = self.inner.items.borrow_mut();
            (index < items.len()).then(|| items.remove(index))
        }?;
        self.inner.dep.notify();
        Some(removed)
    }

    pub fn clear(&self) {
        let had_items = {
            let mut items = self.inner.items.borrow_mut();
            let had = !items.is_empty();
            items.clear();
            had
        };
        if had_items {
            self.inner.dep.notify();
        }
    }
}

impl Default for ReactiveArray {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ReactiveArray {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ReactiveArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveArray")
            .field("dep", &self.inner.dep.id())
            .field("len", &self.inner.items.borrow().len())
            .finish()
    }
}

impl<V: Into<Value>> FromIterator<V> for ReactiveArray {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        let array = Self::new();
        array
            .inner
            .items
            .borrow_mut()
            .extend(iter.into_iter().map(Into::into));
        array
    }
}

impl Traverse for ReactiveArray {
    fn traverse_into(&self, seen: &mut HashSet<DepId>) {
        if !seen.insert(self.inner.dep.id()) {
            return;
        }
        let len = self.inner.items.borrow().len();
        for index in (0..len).rev() {
            if let Some(value) = self.get(index) {
                value.traverse_into(seen);
            }
        }
    }

    fn is_compound(&self) -> bool {
        true
    }
}
