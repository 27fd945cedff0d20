//! Heap objects: ordered property storage plus the exotic kinds the engine
//! needs (arrays, functions, collections, regexps, dates, promises).

use super::ast::{Expr, FunctionDef};
use super::builtins::collections::KeyedTable;
use super::builtins::iterator::IteratorState;
use super::builtins::promise::PromiseState;
use super::builtins::regexp::RegExpData;
use super::env::Env;
use super::interpreter::{Control, Interpreter};
use super::value::{JsStr, PropertyKey, Value, utf16_len, utf16_slice};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Largest array a payload may grow. Writes past it throw `RangeError`.
pub const MAX_ARRAY_LENGTH: usize = 1 << 20;

/// A write would grow an array past [`MAX_ARRAY_LENGTH`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidArrayLength;

pub type NativeFn =
    Arc<dyn Fn(&mut Interpreter, &Value, &[Value], Option<&ObjectRef>) -> Result<Value, Control> + Send + Sync>;

#[derive(Clone)]
pub enum Callable {
    Closure(Closure),
    Native(NativeFunction),
    Bound(BoundFunction),
}

#[derive(Clone)]
pub struct Closure {
    pub def: Arc<FunctionDef>,
    pub env: Env,
    /// Object whose prototype `super` refers to inside methods.
    pub home_object: Option<ObjectRef>,
    pub class: Option<Arc<ClassConstructor>>,
}

/// Extra state carried by `class` constructors.
pub struct ClassConstructor {
    pub derived: bool,
    pub fields: Vec<FieldInit>,
}

pub struct FieldInit {
    pub key: PropertyKey,
    pub value: Option<Arc<Expr>>,
}

#[derive(Clone)]
pub struct NativeFunction {
    pub func: NativeFn,
    pub constructor: bool,
}

#[derive(Clone)]
pub struct BoundFunction {
    pub target: ObjectRef,
    pub this: Value,
    pub args: Vec<Value>,
}

pub enum ObjectKind {
    Ordinary,
    Array(Vec<Value>),
    Function(Callable),
    Error,
    /// `Boolean`, `Number`, `String` and `Symbol` wrapper objects.
    Boxed(Value),
    Map(KeyedTable),
    Set(KeyedTable),
    RegExp(RegExpData),
    Date(f64),
    Iterator(IteratorState),
    Promise(PromiseState),
}

#[derive(Clone)]
pub enum Slot {
    Data(Value),
    Accessor {
        get: Option<ObjectRef>,
        set: Option<ObjectRef>,
    },
}

#[derive(Clone)]
pub struct Property {
    pub slot: Slot,
    pub enumerable: bool,
    pub writable: bool,
    pub configurable: bool,
}

impl Property {
    pub fn data(value: Value) -> Self {
        Self {
            slot: Slot::Data(value),
            enumerable: true,
            writable: true,
            configurable: true,
        }
    }

    /// Writable but skipped by `for…in` and `Object.keys`; builtin methods use this.
    pub fn hidden(value: Value) -> Self {
        Self {
            enumerable: false,
            ..Self::data(value)
        }
    }

    pub fn readonly(value: Value) -> Self {
        Self {
            slot: Slot::Data(value),
            enumerable: false,
            writable: false,
            configurable: false,
        }
    }

    /// `name` and `length` of functions: read-only, non-enumerable, configurable.
    pub fn meta(value: Value) -> Self {
        Self {
            slot: Slot::Data(value),
            enumerable: false,
            writable: false,
            configurable: true,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.slot {
            Slot::Data(value) => Some(value),
            Slot::Accessor { .. } => None,
        }
    }
}

/// Insertion-ordered property storage with a hash index.
#[derive(Clone, Default)]
pub struct PropertyMap {
    entries: Vec<(PropertyKey, Property)>,
    index: FxHashMap<PropertyKey, usize>,
}

impl PropertyMap {
    pub fn get(&self, key: &PropertyKey) -> Option<&Property> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &PropertyKey) -> Option<&mut Property> {
        let i = *self.index.get(key)?;
        Some(&mut self.entries[i].1)
    }

    /// Replaces in place so an existing key keeps its position.
    pub fn insert(&mut self, key: PropertyKey, prop: Property) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = prop,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, prop));
            }
        }
    }

    pub fn remove(&mut self, key: &PropertyKey) -> Option<Property> {
        let i = self.index.remove(key)?;
        let (_, prop) = self.entries.remove(i);
        for (k, _) in &self.entries[i..] {
            if let Some(slot) = self.index.get_mut(k) {
                *slot -= 1;
            }
        }
        Some(prop)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropertyKey, &Property)> {
        self.entries.iter().map(|(k, p)| (k, p))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Property> {
        self.entries.iter_mut().map(|(_, p)| p)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

pub struct JsObject {
    pub kind: ObjectKind,
    pub props: PropertyMap,
    pub proto: Option<ObjectRef>,
    pub extensible: bool,
    /// Array elements are read-only (`Object.freeze` on an array).
    pub frozen: bool,
}

/// Shared handle to a heap object. Equality is identity.
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<JsObject>>);

impl ObjectRef {
    pub fn new(kind: ObjectKind, proto: Option<ObjectRef>) -> Self {
        Self(Arc::new(RwLock::new(JsObject {
            kind,
            props: PropertyMap::default(),
            proto,
            extensible: true,
            frozen: false,
        })))
    }

    pub fn ordinary(proto: Option<ObjectRef>) -> Self {
        Self::new(ObjectKind::Ordinary, proto)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, JsObject> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, JsObject> {
        self.0.write()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Stable identity for visited sets and keyed collections.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn proto(&self) -> Option<ObjectRef> {
        self.read().proto.clone()
    }

    pub fn set_proto(&self, proto: Option<ObjectRef>) {
        self.write().proto = proto;
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.read().kind, ObjectKind::Function(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.read().kind, ObjectKind::Array(_))
    }

    pub fn callable(&self) -> Option<Callable> {
        match &self.read().kind {
            ObjectKind::Function(callable) => Some(callable.clone()),
            _ => None,
        }
    }

    pub fn is_constructor(&self) -> bool {
        match &self.read().kind {
            ObjectKind::Function(Callable::Closure(closure)) => {
                closure.class.is_some() || closure.def.is_constructor()
            }
            ObjectKind::Function(Callable::Native(native)) => native.constructor,
            ObjectKind::Function(Callable::Bound(bound)) => bound.target.is_constructor(),
            _ => false,
        }
    }

    pub fn class_name(&self) -> &'static str {
        match &self.read().kind {
            ObjectKind::Ordinary => "Object",
            ObjectKind::Array(_) => "Array",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Error => "Error",
            ObjectKind::Boxed(Value::Bool(_)) => "Boolean",
            ObjectKind::Boxed(Value::Number(_)) => "Number",
            ObjectKind::Boxed(Value::String(_)) => "String",
            ObjectKind::Boxed(_) => "Symbol",
            ObjectKind::Map(_) => "Map",
            ObjectKind::Set(_) => "Set",
            ObjectKind::RegExp(_) => "RegExp",
            ObjectKind::Date(_) => "Date",
            ObjectKind::Iterator(_) => "Iterator",
            ObjectKind::Promise(_) => "Promise",
        }
    }

    /// Own property lookup, including array elements and string indices.
    pub fn get_own_property(&self, key: &PropertyKey) -> Option<Property> {
        let obj = self.read();
        match &obj.kind {
            ObjectKind::Array(items) => {
                if let Some(idx) = key.array_index() {
                    return items.get(idx).map(|value| Property {
                        writable: !obj.frozen,
                        configurable: !obj.frozen,
                        ..Property::data(value.clone())
                    });
                }
                if key.as_str() == Some("length") {
                    return Some(Property {
                        slot: Slot::Data(Value::Number(items.len() as f64)),
                        enumerable: false,
                        writable: !obj.frozen,
                        configurable: false,
                    });
                }
            }
            ObjectKind::Boxed(Value::String(s)) => {
                if let Some(idx) = key.array_index() {
                    let ch = utf16_slice(s, idx, idx + 1);
                    if !ch.is_empty() {
                        return Some(Property::readonly(Value::string(ch)));
                    }
                }
                if key.as_str() == Some("length") {
                    return Some(Property::readonly(Value::Number(utf16_len(s) as f64)));
                }
            }
            _ => {}
        }
        obj.props.get(key).cloned()
    }

    /// Getter-free lookup along the prototype chain. Accessors read as absent.
    pub fn get(&self, key: impl Into<PropertyKey>) -> Option<Value> {
        let key = key.into();
        let mut current = Some(self.clone());
        while let Some(obj) = current {
            if let Some(prop) = obj.get_own_property(&key) {
                return prop.value().cloned();
            }
            current = obj.proto();
        }
        None
    }

    pub fn has_own(&self, key: &PropertyKey) -> bool {
        self.get_own_property(key).is_some()
    }

    /// Defines or replaces an own property.
    pub fn try_define(&self, key: PropertyKey, prop: Property) -> Result<(), InvalidArrayLength> {
        let mut obj = self.write();
        let frozen = obj.frozen;
        if let ObjectKind::Array(items) = &mut obj.kind {
            if let Some(idx) = key.array_index() {
                if frozen {
                    return Ok(());
                }
                if let Slot::Data(value) = prop.slot {
                    return set_element(items, idx, value);
                }
            } else if key.as_str() == Some("length") {
                if frozen {
                    return Ok(());
                }
                if let Slot::Data(value) = &prop.slot {
                    return set_length(items, value.to_number_primitive());
                }
            }
        }
        obj.props.insert(key, prop);
        Ok(())
    }

    /// Plain data write used by literals and builtin setup on non-array objects.
    pub fn insert(&self, key: impl Into<PropertyKey>, value: Value) {
        let _ = self.try_define(key.into(), Property::data(value));
    }

    /// Installs a non-enumerable member, the shape builtin methods take.
    pub fn insert_hidden(&self, key: impl Into<PropertyKey>, value: Value) {
        let _ = self.try_define(key.into(), Property::hidden(value));
    }

    /// `delete obj[key]`; `false` when the property is non-configurable.
    pub fn delete(&self, key: &PropertyKey) -> bool {
        let mut obj = self.write();
        let frozen = obj.frozen;
        if let ObjectKind::Array(items) = &mut obj.kind {
            if let Some(idx) = key.array_index() {
                if frozen {
                    return false;
                }
                if idx + 1 == items.len() {
                    items.pop();
                } else if let Some(slot) = items.get_mut(idx) {
                    *slot = Value::Undefined;
                }
                return true;
            }
            if key.as_str() == Some("length") {
                return false;
            }
        }
        match obj.props.get(key) {
            Some(prop) if !prop.configurable => false,
            Some(_) => {
                obj.props.remove(key);
                true
            }
            None => true,
        }
    }

    /// Own keys in property order: integer keys ascending, then strings in
    /// insertion order, then symbols.
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        let obj = self.read();
        let mut indices: Vec<(usize, PropertyKey)> = Vec::new();
        let mut strings = Vec::new();
        let mut symbols = Vec::new();
        match &obj.kind {
            ObjectKind::Array(items) => {
                indices.extend((0..items.len()).map(|i| (i, PropertyKey::from(i))));
                strings.push(PropertyKey::from("length"));
            }
            ObjectKind::Boxed(Value::String(s)) => {
                indices.extend((0..utf16_len(s)).map(|i| (i, PropertyKey::from(i))));
                strings.push(PropertyKey::from("length"));
            }
            _ => {}
        }
        for (key, _) in obj.props.iter() {
            match key {
                PropertyKey::Symbol(_) => symbols.push(key.clone()),
                PropertyKey::String(_) => match key.array_index() {
                    Some(i) => indices.push((i, key.clone())),
                    None => strings.push(key.clone()),
                },
            }
        }
        indices.sort_by_key(|(i, _)| *i);
        indices
            .into_iter()
            .map(|(_, key)| key)
            .chain(strings)
            .chain(symbols)
            .collect()
    }

    /// Enumerable own string keys, as `Object.keys` lists them.
    pub fn enumerable_keys(&self) -> Vec<JsStr> {
        self.own_keys()
            .into_iter()
            .filter_map(|key| match &key {
                PropertyKey::String(s) => self
                    .get_own_property(&key)
                    .filter(|prop| prop.enumerable)
                    .map(|_| s.clone()),
                PropertyKey::Symbol(_) => None,
            })
            .collect()
    }

    /// Walks the prototype chain for `proto`.
    pub fn inherits_from(&self, proto: &ObjectRef) -> bool {
        let mut current = self.proto();
        while let Some(obj) = current {
            if obj.ptr_eq(proto) {
                return true;
            }
            current = obj.proto();
        }
        false
    }

    /// A snapshot of the elements when this is an array.
    pub fn array_items(&self) -> Option<Vec<Value>> {
        match &self.read().kind {
            ObjectKind::Array(items) => Some(items.clone()),
            _ => None,
        }
    }

    pub fn array_len(&self) -> Option<usize> {
        match &self.read().kind {
            ObjectKind::Array(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Appends when this is an array; otherwise does nothing.
    pub fn push(&self, value: Value) -> Result<(), InvalidArrayLength> {
        let mut obj = self.write();
        if let ObjectKind::Array(items) = &mut obj.kind {
            if items.len() >= MAX_ARRAY_LENGTH {
                return Err(InvalidArrayLength);
            }
            items.push(value);
        }
        Ok(())
    }

    /// Drops every property, element and captured scope reachable from here
    /// so reference cycles between payload objects can be freed.
    pub fn dispose_graph(&self) {
        let mut seen = rustc_hash::FxHashSet::default();
        let mut stack = vec![self.clone()];
        let mut scopes = Vec::new();
        while let Some(obj) = stack.pop() {
            if !seen.insert(obj.id()) {
                continue;
            }
            let mut guard = obj.write();
            let inner = &mut *guard;
            for prop in inner.props.iter_mut() {
                collect_slot(&prop.slot, &mut stack);
            }
            inner.props.clear();
            if let Some(proto) = inner.proto.take() {
                stack.push(proto);
            }
            let kind = std::mem::replace(&mut inner.kind, ObjectKind::Ordinary);
            match kind {
                ObjectKind::Array(items) => collect_values(items, &mut stack),
                ObjectKind::Function(Callable::Closure(closure)) => {
                    if let Some(home) = closure.home_object {
                        stack.push(home);
                    }
                    scopes.push(closure.env);
                }
                ObjectKind::Function(Callable::Bound(bound)) => {
                    stack.push(bound.target);
                    collect_values(bound.args, &mut stack);
                    collect_values(vec![bound.this], &mut stack);
                }
                ObjectKind::Map(table) | ObjectKind::Set(table) => {
                    collect_values(table.into_values(), &mut stack)
                }
                ObjectKind::Iterator(state) => collect_values(state.into_values(), &mut stack),
                ObjectKind::Promise(state) => collect_values(state.into_values(), &mut stack),
                _ => {}
            }
            drop(guard);
            while let Some(env) = scopes.pop() {
                collect_values(env.drain(), &mut stack);
            }
        }
    }
}

fn collect_slot(slot: &Slot, stack: &mut Vec<ObjectRef>) {
    match slot {
        Slot::Data(Value::Object(obj)) => stack.push(obj.clone()),
        Slot::Data(_) => {}
        Slot::Accessor { get, set } => stack.extend(get.iter().chain(set.iter()).cloned()),
    }
}

fn collect_values(values: Vec<Value>, stack: &mut Vec<ObjectRef>) {
    stack.extend(values.into_iter().filter_map(|value| match value {
        Value::Object(obj) => Some(obj),
        _ => None,
    }));
}

/// Writes `items[idx]`, filling any gap with `undefined`.
pub fn set_element(items: &mut Vec<Value>, idx: usize, value: Value) -> Result<(), InvalidArrayLength> {
    if idx < items.len() {
        items[idx] = value;
        return Ok(());
    }
    if idx >= MAX_ARRAY_LENGTH {
        return Err(InvalidArrayLength);
    }
    items.resize(idx, Value::Undefined);
    items.push(value);
    Ok(())
}

/// Applies `arr.length = n`.
pub fn set_length(items: &mut Vec<Value>, n: f64) -> Result<(), InvalidArrayLength> {
    if n < 0.0 || n.fract() != 0.0 || n > MAX_ARRAY_LENGTH as f64 {
        return Err(InvalidArrayLength);
    }
    items.resize(n as usize, Value::Undefined);
    Ok(())
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[object {}]", self.class_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(items: Vec<Value>) -> ObjectRef {
        ObjectRef::new(ObjectKind::Array(items), None)
    }

    #[test]
    fn keys_list_integers_first_then_insertion_order() {
        let obj = ObjectRef::ordinary(None);
        obj.insert("b", Value::Null);
        obj.insert("2", Value::Null);
        obj.insert("a", Value::Null);
        obj.insert("1", Value::Null);
        let keys: Vec<String> = obj.own_keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["1", "2", "b", "a"]);
    }

    #[test]
    fn removing_a_key_keeps_the_rest_in_order() {
        let mut map = PropertyMap::default();
        for key in ["a", "b", "c"] {
            map.insert(key.into(), Property::data(Value::Null));
        }
        map.remove(&"a".into());
        map.insert("d".into(), Property::data(Value::Null));
        let keys: Vec<String> = map.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["b", "c", "d"]);
        assert!(map.get(&"c".into()).is_some());
    }

    #[test]
    fn far_array_writes_are_refused_instead_of_allocated() {
        let arr = array(Vec::new());
        let result = arr.try_define(PropertyKey::from("4294967294"), Property::data(Value::Null));
        assert_eq!(result, Err(InvalidArrayLength));
        assert_eq!(arr.array_len(), Some(0));
        assert!(!arr.has_own(&"4294967294".into()));

        let mut items = Vec::new();
        assert_eq!(set_length(&mut items, 4294967295.0), Err(InvalidArrayLength));
        assert!(set_element(&mut items, MAX_ARRAY_LENGTH - 1, Value::Null).is_ok());
        assert_eq!(items.len(), MAX_ARRAY_LENGTH);
    }

    #[test]
    fn array_writes_fill_gaps_and_length_truncates() {
        let arr = array(vec![Value::Number(1.0)]);
        arr.insert(3usize, Value::Number(4.0));
        assert_eq!(arr.array_len(), Some(4));
        assert!(matches!(arr.get(2), Some(Value::Undefined)));
        arr.insert("length", Value::Number(1.0));
        assert_eq!(arr.array_len(), Some(1));
    }

    #[test]
    fn getter_free_lookup_walks_the_prototype_chain() {
        let proto = ObjectRef::ordinary(None);
        proto.insert("shared", Value::Bool(true));
        let obj = ObjectRef::ordinary(Some(proto.clone()));
        assert!(matches!(obj.get("shared"), Some(Value::Bool(true))));
        assert!(obj.inherits_from(&proto));
        assert!(!obj.has_own(&"shared".into()));
    }

    #[test]
    fn dispose_breaks_cycles() {
        let a = ObjectRef::ordinary(None);
        let b = ObjectRef::ordinary(Some(a.clone()));
        a.insert("b", Value::Object(b.clone()));
        b.insert("a", Value::Object(a.clone()));
        a.dispose_graph();
        assert!(a.own_keys().is_empty());
        assert!(b.own_keys().is_empty());
        assert!(b.proto().is_none());
    }
}
