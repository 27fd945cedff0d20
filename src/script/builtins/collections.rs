//! `Map`, `Set`, `WeakMap` and `WeakSet` over an insertion-ordered table.
//!
//! Deleted entries leave a tombstone so live iterators keep their position;
//! keys compare with SameValueZero.

use super::iterator::{IterKind, IteratorState, make_iterator};
use super::{arg, callback, constructor, function, getter, method, this_object};
use crate::script::interpreter::{Control, Interpreter};
use crate::script::object::{NativeFn, ObjectKind, ObjectRef, Property};
use crate::script::realm::Realm;
use crate::script::value::{JsStr, PropertyKey, Symbol, Value};
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Clone, PartialEq, Eq, Hash)]
enum MapKey {
    Undefined,
    Null,
    Bool(bool),
    /// Bit pattern with every NaN folded together and `-0` folded into `+0`.
    Number(u64),
    String(JsStr),
    Symbol(Symbol),
    Object(usize),
}

impl MapKey {
    fn of(value: &Value) -> Self {
        match value {
            Value::Undefined => Self::Undefined,
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) if n.is_nan() => Self::Number(f64::NAN.to_bits()),
            Value::Number(n) if *n == 0.0 => Self::Number(0),
            Value::Number(n) => Self::Number(n.to_bits()),
            Value::String(s) => Self::String(s.clone()),
            Value::Symbol(sym) => Self::Symbol(sym.clone()),
            Value::Object(obj) => Self::Object(obj.id()),
        }
    }
}

#[derive(Default)]
pub struct KeyedTable {
    entries: Vec<Option<(Value, Value)>>,
    index: FxHashMap<MapKey, usize>,
    live: usize,
}

impl KeyedTable {
    pub fn get(&self, key: &Value) -> Option<Value> {
        let i = *self.index.get(&MapKey::of(key))?;
        self.entries[i].as_ref().map(|(_, value)| value.clone())
    }

    pub fn has(&self, key: &Value) -> bool {
        self.index.contains_key(&MapKey::of(key))
    }

    pub fn set(&mut self, key: Value, value: Value) {
        let map_key = MapKey::of(&key);
        if let Some(&i) = self.index.get(&map_key)
            && let Some(entry) = &mut self.entries[i]
        {
            entry.1 = value;
            return;
        }
        let key = match key {
            Value::Number(n) if n == 0.0 => Value::Number(0.0),
            other => other,
        };
        self.index.insert(map_key, self.entries.len());
        self.entries.push(Some((key, value)));
        self.live += 1;
    }

    pub fn remove(&mut self, key: &Value) -> bool {
        match self.index.remove(&MapKey::of(key)) {
            Some(i) => {
                self.entries[i] = None;
                self.live -= 1;
                true
            }
            None => false,
        }
    }

    /// Tombstones every entry so running iterators finish.
    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|entry| *entry = None);
        self.index.clear();
        self.live = 0;
    }

    pub fn size(&self) -> usize {
        self.live
    }

    /// The first live entry at or after `from`, with its position.
    pub fn next_entry(&self, from: usize) -> Option<(usize, Value, Value)> {
        self.entries
            .iter()
            .enumerate()
            .skip(from)
            .find_map(|(i, entry)| entry.as_ref().map(|(k, v)| (i, k.clone(), v.clone())))
    }

    pub fn into_values(self) -> Vec<Value> {
        self.entries
            .into_iter()
            .flatten()
            .flat_map(|(key, value)| [key, value])
            .collect()
    }
}

#[derive(Clone, Copy)]
enum Flavor {
    Map,
    Set,
    WeakMap,
    WeakSet,
}

impl Flavor {
    fn name(self) -> &'static str {
        match self {
            Flavor::Map => "Map",
            Flavor::Set => "Set",
            Flavor::WeakMap => "WeakMap",
            Flavor::WeakSet => "WeakSet",
        }
    }

    fn keyed(self) -> bool {
        matches!(self, Flavor::Map | Flavor::WeakMap)
    }

    fn weak(self) -> bool {
        matches!(self, Flavor::WeakMap | Flavor::WeakSet)
    }
}

pub fn install(realm: &Arc<Realm>) {
    let map = &realm.intrinsics.map_prototype;
    install_constructor(realm, map, Flavor::Map);
    method(realm, map, "get", 1, |interp, this, args| {
        let map = this_map(interp, this, "Map.prototype.get")?;
        Ok(with_table(&map, |table| table.get(&arg(args, 0))).unwrap_or_default())
    });
    method(realm, map, "set", 2, |interp, this, args| {
        let map = this_map(interp, this, "Map.prototype.set")?;
        with_table(&map, |table| table.set(arg(args, 0), arg(args, 1)));
        Ok(this.clone())
    });
    method(realm, map, "has", 1, |interp, this, args| {
        let map = this_map(interp, this, "Map.prototype.has")?;
        Ok(Value::Bool(with_table(&map, |table| table.has(&arg(args, 0)))))
    });
    method(realm, map, "delete", 1, |interp, this, args| {
        let map = this_map(interp, this, "Map.prototype.delete")?;
        Ok(Value::Bool(with_table(&map, |table| table.remove(&arg(args, 0)))))
    });
    method(realm, map, "clear", 0, |interp, this, _| {
        let map = this_map(interp, this, "Map.prototype.clear")?;
        with_table(&map, KeyedTable::clear);
        Ok(Value::Undefined)
    });
    getter(realm, map, "size", |interp, this, _| {
        let map = this_map(interp, this, "get Map.prototype.size")?;
        Ok(Value::Number(with_table(&map, |table| table.size()) as f64))
    });
    method(realm, map, "forEach", 1, |interp, this, args| {
        let map = this_map(interp, this, "Map.prototype.forEach")?;
        for_each(interp, &map, args, false)
    });
    method(realm, map, "keys", 0, |interp, this, _| map_iterator(interp, this, IterKind::Keys));
    method(realm, map, "values", 0, |interp, this, _| map_iterator(interp, this, IterKind::Values));
    let entries = function(realm, "entries", 0, |interp, this, _| map_iterator(interp, this, IterKind::Entries));
    map.insert_hidden("entries", entries.clone());
    map.insert_hidden(PropertyKey::Symbol(realm.symbols.iterator.clone()), entries);

    let set = &realm.intrinsics.set_prototype;
    install_constructor(realm, set, Flavor::Set);
    method(realm, set, "add", 1, |interp, this, args| {
        let set = this_set(interp, this, "Set.prototype.add")?;
        let value = arg(args, 0);
        with_table(&set, |table| {
            if !table.has(&value) {
                table.set(value, Value::Undefined);
            }
        });
        Ok(this.clone())
    });
    method(realm, set, "has", 1, |interp, this, args| {
        let set = this_set(interp, this, "Set.prototype.has")?;
        Ok(Value::Bool(with_table(&set, |table| table.has(&arg(args, 0)))))
    });
    method(realm, set, "delete", 1, |interp, this, args| {
        let set = this_set(interp, this, "Set.prototype.delete")?;
        Ok(Value::Bool(with_table(&set, |table| table.remove(&arg(args, 0)))))
    });
    method(realm, set, "clear", 0, |interp, this, _| {
        let set = this_set(interp, this, "Set.prototype.clear")?;
        with_table(&set, KeyedTable::clear);
        Ok(Value::Undefined)
    });
    getter(realm, set, "size", |interp, this, _| {
        let set = this_set(interp, this, "get Set.prototype.size")?;
        Ok(Value::Number(with_table(&set, |table| table.size()) as f64))
    });
    method(realm, set, "forEach", 1, |interp, this, args| {
        let set = this_set(interp, this, "Set.prototype.forEach")?;
        for_each(interp, &set, args, true)
    });
    method(realm, set, "entries", 0, |interp, this, _| set_iterator(interp, this, IterKind::Entries));
    let values = function(realm, "values", 0, |interp, this, _| set_iterator(interp, this, IterKind::Values));
    set.insert_hidden("values", values.clone());
    set.insert_hidden("keys", values.clone());
    set.insert_hidden(PropertyKey::Symbol(realm.symbols.iterator.clone()), values);

    let weak_map = realm.object();
    install_constructor(realm, &weak_map, Flavor::WeakMap);
    method(realm, &weak_map, "get", 1, |interp, this, args| {
        let map = this_map(interp, this, "WeakMap.prototype.get")?;
        Ok(with_table(&map, |table| table.get(&arg(args, 0))).unwrap_or_default())
    });
    method(realm, &weak_map, "set", 2, |interp, this, args| {
        let map = this_map(interp, this, "WeakMap.prototype.set")?;
        let key = weak_key(interp, &arg(args, 0), "Invalid value used as weak map key")?;
        with_table(&map, |table| table.set(key, arg(args, 1)));
        Ok(this.clone())
    });
    method(realm, &weak_map, "has", 1, |interp, this, args| {
        let map = this_map(interp, this, "WeakMap.prototype.has")?;
        Ok(Value::Bool(with_table(&map, |table| table.has(&arg(args, 0)))))
    });
    method(realm, &weak_map, "delete", 1, |interp, this, args| {
        let map = this_map(interp, this, "WeakMap.prototype.delete")?;
        Ok(Value::Bool(with_table(&map, |table| table.remove(&arg(args, 0)))))
    });

    let weak_set = realm.object();
    install_constructor(realm, &weak_set, Flavor::WeakSet);
    method(realm, &weak_set, "add", 1, |interp, this, args| {
        let set = this_set(interp, this, "WeakSet.prototype.add")?;
        let value = weak_key(interp, &arg(args, 0), "Invalid value used in weak set")?;
        with_table(&set, |table| {
            if !table.has(&value) {
                table.set(value, Value::Undefined);
            }
        });
        Ok(this.clone())
    });
    method(realm, &weak_set, "has", 1, |interp, this, args| {
        let set = this_set(interp, this, "WeakSet.prototype.has")?;
        Ok(Value::Bool(with_table(&set, |table| table.has(&arg(args, 0)))))
    });
    method(realm, &weak_set, "delete", 1, |interp, this, args| {
        let set = this_set(interp, this, "WeakSet.prototype.delete")?;
        Ok(Value::Bool(with_table(&set, |table| table.remove(&arg(args, 0)))))
    });
}

fn install_constructor(realm: &Arc<Realm>, proto: &ObjectRef, flavor: Flavor) {
    let fallback = proto.clone();
    let construct: NativeFn = Arc::new(move |interp, _, args, new_target| {
        let Some(new_target) = new_target else {
            return Err(interp.type_error(format!("Constructor {} requires 'new'", flavor.name())));
        };
        let proto = interp.prototype_for(new_target, fallback.clone())?;
        let kind = if flavor.keyed() {
            ObjectKind::Map(KeyedTable::default())
        } else {
            ObjectKind::Set(KeyedTable::default())
        };
        let obj = ObjectRef::new(kind, Some(proto));
        let source = arg(args, 0);
        if !source.is_nullish() {
            for item in interp.iterate_to_vec(&source)? {
                let (key, value) = if flavor.keyed() {
                    if !matches!(item, Value::Object(_)) {
                        return Err(interp.type_error(format!(
                            "Iterator value {} is not an entry object",
                            interp.short_description(&item)
                        )));
                    }
                    let key = interp.get_value(&item, &PropertyKey::from(0usize))?;
                    let value = interp.get_value(&item, &PropertyKey::from(1usize))?;
                    (key, value)
                } else {
                    (item, Value::Undefined)
                };
                let key = if flavor.weak() {
                    weak_key(interp, &key, "Invalid value used as weak key")?
                } else {
                    key
                };
                with_table(&obj, |table| {
                    if flavor.keyed() || !table.has(&key) {
                        table.set(key, value);
                    }
                });
            }
        }
        Ok(Value::Object(obj))
    });
    constructor(realm, flavor.name(), 0, proto, construct);
    let _ = proto.try_define(
        PropertyKey::Symbol(realm.symbols.to_string_tag.clone()),
        Property::meta(Value::string(flavor.name())),
    );
}

fn with_table<R>(obj: &ObjectRef, f: impl FnOnce(&mut KeyedTable) -> R) -> R {
    match &mut obj.write().kind {
        ObjectKind::Map(table) | ObjectKind::Set(table) => f(table),
        _ => f(&mut KeyedTable::default()),
    }
}

fn this_map(interp: &Interpreter, this: &Value, method: &str) -> Result<ObjectRef, Control> {
    this_object(interp, this, method, |kind| matches!(kind, ObjectKind::Map(_)))
}

fn this_set(interp: &Interpreter, this: &Value, method: &str) -> Result<ObjectRef, Control> {
    this_object(interp, this, method, |kind| matches!(kind, ObjectKind::Set(_)))
}

fn weak_key(interp: &Interpreter, key: &Value, message: &str) -> Result<Value, Control> {
    match key {
        Value::Object(_) | Value::Symbol(_) => Ok(key.clone()),
        _ => Err(interp.type_error(message)),
    }
}

/// Visits entries live: ones added by the callback are visited, deleted ones skipped.
fn for_each(interp: &mut Interpreter, target: &ObjectRef, args: &[Value], set: bool) -> Result<Value, Control> {
    let cb = callback(interp, args, 0)?;
    let this_arg = arg(args, 1);
    let receiver = Value::Object(target.clone());
    let mut position = 0;
    while let Some((i, key, value)) = with_table(target, |table| table.next_entry(position)) {
        position = i + 1;
        let value = if set { key.clone() } else { value };
        interp.call_function(&cb, &this_arg, &[value, key, receiver.clone()])?;
    }
    Ok(Value::Undefined)
}

fn map_iterator(interp: &mut Interpreter, this: &Value, kind: IterKind) -> Result<Value, Control> {
    let target = this_map(interp, this, "Map.prototype.entries")?;
    Ok(make_iterator(interp, IteratorState::Map { target, index: 0, kind }))
}

fn set_iterator(interp: &mut Interpreter, this: &Value, kind: IterKind) -> Result<Value, Control> {
    let target = this_set(interp, this, "Set.prototype.values")?;
    Ok(make_iterator(interp, IteratorState::Set { target, index: 0, kind }))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{eval_error, eval_string};
    use super::*;

    #[test]
    fn keys_compare_with_same_value_zero() {
        let mut table = KeyedTable::default();
        table.set(Value::Number(f64::NAN), Value::string("nan"));
        table.set(Value::Number(-0.0), Value::string("zero"));
        assert!(matches!(table.get(&Value::Number(f64::NAN)), Some(Value::String(s)) if &*s == "nan"));
        assert!(table.has(&Value::Number(0.0)));
        assert!(!table.has(&Value::string("0")));
        assert_eq!(table.size(), 2);
    }

    #[test]
    fn tombstones_keep_iteration_positions() {
        let mut table = KeyedTable::default();
        for key in ["a", "b", "c"] {
            table.set(Value::string(key), Value::Null);
        }
        assert!(table.remove(&Value::string("b")));
        let (position, key, _) = table.next_entry(1).unwrap();
        assert_eq!(position, 2);
        assert!(matches!(key, Value::String(s) if &*s == "c"));
        table.clear();
        assert!(table.next_entry(0).is_none());
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn maps_keep_insertion_order_and_object_identity() {
        let value = eval_string(
            "var k = {}, m = new Map([['a', 1], [k, 2]]);
             m.set('b', 3).delete('a'); m.set('a', 4);
             return [[...m.keys()].map(x => typeof x).join(), m.get(k), m.get({}), m.size, m.has(k),
                     JSON.stringify([...m.values()]), String(m)].join('|')",
        );
        assert_eq!(value, "object,string,string|2||3|true|[2,3,4]|[object Map]");
    }

    #[test]
    fn for_each_visits_entries_added_during_iteration() {
        let value = eval_string(
            "var m = new Map([[1, 'a']]), seen = [];
             m.forEach(function (v, k, map) { seen.push(k + v); if (k < 3) map.set(k + 1, v + v); });
             return seen.join()",
        );
        assert_eq!(value, "1a,2aa,3aaaa");
    }

    #[test]
    fn sets_deduplicate_and_iterate_values() {
        let value = eval_string(
            "var s = new Set([1, 2, 2, NaN, NaN]); s.add(1).add(3);
             var pairs = []; s.forEach((v, k) => pairs.push(v === k));
             return [[...s].join(), s.size, s.has(NaN), pairs.every(Boolean), JSON.stringify([...s.entries()][0])].join('|')",
        );
        assert_eq!(value, "1,2,NaN,3|4|true|true|[1,1]");
    }

    #[test]
    fn weak_collections_require_object_keys() {
        let value = eval_string(
            "var key = {}, wm = new WeakMap(), ws = new WeakSet([key]);
             wm.set(key, 'v');
             return [wm.get(key), wm.has({}), ws.has(key), ws.delete(key), ws.has(key)].join()",
        );
        assert_eq!(value, "v,false,true,true,false");
        assert_eq!(
            eval_error("new WeakMap().set('k', 1)"),
            "TypeError: Invalid value used as weak map key"
        );
        assert_eq!(eval_error("Map()"), "TypeError: Constructor Map requires 'new'");
    }
}
