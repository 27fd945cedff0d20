use super::{Control, Interpreter};
use crate::script::object::{ObjectRef, Property, Slot};
use crate::script::value::{JsStr, PropertyKey, Value, utf16_len, utf16_slice};
use rustc_hash::FxHashSet;

/// An iterator obtained through `Symbol.iterator`.
pub struct IteratorRecord {
    pub iterator: Value,
    next: Value,
    pub done: bool,
}

impl Interpreter {
    /// The prototype property reads on a primitive go through.
    pub fn primitive_prototype(&self, value: &Value) -> Option<ObjectRef> {
        let intrinsics = &self.realm.intrinsics;
        let proto = match value {
            Value::String(_) => &intrinsics.string_prototype,
            Value::Number(_) => &intrinsics.number_prototype,
            Value::Bool(_) => &intrinsics.boolean_prototype,
            Value::Symbol(_) => &intrinsics.symbol_prototype,
            _ => return None,
        };
        Some(proto.clone())
    }

    /// `base[key]`, running getters with `base` as the receiver.
    pub fn get_value(&mut self, base: &Value, key: &PropertyKey) -> Result<Value, Control> {
        match base {
            Value::Object(obj) => self.get_from(obj, key, base),
            Value::Undefined | Value::Null => Err(self.type_error(format!(
                "Cannot read properties of {} (reading '{key}')",
                if matches!(base, Value::Null) { "null" } else { "undefined" }
            ))),
            primitive => {
                if let Value::String(s) = primitive {
                    if let Some(idx) = key.array_index() {
                        let unit = utf16_slice(s, idx, idx + 1);
                        if !unit.is_empty() {
                            return Ok(Value::string(unit));
                        }
                    } else if key.as_str() == Some("length") {
                        return Ok(Value::Number(utf16_len(s) as f64));
                    }
                }
                match self.primitive_prototype(primitive) {
                    Some(proto) => self.get_from(&proto, key, base),
                    None => Ok(Value::Undefined),
                }
            }
        }
    }

    /// `[[Get]]` on `obj` with `receiver` as `this` for getters.
    pub fn get_from(
        &mut self,
        obj: &ObjectRef,
        key: &PropertyKey,
        receiver: &Value,
    ) -> Result<Value, Control> {
        let mut current = Some(obj.clone());
        while let Some(target) = current {
            if let Some(prop) = target.get_own_property(key) {
                return match prop.slot {
                    Slot::Data(value) => Ok(value),
                    Slot::Accessor {
                        get: Some(getter), ..
                    } => self.call_function(&Value::Object(getter), receiver, &[]),
                    Slot::Accessor { get: None, .. } => Ok(Value::Undefined),
                };
            }
            current = target.proto();
        }
        Ok(Value::Undefined)
    }

    /// `base[key] = value`.
    pub fn set_value(&mut self, base: &Value, key: PropertyKey, value: Value) -> Result<(), Control> {
        match base {
            Value::Object(obj) => self.set_on(obj, key, value, base),
            Value::Undefined | Value::Null => Err(self.type_error(format!(
                "Cannot set properties of {} (setting '{key}')",
                if matches!(base, Value::Null) { "null" } else { "undefined" }
            ))),
            primitive => match self.primitive_prototype(primitive) {
                Some(proto) => self.set_on(&proto, key, value, base),
                None => Ok(()),
            },
        }
    }

    /// `[[Set]]`: setters along the chain win; otherwise writes an own data
    /// property on `receiver`.
    pub fn set_on(
        &mut self,
        obj: &ObjectRef,
        key: PropertyKey,
        value: Value,
        receiver: &Value,
    ) -> Result<(), Control> {
        let mut current = Some(obj.clone());
        while let Some(target) = current {
            if let Some(prop) = target.get_own_property(&key) {
                match prop.slot {
                    Slot::Accessor {
                        set: Some(setter), ..
                    } => {
                        self.call_function(&Value::Object(setter), receiver, &[value])?;
                        return Ok(());
                    }
                    Slot::Accessor { set: None, .. } => {
                        return self.fail_write(format!(
                            "Cannot set property {key} of #<Object> which has only a getter"
                        ));
                    }
                    Slot::Data(_) if !prop.writable => {
                        return self.fail_write(format!(
                            "Cannot assign to read only property '{key}' of object"
                        ));
                    }
                    Slot::Data(_) => break,
                }
            }
            current = target.proto();
        }
        let Value::Object(receiver) = receiver else {
            return self.fail_write(format!("Cannot create property '{key}' on a primitive"));
        };
        if let Some(existing) = receiver.get_own_property(&key) {
            let prop = match existing.slot {
                Slot::Data(_) if existing.writable => Property {
                    slot: Slot::Data(value),
                    ..existing
                },
                _ => {
                    return self
                        .fail_write(format!("Cannot assign to read only property '{key}' of object"));
                }
            };
            return self.define(receiver, key, prop);
        }
        if !receiver.read().extensible {
            return self.fail_write(format!("Cannot add property {key}, object is not extensible"));
        }
        self.define(receiver, key, Property::data(value))
    }

    /// Rejected writes are silent in sloppy code and throw in strict code.
    fn fail_write(&self, message: String) -> Result<(), Control> {
        if self.strict {
            Err(self.type_error(message))
        } else {
            Ok(())
        }
    }

    pub fn has_property(&self, obj: &ObjectRef, key: &PropertyKey) -> bool {
        let mut current = Some(obj.clone());
        while let Some(target) = current {
            if target.has_own(key) {
                return true;
            }
            current = target.proto();
        }
        false
    }

    /// `delete base[key]`.
    pub fn delete_property(&mut self, base: &Value, key: &PropertyKey) -> Result<bool, Control> {
        match base {
            Value::Object(obj) => {
                let deleted = obj.delete(key);
                if !deleted && self.strict {
                    return Err(self.type_error(format!("Cannot delete property '{key}' of #<Object>")));
                }
                Ok(deleted)
            }
            Value::Undefined | Value::Null => Err(self.type_error(format!(
                "Cannot convert undefined or null to object (deleting '{key}')"
            ))),
            _ => Ok(true),
        }
    }

    /// Copies own enumerable properties of `source` onto `target`, skipping `excluded`.
    pub fn copy_data_properties(
        &mut self,
        target: &ObjectRef,
        source: &Value,
        excluded: &[PropertyKey],
    ) -> Result<(), Control> {
        let source_obj = match source {
            Value::Undefined | Value::Null => return Ok(()),
            Value::Object(obj) => obj.clone(),
            Value::String(_) => self.to_object(source)?,
            _ => return Ok(()),
        };
        for key in source_obj.own_keys() {
            if excluded.contains(&key) {
                continue;
            }
            let enumerable = source_obj
                .get_own_property(&key)
                .is_some_and(|prop| prop.enumerable);
            if enumerable {
                let value = self.get_from(&source_obj, &key, source)?;
                self.define(target, key, Property::data(value))?;
            }
        }
        Ok(())
    }

    /// Defines a getter and/or setter, merging with an existing accessor pair.
    pub fn define_accessor(
        &mut self,
        target: &ObjectRef,
        key: PropertyKey,
        get: Option<ObjectRef>,
        set: Option<ObjectRef>,
        enumerable: bool,
    ) -> Result<(), Control> {
        let (mut getter, mut setter) = match target.get_own_property(&key).map(|prop| prop.slot) {
            Some(Slot::Accessor { get, set }) => (get, set),
            _ => (None, None),
        };
        if get.is_some() {
            getter = get;
        }
        if set.is_some() {
            setter = set;
        }
        self.define(
            target,
            key,
            Property {
                slot: Slot::Accessor {
                    get: getter,
                    set: setter,
                },
                enumerable,
                writable: true,
                configurable: true,
            },
        )
    }

    /// Keys a `for…in` loop visits: enumerable string keys along the
    /// prototype chain, each name once.
    pub(super) fn for_in_keys(&self, value: &Value) -> Vec<JsStr> {
        match value {
            Value::String(s) => (0..utf16_len(s)).map(|i| i.to_string().into()).collect(),
            Value::Object(obj) => {
                let mut seen = FxHashSet::default();
                let mut keys = Vec::new();
                let mut current = Some(obj.clone());
                while let Some(target) = current {
                    for key in target.own_keys() {
                        let PropertyKey::String(name) = &key else {
                            continue;
                        };
                        if !seen.insert(name.clone()) {
                            continue;
                        }
                        if target.get_own_property(&key).is_some_and(|prop| prop.enumerable) {
                            keys.push(name.clone());
                        }
                    }
                    current = target.proto();
                }
                keys
            }
            _ => Vec::new(),
        }
    }

    pub fn get_iterator(&mut self, iterable: &Value) -> Result<IteratorRecord, Control> {
        if iterable.is_nullish() {
            return Err(self.type_error(format!(
                "{} is not iterable",
                self.short_description(iterable)
            )));
        }
        let key = PropertyKey::Symbol(self.realm.symbols.iterator.clone());
        let method = self.get_value(iterable, &key)?;
        if !method.is_callable() {
            return Err(self.type_error(format!(
                "{} is not iterable",
                self.short_description(iterable)
            )));
        }
        let iterator = self.call_function(&method, iterable, &[])?;
        if !matches!(iterator, Value::Object(_)) {
            return Err(self.type_error("Result of the Symbol.iterator method is not an object"));
        }
        let next = self.get_value(&iterator, &"next".into())?;
        Ok(IteratorRecord {
            iterator,
            next,
            done: false,
        })
    }

    /// The next value, or `None` once the iterator reports `done`.
    pub fn iterator_step(&mut self, record: &mut IteratorRecord) -> Result<Option<Value>, Control> {
        if record.done {
            return Ok(None);
        }
        let result = match self.call_function(&record.next, &record.iterator, &[]) {
            Ok(result) => result,
            Err(err) => {
                record.done = true;
                return Err(err);
            }
        };
        if !matches!(result, Value::Object(_)) {
            record.done = true;
            return Err(self.type_error(format!(
                "Iterator result {} is not an object",
                self.short_description(&result)
            )));
        }
        if self.get_value(&result, &"done".into())?.is_truthy() {
            record.done = true;
            return Ok(None);
        }
        self.get_value(&result, &"value".into()).map(Some)
    }

    /// Calls `return()` on an iterator that was left before it finished.
    pub fn iterator_close(&mut self, record: &IteratorRecord) -> Result<(), Control> {
        if record.done {
            return Ok(());
        }
        let ret = self.get_value(&record.iterator, &"return".into())?;
        if ret.is_callable() {
            self.call_function(&ret, &record.iterator, &[])?;
        }
        Ok(())
    }

    /// Closes the iterator after an abrupt `result`, keeping the original error.
    pub fn close_on_error<T>(
        &mut self,
        record: &IteratorRecord,
        result: Result<T, Control>,
    ) -> Result<T, Control> {
        match result {
            Err(Control::Throw(thrown)) => {
                let _ = self.iterator_close(record);
                Err(Control::Throw(thrown))
            }
            other => other,
        }
    }

    /// Drains an iterable into a vector.
    pub fn iterate_to_vec(&mut self, iterable: &Value) -> Result<Vec<Value>, Control> {
        let mut record = self.get_iterator(iterable)?;
        let mut out = Vec::new();
        while let Some(value) = self.iterator_step(&mut record)? {
            self.tick()?;
            out.push(value);
        }
        Ok(out)
    }

    /// Reads `length` and the indexed elements of an array-like.
    pub fn array_like_to_vec(&mut self, value: &Value) -> Result<Vec<Value>, Control> {
        if let Value::Object(obj) = value
            && let Some(items) = obj.array_items()
        {
            return Ok(items);
        }
        if value.is_nullish() {
            return Ok(Vec::new());
        }
        let length = self.get_value(value, &"length".into())?;
        let length = self.to_integer(&length)?.clamp(0.0, crate::script::object::MAX_ARRAY_LENGTH as f64) as usize;
        let mut out = Vec::with_capacity(length);
        for index in 0..length {
            out.push(self.get_value(value, &PropertyKey::from(index))?);
        }
        Ok(out)
    }
}
