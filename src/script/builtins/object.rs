use super::{arg, constructor, getter, method};
use crate::script::interpreter::{Control, Interpreter};
use crate::script::object::{ObjectKind, ObjectRef, Property, Slot};
use crate::script::realm::Realm;
use crate::script::value::{PropertyKey, Value};
use std::sync::Arc;

pub fn install(realm: &Arc<Realm>) {
    let proto = &realm.intrinsics.object_prototype;
    let ctor = constructor(
        realm,
        "Object",
        1,
        proto,
        Arc::new(|interp, _, args, _| match arg(args, 0) {
            Value::Undefined | Value::Null => Ok(Value::Object(interp.realm().object())),
            value => interp.to_object(&value).map(Value::Object),
        }),
    );
    method(realm, &ctor, "keys", 1, keys);
    method(realm, &ctor, "values", 1, values);
    method(realm, &ctor, "entries", 1, entries);
    method(realm, &ctor, "assign", 2, assign);
    method(realm, &ctor, "freeze", 1, freeze);
    method(realm, &ctor, "isFrozen", 1, is_frozen);
    method(realm, &ctor, "seal", 1, seal);
    method(realm, &ctor, "isSealed", 1, is_frozen);
    method(realm, &ctor, "preventExtensions", 1, prevent_extensions);
    method(realm, &ctor, "isExtensible", 1, is_extensible);
    method(realm, &ctor, "create", 2, create);
    method(realm, &ctor, "getPrototypeOf", 1, get_prototype_of);
    method(realm, &ctor, "setPrototypeOf", 2, set_prototype_of);
    method(realm, &ctor, "defineProperty", 3, define_property);
    method(realm, &ctor, "defineProperties", 2, define_properties);
    method(realm, &ctor, "getOwnPropertyNames", 1, get_own_property_names);
    method(realm, &ctor, "getOwnPropertySymbols", 1, get_own_property_symbols);
    method(realm, &ctor, "getOwnPropertyDescriptor", 2, get_own_property_descriptor);
    method(realm, &ctor, "getOwnPropertyDescriptors", 1, get_own_property_descriptors);
    method(realm, &ctor, "fromEntries", 1, from_entries);
    method(realm, &ctor, "is", 2, |_, _, args| {
        Ok(Value::Bool(arg(args, 0).same_value(&arg(args, 1))))
    });

    method(realm, proto, "hasOwnProperty", 1, has_own_property);
    method(realm, proto, "isPrototypeOf", 1, is_prototype_of);
    method(realm, proto, "propertyIsEnumerable", 1, property_is_enumerable);
    method(realm, proto, "toString", 0, to_string);
    method(realm, proto, "toLocaleString", 0, to_string);
    method(realm, proto, "valueOf", 0, |interp, this, _| {
        interp.to_object(this).map(Value::Object)
    });
    getter(realm, proto, "__proto__", |interp, this, _| {
        let obj = interp.to_object(this)?;
        Ok(obj.proto().map_or(Value::Null, Value::Object))
    });
    if let Some(Slot::Accessor { get, .. }) = proto.get_own_property(&"__proto__".into()).map(|p| p.slot) {
        let set = super::function(realm, "set __proto__", 1, |_, this, args| {
            if let Value::Object(obj) = this {
                match arg(args, 0) {
                    Value::Object(proto) => obj.set_proto(Some(proto)),
                    Value::Null => obj.set_proto(None),
                    _ => {}
                }
            }
            Ok(Value::Undefined)
        });
        let _ = proto.try_define(
            "__proto__".into(),
            Property {
                slot: Slot::Accessor {
                    get,
                    set: set.as_object().cloned(),
                },
                enumerable: false,
                writable: true,
                configurable: true,
            },
        );
    }
}

fn target_object(interp: &mut Interpreter, args: &[Value]) -> Result<ObjectRef, Control> {
    interp.to_object(&arg(args, 0))
}

/// Enumerable own string keys with their current values.
fn enumerable_entries(interp: &mut Interpreter, value: &Value) -> Result<Vec<(PropertyKey, Value)>, Control> {
    let obj = interp.to_object(value)?;
    let mut out = Vec::new();
    for name in obj.enumerable_keys() {
        let key = PropertyKey::String(name);
        let item = interp.get_from(&obj, &key, value)?;
        out.push((key, item));
    }
    Ok(out)
}

fn keys(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let obj = target_object(interp, args)?;
    let keys = obj.enumerable_keys().into_iter().map(Value::String).collect();
    Ok(interp.array(keys))
}

fn values(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let entries = enumerable_entries(interp, &arg(args, 0))?;
    Ok(interp.array(entries.into_iter().map(|(_, value)| value).collect()))
}

fn entries(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let entries = enumerable_entries(interp, &arg(args, 0))?;
    let pairs = entries
        .into_iter()
        .map(|(key, value)| interp.array(vec![key.to_value(), value]))
        .collect();
    Ok(interp.array(pairs))
}

fn assign(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let target = target_object(interp, args)?;
    let target_value = Value::Object(target.clone());
    for source in args.iter().skip(1) {
        let Value::Object(source_obj) = source else {
            continue;
        };
        for key in source_obj.own_keys() {
            let enumerable = source_obj.get_own_property(&key).is_some_and(|p| p.enumerable);
            if enumerable {
                let value = interp.get_from(source_obj, &key, source)?;
                interp.set_value(&target_value, key, value)?;
            }
        }
    }
    Ok(target_value)
}

fn freeze(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let value = arg(args, 0);
    if let Value::Object(obj) = &value {
        let mut guard = obj.write();
        guard.extensible = false;
        guard.frozen = true;
        for prop in guard.props.iter_mut() {
            prop.configurable = false;
            if matches!(prop.slot, Slot::Data(_)) {
                prop.writable = false;
            }
        }
    }
    Ok(value)
}

fn seal(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let value = arg(args, 0);
    if let Value::Object(obj) = &value {
        let mut guard = obj.write();
        guard.extensible = false;
        for prop in guard.props.iter_mut() {
            prop.configurable = false;
        }
    }
    Ok(value)
}

fn is_frozen(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    Ok(Value::Bool(match arg(args, 0) {
        Value::Object(obj) => !obj.read().extensible,
        _ => true,
    }))
}

fn prevent_extensions(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let value = arg(args, 0);
    if let Value::Object(obj) = &value {
        obj.write().extensible = false;
    }
    Ok(value)
}

fn is_extensible(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    Ok(Value::Bool(matches!(arg(args, 0), Value::Object(obj) if obj.read().extensible)))
}

fn create(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let proto = match arg(args, 0) {
        Value::Object(proto) => Some(proto),
        Value::Null => None,
        other => {
            return Err(interp.type_error(format!(
                "Object prototype may only be an Object or null: {}",
                interp.short_description(&other)
            )));
        }
    };
    let obj = ObjectRef::ordinary(proto);
    if let Value::Object(props) = arg(args, 1) {
        define_from_map(interp, &obj, &Value::Object(props))?;
    }
    Ok(Value::Object(obj))
}

fn get_prototype_of(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let obj = target_object(interp, args)?;
    Ok(obj.proto().map_or(Value::Null, Value::Object))
}

fn set_prototype_of(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let target = arg(args, 0);
    if let Value::Object(obj) = &target {
        match arg(args, 1) {
            Value::Object(proto) => obj.set_proto(Some(proto)),
            Value::Null => obj.set_proto(None),
            _ => {}
        }
    }
    Ok(target)
}

/// Reads a property descriptor object, filling gaps from `existing`.
fn to_property(interp: &mut Interpreter, desc: &Value, existing: Option<Property>) -> Result<Property, Control> {
    let Value::Object(desc_obj) = desc else {
        return Err(interp.type_error(format!(
            "Property description must be an object: {}",
            interp.short_description(desc)
        )));
    };
    let field = |interp: &mut Interpreter, name: &str| -> Result<Option<Value>, Control> {
        let key = PropertyKey::from(name);
        if interp.has_property(desc_obj, &key) {
            interp.get_value(desc, &key).map(Some)
        } else {
            Ok(None)
        }
    };
    let value = field(interp, "value")?;
    let writable = field(interp, "writable")?;
    let enumerable = field(interp, "enumerable")?;
    let configurable = field(interp, "configurable")?;
    let get = field(interp, "get")?;
    let set = field(interp, "set")?;

    let base = existing.unwrap_or(Property {
        slot: Slot::Data(Value::Undefined),
        enumerable: false,
        writable: false,
        configurable: false,
    });
    let get = accessor_slot(interp, get, "Getter")?;
    let set = accessor_slot(interp, set, "Setter")?;
    let slot = if get.is_some() || set.is_some() {
        if value.is_some() || writable.is_some() {
            return Err(interp.type_error(
                "Invalid property descriptor. Cannot both specify accessors and a value or writable attribute",
            ));
        }
        let (old_get, old_set) = match base.slot {
            Slot::Accessor { get, set } => (get, set),
            Slot::Data(_) => (None, None),
        };
        Slot::Accessor {
            get: get.unwrap_or(old_get),
            set: set.unwrap_or(old_set),
        }
    } else {
        match (value, base.slot) {
            (Some(value), _) => Slot::Data(value),
            (None, Slot::Data(old)) => Slot::Data(old),
            (None, accessor) if writable.is_none() => accessor,
            (None, _) => Slot::Data(Value::Undefined),
        }
    };
    Ok(Property {
        slot,
        writable: writable.map_or(base.writable, |w| w.is_truthy()),
        enumerable: enumerable.map_or(base.enumerable, |e| e.is_truthy()),
        configurable: configurable.map_or(base.configurable, |c| c.is_truthy()),
    })
}

/// `None` when the descriptor leaves the accessor out.
fn accessor_slot(interp: &Interpreter, value: Option<Value>, what: &str) -> Result<Option<Option<ObjectRef>>, Control> {
    match value {
        None => Ok(None),
        Some(Value::Undefined) => Ok(Some(None)),
        Some(Value::Object(f)) if f.is_callable() => Ok(Some(Some(f))),
        Some(other) => Err(interp.type_error(format!(
            "{what} must be a function: {}",
            interp.short_description(&other)
        ))),
    }
}

fn define_one(interp: &mut Interpreter, obj: &ObjectRef, key: PropertyKey, desc: &Value) -> Result<(), Control> {
    let existing = obj.get_own_property(&key);
    if let Some(current) = &existing
        && !current.configurable
    {
        let redefining = match (&current.slot, desc) {
            (Slot::Data(old), Value::Object(desc_obj)) => {
                let new_value = desc_obj.get("value");
                current.writable
                    || new_value.is_none_or(|value| value.same_value(old))
                        && desc_obj.get("get").is_none()
                        && desc_obj.get("set").is_none()
            }
            _ => false,
        };
        if !redefining {
            return Err(interp.type_error(format!("Cannot redefine property: {key}")));
        }
    }
    if existing.is_none() && !obj.read().extensible {
        return Err(interp.type_error(format!(
            "Cannot define property {key}, object is not extensible"
        )));
    }
    let prop = to_property(interp, desc, existing)?;
    interp.define(obj, key, prop)
}

fn define_property(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let target = arg(args, 0);
    let Value::Object(obj) = &target else {
        return Err(interp.type_error("Object.defineProperty called on non-object"));
    };
    let key = interp.to_property_key(&arg(args, 1))?;
    define_one(interp, obj, key, &arg(args, 2))?;
    Ok(target)
}

fn define_from_map(interp: &mut Interpreter, obj: &ObjectRef, props: &Value) -> Result<(), Control> {
    for (key, desc) in enumerable_entries(interp, props)? {
        define_one(interp, obj, key, &desc)?;
    }
    Ok(())
}

fn define_properties(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let target = arg(args, 0);
    let Value::Object(obj) = &target else {
        return Err(interp.type_error("Object.defineProperties called on non-object"));
    };
    define_from_map(interp, obj, &arg(args, 1))?;
    Ok(target)
}

fn get_own_property_names(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let obj = target_object(interp, args)?;
    let names = obj
        .own_keys()
        .into_iter()
        .filter(|key| matches!(key, PropertyKey::String(_)))
        .map(|key| key.to_value())
        .collect();
    Ok(interp.array(names))
}

fn get_own_property_symbols(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let obj = target_object(interp, args)?;
    let symbols = obj
        .own_keys()
        .into_iter()
        .filter(|key| matches!(key, PropertyKey::Symbol(_)))
        .map(|key| key.to_value())
        .collect();
    Ok(interp.array(symbols))
}

pub(crate) fn descriptor_object(interp: &Interpreter, prop: Property) -> Value {
    let desc = interp.realm().object();
    match prop.slot {
        Slot::Data(value) => {
            desc.insert("value", value);
            desc.insert("writable", Value::Bool(prop.writable));
        }
        Slot::Accessor { get, set } => {
            desc.insert("get", get.map_or(Value::Undefined, Value::Object));
            desc.insert("set", set.map_or(Value::Undefined, Value::Object));
        }
    }
    desc.insert("enumerable", Value::Bool(prop.enumerable));
    desc.insert("configurable", Value::Bool(prop.configurable));
    Value::Object(desc)
}

fn get_own_property_descriptor(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let obj = target_object(interp, args)?;
    let key = interp.to_property_key(&arg(args, 1))?;
    Ok(obj
        .get_own_property(&key)
        .map_or(Value::Undefined, |prop| descriptor_object(interp, prop)))
}

fn get_own_property_descriptors(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let obj = target_object(interp, args)?;
    let out = interp.realm().object();
    for key in obj.own_keys() {
        if let Some(prop) = obj.get_own_property(&key) {
            out.insert(key, descriptor_object(interp, prop));
        }
    }
    Ok(Value::Object(out))
}

fn from_entries(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let out = interp.realm().object();
    for entry in interp.iterate_to_vec(&arg(args, 0))? {
        let key = interp.get_value(&entry, &PropertyKey::from(0usize))?;
        let value = interp.get_value(&entry, &PropertyKey::from(1usize))?;
        let key = interp.to_property_key(&key)?;
        interp.define(&out, key, Property::data(value))?;
    }
    Ok(Value::Object(out))
}

fn has_own_property(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let key = interp.to_property_key(&arg(args, 0))?;
    let obj = interp.to_object(this)?;
    Ok(Value::Bool(obj.has_own(&key)))
}

fn is_prototype_of(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let Value::Object(candidate) = arg(args, 0) else {
        return Ok(Value::Bool(false));
    };
    let proto = interp.to_object(this)?;
    Ok(Value::Bool(candidate.inherits_from(&proto)))
}

fn property_is_enumerable(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let key = interp.to_property_key(&arg(args, 0))?;
    let obj = interp.to_object(this)?;
    Ok(Value::Bool(obj.get_own_property(&key).is_some_and(|p| p.enumerable)))
}

fn to_string(interp: &mut Interpreter, this: &Value, _: &[Value]) -> Result<Value, Control> {
    let tag = match this {
        Value::Undefined => return Ok(Value::string("[object Undefined]")),
        Value::Null => return Ok(Value::string("[object Null]")),
        Value::Object(obj) => {
            let key = PropertyKey::Symbol(interp.realm().symbols.to_string_tag.clone());
            match interp.get_value(this, &key)? {
                Value::String(tag) => tag.to_string(),
                _ => match &obj.read().kind {
                    ObjectKind::Function(_) => "Function".to_string(),
                    ObjectKind::Array(_) => "Array".to_string(),
                    ObjectKind::Error => "Error".to_string(),
                    ObjectKind::Date(_) => "Date".to_string(),
                    ObjectKind::RegExp(_) => "RegExp".to_string(),
                    ObjectKind::Boxed(inner) => match inner {
                        Value::String(_) => "String",
                        Value::Number(_) => "Number",
                        Value::Bool(_) => "Boolean",
                        _ => "Object",
                    }
                    .to_string(),
                    _ => "Object".to_string(),
                },
            }
        }
        Value::String(_) => "String".to_string(),
        Value::Number(_) => "Number".to_string(),
        Value::Bool(_) => "Boolean".to_string(),
        Value::Symbol(_) => "Symbol".to_string(),
    };
    Ok(Value::string(format!("[object {tag}]")))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{eval, eval_error, eval_string};

    #[test]
    fn assign_keys_and_accessor_definitions() {
        let value = eval_string(
            "var o = Object.assign({}, { a: 1 }, null, { b: 2 });
             Object.defineProperty(o, 'c', { get: function () { return this.a + this.b } });
             return Object.keys(o).join('') + o.c",
        );
        assert_eq!(value, "ab3");
    }

    #[test]
    fn freeze_blocks_writes_silently_in_sloppy_code() {
        let value = eval_string(
            "var o = Object.freeze({ a: 1 }); o.a = 2; o.b = 3;
             return [o.a, o.b, Object.isFrozen(o)].join(',')",
        );
        assert_eq!(value, "1,,true");
        let err = eval_error("'use strict'; var o = Object.freeze({ a: 1 }); o.a = 2;");
        assert!(err.starts_with("TypeError: Cannot assign to read only property 'a'"));
    }

    #[test]
    fn esmodule_interop_markers() {
        let value = eval_string(
            "var exports = {};
             Object.defineProperty(exports, '__esModule', { value: true });
             exports.default = 1;
             return JSON.stringify(Object.keys(exports)) + exports.__esModule",
        );
        assert_eq!(value, "[\"default\"]true");
    }

    #[test]
    fn create_with_null_prototype_and_descriptors() {
        let value = eval_string(
            "var o = Object.create(null, { x: { value: 1, enumerable: true } });
             var d = Object.getOwnPropertyDescriptor(o, 'x');
             return [Object.getPrototypeOf(o), d.value, d.writable, 'toString' in o].join(',')",
        );
        assert_eq!(value, ",1,false,false");
    }

    #[test]
    fn entries_and_from_entries_round_out_objects() {
        let value = eval_string(
            "var o = Object.fromEntries(Object.entries({ a: 1, b: 2 }).map(([k, v]) => [k, v * 2]));
             return Object.values(o).join('+')",
        );
        assert_eq!(value, "2+4");
    }

    #[test]
    fn to_string_tags() {
        assert_eq!(
            eval_string("return [Object.prototype.toString.call([]), String({}), Object.prototype.toString.call(null)].join()"),
            "[object Array],[object Object],[object Null]"
        );
        assert!(eval("return ({}).hasOwnProperty.call({ a: 1 }, 'a')").is_truthy());
    }
}
