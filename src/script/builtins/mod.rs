//! Builtin objects installed into every realm, plus the host `document` and
//! `React` objects the payload scope exposes.

pub mod array;
pub mod collections;
pub mod date;
pub mod dom;
pub mod error;
pub mod function;
pub mod global;
pub mod iterator;
pub mod json;
pub mod number;
pub mod object;
pub mod promise;
pub mod react;
pub mod regexp;
pub mod string;
pub mod symbol;

pub use global::PAYLOAD_TARGET;
pub use react::REACT_HOST_VERSION;

use super::interpreter::{Control, Interpreter};
use super::object::{Callable, NativeFn, NativeFunction, ObjectKind, ObjectRef, Property, Slot};
use super::realm::Realm;
use super::value::{PropertyKey, Symbol, Value};
use std::sync::Arc;

/// Signature of builtin methods that ignore `new.target`.
pub type MethodFn = fn(&mut Interpreter, &Value, &[Value]) -> Result<Value, Control>;

pub fn install(realm: &Arc<Realm>) {
    object::install(realm);
    function::install(realm);
    array::install(realm);
    string::install(realm);
    number::install(realm);
    symbol::install(realm);
    error::install(realm);
    json::install(realm);
    iterator::install(realm);
    collections::install(realm);
    promise::install(realm);
    regexp::install(realm);
    date::install(realm);
    global::install(realm);
}

/// Argument `i`, or `undefined`.
pub fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

pub fn native_function(realm: &Realm, name: &str, length: usize, func: NativeFn, constructor: bool) -> ObjectRef {
    let obj = ObjectRef::new(
        ObjectKind::Function(Callable::Native(NativeFunction { func, constructor })),
        Some(realm.intrinsics.function_prototype.clone()),
    );
    let _ = obj.try_define("length".into(), Property::meta(Value::Number(length as f64)));
    let _ = obj.try_define("name".into(), Property::meta(Value::string(name)));
    obj
}

/// A free-standing builtin function value.
pub fn function(realm: &Realm, name: &str, length: usize, func: MethodFn) -> Value {
    let native: NativeFn = Arc::new(move |interp, this, args, _| func(interp, this, args));
    Value::Object(native_function(realm, name, length, native, false))
}

/// Installs a non-enumerable method on `target`.
pub fn method(realm: &Realm, target: &ObjectRef, name: &str, length: usize, func: MethodFn) {
    target.insert_hidden(name, function(realm, name, length, func));
}

/// Installs a method under a well-known symbol.
pub fn symbol_method(realm: &Realm, target: &ObjectRef, symbol: &Symbol, name: &str, func: MethodFn) {
    target.insert_hidden(PropertyKey::Symbol(symbol.clone()), function(realm, name, 0, func));
}

/// Installs a non-enumerable getter on `target`.
pub fn getter(realm: &Realm, target: &ObjectRef, key: impl Into<PropertyKey>, func: MethodFn) {
    let key = key.into();
    let name = format!("get {key}");
    let Value::Object(get) = function(realm, &name, 0, func) else {
        return;
    };
    let _ = target.try_define(
        key,
        Property {
            slot: Slot::Accessor {
                get: Some(get),
                set: None,
            },
            enumerable: false,
            writable: true,
            configurable: true,
        },
    );
}

/// Installs a read-only constant.
pub fn constant(target: &ObjectRef, name: &str, value: Value) {
    let _ = target.try_define(name.into(), Property::readonly(value));
}

/// Creates a global constructor linked with `prototype`. `func` sees
/// `new.target` as `Some` when invoked with `new`.
pub fn constructor(realm: &Realm, name: &str, length: usize, prototype: &ObjectRef, func: NativeFn) -> ObjectRef {
    let ctor = native_function(realm, name, length, func, true);
    let _ = ctor.try_define(
        "prototype".into(),
        Property {
            enumerable: false,
            ..Property::readonly(Value::Object(prototype.clone()))
        },
    );
    prototype.insert_hidden("constructor", Value::Object(ctor.clone()));
    realm.global.insert_hidden(name, Value::Object(ctor.clone()));
    ctor
}

/// `this` as an object of the kind `matches` accepts, or a `TypeError`.
pub fn this_object(interp: &Interpreter, this: &Value, method: &str, matches: fn(&ObjectKind) -> bool) -> Result<ObjectRef, Control> {
    match this {
        Value::Object(obj) if matches(&obj.read().kind) => Ok(obj.clone()),
        _ => Err(interp.type_error(format!(
            "Method {method} called on incompatible receiver {}",
            interp.short_description(this)
        ))),
    }
}

/// A callback argument, or a `TypeError` naming it.
pub fn callback(interp: &Interpreter, args: &[Value], i: usize) -> Result<Value, Control> {
    let value = arg(args, i);
    if value.is_callable() {
        Ok(value)
    } else {
        Err(interp.type_error(format!("{} is not a function", interp.short_description(&value))))
    }
}

/// `{ value, done }`.
pub fn iter_result(interp: &Interpreter, value: Value, done: bool) -> Value {
    let result = interp.realm().object();
    result.insert("value", value);
    result.insert("done", Value::Bool(done));
    Value::Object(result)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::script::interpreter::run_script;
    use crate::script::value::Value;

    pub fn eval(source: &str) -> Value {
        run_script(source).unwrap().1.unwrap_or_default()
    }

    pub fn eval_string(source: &str) -> String {
        match eval(source) {
            Value::String(s) => s.to_string(),
            other => panic!("expected a string from {source:?}, got {other:?}"),
        }
    }

    pub fn eval_error(source: &str) -> String {
        run_script(source).unwrap_err().to_string()
    }
}
