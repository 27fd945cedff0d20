//! `JSON` backed by `serde_json`; object key order survives both directions.

use super::{arg, method};
use crate::script::interpreter::{Control, Interpreter};
use crate::script::object::{ObjectKind, ObjectRef, Property};
use crate::script::realm::{ErrorKind, Realm};
use crate::script::value::{JsStr, PropertyKey, Value};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::sync::Arc;

/// Largest integer magnitude written without a fractional part.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

pub fn install(realm: &Arc<Realm>) {
    let json = realm.object();
    method(realm, &json, "parse", 2, parse);
    method(realm, &json, "stringify", 3, stringify);
    let _ = json.try_define(
        PropertyKey::Symbol(realm.symbols.to_string_tag.clone()),
        Property::meta(Value::string("JSON")),
    );
    realm.global.insert_hidden("JSON", Value::Object(json));
}

fn parse(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let text = interp.to_string(&arg(args, 0))?;
    let parsed: serde_json::Value = serde_json::from_str(&text)
        .map_err(|err| interp.throw(ErrorKind::SyntaxError, format!("{err} in JSON")))?;
    let value = from_json(interp, &parsed);
    let reviver = arg(args, 1);
    if !reviver.is_callable() {
        return Ok(value);
    }
    let root = interp.realm().object();
    root.insert("", value);
    internalize(interp, &Value::Object(root), PropertyKey::from(""), &reviver)
}

/// Converts parsed JSON into payload values.
pub fn from_json(interp: &Interpreter, json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::string(s.as_str()),
        serde_json::Value::Array(items) => {
            let items = items.iter().map(|item| from_json(interp, item)).collect();
            interp.array(items)
        }
        serde_json::Value::Object(map) => {
            let obj = interp.realm().object();
            for (key, value) in map {
                obj.insert(key.as_str(), from_json(interp, value));
            }
            Value::Object(obj)
        }
    }
}

/// Applies a `JSON.parse` reviver bottom-up.
fn internalize(interp: &mut Interpreter, holder: &Value, key: PropertyKey, reviver: &Value) -> Result<Value, Control> {
    let value = interp.get_value(holder, &key)?;
    if let Value::Object(obj) = &value {
        let keys: Vec<PropertyKey> = match obj.array_len() {
            Some(len) => (0..len).map(PropertyKey::from).collect(),
            None => obj.enumerable_keys().into_iter().map(PropertyKey::String).collect(),
        };
        for child in keys {
            let revived = crate::script::ensure_sufficient_stack(|| internalize(interp, &value, child.clone(), reviver))?;
            if matches!(revived, Value::Undefined) {
                obj.delete(&child);
            } else {
                interp.define(obj, child, Property::data(revived))?;
            }
        }
    }
    interp.call_function(reviver, holder, &[key.to_value(), value])
}

struct Stringifier {
    replacer: Option<Value>,
    allow_list: Option<Vec<JsStr>>,
    /// Objects currently being serialized, for cycle detection.
    stack: Vec<usize>,
}

impl Stringifier {
    fn serialize(
        &mut self,
        interp: &mut Interpreter,
        holder: &Value,
        key: &PropertyKey,
        mut value: Value,
    ) -> Result<Option<serde_json::Value>, Control> {
        if matches!(value, Value::Object(_)) {
            let to_json = interp.get_value(&value, &"toJSON".into())?;
            if to_json.is_callable() {
                value = interp.call_function(&to_json, &value, &[key.to_value()])?;
            }
        }
        if let Some(replacer) = &self.replacer {
            value = interp.call_function(replacer, holder, &[key.to_value(), value])?;
        }
        if let Value::Object(obj) = &value {
            let boxed = match &obj.read().kind {
                ObjectKind::Boxed(inner @ (Value::Number(_) | Value::String(_) | Value::Bool(_))) => Some(inner.clone()),
                _ => None,
            };
            if let Some(inner) = boxed {
                value = match inner {
                    Value::Number(_) => Value::Number(interp.to_number(&value)?),
                    Value::String(_) => Value::String(interp.to_string(&value)?),
                    other => other,
                };
            }
        }
        Ok(Some(match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => number_to_json(n),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Undefined | Value::Symbol(_) => return Ok(None),
            Value::Object(obj) if obj.is_callable() => return Ok(None),
            Value::Object(obj) => {
                if self.stack.contains(&obj.id()) {
                    return Err(interp.type_error("Converting circular structure to JSON"));
                }
                self.stack.push(obj.id());
                let result = crate::script::ensure_sufficient_stack(|| self.serialize_object(interp, &obj));
                self.stack.pop();
                result?
            }
        }))
    }

    fn serialize_object(&mut self, interp: &mut Interpreter, obj: &ObjectRef) -> Result<serde_json::Value, Control> {
        let holder = Value::Object(obj.clone());
        if let Some(len) = obj.array_len() {
            let mut items = Vec::with_capacity(len);
            for i in 0..len {
                let key = PropertyKey::from(i);
                let item = interp.get_value(&holder, &key)?;
                items.push(self.serialize(interp, &holder, &key, item)?.unwrap_or(serde_json::Value::Null));
            }
            return Ok(serde_json::Value::Array(items));
        }
        let keys = match &self.allow_list {
            Some(list) => list.clone(),
            None => obj.enumerable_keys(),
        };
        let mut map = serde_json::Map::new();
        for name in keys {
            let key = PropertyKey::String(name.clone());
            let item = interp.get_value(&holder, &key)?;
            if let Some(json) = self.serialize(interp, &holder, &key, item)? {
                map.insert(name.to_string(), json);
            }
        }
        Ok(serde_json::Value::Object(map))
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < MAX_EXACT_INTEGER {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

fn stringify(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let value = arg(args, 0);
    let replacer_arg = arg(args, 1);
    let mut stringifier = Stringifier {
        replacer: None,
        allow_list: None,
        stack: Vec::new(),
    };
    if replacer_arg.is_callable() {
        stringifier.replacer = Some(replacer_arg);
    } else if let Value::Object(list) = &replacer_arg
        && let Some(items) = list.array_items()
    {
        let mut names: Vec<JsStr> = Vec::new();
        for item in items {
            let name = match &item {
                Value::String(s) => s.clone(),
                Value::Number(_) => interp.to_string(&item)?,
                _ => continue,
            };
            if !names.contains(&name) {
                names.push(name);
            }
        }
        stringifier.allow_list = Some(names);
    }
    let indent = match arg(args, 2) {
        Value::Number(n) => " ".repeat(n.clamp(0.0, 10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };

    let holder = interp.realm().object();
    holder.insert("", value.clone());
    let Some(json) = stringifier.serialize(interp, &Value::Object(holder), &PropertyKey::from(""), value)? else {
        return Ok(Value::Undefined);
    };
    let text = if indent.is_empty() {
        json.to_string()
    } else {
        let mut out = Vec::new();
        let mut serializer = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(indent.as_bytes()));
        json.serialize(&mut serializer)
            .map_err(|err| interp.throw(ErrorKind::Error, err.to_string()))?;
        String::from_utf8_lossy(&out).into_owned()
    };
    Ok(Value::string(text))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{eval_error, eval_string};

    #[test]
    fn stringify_keeps_key_order_and_skips_unserializable_values() {
        let value = eval_string(
            "return JSON.stringify({ z: 1, a: [1, undefined, function () {}], f: function () {}, u: undefined,
                                     n: null, s: 'q\"', inf: Infinity, nested: { ok: true }, x: 1.5 })",
        );
        assert_eq!(value, r#"{"z":1,"a":[1,null,null],"n":null,"s":"q\"","inf":null,"nested":{"ok":true},"x":1.5}"#);
    }

    #[test]
    fn stringify_honours_to_json_replacers_and_indent() {
        let value = eval_string(
            "var withToJson = { toJSON: function () { return 'custom' } };
             var replaced = JSON.stringify({ a: 1, b: 2 }, function (k, v) { return k === 'b' ? undefined : v });
             var picked = JSON.stringify({ a: 1, b: 2, c: 3 }, ['c', 'a']);
             return [JSON.stringify(withToJson), replaced, picked, JSON.stringify([1, { a: 2 }], null, 2)].join('|')",
        );
        assert_eq!(
            value,
            "\"custom\"|{\"a\":1}|{\"c\":3,\"a\":1}|[\n  1,\n  {\n    \"a\": 2\n  }\n]"
        );
    }

    #[test]
    fn parse_builds_objects_and_applies_revivers() {
        let value = eval_string(
            "var o = JSON.parse('{\"b\":1,\"a\":[true,null,\"x\"]}');
             var revived = JSON.parse('{\"n\":1,\"m\":2}', function (k, v) { return typeof v === 'number' ? v * 10 : v });
             return Object.keys(o).join() + '|' + o.a[0] + o.a[2] + '|' + revived.n + revived.m",
        );
        assert_eq!(value, "b,a|truex|1020");
    }

    #[test]
    fn malformed_json_and_cycles_throw() {
        assert!(eval_error("JSON.parse('{bad')").starts_with("SyntaxError:"));
        assert_eq!(
            eval_error("var a = {}; a.self = a; JSON.stringify(a)"),
            "TypeError: Converting circular structure to JSON"
        );
        assert_eq!(eval_string("return String(JSON.stringify(undefined))"), "undefined");
    }
}
