//! Global functions and host shims: `console`, timers, URI coding and the
//! `window`/`self`/`globalThis` aliases.

use super::collections::KeyedTable;
use super::{arg, callback, constant, function, method, native_function};
use crate::script::interpreter::{Control, Interpreter};
use crate::script::object::{NativeFn, ObjectKind, ObjectRef, Slot};
use crate::script::realm::{ErrorKind, Realm};
use crate::script::value::{PropertyKey, Value, number_to_string};
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

/// Tracing target for everything a payload prints through `console`.
pub const PAYLOAD_TARGET: &str = "shadow_umd::payload";

/// Nesting depth past which `console` output abbreviates objects.
const INSPECT_DEPTH: usize = 2;

#[derive(Clone, Copy)]
enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

pub fn install(realm: &Arc<Realm>) {
    let global = &realm.global;
    for alias in ["globalThis", "window", "self"] {
        global.insert_hidden(alias, Value::Object(global.clone()));
    }
    constant(global, "undefined", Value::Undefined);
    constant(global, "NaN", Value::Number(f64::NAN));
    constant(global, "Infinity", Value::Number(f64::INFINITY));

    let console = realm.object();
    for (name, level) in [
        ("log", Level::Info),
        ("info", Level::Info),
        ("table", Level::Info),
        ("dir", Level::Info),
        ("group", Level::Info),
        ("groupCollapsed", Level::Info),
        ("debug", Level::Debug),
        ("trace", Level::Debug),
        ("warn", Level::Warn),
        ("error", Level::Error),
    ] {
        let print: NativeFn = Arc::new(move |interp, _, args, _| {
            emit(level, &format_console(interp, args));
            Ok(Value::Undefined)
        });
        console.insert_hidden(name, Value::Object(native_function(realm, name, 0, print, false)));
    }
    method(realm, &console, "assert", 0, |interp, _, args| {
        if !arg(args, 0).is_truthy() {
            let rest = format_console(interp, args.get(1..).unwrap_or_default());
            let message = if rest.is_empty() {
                "Assertion failed".to_string()
            } else {
                format!("Assertion failed: {rest}")
            };
            emit(Level::Error, &message);
        }
        Ok(Value::Undefined)
    });
    method(realm, &console, "groupEnd", 0, |_, _, _| Ok(Value::Undefined));
    global.insert_hidden("console", Value::Object(console));

    // Timers hand out ids but never fire; a payload run ends once its job queue drains.
    let next_timer = Arc::new(AtomicU64::new(1));
    for name in ["setTimeout", "setInterval", "requestAnimationFrame", "requestIdleCallback"] {
        let ids = next_timer.clone();
        let schedule: NativeFn = Arc::new(move |interp, _, args, _| {
            callback(interp, args, 0)?;
            let id = ids.fetch_add(1, Ordering::Relaxed);
            debug!(target: PAYLOAD_TARGET, timer = id, "timer registered; callbacks do not run on the host");
            Ok(Value::Number(id as f64))
        });
        global.insert_hidden(name, Value::Object(native_function(realm, name, 1, schedule, false)));
    }
    for name in ["clearTimeout", "clearInterval", "cancelAnimationFrame", "cancelIdleCallback"] {
        global.insert_hidden(name, function(realm, name, 1, |_, _, _| Ok(Value::Undefined)));
    }
    method(realm, global, "queueMicrotask", 1, |interp, _, args| {
        let task = callback(interp, args, 0)?;
        interp.enqueue_job(Box::new(move |interp| {
            interp.call_function(&task, &Value::Undefined, &[]).map(|_| ())
        }));
        Ok(Value::Undefined)
    });

    method(realm, global, "isNaN", 1, |interp, _, args| {
        Ok(Value::Bool(interp.to_number(&arg(args, 0))?.is_nan()))
    });
    method(realm, global, "isFinite", 1, |interp, _, args| {
        Ok(Value::Bool(interp.to_number(&arg(args, 0))?.is_finite()))
    });
    method(realm, global, "encodeURIComponent", 1, |interp, _, args| {
        let text = interp.to_string(&arg(args, 0))?;
        Ok(Value::string(encode_uri(&text, URI_UNRESERVED)))
    });
    method(realm, global, "encodeURI", 1, |interp, _, args| {
        let text = interp.to_string(&arg(args, 0))?;
        Ok(Value::string(encode_uri(&text, URI_KEEP)))
    });
    method(realm, global, "decodeURIComponent", 1, |interp, _, args| {
        let text = interp.to_string(&arg(args, 0))?;
        decode_uri(&text, "").map(Value::string).ok_or_else(|| interp.throw(ErrorKind::UriError, "URI malformed"))
    });
    method(realm, global, "decodeURI", 1, |interp, _, args| {
        let text = interp.to_string(&arg(args, 0))?;
        decode_uri(&text, URI_RESERVED)
            .map(Value::string)
            .ok_or_else(|| interp.throw(ErrorKind::UriError, "URI malformed"))
    });

    let navigator = realm.object();
    navigator.insert("userAgent", Value::string(concat!("shadow-umd/", env!("CARGO_PKG_VERSION"))));
    navigator.insert("language", Value::string("en-US"));
    navigator.insert("languages", Value::Object(realm.array(vec![Value::string("en-US")])));
    global.insert_hidden("navigator", Value::Object(navigator));
}

fn emit(level: Level, line: &str) {
    match level {
        Level::Debug => debug!(target: PAYLOAD_TARGET, "{line}"),
        Level::Info => info!(target: PAYLOAD_TARGET, "{line}"),
        Level::Warn => warn!(target: PAYLOAD_TARGET, "{line}"),
        Level::Error => error!(target: PAYLOAD_TARGET, "{line}"),
    }
}

/// Joins `console` arguments the way browsers do, applying `%s`, `%d`, `%i`,
/// `%f`, `%o`, `%O`, `%j` and `%c` in a leading format string.
pub fn format_console(interp: &Interpreter, args: &[Value]) -> String {
    let mut out = String::new();
    let mut rest = args;
    if let Some((Value::String(template), tail)) = args.split_first()
        && template.contains('%')
    {
        rest = tail;
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            let Some(&spec) = chars.peek() else {
                out.push('%');
                break;
            };
            let consumes = matches!(spec, 's' | 'd' | 'i' | 'f' | 'o' | 'O' | 'j' | 'c');
            if spec == '%' {
                chars.next();
                out.push('%');
                continue;
            }
            let Some((value, tail)) = rest.split_first().filter(|_| consumes) else {
                out.push('%');
                continue;
            };
            chars.next();
            rest = tail;
            match spec {
                's' => out.push_str(&inspect_top(interp, value)),
                'd' | 'i' => {
                    let n = value.to_number_primitive();
                    let n = if spec == 'i' { n.trunc() } else { n };
                    out.push_str(&number_to_string(n));
                }
                'f' => out.push_str(&number_to_string(value.to_number_primitive())),
                'c' => {}
                _ => out.push_str(&inspect(interp, value)),
            }
        }
    }
    for value in rest {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&inspect_top(interp, value));
    }
    out
}

/// Top-level rendering: strings print raw.
fn inspect_top(interp: &Interpreter, value: &Value) -> String {
    match value {
        Value::String(s) => s.to_string(),
        other => inspect(interp, other),
    }
}

/// Node-style rendering of a value. Never runs payload code.
pub fn inspect(interp: &Interpreter, value: &Value) -> String {
    let mut seen = Vec::new();
    inspect_value(interp, value, 0, &mut seen)
}

fn inspect_value(interp: &Interpreter, value: &Value, depth: usize, seen: &mut Vec<usize>) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        Value::Number(n) if *n == 0.0 && n.is_sign_negative() => "-0".to_string(),
        Value::Symbol(sym) => sym.descriptive_string(),
        Value::Object(obj) => inspect_object(interp, obj, depth, seen),
        other => other.primitive_to_string().map_or_else(String::new, |s| s.to_string()),
    }
}

fn inspect_object(interp: &Interpreter, obj: &ObjectRef, depth: usize, seen: &mut Vec<usize>) -> String {
    if seen.contains(&obj.id()) {
        return "[Circular]".to_string();
    }
    if obj.is_callable() {
        return match obj.get("name").and_then(|name| name.primitive_to_string()) {
            Some(name) if !name.is_empty() => format!("[Function: {name}]"),
            _ => "[Function (anonymous)]".to_string(),
        };
    }
    if interp.is_error_object(obj) {
        if let Some(Value::String(stack)) = obj.get("stack") {
            return stack.to_string();
        }
        let name = obj.get("name").and_then(|v| v.primitive_to_string()).unwrap_or_else(|| "Error".into());
        let message = obj.get("message").and_then(|v| v.primitive_to_string()).unwrap_or_default();
        return if message.is_empty() { name.to_string() } else { format!("{name}: {message}") };
    }

    enum Shape {
        Plain,
        Array(Vec<Value>),
        Keyed(&'static str, usize, Vec<(Value, Value)>),
    }
    let shape = match &obj.read().kind {
        ObjectKind::Date(time) => {
            return match chrono::DateTime::from_timestamp_millis(*time as i64).filter(|_| time.is_finite()) {
                Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
                None => "Invalid Date".to_string(),
            };
        }
        ObjectKind::RegExp(data) => return format!("/{}/{}", data.source, data.flags),
        ObjectKind::Boxed(Value::String(s)) => return format!("[String: '{s}']"),
        ObjectKind::Boxed(Value::Number(n)) => return format!("[Number: {}]", number_to_string(*n)),
        ObjectKind::Boxed(Value::Bool(b)) => return format!("[Boolean: {b}]"),
        ObjectKind::Boxed(Value::Symbol(sym)) => return format!("[Symbol: {}]", sym.descriptive_string()),
        ObjectKind::Promise(_) => return "Promise { … }".to_string(),
        ObjectKind::Iterator(_) => return "Object [Iterator] {}".to_string(),
        ObjectKind::Array(items) => Shape::Array(items.clone()),
        ObjectKind::Map(table) => Shape::Keyed("Map", table.size(), live_entries(table)),
        ObjectKind::Set(table) => Shape::Keyed("Set", table.size(), live_entries(table)),
        _ => Shape::Plain,
    };
    if depth > INSPECT_DEPTH {
        return match shape {
            Shape::Array(_) => "[Array]".to_string(),
            Shape::Keyed(name, ..) => format!("[{name}]"),
            Shape::Plain => "[Object]".to_string(),
        };
    }

    seen.push(obj.id());
    let mut parts: Vec<String> = Vec::new();
    let prefix = match shape {
        Shape::Array(items) => {
            parts.extend(items.iter().map(|item| inspect_value(interp, item, depth + 1, seen)));
            String::new()
        }
        Shape::Keyed(name, size, entries) => {
            for (key, value) in &entries {
                let key_text = inspect_value(interp, key, depth + 1, seen);
                if name == "Map" {
                    let value_text = inspect_value(interp, value, depth + 1, seen);
                    parts.push(format!("{key_text} => {value_text}"));
                } else {
                    parts.push(key_text);
                }
            }
            format!("{name}({size}) ")
        }
        Shape::Plain => constructor_prefix(interp, obj),
    };
    let is_array = obj.is_array();
    for key in obj.own_keys() {
        if is_array && (key.array_index().is_some() || key.as_str() == Some("length")) {
            continue;
        }
        let Some(prop) = obj.get_own_property(&key).filter(|prop| prop.enumerable) else {
            continue;
        };
        let rendered = match &prop.slot {
            Slot::Data(value) => inspect_value(interp, value, depth + 1, seen),
            Slot::Accessor { get: Some(_), set: Some(_) } => "[Getter/Setter]".to_string(),
            Slot::Accessor { get: Some(_), .. } => "[Getter]".to_string(),
            Slot::Accessor { .. } => "[Setter]".to_string(),
        };
        parts.push(format!("{}: {rendered}", key_label(&key)));
    }
    seen.pop();

    let (open, close) = if is_array { ("[", "]") } else { ("{", "}") };
    if parts.is_empty() {
        return format!("{prefix}{open}{close}");
    }
    let mut out = format!("{prefix}{open} ");
    let _ = write!(out, "{} {close}", parts.join(", "));
    out
}

fn live_entries(table: &KeyedTable) -> Vec<(Value, Value)> {
    let mut entries = Vec::new();
    let mut position = 0;
    while let Some((i, key, value)) = table.next_entry(position) {
        position = i + 1;
        entries.push((key, value));
    }
    entries
}

/// `ClassName ` for instances of payload classes, `[Object: null prototype] ` without a prototype.
fn constructor_prefix(interp: &Interpreter, obj: &ObjectRef) -> String {
    let Some(proto) = obj.proto() else {
        return "[Object: null prototype] ".to_string();
    };
    if proto.ptr_eq(&interp.realm().intrinsics.object_prototype) {
        return String::new();
    }
    match proto.get("constructor").as_ref().and_then(Value::as_object).and_then(|ctor| ctor.get("name")) {
        Some(Value::String(name)) if !name.is_empty() && &*name != "Object" => format!("{name} "),
        _ => String::new(),
    }
}

fn key_label(key: &PropertyKey) -> String {
    match key {
        PropertyKey::Symbol(sym) => format!("[{}]", sym.descriptive_string()),
        PropertyKey::String(s) => {
            let mut chars = s.chars();
            let identifier = chars
                .next()
                .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$');
            if identifier { s.to_string() } else { format!("'{s}'") }
        }
    }
}

/// Characters `encodeURIComponent` leaves alone besides ASCII alphanumerics.
const URI_UNRESERVED: &str = "-_.!~*'()";
/// Characters `encodeURI` also leaves alone.
const URI_KEEP: &str = "-_.!~*'();/?:@&=+$,#";
/// Escapes `decodeURI` keeps encoded.
const URI_RESERVED: &str = ";/?:@&=+$,#";

fn encode_uri(text: &str, keep: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() || keep.contains(c) {
            out.push(c);
            continue;
        }
        let mut buf = [0u8; 4];
        for byte in c.encode_utf8(&mut buf).bytes() {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

/// Decodes `%XX` escapes; `None` for malformed escapes or invalid UTF-8.
fn decode_uri(text: &str, reserved: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let hex = text.get(i + 1..i + 3).filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))?;
        let byte = u8::from_str_radix(hex, 16).ok()?;
        if byte.is_ascii() && reserved.contains(byte as char) {
            out.extend_from_slice(&bytes[i..i + 3]);
        } else {
            out.push(byte);
        }
        i += 3;
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{eval_error, eval_string};
    use super::*;
    use crate::script::interpreter::{Limits, run_script};

    fn evaluated(source: &str) -> (Interpreter, Vec<Value>) {
        let program = crate::script::parse(source).unwrap();
        let mut interp = Interpreter::new(Realm::new(), Limits::default());
        let value = interp.run_function_body(&program, &[]).unwrap().unwrap_or_default();
        let items = match &value {
            Value::Object(obj) => obj.array_items().unwrap_or_default(),
            _ => Vec::new(),
        };
        (interp, items)
    }

    #[test]
    fn inspect_renders_nested_values_without_running_getters() {
        let (interp, items) = evaluated(
            "class Point { constructor() { this.x = 1 } }
             var cyclic = { name: 'c' }; cyclic.self = cyclic;
             return [
               { a: [1, 'two', null], 'b-c': undefined, get g() { throw new Error('ran') } },
               new Point(), cyclic, new Map([['k', { deep: { deeper: { deepest: 1 } } }]]),
               function named() {}, Object.create(null), new Error('bad'), -0, Symbol('s'), []
             ];",
        );
        let rendered: Vec<String> = items.iter().map(|item| inspect(&interp, item)).collect();
        assert_eq!(rendered[0], "{ a: [ 1, 'two', null ], 'b-c': undefined, g: [Getter] }");
        assert_eq!(rendered[1], "Point { x: 1 }");
        assert_eq!(rendered[2], "{ name: 'c', self: [Circular] }");
        assert_eq!(rendered[3], "Map(1) { 'k' => { deep: { deeper: [Object] } } }");
        assert_eq!(rendered[4], "[Function: named]");
        assert_eq!(rendered[5], "[Object: null prototype] {}");
        assert!(rendered[6].starts_with("Error: bad\n"));
        assert_eq!(&rendered[7..], ["-0", "Symbol(s)", "[]"]);
    }

    #[test]
    fn console_format_strings_substitute_arguments() {
        let (interp, items) = evaluated("return ['%s is %d%% done%c', 'build', 42.9, 'color: red', { ok: true }, 'tail'];");
        assert_eq!(format_console(&interp, &items), "build is 42.9% done { ok: true } tail");
        let (interp, items) = evaluated("return ['%i|%o|%x', 7.8, 'q'];");
        assert_eq!(format_console(&interp, &items), "7|'q'|%x");
    }

    #[test]
    fn uri_coding_round_trips_and_rejects_malformed_escapes() {
        let value = eval_string(
            "return [encodeURIComponent('a b&c/\\u00e9'), encodeURI('http://x.y/a b?q=1#f'),
                     decodeURIComponent('%C3%A9%2F'), decodeURI('%2F%20')].join('|')",
        );
        assert_eq!(value, "a%20b%26c%2F%C3%A9|http://x.y/a%20b?q=1#f|\u{e9}/|%2F ");
        assert_eq!(eval_error("decodeURIComponent('%E0%A4%A')"), "URIError: URI malformed");
    }

    #[test]
    fn timers_never_fire_but_microtasks_do() {
        let (global, _) = run_script(
            "var first = setTimeout(function () { window.fired = true }, 0);
             var second = setInterval(function () {}, 10);
             window.ids = typeof first + (second > first);
             queueMicrotask(function () { window.micro = 'ran' });
             clearTimeout(first);
             console.log('%s ready', 'payload', { n: 1 });",
        )
        .unwrap();
        assert!(global.get("fired").is_none());
        assert!(matches!(global.get("ids"), Some(Value::String(s)) if &*s == "numbertrue"));
        assert!(matches!(global.get("micro"), Some(Value::String(s)) if &*s == "ran"));
    }

    #[test]
    fn numeric_predicates_and_global_constants() {
        assert_eq!(
            eval_string("return [isNaN('x'), isFinite('12'), isFinite(Infinity), typeof undefined, NaN !== NaN, window === globalThis].join()"),
            "true,true,false,undefined,true,true"
        );
    }
}
