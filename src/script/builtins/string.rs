use super::iterator::{IteratorState, make_iterator};
use super::regexp::{self, RegexMatch};
use super::{arg, constructor, method, symbol_method};
use crate::script::interpreter::{Control, Interpreter};
use crate::script::object::{ObjectKind, ObjectRef};
use crate::script::realm::{ErrorKind, Realm};
use crate::script::value::{JsStr, Value, from_utf16_lossy, is_js_whitespace, to_uint32};
use std::sync::Arc;

/// Longest string `repeat` and `padStart`/`padEnd` will build, in UTF-16 units.
const MAX_STRING_LENGTH: usize = 1 << 28;

pub fn install(realm: &Arc<Realm>) {
    let proto = &realm.intrinsics.string_prototype;
    proto.write().kind = ObjectKind::Boxed(Value::string(""));
    let ctor = constructor(
        realm,
        "String",
        1,
        proto,
        Arc::new(|interp, _, args, new_target| {
            let text: JsStr = match args.first() {
                None => "".into(),
                Some(Value::Symbol(sym)) if new_target.is_none() => sym.descriptive_string().into(),
                Some(value) => interp.to_string(value)?,
            };
            match new_target {
                None => Ok(Value::String(text)),
                Some(target) => {
                    let fallback = interp.realm().intrinsics.string_prototype.clone();
                    let proto = interp.prototype_for(target, fallback)?;
                    Ok(Value::Object(ObjectRef::new(ObjectKind::Boxed(Value::String(text)), Some(proto))))
                }
            }
        }),
    );
    method(realm, &ctor, "fromCharCode", 1, |_, _, args| {
        let units: Vec<u16> = args
            .iter()
            .map(|code| (to_uint32(code.to_number_primitive()) & 0xFFFF) as u16)
            .collect();
        Ok(Value::string(from_utf16_lossy(&units)))
    });
    method(realm, &ctor, "fromCodePoint", 1, from_code_point);
    method(realm, &ctor, "raw", 1, raw);

    method(realm, proto, "toString", 0, this_string_value);
    method(realm, proto, "valueOf", 0, this_string_value);
    method(realm, proto, "charAt", 1, |interp, this, args| {
        let units = this_units(interp, this, "charAt")?;
        let pos = interp.to_integer(&arg(args, 0))?;
        Ok(Value::string(unit_at(&units, pos).map_or_else(String::new, |u| from_utf16_lossy(&[u]))))
    });
    method(realm, proto, "charCodeAt", 1, |interp, this, args| {
        let units = this_units(interp, this, "charCodeAt")?;
        let pos = interp.to_integer(&arg(args, 0))?;
        Ok(Value::Number(unit_at(&units, pos).map_or(f64::NAN, f64::from)))
    });
    method(realm, proto, "codePointAt", 1, |interp, this, args| {
        let units = this_units(interp, this, "codePointAt")?;
        let pos = interp.to_integer(&arg(args, 0))?;
        let Some(first) = unit_at(&units, pos) else {
            return Ok(Value::Undefined);
        };
        let next = unit_at(&units, pos + 1.0);
        let code = match (first, next) {
            (0xD800..=0xDBFF, Some(low @ 0xDC00..=0xDFFF)) => {
                0x10000 + ((u32::from(first) - 0xD800) << 10) + (u32::from(low) - 0xDC00)
            }
            _ => u32::from(first),
        };
        Ok(Value::Number(f64::from(code)))
    });
    method(realm, proto, "at", 1, |interp, this, args| {
        let units = this_units(interp, this, "at")?;
        let n = interp.to_integer(&arg(args, 0))?;
        let pos = if n < 0.0 { units.len() as f64 + n } else { n };
        Ok(unit_at(&units, pos).map_or(Value::Undefined, |u| Value::string(from_utf16_lossy(&[u]))))
    });
    method(realm, proto, "indexOf", 1, |interp, this, args| {
        let units = this_units(interp, this, "indexOf")?;
        let needle = arg_units(interp, args, 0)?;
        let from = clamp_index(interp.to_integer(&arg(args, 1))?, units.len());
        Ok(Value::Number(find_units(&units, &needle, from).map_or(-1.0, |i| i as f64)))
    });
    method(realm, proto, "lastIndexOf", 1, |interp, this, args| {
        let units = this_units(interp, this, "lastIndexOf")?;
        let needle = arg_units(interp, args, 0)?;
        let position = interp.to_number(&arg(args, 1))?;
        let from = if position.is_nan() {
            units.len()
        } else {
            clamp_index(position.trunc(), units.len())
        };
        let last = (0..=from.min(units.len().saturating_sub(needle.len())))
            .rev()
            .find(|&i| units[i..].starts_with(&needle));
        Ok(Value::Number(last.map_or(-1.0, |i| i as f64)))
    });
    method(realm, proto, "includes", 1, |interp, this, args| {
        let units = this_units(interp, this, "includes")?;
        let needle = search_units(interp, args, "includes")?;
        let from = clamp_index(interp.to_integer(&arg(args, 1))?, units.len());
        Ok(Value::Bool(find_units(&units, &needle, from).is_some()))
    });
    method(realm, proto, "startsWith", 1, |interp, this, args| {
        let units = this_units(interp, this, "startsWith")?;
        let needle = search_units(interp, args, "startsWith")?;
        let from = clamp_index(interp.to_integer(&arg(args, 1))?, units.len());
        Ok(Value::Bool(units[from..].starts_with(&needle)))
    });
    method(realm, proto, "endsWith", 1, |interp, this, args| {
        let units = this_units(interp, this, "endsWith")?;
        let needle = search_units(interp, args, "endsWith")?;
        let end = match arg(args, 1) {
            Value::Undefined => units.len(),
            value => clamp_index(interp.to_integer(&value)?, units.len()),
        };
        Ok(Value::Bool(units[..end].ends_with(&needle)))
    });
    method(realm, proto, "slice", 2, |interp, this, args| {
        let units = this_units(interp, this, "slice")?;
        let len = units.len();
        let start = relative(interp.to_integer(&arg(args, 0))?, len);
        let end = match arg(args, 1) {
            Value::Undefined => len,
            value => relative(interp.to_integer(&value)?, len),
        };
        Ok(Value::string(from_utf16_lossy(units.get(start..end.max(start)).unwrap_or_default())))
    });
    method(realm, proto, "substring", 2, |interp, this, args| {
        let units = this_units(interp, this, "substring")?;
        let len = units.len();
        let start = clamp_index(interp.to_integer(&arg(args, 0))?, len);
        let end = match arg(args, 1) {
            Value::Undefined => len,
            value => clamp_index(interp.to_integer(&value)?, len),
        };
        let (from, to) = if start <= end { (start, end) } else { (end, start) };
        Ok(Value::string(from_utf16_lossy(&units[from..to])))
    });
    method(realm, proto, "substr", 2, |interp, this, args| {
        let units = this_units(interp, this, "substr")?;
        let len = units.len();
        let start = relative(interp.to_integer(&arg(args, 0))?, len);
        let count = match arg(args, 1) {
            Value::Undefined => len,
            value => interp.to_integer(&value)?.clamp(0.0, len as f64) as usize,
        };
        let end = (start + count).min(len);
        Ok(Value::string(from_utf16_lossy(&units[start..end])))
    });
    method(realm, proto, "toUpperCase", 0, |interp, this, _| {
        Ok(Value::string(this_str(interp, this, "toUpperCase")?.to_uppercase()))
    });
    method(realm, proto, "toLowerCase", 0, |interp, this, _| {
        Ok(Value::string(this_str(interp, this, "toLowerCase")?.to_lowercase()))
    });
    method(realm, proto, "toLocaleUpperCase", 0, |interp, this, _| {
        Ok(Value::string(this_str(interp, this, "toLocaleUpperCase")?.to_uppercase()))
    });
    method(realm, proto, "toLocaleLowerCase", 0, |interp, this, _| {
        Ok(Value::string(this_str(interp, this, "toLocaleLowerCase")?.to_lowercase()))
    });
    method(realm, proto, "trim", 0, |interp, this, _| {
        Ok(Value::string(this_str(interp, this, "trim")?.trim_matches(is_js_whitespace)))
    });
    for name in ["trimStart", "trimLeft"] {
        method(realm, proto, name, 0, |interp, this, _| {
            Ok(Value::string(this_str(interp, this, "trimStart")?.trim_start_matches(is_js_whitespace)))
        });
    }
    for name in ["trimEnd", "trimRight"] {
        method(realm, proto, name, 0, |interp, this, _| {
            Ok(Value::string(this_str(interp, this, "trimEnd")?.trim_end_matches(is_js_whitespace)))
        });
    }
    method(realm, proto, "padStart", 2, |interp, this, args| pad(interp, this, args, true));
    method(realm, proto, "padEnd", 2, |interp, this, args| pad(interp, this, args, false));
    method(realm, proto, "repeat", 1, |interp, this, args| {
        let text = this_str(interp, this, "repeat")?;
        let count = interp.to_integer(&arg(args, 0))?;
        if count < 0.0 || count.is_infinite() {
            return Err(interp.throw(
                ErrorKind::RangeError,
                format!("Invalid count value: {}", crate::script::value::number_to_string(count)),
            ));
        }
        if text.encode_utf16().count() as f64 * count > MAX_STRING_LENGTH as f64 {
            return Err(interp.throw(ErrorKind::RangeError, "Invalid string length"));
        }
        Ok(Value::string(text.repeat(count as usize)))
    });
    method(realm, proto, "concat", 1, |interp, this, args| {
        let mut out = this_str(interp, this, "concat")?.to_string();
        for value in args {
            out.push_str(&interp.to_string(value)?);
        }
        Ok(Value::string(out))
    });
    method(realm, proto, "split", 2, split);
    method(realm, proto, "replace", 2, |interp, this, args| replace(interp, this, args, false));
    method(realm, proto, "replaceAll", 2, |interp, this, args| replace(interp, this, args, true));
    method(realm, proto, "match", 1, string_match);
    method(realm, proto, "matchAll", 1, match_all);
    method(realm, proto, "search", 1, |interp, this, args| {
        let text = this_str(interp, this, "search")?;
        let re = coerce_regexp(interp, &arg(args, 0), "")?;
        Ok(Value::Number(regexp::first_match(&re, &text).map_or(-1.0, |m| m.index as f64)))
    });
    method(realm, proto, "localeCompare", 1, |interp, this, args| {
        let text = this_str(interp, this, "localeCompare")?;
        let other = interp.to_string(&arg(args, 0))?;
        Ok(Value::Number(match text.as_ref().cmp(other.as_ref()) {
            std::cmp::Ordering::Less => -1.0,
            std::cmp::Ordering::Equal => 0.0,
            std::cmp::Ordering::Greater => 1.0,
        }))
    });
    method(realm, proto, "normalize", 0, |interp, this, args| {
        let text = this_str(interp, this, "normalize")?;
        if let Value::String(form) = arg(args, 0)
            && !matches!(form.as_ref(), "NFC" | "NFD" | "NFKC" | "NFKD")
        {
            return Err(interp.throw(
                ErrorKind::RangeError,
                "The normalization form should be one of NFC, NFD, NFKC, NFKD.",
            ));
        }
        Ok(Value::String(text))
    });
    let iterator = realm.symbols.iterator.clone();
    symbol_method(realm, proto, &iterator, "[Symbol.iterator]", |interp, this, _| {
        let text = this_str(interp, this, "[Symbol.iterator]")?;
        Ok(make_iterator(interp, IteratorState::String { text, offset: 0 }))
    });
}

fn this_string_value(interp: &mut Interpreter, this: &Value, _: &[Value]) -> Result<Value, Control> {
    match this {
        Value::String(s) => Ok(Value::String(s.clone())),
        Value::Object(obj) => match &obj.read().kind {
            ObjectKind::Boxed(Value::String(s)) => Ok(Value::String(s.clone())),
            _ => Err(interp.type_error("String.prototype.valueOf requires that 'this' be a String")),
        },
        _ => Err(interp.type_error("String.prototype.valueOf requires that 'this' be a String")),
    }
}

/// `this` coerced to a string; `null` and `undefined` are refused.
fn this_str(interp: &mut Interpreter, this: &Value, name: &str) -> Result<JsStr, Control> {
    if this.is_nullish() {
        return Err(interp.type_error(format!("String.prototype.{name} called on null or undefined")));
    }
    interp.to_string(this)
}

fn this_units(interp: &mut Interpreter, this: &Value, name: &str) -> Result<Vec<u16>, Control> {
    Ok(this_str(interp, this, name)?.encode_utf16().collect())
}

fn arg_units(interp: &mut Interpreter, args: &[Value], i: usize) -> Result<Vec<u16>, Control> {
    Ok(interp.to_string(&arg(args, i))?.encode_utf16().collect())
}

/// The search string of `includes`, `startsWith` and `endsWith`, which refuse regexps.
fn search_units(interp: &mut Interpreter, args: &[Value], name: &str) -> Result<Vec<u16>, Control> {
    if regexp::as_regexp(&arg(args, 0)).is_some() {
        return Err(interp.type_error(format!(
            "First argument to String.prototype.{name} must not be a regular expression"
        )));
    }
    arg_units(interp, args, 0)
}

fn unit_at(units: &[u16], pos: f64) -> Option<u16> {
    if pos < 0.0 {
        return None;
    }
    units.get(pos as usize).copied()
}

fn clamp_index(n: f64, len: usize) -> usize {
    n.clamp(0.0, len as f64) as usize
}

fn relative(n: f64, len: usize) -> usize {
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

fn find_units(hay: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(hay.len()));
    }
    if needle.len() > hay.len() {
        return None;
    }
    (from..=hay.len() - needle.len()).find(|&i| hay[i..].starts_with(needle))
}

fn from_code_point(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let mut out = String::new();
    for value in args {
        let n = interp.to_number(value)?;
        let c = (n.fract() == 0.0 && (0.0..=1_114_111.0).contains(&n))
            .then(|| char::from_u32(n as u32))
            .flatten();
        match c {
            Some(c) => out.push(c),
            None if (0xD800 as f64..=0xDFFF as f64).contains(&n) => out.push('\u{FFFD}'),
            None => {
                return Err(interp.throw(
                    ErrorKind::RangeError,
                    format!("Invalid code point {}", crate::script::value::number_to_string(n)),
                ));
            }
        }
    }
    Ok(Value::string(out))
}

fn raw(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let strings = arg(args, 0);
    let raw = interp.get_value(&strings, &"raw".into())?;
    let parts = interp.array_like_to_vec(&raw)?;
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        out.push_str(&interp.to_string(part)?);
        if i + 1 < parts.len()
            && let Some(sub) = args.get(i + 1)
        {
            out.push_str(&interp.to_string(sub)?);
        }
    }
    Ok(Value::string(out))
}

fn pad(interp: &mut Interpreter, this: &Value, args: &[Value], at_start: bool) -> Result<Value, Control> {
    let text = this_str(interp, this, if at_start { "padStart" } else { "padEnd" })?;
    let target = interp.to_integer(&arg(args, 0))?;
    let filler: Vec<u16> = match arg(args, 1) {
        Value::Undefined => vec![u16::from(b' ')],
        value => interp.to_string(&value)?.encode_utf16().collect(),
    };
    let len = text.encode_utf16().count();
    if target <= len as f64 || filler.is_empty() {
        return Ok(Value::String(text));
    }
    if target > MAX_STRING_LENGTH as f64 {
        return Err(interp.throw(ErrorKind::RangeError, "Invalid string length"));
    }
    let fill: Vec<u16> = filler.iter().copied().cycle().take(target as usize - len).collect();
    let fill = from_utf16_lossy(&fill);
    Ok(Value::string(if at_start {
        format!("{fill}{text}")
    } else {
        format!("{text}{fill}")
    }))
}

/// A `RegExp` argument as-is, or a new one compiled from its string form.
fn coerce_regexp(interp: &mut Interpreter, value: &Value, flags: &str) -> Result<ObjectRef, Control> {
    if let Some(re) = regexp::as_regexp(value) {
        return Ok(re);
    }
    let source: JsStr = match value {
        Value::Undefined => "".into(),
        other => interp.to_string(other)?,
    };
    regexp::new_regexp(interp, &source, flags)
}

fn split(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let text = this_str(interp, this, "split")?;
    let limit = match arg(args, 1) {
        Value::Undefined => u32::MAX as usize,
        value => to_uint32(interp.to_number(&value)?) as usize,
    };
    let separator = arg(args, 0);
    if limit == 0 {
        return Ok(interp.array(Vec::new()));
    }
    let units: Vec<u16> = text.encode_utf16().collect();
    let mut out = Vec::new();
    let push = |out: &mut Vec<Value>, piece: &[u16]| out.push(Value::string(from_utf16_lossy(piece)));

    if let Some(re) = regexp::as_regexp(&separator) {
        if units.is_empty() {
            if regexp::first_match(&re, &text).is_none() {
                out.push(Value::String(text));
            }
            return Ok(interp.array(out));
        }
        let mut last = 0;
        for m in regexp::all_matches(&re, &text) {
            if m.index >= units.len() || m.end == last {
                continue;
            }
            push(&mut out, &units[last..m.index]);
            for group in m.groups.iter().skip(1) {
                if out.len() >= limit {
                    break;
                }
                out.push(group.clone().map_or(Value::Undefined, Value::String));
            }
            last = m.end;
            if out.len() >= limit {
                out.truncate(limit);
                return Ok(interp.array(out));
            }
        }
        push(&mut out, &units[last..]);
        out.truncate(limit);
        return Ok(interp.array(out));
    }

    if matches!(separator, Value::Undefined) {
        return Ok(interp.array(vec![Value::String(text)]));
    }
    let sep: Vec<u16> = interp.to_string(&separator)?.encode_utf16().collect();
    if sep.is_empty() {
        for unit in units.iter().take(limit) {
            push(&mut out, std::slice::from_ref(unit));
        }
        return Ok(interp.array(out));
    }
    let mut last = 0;
    while let Some(found) = find_units(&units, &sep, last) {
        push(&mut out, &units[last..found]);
        last = found + sep.len();
        if out.len() >= limit {
            return Ok(interp.array(out));
        }
    }
    push(&mut out, &units[last..]);
    out.truncate(limit);
    Ok(interp.array(out))
}

/// GetSubstitution: expands `$$`, `$&`, `` $` ``, `$'`, `$n` and `$<name>`.
fn expand_replacement(template: &str, m: &RegexMatch, units: &[u16]) -> String {
    let matched = m.matched();
    let captures = &m.groups[1.min(m.groups.len())..];
    let mut out = String::new();
    let mut rest = template;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];
        let mut chars = tail.chars();
        match chars.next() {
            Some('$') => {
                out.push('$');
                rest = &tail[1..];
            }
            Some('&') => {
                out.push_str(&matched);
                rest = &tail[1..];
            }
            Some('`') => {
                out.push_str(&from_utf16_lossy(&units[..m.index]));
                rest = &tail[1..];
            }
            Some('\'') => {
                out.push_str(&from_utf16_lossy(&units[m.end.min(units.len())..]));
                rest = &tail[1..];
            }
            Some(d) if d.is_ascii_digit() => {
                let two: Option<usize> = tail.get(..2).and_then(|s| s.parse().ok());
                let one = d.to_digit(10).map_or(0, |n| n as usize);
                let (index, consumed) = match two {
                    Some(n) if (1..=captures.len()).contains(&n) && tail.as_bytes()[1].is_ascii_digit() => (n, 2),
                    _ => (one, 1),
                };
                if (1..=captures.len()).contains(&index) {
                    if let Some(group) = &captures[index - 1] {
                        out.push_str(group);
                    }
                    rest = &tail[consumed..];
                } else {
                    out.push('$');
                    rest = tail;
                }
            }
            Some('<') if !m.named.is_empty() => match tail.find('>') {
                Some(close) => {
                    let name = &tail[1..close];
                    if let Some((_, Some(value))) = m.named.iter().find(|(n, _)| n.as_ref() == name) {
                        out.push_str(value);
                    }
                    rest = &tail[close + 1..];
                }
                None => {
                    out.push('$');
                    rest = tail;
                }
            },
            _ => {
                out.push('$');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

fn replace(interp: &mut Interpreter, this: &Value, args: &[Value], all: bool) -> Result<Value, Control> {
    let name = if all { "replaceAll" } else { "replace" };
    let text = this_str(interp, this, name)?;
    let units: Vec<u16> = text.encode_utf16().collect();
    let pattern = arg(args, 0);
    let replacement = arg(args, 1);

    let matches: Vec<RegexMatch> = match regexp::as_regexp(&pattern) {
        Some(re) => {
            let global = regexp::is_global(&re);
            if all && !global {
                return Err(interp.type_error("replaceAll must be called with a global RegExp"));
            }
            if global {
                regexp::reset_last_index(&re);
                regexp::all_matches(&re, &text)
            } else {
                regexp::exec_raw(interp, &re, &text)?.into_iter().collect()
            }
        }
        None => {
            let needle: Vec<u16> = interp.to_string(&pattern)?.encode_utf16().collect();
            let needle_text: JsStr = from_utf16_lossy(&needle).into();
            let mut found = Vec::new();
            let mut from = 0;
            while let Some(index) = find_units(&units, &needle, from) {
                found.push(RegexMatch {
                    index,
                    end: index + needle.len(),
                    groups: vec![Some(needle_text.clone())],
                    named: Vec::new(),
                });
                if !all {
                    break;
                }
                from = index + needle.len().max(1);
                if from > units.len() {
                    break;
                }
            }
            found
        }
    };

    let template = if replacement.is_callable() {
        None
    } else {
        Some(interp.to_string(&replacement)?)
    };
    let mut out = String::new();
    let mut last = 0;
    for m in &matches {
        out.push_str(&from_utf16_lossy(&units[last.min(m.index)..m.index]));
        let piece = match &template {
            Some(template) => expand_replacement(template, m, &units),
            None => {
                let mut call_args: Vec<Value> = m
                    .groups
                    .iter()
                    .map(|group| group.clone().map_or(Value::Undefined, Value::String))
                    .collect();
                call_args.push(Value::Number(m.index as f64));
                call_args.push(Value::String(text.clone()));
                if !m.named.is_empty() {
                    let groups = ObjectRef::ordinary(None);
                    for (key, value) in &m.named {
                        groups.insert(key.clone(), value.clone().map_or(Value::Undefined, Value::String));
                    }
                    call_args.push(Value::Object(groups));
                }
                let result = interp.call_function(&replacement, &Value::Undefined, &call_args)?;
                interp.to_string(&result)?.to_string()
            }
        };
        out.push_str(&piece);
        last = m.end.max(last);
    }
    out.push_str(&from_utf16_lossy(&units[last.min(units.len())..]));
    Ok(Value::string(out))
}

fn string_match(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let text = this_str(interp, this, "match")?;
    let re = coerce_regexp(interp, &arg(args, 0), "")?;
    if regexp::is_global(&re) {
        regexp::reset_last_index(&re);
        let found: Vec<Value> = regexp::all_matches(&re, &text)
            .iter()
            .map(|m| Value::String(m.matched()))
            .collect();
        return Ok(if found.is_empty() { Value::Null } else { interp.array(found) });
    }
    match regexp::exec_raw(interp, &re, &text)? {
        Some(m) => Ok(regexp::match_to_array(interp, &m, &text)),
        None => Ok(Value::Null),
    }
}

fn match_all(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let text = this_str(interp, this, "matchAll")?;
    let pattern = arg(args, 0);
    let re = match regexp::as_regexp(&pattern) {
        Some(re) if !regexp::is_global(&re) => {
            return Err(interp.type_error(
                "String.prototype.matchAll called with a non-global RegExp argument",
            ));
        }
        Some(re) => re,
        None => coerce_regexp(interp, &pattern, "g")?,
    };
    let items = regexp::all_matches(&re, &text)
        .iter()
        .map(|m| regexp::match_to_array(interp, m, &text))
        .collect();
    Ok(make_iterator(interp, IteratorState::list(items, super::iterator::IterKind::Values)))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{eval_error, eval_string};

    #[test]
    fn searching_and_slicing_in_utf16_units() {
        let value = eval_string(
            "var s = 'a😀bc';
             return [s.length, s.indexOf('b'), s.slice(1, 3) === '😀', s.charCodeAt(1), s.codePointAt(1),
                     s.substring(4, 1).length, s.at(-1), s.lastIndexOf('c'), s.includes('😀')].join(',')",
        );
        assert_eq!(value, "5,3,true,55357,128512,3,c,4,true");
    }

    #[test]
    fn case_trim_pad_and_repeat() {
        let value = eval_string(
            "return ['  Hi '.trim().toUpperCase(), '5'.padStart(3, '0'), 'ab'.padEnd(5, 'xy'), 'na'.repeat(3),
                     String.fromCharCode(72, 105), 'x'.concat(1, 2)].join('|')",
        );
        assert_eq!(value, "HI|005|abxyx|nanana|Hi|x12");
        assert_eq!(eval_error("'a'.repeat(-1)"), "RangeError: Invalid count value: -1");
    }

    #[test]
    fn split_by_string_empty_and_regexp() {
        let value = eval_string(
            "return [JSON.stringify('a,b,,c'.split(',')), JSON.stringify('abc'.split('')),
                     JSON.stringify('a1b22c'.split(/(\\d+)/)), JSON.stringify('ab'.split(/a*/)),
                     JSON.stringify(''.split(',')), JSON.stringify('a,b,c'.split(',', 2))].join(' ')",
        );
        assert_eq!(
            value,
            r#"["a","b","","c"] ["a","b","c"] ["a","1","b","22","c"] ["","b"] [""] ["a","b"]"#
        );
    }

    #[test]
    fn replace_with_patterns_and_functions() {
        let value = eval_string(
            "return ['John Smith'.replace(/(\\w+)\\s(\\w+)/, '$2, $1'),
                     'aaa'.replace('a', 'b'), 'aaa'.replaceAll('a', 'b'),
                     'x-y-z'.replace(/-/g, m => '+'),
                     '2024-01'.replace(/(?<y>\\d+)-(?<m>\\d+)/, '$<m>/$<y>'),
                     'cost: $5'.replace('$5', '$$10 ($&)')].join('|')",
        );
        assert_eq!(value, "Smith, John|baa|bbb|x+y+z|01/2024|cost: $10 ($5)");
    }

    #[test]
    fn match_match_all_and_search() {
        let value = eval_string(
            "var all = [];
             for (const m of 'a1b2'.matchAll(/[a-z](\\d)/g)) all.push(m[1] + '@' + m.index);
             return ['a1b2'.match(/\\d/g).join(), 'a1b2'.match(/\\d/).index, 'xyz'.match(/q/), 'abc'.search('c'),
                     all.join()].join('|')",
        );
        assert_eq!(value, "1,2|1||2|1@0,2@2");
    }

    #[test]
    fn string_iteration_yields_code_points() {
        let value = eval_string("var out = []; for (const c of 'a😀') out.push(c.length); return out.join()");
        assert_eq!(value, "1,2");
        assert_eq!(
            eval_error("String.prototype.trim.call(null)"),
            "TypeError: String.prototype.trim called on null or undefined"
        );
    }
}
