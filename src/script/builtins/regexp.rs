//! `RegExp` on top of the `regex` crate. Patterns are translated to its
//! syntax; backreferences and lookaround have no equivalent there and are
//! rejected with a `SyntaxError` at construction time.

use super::{arg, constructor, getter, method};
use crate::script::interpreter::{Control, Interpreter};
use crate::script::object::{ObjectKind, ObjectRef, Property};
use crate::script::realm::{ErrorKind, Realm};
use crate::script::value::{JsStr, Value, utf16_len};
use regex::{Captures, Regex, RegexBuilder};
use std::sync::Arc;

/// Compiled program size cap; keeps hostile patterns from ballooning.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

pub struct RegExpData {
    pub source: JsStr,
    pub flags: JsStr,
    pub regex: Regex,
}

impl RegExpData {
    pub fn global(&self) -> bool {
        self.flags.contains('g')
    }

    pub fn sticky(&self) -> bool {
        self.flags.contains('y')
    }
}

/// One match, with offsets in UTF-16 units.
pub(crate) struct RegexMatch {
    pub index: usize,
    pub end: usize,
    /// Group 0 is the whole match; unmatched groups are `None`.
    pub groups: Vec<Option<JsStr>>,
    pub named: Vec<(JsStr, Option<JsStr>)>,
}

impl RegexMatch {
    pub fn matched(&self) -> JsStr {
        self.groups.first().cloned().flatten().unwrap_or_else(|| "".into())
    }

    fn from_captures(regex: &Regex, text: &str, caps: &Captures<'_>) -> Option<Self> {
        let whole = caps.get(0)?;
        let groups = caps
            .iter()
            .map(|group| group.map(|m| JsStr::from(m.as_str())))
            .collect();
        let named = regex
            .capture_names()
            .flatten()
            .map(|name| (JsStr::from(name), caps.name(name).map(|m| JsStr::from(m.as_str()))))
            .collect();
        let index = utf16_len(&text[..whole.start()]);
        Some(Self {
            index,
            end: index + utf16_len(whole.as_str()),
            groups,
            named,
        })
    }
}

pub fn install(realm: &Arc<Realm>) {
    let proto = &realm.intrinsics.regexp_prototype;
    constructor(
        realm,
        "RegExp",
        2,
        proto,
        Arc::new(|interp, _, args, _| {
            let pattern = arg(args, 0);
            let (source, inherited_flags) = match as_regexp(&pattern) {
                Some(existing) => {
                    let guard = existing.read();
                    match &guard.kind {
                        ObjectKind::RegExp(data) => (data.source.clone(), Some(data.flags.clone())),
                        _ => ("(?:)".into(), None),
                    }
                }
                None if matches!(pattern, Value::Undefined) => ("(?:)".into(), None),
                None => (interp.to_string(&pattern)?, None),
            };
            let flags = match arg(args, 1) {
                Value::Undefined => inherited_flags.unwrap_or_else(|| "".into()),
                value => interp.to_string(&value)?,
            };
            new_regexp(interp, &source, &flags).map(Value::Object)
        }),
    );
    method(realm, proto, "exec", 1, |interp, this, args| {
        let obj = this_regexp(interp, this, "exec")?;
        let input = interp.to_string(&arg(args, 0))?;
        match exec_raw(interp, &obj, &input)? {
            Some(m) => Ok(match_to_array(interp, &m, &input)),
            None => Ok(Value::Null),
        }
    });
    method(realm, proto, "test", 1, |interp, this, args| {
        let obj = this_regexp(interp, this, "test")?;
        let input = interp.to_string(&arg(args, 0))?;
        Ok(Value::Bool(exec_raw(interp, &obj, &input)?.is_some()))
    });
    method(realm, proto, "toString", 0, |interp, this, _| {
        let source = interp.get_value(this, &"source".into())?;
        let flags = interp.get_value(this, &"flags".into())?;
        let source = interp.to_string(&source)?;
        let flags = interp.to_string(&flags)?;
        Ok(Value::string(format!("/{source}/{flags}")))
    });
    getter(realm, proto, "source", |interp, this, _| {
        with_data(interp, this, |data| Value::String(data.source.clone()))
    });
    getter(realm, proto, "flags", |interp, this, _| {
        with_data(interp, this, |data| Value::String(data.flags.clone()))
    });
    let flags: [(&str, super::MethodFn); 7] = [
        ("global", |i, t, _| flag_getter(i, t, 'g')),
        ("ignoreCase", |i, t, _| flag_getter(i, t, 'i')),
        ("multiline", |i, t, _| flag_getter(i, t, 'm')),
        ("dotAll", |i, t, _| flag_getter(i, t, 's')),
        ("unicode", |i, t, _| flag_getter(i, t, 'u')),
        ("sticky", |i, t, _| flag_getter(i, t, 'y')),
        ("hasIndices", |i, t, _| flag_getter(i, t, 'd')),
    ];
    for (name, func) in flags {
        getter(realm, proto, name, func);
    }
}

fn flag_getter(interp: &mut Interpreter, this: &Value, flag: char) -> Result<Value, Control> {
    if let Value::Object(obj) = this
        && obj.ptr_eq(&interp.realm().intrinsics.regexp_prototype)
    {
        return Ok(Value::Undefined);
    }
    with_data(interp, this, |data| Value::Bool(data.flags.contains(flag)))
}

fn with_data(interp: &Interpreter, this: &Value, f: impl FnOnce(&RegExpData) -> Value) -> Result<Value, Control> {
    if let Value::Object(obj) = this
        && let ObjectKind::RegExp(data) = &obj.read().kind
    {
        return Ok(f(data));
    }
    Err(interp.type_error(format!(
        "RegExp getter called on incompatible receiver {}",
        interp.short_description(this)
    )))
}

fn this_regexp(interp: &Interpreter, this: &Value, name: &str) -> Result<ObjectRef, Control> {
    super::this_object(interp, this, &format!("RegExp.prototype.{name}"), |kind| {
        matches!(kind, ObjectKind::RegExp(_))
    })
}

pub fn as_regexp(value: &Value) -> Option<ObjectRef> {
    match value {
        Value::Object(obj) if matches!(obj.read().kind, ObjectKind::RegExp(_)) => Some(obj.clone()),
        _ => None,
    }
}

/// The compiled regex and its `g`/`y` flags.
fn compiled(obj: &ObjectRef) -> Option<(Regex, bool, bool)> {
    match &obj.read().kind {
        ObjectKind::RegExp(data) => Some((data.regex.clone(), data.global(), data.sticky())),
        _ => None,
    }
}

/// Builds a `RegExp` object, throwing `SyntaxError` on patterns the engine
/// cannot express.
pub fn new_regexp(interp: &mut Interpreter, pattern: &str, flags: &str) -> Result<ObjectRef, Control> {
    let mut seen = String::new();
    for flag in flags.chars() {
        if !"dgimsuyv".contains(flag) || seen.contains(flag) {
            return Err(interp.throw(
                ErrorKind::SyntaxError,
                format!("Invalid flags supplied to RegExp constructor '{flags}'"),
            ));
        }
        seen.push(flag);
    }
    let invalid = |reason: &str| {
        interp.throw(
            ErrorKind::SyntaxError,
            format!("Invalid regular expression: /{pattern}/{flags}: {reason}"),
        )
    };
    let translated = translate(pattern).map_err(|reason| invalid(reason))?;
    let regex = RegexBuilder::new(&translated)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|err| {
            let text = err.to_string();
            let reason = text
                .lines()
                .find_map(|line| line.trim().strip_prefix("error: "))
                .unwrap_or("Invalid pattern")
                .to_string();
            invalid(&reason)
        })?;
    let source: JsStr = if pattern.is_empty() { "(?:)".into() } else { pattern.into() };
    let obj = ObjectRef::new(
        ObjectKind::RegExp(RegExpData {
            source,
            flags: flags.into(),
            regex,
        }),
        Some(interp.realm().intrinsics.regexp_prototype.clone()),
    );
    interp.define(
        &obj,
        "lastIndex",
        Property {
            configurable: false,
            ..Property::hidden(Value::Number(0.0))
        },
    )?;
    Ok(obj)
}

/// Rewrites a pattern into `regex` crate syntax.
fn translate(pattern: &str) -> Result<String, &'static str> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut in_class = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                let Some(&next) = chars.get(i + 1) else {
                    return Err("\\ at end of pattern");
                };
                i += 2;
                match next {
                    'd' => out.push_str("[0-9]"),
                    'D' => out.push_str("[^0-9]"),
                    'w' => out.push_str("[0-9A-Za-z_]"),
                    'W' => out.push_str("[^0-9A-Za-z_]"),
                    'b' if in_class => out.push_str("\\x08"),
                    '/' => out.push('/'),
                    '0' => out.push_str("\\x00"),
                    '1'..='9' => return Err("backreferences are not supported"),
                    'k' if chars.get(i) == Some(&'<') => {
                        return Err("backreferences are not supported");
                    }
                    'u' => {
                        let (code, consumed) = unicode_escape(&chars[i..]).ok_or("Invalid Unicode escape")?;
                        out.push_str(&format!("\\x{{{code:X}}}"));
                        i += consumed;
                    }
                    'c' => match chars.get(i) {
                        Some(letter) if letter.is_ascii_alphabetic() => {
                            out.push_str(&format!("\\x{:02X}", (*letter as u32) % 32));
                            i += 1;
                        }
                        _ => out.push_str("\\\\c"),
                    },
                    c if c.is_ascii() => {
                        out.push('\\');
                        out.push(c);
                    }
                    c => out.push(c),
                }
                continue;
            }
            '[' if !in_class => {
                if chars.get(i + 1) == Some(&']') {
                    out.push_str("[^\\s\\S]");
                    i += 2;
                    continue;
                }
                if chars.get(i + 1) == Some(&'^') && chars.get(i + 2) == Some(&']') {
                    out.push_str("[\\s\\S]");
                    i += 3;
                    continue;
                }
                in_class = true;
                out.push('[');
                if chars.get(i + 1) == Some(&'^') {
                    out.push('^');
                    i += 1;
                }
                // A leading `]` is literal in both dialects only after escaping.
                if chars.get(i + 1) == Some(&']') {
                    out.push_str("\\]");
                    i += 1;
                }
            }
            ']' if in_class => {
                in_class = false;
                out.push(']');
            }
            '[' | '&' | '~' if in_class => {
                out.push('\\');
                out.push(c);
            }
            '(' if !in_class && chars.get(i + 1) == Some(&'?') => match (chars.get(i + 2), chars.get(i + 3)) {
                (Some('=' | '!'), _) | (Some('<'), Some('=' | '!')) => {
                    return Err("lookaround assertions are not supported");
                }
                (Some('<'), _) => {
                    out.push_str("(?P<");
                    i += 3;
                    continue;
                }
                _ => out.push('('),
            },
            c => out.push(c),
        }
        i += 1;
    }
    if in_class {
        return Err("Unterminated character class");
    }
    Ok(out)
}

/// Parses the tail of `\u`: `XXXX` or `{X…}`. Returns the code point and
/// how many characters were consumed.
fn unicode_escape(rest: &[char]) -> Option<(u32, usize)> {
    if rest.first() == Some(&'{') {
        let close = rest.iter().position(|&c| c == '}')?;
        let digits: String = rest[1..close].iter().collect();
        let code = u32::from_str_radix(&digits, 16).ok()?;
        return Some((code, close + 1));
    }
    let digits: String = rest.get(..4)?.iter().collect();
    let code = u32::from_str_radix(&digits, 16).ok()?;
    Some((code, 4))
}

/// Byte offset of the `index`th UTF-16 unit, rounded up to a char boundary.
pub(crate) fn utf16_to_byte(text: &str, index: usize) -> usize {
    let mut units = 0;
    for (byte, c) in text.char_indices() {
        if units >= index {
            return byte;
        }
        units += c.len_utf16();
    }
    text.len()
}

fn set_last_index(obj: &ObjectRef, value: usize) {
    if let Some(mut prop) = obj.get_own_property(&"lastIndex".into())
        && prop.writable
    {
        prop.slot = crate::script::object::Slot::Data(Value::Number(value as f64));
        let _ = obj.try_define("lastIndex".into(), prop);
    }
}

/// `RegExpBuiltinExec`: honours and updates `lastIndex` for `g` and `y`.
pub(crate) fn exec_raw(interp: &mut Interpreter, obj: &ObjectRef, text: &str) -> Result<Option<RegexMatch>, Control> {
    let Some((regex, global, sticky)) = compiled(obj) else {
        return Err(interp.type_error("RegExp exec method called on an incompatible receiver"));
    };
    let start = if global || sticky {
        let last = interp.get_value(&Value::Object(obj.clone()), &"lastIndex".into())?;
        interp.to_integer(&last)?.max(0.0) as usize
    } else {
        0
    };
    if start > utf16_len(text) {
        set_last_index(obj, 0);
        return Ok(None);
    }
    let byte_start = utf16_to_byte(text, start);
    let found = regex
        .captures_at(text, byte_start)
        .filter(|caps| !sticky || caps.get(0).is_some_and(|m| m.start() == byte_start))
        .and_then(|caps| RegexMatch::from_captures(&regex, text, &caps));
    match found {
        Some(m) => {
            if global || sticky {
                set_last_index(obj, m.end);
            }
            Ok(Some(m))
        }
        None => {
            if global || sticky {
                set_last_index(obj, 0);
            }
            Ok(None)
        }
    }
}

/// Every match in `text` from the start, ignoring `lastIndex`.
pub(crate) fn all_matches(obj: &ObjectRef, text: &str) -> Vec<RegexMatch> {
    let Some((regex, _, _)) = compiled(obj) else {
        return Vec::new();
    };
    regex
        .captures_iter(text)
        .filter_map(|caps| RegexMatch::from_captures(&regex, text, &caps))
        .collect()
}

/// The first match from the start of `text`, ignoring `lastIndex`.
pub(crate) fn first_match(obj: &ObjectRef, text: &str) -> Option<RegexMatch> {
    let (regex, _, _) = compiled(obj)?;
    let caps = regex.captures(text)?;
    RegexMatch::from_captures(&regex, text, &caps)
}

/// Resets `lastIndex`, as the global forms of `replace` and `match` do.
pub(crate) fn reset_last_index(obj: &ObjectRef) {
    set_last_index(obj, 0);
}

pub(crate) fn is_global(obj: &ObjectRef) -> bool {
    compiled(obj).is_some_and(|(_, global, _)| global)
}

/// The array `exec` returns: groups plus `index`, `input` and `groups`.
pub(crate) fn match_to_array(interp: &Interpreter, m: &RegexMatch, input: &str) -> Value {
    let items = m
        .groups
        .iter()
        .map(|group| group.clone().map_or(Value::Undefined, Value::String))
        .collect();
    let array = interp.realm().array(items);
    array.insert("index", Value::Number(m.index as f64));
    array.insert("input", Value::string(input));
    let groups = if m.named.is_empty() {
        Value::Undefined
    } else {
        let groups = ObjectRef::ordinary(None);
        for (name, value) in &m.named {
            groups.insert(name.clone(), value.clone().map_or(Value::Undefined, Value::String));
        }
        Value::Object(groups)
    };
    array.insert("groups", groups);
    Value::Object(array)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{eval_error, eval_string};
    use super::translate;

    #[test]
    fn translation_rewrites_dialect_differences() {
        assert_eq!(translate(r"\d+\/[^]").unwrap(), r"[0-9]+/[\s\S]");
        assert_eq!(translate(r"\u00e9|\u{1F600}").unwrap(), r"\x{E9}|\x{1F600}");
        assert_eq!(translate(r"(?<year>\d{4})").unwrap(), r"(?P<year>[0-9]{4})");
        assert!(translate(r"(a)\1").is_err());
        assert!(translate(r"a(?=b)").is_err());
    }

    #[test]
    fn exec_reports_groups_and_index() {
        let value = eval_string(
            "var m = /(?<word>\\w+)-(\\d)/.exec('x abc-7');
             return [m[0], m[1], m[2], m.index, m.groups.word].join('|')",
        );
        assert_eq!(value, "abc-7|abc|7|2|abc");
    }

    #[test]
    fn global_regexps_advance_last_index() {
        let value = eval_string(
            "var re = /a/g; var hits = [];
             while (re.test('banana')) hits.push(re.lastIndex);
             return hits.join(',') + '|' + re.lastIndex + '|' + re.flags + '|' + String(re)",
        );
        assert_eq!(value, "2,4,6|0|g|/a/g");
    }

    #[test]
    fn sticky_only_matches_at_last_index() {
        let value = eval_string(
            "var re = /b/y; var first = re.test('ab'); re.lastIndex = 1;
             return first + ',' + re.test('ab')",
        );
        assert_eq!(value, "false,true");
    }

    #[test]
    fn unsupported_patterns_are_syntax_errors() {
        let err = eval_error("new RegExp('(a)\\\\1')");
        assert!(err.starts_with("SyntaxError: Invalid regular expression: /(a)\\1/"), "{err}");
        assert!(eval_error("/a/gg").starts_with("SyntaxError: Invalid flags"));
    }

    #[test]
    fn case_insensitive_and_multiline_flags() {
        let value = eval_string("return [/^b/m.test('a\\nb'), /HELLO/i.test('hello'), /a.b/s.test('a\\nb')].join()");
        assert_eq!(value, "true,true,true");
    }
}
