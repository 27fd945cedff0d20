use super::{arg, constant, constructor, method, native_function};
use crate::script::interpreter::{Control, Interpreter};
use crate::script::object::{ObjectKind, ObjectRef, Property};
use crate::script::realm::{ErrorKind, Realm};
use crate::script::value::{
    PropertyKey, Value, is_js_whitespace, number_to_radix_string, number_to_string, parse_radix_digits, to_int32,
    to_uint32,
};
use std::sync::Arc;

/// `2^53 - 1`.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub fn install(realm: &Arc<Realm>) {
    install_number(realm);
    install_boolean(realm);
    install_math(realm);
}

fn install_number(realm: &Arc<Realm>) {
    let proto = &realm.intrinsics.number_prototype;
    proto.write().kind = ObjectKind::Boxed(Value::Number(0.0));
    let ctor = constructor(
        realm,
        "Number",
        1,
        proto,
        Arc::new(|interp, _, args, new_target| {
            let n = match args.first() {
                None => 0.0,
                Some(value) => interp.to_number(value)?,
            };
            match new_target {
                None => Ok(Value::Number(n)),
                Some(target) => {
                    let fallback = interp.realm().intrinsics.number_prototype.clone();
                    let proto = interp.prototype_for(target, fallback)?;
                    Ok(Value::Object(ObjectRef::new(ObjectKind::Boxed(Value::Number(n)), Some(proto))))
                }
            }
        }),
    );
    for (name, value) in [
        ("MAX_SAFE_INTEGER", MAX_SAFE_INTEGER),
        ("MIN_SAFE_INTEGER", -MAX_SAFE_INTEGER),
        ("EPSILON", f64::EPSILON),
        ("MAX_VALUE", f64::MAX),
        ("MIN_VALUE", 5e-324),
        ("POSITIVE_INFINITY", f64::INFINITY),
        ("NEGATIVE_INFINITY", f64::NEG_INFINITY),
        ("NaN", f64::NAN),
    ] {
        constant(&ctor, name, Value::Number(value));
    }
    method(realm, &ctor, "isInteger", 1, |_, _, args| {
        Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_finite() && n.trunc() == n)))
    });
    method(realm, &ctor, "isSafeInteger", 1, |_, _, args| {
        Ok(Value::Bool(
            matches!(arg(args, 0), Value::Number(n) if n.is_finite() && n.trunc() == n && n.abs() <= MAX_SAFE_INTEGER),
        ))
    });
    method(realm, &ctor, "isFinite", 1, |_, _, args| {
        Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_finite())))
    });
    method(realm, &ctor, "isNaN", 1, |_, _, args| {
        Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_nan())))
    });
    // `Number.parseInt === parseInt`, and likewise for `parseFloat`.
    let parse_int = super::function(realm, "parseInt", 2, parse_int);
    let parse_float = super::function(realm, "parseFloat", 1, parse_float);
    for (name, func) in [("parseInt", parse_int), ("parseFloat", parse_float)] {
        ctor.insert_hidden(name, func.clone());
        realm.global.insert_hidden(name, func);
    }

    method(realm, proto, "toString", 1, |interp, this, args| {
        let n = this_number(interp, this, "toString")?;
        let radix = match arg(args, 0) {
            Value::Undefined => 10.0,
            value => interp.to_integer(&value)?,
        };
        if !(2.0..=36.0).contains(&radix) {
            return Err(interp.throw(ErrorKind::RangeError, "toString() radix must be between 2 and 36"));
        }
        Ok(Value::string(number_to_radix_string(n, radix as u32)))
    });
    method(realm, proto, "toLocaleString", 0, |interp, this, _| {
        Ok(Value::string(number_to_string(this_number(interp, this, "toLocaleString")?)))
    });
    method(realm, proto, "valueOf", 0, |interp, this, _| {
        this_number(interp, this, "valueOf").map(Value::Number)
    });
    method(realm, proto, "toFixed", 1, |interp, this, args| {
        let n = this_number(interp, this, "toFixed")?;
        let digits = interp.to_integer(&arg(args, 0))?;
        if !(0.0..=100.0).contains(&digits) {
            return Err(interp.throw(ErrorKind::RangeError, "toFixed() digits argument must be between 0 and 100"));
        }
        if !n.is_finite() || n.abs() >= 1e21 {
            return Ok(Value::string(number_to_string(n)));
        }
        Ok(Value::string(to_fixed(n, digits as usize)))
    });
    method(realm, proto, "toPrecision", 1, |interp, this, args| {
        let n = this_number(interp, this, "toPrecision")?;
        let precision = match arg(args, 0) {
            Value::Undefined => return Ok(Value::string(number_to_string(n))),
            value => interp.to_integer(&value)?,
        };
        if !n.is_finite() {
            return Ok(Value::string(number_to_string(n)));
        }
        if !(1.0..=100.0).contains(&precision) {
            return Err(interp.throw(ErrorKind::RangeError, "toPrecision() argument must be between 1 and 100"));
        }
        Ok(Value::string(to_precision(n, precision as usize)))
    });
    method(realm, proto, "toExponential", 1, |interp, this, args| {
        let n = this_number(interp, this, "toExponential")?;
        let digits = arg(args, 0);
        let fraction = match &digits {
            Value::Undefined => None,
            value => Some(interp.to_integer(value)?),
        };
        if !n.is_finite() {
            return Ok(Value::string(number_to_string(n)));
        }
        if fraction.is_some_and(|d| !(0.0..=100.0).contains(&d)) {
            return Err(interp.throw(ErrorKind::RangeError, "toExponential() argument must be between 0 and 100"));
        }
        let text = match fraction {
            Some(d) => format!("{:.*e}", d as usize, n),
            None => format!("{n:e}"),
        };
        Ok(Value::string(js_exponent(&text)))
    });
}

fn install_boolean(realm: &Arc<Realm>) {
    let proto = &realm.intrinsics.boolean_prototype;
    proto.write().kind = ObjectKind::Boxed(Value::Bool(false));
    constructor(
        realm,
        "Boolean",
        1,
        proto,
        Arc::new(|interp, _, args, new_target| {
            let b = arg(args, 0).is_truthy();
            match new_target {
                None => Ok(Value::Bool(b)),
                Some(target) => {
                    let fallback = interp.realm().intrinsics.boolean_prototype.clone();
                    let proto = interp.prototype_for(target, fallback)?;
                    Ok(Value::Object(ObjectRef::new(ObjectKind::Boxed(Value::Bool(b)), Some(proto))))
                }
            }
        }),
    );
    method(realm, proto, "toString", 0, |interp, this, _| {
        Ok(Value::string(if this_boolean(interp, this)? { "true" } else { "false" }))
    });
    method(realm, proto, "valueOf", 0, |interp, this, _| this_boolean(interp, this).map(Value::Bool));
}

fn this_number(interp: &Interpreter, this: &Value, name: &str) -> Result<f64, Control> {
    match this {
        Value::Number(n) => Ok(*n),
        Value::Object(obj) => match &obj.read().kind {
            ObjectKind::Boxed(Value::Number(n)) => Ok(*n),
            _ => Err(interp.type_error(format!("Number.prototype.{name} requires that 'this' be a Number"))),
        },
        _ => Err(interp.type_error(format!("Number.prototype.{name} requires that 'this' be a Number"))),
    }
}

fn this_boolean(interp: &Interpreter, this: &Value) -> Result<bool, Control> {
    match this {
        Value::Bool(b) => Ok(*b),
        Value::Object(obj) => match &obj.read().kind {
            ObjectKind::Boxed(Value::Bool(b)) => Ok(*b),
            _ => Err(interp.type_error("Boolean.prototype.valueOf requires that 'this' be a Boolean")),
        },
        _ => Err(interp.type_error("Boolean.prototype.valueOf requires that 'this' be a Boolean")),
    }
}

/// `toFixed`, rounding exact ties away from zero as JavaScript does.
fn to_fixed(n: f64, digits: usize) -> String {
    let wide = format!("{:.*}", digits + 30, n.abs());
    let (int_part, frac_part) = wide.split_once('.').unwrap_or((&wide, ""));
    let mut kept: Vec<u8> = int_part.bytes().chain(frac_part.bytes().take(digits)).collect();
    let round_up = frac_part.as_bytes().get(digits).is_some_and(|&d| d >= b'5');
    if round_up {
        let mut i = kept.len();
        loop {
            if i == 0 {
                kept.insert(0, b'1');
                break;
            }
            i -= 1;
            if kept[i] == b'9' {
                kept[i] = b'0';
            } else {
                kept[i] += 1;
                break;
            }
        }
    }
    let int_len = kept.len() - digits;
    let mut out = String::from_utf8_lossy(&kept[..int_len]).into_owned();
    if digits > 0 {
        out.push('.');
        out.push_str(&String::from_utf8_lossy(&kept[int_len..]));
    }
    if n < 0.0 {
        out.insert(0, '-');
    }
    out
}

fn to_precision(n: f64, precision: usize) -> String {
    if n == 0.0 {
        return if precision == 1 {
            "0".to_string()
        } else {
            format!("0.{}", "0".repeat(precision - 1))
        };
    }
    let sci = format!("{:.*e}", precision - 1, n);
    let exponent: i32 = sci.split_once('e').and_then(|(_, e)| e.parse().ok()).unwrap_or(0);
    if exponent < -6 || exponent >= precision as i32 {
        return js_exponent(&sci);
    }
    to_fixed(n, (precision as i32 - 1 - exponent).max(0) as usize)
}

/// Rust's `1.5e3` / `1.5e-3` into JavaScript's `1.5e+3` / `1.5e-3`.
fn js_exponent(text: &str) -> String {
    match text.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
        _ => text.to_string(),
    }
}

/// `parseInt(string, radix)`.
pub fn parse_int(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let text = interp.to_string(&arg(args, 0))?;
    let mut rest = text.trim_start_matches(is_js_whitespace);
    let negative = rest.starts_with('-');
    if negative || rest.starts_with('+') {
        rest = &rest[1..];
    }
    let mut radix = to_int32(interp.to_number(&arg(args, 1))?);
    let has_hex_prefix = rest.starts_with("0x") || rest.starts_with("0X");
    if radix == 0 {
        radix = if has_hex_prefix { 16 } else { 10 };
    }
    if !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }
    if radix == 16 && has_hex_prefix {
        rest = &rest[2..];
    }
    let end = rest
        .char_indices()
        .find(|(_, c)| !c.is_digit(radix as u32))
        .map_or(rest.len(), |(i, _)| i);
    let value = parse_radix_digits(&rest[..end], radix as u32).unwrap_or(f64::NAN);
    Ok(Value::Number(if negative { -value } else { value }))
}

/// `parseFloat(string)`: the longest decimal-literal prefix.
pub fn parse_float(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let text = interp.to_string(&arg(args, 0))?;
    let trimmed = text.trim_start_matches(is_js_whitespace);
    let bytes = trimmed.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    if trimmed[i..].starts_with("Infinity") {
        return Ok(Value::Number(if bytes[0] == b'-' { f64::NEG_INFINITY } else { f64::INFINITY }));
    }
    let digits_start = i;
    while bytes.get(i).is_some_and(u8::is_ascii_digit) {
        i += 1;
    }
    let mut saw_digits = i > digits_start;
    if bytes.get(i) == Some(&b'.') {
        let mut j = i + 1;
        while bytes.get(j).is_some_and(u8::is_ascii_digit) {
            j += 1;
        }
        if j > i + 1 || saw_digits {
            saw_digits |= j > i + 1;
            i = j;
        }
    }
    if !saw_digits {
        return Ok(Value::Number(f64::NAN));
    }
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        let exp_start = j;
        while bytes.get(j).is_some_and(u8::is_ascii_digit) {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    Ok(Value::Number(trimmed[..i].parse().unwrap_or(f64::NAN)))
}

fn number_arg(interp: &mut Interpreter, args: &[Value], i: usize) -> Result<f64, Control> {
    interp.to_number(&arg(args, i))
}

/// Installs `Math[name]` computing `op` over its first argument.
fn unary(realm: &Realm, math: &ObjectRef, name: &str, op: fn(f64) -> f64) {
    let func = native_function(
        realm,
        name,
        1,
        Arc::new(move |interp, _, args, _| Ok(Value::Number(op(number_arg(interp, args, 0)?)))),
        false,
    );
    math.insert_hidden(name, Value::Object(func));
}

fn js_round(x: f64) -> f64 {
    if !x.is_finite() || x == 0.0 {
        return x;
    }
    if (-0.5..0.0).contains(&x) {
        return -0.0;
    }
    (x + 0.5).floor()
}

fn js_pow(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

/// Uniform in `[0, 1)` from the 53 low random bits of a v4 UUID.
fn random() -> f64 {
    let bits = uuid::Uuid::new_v4().as_u128() as u64 & ((1 << 53) - 1);
    bits as f64 / (1u64 << 53) as f64
}

fn install_math(realm: &Arc<Realm>) {
    let math = realm.object();
    for (name, value) in [
        ("PI", std::f64::consts::PI),
        ("E", std::f64::consts::E),
        ("LN2", std::f64::consts::LN_2),
        ("LN10", std::f64::consts::LN_10),
        ("LOG2E", std::f64::consts::LOG2_E),
        ("LOG10E", std::f64::consts::LOG10_E),
        ("SQRT2", std::f64::consts::SQRT_2),
        ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
    ] {
        constant(&math, name, Value::Number(value));
    }
    let _ = math.try_define(
        PropertyKey::Symbol(realm.symbols.to_string_tag.clone()),
        Property::meta(Value::string("Math")),
    );
    let ops: [(&str, fn(f64) -> f64); 25] = [
        ("abs", f64::abs),
        ("ceil", f64::ceil),
        ("floor", f64::floor),
        ("round", js_round),
        ("trunc", f64::trunc),
        ("sign", |x| if x.is_nan() || x == 0.0 { x } else { x.signum() }),
        ("sqrt", f64::sqrt),
        ("cbrt", f64::cbrt),
        ("exp", f64::exp),
        ("expm1", f64::exp_m1),
        ("log", f64::ln),
        ("log2", f64::log2),
        ("log10", f64::log10),
        ("log1p", f64::ln_1p),
        ("sin", f64::sin),
        ("cos", f64::cos),
        ("tan", f64::tan),
        ("asin", f64::asin),
        ("acos", f64::acos),
        ("atan", f64::atan),
        ("sinh", f64::sinh),
        ("cosh", f64::cosh),
        ("tanh", f64::tanh),
        ("fround", |x| f64::from(x as f32)),
        ("clz32", |x| f64::from(to_uint32(x).leading_zeros())),
    ];
    for (name, op) in ops {
        unary(realm, &math, name, op);
    }
    unary(realm, &math, "asinh", f64::asinh);
    unary(realm, &math, "acosh", f64::acosh);
    unary(realm, &math, "atanh", f64::atanh);
    method(realm, &math, "pow", 2, |interp, _, args| {
        let base = number_arg(interp, args, 0)?;
        let exponent = number_arg(interp, args, 1)?;
        Ok(Value::Number(js_pow(base, exponent)))
    });
    method(realm, &math, "atan2", 2, |interp, _, args| {
        let y = number_arg(interp, args, 0)?;
        let x = number_arg(interp, args, 1)?;
        Ok(Value::Number(y.atan2(x)))
    });
    method(realm, &math, "imul", 2, |interp, _, args| {
        let a = to_int32(number_arg(interp, args, 0)?);
        let b = to_int32(number_arg(interp, args, 1)?);
        Ok(Value::Number(f64::from(a.wrapping_mul(b))))
    });
    method(realm, &math, "hypot", 2, |interp, _, args| {
        let mut sum = 0.0_f64;
        for i in 0..args.len() {
            let n = number_arg(interp, args, i)?;
            if n.is_infinite() {
                return Ok(Value::Number(f64::INFINITY));
            }
            sum += n * n;
        }
        Ok(Value::Number(sum.sqrt()))
    });
    method(realm, &math, "max", 2, |interp, _, args| {
        let mut best = f64::NEG_INFINITY;
        for i in 0..args.len() {
            let n = number_arg(interp, args, i)?;
            if n.is_nan() || best.is_nan() {
                best = f64::NAN;
            } else if n > best || (n == 0.0 && best == 0.0 && best.is_sign_negative()) {
                best = n;
            }
        }
        Ok(Value::Number(best))
    });
    method(realm, &math, "min", 2, |interp, _, args| {
        let mut best = f64::INFINITY;
        for i in 0..args.len() {
            let n = number_arg(interp, args, i)?;
            if n.is_nan() || best.is_nan() {
                best = f64::NAN;
            } else if n < best || (n == 0.0 && best == 0.0 && n.is_sign_negative()) {
                best = n;
            }
        }
        Ok(Value::Number(best))
    });
    method(realm, &math, "random", 0, |_, _, _| Ok(Value::Number(random())));
    realm.global.insert_hidden("Math", Value::Object(math));
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{eval, eval_error, eval_string};
    use super::{to_fixed, to_precision};

    #[test]
    fn fixed_and_precision_formatting() {
        assert_eq!(to_fixed(1.005, 2), "1.00");
        assert_eq!(to_fixed(2.5, 0), "3");
        assert_eq!(to_fixed(-0.004, 2), "-0.00");
        assert_eq!(to_fixed(123.456, 1), "123.5");
        assert_eq!(to_fixed(9.999, 2), "10.00");
        assert_eq!(to_precision(123.456, 4), "123.5");
        assert_eq!(to_precision(0.000001234, 2), "0.0000012");
        assert_eq!(to_precision(1234567.0, 2), "1.2e+6");
    }

    #[test]
    fn number_methods_and_statics() {
        let value = eval_string(
            "return [(255).toString(16), (3.14159).toFixed(2), Number('0x10'), Number.isInteger(5.0),
                     Number.isSafeInteger(2 ** 53), Number.parseInt === parseInt, (1e21).toFixed(2),
                     (12345).toExponential(2)].join('|')",
        );
        assert_eq!(value, "ff|3.14|16|true|false|true|1e+21|1.23e+4");
        assert!(eval_error("(1).toString(1)").starts_with("RangeError"));
    }

    #[test]
    fn parse_int_and_parse_float_read_prefixes() {
        let value = eval_string(
            "return [parseInt('  42px'), parseInt('0x1f'), parseInt('101', 2), parseInt('-7.9'), parseInt('z'),
                     parseFloat('3.5e2kg'), parseFloat('.5'), parseFloat('-Infinity'), parseFloat('e5')].join()",
        );
        assert_eq!(value, "42,31,5,-7,NaN,350,0.5,-Infinity,NaN");
    }

    #[test]
    fn math_helpers() {
        let value = eval_string(
            "return [Math.max(1, 3, 2), Math.min(), Math.round(-2.5), Math.round(2.5), Math.sign(-3),
                     Math.pow(2, 10), Math.imul(0xffffffff, 5), Math.clz32(1), Math.hypot(3, 4),
                     Math.max(1, NaN), String(Math)].join()",
        );
        assert_eq!(value, "3,Infinity,-2,3,-1,1024,-5,31,5,NaN,[object Math]");
        let r = eval("return Math.random()");
        assert!(matches!(r, crate::script::value::Value::Number(n) if (0.0..1.0).contains(&n)));
    }

    #[test]
    fn booleans_box_and_unbox() {
        let value = eval_string("return [Boolean(''), new Boolean(false) ? 'obj' : 'prim', true.toString()].join()");
        assert_eq!(value, "false,obj,true");
    }
}
