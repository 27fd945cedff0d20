//! `Date` on top of chrono. Payloads run with UTC as their local zone.

use super::{arg, constructor, function, method, this_object};
use crate::script::interpreter::{Control, Hint, Interpreter};
use crate::script::object::{NativeFn, ObjectKind, ObjectRef};
use crate::script::realm::{ErrorKind, Realm};
use crate::script::value::Value;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use std::sync::Arc;

const MS_PER_DAY: f64 = 86_400_000.0;
/// Largest time value, in milliseconds either side of the epoch.
const MAX_TIME: f64 = 8.64e15;
const ZONE_SUFFIX: &str = "GMT+0000 (Coordinated Universal Time)";

type Field = fn(&DateTime<Utc>) -> f64;

pub fn install(realm: &Arc<Realm>) {
    let proto = &realm.intrinsics.date_prototype;
    let ctor = constructor(
        realm,
        "Date",
        7,
        proto,
        Arc::new(|interp, _, args, new_target| {
            let Some(new_target) = new_target else {
                return Ok(Value::string(full_string(now())));
            };
            let time = match args {
                [] => now(),
                [single] => {
                    let existing = match single {
                        Value::Object(obj) => match obj.read().kind {
                            ObjectKind::Date(time) => Some(time),
                            _ => None,
                        },
                        _ => None,
                    };
                    match existing {
                        Some(time) => time,
                        None => match interp.to_primitive(single, Hint::Default)? {
                            Value::String(s) => parse_date(&s),
                            other => time_clip(interp.to_number(&other)?),
                        },
                    }
                }
                _ => time_clip(make_date(components(interp, args)?)),
            };
            let fallback = interp.realm().intrinsics.date_prototype.clone();
            let proto = interp.prototype_for(new_target, fallback)?;
            Ok(Value::Object(ObjectRef::new(ObjectKind::Date(time), Some(proto))))
        }),
    );
    method(realm, &ctor, "now", 0, |_, _, _| Ok(Value::Number(now())));
    method(realm, &ctor, "parse", 1, |interp, _, args| {
        let text = interp.to_string(&arg(args, 0))?;
        Ok(Value::Number(parse_date(&text)))
    });
    method(realm, &ctor, "UTC", 7, |interp, _, args| {
        Ok(Value::Number(time_clip(make_date(components(interp, args)?))))
    });

    method(realm, proto, "getTime", 0, |interp, this, _| this_time(interp, this).map(Value::Number));
    method(realm, proto, "valueOf", 0, |interp, this, _| this_time(interp, this).map(Value::Number));
    method(realm, proto, "getTimezoneOffset", 0, |interp, this, _| {
        let time = this_time(interp, this)?;
        Ok(Value::Number(if time.is_nan() { f64::NAN } else { 0.0 }))
    });
    let fields: [(&str, Field); 8] = [
        ("FullYear", |dt| dt.year() as f64),
        ("Month", |dt| dt.month0() as f64),
        ("Date", |dt| dt.day() as f64),
        ("Day", |dt| dt.weekday().num_days_from_sunday() as f64),
        ("Hours", |dt| dt.hour() as f64),
        ("Minutes", |dt| dt.minute() as f64),
        ("Seconds", |dt| dt.second() as f64),
        ("Milliseconds", |dt| dt.timestamp_subsec_millis() as f64),
    ];
    for (name, field) in fields {
        let read: NativeFn = Arc::new(move |interp, this, _, _| {
            let time = this_time(interp, this)?;
            Ok(Value::Number(to_datetime(time).map_or(f64::NAN, |dt| field(&dt))))
        });
        for prefix in ["get", "getUTC"] {
            let name = format!("{prefix}{name}");
            let getter = super::native_function(realm, &name, 0, read.clone(), false);
            proto.insert_hidden(name.as_str(), Value::Object(getter));
        }
    }

    method(realm, proto, "setTime", 1, |interp, this, args| {
        let date = this_date(interp, this)?;
        let time = time_clip(interp.to_number(&arg(args, 0))?);
        date.write().kind = ObjectKind::Date(time);
        Ok(Value::Number(time))
    });
    let setters: [(&str, usize, usize); 7] = [
        ("FullYear", 0, 3),
        ("Month", 1, 2),
        ("Date", 2, 1),
        ("Hours", 3, 4),
        ("Minutes", 4, 3),
        ("Seconds", 5, 2),
        ("Milliseconds", 6, 1),
    ];
    for (name, start, max_args) in setters {
        let write: NativeFn = Arc::new(move |interp, this, args, _| {
            let date = this_date(interp, this)?;
            let current = this_time(interp, this)?;
            let base = if current.is_nan() && start == 0 { 0.0 } else { current };
            let mut parts = match to_datetime(base) {
                Some(dt) => decompose(&dt),
                None => return Ok(Value::Number(f64::NAN)),
            };
            for (offset, value) in args.iter().take(max_args).enumerate() {
                parts[start + offset] = interp.to_number(value)?;
            }
            if args.is_empty() {
                parts[start] = f64::NAN;
            }
            let time = time_clip(make_date(parts));
            date.write().kind = ObjectKind::Date(time);
            Ok(Value::Number(time))
        });
        for prefix in ["set", "setUTC"] {
            let name = format!("{prefix}{name}");
            let setter = super::native_function(realm, &name, max_args, write.clone(), false);
            proto.insert_hidden(name.as_str(), Value::Object(setter));
        }
    }

    method(realm, proto, "toISOString", 0, |interp, this, _| {
        let time = this_time(interp, this)?;
        let dt = to_datetime(time).ok_or_else(|| interp.throw(ErrorKind::RangeError, "Invalid time value"))?;
        Ok(Value::string(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()))
    });
    method(realm, proto, "toJSON", 1, |interp, this, _| {
        let primitive = interp.to_primitive(this, Hint::Number)?;
        if let Value::Number(n) = primitive
            && !n.is_finite()
        {
            return Ok(Value::Null);
        }
        let to_iso = interp.get_value(this, &"toISOString".into())?;
        interp.call_function(&to_iso, this, &[])
    });
    let formats: [(&str, fn(f64) -> String); 7] = [
        ("toString", full_string),
        ("toDateString", |t| formatted(t, "%a %b %d %Y")),
        ("toTimeString", |t| formatted(t, &format!("%H:%M:%S {ZONE_SUFFIX}"))),
        ("toUTCString", |t| formatted(t, "%a, %d %b %Y %H:%M:%S GMT")),
        ("toLocaleString", |t| formatted(t, "%-m/%-d/%Y, %-I:%M:%S %p")),
        ("toLocaleDateString", |t| formatted(t, "%-m/%-d/%Y")),
        ("toLocaleTimeString", |t| formatted(t, "%-I:%M:%S %p")),
    ];
    for (name, format) in formats {
        let render: NativeFn = Arc::new(move |interp, this, _, _| {
            let time = this_time(interp, this)?;
            Ok(Value::string(format(time)))
        });
        let render = super::native_function(realm, name, 0, render, false);
        proto.insert_hidden(name, Value::Object(render));
    }
    proto.insert_hidden("toGMTString", function(realm, "toUTCString", 0, |interp, this, _| {
        let time = this_time(interp, this)?;
        Ok(Value::string(formatted(time, "%a, %d %b %Y %H:%M:%S GMT")))
    }));
}

fn this_date(interp: &Interpreter, this: &Value) -> Result<ObjectRef, Control> {
    this_object(interp, this, "Date.prototype method", |kind| matches!(kind, ObjectKind::Date(_)))
}

fn this_time(interp: &Interpreter, this: &Value) -> Result<f64, Control> {
    let date = this_date(interp, this)?;
    let time = match date.read().kind {
        ObjectKind::Date(time) => time,
        _ => f64::NAN,
    };
    Ok(time)
}

fn now() -> f64 {
    Utc::now().timestamp_millis() as f64
}

fn time_clip(time: f64) -> f64 {
    if !time.is_finite() || time.abs() > MAX_TIME {
        return f64::NAN;
    }
    time.trunc() + 0.0
}

fn to_datetime(time: f64) -> Option<DateTime<Utc>> {
    if !time.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis(time as i64)
}

fn decompose(dt: &DateTime<Utc>) -> [f64; 7] {
    [
        dt.year() as f64,
        dt.month0() as f64,
        dt.day() as f64,
        dt.hour() as f64,
        dt.minute() as f64,
        dt.second() as f64,
        dt.timestamp_subsec_millis() as f64,
    ]
}

/// Year, month and the optional day and time fields of `new Date(y, m, …)`.
fn components(interp: &mut Interpreter, args: &[Value]) -> Result<[f64; 7], Control> {
    let mut parts = [f64::NAN, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
    for (i, value) in args.iter().take(7).enumerate() {
        parts[i] = interp.to_number(value)?;
    }
    let year = parts[0].trunc();
    if (0.0..=99.0).contains(&year) {
        parts[0] = 1900.0 + year;
    }
    Ok(parts)
}

/// Milliseconds since the epoch; out-of-range months and days carry over.
fn make_date(parts: [f64; 7]) -> f64 {
    if parts.iter().any(|part| !part.is_finite()) {
        return f64::NAN;
    }
    let [year, month, day, hours, minutes, seconds, millis] = parts.map(f64::trunc);
    let year = year + (month / 12.0).floor();
    let month = month.rem_euclid(12.0);
    if year.abs() > 275_000.0 {
        return f64::NAN;
    }
    let Some(first) = NaiveDate::from_ymd_opt(year as i32, month as u32 + 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return f64::NAN;
    };
    let month_start = first.and_utc().timestamp_millis() as f64;
    month_start + (day - 1.0) * MS_PER_DAY + hours * 3_600_000.0 + minutes * 60_000.0 + seconds * 1_000.0 + millis
}

/// Accepts ISO 8601 (date-only forms are UTC), RFC 2822 and the `toString` form.
fn parse_date(text: &str) -> f64 {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return time_clip(dt.timestamp_millis() as f64);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return time_clip(naive.and_utc().timestamp_millis() as f64);
        }
    }
    let padded = match text.len() {
        4 => format!("{text}-01-01"),
        7 => format!("{text}-01"),
        _ => text.to_string(),
    };
    if let Ok(date) = NaiveDate::parse_from_str(&padded, "%Y-%m-%d")
        && let Some(midnight) = date.and_hms_opt(0, 0, 0)
    {
        return time_clip(midnight.and_utc().timestamp_millis() as f64);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return time_clip(dt.timestamp_millis() as f64);
    }
    let without_zone_name = text.split(" (").next().unwrap_or(text);
    if let Ok(dt) = DateTime::parse_from_str(without_zone_name, "%a %b %d %Y %H:%M:%S GMT%z") {
        return time_clip(dt.timestamp_millis() as f64);
    }
    f64::NAN
}

fn formatted(time: f64, format: &str) -> String {
    match to_datetime(time) {
        Some(dt) => dt.format(format).to_string(),
        None => "Invalid Date".to_string(),
    }
}

fn full_string(time: f64) -> String {
    formatted(time, &format!("%a %b %d %Y %H:%M:%S {ZONE_SUFFIX}"))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{eval, eval_error, eval_string};
    use super::*;

    #[test]
    fn month_and_day_overflow_carries_into_the_year() {
        let jan_2025 = make_date([2024.0, 12.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(jan_2025, 1_735_689_600_000.0);
        assert_eq!(make_date([1970.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]), -MS_PER_DAY);
        assert!(make_date([f64::NAN, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]).is_nan());
    }

    #[test]
    fn parses_iso_rfc_and_display_forms() {
        let expected = 1_709_208_000_000.0;
        assert_eq!(parse_date("2024-02-29T12:00:00Z"), expected);
        assert_eq!(parse_date("2024-02-29T12:00:00.000+00:00"), expected);
        assert_eq!(parse_date("Thu, 29 Feb 2024 12:00:00 GMT"), expected);
        assert_eq!(parse_date("Thu Feb 29 2024 12:00:00 GMT+0000 (Coordinated Universal Time)"), expected);
        assert_eq!(parse_date("2024-02-29"), expected - 12.0 * 3_600_000.0);
        assert!(parse_date("not a date").is_nan());
    }

    #[test]
    fn fields_and_renderings_use_utc() {
        let value = eval_string(
            "var d = new Date(Date.UTC(2024, 0, 15, 10, 30, 5, 7));
             return [d.toISOString(), d.getDay(), d.getMonth(), d.getUTCHours(), d.getTimezoneOffset(),
                     d.toUTCString(), String(d), JSON.stringify({ d: new Date(0) })].join('|')",
        );
        assert_eq!(
            value,
            "2024-01-15T10:30:05.007Z|1|0|10|0|Mon, 15 Jan 2024 10:30:05 GMT|\
             Mon Jan 15 2024 10:30:05 GMT+0000 (Coordinated Universal Time)|{\"d\":\"1970-01-01T00:00:00.000Z\"}"
        );
    }

    #[test]
    fn setters_recompute_and_arithmetic_uses_the_time_value() {
        let value = eval_string(
            "var d = new Date(0); d.setFullYear(2000); d.setMonth(1, 29); d.setHours(25);
             return [d.toISOString(), new Date(5) - new Date(2), new Date(2024, 12, 1).getFullYear(),
                     typeof Date(), new Date(new Date(42)).getTime()].join('|')",
        );
        assert_eq!(value, "2000-03-01T01:00:00.000Z|3|2025|string|42");
        assert!(matches!(eval("return Date.now()"), Value::Number(n) if n > 1.6e12));
    }

    #[test]
    fn invalid_dates_render_and_throw() {
        assert_eq!(eval_string("return String(new Date(NaN))"), "Invalid Date");
        assert_eq!(eval_string("return String(new Date('nope').getTime())"), "NaN");
        assert_eq!(eval_string("return JSON.stringify([new Date(NaN)])"), "[null]");
        assert_eq!(
            eval_error("new Date(NaN).toISOString()"),
            "RangeError: Invalid time value"
        );
    }
}
