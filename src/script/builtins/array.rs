use super::iterator::{IterKind, IteratorState, make_iterator};
use super::{arg, callback, constructor, method, symbol_method};
use crate::script::interpreter::{Control, Interpreter};
use crate::script::object::{MAX_ARRAY_LENGTH, ObjectKind, ObjectRef, set_length};
use crate::script::realm::{ErrorKind, Realm};
use crate::script::value::{PropertyKey, Value};
use std::cmp::Ordering;
use std::sync::Arc;

pub fn install(realm: &Arc<Realm>) {
    let proto = &realm.intrinsics.array_prototype;
    let ctor = constructor(
        realm,
        "Array",
        1,
        proto,
        Arc::new(|interp, _, args, _| match args {
            [Value::Number(n)] => {
                let mut items = Vec::new();
                set_length(&mut items, *n).map_err(|_| interp.throw(ErrorKind::RangeError, "Invalid array length"))?;
                Ok(interp.array(items))
            }
            _ => Ok(interp.array(args.to_vec())),
        }),
    );
    method(realm, &ctor, "isArray", 1, |_, _, args| {
        Ok(Value::Bool(matches!(arg(args, 0), Value::Object(obj) if obj.is_array())))
    });
    method(realm, &ctor, "of", 0, |interp, _, args| Ok(interp.array(args.to_vec())));
    method(realm, &ctor, "from", 1, from);

    method(realm, proto, "push", 1, push);
    method(realm, proto, "pop", 0, pop);
    method(realm, proto, "shift", 0, shift);
    method(realm, proto, "unshift", 1, unshift);
    method(realm, proto, "slice", 2, slice);
    method(realm, proto, "splice", 2, splice);
    method(realm, proto, "concat", 1, concat);
    method(realm, proto, "join", 1, join);
    method(realm, proto, "toString", 0, |interp, this, _| {
        let join = interp.get_value(this, &"join".into())?;
        if join.is_callable() {
            interp.call_function(&join, this, &[])
        } else {
            Ok(Value::string("[object Array]"))
        }
    });
    method(realm, proto, "reverse", 0, reverse);
    method(realm, proto, "indexOf", 1, index_of);
    method(realm, proto, "lastIndexOf", 1, last_index_of);
    method(realm, proto, "includes", 1, includes);
    method(realm, proto, "find", 1, |interp, this, args| {
        Ok(search(interp, this, args, false)?.map_or(Value::Undefined, |(_, value)| value))
    });
    method(realm, proto, "findIndex", 1, |interp, this, args| {
        Ok(Value::Number(search(interp, this, args, false)?.map_or(-1.0, |(i, _)| i as f64)))
    });
    method(realm, proto, "findLast", 1, |interp, this, args| {
        Ok(search(interp, this, args, true)?.map_or(Value::Undefined, |(_, value)| value))
    });
    method(realm, proto, "findLastIndex", 1, |interp, this, args| {
        Ok(Value::Number(search(interp, this, args, true)?.map_or(-1.0, |(i, _)| i as f64)))
    });
    method(realm, proto, "filter", 1, filter);
    method(realm, proto, "map", 1, map);
    method(realm, proto, "forEach", 1, |interp, this, args| {
        each(interp, this, args, |_, _, _| Ok(true))?;
        Ok(Value::Undefined)
    });
    method(realm, proto, "some", 1, |interp, this, args| {
        let mut found = false;
        each(interp, this, args, |_, _, result| {
            found = result.is_truthy();
            Ok(!found)
        })?;
        Ok(Value::Bool(found))
    });
    method(realm, proto, "every", 1, |interp, this, args| {
        let mut all = true;
        each(interp, this, args, |_, _, result| {
            all = result.is_truthy();
            Ok(all)
        })?;
        Ok(Value::Bool(all))
    });
    method(realm, proto, "reduce", 1, |interp, this, args| reduce(interp, this, args, false));
    method(realm, proto, "reduceRight", 1, |interp, this, args| reduce(interp, this, args, true));
    method(realm, proto, "sort", 1, sort);
    method(realm, proto, "fill", 1, fill);
    method(realm, proto, "flat", 0, |interp, this, args| {
        let depth = match arg(args, 0) {
            Value::Undefined => 1.0,
            value => interp.to_integer(&value)?,
        };
        let (_, items) = elements(interp, this)?;
        let mut out = Vec::new();
        flatten_into(interp, items, depth, &mut out)?;
        Ok(interp.array(out))
    });
    method(realm, proto, "flatMap", 1, |interp, this, args| {
        let mapped = map(interp, this, args)?;
        let (_, items) = elements(interp, &mapped)?;
        let mut out = Vec::new();
        flatten_into(interp, items, 1.0, &mut out)?;
        Ok(interp.array(out))
    });
    method(realm, proto, "at", 1, |interp, this, args| {
        let (_, items) = elements(interp, this)?;
        let n = interp.to_integer(&arg(args, 0))?;
        let idx = if n < 0.0 { items.len() as f64 + n } else { n };
        Ok(if idx < 0.0 {
            Value::Undefined
        } else {
            items.get(idx as usize).cloned().unwrap_or_default()
        })
    });
    method(realm, proto, "keys", 0, |interp, this, _| array_iterator(interp, this, IterKind::Keys));
    method(realm, proto, "entries", 0, |interp, this, _| array_iterator(interp, this, IterKind::Entries));
    method(realm, proto, "values", 0, |interp, this, _| array_iterator(interp, this, IterKind::Values));
    let iterator = realm.symbols.iterator.clone();
    symbol_method(realm, proto, &iterator, "values", |interp, this, _| {
        array_iterator(interp, this, IterKind::Values)
    });
}

fn range_error(interp: &Interpreter) -> Control {
    interp.throw(ErrorKind::RangeError, "Invalid array length")
}

/// `this` as an object plus a snapshot of its elements.
fn elements(interp: &mut Interpreter, this: &Value) -> Result<(ObjectRef, Vec<Value>), Control> {
    let obj = interp.to_object(this)?;
    let items = match obj.array_items() {
        Some(items) => items,
        None => interp.array_like_to_vec(&Value::Object(obj.clone()))?,
    };
    Ok((obj, items))
}

/// `this` when it is a real array; mutating methods need one.
fn this_array(interp: &Interpreter, this: &Value, name: &str) -> Result<ObjectRef, Control> {
    super::this_object(interp, this, &format!("Array.prototype.{name}"), |kind| {
        matches!(kind, ObjectKind::Array(_))
    })
}

/// Runs `f` on the element vector under the write lock. `f` must not call
/// back into the interpreter.
fn with_items<R>(obj: &ObjectRef, f: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
    let mut guard = obj.write();
    if guard.frozen {
        return None;
    }
    match &mut guard.kind {
        ObjectKind::Array(items) => Some(f(items)),
        _ => None,
    }
}

fn frozen_error(interp: &Interpreter, name: &str) -> Control {
    interp.type_error(format!("Cannot modify frozen array with Array.prototype.{name}"))
}

/// Clamps a relative index (negative counts from the end) into `0..=len`.
fn relative(n: f64, len: usize) -> usize {
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

fn from(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let source = arg(args, 0);
    let iterator_key = PropertyKey::Symbol(interp.realm().symbols.iterator.clone());
    let items = if source.is_nullish() {
        return Err(interp.type_error(format!(
            "{} is not iterable",
            interp.short_description(&source)
        )));
    } else if interp.get_value(&source, &iterator_key)?.is_callable() {
        interp.iterate_to_vec(&source)?
    } else {
        interp.array_like_to_vec(&source)?
    };
    let mapper = arg(args, 1);
    if mapper.is_nullish() {
        return Ok(interp.array(items));
    }
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        out.push(interp.call_function(&mapper, &arg(args, 2), &[item, Value::Number(i as f64)])?);
    }
    Ok(interp.array(out))
}

fn push(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let obj = this_array(interp, this, "push")?;
    let len = with_items(&obj, |items| {
        if items.len() + args.len() > MAX_ARRAY_LENGTH {
            return None;
        }
        items.extend_from_slice(args);
        Some(items.len())
    })
    .ok_or_else(|| frozen_error(interp, "push"))?
    .ok_or_else(|| range_error(interp))?;
    Ok(Value::Number(len as f64))
}

fn pop(interp: &mut Interpreter, this: &Value, _: &[Value]) -> Result<Value, Control> {
    let obj = this_array(interp, this, "pop")?;
    with_items(&obj, |items| items.pop().unwrap_or_default()).ok_or_else(|| frozen_error(interp, "pop"))
}

fn shift(interp: &mut Interpreter, this: &Value, _: &[Value]) -> Result<Value, Control> {
    let obj = this_array(interp, this, "shift")?;
    with_items(&obj, |items| {
        if items.is_empty() {
            Value::Undefined
        } else {
            items.remove(0)
        }
    })
    .ok_or_else(|| frozen_error(interp, "shift"))
}

fn unshift(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let obj = this_array(interp, this, "unshift")?;
    let len = with_items(&obj, |items| {
        if items.len() + args.len() > MAX_ARRAY_LENGTH {
            return None;
        }
        items.splice(0..0, args.iter().cloned());
        Some(items.len())
    })
    .ok_or_else(|| frozen_error(interp, "unshift"))?
    .ok_or_else(|| range_error(interp))?;
    Ok(Value::Number(len as f64))
}

fn slice(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let (_, items) = elements(interp, this)?;
    let len = items.len();
    let start = relative(interp.to_integer(&arg(args, 0))?, len);
    let end = match arg(args, 1) {
        Value::Undefined => len,
        value => relative(interp.to_integer(&value)?, len),
    };
    let out = items.get(start..end.max(start)).unwrap_or_default().to_vec();
    Ok(interp.array(out))
}

fn splice(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let obj = this_array(interp, this, "splice")?;
    let len = obj.array_len().unwrap_or(0);
    let start = relative(interp.to_integer(&arg(args, 0))?, len);
    let delete = match args.len() {
        0 => 0,
        1 => len - start,
        _ => interp.to_integer(&args[1])?.clamp(0.0, (len - start) as f64) as usize,
    };
    let inserted = args.get(2..).unwrap_or_default();
    let removed = with_items(&obj, |items| {
        let start = start.min(items.len());
        let end = (start + delete).min(items.len());
        if items.len() - (end - start) + inserted.len() > MAX_ARRAY_LENGTH {
            return None;
        }
        Some(items.splice(start..end, inserted.iter().cloned()).collect::<Vec<_>>())
    })
    .ok_or_else(|| frozen_error(interp, "splice"))?
    .ok_or_else(|| range_error(interp))?;
    Ok(interp.array(removed))
}

fn concat(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let (obj, mut out) = elements(interp, this)?;
    if !obj.is_array() {
        out = vec![Value::Object(obj)];
    }
    for value in args {
        match value {
            Value::Object(other) if other.is_array() => out.extend(other.array_items().unwrap_or_default()),
            other => out.push(other.clone()),
        }
        if out.len() > MAX_ARRAY_LENGTH {
            return Err(range_error(interp));
        }
    }
    Ok(interp.array(out))
}

fn join(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let (_, items) = elements(interp, this)?;
    let separator = match arg(args, 0) {
        Value::Undefined => ",".into(),
        value => interp.to_string(&value)?,
    };
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(&separator);
        }
        if !item.is_nullish() {
            out.push_str(&interp.to_string(item)?);
        }
    }
    Ok(Value::string(out))
}

fn reverse(interp: &mut Interpreter, this: &Value, _: &[Value]) -> Result<Value, Control> {
    let obj = this_array(interp, this, "reverse")?;
    with_items(&obj, |items| items.reverse()).ok_or_else(|| frozen_error(interp, "reverse"))?;
    Ok(this.clone())
}

fn start_index(interp: &mut Interpreter, args: &[Value], len: usize) -> Result<usize, Control> {
    Ok(relative(interp.to_integer(&arg(args, 1))?, len))
}

fn index_of(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let (_, items) = elements(interp, this)?;
    let target = arg(args, 0);
    let start = start_index(interp, args, items.len())?;
    let found = items
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, item)| item.strict_equals(&target));
    Ok(Value::Number(found.map_or(-1.0, |(i, _)| i as f64)))
}

fn last_index_of(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let (_, items) = elements(interp, this)?;
    let target = arg(args, 0);
    let end = match args.get(1) {
        None => items.len(),
        Some(value) => {
            let n = interp.to_integer(value)?;
            let idx = if n < 0.0 { items.len() as f64 + n } else { n };
            if idx < 0.0 {
                return Ok(Value::Number(-1.0));
            }
            (idx as usize + 1).min(items.len())
        }
    };
    let found = items[..end].iter().rposition(|item| item.strict_equals(&target));
    Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
}

fn includes(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let (_, items) = elements(interp, this)?;
    let target = arg(args, 0);
    let start = start_index(interp, args, items.len())?;
    Ok(Value::Bool(items.iter().skip(start).any(|item| item.same_value_zero(&target))))
}

/// Calls the callback in `args[0]` on each element until `visit` returns
/// `false`. The length is fixed up front; elements are read live.
fn each(
    interp: &mut Interpreter,
    this: &Value,
    args: &[Value],
    mut visit: impl FnMut(usize, &Value, Value) -> Result<bool, Control>,
) -> Result<(), Control> {
    let obj = interp.to_object(this)?;
    let target = Value::Object(obj.clone());
    let f = callback(interp, args, 0)?;
    let this_arg = arg(args, 1);
    let len = match obj.array_len() {
        Some(len) => len,
        None => interp.array_like_to_vec(&target)?.len(),
    };
    for i in 0..len {
        let item = interp.get_value(&target, &PropertyKey::from(i))?;
        let result = interp.call_function(&f, &this_arg, &[item.clone(), Value::Number(i as f64), target.clone()])?;
        if !visit(i, &item, result)? {
            break;
        }
    }
    Ok(())
}

fn search(interp: &mut Interpreter, this: &Value, args: &[Value], from_end: bool) -> Result<Option<(usize, Value)>, Control> {
    let (obj, items) = elements(interp, this)?;
    let target = Value::Object(obj);
    let f = callback(interp, args, 0)?;
    let this_arg = arg(args, 1);
    let order: Box<dyn Iterator<Item = usize>> = if from_end {
        Box::new((0..items.len()).rev())
    } else {
        Box::new(0..items.len())
    };
    for i in order {
        let item = items[i].clone();
        let hit = interp.call_function(&f, &this_arg, &[item.clone(), Value::Number(i as f64), target.clone()])?;
        if hit.is_truthy() {
            return Ok(Some((i, item)));
        }
    }
    Ok(None)
}

fn filter(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let mut out = Vec::new();
    each(interp, this, args, |_, item, result| {
        if result.is_truthy() {
            out.push(item.clone());
        }
        Ok(true)
    })?;
    Ok(interp.array(out))
}

fn map(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let mut out = Vec::new();
    each(interp, this, args, |_, _, result| {
        out.push(result);
        Ok(true)
    })?;
    Ok(interp.array(out))
}

fn reduce(interp: &mut Interpreter, this: &Value, args: &[Value], from_end: bool) -> Result<Value, Control> {
    let (obj, mut items) = elements(interp, this)?;
    let target = Value::Object(obj);
    let f = callback(interp, args, 0)?;
    let mut indices: Vec<usize> = (0..items.len()).collect();
    if from_end {
        indices.reverse();
    }
    let mut indices = indices.into_iter();
    let mut acc = match args.get(1) {
        Some(initial) => initial.clone(),
        None => match indices.next() {
            Some(i) => std::mem::take(&mut items[i]),
            None => return Err(interp.type_error("Reduce of empty array with no initial value")),
        },
    };
    for i in indices {
        let item = std::mem::take(&mut items[i]);
        acc = interp.call_function(
            &f,
            &Value::Undefined,
            &[acc, item, Value::Number(i as f64), target.clone()],
        )?;
    }
    Ok(acc)
}

fn compare(interp: &mut Interpreter, comparator: &Value, a: &Value, b: &Value) -> Result<Ordering, Control> {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => return Ok(Ordering::Equal),
        (Value::Undefined, _) => return Ok(Ordering::Greater),
        (_, Value::Undefined) => return Ok(Ordering::Less),
        _ => {}
    }
    if comparator.is_callable() {
        let result = interp.call_function(comparator, &Value::Undefined, &[a.clone(), b.clone()])?;
        let n = interp.to_number(&result)?;
        return Ok(if n < 0.0 {
            Ordering::Less
        } else if n > 0.0 {
            Ordering::Greater
        } else {
            Ordering::Equal
        });
    }
    let a = interp.to_string(a)?;
    let b = interp.to_string(b)?;
    Ok(a.encode_utf16().cmp(b.encode_utf16()))
}

/// Stable merge sort with a comparator that may throw.
fn merge_sort(interp: &mut Interpreter, comparator: &Value, items: Vec<Value>) -> Result<Vec<Value>, Control> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let left = merge_sort(interp, comparator, left)?;
    let right = merge_sort(interp, comparator, right)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let order = match (left.peek(), right.peek()) {
            (Some(a), Some(b)) => compare(interp, comparator, a, b)?,
            _ => break,
        };
        if order == Ordering::Greater {
            out.extend(right.next());
        } else {
            out.extend(left.next());
        }
    }
    out.extend(left);
    out.extend(right);
    Ok(out)
}

fn sort(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let comparator = arg(args, 0);
    if !(comparator.is_callable() || matches!(comparator, Value::Undefined)) {
        return Err(interp.type_error(
            "The comparison function must be either a function or undefined",
        ));
    }
    let obj = this_array(interp, this, "sort")?;
    let items = obj.array_items().unwrap_or_default();
    let sorted = merge_sort(interp, &comparator, items)?;
    with_items(&obj, |items| {
        items.clear();
        items.extend(sorted);
    })
    .ok_or_else(|| frozen_error(interp, "sort"))?;
    Ok(this.clone())
}

fn fill(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let obj = this_array(interp, this, "fill")?;
    let len = obj.array_len().unwrap_or(0);
    let start = relative(interp.to_integer(&arg(args, 1))?, len);
    let end = match arg(args, 2) {
        Value::Undefined => len,
        value => relative(interp.to_integer(&value)?, len),
    };
    let value = arg(args, 0);
    with_items(&obj, |items| {
        for slot in items.iter_mut().take(end).skip(start) {
            *slot = value.clone();
        }
    })
    .ok_or_else(|| frozen_error(interp, "fill"))?;
    Ok(this.clone())
}

fn flatten_into(interp: &mut Interpreter, items: Vec<Value>, depth: f64, out: &mut Vec<Value>) -> Result<(), Control> {
    for item in items {
        match &item {
            Value::Object(inner) if depth >= 1.0 && inner.is_array() => {
                let nested = inner.array_items().unwrap_or_default();
                crate::script::ensure_sufficient_stack(|| flatten_into(interp, nested, depth - 1.0, out))?;
            }
            _ => out.push(item),
        }
        if out.len() > MAX_ARRAY_LENGTH {
            return Err(range_error(interp));
        }
    }
    Ok(())
}

fn array_iterator(interp: &mut Interpreter, this: &Value, kind: IterKind) -> Result<Value, Control> {
    let obj = interp.to_object(this)?;
    let state = if obj.is_array() {
        IteratorState::Array {
            target: obj,
            index: 0,
            kind,
        }
    } else {
        let items = interp.array_like_to_vec(&Value::Object(obj))?;
        IteratorState::list(items, kind)
    };
    Ok(make_iterator(interp, state))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{eval_error, eval_string};

    #[test]
    fn mutators_and_slices() {
        let value = eval_string(
            "var a = [1, 2, 3];
             a.push(4, 5); a.shift(); a.unshift(0); a.pop();
             var removed = a.splice(1, 2, 'x');
             return [a.join(), removed.join(), a.slice(-2).join(), a.concat([9], 8).length].join('|')",
        );
        assert_eq!(value, "0,x,4|2,3|x,4|5");
    }

    #[test]
    fn callbacks_and_reductions() {
        let value = eval_string(
            "var a = [10, 20, 30, 40];
             var doubled = a.map(function (x) { return x * 2 });
             var big = a.filter(x => x > 15);
             var sum = a.reduce((acc, x) => acc + x, 0);
             return [doubled[1], big.join('-'), sum, a.some(x => x === 30), a.every(x => x > 10),
                     a.find(x => x > 25), a.findIndex(x => x > 100), a.indexOf(40)].join(':')",
        );
        assert_eq!(value, "40:20-30-40:100:true:false:30:-1:3");
    }

    #[test]
    fn sort_is_stable_and_puts_undefined_last() {
        let value = eval_string(
            "var people = [{ n: 'b', a: 2 }, { n: 'a', a: 1 }, { n: 'c', a: 2 }];
             people.sort((x, y) => x.a - y.a);
             var mixed = [3, undefined, 10, 1].sort();
             return people.map(p => p.n).join('') + '|' + mixed.join(',')",
        );
        assert_eq!(value, "abc|1,10,3,");
    }

    #[test]
    fn from_of_flat_and_iterators() {
        let value = eval_string(
            "var fromString = Array.from('hé');
             var fromLike = Array.from({ length: 3 }, (_, i) => i * i);
             var flat = [1, [2, [3, [4]]]].flat(2);
             var pairs = [];
             for (const [i, v] of ['a', 'b'].entries()) pairs.push(i + v);
             return [fromString.join(''), fromLike.join(), flat.length, pairs.join(), Array.of(7).length,
                     [1, 2, 3].at(-1), [NaN].includes(NaN), [NaN].indexOf(NaN)].join('|')",
        );
        assert_eq!(value, "hé|0,1,4|4|0a,1b|1|3|true|-1");
    }

    #[test]
    fn reduce_of_empty_without_initial_value_throws() {
        assert_eq!(
            eval_error("[].reduce((a, b) => a + b)"),
            "TypeError: Reduce of empty array with no initial value"
        );
        assert_eq!(eval_error("new Array(-1)"), "RangeError: Invalid array length");
    }

    #[test]
    fn frozen_arrays_reject_mutation() {
        let err = eval_error("var a = Object.freeze([1]); a.push(2);");
        assert_eq!(err, "TypeError: Cannot modify frozen array with Array.prototype.push");
    }
}
