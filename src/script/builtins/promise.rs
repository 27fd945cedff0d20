//! Promises settle through the interpreter's job queue, which drains before
//! a payload run returns.

use super::{arg, constructor, method, native_function, this_object};
use crate::script::interpreter::{Control, Interpreter};
use crate::script::object::{NativeFn, ObjectKind, ObjectRef, Property};
use crate::script::realm::{ErrorKind, Realm};
use crate::script::value::{PropertyKey, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct Reaction {
    handler: Value,
    derived: ObjectRef,
}

pub enum PromiseState {
    Pending {
        fulfill_reactions: Vec<Reaction>,
        reject_reactions: Vec<Reaction>,
    },
    Fulfilled(Value),
    Rejected(Value),
}

impl PromiseState {
    fn pending() -> Self {
        Self::Pending {
            fulfill_reactions: Vec::new(),
            reject_reactions: Vec::new(),
        }
    }

    pub fn into_values(self) -> Vec<Value> {
        match self {
            Self::Pending {
                fulfill_reactions,
                reject_reactions,
            } => fulfill_reactions
                .into_iter()
                .chain(reject_reactions)
                .flat_map(|reaction| [reaction.handler, Value::Object(reaction.derived)])
                .collect(),
            Self::Fulfilled(value) | Self::Rejected(value) => vec![value],
        }
    }
}

pub fn install(realm: &Arc<Realm>) {
    let proto = &realm.intrinsics.promise_prototype;
    let ctor = constructor(
        realm,
        "Promise",
        1,
        proto,
        Arc::new(|interp, _, args, new_target| {
            let Some(new_target) = new_target else {
                return Err(interp.type_error("Promise constructor cannot be invoked without 'new'"));
            };
            let executor = arg(args, 0);
            if !executor.is_callable() {
                return Err(interp.type_error(format!(
                    "Promise resolver {} is not a function",
                    interp.short_description(&executor)
                )));
            }
            let fallback = interp.realm().intrinsics.promise_prototype.clone();
            let proto = interp.prototype_for(new_target, fallback)?;
            let promise = ObjectRef::new(ObjectKind::Promise(PromiseState::pending()), Some(proto));
            let (resolve, reject) = resolving_functions(interp, &promise);
            match interp.call_function(&executor, &Value::Undefined, &[resolve, reject.clone()]) {
                Err(Control::Throw(reason)) => {
                    interp.call_function(&reject, &Value::Undefined, &[reason])?;
                }
                Err(other) => return Err(other),
                Ok(_) => {}
            }
            Ok(Value::Object(promise))
        }),
    );
    method(realm, &ctor, "resolve", 1, |interp, _, args| {
        promise_resolve(interp, arg(args, 0)).map(Value::Object)
    });
    method(realm, &ctor, "reject", 1, |interp, _, args| {
        let promise = new_promise(interp);
        settle(interp, &promise, arg(args, 0), true);
        Ok(Value::Object(promise))
    });
    method(realm, &ctor, "all", 1, |interp, _, args| gather(interp, args, false));
    method(realm, &ctor, "allSettled", 1, |interp, _, args| gather(interp, args, true));
    method(realm, &ctor, "race", 1, race);

    method(realm, proto, "then", 2, |interp, this, args| {
        let promise = this_promise(interp, this, "Promise.prototype.then")?;
        Ok(Value::Object(perform_then(interp, &promise, arg(args, 0), arg(args, 1))))
    });
    method(realm, proto, "catch", 1, |interp, this, args| {
        let then = interp.get_value(this, &"then".into())?;
        interp.call_function(&then, this, &[Value::Undefined, arg(args, 0)])
    });
    method(realm, proto, "finally", 1, finally);
    let _ = proto.try_define(
        PropertyKey::Symbol(realm.symbols.to_string_tag.clone()),
        Property::meta(Value::string("Promise")),
    );
}

fn this_promise(interp: &Interpreter, this: &Value, method: &str) -> Result<ObjectRef, Control> {
    this_object(interp, this, method, |kind| matches!(kind, ObjectKind::Promise(_)))
}

pub fn new_promise(interp: &Interpreter) -> ObjectRef {
    ObjectRef::new(
        ObjectKind::Promise(PromiseState::pending()),
        Some(interp.realm().intrinsics.promise_prototype.clone()),
    )
}

/// `Promise.resolve(value)`: promises pass through, anything else is adopted.
pub fn promise_resolve(interp: &mut Interpreter, value: Value) -> Result<ObjectRef, Control> {
    if let Value::Object(obj) = &value
        && matches!(obj.read().kind, ObjectKind::Promise(_))
    {
        return Ok(obj.clone());
    }
    let promise = new_promise(interp);
    resolve_promise(interp, &promise, value)?;
    Ok(promise)
}

/// Resolves `promise` with `resolution`, following thenables in a job.
pub fn resolve_promise(interp: &mut Interpreter, promise: &ObjectRef, resolution: Value) -> Result<(), Control> {
    if let Value::Object(obj) = &resolution {
        if obj.ptr_eq(promise) {
            let error = interp.error_object(ErrorKind::TypeError, "Chaining cycle detected for promise #<Promise>");
            settle(interp, promise, Value::Object(error), true);
            return Ok(());
        }
        let then = match interp.get_value(&resolution, &"then".into()) {
            Ok(then) => then,
            Err(Control::Throw(reason)) => {
                settle(interp, promise, reason, true);
                return Ok(());
            }
            Err(other) => return Err(other),
        };
        if then.is_callable() {
            let promise = promise.clone();
            interp.enqueue_job(Box::new(move |interp| {
                let (resolve, reject) = resolving_functions(interp, &promise);
                match interp.call_function(&then, &resolution, &[resolve, reject.clone()]) {
                    Err(Control::Throw(reason)) => interp.call_function(&reject, &Value::Undefined, &[reason]).map(|_| ()),
                    other => other.map(|_| ()),
                }
            }));
            return Ok(());
        }
    }
    settle(interp, promise, resolution, false);
    Ok(())
}

/// Fulfills or rejects a pending promise and schedules its reactions.
fn settle(interp: &mut Interpreter, promise: &ObjectRef, value: Value, rejected: bool) {
    let reactions = {
        let mut obj = promise.write();
        let ObjectKind::Promise(state) = &mut obj.kind else {
            return;
        };
        if !matches!(state, PromiseState::Pending { .. }) {
            return;
        }
        let settled = if rejected {
            PromiseState::Rejected(value.clone())
        } else {
            PromiseState::Fulfilled(value.clone())
        };
        match std::mem::replace(state, settled) {
            PromiseState::Pending {
                fulfill_reactions,
                reject_reactions,
            } => {
                if rejected {
                    reject_reactions
                } else {
                    fulfill_reactions
                }
            }
            _ => Vec::new(),
        }
    };
    for reaction in reactions {
        enqueue_reaction(interp, reaction, value.clone(), rejected);
    }
}

fn enqueue_reaction(interp: &mut Interpreter, reaction: Reaction, argument: Value, rejected: bool) {
    interp.enqueue_job(Box::new(move |interp| {
        let Reaction { handler, derived } = reaction;
        if !handler.is_callable() {
            if rejected {
                settle(interp, &derived, argument, true);
                return Ok(());
            }
            return resolve_promise(interp, &derived, argument);
        }
        match interp.call_function(&handler, &Value::Undefined, &[argument]) {
            Ok(value) => resolve_promise(interp, &derived, value),
            Err(Control::Throw(reason)) => {
                settle(interp, &derived, reason, true);
                Ok(())
            }
            Err(other) => Err(other),
        }
    }));
}

/// The `resolve` and `reject` pair handed to executors; only the first call counts.
fn resolving_functions(interp: &Interpreter, promise: &ObjectRef) -> (Value, Value) {
    let already_resolved = Arc::new(AtomicBool::new(false));
    let (target, flag) = (promise.clone(), already_resolved.clone());
    let resolve: NativeFn = Arc::new(move |interp, _, args, _| {
        if !flag.swap(true, Ordering::SeqCst) {
            resolve_promise(interp, &target, arg(args, 0))?;
        }
        Ok(Value::Undefined)
    });
    let (target, flag) = (promise.clone(), already_resolved);
    let reject: NativeFn = Arc::new(move |interp, _, args, _| {
        if !flag.swap(true, Ordering::SeqCst) {
            settle(interp, &target, arg(args, 0), true);
        }
        Ok(Value::Undefined)
    });
    let realm = interp.realm();
    (
        Value::Object(native_function(realm, "", 1, resolve, false)),
        Value::Object(native_function(realm, "", 1, reject, false)),
    )
}

/// Registers reactions on `promise` and returns the derived promise.
pub fn perform_then(interp: &mut Interpreter, promise: &ObjectRef, on_fulfilled: Value, on_rejected: Value) -> ObjectRef {
    let derived = new_promise(interp);
    let fulfill = Reaction {
        handler: on_fulfilled,
        derived: derived.clone(),
    };
    let reject = Reaction {
        handler: on_rejected,
        derived: derived.clone(),
    };
    let settled = match &mut promise.write().kind {
        ObjectKind::Promise(PromiseState::Pending {
            fulfill_reactions,
            reject_reactions,
        }) => {
            fulfill_reactions.push(fulfill);
            reject_reactions.push(reject);
            None
        }
        ObjectKind::Promise(PromiseState::Fulfilled(value)) => Some((fulfill, value.clone(), false)),
        ObjectKind::Promise(PromiseState::Rejected(value)) => Some((reject, value.clone(), true)),
        _ => None,
    };
    if let Some((reaction, value, rejected)) = settled {
        enqueue_reaction(interp, reaction, value, rejected);
    }
    derived
}

fn finally(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let promise = this_promise(interp, this, "Promise.prototype.finally")?;
    let on_finally = arg(args, 0);
    if !on_finally.is_callable() {
        return Ok(Value::Object(perform_then(interp, &promise, on_finally.clone(), on_finally)));
    }
    let handler = |on_finally: Value, rejected: bool| -> NativeFn {
        Arc::new(move |interp, _, args, _| {
            let outcome = arg(args, 0);
            let result = interp.call_function(&on_finally, &Value::Undefined, &[])?;
            let waited = promise_resolve(interp, result)?;
            let pass_through: NativeFn = Arc::new(move |_, _, _, _| {
                if rejected {
                    Err(Control::Throw(outcome.clone()))
                } else {
                    Ok(outcome.clone())
                }
            });
            let pass_through = native_function(interp.realm(), "", 0, pass_through, false);
            Ok(Value::Object(perform_then(interp, &waited, Value::Object(pass_through), Value::Undefined)))
        })
    };
    let realm = interp.realm().clone();
    let on_fulfilled = native_function(&realm, "", 1, handler(on_finally.clone(), false), false);
    let on_rejected = native_function(&realm, "", 1, handler(on_finally, true), false);
    Ok(Value::Object(perform_then(
        interp,
        &promise,
        Value::Object(on_fulfilled),
        Value::Object(on_rejected),
    )))
}

struct Gathered {
    values: Vec<Value>,
    remaining: usize,
}

/// `Promise.all`, or `Promise.allSettled` when `settled_shape` is set.
fn gather(interp: &mut Interpreter, args: &[Value], settled_shape: bool) -> Result<Value, Control> {
    let result = new_promise(interp);
    let items = match interp.iterate_to_vec(&arg(args, 0)) {
        Ok(items) => items,
        Err(Control::Throw(reason)) => {
            settle(interp, &result, reason, true);
            return Ok(Value::Object(result));
        }
        Err(other) => return Err(other),
    };
    if items.is_empty() {
        let empty = interp.array(Vec::new());
        settle(interp, &result, empty, false);
        return Ok(Value::Object(result));
    }
    let state = Arc::new(Mutex::new(Gathered {
        values: vec![Value::Undefined; items.len()],
        remaining: items.len(),
    }));
    let (_, reject) = resolving_functions(interp, &result);
    for (index, item) in items.into_iter().enumerate() {
        let promise = promise_resolve(interp, item)?;
        let on_fulfilled = collector(interp, &state, &result, index, settled_shape.then_some("fulfilled"));
        let on_rejected = if settled_shape {
            collector(interp, &state, &result, index, Some("rejected"))
        } else {
            reject.clone()
        };
        perform_then(interp, &promise, on_fulfilled, on_rejected);
    }
    Ok(Value::Object(result))
}

/// Records one outcome; the last one settles `result` with every value in order.
fn collector(
    interp: &Interpreter,
    state: &Arc<Mutex<Gathered>>,
    result: &ObjectRef,
    index: usize,
    status: Option<&'static str>,
) -> Value {
    let (state, result) = (state.clone(), result.clone());
    let func: NativeFn = Arc::new(move |interp, _, args, _| {
        let value = match status {
            None => arg(args, 0),
            Some(status) => {
                let record = interp.realm().object();
                record.insert("status", Value::string(status));
                let field = if status == "fulfilled" { "value" } else { "reason" };
                record.insert(field, arg(args, 0));
                Value::Object(record)
            }
        };
        let finished = {
            let mut gathered = state.lock();
            gathered.values[index] = value;
            gathered.remaining -= 1;
            (gathered.remaining == 0).then(|| std::mem::take(&mut gathered.values))
        };
        if let Some(values) = finished {
            let values = interp.array(values);
            settle(interp, &result, values, false);
        }
        Ok(Value::Undefined)
    });
    Value::Object(native_function(interp.realm(), "", 1, func, false))
}

fn race(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let result = new_promise(interp);
    let (resolve, reject) = resolving_functions(interp, &result);
    let items = match interp.iterate_to_vec(&arg(args, 0)) {
        Ok(items) => items,
        Err(Control::Throw(reason)) => {
            settle(interp, &result, reason, true);
            return Ok(Value::Object(result));
        }
        Err(other) => return Err(other),
    };
    for item in items {
        let promise = promise_resolve(interp, item)?;
        perform_then(interp, &promise, resolve.clone(), reject.clone());
    }
    Ok(Value::Object(result))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::eval_error;
    use crate::script::interpreter::run_script;
    use crate::script::value::Value;

    fn global_strings(source: &str, names: &[&str]) -> Vec<String> {
        let (global, _) = run_script(source).unwrap();
        names
            .iter()
            .map(|name| match global.get(*name) {
                Some(Value::String(s)) => s.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                other => panic!("{name} = {other:?}"),
            })
            .collect()
    }

    #[test]
    fn reactions_run_after_synchronous_code_in_order() {
        let out = global_strings(
            "var log = [];
             Promise.resolve(1).then(v => log.push('t' + v));
             log.push('s');
             var p = new Promise(r => { log.push('e'); r(2) });
             p.then(v => log.push('u' + v)).then(() => { window.out = log.join() });",
            &["out"],
        );
        assert_eq!(out, vec!["s,e,t1,u2"]);
    }

    #[test]
    fn thenables_rejections_and_finally() {
        let out = global_strings(
            "var thenable = { then(res) { res('th') } };
             Promise.resolve(thenable).then(v => { window.a = v });
             Promise.reject(new Error('x'))
               .then(() => 'skipped')
               .catch(e => e.message)
               .finally(() => { window.fin = true })
               .then(v => { window.b = v });",
            &["a", "b", "fin"],
        );
        assert_eq!(out, vec!["th", "x", "true"]);
    }

    #[test]
    fn combinators_collect_in_input_order() {
        let out = global_strings(
            "Promise.all([1, Promise.resolve(2), { then(r) { r(3) } }]).then(v => { window.all = v.join() });
             Promise.all([Promise.reject('no'), 1]).catch(e => { window.allErr = e });
             Promise.allSettled([1, Promise.reject('r')])
               .then(rs => { window.settled = rs.map(r => r.status + ':' + (r.value || r.reason)).join() });
             Promise.race([new Promise(() => {}), Promise.resolve('fast')]).then(v => { window.race = v });
             Promise.all([]).then(v => { window.empty = String(v.length) });",
            &["all", "allErr", "settled", "race", "empty"],
        );
        assert_eq!(out, vec!["1,2,3", "no", "fulfilled:1,rejected:r", "fast", "0"]);
    }

    #[test]
    fn executors_settle_once_and_cycles_reject() {
        let out = global_strings(
            "new Promise(() => { throw new TypeError('boom') }).catch(e => { window.thrown = e.message });
             new Promise((res, rej) => { res('first'); rej('second'); res('third') }).then(v => { window.once = v });
             var looped = Promise.resolve().then(() => looped);
             looped.catch(e => { window.cycle = e.message });",
            &["thrown", "once", "cycle"],
        );
        assert_eq!(out, vec!["boom", "first", "Chaining cycle detected for promise #<Promise>"]);
        assert_eq!(
            eval_error("Promise()"),
            "TypeError: Promise constructor cannot be invoked without 'new'"
        );
        assert_eq!(eval_error("new Promise(1)"), "TypeError: Promise resolver 1 is not a function");
    }
}
