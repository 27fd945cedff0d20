//! Tree-walking evaluator over the parsed AST.
//!
//! Statements live in `control`, expressions in `expr`, calls and class
//! construction in `call`, destructuring in `pattern`, operators in
//! `operators`, type conversions in `convert` and property access plus the
//! iteration protocol in `property`.

mod call;
mod control;
mod convert;
mod expr;
mod operators;
mod pattern;
mod property;

pub use convert::Hint;
pub use property::IteratorRecord;

use super::ScriptError;
use super::ast::Program;
use super::env::{Env, Frame};
use super::object::{ObjectKind, ObjectRef, Property};
use super::realm::{ErrorKind, Realm};
use super::value::{JsStr, Value};
use std::collections::VecDeque;
use std::sync::Arc;

/// Non-local control flow out of evaluation.
#[derive(Debug)]
pub enum Control {
    /// A script-level exception; catchable by `try`.
    Throw(Value),
    /// Host-level termination; never catchable.
    Abort(ScriptError),
    /// `?.` met a nullish base; the enclosing chain turns this into `undefined`.
    ShortCircuit,
}

/// How a statement finished.
#[derive(Debug)]
pub(crate) enum Completion {
    Normal,
    Return(Value),
    Break(Option<JsStr>),
    Continue(Option<JsStr>),
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_steps: Option<u64>,
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: None,
            max_call_depth: 256,
        }
    }
}

/// Deferred work queued by promises and `queueMicrotask`.
pub type Job = Box<dyn FnOnce(&mut Interpreter) -> Result<(), Control> + Send>;

pub struct Interpreter {
    realm: Arc<Realm>,
    limits: Limits,
    steps: u64,
    depth: usize,
    /// Strictness of the code currently running.
    strict: bool,
    jobs: VecDeque<Job>,
}

impl Interpreter {
    pub fn new(realm: Arc<Realm>, limits: Limits) -> Self {
        Self {
            realm,
            limits,
            steps: 0,
            depth: 0,
            strict: false,
            jobs: VecDeque::new(),
        }
    }

    pub fn realm(&self) -> &Arc<Realm> {
        &self.realm
    }

    /// Runs `program` as the body of a function whose parameters are `params`,
    /// with `this` bound to the global object. Returns the value of a
    /// top-level `return`, if one executed. Queued jobs run before returning.
    pub fn run_function_body(
        &mut self,
        program: &Program,
        params: &[(String, Value)],
    ) -> Result<Option<Value>, ScriptError> {
        let env = Env::root(Frame::new(Some(Value::Object(self.realm.global.clone()))));
        for (name, value) in params {
            env.declare(&JsStr::from(name.as_str()), Some(value.clone()), true);
        }
        for name in &program.var_names {
            env.declare_var(name, None);
        }
        let saved = std::mem::replace(&mut self.strict, program.strict);
        let result = self
            .exec_statements(&program.body, &env)
            .and_then(|completion| self.run_jobs().map(|()| completion));
        self.strict = saved;
        match result {
            Ok(Completion::Return(value)) => Ok(Some(value)),
            Ok(_) => Ok(None),
            Err(control) => Err(self.uncaught(control)),
        }
    }

    /// Calls a payload function from host code.
    pub fn call(
        &mut self,
        callee: &Value,
        this: Value,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        let result = self
            .call_function(callee, &this, &args)
            .and_then(|value| self.run_jobs().map(|()| value));
        result.map_err(|control| self.uncaught(control))
    }

    /// `new callee(...args)` from host code.
    pub fn instantiate(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, ScriptError> {
        let result = self.construct(callee, &args, None);
        result.map_err(|control| self.uncaught(control))
    }

    /// Converts escaped control flow into the host-facing error.
    pub fn uncaught(&mut self, control: Control) -> ScriptError {
        match control {
            Control::Throw(value) => ScriptError::Uncaught(self.describe_thrown(&value)),
            Control::Abort(err) => err,
            Control::ShortCircuit => ScriptError::Uncaught("undefined".into()),
        }
    }

    /// A fresh error object of `kind` with `message`.
    pub fn error_object(&self, kind: ErrorKind, message: &str) -> ObjectRef {
        let error = ObjectRef::new(
            ObjectKind::Error,
            Some(self.realm.intrinsics.error_prototype(kind).clone()),
        );
        if !message.is_empty() {
            error.insert_hidden("message", Value::string(message));
        }
        error
    }

    pub fn throw(&self, kind: ErrorKind, message: impl Into<String>) -> Control {
        Control::Throw(Value::Object(self.error_object(kind, &message.into())))
    }

    pub fn type_error(&self, message: impl Into<String>) -> Control {
        self.throw(ErrorKind::TypeError, message)
    }

    fn tick(&mut self) -> Result<(), Control> {
        self.steps += 1;
        match self.limits.max_steps {
            Some(max) if self.steps > max => Err(Control::Abort(ScriptError::BudgetExhausted(max))),
            _ => Ok(()),
        }
    }

    pub fn enqueue_job(&mut self, job: Job) {
        self.jobs.push_back(job);
    }

    /// Drains the job queue, including jobs queued while draining.
    pub fn run_jobs(&mut self) -> Result<(), Control> {
        while let Some(job) = self.jobs.pop_front() {
            self.tick()?;
            job(self)?;
        }
        Ok(())
    }

    /// A plain array in this realm.
    pub fn array(&self, items: Vec<Value>) -> Value {
        Value::Object(self.realm.array(items))
    }

    /// Defines a data property, turning an oversized array write into a `RangeError`.
    pub fn define(&self, target: &ObjectRef, key: impl Into<super::value::PropertyKey>, prop: Property) -> Result<(), Control> {
        target
            .try_define(key.into(), prop)
            .map_err(|_| self.throw(ErrorKind::RangeError, "Invalid array length"))
    }
}

/// Parses and runs `source` against a fresh realm; test helper.
#[cfg(test)]
pub(crate) fn run_script(source: &str) -> Result<(ObjectRef, Option<Value>), ScriptError> {
    let realm = Realm::new();
    let program = super::parser::parse(source)?;
    let mut interp = Interpreter::new(realm.clone(), Limits::default());
    let returned = interp.run_function_body(&program, &[])?;
    Ok((realm.global.clone(), returned))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_return(source: &str) -> Value {
        run_script(source).unwrap().1.unwrap()
    }

    fn eval_string(source: &str) -> String {
        match eval_return(source) {
            Value::String(s) => s.to_string(),
            other => panic!("expected string, got {other:?}"),
        }
    }

    fn eval_number(source: &str) -> f64 {
        match eval_return(source) {
            Value::Number(n) => n,
            other => panic!("expected number, got {other:?}"),
        }
    }

    #[test]
    fn window_assignment_creates_global_binding() {
        let (global, _) = run_script("window.Foo = { x: 1 };").unwrap();
        let Some(Value::Object(foo)) = global.get("Foo") else {
            panic!("Foo missing");
        };
        assert!(matches!(foo.get("x"), Some(Value::Number(n)) if n == 1.0));
    }

    #[test]
    fn undeclared_assignment_is_global_but_var_is_local() {
        let (global, _) = run_script("var local = 1; leaked = 2;").unwrap();
        assert!(global.get("local").is_none());
        assert!(matches!(global.get("leaked"), Some(Value::Number(n)) if n == 2.0));
    }

    #[test]
    fn this_and_aliases_are_the_global_object() {
        let (global, _) =
            run_script("this.a = 1; globalThis.b = 2; self.c = 3; (function () { this.d = 4 })();")
                .unwrap();
        for key in ["a", "b", "c", "d"] {
            assert!(global.has_own(&key.into()), "{key} missing");
        }
    }

    #[test]
    fn strict_functions_see_undefined_this() {
        assert_eq!(
            eval_string("return (function () { 'use strict'; return typeof this })()"),
            "undefined"
        );
        let err = run_script("(function () { 'use strict'; undeclared = 1 })()").unwrap_err();
        assert_eq!(
            err,
            ScriptError::Uncaught("ReferenceError: undeclared is not defined".into())
        );
    }

    #[test]
    fn closures_capture_their_environment() {
        let value = eval_number(
            "function counter() { var n = 0; return function () { n += 1; return n; }; }
             var c = counter(); c(); c();
             return c();",
        );
        assert_eq!(value, 3.0);
    }

    #[test]
    fn function_declarations_are_hoisted() {
        assert_eq!(eval_number("return f(); function f() { return 7 }"), 7.0);
    }

    #[test]
    fn arrow_functions_keep_lexical_this() {
        let value = eval_number(
            "var o = { v: 5, get: function () { return (() => this.v)(); } };
             return o.get();",
        );
        assert_eq!(value, 5.0);
    }

    #[test]
    fn typeof_undeclared_is_undefined_but_reading_throws() {
        assert_eq!(eval_string("return typeof module"), "undefined");
        let err = run_script("return module.exports").unwrap_err();
        assert_eq!(
            err,
            ScriptError::Uncaught("ReferenceError: module is not defined".into())
        );
    }

    #[test]
    fn try_catch_recovers_thrown_errors() {
        let value = eval_string("try { throw new Error('boom') } catch (e) { return e.message + '!' }");
        assert_eq!(value, "boom!");
        assert_eq!(eval_number("try { null.x } catch { return 1 }"), 1.0);
    }

    #[test]
    fn finally_runs_and_can_override() {
        assert_eq!(eval_number("try { return 1 } finally { window.ran = true }"), 1.0);
        assert_eq!(
            eval_number("try { throw 1 } catch (e) {} finally { return 2 }"),
            2.0
        );
    }

    #[test]
    fn reading_from_undefined_is_a_type_error() {
        let err = run_script("var x; x.y").unwrap_err();
        assert!(
            err.to_string()
                .contains("Cannot read properties of undefined (reading 'y')")
        );
    }

    #[test]
    fn calling_non_function_names_the_callee() {
        let err = run_script("window.nope()").unwrap_err();
        assert_eq!(
            err,
            ScriptError::Uncaught("TypeError: window.nope is not a function".into())
        );
    }

    #[test]
    fn deep_recursion_is_a_range_error() {
        let err = run_script("function f() { return f() } f()").unwrap_err();
        assert!(err.to_string().contains("Maximum call stack size exceeded"));
    }

    #[test]
    fn step_budget_aborts_infinite_loops_uncatchably() {
        let program = super::super::parser::parse("try { while (true) {} } catch (e) {}").unwrap();
        let mut interp = Interpreter::new(
            Realm::new(),
            Limits {
                max_steps: Some(1_000),
                max_call_depth: 16,
            },
        );
        let err = interp.run_function_body(&program, &[]).unwrap_err();
        assert_eq!(err, ScriptError::BudgetExhausted(1_000));
    }

    #[test]
    fn constructors_build_objects() {
        assert_eq!(
            eval_number("function P(x) { this.x = x } var p = new P(4); return p.x"),
            4.0
        );
        assert!(eval_return("function P() {} return new P() instanceof P").is_truthy());
    }

    #[test]
    fn string_concatenation_and_comparison() {
        assert_eq!(eval_string("return 'a' + 1 + 2"), "a12");
        assert_eq!(eval_string("return 1 + 2 + 'a'"), "3a");
        assert!(eval_return("return 'abc' < 'abd'").is_truthy());
        assert!(eval_return("return null == undefined && null !== undefined").is_truthy());
        assert!(eval_return("return '1' == 1 && [2] == 2 && !(NaN == NaN)").is_truthy());
    }

    #[test]
    fn counted_loops_with_update_operators() {
        let value = eval_number(
            "var total = 0;
             for (var i = 0; i < 5; i++) { if (i === 3) continue; total += i; }
             var n = 10; n--; --n; ++n;
             return total * 100 + n;",
        );
        assert_eq!(value, 709.0);
        let (global, _) = run_script("for (var i=0;i<2;i++){} window.App=function(){}").unwrap();
        assert!(global.get("App").is_some_and(|app| app.is_callable()));
    }

    #[test]
    fn postfix_returns_the_old_numeric_value() {
        assert_eq!(eval_number("var s = '5'; var old = s++; return old + s"), 11.0);
        assert_eq!(eval_number("var o = { n: 1 }; o.n++; o['n'] += 2; return o.n"), 4.0);
    }

    #[test]
    fn break_and_labeled_continue() {
        assert!(matches!(
            eval_return("while (true) { break; } return 'done'"),
            Value::String(s) if &*s == "done"
        ));
        let value = eval_number(
            "var hits = 0;
             outer: for (var i = 0; i < 3; i++) {
               for (var j = 0; j < 3; j++) {
                 if (j === 1) continue outer;
                 if (i === 2) break outer;
                 hits++;
               }
             }
             return hits;",
        );
        assert_eq!(value, 2.0);
        assert_eq!(eval_number("var k = 0; do { k++ } while (k < 3); return k"), 3.0);
    }

    #[test]
    fn let_bindings_are_fresh_per_iteration() {
        let value = eval_string(
            "var fns = [];
             for (let i = 0; i < 3; i++) fns.push(() => i);
             return fns.map(f => f()).join(',');",
        );
        assert_eq!(value, "0,1,2");
    }

    #[test]
    fn for_in_walks_enumerable_keys_including_inherited() {
        let value = eval_string(
            "function Base() {} Base.prototype.inherited = 1;
             var o = new Base(); o.b = 1; o[2] = 1; o.a = 1;
             Object.defineProperty(o, 'hidden', { value: 1, enumerable: false });
             var keys = [];
             for (var k in o) keys.push(k);
             return keys.join(',');",
        );
        assert_eq!(value, "2,b,a,inherited");
    }

    #[test]
    fn for_of_iterates_arrays_strings_maps_and_custom_iterables() {
        let value = eval_string(
            "var out = [];
             for (const x of [1, 2]) out.push(x);
             for (const ch of 'hé') out.push(ch);
             for (const [k, v] of new Map([['m', 3]])) out.push(k + v);
             var custom = { [Symbol.iterator]() { var n = 0; return { next: () => ({ done: n >= 2, value: n++ }) } } };
             for (const c of custom) out.push(c);
             return out.join(',');",
        );
        assert_eq!(value, "1,2,h,é,m3,0,1");
    }

    #[test]
    fn switch_falls_through_until_break() {
        let value = eval_string(
            "function pick(x) {
               var out = '';
               switch (x) {
                 case 1: out += 'one';
                 case 2: out += 'two'; break;
                 default: out += 'other';
                 case 3: out += 'three';
               }
               return out;
             }
             return [pick(1), pick(2), pick(3), pick(9)].join('|');",
        );
        assert_eq!(value, "onetwo|two|three|otherthree");
    }

    #[test]
    fn bitwise_and_shift_operators() {
        assert_eq!(eval_number("return (1 | 2) + (6 & 3) + (5 ^ 1) + ~0"), 3.0 + 2.0 + 4.0 - 1.0);
        assert_eq!(eval_number("return (1 << 31) >> 31"), -1.0);
        assert_eq!(eval_number("return -1 >>> 28"), 15.0);
        assert_eq!(eval_number("var f = 4; f |= 1; f <<= 1; return f"), 10.0);
    }

    #[test]
    fn instanceof_in_and_delete() {
        assert!(eval_return("return [] instanceof Array && !({} instanceof Array)").is_truthy());
        assert!(eval_return("var o = { a: 1 }; return 'a' in o && 'toString' in o").is_truthy());
        assert!(eval_return("var o = { a: 1 }; delete o.a; return !('a' in o)").is_truthy());
        let err = run_script("return 'a' in 'str'").unwrap_err();
        assert!(err.to_string().starts_with("TypeError: Cannot use 'in' operator"));
    }

    #[test]
    fn template_literals_and_tagged_templates() {
        assert_eq!(eval_string("var n = 2; return `t${n + 1}!${'x'}`"), "t3!x");
        assert_eq!(eval_string("return `t`"), "t");
        assert_eq!(
            eval_string("function tag(s, a) { return s.raw[0] + '|' + a + '|' + s[1] } return tag`a\\n${1}b`"),
            "a\\n|1|b"
        );
    }

    #[test]
    fn optional_chaining_short_circuits() {
        assert!(matches!(
            eval_return("var o = null; return o?.a.b.c"),
            Value::Undefined
        ));
        assert_eq!(eval_number("var o = { f() { return 3 } }; return o?.f?.()"), 3.0);
        assert!(matches!(eval_return("var o = {}; return o.missing?.()"), Value::Undefined));
        assert_eq!(eval_number("var a = [7]; return a?.[0]"), 7.0);
    }

    #[test]
    fn spread_in_calls_arrays_and_objects() {
        assert_eq!(
            eval_number("function sum(a, b, c) { return a + b + c } var xs = [1, 2]; return sum(...xs, 3)"),
            6.0
        );
        assert_eq!(eval_string("return [...'ab', ...[1]].join('')"), "ab1");
        assert_eq!(
            eval_string("var o = { ...{ a: 1, b: 2 }, b: 3 }; return Object.keys(o).join('') + o.b"),
            "ab3"
        );
    }

    #[test]
    fn destructuring_bindings_defaults_and_rest() {
        assert_eq!(
            eval_string(
                "var { a, b: { c = 5 } = {}, ...rest } = { a: 1, d: 4, e: 6 };
                 var [x, , y = 9, ...zs] = [10, 11, undefined, 12, 13];
                 return [a, c, Object.keys(rest).join(''), x, y, zs.length].join(',');"
            ),
            "1,5,de,10,9,2"
        );
        assert_eq!(eval_number("var a, b; [a, b] = [1, 2]; [a, b] = [b, a]; return a * 10 + b"), 21.0);
        assert_eq!(eval_number("function f({ n = 2 } = {}) { return n } return f() + f({ n: 3 })"), 5.0);
    }

    #[test]
    fn symbol_registry_is_shared() {
        assert!(
            eval_return("return Symbol.for('react.element') === Symbol.for('react.element')")
                .is_truthy()
        );
        assert_eq!(eval_string("return typeof Symbol.for('react.element')"), "symbol");
        assert!(eval_return("return Symbol('a') !== Symbol('a')").is_truthy());
    }

    #[test]
    fn classes_with_inheritance_fields_and_accessors() {
        let value = eval_string(
            "class Animal {
               #sound = 'generic';
               static count = 0;
               constructor(name) { this.name = name; Animal.count++; }
               get sound() { return this.#sound }
               speak() { return this.name + ' says ' + this.sound }
             }
             class Dog extends Animal {
               kind = 'dog';
               constructor(name) { super(name); }
               speak() { return super.speak() + '!' }
             }
             var d = new Dog('rex');
             return [d.speak(), d.kind, Animal.count, d instanceof Animal].join('|');",
        );
        assert_eq!(value, "rex says generic!|dog|1|true");
        let err = run_script("class A {} A()").unwrap_err();
        assert!(err.to_string().contains("Class constructor A cannot be invoked without 'new'"));
    }

    #[test]
    fn compound_assignment_reads_the_target_before_the_right_side() {
        let value = eval_number(
            "var x = 1;
             function bump() { x = 100; return 1; }
             x += bump();
             return x;",
        );
        assert_eq!(value, 2.0);
    }

    #[test]
    fn string_indexing_uses_utf16_units() {
        assert_eq!(eval_number("return '😀a'.length"), 3.0);
        assert_eq!(eval_string("return '😀a'[2]"), "a");
        assert_eq!(eval_string("return 'é'[0]"), "é");
    }

    #[test]
    fn arguments_object_reflects_call_arguments() {
        assert_eq!(
            eval_number("function f() { return arguments.length + arguments[1] } return f(1, 2, 3)"),
            5.0
        );
    }

    #[test]
    fn far_array_index_throws_range_error() {
        let err = run_script("var a = []; a[4294967294] = 1;").unwrap_err();
        assert_eq!(
            err,
            ScriptError::Uncaught("RangeError: Invalid array length".into())
        );
        assert_eq!(
            eval_string("try { [].length = -1 } catch (e) { return e.name }"),
            "RangeError"
        );
    }

    #[test]
    fn const_reassignment_and_dead_zone() {
        let err = run_script("const c = 1; c = 2;").unwrap_err();
        assert_eq!(
            err,
            ScriptError::Uncaught("TypeError: Assignment to constant variable.".into())
        );
        let err = run_script("x; let x = 1;").unwrap_err();
        assert_eq!(
            err,
            ScriptError::Uncaught("ReferenceError: Cannot access 'x' before initialization".into())
        );
    }

    #[test]
    fn getters_and_setters_on_literals() {
        assert_eq!(
            eval_number("var o = { v: 1, get d() { return this.v * 2 }, set d(x) { this.v = x } }; o.d = 5; return o.d"),
            10.0
        );
    }

    #[test]
    fn promises_settle_before_the_run_finishes() {
        let (global, _) = run_script(
            "Promise.resolve(2).then(v => v * 3).then(v => { window.result = v });
             new Promise((_, reject) => reject(new Error('no'))).catch(e => { window.caught = e.message });",
        )
        .unwrap();
        assert!(matches!(global.get("result"), Some(Value::Number(n)) if n == 6.0));
        assert!(matches!(global.get("caught"), Some(Value::String(s)) if &*s == "no"));
    }

    #[test]
    fn umd_wrapper_takes_global_branch() {
        let (global, _) = run_script(
            "(function (global, factory) {
               typeof exports === 'object' && typeof module !== 'undefined'
                 ? factory(exports)
                 : typeof define === 'function' && define.amd
                   ? define(['exports'], factory)
                   : (global = typeof globalThis !== 'undefined' ? globalThis : global || self,
                      factory(global.Lib = {}));
             })(this, function (exports) {
               'use strict';
               exports.default = function Lib() { return 'lib' };
               Object.defineProperty(exports, '__esModule', { value: true });
             });",
        )
        .unwrap();
        let Some(Value::Object(lib)) = global.get("Lib") else {
            panic!("Lib missing");
        };
        assert!(lib.get("default").is_some_and(|v| v.is_callable()));
        assert!(lib.get("__esModule").is_some_and(|v| v.is_truthy()));
    }
}
