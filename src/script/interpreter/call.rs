use super::pattern::BindMode;
use super::{Completion, Control, Interpreter};
use crate::script::ast::{
    Argument, ClassDef, ClassMemberKind, Expr, FunctionBody, FunctionDef, FunctionKind, Pattern,
    Stmt,
};
use crate::script::env::{Env, Frame};
use crate::script::object::{
    Callable, ClassConstructor, Closure, FieldInit, ObjectKind, ObjectRef, Property,
};
use crate::script::realm::ErrorKind;
use crate::script::value::{JsStr, PropertyKey, Value};
use std::sync::Arc;

impl Interpreter {
    /// Creates the function object for `def` closed over `env`.
    pub(super) fn make_closure(
        &mut self,
        def: &Arc<FunctionDef>,
        env: &Env,
        home_object: Option<ObjectRef>,
    ) -> ObjectRef {
        let func = ObjectRef::new(
            ObjectKind::Function(Callable::Closure(Closure {
                def: def.clone(),
                env: env.clone(),
                home_object,
                class: None,
            })),
            Some(self.realm.intrinsics.function_prototype.clone()),
        );
        init_function_props(&func, def.name.as_deref().unwrap_or(""), def.length);
        if def.is_constructor() {
            let prototype = self.realm.object();
            prototype.insert_hidden("constructor", Value::Object(func.clone()));
            let _ = func.try_define(
                "prototype".into(),
                Property {
                    configurable: false,
                    ..Property::hidden(Value::Object(prototype))
                },
            );
        }
        func
    }

    /// Names an anonymous function or class after the binding it is assigned to.
    pub(super) fn name_anonymous(&mut self, expr: &Expr, value: &Value, name: &str) {
        let anonymous = match expr {
            Expr::Function(def) => def.name.is_none(),
            Expr::Class(def) => def.name.is_none(),
            _ => false,
        };
        if anonymous && let Value::Object(func) = value {
            let _ = func.try_define("name".into(), Property::meta(Value::string(name)));
        }
    }

    pub(super) fn set_function_name(&self, func: &ObjectRef, key: &PropertyKey, prefix: Option<&str>) {
        let base = match key {
            PropertyKey::String(s) => s.to_string(),
            PropertyKey::Symbol(sym) => format!("[{}]", sym.description().unwrap_or_default()),
        };
        let name = match prefix {
            Some(prefix) => format!("{prefix} {base}"),
            None => base,
        };
        let _ = func.try_define("name".into(), Property::meta(Value::string(name)));
    }

    fn enter(&mut self) -> Result<(), Control> {
        self.tick()?;
        if self.depth >= self.limits.max_call_depth {
            return Err(self.throw(ErrorKind::RangeError, "Maximum call stack size exceeded"));
        }
        self.depth += 1;
        Ok(())
    }

    /// `callee.call(this, ...args)`.
    pub fn call_function(&mut self, callee: &Value, this: &Value, args: &[Value]) -> Result<Value, Control> {
        let callable = match callee {
            Value::Object(func) => func.callable().map(|callable| (func, callable)),
            _ => None,
        };
        let Some((func, callable)) = callable else {
            return Err(self.type_error(format!(
                "{} is not a function",
                self.short_description(callee)
            )));
        };
        match callable {
            Callable::Native(native) => {
                self.enter()?;
                let result = (native.func)(self, this, args, None);
                self.depth -= 1;
                result
            }
            Callable::Bound(bound) => {
                let mut full = bound.args.clone();
                full.extend_from_slice(args);
                self.call_function(&Value::Object(bound.target), &bound.this, &full)
            }
            Callable::Closure(closure) => {
                if closure.class.is_some() {
                    let name = func
                        .get("name")
                        .and_then(|v| v.primitive_to_string())
                        .unwrap_or_else(|| "".into());
                    return Err(self.type_error(format!(
                        "Class constructor {name} cannot be invoked without 'new'"
                    )));
                }
                let func = func.clone();
                self.call_closure(&func, &closure, Some(this.clone()), args, None)
                    .map(|(value, _)| value)
            }
        }
    }

    /// `new callee(...args)`; `new_target` defaults to `callee`.
    pub fn construct(
        &mut self,
        callee: &Value,
        args: &[Value],
        new_target: Option<&ObjectRef>,
    ) -> Result<Value, Control> {
        let func = match callee {
            Value::Object(func) if func.is_constructor() => func,
            _ => {
                return Err(self.type_error(format!(
                    "{} is not a constructor",
                    self.short_description(callee)
                )));
            }
        };
        let new_target = new_target.cloned().unwrap_or_else(|| func.clone());
        match func.callable() {
            Some(Callable::Native(native)) => {
                self.enter()?;
                let result = (native.func)(self, &Value::Undefined, args, Some(&new_target));
                self.depth -= 1;
                result
            }
            Some(Callable::Bound(bound)) => {
                let mut full = bound.args.clone();
                full.extend_from_slice(args);
                let new_target = if new_target.ptr_eq(func) {
                    bound.target.clone()
                } else {
                    new_target
                };
                self.construct(&Value::Object(bound.target), &full, Some(&new_target))
            }
            Some(Callable::Closure(closure)) => {
                let derived = closure.class.as_ref().is_some_and(|class| class.derived);
                let this = if derived {
                    None
                } else {
                    let fallback = self.realm.intrinsics.object_prototype.clone();
                    let proto = self.prototype_for(&new_target, fallback)?;
                    let obj = ObjectRef::ordinary(Some(proto));
                    if let Some(class) = &closure.class {
                        self.initialize_fields(&obj, &closure, class)?;
                    }
                    Some(Value::Object(obj))
                };
                let func = func.clone();
                let (value, env) = self.call_closure(&func, &closure, this, args, Some(new_target))?;
                if matches!(value, Value::Object(_)) {
                    return Ok(value);
                }
                if derived && !matches!(value, Value::Undefined) {
                    return Err(self.type_error(
                        "Derived constructors may only return object or undefined",
                    ));
                }
                env.frame().and_then(|frame| frame.this()).ok_or_else(|| {
                    self.throw(
                        ErrorKind::ReferenceError,
                        "Must call super constructor in derived class before accessing 'this' or returning from derived constructor",
                    )
                })
            }
            None => Err(self.type_error("not a constructor")),
        }
    }

    /// `new_target.prototype` when it is an object, else `fallback`.
    pub fn prototype_for(&mut self, new_target: &ObjectRef, fallback: ObjectRef) -> Result<ObjectRef, Control> {
        let target = Value::Object(new_target.clone());
        match self.get_value(&target, &"prototype".into())? {
            Value::Object(proto) => Ok(proto),
            _ => Ok(fallback),
        }
    }

    /// Runs a closure body. `this` is `None` in a derived constructor until
    /// `super()` binds it. Returns the completion value and the activation scope.
    fn call_closure(
        &mut self,
        func: &ObjectRef,
        closure: &Closure,
        this: Option<Value>,
        args: &[Value],
        new_target: Option<ObjectRef>,
    ) -> Result<(Value, Env), Control> {
        self.enter()?;
        let result = crate::script::ensure_sufficient_stack(|| {
            self.run_closure(func, closure, this, args, new_target)
        });
        self.depth -= 1;
        result
    }

    fn run_closure(
        &mut self,
        func: &ObjectRef,
        closure: &Closure,
        this: Option<Value>,
        args: &[Value],
        new_target: Option<ObjectRef>,
    ) -> Result<(Value, Env), Control> {
        let def = &closure.def;
        let env = if def.is_arrow() {
            closure.env.function(None)
        } else {
            let this = match this {
                Some(this) if !def.strict => Some(match this {
                    Value::Undefined | Value::Null => Value::Object(self.realm.global.clone()),
                    Value::Object(obj) => Value::Object(obj),
                    primitive => Value::Object(self.to_object(&primitive)?),
                }),
                other => other,
            };
            let mut frame = Frame::new(this);
            frame.new_target = new_target;
            frame.home_object = closure.home_object.clone();
            frame.function = Some(func.clone());
            closure.env.function(Some(frame))
        };
        let saved = std::mem::replace(&mut self.strict, def.strict);
        let result = self.run_body(def, &env, args);
        self.strict = saved;
        result.map(|value| (value, env))
    }

    fn run_body(&mut self, def: &FunctionDef, env: &Env, args: &[Value]) -> Result<Value, Control> {
        if def.uses_arguments && !def.is_arrow() {
            let arguments = self.arguments_object(args);
            env.declare(&JsStr::from("arguments"), Some(arguments), true);
        }
        for (i, param) in def.params.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or_default();
            self.bind_pattern(param, value, env, BindMode::Let)?;
        }
        if let Some(rest) = &def.rest {
            let remaining = args.get(def.params.len()..).unwrap_or_default().to_vec();
            let array = self.array(remaining);
            self.bind_pattern(rest, array, env, BindMode::Let)?;
        }
        for name in &def.var_names {
            env.declare_var(name, None);
        }
        match &def.body {
            FunctionBody::Expr(expr) => self.eval(expr, env),
            FunctionBody::Block(stmts) => match self.exec_statements(stmts, env)? {
                Completion::Return(value) => Ok(value),
                _ => Ok(Value::Undefined),
            },
        }
    }

    fn arguments_object(&mut self, args: &[Value]) -> Value {
        let obj = self.realm.object();
        for (i, value) in args.iter().enumerate() {
            obj.insert(i, value.clone());
        }
        obj.insert_hidden("length", Value::Number(args.len() as f64));
        let iterator = PropertyKey::Symbol(self.realm.symbols.iterator.clone());
        if let Some(values) = self.realm.intrinsics.array_prototype.get(iterator.clone()) {
            obj.insert_hidden(iterator, values);
        }
        Value::Object(obj)
    }

    pub(super) fn eval_arguments(&mut self, args: &[Argument], env: &Env) -> Result<Vec<Value>, Control> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Argument::Expr(expr) => out.push(self.eval(expr, env)?),
                Argument::Spread(expr) => {
                    let iterable = self.eval(expr, env)?;
                    out.extend(self.iterate_to_vec(&iterable)?);
                }
            }
        }
        Ok(out)
    }

    /// `super(...args)` inside a derived constructor.
    pub(super) fn super_call(&mut self, args: &[Argument], env: &Env) -> Result<Value, Control> {
        let frame = env.frame();
        let Some(func) = frame.as_ref().and_then(|frame| frame.function.clone()) else {
            return Err(self.throw(ErrorKind::SyntaxError, "'super' keyword unexpected here"));
        };
        let parent = func.proto();
        let parent = match parent {
            Some(parent) if parent.is_constructor() => parent,
            _ => return Err(self.type_error("Super constructor is not a constructor")),
        };
        let args = self.eval_arguments(args, env)?;
        let new_target = frame.as_ref().and_then(|frame| frame.new_target.clone());
        let this = self.construct(&Value::Object(parent), &args, new_target.as_ref())?;
        let bound = frame.as_ref().is_some_and(|frame| frame.bind_this(this.clone()));
        if !bound {
            return Err(self.throw(
                ErrorKind::ReferenceError,
                "Super constructor may only be called once",
            ));
        }
        if let Some(Callable::Closure(closure)) = func.callable()
            && let Some(class) = &closure.class
            && let Value::Object(obj) = &this
        {
            self.initialize_fields(obj, &closure, class)?;
        }
        Ok(Value::Undefined)
    }

    /// Runs instance field initializers against `obj`.
    fn initialize_fields(
        &mut self,
        obj: &ObjectRef,
        closure: &Closure,
        class: &ClassConstructor,
    ) -> Result<(), Control> {
        if class.fields.is_empty() {
            return Ok(());
        }
        let saved = std::mem::replace(&mut self.strict, true);
        let result = self.run_field_initializers(obj, &closure.env, closure.home_object.clone(), &class.fields);
        self.strict = saved;
        result
    }

    fn run_field_initializers(
        &mut self,
        obj: &ObjectRef,
        scope: &Env,
        home_object: Option<ObjectRef>,
        fields: &[FieldInit],
    ) -> Result<(), Control> {
        let mut frame = Frame::new(Some(Value::Object(obj.clone())));
        frame.home_object = home_object;
        let env = scope.function(Some(frame));
        for field in fields {
            let value = match &field.value {
                Some(expr) => {
                    let value = self.eval(expr, &env)?;
                    if let Some(name) = field.key.as_str() {
                        self.name_anonymous(expr, &value, name);
                    }
                    value
                }
                None => Value::Undefined,
            };
            self.define(obj, field.key.clone(), field_property(&field.key, value))?;
        }
        Ok(())
    }

    pub(super) fn eval_class(&mut self, def: &ClassDef, env: &Env) -> Result<ObjectRef, Control> {
        let saved = std::mem::replace(&mut self.strict, true);
        let result = self.eval_class_inner(def, env);
        self.strict = saved;
        result
    }

    fn eval_class_inner(&mut self, def: &ClassDef, env: &Env) -> Result<ObjectRef, Control> {
        let class_env = env.child();
        if let Some(name) = &def.name {
            class_env.declare(name, None, false);
        }
        let intrinsics = &self.realm.intrinsics;
        let (object_prototype, function_prototype) = (
            intrinsics.object_prototype.clone(),
            intrinsics.function_prototype.clone(),
        );
        let (proto_parent, ctor_parent) = match &def.superclass {
            None => (Some(object_prototype), function_prototype),
            Some(expr) => {
                let superclass = self.eval(expr, &class_env)?;
                match &superclass {
                    Value::Null => (None, function_prototype),
                    Value::Object(parent) if parent.is_constructor() => {
                        match self.get_value(&superclass, &"prototype".into())? {
                            Value::Object(proto) => (Some(proto), parent.clone()),
                            Value::Null => (None, parent.clone()),
                            _ => {
                                return Err(self.type_error(
                                    "Class extends value does not have valid prototype property",
                                ));
                            }
                        }
                    }
                    other => {
                        return Err(self.type_error(format!(
                            "Class extends value {} is not a constructor or null",
                            self.short_description(other)
                        )));
                    }
                }
            }
        };
        let derived = def.superclass.is_some();
        let prototype = ObjectRef::ordinary(proto_parent);

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        let mut statics = Vec::new();
        for member in &def.members {
            let key = self.prop_key(&member.key, &class_env)?;
            match &member.kind {
                ClassMemberKind::Field(value) if !member.is_static => fields.push(FieldInit {
                    key,
                    value: value.clone(),
                }),
                ClassMemberKind::Field(_) | ClassMemberKind::StaticBlock(_) => statics.push((key, member)),
                _ => methods.push((key, member)),
            }
        }

        let ctor_def = def
            .constructor
            .clone()
            .unwrap_or_else(|| synthetic_constructor(def.name.clone(), derived));
        let ctor = ObjectRef::new(
            ObjectKind::Function(Callable::Closure(Closure {
                def: ctor_def.clone(),
                env: class_env.clone(),
                home_object: Some(prototype.clone()),
                class: Some(Arc::new(ClassConstructor { derived, fields })),
            })),
            Some(ctor_parent),
        );
        init_function_props(&ctor, def.name.as_deref().unwrap_or(""), ctor_def.length);
        let _ = ctor.try_define(
            "prototype".into(),
            Property {
                enumerable: false,
                ..Property::readonly(Value::Object(prototype.clone()))
            },
        );
        prototype.insert_hidden("constructor", Value::Object(ctor.clone()));

        for (key, member) in methods {
            let target = if member.is_static { &ctor } else { &prototype };
            match &member.kind {
                ClassMemberKind::Method(f) => {
                    let method = self.make_closure(f, &class_env, Some(target.clone()));
                    self.set_function_name(&method, &key, None);
                    self.define(target, key, Property::hidden(Value::Object(method)))?;
                }
                ClassMemberKind::Getter(f) => {
                    let getter = self.make_closure(f, &class_env, Some(target.clone()));
                    self.set_function_name(&getter, &key, Some("get"));
                    self.define_accessor(target, key, Some(getter), None, false)?;
                }
                ClassMemberKind::Setter(f) => {
                    let setter = self.make_closure(f, &class_env, Some(target.clone()));
                    self.set_function_name(&setter, &key, Some("set"));
                    self.define_accessor(target, key, None, Some(setter), false)?;
                }
                ClassMemberKind::Field(_) | ClassMemberKind::StaticBlock(_) => {}
            }
        }
        if let Some(name) = &def.name {
            class_env.initialize(name, Value::Object(ctor.clone()));
        }

        let ctor_value = Value::Object(ctor.clone());
        for (key, member) in statics {
            match &member.kind {
                ClassMemberKind::Field(value) => {
                    let fields = [FieldInit {
                        key,
                        value: value.clone(),
                    }];
                    self.run_field_initializers(&ctor, &class_env, Some(ctor.clone()), &fields)?;
                }
                ClassMemberKind::StaticBlock(f) => {
                    let block = self.make_closure(f, &class_env, Some(ctor.clone()));
                    self.call_function(&Value::Object(block), &ctor_value, &[])?;
                }
                _ => {}
            }
        }
        Ok(ctor)
    }
}

fn init_function_props(func: &ObjectRef, name: &str, length: usize) {
    let _ = func.try_define("length".into(), Property::meta(Value::Number(length as f64)));
    let _ = func.try_define("name".into(), Property::meta(Value::string(name)));
}

/// Private names stay out of enumeration.
fn field_property(key: &PropertyKey, value: Value) -> Property {
    if key.as_str().is_some_and(|name| name.starts_with('#')) {
        Property::hidden(value)
    } else {
        Property::data(value)
    }
}

/// The implicit constructor of a class without one.
fn synthetic_constructor(name: Option<JsStr>, derived: bool) -> Arc<FunctionDef> {
    let args: JsStr = "args".into();
    let (rest, body) = if derived {
        (
            Some(Pattern::Ident(args.clone())),
            vec![Stmt::Expr(Expr::SuperCall {
                args: vec![Argument::Spread(Expr::Ident(args))],
            })],
        )
    } else {
        (None, Vec::new())
    };
    Arc::new(FunctionDef {
        name,
        params: Vec::new(),
        rest,
        body: FunctionBody::Block(body),
        kind: FunctionKind::ClassConstructor,
        strict: true,
        var_names: Vec::new(),
        length: 0,
        uses_arguments: false,
    })
}
