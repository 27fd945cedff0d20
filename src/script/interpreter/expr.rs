use super::pattern::BindMode;
use super::{Control, Interpreter};
use crate::script::ast::{
    ArrayElement, AssignOp, Expr, LogicalOp, ObjectProp, Pattern, PropKey, UnaryOp, UpdateOp,
};
use crate::script::builtins::regexp;
use crate::script::env::Env;
use crate::script::object::Property;
use crate::script::realm::ErrorKind;
use crate::script::value::{JsStr, PropertyKey, Value, to_int32};

/// A resolved assignment target.
pub(super) enum Reference {
    Binding(JsStr),
    Property { base: Value, key: PropertyKey },
    Super { this: Value, key: PropertyKey },
}

/// Source-like text for a callee in "is not a function" messages.
fn describe_callee(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.to_string(),
        Expr::This => "this".to_string(),
        Expr::Member {
            object,
            property: PropKey::Static(name),
            ..
        } => format!("{}.{name}", describe_callee(object)),
        Expr::Member { object, .. } => format!("{}[...]", describe_callee(object)),
        Expr::SuperMember {
            property: PropKey::Static(name),
        } => format!("super.{name}"),
        Expr::Call { callee, .. } => format!("{}(...)", describe_callee(callee)),
        Expr::OptionalChain(inner) => describe_callee(inner),
        _ => "(intermediate value)".to_string(),
    }
}

impl Interpreter {
    pub(super) fn eval(&mut self, expr: &Expr, env: &Env) -> Result<Value, Control> {
        crate::script::ensure_sufficient_stack(|| self.eval_inner(expr, env))
    }

    fn eval_inner(&mut self, expr: &Expr, env: &Env) -> Result<Value, Control> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::This => self.this_value(env),
            Expr::Ident(name) => self.lookup_identifier(name, env),
            Expr::Template { quasis, exprs } => {
                let mut out = quasis.first().map(|q| q.to_string()).unwrap_or_default();
                for (i, part) in exprs.iter().enumerate() {
                    let value = self.eval(part, env)?;
                    out.push_str(&self.to_string(&value)?);
                    out.push_str(quasis.get(i + 1).map_or("", |q| q));
                }
                Ok(Value::string(out))
            }
            Expr::TaggedTemplate { tag, parts, exprs } => {
                let (func, this) = self.eval_callee(tag, env)?;
                let cooked = parts
                    .cooked
                    .iter()
                    .map(|s| s.clone().map_or(Value::Undefined, Value::String))
                    .collect();
                let raw = parts.raw.iter().cloned().map(Value::String).collect();
                let strings = self.realm.array(cooked);
                strings.insert_hidden("raw", self.array(raw));
                let mut args = vec![Value::Object(strings)];
                for part in exprs {
                    args.push(self.eval(part, env)?);
                }
                if !func.is_callable() {
                    return Err(self.type_error(format!("{} is not a function", describe_callee(tag))));
                }
                self.call_function(&func, &this, &args)
            }
            Expr::Regex { pattern, flags } => regexp::new_regexp(self, pattern, flags).map(Value::Object),
            Expr::Array(elements) => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    match element {
                        ArrayElement::Hole => items.push(Value::Undefined),
                        ArrayElement::Expr(expr) => items.push(self.eval(expr, env)?),
                        ArrayElement::Spread(expr) => {
                            let iterable = self.eval(expr, env)?;
                            items.extend(self.iterate_to_vec(&iterable)?);
                        }
                    }
                }
                Ok(self.array(items))
            }
            Expr::Object(props) => self.eval_object(props, env),
            Expr::Function(def) => {
                let named = def.name.as_ref().filter(|_| !def.is_arrow());
                let scope = if named.is_some() { env.child() } else { env.clone() };
                let func = self.make_closure(def, &scope, None);
                if let Some(name) = named {
                    scope.declare(name, Some(Value::Object(func.clone())), true);
                }
                Ok(Value::Object(func))
            }
            Expr::Class(def) => self.eval_class(def, env).map(Value::Object),
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let base = self.eval(object, env)?;
                if *optional && base.is_nullish() {
                    return Err(Control::ShortCircuit);
                }
                let key = self.prop_key(property, env)?;
                self.get_value(&base, &key)
            }
            Expr::SuperMember { property } => {
                let this = self.this_value(env)?;
                let key = self.prop_key(property, env)?;
                self.super_get(env, &key, &this)
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => {
                let (func, this) = self.eval_callee(callee, env)?;
                if *optional && func.is_nullish() {
                    return Err(Control::ShortCircuit);
                }
                let args = self.eval_arguments(args, env)?;
                if !func.is_callable() {
                    return Err(self.type_error(format!("{} is not a function", describe_callee(callee))));
                }
                self.call_function(&func, &this, &args)
            }
            Expr::SuperCall { args } => self.super_call(args, env),
            Expr::New { callee, args } => {
                let func = self.eval(callee, env)?;
                let args = self.eval_arguments(args, env)?;
                if !matches!(&func, Value::Object(obj) if obj.is_constructor()) {
                    return Err(self.type_error(format!("{} is not a constructor", describe_callee(callee))));
                }
                self.construct(&func, &args, None)
            }
            Expr::NewTarget => Ok(env
                .frame()
                .and_then(|frame| frame.new_target.clone())
                .map_or(Value::Undefined, Value::Object)),
            Expr::OptionalChain(inner) => match self.eval(inner, env) {
                Err(Control::ShortCircuit) => Ok(Value::Undefined),
                other => other,
            },
            Expr::Unary { op, operand } => self.eval_unary(*op, operand, env),
            Expr::Update { op, prefix, target } => {
                let reference = self.reference(target, env)?;
                let old = self.get_reference(&reference, env)?;
                let old = self.to_number(&old)?;
                let new = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.put_reference(&reference, Value::Number(new), env)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                self.binary(*op, left, right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, env)?;
                let short = match op {
                    LogicalOp::And => !left.is_truthy(),
                    LogicalOp::Or => left.is_truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short { Ok(left) } else { self.eval(right, env) }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.is_truthy() {
                    self.eval(consequent, env)
                } else {
                    self.eval(alternate, env)
                }
            }
            Expr::Assign { op, target, value } => self.eval_assign(*op, target, value, env),
            Expr::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for expr in exprs {
                    last = self.eval(expr, env)?;
                }
                Ok(last)
            }
        }
    }

    pub(super) fn this_value(&self, env: &Env) -> Result<Value, Control> {
        match env.frame() {
            Some(frame) => frame.this().ok_or_else(|| {
                self.throw(
                    ErrorKind::ReferenceError,
                    "Must call super constructor in derived class before accessing 'this' or returning from derived constructor",
                )
            }),
            None => Ok(Value::Undefined),
        }
    }

    fn super_get(&mut self, env: &Env, key: &PropertyKey, this: &Value) -> Result<Value, Control> {
        let parent = env
            .frame()
            .and_then(|frame| frame.home_object.clone())
            .and_then(|home| home.proto());
        match parent {
            Some(parent) => self.get_from(&parent, key, this),
            None => Ok(Value::Undefined),
        }
    }

    /// Evaluates a callee together with the `this` a method call passes.
    fn eval_callee(&mut self, callee: &Expr, env: &Env) -> Result<(Value, Value), Control> {
        match callee {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let base = self.eval(object, env)?;
                if *optional && base.is_nullish() {
                    return Err(Control::ShortCircuit);
                }
                let key = self.prop_key(property, env)?;
                let func = self.get_value(&base, &key)?;
                Ok((func, base))
            }
            Expr::SuperMember { property } => {
                let this = self.this_value(env)?;
                let key = self.prop_key(property, env)?;
                let func = self.super_get(env, &key, &this)?;
                Ok((func, this))
            }
            other => Ok((self.eval(other, env)?, Value::Undefined)),
        }
    }

    pub(super) fn prop_key(&mut self, key: &PropKey, env: &Env) -> Result<PropertyKey, Control> {
        match key {
            PropKey::Static(name) => Ok(PropertyKey::String(name.clone())),
            PropKey::Computed(expr) => {
                let value = self.eval(expr, env)?;
                self.to_property_key(&value)
            }
            PropKey::Private(name) => Ok(PropertyKey::from(format!("#{name}"))),
        }
    }

    fn eval_object(&mut self, props: &[ObjectProp], env: &Env) -> Result<Value, Control> {
        let obj = self.realm.object();
        for prop in props {
            match prop {
                ObjectProp::KeyValue(PropKey::Static(name), value) if &**name == "__proto__" => {
                    match self.eval(value, env)? {
                        Value::Object(proto) => obj.set_proto(Some(proto)),
                        Value::Null => obj.set_proto(None),
                        _ => {}
                    }
                }
                ObjectProp::KeyValue(key, value) => {
                    let key = self.prop_key(key, env)?;
                    let value_expr = value;
                    let value = self.eval(value_expr, env)?;
                    if let Some(name) = key.as_str() {
                        self.name_anonymous(value_expr, &value, name);
                    }
                    self.define(&obj, key, Property::data(value))?;
                }
                ObjectProp::Method(key, def) => {
                    let key = self.prop_key(key, env)?;
                    let method = self.make_closure(def, env, Some(obj.clone()));
                    self.set_function_name(&method, &key, None);
                    self.define(&obj, key, Property::data(Value::Object(method)))?;
                }
                ObjectProp::Getter(key, def) => {
                    let key = self.prop_key(key, env)?;
                    let getter = self.make_closure(def, env, Some(obj.clone()));
                    self.set_function_name(&getter, &key, Some("get"));
                    self.define_accessor(&obj, key, Some(getter), None, true)?;
                }
                ObjectProp::Setter(key, def) => {
                    let key = self.prop_key(key, env)?;
                    let setter = self.make_closure(def, env, Some(obj.clone()));
                    self.set_function_name(&setter, &key, Some("set"));
                    self.define_accessor(&obj, key, None, Some(setter), true)?;
                }
                ObjectProp::Spread(expr) => {
                    let source = self.eval(expr, env)?;
                    self.copy_data_properties(&obj, &source, &[])?;
                }
            }
        }
        Ok(Value::Object(obj))
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr, env: &Env) -> Result<Value, Control> {
        match op {
            UnaryOp::Typeof => {
                if let Expr::Ident(name) = operand
                    && env.lookup(name).is_none()
                    && !self.has_property(&self.realm.global, &PropertyKey::String(name.clone()))
                {
                    return Ok(Value::string("undefined"));
                }
                let value = self.eval(operand, env)?;
                Ok(Value::string(value.type_of()))
            }
            UnaryOp::Delete => self.eval_delete(operand, env).map(Value::Bool),
            UnaryOp::Void => {
                self.eval(operand, env)?;
                Ok(Value::Undefined)
            }
            UnaryOp::Not => Ok(Value::Bool(!self.eval(operand, env)?.is_truthy())),
            UnaryOp::Neg => {
                let value = self.eval(operand, env)?;
                Ok(Value::Number(-self.to_number(&value)?))
            }
            UnaryOp::Plus => {
                let value = self.eval(operand, env)?;
                Ok(Value::Number(self.to_number(&value)?))
            }
            UnaryOp::BitNot => {
                let value = self.eval(operand, env)?;
                Ok(Value::Number(f64::from(!to_int32(self.to_number(&value)?))))
            }
        }
    }

    fn eval_delete(&mut self, operand: &Expr, env: &Env) -> Result<bool, Control> {
        match operand {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let base = self.eval(object, env)?;
                if *optional && base.is_nullish() {
                    return Err(Control::ShortCircuit);
                }
                let key = self.prop_key(property, env)?;
                self.delete_property(&base, &key)
            }
            Expr::OptionalChain(inner) => match self.eval_delete(inner, env) {
                Err(Control::ShortCircuit) => Ok(true),
                other => other,
            },
            Expr::Ident(name) => {
                if env.lookup(name).is_some() {
                    return Ok(false);
                }
                Ok(self.realm.global.delete(&PropertyKey::String(name.clone())))
            }
            other => {
                self.eval(other, env)?;
                Ok(true)
            }
        }
    }

    fn eval_assign(&mut self, op: AssignOp, target: &Pattern, value: &Expr, env: &Env) -> Result<Value, Control> {
        match op {
            AssignOp::Assign => match target {
                Pattern::Ident(name) => {
                    let result = self.eval(value, env)?;
                    self.name_anonymous(value, &result, name);
                    self.assign_identifier(name, result.clone(), env)?;
                    Ok(result)
                }
                Pattern::Member(expr) => {
                    let reference = self.reference(expr, env)?;
                    let result = self.eval(value, env)?;
                    self.put_reference(&reference, result.clone(), env)?;
                    Ok(result)
                }
                pattern => {
                    let result = self.eval(value, env)?;
                    self.bind_pattern(pattern, result.clone(), env, BindMode::Assign)?;
                    Ok(result)
                }
            },
            AssignOp::Binary(binary) => {
                let reference = self.pattern_reference(target, env)?;
                let old = self.get_reference(&reference, env)?;
                let rhs = self.eval(value, env)?;
                let result = self.binary(binary, old, rhs)?;
                self.put_reference(&reference, result.clone(), env)?;
                Ok(result)
            }
            AssignOp::Logical(logical) => {
                let reference = self.pattern_reference(target, env)?;
                let old = self.get_reference(&reference, env)?;
                let assign = match logical {
                    LogicalOp::And => old.is_truthy(),
                    LogicalOp::Or => !old.is_truthy(),
                    LogicalOp::Nullish => old.is_nullish(),
                };
                if !assign {
                    return Ok(old);
                }
                let result = self.eval(value, env)?;
                if let Reference::Binding(name) = &reference {
                    self.name_anonymous(value, &result, name);
                }
                self.put_reference(&reference, result.clone(), env)?;
                Ok(result)
            }
        }
    }

    fn pattern_reference(&mut self, target: &Pattern, env: &Env) -> Result<Reference, Control> {
        match target {
            Pattern::Ident(name) => Ok(Reference::Binding(name.clone())),
            Pattern::Member(expr) => self.reference(expr, env),
            _ => Err(self.throw(ErrorKind::SyntaxError, "Invalid left-hand side in assignment")),
        }
    }

    /// Evaluates an assignment target's object and key, leaving the write for later.
    pub(super) fn reference(&mut self, expr: &Expr, env: &Env) -> Result<Reference, Control> {
        match expr {
            Expr::Ident(name) => Ok(Reference::Binding(name.clone())),
            Expr::Member {
                object, property, ..
            } => {
                let base = self.eval(object, env)?;
                let key = self.prop_key(property, env)?;
                Ok(Reference::Property { base, key })
            }
            Expr::SuperMember { property } => {
                let this = self.this_value(env)?;
                let key = self.prop_key(property, env)?;
                Ok(Reference::Super { this, key })
            }
            _ => Err(self.throw(ErrorKind::SyntaxError, "Invalid left-hand side in assignment")),
        }
    }

    pub(super) fn get_reference(&mut self, reference: &Reference, env: &Env) -> Result<Value, Control> {
        match reference {
            Reference::Binding(name) => self.lookup_identifier(name, env),
            Reference::Property { base, key } => self.get_value(base, key),
            Reference::Super { this, key } => self.super_get(env, key, this),
        }
    }

    pub(super) fn put_reference(&mut self, reference: &Reference, value: Value, env: &Env) -> Result<(), Control> {
        match reference {
            Reference::Binding(name) => self.assign_identifier(name, value, env),
            Reference::Property { base, key } => self.set_value(base, key.clone(), value),
            Reference::Super { this, key } => self.set_value(this, key.clone(), value),
        }
    }

    /// Scope chain first, then properties of the global object.
    pub(super) fn lookup_identifier(&mut self, name: &JsStr, env: &Env) -> Result<Value, Control> {
        match env.lookup(name) {
            Some(Ok(value)) => Ok(value),
            Some(Err(_)) => Err(self.throw(
                ErrorKind::ReferenceError,
                format!("Cannot access '{name}' before initialization"),
            )),
            None => {
                let global = self.realm.global.clone();
                let key = PropertyKey::String(name.clone());
                if self.has_property(&global, &key) {
                    self.get_from(&global, &key, &Value::Object(global.clone()))
                } else {
                    Err(self.throw(ErrorKind::ReferenceError, format!("{name} is not defined")))
                }
            }
        }
    }

    /// Writes a binding; unbound names become global properties in sloppy code.
    pub(super) fn assign_identifier(&mut self, name: &JsStr, value: Value, env: &Env) -> Result<(), Control> {
        use crate::script::env::AssignOutcome;
        match env.assign(name, value.clone()) {
            AssignOutcome::Assigned => Ok(()),
            AssignOutcome::Constant => Err(self.type_error("Assignment to constant variable.")),
            AssignOutcome::Uninitialized => Err(self.throw(
                ErrorKind::ReferenceError,
                format!("Cannot access '{name}' before initialization"),
            )),
            AssignOutcome::Unbound => {
                let global = self.realm.global.clone();
                let key = PropertyKey::String(name.clone());
                if self.strict && !self.has_property(&global, &key) {
                    return Err(self.throw(ErrorKind::ReferenceError, format!("{name} is not defined")));
                }
                self.set_on(&global, key, value, &Value::Object(global.clone()))
            }
        }
    }
}
