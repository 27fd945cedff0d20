use super::{arg, constructor, method};
use crate::script::interpreter::{Control, Interpreter};
use crate::script::object::{BoundFunction, Callable, ObjectKind, ObjectRef, Property};
use crate::script::realm::{ErrorKind, Realm};
use crate::script::value::Value;
use std::sync::Arc;

pub fn install(realm: &Arc<Realm>) {
    let proto = &realm.intrinsics.function_prototype;
    constructor(
        realm,
        "Function",
        1,
        proto,
        Arc::new(|interp, _, _, _| {
            Err(interp.throw(ErrorKind::EvalError, "Code generation from strings disallowed for this context"))
        }),
    );
    method(realm, proto, "call", 1, |interp, this, args| {
        let receiver = arg(args, 0);
        let rest = args.get(1..).unwrap_or_default();
        interp.call_function(this, &receiver, rest)
    });
    method(realm, proto, "apply", 2, |interp, this, args| {
        let receiver = arg(args, 0);
        let list = interp.array_like_to_vec(&arg(args, 1))?;
        interp.call_function(this, &receiver, &list)
    });
    method(realm, proto, "bind", 1, bind);
    method(realm, proto, "toString", 0, |interp, this, _| {
        let Value::Object(func) = this else {
            return Err(interp.type_error("Function.prototype.toString requires that 'this' be a Function"));
        };
        let name = func
            .get("name")
            .and_then(|v| v.primitive_to_string())
            .unwrap_or_else(|| "".into());
        Ok(Value::string(format!("function {name}() {{ [native code] }}")))
    });
    let has_instance = realm.symbols.has_instance.clone();
    super::symbol_method(realm, proto, &has_instance, "[Symbol.hasInstance]", |interp, this, args| {
        match this {
            Value::Object(target) => interp.ordinary_has_instance(target, &arg(args, 0)).map(Value::Bool),
            _ => Ok(Value::Bool(false)),
        }
    });
}

fn bind(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value, Control> {
    let Value::Object(target) = this else {
        return Err(interp.type_error("Bind must be called on a function"));
    };
    if !target.is_callable() {
        return Err(interp.type_error("Bind must be called on a function"));
    }
    let bound_args: Vec<Value> = args.iter().skip(1).cloned().collect();
    let length = match target.get("length") {
        Some(Value::Number(n)) => (n - bound_args.len() as f64).max(0.0),
        _ => 0.0,
    };
    let name = target
        .get("name")
        .and_then(|v| v.primitive_to_string())
        .unwrap_or_else(|| "".into());
    let bound = ObjectRef::new(
        ObjectKind::Function(Callable::Bound(BoundFunction {
            target: target.clone(),
            this: arg(args, 0),
            args: bound_args,
        })),
        target.proto(),
    );
    interp.define(&bound, "length", Property::meta(Value::Number(length)))?;
    interp.define(&bound, "name", Property::meta(Value::string(format!("bound {name}"))))?;
    Ok(Value::Object(bound))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{eval_error, eval_string};

    #[test]
    fn call_apply_and_bind_forward_this_and_arguments() {
        let value = eval_string(
            "function f(a, b) { return this.p + a + b }
             var o = { p: 'x' };
             var g = f.bind(o, 1);
             return [f.call(o, 1, 2), f.apply(o, [3, 4]), g(5), g.name, g.length].join('|')",
        );
        assert_eq!(value, "x12|x34|x15|bound f|1");
    }

    #[test]
    fn bound_constructors_build_instances_of_the_target() {
        let value = eval_string(
            "function P(x) { this.x = x }
             var B = P.bind(null, 7);
             var p = new B();
             return String(p.x) + (p instanceof P)",
        );
        assert_eq!(value, "7true");
    }

    #[test]
    fn function_constructor_is_refused() {
        assert!(eval_error("Function('return 1')()").starts_with("EvalError:"));
    }
}
