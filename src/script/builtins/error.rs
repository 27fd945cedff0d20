use super::{arg, constructor, method};
use crate::script::interpreter::{Control, Interpreter};
use crate::script::object::{ObjectKind, ObjectRef};
use crate::script::realm::{ErrorKind, Realm};
use crate::script::value::{PropertyKey, Value};
use std::sync::Arc;

pub fn install(realm: &Arc<Realm>) {
    let mut base_ctor: Option<ObjectRef> = None;
    for kind in ErrorKind::ALL {
        let proto = realm.intrinsics.error_prototype(kind);
        proto.insert_hidden("name", Value::string(kind.name()));
        proto.insert_hidden("message", Value::string(""));
        let ctor = constructor(
            realm,
            kind.name(),
            1,
            proto,
            Arc::new(move |interp, _, args, new_target| construct_error(interp, kind, args, new_target)),
        );
        match base_ctor.clone() {
            Some(base) => ctor.set_proto(Some(base)),
            None => base_ctor = Some(ctor),
        }
    }
    let base = realm.intrinsics.error_prototype(ErrorKind::Error);
    method(realm, base, "toString", 0, |interp, this, _| {
        let Value::Object(_) = this else {
            return Err(interp.type_error("Error.prototype.toString requires that 'this' be an Object"));
        };
        let name = match interp.get_value(this, &"name".into())? {
            Value::Undefined => "Error".into(),
            value => interp.to_string(&value)?,
        };
        let message = match interp.get_value(this, &"message".into())? {
            Value::Undefined => "".into(),
            value => interp.to_string(&value)?,
        };
        Ok(Value::string(match (name.is_empty(), message.is_empty()) {
            (_, true) => name.to_string(),
            (true, false) => message.to_string(),
            (false, false) => format!("{name}: {message}"),
        }))
    });
    if let Some(ctor) = &base_ctor {
        method(realm, ctor, "captureStackTrace", 1, |interp, _, args| {
            if let Value::Object(target) = arg(args, 0) {
                let summary = interp.describe_thrown(&Value::Object(target.clone()));
                target.insert_hidden("stack", Value::string(stack_text(&summary)));
            }
            Ok(Value::Undefined)
        });
    }
}

fn stack_text(summary: &str) -> String {
    format!("{summary}\n    at <anonymous>")
}

fn construct_error(
    interp: &mut Interpreter,
    kind: ErrorKind,
    args: &[Value],
    new_target: Option<&ObjectRef>,
) -> Result<Value, Control> {
    let fallback = interp.realm().intrinsics.error_prototype(kind).clone();
    let proto = match new_target {
        Some(target) => interp.prototype_for(target, fallback)?,
        None => fallback,
    };
    let error = ObjectRef::new(ObjectKind::Error, Some(proto));
    let message = arg(args, 0);
    if !matches!(message, Value::Undefined) {
        let text = interp.to_string(&message)?;
        error.insert_hidden("message", Value::String(text));
    }
    let options = arg(args, 1);
    if let Value::Object(options_obj) = &options
        && interp.has_property(options_obj, &PropertyKey::from("cause"))
    {
        let cause = interp.get_value(&options, &"cause".into())?;
        error.insert_hidden("cause", cause);
    }
    let summary = interp.describe_thrown(&Value::Object(error.clone()));
    error.insert_hidden("stack", Value::string(stack_text(&summary)));
    Ok(Value::Object(error))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{eval_error, eval_string};

    #[test]
    fn errors_carry_name_message_and_cause() {
        let value = eval_string(
            "var e = new TypeError('bad', { cause: 'root' });
             var plain = Error('no new');
             return [e.name, e.message, e.cause, String(e), e instanceof Error, e instanceof TypeError,
                     plain.message, Object.keys(e).length, e.stack.split('\\n')[0]].join('|')",
        );
        assert_eq!(value, "TypeError|bad|root|TypeError: bad|true|true|no new|0|TypeError: bad");
    }

    #[test]
    fn subclassed_errors_keep_their_prototype() {
        let value = eval_string(
            "class HttpError extends Error {
                 constructor(status) { super('HTTP ' + status); this.name = 'HttpError'; this.status = status }
             }
             var e = new HttpError(404);
             return [e instanceof HttpError, e instanceof Error, String(e), e.status].join('|')",
        );
        assert_eq!(value, "true|true|HttpError: HTTP 404|404");
    }

    #[test]
    fn uncaught_errors_render_name_and_message() {
        assert_eq!(eval_error("throw new RangeError('too far')"), "RangeError: too far");
        assert_eq!(eval_error("throw new Error()"), "Error");
        assert_eq!(eval_error("throw 'plain'"), "plain");
    }
}
