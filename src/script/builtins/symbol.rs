use super::{arg, constant, constructor, getter, method};
use crate::script::interpreter::{Control, Interpreter};
use crate::script::object::{ObjectKind, Property};
use crate::script::realm::Realm;
use crate::script::value::{JsStr, PropertyKey, Symbol, Value};
use std::sync::Arc;

pub fn install(realm: &Arc<Realm>) {
    let proto = &realm.intrinsics.symbol_prototype;
    let ctor = constructor(
        realm,
        "Symbol",
        0,
        proto,
        Arc::new(|interp, _, args, new_target| {
            if new_target.is_some() {
                return Err(interp.type_error("Symbol is not a constructor"));
            }
            let description: Option<JsStr> = match arg(args, 0) {
                Value::Undefined => None,
                value => Some(interp.to_string(&value)?),
            };
            Ok(Value::Symbol(Symbol::new(description)))
        }),
    );
    method(realm, &ctor, "for", 1, |interp, _, args| {
        let key = interp.to_string(&arg(args, 0))?;
        Ok(Value::Symbol(interp.realm().symbol_for(&key)))
    });
    method(realm, &ctor, "keyFor", 1, |interp, _, args| match arg(args, 0) {
        Value::Symbol(sym) => Ok(interp.realm().key_for(&sym).map_or(Value::Undefined, Value::String)),
        other => Err(interp.type_error(format!("{} is not a symbol", interp.short_description(&other)))),
    });
    let symbols = &realm.symbols;
    for (name, sym) in [
        ("iterator", &symbols.iterator),
        ("asyncIterator", &symbols.async_iterator),
        ("hasInstance", &symbols.has_instance),
        ("toPrimitive", &symbols.to_primitive),
        ("toStringTag", &symbols.to_string_tag),
    ] {
        constant(&ctor, name, Value::Symbol(sym.clone()));
    }

    method(realm, proto, "toString", 0, |interp, this, _| {
        Ok(Value::string(this_symbol(interp, this)?.descriptive_string()))
    });
    method(realm, proto, "valueOf", 0, |interp, this, _| this_symbol(interp, this).map(Value::Symbol));
    getter(realm, proto, "description", |interp, this, _| {
        let sym = this_symbol(interp, this)?;
        Ok(sym.description().map_or(Value::Undefined, Value::string))
    });
    let _ = proto.try_define(
        PropertyKey::Symbol(symbols.to_string_tag.clone()),
        Property::meta(Value::string("Symbol")),
    );
}

fn this_symbol(interp: &Interpreter, this: &Value) -> Result<Symbol, Control> {
    match this {
        Value::Symbol(sym) => Ok(sym.clone()),
        Value::Object(obj) => match &obj.read().kind {
            ObjectKind::Boxed(Value::Symbol(sym)) => Ok(sym.clone()),
            _ => Err(interp.type_error("Symbol.prototype.valueOf requires that 'this' be a Symbol")),
        },
        _ => Err(interp.type_error("Symbol.prototype.valueOf requires that 'this' be a Symbol")),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{eval_error, eval_string};

    #[test]
    fn registry_descriptions_and_uniqueness() {
        let value = eval_string(
            "var a = Symbol('x'), b = Symbol('x');
             return [a === b, Symbol.for('app') === Symbol.for('app'), Symbol.keyFor(Symbol.for('app')),
                     Symbol.keyFor(a), a.toString(), a.description, typeof Symbol.iterator].join()",
        );
        assert_eq!(value, "false,true,app,,Symbol(x),x,symbol");
    }

    #[test]
    fn symbols_are_not_constructors_or_strings() {
        assert_eq!(eval_error("new Symbol()"), "TypeError: Symbol is not a constructor");
        assert_eq!(
            eval_error("'' + Symbol('s')"),
            "TypeError: Cannot convert a Symbol value to a string"
        );
    }

    #[test]
    fn symbol_keyed_properties_stay_out_of_string_keys() {
        let value = eval_string(
            "var tag = Symbol('tag'); var o = { [tag]: 1, a: 2 };
             return Object.keys(o).join() + '|' + Object.getOwnPropertySymbols(o).length + '|' + o[tag]",
        );
        assert_eq!(value, "a|1|1");
    }
}
