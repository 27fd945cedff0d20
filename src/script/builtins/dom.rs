//! The host `document`: enough surface for bundles that check for a DOM at
//! load time. Nothing here is attached to the rendered markup.

use super::{arg, method, native_function};
use crate::script::interpreter::{Control, Interpreter};
use crate::script::object::{ObjectRef, Property};
use crate::script::realm::Realm;
use crate::script::value::Value;
use std::sync::Arc;

pub fn document_host(realm: &Arc<Realm>) -> ObjectRef {
    let element_proto = realm.object();
    install_node_methods(realm, &element_proto);

    let document = realm.object();
    document.insert("readyState", Value::string("complete"));
    document.insert("title", Value::string(""));
    document.insert("nodeType", Value::Number(9.0));
    document.insert("currentScript", Value::Null);
    document.insert("cookie", Value::string(""));
    for (name, tag) in [("documentElement", "html"), ("head", "head"), ("body", "body")] {
        document.insert(name, Value::Object(element(realm, &element_proto, tag)));
    }

    let proto = element_proto.clone();
    document.insert_hidden(
        "createElement",
        Value::Object(native_function(
            realm,
            "createElement",
            1,
            Arc::new(move |interp, _, args, _| {
                let tag = interp.to_string(&arg(args, 0))?;
                Ok(Value::Object(element(interp.realm(), &proto, &tag)))
            }),
            false,
        )),
    );
    method(realm, &document, "createTextNode", 1, |interp, _, args| {
        let node = interp.realm().object();
        node.insert("nodeType", Value::Number(3.0));
        node.insert("textContent", Value::String(interp.to_string(&arg(args, 0))?));
        Ok(Value::Object(node))
    });
    method(realm, &document, "getElementById", 1, |_, _, _| Ok(Value::Null));
    method(realm, &document, "getElementsByTagName", 1, empty_list);
    method(realm, &document, "getElementsByClassName", 1, empty_list);
    method(realm, &document, "addEventListener", 2, |_, _, _| Ok(Value::Undefined));
    method(realm, &document, "removeEventListener", 2, |_, _, _| Ok(Value::Undefined));
    method(realm, &document, "querySelector", 1, |_, _, _| Ok(Value::Null));
    method(realm, &document, "querySelectorAll", 1, empty_list);
    document
}

fn empty_list(interp: &mut Interpreter, _: &Value, _: &[Value]) -> Result<Value, Control> {
    Ok(interp.array(Vec::new()))
}

/// A detached element stub named `tag`.
fn element(realm: &Realm, proto: &ObjectRef, tag: &str) -> ObjectRef {
    let el = ObjectRef::ordinary(Some(proto.clone()));
    let upper = tag.to_ascii_uppercase();
    el.insert("tagName", Value::string(upper.as_str()));
    el.insert("nodeName", Value::string(upper.as_str()));
    el.insert("nodeType", Value::Number(1.0));
    el.insert("style", Value::Object(realm.object()));
    el.insert("dataset", Value::Object(realm.object()));
    el.insert("attributes", Value::Object(realm.object()));
    el.insert("childNodes", Value::Object(realm.array(Vec::new())));
    el.insert("textContent", Value::string(""));
    el.insert("innerHTML", Value::string(""));
    el
}

fn attributes_of(interp: &mut Interpreter, this: &Value) -> Result<Option<ObjectRef>, Control> {
    Ok(match interp.get_value(this, &"attributes".into())? {
        Value::Object(attrs) => Some(attrs),
        _ => None,
    })
}

fn install_node_methods(realm: &Realm, proto: &ObjectRef) {
    method(realm, proto, "setAttribute", 2, |interp, this, args| {
        let name = interp.to_string(&arg(args, 0))?;
        let value = interp.to_string(&arg(args, 1))?;
        if let Some(attrs) = attributes_of(interp, this)? {
            attrs.insert(name, Value::String(value));
        }
        Ok(Value::Undefined)
    });
    method(realm, proto, "getAttribute", 1, |interp, this, args| {
        let name = interp.to_string(&arg(args, 0))?;
        let attrs = attributes_of(interp, this)?;
        Ok(attrs.and_then(|attrs| attrs.get(name)).unwrap_or(Value::Null))
    });
    method(realm, proto, "removeAttribute", 1, |interp, this, args| {
        let name = interp.to_string(&arg(args, 0))?;
        if let Some(attrs) = attributes_of(interp, this)? {
            attrs.delete(&name.into());
        }
        Ok(Value::Undefined)
    });
    method(realm, proto, "appendChild", 1, |interp, this, args| {
        let child = arg(args, 0);
        if let Value::Object(children) = interp.get_value(this, &"childNodes".into())? {
            let end = children.array_len().unwrap_or(0);
            interp.define(&children, end, Property::data(child.clone()))?;
        }
        Ok(child)
    });
    method(realm, proto, "removeChild", 1, |_, _, args| Ok(arg(args, 0)));
    method(realm, proto, "insertBefore", 2, |_, _, args| Ok(arg(args, 0)));
    method(realm, proto, "addEventListener", 2, |_, _, _| Ok(Value::Undefined));
    method(realm, proto, "removeEventListener", 2, |_, _, _| Ok(Value::Undefined));
    method(realm, proto, "querySelector", 1, |_, _, _| Ok(Value::Null));
    method(realm, proto, "querySelectorAll", 1, empty_list);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::interpreter::Limits;
    use crate::script::parser::parse;

    fn eval_with_document(source: &str) -> Value {
        let realm = Realm::new();
        realm.global.insert_hidden("document", Value::Object(document_host(&realm)));
        let program = parse(source).unwrap();
        let mut interp = Interpreter::new(realm, Limits::default());
        interp.run_function_body(&program, &[]).unwrap().unwrap_or_default()
    }

    #[test]
    fn load_time_dom_checks_see_a_ready_document() {
        let value = eval_with_document(
            "return [document.readyState, typeof document.createElement, document.getElementById('x'), document.body.tagName].join()",
        );
        assert_eq!(value.as_str(), Some("complete,function,,BODY"));
    }

    #[test]
    fn created_elements_keep_attributes_and_children() {
        let value = eval_with_document(
            "var style = document.createElement('style');
             style.setAttribute('data-id', 'w');
             document.head.appendChild(style);
             return [style.tagName, style.getAttribute('data-id'), style.getAttribute('nope'), document.head.childNodes.length].join()",
        );
        assert_eq!(value.as_str(), Some("STYLE,w,,1"));
    }
}
