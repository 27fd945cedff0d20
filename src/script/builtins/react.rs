//! The host `React` object. Elements are plain objects in React's own shape,
//! so bundles that inline `react/jsx-runtime` produce the same values as
//! `React.createElement`. Hooks answer with their initial values; nothing
//! re-renders.

use super::global::PAYLOAD_TARGET;
use super::{arg, callback, function, method, native_function};
use crate::script::interpreter::{Control, Interpreter};
use crate::script::object::{ObjectRef, Property};
use crate::script::realm::{ErrorKind, Realm};
use crate::script::value::{JsStr, PropertyKey, Value, number_to_radix_string};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// The React release whose public surface the host object mirrors.
pub const REACT_HOST_VERSION: &str = "18.3.1";

pub const ELEMENT_TYPE: &str = "react.element";
/// Tag React 19 puts on elements.
pub const TRANSITIONAL_ELEMENT_TYPE: &str = "react.transitional.element";
const FRAGMENT_TYPE: &str = "react.fragment";
const STRICT_MODE_TYPE: &str = "react.strict_mode";
const PROFILER_TYPE: &str = "react.profiler";
const SUSPENSE_TYPE: &str = "react.suspense";
const PROVIDER_TYPE: &str = "react.provider";
const CONTEXT_TYPE: &str = "react.context";
const FORWARD_REF_TYPE: &str = "react.forward_ref";
const MEMO_TYPE: &str = "react.memo";

/// Element types that render only their children.
const TRANSPARENT_TYPES: [&str; 4] = [FRAGMENT_TYPE, STRICT_MODE_TYPE, PROFILER_TYPE, SUSPENSE_TYPE];

/// Config keys `createElement` keeps out of `props`.
const RESERVED_PROPS: [&str; 4] = ["key", "ref", "__self", "__source"];

/// What an element's `type` asks the renderer to do.
#[derive(Debug)]
pub enum ElementType {
    Host(JsStr),
    /// Fragment, StrictMode, Profiler and Suspense.
    Transparent,
    Function(Value),
    Class(Value),
    Provider(ObjectRef),
    Consumer(ObjectRef),
    ForwardRef(Value),
    Memo(Value),
    Invalid,
}

impl ElementType {
    pub fn of(realm: &Realm, ty: &Value) -> Self {
        match ty {
            Value::String(tag) => ElementType::Host(tag.clone()),
            Value::Symbol(sym) => {
                let transparent = realm
                    .key_for(sym)
                    .is_some_and(|key| TRANSPARENT_TYPES.contains(&&*key));
                if transparent {
                    ElementType::Transparent
                } else {
                    ElementType::Invalid
                }
            }
            Value::Object(obj) if obj.is_callable() => {
                let is_class = matches!(
                    obj.get("prototype"),
                    Some(Value::Object(proto)) if proto.get("isReactComponent").is_some_and(|v| v.is_truthy())
                );
                if is_class {
                    ElementType::Class(ty.clone())
                } else {
                    ElementType::Function(ty.clone())
                }
            }
            Value::Object(obj) => {
                let Some(Value::Symbol(tag)) = obj.get("$$typeof") else {
                    return ElementType::Invalid;
                };
                match realm.key_for(&tag).as_deref() {
                    Some(PROVIDER_TYPE) => match obj.get("_context") {
                        Some(Value::Object(context)) => ElementType::Provider(context),
                        _ => ElementType::Invalid,
                    },
                    Some(CONTEXT_TYPE) => ElementType::Consumer(obj.clone()),
                    Some(FORWARD_REF_TYPE) => ElementType::ForwardRef(obj.get("render").unwrap_or_default()),
                    Some(MEMO_TYPE) => ElementType::Memo(obj.get("type").unwrap_or_default()),
                    _ => ElementType::Invalid,
                }
            }
            _ => ElementType::Invalid,
        }
    }
}

/// True for objects tagged as React elements.
pub fn is_element(realm: &Realm, value: &Value) -> bool {
    let Value::Object(obj) = value else {
        return false;
    };
    match obj.get("$$typeof") {
        Some(Value::Symbol(tag)) => realm
            .key_for(&tag)
            .is_some_and(|key| &*key == ELEMENT_TYPE || &*key == TRANSITIONAL_ELEMENT_TYPE),
        _ => false,
    }
}

pub fn react_host(realm: &Arc<Realm>) -> ObjectRef {
    let react = realm.object();
    react.insert("version", Value::string(REACT_HOST_VERSION));
    for (name, tag) in [
        ("Fragment", FRAGMENT_TYPE),
        ("StrictMode", STRICT_MODE_TYPE),
        ("Profiler", PROFILER_TYPE),
        ("Suspense", SUSPENSE_TYPE),
    ] {
        react.insert(name, Value::Symbol(realm.symbol_for(tag)));
    }

    react.insert("createElement", function(realm, "createElement", 3, create_element));
    react.insert("cloneElement", function(realm, "cloneElement", 3, clone_element));
    react.insert(
        "isValidElement",
        function(realm, "isValidElement", 1, |interp, _, args| {
            Ok(Value::Bool(is_element(interp.realm(), &arg(args, 0))))
        }),
    );
    react.insert("createContext", function(realm, "createContext", 1, create_context));
    react.insert(
        "forwardRef",
        function(realm, "forwardRef", 1, |interp, _, args| {
            let render = callback(interp, args, 0)?;
            Ok(tagged(interp.realm(), FORWARD_REF_TYPE, [("render", render)]))
        }),
    );
    react.insert(
        "memo",
        function(realm, "memo", 2, |interp, _, args| {
            let compare = match arg(args, 1) {
                Value::Undefined => Value::Null,
                other => other,
            };
            Ok(tagged(interp.realm(), MEMO_TYPE, [("type", arg(args, 0)), ("compare", compare)]))
        }),
    );
    react.insert(
        "createRef",
        function(realm, "createRef", 0, |interp, _, _| Ok(ref_object(interp.realm(), Value::Null))),
    );
    let start_transition = function(realm, "startTransition", 1, |interp, _, args| {
        let scope = callback(interp, args, 0)?;
        interp.call_function(&scope, &Value::Undefined, &[])?;
        Ok(Value::Undefined)
    });
    react.insert("startTransition", start_transition.clone());
    react.insert("Children", Value::Object(children_api(realm)));
    react.insert("Component", Value::Object(component_class(realm, "Component", false)));
    react.insert("PureComponent", Value::Object(component_class(realm, "PureComponent", true)));
    install_hooks(realm, &react, start_transition);

    let internals = realm.object();
    for name in ["ReactCurrentOwner", "ReactCurrentDispatcher"] {
        internals.insert(name, Value::Object(ref_object_raw(realm, Value::Null)));
    }
    let batch = realm.object();
    batch.insert("transition", Value::Null);
    internals.insert("ReactCurrentBatchConfig", Value::Object(batch));
    react.insert("__SECRET_INTERNALS_DO_NOT_USE_OR_YOU_WILL_BE_FIRED", Value::Object(internals));
    react
}

/// `{ $$typeof: Symbol.for(tag), ...fields }`.
fn tagged<const N: usize>(realm: &Realm, tag: &str, fields: [(&str, Value); N]) -> Value {
    let obj = realm.object();
    obj.insert("$$typeof", Value::Symbol(realm.symbol_for(tag)));
    for (name, value) in fields {
        obj.insert(name, value);
    }
    Value::Object(obj)
}

fn ref_object_raw(realm: &Realm, current: Value) -> ObjectRef {
    let obj = realm.object();
    obj.insert("current", current);
    obj
}

fn ref_object(realm: &Realm, current: Value) -> Value {
    Value::Object(ref_object_raw(realm, current))
}

/// Builds an element object the way the JSX runtime does.
pub fn make_element(realm: &Realm, ty: Value, key: Value, ref_value: Value, props: ObjectRef) -> Value {
    let el = realm.object();
    el.insert("$$typeof", Value::Symbol(realm.symbol_for(ELEMENT_TYPE)));
    el.insert("type", ty);
    el.insert("key", key);
    el.insert("ref", ref_value);
    el.insert("props", Value::Object(props));
    el.insert("_owner", Value::Null);
    Value::Object(el)
}

fn is_valid_type(value: &Value) -> bool {
    match value {
        Value::String(_) | Value::Symbol(_) => true,
        Value::Object(obj) => obj.is_callable() || matches!(obj.get("$$typeof"), Some(Value::Symbol(_))),
        _ => false,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Object(obj) if obj.is_array() => "array",
        other => other.type_of(),
    }
}

/// Copies `config` into `props`, returning the `key` and `ref` it carried.
fn apply_config(
    interp: &mut Interpreter,
    config: &Value,
    props: &ObjectRef,
    key: &mut Value,
    ref_value: &mut Value,
) -> Result<(), Control> {
    let Value::Object(source) = config else {
        return Ok(());
    };
    let found_key = interp.get_value(config, &"key".into())?;
    if !matches!(found_key, Value::Undefined) {
        *key = Value::String(interp.to_string(&found_key)?);
    }
    let found_ref = interp.get_value(config, &"ref".into())?;
    if !matches!(found_ref, Value::Undefined) {
        *ref_value = found_ref;
    }
    for name in source.enumerable_keys() {
        if RESERVED_PROPS.contains(&&*name) {
            continue;
        }
        let value = interp.get_value(config, &PropertyKey::from(&name))?;
        props.insert(name, value);
    }
    Ok(())
}

fn apply_children(interp: &Interpreter, props: &ObjectRef, children: &[Value]) {
    match children {
        [] => {}
        [only] => props.insert("children", only.clone()),
        many => props.insert("children", interp.array(many.to_vec())),
    }
}

fn own_value(obj: &ObjectRef, key: &PropertyKey) -> Value {
    obj.get_own_property(key)
        .and_then(|prop| prop.value().cloned())
        .unwrap_or_default()
}

fn apply_default_props(interp: &mut Interpreter, ty: &Value, props: &ObjectRef) -> Result<(), Control> {
    if !matches!(ty, Value::Object(_)) {
        return Ok(());
    }
    let Value::Object(defaults) = interp.get_value(ty, &"defaultProps".into())? else {
        return Ok(());
    };
    let defaults_value = Value::Object(defaults.clone());
    for name in defaults.enumerable_keys() {
        let key = PropertyKey::from(&name);
        if matches!(own_value(props, &key), Value::Undefined) {
            let value = interp.get_value(&defaults_value, &key)?;
            props.insert(key, value);
        }
    }
    Ok(())
}

fn create_element(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let ty = arg(args, 0);
    if !is_valid_type(&ty) {
        warn!(
            target: PAYLOAD_TARGET,
            "Warning: React.createElement: type is invalid -- expected a string (for built-in components) or a class/function (for composite components) but got: {}.",
            type_name(&ty)
        );
    }
    let props = interp.realm().object();
    let (mut key, mut ref_value) = (Value::Null, Value::Null);
    apply_config(interp, &arg(args, 1), &props, &mut key, &mut ref_value)?;
    apply_children(interp, &props, args.get(2..).unwrap_or_default());
    apply_default_props(interp, &ty, &props)?;
    Ok(make_element(interp.realm(), ty, key, ref_value, props))
}

fn clone_element(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let original = arg(args, 0);
    let Value::Object(source) = &original else {
        return Err(interp.throw(
            ErrorKind::Error,
            format!(
                "React.cloneElement(...): The argument must be a React element, but you passed {}.",
                interp.short_description(&original)
            ),
        ));
    };
    let props = interp.realm().object();
    if let Some(Value::Object(old_props)) = source.get("props") {
        for name in old_props.enumerable_keys() {
            let key = PropertyKey::from(&name);
            props.insert(key.clone(), own_value(&old_props, &key));
        }
    }
    let mut key = source.get("key").unwrap_or(Value::Null);
    let mut ref_value = source.get("ref").unwrap_or(Value::Null);
    apply_config(interp, &arg(args, 1), &props, &mut key, &mut ref_value)?;
    apply_children(interp, &props, args.get(2..).unwrap_or_default());
    let ty = source.get("type").unwrap_or_default();
    Ok(make_element(interp.realm(), ty, key, ref_value, props))
}

fn create_context(interp: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value, Control> {
    let realm = interp.realm().clone();
    let default = arg(args, 0);
    let context = realm.object();
    context.insert("$$typeof", Value::Symbol(realm.symbol_for(CONTEXT_TYPE)));
    context.insert("_currentValue", default.clone());
    context.insert("_currentValue2", default);
    let provider = tagged(&realm, PROVIDER_TYPE, [("_context", Value::Object(context.clone()))]);
    context.insert("Provider", provider);
    // React 18 uses the context itself as its Consumer.
    context.insert("Consumer", Value::Object(context.clone()));
    Ok(Value::Object(context))
}

/// Flattens nested child arrays. Booleans and `undefined` become `null`.
pub fn flatten_children(children: &Value, out: &mut Vec<Value>) {
    match children {
        Value::Object(obj) if obj.is_array() => {
            for item in obj.array_items().unwrap_or_default() {
                flatten_children(&item, out);
            }
        }
        Value::Undefined | Value::Bool(_) => out.push(Value::Null),
        other => out.push(other.clone()),
    }
}

fn visit_children(
    interp: &mut Interpreter,
    args: &[Value],
    collect: bool,
) -> Result<Option<Vec<Value>>, Control> {
    let children = arg(args, 0);
    if children.is_nullish() {
        return Ok(None);
    }
    let visitor = callback(interp, args, 1)?;
    let this = arg(args, 2);
    let mut flat = Vec::new();
    flatten_children(&children, &mut flat);
    let mut mapped = Vec::new();
    for (index, child) in flat.into_iter().enumerate() {
        let result = interp.call_function(&visitor, &this, &[child, Value::Number(index as f64)])?;
        if collect {
            flatten_children(&result, &mut mapped);
        }
    }
    mapped.retain(|value| !value.is_nullish());
    Ok(Some(mapped))
}

fn children_api(realm: &Realm) -> ObjectRef {
    let children = realm.object();
    method(realm, &children, "map", 3, |interp, _, args| {
        Ok(match visit_children(interp, args, true)? {
            Some(mapped) => interp.array(mapped),
            None => arg(args, 0),
        })
    });
    method(realm, &children, "forEach", 3, |interp, _, args| {
        visit_children(interp, args, false)?;
        Ok(Value::Undefined)
    });
    method(realm, &children, "count", 1, |_, _, args| {
        let children = arg(args, 0);
        if children.is_nullish() {
            return Ok(Value::Number(0.0));
        }
        let mut flat = Vec::new();
        flatten_children(&children, &mut flat);
        Ok(Value::Number(flat.len() as f64))
    });
    method(realm, &children, "toArray", 1, |interp, _, args| {
        let mut flat = Vec::new();
        flatten_children(&arg(args, 0), &mut flat);
        flat.retain(|value| !value.is_nullish());
        Ok(interp.array(flat))
    });
    method(realm, &children, "only", 1, |interp, _, args| {
        let child = arg(args, 0);
        if is_element(interp.realm(), &child) {
            Ok(child)
        } else {
            Err(interp.throw(
                ErrorKind::Error,
                "React.Children.only expected to receive a single React element child.",
            ))
        }
    });
    children
}

/// `React.Component` or `React.PureComponent`. Works both as a `super()`
/// target and through `Component.call(this, props)` in transpiled classes.
fn component_class(realm: &Arc<Realm>, name: &'static str, pure: bool) -> ObjectRef {
    let proto = realm.object();
    proto.insert_hidden("isReactComponent", Value::Object(realm.object()));
    if pure {
        proto.insert_hidden("isPureReactComponent", Value::Bool(true));
    }
    for update in ["setState", "forceUpdate"] {
        let noop = native_function(
            realm,
            update,
            1,
            Arc::new(move |_, _, _, _| {
                debug!(target: PAYLOAD_TARGET, method = update, "state updates are ignored during a static render");
                Ok(Value::Undefined)
            }),
            false,
        );
        proto.insert_hidden(update, Value::Object(noop));
    }
    let fallback = proto.clone();
    let ctor = native_function(
        realm,
        name,
        2,
        Arc::new(move |interp, this, args, new_target| {
            let instance = match new_target {
                Some(target) => ObjectRef::ordinary(Some(interp.prototype_for(target, fallback.clone())?)),
                None => match this {
                    Value::Object(obj) => obj.clone(),
                    _ => return Err(interp.type_error("Cannot call a class as a function")),
                },
            };
            instance.insert("props", arg(args, 0));
            instance.insert("context", arg(args, 1));
            instance.insert("refs", Value::Object(interp.realm().object()));
            Ok(match new_target {
                Some(_) => Value::Object(instance),
                None => Value::Undefined,
            })
        }),
        true,
    );
    let _ = ctor.try_define(
        "prototype".into(),
        Property {
            enumerable: false,
            ..Property::data(Value::Object(proto.clone()))
        },
    );
    proto.insert_hidden("constructor", Value::Object(ctor.clone()));
    ctor
}

fn install_hooks(realm: &Arc<Realm>, react: &ObjectRef, start_transition: Value) {
    method(realm, react, "useState", 1, |interp, _, args| {
        let initial = arg(args, 0);
        let value = if initial.is_callable() {
            interp.call_function(&initial, &Value::Undefined, &[])?
        } else {
            initial
        };
        let setter = ignored_dispatch(interp.realm(), "dispatchSetState");
        Ok(interp.array(vec![value, setter]))
    });
    method(realm, react, "useReducer", 3, |interp, _, args| {
        let initial = arg(args, 1);
        let init = arg(args, 2);
        let state = if init.is_callable() {
            interp.call_function(&init, &Value::Undefined, &[initial])?
        } else {
            initial
        };
        let dispatch = ignored_dispatch(interp.realm(), "dispatchReducerAction");
        Ok(interp.array(vec![state, dispatch]))
    });
    for name in [
        "useEffect",
        "useLayoutEffect",
        "useInsertionEffect",
        "useImperativeHandle",
        "useDebugValue",
    ] {
        method(realm, react, name, 2, |_, _, _| Ok(Value::Undefined));
    }
    method(realm, react, "useMemo", 2, |interp, _, args| {
        let factory = callback(interp, args, 0)?;
        interp.call_function(&factory, &Value::Undefined, &[])
    });
    method(realm, react, "useCallback", 2, |_, _, args| Ok(arg(args, 0)));
    method(realm, react, "useRef", 1, |interp, _, args| Ok(ref_object(interp.realm(), arg(args, 0))));
    method(realm, react, "useContext", 1, |interp, _, args| {
        interp.get_value(&arg(args, 0), &"_currentValue".into())
    });
    method(realm, react, "useDeferredValue", 1, |_, _, args| Ok(arg(args, 0)));
    method(realm, react, "useSyncExternalStore", 3, |interp, _, args| {
        let snapshot = callback(interp, args, 1)?;
        interp.call_function(&snapshot, &Value::Undefined, &[])
    });
    let use_transition = native_function(
        realm,
        "useTransition",
        0,
        Arc::new(move |interp, _, _, _| Ok(interp.array(vec![Value::Bool(false), start_transition.clone()]))),
        false,
    );
    react.insert_hidden("useTransition", Value::Object(use_transition));

    let ids = Arc::new(AtomicU64::new(0));
    let use_id = native_function(
        realm,
        "useId",
        0,
        Arc::new(move |_, _, _, _| {
            let id = ids.fetch_add(1, Ordering::Relaxed);
            Ok(Value::string(format!(":r{}:", number_to_radix_string(id as f64, 32))))
        }),
        false,
    );
    react.insert_hidden("useId", Value::Object(use_id));
}

fn ignored_dispatch(realm: &Realm, name: &str) -> Value {
    function(realm, name, 1, |_, _, _| {
        debug!(target: PAYLOAD_TARGET, "state updates are ignored during a static render");
        Ok(Value::Undefined)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::interpreter::Limits;
    use crate::script::parser::parse;

    fn eval_with_react(source: &str) -> (Arc<Realm>, Value) {
        let realm = Realm::new();
        realm.global.insert_hidden("React", Value::Object(react_host(&realm)));
        let program = parse(source).unwrap();
        let mut interp = Interpreter::new(realm.clone(), Limits::default());
        let value = interp.run_function_body(&program, &[]).unwrap().unwrap_or_default();
        (realm, value)
    }

    fn eval_string(source: &str) -> String {
        match eval_with_react(source).1 {
            Value::String(s) => s.to_string(),
            other => panic!("expected a string, got {other:?}"),
        }
    }

    #[test]
    fn create_element_builds_react_shaped_elements() {
        let (realm, value) = eval_with_react(
            "return React.createElement('a', { href: '/x', key: 7, ref: null }, 'one', 'two')",
        );
        assert!(is_element(&realm, &value));
        let el = value.as_object().unwrap();
        assert_eq!(el.get("key").unwrap().as_str(), Some("7"));
        let props = el.get("props").unwrap();
        let props = props.as_object().unwrap();
        assert_eq!(props.get("href").unwrap().as_str(), Some("/x"));
        assert!(props.get("key").is_none());
        assert_eq!(props.get("children").unwrap().as_object().unwrap().array_len(), Some(2));
    }

    #[test]
    fn inlined_jsx_runtime_elements_are_valid() {
        let value = eval_string(
            "var el = { $$typeof: Symbol.for('react.element'), type: 'div', key: null, ref: null, props: {}, _owner: null };
             return [React.isValidElement(el), React.isValidElement({ type: 'div' }), React.isValidElement(React.createElement(React.Fragment))].join()",
        );
        assert_eq!(value, "true,false,true");
    }

    #[test]
    fn default_props_fill_only_missing_values() {
        let value = eval_string(
            "function Badge() {}
             Badge.defaultProps = { tone: 'info', size: 's' };
             var el = React.createElement(Badge, { size: 'l' });
             return el.props.tone + el.props.size",
        );
        assert_eq!(value, "infol");
    }

    #[test]
    fn hooks_return_initial_values() {
        let value = eval_string(
            "var s = React.useState(function () { return 3 });
             var r = React.useReducer(function (a) { return a }, 1, function (x) { return x + 1 });
             var ref = React.useRef('x');
             var memo = React.useMemo(function () { return 'm' }, []);
             var ctx = React.createContext('light');
             return [s[0], typeof s[1], r[0], ref.current, memo, React.useContext(ctx), React.useId()].join()",
        );
        assert_eq!(value, "3,function,2,x,m,light,:r0:");
    }

    #[test]
    fn children_helpers_flatten_and_skip_empty_slots() {
        let value = eval_string(
            "var kids = ['a', ['b', null], false];
             var doubled = React.Children.map(kids, function (c) { return c && c + c });
             return [React.Children.count(kids), React.Children.toArray(kids).join(''), doubled.join(''), React.Children.map(null, String)].join('|')",
        );
        assert_eq!(value, "4|ab|aabb|");
    }

    #[test]
    fn children_only_rejects_non_elements() {
        let err = {
            let realm = Realm::new();
            realm.global.insert_hidden("React", Value::Object(react_host(&realm)));
            let program = parse("React.Children.only(['a'])").unwrap();
            let mut interp = Interpreter::new(realm, Limits::default());
            interp.run_function_body(&program, &[]).unwrap_err().to_string()
        };
        assert_eq!(
            err,
            "Error: React.Children.only expected to receive a single React element child."
        );
    }

    #[test]
    fn class_components_extend_the_host_component() {
        let value = eval_string(
            "class Greeting extends React.Component {
               render() { return 'hi ' + this.props.name }
             }
             function Legacy(props) { React.Component.call(this, props) }
             Legacy.prototype = Object.create(React.Component.prototype);
             var g = new Greeting({ name: 'ada' });
             var l = new Legacy({ name: 'bob' });
             return [g.render(), l.props.name, g instanceof React.Component, !!Greeting.prototype.isReactComponent].join()",
        );
        assert_eq!(value, "hi ada,bob,true,true");
    }

    #[test]
    fn element_types_are_classified_for_rendering() {
        let (realm, value) = eval_with_react(
            "var ctx = React.createContext(0);
             return [React.Fragment, React.forwardRef(function () {}), React.memo('p'), ctx.Provider, ctx.Consumer, React.PureComponent, function () {}, 5]",
        );
        let items = value.as_object().unwrap().array_items().unwrap();
        let kinds: Vec<ElementType> = items.iter().map(|item| ElementType::of(&realm, item)).collect();
        assert!(matches!(kinds[0], ElementType::Transparent));
        assert!(matches!(kinds[1], ElementType::ForwardRef(_)));
        assert!(matches!(&kinds[2], ElementType::Memo(Value::String(tag)) if &**tag == "p"));
        assert!(matches!(kinds[3], ElementType::Provider(_)));
        assert!(matches!(kinds[4], ElementType::Consumer(_)));
        assert!(matches!(kinds[5], ElementType::Class(_)));
        assert!(matches!(kinds[6], ElementType::Function(_)));
        assert!(matches!(kinds[7], ElementType::Invalid));
    }
}
