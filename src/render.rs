use crate::scope::GlobalScope;
use crate::script::builtins::react::{ElementType, is_element};
use crate::script::value::{PropertyKey, number_to_string};
use crate::script::{Interpreter, Limits, ObjectRef, ScriptError, Value};
use html5ever::{LocalName, QualName, local_name, namespace_url, ns};
use kuchiki::traits::*;
use kuchiki::{Attribute, ExpandedName, NodeRef};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

pub const LOADING_TEXT: &str = "Loading remote component…";
pub const ERROR_PREFIX: &str = "Failed to load remote component: ";
pub const INVALID_EXPORT_TEXT: &str = "Invalid UMD component export";

/// Id of the mount node inside the shadow root.
pub const MOUNT_ID: &str = "root";

const CONTAINER_STYLE: &str = "width:100%;height:100%;background:black;color:white";
const MOUNT_STYLE: &str = "width:100%;height:100%";
const MAX_RENDER_DEPTH: usize = 512;

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const UNITLESS_CSS: &[&str] = &[
    "animationIterationCount",
    "flex",
    "flexGrow",
    "flexShrink",
    "fontWeight",
    "gridColumn",
    "gridRow",
    "lineHeight",
    "opacity",
    "order",
    "orphans",
    "widows",
    "zIndex",
    "zoom",
];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("Objects are not valid as a React child (found: {0})")]
    InvalidChild(String),
    #[error("Invalid tag name '{0}'")]
    InvalidTag(String),
    #[error(
        "Element type is invalid: expected a string (for built-in components) or a class/function (for composite components) but got: {0}."
    )]
    InvalidType(String),
    #[error("A context consumer was rendered with a child that isn't a function")]
    ConsumerChild,
    #[error("component tree nested deeper than {0} levels")]
    TooDeep(usize),
    #[error("html manipulation failed: {0}")]
    Html(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MountStatus {
    Loading,
    Rendered,
    Invalid,
    Failed,
}

/// What the mount node currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedView {
    pub status: MountStatus,
    /// Serialized `#root` node, ready to place in the shadow root.
    pub markup: String,
    pub message: Option<String>,
}

impl MountedView {
    pub fn loading() -> Self {
        let view = format!(
            "<div style=\"{CONTAINER_STYLE};display:grid;place-items:center\">\
             <div style=\"font-size:12px;opacity:0.8\">{}</div></div>",
            escape_text(LOADING_TEXT)
        );
        Self {
            status: MountStatus::Loading,
            markup: into_mount(&view),
            message: None,
        }
    }

    pub fn failed(message: &str) -> Self {
        let message = format!("{ERROR_PREFIX}{message}");
        let view = format!(
            "<div style=\"padding:12px;font-size:12px;background:black;color:#fca5a5;\
             height:100%;overflow:auto\">{}</div>",
            escape_text(&message)
        );
        Self {
            status: MountStatus::Failed,
            markup: into_mount(&view),
            message: Some(message),
        }
    }

    fn invalid() -> Self {
        let view = format!("<div>{}</div>", escape_text(INVALID_EXPORT_TEXT));
        Self {
            status: MountStatus::Invalid,
            markup: into_mount(&wrap_container(&view)),
            message: Some(INVALID_EXPORT_TEXT.to_string()),
        }
    }

    fn rendered(html: &str) -> Self {
        Self {
            status: MountStatus::Rendered,
            markup: into_mount(&wrap_container(html)),
            message: None,
        }
    }
}

fn wrap_container(inner: &str) -> String {
    format!("<div style=\"{CONTAINER_STYLE}\">{inner}</div>")
}

fn into_mount(view: &str) -> String {
    mount_markup(view).unwrap_or_else(|err| {
        warn!(?err, "failed to build mount node; using raw markup");
        format!("<div id=\"{MOUNT_ID}\" style=\"{MOUNT_STYLE}\">{view}</div>")
    })
}

/// Builds the `#root` mount node around the parsed `view` and serializes it.
pub fn mount_markup(view: &str) -> Result<String, RenderError> {
    let attributes = [("id", MOUNT_ID), ("style", MOUNT_STYLE)].map(|(name, value)| {
        (
            ExpandedName::new(ns!(), LocalName::from(name)),
            Attribute {
                prefix: None,
                value: value.to_string(),
            },
        )
    });
    let mount = NodeRef::new_element(QualName::new(None, ns!(html), local_name!("div")), attributes);
    let parsed = kuchiki::parse_html().one(view);
    let body = parsed
        .select_first("body")
        .map_err(|_| RenderError::Html("parsed view has no body".into()))?;
    let nodes: Vec<NodeRef> = body.as_node().children().collect();
    for node in nodes {
        mount.append(node);
    }
    Ok(mount.to_string())
}

/// Mounts a resolved export against the global table it was resolved in.
///
/// Callables render as a component with empty props, UI elements render
/// directly, and a namespace object with a callable `default` is unwrapped
/// first. Anything else gets the invalid-export placeholder.
pub fn mount_export(value: &Value, global: &GlobalScope, limits: Limits) -> MountedView {
    let realm = global.realm().clone();
    let target = match value {
        Value::Object(obj) if obj.is_callable() || is_element(&realm, value) => value.clone(),
        Value::Object(namespace) => match namespace.get("default") {
            Some(default) if default.is_callable() => default,
            _ => return MountedView::invalid(),
        },
        _ => return MountedView::invalid(),
    };
    let mut interp = Interpreter::new(realm, limits);
    let root = if target.is_callable() {
        let props = interp.realm().object();
        match render_component(&mut interp, &target, &props) {
            Ok(root) => root,
            Err(err) => return MountedView::failed(&err.to_string()),
        }
    } else {
        target
    };
    if !is_renderable(&interp, &root) {
        debug!(kind = root.type_of(), "component returned a non-renderable value");
        return MountedView::invalid();
    }
    let mut html = String::new();
    match render_node(&mut interp, &root, 0, &mut html) {
        Ok(()) => MountedView::rendered(&html),
        Err(err) => MountedView::failed(&err.to_string()),
    }
}

fn is_renderable(interp: &Interpreter, value: &Value) -> bool {
    match value {
        Value::Object(obj) => obj.is_array() || is_element(interp.realm(), value),
        Value::Symbol(_) => false,
        _ => true,
    }
}

/// An own data property of a props object.
fn prop(props: &ObjectRef, name: &str) -> Value {
    props
        .get_own_property(&PropertyKey::from(name))
        .and_then(|p| p.value().cloned())
        .unwrap_or_default()
}

/// Calls a function component, or instantiates a class component and calls
/// its `render`.
fn render_component(interp: &mut Interpreter, component: &Value, props: &ObjectRef) -> Result<Value, RenderError> {
    let props_value = Value::Object(props.clone());
    match ElementType::of(interp.realm(), component) {
        ElementType::Class(class) => render_class(interp, &class, props_value),
        _ => Ok(interp.call(component, Value::Undefined, vec![props_value])?),
    }
}

fn render_class(interp: &mut Interpreter, class: &Value, props: Value) -> Result<Value, RenderError> {
    let instance = interp.instantiate(class, vec![props.clone()])?;
    let Value::Object(obj) = &instance else {
        return Ok(Value::Undefined);
    };
    obj.insert("props", props.clone());
    let derive = class
        .as_object()
        .and_then(|class| class.get("getDerivedStateFromProps"))
        .filter(Value::is_callable);
    if let Some(derive) = derive {
        let state = obj.get("state").unwrap_or(Value::Null);
        if let Value::Object(partial) = interp.call(&derive, Value::Undefined, vec![props, state.clone()])? {
            let merged = interp.realm().object();
            for source in [state.as_object(), Some(&partial)].into_iter().flatten() {
                for name in source.enumerable_keys() {
                    let value = prop(source, &name);
                    merged.insert(name, value);
                }
            }
            obj.insert("state", Value::Object(merged));
        }
    }
    let render = obj.get("render").unwrap_or_default();
    Ok(interp.call(&render, instance.clone(), Vec::new())?)
}

/// Renders an element tree to HTML, calling components along the way.
pub fn render_node(
    interp: &mut Interpreter,
    node: &Value,
    depth: usize,
    out: &mut String,
) -> Result<(), RenderError> {
    if depth > MAX_RENDER_DEPTH {
        return Err(RenderError::TooDeep(MAX_RENDER_DEPTH));
    }
    crate::script::ensure_sufficient_stack(|| match node {
        Value::Undefined | Value::Null | Value::Bool(_) | Value::Symbol(_) => Ok(()),
        Value::Number(n) => {
            out.push_str(&escape_text(&number_to_string(*n)));
            Ok(())
        }
        Value::String(s) => {
            out.push_str(&escape_text(s));
            Ok(())
        }
        Value::Object(obj) if obj.is_callable() => Ok(()),
        Value::Object(obj) if obj.is_array() => {
            for child in obj.array_items().unwrap_or_default() {
                render_node(interp, &child, depth + 1, out)?;
            }
            Ok(())
        }
        Value::Object(obj) if is_element(interp.realm(), node) => render_element(interp, obj, depth, out),
        Value::Object(obj) => Err(RenderError::InvalidChild(format!(
            "object with keys {{{}}}",
            obj.enumerable_keys().join(", ")
        ))),
    })
}

fn render_element(
    interp: &mut Interpreter,
    el: &ObjectRef,
    depth: usize,
    out: &mut String,
) -> Result<(), RenderError> {
    let ty = el.get("type").unwrap_or_default();
    let props = match el.get("props") {
        Some(Value::Object(props)) => props,
        _ => interp.realm().object(),
    };
    render_type(interp, &ty, &props, depth, out)
}

fn render_type(
    interp: &mut Interpreter,
    ty: &Value,
    props: &ObjectRef,
    depth: usize,
    out: &mut String,
) -> Result<(), RenderError> {
    match ElementType::of(interp.realm(), ty) {
        ElementType::Host(tag) => render_host(interp, &tag, props, depth, out),
        ElementType::Transparent => render_node(interp, &prop(props, "children"), depth + 1, out),
        ElementType::Function(_) | ElementType::Class(_) => {
            let rendered = render_component(interp, ty, props)?;
            render_node(interp, &rendered, depth + 1, out)
        }
        ElementType::Provider(context) => {
            let previous = context.get("_currentValue").unwrap_or_default();
            context.insert("_currentValue", prop(props, "value"));
            let result = render_node(interp, &prop(props, "children"), depth + 1, out);
            context.insert("_currentValue", previous);
            result
        }
        ElementType::Consumer(context) => {
            let children = prop(props, "children");
            if !children.is_callable() {
                return Err(RenderError::ConsumerChild);
            }
            let current = context.get("_currentValue").unwrap_or_default();
            let rendered = interp.call(&children, Value::Undefined, vec![current])?;
            render_node(interp, &rendered, depth + 1, out)
        }
        ElementType::ForwardRef(render) => {
            let rendered = interp.call(&render, Value::Undefined, vec![Value::Object(props.clone()), Value::Null])?;
            render_node(interp, &rendered, depth + 1, out)
        }
        ElementType::Memo(inner) => render_type(interp, &inner, props, depth + 1, out),
        ElementType::Invalid => Err(RenderError::InvalidType(match ty {
            Value::Null => "null".to_string(),
            Value::Object(obj) => format!("object with keys {{{}}}", obj.enumerable_keys().join(", ")),
            other => other.type_of().to_string(),
        })),
    }
}

fn render_host(
    interp: &mut Interpreter,
    tag: &str,
    props: &ObjectRef,
    depth: usize,
    out: &mut String,
) -> Result<(), RenderError> {
    if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(RenderError::InvalidTag(tag.to_string()));
    }
    out.push('<');
    out.push_str(tag);
    let mut inner_html = None;
    for name in props.enumerable_keys() {
        let value = prop(props, &name);
        match &*name {
            "children" | "key" | "ref" | "suppressHydrationWarning" | "suppressContentEditableWarning" => {}
            "dangerouslySetInnerHTML" => {
                if let Value::Object(obj) = &value {
                    inner_html = obj.get("__html").and_then(|v| v.primitive_to_string());
                }
            }
            "style" => {
                if let Value::Object(style) = &value {
                    let css = style_to_css(style);
                    if !css.is_empty() {
                        push_attr(out, "style", &css);
                    }
                }
            }
            _ => render_attr(out, &name, &value),
        }
    }
    out.push('>');
    if VOID_TAGS.contains(&tag) {
        return Ok(());
    }
    match inner_html {
        Some(html) => out.push_str(&html),
        None => render_node(interp, &prop(props, "children"), depth + 1, out)?,
    }
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
    Ok(())
}

fn render_attr(out: &mut String, name: &str, value: &Value) {
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
    {
        return;
    }
    let name = match name {
        "className" => "class",
        "htmlFor" => "for",
        other => other,
    };
    match value {
        Value::Undefined | Value::Null | Value::Bool(false) | Value::Symbol(_) | Value::Object(_) => {}
        Value::Bool(true) => push_attr(out, name, ""),
        other => {
            if let Some(text) = other.primitive_to_string() {
                push_attr(out, name, &text);
            }
        }
    }
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape_attr(value));
    out.push('"');
}

/// `{ fontSize: 12, backgroundColor: 'black' }` → `font-size:12px;background-color:black`
pub fn style_to_css(style: &ObjectRef) -> String {
    style
        .enumerable_keys()
        .iter()
        .filter_map(|name| {
            let value = match prop(style, name) {
                Value::Number(n) if n != 0.0 && !UNITLESS_CSS.contains(&&**name) => {
                    format!("{}px", number_to_string(n))
                }
                Value::Number(n) => number_to_string(n),
                Value::String(s) if !s.is_empty() => s.to_string(),
                _ => return None,
            };
            Some(format!("{}:{}", css_property_name(name), value))
        })
        .collect::<Vec<_>>()
        .join(";")
}

fn css_property_name(name: &str) -> String {
    if name.starts_with("--") {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len() + 4);
    if name.starts_with("ms") && name[2..].starts_with(|c: char| c.is_ascii_uppercase()) {
        out.push('-');
    }
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ExecutionScope;
    use crate::script;

    fn eval(scope: &ExecutionScope, source: &str) -> Option<Value> {
        let program = script::parse(source).unwrap();
        Interpreter::new(scope.global().realm().clone(), Limits::default())
            .run_function_body(&program, scope.params())
            .unwrap()
    }

    fn mount(source: &str) -> MountedView {
        let scope = ExecutionScope::fresh();
        let value = eval(&scope, source).unwrap();
        mount_export(&value, scope.global(), Limits::default())
    }

    #[test]
    fn callable_export_renders_inside_container() {
        let view = mount(
            "return function Hello() {
               return React.createElement('div', { className: 'p-4', style: { fontSize: 12, backgroundColor: 'black', opacity: 0.5 } }, 'Hello ', 'world');
             }",
        );
        assert_eq!(view.status, MountStatus::Rendered);
        assert!(view.markup.starts_with("<div id=\"root\""));
        assert!(view.markup.contains(CONTAINER_STYLE));
        assert!(view.markup.contains("class=\"p-4\""));
        assert!(
            view.markup
                .contains("style=\"font-size:12px;background-color:black;opacity:0.5\"")
        );
        assert!(view.markup.contains("Hello world"));
    }

    #[test]
    fn nested_components_receive_props_and_children() {
        let view = mount(
            "var h = React.createElement;
             function Item(props) { return h('li', null, props.label, props.children) }
             function List() {
               return h(React.Fragment, null,
                 h('ul', null, ['a', 'b'].map(function (l) { return h(Item, { key: l, label: l }, '!') })));
             }
             return List;",
        );
        assert_eq!(view.status, MountStatus::Rendered);
        assert!(view.markup.contains("<ul><li>a!</li><li>b!</li></ul>"));
    }

    #[test]
    fn element_export_is_mounted_directly_and_functions_are_dropped() {
        let view = mount(
            "return React.createElement('button', { onClick: function () {}, disabled: true, title: 'a\"b' }, '<x>')",
        );
        assert_eq!(view.status, MountStatus::Rendered);
        assert!(!view.markup.contains("onClick"));
        assert!(view.markup.contains("disabled=\"\""));
        assert!(view.markup.contains("&lt;x&gt;"));
        assert!(view.markup.contains("title=\"a&quot;b\""));
    }

    #[test]
    fn namespace_default_is_unwrapped() {
        let view = mount("return { default: function () { return 'from default' } }");
        assert_eq!(view.status, MountStatus::Rendered);
        assert!(view.markup.contains("from default"));
    }

    #[test]
    fn non_component_exports_are_invalid() {
        for source in ["return { x: 1 }", "return 42", "return function () { return { x: 1 } }"] {
            let view = mount(source);
            assert_eq!(view.status, MountStatus::Invalid, "{source}");
            assert!(view.markup.contains(INVALID_EXPORT_TEXT));
        }
    }

    #[test]
    fn throwing_component_renders_the_error_view() {
        let view = mount("return function () { throw new TypeError('nope') }");
        assert_eq!(view.status, MountStatus::Failed);
        assert_eq!(
            view.message.as_deref(),
            Some("Failed to load remote component: TypeError: nope")
        );
        assert!(view.markup.contains("color:#fca5a5"));
    }

    #[test]
    fn object_children_fail_the_render() {
        let view = mount("return function () { return React.createElement('div', null, { a: 1 }) }");
        assert_eq!(view.status, MountStatus::Failed);
        assert!(
            view.message
                .unwrap()
                .contains("Objects are not valid as a React child")
        );
    }

    #[test]
    fn loading_and_failure_views() {
        let loading = MountedView::loading();
        assert_eq!(loading.status, MountStatus::Loading);
        assert!(loading.markup.contains(LOADING_TEXT));

        let failed = MountedView::failed("HTTP 404 for https://x.test/a.js");
        assert!(
            failed
                .markup
                .contains("Failed to load remote component: HTTP 404 for https://x.test/a.js")
        );
    }

    #[test]
    fn mount_node_wraps_the_parsed_view() {
        assert_eq!(
            mount_markup("<p>a &amp; b</p><br>").unwrap(),
            "<div id=\"root\" style=\"width:100%;height:100%\"><p>a &amp; b</p><br></div>"
        );
    }

    #[test]
    fn vite_bundle_export_renders_through_the_jsx_runtime() {
        let scope = ExecutionScope::fresh();
        eval(&scope, crate::resolver::VITE_HELLO_COMPONENT);
        let export = scope.global().get("HelloComponent").unwrap();
        let view = mount_export(&export, scope.global(), Limits::default());
        assert_eq!(view.status, MountStatus::Rendered);
        assert!(view.markup.contains("<div>Hello from component</div>"));
    }

    #[test]
    fn class_components_render_with_derived_state() {
        let view = mount(
            "class Counter extends React.Component {
               constructor(props) { super(props); this.state = { count: 1 }; }
               static getDerivedStateFromProps(props, state) { return { label: props.label || 'n' } }
               render() { return React.createElement('span', null, this.state.label, '=', this.state.count) }
             }
             return Counter;",
        );
        assert_eq!(view.status, MountStatus::Rendered);
        assert!(view.markup.contains("<span>n=1</span>"));
    }

    #[test]
    fn context_providers_reach_consumers_and_hooks() {
        let view = mount(
            "var h = React.createElement, Theme = React.createContext('light');
             function Label() { return h('b', null, React.useContext(Theme)) }
             var Fancy = React.memo(React.forwardRef(function (props) { return h('i', null, props.text) }));
             return function App() {
               return h(Theme.Provider, { value: 'dark' },
                 h(Label), h(Theme.Consumer, null, function (v) { return h('u', null, v) }), h(Fancy, { text: 't' }));
             };",
        );
        assert_eq!(view.status, MountStatus::Rendered);
        assert!(view.markup.contains("<b>dark</b><u>dark</u><i>t</i>"));
    }

    #[test]
    fn undefined_element_type_fails_the_render() {
        let view = mount("return function () { return React.createElement(undefined) }");
        assert_eq!(view.status, MountStatus::Failed);
        assert!(view.message.unwrap().contains("Element type is invalid"));
    }

    #[test]
    fn css_names_are_kebab_cased() {
        assert_eq!(css_property_name("backgroundColor"), "background-color");
        assert_eq!(css_property_name("WebkitTransform"), "-webkit-transform");
        assert_eq!(css_property_name("msTransform"), "-ms-transform");
        assert_eq!(css_property_name("--accent"), "--accent");
    }
}
