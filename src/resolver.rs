//! Remote module resolution: fetch a payload, run it against the global
//! table of the scope it is handed, then pick the value it exported.
//!
//! Selection order is fixed: an explicit top-level `return`, then the
//! configured well-known names, then (while `legacy_global_diff` is on) the
//! first new global bound to a callable or object.

use crate::fetch::{FetchError, ModuleFetcher};
use crate::scope::{BindingSnapshot, ExecutionScope, GlobalScope};
use crate::script::builtins::react::is_element;
use crate::script::{self, Interpreter, Limits, Realm, ScriptError, Value};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

pub const DEFAULT_EXPORT_NAMES: [&str; 5] = [
    "RemoteComponent",
    "default",
    "App",
    "HelloComponent",
    "Component",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPolicy {
    /// Checked in order; earlier names win.
    pub export_names: Vec<String>,
    pub legacy_global_diff: bool,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            export_names: DEFAULT_EXPORT_NAMES.iter().map(|s| s.to_string()).collect(),
            legacy_global_diff: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    Callable,
    UiElement,
    PlainObject,
    Other,
    None,
}

impl ExportKind {
    /// Classifies `value`; element tags are looked up in `realm`'s symbol registry.
    pub fn of(realm: &Realm, value: &Value) -> Self {
        match value {
            Value::Object(obj) if obj.is_callable() => ExportKind::Callable,
            Value::Object(_) if is_element(realm, value) => ExportKind::UiElement,
            Value::Object(obj) if obj.is_array() => ExportKind::Other,
            Value::Object(_) => ExportKind::PlainObject,
            Value::Undefined | Value::Null => ExportKind::None,
            Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Symbol(_) => {
                ExportKind::Other
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "via", content = "name", rename_all = "snake_case")]
pub enum ExportSource {
    ExplicitReturn,
    WellKnown(String),
    NewBinding(String),
}

impl fmt::Display for ExportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportSource::ExplicitReturn => write!(f, "explicit return"),
            ExportSource::WellKnown(name) => write!(f, "well-known name '{name}'"),
            ExportSource::NewBinding(name) => write!(f, "new global '{name}'"),
        }
    }
}

/// The value a payload exported, plus how it was found.
#[derive(Debug, Clone)]
pub struct ResolvedExport {
    pub value: Value,
    pub kind: ExportKind,
    pub source: ExportSource,
    pub attempt_id: Uuid,
    /// Global names the payload introduced, in creation order.
    pub new_keys: Vec<String>,
    /// The table the payload ran against; rendering the export must use it.
    pub global: GlobalScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    Eval,
    NoExportFound,
}

#[derive(Debug, Clone, Error)]
pub enum ResolveCause {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Eval failure: {0}")]
    Eval(#[from] ScriptError),
    #[error("UMD did not expose a usable component")]
    NoExportFound { new_keys: Vec<String> },
}

/// A failed resolution attempt.
#[derive(Debug, Clone, Error)]
#[error("{cause}")]
pub struct ResolveError {
    pub attempt_id: Uuid,
    pub cause: ResolveCause,
}

impl ResolveError {
    pub fn kind(&self) -> FailureKind {
        match self.cause {
            ResolveCause::Fetch(_) => FailureKind::Fetch,
            ResolveCause::Eval(_) => FailureKind::Eval,
            ResolveCause::NoExportFound { .. } => FailureKind::NoExportFound,
        }
    }
}

/// Serializable failure summary for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolveFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&ResolveError> for ResolveFailure {
    fn from(err: &ResolveError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug)]
struct Selection {
    value: Value,
    source: ExportSource,
    candidates: usize,
}

#[derive(Clone)]
pub struct Resolver {
    fetcher: Arc<dyn ModuleFetcher>,
    policy: SelectionPolicy,
    limits: Limits,
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn ModuleFetcher>, policy: SelectionPolicy, limits: Limits) -> Self {
        Self {
            fetcher,
            policy,
            limits,
        }
    }

    /// Fetches and runs `url` against `scope`, then selects its export.
    /// Never retries. The payload's side effects land in `scope`'s global table.
    pub async fn resolve(
        &self,
        url: &str,
        scope: &ExecutionScope,
    ) -> Result<ResolvedExport, ResolveError> {
        let attempt_id = Uuid::new_v4();
        let span = info_span!("resolve", %attempt_id, %url);
        self.attempt(url, scope, attempt_id)
            .instrument(span)
            .await
            .map_err(|cause| ResolveError { attempt_id, cause })
    }

    async fn attempt(
        &self,
        url: &str,
        scope: &ExecutionScope,
        attempt_id: Uuid,
    ) -> Result<ResolvedExport, ResolveCause> {
        info!("fetching UMD");
        let source = self.fetcher.fetch(url).await?;
        let worker_scope = scope.clone();
        let policy = self.policy.clone();
        let limits = self.limits;
        let outcome = tokio::task::spawn_blocking(move || {
            execute_payload(&source, &worker_scope, &policy, limits)
        })
        .await
        .unwrap_or_else(|join_err| {
            Err(ResolveCause::Eval(ScriptError::Uncaught(format!(
                "payload execution aborted: {join_err}"
            ))))
        });
        let (selection, new_keys) = outcome.inspect_err(|err| match err {
            ResolveCause::Eval(cause) => error!(%cause, "UMD eval error"),
            other => debug!(error = %other, "resolution failed"),
        })?;
        info!(
            candidates = selection.candidates,
            source = %selection.source,
            "resolved UMD export"
        );
        let global = scope.global().clone();
        Ok(ResolvedExport {
            kind: ExportKind::of(global.realm(), &selection.value),
            value: selection.value,
            source: selection.source,
            attempt_id,
            new_keys,
            global,
        })
    }
}

/// Runs `source` as a function body over `scope` and selects the export.
fn execute_payload(
    source: &str,
    scope: &ExecutionScope,
    policy: &SelectionPolicy,
    limits: Limits,
) -> Result<(Selection, Vec<String>), ResolveCause> {
    let program = script::parse(source)?;
    let global = scope.global();
    let before = global.snapshot();
    let mut interp = Interpreter::new(global.realm().clone(), limits);
    let returned = interp.run_function_body(&program, scope.params())?;
    let after = global.snapshot();
    let new_keys = after.new_keys(&before);
    let selection = select_export(returned, &before, &after, global, policy)?;
    Ok((selection, new_keys))
}

fn select_export(
    returned: Option<Value>,
    before: &BindingSnapshot,
    after: &BindingSnapshot,
    global: &GlobalScope,
    policy: &SelectionPolicy,
) -> Result<Selection, ResolveCause> {
    let well_known: Vec<(&str, Value)> = policy
        .export_names
        .iter()
        .filter(|name| after.contains(name))
        .filter_map(|name| {
            global
                .get(name)
                .filter(|value| !value.is_nullish())
                .map(|value| (name.as_str(), value))
        })
        .collect();

    let new_keys = after.new_keys(before);
    let fallback = if policy.legacy_global_diff {
        new_keys.iter().find_map(|name| {
            global
                .get(name)
                .filter(|value| value.is_callable() || value.is_object_like())
                .map(|value| (name.clone(), value))
        })
    } else {
        None
    };
    let candidates = well_known.len() + usize::from(fallback.is_some());
    debug!(
        picked = fallback.as_ref().map(|(name, _)| name.as_str()),
        candidates,
        "UMD candidates"
    );

    if let Some(value) = returned.filter(|value| !value.is_nullish()) {
        return Ok(Selection {
            value,
            source: ExportSource::ExplicitReturn,
            candidates: candidates + 1,
        });
    }
    if let Some((name, value)) = well_known.into_iter().next() {
        return Ok(Selection {
            value,
            source: ExportSource::WellKnown(name.to_string()),
            candidates,
        });
    }
    match fallback {
        Some((name, value)) => Ok(Selection {
            value,
            source: ExportSource::NewBinding(name),
            candidates,
        }),
        None => Err(ResolveCause::NoExportFound { new_keys }),
    }
}

/// `vite build --mode production` output for a component library with
/// `react` external and `react/jsx-runtime` bundled in.
#[cfg(test)]
pub(crate) const VITE_HELLO_COMPONENT: &str = r#"(function(e,t){typeof exports=="object"&&typeof module<"u"?module.exports=t(require("react")):typeof define=="function"&&define.amd?define(["react"],t):(e=typeof globalThis<"u"?globalThis:e||self,e.HelloComponent=t(e.React))})(this,function(e){"use strict";var t={exports:{}},r={};var f=e,o=Symbol.for("react.element"),s=Symbol.for("react.fragment"),a=Object.prototype.hasOwnProperty,p=f.__SECRET_INTERNALS_DO_NOT_USE_OR_YOU_WILL_BE_FIRED.ReactCurrentOwner,u={key:!0,ref:!0,__self:!0,__source:!0};function c(n,l,d){var i,m={},_=null,y=null;d!==void 0&&(_=""+d),l.key!==void 0&&(_=""+l.key),l.ref!==void 0&&(y=l.ref);for(i in l)a.call(l,i)&&!u.hasOwnProperty(i)&&(m[i]=l[i]);if(n&&n.defaultProps)for(i in l=n.defaultProps,l)m[i]===void 0&&(m[i]=l[i]);return{$$typeof:o,type:n,key:_,ref:y,props:m,_owner:p.current}}r.Fragment=s,r.jsx=c,r.jsxs=c,t.exports=r;var x=t.exports;function h(){return x.jsx("div",{children:"Hello from component"})}return h});"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticModuleFetcher;

    const URL: &str = "https://cdn.test/remote.umd.js";

    fn resolver_for(source: &str, policy: SelectionPolicy) -> Resolver {
        let fetcher = StaticModuleFetcher::new().with_module(URL, source);
        Resolver::new(Arc::new(fetcher), policy, Limits::default())
    }

    async fn resolve_once(source: &str) -> (Result<ResolvedExport, ResolveError>, GlobalScope) {
        let scope = ExecutionScope::fresh();
        let result = resolver_for(source, SelectionPolicy::default())
            .resolve(URL, &scope)
            .await;
        (result, scope.global().clone())
    }

    #[tokio::test]
    async fn fetch_failure_runs_nothing() {
        let scope = ExecutionScope::fresh();
        let before = scope.global().snapshot();
        let err = resolver_for("window.App = function () {}", SelectionPolicy::default())
            .resolve("https://cdn.test/missing.js", &scope)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Fetch);
        assert_eq!(
            err.to_string(),
            "HTTP 404 for https://cdn.test/missing.js"
        );
        assert_eq!(scope.global().snapshot(), before);
    }

    #[tokio::test]
    async fn throwing_payload_is_an_eval_error() {
        let (result, global) = resolve_once("window.Partial = {}; throw new Error('kaboom');").await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Eval);
        assert_eq!(err.to_string(), "Eval failure: Error: kaboom");
        assert!(!err.attempt_id.is_nil());
        // Side effects before the throw stay; nothing is rolled back.
        assert!(global.snapshot().contains("Partial"));
    }

    #[tokio::test]
    async fn syntax_error_is_an_eval_error() {
        let (result, _) = resolve_once("window.App = function (").await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Eval);
        assert!(err.to_string().starts_with("Eval failure: SyntaxError"));
    }

    #[tokio::test]
    async fn arrow_remote_component_is_selected_by_name() {
        let (result, _) = resolve_once(r#"window.RemoteComponent = () => "hi";"#).await;
        let export = result.unwrap();
        assert_eq!(export.kind, ExportKind::Callable);
        assert_eq!(
            export.source,
            ExportSource::WellKnown("RemoteComponent".into())
        );
        assert_eq!(export.new_keys, vec!["RemoteComponent"]);
    }

    #[tokio::test]
    async fn new_plain_object_is_found_by_diff() {
        let (result, _) = resolve_once("window.Foo = {x:1};").await;
        let export = result.unwrap();
        assert_eq!(export.source, ExportSource::NewBinding("Foo".into()));
        assert_eq!(export.kind, ExportKind::PlainObject);
        let Value::Object(foo) = export.value else {
            panic!("expected object");
        };
        assert_eq!(foo.get("x").map(|v| v.to_number_primitive()), Some(1.0));
    }

    #[tokio::test]
    async fn element_export_is_classified_as_ui_element() {
        let (result, _) = resolve_once("window.App = React.createElement('p', null, 'static');").await;
        assert_eq!(result.unwrap().kind, ExportKind::UiElement);
    }

    #[tokio::test]
    async fn well_known_name_beats_earlier_new_globals() {
        let (result, _) = resolve_once(
            "window.Zed = function () {}; window.Component = {}; window.App = function () {};",
        )
        .await;
        assert_eq!(result.unwrap().source, ExportSource::WellKnown("App".into()));
    }

    #[tokio::test]
    async fn null_well_known_names_are_skipped() {
        let (result, _) =
            resolve_once("window.RemoteComponent = null; window.App = undefined; window.Widget = function () {};")
                .await;
        assert_eq!(
            result.unwrap().source,
            ExportSource::NewBinding("Widget".into())
        );
    }

    #[tokio::test]
    async fn primitive_new_globals_are_not_exports() {
        let (result, _) = resolve_once("window.VERSION = '1.0'; window.count = 3;").await;
        let err = result.unwrap_err();
        let ResolveCause::NoExportFound { new_keys } = err.cause else {
            panic!("expected NoExportFound");
        };
        assert_eq!(new_keys, vec!["VERSION", "count"]);
    }

    #[tokio::test]
    async fn mutating_existing_globals_finds_nothing() {
        let scope = ExecutionScope::fresh();
        let realm = scope.global().realm().clone();
        realm.global.insert("Existing", Value::Object(realm.object()));
        let err = resolver_for(
            "window.Existing.widget = function () {}; console.patched = true;",
            SelectionPolicy::default(),
        )
        .resolve(URL, &scope)
        .await
        .unwrap_err();
        assert_eq!(err.kind(), FailureKind::NoExportFound);
        assert_eq!(err.to_string(), "UMD did not expose a usable component");
    }

    #[tokio::test]
    async fn explicit_return_wins_over_globals() {
        let (result, _) = resolve_once(
            "window.RemoteComponent = function () {}; return function Returned() { return 'r' };",
        )
        .await;
        let export = result.unwrap();
        assert_eq!(export.source, ExportSource::ExplicitReturn);
        assert_eq!(export.kind, ExportKind::Callable);
    }

    #[tokio::test]
    async fn legacy_diff_can_be_disabled() {
        let policy = SelectionPolicy {
            legacy_global_diff: false,
            ..SelectionPolicy::default()
        };
        let err = resolver_for("window.Foo = {x:1};", policy)
            .resolve(URL, &ExecutionScope::fresh())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::NoExportFound);
    }

    #[tokio::test]
    async fn custom_export_names_replace_the_defaults() {
        let policy = SelectionPolicy {
            export_names: vec!["Widget".into(), "App".into()],
            legacy_global_diff: false,
        };
        let export = resolver_for("window.App = {}; window.Widget = {};", policy)
            .resolve(URL, &ExecutionScope::fresh())
            .await
            .unwrap();
        assert_eq!(export.source, ExportSource::WellKnown("Widget".into()));
    }

    #[tokio::test]
    async fn repeated_resolution_selects_the_same_shape() {
        let resolver = resolver_for(
            "window.Widget = function () { return 'hi' };",
            SelectionPolicy::default(),
        );
        let first = resolver.resolve(URL, &ExecutionScope::fresh()).await.unwrap();
        let second = resolver.resolve(URL, &ExecutionScope::fresh()).await.unwrap();
        assert_eq!(first.source, ExportSource::NewBinding("Widget".into()));
        assert_eq!(first.source, second.source);
        assert_eq!(first.kind, second.kind);
        assert_eq!(first.new_keys, second.new_keys);
        assert_ne!(first.attempt_id, second.attempt_id);
    }

    #[tokio::test]
    async fn reusing_a_scope_hides_the_diff_binding() {
        let scope = ExecutionScope::fresh();
        let resolver = resolver_for(
            "window.Widget = function () { return 'hi' };",
            SelectionPolicy::default(),
        );
        resolver.resolve(URL, &scope).await.unwrap();
        let err = resolver.resolve(URL, &scope).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::NoExportFound);
    }

    #[tokio::test]
    async fn vite_umd_bundle_with_inlined_jsx_runtime_resolves() {
        let (result, _) = resolve_once(VITE_HELLO_COMPONENT).await;
        let export = result.unwrap();
        assert_eq!(
            export.source,
            ExportSource::WellKnown("HelloComponent".into())
        );
        assert_eq!(export.kind, ExportKind::Callable);

        let realm = export.global.realm().clone();
        let mut interp = Interpreter::new(realm.clone(), Limits::default());
        let element = interp.call(&export.value, Value::Undefined, Vec::new()).unwrap();
        assert_eq!(ExportKind::of(&realm, &element), ExportKind::UiElement);
        let element = element.as_object().unwrap();
        assert_eq!(element.get("type").and_then(|t| t.as_str().map(str::to_string)).as_deref(), Some("div"));
        let props = element.get("props").unwrap();
        assert_eq!(
            props.as_object().unwrap().get("children").unwrap().as_str(),
            Some("Hello from component")
        );
    }

    #[test]
    fn failure_summary_serializes_kind() {
        let err = ResolveError {
            attempt_id: Uuid::nil(),
            cause: ResolveCause::NoExportFound {
                new_keys: Vec::new(),
            },
        };
        assert_eq!(
            serde_json::to_value(ResolveFailure::from(&err)).unwrap(),
            serde_json::json!({
                "kind": "no_export_found",
                "message": "UMD did not expose a usable component"
            })
        );
    }
}
