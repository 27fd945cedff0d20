use crate::script::builtins::dom::document_host;
use crate::script::builtins::react::react_host;
use crate::script::value::PropertyKey;
use crate::script::{Realm, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Parameter names a payload body sees, in declaration order.
pub const DEFAULT_INJECTED_NAMES: [&str; 3] = ["window", "document", "React"];

/// The global binding table of one resolution attempt.
///
/// Payloads may write to it freely; nothing here guards against that. Every
/// attempt gets its own, so one payload run never sees another's globals.
#[derive(Clone)]
pub struct GlobalScope {
    realm: Arc<Realm>,
}

impl Default for GlobalScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GlobalScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalScope").finish_non_exhaustive()
    }
}

impl GlobalScope {
    /// A fresh realm seeded with the builtins plus the host `document` and `React`.
    pub fn new() -> Self {
        let realm = Realm::new();
        let document = document_host(&realm);
        let react = react_host(&realm);
        realm.global.insert("document", Value::Object(document));
        realm.global.insert("React", Value::Object(react));
        Self { realm }
    }

    pub fn realm(&self) -> &Arc<Realm> {
        &self.realm
    }

    /// An own data binding of the global object.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.realm
            .global
            .get_own_property(&PropertyKey::from(name))
            .and_then(|prop| prop.value().cloned())
    }

    pub fn snapshot(&self) -> BindingSnapshot {
        let names = self
            .realm
            .global
            .own_keys()
            .into_iter()
            .filter_map(|key| key.as_str().map(str::to_string))
            .collect();
        BindingSnapshot { names }
    }
}

/// Injected parameters for one attempt plus that attempt's global table.
#[derive(Clone)]
pub struct ExecutionScope {
    global: GlobalScope,
    injected: Vec<(String, Value)>,
}

impl ExecutionScope {
    /// Injects `window`, `document` and `React` from `global`.
    pub fn new(global: GlobalScope) -> Self {
        let injected = DEFAULT_INJECTED_NAMES
            .iter()
            .map(|name| {
                let value = match *name {
                    "window" => Value::Object(global.realm().global.clone()),
                    other => global.get(other).unwrap_or_default(),
                };
                (name.to_string(), value)
            })
            .collect();
        Self { global, injected }
    }

    /// A scope over a freshly built global table.
    pub fn fresh() -> Self {
        Self::new(GlobalScope::new())
    }

    pub fn params(&self) -> &[(String, Value)] {
        &self.injected
    }

    pub fn global(&self) -> &GlobalScope {
        &self.global
    }
}

/// Ordered global binding names at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingSnapshot {
    names: Vec<String>,
}

impl BindingSnapshot {
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Names present here but not in `before`, in this snapshot's order.
    pub fn new_keys(&self, before: &BindingSnapshot) -> Vec<String> {
        let seen: HashSet<&str> = before.names.iter().map(String::as_str).collect();
        self.names
            .iter()
            .filter(|name| !seen.contains(name.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_scope_is_seeded_with_host_bindings() {
        let global = GlobalScope::new();
        for name in ["console", "Object", "Error", "Promise", "document", "React", "window"] {
            assert!(global.snapshot().contains(name), "{name} missing");
        }
    }

    #[test]
    fn default_injection_order_and_window_identity() {
        let global = GlobalScope::new();
        let scope = ExecutionScope::new(global.clone());
        let names: Vec<&str> = scope.params().iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, DEFAULT_INJECTED_NAMES.to_vec());
        let Value::Object(window) = &scope.params()[0].1 else {
            panic!("window should be an object");
        };
        assert!(window.ptr_eq(&global.realm().global));
        let Value::Object(react) = &scope.params()[2].1 else {
            panic!("React should be an object");
        };
        assert!(react.get("createElement").is_some_and(|f| f.is_callable()));
    }

    #[test]
    fn fresh_scopes_do_not_share_bindings() {
        let first = ExecutionScope::fresh();
        let second = ExecutionScope::fresh();
        first.global().realm().global.insert("Widget", Value::Null);
        assert!(first.global().get("Widget").is_some());
        assert!(second.global().get("Widget").is_none());
    }

    #[test]
    fn new_keys_preserve_insertion_order() {
        let global = GlobalScope::new();
        let before = global.snapshot();
        let table = &global.realm().global;
        table.insert("Zeta", Value::Null);
        table.insert("Alpha", Value::Null);
        table.insert("console", Value::Null);
        assert_eq!(global.snapshot().new_keys(&before), vec!["Zeta", "Alpha"]);
    }
}
