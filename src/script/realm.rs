//! One isolated set of builtins: the global object, the intrinsic
//! prototypes and the symbol registry. Every resolution attempt builds its own.

use super::builtins;
use super::object::{ObjectKind, ObjectRef};
use super::value::{JsStr, Symbol, Value};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    SyntaxError,
    EvalError,
    UriError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::Error,
        ErrorKind::TypeError,
        ErrorKind::RangeError,
        ErrorKind::ReferenceError,
        ErrorKind::SyntaxError,
        ErrorKind::EvalError,
        ErrorKind::UriError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::EvalError => "EvalError",
            ErrorKind::UriError => "URIError",
        }
    }
}

pub struct Intrinsics {
    pub object_prototype: ObjectRef,
    pub function_prototype: ObjectRef,
    pub array_prototype: ObjectRef,
    pub string_prototype: ObjectRef,
    pub number_prototype: ObjectRef,
    pub boolean_prototype: ObjectRef,
    pub symbol_prototype: ObjectRef,
    pub iterator_prototype: ObjectRef,
    pub map_prototype: ObjectRef,
    pub set_prototype: ObjectRef,
    pub regexp_prototype: ObjectRef,
    pub date_prototype: ObjectRef,
    pub promise_prototype: ObjectRef,
    error_prototypes: [ObjectRef; 7],
}

impl Intrinsics {
    fn new() -> Self {
        let object_prototype = ObjectRef::ordinary(None);
        let derived = || ObjectRef::ordinary(Some(object_prototype.clone()));
        let error_prototype = ObjectRef::new(ObjectKind::Ordinary, Some(object_prototype.clone()));
        let error_prototypes = ErrorKind::ALL.map(|kind| match kind {
            ErrorKind::Error => error_prototype.clone(),
            _ => ObjectRef::ordinary(Some(error_prototype.clone())),
        });
        Self {
            function_prototype: derived(),
            array_prototype: ObjectRef::new(ObjectKind::Array(Vec::new()), Some(object_prototype.clone())),
            string_prototype: derived(),
            number_prototype: derived(),
            boolean_prototype: derived(),
            symbol_prototype: derived(),
            iterator_prototype: derived(),
            map_prototype: derived(),
            set_prototype: derived(),
            regexp_prototype: derived(),
            date_prototype: derived(),
            promise_prototype: derived(),
            error_prototypes,
            object_prototype,
        }
    }

    pub fn error_prototype(&self, kind: ErrorKind) -> &ObjectRef {
        let idx = ErrorKind::ALL.iter().position(|k| *k == kind).unwrap_or(0);
        &self.error_prototypes[idx]
    }
}

pub struct WellKnownSymbols {
    pub iterator: Symbol,
    pub async_iterator: Symbol,
    pub has_instance: Symbol,
    pub to_primitive: Symbol,
    pub to_string_tag: Symbol,
}

impl WellKnownSymbols {
    fn new() -> Self {
        let make = |name: &str| Symbol::new(Some(format!("Symbol.{name}").into()));
        Self {
            iterator: make("iterator"),
            async_iterator: make("asyncIterator"),
            has_instance: make("hasInstance"),
            to_primitive: make("toPrimitive"),
            to_string_tag: make("toStringTag"),
        }
    }
}

pub struct Realm {
    pub global: ObjectRef,
    pub intrinsics: Intrinsics,
    pub symbols: WellKnownSymbols,
    registry: Mutex<FxHashMap<JsStr, Symbol>>,
}

impl Realm {
    /// Builds the intrinsics and installs every builtin on a fresh global object.
    pub fn new() -> Arc<Self> {
        let intrinsics = Intrinsics::new();
        let global = ObjectRef::ordinary(Some(intrinsics.object_prototype.clone()));
        let realm = Arc::new(Self {
            global,
            intrinsics,
            symbols: WellKnownSymbols::new(),
            registry: Mutex::default(),
        });
        builtins::install(&realm);
        realm
    }

    /// `Symbol.for(key)`: one symbol per key for the life of the realm.
    pub fn symbol_for(&self, key: &str) -> Symbol {
        self.registry
            .lock()
            .entry(key.into())
            .or_insert_with(|| Symbol::new(Some(key.into())))
            .clone()
    }

    /// `Symbol.keyFor(sym)`.
    pub fn key_for(&self, sym: &Symbol) -> Option<JsStr> {
        self.registry
            .lock()
            .iter()
            .find(|(_, registered)| *registered == sym)
            .map(|(key, _)| key.clone())
    }

    pub fn object(&self) -> ObjectRef {
        ObjectRef::ordinary(Some(self.intrinsics.object_prototype.clone()))
    }

    pub fn array(&self, items: Vec<Value>) -> ObjectRef {
        ObjectRef::new(
            ObjectKind::Array(items),
            Some(self.intrinsics.array_prototype.clone()),
        )
    }

    /// Frees the object graph reachable from the global object.
    pub fn dispose(&self) {
        self.registry.lock().clear();
        self.global.dispose_graph();
        for proto in [
            &self.intrinsics.object_prototype,
            &self.intrinsics.function_prototype,
            &self.intrinsics.array_prototype,
            &self.intrinsics.promise_prototype,
        ] {
            proto.dispose_graph();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_registry_returns_the_same_symbol_per_key() {
        let realm = Realm::new();
        let a = realm.symbol_for("react.element");
        let b = realm.symbol_for("react.element");
        assert_eq!(a, b);
        assert_ne!(a, realm.symbol_for("react.fragment"));
        assert_eq!(realm.key_for(&a).as_deref(), Some("react.element"));
        assert_eq!(realm.key_for(&Symbol::new(None)), None);
    }

    #[test]
    fn error_prototypes_chain_to_error() {
        let realm = Realm::new();
        let base = realm.intrinsics.error_prototype(ErrorKind::Error);
        let range = realm.intrinsics.error_prototype(ErrorKind::RangeError);
        assert!(range.inherits_from(base));
        assert!(base.inherits_from(&realm.intrinsics.object_prototype));
    }

    #[test]
    fn realms_do_not_share_globals() {
        let first = Realm::new();
        let second = Realm::new();
        first.global.insert("Widget", Value::Null);
        assert!(second.global.get("Widget").is_none());
    }
}
