//! Lexical scope chain. Function scopes carry a [`Frame`] with the `this`
//! binding; arrow functions and blocks inherit the nearest one.

use super::object::ObjectRef;
use super::value::{JsStr, Value};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Clone)]
struct Binding {
    value: Value,
    mutable: bool,
    initialized: bool,
}

/// Per-call state shared by every block inside one function activation.
pub struct Frame {
    /// `None` until `super()` runs in a derived constructor.
    this: RwLock<Option<Value>>,
    pub new_target: Option<ObjectRef>,
    pub home_object: Option<ObjectRef>,
    pub function: Option<ObjectRef>,
}

impl Frame {
    pub fn new(this: Option<Value>) -> Self {
        Self {
            this: RwLock::new(this),
            new_target: None,
            home_object: None,
            function: None,
        }
    }

    pub fn this(&self) -> Option<Value> {
        self.this.read().clone()
    }

    pub fn bind_this(&self, value: Value) -> bool {
        let mut slot = self.this.write();
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        true
    }
}

struct Scope {
    bindings: RwLock<FxHashMap<JsStr, Binding>>,
    parent: Option<Env>,
    frame: Option<Arc<Frame>>,
    /// Function (or payload) body: the target of `var` declarations.
    var_scope: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    /// `let`/`const` read before its declaration ran.
    Uninitialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned,
    Constant,
    Uninitialized,
    Unbound,
}

#[derive(Clone)]
pub struct Env(Arc<Scope>);

impl Env {
    /// The outermost scope of a payload body.
    pub fn root(frame: Frame) -> Self {
        Self(Arc::new(Scope {
            bindings: RwLock::default(),
            parent: None,
            frame: Some(Arc::new(frame)),
            var_scope: true,
        }))
    }

    pub fn child(&self) -> Self {
        Self(Arc::new(Scope {
            bindings: RwLock::default(),
            parent: Some(self.clone()),
            frame: None,
            var_scope: false,
        }))
    }

    /// A function activation scope; `frame` is `None` for arrow functions.
    pub fn function(&self, frame: Option<Frame>) -> Self {
        Self(Arc::new(Scope {
            bindings: RwLock::default(),
            parent: Some(self.clone()),
            frame: frame.map(Arc::new),
            var_scope: true,
        }))
    }

    /// The nearest non-arrow function frame.
    pub fn frame(&self) -> Option<Arc<Frame>> {
        let mut env = Some(self);
        while let Some(current) = env {
            if let Some(frame) = &current.0.frame {
                return Some(frame.clone());
            }
            env = current.0.parent.as_ref();
        }
        None
    }

    /// Declares `name` in this scope; `None` leaves it in its dead zone.
    pub fn declare(&self, name: &JsStr, value: Option<Value>, mutable: bool) {
        self.0.bindings.write().insert(
            name.clone(),
            Binding {
                initialized: value.is_some(),
                value: value.unwrap_or_default(),
                mutable,
            },
        );
    }

    /// Declares a `var` in the nearest function scope. Existing bindings keep
    /// their value unless `value` is given.
    pub fn declare_var(&self, name: &JsStr, value: Option<Value>) {
        let mut env = self;
        while !env.0.var_scope {
            match &env.0.parent {
                Some(parent) => env = parent,
                None => break,
            }
        }
        let mut bindings = env.0.bindings.write();
        match (bindings.get_mut(name), value) {
            (Some(binding), Some(value)) => {
                binding.value = value;
                binding.initialized = true;
            }
            (Some(_), None) => {}
            (None, value) => {
                bindings.insert(
                    name.clone(),
                    Binding {
                        value: value.unwrap_or_default(),
                        mutable: true,
                        initialized: true,
                    },
                );
            }
        }
    }

    /// Ends the dead zone of a `let`/`const`/`class` binding in this scope.
    pub fn initialize(&self, name: &JsStr, value: Value) {
        if let Some(binding) = self.0.bindings.write().get_mut(name) {
            binding.value = value;
            binding.initialized = true;
        }
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.0.bindings.read().contains_key(name)
    }

    /// `None` when no scope in the chain binds `name`.
    pub fn lookup(&self, name: &str) -> Option<Result<Value, LookupError>> {
        let mut env = Some(self);
        while let Some(current) = env {
            if let Some(binding) = current.0.bindings.read().get(name) {
                return Some(if binding.initialized {
                    Ok(binding.value.clone())
                } else {
                    Err(LookupError::Uninitialized)
                });
            }
            env = current.0.parent.as_ref();
        }
        None
    }

    pub fn assign(&self, name: &str, value: Value) -> AssignOutcome {
        let mut env = Some(self);
        while let Some(current) = env {
            if let Some(binding) = current.0.bindings.write().get_mut(name) {
                if !binding.initialized {
                    return AssignOutcome::Uninitialized;
                }
                if !binding.mutable {
                    return AssignOutcome::Constant;
                }
                binding.value = value;
                return AssignOutcome::Assigned;
            }
            env = current.0.parent.as_ref();
        }
        AssignOutcome::Unbound
    }

    /// Clears this scope and its ancestors, returning the values they held.
    pub fn drain(&self) -> Vec<Value> {
        let mut values = Vec::new();
        let mut env = Some(self);
        while let Some(current) = env {
            values.extend(current.0.bindings.write().drain().map(|(_, b)| b.value));
            if let Some(frame) = &current.0.frame {
                values.extend(frame.this.write().take());
            }
            env = current.0.parent.as_ref();
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> JsStr {
        s.into()
    }

    #[test]
    fn var_declarations_hoist_past_blocks() {
        let root = Env::root(Frame::new(Some(Value::Undefined)));
        let block = root.child().child();
        block.declare_var(&name("x"), Some(Value::Number(1.0)));
        assert!(root.has_own("x"));
        assert!(!block.has_own("x"));
    }

    #[test]
    fn const_and_dead_zone_are_enforced() {
        let root = Env::root(Frame::new(None));
        root.declare(&name("c"), Some(Value::Null), false);
        root.declare(&name("l"), None, true);
        assert_eq!(root.assign("c", Value::Bool(true)), AssignOutcome::Constant);
        assert_eq!(root.lookup("l").map(|r| r.is_err()), Some(true));
        assert_eq!(root.assign("l", Value::Null), AssignOutcome::Uninitialized);
        root.initialize(&name("l"), Value::Bool(true));
        assert_eq!(root.assign("l", Value::Null), AssignOutcome::Assigned);
        assert_eq!(root.assign("missing", Value::Null), AssignOutcome::Unbound);
    }

    #[test]
    fn arrow_scopes_see_the_enclosing_frame() {
        let root = Env::root(Frame::new(Some(Value::Bool(true))));
        let arrow = root.function(None);
        let this = arrow.frame().and_then(|frame| frame.this());
        assert!(matches!(this, Some(Value::Bool(true))));
    }

    #[test]
    fn this_binds_once() {
        let frame = Frame::new(None);
        assert!(frame.bind_this(Value::Null));
        assert!(!frame.bind_this(Value::Null));
    }
}
