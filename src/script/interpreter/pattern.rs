use super::{Control, Interpreter};
use crate::script::ast::Pattern;
use crate::script::env::Env;
use crate::script::value::{JsStr, PropertyKey, Value};

/// How a destructured name is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BindMode {
    /// `var` and plain assignment: write through the scope chain.
    Assign,
    Let,
    Const,
}

impl Interpreter {
    pub(super) fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: Value,
        env: &Env,
        mode: BindMode,
    ) -> Result<(), Control> {
        match pattern {
            Pattern::Ident(name) => self.bind_name(name, value, env, mode),
            Pattern::Member(target) => {
                let reference = self.reference(target, env)?;
                self.put_reference(&reference, value, env)
            }
            Pattern::Default { target, default } => {
                let value = if matches!(value, Value::Undefined) {
                    let value = self.eval(default, env)?;
                    if let Pattern::Ident(name) = &**target {
                        self.name_anonymous(default, &value, name);
                    }
                    value
                } else {
                    value
                };
                self.bind_pattern(target, value, env, mode)
            }
            Pattern::Object { props, rest } => {
                if value.is_nullish() {
                    let shown = if matches!(value, Value::Null) { "null" } else { "undefined" };
                    return Err(self.type_error(format!(
                        "Cannot destructure '{shown}' as it is {shown}."
                    )));
                }
                let mut used: Vec<PropertyKey> = Vec::with_capacity(props.len());
                for prop in props {
                    let key = self.prop_key(&prop.key, env)?;
                    let item = self.get_value(&value, &key)?;
                    used.push(key);
                    self.bind_pattern(&prop.value, item, env, mode)?;
                }
                if let Some(rest) = rest {
                    let copy = self.realm.object();
                    self.copy_data_properties(&copy, &value, &used)?;
                    self.bind_pattern(rest, Value::Object(copy), env, mode)?;
                }
                Ok(())
            }
            Pattern::Array { elements, rest } => {
                let mut record = self.get_iterator(&value)?;
                let mut bind = |interp: &mut Interpreter| -> Result<(), Control> {
                    for element in elements {
                        let item = interp.iterator_step(&mut record)?.unwrap_or_default();
                        if let Some(target) = element {
                            interp.bind_pattern(target, item, env, mode)?;
                        }
                    }
                    if let Some(rest) = rest {
                        let mut remaining = Vec::new();
                        while let Some(item) = interp.iterator_step(&mut record)? {
                            remaining.push(item);
                        }
                        let array = interp.array(remaining);
                        interp.bind_pattern(rest, array, env, mode)?;
                    }
                    Ok(())
                };
                let result = bind(self);
                let result = self.close_on_error(&record, result);
                result?;
                self.iterator_close(&record)
            }
        }
    }

    fn bind_name(&mut self, name: &JsStr, value: Value, env: &Env, mode: BindMode) -> Result<(), Control> {
        match mode {
            BindMode::Let => {
                env.declare(name, Some(value), true);
                Ok(())
            }
            BindMode::Const => {
                env.declare(name, Some(value), false);
                Ok(())
            }
            BindMode::Assign => self.assign_identifier(name, value, env),
        }
    }
}
