use super::{Control, Interpreter};
use crate::script::object::{ObjectKind, ObjectRef};
use crate::script::value::{JsStr, PropertyKey, Value, number_to_string, to_integer};

/// Preferred type for [`Interpreter::to_primitive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    Default,
    Number,
    String,
}

impl Hint {
    fn name(self) -> &'static str {
        match self {
            Hint::Default => "default",
            Hint::Number => "number",
            Hint::String => "string",
        }
    }
}

impl Interpreter {
    pub fn to_primitive(&mut self, value: &Value, hint: Hint) -> Result<Value, Control> {
        let Value::Object(obj) = value else {
            return Ok(value.clone());
        };
        let key = PropertyKey::Symbol(self.realm.symbols.to_primitive.clone());
        let exotic = self.get_value(value, &key)?;
        if !exotic.is_nullish() {
            let result = self.call_function(&exotic, value, &[Value::string(hint.name())])?;
            if matches!(result, Value::Object(_)) {
                return Err(self.type_error("Cannot convert object to primitive value"));
            }
            return Ok(result);
        }
        let is_date = matches!(obj.read().kind, ObjectKind::Date(_));
        let order = match hint {
            Hint::String => ["toString", "valueOf"],
            Hint::Default if is_date => ["toString", "valueOf"],
            _ => ["valueOf", "toString"],
        };
        for name in order {
            let method = self.get_value(value, &name.into())?;
            if method.is_callable() {
                let result = self.call_function(&method, value, &[])?;
                if !matches!(result, Value::Object(_)) {
                    return Ok(result);
                }
            }
        }
        Err(self.type_error("Cannot convert object to primitive value"))
    }

    pub fn to_string(&mut self, value: &Value) -> Result<JsStr, Control> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Symbol(_) => Err(self.type_error("Cannot convert a Symbol value to a string")),
            Value::Object(_) => {
                let primitive = self.to_primitive(value, Hint::String)?;
                self.to_string(&primitive)
            }
            other => Ok(other.primitive_to_string().unwrap_or_else(|| "".into())),
        }
    }

    pub fn to_number(&mut self, value: &Value) -> Result<f64, Control> {
        match value {
            Value::Number(n) => Ok(*n),
            Value::Symbol(_) => Err(self.type_error("Cannot convert a Symbol value to a number")),
            Value::Object(_) => {
                let primitive = self.to_primitive(value, Hint::Number)?;
                self.to_number(&primitive)
            }
            other => Ok(other.to_number_primitive()),
        }
    }

    /// ToIntegerOrInfinity.
    pub fn to_integer(&mut self, value: &Value) -> Result<f64, Control> {
        Ok(to_integer(self.to_number(value)?))
    }

    pub fn to_property_key(&mut self, value: &Value) -> Result<PropertyKey, Control> {
        match value {
            Value::String(s) => Ok(PropertyKey::String(s.clone())),
            Value::Symbol(sym) => Ok(PropertyKey::Symbol(sym.clone())),
            Value::Number(n) => Ok(PropertyKey::from(number_to_string(*n))),
            Value::Object(_) => {
                let primitive = self.to_primitive(value, Hint::String)?;
                self.to_property_key(&primitive)
            }
            other => Ok(PropertyKey::String(
                other.primitive_to_string().unwrap_or_else(|| "".into()),
            )),
        }
    }

    pub fn to_object(&mut self, value: &Value) -> Result<ObjectRef, Control> {
        match value {
            Value::Object(obj) => Ok(obj.clone()),
            Value::Undefined | Value::Null => {
                Err(self.type_error("Cannot convert undefined or null to object"))
            }
            primitive => Ok(ObjectRef::new(
                ObjectKind::Boxed(primitive.clone()),
                self.primitive_prototype(primitive),
            )),
        }
    }

    /// The text an uncaught exception is reported with. Error objects render
    /// as `Name: message` without running getters.
    pub fn describe_thrown(&mut self, value: &Value) -> String {
        if let Value::Object(obj) = value
            && self.is_error_object(obj)
        {
            let name = obj
                .get("name")
                .and_then(|v| v.primitive_to_string())
                .unwrap_or_else(|| "Error".into());
            let message = obj
                .get("message")
                .and_then(|v| v.primitive_to_string())
                .unwrap_or_else(|| "".into());
            return match (name.is_empty(), message.is_empty()) {
                (_, true) => name.to_string(),
                (true, false) => message.to_string(),
                (false, false) => format!("{name}: {message}"),
            };
        }
        match value {
            Value::Symbol(sym) => sym.descriptive_string(),
            other => match self.to_string(other) {
                Ok(s) => s.to_string(),
                Err(_) => format!("[object {}]", other.as_object().map_or("Object", |o| o.class_name())),
            },
        }
    }

    pub fn is_error_object(&self, obj: &ObjectRef) -> bool {
        let base = self.realm.intrinsics.error_prototype(crate::script::realm::ErrorKind::Error);
        matches!(obj.read().kind, ObjectKind::Error) || obj.inherits_from(base)
    }

    /// Short rendering of a value for error messages.
    pub fn short_description(&self, value: &Value) -> String {
        match value {
            Value::String(s) => format!("\"{s}\""),
            Value::Symbol(sym) => sym.descriptive_string(),
            Value::Object(obj) if obj.is_callable() => "function".to_string(),
            Value::Object(obj) if obj.is_array() => "object Array".to_string(),
            Value::Object(_) => "#<Object>".to_string(),
            other => other.primitive_to_string().map_or_else(String::new, |s| s.to_string()),
        }
    }
}
