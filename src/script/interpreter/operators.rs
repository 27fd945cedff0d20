use super::convert::Hint;
use super::{Control, Interpreter};
use crate::script::ast::BinaryOp;
use crate::script::object::{Callable, ObjectRef};
use crate::script::value::{PropertyKey, Value, string_to_number, to_int32, to_uint32};
use std::mem::discriminant;

impl Interpreter {
    pub(super) fn binary(&mut self, op: BinaryOp, left: Value, right: Value) -> Result<Value, Control> {
        use BinaryOp::*;
        let value = match op {
            Add => return self.add(left, right),
            Sub | Mul | Div | Rem | Exp => {
                let a = self.to_number(&left)?;
                let b = self.to_number(&right)?;
                Value::Number(arithmetic(op, a, b))
            }
            Lt => Value::Bool(self.compare(&left, &right, true)? == Some(true)),
            Gt => Value::Bool(self.compare(&right, &left, false)? == Some(true)),
            LtEq => Value::Bool(self.compare(&right, &left, false)? == Some(false)),
            GtEq => Value::Bool(self.compare(&left, &right, true)? == Some(false)),
            Eq => Value::Bool(self.loose_equals(&left, &right)?),
            NotEq => Value::Bool(!self.loose_equals(&left, &right)?),
            StrictEq => Value::Bool(left.strict_equals(&right)),
            StrictNotEq => Value::Bool(!left.strict_equals(&right)),
            BitAnd | BitOr | BitXor | Shl | Shr => {
                let a = to_int32(self.to_number(&left)?);
                let b = to_int32(self.to_number(&right)?);
                let shift = (b as u32) & 31;
                Value::Number(f64::from(match op {
                    BitAnd => a & b,
                    BitOr => a | b,
                    BitXor => a ^ b,
                    Shl => a.wrapping_shl(shift),
                    _ => a >> shift,
                }))
            }
            UShr => {
                let a = to_uint32(self.to_number(&left)?);
                let b = to_uint32(self.to_number(&right)?);
                Value::Number(f64::from(a >> (b & 31)))
            }
            In => {
                let Value::Object(target) = &right else {
                    let key = self.to_string(&left).unwrap_or_else(|_| "".into());
                    return Err(self.type_error(format!(
                        "Cannot use 'in' operator to search for '{key}' in {}",
                        self.short_description(&right)
                    )));
                };
                let key = self.to_property_key(&left)?;
                Value::Bool(self.has_property(target, &key))
            }
            Instanceof => Value::Bool(self.instance_of(&left, &right)?),
        };
        Ok(value)
    }

    fn add(&mut self, left: Value, right: Value) -> Result<Value, Control> {
        match (&left, &right) {
            (Value::Number(a), Value::Number(b)) => return Ok(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => return Ok(Value::string(format!("{a}{b}"))),
            _ => {}
        }
        let left = self.to_primitive(&left, Hint::Default)?;
        let right = self.to_primitive(&right, Hint::Default)?;
        if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
            let a = self.to_string(&left)?;
            let b = self.to_string(&right)?;
            return Ok(Value::string(format!("{a}{b}")));
        }
        Ok(Value::Number(self.to_number(&left)? + self.to_number(&right)?))
    }

    /// Abstract relational comparison `x < y`; `None` when either side is NaN.
    fn compare(&mut self, x: &Value, y: &Value, left_first: bool) -> Result<Option<bool>, Control> {
        let (px, py) = if left_first {
            let px = self.to_primitive(x, Hint::Number)?;
            (px, self.to_primitive(y, Hint::Number)?)
        } else {
            let py = self.to_primitive(y, Hint::Number)?;
            (self.to_primitive(x, Hint::Number)?, py)
        };
        if let (Value::String(a), Value::String(b)) = (&px, &py) {
            return Ok(Some(a.encode_utf16().lt(b.encode_utf16())));
        }
        let a = self.to_number(&px)?;
        let b = self.to_number(&py)?;
        if a.is_nan() || b.is_nan() {
            return Ok(None);
        }
        Ok(Some(a < b))
    }

    /// `==`.
    pub fn loose_equals(&mut self, a: &Value, b: &Value) -> Result<bool, Control> {
        if discriminant(a) == discriminant(b) {
            return Ok(a.strict_equals(b));
        }
        Ok(match (a, b) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
                *n == string_to_number(s)
            }
            (Value::Bool(flag), other) | (other, Value::Bool(flag)) => {
                let n = Value::Number(f64::from(u8::from(*flag)));
                return self.loose_equals(&n, other);
            }
            (Value::Object(_), Value::Number(_) | Value::String(_) | Value::Symbol(_)) => {
                let primitive = self.to_primitive(a, Hint::Default)?;
                return self.loose_equals(&primitive, b);
            }
            (Value::Number(_) | Value::String(_) | Value::Symbol(_), Value::Object(_)) => {
                let primitive = self.to_primitive(b, Hint::Default)?;
                return self.loose_equals(a, &primitive);
            }
            _ => false,
        })
    }

    /// `value instanceof target`, honouring `Symbol.hasInstance`.
    pub fn instance_of(&mut self, value: &Value, target: &Value) -> Result<bool, Control> {
        let Value::Object(target_obj) = target else {
            return Err(self.type_error("Right-hand side of 'instanceof' is not an object"));
        };
        let key = PropertyKey::Symbol(self.realm.symbols.has_instance.clone());
        let handler = self.get_value(target, &key)?;
        if !handler.is_nullish() {
            return Ok(self.call_function(&handler, target, &[value.clone()])?.is_truthy());
        }
        if !target_obj.is_callable() {
            return Err(self.type_error("Right-hand side of 'instanceof' is not callable"));
        }
        self.ordinary_has_instance(target_obj, value)
    }

    pub fn ordinary_has_instance(&mut self, target: &ObjectRef, value: &Value) -> Result<bool, Control> {
        if let Some(Callable::Bound(bound)) = target.callable() {
            return self.instance_of(value, &Value::Object(bound.target));
        }
        let Value::Object(obj) = value else {
            return Ok(false);
        };
        match self.get_from(target, &"prototype".into(), &Value::Object(target.clone()))? {
            Value::Object(proto) => Ok(obj.inherits_from(&proto)),
            other => Err(self.type_error(format!(
                "Function has non-object prototype '{}' in instanceof check",
                self.short_description(&other)
            ))),
        }
    }
}

fn arithmetic(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => {
            if b.is_nan() || (a.abs() == 1.0 && b.is_infinite()) {
                f64::NAN
            } else {
                a.powf(b)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponent_edge_cases_match_javascript() {
        assert!(arithmetic(BinaryOp::Exp, 1.0, f64::NAN).is_nan());
        assert!(arithmetic(BinaryOp::Exp, -1.0, f64::INFINITY).is_nan());
        assert_eq!(arithmetic(BinaryOp::Exp, 2.0, 10.0), 1024.0);
        assert_eq!(arithmetic(BinaryOp::Rem, -7.0, 2.0), -1.0);
    }
}
