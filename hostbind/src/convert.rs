//! Value conversion to host types
//!
//! Used where a dynamic value must become an instance of a statically known
//! type, chiefly a synthesized delegate's return value.

use crate::error::HostError;
use crate::types::{HostType, TypeKind};
use crate::value::Value;

/// Convert a Value to i64
pub fn to_i64(value: &Value) -> Result<i64, HostError> {
    match value {
        Value::I64(v) => Ok(*v),
        Value::I32(v) => Ok(i64::from(*v)),
        Value::F64(v) => {
            if v.fract() != 0.0 || !v.is_finite() {
                Err(HostError::inexact_error(format!("cannot convert {} to Int64", v)))
            } else if *v < i64::MIN as f64 || *v >= i64::MAX as f64 {
                Err(HostError::overflow_error(format!("{} is out of range for Int64", v)))
            } else {
                Ok(*v as i64)
            }
        }
        Value::Bool(v) => Ok(i64::from(*v)),
        Value::Char(c) => Ok(i64::from(u32::from(*c))),
        Value::Enum(e) => Ok(e.discriminant),
        _ => Err(HostError::type_error(format!(
            "cannot convert {} to Int64",
            value.host_type()
        ))),
    }
}

/// Convert a Value to i32
pub fn to_i32(value: &Value) -> Result<i32, HostError> {
    match value {
        Value::I32(v) => Ok(*v),
        Value::Str(_) | Value::Null => Err(HostError::type_error(format!(
            "cannot convert {} to Int32",
            value.host_type()
        ))),
        other => {
            let wide = to_i64(other).map_err(|e| match e {
                HostError::TypeError(_) => HostError::type_error(format!(
                    "cannot convert {} to Int32",
                    other.host_type()
                )),
                e => e,
            })?;
            i32::try_from(wide).map_err(|_| {
                HostError::overflow_error(format!("{} is out of range for Int32", wide))
            })
        }
    }
}

/// Convert a Value to f64
pub fn to_f64(value: &Value) -> Result<f64, HostError> {
    match value {
        Value::F64(v) => Ok(*v),
        Value::I32(v) => Ok(f64::from(*v)),
        Value::I64(v) => Ok(*v as f64),
        Value::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
        _ => Err(HostError::type_error(format!(
            "cannot convert {} to Double",
            value.host_type()
        ))),
    }
}

/// Convert `value` to an instance of `target`.
///
/// `Void` discards the value. `Null` converts to every reference type and is
/// rejected for value types.
pub fn convert_to(value: &Value, target: &HostType) -> Result<Value, HostError> {
    if *target == HostType::void() {
        return Ok(Value::Null);
    }
    if *target == HostType::object() {
        return Ok(value.clone());
    }
    if value.is_null() {
        return if target.is_value_type() {
            Err(HostError::type_error(format!(
                "cannot convert null to value type {}",
                target
            )))
        } else {
            Ok(Value::Null)
        };
    }

    if *target == HostType::int32() {
        return to_i32(value).map(Value::I32);
    }
    if *target == HostType::int64() {
        return to_i64(value).map(Value::I64);
    }
    if *target == HostType::double() {
        return to_f64(value).map(Value::F64);
    }
    if *target == HostType::boolean() {
        return match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            _ => Err(mismatch(value, target)),
        };
    }
    if *target == HostType::char() {
        return match value {
            Value::Char(c) => Ok(Value::Char(*c)),
            Value::I32(_) | Value::I64(_) => {
                let code = to_i64(value)?;
                u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .map(Value::Char)
                    .ok_or_else(|| {
                        HostError::overflow_error(format!("{} is not a valid Char", code))
                    })
            }
            _ => Err(mismatch(value, target)),
        };
    }
    if *target == HostType::string() {
        return match value {
            Value::Str(s) => Ok(Value::Str(s.clone())),
            _ => Err(mismatch(value, target)),
        };
    }

    match (target.kind(), value) {
        (TypeKind::Enum, Value::Enum(e)) if e.ty == *target => Ok(value.clone()),
        (TypeKind::Enum, Value::I32(_) | Value::I64(_)) => {
            Ok(Value::enumeration(target, to_i64(value)?))
        }
        _ if target.is_assignable_from(&value.host_type()) => Ok(value.clone()),
        _ => Err(mismatch(value, target)),
    }
}

fn mismatch(value: &Value, target: &HostType) -> HostError {
    HostError::type_error(format!(
        "cannot convert {} to {}",
        value.host_type(),
        target
    ))
}
