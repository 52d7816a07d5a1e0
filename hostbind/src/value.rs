//! Dynamic values crossing the script/host boundary
//!
//! `Value` is what script code hands to the dispatcher and what host members
//! return. Scalars live inline; enums and structs are shared immutable boxes
//! so the canonicalization table can hand out one instance per distinct value.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::byref::ByRefArg;
use crate::delegate::{HostDelegate, ScriptFunction};
use crate::target::HostTarget;
use crate::types::{HostType, TypeKind};

/// Dynamic value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Script null / undefined
    Null,

    // ========== Inline value types ==========
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    Char(char),
    Duration(Duration),
    Time(SystemTime),

    // ========== Shared immutable boxes ==========
    Str(Arc<str>),
    Enum(Arc<EnumValue>),
    Struct(Arc<StructValue>),

    // ========== Host-side handles ==========
    /// Reference-type host instance
    Object(HostObject),
    /// Imported-type handle
    Type(HostType),
    /// Bound-method handle (`obj.Method` without a call)
    Method(BoundMethod),
    /// By-reference slot created for an out/ref parameter
    ByRef(ByRefArg),
    /// Statically typed adapter over a dynamic callee
    Delegate(HostDelegate),
    /// Dynamic (script-side) callable
    Function(ScriptFunction),
}

/// Enumeration value: a type tag plus its underlying integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub ty: HostType,
    pub discriminant: i64,
}

/// Value-type instance with positional fields.
#[derive(Debug, Clone)]
pub struct StructValue {
    pub ty: HostType,
    pub fields: Vec<Value>,
}

impl PartialEq for StructValue {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.bitwise_eq(b))
    }
}

// Floats compare by bit pattern, so equality is reflexive.
impl Eq for StructValue {}

impl Hash for StructValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty.hash(state);
        for field in &self.fields {
            field.bitwise_hash(state);
        }
    }
}

/// Reference-type host instance. Equality is identity.
#[derive(Clone)]
pub struct HostObject {
    ty: HostType,
    payload: Arc<dyn Any + Send + Sync>,
}

impl HostObject {
    pub fn new<T: Any + Send + Sync>(ty: &HostType, payload: T) -> Self {
        HostObject {
            ty: ty.clone(),
            payload: Arc::new(payload),
        }
    }

    /// Runtime type of the instance
    pub fn host_type(&self) -> &HostType {
        &self.ty
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject({})", self.ty)
    }
}

/// A member name bound to its receiver, invocable later.
#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub target: Arc<HostTarget>,
    pub name: Arc<str>,
}

impl BoundMethod {
    pub fn new(target: HostTarget, name: &str) -> Self {
        BoundMethod {
            target: Arc::new(target),
            name: Arc::from(name),
        }
    }
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    pub fn enumeration(ty: &HostType, discriminant: i64) -> Self {
        Value::Enum(Arc::new(EnumValue {
            ty: ty.clone(),
            discriminant,
        }))
    }

    pub fn structure(ty: &HostType, fields: Vec<Value>) -> Self {
        Value::Struct(Arc::new(StructValue {
            ty: ty.clone(),
            fields,
        }))
    }

    /// Default (all-zero) instance of `ty`; `Null` for reference types.
    pub fn default_for(ty: &HostType) -> Value {
        if *ty == HostType::int32() {
            Value::I32(0)
        } else if *ty == HostType::int64() {
            Value::I64(0)
        } else if *ty == HostType::double() {
            Value::F64(0.0)
        } else if *ty == HostType::boolean() {
            Value::Bool(false)
        } else if *ty == HostType::char() {
            Value::Char('\0')
        } else if *ty == HostType::time_span() {
            Value::Duration(Duration::ZERO)
        } else if *ty == HostType::date_time() {
            Value::Time(SystemTime::UNIX_EPOCH)
        } else {
            match ty.kind() {
                TypeKind::Enum => Value::enumeration(ty, 0),
                TypeKind::Struct => Value::structure(ty, Vec::new()),
                _ => Value::Null,
            }
        }
    }

    /// Apparent host type of this value. `Null` reports `Object`.
    pub fn host_type(&self) -> HostType {
        match self {
            Value::Null => HostType::object(),
            Value::Bool(_) => HostType::boolean(),
            Value::I32(_) => HostType::int32(),
            Value::I64(_) => HostType::int64(),
            Value::F64(_) => HostType::double(),
            Value::Char(_) => HostType::char(),
            Value::Duration(_) => HostType::time_span(),
            Value::Time(_) => HostType::date_time(),
            Value::Str(_) => HostType::string(),
            Value::Enum(e) => e.ty.clone(),
            Value::Struct(s) => s.ty.clone(),
            Value::Object(o) => o.host_type().clone(),
            Value::Type(_) => HostType::type_handle(),
            Value::Method(_) | Value::Function(_) => HostType::object(),
            Value::ByRef(r) => r.element_type().clone(),
            Value::Delegate(d) => d.delegate_type().clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Value-type instance (copied by value on the host side)
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            Value::Bool(_)
                | Value::I32(_)
                | Value::I64(_)
                | Value::F64(_)
                | Value::Char(_)
                | Value::Duration(_)
                | Value::Time(_)
                | Value::Enum(_)
                | Value::Struct(_)
        )
    }

    /// Value-type instance whose bit pattern is all zero.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Bool(b) => !*b,
            Value::I32(v) => *v == 0,
            Value::I64(v) => *v == 0,
            Value::F64(v) => v.to_bits() == 0,
            Value::Char(c) => *c == '\0',
            Value::Duration(d) => d.is_zero(),
            Value::Time(t) => *t == SystemTime::UNIX_EPOCH,
            Value::Enum(e) => e.discriminant == 0,
            Value::Struct(s) => s.fields.iter().all(|f| f.is_zero() || f.is_null()),
            _ => false,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            Value::I32(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            Value::I32(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&HostType> {
        match self {
            Value::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_by_ref(&self) -> Option<&ByRefArg> {
        match self {
            Value::ByRef(r) => Some(r),
            _ => None,
        }
    }

    /// Equality where floats compare by bit pattern.
    fn bitwise_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }

    /// Hash consistent with `bitwise_eq` for value-type contents.
    fn bitwise_hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Bool(v) => v.hash(state),
            Value::I32(v) => v.hash(state),
            Value::I64(v) => v.hash(state),
            Value::F64(v) => v.to_bits().hash(state),
            Value::Char(v) => v.hash(state),
            Value::Duration(v) => v.hash(state),
            Value::Time(v) => v.hash(state),
            Value::Str(v) => v.hash(state),
            Value::Enum(v) => v.hash(state),
            Value::Struct(v) => v.hash(state),
            Value::Type(v) => v.hash(state),
            _ => {}
        }
    }
}

// ========== From implementations ==========

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Char(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Arc::from(v))
    }
}

impl From<HostObject> for Value {
    fn from(v: HostObject) -> Self {
        Value::Object(v)
    }
}

impl From<ByRefArg> for Value {
    fn from(v: ByRefArg) -> Self {
        Value::ByRef(v)
    }
}

// ========== Display implementation ==========

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}L", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Char(v) => write!(f, "'{}'", v),
            Value::Duration(v) => write!(f, "{:?}", v),
            Value::Time(v) => write!(f, "{:?}", v),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Enum(e) => write!(f, "{}({})", e.ty, e.discriminant),
            Value::Struct(s) => {
                write!(f, "{}(", s.ty)?;
                for (i, field) in s.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, ")")
            }
            Value::Object(o) => write!(f, "[object {}]", o.host_type()),
            Value::Type(t) => write!(f, "[type {}]", t),
            Value::Method(m) => write!(f, "[method {}]", m.name),
            Value::ByRef(r) => write!(f, "[{:?} {}]", r.kind(), r.element_type()),
            Value::Delegate(d) => write!(f, "[delegate {}]", d.delegate_type()),
            Value::Function(_) => write!(f, "[function]"),
        }
    }
}

// ========== PartialEq implementation ==========

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            // Handles compare by identity
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::ByRef(a), Value::ByRef(b)) => a.ptr_eq(b),
            (Value::Delegate(a), Value::Delegate(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Method(a), Value::Method(b)) => {
                a.name == b.name && Arc::ptr_eq(&a.target, &b.target)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_detection() {
        let color = HostType::builder("Color", TypeKind::Enum).build();
        let point = HostType::builder("Point", TypeKind::Struct).build();

        assert!(Value::I32(0).is_zero());
        assert!(Value::F64(0.0).is_zero());
        assert!(!Value::F64(-0.0).is_zero());
        assert!(Value::Bool(false).is_zero());
        assert!(Value::enumeration(&color, 0).is_zero());
        assert!(Value::structure(&point, vec![Value::I32(0), Value::F64(0.0)]).is_zero());
        assert!(!Value::structure(&point, vec![Value::I32(1), Value::F64(0.0)]).is_zero());
        assert!(!Value::str("").is_zero());
        assert!(!Value::Null.is_zero());
    }

    #[test]
    fn test_default_for_builtin_types() {
        assert_eq!(Value::default_for(&HostType::int32()), Value::I32(0));
        assert_eq!(Value::default_for(&HostType::boolean()), Value::Bool(false));
        assert_eq!(Value::default_for(&HostType::string()), Value::Null);
        let color = HostType::builder("Color", TypeKind::Enum).build();
        assert_eq!(Value::default_for(&color), Value::enumeration(&color, 0));
    }

    #[test]
    fn test_host_type_of_handles() {
        let widget = HostType::builder("Widget", TypeKind::Class).build();
        assert_eq!(Value::Type(widget.clone()).host_type(), HostType::type_handle());
        let obj = Value::Object(HostObject::new(&widget, 5u8));
        assert_eq!(obj.host_type(), widget);
        assert_eq!(Value::Null.host_type(), HostType::object());
    }

    #[test]
    fn test_objects_compare_by_identity() {
        let widget = HostType::builder("Widget", TypeKind::Class).build();
        let a = HostObject::new(&widget, 1u32);
        let b = HostObject::new(&widget, 1u32);
        assert_eq!(Value::Object(a.clone()), Value::Object(a.clone()));
        assert_ne!(Value::Object(a.clone()), Value::Object(b));
        assert_eq!(a.downcast_ref::<u32>(), Some(&1));
    }

    #[test]
    fn test_struct_equality_uses_bit_patterns() {
        let point = HostType::builder("Point", TypeKind::Struct).build();
        let nan_a = StructValue {
            ty: point.clone(),
            fields: vec![Value::F64(f64::NAN)],
        };
        let nan_b = nan_a.clone();
        assert_eq!(nan_a, nan_b);
    }
}
