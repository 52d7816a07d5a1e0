//! Bind signatures: structural fingerprints of a dispatch attempt
//!
//! A `BindSignature` captures everything overload resolution depends on
//! (calling context, invocation kind, receiver classification, member name,
//! generic type arguments and argument classifications) and nothing else. Two
//! calls with equal signatures are guaranteed to resolve to the same member,
//! which is what makes the signature usable as a long-lived cache key.
//!
//! Building a signature never calls user code: it only inspects the static
//! shape of the target and arguments.

use std::sync::Arc;

use bitflags::bitflags;

use crate::target::HostTarget;
use crate::types::HostType;
use crate::value::Value;

bitflags! {
    /// Kind of member access being dispatched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InvokeFlags: u8 {
        const GET_PROPERTY = 1 << 0;
        const SET_PROPERTY = 1 << 1;
        const INVOKE_METHOD = 1 << 2;
        const CREATE_INSTANCE = 1 << 3;
    }
}

/// Classification of the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallTargetDescriptor {
    /// Type-level handle; no instance.
    Static(HostType),
    /// Instance slot with the given declared type, currently empty.
    NullInstance(HostType),
    /// Live instance. `runtime` is set only when it differs from `declared`.
    BoundInstance {
        declared: HostType,
        runtime: Option<HostType>,
    },
}

impl CallTargetDescriptor {
    /// Type whose members a resolver should search.
    pub fn lookup_type(&self) -> &HostType {
        match self {
            CallTargetDescriptor::Static(ty) | CallTargetDescriptor::NullInstance(ty) => ty,
            CallTargetDescriptor::BoundInstance { declared, runtime } => {
                runtime.as_ref().unwrap_or(declared)
            }
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, CallTargetDescriptor::Static(_))
    }
}

/// Apparent type of a by-value argument.
///
/// Host-side handle kinds report the handle kind, not the wrapped value's type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ApparentType {
    Host(HostType),
    ImportedType,
    BoundMethod,
    ScriptFunction,
}

/// Classification of one call argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgumentDescriptor {
    Null,
    /// Bit-pattern-zero value-type instance of the given type
    ZeroValue(HostType),
    ByValue(ApparentType),
    OutRef(HostType),
    InOutRef(HostType),
}

impl ArgumentDescriptor {
    /// Classify an argument by shape. The value's content only matters for the
    /// zero check; by-reference slots contribute their element type.
    pub fn classify(arg: &Value) -> Self {
        match arg {
            Value::Null => ArgumentDescriptor::Null,
            Value::ByRef(r) if r.is_out() => ArgumentDescriptor::OutRef(r.element_type().clone()),
            Value::ByRef(r) => ArgumentDescriptor::InOutRef(r.element_type().clone()),
            Value::Type(_) => ArgumentDescriptor::ByValue(ApparentType::ImportedType),
            Value::Method(_) => ArgumentDescriptor::ByValue(ApparentType::BoundMethod),
            Value::Function(_) => ArgumentDescriptor::ByValue(ApparentType::ScriptFunction),
            v if v.is_value_type() && v.is_zero() => ArgumentDescriptor::ZeroValue(v.host_type()),
            v => ArgumentDescriptor::ByValue(ApparentType::Host(v.host_type())),
        }
    }

    pub fn is_by_ref(&self) -> bool {
        matches!(
            self,
            ArgumentDescriptor::OutRef(_) | ArgumentDescriptor::InOutRef(_)
        )
    }

    /// Host type carried by the descriptor, if any.
    pub fn host_type(&self) -> Option<&HostType> {
        match self {
            ArgumentDescriptor::ZeroValue(ty)
            | ArgumentDescriptor::OutRef(ty)
            | ArgumentDescriptor::InOutRef(ty)
            | ArgumentDescriptor::ByValue(ApparentType::Host(ty)) => Some(ty),
            _ => None,
        }
    }
}

/// Immutable fingerprint of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindSignature {
    context: Option<HostType>,
    flags: InvokeFlags,
    target: CallTargetDescriptor,
    name: Arc<str>,
    type_args: Vec<HostType>,
    args: Vec<ArgumentDescriptor>,
}

impl BindSignature {
    pub fn new(
        context: Option<&HostType>,
        flags: InvokeFlags,
        target: &HostTarget,
        name: &str,
        type_args: &[HostType],
        args: &[Value],
    ) -> Self {
        BindSignature {
            context: context.cloned(),
            flags,
            target: target.descriptor(),
            name: Arc::from(name),
            type_args: type_args.to_vec(),
            args: args.iter().map(ArgumentDescriptor::classify).collect(),
        }
    }

    pub fn context(&self) -> Option<&HostType> {
        self.context.as_ref()
    }

    pub fn flags(&self) -> InvokeFlags {
        self.flags
    }

    pub fn target(&self) -> &CallTargetDescriptor {
        &self.target
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_args(&self) -> &[HostType] {
        &self.type_args
    }

    pub fn args(&self) -> &[ArgumentDescriptor] {
        &self.args
    }
}
