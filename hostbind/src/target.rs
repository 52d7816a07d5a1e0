//! Dispatch receivers
//!
//! A `HostTarget` is what a member is looked up on: either a type-level
//! handle (static members) or an instance slot with a declared type. The
//! instance slot may be empty, and the live instance's runtime type may differ
//! from the declared one (for example when script code holds an interface view).

use bitflags::bitflags;

use crate::signature::CallTargetDescriptor;
use crate::types::HostType;
use crate::value::Value;

bitflags! {
    /// Per-target access switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HostTargetFlags: u8 {
        /// Static members may be bound through this target.
        const ALLOW_STATIC_MEMBERS = 1 << 0;
        /// Failed lookups may fall back to registered extension members.
        const ALLOW_EXTENSION_METHODS = 1 << 1;
    }
}

#[derive(Debug, Clone)]
enum TargetKind {
    Type(HostType),
    Instance { declared: HostType, value: Value },
}

/// Receiver of a dispatch attempt.
#[derive(Debug, Clone)]
pub struct HostTarget {
    kind: TargetKind,
    flags: HostTargetFlags,
}

impl HostTarget {
    /// Type-level handle; static members are allowed.
    pub fn for_type(ty: &HostType) -> Self {
        HostTarget {
            kind: TargetKind::Type(ty.clone()),
            flags: HostTargetFlags::ALLOW_STATIC_MEMBERS,
        }
    }

    /// Instance declared as its own runtime type.
    pub fn for_instance(value: Value) -> Self {
        let declared = value.host_type();
        Self::for_declared(&declared, value)
    }

    /// Instance viewed through `declared` (an interface or base type).
    /// `Value::Null` yields an empty instance slot.
    pub fn for_declared(declared: &HostType, value: Value) -> Self {
        HostTarget {
            kind: TargetKind::Instance {
                declared: declared.clone(),
                value,
            },
            flags: HostTargetFlags::ALLOW_EXTENSION_METHODS,
        }
    }

    pub fn with_flags(mut self, flags: HostTargetFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn flags(&self) -> HostTargetFlags {
        self.flags
    }

    pub fn is_type_level(&self) -> bool {
        matches!(self.kind, TargetKind::Type(_))
    }

    /// The handle's type for type-level targets, the declared type otherwise.
    pub fn declared_type(&self) -> &HostType {
        match &self.kind {
            TargetKind::Type(ty) => ty,
            TargetKind::Instance { declared, .. } => declared,
        }
    }

    /// Live instance, if any.
    pub fn instance(&self) -> Option<&Value> {
        match &self.kind {
            TargetKind::Instance { value, .. } if !value.is_null() => Some(value),
            _ => None,
        }
    }

    pub fn runtime_type(&self) -> Option<HostType> {
        self.instance().map(Value::host_type)
    }

    /// Structural classification used in bind signatures. Never runs user code.
    pub fn descriptor(&self) -> CallTargetDescriptor {
        match &self.kind {
            TargetKind::Type(ty) => CallTargetDescriptor::Static(ty.clone()),
            TargetKind::Instance { declared, value } if value.is_null() => {
                CallTargetDescriptor::NullInstance(declared.clone())
            }
            TargetKind::Instance { declared, value } => {
                let runtime = value.host_type();
                CallTargetDescriptor::BoundInstance {
                    declared: declared.clone(),
                    runtime: if runtime == *declared {
                        None
                    } else {
                        Some(runtime)
                    },
                }
            }
        }
    }
}
