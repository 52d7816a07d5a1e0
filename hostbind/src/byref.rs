//! By-reference argument wrappers
//!
//! A `ByRefArg` stands in for a true `out` / `ref` parameter while a call
//! crosses the dynamic/static boundary. It lives for exactly one call: the
//! creator builds it, the callee reads or writes its slot, and the value is
//! copied back to the caller's real storage afterwards.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::HostType;
use crate::value::Value;

/// Direction of a by-reference parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// Output only; the incoming value is undefined to the callee.
    Out,
    /// Input/output; the callee may read the incoming value.
    InOut,
}

/// Shared single-value slot.
pub type Slot = Arc<Mutex<Value>>;

/// Typed mutable box standing in for a by-reference parameter.
#[derive(Clone)]
pub struct ByRefArg {
    kind: RefKind,
    element_type: HostType,
    slot: Slot,
}

impl ByRefArg {
    /// Output slot initialized to the element type's default value.
    pub fn out(element_type: &HostType) -> Self {
        ByRefArg {
            kind: RefKind::Out,
            element_type: element_type.clone(),
            slot: Arc::new(Mutex::new(Value::default_for(element_type))),
        }
    }

    /// In/out slot holding `value`.
    pub fn reference(element_type: &HostType, value: Value) -> Self {
        ByRefArg {
            kind: RefKind::InOut,
            element_type: element_type.clone(),
            slot: Arc::new(Mutex::new(value)),
        }
    }

    /// Wrap an existing slot, sharing it with whoever else holds it.
    pub fn shared(kind: RefKind, element_type: &HostType, slot: Slot) -> Self {
        ByRefArg {
            kind,
            element_type: element_type.clone(),
            slot,
        }
    }

    pub fn kind(&self) -> RefKind {
        self.kind
    }

    pub fn is_out(&self) -> bool {
        self.kind == RefKind::Out
    }

    pub fn element_type(&self) -> &HostType {
        &self.element_type
    }

    pub fn slot(&self) -> &Slot {
        &self.slot
    }

    pub fn value(&self) -> Value {
        self.lock().clone()
    }

    pub fn set_value(&self, value: Value) {
        *self.lock() = value;
    }

    pub fn ptr_eq(&self, other: &ByRefArg) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    fn lock(&self) -> MutexGuard<'_, Value> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for ByRefArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByRefArg")
            .field("kind", &self.kind)
            .field("element_type", &self.element_type)
            .field("value", &self.value())
            .finish()
    }
}

/// Unwrapped argument list whose by-reference slots are refreshed on drop.
///
/// The callee works on plain values; whatever it left in a position that was
/// passed as a `ByRefArg` is copied back into that wrapper when the guard goes
/// out of scope, including on error returns and unwinding.
pub(crate) struct ByRefWriteBack<'a> {
    originals: &'a [Value],
    values: Vec<Value>,
}

impl<'a> ByRefWriteBack<'a> {
    pub(crate) fn new(originals: &'a [Value]) -> Self {
        let values = originals
            .iter()
            .map(|arg| match arg {
                Value::ByRef(r) => r.value(),
                other => other.clone(),
            })
            .collect();
        ByRefWriteBack { originals, values }
    }

    pub(crate) fn args_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }
}

impl Drop for ByRefWriteBack<'_> {
    fn drop(&mut self) {
        for (original, value) in self.originals.iter().zip(self.values.drain(..)) {
            if let Value::ByRef(r) = original {
                r.set_value(value);
            }
        }
    }
}
