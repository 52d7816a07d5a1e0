//! Delegate synthesis
//!
//! Builds statically typed adapters over dynamic callees. A shape without
//! by-reference parameters gets a direct shim: enter the execution gate, call
//! the callee, convert the result to the declared return type. A shape with
//! by-reference parameters gets a wrapping shim that substitutes a `ByRefArg`
//! for each such parameter and copies the wrappers' final values back to the
//! caller's storage on every exit path.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use tracing::debug;

use crate::byref::{ByRefArg, RefKind};
use crate::config::{DispatchConfig, DEFAULT_MAX_DELEGATE_ARITY};
use crate::convert::convert_to;
use crate::error::{DispatchError, DispatchResult, HostError};
use crate::types::{HostType, TypeKind};
use crate::value::Value;

// ===== Shapes =====

/// One parameter of a delegate shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateParam {
    pub ty: HostType,
    pub by_ref: Option<RefKind>,
}

impl DelegateParam {
    pub fn value(ty: &HostType) -> Self {
        DelegateParam {
            ty: ty.clone(),
            by_ref: None,
        }
    }

    pub fn out(ty: &HostType) -> Self {
        DelegateParam {
            ty: ty.clone(),
            by_ref: Some(RefKind::Out),
        }
    }

    pub fn by_ref(ty: &HostType) -> Self {
        DelegateParam {
            ty: ty.clone(),
            by_ref: Some(RefKind::InOut),
        }
    }
}

/// Ordered parameter list plus return type. A `Void` return type means none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateShape {
    params: Vec<DelegateParam>,
    return_type: HostType,
}

impl DelegateShape {
    pub fn new(params: Vec<DelegateParam>, return_type: &HostType) -> Self {
        DelegateShape {
            params,
            return_type: return_type.clone(),
        }
    }

    pub fn params(&self) -> &[DelegateParam] {
        &self.params
    }

    pub fn return_type(&self) -> &HostType {
        &self.return_type
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn has_by_ref_params(&self) -> bool {
        self.params.iter().any(|p| p.by_ref.is_some())
    }
}

// ===== Script callees =====

/// A dynamic callee. By-reference positions arrive as `Value::ByRef`.
pub trait ScriptCallable: Send + Sync {
    fn call(&self, args: &[Value]) -> Result<Value, HostError>;
}

impl<F> ScriptCallable for F
where
    F: Fn(&[Value]) -> Result<Value, HostError> + Send + Sync,
{
    fn call(&self, args: &[Value]) -> Result<Value, HostError> {
        self(args)
    }
}

/// Shared handle to a script-side callable. Equality is identity.
#[derive(Clone)]
pub struct ScriptFunction(Arc<dyn ScriptCallable>);

impl ScriptFunction {
    pub fn new<F>(callee: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        ScriptFunction(Arc::new(callee))
    }

    pub fn from_callable<C: ScriptCallable + 'static>(callee: C) -> Self {
        ScriptFunction(Arc::new(callee))
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, HostError> {
        self.0.call(args)
    }

    pub fn ptr_eq(&self, other: &ScriptFunction) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScriptFunction")
    }
}

// ===== Execution gate =====

/// Single synchronization point through which calls into the dynamic side pass.
pub trait ExecutionGate: Send + Sync {
    fn enter(
        &self,
        call: &mut dyn FnMut() -> Result<Value, HostError>,
    ) -> Result<Value, HostError>;
}

#[derive(Debug, Default)]
struct GateState {
    owner: Option<ThreadId>,
    depth: usize,
}

/// Serializes callers across threads. Re-entry from the owning thread is
/// allowed, so a callee may call back into host code that calls it again.
#[derive(Debug, Default)]
pub struct SerialGate {
    state: Mutex<GateState>,
    released: Condvar,
}

impl SerialGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct GateRelease<'a>(&'a SerialGate);

impl Drop for GateRelease<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.owner = None;
            self.0.released.notify_one();
        }
    }
}

impl ExecutionGate for SerialGate {
    fn enter(
        &self,
        call: &mut dyn FnMut() -> Result<Value, HostError>,
    ) -> Result<Value, HostError> {
        let me = thread::current().id();
        {
            let mut state = self.lock();
            while state.owner.is_some_and(|owner| owner != me) {
                state = self
                    .released
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
            state.owner = Some(me);
            state.depth += 1;
        }
        let _release = GateRelease(self);
        call()
    }
}

// ===== Delegates =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shim {
    Direct,
    ByRef,
}

struct DelegateInner {
    delegate_type: HostType,
    shape: DelegateShape,
    shim: Shim,
    callee: ScriptFunction,
    gate: Arc<dyn ExecutionGate>,
}

/// Statically typed adapter over a dynamic callee. Equality is identity.
#[derive(Clone)]
pub struct HostDelegate(Arc<DelegateInner>);

impl HostDelegate {
    pub fn delegate_type(&self) -> &HostType {
        &self.0.delegate_type
    }

    pub fn shape(&self) -> &DelegateShape {
        &self.0.shape
    }

    pub fn ptr_eq(&self, other: &HostDelegate) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Invoke with `args` as the caller's storage: by-reference positions of
    /// `args` hold the callee's final writes afterwards, even when it fails.
    /// A position that already holds a `Value::ByRef` is written through its slot.
    pub fn invoke(&self, args: &mut [Value]) -> DispatchResult<Value> {
        let arity = self.0.shape.arity();
        if args.len() != arity {
            return Err(HostError::argument_error(format!(
                "delegate {} expects {} arguments, got {}",
                self.0.delegate_type,
                arity,
                args.len()
            ))
            .into());
        }
        match self.0.shim {
            Shim::Direct => self.invoke_direct(args),
            Shim::ByRef => self.invoke_wrapped(args),
        }
    }

    /// Invoke from dynamic code. By-reference positions must be passed as
    /// `Value::ByRef` to observe the callee's writes.
    pub fn invoke_dynamic(&self, args: &[Value]) -> DispatchResult<Value> {
        let mut args = args.to_vec();
        self.invoke(&mut args)
    }

    fn invoke_direct(&self, args: &[Value]) -> DispatchResult<Value> {
        let inner = &self.0;
        let ret = inner.gate.enter(&mut || inner.callee.call(args))?;
        Ok(convert_to(&ret, &inner.shape.return_type)?)
    }

    fn invoke_wrapped(&self, args: &mut [Value]) -> DispatchResult<Value> {
        let mut substituted = Vec::with_capacity(args.len());
        let mut wrappers = Vec::new();
        for (i, (param, arg)) in self.0.shape.params.iter().zip(args.iter()).enumerate() {
            let wrapper = match param.by_ref {
                None => {
                    substituted.push(arg.clone());
                    continue;
                }
                Some(RefKind::Out) => ByRefArg::out(&param.ty),
                Some(RefKind::InOut) => {
                    let current = match arg {
                        Value::ByRef(r) => r.value(),
                        other => other.clone(),
                    };
                    ByRefArg::reference(&param.ty, current)
                }
            };
            substituted.push(Value::ByRef(wrapper.clone()));
            wrappers.push((i, wrapper));
        }

        let _copy_back = CopyBack { args, wrappers };
        self.invoke_direct(&substituted)
    }
}

/// Copies wrapper slots into the caller's storage when dropped.
struct CopyBack<'a> {
    args: &'a mut [Value],
    wrappers: Vec<(usize, ByRefArg)>,
}

impl Drop for CopyBack<'_> {
    fn drop(&mut self) {
        for (i, wrapper) in &self.wrappers {
            let value = wrapper.value();
            if let Value::ByRef(storage) = &self.args[*i] {
                storage.set_value(value);
                continue;
            }
            self.args[*i] = value;
        }
    }
}

impl fmt::Debug for HostDelegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostDelegate")
            .field("delegate_type", &self.0.delegate_type)
            .field("shape", &self.0.shape)
            .field("shim", &self.0.shim)
            .finish()
    }
}

/// Creates delegates that share one execution gate.
pub struct DelegateFactory {
    gate: Arc<dyn ExecutionGate>,
    max_arity: usize,
}

impl DelegateFactory {
    pub fn new(gate: Arc<dyn ExecutionGate>) -> Self {
        DelegateFactory {
            gate,
            max_arity: DEFAULT_MAX_DELEGATE_ARITY,
        }
    }

    pub fn with_config(gate: Arc<dyn ExecutionGate>, config: &DispatchConfig) -> Self {
        DelegateFactory {
            gate,
            max_arity: config.max_delegate_arity,
        }
    }

    pub fn gate(&self) -> &Arc<dyn ExecutionGate> {
        &self.gate
    }

    /// Adapt `callee` to `shape` as an instance of `delegate_type`.
    ///
    /// A delegate callee of the same type and shape is returned as is; one of
    /// another type is rebound through its own dynamic invocation.
    pub fn create(
        &self,
        delegate_type: &HostType,
        shape: DelegateShape,
        callee: &Value,
    ) -> DispatchResult<HostDelegate> {
        self.check_shape(delegate_type, &shape)?;

        let callee = match callee {
            Value::Function(f) => f.clone(),
            Value::Delegate(d) if d.delegate_type() == delegate_type && *d.shape() == shape => {
                return Ok(d.clone());
            }
            Value::Delegate(d) => {
                debug!(
                    target: "hostbind::delegate",
                    from = %d.delegate_type(),
                    to = %delegate_type,
                    "rebinding delegate callee"
                );
                let inner = d.clone();
                ScriptFunction::new(move |args: &[Value]| {
                    inner.invoke_dynamic(args).map_err(into_host_error)
                })
            }
            other => {
                return Err(HostError::type_error(format!(
                    "value of type {} is not callable",
                    other.host_type()
                ))
                .into());
            }
        };

        let shim = if shape.has_by_ref_params() {
            Shim::ByRef
        } else {
            Shim::Direct
        };
        debug!(
            target: "hostbind::delegate",
            delegate_type = %delegate_type,
            arity = shape.arity(),
            by_ref = shim == Shim::ByRef,
            "synthesized delegate"
        );
        Ok(HostDelegate(Arc::new(DelegateInner {
            delegate_type: delegate_type.clone(),
            shape,
            shim,
            callee,
            gate: self.gate.clone(),
        })))
    }

    fn check_shape(&self, delegate_type: &HostType, shape: &DelegateShape) -> DispatchResult<()> {
        if delegate_type.kind() != TypeKind::Delegate {
            return Err(DispatchError::unsupported_shape(format!(
                "{} is not a delegate type",
                delegate_type
            )));
        }
        if shape.arity() > self.max_arity {
            return Err(DispatchError::unsupported_shape(format!(
                "{} parameters exceed the maximum delegate arity of {}",
                shape.arity(),
                self.max_arity
            )));
        }
        let void = HostType::void();
        if let Some(i) = shape.params.iter().position(|p| p.ty == void) {
            return Err(DispatchError::unsupported_shape(format!(
                "parameter {} of {} has type Void",
                i, delegate_type
            )));
        }
        Ok(())
    }
}

impl Default for DelegateFactory {
    fn default() -> Self {
        Self::new(Arc::new(SerialGate::new()))
    }
}

impl fmt::Debug for DelegateFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateFactory")
            .field("max_arity", &self.max_arity)
            .finish()
    }
}

fn into_host_error(err: DispatchError) -> HostError {
    match err {
        DispatchError::Invocation(e) => e,
        other => HostError::exception("DispatchError", other.to_string()),
    }
}
