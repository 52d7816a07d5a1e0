//! Collaborators consumed by the dispatcher
//!
//! Overload resolution itself is an external service: the dispatcher only
//! fingerprints calls, enumerates candidates and caches what the resolver
//! returns. Everything it needs from the outside world is expressed as a trait
//! here so embedders (and tests) can plug in their own implementations.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::error::{BindingFailureReason, HostError};
use crate::signature::{ArgumentDescriptor, CallTargetDescriptor, InvokeFlags};
use crate::target::HostTarget;
use crate::types::{HostType, MethodInfo};
use crate::value::Value;

/// Function that performs the actual member call.
pub type MemberInvoker = dyn Fn(&HostTarget, &mut [Value]) -> Result<Value, HostError> + Send + Sync;

struct ResolvedMember {
    name: Arc<str>,
    declaring_type: HostType,
    is_static: bool,
    invoker: Arc<MemberInvoker>,
}

/// Callable member returned by a resolver. Shared, immutable, compared by identity.
#[derive(Clone)]
pub struct MemberHandle(Arc<ResolvedMember>);

impl MemberHandle {
    pub fn new<F>(name: &str, declaring_type: &HostType, is_static: bool, invoker: F) -> Self
    where
        F: Fn(&HostTarget, &mut [Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        MemberHandle(Arc::new(ResolvedMember {
            name: Arc::from(name),
            declaring_type: declaring_type.clone(),
            is_static,
            invoker: Arc::new(invoker),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn declaring_type(&self) -> &HostType {
        &self.0.declaring_type
    }

    pub fn is_static(&self) -> bool {
        self.0.is_static
    }

    /// The universal "get runtime type" accessor declared on `Object`.
    pub fn is_get_type(&self) -> bool {
        !self.0.is_static && &*self.0.name == "GetType" && self.0.declaring_type == HostType::object()
    }

    /// Run the member. By-reference positions in `args` may be overwritten.
    pub fn invoke(&self, target: &HostTarget, args: &mut [Value]) -> Result<Value, HostError> {
        (self.0.invoker)(target, args)
    }

    pub fn ptr_eq(&self, other: &MemberHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for MemberHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for MemberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberHandle")
            .field("name", &self.0.name)
            .field("declaring_type", &self.0.declaring_type)
            .field("is_static", &self.0.is_static)
            .finish()
    }
}

/// One named, scoped resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveScope {
    /// Member name to look up (may differ from the requested name for
    /// interface-mapped candidates)
    pub name: Arc<str>,
    /// Access scope the lookup runs in; `None` means public members only
    pub access: Option<HostType>,
}

/// Argument as presented to the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinderArgument {
    pub descriptor: ArgumentDescriptor,
    /// Parameter type must match exactly (no widening); set for by-ref slots
    pub exact: bool,
}

impl BinderArgument {
    pub fn from_descriptor(descriptor: ArgumentDescriptor) -> Self {
        let exact = descriptor.is_by_ref();
        BinderArgument { descriptor, exact }
    }
}

/// Input to one overload-resolution call. Carries shapes only, never values.
#[derive(Debug)]
pub struct ResolveRequest<'a> {
    pub flags: InvokeFlags,
    pub target: &'a CallTargetDescriptor,
    pub scope: &'a ResolveScope,
    pub type_args: &'a [HostType],
    pub args: &'a [BinderArgument],
}

/// Failure reported by a resolver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no matching member")]
    NotFound,
    #[error("ambiguous match")]
    Ambiguous,
    #[error("excluded by access policy")]
    ExcludedByPolicy,
    #[error("{0}")]
    Platform(String),
}

impl From<ResolveError> for BindingFailureReason {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound => BindingFailureReason::NotFound,
            ResolveError::Ambiguous => BindingFailureReason::Ambiguous,
            ResolveError::ExcludedByPolicy => BindingFailureReason::ExcludedByPolicy,
            ResolveError::Platform(message) => BindingFailureReason::Platform(message),
        }
    }
}

/// Raw result of one overload-resolution call.
#[derive(Debug, Clone)]
pub enum ResolveResult {
    Member(MemberHandle),
    Error(ResolveError),
    /// The resolver produced something other than a callable member
    Unrecognized,
}

/// External overload-resolution service. Must be a pure function of the request.
pub trait OverloadResolver: Send + Sync {
    fn resolve(&self, request: &ResolveRequest<'_>) -> ResolveResult;
}

/// Supplies default access scope and static-member allowance per target.
pub trait AccessPolicy: Send + Sync {
    /// Access scope used when the calling context sets none.
    fn default_access(&self, _target: &HostTarget) -> Option<HostType> {
        None
    }

    fn allows_static_access(&self, target: &HostTarget) -> bool {
        target
            .flags()
            .contains(crate::target::HostTargetFlags::ALLOW_STATIC_MEMBERS)
    }
}

/// Public-only access; static members only through targets flagged for them.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAccessPolicy;

impl AccessPolicy for DefaultAccessPolicy {}

/// Interface-to-implementation method mapping for one interface on one type.
/// `interface_methods[i]` is implemented by `target_methods[i]`.
#[derive(Debug, Clone)]
pub struct InterfaceMap {
    pub target_type: HostType,
    pub interface_methods: Vec<MethodInfo>,
    pub target_methods: Vec<MethodInfo>,
}

pub trait InterfaceMapProvider: Send + Sync {
    fn interface_maps(&self, runtime: &HostType, interface: &HostType) -> Vec<InterfaceMap>;
}

/// Provider for hosts without interface-map metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInterfaceMaps;

impl InterfaceMapProvider for NoInterfaceMaps {
    fn interface_maps(&self, _runtime: &HostType, _interface: &HostType) -> Vec<InterfaceMap> {
        Vec::new()
    }
}

/// Hook notified before the "get runtime type" accessor runs. Returning
/// `false` blocks the call.
pub trait ReflectionAudit: Send + Sync {
    fn on_reflection(&self, context: &CallContext, member: &MemberHandle) -> bool;
}

/// Decides script visibility and extension eligibility of declared methods.
pub trait MemberPolicy: Send + Sync {
    fn is_script_visible(&self, _declaring: &HostType, method: &MethodInfo) -> bool {
        method.is_public
    }

    fn is_extension(&self, declaring: &HostType, method: &MethodInfo) -> bool {
        method.is_static && method.is_extension && self.is_script_visible(declaring, method)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMemberPolicy;

impl MemberPolicy for DefaultMemberPolicy {}

/// Calling context: access scope in effect plus an optional reflection hook.
#[derive(Clone, Default)]
pub struct CallContext {
    access_scope: Option<HostType>,
    audit: Option<Arc<dyn ReflectionAudit>>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_access_scope(mut self, scope: &HostType) -> Self {
        self.access_scope = Some(scope.clone());
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn ReflectionAudit>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn access_scope(&self) -> Option<&HostType> {
        self.access_scope.as_ref()
    }

    /// Report a reflection access. Without a hook every access is allowed.
    pub fn notify_reflection(&self, member: &MemberHandle) -> bool {
        match &self.audit {
            Some(audit) => audit.on_reflection(self, member),
            None => true,
        }
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("access_scope", &self.access_scope)
            .field("audited", &self.audit.is_some())
            .finish()
    }
}
