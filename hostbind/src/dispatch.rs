//! Member binder and dispatcher
//!
//! One dispatch attempt runs:
//!
//! ```text
//! signature -> cache lookup -> hit  -> classify -> invoke | fail
//!                           -> miss -> candidates -> resolve -> cache -> classify -> invoke | fail
//! ```
//!
//! A failed direct lookup on an instance is retried against registered
//! extension types with the instance prepended to the arguments.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::binder::{
    AccessPolicy, BinderArgument, CallContext, DefaultAccessPolicy, InterfaceMapProvider,
    MemberHandle, NoInterfaceMaps, OverloadResolver, ResolveRequest, ResolveResult, ResolveScope,
};
use crate::byref::ByRefWriteBack;
use crate::cache::{DispatchCache, DispatchOutcome};
use crate::canonical::{self, CanonicalRefTable};
use crate::config::DispatchConfig;
use crate::delegate::{DelegateFactory, DelegateShape, ExecutionGate, HostDelegate};
use crate::error::{BindingFailure, BindingFailureReason, DispatchError, DispatchResult, HostError};
use crate::extension::ExtensionMethods;
use crate::signature::{BindSignature, InvokeFlags};
use crate::target::{HostTarget, HostTargetFlags};
use crate::types::HostType;
use crate::value::Value;

/// Dynamic member dispatcher. Safe to share across threads.
pub struct Dispatcher {
    resolver: Arc<dyn OverloadResolver>,
    access: Arc<dyn AccessPolicy>,
    interface_maps: Arc<dyn InterfaceMapProvider>,
    extensions: Arc<ExtensionMethods>,
    cache: DispatchCache,
    canonical: Arc<CanonicalRefTable>,
    delegates: DelegateFactory,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(resolver: Arc<dyn OverloadResolver>) -> Self {
        Dispatcher {
            resolver,
            access: Arc::new(DefaultAccessPolicy),
            interface_maps: Arc::new(NoInterfaceMaps),
            extensions: Arc::new(ExtensionMethods::new()),
            cache: DispatchCache::new(),
            canonical: canonical::global(),
            delegates: DelegateFactory::default(),
            config: DispatchConfig::default(),
        }
    }

    pub fn with_access_policy(mut self, access: Arc<dyn AccessPolicy>) -> Self {
        self.access = access;
        self
    }

    pub fn with_interface_maps(mut self, provider: Arc<dyn InterfaceMapProvider>) -> Self {
        self.interface_maps = provider;
        self
    }

    /// Share an extension registry with other dispatchers.
    pub fn with_extensions(mut self, extensions: Arc<ExtensionMethods>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.delegates = DelegateFactory::with_config(self.delegates.gate().clone(), &config);
        self.config = config;
        self
    }

    /// Gate through which script callees are entered.
    pub fn with_gate(mut self, gate: Arc<dyn ExecutionGate>) -> Self {
        self.delegates = DelegateFactory::with_config(gate, &self.config);
        self
    }

    pub fn with_canonical_table(mut self, table: Arc<CanonicalRefTable>) -> Self {
        self.canonical = table;
        self
    }

    pub fn cache(&self) -> &DispatchCache {
        &self.cache
    }

    pub fn extensions(&self) -> &Arc<ExtensionMethods> {
        &self.extensions
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn register_extension_type(&self, ty: &HostType) -> bool {
        self.extensions.register_candidate_type(ty)
    }

    /// Drop this dispatcher's cached outcomes.
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    /// Dispatch `name` on `target`.
    ///
    /// Leading `Value::Type` arguments of a method call without explicit type
    /// arguments are first taken as the generic type arguments. If that does
    /// not bind, the call is retried with them as ordinary arguments.
    pub fn dispatch(
        &self,
        ctx: &CallContext,
        flags: InvokeFlags,
        target: &HostTarget,
        name: &str,
        type_args: &[HostType],
        args: &[Value],
    ) -> DispatchResult<Value> {
        let (peeled_types, peeled_args) = peel_type_args(flags, type_args, args);
        let direct = self.dispatch_direct(ctx, flags, target, name, &peeled_types, peeled_args);
        let failure = match direct {
            Err(DispatchError::Binding(failure)) if is_retryable(&failure) => failure,
            other => return other,
        };

        if peeled_args.len() != args.len() {
            match self.dispatch_direct(ctx, flags, target, name, type_args, args) {
                Err(DispatchError::Binding(retry)) if is_retryable(&retry) => {
                    trace!(target: "hostbind::dispatch", member = name, "unpeeled retry failed");
                }
                other => return other,
            }
        }

        self.extension_fallback(ctx, flags, target, name, &peeled_types, peeled_args, failure)
    }

    /// Resolve `name` without invoking it. Uses and fills the cache.
    pub fn bind(
        &self,
        ctx: &CallContext,
        flags: InvokeFlags,
        target: &HostTarget,
        name: &str,
        type_args: &[HostType],
        args: &[Value],
    ) -> Result<MemberHandle, BindingFailure> {
        let signature = BindSignature::new(ctx.access_scope(), flags, target, name, type_args, args);
        let outcome = match self.cache.try_get(&signature) {
            Some(outcome) => {
                trace!(target: "hostbind::dispatch", member = name, "dispatch cache hit");
                outcome
            }
            None => {
                let outcome = self.resolve(ctx, flags, target, name, &signature);
                debug!(
                    target: "hostbind::dispatch",
                    member = name,
                    target_type = %target.declared_type(),
                    resolved = outcome.is_resolved(),
                    "dispatch cache miss"
                );
                self.cache.put(signature, outcome)
            }
        };
        self.classify(target, name, &outcome)
    }

    /// Call any callable value: a bound method, a delegate or a script function.
    pub fn invoke_value(
        &self,
        ctx: &CallContext,
        callee: &Value,
        args: &[Value],
    ) -> DispatchResult<Value> {
        match callee {
            Value::Method(m) => self.dispatch(ctx, InvokeFlags::INVOKE_METHOD, &m.target, &m.name, &[], args),
            Value::Delegate(d) => d.invoke_dynamic(args),
            Value::Function(f) => Ok(self.delegates.gate().enter(&mut || f.call(args))?),
            other => Err(HostError::type_error(format!(
                "value of type {} is not callable",
                other.host_type()
            ))
            .into()),
        }
    }

    /// Build a statically typed adapter for `callee`.
    pub fn create_delegate(
        &self,
        delegate_type: &HostType,
        shape: DelegateShape,
        callee: &Value,
    ) -> DispatchResult<HostDelegate> {
        self.delegates.create(delegate_type, shape, callee)
    }

    fn dispatch_direct(
        &self,
        ctx: &CallContext,
        flags: InvokeFlags,
        target: &HostTarget,
        name: &str,
        type_args: &[HostType],
        args: &[Value],
    ) -> DispatchResult<Value> {
        let member = self.bind(ctx, flags, target, name, type_args, args)?;
        self.invoke_member(ctx, target, &member, name, args)
    }

    fn resolve(
        &self,
        ctx: &CallContext,
        flags: InvokeFlags,
        target: &HostTarget,
        name: &str,
        signature: &BindSignature,
    ) -> DispatchOutcome {
        let args: Vec<BinderArgument> = signature
            .args()
            .iter()
            .cloned()
            .map(BinderArgument::from_descriptor)
            .collect();

        let mut first_failure = None;
        for scope in self.candidates(ctx, target, name) {
            let request = ResolveRequest {
                flags,
                target: signature.target(),
                scope: &scope,
                type_args: signature.type_args(),
                args: &args,
            };
            let reason = match self.resolver.resolve(&request) {
                ResolveResult::Member(member) => return DispatchOutcome::Resolved(member),
                ResolveResult::Error(err) => BindingFailureReason::from(err),
                ResolveResult::Unrecognized => BindingFailureReason::Unrecognized,
            };
            trace!(
                target: "hostbind::dispatch",
                candidate = &*scope.name,
                %reason,
                "candidate failed"
            );
            first_failure.get_or_insert(BindingFailure::new(name, reason));
        }
        DispatchOutcome::Failed(first_failure.unwrap_or_else(|| BindingFailure::not_found(name)))
    }

    /// Ordered resolution attempts. Interface-mapped names are used only for
    /// live instances viewed through an interface.
    fn candidates(&self, ctx: &CallContext, target: &HostTarget, name: &str) -> Vec<ResolveScope> {
        let default_scope = || ResolveScope {
            name: Arc::from(name),
            access: ctx
                .access_scope()
                .cloned()
                .or_else(|| self.access.default_access(target)),
        };

        let declared = target.declared_type();
        let runtime = match target.runtime_type() {
            Some(runtime) if declared.is_interface() => runtime,
            _ => return vec![default_scope()],
        };

        let mut scopes = Vec::new();
        for map in self.interface_maps.interface_maps(&runtime, declared) {
            for (source, implementation) in map.interface_methods.iter().zip(&map.target_methods) {
                if &*source.name == name {
                    scopes.push(ResolveScope {
                        name: implementation.name.clone(),
                        access: Some(map.target_type.clone()),
                    });
                }
            }
        }
        if scopes.is_empty() {
            scopes.push(default_scope());
        }
        scopes
    }

    fn classify(
        &self,
        target: &HostTarget,
        name: &str,
        outcome: &DispatchOutcome,
    ) -> Result<MemberHandle, BindingFailure> {
        match outcome {
            DispatchOutcome::Resolved(member)
                if member.is_static() && !self.access.allows_static_access(target) =>
            {
                Err(BindingFailure::static_access_denied(name))
            }
            DispatchOutcome::Resolved(member) => Ok(member.clone()),
            DispatchOutcome::Failed(failure) => Err(failure.clone()),
        }
    }

    fn invoke_member(
        &self,
        ctx: &CallContext,
        target: &HostTarget,
        member: &MemberHandle,
        name: &str,
        args: &[Value],
    ) -> DispatchResult<Value> {
        if member.is_get_type() && !ctx.notify_reflection(member) {
            warn!(target: "hostbind::dispatch", member = name, "reflection audit blocked call");
            return Err(BindingFailure::new(name, BindingFailureReason::ReflectionDenied).into());
        }

        let mut write_back = ByRefWriteBack::new(args);
        let result = member.invoke(target, write_back.args_mut());
        drop(write_back);

        let value = result?;
        if self.config.canonicalize_results {
            Ok(self.canonical.canonicalize(value))
        } else {
            Ok(value)
        }
    }

    fn extension_fallback(
        &self,
        ctx: &CallContext,
        flags: InvokeFlags,
        target: &HostTarget,
        name: &str,
        type_args: &[HostType],
        args: &[Value],
        failure: BindingFailure,
    ) -> DispatchResult<Value> {
        let enabled = self.config.extension_fallback
            && target
                .flags()
                .contains(HostTargetFlags::ALLOW_EXTENSION_METHODS);
        let instance = match target.instance() {
            Some(instance) if enabled => instance,
            _ => return Err(failure.into()),
        };
        let summary = self.extensions.summary();
        if !summary.has_member(name) {
            return Err(failure.into());
        }

        let mut extended = Vec::with_capacity(args.len() + 1);
        extended.push(instance.clone());
        extended.extend_from_slice(args);

        for ext_type in summary.types_with_member(name) {
            let ext_target = HostTarget::for_type(ext_type);
            match self.dispatch_direct(ctx, flags, &ext_target, name, type_args, &extended) {
                Ok(value) => {
                    debug!(
                        target: "hostbind::extension",
                        member = name,
                        ext_type = %ext_type,
                        "bound through extension type"
                    );
                    return Ok(value);
                }
                Err(DispatchError::Binding(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(failure.into())
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("cache", &self.cache)
            .field("extensions", &self.extensions)
            .field("config", &self.config)
            .finish()
    }
}

/// Binding failures after which other forms of the call are still tried.
fn is_retryable(failure: &BindingFailure) -> bool {
    failure.reason != BindingFailureReason::ReflectionDenied
}

/// Split leading imported-type arguments off a method call that carries no
/// explicit type arguments.
fn peel_type_args<'a>(
    flags: InvokeFlags,
    type_args: &'a [HostType],
    args: &'a [Value],
) -> (Cow<'a, [HostType]>, &'a [Value]) {
    if !type_args.is_empty() || !flags.contains(InvokeFlags::INVOKE_METHOD) {
        return (Cow::Borrowed(type_args), args);
    }
    let count = args.iter().take_while(|a| a.as_type().is_some()).count();
    if count == 0 {
        return (Cow::Borrowed(type_args), args);
    }
    let peeled = args[..count].iter().filter_map(Value::as_type).cloned().collect();
    (Cow::Owned(peeled), &args[count..])
}
