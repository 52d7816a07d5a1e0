//! hostbind: dynamic member binding for statically typed host APIs
//!
//! Script code calls host members by name with dynamically typed arguments.
//! This crate fingerprints each call shape, memoizes the outcome of overload
//! resolution per fingerprint, and marshals by-reference parameters across
//! the boundary. It includes:
//!
//! - `BindSignature` fingerprints and the `DispatchCache`
//! - The `Dispatcher` with interface-map and extension-member fallbacks
//! - `ByRefArg` wrappers with guaranteed write-back
//! - Delegate synthesis over script callees
//! - A weak canonicalization table for immutable values
//!
//! Overload resolution itself is supplied by the embedder through
//! [`binder::OverloadResolver`].

#![deny(clippy::print_stderr)]

pub mod binder;
pub mod byref;
pub mod cache;
pub mod canonical;
pub mod config;
pub mod convert;
pub mod delegate;
pub mod dispatch;
pub mod error;
pub mod extension;
pub mod signature;
pub mod target;
pub mod types;
pub mod value;

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use hostbind::prelude::*;
///
/// let out = ByRefArg::out(&HostType::int32());
/// assert_eq!(out.value(), Value::I32(0));
/// ```
pub mod prelude {
    pub use super::binder::{
        AccessPolicy, CallContext, InterfaceMap, InterfaceMapProvider, MemberHandle,
        OverloadResolver, ReflectionAudit, ResolveError, ResolveRequest, ResolveResult,
        ResolveScope,
    };
    pub use super::byref::{ByRefArg, RefKind};
    pub use super::cache::invalidate_all_bindings;
    pub use super::config::DispatchConfig;
    pub use super::delegate::{DelegateParam, DelegateShape, HostDelegate, ScriptFunction};
    pub use super::dispatch::Dispatcher;
    pub use super::error::{
        BindingFailure, BindingFailureReason, DispatchError, DispatchResult, HostError,
    };
    pub use super::signature::{BindSignature, InvokeFlags};
    pub use super::target::{HostTarget, HostTargetFlags};
    pub use super::types::{HostType, MethodInfo, TypeKind};
    pub use super::value::{HostObject, Value};
}

pub use prelude::*;
