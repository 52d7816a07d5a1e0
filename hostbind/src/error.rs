//! Error types for host member binding and dispatch
//!
//! Three failure families cross the dynamic/static boundary:
//!
//! - `BindingFailure`: no member could be selected (not found, ambiguous,
//!   static access denied, excluded by policy, ...). These are cached.
//! - `HostError`: the resolved member (or a script callee) raised while
//!   running. Propagated unchanged and never cached.
//! - `UnsupportedShape`: delegate synthesis was asked for a call shape it
//!   cannot represent.

use thiserror::Error;

/// Why a binding attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingFailureReason {
    /// No member with a compatible signature exists.
    NotFound,
    /// Several members match equally well.
    Ambiguous,
    /// A member exists but the access or visibility policy hides it.
    ExcludedByPolicy,
    /// A static member was selected for an instance target that does not allow it.
    StaticAccessDenied,
    /// The resolver produced something that is not a callable member.
    Unrecognized,
    /// The calling context vetoed a reflection accessor.
    ReflectionDenied,
    /// Error text surfaced by the resolver itself.
    Platform(String),
}

impl std::fmt::Display for BindingFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingFailureReason::NotFound => f.write_str("no matching member"),
            BindingFailureReason::Ambiguous => f.write_str("ambiguous match"),
            BindingFailureReason::ExcludedByPolicy => f.write_str("excluded by access policy"),
            BindingFailureReason::StaticAccessDenied => {
                f.write_str("cannot access static member in non-static context")
            }
            BindingFailureReason::Unrecognized => f.write_str("unrecognized binding"),
            BindingFailureReason::ReflectionDenied => {
                f.write_str("reflection blocked by calling context")
            }
            BindingFailureReason::Platform(message) => f.write_str(message),
        }
    }
}

/// A classified binding failure, tagged with the member name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("BindingError: cannot bind member '{member}': {reason}")]
pub struct BindingFailure {
    /// Member name as requested by the caller
    pub member: String,
    /// Classified reason
    pub reason: BindingFailureReason,
}

impl BindingFailure {
    pub fn new<S: Into<String>>(member: S, reason: BindingFailureReason) -> Self {
        BindingFailure {
            member: member.into(),
            reason,
        }
    }

    pub fn not_found<S: Into<String>>(member: S) -> Self {
        Self::new(member, BindingFailureReason::NotFound)
    }

    pub fn static_access_denied<S: Into<String>>(member: S) -> Self {
        Self::new(member, BindingFailureReason::StaticAccessDenied)
    }
}

/// Error raised by a host member or a script callee during invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// Value has the wrong type for the operation
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Invalid argument (wrong count, bad value)
    #[error("ArgumentError: {0}")]
    ArgumentError(String),

    /// Conversion would lose information (e.g. 1.5 to Int32)
    #[error("InexactError: {0}")]
    InexactError(String),

    /// Conversion result does not fit the target type
    #[error("OverflowError: {0}")]
    OverflowError(String),

    /// Exception thrown by host or script code
    #[error("{type_name}: {message}")]
    Exception {
        /// Exception type name as reported by the thrower
        type_name: String,
        /// Exception message
        message: String,
    },
}

impl HostError {
    pub fn type_error<S: Into<String>>(msg: S) -> Self {
        HostError::TypeError(msg.into())
    }

    pub fn argument_error<S: Into<String>>(msg: S) -> Self {
        HostError::ArgumentError(msg.into())
    }

    pub fn inexact_error<S: Into<String>>(msg: S) -> Self {
        HostError::InexactError(msg.into())
    }

    pub fn overflow_error<S: Into<String>>(msg: S) -> Self {
        HostError::OverflowError(msg.into())
    }

    pub fn exception<S1: Into<String>, S2: Into<String>>(type_name: S1, message: S2) -> Self {
        HostError::Exception {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

/// Top-level error returned by the dispatch and delegate entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Member resolution failed
    #[error(transparent)]
    Binding(#[from] BindingFailure),

    /// The resolved member (or script callee) raised
    #[error(transparent)]
    Invocation(#[from] HostError),

    /// Delegate synthesis cannot represent the requested call shape
    #[error("UnsupportedShape: {0}")]
    UnsupportedShape(String),
}

impl DispatchError {
    pub fn unsupported_shape<S: Into<String>>(msg: S) -> Self {
        DispatchError::UnsupportedShape(msg.into())
    }

    /// Binding failure details, if this is a binding error.
    pub fn as_binding(&self) -> Option<&BindingFailure> {
        match self {
            DispatchError::Binding(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn is_binding_failure(&self) -> bool {
        matches!(self, DispatchError::Binding(_))
    }
}

/// Result type alias for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;
