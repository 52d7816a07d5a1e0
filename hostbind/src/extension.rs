//! Extension-member summary
//!
//! Extension members are static functions scoped by their first parameter's
//! type. When a direct lookup fails, the dispatcher retries against every
//! registered candidate type. Registration is rare compared to lookups, so
//! the summary is rebuilt from scratch on each new type and swapped in as a
//! fresh immutable snapshot.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::binder::{DefaultMemberPolicy, MemberPolicy};
use crate::types::{HostType, MethodInfo, TypeId};

/// An eligible extension member and the type declaring it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionMethod {
    pub declaring_type: HostType,
    pub method: MethodInfo,
}

/// Immutable snapshot of all registered extension members.
#[derive(Debug, Default)]
pub struct ExtensionSummary {
    types: Vec<HostType>,
    methods: Vec<ExtensionMethod>,
    member_names: HashSet<Arc<str>>,
}

impl ExtensionSummary {
    pub fn types(&self) -> &[HostType] {
        &self.types
    }

    pub fn methods(&self) -> &[ExtensionMethod] {
        &self.methods
    }

    pub fn member_names(&self) -> &HashSet<Arc<str>> {
        &self.member_names
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.member_names.contains(name)
    }

    /// Candidate types declaring at least one extension member named `name`.
    pub fn types_with_member<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a HostType> + 'a {
        self.types.iter().filter(move |ty| {
            self.methods
                .iter()
                .any(|m| m.declaring_type == **ty && &*m.method.name == name)
        })
    }
}

#[derive(Default)]
struct Registry {
    seen: HashSet<TypeId>,
    types: Vec<HostType>,
}

/// Registry of candidate types plus the current summary snapshot.
pub struct ExtensionMethods {
    policy: Arc<dyn MemberPolicy>,
    registry: RwLock<Registry>,
    summary: RwLock<Arc<ExtensionSummary>>,
}

impl ExtensionMethods {
    pub fn new() -> Self {
        Self::with_policy(Arc::new(DefaultMemberPolicy))
    }

    pub fn with_policy(policy: Arc<dyn MemberPolicy>) -> Self {
        ExtensionMethods {
            policy,
            registry: RwLock::new(Registry::default()),
            summary: RwLock::new(Arc::new(ExtensionSummary::default())),
        }
    }

    /// Register `ty` as an extension candidate. Returns `true` when the type
    /// was newly added because it declares at least one eligible member.
    pub fn register_candidate_type(&self, ty: &HostType) -> bool {
        if !ty.methods().iter().any(|m| self.policy.is_extension(ty, m)) {
            return false;
        }

        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !registry.seen.insert(ty.id()) {
            return false;
        }
        registry.types.push(ty.clone());

        let summary = Arc::new(self.build_summary(&registry.types));
        debug!(
            target: "hostbind::extension",
            ty = %ty,
            types = summary.types.len(),
            members = summary.methods.len(),
            "rebuilt extension summary"
        );
        *self
            .summary
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = summary;
        true
    }

    /// Current snapshot. It stays consistent after a newer one is published.
    pub fn summary(&self) -> Arc<ExtensionSummary> {
        self.summary
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn build_summary(&self, types: &[HostType]) -> ExtensionSummary {
        let mut methods = Vec::new();
        let mut member_names = HashSet::new();
        for ty in types {
            for method in ty.methods() {
                if self.policy.is_extension(ty, method) {
                    member_names.insert(method.name.clone());
                    methods.push(ExtensionMethod {
                        declaring_type: ty.clone(),
                        method: method.clone(),
                    });
                }
            }
        }
        ExtensionSummary {
            types: types.to_vec(),
            methods,
            member_names,
        }
    }
}

impl Default for ExtensionMethods {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExtensionMethods {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionMethods")
            .field("summary", &self.summary())
            .finish()
    }
}
