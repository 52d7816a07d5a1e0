//! Dispatch cache
//!
//! Maps a `BindSignature` to the outcome of resolving it. The first outcome
//! stored for a signature is the one every later lookup sees, until the cache
//! is cleared. Clearing is process-wide: `invalidate_all_bindings` bumps a
//! global epoch and every cache drops its entries on its next access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::binder::MemberHandle;
use crate::error::BindingFailure;
use crate::signature::BindSignature;

static BINDING_EPOCH: AtomicU64 = AtomicU64::new(0);

/// Invalidate every dispatch cache in the process (e.g. after an access or
/// attribute policy change).
pub fn invalidate_all_bindings() {
    let epoch = BINDING_EPOCH.fetch_add(1, Ordering::SeqCst) + 1;
    debug!(target: "hostbind::cache", epoch, "invalidated all bindings");
}

pub fn binding_epoch() -> u64 {
    BINDING_EPOCH.load(Ordering::SeqCst)
}

/// Cached result of resolving a signature.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Resolved(MemberHandle),
    Failed(BindingFailure),
}

impl DispatchOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, DispatchOutcome::Resolved(_))
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Resolution passes whose outcome was offered to the cache
    pub resolutions: u64,
    pub entries: usize,
}

struct Entries {
    epoch: u64,
    map: HashMap<BindSignature, Arc<DispatchOutcome>>,
}

pub struct DispatchCache {
    entries: RwLock<Entries>,
    hits: AtomicU64,
    misses: AtomicU64,
    resolutions: AtomicU64,
}

impl DispatchCache {
    pub fn new() -> Self {
        DispatchCache {
            entries: RwLock::new(Entries {
                epoch: binding_epoch(),
                map: HashMap::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            resolutions: AtomicU64::new(0),
        }
    }

    pub fn try_get(&self, signature: &BindSignature) -> Option<Arc<DispatchOutcome>> {
        let epoch = binding_epoch();
        {
            let entries = self.read();
            if entries.epoch == epoch {
                if let Some(outcome) = entries.map.get(signature) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(outcome.clone());
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }
        self.sync_epoch(&mut self.write(), epoch);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store `outcome` unless the signature already has one; returns the
    /// outcome now associated with the signature.
    pub fn put(&self, signature: BindSignature, outcome: DispatchOutcome) -> Arc<DispatchOutcome> {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.write();
        self.sync_epoch(&mut entries, binding_epoch());
        entries
            .map
            .entry(signature)
            .or_insert_with(|| Arc::new(outcome))
            .clone()
    }

    pub fn clear(&self) {
        self.write().map.clear();
    }

    pub fn len(&self) -> usize {
        let entries = self.read();
        if entries.epoch == binding_epoch() {
            entries.map.len()
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            resolutions: self.resolutions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn sync_epoch(&self, entries: &mut Entries, epoch: u64) {
        if entries.epoch != epoch {
            debug!(
                target: "hostbind::cache",
                dropped = entries.map.len(),
                epoch,
                "dispatch cache invalidated"
            );
            entries.map.clear();
            entries.epoch = epoch;
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for DispatchCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DispatchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchCache")
            .field("stats", &self.stats())
            .finish()
    }
}
