//! Canonicalization table
//!
//! Structurally equal immutable values observed by the process resolve to a
//! single shared `Arc`, so identity comparison can stand in for equality.
//! Entries are held weakly. Dead entries are swept when a per-type map has
//! grown past a size threshold, at most once per interval, so a large table
//! does not pay an O(n) sweep on every insert. Enum and struct values get one
//! map per host type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant, SystemTime};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::config::DispatchConfig;
use crate::types::{self, HostType};
use crate::value::{EnumValue, StructValue, Value};

/// Default per-type size at which compaction becomes eligible.
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 256 * 1024;

/// Default minimum time between two compactions of one per-type map.
pub const DEFAULT_COMPACTION_INTERVAL: Duration = Duration::from_secs(120);

/// Types whose instances may be canonicalized.
pub trait CanonicalValue: Eq + Hash + Clone + Send + Sync + 'static {
    /// Host type that selects the per-type map, for values carrying one.
    fn host_type(&self) -> Option<&HostType> {
        None
    }
}

impl CanonicalValue for i8 {}
impl CanonicalValue for i16 {}
impl CanonicalValue for i32 {}
impl CanonicalValue for i64 {}
impl CanonicalValue for u8 {}
impl CanonicalValue for u16 {}
impl CanonicalValue for u32 {}
impl CanonicalValue for u64 {}
impl CanonicalValue for bool {}
impl CanonicalValue for char {}
impl CanonicalValue for Duration {}
impl CanonicalValue for SystemTime {}

impl CanonicalValue for EnumValue {
    fn host_type(&self) -> Option<&HostType> {
        Some(&self.ty)
    }
}

impl CanonicalValue for StructValue {
    fn host_type(&self) -> Option<&HostType> {
        Some(&self.ty)
    }
}

/// Rust type of the stored value plus the host type for enums and structs.
type TableKey = (TypeId, Option<types::TypeId>);

struct TypeTable<T> {
    entries: HashMap<T, Weak<T>>,
    last_compaction: Instant,
    compactions: u64,
}

impl<T> TypeTable<T> {
    fn new() -> Self {
        TypeTable {
            entries: HashMap::new(),
            last_compaction: Instant::now(),
            compactions: 0,
        }
    }
}

/// Per-type counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CanonicalStats {
    /// Entries currently in the map (live or not yet swept)
    pub entries: usize,
    pub compactions: u64,
}

pub struct CanonicalRefTable {
    tables: Mutex<HashMap<TableKey, Arc<dyn Any + Send + Sync>>>,
    threshold: usize,
    interval: Duration,
}

impl CanonicalRefTable {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_COMPACTION_THRESHOLD, DEFAULT_COMPACTION_INTERVAL)
    }

    pub fn with_limits(threshold: usize, interval: Duration) -> Self {
        CanonicalRefTable {
            tables: Mutex::new(HashMap::new()),
            threshold,
            interval,
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::with_limits(config.compaction_threshold, config.compaction_interval())
    }

    /// Return the shared instance structurally equal to `value`, registering
    /// `value` itself when no live instance exists.
    pub fn get_canonical_ref<T: CanonicalValue>(&self, value: Arc<T>) -> Arc<T> {
        let table = self.table_for::<T>(value.host_type());
        let mut table = lock(&*table);

        if let Some(existing) = table.entries.get(&*value).and_then(Weak::upgrade) {
            return existing;
        }

        table.entries.insert((*value).clone(), Arc::downgrade(&value));
        self.maybe_compact(&mut *table, value.host_type());
        value
    }

    /// Canonicalize eligible dynamic values; everything else is returned unchanged.
    pub fn canonicalize(&self, value: Value) -> Value {
        match value {
            Value::Enum(e) => Value::Enum(self.get_canonical_ref(e)),
            Value::Struct(s) if s.ty.is_immutable() => Value::Struct(self.get_canonical_ref(s)),
            other => other,
        }
    }

    /// Counters for a value type that carries no host type.
    pub fn stats<T: CanonicalValue>(&self) -> CanonicalStats {
        self.stats_in::<T>(None)
    }

    /// Counters for the enum or struct map of `ty`.
    pub fn host_stats(&self, ty: &HostType) -> CanonicalStats {
        match ty.kind() {
            types::TypeKind::Enum => self.stats_in::<EnumValue>(Some(ty)),
            _ => self.stats_in::<StructValue>(Some(ty)),
        }
    }

    fn stats_in<T: CanonicalValue>(&self, host: Option<&HostType>) -> CanonicalStats {
        let table = self.table_for::<T>(host);
        let table = lock(&*table);
        CanonicalStats {
            entries: table.entries.len(),
            compactions: table.compactions,
        }
    }

    fn table_for<T: CanonicalValue>(&self, host: Option<&HostType>) -> Arc<Mutex<TypeTable<T>>> {
        let mut tables = lock(&self.tables);
        let erased = tables
            .entry((TypeId::of::<T>(), host.map(HostType::id)))
            .or_insert_with(|| Arc::new(Mutex::new(TypeTable::<T>::new())))
            .clone();
        drop(tables);

        // Keyed by TypeId::of::<T>, so the downcast only fails if the map is
        // corrupted; fall back to an unshared table rather than panicking.
        erased
            .downcast::<Mutex<TypeTable<T>>>()
            .unwrap_or_else(|_| Arc::new(Mutex::new(TypeTable::new())))
    }

    fn maybe_compact<T: CanonicalValue>(&self, table: &mut TypeTable<T>, host: Option<&HostType>) {
        if table.entries.len() < self.threshold || table.last_compaction.elapsed() < self.interval {
            return;
        }
        let before = table.entries.len();
        table.entries.retain(|_, weak| weak.strong_count() > 0);
        table.last_compaction = Instant::now();
        table.compactions += 1;
        debug!(
            target: "hostbind::canonical",
            ty = std::any::type_name::<T>(),
            host_type = host.map(HostType::name),
            before,
            after = table.entries.len(),
            "compacted canonical table"
        );
    }
}

impl Default for CanonicalRefTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CanonicalRefTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanonicalRefTable")
            .field("types", &lock(&self.tables).len())
            .field("threshold", &self.threshold)
            .field("interval", &self.interval)
            .finish()
    }
}

static GLOBAL_TABLE: Lazy<Arc<CanonicalRefTable>> =
    Lazy::new(|| Arc::new(CanonicalRefTable::from_config(&DispatchConfig::from_env())));

/// Process-wide canonicalization table.
pub fn global() -> Arc<CanonicalRefTable> {
    GLOBAL_TABLE.clone()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
