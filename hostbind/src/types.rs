//! Host type identities
//!
//! `HostType` is the stable identity every descriptor, signature and cache key
//! refers to. It is a cheap `Arc` clone; equality and hashing use the unique
//! id assigned at construction, never the name.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

static NEXT_TYPE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a host type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u64);

impl TypeId {
    fn next() -> Self {
        TypeId(NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Broad category of a host type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Class,
    Interface,
    Struct,
    Enum,
    Primitive,
    Delegate,
}

impl TypeKind {
    /// Instances of this kind are copied by value.
    pub fn is_value_kind(self) -> bool {
        matches!(self, TypeKind::Struct | TypeKind::Enum | TypeKind::Primitive)
    }
}

/// Metadata for one declared method, as seen by policy providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodInfo {
    pub name: Arc<str>,
    pub is_static: bool,
    pub is_public: bool,
    /// Carries the "extension" marker (a static free function scoped by its
    /// first parameter's type)
    pub is_extension: bool,
}

impl MethodInfo {
    pub fn instance(name: &str) -> Self {
        MethodInfo {
            name: Arc::from(name),
            is_static: false,
            is_public: true,
            is_extension: false,
        }
    }

    pub fn static_method(name: &str) -> Self {
        MethodInfo {
            is_static: true,
            ..Self::instance(name)
        }
    }

    pub fn extension(name: &str) -> Self {
        MethodInfo {
            is_static: true,
            is_extension: true,
            ..Self::instance(name)
        }
    }

    /// Mark this method as not externally visible.
    pub fn private(mut self) -> Self {
        self.is_public = false;
        self
    }
}

struct TypeData {
    id: TypeId,
    name: Arc<str>,
    kind: TypeKind,
    base: Option<HostType>,
    interfaces: Vec<HostType>,
    methods: Vec<MethodInfo>,
    immutable: bool,
}

/// Identity and shape of a host type.
#[derive(Clone)]
pub struct HostType(Arc<TypeData>);

impl HostType {
    pub fn builder(name: &str, kind: TypeKind) -> HostTypeBuilder {
        HostTypeBuilder {
            name: Arc::from(name),
            kind,
            base: None,
            interfaces: Vec::new(),
            methods: Vec::new(),
            immutable: false,
        }
    }

    pub fn id(&self) -> TypeId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> TypeKind {
        self.0.kind
    }

    pub fn base(&self) -> Option<&HostType> {
        self.0.base.as_ref()
    }

    pub fn interfaces(&self) -> &[HostType] {
        &self.0.interfaces
    }

    pub fn methods(&self) -> &[MethodInfo] {
        &self.0.methods
    }

    pub fn is_interface(&self) -> bool {
        self.0.kind == TypeKind::Interface
    }

    pub fn is_value_type(&self) -> bool {
        self.0.kind.is_value_kind()
    }

    /// Enumerations, primitives and types explicitly marked immutable.
    pub fn is_immutable(&self) -> bool {
        self.0.immutable || matches!(self.0.kind, TypeKind::Enum | TypeKind::Primitive)
    }

    /// Check whether a value of type `other` can be stored in a slot of this type.
    pub fn is_assignable_from(&self, other: &HostType) -> bool {
        if self == other || *self == *builtin::OBJECT {
            return true;
        }
        if other.interfaces().iter().any(|i| self.is_assignable_from(i)) {
            return true;
        }
        match other.base() {
            Some(base) => self.is_assignable_from(base),
            None => false,
        }
    }

    pub fn object() -> HostType {
        builtin::OBJECT.clone()
    }
    pub fn boolean() -> HostType {
        builtin::BOOLEAN.clone()
    }
    pub fn int32() -> HostType {
        builtin::INT32.clone()
    }
    pub fn int64() -> HostType {
        builtin::INT64.clone()
    }
    pub fn double() -> HostType {
        builtin::DOUBLE.clone()
    }
    pub fn char() -> HostType {
        builtin::CHAR.clone()
    }
    pub fn string() -> HostType {
        builtin::STRING.clone()
    }
    pub fn void() -> HostType {
        builtin::VOID.clone()
    }
    /// Type of imported-type handles (`Value::Type`).
    pub fn type_handle() -> HostType {
        builtin::TYPE.clone()
    }
    pub fn time_span() -> HostType {
        builtin::TIME_SPAN.clone()
    }
    pub fn date_time() -> HostType {
        builtin::DATE_TIME.clone()
    }
}

impl PartialEq for HostType {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for HostType {}

impl Hash for HostType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostType({}#{})", self.0.name, self.0.id.0)
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// Fluent constructor for `HostType`.
#[derive(Debug)]
pub struct HostTypeBuilder {
    name: Arc<str>,
    kind: TypeKind,
    base: Option<HostType>,
    interfaces: Vec<HostType>,
    methods: Vec<MethodInfo>,
    immutable: bool,
}

impl HostTypeBuilder {
    pub fn base(mut self, base: &HostType) -> Self {
        self.base = Some(base.clone());
        self
    }

    pub fn implements(mut self, interface: &HostType) -> Self {
        self.interfaces.push(interface.clone());
        self
    }

    pub fn method(mut self, method: MethodInfo) -> Self {
        self.methods.push(method);
        self
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub fn build(self) -> HostType {
        HostType(Arc::new(TypeData {
            id: TypeId::next(),
            name: self.name,
            kind: self.kind,
            base: self.base,
            interfaces: self.interfaces,
            methods: self.methods,
            immutable: self.immutable,
        }))
    }
}

mod builtin {
    use super::*;

    pub(super) static OBJECT: Lazy<HostType> = Lazy::new(|| {
        HostType::builder("Object", TypeKind::Class)
            .method(MethodInfo::instance("GetType"))
            .method(MethodInfo::instance("ToString"))
            .build()
    });

    fn primitive(name: &str) -> HostType {
        HostType::builder(name, TypeKind::Primitive)
            .base(&OBJECT)
            .build()
    }

    pub(super) static BOOLEAN: Lazy<HostType> = Lazy::new(|| primitive("Boolean"));
    pub(super) static INT32: Lazy<HostType> = Lazy::new(|| primitive("Int32"));
    pub(super) static INT64: Lazy<HostType> = Lazy::new(|| primitive("Int64"));
    pub(super) static DOUBLE: Lazy<HostType> = Lazy::new(|| primitive("Double"));
    pub(super) static CHAR: Lazy<HostType> = Lazy::new(|| primitive("Char"));
    pub(super) static VOID: Lazy<HostType> = Lazy::new(|| primitive("Void"));
    pub(super) static STRING: Lazy<HostType> = Lazy::new(|| {
        HostType::builder("String", TypeKind::Class)
            .base(&OBJECT)
            .immutable()
            .build()
    });
    pub(super) static TYPE: Lazy<HostType> =
        Lazy::new(|| HostType::builder("Type", TypeKind::Class).base(&OBJECT).build());
    pub(super) static TIME_SPAN: Lazy<HostType> = Lazy::new(|| {
        HostType::builder("TimeSpan", TypeKind::Struct)
            .base(&OBJECT)
            .immutable()
            .build()
    });
    pub(super) static DATE_TIME: Lazy<HostType> = Lazy::new(|| {
        HostType::builder("DateTime", TypeKind::Struct)
            .base(&OBJECT)
            .immutable()
            .build()
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_not_name() {
        let a = HostType::builder("Widget", TypeKind::Class).build();
        let b = HostType::builder("Widget", TypeKind::Class).build();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(HostType::int32(), HostType::int32());
    }

    #[test]
    fn test_assignability_walks_bases_and_interfaces() {
        let shape = HostType::builder("IShape", TypeKind::Interface).build();
        let base = HostType::builder("Base", TypeKind::Class)
            .base(&HostType::object())
            .implements(&shape)
            .build();
        let derived = HostType::builder("Derived", TypeKind::Class)
            .base(&base)
            .build();

        assert!(base.is_assignable_from(&derived));
        assert!(shape.is_assignable_from(&derived));
        assert!(HostType::object().is_assignable_from(&derived));
        assert!(!derived.is_assignable_from(&base));
        assert!(!HostType::int32().is_assignable_from(&HostType::int64()));
    }

    #[test]
    fn test_immutability_markers() {
        let color = HostType::builder("Color", TypeKind::Enum).build();
        let point = HostType::builder("Point", TypeKind::Struct).build();
        let frozen = HostType::builder("Frozen", TypeKind::Struct)
            .immutable()
            .build();
        assert!(color.is_immutable());
        assert!(HostType::int32().is_immutable());
        assert!(!point.is_immutable());
        assert!(frozen.is_immutable());
        assert!(point.is_value_type());
        assert!(!HostType::string().is_value_type());
    }
}
