//! Error classes and the constructors that start an error occurrence.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::context::ErrorContext;
use crate::field::FieldValue;
use crate::id::{ClassId, NamespaceId};
use crate::registry::{Namespace, Registry};

#[derive(Debug)]
pub(crate) struct ClassEntry {
    pub(crate) id: ClassId,
    pub(crate) parent: Option<ClassId>,
    pub(crate) namespace: NamespaceId,
    pub(crate) name: Box<str>,
    pub(crate) full_name: RwLock<Option<CachedName>>,
}

/// Full name together with the rename state it was computed under.
#[derive(Debug, Clone)]
pub(crate) struct CachedName {
    pub(crate) renamed: bool,
    pub(crate) name: Arc<str>,
}

/// Handle to a registered error class, or the invalid sentinel.
///
/// Two handles are equal when they name the same id in the same registry.
/// Cloning is cheap.
#[derive(Clone)]
pub struct Class {
    entry: Option<Arc<ClassEntry>>,
    registry: Registry,
}

impl Class {
    pub(crate) fn new(entry: Arc<ClassEntry>, registry: Registry) -> Self {
        Self {
            entry: Some(entry),
            registry,
        }
    }

    pub(crate) fn invalid(registry: Registry) -> Self {
        Self {
            entry: None,
            registry,
        }
    }

    pub(crate) fn entry(&self) -> Option<&Arc<ClassEntry>> {
        self.entry.as_ref()
    }

    /// Class id, [`ClassId::INVALID`] for the sentinel
    #[must_use]
    pub fn id(&self) -> ClassId {
        self.entry.as_ref().map_or(ClassId::INVALID, |e| e.id)
    }

    /// Whether this handle names a registered class
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.entry.is_some()
    }

    /// Short name, empty for the sentinel
    #[must_use]
    pub fn name(&self) -> &str {
        self.entry.as_ref().map_or("", |e| &e.name)
    }

    /// Dotted name including ancestors and, where applicable, the namespace
    #[must_use]
    pub fn full_name(&self) -> Arc<str> {
        match &self.entry {
            Some(entry) => self.registry.full_name(entry),
            None => Arc::from(""),
        }
    }

    /// Id of the owning namespace
    #[must_use]
    pub fn namespace_id(&self) -> NamespaceId {
        self.entry
            .as_ref()
            .map_or(NamespaceId::INVALID, |e| e.namespace)
    }

    /// Owning namespace
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        self.registry.lookup_namespace(self.namespace_id())
    }

    /// Direct parent, `None` for root classes and the sentinel
    #[must_use]
    pub fn parent(&self) -> Option<Class> {
        let parent = self.entry.as_ref()?.parent?;
        Some(self.registry.lookup_class(parent))
    }

    /// Registry this class belongs to
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Create a subclass sharing this class's namespace.
    ///
    /// Returns the invalid class when this class is invalid or the name is
    /// empty or dotted.
    pub fn create_subclass(&self, name: &str) -> Class {
        match &self.entry {
            Some(entry) => self
                .registry
                .register_class(name, entry.namespace, Some(entry.id)),
            None => Class::invalid(self.registry.clone()),
        }
    }

    /// Whether this class equals `ancestor` or descends from it
    #[must_use]
    pub fn is_subclass_of(&self, ancestor: &Class) -> bool {
        self.is_valid()
            && self.registry.ptr_eq(&ancestor.registry)
            && self
                .registry
                .descends_from_any(self.id(), std::iter::once(ancestor.id()))
    }

    /// Start an error occurrence of this class with a captured stack.
    ///
    /// Returns an invalid context when this class is invalid.
    #[inline(never)]
    pub fn new_error(&self, message: impl AsRef<str>) -> ErrorContext {
        ErrorContext::create(self, message.as_ref(), None, false)
    }

    /// [`Class::new_error`] with fields attached to frame 0
    #[inline(never)]
    pub fn new_error_with<K, V, I>(&self, message: impl AsRef<str>, fields: I) -> ErrorContext
    where
        K: Into<Cow<'static, str>>,
        V: Into<FieldValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        ErrorContext::create(self, message.as_ref(), None, false).add_fields(fields)
    }

    /// Start an error occurrence that wraps a foreign error.
    ///
    /// Frame 0 gets `"message: cause"` (or just the cause for an empty
    /// message). A cause that renders to empty text yields an invalid context.
    #[inline(never)]
    pub fn wrap(&self, cause: impl fmt::Display, message: impl AsRef<str>) -> ErrorContext {
        let cause = cause.to_string();
        ErrorContext::create(self, message.as_ref(), Some(&cause), false)
    }

    /// [`Class::wrap`] with fields attached to frame 0
    #[inline(never)]
    pub fn wrap_with<K, V, I>(
        &self,
        cause: impl fmt::Display,
        message: impl AsRef<str>,
        fields: I,
    ) -> ErrorContext
    where
        K: Into<Cow<'static, str>>,
        V: Into<FieldValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let cause = cause.to_string();
        ErrorContext::create(self, message.as_ref(), Some(&cause), false).add_fields(fields)
    }

    /// [`Class::new_error`] without stack capture
    #[inline(never)]
    pub fn new_light(&self, message: impl AsRef<str>) -> ErrorContext {
        ErrorContext::create(self, message.as_ref(), None, true)
    }

    /// [`Class::wrap`] without stack capture
    #[inline(never)]
    pub fn wrap_light(&self, cause: impl fmt::Display, message: impl AsRef<str>) -> ErrorContext {
        let cause = cause.to_string();
        ErrorContext::create(self, message.as_ref(), Some(&cause), true)
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id() && self.registry.ptr_eq(&other.registry)
    }
}

impl Eq for Class {}

// Equal handles share an id, so hashing the id alone stays consistent with `Eq`.
impl std::hash::Hash for Class {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("id", &self.id())
            .field("name", &self.full_name())
            .finish()
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}
