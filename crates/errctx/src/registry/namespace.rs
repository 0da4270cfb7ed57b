//! Namespaces: top-level groups of error classes.

use std::fmt;
use std::sync::Arc;

use crate::id::NamespaceId;
use crate::registry::{Class, Registry};

#[derive(Debug)]
pub(crate) struct NamespaceEntry {
    pub(crate) id: NamespaceId,
    pub(crate) name: Box<str>,
    pub(crate) builtin: bool,
}

/// Handle to a registered namespace, or the invalid sentinel.
///
/// Two handles are equal when they name the same id in the same registry.
#[derive(Clone)]
pub struct Namespace {
    entry: Option<Arc<NamespaceEntry>>,
    registry: Registry,
}

impl Namespace {
    pub(crate) fn new(entry: Option<Arc<NamespaceEntry>>, registry: Registry) -> Self {
        Self { entry, registry }
    }

    /// Namespace id, [`NamespaceId::INVALID`] for the sentinel
    #[must_use]
    pub fn id(&self) -> NamespaceId {
        self.entry.as_ref().map_or(NamespaceId::INVALID, |e| e.id)
    }

    /// Whether this handle names a registered namespace
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.entry.is_some()
    }

    /// Namespace name, empty for the sentinel
    #[must_use]
    pub fn name(&self) -> &str {
        self.entry.as_ref().map_or("", |e| &e.name)
    }

    /// Whether this is the registry's built-in `common` namespace
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.entry.as_ref().is_some_and(|e| e.builtin)
    }

    /// Registry this namespace belongs to
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Create a class in this namespace.
    ///
    /// Returns the invalid class when this namespace is invalid or the name
    /// is empty or dotted.
    pub fn create_class(&self, name: &str) -> Class {
        match &self.entry {
            Some(entry) => self.registry.register_class(name, entry.id, None),
            None => Class::invalid(self.registry.clone()),
        }
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id() && self.registry.ptr_eq(&other.registry)
    }
}

impl Eq for Namespace {}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
