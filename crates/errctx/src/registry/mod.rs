//! Namespace and class registry.
//!
//! A [`Registry`] hands out namespace and class ids from lock-free counters and
//! owns the instance pool and the occurrence id source used by every error
//! created from its classes. It is a cheap-to-clone handle; pass it wherever
//! classes are defined. [`Registry::global`] offers a process-wide default.
//!
//! Every registry starts with the built-in `common` namespace holding the
//! [`Builtin`] classes. Classes of `common` render without a namespace prefix
//! until the first user namespace is created; at that point all of their
//! full names are rebuilt once with the `common.` prefix.

mod class;
mod namespace;
mod table;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};

pub use class::Class;
pub use namespace::Namespace;
pub use table::DIRECT_SLOTS;

pub(crate) use class::ClassEntry;
use class::CachedName;
use namespace::NamespaceEntry;
use table::IdTable;

use crate::config::Config;
use crate::error::Result;
use crate::id::{ClassId, NamespaceId, OccurrenceId, OccurrenceIdSource, UlidSource};
use crate::pool::{Pool, PoolStats};

/// Name of the namespace every registry starts with
pub const COMMON_NAMESPACE: &str = "common";

/// Classes pre-registered in the `common` namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// A caller passed a value outside the accepted domain
    IllegalArgument,
    /// An operation was invoked in a state that does not allow it
    IllegalState,
    /// A code path is not implemented
    NotImplemented,
    /// An invariant broke inside the program
    Internal,
    /// An operation ran out of time
    Timeout,
    /// A foreign error crossed into this program
    External,
}

impl Builtin {
    /// Every builtin, in registration order
    pub const ALL: [Self; 6] = [
        Self::IllegalArgument,
        Self::IllegalState,
        Self::NotImplemented,
        Self::Internal,
        Self::Timeout,
        Self::External,
    ];

    /// Class short name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::IllegalArgument => "IllegalArgument",
            Self::IllegalState => "IllegalState",
            Self::NotImplemented => "NotImplemented",
            Self::Internal => "Internal",
            Self::Timeout => "Timeout",
            Self::External => "External",
        }
    }

    // Builtins are the first classes of every registry.
    const fn class_id(self) -> ClassId {
        ClassId::from_raw(self as u32 + 1)
    }
}

struct RegistryInner {
    namespaces: IdTable<NamespaceEntry>,
    classes: IdTable<ClassEntry>,
    common: NamespaceId,
    renamed: AtomicBool,
    rename_lock: Mutex<()>,
    pool: Pool,
    ids: Box<dyn OccurrenceIdSource>,
    config: Config,
}

/// Namespace/class registry with its instance pool.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Registry with the default configuration and ULID occurrence ids
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(Config::default(), Box::new(UlidSource::new()))
    }

    /// Start building a registry with a custom configuration or id source
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Process-wide default registry, built on first use
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    fn from_parts(config: Config, ids: Box<dyn OccurrenceIdSource>) -> Self {
        let namespaces = IdTable::new();
        let common = match namespaces.next_id() {
            Some(raw) => NamespaceId::from_raw(raw),
            None => NamespaceId::INVALID,
        };
        namespaces.insert(
            common.get(),
            Arc::new(NamespaceEntry {
                id: common,
                name: COMMON_NAMESPACE.into(),
                builtin: true,
            }),
        );

        let registry = Self {
            inner: Arc::new(RegistryInner {
                namespaces,
                classes: IdTable::new(),
                common,
                renamed: AtomicBool::new(false),
                rename_lock: Mutex::new(()),
                pool: Pool::new(&config),
                ids,
                config,
            }),
        };
        for builtin in Builtin::ALL {
            let class = registry.register_class(builtin.name(), common, None);
            debug_assert_eq!(class.id(), builtin.class_id());
        }
        registry
    }

    /// Create a user namespace.
    ///
    /// The first call on a registry rebuilds the full names of `common`
    /// classes. Returns the invalid namespace for empty or dotted names.
    pub fn create_namespace(&self, name: &str) -> Namespace {
        let Some(name) = valid_name(name) else {
            tracing::debug!(name, "rejected namespace name");
            return Namespace::new(None, self.clone());
        };
        let Some(raw) = self.inner.namespaces.next_id() else {
            tracing::warn!(name, "namespace id space exhausted");
            return Namespace::new(None, self.clone());
        };

        let entry = Arc::new(NamespaceEntry {
            id: NamespaceId::from_raw(raw),
            name: name.into(),
            builtin: false,
        });
        self.inner.namespaces.insert(raw, Arc::clone(&entry));

        if self
            .inner
            .renamed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.rebuild_common_names();
        }

        Namespace::new(Some(entry), self.clone())
    }

    /// Create a class in the `common` namespace
    pub fn create_class(&self, name: &str) -> Class {
        self.register_class(name, self.inner.common, None)
    }

    /// The built-in `common` namespace
    #[must_use]
    pub fn common(&self) -> Namespace {
        self.lookup_namespace(self.inner.common)
    }

    /// A pre-registered class of the `common` namespace
    #[must_use]
    pub fn builtin(&self, builtin: Builtin) -> Class {
        self.lookup_class(builtin.class_id())
    }

    /// Class registered under `id`.
    ///
    /// Callers are expected to pass ids obtained from this registry; any other
    /// id yields the invalid class.
    #[must_use]
    pub fn lookup_class(&self, id: ClassId) -> Class {
        match id.is_valid().then(|| self.inner.classes.get(id.get())).flatten() {
            Some(entry) => Class::new(entry, self.clone()),
            None => Class::invalid(self.clone()),
        }
    }

    /// Namespace registered under `id`; the invalid namespace otherwise
    #[must_use]
    pub fn lookup_namespace(&self, id: NamespaceId) -> Namespace {
        let entry = id
            .is_valid()
            .then(|| self.inner.namespaces.get(id.get()))
            .flatten();
        Namespace::new(entry, self.clone())
    }

    /// Whether the first user namespace has been created
    #[must_use]
    pub fn namespaces_renamed(&self) -> bool {
        self.inner.renamed.load(Ordering::Acquire)
    }

    /// Namespaces registered so far, `common` included
    #[must_use]
    pub fn namespace_count(&self) -> usize {
        self.inner.namespaces.len()
    }

    /// Classes registered so far, builtins included
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.inner.classes.len()
    }

    /// Counters of the instance pool
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    /// Whether both handles refer to the same registry.
    ///
    /// Ids are only unique within one registry; handles from different
    /// registries never compare equal.
    #[must_use]
    pub fn ptr_eq(&self, other: &Registry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Configuration this registry was built with
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn pool(&self) -> &Pool {
        &self.inner.pool
    }

    pub(crate) fn mint_occurrence_id(&self) -> OccurrenceId {
        self.inner.ids.next_id()
    }

    pub(crate) fn register_class(
        &self,
        name: &str,
        namespace: NamespaceId,
        parent: Option<ClassId>,
    ) -> Class {
        let Some(name) = valid_name(name) else {
            tracing::debug!(name, "rejected class name");
            return Class::invalid(self.clone());
        };
        let Some(raw) = self.inner.classes.next_id() else {
            tracing::warn!(name, "class id space exhausted");
            return Class::invalid(self.clone());
        };

        let entry = Arc::new(ClassEntry {
            id: ClassId::from_raw(raw),
            parent,
            namespace,
            name: name.into(),
            full_name: RwLock::new(None),
        });
        self.inner.classes.insert(raw, Arc::clone(&entry));
        Class::new(entry, self.clone())
    }

    /// Whether `class` or one of its ancestors is among `candidates`.
    ///
    /// The whole ancestor walk runs under one read-lock span of the class table.
    pub(crate) fn descends_from_any<I>(&self, class: ClassId, candidates: I) -> bool
    where
        I: IntoIterator<Item = ClassId>,
    {
        let candidates: Vec<ClassId> = candidates.into_iter().filter(|id| id.is_valid()).collect();
        if candidates.is_empty() || !class.is_valid() {
            return false;
        }

        let view = self.inner.classes.read();
        let mut current = Some(class);
        while let Some(id) = current {
            if candidates.contains(&id) {
                return true;
            }
            current = view.get(id.get()).and_then(|entry| entry.parent);
        }
        false
    }

    pub(crate) fn full_name(&self, entry: &ClassEntry) -> Arc<str> {
        let renamed = self.inner.renamed.load(Ordering::Acquire);
        if let Some(cached) = entry.full_name.read().as_ref()
            && (cached.renamed || !renamed)
        {
            return Arc::clone(&cached.name);
        }

        let name: Arc<str> = self.compose_full_name(entry, renamed).into();
        let mut slot = entry.full_name.write();
        match slot.as_ref() {
            // A concurrent rebuild already stored the prefixed form.
            Some(cached) if cached.renamed && !renamed => Arc::clone(&cached.name),
            _ => {
                *slot = Some(CachedName {
                    renamed,
                    name: Arc::clone(&name),
                });
                name
            }
        }
    }

    fn compose_full_name(&self, entry: &ClassEntry, renamed: bool) -> String {
        let mut parts: Vec<Box<str>> = vec![entry.name.clone()];
        {
            let view = self.inner.classes.read();
            let mut parent = entry.parent;
            while let Some(id) = parent {
                let Some(ancestor) = view.get(id.get()) else {
                    break;
                };
                parts.push(ancestor.name.clone());
                parent = ancestor.parent;
            }
        }

        let prefixed = entry.namespace != self.inner.common || renamed;
        if prefixed && let Some(namespace) = self.inner.namespaces.get(entry.namespace.get()) {
            parts.push(namespace.name.clone());
        }
        parts.reverse();
        parts.join(".")
    }

    fn rebuild_common_names(&self) {
        let _guard = self.inner.rename_lock.lock();
        let mut rebuilt = 0usize;
        for entry in self.inner.classes.snapshot() {
            if entry.namespace != self.inner.common {
                continue;
            }
            let name: Arc<str> = self.compose_full_name(&entry, true).into();
            *entry.full_name.write() = Some(CachedName {
                renamed: true,
                name,
            });
            rebuilt += 1;
        }
        tracing::info!(
            classes = rebuilt,
            namespace = COMMON_NAMESPACE,
            "first user namespace created; rebuilt common class names"
        );
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("namespaces", &self.namespace_count())
            .field("classes", &self.class_count())
            .field("renamed", &self.namespaces_renamed())
            .field("pool", &self.pool_stats())
            .finish()
    }
}

/// Builder for [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    config: Option<Config>,
    ids: Option<Box<dyn OccurrenceIdSource>>,
}

impl RegistryBuilder {
    /// Use `config` instead of [`Config::default`]
    #[must_use = "builder methods must be chained or built"]
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Mint occurrence ids from `source` instead of the ULID generator
    #[must_use = "builder methods must be chained or built"]
    pub fn id_source<S: OccurrenceIdSource + 'static>(mut self, source: S) -> Self {
        self.ids = Some(Box::new(source));
        self
    }

    /// Validate the configuration and build the registry.
    pub fn build(self) -> Result<Registry> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let ids = self.ids.unwrap_or_else(|| Box::new(UlidSource::new()));
        Ok(Registry::from_parts(config, ids))
    }
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("config", &self.config)
            .field("custom_ids", &self.ids.is_some())
            .finish()
    }
}

fn valid_name(name: &str) -> Option<&str> {
    let name = name.trim();
    (!name.is_empty() && !name.contains('.')).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtins_exist_in_common() {
        let registry = Registry::new();
        for builtin in Builtin::ALL {
            let class = registry.builtin(builtin);
            assert!(class.is_valid());
            assert_eq!(class.name(), builtin.name());
            assert_eq!(class.namespace(), registry.common());
        }
        assert_eq!(registry.class_count(), Builtin::ALL.len());
        assert_eq!(registry.namespace_count(), 1);
    }

    #[test]
    fn subclass_names_chain() {
        let registry = Registry::new();
        let storage = registry.create_namespace("storage");
        let io = storage.create_class("Io");
        let disk = io.create_subclass("Disk");
        let full = disk.create_subclass("Full");

        assert_eq!(&*full.full_name(), "storage.Io.Disk.Full");
        assert_eq!(full.namespace_id(), storage.id());
        assert_eq!(full.parent(), Some(disk.clone()));
        assert!(full.is_subclass_of(&io));
        assert!(!io.is_subclass_of(&full));
    }

    #[test]
    fn common_names_rebuilt_once() {
        let registry = Registry::new();
        let early = registry.create_class("Early");
        let early_child = early.create_subclass("Child");
        assert_eq!(&*early.full_name(), "Early");
        assert_eq!(&*early_child.full_name(), "Early.Child");
        assert!(!registry.namespaces_renamed());

        let _app = registry.create_namespace("app");
        assert!(registry.namespaces_renamed());
        assert_eq!(&*early.full_name(), "common.Early");
        assert_eq!(&*early_child.full_name(), "common.Early.Child");

        let _other = registry.create_namespace("other");
        let late = registry.create_class("Late");
        assert_eq!(&*late.full_name(), "common.Late");
        assert_eq!(&*early.full_name(), "common.Early");
    }

    #[test]
    fn invalid_inputs_yield_sentinels() {
        let registry = Registry::new();
        assert!(!registry.create_namespace("").is_valid());
        assert!(!registry.create_namespace("a.b").is_valid());
        assert!(!registry.namespaces_renamed(), "rejected names do not trigger the rename");

        let invalid_ns = registry.lookup_namespace(NamespaceId::from_raw(999));
        assert!(!invalid_ns.is_valid());
        let class = invalid_ns.create_class("Orphan");
        assert!(!class.is_valid());
        assert_eq!(class.id(), ClassId::INVALID);
        assert!(!class.create_subclass("Deeper").is_valid());
        assert_eq!(&*class.full_name(), "");
        assert!(!registry.lookup_class(ClassId::INVALID).is_valid());
        assert!(!registry.lookup_class(ClassId::from_raw(0)).is_valid());
    }

    #[test]
    fn lookup_returns_equal_handles() {
        let registry = Registry::new();
        let ns = registry.create_namespace("billing");
        let class = ns.create_class("Declined");
        assert_eq!(registry.lookup_class(class.id()), class);
        assert_eq!(registry.lookup_namespace(ns.id()), ns);
        assert_eq!(registry.lookup_class(class.id()).name(), "Declined");
    }

    #[test]
    fn overflow_ids_resolve() {
        let registry = Registry::new();
        let ns = registry.create_namespace("bulk");
        let classes: Vec<Class> = (0..DIRECT_SLOTS + 10)
            .map(|i| ns.create_class(&format!("C{i}")))
            .collect();
        let last = classes.last().unwrap();
        assert!(last.id().get() as usize > DIRECT_SLOTS);
        assert_eq!(registry.lookup_class(last.id()).name(), last.name());

        let child = last.create_subclass("Leaf");
        assert!(!child.is_subclass_of(&classes[0]));
        assert!(child.is_subclass_of(last));
    }

    #[test]
    fn builder_rejects_invalid_config() {
        let result = Registry::builder()
            .config(Config {
                max_idle: 0,
                prewarm: 0,
                ..Config::default()
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn separate_registries_are_isolated() {
        let a = Registry::new();
        let b = Registry::new();
        a.create_namespace("only_in_a");
        assert!(a.namespaces_renamed());
        assert!(!b.namespaces_renamed());
        assert_eq!(b.namespace_count(), 1);
    }
}
