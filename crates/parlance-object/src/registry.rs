//! The class registry.
//!
//! This module provides [`ClassRegistry`], the central store of every
//! class known to the runtime. Entries are stored in the runtime's own
//! [`HashTable`] keyed by the full ancestry name, with a secondary
//! leaf-id reverse index for lookups by bare class name.
//!
//! # Resolution at registration
//!
//! Registration is where all the expensive work happens, once per class:
//! the ancestry chain is validated against already-registered bases and
//! flattened into a vector of [`ClassId`]s, the base-first init chain and
//! its derived-first destroy mirror are assembled, and the
//! dispose/compare/print/copy slots are resolved most-derived-first
//! through the bases. Allocation, casting and dispatch afterwards never
//! parse a name or walk a base pointer.
//!
//! # Thread Safety
//!
//! The store sits behind the concurrency guard's read/write lock: lookups
//! (the overwhelmingly common operation) take the shared lock, while
//! register/unregister take the exclusive lock. A class is visible to
//! every thread's subsequent lookups as soon as `register` returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rustc_hash::FxHashMap;

use parlance_core::{HashTable, ReadWriteLock, Version};

use crate::class_id::{ClassId, leaf_of};
use crate::descriptor::{ClassDescriptor, CompareFn, CopyFn, DestroyFn, DisposeFn, InitFn, PrintFn};
use crate::error::ObjectError;

/// The implicit root of every ancestry chain.
///
/// Registered by [`ObjectSystem::new`](crate::ObjectSystem::new); classes
/// whose name carries no ancestry prefix derive from it automatically.
pub const ROOT_CLASS: &str = "Object";

/// Initial size exponent of the registry's backing table.
const REGISTRY_EXPONENT: u32 = 4;

/// Dispatch slots resolved most-derived-first at registration time.
#[derive(Default, Clone)]
pub(crate) struct Dispatch {
    pub(crate) dispose: Option<DisposeFn>,
    pub(crate) compare: Option<CompareFn>,
    pub(crate) print: Option<PrintFn>,
    pub(crate) copy: Option<CopyFn>,
}

/// A registered class: immutable metadata, resolved chains, and the live
/// instance count.
///
/// Owned by the registry from registration until unregistration; objects
/// keep their entry alive through an `Arc`, so an entry (and the code its
/// callbacks point into) never disappears under a live instance.
pub struct ClassEntry {
    name: String,
    leaf: String,
    id: ClassId,
    /// Leaf ids of the whole chain, base-first, self last. The implicit
    /// root is index 0 for every class except the root itself.
    ancestry: Vec<ClassId>,
    instance_size: usize,
    revision: Version,
    /// Own init slots per ancestry level, base-first.
    pub(crate) init_chain: Vec<Option<InitFn>>,
    /// Own destroy slots per ancestry level, base-first; run in reverse.
    pub(crate) destroy_chain: Vec<Option<DestroyFn>>,
    pub(crate) dispatch: Dispatch,
    pub(crate) live: AtomicUsize,
}

impl ClassEntry {
    /// Full ancestry name (the registry key).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Own (leaf) class name.
    pub fn leaf(&self) -> &str {
        &self.leaf
    }

    /// Identity of the leaf name.
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Leaf ids of the chain, base-first, self last.
    pub fn ancestry(&self) -> &[ClassId] {
        &self.ancestry
    }

    /// Declared instance byte size.
    pub fn instance_size(&self) -> usize {
        self.instance_size
    }

    /// Declared class revision.
    pub fn revision(&self) -> Version {
        self.revision
    }

    /// Number of live instances of exactly this class.
    pub fn live_instances(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Whether `id` names this class or one of its bases.
    pub fn is_a(&self, id: ClassId) -> bool {
        self.ancestry.contains(&id)
    }
}

impl std::fmt::Debug for ClassEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassEntry")
            .field("name", &self.name)
            .field("instance_size", &self.instance_size)
            .field("revision", &self.revision)
            .field("live", &self.live_instances())
            .finish()
    }
}

struct RegistryStore {
    /// Primary storage: full ancestry name -> entry.
    table: HashTable<Arc<ClassEntry>>,
    /// Reverse index: leaf id -> full ancestry name.
    leaves: FxHashMap<ClassId, String>,
}

impl RegistryStore {
    /// Resolve a caller-supplied name (full ancestry string or bare leaf
    /// name) to the full registry key.
    fn resolve_key(&self, name: &str) -> Option<String> {
        if self.table.contains_key(name.as_bytes()) {
            return Some(name.to_string());
        }
        self.leaves.get(&ClassId::of(leaf_of(name))).cloned()
    }
}

/// The class registry: register, unregister, and look up classes by name.
pub struct ClassRegistry {
    store: ReadWriteLock<RegistryStore>,
}

impl ClassRegistry {
    /// Create an empty registry.
    ///
    /// Most callers want [`ObjectSystem::new`](crate::ObjectSystem::new),
    /// which also registers the implicit [`ROOT_CLASS`].
    pub fn new() -> Self {
        Self {
            store: ReadWriteLock::new(RegistryStore {
                table: HashTable::new(REGISTRY_EXPONENT),
                leaves: FxHashMap::default(),
            }),
        }
    }

    /// Register a class.
    ///
    /// Validates the ancestry chain, resolves ids, chains and inherited
    /// dispatch slots, and publishes the entry. Fails with
    /// [`ObjectError::DuplicateClass`] if the name or leaf name is taken,
    /// or [`ObjectError::InvalidDescriptor`] if the name is malformed or a
    /// base is not registered.
    pub fn register(&self, descriptor: ClassDescriptor) -> Result<(), ObjectError> {
        let ClassDescriptor {
            name,
            instance_size,
            revision,
            lifecycle,
        } = descriptor;

        if name.is_empty() || name.split(':').any(str::is_empty) {
            return Err(ObjectError::InvalidDescriptor {
                name,
                detail: "ancestry name has an empty segment".to_string(),
            });
        }

        let leaf = leaf_of(&name).to_string();
        let id = ClassId::of(&leaf);

        let mut store = self.store.write();
        if store.leaves.contains_key(&id) || store.table.contains_key(name.as_bytes()) {
            return Err(ObjectError::DuplicateClass { name });
        }

        let base = match name.rsplit_once(':') {
            Some((prefix, _)) => Some(Self::base_entry(&store, &name, prefix)?),
            None if name == ROOT_CLASS => None,
            None => Some(Self::base_entry(&store, &name, ROOT_CLASS)?),
        };

        let mut ancestry = Vec::new();
        let mut init_chain = Vec::new();
        let mut destroy_chain = Vec::new();
        let mut dispatch = Dispatch::default();
        if let Some(base) = &base {
            ancestry.extend_from_slice(&base.ancestry);
            init_chain.extend(base.init_chain.iter().cloned());
            destroy_chain.extend(base.destroy_chain.iter().cloned());
            dispatch = base.dispatch.clone();
        }
        ancestry.push(id);
        init_chain.push(lifecycle.init);
        destroy_chain.push(lifecycle.destroy);
        dispatch.dispose = lifecycle.dispose.or(dispatch.dispose);
        dispatch.compare = lifecycle.compare.or(dispatch.compare);
        dispatch.print = lifecycle.print.or(dispatch.print);
        dispatch.copy = lifecycle.copy.or(dispatch.copy);

        let entry = Arc::new(ClassEntry {
            name: name.clone(),
            leaf,
            id,
            ancestry,
            instance_size,
            revision,
            init_chain,
            destroy_chain,
            dispatch,
            live: AtomicUsize::new(0),
        });

        store
            .table
            .insert(name.as_bytes(), entry)
            .map_err(|_| ObjectError::DuplicateClass { name: name.clone() })?;
        store.leaves.insert(id, name.clone());

        tracing::debug!(class = %name, "registered class");
        Ok(())
    }

    fn base_entry(
        store: &RegistryStore,
        name: &str,
        base_name: &str,
    ) -> Result<Arc<ClassEntry>, ObjectError> {
        store
            .table
            .get(base_name.as_bytes())
            .cloned()
            .ok_or_else(|| ObjectError::InvalidDescriptor {
                name: name.to_string(),
                detail: format!("base class '{base_name}' is not registered"),
            })
    }

    /// Unregister a class by full ancestry name or bare leaf name.
    ///
    /// Fails with [`ObjectError::ClassNotFound`] if absent and
    /// [`ObjectError::ClassInUse`] while instances are still alive: the
    /// destroy chain is code owned by whoever registered the class, so an
    /// entry must not leave the registry before its last instance does.
    pub fn unregister(&self, name: &str) -> Result<(), ObjectError> {
        let mut store = self.store.write();
        let key = store
            .resolve_key(name)
            .ok_or_else(|| ObjectError::ClassNotFound {
                name: name.to_string(),
            })?;

        let entry = store
            .table
            .get(key.as_bytes())
            .cloned()
            .ok_or_else(|| ObjectError::ClassNotFound {
                name: name.to_string(),
            })?;

        let live = entry.live_instances();
        if live > 0 {
            return Err(ObjectError::ClassInUse { name: key, live });
        }

        store
            .table
            .remove(key.as_bytes())
            .map_err(|_| ObjectError::ClassNotFound {
                name: name.to_string(),
            })?;
        store.leaves.remove(&entry.id());

        tracing::debug!(class = %key, "unregistered class");
        Ok(())
    }

    /// Look up a class by full ancestry name or bare leaf name.
    pub fn lookup(&self, name: &str) -> Option<Arc<ClassEntry>> {
        let store = self.store.read();
        let key = store.resolve_key(name)?;
        store.table.get(key.as_bytes()).cloned()
    }

    /// Whether a class with this name is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.store.read().resolve_key(name).is_some()
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.store.read().table.len()
    }

    /// Whether the registry holds no classes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable dump of every registered class plus backing table
    /// statistics. Diagnostics only.
    pub fn dump(&self) -> String {
        let store = self.store.read();
        let mut lines: Vec<String> = store
            .table
            .iter()
            .map(|(_, entry)| {
                format!(
                    "class '{}' ({} bytes, rev {}, {} live)",
                    entry.name(),
                    entry.instance_size(),
                    entry.revision(),
                    entry.live_instances(),
                )
            })
            .collect();
        lines.sort();
        lines.push(store.table.stats());
        lines.join("\n")
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}
