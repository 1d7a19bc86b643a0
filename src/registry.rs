//! Group-lifetime object registry.
//!
//! The registry creates protocol entities on behalf of test cases and files them
//! under caller-chosen lookup names so later tests in the same group can find
//! them again. It is the only path by which one test sees what another built.
//!
//! - **Allocate**: build through the factory and register under a unique name
//! - **Lookup**: fetch the shared handle another test registered
//! - **Release**: drop the registry's reference, singly or in bulk
//!
//! The registry co-owns every entity it hands out. Releasing a name only drops
//! the registry's reference; an entity a test still holds stays alive until that
//! test lets go.
//!
//! # Example Usage
//!
//! ```rust
//! use nvme_rsrc::{DeviceContext, EntityKind, ResourceRegistry, ADMIN_QUEUE_KINDS};
//!
//! # fn main() -> Result<(), nvme_rsrc::RsrcError> {
//! let mut registry = ResourceRegistry::new(DeviceContext::from_raw_fd(3));
//!
//! // Group setup: the admin pair and one IO queue pair
//! registry.allocate(EntityKind::Asq, "asq")?;
//! registry.allocate(EntityKind::Acq, "acq")?;
//! let iosq = registry.allocate(EntityKind::Iosq, nvme_rsrc::IOSQ_GROUP_ID)?;
//! if let Some(mut q) = iosq.queue() {
//!     q.init_io_sq(1, 64, 1, 0)?;
//! }
//!
//! // A later test in the same group finds the queue by name
//! let same = registry.lookup_kind(nvme_rsrc::IOSQ_GROUP_ID, EntityKind::Iosq)?;
//! assert_eq!(same.id(), iosq.id());
//!
//! // Group end: keep the admin queues, drop everything else
//! assert_eq!(registry.release_all_except(&ADMIN_QUEUE_KINDS), 1);
//! # Ok(())
//! # }
//! ```

use crate::config::{RegistryConfig, TeardownPolicy};
use crate::device::DeviceContext;
use crate::entity::{Entity, EntityKind, SharedEntity, ADMIN_QUEUE_KINDS};
use crate::error::{RsrcError, RsrcResult};
use crate::factory;
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Well-known Lookup Names
// =============================================================================

/// Lookup name of the group's admin submission queue.
pub const ASQ_GROUP_ID: &str = "ASQ";
/// Lookup name of the group's admin completion queue.
pub const ACQ_GROUP_ID: &str = "ACQ";
/// Lookup name of the group's IO submission queue.
pub const IOSQ_GROUP_ID: &str = "IOSQ";
/// Lookup name of the group's IO completion queue.
pub const IOCQ_GROUP_ID: &str = "IOCQ";

// =============================================================================
// Resource Registry
// =============================================================================

/// Name to entity table with group lifetime.
///
/// One instance exists per test group. It is not meant for concurrent mutation;
/// wrap it in [`SharedRegistry`] when tests run on several threads.
#[derive(Debug)]
pub struct ResourceRegistry {
    /// Registered entities by lookup name
    objects: HashMap<String, SharedEntity>,
    /// Forwarded to the factory for kinds that drive the device
    device: DeviceContext,
    /// Kinds kept alive by [`TeardownPolicy::KeepProtected`]
    protected_kinds: Vec<EntityKind>,
    /// Metadata buffer size for the group, set once the namespace format is known
    meta_alloc_size: Option<u32>,
}

impl ResourceRegistry {
    /// Create an empty registry bound to `device`.
    pub fn new(device: DeviceContext) -> Self {
        Self {
            objects: HashMap::new(),
            device,
            protected_kinds: ADMIN_QUEUE_KINDS.to_vec(),
            meta_alloc_size: None,
        }
    }

    /// Create a registry that can only build device-independent entities.
    pub fn without_device() -> Self {
        Self::new(DeviceContext::none())
    }

    /// Create a registry from the `[registry]` configuration section.
    ///
    /// # Errors
    /// - `DuplicateProtectedKind` if a protected kind is listed twice
    /// - `InvalidMetaSize` if the configured metadata size is invalid
    pub fn from_config(config: &RegistryConfig, device: DeviceContext) -> RsrcResult<Self> {
        let mut registry = Self::new(device);
        registry.protected_kinds = Vec::with_capacity(config.protected_kinds.len());
        for &kind in &config.protected_kinds {
            if registry.protected_kinds.contains(&kind) {
                debug!(%kind, "Protected kind listed more than once");
                return Err(RsrcError::DuplicateProtectedKind(kind));
            }
            registry.protected_kinds.push(kind);
        }
        if let Some(size) = config.meta_alloc_size {
            registry.set_meta_alloc_size(size)?;
        }
        Ok(registry)
    }

    /// Device context forwarded to the factory.
    pub fn device(&self) -> DeviceContext {
        self.device
    }

    // =========================================================================
    // Allocation and Lookup
    // =========================================================================

    /// Build a new entity of `kind` and register it under `name`.
    ///
    /// On success the registry and the caller share the returned handle. On any
    /// failure the table is exactly as it was before the call; in particular a
    /// colliding name leaves the existing entry untouched and the freshly built
    /// entity is dropped.
    ///
    /// # Errors
    /// - `InvalidName` if `name` is empty
    /// - `AllocationFailed` if the factory cannot build `kind`
    /// - `NameCollision` if `name` is already registered
    pub fn allocate(&mut self, kind: EntityKind, name: &str) -> RsrcResult<SharedEntity> {
        if name.is_empty() {
            debug!(%kind, "Parameter lookup name has no value");
            return Err(RsrcError::InvalidName);
        }

        let entity = factory::create(kind, self.device)?;
        self.insert(name, entity)
    }

    /// Same as [`allocate`](Self::allocate) but selects the kind by raw tag.
    ///
    /// # Errors
    /// `UnknownKind` for a tag outside the enumeration, otherwise as `allocate`.
    pub fn allocate_tag(&mut self, tag: u8, name: &str) -> RsrcResult<SharedEntity> {
        if name.is_empty() {
            debug!(tag, "Parameter lookup name has no value");
            return Err(RsrcError::InvalidName);
        }

        let entity = factory::create_from_tag(tag, self.device)?;
        self.insert(name, entity)
    }

    fn insert(&mut self, name: &str, entity: SharedEntity) -> RsrcResult<SharedEntity> {
        match self.objects.entry(name.to_string()) {
            Entry::Occupied(existing) => {
                debug!(
                    name,
                    kind = %entity.kind(),
                    existing = %existing.get().kind(),
                    "Created object with collision in lookup name"
                );
                Err(RsrcError::NameCollision(name.to_string()))
            }
            Entry::Vacant(slot) => Ok(Arc::clone(slot.insert(entity))),
        }
    }

    /// Fetch the entity registered under `name`.
    ///
    /// Every caller gets a handle to the same entity. `NotFound` is an ordinary
    /// outcome when looking for something an earlier test may not have built.
    pub fn lookup(&self, name: &str) -> RsrcResult<SharedEntity> {
        match self.objects.get(name) {
            Some(entity) => Ok(Arc::clone(entity)),
            None => {
                debug!(name, "Object lookup name was not found");
                Err(RsrcError::NotFound(name.to_string()))
            }
        }
    }

    /// Fetch the entity under `name`, requiring it to be of `expected` kind.
    pub fn lookup_kind(&self, name: &str, expected: EntityKind) -> RsrcResult<SharedEntity> {
        let entity = self.lookup(name)?;
        if entity.kind() != expected {
            return Err(RsrcError::KindMismatch {
                name: name.to_string(),
                expected,
                actual: entity.kind(),
            });
        }
        Ok(entity)
    }

    // =========================================================================
    // Release
    // =========================================================================

    /// Drop the registry's reference to `name`.
    ///
    /// The entity is destroyed only if no test still holds it.
    pub fn release(&mut self, name: &str) -> RsrcResult<()> {
        match self.objects.remove(name) {
            Some(entity) => {
                debug!(name, kind = %entity.kind(), "Object released from group");
                Ok(())
            }
            None => {
                debug!(name, "Cannot free obj, name was not found");
                Err(RsrcError::NotFound(name.to_string()))
            }
        }
    }

    /// Drop every entry. Returns how many were removed.
    pub fn release_all(&mut self) -> usize {
        let released = self.objects.len();
        info!(released, "Group level resources are being freed");
        self.objects.clear();
        released
    }

    /// Drop every entry whose kind is not in `protected`. Returns how many were removed.
    pub fn release_all_except(&mut self, protected: &[EntityKind]) -> usize {
        let before = self.objects.len();
        self.objects
            .retain(|_, entity| protected.contains(&entity.kind()));
        let released = before - self.objects.len();
        info!(
            released,
            remaining = self.objects.len(),
            "Group level resources are being freed"
        );
        released
    }

    /// Tear the group down according to `policy`.
    pub fn end_group(&mut self, policy: TeardownPolicy) -> usize {
        match policy {
            TeardownPolicy::ReleaseAll => self.release_all(),
            TeardownPolicy::KeepProtected => {
                let protected = self.protected_kinds.clone();
                self.release_all_except(&protected)
            }
        }
    }

    /// Kinds kept by [`TeardownPolicy::KeepProtected`].
    pub fn protected_kinds(&self) -> &[EntityKind] {
        &self.protected_kinds
    }

    // =========================================================================
    // Metadata Allocation
    // =========================================================================

    /// Record the metadata buffer size used by this group's IO commands.
    pub fn set_meta_alloc_size(&mut self, size: u32) -> RsrcResult<()> {
        if size == 0 || size % 4 != 0 {
            debug!(size, "Rejected metadata allocation size");
            return Err(RsrcError::InvalidMetaSize(size));
        }
        self.meta_alloc_size = Some(size);
        Ok(())
    }

    /// Metadata buffer size, if one was recorded.
    pub fn meta_alloc_size(&self) -> Option<u32> {
        self.meta_alloc_size
    }

    /// Give a read or write command a metadata buffer of the group's size.
    pub fn alloc_meta_buffer(&self, entity: &Entity) -> RsrcResult<()> {
        let size = self.meta_alloc_size.ok_or(RsrcError::InvalidMetaSize(0))?;
        let kind = entity.kind();
        let mut cmd = entity.command().ok_or(RsrcError::UnsupportedField {
            kind,
            field: "meta_buffer",
        })?;
        cmd.alloc_meta_buffer(size)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// True when `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.objects.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of every entry of `kind`, sorted.
    pub fn entries_of_kind(&self, kind: EntityKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .objects
            .iter()
            .filter(|(_, entity)| entity.kind() == kind)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::without_device()
    }
}

impl Drop for ResourceRegistry {
    fn drop(&mut self) {
        if !self.objects.is_empty() {
            debug!(remaining = self.objects.len(), "Registry dropped with live entries");
        }
    }
}

// =============================================================================
// Shared Registry
// =============================================================================

/// Cloneable, lock-guarded registry for groups whose tests run concurrently.
///
/// Lookups take the read lock and may overlap each other; every mutation takes
/// the write lock.
#[derive(Debug, Clone)]
pub struct SharedRegistry {
    inner: Arc<RwLock<ResourceRegistry>>,
}

impl SharedRegistry {
    /// Wrap `registry` for shared use.
    pub fn new(registry: ResourceRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(registry)),
        }
    }

    /// See [`ResourceRegistry::allocate`].
    pub fn allocate(&self, kind: EntityKind, name: &str) -> RsrcResult<SharedEntity> {
        self.inner.write().allocate(kind, name)
    }

    /// See [`ResourceRegistry::allocate_tag`].
    pub fn allocate_tag(&self, tag: u8, name: &str) -> RsrcResult<SharedEntity> {
        self.inner.write().allocate_tag(tag, name)
    }

    /// See [`ResourceRegistry::lookup`].
    pub fn lookup(&self, name: &str) -> RsrcResult<SharedEntity> {
        self.inner.read().lookup(name)
    }

    /// See [`ResourceRegistry::lookup_kind`].
    pub fn lookup_kind(&self, name: &str, expected: EntityKind) -> RsrcResult<SharedEntity> {
        self.inner.read().lookup_kind(name, expected)
    }

    /// See [`ResourceRegistry::release`].
    pub fn release(&self, name: &str) -> RsrcResult<()> {
        self.inner.write().release(name)
    }

    /// See [`ResourceRegistry::release_all`].
    pub fn release_all(&self) -> usize {
        self.inner.write().release_all()
    }

    /// See [`ResourceRegistry::release_all_except`].
    pub fn release_all_except(&self, protected: &[EntityKind]) -> usize {
        self.inner.write().release_all_except(protected)
    }

    /// See [`ResourceRegistry::end_group`].
    pub fn end_group(&self, policy: TeardownPolicy) -> usize {
        self.inner.write().end_group(policy)
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Run `f` with exclusive access, for multi-step updates that must not interleave.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut ResourceRegistry) -> R) -> R {
        f(&mut self.inner.write())
    }
}

impl From<ResourceRegistry> for SharedRegistry {
    fn from(registry: ResourceRegistry) -> Self {
        Self::new(registry)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn device_registry() -> ResourceRegistry {
        ResourceRegistry::new(DeviceContext::from_raw_fd(3))
    }

    #[test]
    fn test_allocate_then_lookup_shares_entity() {
        let mut registry = device_registry();
        let created = registry.allocate(EntityKind::Iocq, IOCQ_GROUP_ID).unwrap();
        let found = registry.lookup(IOCQ_GROUP_ID).unwrap();

        assert!(Arc::ptr_eq(&created, &found));
        assert_eq!(found.kind(), EntityKind::Iocq);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_collision_keeps_original() {
        let mut registry = device_registry();
        let original = registry.allocate(EntityKind::Iosq, "q").unwrap();

        let err = registry.allocate(EntityKind::Read, "q").unwrap_err();
        assert_eq!(err, RsrcError::NameCollision("q".into()));

        let found = registry.lookup("q").unwrap();
        assert_eq!(found.id(), original.id());
        assert_eq!(found.kind(), EntityKind::Iosq);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_name_rejected_before_factory() {
        let mut registry = ResourceRegistry::without_device();
        // Would fail allocation too, but the name is checked first
        assert_eq!(
            registry.allocate(EntityKind::Iosq, "").unwrap_err(),
            RsrcError::InvalidName
        );
        assert_eq!(registry.allocate_tag(0xEE, "").unwrap_err(), RsrcError::InvalidName);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_allocation_failure_leaves_table_unchanged() {
        let mut registry = ResourceRegistry::without_device();
        registry.allocate(EntityKind::MemBuffer, "buf").unwrap();

        let err = registry.allocate(EntityKind::Identify, "id").unwrap_err();
        assert!(matches!(err, RsrcError::AllocationFailed { .. }));
        assert_eq!(registry.names(), vec!["buf".to_string()]);
    }

    #[test]
    fn test_unknown_tag_leaves_table_unchanged() {
        let mut registry = device_registry();
        assert_eq!(
            registry.allocate_tag(0x7F, "x").unwrap_err(),
            RsrcError::UnknownKind(0x7F)
        );
        assert!(!registry.contains("x"));

        let iocq = registry.allocate_tag(EntityKind::Iocq.tag(), "x").unwrap();
        assert_eq!(iocq.kind(), EntityKind::Iocq);
    }

    #[test]
    fn test_lookup_kind() {
        let mut registry = device_registry();
        registry.allocate(EntityKind::Iosq, IOSQ_GROUP_ID).unwrap();

        assert!(registry.lookup_kind(IOSQ_GROUP_ID, EntityKind::Iosq).is_ok());
        assert_eq!(
            registry
                .lookup_kind(IOSQ_GROUP_ID, EntityKind::Iocq)
                .unwrap_err(),
            RsrcError::KindMismatch {
                name: IOSQ_GROUP_ID.into(),
                expected: EntityKind::Iocq,
                actual: EntityKind::Iosq,
            }
        );
        assert_eq!(
            registry.lookup_kind("missing", EntityKind::Iosq).unwrap_err(),
            RsrcError::NotFound("missing".into())
        );
    }

    #[test]
    fn test_release_is_not_found_the_second_time() {
        let mut registry = device_registry();
        registry.allocate(EntityKind::Write, "w").unwrap();
        registry.allocate(EntityKind::Read, "r").unwrap();

        assert!(registry.release("w").is_ok());
        assert_eq!(registry.release("w"), Err(RsrcError::NotFound("w".into())));
        assert_eq!(registry.release("missing"), Err(RsrcError::NotFound("missing".into())));
        assert_eq!(registry.names(), vec!["r".to_string()]);
    }

    #[test]
    fn test_release_all_counts_entries() {
        let mut registry = device_registry();
        for name in ["a", "b", "c"] {
            registry.allocate(EntityKind::MemBuffer, name).unwrap();
        }
        assert_eq!(registry.release_all(), 3);
        assert!(registry.is_empty());
        assert_eq!(registry.release_all(), 0);
    }

    #[test]
    fn test_release_all_except_admin_queues() {
        let mut registry = device_registry();
        registry.allocate(EntityKind::Asq, ASQ_GROUP_ID).unwrap();
        registry.allocate(EntityKind::Acq, ACQ_GROUP_ID).unwrap();
        registry.allocate(EntityKind::Iosq, IOSQ_GROUP_ID).unwrap();
        registry.allocate(EntityKind::Iocq, IOCQ_GROUP_ID).unwrap();
        registry.allocate(EntityKind::Read, "read").unwrap();

        assert_eq!(registry.release_all_except(&ADMIN_QUEUE_KINDS), 3);
        assert_eq!(
            registry.names(),
            vec![ACQ_GROUP_ID.to_string(), ASQ_GROUP_ID.to_string()]
        );
    }

    #[test]
    fn test_release_all_except_nothing_protected() {
        let mut registry = device_registry();
        registry.allocate(EntityKind::Asq, "asq").unwrap();
        registry.allocate(EntityKind::Read, "read").unwrap();
        assert_eq!(registry.release_all_except(&[]), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_end_group_policies() {
        let mut registry = device_registry();
        registry.allocate(EntityKind::Asq, "asq").unwrap();
        registry.allocate(EntityKind::Iosq, "iosq").unwrap();

        assert_eq!(registry.end_group(TeardownPolicy::KeepProtected), 1);
        assert_eq!(registry.names(), vec!["asq".to_string()]);
        assert_eq!(registry.end_group(TeardownPolicy::ReleaseAll), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_from_config_rejects_duplicate_protected_kinds() {
        let config = RegistryConfig {
            protected_kinds: vec![EntityKind::Asq, EntityKind::Iosq, EntityKind::Asq],
            ..RegistryConfig::default()
        };
        let result = ResourceRegistry::from_config(&config, DeviceContext::from_raw_fd(3));
        assert_eq!(
            result.unwrap_err(),
            RsrcError::DuplicateProtectedKind(EntityKind::Asq)
        );

        let config = RegistryConfig {
            protected_kinds: vec![EntityKind::Iosq, EntityKind::Asq],
            ..RegistryConfig::default()
        };
        let registry =
            ResourceRegistry::from_config(&config, DeviceContext::from_raw_fd(3)).unwrap();
        assert_eq!(
            registry.protected_kinds(),
            &[EntityKind::Iosq, EntityKind::Asq]
        );
    }

    #[test]
    fn test_meta_alloc_size() {
        let mut registry = device_registry();
        let read = registry.allocate(EntityKind::Read, "read").unwrap();

        assert_eq!(
            registry.alloc_meta_buffer(&read),
            Err(RsrcError::InvalidMetaSize(0))
        );
        assert_eq!(
            registry.set_meta_alloc_size(6),
            Err(RsrcError::InvalidMetaSize(6))
        );
        registry.set_meta_alloc_size(16).unwrap();
        assert_eq!(registry.meta_alloc_size(), Some(16));

        registry.alloc_meta_buffer(&read).unwrap();
        let meta_len = read
            .command()
            .and_then(|cmd| cmd.meta_buffer().map(|buf| buf.len()));
        assert_eq!(meta_len, Some(16));
    }

    #[test]
    fn test_meta_buffer_refused_for_queues() {
        let mut registry = device_registry();
        registry.set_meta_alloc_size(8).unwrap();
        let iosq = registry.allocate(EntityKind::Iosq, "iosq").unwrap();
        assert!(matches!(
            registry.alloc_meta_buffer(&iosq),
            Err(RsrcError::UnsupportedField {
                kind: EntityKind::Iosq,
                ..
            })
        ));
    }

    #[test]
    fn test_entries_of_kind() {
        let mut registry = device_registry();
        registry.allocate(EntityKind::Read, "r2").unwrap();
        registry.allocate(EntityKind::Read, "r1").unwrap();
        registry.allocate(EntityKind::Write, "w").unwrap();

        assert_eq!(
            registry.entries_of_kind(EntityKind::Read),
            vec!["r1".to_string(), "r2".to_string()]
        );
        assert!(registry.entries_of_kind(EntityKind::Asq).is_empty());
    }

    #[test]
    fn test_shared_registry_clones_see_same_table() {
        let shared = SharedRegistry::new(device_registry());
        let other = shared.clone();

        let created = shared.allocate(EntityKind::Iosq, IOSQ_GROUP_ID).unwrap();
        let found = other.lookup(IOSQ_GROUP_ID).unwrap();
        assert!(Arc::ptr_eq(&created, &found));

        let count = other.with_mut(|reg| {
            reg.allocate(EntityKind::Iocq, IOCQ_GROUP_ID).map(|_| reg.len())
        });
        assert_eq!(count, Ok(2));
        assert_eq!(shared.end_group(TeardownPolicy::ReleaseAll), 2);
        assert!(other.is_empty());
    }
}
