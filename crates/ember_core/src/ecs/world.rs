//! # World
//!
//! The entity registry and the component store, kept together behind one
//! reader-writer lock.
//!
//! ## Access rules
//!
//! ```text
//!   system jobs ........ read guard, many at once
//!   add / destroy all .. write guard
//!   state copy ......... write guard, after every system job has finished
//! ```
//!
//! System jobs reach the data only through a [`FrameView`], which enforces
//! what a system may touch in the current generation.

// SAFETY: FrameView writes current-generation elements through the shared
// read guard. Declared write sets plus per-chain turns keep those writes
// exclusive per component kind.
#![allow(unsafe_code)]

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::component::{Component, ComponentInit, ComponentKind, ComponentRegistry};
use super::entity::{EntityId, EntityRecord, EntityRegistry, EntityType};
use super::storage::ComponentStore;
use super::system::RegisteredSystem;
use crate::error::{EcsError, EcsResult};

/// Entities and component data.
#[derive(Debug)]
pub struct WorldState {
    registry: ComponentRegistry,
    entities: EntityRegistry,
    store: ComponentStore,
}

impl WorldState {
    /// Creates an empty world with no component kinds.
    ///
    /// # Panics
    ///
    /// Panics if `extension` is zero.
    #[must_use]
    pub fn new(entity_capacity: usize, extension: usize) -> Self {
        let registry = ComponentRegistry::new();
        let store = ComponentStore::new(&registry, extension);
        Self {
            registry,
            entities: EntityRegistry::new(entity_capacity, extension),
            store,
        }
    }

    /// Registered component kinds.
    #[inline]
    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// The entity table.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    /// Registers a kind by byte size.
    ///
    /// # Errors
    ///
    /// Fails past [`MAX_COMPONENT_KINDS`](super::MAX_COMPONENT_KINDS) kinds.
    pub fn register_raw(&mut self, size: usize) -> EcsResult<ComponentKind> {
        let kind = self.registry.register_raw(size)?;
        self.store.push_kind(size);
        Ok(kind)
    }

    /// Registers a typed kind.
    ///
    /// # Errors
    ///
    /// Fails past 64 kinds or on an alignment above 8.
    pub fn register<T: Component>(&mut self) -> EcsResult<ComponentKind> {
        let kind = self.registry.register::<T>()?;
        self.store.push_kind(std::mem::size_of::<T>());
        Ok(kind)
    }

    /// Creates an entity and writes its initial component values.
    ///
    /// Every kind is checked before anything is allocated, so a failed call
    /// leaves the world untouched.
    ///
    /// # Errors
    ///
    /// Unknown kinds, duplicated kinds, or initial bytes of the wrong length.
    pub fn add_entity(&mut self, components: &[ComponentInit<'_>]) -> EcsResult<EntityId> {
        let mut seen = EntityType::EMPTY;
        for init in components {
            let Some(expected) = self.registry.size_of(init.kind) else {
                tracing::warn!("Entity refused: component {} is not registered", init.kind.raw());
                return Err(EcsError::UnknownComponent(init.kind.raw()));
            };
            if seen.contains(init.kind) {
                return Err(EcsError::DuplicateComponent(init.kind.raw()));
            }
            if init.bytes.len() != expected {
                return Err(EcsError::InitialStateLength {
                    kind: init.kind.raw(),
                    expected,
                    actual: init.bytes.len(),
                });
            }
            seen = EntityType::from_bits(seen.bits() | init.kind.bit());
        }

        let id = self.entities.spawn();
        for init in components {
            let slot = self.store.allocate(init.kind, init.bytes);
            if let Some(record) = self.entities.get_mut(id) {
                record.attach(init.kind, slot);
            }
        }
        tracing::trace!("Added {} with type {:#x}", id, seen.bits());
        Ok(id)
    }

    /// Flags a live entity for removal at the next state copy.
    ///
    /// Returns false for dead, stale or already flagged ids.
    pub fn destroy_entity(&self, id: EntityId) -> bool {
        self.entities
            .get(id)
            .is_some_and(EntityRecord::queue_for_deletion)
    }

    /// Removes every entity now. Returns how many were removed.
    pub fn destroy_all(&mut self) -> usize {
        self.store.clear();
        self.entities.clear()
    }

    /// Copies current into previous, then removes flagged entities.
    ///
    /// Returns the number of entities removed.
    pub fn copy_state(&mut self) -> usize {
        self.store.copy_current_to_previous();

        let queued = self.entities.queued_for_deletion();
        let store = &mut self.store;
        for &id in &queued {
            self.entities.despawn(id, |kind, slot| store.release(kind, slot));
        }
        queued.len()
    }

    /// True if `id` refers to a live entity.
    #[inline]
    #[must_use]
    pub fn entity_exists(&self, id: EntityId) -> bool {
        self.entities.get(id).is_some()
    }

    /// Component bitmask of a live entity.
    #[inline]
    #[must_use]
    pub fn entity_type(&self, id: EntityId) -> Option<EntityType> {
        self.entities.get(id).map(EntityRecord::entity_type)
    }

    /// True if `a == b`, or both are live with equal types.
    #[must_use]
    pub fn same_type(&self, a: EntityId, b: EntityId) -> bool {
        if a == b {
            return true;
        }
        match (self.entity_type(a), self.entity_type(b)) {
            (Some(ta), Some(tb)) => ta == tb,
            _ => false,
        }
    }

    /// True if `id` is live and owns every kind in `kinds`.
    #[must_use]
    pub fn has_components(&self, id: EntityId, kinds: &[ComponentKind]) -> bool {
        if !kinds.iter().all(|&kind| self.registry.contains(kind)) {
            return false;
        }
        self.entity_type(id)
            .is_some_and(|ty| ty.contains_all(EntityType::from_kinds(kinds)))
    }

    /// True if `id` is live and flagged for removal.
    #[must_use]
    pub fn is_queued_for_deletion(&self, id: EntityId) -> bool {
        self.entities
            .get(id)
            .is_some_and(EntityRecord::is_queued_for_deletion)
    }

    /// Component slot of `kind` on `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not live or lacks `kind`.
    #[inline]
    fn slot_of(&self, kind: ComponentKind, id: EntityId) -> u32 {
        let record = self.entities.get(id);
        assert!(record.is_some(), "{id} does not exist");
        record
            .and_then(|record| record.component_slot(kind))
            .unwrap_or_else(|| panic!("{id} has no component {}", kind.raw()))
    }

    /// Current-generation bytes.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not live or lacks `kind`.
    #[must_use]
    pub fn component_bytes(&self, kind: ComponentKind, id: EntityId) -> &[u8] {
        self.store.current(kind, self.slot_of(kind, id))
    }

    /// Mutable current-generation bytes.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not live or lacks `kind`.
    pub fn component_bytes_mut(&mut self, kind: ComponentKind, id: EntityId) -> &mut [u8] {
        let slot = self.slot_of(kind, id);
        self.store.current_mut(kind, slot)
    }

    /// Previous-generation bytes.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not live or lacks `kind`.
    #[must_use]
    pub fn previous_bytes(&self, kind: ComponentKind, id: EntityId) -> &[u8] {
        self.store.previous(kind, self.slot_of(kind, id))
    }

    /// Typed current-generation value.
    ///
    /// # Panics
    ///
    /// Panics if `id` lacks `kind` or `T` does not match its stride.
    #[must_use]
    pub fn component<T: Component>(&self, kind: ComponentKind, id: EntityId) -> &T {
        self.assert_type::<T>(kind);
        bytemuck::from_bytes(self.component_bytes(kind, id))
    }

    /// Typed mutable current-generation value.
    ///
    /// # Panics
    ///
    /// Panics if `id` lacks `kind` or `T` does not match its stride.
    pub fn component_mut<T: Component>(&mut self, kind: ComponentKind, id: EntityId) -> &mut T {
        self.assert_type::<T>(kind);
        bytemuck::from_bytes_mut(self.component_bytes_mut(kind, id))
    }

    /// Typed previous-generation value.
    ///
    /// # Panics
    ///
    /// Panics if `id` lacks `kind` or `T` does not match its stride.
    #[must_use]
    pub fn previous<T: Component>(&self, kind: ComponentKind, id: EntityId) -> &T {
        self.assert_type::<T>(kind);
        bytemuck::from_bytes(self.previous_bytes(kind, id))
    }

    fn assert_type<T: Component>(&self, kind: ComponentKind) {
        if let Err(e) = self.registry.check_type::<T>(kind) {
            panic!("{e}");
        }
    }

    /// Live ids owning every kind in `required`, in slot order.
    pub fn matching(&self, required: EntityType) -> impl Iterator<Item = EntityId> + '_ {
        self.entities
            .iter()
            .filter(move |(_, record)| record.entity_type().contains_all(required))
            .map(|(id, _)| id)
    }

    /// Writes current-generation bytes through a shared reference.
    ///
    /// # Safety
    ///
    /// No other thread may access this element of the current generation
    /// until the call returns.
    unsafe fn write_shared(&self, kind: ComponentKind, id: EntityId, bytes: &[u8]) {
        let slot = self.slot_of(kind, id);
        self.store.current_mut_shared(kind, slot).copy_from_slice(bytes);
    }
}

/// The world behind its reader-writer lock.
#[derive(Debug)]
pub struct World {
    state: RwLock<WorldState>,
}

impl World {
    /// Creates an empty world.
    #[must_use]
    pub fn new(entity_capacity: usize, extension: usize) -> Self {
        Self {
            state: RwLock::new(WorldState::new(entity_capacity, extension)),
        }
    }

    /// Shared access.
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, WorldState> {
        self.state.read()
    }

    /// Exclusive access.
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, WorldState> {
        self.state.write()
    }
}

/// What a running system sees.
///
/// Reads of the previous generation are always allowed. The current
/// generation of a kind can be read only by a system that writes it, or when
/// no system writes it at all; it can be written only by a system that
/// declared the write. Current-generation values are handed out by copy, so
/// no reference into live data outlives a call.
pub struct FrameView<'w> {
    state: &'w WorldState,
    system: &'w RegisteredSystem,
    written: EntityType,
}

impl<'w> FrameView<'w> {
    pub(crate) fn new(
        state: &'w WorldState,
        system: &'w RegisteredSystem,
        written: EntityType,
    ) -> Self {
        Self {
            state,
            system,
            written,
        }
    }

    /// Last frame's value. Safe to read for any entity.
    ///
    /// # Panics
    ///
    /// Panics if `id` lacks `kind` or `T` does not match its stride.
    #[inline]
    #[must_use]
    pub fn previous<T: Component>(&self, kind: ComponentKind, id: EntityId) -> T {
        *self.state.previous::<T>(kind, id)
    }

    /// Last frame's raw bytes.
    ///
    /// # Panics
    ///
    /// Panics if `id` lacks `kind`.
    #[inline]
    #[must_use]
    pub fn previous_bytes(&self, kind: ComponentKind, id: EntityId) -> &'w [u8] {
        self.state.previous_bytes(kind, id)
    }

    fn assert_current_readable(&self, kind: ComponentKind) {
        assert!(
            self.system.writes.contains(kind) || !self.written.contains(kind),
            "system {} reads current component {} written by another system",
            self.system.name,
            kind.raw()
        );
    }

    fn assert_writable(&self, kind: ComponentKind) {
        assert!(
            self.system.writes.contains(kind),
            "system {} writes component {} without declaring it",
            self.system.name,
            kind.raw()
        );
    }

    /// This frame's value.
    ///
    /// # Panics
    ///
    /// Panics if another system writes `kind`, `id` lacks `kind`, or `T`
    /// does not match the stride.
    #[must_use]
    pub fn component<T: Component>(&self, kind: ComponentKind, id: EntityId) -> T {
        self.assert_current_readable(kind);
        self.state.assert_type::<T>(kind);
        bytemuck::pod_read_unaligned(self.state.component_bytes(kind, id))
    }

    /// Copies this frame's raw bytes into `out`.
    ///
    /// # Panics
    ///
    /// Same as [`component`](Self::component), or if `out` is not one stride.
    pub fn component_bytes(&self, kind: ComponentKind, id: EntityId, out: &mut [u8]) {
        self.assert_current_readable(kind);
        out.copy_from_slice(self.state.component_bytes(kind, id));
    }

    /// Replaces this frame's value.
    ///
    /// # Panics
    ///
    /// Panics if the write was not declared, `id` lacks `kind`, or `T`
    /// does not match the stride.
    pub fn set_component<T: Component>(&self, kind: ComponentKind, id: EntityId, value: T) {
        self.state.assert_type::<T>(kind);
        self.set_component_bytes(kind, id, bytemuck::bytes_of(&value));
    }

    /// Replaces this frame's raw bytes.
    ///
    /// # Panics
    ///
    /// Panics if the write was not declared, `id` lacks `kind`, or `bytes`
    /// is not one stride.
    pub fn set_component_bytes(&self, kind: ComponentKind, id: EntityId, bytes: &[u8]) {
        self.assert_writable(kind);
        // SAFETY: This system declared the write. Registration guarantees any
        // other writer of `kind` shares its chain, whose lock is private to the
        // system table, and the pipeline holds this system's turn for its
        // whole sweep. Readers of `kind` in the current generation are limited
        // to its writers.
        unsafe { self.state.write_shared(kind, id, bytes) };
    }

    /// Reads this frame's value, applies `f`, and writes it back.
    ///
    /// # Panics
    ///
    /// Same as [`set_component`](Self::set_component).
    pub fn update_component<T, R>(
        &self,
        kind: ComponentKind,
        id: EntityId,
        f: impl FnOnce(&mut T) -> R,
    ) -> R
    where
        T: Component,
    {
        self.assert_writable(kind);
        self.state.assert_type::<T>(kind);
        let mut value: T = bytemuck::pod_read_unaligned(self.state.component_bytes(kind, id));
        let result = f(&mut value);
        self.set_component(kind, id, value);
        result
    }

    /// Flags an entity for removal at the next state copy.
    #[inline]
    pub fn destroy_entity(&self, id: EntityId) -> bool {
        self.state.destroy_entity(id)
    }

    /// True if `id` is live.
    #[inline]
    #[must_use]
    pub fn entity_exists(&self, id: EntityId) -> bool {
        self.state.entity_exists(id)
    }

    /// Component bitmask of a live entity.
    #[inline]
    #[must_use]
    pub fn entity_type(&self, id: EntityId) -> Option<EntityType> {
        self.state.entity_type(id)
    }

    /// True if `id` owns every kind in `kinds`.
    #[inline]
    #[must_use]
    pub fn has_components(&self, id: EntityId, kinds: &[ComponentKind]) -> bool {
        self.state.has_components(id, kinds)
    }

    /// True if both entities have the same type.
    #[inline]
    #[must_use]
    pub fn same_type(&self, a: EntityId, b: EntityId) -> bool {
        self.state.same_type(a, b)
    }

    /// Every live entity, for systems that look at other entities.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + 'w {
        self.state.matching(EntityType::EMPTY)
    }
}

/// Live entities in slot order, holding a read guard on the world.
///
/// Adding entities blocks until the iterator is dropped.
pub struct EntityIter<'a> {
    state: RwLockReadGuard<'a, WorldState>,
    cursor: usize,
}

impl<'a> EntityIter<'a> {
    pub(crate) fn new(state: RwLockReadGuard<'a, WorldState>) -> Self {
        Self { state, cursor: 0 }
    }
}

impl Iterator for EntityIter<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, id) = self.state.entities().next_live(self.cursor)?;
        self.cursor = index + 1;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::{Position, Velocity};

    fn world() -> (WorldState, ComponentKind, ComponentKind) {
        let mut state = WorldState::new(5, 5);
        let pos = state.register::<Position>().unwrap();
        let vel = state.register::<Velocity>().unwrap();
        (state, pos, vel)
    }

    #[test]
    fn test_add_entity_writes_both_generations() {
        let (mut state, pos, vel) = world();
        let p = Position::new(1.0, 2.0);
        let v = Velocity::new(3.0, 4.0);
        let id = state
            .add_entity(&[ComponentInit::of(pos, &p), ComponentInit::of(vel, &v)])
            .unwrap();

        assert_eq!(*state.component::<Position>(pos, id), p);
        assert_eq!(*state.previous::<Velocity>(vel, id), v);
        assert_eq!(state.entity_type(id).unwrap().bits(), 0b11);
    }

    #[test]
    #[should_panic(expected = "has stride 8, type is 4 bytes")]
    fn test_typed_access_checks_stride() {
        let (mut state, pos, _) = world();
        let id = state
            .add_entity(&[ComponentInit::of(pos, &Position::new(1.0, 2.0))])
            .unwrap();
        let _ = state.previous::<u32>(pos, id);
    }

    #[test]
    fn test_add_entity_rejects_bad_input() {
        let (mut state, pos, _) = world();
        let p = Position::default();
        assert_eq!(
            state.add_entity(&[ComponentInit::raw(ComponentKind::from_raw(5), &[0; 8])]),
            Err(EcsError::UnknownComponent(5))
        );
        assert_eq!(
            state.add_entity(&[ComponentInit::of(pos, &p), ComponentInit::of(pos, &p)]),
            Err(EcsError::DuplicateComponent(0))
        );
        assert!(matches!(
            state.add_entity(&[ComponentInit::raw(pos, &[0; 3])]),
            Err(EcsError::InitialStateLength { .. })
        ));
        assert!(state.entities().is_empty());
    }

    #[test]
    fn test_destroy_is_deferred_until_copy() {
        let (mut state, pos, _) = world();
        let id = state
            .add_entity(&[ComponentInit::of(pos, &Position::new(5.0, 5.0))])
            .unwrap();

        assert!(state.destroy_entity(id));
        assert!(!state.destroy_entity(id));
        assert!(state.entity_exists(id));
        assert!(state.is_queued_for_deletion(id));
        assert_eq!(state.previous::<Position>(pos, id).x, 5.0);

        assert_eq!(state.copy_state(), 1);
        assert!(!state.entity_exists(id));
        assert!(!state.destroy_entity(id));
    }

    #[test]
    fn test_same_type_and_has_components() {
        let (mut state, pos, vel) = world();
        let p = Position::default();
        let v = Velocity::default();
        let a = state.add_entity(&[ComponentInit::of(pos, &p)]).unwrap();
        let b = state.add_entity(&[ComponentInit::of(pos, &p)]).unwrap();
        let c = state
            .add_entity(&[ComponentInit::of(pos, &p), ComponentInit::of(vel, &v)])
            .unwrap();

        assert!(state.same_type(a, b));
        assert!(!state.same_type(a, c));
        assert!(state.same_type(a, a));
        assert!(!state.same_type(a, EntityId::INVALID));

        assert!(state.has_components(c, &[pos, vel]));
        assert!(!state.has_components(a, &[pos, vel]));
        assert!(!state.has_components(a, &[ComponentKind::from_raw(63)]));
        assert!(!state.has_components(EntityId::INVALID, &[]));
    }

    #[test]
    fn test_destroy_all_is_immediate() {
        let (mut state, pos, _) = world();
        let p = Position::default();
        let ids: Vec<_> = (0..7)
            .map(|_| state.add_entity(&[ComponentInit::of(pos, &p)]).unwrap())
            .collect();
        assert_eq!(state.destroy_all(), 7);
        assert!(ids.iter().all(|&id| !state.entity_exists(id)));
        assert_eq!(state.matching(EntityType::EMPTY).count(), 0);
    }

    #[test]
    fn test_copy_releases_component_slots() {
        let (mut state, pos, _) = world();
        let first = state
            .add_entity(&[ComponentInit::of(pos, &Position::new(1.0, 1.0))])
            .unwrap();
        state.destroy_entity(first);
        state.copy_state();

        let second = state
            .add_entity(&[ComponentInit::of(pos, &Position::new(2.0, 2.0))])
            .unwrap();
        assert_eq!(second.index(), first.index());
        assert_eq!(state.component::<Position>(pos, second).x, 2.0);
        assert_eq!(state.previous::<Position>(pos, second).x, 2.0);
    }

    #[test]
    #[should_panic(expected = "has no component")]
    fn test_missing_component_panics() {
        let (mut state, pos, vel) = world();
        let id = state
            .add_entity(&[ComponentInit::of(pos, &Position::default())])
            .unwrap();
        let _ = state.component::<Velocity>(vel, id);
    }
}
