//! # Entity Management
//!
//! Entities are lightweight identifiers consisting of:
//! - An index into the registry's slot table
//! - A generation counter for safe reuse
//!
//! The registry keeps one [`EntityRecord`] per slot. A record remembers which
//! component slot the entity owns for every registered kind, and the derived
//! [`EntityType`] bitmask.

use std::sync::atomic::{AtomicBool, Ordering};

use super::component::ComponentKind;
use crate::memory::SlotAllocator;

/// Unique identifier for an entity.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Slot index in the registry
/// - Upper 32 bits: Generation counter for detecting stale references
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new entity ID from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the index portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Entity that never exists.
    pub const INVALID: Self = Self(u64::MAX);

    /// Checks if this entity ID is the invalid sentinel.
    #[inline]
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_invalid() {
            f.write_str("entity(invalid)")
        } else {
            write!(f, "entity({}v{})", self.index(), self.generation())
        }
    }
}

/// Bitmask of the component kinds an entity owns, bit `i` for kind `i`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct EntityType(u64);

impl EntityType {
    /// Type with no components.
    pub const EMPTY: Self = Self(0);

    /// Wraps a raw mask.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Builds the mask for a set of kinds.
    #[must_use]
    pub fn from_kinds(kinds: &[ComponentKind]) -> Self {
        Self(kinds.iter().fold(0, |mask, kind| mask | kind.bit()))
    }

    /// Raw mask.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// True if `kind`'s bit is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, kind: ComponentKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// True if every bit of `required` is set.
    #[inline]
    #[must_use]
    pub const fn contains_all(self, required: Self) -> bool {
        self.0 & required.0 == required.0
    }
}

/// One registry slot.
///
/// Invariant: `components[i].is_some()` iff bit `i` of `entity_type` is set.
#[derive(Debug)]
pub struct EntityRecord {
    /// Generation of the current (or most recent) occupant.
    pub(crate) generation: u32,
    /// Whether this slot currently holds a live entity.
    pub(crate) exists: bool,
    /// Set by deferred destruction, consumed by the next state copy.
    pub(crate) queue_deletion: AtomicBool,
    /// Component slot per registered kind.
    pub(crate) components: Vec<Option<u32>>,
    /// Derived from `components`.
    pub(crate) entity_type: EntityType,
}

impl EntityRecord {
    /// Creates an empty, never-used slot.
    #[must_use]
    pub fn vacant() -> Self {
        Self {
            generation: 0,
            exists: false,
            queue_deletion: AtomicBool::new(false),
            components: Vec::new(),
            entity_type: EntityType::EMPTY,
        }
    }

    /// Whether the slot holds a live entity.
    #[inline]
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.exists
    }

    /// Whether the entity is flagged for removal at the next copy.
    #[inline]
    #[must_use]
    pub fn is_queued_for_deletion(&self) -> bool {
        self.queue_deletion.load(Ordering::Acquire)
    }

    /// The entity's component bitmask.
    #[inline]
    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Component slot for `kind`, if owned.
    #[inline]
    #[must_use]
    pub fn component_slot(&self, kind: ComponentKind) -> Option<u32> {
        self.components.get(kind.index()).copied().flatten()
    }

    /// Records a component slot and sets its type bit.
    pub(crate) fn attach(&mut self, kind: ComponentKind, slot: u32) {
        if self.components.len() <= kind.index() {
            self.components.resize(kind.index() + 1, None);
        }
        self.components[kind.index()] = Some(slot);
        self.entity_type = EntityType(self.entity_type.0 | kind.bit());
    }

    /// Flags the entity for deletion. Returns true if this call set the flag.
    pub(crate) fn queue_for_deletion(&self) -> bool {
        !self.queue_deletion.swap(true, Ordering::AcqRel)
    }

    /// Marks the slot dead and hands back the owned component slots.
    pub(crate) fn kill(&mut self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.exists = false;
        self.queue_deletion.store(false, Ordering::Release);
        self.entity_type = EntityType::EMPTY;
        self.components
            .drain(..)
            .enumerate()
            .filter_map(|(kind, slot)| slot.map(|s| (kind, s)))
    }
}

/// Growable table of entity records.
///
/// Slots are reused after destruction. Each reuse bumps the slot's
/// generation, so ids handed out earlier stop resolving.
#[derive(Debug)]
pub struct EntityRegistry {
    records: Vec<EntityRecord>,
    slots: SlotAllocator,
}

impl EntityRegistry {
    /// Creates a registry with `capacity` slots reserved.
    ///
    /// # Panics
    ///
    /// Panics if `extension` is zero.
    #[must_use]
    pub fn new(capacity: usize, extension: usize) -> Self {
        let mut records = Vec::with_capacity(capacity);
        records.resize_with(capacity, EntityRecord::vacant);
        Self {
            records,
            slots: SlotAllocator::new(capacity, extension),
        }
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.allocated_count()
    }

    /// True if no entity is live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of record slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Claims a slot and marks it live with no components.
    pub fn spawn(&mut self) -> EntityId {
        let index = self.slots.allocate();
        if self.slots.capacity() > self.capacity() {
            self.records.resize_with(self.slots.capacity(), EntityRecord::vacant);
        }
        let record = &mut self.records[index as usize];
        record.exists = true;
        record.queue_deletion.store(false, Ordering::Release);
        record.components.clear();
        record.entity_type = EntityType::EMPTY;
        EntityId::new(index, record.generation)
    }

    /// Record of a live entity. Stale and out-of-range ids resolve to `None`.
    #[inline]
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&EntityRecord> {
        self.records
            .get(id.index() as usize)
            .filter(|record| record.exists && record.generation == id.generation())
    }

    /// Mutable record of a live entity.
    #[inline]
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        self.records
            .get_mut(id.index() as usize)
            .filter(|record| record.exists && record.generation == id.generation())
    }

    /// Kills an entity now, reporting each released component slot.
    ///
    /// Returns false if `id` was not live.
    pub fn despawn(&mut self, id: EntityId, mut release: impl FnMut(ComponentKind, u32)) -> bool {
        let Some(record) = self.get_mut(id) else {
            return false;
        };
        for (kind, slot) in record.kill() {
            #[allow(clippy::cast_possible_truncation)]
            release(ComponentKind::from_raw(kind as u32), slot);
        }
        record.generation = record.generation.wrapping_add(1);
        self.slots.release(id.index());
        true
    }

    /// Kills every live entity. Returns how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.len();
        for record in &mut self.records {
            if record.exists {
                record.kill().for_each(drop);
                record.generation = record.generation.wrapping_add(1);
            }
        }
        self.slots.clear();
        count
    }

    /// Ids flagged for deletion, in slot order.
    #[must_use]
    pub fn queued_for_deletion(&self) -> Vec<EntityId> {
        self.iter()
            .filter(|(_, record)| record.is_queued_for_deletion())
            .map(|(id, _)| id)
            .collect()
    }

    /// First live entity at or after slot `from`, with its slot index.
    #[must_use]
    pub fn next_live(&self, from: usize) -> Option<(usize, EntityId)> {
        self.records
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, record)| record.exists)
            .map(|(index, record)| {
                #[allow(clippy::cast_possible_truncation)]
                let id = EntityId::new(index as u32, record.generation);
                (index, id)
            })
    }

    /// Live entities with their records, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &EntityRecord)> + '_ {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.exists)
            .map(|(index, record)| {
                #[allow(clippy::cast_possible_truncation)]
                let id = EntityId::new(index as u32, record.generation);
                (id, record)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_roundtrip() {
        let id = EntityId::new(12345, 67890);
        assert_eq!(id.index(), 12345);
        assert_eq!(id.generation(), 67890);
        assert!(!id.is_invalid());
        assert!(EntityId::default().is_invalid());
    }

    #[test]
    fn test_entity_type_mask() {
        let a = ComponentKind::from_raw(0);
        let c = ComponentKind::from_raw(5);
        let ty = EntityType::from_kinds(&[a, c]);
        assert!(ty.contains(a));
        assert!(ty.contains(c));
        assert!(!ty.contains(ComponentKind::from_raw(1)));
        assert!(ty.contains_all(EntityType::from_kinds(&[c])));
        assert!(!ty.contains_all(EntityType::from_kinds(&[ComponentKind::from_raw(2)])));
        assert_eq!(ty.bits(), 0b10_0001);
    }

    #[test]
    fn test_record_attach_keeps_invariant() {
        let mut record = EntityRecord::vacant();
        record.attach(ComponentKind::from_raw(3), 7);
        assert_eq!(record.component_slot(ComponentKind::from_raw(3)), Some(7));
        assert_eq!(record.component_slot(ComponentKind::from_raw(0)), None);
        assert_eq!(record.entity_type().bits(), 0b1000);
    }

    #[test]
    fn test_queue_flag_set_once() {
        let record = EntityRecord::vacant();
        assert!(record.queue_for_deletion());
        assert!(!record.queue_for_deletion());
        assert!(record.is_queued_for_deletion());
    }

    #[test]
    fn test_kill_returns_slots() {
        let mut record = EntityRecord::vacant();
        record.exists = true;
        record.attach(ComponentKind::from_raw(0), 4);
        record.attach(ComponentKind::from_raw(2), 9);
        let freed: Vec<_> = record.kill().collect();
        assert_eq!(freed, vec![(0, 4), (2, 9)]);
        assert!(!record.exists());
        assert_eq!(record.entity_type(), EntityType::EMPTY);
    }

    #[test]
    fn test_registry_grows_by_extension() {
        let mut registry = EntityRegistry::new(2, 3);
        let ids: Vec<_> = (0..3).map(|_| registry.spawn()).collect();
        assert_eq!(registry.capacity(), 5);
        assert_eq!(registry.len(), 3);
        assert!(ids.iter().all(|&id| registry.get(id).is_some()));
    }

    #[test]
    fn test_stale_id_rejected_after_reuse() {
        let mut registry = EntityRegistry::new(4, 4);
        let first = registry.spawn();
        registry.get_mut(first).unwrap().attach(ComponentKind::from_raw(1), 6);

        let mut released = Vec::new();
        assert!(registry.despawn(first, |kind, slot| released.push((kind.raw(), slot))));
        assert_eq!(released, vec![(1, 6)]);
        assert!(!registry.despawn(first, |_, _| {}));

        let second = registry.spawn();
        assert_eq!(second.index(), first.index());
        assert_ne!(second.generation(), first.generation());
        assert!(registry.get(first).is_none());
        assert_eq!(registry.get(second).unwrap().entity_type(), EntityType::EMPTY);
    }

    #[test]
    fn test_next_live_skips_holes() {
        let mut registry = EntityRegistry::new(4, 4);
        let a = registry.spawn();
        let b = registry.spawn();
        let c = registry.spawn();
        registry.despawn(b, |_, _| {});

        assert_eq!(registry.next_live(0), Some((0, a)));
        assert_eq!(registry.next_live(1), Some((2, c)));
        assert_eq!(registry.next_live(3), None);
    }

    #[test]
    fn test_clear_invalidates_everything() {
        let mut registry = EntityRegistry::new(1, 1);
        let a = registry.spawn();
        let b = registry.spawn();
        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
        assert!(registry.get(a).is_none());
        assert!(registry.get(b).is_none());
        assert_eq!(registry.iter().count(), 0);
    }
}
