//! # Component Storage
//!
//! One dense byte column per component kind, kept in two generations:
//!
//! ```text
//! current:  [C0][C1][C2][  ][C4]   <- written by systems this frame
//! previous: [C0][C1][C2][  ][C4]   <- last frame's snapshot, read-only
//! ```
//!
//! Both generations of a kind share one slot allocator, so a component slot
//! addresses the same element in either generation. The bulk copy at the end
//! of each frame makes `previous` equal `current`.

// SAFETY: Exposes shared-reference element writes for the frame pipeline.
#![allow(unsafe_code)]

use super::component::{ComponentKind, ComponentRegistry};
use crate::memory::{ByteColumn, SlotAllocator};

/// Storage for one component kind.
#[derive(Debug)]
struct KindStorage {
    current: ByteColumn,
    previous: ByteColumn,
    slots: SlotAllocator,
}

impl KindStorage {
    fn new(stride: usize, extension: usize) -> Self {
        Self {
            current: ByteColumn::new(stride, extension),
            previous: ByteColumn::new(stride, extension),
            slots: SlotAllocator::new(extension, extension),
        }
    }
}

/// Double-generation storage for every registered kind.
///
/// This storage guarantees:
/// - O(1) access by component slot
/// - Growth by a fixed extension when a kind's column is full
/// - Previously stored values survive growth unchanged
#[derive(Debug)]
pub struct ComponentStore {
    kinds: Vec<KindStorage>,
    extension: usize,
}

impl ComponentStore {
    /// Creates storage with one column pair per registered kind.
    ///
    /// # Panics
    ///
    /// Panics if `extension` is zero.
    #[must_use]
    pub fn new(registry: &ComponentRegistry, extension: usize) -> Self {
        assert!(extension > 0, "Extension must be greater than zero");
        let kinds = registry
            .kinds()
            .filter_map(|kind| registry.size_of(kind))
            .map(|stride| KindStorage::new(stride, extension))
            .collect();
        Self { kinds, extension }
    }

    /// Adds a column pair for a newly registered kind.
    pub fn push_kind(&mut self, stride: usize) {
        self.kinds.push(KindStorage::new(stride, self.extension));
    }

    #[inline]
    fn storage(&self, kind: ComponentKind) -> &KindStorage {
        &self.kinds[kind.index()]
    }

    /// Allocates a slot, writing `initial` into both generations.
    ///
    /// Writing `previous` too makes a new entity readable through the
    /// previous-frame view before its first copy.
    ///
    /// # Panics
    ///
    /// Panics if `initial` is not one stride long.
    pub fn allocate(&mut self, kind: ComponentKind, initial: &[u8]) -> u32 {
        let storage = &mut self.kinds[kind.index()];
        let slot = storage.slots.allocate();
        let capacity = storage.slots.capacity();
        if capacity > storage.current.capacity() {
            storage.current.grow_to(capacity);
            storage.previous.grow_to(capacity);
            tracing::trace!("Component {} columns grown to {}", kind.raw(), capacity);
        }
        storage.current.write(slot as usize, initial);
        storage.previous.write(slot as usize, initial);
        slot
    }

    /// Returns a slot to its kind's free list.
    pub fn release(&mut self, kind: ComponentKind, slot: u32) {
        let storage = &mut self.kinds[kind.index()];
        storage.current.clear_slot(slot as usize);
        storage.slots.release(slot);
    }

    /// Current-generation bytes.
    #[inline]
    #[must_use]
    pub fn current(&self, kind: ComponentKind, slot: u32) -> &[u8] {
        self.storage(kind).current.slot(slot as usize)
    }

    /// Mutable current-generation bytes.
    #[inline]
    pub fn current_mut(&mut self, kind: ComponentKind, slot: u32) -> &mut [u8] {
        self.kinds[kind.index()].current.slot_mut(slot as usize)
    }

    /// Mutable current-generation bytes through a shared reference.
    ///
    /// # Safety
    ///
    /// No other reference to this element may be alive while the returned
    /// slice is, and the store must not be mutated meanwhile.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn current_mut_shared(&self, kind: ComponentKind, slot: u32) -> &mut [u8] {
        self.storage(kind).current.slot_mut_shared(slot as usize)
    }

    /// Previous-generation bytes.
    #[inline]
    #[must_use]
    pub fn previous(&self, kind: ComponentKind, slot: u32) -> &[u8] {
        self.storage(kind).previous.slot(slot as usize)
    }

    /// Bulk-copies current into previous for every kind.
    pub fn copy_current_to_previous(&mut self) {
        for storage in &mut self.kinds {
            storage.previous.copy_from(&storage.current);
        }
    }

    /// Releases every slot of every kind. Capacity is kept.
    pub fn clear(&mut self) {
        for storage in &mut self.kinds {
            storage.slots.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(sizes: &[usize], extension: usize) -> ComponentStore {
        let registry = ComponentRegistry::from_sizes(sizes).unwrap();
        ComponentStore::new(&registry, extension)
    }

    #[test]
    fn test_allocate_writes_both_generations() {
        let mut store = store(&[4], 5);
        let kind = ComponentKind::from_raw(0);
        let slot = store.allocate(kind, &[1, 2, 3, 4]);
        assert_eq!(store.current(kind, slot), &[1, 2, 3, 4]);
        assert_eq!(store.previous(kind, slot), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_growth_keeps_values() {
        let mut store = store(&[4], 5);
        let kind = ComponentKind::from_raw(0);
        let slots: Vec<u32> = (0u8..6).map(|i| store.allocate(kind, &[i; 4])).collect();
        for (i, slot) in slots.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let expected = [i as u8; 4];
            assert_eq!(store.current(kind, *slot), &expected);
            assert_eq!(store.previous(kind, *slot), &expected);
        }
    }

    #[test]
    fn test_copy_snapshots_current() {
        let mut store = store(&[2, 8], 5);
        let a = ComponentKind::from_raw(0);
        let b = ComponentKind::from_raw(1);
        let sa = store.allocate(a, &[0, 0]);
        let sb = store.allocate(b, &[0; 8]);

        store.current_mut(a, sa).copy_from_slice(&[7, 7]);
        store.current_mut(b, sb)[0] = 42;
        assert_eq!(store.previous(a, sa), &[0, 0]);

        store.copy_current_to_previous();
        assert_eq!(store.previous(a, sa), &[7, 7]);
        assert_eq!(store.previous(b, sb)[0], 42);
    }

    #[test]
    fn test_release_reuses_slot() {
        let mut store = store(&[1], 5);
        let kind = ComponentKind::from_raw(0);
        let first = store.allocate(kind, &[1]);
        store.release(kind, first);
        assert_eq!(store.current(kind, first), &[0]);
        assert_eq!(store.allocate(kind, &[2]), first);
        assert_eq!(store.current(kind, first), &[2]);
    }
}
