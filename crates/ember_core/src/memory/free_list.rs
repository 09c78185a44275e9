//! # Slot Allocator
//!
//! Hands out dense `u32` slot indices for a growable array, reusing freed
//! slots before touching fresh ones.

/// Free-list index allocator that grows in fixed increments.
///
/// The allocator only tracks indices. Callers own the backing array and grow
/// it to [`capacity`](Self::capacity) after each allocation.
///
/// # Example
///
/// ```rust,ignore
/// let mut slots = SlotAllocator::new(5, 5);
/// let index = slots.allocate();
/// column.grow_to(slots.capacity());
/// ```
#[derive(Clone, Debug)]
pub struct SlotAllocator {
    /// Released indices, reused last-in first-out.
    free_list: Vec<u32>,
    /// Indices below this have been handed out at least once.
    high_water: u32,
    /// Number of currently allocated slots.
    allocated_count: usize,
    /// Current array capacity.
    capacity: usize,
    /// Growth increment.
    extension: usize,
}

impl SlotAllocator {
    /// Creates an allocator with `capacity` slots reserved up front.
    ///
    /// # Panics
    ///
    /// Panics if `extension` is zero.
    #[must_use]
    pub fn new(capacity: usize, extension: usize) -> Self {
        assert!(extension > 0, "Extension must be greater than zero");
        Self {
            free_list: Vec::new(),
            high_water: 0,
            allocated_count: 0,
            capacity,
            extension,
        }
    }

    /// Current capacity of the backing array.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of allocated slots.
    #[inline]
    #[must_use]
    pub const fn allocated_count(&self) -> usize {
        self.allocated_count
    }

    /// Allocates a slot, growing the capacity by one extension when full.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` slots are requested.
    pub fn allocate(&mut self) -> u32 {
        self.allocated_count += 1;
        if let Some(index) = self.free_list.pop() {
            return index;
        }

        let index = self.high_water;
        if index as usize >= self.capacity {
            self.capacity += self.extension;
        }
        self.high_water = index.checked_add(1).expect("slot index space exhausted");
        index
    }

    /// Returns a slot to the free list.
    pub fn release(&mut self, index: u32) {
        debug_assert!(index < self.high_water, "releasing a slot never allocated");
        debug_assert!(!self.free_list.contains(&index), "double release of slot {index}");
        self.free_list.push(index);
        self.allocated_count -= 1;
    }

    /// Releases every slot. Capacity is kept.
    pub fn clear(&mut self) {
        self.free_list.clear();
        self.high_water = 0;
        self.allocated_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_grows_by_extension() {
        let mut slots = SlotAllocator::new(2, 5);
        assert_eq!(slots.allocate(), 0);
        assert_eq!(slots.allocate(), 1);
        assert_eq!(slots.capacity(), 2);

        assert_eq!(slots.allocate(), 2);
        assert_eq!(slots.capacity(), 7);
        assert_eq!(slots.allocated_count(), 3);
    }

    #[test]
    fn test_release_reuses() {
        let mut slots = SlotAllocator::new(4, 4);
        let a = slots.allocate();
        let _b = slots.allocate();
        slots.release(a);
        assert_eq!(slots.allocated_count(), 1);
        assert_eq!(slots.allocate(), a);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut slots = SlotAllocator::new(0, 3);
        for _ in 0..4 {
            slots.allocate();
        }
        assert_eq!(slots.capacity(), 6);

        slots.clear();
        assert_eq!(slots.allocated_count(), 0);
        assert_eq!(slots.capacity(), 6);
        assert_eq!(slots.allocate(), 0);
    }
}
