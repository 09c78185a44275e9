//! # Byte Column
//!
//! A dense array of fixed-stride elements stored as raw bytes.
//!
//! The backing store is a vector of 8-byte words, so every element whose
//! stride is a multiple of its alignment (true for any `Sized` type) and whose
//! alignment is at most 8 lands on a correctly aligned address. Typed views
//! are produced with `bytemuck` on top of the byte slices.
//!
//! Words live in `UnsafeCell` so the frame pipeline can hand out disjoint
//! mutable elements to concurrently running systems through a shared
//! reference. Everything else goes through `&mut self`.

// SAFETY: This module requires unsafe for shared-reference element writes.
// All unsafe blocks are documented.
#![allow(unsafe_code)]

use std::cell::UnsafeCell;

/// Largest element alignment a column can serve.
pub const MAX_ELEMENT_ALIGN: usize = std::mem::align_of::<u64>();

const WORD: usize = std::mem::size_of::<u64>();

/// Growable fixed-stride byte array.
pub struct ByteColumn {
    /// Backing words. Length always covers `capacity * stride` bytes.
    words: Vec<UnsafeCell<u64>>,
    /// Bytes per element.
    stride: usize,
    /// Number of addressable elements.
    capacity: usize,
}

// SAFETY: Shared access only reads, except through `slot_mut_shared`, whose
// caller guarantees no other access to that element.
unsafe impl Sync for ByteColumn {}

impl ByteColumn {
    /// Creates a zero-filled column.
    #[must_use]
    pub fn new(stride: usize, capacity: usize) -> Self {
        let mut column = Self {
            words: Vec::new(),
            stride,
            capacity: 0,
        };
        column.grow_to(capacity);
        column
    }

    /// Number of addressable elements.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Grows to at least `capacity` elements. New bytes are zero.
    pub fn grow_to(&mut self, capacity: usize) {
        if capacity <= self.capacity {
            return;
        }
        let words = (capacity * self.stride).div_ceil(WORD);
        self.words.resize_with(words, || UnsafeCell::new(0));
        self.capacity = capacity;
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.words.as_ptr()).cast::<u8>()
    }

    #[inline]
    fn check(&self, index: usize) {
        assert!(
            index < self.capacity,
            "column index {index} out of bounds (capacity {})",
            self.capacity
        );
    }

    /// Bytes of one element.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    #[must_use]
    pub fn slot(&self, index: usize) -> &[u8] {
        self.check(index);
        // SAFETY: In bounds; writers through a shared reference are excluded
        // for this element by the `slot_mut_shared` contract.
        unsafe { std::slice::from_raw_parts(self.base().add(index * self.stride), self.stride) }
    }

    /// Mutable bytes of one element.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn slot_mut(&mut self, index: usize) -> &mut [u8] {
        self.check(index);
        // SAFETY: In bounds and `&mut self` is exclusive.
        unsafe { std::slice::from_raw_parts_mut(self.base().add(index * self.stride), self.stride) }
    }

    /// Mutable bytes of one element through a shared reference.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    ///
    /// # Safety
    ///
    /// No other reference to this element may be alive while the returned
    /// slice is, and the column must not be grown or copied into meanwhile.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slot_mut_shared(&self, index: usize) -> &mut [u8] {
        self.check(index);
        std::slice::from_raw_parts_mut(self.base().add(index * self.stride), self.stride)
    }

    /// Overwrites one element.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds or `bytes` is not one stride long.
    #[inline]
    pub fn write(&mut self, index: usize, bytes: &[u8]) {
        self.slot_mut(index).copy_from_slice(bytes);
    }

    /// Zeroes one element.
    #[inline]
    pub fn clear_slot(&mut self, index: usize) {
        self.slot_mut(index).fill(0);
    }

    /// Bulk-copies every element of `source`, growing to match it.
    ///
    /// # Panics
    ///
    /// Panics if the strides differ.
    pub fn copy_from(&mut self, source: &ByteColumn) {
        assert_eq!(self.stride, source.stride, "stride mismatch in column copy");
        self.grow_to(source.capacity);
        let len = source.capacity * source.stride;
        // SAFETY: Both buffers hold at least `len` bytes and `&mut self`
        // guarantees they do not overlap.
        unsafe { std::ptr::copy_nonoverlapping(source.base(), self.base(), len) };
    }
}

impl std::fmt::Debug for ByteColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteColumn")
            .field("stride", &self.stride)
            .field("capacity", &self.capacity)
            .finish()
    }
}
