//! Shared region layout for the arena containers.
//!
//! Every container region starts with a [`TableHeader`] followed by a
//! container-specific sequence of fixed-length arrays. [`RegionBuilder`]
//! accumulates the byte offset of each array, rounding up to the element
//! alignment, and produces the [`Layout`] handed to the arena.

use std::{
    alloc::Layout,
    mem::{align_of, size_of},
};

use bytemuck::{Pod, Zeroable};

/// First eight bytes of every container region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct TableHeader {
    /// Number of entries stored.
    pub count: i32,
    /// Fixed capacity: the number of buckets and of physical entry slots.
    pub bucket_count: i32,
}

// SAFETY: repr(C) with two i32 fields, so there is no padding and any bit
// pattern is valid.
unsafe impl Zeroable for TableHeader {}
// SAFETY: as above.
unsafe impl Pod for TableHeader {}

/// Hash value marking an empty slot in the open-addressed map.
///
/// [`key_hash`](crate::key_hash) never returns this value, so a stored hash
/// equal to it always means "empty".
pub const EMPTY_HASH: i32 = i32::MIN;

/// Terminator for `next` and `value_next` entry links.
pub const LINK_NONE: i32 = -1;

pub(crate) const HEADER_BYTES: usize = size_of::<TableHeader>();

/// Reduces a stored hash to a bucket index.
///
/// The hash is reinterpreted as unsigned before the modulo so negative
/// hashes reduce like any other bit pattern.
#[inline]
pub(crate) fn bucket_of(hash: i32, bucket_count: u32) -> u32 {
    (hash as u32) % bucket_count
}

/// Accumulates the layout of a container region.
pub(crate) struct RegionBuilder {
    end: usize,
    align: usize,
}

impl RegionBuilder {
    pub fn new() -> Self {
        Self {
            end: HEADER_BYTES,
            align: align_of::<TableHeader>(),
        }
    }

    /// Appends an array of `len` elements of `T` and returns its byte
    /// offset relative to the region start.
    pub fn array<T>(&mut self, len: u32) -> u32 {
        let align = align_of::<T>();
        assert!(
            align <= bump_arena::MAX_ALIGN,
            "element alignment {align} exceeds the arena maximum of {}",
            bump_arena::MAX_ALIGN
        );
        let start = self.end.next_multiple_of(align);
        self.end = start + size_of::<T>() * len as usize;
        self.align = self.align.max(align);
        start as u32
    }

    /// Finishes the region and returns the layout to reserve for it.
    ///
    /// The arena aligns the region start to the layout alignment, which is
    /// the maximum element alignment seen; array starts rounded to their
    /// own element alignment therefore stay aligned after the region base
    /// offset is added.
    pub fn finish(self) -> Layout {
        Layout::from_size_align(self.end, self.align).unwrap()
    }
}
