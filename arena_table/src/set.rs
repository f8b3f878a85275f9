//! Separate-chaining hash set stored inside a byte arena.

use std::{alloc::Layout, fmt, hash::Hash, marker::PhantomData, mem::size_of};

use bump_arena::{Arena, ArenaError};
use bytemuck::Pod;

use crate::{
    error::TableError,
    hash::key_hash,
    header::{bucket_of, RegionBuilder, TableHeader, LINK_NONE},
};

/// Offsets of the arrays of a set region, relative to the region start.
///
/// `buckets` holds 1-based entry indices with `0` meaning "empty", so the
/// zero-initialized region the arena hands out is already a valid empty
/// set. `nexts` links same-bucket entries, terminated by [`LINK_NONE`].
#[derive(Clone, Copy)]
struct SetRegion {
    buckets: u32,
    hashes: u32,
    nexts: u32,
    values: u32,
}

impl SetRegion {
    fn compute<T>(bucket_count: u32) -> (Self, Layout) {
        let mut builder = RegionBuilder::new();
        let region = Self {
            buckets: builder.array::<i32>(bucket_count),
            hashes: builder.array::<i32>(bucket_count),
            nexts: builder.array::<i32>(bucket_count),
            values: builder.array::<T>(bucket_count),
        };
        (region, builder.finish())
    }

    #[inline]
    fn bucket_offset(&self, base: u32, bucket: u32) -> u32 {
        base + self.buckets + size_of::<i32>() as u32 * bucket
    }

    #[inline]
    fn hash_offset(&self, base: u32, entry: u32) -> u32 {
        base + self.hashes + size_of::<i32>() as u32 * entry
    }

    #[inline]
    fn next_offset(&self, base: u32, entry: u32) -> u32 {
        base + self.nexts + size_of::<i32>() as u32 * entry
    }

    #[inline]
    fn value_offset<T>(&self, base: u32, entry: u32) -> u32 {
        base + self.values + size_of::<T>() as u32 * entry
    }
}

/// Fixed-capacity hash set of distinct values living inside an [`Arena`].
///
/// Collisions are resolved by separate chaining: each bucket heads a linked
/// list of entry indices. Physical entries are allocated densely in
/// insertion order and never removed or relocated, so the structural
/// capacity ceiling is exactly the bucket count, however long any single
/// chain grows.
///
/// The handle is just the region's byte offset and is freely copyable.
pub struct ArenaSet<T> {
    offset: u32,
    _phantom: PhantomData<T>,
}

impl<T> Clone for ArenaSet<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ArenaSet<T> {}

impl<T> fmt::Debug for ArenaSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaSet")
            .field("offset", &self.offset)
            .finish()
    }
}

impl<T> ArenaSet<T> {
    /// Reinterprets a raw region offset as a set handle.
    ///
    /// The offset must have been returned by [`ArenaSet::reserve`] with the
    /// same value type, on the given arena or a byte-identical copy.
    pub fn from_offset(offset: u32) -> Self {
        Self {
            offset,
            _phantom: PhantomData,
        }
    }

    /// Returns the byte offset of the set's region inside its arena.
    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl<T: Pod + Eq + Hash> ArenaSet<T> {
    /// Reserves a region for an empty set with a fixed bucket count.
    ///
    /// Zero initialization covers the empty state: all bucket heads start
    /// out empty and entry slots are only read after being linked.
    pub fn reserve(arena: &mut Arena, bucket_count: u32) -> Result<Self, ArenaError> {
        assert!(
            bucket_count > 0 && bucket_count <= i32::MAX as u32,
            "bucket count {bucket_count} is outside the supported range"
        );
        let (_, layout) = SetRegion::compute::<T>(bucket_count);
        let offset = arena.reserve(layout)?;
        arena.write(
            offset,
            TableHeader {
                count: 0,
                bucket_count: bucket_count as i32,
            },
        );
        log::trace!("set with {bucket_count} buckets reserved at offset {offset}");
        Ok(Self::from_offset(offset))
    }

    fn header(&self, arena: &Arena) -> TableHeader {
        arena.read(self.offset)
    }

    /// Walks the bucket chain for `hash`, returning the index of the entry
    /// equal to `value`.
    fn find(&self, arena: &Arena, region: SetRegion, cap: u32, hash: i32, value: &T) -> Option<u32> {
        let bucket = bucket_of(hash, cap);
        let head = arena.read::<i32>(region.bucket_offset(self.offset, bucket));
        let mut entry = head - 1;
        while entry != LINK_NONE {
            let index = entry as u32;
            if arena.read::<i32>(region.hash_offset(self.offset, index)) == hash
                && arena.read::<T>(region.value_offset::<T>(self.offset, index)) == *value
            {
                return Some(index);
            }
            entry = arena.read::<i32>(region.next_offset(self.offset, index));
        }
        None
    }

    /// Checks whether `value` is an element of the set.
    pub fn contains(&self, arena: &Arena, value: &T) -> bool {
        let header = self.header(arena);
        let cap = header.bucket_count as u32;
        let (region, _) = SetRegion::compute::<T>(cap);
        self.find(arena, region, cap, key_hash(value), value).is_some()
    }

    /// Inserts `value` into the set.
    ///
    /// Returns `Ok(false)` when an equal value is already present; the set,
    /// including all existing chain links, is left untouched in that case.
    /// Otherwise the value goes into the next unused entry slot and becomes
    /// the new head of its bucket chain.
    ///
    /// Fails with [`TableError::CapacityExhausted`] once all physical entry
    /// slots are in use.
    pub fn insert(&self, arena: &mut Arena, value: T) -> Result<bool, TableError> {
        let header = self.header(arena);
        let cap = header.bucket_count as u32;
        let (region, _) = SetRegion::compute::<T>(cap);
        let hash = key_hash(&value);
        if self.find(arena, region, cap, hash, &value).is_some() {
            return Ok(false);
        }
        let count = header.count as u32;
        if count == cap {
            return Err(TableError::CapacityExhausted { capacity: cap });
        }
        let bucket = bucket_of(hash, cap);
        let bucket_offset = region.bucket_offset(self.offset, bucket);
        let head = arena.read::<i32>(bucket_offset);
        arena.write(region.hash_offset(self.offset, count), hash);
        arena.write(region.next_offset(self.offset, count), head - 1);
        arena.write(region.value_offset::<T>(self.offset, count), value);
        arena.write(bucket_offset, count as i32 + 1);
        arena.get_mut::<TableHeader>(self.offset).count += 1;
        Ok(true)
    }

    /// Returns the number of values stored.
    pub fn len(&self, arena: &Arena) -> u32 {
        self.header(arena).count as u32
    }

    /// Returns `true` when the set is empty.
    pub fn is_empty(&self, arena: &Arena) -> bool {
        self.len(arena) == 0
    }

    /// Returns the fixed number of buckets, which is also the physical
    /// entry capacity.
    pub fn bucket_count(&self, arena: &Arena) -> u32 {
        self.header(arena).bucket_count as u32
    }

    /// Returns the `index`-th stored value, in insertion order.
    pub fn value_at(&self, arena: &Arena, index: u32) -> Result<T, TableError> {
        let header = self.header(arena);
        let len = header.count as u32;
        if index >= len {
            return Err(TableError::OutOfBounds { index, len });
        }
        let (region, _) = SetRegion::compute::<T>(header.bucket_count as u32);
        Ok(arena.read(region.value_offset::<T>(self.offset, index)))
    }

    /// Iterates over the stored values in insertion order.
    pub fn iter<'a>(&self, arena: &'a Arena) -> SetIter<'a, T> {
        let header = self.header(arena);
        let (region, _) = SetRegion::compute::<T>(header.bucket_count as u32);
        SetIter {
            arena,
            values: self.offset + region.values,
            len: header.count as u32,
            index: 0,
            _phantom: PhantomData,
        }
    }
}

/// Iterator over the values of an [`ArenaSet`], in insertion order.
pub struct SetIter<'a, T> {
    arena: &'a Arena,
    values: u32,
    len: u32,
    index: u32,
    _phantom: PhantomData<T>,
}

impl<T: Pod> Iterator for SetIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index == self.len {
            return None;
        }
        let index = self.index;
        self.index += 1;
        Some(
            self.arena
                .read::<T>(self.values + size_of::<T>() as u32 * index),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.len - self.index) as usize;
        (remaining, Some(remaining))
    }
}

impl<T: Pod> ExactSizeIterator for SetIter<'_, T> {}
