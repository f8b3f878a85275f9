//! Dual-linked chaining multi-map stored inside a byte arena.

use std::{alloc::Layout, fmt, hash::Hash, marker::PhantomData, mem::size_of};

use bump_arena::{Arena, ArenaError};
use bytemuck::Pod;

use crate::{
    error::TableError,
    hash::key_hash,
    header::{bucket_of, RegionBuilder, TableHeader, LINK_NONE},
};

/// Offsets of the arrays of a multi-map region, relative to the region
/// start.
///
/// Entries carry two independent links. `nexts` threads same-bucket
/// entries, exactly like the set's chains, but only ever visits one entry
/// per distinct key: the anchor. `value_nexts` threads all entries of one
/// key, starting at the anchor and ending at the entry whose link is
/// [`LINK_NONE`] (the tail).
#[derive(Clone, Copy)]
struct MultiMapRegion {
    buckets: u32,
    hashes: u32,
    nexts: u32,
    value_nexts: u32,
    keys: u32,
    values: u32,
}

impl MultiMapRegion {
    fn compute<K, V>(bucket_count: u32) -> (Self, Layout) {
        let mut builder = RegionBuilder::new();
        let region = Self {
            buckets: builder.array::<i32>(bucket_count),
            hashes: builder.array::<i32>(bucket_count),
            nexts: builder.array::<i32>(bucket_count),
            value_nexts: builder.array::<i32>(bucket_count),
            keys: builder.array::<K>(bucket_count),
            values: builder.array::<V>(bucket_count),
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
    fn value_next_offset(&self, base: u32, entry: u32) -> u32 {
        base + self.value_nexts + size_of::<i32>() as u32 * entry
    }

    #[inline]
    fn key_offset<K>(&self, base: u32, entry: u32) -> u32 {
        base + self.keys + size_of::<K>() as u32 * entry
    }

    #[inline]
    fn value_offset<V>(&self, base: u32, entry: u32) -> u32 {
        base + self.values + size_of::<V>() as u32 * entry
    }
}

/// Fixed-capacity map from keys to multiple values, living inside an
/// [`Arena`].
///
/// Each distinct key owns exactly one bucket-reachable entry, its *anchor*.
/// Further values for the same key are stored in entries reachable only
/// through the per-key value chain: each new value is spliced directly
/// after the anchor, so enumeration yields the first-inserted value first
/// and the remaining values in reverse insertion order. Downstream
/// consumers depend on that exact order.
///
/// Physical entries are allocated densely in insertion order; the total
/// pair capacity is the bucket count. Entries are never removed.
pub struct ArenaMultiMap<K, V> {
    offset: u32,
    _phantom: PhantomData<(K, V)>,
}

impl<K, V> Clone for ArenaMultiMap<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for ArenaMultiMap<K, V> {}

impl<K, V> fmt::Debug for ArenaMultiMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaMultiMap")
            .field("offset", &self.offset)
            .finish()
    }
}

impl<K, V> ArenaMultiMap<K, V> {
    /// Reinterprets a raw region offset as a multi-map handle.
    ///
    /// The offset must have been returned by [`ArenaMultiMap::reserve`]
    /// with the same key and value types, on the given arena or a
    /// byte-identical copy.
    pub fn from_offset(offset: u32) -> Self {
        Self {
            offset,
            _phantom: PhantomData,
        }
    }

    /// Returns the byte offset of the multi-map's region inside its arena.
    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl<K: Pod + Eq + Hash, V: Pod> ArenaMultiMap<K, V> {
    /// Reserves a region for an empty multi-map with a fixed bucket count.
    ///
    /// As with the set, zero initialization is the empty state.
    pub fn reserve(arena: &mut Arena, bucket_count: u32) -> Result<Self, ArenaError> {
        assert!(
            bucket_count > 0 && bucket_count <= i32::MAX as u32,
            "bucket count {bucket_count} is outside the supported range"
        );
        let (_, layout) = MultiMapRegion::compute::<K, V>(bucket_count);
        let offset = arena.reserve(layout)?;
        arena.write(
            offset,
            TableHeader {
                count: 0,
                bucket_count: bucket_count as i32,
            },
        );
        log::trace!("multi-map with {bucket_count} buckets reserved at offset {offset}");
        Ok(Self::from_offset(offset))
    }

    fn header(&self, arena: &Arena) -> TableHeader {
        arena.read(self.offset)
    }

    /// Walks the bucket chain for `hash`, returning the anchor entry of
    /// `key` if one exists.
    fn find_anchor(
        &self,
        arena: &Arena,
        region: MultiMapRegion,
        cap: u32,
        hash: i32,
        key: &K,
    ) -> Option<u32> {
        let bucket = bucket_of(hash, cap);
        let head = arena.read::<i32>(region.bucket_offset(self.offset, bucket));
        let mut entry = head - 1;
        while entry != LINK_NONE {
            let index = entry as u32;
            if arena.read::<i32>(region.hash_offset(self.offset, index)) == hash
                && arena.read::<K>(region.key_offset::<K>(self.offset, index)) == *key
            {
                return Some(index);
            }
            entry = arena.read::<i32>(region.next_offset(self.offset, index));
        }
        None
    }

    /// Appends `value` to the values stored for `key`.
    ///
    /// The first value for a key creates its anchor entry, linked into the
    /// bucket chain as the new head. Every further value is stored in an
    /// entry that is never bucket-reachable and is spliced into the value
    /// chain directly after the anchor, inheriting the anchor's previous
    /// successor.
    ///
    /// Fails with [`TableError::CapacityExhausted`] once all physical entry
    /// slots are in use; the map is left unchanged in that case.
    pub fn insert(&self, arena: &mut Arena, key: K, value: V) -> Result<(), TableError> {
        let header = self.header(arena);
        let cap = header.bucket_count as u32;
        let (region, _) = MultiMapRegion::compute::<K, V>(cap);
        let count = header.count as u32;
        if count == cap {
            return Err(TableError::CapacityExhausted { capacity: cap });
        }
        let hash = key_hash(&key);
        match self.find_anchor(arena, region, cap, hash, &key) {
            None => {
                let bucket = bucket_of(hash, cap);
                let bucket_offset = region.bucket_offset(self.offset, bucket);
                let head = arena.read::<i32>(bucket_offset);
                arena.write(region.hash_offset(self.offset, count), hash);
                arena.write(region.next_offset(self.offset, count), head - 1);
                arena.write(region.value_next_offset(self.offset, count), LINK_NONE);
                arena.write(bucket_offset, count as i32 + 1);
            }
            Some(anchor) => {
                let successor = arena.read::<i32>(region.value_next_offset(self.offset, anchor));
                arena.write(region.hash_offset(self.offset, count), hash);
                arena.write(region.next_offset(self.offset, count), LINK_NONE);
                arena.write(region.value_next_offset(self.offset, count), successor);
                arena.write(
                    region.value_next_offset(self.offset, anchor),
                    count as i32,
                );
            }
        }
        arena.write(region.key_offset::<K>(self.offset, count), key);
        arena.write(region.value_offset::<V>(self.offset, count), value);
        arena.get_mut::<TableHeader>(self.offset).count += 1;
        Ok(())
    }

    /// Checks whether any value is stored for `key`.
    pub fn contains_key(&self, arena: &Arena, key: &K) -> bool {
        let header = self.header(arena);
        let cap = header.bucket_count as u32;
        let (region, _) = MultiMapRegion::compute::<K, V>(cap);
        self.find_anchor(arena, region, cap, key_hash(key), key)
            .is_some()
    }

    /// Iterates over the values stored for `key`.
    ///
    /// The anchor's value comes first; the remaining values follow in
    /// reverse insertion order. The iterator is empty when the key is
    /// absent.
    pub fn values_of<'a>(&self, arena: &'a Arena, key: &K) -> ValuesOf<'a, V> {
        let header = self.header(arena);
        let cap = header.bucket_count as u32;
        let (region, _) = MultiMapRegion::compute::<K, V>(cap);
        let cursor = match self.find_anchor(arena, region, cap, key_hash(key), key) {
            Some(anchor) => anchor as i32,
            None => LINK_NONE,
        };
        ValuesOf {
            arena,
            values: self.offset + region.values,
            value_nexts: self.offset + region.value_nexts,
            cursor,
            _phantom: PhantomData,
        }
    }

    /// Returns the number of values stored for `key`.
    pub fn value_count(&self, arena: &Arena, key: &K) -> u32 {
        self.values_of(arena, key).count() as u32
    }

    /// Iterates over the distinct keys of the map.
    ///
    /// This scans the physical entry array linearly and yields the key of
    /// every chain tail (entries whose value link is [`LINK_NONE`]); the
    /// dual-linkage invariant guarantees exactly one tail per distinct
    /// key. The tail is not necessarily the anchor, so the yielded key
    /// comes from whichever physical entry currently ends the chain.
    pub fn distinct_keys<'a>(&self, arena: &'a Arena) -> DistinctKeys<'a, K> {
        let header = self.header(arena);
        let (region, _) = MultiMapRegion::compute::<K, V>(header.bucket_count as u32);
        DistinctKeys {
            arena,
            keys: self.offset + region.keys,
            value_nexts: self.offset + region.value_nexts,
            len: header.count as u32,
            index: 0,
            _phantom: PhantomData,
        }
    }

    /// Returns the number of distinct keys.
    pub fn distinct_key_count(&self, arena: &Arena) -> u32 {
        self.distinct_keys(arena).count() as u32
    }

    /// Returns the number of stored (key, value) pairs.
    pub fn len(&self, arena: &Arena) -> u32 {
        self.header(arena).count as u32
    }

    /// Returns `true` when no pairs are stored.
    pub fn is_empty(&self, arena: &Arena) -> bool {
        self.len(arena) == 0
    }

    /// Returns the fixed number of buckets, which is also the physical
    /// pair capacity.
    pub fn bucket_count(&self, arena: &Arena) -> u32 {
        self.header(arena).bucket_count as u32
    }

    /// Returns the key of the `index`-th physical entry, in insertion
    /// order.
    pub fn key_at(&self, arena: &Arena, index: u32) -> Result<K, TableError> {
        let header = self.header(arena);
        let len = header.count as u32;
        if index >= len {
            return Err(TableError::OutOfBounds { index, len });
        }
        let (region, _) = MultiMapRegion::compute::<K, V>(header.bucket_count as u32);
        Ok(arena.read(region.key_offset::<K>(self.offset, index)))
    }

    /// Returns the value of the `index`-th physical entry, in insertion
    /// order.
    pub fn value_at(&self, arena: &Arena, index: u32) -> Result<V, TableError> {
        let header = self.header(arena);
        let len = header.count as u32;
        if index >= len {
            return Err(TableError::OutOfBounds { index, len });
        }
        let (region, _) = MultiMapRegion::compute::<K, V>(header.bucket_count as u32);
        Ok(arena.read(region.value_offset::<V>(self.offset, index)))
    }
}

/// Iterator over the values stored for one key of an [`ArenaMultiMap`].
pub struct ValuesOf<'a, V> {
    arena: &'a Arena,
    values: u32,
    value_nexts: u32,
    cursor: i32,
    _phantom: PhantomData<V>,
}

impl<V: Pod> Iterator for ValuesOf<'_, V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == LINK_NONE {
            return None;
        }
        let entry = self.cursor as u32;
        self.cursor = self
            .arena
            .read::<i32>(self.value_nexts + size_of::<i32>() as u32 * entry);
        Some(
            self.arena
                .read::<V>(self.values + size_of::<V>() as u32 * entry),
        )
    }
}

/// Iterator over the distinct keys of an [`ArenaMultiMap`].
pub struct DistinctKeys<'a, K> {
    arena: &'a Arena,
    keys: u32,
    value_nexts: u32,
    len: u32,
    index: u32,
    _phantom: PhantomData<K>,
}

impl<K: Pod> Iterator for DistinctKeys<'_, K> {
    type Item = K;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.len {
            let entry = self.index;
            self.index += 1;
            let link = self
                .arena
                .read::<i32>(self.value_nexts + size_of::<i32>() as u32 * entry);
            if link == LINK_NONE {
                return Some(
                    self.arena
                        .read::<K>(self.keys + size_of::<K>() as u32 * entry),
                );
            }
        }
        None
    }
}
