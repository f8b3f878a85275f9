//! Open-addressing unique-key map stored inside a byte arena.

use std::{alloc::Layout, fmt, hash::Hash, marker::PhantomData, mem::size_of};

use bump_arena::{Arena, ArenaError};
use bytemuck::Pod;

use crate::{
    error::TableError,
    hash::key_hash,
    header::{bucket_of, RegionBuilder, TableHeader, EMPTY_HASH},
};

/// Offsets of the hash and key arrays, relative to the region start.
///
/// These two arrays directly follow the header, before the value array, so
/// their offsets depend only on the key type. [`KeyView`] relies on this to
/// probe a map region without naming the value type.
#[derive(Clone, Copy)]
struct ProbeArrays {
    hashes: u32,
    keys: u32,
}

impl ProbeArrays {
    fn build<K>(builder: &mut RegionBuilder, bucket_count: u32) -> Self {
        Self {
            hashes: builder.array::<i32>(bucket_count),
            keys: builder.array::<K>(bucket_count),
        }
    }

    #[inline]
    fn hash_offset(&self, base: u32, slot: u32) -> u32 {
        base + self.hashes + size_of::<i32>() as u32 * slot
    }

    #[inline]
    fn key_offset<K>(&self, base: u32, slot: u32) -> u32 {
        base + self.keys + size_of::<K>() as u32 * slot
    }
}

/// Offsets of all arrays of a map region, relative to the region start.
#[derive(Clone, Copy)]
struct MapRegion {
    probe: ProbeArrays,
    values: u32,
}

impl MapRegion {
    fn compute<K, V>(bucket_count: u32) -> (Self, Layout) {
        let mut builder = RegionBuilder::new();
        let probe = ProbeArrays::build::<K>(&mut builder, bucket_count);
        let values = builder.array::<V>(bucket_count);
        (Self { probe, values }, builder.finish())
    }

    #[inline]
    fn value_offset<V>(&self, base: u32, slot: u32) -> u32 {
        base + self.values + size_of::<V>() as u32 * slot
    }
}

enum Probe {
    /// Slot holding an equal key.
    Found(u32),
    /// First empty slot on the probe sequence.
    Empty(u32),
    /// A full wrap found neither an equal key nor an empty slot.
    Full,
}

/// Scans forward from the key's home bucket with wraparound.
///
/// The scan stops at the first slot whose stored hash is the empty
/// sentinel. That early exit is correct only because entries are never
/// removed: there are no tombstones that could hide a matching key behind
/// an empty slot.
fn probe<K: Pod + Eq>(
    arena: &Arena,
    base: u32,
    arrays: ProbeArrays,
    bucket_count: u32,
    hash: i32,
    key: &K,
) -> Probe {
    let home = bucket_of(hash, bucket_count);
    for step in 0..bucket_count {
        let slot = (home + step) % bucket_count;
        let stored = arena.read::<i32>(arrays.hash_offset(base, slot));
        if stored == EMPTY_HASH {
            return Probe::Empty(slot);
        }
        if stored == hash && arena.read::<K>(arrays.key_offset::<K>(base, slot)) == *key {
            return Probe::Found(slot);
        }
    }
    Probe::Full
}

/// Finds the slot of the `index`-th occupied entry in slot order.
fn occupied_slot(
    arena: &Arena,
    base: u32,
    arrays: ProbeArrays,
    header: TableHeader,
    index: u32,
) -> Result<u32, TableError> {
    let len = header.count as u32;
    if index >= len {
        return Err(TableError::OutOfBounds { index, len });
    }
    let mut remaining = index;
    for slot in 0..header.bucket_count as u32 {
        if arena.read::<i32>(arrays.hash_offset(base, slot)) != EMPTY_HASH {
            if remaining == 0 {
                return Ok(slot);
            }
            remaining -= 1;
        }
    }
    unreachable!("entry count exceeds the number of occupied slots")
}

/// Fixed-capacity unique-key hash map living inside an [`Arena`].
///
/// Collisions are resolved by open addressing: a colliding key is stored in
/// the next free slot of the bucket array, found by scanning forward with
/// wraparound. There is exactly one slot per bucket, no chains, and no
/// tombstones — entry removal and rehashing do not exist.
///
/// The handle itself is just the region's byte offset. It is `Copy`;
/// duplicating it does not duplicate any data, and every operation borrows
/// the arena that holds the actual state.
pub struct ArenaMap<K, V> {
    offset: u32,
    _phantom: PhantomData<(K, V)>,
}

impl<K, V> Clone for ArenaMap<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for ArenaMap<K, V> {}

impl<K, V> fmt::Debug for ArenaMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaMap")
            .field("offset", &self.offset)
            .finish()
    }
}

impl<K, V> ArenaMap<K, V> {
    /// Reinterprets a raw region offset as a map handle.
    ///
    /// The offset must have been returned by [`ArenaMap::reserve`] with the
    /// same key and value types, on the given arena or on a byte-identical
    /// copy of it.
    pub fn from_offset(offset: u32) -> Self {
        Self {
            offset,
            _phantom: PhantomData,
        }
    }

    /// Returns the byte offset of the map's region inside its arena.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Returns a key-existence view of the same region.
    pub fn key_view(&self) -> KeyView<K> {
        KeyView::from_offset(self.offset)
    }
}

impl<K: Pod + Eq + Hash, V: Pod> ArenaMap<K, V> {
    /// Reserves a region for an empty map with a fixed bucket count.
    ///
    /// The region holds the header, the hash array (filled with the empty
    /// sentinel), the key array, and the value array. The bucket count is
    /// final: the map can never grow past it.
    pub fn reserve(arena: &mut Arena, bucket_count: u32) -> Result<Self, ArenaError> {
        assert!(
            bucket_count > 0 && bucket_count <= i32::MAX as u32,
            "bucket count {bucket_count} is outside the supported range"
        );
        let (region, layout) = MapRegion::compute::<K, V>(bucket_count);
        let offset = arena.reserve(layout)?;
        arena.write(
            offset,
            TableHeader {
                count: 0,
                bucket_count: bucket_count as i32,
            },
        );
        arena
            .slice_mut::<i32>(offset + region.probe.hashes, bucket_count)
            .fill(EMPTY_HASH);
        log::trace!("map with {bucket_count} buckets reserved at offset {offset}");
        Ok(Self::from_offset(offset))
    }

    fn header(&self, arena: &Arena) -> TableHeader {
        arena.read(self.offset)
    }

    /// Looks up the value stored for `key`.
    pub fn get(&self, arena: &Arena, key: &K) -> Option<V> {
        let header = self.header(arena);
        let cap = header.bucket_count as u32;
        let (region, _) = MapRegion::compute::<K, V>(cap);
        match probe(arena, self.offset, region.probe, cap, key_hash(key), key) {
            Probe::Found(slot) => Some(arena.read(region.value_offset::<V>(self.offset, slot))),
            Probe::Empty(_) | Probe::Full => None,
        }
    }

    /// Like [`ArenaMap::get`], but reports a missing key as
    /// [`TableError::KeyNotFound`].
    pub fn value(&self, arena: &Arena, key: &K) -> Result<V, TableError> {
        self.get(arena, key).ok_or(TableError::KeyNotFound)
    }

    /// Checks whether `key` is present.
    pub fn contains_key(&self, arena: &Arena, key: &K) -> bool {
        self.key_view().contains(arena, key)
    }

    /// Inserts or updates the value stored for `key`.
    ///
    /// When the key is already present its value is overwritten in place
    /// and the previous value returned; the entry count and slot structure
    /// stay untouched. Otherwise the entry goes into the first empty slot
    /// on the key's probe sequence.
    ///
    /// Fails with [`TableError::CapacityExhausted`] when a full wrap finds
    /// every slot taken by other keys; the map is left unchanged.
    pub fn insert(&self, arena: &mut Arena, key: K, value: V) -> Result<Option<V>, TableError> {
        let header = self.header(arena);
        let cap = header.bucket_count as u32;
        let (region, _) = MapRegion::compute::<K, V>(cap);
        let hash = key_hash(&key);
        match probe(arena, self.offset, region.probe, cap, hash, &key) {
            Probe::Found(slot) => {
                let slot_value = arena.get_mut::<V>(region.value_offset::<V>(self.offset, slot));
                Ok(Some(std::mem::replace(slot_value, value)))
            }
            Probe::Empty(slot) => {
                arena.write(region.probe.hash_offset(self.offset, slot), hash);
                arena.write(region.probe.key_offset::<K>(self.offset, slot), key);
                arena.write(region.value_offset::<V>(self.offset, slot), value);
                arena.get_mut::<TableHeader>(self.offset).count += 1;
                Ok(None)
            }
            Probe::Full => Err(TableError::CapacityExhausted { capacity: cap }),
        }
    }

    /// Returns the number of keys stored.
    pub fn len(&self, arena: &Arena) -> u32 {
        self.header(arena).count as u32
    }

    /// Returns `true` when no keys are stored.
    pub fn is_empty(&self, arena: &Arena) -> bool {
        self.len(arena) == 0
    }

    /// Returns the fixed number of bucket slots.
    pub fn bucket_count(&self, arena: &Arena) -> u32 {
        self.header(arena).bucket_count as u32
    }

    /// Returns the key of the `index`-th occupied slot in slot order.
    ///
    /// This positional surface exists for debugging and enumeration; it
    /// scans the slot array, costing O(bucket count) per call.
    pub fn key_at(&self, arena: &Arena, index: u32) -> Result<K, TableError> {
        let header = self.header(arena);
        let (region, _) = MapRegion::compute::<K, V>(header.bucket_count as u32);
        let slot = occupied_slot(arena, self.offset, region.probe, header, index)?;
        Ok(arena.read(region.probe.key_offset::<K>(self.offset, slot)))
    }

    /// Returns the value of the `index`-th occupied slot in slot order.
    ///
    /// See [`ArenaMap::key_at`] for the cost caveat.
    pub fn value_at(&self, arena: &Arena, index: u32) -> Result<V, TableError> {
        let header = self.header(arena);
        let (region, _) = MapRegion::compute::<K, V>(header.bucket_count as u32);
        let slot = occupied_slot(arena, self.offset, region.probe, header, index)?;
        Ok(arena.read(region.value_offset::<V>(self.offset, slot)))
    }

    /// Iterates over the stored entries in slot order.
    pub fn iter<'a>(&self, arena: &'a Arena) -> MapIter<'a, K, V> {
        let header = self.header(arena);
        let cap = header.bucket_count as u32;
        let (region, _) = MapRegion::compute::<K, V>(cap);
        MapIter {
            arena,
            base: self.offset,
            region,
            bucket_count: cap,
            slot: 0,
            _phantom: PhantomData,
        }
    }
}

/// Iterator over the entries of an [`ArenaMap`], in slot order.
pub struct MapIter<'a, K, V> {
    arena: &'a Arena,
    base: u32,
    region: MapRegion,
    bucket_count: u32,
    slot: u32,
    _phantom: PhantomData<(K, V)>,
}

impl<K: Pod, V: Pod> Iterator for MapIter<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.slot < self.bucket_count {
            let slot = self.slot;
            self.slot += 1;
            let stored = self
                .arena
                .read::<i32>(self.region.probe.hash_offset(self.base, slot));
            if stored != EMPTY_HASH {
                let key = self
                    .arena
                    .read::<K>(self.region.probe.key_offset::<K>(self.base, slot));
                let value = self
                    .arena
                    .read::<V>(self.region.value_offset::<V>(self.base, slot));
                return Some((key, value));
            }
        }
        None
    }
}

/// Read-only key-existence view over an [`ArenaMap`] region.
///
/// The view is binary-layout-compatible with the map for every value type:
/// it touches only the header, the hash array, and the key array, whose
/// offsets do not depend on the value type. A caller holding the region
/// offset of some `ArenaMap<K, V>` can therefore answer "is this key
/// present" without naming `V` and without any risk of touching the value
/// array.
pub struct KeyView<K> {
    offset: u32,
    _phantom: PhantomData<K>,
}

impl<K> Clone for KeyView<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for KeyView<K> {}

impl<K> fmt::Debug for KeyView<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyView")
            .field("offset", &self.offset)
            .finish()
    }
}

impl<K> KeyView<K> {
    /// Reinterprets a raw region offset as a key view.
    ///
    /// The offset must address a region created by [`ArenaMap::reserve`]
    /// with key type `K`, in the given arena or a byte-identical copy.
    pub fn from_offset(offset: u32) -> Self {
        Self {
            offset,
            _phantom: PhantomData,
        }
    }

    /// Returns the byte offset of the underlying region.
    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl<K: Pod + Eq + Hash> KeyView<K> {
    fn header(&self, arena: &Arena) -> TableHeader {
        arena.read(self.offset)
    }

    fn probe_arrays(bucket_count: u32) -> ProbeArrays {
        let mut builder = RegionBuilder::new();
        ProbeArrays::build::<K>(&mut builder, bucket_count)
    }

    /// Checks whether `key` is present in the underlying map.
    pub fn contains(&self, arena: &Arena, key: &K) -> bool {
        let header = self.header(arena);
        let cap = header.bucket_count as u32;
        let arrays = Self::probe_arrays(cap);
        matches!(
            probe(arena, self.offset, arrays, cap, key_hash(key), key),
            Probe::Found(_)
        )
    }

    /// Returns the number of keys stored in the underlying map.
    pub fn len(&self, arena: &Arena) -> u32 {
        self.header(arena).count as u32
    }

    /// Returns `true` when the underlying map is empty.
    pub fn is_empty(&self, arena: &Arena) -> bool {
        self.len(arena) == 0
    }

    /// Returns the fixed number of bucket slots of the underlying map.
    pub fn bucket_count(&self, arena: &Arena) -> u32 {
        self.header(arena).bucket_count as u32
    }

    /// Returns the key of the `index`-th occupied slot in slot order.
    pub fn key_at(&self, arena: &Arena, index: u32) -> Result<K, TableError> {
        let header = self.header(arena);
        let arrays = Self::probe_arrays(header.bucket_count as u32);
        let slot = occupied_slot(arena, self.offset, arrays, header, index)?;
        Ok(arena.read(arrays.key_offset::<K>(self.offset, slot)))
    }
}
