#![allow(missing_docs)] // test only
use std::hash::{BuildHasher, BuildHasherDefault, Hash};

use arena_table::{ArenaMap, ArenaMultiMap, ArenaSet, KeyView, TableError};
use bump_arena::Arena;
use hashbrown::HashTable;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use zwohash::ZwoHasher;

/// Computes the reference-model hash of a value using the crate's default
/// hasher.
fn hash_ref<T: Hash>(value: &T) -> u64 {
    <BuildHasherDefault<ZwoHasher>>::default().hash_one(value)
}

fn arena_for(bytes: usize) -> Arena {
    Arena::with_capacity(bytes)
}

/// Map under test driven in lockstep with a `hashbrown::HashTable` model.
struct CheckedMap {
    arena: Arena,
    dut: ArenaMap<u64, u64>,
    model: HashTable<(u64, u64)>,
    bucket_count: u32,
}

impl CheckedMap {
    fn new(bucket_count: u32) -> Self {
        let mut arena = arena_for(64 * bucket_count as usize + 1024);
        let dut = ArenaMap::reserve(&mut arena, bucket_count).unwrap();
        Self {
            arena,
            dut,
            model: HashTable::new(),
            bucket_count,
        }
    }

    fn insert(&mut self, key: u64, value: u64) {
        let dut_result = self.dut.insert(&mut self.arena, key, value);
        if self.model.find(hash_ref(&key), |&(k, _)| k == key).is_none()
            && self.model.len() == self.bucket_count as usize
        {
            assert_eq!(
                dut_result,
                Err(TableError::CapacityExhausted {
                    capacity: self.bucket_count,
                })
            );
            return;
        }
        match self.model.entry(
            hash_ref(&key),
            |&(k, _)| k == key,
            |&(k, _)| hash_ref(&k),
        ) {
            hashbrown::hash_table::Entry::Occupied(mut entry) => {
                let previous = entry.get().1;
                entry.get_mut().1 = value;
                assert_eq!(dut_result, Ok(Some(previous)));
            }
            hashbrown::hash_table::Entry::Vacant(entry) => {
                entry.insert((key, value));
                assert_eq!(dut_result, Ok(None));
            }
        }
    }

    fn check(&self) {
        assert_eq!(self.dut.len(&self.arena) as usize, self.model.len());
        for &(key, value) in self.model.iter() {
            assert_eq!(self.dut.get(&self.arena, &key), Some(value));
            assert_eq!(self.dut.value(&self.arena, &key), Ok(value));
            assert!(self.dut.contains_key(&self.arena, &key));
        }
        for (key, value) in self.dut.iter(&self.arena) {
            assert_eq!(
                self.model.find(hash_ref(&key), |&(k, _)| k == key),
                Some(&(key, value)),
            );
        }
    }
}

#[test]
fn test_map_random_workload() {
    let mut rng = Pcg64Mcg::seed_from_u64(0x6d61_7031);
    for bucket_count in [1, 2, 7, 64, 500] {
        let mut map = CheckedMap::new(bucket_count);
        for _ in 0..4 * bucket_count {
            map.insert(rng.gen_range(0..2 * bucket_count as u64), rng.gen());
        }
        map.check();
        for key in 0..4 * bucket_count as u64 {
            assert_eq!(
                map.dut.get(&map.arena, &key).is_some(),
                map.model
                    .find(hash_ref(&key), |&(k, _)| k == key)
                    .is_some(),
            );
        }
    }
}

#[test]
fn test_map_update_is_idempotent() {
    let mut arena = arena_for(4096);
    let map = ArenaMap::<u64, u64>::reserve(&mut arena, 16).unwrap();
    assert_eq!(map.insert(&mut arena, 7, 100), Ok(None));
    let len = map.len(&arena);
    for round in 0..10 {
        assert_eq!(map.insert(&mut arena, 7, 200 + round), Ok(Some(
            if round == 0 { 100 } else { 200 + round - 1 }
        )));
        assert_eq!(map.len(&arena), len);
        assert_eq!(map.get(&arena, &7), Some(200 + round));
    }
}

#[test]
fn test_map_full_capacity_then_overflow() {
    let bucket_count = 64u32;
    let mut arena = arena_for(64 * bucket_count as usize + 1024);
    let map = ArenaMap::<u64, u64>::reserve(&mut arena, bucket_count).unwrap();
    for key in 0..bucket_count as u64 {
        assert_eq!(map.insert(&mut arena, key, key * 10), Ok(None));
    }
    assert_eq!(map.len(&arena), bucket_count);
    for key in 0..bucket_count as u64 {
        assert_eq!(map.get(&arena, &key), Some(key * 10));
    }
    assert_eq!(map.get(&arena, &(bucket_count as u64)), None);
    assert_eq!(
        map.insert(&mut arena, bucket_count as u64, 0),
        Err(TableError::CapacityExhausted {
            capacity: bucket_count,
        })
    );
    // updating an existing key still works on a full table
    assert_eq!(map.insert(&mut arena, 3, 1000), Ok(Some(30)));
    assert_eq!(map.get(&arena, &3), Some(1000));
}

#[test]
fn test_map_concrete_scenario() {
    type Tag = [u8; 4];
    let mut arena = arena_for(1024);
    let map = ArenaMap::<u64, Tag>::reserve(&mut arena, 4).unwrap();
    for (key, tag) in [(1, *b"aaaa"), (2, *b"bbbb"), (3, *b"cccc"), (4, *b"dddd")] {
        assert_eq!(map.insert(&mut arena, key, tag), Ok(None));
    }
    assert_eq!(map.get(&arena, &2), Some(*b"bbbb"));
    assert_eq!(
        map.insert(&mut arena, 5, *b"eeee"),
        Err(TableError::CapacityExhausted { capacity: 4 })
    );
    // the failed insert corrupted nothing
    assert_eq!(map.get(&arena, &2), Some(*b"bbbb"));
    assert_eq!(map.len(&arena), 4);
}

#[test]
fn test_map_positional_access() {
    let mut arena = arena_for(4096);
    let map = ArenaMap::<u64, u64>::reserve(&mut arena, 32).unwrap();
    for key in 10..15u64 {
        map.insert(&mut arena, key, key + 1).unwrap();
    }
    let len = map.len(&arena);
    assert_eq!(len, 5);
    let mut seen = Vec::new();
    for index in 0..len {
        let key = map.key_at(&arena, index).unwrap();
        assert_eq!(map.value_at(&arena, index).unwrap(), key + 1);
        seen.push(key);
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![10, 11, 12, 13, 14]);
    assert_eq!(
        map.key_at(&arena, len),
        Err(TableError::OutOfBounds { index: len, len })
    );
    assert_eq!(map.value(&arena, &99), Err(TableError::KeyNotFound));
}

#[test]
fn test_key_view_is_value_type_independent() {
    // Two maps with the same key type but different value types; the view
    // only touches the value-independent prefix of the region.
    let mut arena = arena_for(8192);
    let small = ArenaMap::<u64, u32>::reserve(&mut arena, 16).unwrap();
    let wide = ArenaMap::<u64, [u8; 24]>::reserve(&mut arena, 16).unwrap();
    for key in 0..10u64 {
        small.insert(&mut arena, key, key as u32).unwrap();
        wide.insert(&mut arena, key * 100, [7; 24]).unwrap();
    }

    let view_small: KeyView<u64> = KeyView::from_offset(small.offset());
    let view_wide: KeyView<u64> = wide.key_view();
    assert_eq!(view_small.len(&arena), 10);
    for key in 0..10u64 {
        assert!(view_small.contains(&arena, &key));
        assert!(!view_small.contains(&arena, &(key + 10)));
        assert!(view_wide.contains(&arena, &(key * 100)));
        assert!(!view_wide.contains(&arena, &(key * 100 + 1)));
    }
    let mut keys: Vec<u64> = (0..view_small.len(&arena))
        .map(|index| view_small.key_at(&arena, index).unwrap())
        .collect();
    keys.sort_unstable();
    assert_eq!(keys, (0..10).collect::<Vec<_>>());
}

/// Set under test driven in lockstep with a `hashbrown::HashTable` model.
struct CheckedSet {
    arena: Arena,
    dut: ArenaSet<u64>,
    model: HashTable<u64>,
    bucket_count: u32,
}

impl CheckedSet {
    fn new(bucket_count: u32) -> Self {
        let mut arena = arena_for(64 * bucket_count as usize + 1024);
        let dut = ArenaSet::reserve(&mut arena, bucket_count).unwrap();
        Self {
            arena,
            dut,
            model: HashTable::new(),
            bucket_count,
        }
    }

    fn insert(&mut self, value: u64) {
        let dut_result = self.dut.insert(&mut self.arena, value);
        if self.model.find(hash_ref(&value), |&v| v == value).is_some() {
            assert_eq!(dut_result, Ok(false));
        } else if self.model.len() == self.bucket_count as usize {
            assert_eq!(
                dut_result,
                Err(TableError::CapacityExhausted {
                    capacity: self.bucket_count,
                })
            );
        } else {
            self.model
                .insert_unique(hash_ref(&value), value, |&v| hash_ref(&v));
            assert_eq!(dut_result, Ok(true));
        }
    }

    fn check(&self) {
        assert_eq!(self.dut.len(&self.arena) as usize, self.model.len());
        for &value in self.model.iter() {
            assert!(self.dut.contains(&self.arena, &value));
        }
        for value in self.dut.iter(&self.arena) {
            assert!(self
                .model
                .find(hash_ref(&value), |&v| v == value)
                .is_some());
        }
    }
}

#[test]
fn test_set_random_workload() {
    let mut rng = Pcg64Mcg::seed_from_u64(0x7365_7431);
    for bucket_count in [1, 2, 7, 64, 500] {
        let mut set = CheckedSet::new(bucket_count);
        for _ in 0..4 * bucket_count {
            set.insert(rng.gen_range(0..3 * bucket_count as u64));
        }
        set.check();
    }
}

#[test]
fn test_set_no_duplication() {
    let mut arena = arena_for(4096);
    let set = ArenaSet::<u64>::reserve(&mut arena, 8).unwrap();
    // eight values across eight buckets; some share a bucket chain
    for value in 0..8u64 {
        assert_eq!(set.insert(&mut arena, value), Ok(true));
    }
    let before: Vec<u64> = set.iter(&arena).collect();
    for value in 0..8u64 {
        assert_eq!(set.insert(&mut arena, value), Ok(false));
        assert_eq!(set.len(&arena), 8);
        assert!(set.contains(&arena, &value));
    }
    // duplicate inserts disturbed neither order nor links
    assert_eq!(set.iter(&arena).collect::<Vec<_>>(), before);
}

#[test]
fn test_set_capacity_ceiling() {
    let mut arena = arena_for(4096);
    let set = ArenaSet::<u64>::reserve(&mut arena, 5).unwrap();
    for value in 0..5u64 {
        assert_eq!(set.insert(&mut arena, value), Ok(true));
    }
    assert_eq!(
        set.insert(&mut arena, 5),
        Err(TableError::CapacityExhausted { capacity: 5 })
    );
    assert_eq!(set.len(&arena), 5);
    for value in 0..5u64 {
        assert!(set.contains(&arena, &value));
    }
    assert!(!set.contains(&arena, &5));
}

#[test]
fn test_set_positional_access_is_insertion_ordered() {
    let mut arena = arena_for(4096);
    let set = ArenaSet::<u64>::reserve(&mut arena, 16).unwrap();
    let values = [11u64, 3, 99, 42];
    for &value in &values {
        set.insert(&mut arena, value).unwrap();
    }
    for (index, &value) in values.iter().enumerate() {
        assert_eq!(set.value_at(&arena, index as u32), Ok(value));
    }
    assert_eq!(
        set.value_at(&arena, 4),
        Err(TableError::OutOfBounds { index: 4, len: 4 })
    );
    assert_eq!(set.iter(&arena).len(), 4);
}

/// Expected per-key enumeration order: the first-inserted value (the
/// anchor) first, then the remaining values in reverse insertion order.
fn expected_order(inserted: &[u64]) -> Vec<u64> {
    let mut expected = Vec::with_capacity(inserted.len());
    if let Some((&first, rest)) = inserted.split_first() {
        expected.push(first);
        expected.extend(rest.iter().rev().copied());
    }
    expected
}

/// Multi-map under test driven in lockstep with a `HashMap<K, Vec<V>>`
/// model that records per-key insertion order.
struct CheckedMultiMap {
    arena: Arena,
    dut: ArenaMultiMap<u64, u64>,
    model: std::collections::HashMap<u64, Vec<u64>>,
    pairs: u32,
    bucket_count: u32,
}

impl CheckedMultiMap {
    fn new(bucket_count: u32) -> Self {
        let mut arena = arena_for(64 * bucket_count as usize + 1024);
        let dut = ArenaMultiMap::reserve(&mut arena, bucket_count).unwrap();
        Self {
            arena,
            dut,
            model: Default::default(),
            pairs: 0,
            bucket_count,
        }
    }

    fn insert(&mut self, key: u64, value: u64) {
        let dut_result = self.dut.insert(&mut self.arena, key, value);
        if self.pairs == self.bucket_count {
            assert_eq!(
                dut_result,
                Err(TableError::CapacityExhausted {
                    capacity: self.bucket_count,
                })
            );
            return;
        }
        assert_eq!(dut_result, Ok(()));
        self.model.entry(key).or_default().push(value);
        self.pairs += 1;
    }

    fn check(&self) {
        assert_eq!(self.dut.len(&self.arena), self.pairs);
        assert_eq!(
            self.dut.distinct_key_count(&self.arena) as usize,
            self.model.len()
        );
        for (key, inserted) in &self.model {
            assert!(self.dut.contains_key(&self.arena, key));
            assert_eq!(
                self.dut.value_count(&self.arena, key) as usize,
                inserted.len()
            );
            assert_eq!(
                self.dut.values_of(&self.arena, key).collect::<Vec<_>>(),
                expected_order(inserted),
            );
        }
        let mut distinct: Vec<u64> = self.dut.distinct_keys(&self.arena).collect();
        distinct.sort_unstable();
        let mut expected: Vec<u64> = self.model.keys().copied().collect();
        expected.sort_unstable();
        assert_eq!(distinct, expected);
    }
}

#[test]
fn test_multi_map_random_workload() {
    let mut rng = Pcg64Mcg::seed_from_u64(0x6d6d_6170);
    for bucket_count in [1, 2, 7, 64, 500] {
        let mut map = CheckedMultiMap::new(bucket_count);
        for _ in 0..2 * bucket_count {
            // a narrow key range piles several values onto most keys
            map.insert(rng.gen_range(0..bucket_count as u64 / 4 + 2), rng.gen());
        }
        map.check();
    }
}

#[test]
fn test_multi_map_value_chain_order() {
    let mut arena = arena_for(4096);
    let map = ArenaMultiMap::<u64, u64>::reserve(&mut arena, 16).unwrap();
    map.insert(&mut arena, 1, 100).unwrap();
    map.insert(&mut arena, 1, 200).unwrap();
    map.insert(&mut arena, 1, 300).unwrap();
    // anchor first, then most-recent-first for the remainder
    assert_eq!(
        map.values_of(&arena, &1).collect::<Vec<_>>(),
        vec![100, 300, 200]
    );
    assert_eq!(map.value_count(&arena, &1), 3);
    assert_eq!(map.values_of(&arena, &2).count(), 0);
}

#[test]
fn test_multi_map_distinct_keys_complete() {
    let mut arena = arena_for(8192);
    let map = ArenaMultiMap::<u64, u64>::reserve(&mut arena, 64).unwrap();
    // arbitrary per-key repetition across interleaved keys
    let inserts = [3u64, 1, 3, 2, 2, 3, 1, 5, 3, 5, 5, 5, 2, 1, 4];
    for (index, &key) in inserts.iter().enumerate() {
        map.insert(&mut arena, key, index as u64).unwrap();
    }
    let mut distinct: Vec<u64> = map.distinct_keys(&arena).collect();
    distinct.sort_unstable();
    assert_eq!(distinct, vec![1, 2, 3, 4, 5]);
    assert_eq!(map.distinct_key_count(&arena), 5);
    assert_eq!(map.len(&arena), inserts.len() as u32);
}

#[test]
fn test_multi_map_capacity_ceiling_and_integrity() {
    let mut arena = arena_for(4096);
    let map = ArenaMultiMap::<u64, u64>::reserve(&mut arena, 6).unwrap();
    map.insert(&mut arena, 1, 10).unwrap();
    map.insert(&mut arena, 1, 20).unwrap();
    map.insert(&mut arena, 2, 30).unwrap();
    map.insert(&mut arena, 1, 40).unwrap();
    map.insert(&mut arena, 3, 50).unwrap();
    map.insert(&mut arena, 2, 60).unwrap();
    assert_eq!(
        map.insert(&mut arena, 4, 70),
        Err(TableError::CapacityExhausted { capacity: 6 })
    );
    // the failed insert left every chain intact
    assert_eq!(
        map.values_of(&arena, &1).collect::<Vec<_>>(),
        vec![10, 40, 20]
    );
    assert_eq!(map.values_of(&arena, &2).collect::<Vec<_>>(), vec![30, 60]);
    assert_eq!(map.values_of(&arena, &3).collect::<Vec<_>>(), vec![50]);
    assert!(!map.contains_key(&arena, &4));
    assert_eq!(map.len(&arena), 6);
}

#[test]
fn test_multi_map_positional_access() {
    let mut arena = arena_for(4096);
    let map = ArenaMultiMap::<u64, u64>::reserve(&mut arena, 8).unwrap();
    map.insert(&mut arena, 5, 50).unwrap();
    map.insert(&mut arena, 6, 60).unwrap();
    map.insert(&mut arena, 5, 70).unwrap();
    assert_eq!(map.key_at(&arena, 0), Ok(5));
    assert_eq!(map.key_at(&arena, 1), Ok(6));
    assert_eq!(map.key_at(&arena, 2), Ok(5));
    assert_eq!(map.value_at(&arena, 2), Ok(70));
    assert_eq!(
        map.value_at(&arena, 3),
        Err(TableError::OutOfBounds { index: 3, len: 3 })
    );
}

#[test]
fn test_relocation_preserves_all_containers() {
    let mut arena = arena_for(1 << 16);
    let map = ArenaMap::<u64, u64>::reserve(&mut arena, 32).unwrap();
    let set = ArenaSet::<u64>::reserve(&mut arena, 32).unwrap();
    let multi = ArenaMultiMap::<u64, u64>::reserve(&mut arena, 32).unwrap();

    let mut rng = Pcg64Mcg::seed_from_u64(0x7265_6c6f);
    for _ in 0..24 {
        let key = rng.gen_range(0..16u64);
        map.insert(&mut arena, key, key * 2).ok();
        set.insert(&mut arena, key).ok();
        multi.insert(&mut arena, key % 5, key).ok();
    }

    // copy the raw bytes and reinterpret them in place: every handle keeps
    // working against the rebuilt arena without fix-up
    let copy = Arena::from_bytes(arena.as_bytes());
    assert_eq!(map.len(&copy), map.len(&arena));
    for key in 0..16u64 {
        assert_eq!(map.get(&copy, &key), map.get(&arena, &key));
        assert_eq!(set.contains(&copy, &key), set.contains(&arena, &key));
    }
    for key in 0..5u64 {
        assert_eq!(
            multi.values_of(&copy, &key).collect::<Vec<_>>(),
            multi.values_of(&arena, &key).collect::<Vec<_>>(),
        );
    }
    let view: KeyView<u64> = KeyView::from_offset(map.offset());
    for key in 0..16u64 {
        assert_eq!(view.contains(&copy, &key), view.contains(&arena, &key));
    }
}
