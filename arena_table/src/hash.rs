//! Key hashing for the arena containers.

use std::hash::{BuildHasher, BuildHasherDefault, Hash};

use zwohash::ZwoHasher;

use crate::header::EMPTY_HASH;

/// Computes the 32-bit stored hash of a key using the default hasher.
///
/// The full 64-bit hash is folded into 32 bits so that bucket reduction
/// sees the high word as well.
///
/// `i32::MIN` is reserved to mark empty slots in the open-addressed map, so
/// a computed hash that lands on it is remapped to `0`. Without the remap a
/// key hashing to the sentinel would be invisible to every probe loop.
#[inline]
pub fn key_hash<T: Hash + ?Sized>(value: &T) -> i32 {
    let full = <BuildHasherDefault<ZwoHasher>>::default().hash_one(value);
    let folded = (full ^ (full >> 32)) as i32;
    if folded == EMPTY_HASH {
        0
    } else {
        folded
    }
}
