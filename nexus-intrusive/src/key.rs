//! Key hashing for hash tables keyed by something other than a raw `u64`.
//!
//! [`Hash`](crate::Hash) only ever sees 64-bit hash values. Callers with
//! richer keys derive one with [`hash_key`] and layer key equality on top of
//! [`find_first`](crate::Hash::find_first) / [`find_next`](crate::Hash::find_next).
//! Equal keys always produce equal values within one process.

use core::hash::Hash;

use ahash::RandomState;

// Fixed seeds keep the hash stable for the life of the process (and across
// runs of the same build), unlike a randomly keyed `RandomState::new()`.
const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

#[inline]
fn hasher() -> RandomState {
    RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3])
}

/// Hashes `key` to the 64-bit value a [`Hash`](crate::Hash) table files it under.
///
/// ```
/// use nexus_intrusive::hash_key;
///
/// assert_eq!(hash_key("alpha"), hash_key(&String::from("alpha")));
/// assert_ne!(hash_key(&1u64), hash_key(&2u64));
/// ```
#[inline]
pub fn hash_key<K: Hash + ?Sized>(key: &K) -> u64 {
    hasher().hash_one(key)
}

/// A key paired with its precomputed hash.
///
/// Lets callers that probe the same key repeatedly hash it once.
///
/// ```
/// use nexus_intrusive::{hash_key, HashedKey};
///
/// let key = HashedKey::new("order-17");
/// assert_eq!(key.hash(), hash_key("order-17"));
/// assert_eq!(*key.key(), "order-17");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashedKey<K> {
    key: K,
    hash: u64,
}

impl<K: Hash> HashedKey<K> {
    /// Hashes `key` and keeps both.
    #[inline]
    pub fn new(key: K) -> Self {
        let hash = hash_key(&key);
        Self { key, hash }
    }
}

impl<K> HashedKey<K> {
    /// Returns the key.
    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns the precomputed hash.
    #[inline]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Consumes the pair, returning the key.
    #[inline]
    pub fn into_key(self) -> K {
        self.key
    }
}
