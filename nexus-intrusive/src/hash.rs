//! Singly-chained hash table over external storage.
//!
//! Each bucket holds the handle of the first element in its chain and each
//! element's [`HashLink`] holds the next handle plus the element's full
//! 64-bit hash. The table never looks at keys: lookups filter a chain on
//! exact hash equality and callers layer key equality on top (see
//! [`hash_key`](crate::hash_key)).
//!
//! Two sizing modes share one implementation, selected by a const parameter:
//!
//! | Mode | Buckets | Spot | Growth |
//! |------|---------|------|--------|
//! | [`StaticHash`] | fixed at construction | `hash % buckets` | never; `reserve` is an error |
//! | [`DynamicHash`] | power of two | `hash & (buckets - 1)` | automatic, 25% headroom |
//!
//! # Example
//!
//! ```
//! use nexus_intrusive::{adapter, DynamicHash, HashLink, Storage, VecStorage, hash_key};
//!
//! #[derive(Debug)]
//! struct Session {
//!     user: String,
//!     link: HashLink,
//! }
//!
//! adapter!(ByUser = Session { link: HashLink });
//!
//! let mut storage: VecStorage<Session> = VecStorage::new();
//! let mut sessions: DynamicHash<ByUser> = DynamicHash::new();
//!
//! for user in ["ana", "bo", "ana"] {
//!     let h = storage
//!         .try_insert(Session { user: user.into(), link: HashLink::new() })
//!         .unwrap();
//!     sessions.insert(&mut storage, hash_key(user), h);
//! }
//!
//! // Both "ana" sessions share one hash value.
//! let anas: Vec<_> = sessions.matches(&storage, hash_key("ana")).collect();
//! assert_eq!(anas.len(), 2);
//! assert!(anas.iter().all(|&h| storage[h].user == "ana"));
//! ```

use core::fmt;
use core::marker::PhantomData;
use core::mem;

use crate::link::{expect_link, expect_link_mut};
use crate::tracing_helpers::{debug_log, warn_log};
use crate::{Adapter, Handle, Storage, TableError, link_of};

// =============================================================================
// Mode Constants
// =============================================================================

/// Static mode - bucket count fixed at construction.
pub const STATIC: bool = true;

/// Dynamic mode - power-of-two bucket count, grows on demand.
pub const DYNAMIC: bool = false;

/// Smallest bucket count a dynamic table shrinks its growth target to.
pub const MIN_DYNAMIC_BUCKETS: usize = 8;

/// Hash table with a fixed bucket count.
pub type StaticHash<A, H = u32> = Hash<A, H, STATIC>;

/// Hash table that grows in powers of two.
pub type DynamicHash<A, H = u32> = Hash<A, H, DYNAMIC>;

// =============================================================================
// HashLink
// =============================================================================

/// Link embedded in elements that can join a [`Hash`].
///
/// Zero-valued (no next element, hash 0) until inserted; cleared on removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashLink<H: Handle = u32> {
    next: H,
    hash: u64,
}

impl<H: Handle> Default for HashLink<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Handle> HashLink<H> {
    /// Creates an unlinked link.
    #[inline]
    pub const fn new() -> Self {
        Self {
            next: H::NONE,
            hash: 0,
        }
    }

    /// Returns the hash value recorded at insertion (0 when unlinked).
    #[inline]
    pub const fn hash(&self) -> u64 {
        self.hash
    }

    /// Returns `true` if the link state alone proves table membership.
    ///
    /// An element filed under hash 0 at the tail of its chain is a member
    /// whose link still looks zero-valued; [`Hash::contains`] handles it.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.hash != 0 || self.next.is_some()
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Configures a [`DynamicHash`], or a [`StaticHash`] via [`fixed`](Self::fixed).
///
/// ```
/// use nexus_intrusive::{adapter, DynamicHash, HashBuilder, HashLink, StaticHash};
///
/// struct Entry { link: HashLink }
/// adapter!(EntryLink = Entry { link: HashLink });
///
/// let table: DynamicHash<EntryLink> = HashBuilder::default()
///     .min_buckets(16)
///     .capacity(1000)
///     .build()
///     .unwrap();
/// assert_eq!(table.table_size(), 2048);
///
/// let table: StaticHash<EntryLink> = HashBuilder::default()
///     .fixed()
///     .buckets(500)
///     .build()
///     .unwrap();
/// assert_eq!(table.table_size(), 500);
/// ```
#[derive(Debug, Clone)]
pub struct HashBuilder {
    min_buckets: usize,
    capacity: usize,
}

/// Configures a [`StaticHash`].
///
/// Created via `HashBuilder::default().fixed()`.
#[derive(Debug, Clone)]
pub struct StaticHashBuilder {
    buckets: Option<usize>,
}

impl Default for HashBuilder {
    fn default() -> Self {
        Self {
            min_buckets: MIN_DYNAMIC_BUCKETS,
            capacity: 0,
        }
    }
}

impl HashBuilder {
    /// Lower bound on the bucket count, rounded up to a power of two.
    pub fn min_buckets(mut self, buckets: usize) -> Self {
        self.min_buckets = buckets;
        self
    }

    /// Elements the table must hold before its first resize.
    pub fn capacity(mut self, elements: usize) -> Self {
        self.capacity = elements;
        self
    }

    /// Switches to a static table. A capacity set earlier becomes the
    /// default bucket count.
    pub fn fixed(self) -> StaticHashBuilder {
        StaticHashBuilder {
            buckets: (self.capacity > 0).then_some(self.capacity),
        }
    }

    /// Builds the dynamic table.
    pub fn build<A, H: Handle>(self) -> Result<DynamicHash<A, H>, TableError> {
        if self.min_buckets == 0 {
            return Err(TableError::ZeroBuckets);
        }
        let min_buckets =
            self.min_buckets
                .checked_next_power_of_two()
                .ok_or(TableError::CapacityOverflow {
                    requested: self.min_buckets,
                })?;
        let buckets = bucket_count_for(self.capacity)?.max(min_buckets);

        Ok(Hash::from_parts(buckets, min_buckets))
    }
}

impl StaticHashBuilder {
    /// Number of buckets, fixed for the life of the table.
    pub fn buckets(mut self, buckets: usize) -> Self {
        self.buckets = Some(buckets);
        self
    }

    /// Builds the static table.
    pub fn build<A, H: Handle>(self) -> Result<StaticHash<A, H>, TableError> {
        match self.buckets {
            Some(buckets) if buckets > 0 => Ok(Hash::from_parts(buckets, buckets)),
            _ => Err(TableError::ZeroBuckets),
        }
    }
}

/// Power-of-two bucket count that fits `count` elements with 25% headroom.
#[inline]
fn bucket_count_for(count: usize) -> Result<usize, TableError> {
    count
        .checked_add(count >> 2)
        .and_then(usize::checked_next_power_of_two)
        .ok_or(TableError::CapacityOverflow { requested: count })
}

#[cold]
#[track_caller]
fn capacity_overflow(err: TableError) -> ! {
    panic!("{err}")
}

// =============================================================================
// Hash
// =============================================================================

/// An intrusive chained hash table.
///
/// # Type Parameters
///
/// - `A`: [`Adapter`] selecting the element's [`HashLink`] field
/// - `H`: Handle type (default `u32`)
/// - `MODE`: [`STATIC`] or [`DYNAMIC`] (default); use the
///   [`StaticHash`] / [`DynamicHash`] aliases
///
/// # Storage Invariant
///
/// A table must always be used with the same storage instance, and an
/// element must be removed from the table before it is removed from storage.
pub struct Hash<A, H: Handle = u32, const MODE: bool = DYNAMIC> {
    buckets: Vec<H>,
    len: usize,
    min_buckets: usize,
    _marker: PhantomData<fn() -> A>,
}

impl<A, H: Handle, const MODE: bool> fmt::Debug for Hash<A, H, MODE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hash")
            .field("static", &(MODE == STATIC))
            .field("len", &self.len)
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

impl<A, H: Handle> Default for DynamicHash<A, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, H: Handle> DynamicHash<A, H> {
    /// Creates an empty table with [`MIN_DYNAMIC_BUCKETS`] buckets.
    pub fn new() -> Self {
        Self::from_parts(MIN_DYNAMIC_BUCKETS, MIN_DYNAMIC_BUCKETS)
    }
}

impl<A, H: Handle> StaticHash<A, H> {
    /// Creates an empty table with exactly `buckets` buckets.
    ///
    /// # Panics
    ///
    /// Panics if `buckets` is 0.
    pub fn with_buckets(buckets: usize) -> Self {
        assert!(buckets > 0, "bucket count must be > 0");
        Self::from_parts(buckets, buckets)
    }
}

impl<A, H: Handle, const MODE: bool> Hash<A, H, MODE> {
    fn from_parts(buckets: usize, min_buckets: usize) -> Self {
        Self {
            buckets: vec![H::NONE; buckets],
            len: 0,
            min_buckets,
            _marker: PhantomData,
        }
    }

    /// Returns the number of elements in the table.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table holds no elements.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of buckets.
    #[inline]
    pub fn table_size(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the number of non-empty buckets. O(buckets), diagnostic only.
    pub fn table_used(&self) -> usize {
        if self.len <= 1 {
            return self.len;
        }
        self.buckets.iter().filter(|head| head.is_some()).count()
    }

    /// Returns `true` for a [`StaticHash`].
    #[inline]
    pub const fn is_static(&self) -> bool {
        MODE == STATIC
    }

    #[inline]
    fn spot(&self, hash: u64) -> usize {
        spot_for::<MODE>(hash, self.buckets.len())
    }

    /// Bucket count needed to hold `count` elements, or `None` if the
    /// current table already suffices.
    fn buckets_needed(&self, count: usize) -> Result<Option<usize>, TableError> {
        let wanted = count
            .checked_add(count >> 2)
            .ok_or(TableError::CapacityOverflow { requested: count })?;
        if wanted <= self.buckets.len() {
            return Ok(None);
        }
        Ok(Some(bucket_count_for(count)?.max(self.min_buckets)))
    }
}

#[inline]
fn spot_for<const MODE: bool>(hash: u64, buckets: usize) -> usize {
    if MODE == STATIC {
        (hash % buckets as u64) as usize
    } else {
        (hash & (buckets as u64 - 1)) as usize
    }
}

impl<A, H, const MODE: bool> Hash<A, H, MODE>
where
    H: Handle,
    A: Adapter<Link = HashLink<H>>,
{
    // ========================================================================
    // Mutation
    // ========================================================================

    /// Files the element at `handle` under `hash`.
    ///
    /// Prepends to the bucket chain, so among equal hashes the most recent
    /// insert is found first. Dynamic tables grow first if needed.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not a live element of `storage`, or if a dynamic
    /// table would need more buckets than `usize` can index.
    pub fn insert<S>(&mut self, storage: &mut S, hash: u64, handle: H)
    where
        S: Storage<A::Element, Handle = H>,
    {
        debug_assert!(
            !self.contains(storage, handle),
            "element already in table"
        );

        if MODE == DYNAMIC {
            match self.buckets_needed(self.len + 1) {
                Ok(Some(buckets)) => self.rehash(storage, buckets),
                Ok(None) => {}
                Err(err) => capacity_overflow(err),
            }
        }

        let spot = self.spot(hash);
        let link = expect_link_mut::<A, S>(storage, handle);
        link.hash = hash;
        link.next = self.buckets[spot];
        self.buckets[spot] = handle;
        self.len += 1;
    }

    /// Unlinks the element at `handle` and clears its link.
    ///
    /// Returns `false`, changing nothing, if the element is not in this
    /// table (including dead or sentinel handles). O(chain length).
    pub fn remove<S>(&mut self, storage: &mut S, handle: H) -> bool
    where
        S: Storage<A::Element, Handle = H>,
    {
        let Some(link) = link_of::<A, S>(storage, handle) else {
            return false;
        };
        let spot = self.spot(link.hash);

        let mut prev = H::NONE;
        let mut cur = self.buckets[spot];
        while cur.is_some() {
            let next = expect_link::<A, S>(storage, cur).next;
            if cur == handle {
                if prev.is_none() {
                    self.buckets[spot] = next;
                } else {
                    expect_link_mut::<A, S>(storage, prev).next = next;
                }
                *expect_link_mut::<A, S>(storage, handle) = HashLink::new();
                self.len -= 1;
                return true;
            }
            prev = cur;
            cur = next;
        }
        false
    }

    /// Refiles the element at `handle` under `new_hash` (remove, then insert).
    pub fn rekey<S>(&mut self, storage: &mut S, handle: H, new_hash: u64)
    where
        S: Storage<A::Element, Handle = H>,
    {
        self.remove(storage, handle);
        self.insert(storage, new_hash, handle);
    }

    /// Grows a dynamic table so `count` elements fit without another resize.
    ///
    /// # Errors
    ///
    /// - [`TableError::StaticTable`] on a static table
    /// - [`TableError::CapacityOverflow`] if the bucket count would overflow
    pub fn reserve<S>(&mut self, storage: &mut S, count: usize) -> Result<(), TableError>
    where
        S: Storage<A::Element, Handle = H>,
    {
        if MODE == STATIC {
            warn_log!(
                buckets = self.buckets.len(),
                count,
                "reserve rejected on static table"
            );
            return Err(TableError::StaticTable {
                buckets: self.buckets.len(),
            });
        }

        if let Some(buckets) = self.buckets_needed(count)? {
            self.rehash(storage, buckets);
        }
        Ok(())
    }

    /// Unlinks every element, clearing each link. O(buckets + len).
    pub fn remove_all<S>(&mut self, storage: &mut S)
    where
        S: Storage<A::Element, Handle = H>,
    {
        for head in self.buckets.iter_mut() {
            let mut cur = mem::replace(head, H::NONE);
            while cur.is_some() {
                let link = expect_link_mut::<A, S>(storage, cur);
                cur = link.next;
                *link = HashLink::new();
            }
        }
        self.len = 0;
    }

    // Moves every element into a fresh bucket array. Each old chain is
    // reversed before refiling because prepending would otherwise invert
    // the relative order of elements that land in the same new bucket.
    fn rehash<S>(&mut self, storage: &mut S, buckets: usize)
    where
        S: Storage<A::Element, Handle = H>,
    {
        debug_assert!(MODE == DYNAMIC && buckets.is_power_of_two());
        debug_log!(
            from = self.buckets.len(),
            to = buckets,
            len = self.len,
            "resizing hash table"
        );

        let old = mem::replace(&mut self.buckets, vec![H::NONE; buckets]);
        if self.len == 0 {
            return;
        }

        let mask = buckets as u64 - 1;
        for mut cur in old {
            let mut reversed = H::NONE;
            while cur.is_some() {
                let link = expect_link_mut::<A, S>(storage, cur);
                let next = link.next;
                link.next = reversed;
                reversed = cur;
                cur = next;
            }

            cur = reversed;
            while cur.is_some() {
                let link = expect_link_mut::<A, S>(storage, cur);
                let next = link.next;
                let spot = (link.hash & mask) as usize;
                link.next = self.buckets[spot];
                self.buckets[spot] = cur;
                cur = next;
            }
        }
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Returns the hash the element at `handle` was filed under.
    ///
    /// `Some(0)` for an unlinked element; `None` for a dead handle.
    #[inline]
    pub fn hash_of<S>(&self, storage: &S, handle: H) -> Option<u64>
    where
        S: Storage<A::Element, Handle = H>,
    {
        link_of::<A, S>(storage, handle).map(HashLink::hash)
    }

    /// Returns the first element in `hash`'s chain filed under exactly `hash`.
    pub fn find_first<S>(&self, storage: &S, hash: u64) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        let head = self.buckets[self.spot(hash)];
        next_match::<A, S, H>(storage, head, hash).to_option()
    }

    /// Returns the next element after `prev` filed under the same hash.
    pub fn find_next<S>(&self, storage: &S, prev: H) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        let link = link_of::<A, S>(storage, prev)?;
        next_match::<A, S, H>(storage, link.next, link.hash).to_option()
    }

    /// Iterates the elements filed under exactly `hash`.
    pub fn matches<'a, S>(&self, storage: &'a S, hash: u64) -> Matches<'a, A, S, H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        Matches {
            storage,
            hash,
            next: H::from_option(self.find_first(storage, hash)),
            _marker: PhantomData,
        }
    }

    /// Returns the first element in bucket order.
    pub fn walk_first(&self) -> Option<H> {
        if self.len == 0 {
            return None;
        }
        self.buckets.iter().copied().find(|head| head.is_some())
    }

    /// Returns the element after `prev` in bucket-major, chain-minor order.
    pub fn walk_next<S>(&self, storage: &S, prev: H) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        let link = link_of::<A, S>(storage, prev)?;
        if link.next.is_some() {
            return Some(link.next);
        }
        let spot = self.spot(link.hash);
        self.buckets[spot + 1..]
            .iter()
            .copied()
            .find(|head| head.is_some())
    }

    /// Iterates every element in bucket-major, chain-minor order.
    pub fn iter<'a, S>(&'a self, storage: &'a S) -> Walk<'a, A, S, H, MODE>
    where
        S: Storage<A::Element, Handle = H>,
    {
        Walk {
            table: self,
            storage,
            next: H::from_option(self.walk_first()),
            remaining: self.len,
        }
    }

    /// Returns `true` if the element at `handle` is in this table.
    ///
    /// O(1) when the link is nonzero. A zero-valued link is either unlinked
    /// or the tail of bucket 0's chain under hash 0, which is then scanned.
    pub fn contains<S>(&self, storage: &S, handle: H) -> bool
    where
        S: Storage<A::Element, Handle = H>,
    {
        let Some(link) = link_of::<A, S>(storage, handle) else {
            return false;
        };
        if link.is_linked() {
            return true;
        }

        let mut cur = self.buckets[self.spot(0)];
        while cur.is_some() {
            if cur == handle {
                return true;
            }
            cur = expect_link::<A, S>(storage, cur).next;
        }
        false
    }
}

#[inline]
fn next_match<A, S, H>(storage: &S, mut cur: H, hash: u64) -> H
where
    H: Handle,
    A: Adapter<Link = HashLink<H>>,
    S: Storage<A::Element, Handle = H>,
{
    while cur.is_some() {
        let link = expect_link::<A, S>(storage, cur);
        if link.hash == hash {
            return cur;
        }
        cur = link.next;
    }
    H::NONE
}

// =============================================================================
// Iterators
// =============================================================================

/// Iterator over every element of a [`Hash`], in bucket order.
pub struct Walk<'a, A, S, H: Handle, const MODE: bool> {
    table: &'a Hash<A, H, MODE>,
    storage: &'a S,
    next: H,
    remaining: usize,
}

impl<'a, A, S, H, const MODE: bool> Iterator for Walk<'a, A, S, H, MODE>
where
    H: Handle,
    A: Adapter<Link = HashLink<H>>,
    S: Storage<A::Element, Handle = H>,
{
    type Item = H;

    fn next(&mut self) -> Option<H> {
        let cur = self.next.to_option()?;
        self.next = H::from_option(self.table.walk_next(self.storage, cur));
        self.remaining = self.remaining.saturating_sub(1);
        Some(cur)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// Iterator over the elements of a [`Hash`] filed under one hash value.
pub struct Matches<'a, A, S, H: Handle> {
    storage: &'a S,
    hash: u64,
    next: H,
    _marker: PhantomData<fn() -> A>,
}

impl<'a, A, S, H> Iterator for Matches<'a, A, S, H>
where
    H: Handle,
    A: Adapter<Link = HashLink<H>>,
    S: Storage<A::Element, Handle = H>,
{
    type Item = H;

    fn next(&mut self) -> Option<H> {
        let cur = self.next.to_option()?;
        let after = expect_link::<A, S>(self.storage, cur).next;
        self.next = next_match::<A, S, H>(self.storage, after, self.hash);
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VecStorage;

    #[derive(Debug)]
    struct Entry {
        value: u64,
        link: HashLink,
    }

    impl Entry {
        fn new(value: u64) -> Self {
            Self {
                value,
                link: HashLink::new(),
            }
        }
    }

    crate::adapter!(EntryLink = Entry { link: HashLink });

    fn populate(storage: &mut VecStorage<Entry>, count: u64) -> Vec<u32> {
        (0..count)
            .map(|i| storage.try_insert(Entry::new(i)).unwrap())
            .collect()
    }

    fn chain(table: &StaticHash<EntryLink>, storage: &VecStorage<Entry>, spot: usize) -> Vec<u64> {
        let mut out = Vec::new();
        let mut cur = table.buckets[spot];
        while cur.is_some() {
            out.push(storage[cur].value);
            cur = storage[cur].link.next;
        }
        out
    }

    #[test]
    fn new_is_empty() {
        let table: DynamicHash<EntryLink> = DynamicHash::new();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
        assert_eq!(table.table_size(), MIN_DYNAMIC_BUCKETS);
        assert_eq!(table.table_used(), 0);
        assert!(!table.is_static());
        assert_eq!(table.walk_first(), None);
    }

    #[test]
    fn insert_find_remove() {
        let mut storage = VecStorage::new();
        let mut table: DynamicHash<EntryLink> = DynamicHash::new();
        let handles = populate(&mut storage, 3);

        for &h in &handles {
            table.insert(&mut storage, u64::from(h) * 100, h);
        }
        assert_eq!(table.len(), 3);
        assert_eq!(table.find_first(&storage, 100), Some(handles[1]));
        assert_eq!(table.hash_of(&storage, handles[2]), Some(200));
        assert_eq!(table.find_first(&storage, 300), None);

        assert!(table.remove(&mut storage, handles[1]));
        assert_eq!(table.find_first(&storage, 100), None);
        assert!(!table.contains(&storage, handles[1]));
        assert_eq!(storage[handles[1]].link, HashLink::new());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn duplicate_hashes_chain_most_recent_first() {
        let mut storage = VecStorage::new();
        let mut table: DynamicHash<EntryLink> = DynamicHash::new();
        let handles = populate(&mut storage, 4);

        for &h in &handles {
            table.insert(&mut storage, 7, h);
        }

        let found: Vec<_> = table.matches(&storage, 7).collect();
        let expected: Vec<_> = handles.iter().rev().copied().collect();
        assert_eq!(found, expected);

        let first = table.find_first(&storage, 7).unwrap();
        assert_eq!(table.find_next(&storage, first), Some(handles[2]));
    }

    #[test]
    fn find_filters_colliding_hashes() {
        let mut storage = VecStorage::new();
        let mut table: StaticHash<EntryLink> = StaticHash::with_buckets(4);
        let handles = populate(&mut storage, 4);

        // 1, 5, 9 and 13 all land in bucket 1.
        for (i, &h) in handles.iter().enumerate() {
            table.insert(&mut storage, 1 + 4 * i as u64, h);
        }

        assert_eq!(chain(&table, &storage, 1), vec![3, 2, 1, 0]);
        assert_eq!(table.matches(&storage, 9).collect::<Vec<_>>(), vec![handles[2]]);
        assert_eq!(table.find_next(&storage, handles[2]), None);
        assert_eq!(table.table_used(), 1);
    }

    #[test]
    fn static_spot_is_modulo() {
        let mut storage = VecStorage::new();
        let mut table: StaticHash<EntryLink> = StaticHash::with_buckets(10);
        let handles = populate(&mut storage, 2);

        table.insert(&mut storage, 23, handles[0]);
        table.insert(&mut storage, 9, handles[1]);

        assert_eq!(chain(&table, &storage, 3), vec![0]);
        assert_eq!(chain(&table, &storage, 9), vec![1]);
        assert_eq!(table.table_size(), 10);
    }

    #[test]
    fn remove_non_member_is_noop() {
        let mut storage = VecStorage::new();
        let mut table: DynamicHash<EntryLink> = DynamicHash::new();
        let handles = populate(&mut storage, 2);

        table.insert(&mut storage, 5, handles[0]);

        assert!(!table.remove(&mut storage, handles[1]));
        assert!(!table.remove(&mut storage, u32::NONE));
        assert!(!table.remove(&mut storage, 999));
        assert_eq!(table.len(), 1);

        assert!(table.remove(&mut storage, handles[0]));
        assert!(!table.remove(&mut storage, handles[0]));
        assert!(table.is_empty());
    }

    #[test]
    fn contains_zero_hash_tail() {
        let mut storage = VecStorage::new();
        let mut table: DynamicHash<EntryLink> = DynamicHash::new();
        let handles = populate(&mut storage, 3);

        table.insert(&mut storage, 0, handles[0]);
        assert!(!storage[handles[0]].link.is_linked());
        assert!(table.contains(&storage, handles[0]));
        assert!(!table.contains(&storage, handles[1]));

        table.insert(&mut storage, 8, handles[2]);
        assert!(table.contains(&storage, handles[0]));
        assert!(table.contains(&storage, handles[2]));
    }

    #[test]
    fn rekey_moves_between_buckets() {
        let mut storage = VecStorage::new();
        let mut table: DynamicHash<EntryLink> = DynamicHash::new();
        let h = populate(&mut storage, 1)[0];

        table.insert(&mut storage, 1, h);
        table.rekey(&mut storage, h, 6);

        assert_eq!(table.find_first(&storage, 1), None);
        assert_eq!(table.find_first(&storage, 6), Some(h));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn dynamic_growth_uses_quarter_headroom() {
        let mut storage = VecStorage::new();
        let mut table: DynamicHash<EntryLink> = DynamicHash::new();
        let handles = populate(&mut storage, 5500);

        for &h in &handles {
            table.insert(&mut storage, u64::from(h), h);
        }

        assert_eq!(table.len(), 5500);
        assert_eq!(table.table_size(), 8192);
        for &h in &handles {
            assert_eq!(table.find_first(&storage, storage[h].value), Some(h));
        }
    }

    #[test]
    fn resize_preserves_chain_order() {
        let mut storage = VecStorage::new();
        let mut table: DynamicHash<EntryLink> = DynamicHash::new();
        let handles = populate(&mut storage, 64);

        // Same hash for the first six, then enough distinct hashes to force
        // several resizes.
        for &h in &handles[..6] {
            table.insert(&mut storage, 3, h);
        }
        let before: Vec<_> = table.matches(&storage, 3).collect();

        for &h in &handles[6..] {
            table.insert(&mut storage, 1000 + u64::from(h), h);
        }
        assert!(table.table_size() > MIN_DYNAMIC_BUCKETS);

        let after: Vec<_> = table.matches(&storage, 3).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn reserve_prevents_resize() {
        let mut storage = VecStorage::new();
        let mut table: DynamicHash<EntryLink> = DynamicHash::new();
        let handles = populate(&mut storage, 1000);

        table.reserve(&mut storage, 1000).unwrap();
        let size = table.table_size();
        assert_eq!(size, 2048);

        for &h in &handles {
            table.insert(&mut storage, u64::from(h), h);
            assert_eq!(table.table_size(), size);
        }
    }

    #[test]
    fn reserve_smaller_than_current_is_noop() {
        let mut storage: VecStorage<Entry> = VecStorage::new();
        let mut table: DynamicHash<EntryLink> = DynamicHash::new();

        table.reserve(&mut storage, 3).unwrap();
        assert_eq!(table.table_size(), MIN_DYNAMIC_BUCKETS);
    }

    #[test]
    fn reserve_on_static_is_an_error() {
        let mut storage: VecStorage<Entry> = VecStorage::new();
        let mut table: StaticHash<EntryLink> = StaticHash::with_buckets(500);

        assert_eq!(
            table.reserve(&mut storage, 10),
            Err(TableError::StaticTable { buckets: 500 })
        );
        assert_eq!(table.table_size(), 500);
        assert!(table.is_static());
    }

    #[test]
    fn reserve_overflow_is_an_error() {
        let mut storage: VecStorage<Entry> = VecStorage::new();
        let mut table: DynamicHash<EntryLink> = DynamicHash::new();

        assert_eq!(
            table.reserve(&mut storage, usize::MAX),
            Err(TableError::CapacityOverflow {
                requested: usize::MAX
            })
        );
    }

    #[test]
    fn walk_visits_every_element_once() {
        let mut storage = VecStorage::new();
        let mut table: StaticHash<EntryLink> = StaticHash::with_buckets(7);
        let handles = populate(&mut storage, 50);

        for &h in &handles {
            table.insert(&mut storage, u64::from(h) * 31, h);
        }

        let mut seen: Vec<_> = table.iter(&storage).collect();
        assert_eq!(table.iter(&storage).size_hint(), (50, Some(50)));
        seen.sort_unstable();
        assert_eq!(seen, handles);

        // Bucket-major: spots are non-decreasing along the walk.
        let spots: Vec<_> = table
            .iter(&storage)
            .map(|h| (storage[h].link.hash() % 7) as usize)
            .collect();
        assert!(spots.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn remove_all_clears_links() {
        let mut storage = VecStorage::new();
        let mut table: DynamicHash<EntryLink> = DynamicHash::new();
        let handles = populate(&mut storage, 20);

        for &h in &handles {
            table.insert(&mut storage, u64::from(h) + 1, h);
        }
        table.remove_all(&mut storage);

        assert!(table.is_empty());
        assert_eq!(table.walk_first(), None);
        for &h in &handles {
            assert!(!storage[h].link.is_linked());
            assert!(!table.contains(&storage, h));
        }
    }

    #[test]
    fn builder_validates() {
        assert_eq!(
            HashBuilder::default().min_buckets(0).build::<EntryLink, u32>().err(),
            Some(TableError::ZeroBuckets)
        );
        assert_eq!(
            HashBuilder::default().fixed().build::<EntryLink, u32>().err(),
            Some(TableError::ZeroBuckets)
        );

        let table: DynamicHash<EntryLink> =
            HashBuilder::default().min_buckets(5).build().unwrap();
        assert_eq!(table.table_size(), 8);

        let table: StaticHash<EntryLink> =
            HashBuilder::default().capacity(100).fixed().build().unwrap();
        assert_eq!(table.table_size(), 100);
    }

    #[test]
    fn min_buckets_bound_growth_target() {
        let mut storage = VecStorage::new();
        let mut table: DynamicHash<EntryLink> =
            HashBuilder::default().min_buckets(64).build().unwrap();
        let handles = populate(&mut storage, 60);

        assert_eq!(table.table_size(), 64);
        for &h in &handles {
            table.insert(&mut storage, u64::from(h), h);
        }
        // 60 + 15 = 75 > 64 buckets.
        assert_eq!(table.table_size(), 128);
    }

    #[test]
    fn static_table_reports_sizing() {
        let table: StaticHash<EntryLink> = StaticHash::with_buckets(13);
        assert_eq!((table.len(), table.table_size(), table.is_static()), (0, 13, true));
        assert!(table.is_empty());
        assert!(!DynamicHash::<EntryLink>::new().is_static());
    }

    #[test]
    #[should_panic(expected = "does not refer to a live element")]
    fn insert_dead_handle_panics() {
        let mut storage: VecStorage<Entry> = VecStorage::new();
        let mut table: DynamicHash<EntryLink> = DynamicHash::new();
        table.insert(&mut storage, 1, 0);
    }
}
