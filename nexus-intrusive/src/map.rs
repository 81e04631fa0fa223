//! Ordered map over external storage: a red-black tree with subtree sizes.
//!
//! Each element embeds a [`MapLink`] carrying its key, parent and child
//! handles, color and subtree size. The sizes make the tree an
//! order-statistics tree: [`Map::position`] (rank) and [`Map::at_position`]
//! (select) run in O(log n) alongside the usual ordered lookups.
//!
//! Duplicate keys are allowed. An insert whose key equals an existing one
//! descends right, so a run of equal keys iterates in insertion order and
//! every equality lookup returns the leftmost (oldest) element of the run.

use core::cmp::Ordering;
use core::fmt;
use core::marker::PhantomData;

use crate::link::{expect_link, expect_link_mut};
use crate::tracing_helpers::trace_log;
use crate::{Adapter, Handle, Storage, link_of};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

/// Link embedded in elements that can join a [`Map`].
///
/// Holds the element's key; the map orders by it.
#[derive(Debug, Clone)]
pub struct MapLink<K, H: Handle = u32> {
    key: K,
    parent: H,
    left: H,
    right: H,
    color: Color,
    size: usize,
}

impl<K: Default, H: Handle> Default for MapLink<K, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Default, H: Handle> MapLink<K, H> {
    /// Creates an unlinked link with a default key.
    #[inline]
    pub fn new() -> Self {
        Self {
            key: K::default(),
            parent: H::NONE,
            left: H::NONE,
            right: H::NONE,
            color: Color::Black,
            size: 0,
        }
    }
}

impl<K, H: Handle> MapLink<K, H> {
    /// Returns the key most recently assigned by a map.
    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns `true` if the element is currently in a map.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.size != 0
    }

    fn unlink(&mut self) {
        self.parent = H::NONE;
        self.left = H::NONE;
        self.right = H::NONE;
        self.color = Color::Black;
        self.size = 0;
    }
}

/// An ordered map with rank and select.
///
/// # Type Parameters
///
/// - `K`: Key type, totally ordered
/// - `A`: [`Adapter`] selecting the element's [`MapLink`] field
/// - `H`: Handle type (default `u32`)
///
/// # Example
///
/// ```
/// use nexus_intrusive::{adapter, Map, MapLink, Storage, VecStorage};
///
/// #[derive(Debug)]
/// struct Level {
///     qty: u64,
///     link: MapLink<u64>,
/// }
///
/// adapter!(ByPrice = Level { link: MapLink<u64> });
///
/// let mut storage: VecStorage<Level> = VecStorage::new();
/// let mut book: Map<u64, ByPrice> = Map::new();
///
/// for (price, qty) in [(101, 5), (99, 7), (100, 1)] {
///     let h = storage.try_insert(Level { qty, link: MapLink::new() }).unwrap();
///     book.insert(&mut storage, price, h);
/// }
///
/// let best = book.first(&storage).unwrap();
/// assert_eq!(storage[best].qty, 7);
/// assert_eq!(book.position(&storage, best), Some(0));
///
/// let mid = book.at_position(&storage, 1).unwrap();
/// assert_eq!(book.key(&storage, mid), Some(&100));
/// ```
pub struct Map<K, A, H: Handle = u32> {
    root: H,
    len: usize,
    _marker: PhantomData<fn() -> (K, A)>,
}

impl<K, A, H: Handle> fmt::Debug for Map<K, A, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("root", &self.root)
            .field("len", &self.len)
            .finish()
    }
}

impl<K, A, H: Handle> Default for Map<K, A, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, A, H: Handle> Map<K, A, H> {
    /// Creates an empty map.
    #[inline]
    pub const fn new() -> Self {
        Self {
            root: H::NONE,
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Returns the number of elements in the map.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the map holds no elements.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<K, A, H> Map<K, A, H>
where
    K: Ord,
    H: Handle,
    A: Adapter<Link = MapLink<K, H>>,
{
    // ========================================================================
    // Mutation
    // ========================================================================

    /// Inserts the element at `handle` under `key`.
    ///
    /// Equal keys are allowed; the new element goes after existing ones.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not a live element of `storage`, or if the
    /// element is already in a map.
    pub fn insert<S>(&mut self, storage: &mut S, key: K, handle: H)
    where
        S: Storage<A::Element, Handle = H>,
    {
        // Fail before any ancestor size is touched.
        assert!(
            !expect_link::<A, S>(storage, handle).is_linked(),
            "element already in a map"
        );

        let mut parent = H::NONE;
        let mut go_left = false;
        let mut cur = self.root;
        while cur.is_some() {
            let node = link_mut::<K, A, S, H>(storage, cur);
            node.size += 1;
            parent = cur;
            go_left = key < node.key;
            cur = if go_left { node.left } else { node.right };
        }

        let node = link_mut::<K, A, S, H>(storage, handle);
        node.key = key;
        node.parent = parent;
        node.left = H::NONE;
        node.right = H::NONE;
        node.color = Color::Red;
        node.size = 1;

        if parent.is_none() {
            self.root = handle;
        } else if go_left {
            link_mut::<K, A, S, H>(storage, parent).left = handle;
        } else {
            link_mut::<K, A, S, H>(storage, parent).right = handle;
        }
        self.len += 1;

        self.insert_fixup(storage, handle);
    }

    /// Removes the element at `handle` and clears its link.
    ///
    /// Returns `false`, changing nothing, if it is not in the map.
    pub fn remove<S>(&mut self, storage: &mut S, handle: H) -> bool
    where
        S: Storage<A::Element, Handle = H>,
    {
        if !self.is_member(storage, handle) {
            return false;
        }

        let node = link::<K, A, S, H>(storage, handle);
        if node.left.is_some() && node.right.is_some() {
            let successor = self.leftmost(storage, node.right);
            self.swap_with_successor(storage, handle, successor);
        }

        // At most one child now.
        let node = link::<K, A, S, H>(storage, handle);
        if node.color == Color::Black {
            let child = if node.left.is_some() {
                node.left
            } else {
                node.right
            };
            if child.is_some() {
                // A black node with one child has a red leaf child.
                link_mut::<K, A, S, H>(storage, child).color = Color::Black;
            } else {
                self.remove_fixup(storage, handle);
            }
        }

        self.cut(storage, handle);
        true
    }

    /// Removes and returns the element with the smallest key.
    pub fn remove_first<S>(&mut self, storage: &mut S) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        let first = self.first(storage)?;
        self.remove(storage, first);
        Some(first)
    }

    /// Removes and returns the element with the largest key.
    pub fn remove_last<S>(&mut self, storage: &mut S) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        let last = self.last(storage)?;
        self.remove(storage, last);
        Some(last)
    }

    /// Moves the element at `handle` to `new_key` (remove, then insert).
    pub fn rekey<S>(&mut self, storage: &mut S, handle: H, new_key: K)
    where
        S: Storage<A::Element, Handle = H>,
    {
        self.remove(storage, handle);
        self.insert(storage, new_key, handle);
    }

    /// Unlinks every element, clearing each link. O(len).
    pub fn remove_all<S>(&mut self, storage: &mut S)
    where
        S: Storage<A::Element, Handle = H>,
    {
        trace_log!(len = self.len, "clearing map");
        let mut stack = Vec::new();
        if self.root.is_some() {
            stack.push(self.root);
        }
        while let Some(cur) = stack.pop() {
            let node = link_mut::<K, A, S, H>(storage, cur);
            stack.extend([node.left, node.right].into_iter().filter(|h| h.is_some()));
            node.unlink();
        }
        self.root = H::NONE;
        self.len = 0;
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Returns some element with `key`, not necessarily the first of its run.
    pub fn find<S>(&self, storage: &S, key: &K) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        let mut cur = self.root;
        while cur.is_some() {
            let node = link::<K, A, S, H>(storage, cur);
            cur = match key.cmp(&node.key) {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => return Some(cur),
            };
        }
        None
    }

    /// Returns the first (oldest) element with `key`.
    pub fn find_first<S>(&self, storage: &S, key: &K) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        let found = self.find(storage, key)?;
        Some(self.leftmost_equal(storage, found))
    }

    /// Returns the element after `cur` if it has the same key.
    pub fn find_next<S>(&self, storage: &S, cur: H) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        let next = self.next(storage, cur)?;
        (link::<K, A, S, H>(storage, next).key == link::<K, A, S, H>(storage, cur).key)
            .then_some(next)
    }

    /// Returns the first element with `key`, or else the last element with
    /// a smaller key.
    pub fn find_lower_inclusive<S>(&self, storage: &S, key: &K) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        match self.descend(storage, key)? {
            Descent::Equal(h) => Some(self.leftmost_equal(storage, h)),
            Descent::Miss { leaf, went_left } => self.below_miss(storage, leaf, went_left),
        }
    }

    /// Returns the first element with `key`, or else the first element with
    /// a larger key.
    pub fn find_upper_inclusive<S>(&self, storage: &S, key: &K) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        match self.descend(storage, key)? {
            Descent::Equal(h) => Some(self.leftmost_equal(storage, h)),
            Descent::Miss { leaf, went_left } => self.above_miss(storage, leaf, went_left),
        }
    }

    /// Returns the last element with a key smaller than `key`.
    pub fn find_lower_exclusive<S>(&self, storage: &S, key: &K) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        match self.descend(storage, key)? {
            Descent::Equal(h) => {
                let first = self.leftmost_equal(storage, h);
                self.prev(storage, first)
            }
            Descent::Miss { leaf, went_left } => self.below_miss(storage, leaf, went_left),
        }
    }

    /// Returns the first element with a key larger than `key`.
    pub fn find_upper_exclusive<S>(&self, storage: &S, key: &K) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        match self.descend(storage, key)? {
            Descent::Equal(h) => {
                let mut last = h;
                while let Some(next) = self.find_next(storage, last) {
                    last = next;
                }
                self.next(storage, last)
            }
            Descent::Miss { leaf, went_left } => self.above_miss(storage, leaf, went_left),
        }
    }

    /// Returns the element with the smallest key.
    pub fn first<S>(&self, storage: &S) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        self.root
            .is_some()
            .then(|| self.leftmost(storage, self.root))
    }

    /// Returns the element with the largest key.
    pub fn last<S>(&self, storage: &S) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        if self.root.is_none() {
            return None;
        }
        let mut cur = self.root;
        loop {
            let right = link::<K, A, S, H>(storage, cur).right;
            if right.is_none() {
                return Some(cur);
            }
            cur = right;
        }
    }

    /// Returns the in-order successor of `cur`.
    pub fn next<S>(&self, storage: &S, cur: H) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        let node = link::<K, A, S, H>(storage, cur);
        if node.right.is_some() {
            return Some(self.leftmost(storage, node.right));
        }

        let mut child = cur;
        let mut parent = node.parent;
        while parent.is_some() {
            let p = link::<K, A, S, H>(storage, parent);
            if p.right != child {
                return Some(parent);
            }
            child = parent;
            parent = p.parent;
        }
        None
    }

    /// Returns the in-order predecessor of `cur`.
    pub fn prev<S>(&self, storage: &S, cur: H) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        let node = link::<K, A, S, H>(storage, cur);
        if node.left.is_some() {
            let mut walk = node.left;
            loop {
                let right = link::<K, A, S, H>(storage, walk).right;
                if right.is_none() {
                    return Some(walk);
                }
                walk = right;
            }
        }

        let mut child = cur;
        let mut parent = node.parent;
        while parent.is_some() {
            let p = link::<K, A, S, H>(storage, parent);
            if p.left != child {
                return Some(parent);
            }
            child = parent;
            parent = p.parent;
        }
        None
    }

    /// Returns the 0-based in-order rank of the element at `handle`.
    ///
    /// `None` if it is not in the map. O(log n).
    pub fn position<S>(&self, storage: &S, handle: H) -> Option<usize>
    where
        S: Storage<A::Element, Handle = H>,
    {
        if !self.is_member(storage, handle) {
            return None;
        }

        let node = link::<K, A, S, H>(storage, handle);
        let mut rank = size::<K, A, S, H>(storage, node.left);
        let mut child = handle;
        let mut parent = node.parent;
        while parent.is_some() {
            let p = link::<K, A, S, H>(storage, parent);
            if p.right == child {
                rank += size::<K, A, S, H>(storage, p.left) + 1;
            }
            child = parent;
            parent = p.parent;
        }
        Some(rank)
    }

    /// Returns the element at 0-based in-order rank `index`. O(log n).
    pub fn at_position<S>(&self, storage: &S, index: usize) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        if index >= self.len {
            return None;
        }

        let mut index = index;
        let mut cur = self.root;
        while cur.is_some() {
            let node = link::<K, A, S, H>(storage, cur);
            let left = size::<K, A, S, H>(storage, node.left);
            cur = match index.cmp(&left) {
                Ordering::Less => node.left,
                Ordering::Equal => return Some(cur),
                Ordering::Greater => {
                    index -= left + 1;
                    node.right
                }
            };
        }
        None
    }

    /// Returns the key of the element at `handle`.
    ///
    /// For an element no longer in a map this is the last key it had.
    #[inline]
    pub fn key<'a, S>(&self, storage: &'a S, handle: H) -> Option<&'a K>
    where
        S: Storage<A::Element, Handle = H>,
    {
        link_of::<A, S>(storage, handle).map(MapLink::key)
    }

    /// Returns `true` if the element at `handle` is in this map.
    ///
    /// O(log n + run of equal keys).
    pub fn contains<S>(&self, storage: &S, handle: H) -> bool
    where
        S: Storage<A::Element, Handle = H>,
    {
        if !self.is_member(storage, handle) {
            return false;
        }
        let key = &link::<K, A, S, H>(storage, handle).key;
        let mut cur = self.find_first(storage, key);
        while let Some(h) = cur {
            if h == handle {
                return true;
            }
            cur = self.find_next(storage, h);
        }
        false
    }

    /// Iterates elements in key order.
    pub fn iter<'a, S>(&'a self, storage: &'a S) -> Iter<'a, K, A, S, H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        Iter {
            map: self,
            storage,
            next: H::from_option(self.first(storage)),
            remaining: self.len,
        }
    }

    /// Returns the number of nodes on the longest root-to-leaf path.
    pub fn height<S>(&self, storage: &S) -> usize
    where
        S: Storage<A::Element, Handle = H>,
    {
        let mut height = 0;
        let mut stack = Vec::new();
        if self.root.is_some() {
            stack.push((self.root, 1));
        }
        while let Some((cur, depth)) = stack.pop() {
            height = height.max(depth);
            let node = link::<K, A, S, H>(storage, cur);
            for child in [node.left, node.right] {
                if child.is_some() {
                    stack.push((child, depth + 1));
                }
            }
        }
        height
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn is_member<S>(&self, storage: &S, handle: H) -> bool
    where
        S: Storage<A::Element, Handle = H>,
    {
        match link_of::<A, S>(storage, handle) {
            Some(link) if link.size != 0 => {}
            _ => return false,
        }
        // Another map's element is linked too; only its root tells them apart.
        let mut cur = handle;
        loop {
            let parent = link::<K, A, S, H>(storage, cur).parent;
            if parent.is_none() {
                return cur == self.root;
            }
            cur = parent;
        }
    }

    fn leftmost<S>(&self, storage: &S, mut cur: H) -> H
    where
        S: Storage<A::Element, Handle = H>,
    {
        loop {
            let left = link::<K, A, S, H>(storage, cur).left;
            if left.is_none() {
                return cur;
            }
            cur = left;
        }
    }

    // Walks back over predecessors holding the same key as `found`.
    fn leftmost_equal<S>(&self, storage: &S, found: H) -> H
    where
        S: Storage<A::Element, Handle = H>,
    {
        let key = &link::<K, A, S, H>(storage, found).key;
        let mut first = found;
        while let Some(prev) = self.prev(storage, first) {
            if link::<K, A, S, H>(storage, prev).key != *key {
                break;
            }
            first = prev;
        }
        first
    }

    fn descend<S>(&self, storage: &S, key: &K) -> Option<Descent<H>>
    where
        S: Storage<A::Element, Handle = H>,
    {
        let mut cur = self.root;
        while cur.is_some() {
            let node = link::<K, A, S, H>(storage, cur);
            let (went_left, child) = match key.cmp(&node.key) {
                Ordering::Equal => return Some(Descent::Equal(cur)),
                Ordering::Less => (true, node.left),
                Ordering::Greater => (false, node.right),
            };
            if child.is_none() {
                return Some(Descent::Miss {
                    leaf: cur,
                    went_left,
                });
            }
            cur = child;
        }
        None
    }

    // Greatest element below a missed key.
    fn below_miss<S>(&self, storage: &S, leaf: H, went_left: bool) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        if went_left {
            self.prev(storage, leaf)
        } else {
            Some(leaf)
        }
    }

    // Smallest element above a missed key.
    fn above_miss<S>(&self, storage: &S, leaf: H, went_left: bool) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        if went_left {
            Some(leaf)
        } else {
            self.next(storage, leaf)
        }
    }

    fn replace_child<S>(&mut self, storage: &mut S, parent: H, old: H, new: H)
    where
        S: Storage<A::Element, Handle = H>,
    {
        if parent.is_none() {
            self.root = new;
            return;
        }
        let p = link_mut::<K, A, S, H>(storage, parent);
        if p.left == old {
            p.left = new;
        } else {
            p.right = new;
        }
    }

    fn set_parent<S>(storage: &mut S, child: H, parent: H)
    where
        S: Storage<A::Element, Handle = H>,
    {
        if child.is_some() {
            link_mut::<K, A, S, H>(storage, child).parent = parent;
        }
    }

    //     x               y
    //    / \             / \
    //   a   y    ->     x   c
    //      / \         / \
    //     b   c       a   b
    fn rotate_left<S>(&mut self, storage: &mut S, x: H)
    where
        S: Storage<A::Element, Handle = H>,
    {
        let (x_parent, a, y, x_size) = {
            let n = link::<K, A, S, H>(storage, x);
            (n.parent, n.left, n.right, n.size)
        };
        let b = link::<K, A, S, H>(storage, y).left;

        link_mut::<K, A, S, H>(storage, x).right = b;
        Self::set_parent(storage, b, x);

        self.replace_child(storage, x_parent, x, y);
        let y_node = link_mut::<K, A, S, H>(storage, y);
        y_node.parent = x_parent;
        y_node.left = x;
        y_node.size = x_size;

        let x_size = size::<K, A, S, H>(storage, a) + size::<K, A, S, H>(storage, b) + 1;
        let x_node = link_mut::<K, A, S, H>(storage, x);
        x_node.parent = y;
        x_node.size = x_size;
    }

    //       x           y
    //      / \         / \
    //     y   c  ->   a   x
    //    / \             / \
    //   a   b           b   c
    fn rotate_right<S>(&mut self, storage: &mut S, x: H)
    where
        S: Storage<A::Element, Handle = H>,
    {
        let (x_parent, y, c, x_size) = {
            let n = link::<K, A, S, H>(storage, x);
            (n.parent, n.left, n.right, n.size)
        };
        let b = link::<K, A, S, H>(storage, y).right;

        link_mut::<K, A, S, H>(storage, x).left = b;
        Self::set_parent(storage, b, x);

        self.replace_child(storage, x_parent, x, y);
        let y_node = link_mut::<K, A, S, H>(storage, y);
        y_node.parent = x_parent;
        y_node.right = x;
        y_node.size = x_size;

        let x_size = size::<K, A, S, H>(storage, b) + size::<K, A, S, H>(storage, c) + 1;
        let x_node = link_mut::<K, A, S, H>(storage, x);
        x_node.parent = y;
        x_node.size = x_size;
    }

    fn insert_fixup<S>(&mut self, storage: &mut S, mut z: H)
    where
        S: Storage<A::Element, Handle = H>,
    {
        loop {
            let parent = link::<K, A, S, H>(storage, z).parent;
            if color::<K, A, S, H>(storage, parent) == Color::Black {
                break;
            }
            // A red parent is never the root, so the grandparent exists.
            let grand = link::<K, A, S, H>(storage, parent).parent;
            let parent_is_left = link::<K, A, S, H>(storage, grand).left == parent;
            let uncle = {
                let g = link::<K, A, S, H>(storage, grand);
                if parent_is_left { g.right } else { g.left }
            };

            if color::<K, A, S, H>(storage, uncle) == Color::Red {
                set_color::<K, A, S, H>(storage, parent, Color::Black);
                set_color::<K, A, S, H>(storage, uncle, Color::Black);
                set_color::<K, A, S, H>(storage, grand, Color::Red);
                z = grand;
                continue;
            }

            let mut parent = parent;
            if parent_is_left {
                if link::<K, A, S, H>(storage, parent).right == z {
                    z = parent;
                    self.rotate_left(storage, z);
                    parent = link::<K, A, S, H>(storage, z).parent;
                }
                set_color::<K, A, S, H>(storage, parent, Color::Black);
                set_color::<K, A, S, H>(storage, grand, Color::Red);
                self.rotate_right(storage, grand);
            } else {
                if link::<K, A, S, H>(storage, parent).left == z {
                    z = parent;
                    self.rotate_right(storage, z);
                    parent = link::<K, A, S, H>(storage, z).parent;
                }
                set_color::<K, A, S, H>(storage, parent, Color::Black);
                set_color::<K, A, S, H>(storage, grand, Color::Red);
                self.rotate_left(storage, grand);
            }
        }
        set_color::<K, A, S, H>(storage, self.root, Color::Black);
    }

    // Restores black height around `x`, a black node about to be cut that is
    // still in place. Empty children count as black.
    fn remove_fixup<S>(&mut self, storage: &mut S, mut x: H)
    where
        S: Storage<A::Element, Handle = H>,
    {
        while x != self.root && color::<K, A, S, H>(storage, x) == Color::Black {
            let parent = link::<K, A, S, H>(storage, x).parent;
            let x_is_left = link::<K, A, S, H>(storage, parent).left == x;
            let sibling_of = |storage: &S| {
                let p = link::<K, A, S, H>(storage, parent);
                if x_is_left { p.right } else { p.left }
            };

            let mut w = sibling_of(&*storage);
            if color::<K, A, S, H>(storage, w) == Color::Red {
                set_color::<K, A, S, H>(storage, w, Color::Black);
                set_color::<K, A, S, H>(storage, parent, Color::Red);
                if x_is_left {
                    self.rotate_left(storage, parent);
                } else {
                    self.rotate_right(storage, parent);
                }
                w = sibling_of(&*storage);
            }

            let (near, far) = {
                let n = link::<K, A, S, H>(storage, w);
                if x_is_left {
                    (n.left, n.right)
                } else {
                    (n.right, n.left)
                }
            };

            if color::<K, A, S, H>(storage, near) == Color::Black
                && color::<K, A, S, H>(storage, far) == Color::Black
            {
                set_color::<K, A, S, H>(storage, w, Color::Red);
                x = parent;
                continue;
            }

            if color::<K, A, S, H>(storage, far) == Color::Black {
                set_color::<K, A, S, H>(storage, near, Color::Black);
                set_color::<K, A, S, H>(storage, w, Color::Red);
                if x_is_left {
                    self.rotate_right(storage, w);
                } else {
                    self.rotate_left(storage, w);
                }
                w = sibling_of(&*storage);
            }

            let parent_color = color::<K, A, S, H>(storage, parent);
            set_color::<K, A, S, H>(storage, w, parent_color);
            set_color::<K, A, S, H>(storage, parent, Color::Black);
            let far = {
                let n = link::<K, A, S, H>(storage, w);
                if x_is_left { n.right } else { n.left }
            };
            set_color::<K, A, S, H>(storage, far, Color::Black);
            if x_is_left {
                self.rotate_left(storage, parent);
            } else {
                self.rotate_right(storage, parent);
            }
            x = self.root;
        }
        set_color::<K, A, S, H>(storage, x, Color::Black);
    }

    // Exchanges the tree positions of `h` and its in-order successor `s`
    // (leftmost of h's right subtree), colors and sizes included. Keys stay
    // with their elements.
    fn swap_with_successor<S>(&mut self, storage: &mut S, h: H, s: H)
    where
        S: Storage<A::Element, Handle = H>,
    {
        let (h_parent, h_left, h_right, h_color, h_size) = {
            let n = link::<K, A, S, H>(storage, h);
            (n.parent, n.left, n.right, n.color, n.size)
        };
        let (s_parent, s_right, s_color, s_size) = {
            let n = link::<K, A, S, H>(storage, s);
            (n.parent, n.right, n.color, n.size)
        };

        self.replace_child(storage, h_parent, h, s);
        Self::set_parent(storage, h_left, s);

        let s_new_right = if s_parent == h {
            h
        } else {
            link_mut::<K, A, S, H>(storage, s_parent).left = h;
            Self::set_parent(storage, h_right, s);
            h_right
        };

        let s_node = link_mut::<K, A, S, H>(storage, s);
        s_node.parent = h_parent;
        s_node.left = h_left;
        s_node.right = s_new_right;
        s_node.color = h_color;
        s_node.size = h_size;

        Self::set_parent(storage, s_right, h);
        let h_new_parent = if s_parent == h { s } else { s_parent };
        let h_node = link_mut::<K, A, S, H>(storage, h);
        h_node.parent = h_new_parent;
        h_node.left = H::NONE;
        h_node.right = s_right;
        h_node.color = s_color;
        h_node.size = s_size;
    }

    // Splices out `h`, which has at most one child, and clears its link.
    fn cut<S>(&mut self, storage: &mut S, h: H)
    where
        S: Storage<A::Element, Handle = H>,
    {
        let (parent, child) = {
            let n = link::<K, A, S, H>(storage, h);
            (n.parent, if n.left.is_some() { n.left } else { n.right })
        };

        Self::set_parent(storage, child, parent);
        self.replace_child(storage, parent, h, child);

        let mut cur = parent;
        while cur.is_some() {
            let n = link_mut::<K, A, S, H>(storage, cur);
            n.size -= 1;
            cur = n.parent;
        }

        link_mut::<K, A, S, H>(storage, h).unlink();
        self.len -= 1;
    }
}

enum Descent<H> {
    Equal(H),
    Miss { leaf: H, went_left: bool },
}

#[inline]
#[track_caller]
fn link<K, A, S, H>(storage: &S, h: H) -> &MapLink<K, H>
where
    H: Handle,
    A: Adapter<Link = MapLink<K, H>>,
    S: Storage<A::Element, Handle = H>,
{
    expect_link::<A, S>(storage, h)
}

#[inline]
#[track_caller]
fn link_mut<K, A, S, H>(storage: &mut S, h: H) -> &mut MapLink<K, H>
where
    H: Handle,
    A: Adapter<Link = MapLink<K, H>>,
    S: Storage<A::Element, Handle = H>,
{
    expect_link_mut::<A, S>(storage, h)
}

#[inline]
fn size<K, A, S, H>(storage: &S, h: H) -> usize
where
    H: Handle,
    A: Adapter<Link = MapLink<K, H>>,
    S: Storage<A::Element, Handle = H>,
{
    if h.is_none() {
        0
    } else {
        link::<K, A, S, H>(storage, h).size
    }
}

#[inline]
fn color<K, A, S, H>(storage: &S, h: H) -> Color
where
    H: Handle,
    A: Adapter<Link = MapLink<K, H>>,
    S: Storage<A::Element, Handle = H>,
{
    if h.is_none() {
        Color::Black
    } else {
        link::<K, A, S, H>(storage, h).color
    }
}

#[inline]
fn set_color<K, A, S, H>(storage: &mut S, h: H, color: Color)
where
    H: Handle,
    A: Adapter<Link = MapLink<K, H>>,
    S: Storage<A::Element, Handle = H>,
{
    if h.is_some() {
        link_mut::<K, A, S, H>(storage, h).color = color;
    }
}

/// Iterator over a [`Map`] in key order.
pub struct Iter<'a, K, A, S, H: Handle> {
    map: &'a Map<K, A, H>,
    storage: &'a S,
    next: H,
    remaining: usize,
}

impl<'a, K, A, S, H> Iterator for Iter<'a, K, A, S, H>
where
    K: Ord,
    H: Handle,
    A: Adapter<Link = MapLink<K, H>>,
    S: Storage<A::Element, Handle = H>,
{
    type Item = H;

    fn next(&mut self) -> Option<H> {
        let cur = self.next.to_option()?;
        self.next = H::from_option(self.map.next(self.storage, cur));
        self.remaining = self.remaining.saturating_sub(1);
        Some(cur)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
