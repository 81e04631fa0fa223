//! Element storage with stable handles.
//!
//! Intrusive containers never own their elements. Elements live in a
//! [`Storage`] chosen by the caller and the containers coordinate handles
//! into it, reading and writing only the link fields embedded in each
//! element. A handle stays valid until the caller removes the element.

use core::mem;
use core::ops::{Index, IndexMut};

use crate::Handle;

/// Slab-like storage with stable handles.
///
/// # Requirements
///
/// Implementations must provide:
/// - **Stable handles**: a handle remains valid until explicitly removed
/// - **O(1)** insert, remove and get operations
/// - **Slot reuse**: removed slots can be reused by future inserts
///
/// # Implementations
///
/// - [`VecStorage<T>`] - growable, in this crate
/// - `slab::Slab<T>` - growable (feature `slab`)
pub trait Storage<T> {
    /// Handle type for this storage.
    type Handle: Handle;

    /// Error type for failed insertions.
    type Error;

    /// Inserts a value, returning its stable handle.
    fn try_insert(&mut self, value: T) -> Result<Self::Handle, Self::Error>;

    /// Removes and returns the value at `handle`, if present.
    ///
    /// The element must already have been removed from every container
    /// that links it.
    fn remove(&mut self, handle: Self::Handle) -> Option<T>;

    /// Returns a reference to the value at `handle`, if present.
    fn get(&self, handle: Self::Handle) -> Option<&T>;

    /// Returns a mutable reference to the value at `handle`, if present.
    fn get_mut(&mut self, handle: Self::Handle) -> Option<&mut T>;

    /// Returns `true` if `handle` refers to a live element.
    #[inline]
    fn contains(&self, handle: Self::Handle) -> bool {
        self.get(handle).is_some()
    }
}

/// Error returned when storage cannot accept another element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the value that could not be inserted.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> core::fmt::Display for Full<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "storage handle space exhausted")
    }
}

impl<T: core::fmt::Debug> std::error::Error for Full<T> {}

// =============================================================================
// VecStorage - growable, free-list slot reuse
// =============================================================================

#[derive(Debug, Clone)]
enum Slot<T, H> {
    Occupied(T),
    Vacant { next_free: H },
}

/// Growable storage backed by a single `Vec`.
///
/// Vacant slots form a LIFO free list threaded through the slots
/// themselves, so the most recently freed handle is reused first.
///
/// # Example
///
/// ```
/// use nexus_intrusive::{Storage, VecStorage};
///
/// let mut storage: VecStorage<u64> = VecStorage::with_capacity(16);
/// let h = storage.try_insert(42).unwrap();
/// assert_eq!(storage.get(h), Some(&42));
/// assert_eq!(storage[h], 42);
///
/// assert_eq!(storage.remove(h), Some(42));
/// assert!(!storage.contains(h));
/// ```
#[derive(Debug, Clone)]
pub struct VecStorage<T, H: Handle = u32> {
    slots: Vec<Slot<T, H>>,
    free_head: H,
    len: usize,
}

impl<T, H: Handle> Default for VecStorage<T, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, H: Handle> VecStorage<T, H> {
    /// Creates empty storage.
    #[inline]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: H::NONE,
            len: 0,
        }
    }

    /// Creates storage with room for `capacity` elements before reallocating.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_head: H::NONE,
            len: 0,
        }
    }

    /// Returns the number of live elements.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no elements are stored.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of slots allocated.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Drops every element and forgets all handles.
    ///
    /// # Warning
    ///
    /// Containers still linking elements of this storage will hold dangling
    /// handles. Empty them first (`remove_all`) or drop them.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_head = H::NONE;
        self.len = 0;
    }

    /// Iterates live elements with their handles, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Occupied(value) => Some((H::from_usize(i), value)),
                Slot::Vacant { .. } => None,
            })
    }
}

impl<T, H: Handle> Storage<T> for VecStorage<T, H> {
    type Handle = H;
    type Error = Full<T>;

    fn try_insert(&mut self, value: T) -> Result<H, Full<T>> {
        if self.free_head.is_some() {
            let handle = self.free_head;
            let slot = &mut self.slots[handle.as_usize()];
            if let Slot::Vacant { next_free } = *slot {
                self.free_head = next_free;
            }
            *slot = Slot::Occupied(value);
            self.len += 1;
            return Ok(handle);
        }

        // NONE is reserved, so the last representable slot stays unused.
        if self.slots.len() >= H::NONE.as_usize() {
            return Err(Full(value));
        }

        let handle = H::from_usize(self.slots.len());
        self.slots.push(Slot::Occupied(value));
        self.len += 1;
        Ok(handle)
    }

    fn remove(&mut self, handle: H) -> Option<T> {
        if handle.is_none() {
            return None;
        }
        let slot = self.slots.get_mut(handle.as_usize())?;
        if let Slot::Vacant { .. } = slot {
            return None;
        }

        let prev = mem::replace(
            slot,
            Slot::Vacant {
                next_free: self.free_head,
            },
        );
        self.free_head = handle;
        self.len -= 1;

        match prev {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    #[inline]
    fn get(&self, handle: H) -> Option<&T> {
        match self.slots.get(handle.as_usize()) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    #[inline]
    fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        match self.slots.get_mut(handle.as_usize()) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }
}

impl<T, H: Handle> Index<H> for VecStorage<T, H> {
    type Output = T;

    #[track_caller]
    fn index(&self, handle: H) -> &T {
        match self.get(handle) {
            Some(value) => value,
            None => panic!("no element at handle {handle:?}"),
        }
    }
}

impl<T, H: Handle> IndexMut<H> for VecStorage<T, H> {
    #[track_caller]
    fn index_mut(&mut self, handle: H) -> &mut T {
        match self.get_mut(handle) {
            Some(value) => value,
            None => panic!("no element at handle {handle:?}"),
        }
    }
}

// =============================================================================
// slab::Slab implementation
// =============================================================================

#[cfg(feature = "slab")]
impl<T> Storage<T> for slab::Slab<T> {
    type Handle = usize;
    type Error = core::convert::Infallible;

    #[inline]
    fn try_insert(&mut self, value: T) -> Result<usize, Self::Error> {
        Ok(self.insert(value))
    }

    #[inline]
    fn remove(&mut self, handle: usize) -> Option<T> {
        self.try_remove(handle)
    }

    #[inline]
    fn get(&self, handle: usize) -> Option<&T> {
        slab::Slab::get(self, handle)
    }

    #[inline]
    fn get_mut(&mut self, handle: usize) -> Option<&mut T> {
        slab::Slab::get_mut(self, handle)
    }
}
