//! Indexed binary min-heap over external storage.
//!
//! Each element embeds a [`PriorityQueueLink`] holding its priority and its
//! 1-based slot in the heap array (0 when not queued). Knowing the slot
//! makes arbitrary removal and reprioritisation O(log n) and membership
//! checks O(1).

use core::fmt;
use core::marker::PhantomData;

use crate::link::{expect_link, expect_link_mut};
use crate::tracing_helpers::trace_log;
use crate::{Adapter, Handle, Storage, link_of};

/// Link embedded in elements that can join a [`PriorityQueue`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityQueueLink<P> {
    slot: usize,
    priority: P,
}

impl<P: Default> Default for PriorityQueueLink<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Default> PriorityQueueLink<P> {
    /// Creates an unlinked link.
    #[inline]
    pub fn new() -> Self {
        Self {
            slot: 0,
            priority: P::default(),
        }
    }
}

impl<P> PriorityQueueLink<P> {
    /// Returns the priority most recently assigned by a queue.
    #[inline]
    pub fn priority(&self) -> &P {
        &self.priority
    }

    /// Returns `true` if the element currently occupies a heap slot.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.slot != 0
    }
}

/// A min-priority queue over external storage.
///
/// Smaller priorities come out first. Priorities only need [`PartialOrd`];
/// comparisons use `<` exclusively, so incomparable values (NaN) never move
/// an element.
///
/// # Example
///
/// ```
/// use nexus_intrusive::{adapter, PriorityQueue, PriorityQueueLink, Storage, VecStorage};
///
/// #[derive(Debug)]
/// struct Task {
///     name: &'static str,
///     link: PriorityQueueLink<u32>,
/// }
///
/// adapter!(TaskLink = Task { link: PriorityQueueLink<u32> });
///
/// let mut storage: VecStorage<Task> = VecStorage::with_capacity(16);
/// let mut queue: PriorityQueue<u32, TaskLink> = PriorityQueue::with_capacity(16);
///
/// for (name, priority) in [("low", 10), ("high", 1), ("medium", 5)] {
///     let h = storage
///         .try_insert(Task { name, link: PriorityQueueLink::new() })
///         .unwrap();
///     queue.insert(&mut storage, priority, h);
/// }
///
/// let h = queue.remove_top(&mut storage).unwrap();
/// assert_eq!(storage[h].name, "high");
/// let h = queue.remove_top(&mut storage).unwrap();
/// assert_eq!(storage[h].name, "medium");
/// let h = queue.remove_top(&mut storage).unwrap();
/// assert_eq!(storage[h].name, "low");
/// assert!(queue.is_empty());
/// ```
pub struct PriorityQueue<P, A, H: Handle = u32> {
    /// Heap-ordered storage handles.
    heap: Vec<H>,
    _marker: PhantomData<fn() -> (P, A)>,
}

impl<P, A, H: Handle> fmt::Debug for PriorityQueue<P, A, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("heap", &self.heap)
            .finish()
    }
}

impl<P, A, H: Handle> Default for PriorityQueue<P, A, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, A, H: Handle> PriorityQueue<P, A, H> {
    /// Creates an empty queue.
    #[inline]
    pub const fn new() -> Self {
        Self {
            heap: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Creates a queue with room for `capacity` elements.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity),
            _marker: PhantomData,
        }
    }

    /// Returns the number of queued elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Returns the capacity of the heap array.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.heap.capacity()
    }

    /// Returns the element with the smallest priority without removing it.
    #[inline]
    pub fn top(&self) -> Option<H> {
        self.heap.first().copied()
    }

    /// Iterates queued elements in heap-array order (not priority order).
    pub fn iter(&self) -> core::iter::Copied<core::slice::Iter<'_, H>> {
        self.heap.iter().copied()
    }
}

impl<P, A, H> PriorityQueue<P, A, H>
where
    P: PartialOrd,
    H: Handle,
    A: Adapter<Link = PriorityQueueLink<P>>,
{
    /// Queues the element at `handle` with `priority`, or reprioritises it
    /// if it is already queued.
    ///
    /// Reprioritising to an equal priority changes nothing.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not a live element of `storage`, or if the
    /// element is queued in another queue.
    pub fn insert<S>(&mut self, storage: &mut S, priority: P, handle: H)
    where
        S: Storage<A::Element, Handle = H>,
    {
        let pos = match self.position(storage, handle) {
            Some(pos) => {
                let link = expect_link_mut::<A, S>(storage, handle);
                if !(link.priority < priority || priority < link.priority) {
                    return;
                }
                link.priority = priority;
                pos
            }
            None => {
                let pos = self.heap.len();
                let link = expect_link_mut::<A, S>(storage, handle);
                assert!(link.slot == 0, "element already in another queue");
                link.priority = priority;
                link.slot = pos + 1;
                self.heap.push(handle);
                pos
            }
        };
        self.refloat(storage, pos);
    }

    /// Removes the element at `handle` from the queue.
    ///
    /// Returns `false`, changing nothing, if it is not queued here.
    pub fn remove<S>(&mut self, storage: &mut S, handle: H) -> bool
    where
        S: Storage<A::Element, Handle = H>,
    {
        let Some(pos) = self.position(storage, handle) else {
            return false;
        };
        let Some(last) = self.heap.pop() else {
            return false;
        };

        expect_link_mut::<A, S>(storage, handle).slot = 0;
        if last != handle {
            self.place(storage, pos, last);
            self.refloat(storage, pos);
        }
        true
    }

    /// Removes and returns the element with the smallest priority.
    pub fn remove_top<S>(&mut self, storage: &mut S) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        let top = self.top()?;
        self.remove(storage, top);
        Some(top)
    }

    /// Returns the top element if its priority is not greater than `priority`.
    pub fn top_with_priority<S>(&self, storage: &S, priority: &P) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        let top = self.top()?;
        let link = expect_link::<A, S>(storage, top);
        (!(*priority < link.priority)).then_some(top)
    }

    /// Removes and returns the top element if its priority is not greater
    /// than `priority`.
    ///
    /// Draining with a deadline: `while let Some(h) = q.remove_top_with_priority(s, &now)`.
    pub fn remove_top_with_priority<S>(&mut self, storage: &mut S, priority: &P) -> Option<H>
    where
        S: Storage<A::Element, Handle = H>,
    {
        let top = self.top_with_priority(storage, priority)?;
        self.remove(storage, top);
        Some(top)
    }

    /// Unqueues every element, clearing each slot. Priorities are left as-is.
    pub fn remove_all<S>(&mut self, storage: &mut S)
    where
        S: Storage<A::Element, Handle = H>,
    {
        trace_log!(len = self.heap.len(), "clearing priority queue");
        for handle in self.heap.drain(..) {
            expect_link_mut::<A, S>(storage, handle).slot = 0;
        }
    }

    /// Returns the priority of the element at `handle` if it is queued here.
    pub fn priority<'a, S>(&self, storage: &'a S, handle: H) -> Option<&'a P>
    where
        S: Storage<A::Element, Handle = H>,
    {
        self.position(storage, handle)?;
        link_of::<A, S>(storage, handle).map(PriorityQueueLink::priority)
    }

    /// Returns `true` if the element at `handle` is queued here. O(1).
    #[inline]
    pub fn contains<S>(&self, storage: &S, handle: H) -> bool
    where
        S: Storage<A::Element, Handle = H>,
    {
        self.position(storage, handle).is_some()
    }

    // 0-based heap index of `handle`, checked against this queue's array.
    #[inline]
    fn position<S>(&self, storage: &S, handle: H) -> Option<usize>
    where
        S: Storage<A::Element, Handle = H>,
    {
        let slot = link_of::<A, S>(storage, handle)?.slot;
        let pos = slot.checked_sub(1)?;
        (self.heap.get(pos) == Some(&handle)).then_some(pos)
    }

    #[inline]
    fn place<S>(&mut self, storage: &mut S, pos: usize, handle: H)
    where
        S: Storage<A::Element, Handle = H>,
    {
        self.heap[pos] = handle;
        expect_link_mut::<A, S>(storage, handle).slot = pos + 1;
    }

    // Moves the element at `pos` up while it beats its parent. Only if it
    // did not move up, moves it down toward the smaller child.
    fn refloat<S>(&mut self, storage: &mut S, pos: usize)
    where
        S: Storage<A::Element, Handle = H>,
    {
        let handle = self.heap[pos];
        let mut hole = pos;

        while hole > 0 {
            let parent = (hole - 1) / 2;
            let parent_handle = self.heap[parent];
            if !less::<P, A, S, H>(storage, handle, parent_handle) {
                break;
            }
            self.place(storage, hole, parent_handle);
            hole = parent;
        }

        if hole == pos {
            let len = self.heap.len();
            loop {
                let left = 2 * hole + 1;
                if left >= len {
                    break;
                }
                let right = left + 1;

                // Right only when the left child is not strictly smaller.
                let child = if right >= len
                    || less::<P, A, S, H>(storage, self.heap[left], self.heap[right])
                {
                    left
                } else {
                    right
                };

                let child_handle = self.heap[child];
                if !less::<P, A, S, H>(storage, child_handle, handle) {
                    break;
                }
                self.place(storage, hole, child_handle);
                hole = child;
            }
        }

        if hole != pos {
            self.place(storage, hole, handle);
        }
    }
}

#[inline]
fn less<P, A, S, H>(storage: &S, a: H, b: H) -> bool
where
    P: PartialOrd,
    H: Handle,
    A: Adapter<Link = PriorityQueueLink<P>>,
    S: Storage<A::Element, Handle = H>,
{
    expect_link::<A, S>(storage, a).priority < expect_link::<A, S>(storage, b).priority
}
