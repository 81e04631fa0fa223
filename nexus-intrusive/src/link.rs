//! Link addressing: projecting an element to one of its embedded links.
//!
//! An element may embed any number of link fields, one per container it can
//! join. An [`Adapter`] names one of those fields. It is fixed once, as a
//! type parameter of the container, and from then on every container
//! operation reaches the link through it in O(1) with no allocation.
//!
//! ```
//! use nexus_intrusive::{adapter, HashLink, MapLink};
//!
//! struct Order {
//!     id: u64,
//!     price: u64,
//!     by_id: HashLink,
//!     by_price: MapLink<u64>,
//! }
//!
//! adapter!(ById = Order { by_id: HashLink });
//! adapter!(ByPrice = Order { by_price: MapLink<u64> });
//! ```
//!
//! The same `Order` can now sit in a hash table keyed by id and a map
//! ordered by price at the same time. The adapters are the only coupling
//! between the element type and the containers.

use crate::{Handle, Storage};

/// Projects an element to one of its embedded links.
///
/// Implement by hand or with [`adapter!`](crate::adapter). Returning a link
/// that is not unique to this adapter (two adapters handing out the same
/// field to two containers) corrupts both containers and is not detected.
pub trait Adapter {
    /// Element type holding the link.
    type Element: 'static;

    /// Link type embedded in the element.
    type Link;

    /// Returns the element's link.
    fn link(element: &Self::Element) -> &Self::Link;

    /// Returns the element's link mutably.
    fn link_mut(element: &mut Self::Element) -> &mut Self::Link;
}

/// Declares a zero-sized [`Adapter`] for one link field of an element type.
///
/// ```
/// use nexus_intrusive::{adapter, Adapter, PriorityQueueLink};
///
/// pub struct Timer {
///     deadline: u64,
///     link: PriorityQueueLink<u64>,
/// }
///
/// adapter!(
///     /// Timer wheel ordering.
///     pub TimerLink = Timer { link: PriorityQueueLink<u64> }
/// );
///
/// let timer = Timer { deadline: 5, link: PriorityQueueLink::new() };
/// assert!(!TimerLink::link(&timer).is_linked());
/// ```
#[macro_export]
macro_rules! adapter {
    ($(#[$meta:meta])* $vis:vis $name:ident = $element:ty { $field:ident : $link:ty }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $name;

        impl $crate::Adapter for $name {
            type Element = $element;
            type Link = $link;

            #[inline]
            fn link(element: &$element) -> &$link {
                &element.$field
            }

            #[inline]
            fn link_mut(element: &mut $element) -> &mut $link {
                &mut element.$field
            }
        }
    };
}

/// Returns the link of the element at `handle`.
///
/// `None` if the handle is the sentinel or refers to a vacant slot.
#[inline]
pub fn link_of<A, S>(storage: &S, handle: S::Handle) -> Option<&A::Link>
where
    A: Adapter,
    S: Storage<A::Element> + ?Sized,
{
    if handle.is_none() {
        return None;
    }
    storage.get(handle).map(A::link)
}

/// Returns the link of the element at `handle` mutably.
///
/// `None` if the handle is the sentinel or refers to a vacant slot.
#[inline]
pub fn link_of_mut<A, S>(storage: &mut S, handle: S::Handle) -> Option<&mut A::Link>
where
    A: Adapter,
    S: Storage<A::Element> + ?Sized,
{
    if handle.is_none() {
        return None;
    }
    storage.get_mut(handle).map(A::link_mut)
}

// Container-internal accessors for handles that must be live. A dead handle
// here means the caller freed an element that is still linked, or passed a
// handle from different storage.

#[inline]
#[track_caller]
pub(crate) fn expect_link<A, S>(storage: &S, handle: S::Handle) -> &A::Link
where
    A: Adapter,
    S: Storage<A::Element> + ?Sized,
{
    match link_of::<A, S>(storage, handle) {
        Some(link) => link,
        None => dangling(handle),
    }
}

#[inline]
#[track_caller]
pub(crate) fn expect_link_mut<A, S>(storage: &mut S, handle: S::Handle) -> &mut A::Link
where
    A: Adapter,
    S: Storage<A::Element> + ?Sized,
{
    match link_of_mut::<A, S>(storage, handle) {
        Some(link) => link,
        None => dangling(handle),
    }
}

#[cold]
#[track_caller]
fn dangling<H: Handle>(handle: H) -> ! {
    panic!("handle {handle:?} does not refer to a live element")
}
