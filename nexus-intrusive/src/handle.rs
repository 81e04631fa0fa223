//! Element handles.
//!
//! Links never hold references to elements. They hold handles into the
//! caller's [`Storage`](crate::Storage), with a reserved sentinel standing in
//! for "no element". Using the sentinel instead of `Option<H>` keeps every
//! link field the size of the bare integer.

use core::fmt::Debug;

/// A copyable element handle with a sentinel "none" value.
///
/// # Example
///
/// ```
/// use nexus_intrusive::Handle;
///
/// let h: u32 = 7;
/// assert!(h.is_some());
/// assert!(u32::NONE.is_none());
/// assert_eq!(u32::NONE.to_option(), None);
/// ```
pub trait Handle: Copy + Eq + Debug + 'static {
    /// Sentinel value meaning "no element".
    const NONE: Self;

    /// Creates a handle from a slot number.
    fn from_usize(val: usize) -> Self;

    /// Returns the slot number this handle refers to.
    fn as_usize(self) -> usize;

    /// Returns `true` if this is the sentinel value.
    #[inline]
    fn is_none(self) -> bool {
        self == Self::NONE
    }

    /// Returns `true` if this is not the sentinel value.
    #[inline]
    fn is_some(self) -> bool {
        !self.is_none()
    }

    /// Converts the sentinel into `None`.
    #[inline]
    fn to_option(self) -> Option<Self> {
        if self.is_none() { None } else { Some(self) }
    }

    /// Converts `None` into the sentinel.
    #[inline]
    fn from_option(handle: Option<Self>) -> Self {
        handle.unwrap_or(Self::NONE)
    }
}

macro_rules! impl_handle_for_unsigned {
    ($($ty:ty),*) => {
        $(
            impl Handle for $ty {
                const NONE: Self = <$ty>::MAX;

                #[inline]
                fn from_usize(val: usize) -> Self {
                    debug_assert!(val < <$ty>::MAX as usize, "slot number exceeds handle range");
                    val as Self
                }

                #[inline]
                fn as_usize(self) -> usize {
                    self as usize
                }
            }
        )*
    };
}

impl_handle_for_unsigned!(u8, u16, u32, u64, usize);

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! test_handle_sentinel {
        ($($ty:ty => $name:ident),*) => {
            $(
                #[test]
                fn $name() {
                    assert!(<$ty>::NONE.is_none());
                    assert!((0 as $ty).is_some());
                    assert!((<$ty>::MAX - 1).is_some());
                    assert_eq!(<$ty>::NONE.to_option(), None);
                    assert_eq!(<$ty>::from_option(None), <$ty>::NONE);
                    assert_eq!(<$ty>::from_option(Some(3)), 3);
                }
            )*
        };
    }

    test_handle_sentinel!(
        u16 => u16_sentinel,
        u32 => u32_sentinel,
        u64 => u64_sentinel,
        usize => usize_sentinel
    );

    #[test]
    fn slot_number_roundtrip() {
        for i in [0usize, 1, 100, u16::MAX as usize - 1] {
            assert_eq!(u32::from_usize(i).as_usize(), i);
        }
    }
}
