use crate::{PageSize, PhysicalAddress};
use core::fmt;
use core::marker::PhantomData;

/// Physical memory page base for size `S`.
///
/// ### Invariants
/// - The low `S::SHIFT` bits of the base are always zero (page aligned).
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pa = PhysicalAddress::new(0x0000_0008_1234_5678);
/// let pp = pa.page::<Size2M>();
/// assert_eq!(pp.base().as_u64() & (Size2M::SIZE - 1), 0);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize>(u64, PhantomData<S>);

impl<S: PageSize> PhysicalPage<S> {
    /// Wrap an address that is already `S`-aligned.
    ///
    /// ### Debug assertions
    /// - Asserts the address is aligned.
    #[inline]
    #[must_use]
    pub const fn from_addr(p: PhysicalAddress) -> Self {
        debug_assert!(p.is_aligned::<S>());
        Self(p.as_u64(), PhantomData)
    }

    /// Wrap an address if it is `S`-aligned.
    #[inline]
    #[must_use]
    pub const fn try_from_addr(p: PhysicalAddress) -> Option<Self> {
        if p.is_aligned::<S>() {
            Some(Self(p.as_u64(), PhantomData))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0)
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage<{}>({:#018X})", S::as_str(), self.0)
    }
}
