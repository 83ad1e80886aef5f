use core::fmt;
use core::hash::Hash;

mod sealed {
    pub trait Sealed {}
}

/// Page granularities the page table builder can map with.
///
/// Sealed: only [`Size4K`] (PT leaves) and [`Size2M`] (PD leaves) exist.
pub trait PageSize: sealed::Sealed + Copy + Eq + Ord + Hash + fmt::Debug {
    /// Page size in bytes (power of two).
    const SIZE: u64;
    /// `log2(SIZE)`.
    const SHIFT: u32;
    /// Low bits that hold the in-page offset.
    const MASK: u64 = Self::SIZE - 1;

    fn as_str() -> &'static str;
}

macro_rules! page_size {
    ($(#[$meta:meta])* $name:ident, $shift:literal, $label:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl PageSize for $name {
            const SIZE: u64 = 1 << $shift;
            const SHIFT: u32 = $shift;

            #[inline]
            fn as_str() -> &'static str {
                $label
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str($label)
            }
        }
    };
}

page_size!(
    /// 4 KiB page.
    Size4K, 12, "4K"
);
page_size!(
    /// 2 MiB huge page.
    Size2M, 21, "2M"
);
