//! Per-level table indices extracted from a virtual address.

use kernel_memory_addresses::VirtualAddress;

macro_rules! level_index {
    ($(#[$meta:meta])* $name:ident, $shift:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name(u16);

        impl $name {
            /// Bit position of the lowest index bit in the virtual address.
            pub const SHIFT: u32 = $shift;

            /// Extract the 9-bit index from a virtual address.
            ///
            /// Returns a value in `0..512`.
            #[inline]
            #[must_use]
            #[allow(clippy::cast_possible_truncation)]
            pub const fn from(va: VirtualAddress) -> Self {
                Self(((va.as_u64() >> $shift) & 0x1FF) as u16)
            }

            /// Construct an index from a raw `u16`.
            ///
            /// ### Debug assertions
            /// - Asserts `v < 512`.
            #[inline]
            #[must_use]
            pub const fn new(v: u16) -> Self {
                debug_assert!(v < 512);
                Self(v)
            }

            #[inline]
            #[must_use]
            pub const fn as_usize(self) -> usize {
                self.0 as usize
            }
        }
    };
}

level_index!(
    /// Index into the PML4, VA bits `[47:39]`.
    L4Index,
    39
);
level_index!(
    /// Index into a PDPT, VA bits `[38:30]`.
    L3Index,
    30
);
level_index!(
    /// Index into a PD, VA bits `[29:21]`.
    L2Index,
    21
);
level_index!(
    /// Index into a PT, VA bits `[20:12]`.
    L1Index,
    12
);

#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (L4Index, L3Index, L2Index, L1Index) {
    (
        L4Index::from(va),
        L3Index::from(va),
        L2Index::from(va),
        L1Index::from(va),
    )
}
