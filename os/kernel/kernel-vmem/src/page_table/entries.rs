//! # Typed page-table entries
//!
//! - [`TableEntry`]: a non-leaf entry at any level (`PS=0`), pointing to the
//!   next table.
//! - [`Pde2M`]: a 2 MiB leaf in a Page Directory (`PS=1`, PAT at bit 12).
//! - [`Pte4K`]: a 4 KiB leaf in a Page Table (PAT at bit 7).
//! - [`EntryKind`]: decoded view of a raw entry for a given level.
//!
//! Raw constructors don't validate consistency; the builders in
//! [`address_space`](crate::address_space) only create entries through
//! [`TableEntry::link`], [`Pde2M::leaf`] and [`Pte4K::leaf`].

use crate::MappingFlags;
use crate::page_table::{PRESENT_BIT, PS_BIT, TableLevel};
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size2M, Size4K};

/// Mask of bits 51:12 of an entry.
const ADDR_MASK_4K: u64 = 0x000F_FFFF_FFFF_F000;
/// Mask of bits 51:21 of an entry.
const ADDR_MASK_2M: u64 = 0x000F_FFFF_FFE0_0000;
/// Mask of bits 51:30 of an entry.
const ADDR_MASK_1G: u64 = 0x000F_FFFF_C000_0000;

/// Non-leaf entry at any level, pointing to the next table (`PS = 0`).
///
/// Only the bits the builder touches are named; dirty and global are
/// ignored by hardware in this form, and the OS-available and
/// protection-key bits stay zero.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct TableEntry {
    pub present: bool,
    pub writable: bool,
    /// U/S; must be set on every level above a user leaf.
    pub user: bool,
    pub write_through: bool,
    pub cache_disable: bool,
    pub accessed: bool,
    #[bits(1)]
    __dirty: u8,
    /// PS; always clear here.
    pub page_size: bool,
    #[bits(4)]
    __global_avl: u8,
    /// Bits 51:12 of the next table.
    #[bits(40)]
    table_frame: u64,
    #[bits(11)]
    __avl_pkey: u16,
    pub no_execute: bool,
}

impl TableEntry {
    /// Link to `table`: present, writable, `user` as requested.
    #[inline]
    #[must_use]
    pub const fn link(table: PhysicalPage<Size4K>, user: bool) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user(user)
            .with_table_frame(table.base().as_u64() >> 12)
    }

    /// Base of the referenced table.
    #[inline]
    #[must_use]
    pub const fn table(self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_addr(PhysicalAddress::new(self.table_frame() << 12))
    }
}

/// 2 MiB leaf in a Page Directory (`PS = 1`).
///
/// The PAT selector moves to bit 12 in this form, so the frame number
/// starts at bit 21 and bits 13..=20 are reserved.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Pde2M {
    pub present: bool,
    pub writable: bool,
    pub user: bool,
    pub write_through: bool,
    pub cache_disable: bool,
    pub accessed: bool,
    pub dirty: bool,
    pub page_size: bool,
    pub global: bool,
    #[bits(3)]
    __avl: u8,
    pub pat_large: bool,
    #[bits(8)]
    __reserved: u8,
    #[bits(31)]
    frame_2m: u64,
    #[bits(11)]
    __avl_pkey: u16,
    pub no_execute: bool,
}

impl Pde2M {
    /// 2 MiB leaf for `page` with `flags`.
    #[inline]
    #[must_use]
    pub const fn leaf(page: PhysicalPage<Size2M>, flags: MappingFlags) -> Self {
        Self::new()
            .with_present(true)
            .with_page_size(true)
            .with_writable(flags.writable())
            .with_user(flags.user())
            .with_write_through(flags.write_through())
            .with_cache_disable(flags.cache_disable())
            .with_global(flags.global())
            .with_no_execute(flags.no_execute())
            .with_pat_large(flags.pat())
            .with_frame_2m(page.base().as_u64() >> 21)
    }

    /// Base of the mapped 2 MiB frame.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> PhysicalPage<Size2M> {
        PhysicalPage::from_addr(PhysicalAddress::new(self.frame_2m() << 21))
    }
}

/// 4 KiB leaf in a Page Table.
///
/// Bit 7 is the PAT selector here; the upper levels use it as PS.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Pte4K {
    pub present: bool,
    pub writable: bool,
    pub user: bool,
    pub write_through: bool,
    pub cache_disable: bool,
    pub accessed: bool,
    pub dirty: bool,
    pub pat_small: bool,
    pub global: bool,
    #[bits(3)]
    __avl: u8,
    #[bits(40)]
    frame_4k: u64,
    #[bits(11)]
    __avl_pkey: u16,
    pub no_execute: bool,
}

impl Pte4K {
    /// 4 KiB leaf for `page` with `flags`.
    #[inline]
    #[must_use]
    pub const fn leaf(page: PhysicalPage<Size4K>, flags: MappingFlags) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(flags.writable())
            .with_user(flags.user())
            .with_write_through(flags.write_through())
            .with_cache_disable(flags.cache_disable())
            .with_global(flags.global())
            .with_no_execute(flags.no_execute())
            .with_pat_small(flags.pat())
            .with_frame_4k(page.base().as_u64() >> 12)
    }

    #[inline]
    #[must_use]
    pub const fn frame(self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_addr(PhysicalAddress::new(self.frame_4k() << 12))
    }
}

/// Decoded view of a raw entry at a known level.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Not present.
    Empty,
    /// Points to a lower-level table.
    Table(PhysicalPage<Size4K>),
    /// 1 GiB leaf (PDPT, `PS=1`); base address.
    Leaf1G(PhysicalAddress),
    /// 2 MiB leaf (PD, `PS=1`); base address.
    Leaf2M(PhysicalAddress),
    /// 4 KiB leaf (PT); base address.
    Leaf4K(PhysicalAddress),
}

impl EntryKind {
    /// Interpret `raw` as an entry of a `level` table.
    #[must_use]
    pub const fn decode(level: TableLevel, raw: u64) -> Self {
        if raw & PRESENT_BIT == 0 {
            return Self::Empty;
        }
        let huge = raw & PS_BIT != 0;
        match level {
            TableLevel::Pdpt if huge => Self::Leaf1G(PhysicalAddress::new(raw & ADDR_MASK_1G)),
            TableLevel::Pd if huge => Self::Leaf2M(PhysicalAddress::new(raw & ADDR_MASK_2M)),
            TableLevel::Pt => Self::Leaf4K(PhysicalAddress::new(raw & ADDR_MASK_4K)),
            _ => Self::Table(PhysicalPage::from_addr(PhysicalAddress::new(
                raw & ADDR_MASK_4K,
            ))),
        }
    }

    /// `true` for any leaf variant.
    #[inline]
    #[must_use]
    pub const fn is_leaf(self) -> bool {
        matches!(self, Self::Leaf1G(_) | Self::Leaf2M(_) | Self::Leaf4K(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_sets_present_writable_and_address() {
        let t = PhysicalPage::<Size4K>::from_addr(PhysicalAddress::new(0x0012_3000));
        let e = TableEntry::link(t, false);
        let raw = e.into_bits();
        assert_eq!(raw & 0b11, 0b11);
        assert_eq!(raw & PS_BIT, 0);
        assert_eq!(raw & ADDR_MASK_4K, 0x0012_3000);
        assert_eq!(e.table(), t);
        assert!(TableEntry::link(t, true).user());
    }

    #[test]
    fn pde_2m_sets_ps_and_pat_at_bit_12() {
        let p = PhysicalPage::<Size2M>::from_addr(PhysicalAddress::new(0x4000_0000));
        let e = Pde2M::leaf(p, MappingFlags::new().with_pat(true).with_writable(true));
        let raw = e.into_bits();
        assert_ne!(raw & PS_BIT, 0);
        assert_ne!(raw & (1 << 12), 0);
        assert_eq!(raw & ADDR_MASK_2M, 0x4000_0000);
        assert_eq!(e.frame(), p);
        assert_eq!(
            EntryKind::decode(TableLevel::Pd, raw),
            EntryKind::Leaf2M(PhysicalAddress::new(0x4000_0000))
        );
    }

    #[test]
    fn pte_4k_sets_pat_at_bit_7() {
        let p = PhysicalPage::<Size4K>::from_addr(PhysicalAddress::new(0x0000_5000));
        let raw = Pte4K::leaf(p, MappingFlags::new().with_pat(true)).into_bits();
        assert_ne!(raw & (1 << 7), 0);
        assert_eq!(raw & (1 << 12), 0);
        assert_eq!(raw & 0b10, 0, "not writable");
        assert_eq!(
            EntryKind::decode(TableLevel::Pt, raw),
            EntryKind::Leaf4K(PhysicalAddress::new(0x5000))
        );
    }

    #[test]
    fn no_execute_is_bit_63() {
        let p = PhysicalPage::<Size4K>::from_addr(PhysicalAddress::new(0x1000));
        let raw = Pte4K::leaf(p, MappingFlags::new().with_no_execute(true)).into_bits();
        assert_ne!(raw & (1 << 63), 0);
    }

    #[test]
    fn decode_distinguishes_levels() {
        assert_eq!(EntryKind::decode(TableLevel::Pml4, 0), EntryKind::Empty);
        let raw = 0x0000_0000_8000_0083; // present | writable | PS, 2 GiB
        assert_eq!(
            EntryKind::decode(TableLevel::Pdpt, raw),
            EntryKind::Leaf1G(PhysicalAddress::new(0x8000_0000))
        );
        assert!(matches!(
            EntryKind::decode(TableLevel::Pml4, raw & !PS_BIT),
            EntryKind::Table(_)
        ));
    }
}
