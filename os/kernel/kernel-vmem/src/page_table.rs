//! # Memory Page Table
//!
//! A [`PageTable`] is one 4 KiB frame of 512 raw 64-bit entries. The same
//! frame layout is used at every level; the meaning of an entry depends on
//! the [`TableLevel`] it is read at and, for PDPT/PD entries, on the `PS` bit.
//! Typed views of the entries live in [`entries`], the per-level index
//! extraction in [`index`].

pub mod entries;
pub mod index;

pub use crate::page_table::entries::{EntryKind, Pde2M, Pte4K, TableEntry};
pub use crate::page_table::index::{L1Index, L2Index, L3Index, L4Index, split_indices};

/// Hardware **Present** bit position shared across levels (bit 0).
pub(crate) const PRESENT_BIT: u64 = 1 << 0;

/// Hardware **Page Size** (PS) bit position shared across levels (bit 7).
///
/// - In non-leaf entries: PS **must be 0**.
/// - In large leaf entries (L3 1 GiB / L2 2 MiB): PS **must be 1**.
/// - In L1 4 KiB PTEs: bit 7 is **PAT** (not PS).
pub(crate) const PS_BIT: u64 = 1 << 7;

/// Number of entries in one table frame.
pub const ENTRIES_PER_TABLE: usize = 512;

/// One level of the 4-level hierarchy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TableLevel {
    /// Page Map Level 4 (root, referenced by CR3).
    Pml4,
    /// Page Directory Pointer Table.
    Pdpt,
    /// Page Directory.
    Pd,
    /// Page Table.
    Pt,
}

impl TableLevel {
    /// Conventional short name of the table.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pml4 => "PML4",
            Self::Pdpt => "PDPT",
            Self::Pd => "PD",
            Self::Pt => "PT",
        }
    }

    /// The level below this one, `None` for [`TableLevel::Pt`].
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Pml4 => Some(Self::Pdpt),
            Self::Pdpt => Some(Self::Pd),
            Self::Pd => Some(Self::Pt),
            Self::Pt => None,
        }
    }
}

impl core::fmt::Display for TableLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 4 KiB-aligned array of 512 raw entries.
///
/// Use [`PageTable::get`] and [`PageTable::set`] to read/write entries and
/// [`PageTable::kind`] to decode one for a given level.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [u64; ENTRIES_PER_TABLE],
}

const _: () = assert!(size_of::<PageTable>() == 4096);

impl PageTable {
    /// An all-zero table (every entry not present).
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [0; ENTRIES_PER_TABLE],
        }
    }

    /// Read the raw entry at `index`.
    #[inline]
    #[must_use]
    pub const fn get(&self, index: usize) -> u64 {
        self.entries[index]
    }

    /// Overwrite the raw entry at `index`.
    #[inline]
    pub const fn set(&mut self, index: usize, raw: u64) {
        self.entries[index] = raw;
    }

    /// Decode the entry at `index` as seen at `level`.
    #[inline]
    #[must_use]
    pub const fn kind(&self, level: TableLevel, index: usize) -> EntryKind {
        EntryKind::decode(level, self.entries[index])
    }

    /// Number of present entries.
    #[must_use]
    pub fn present_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|&&e| e & PRESENT_BIT != 0)
            .count()
    }
}
