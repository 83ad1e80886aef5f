//! Leaf mapping flags.

use bitfield_struct::bitfield;

/// Permission and caching bits applied to every **leaf** entry of a mapping.
///
/// `present` is implied. Intermediate tables get `present | writable` and
/// inherit `user` from the leaf, so these bits alone decide the effective
/// permissions of the mapped range.
///
/// `pat` selects the PAT bit of the leaf. Its hardware position differs
/// between 4 KiB PTEs (bit 7) and 2 MiB PDEs (bit 12); the encoders in
/// [`page_table::entries`](crate::page_table::entries) place it correctly.
///
/// ### Example
/// ```rust
/// # use kernel_vmem::MappingFlags;
/// let f = MappingFlags::kernel_rw().with_no_execute(true);
/// assert!(f.writable());
/// assert!(!f.user());
/// ```
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct MappingFlags {
    /// Writable (R/W).
    pub writable: bool,
    /// User-accessible (U/S).
    pub user: bool,
    /// Write-Through (PWT).
    pub write_through: bool,
    /// Cache Disable (PCD).
    pub cache_disable: bool,
    /// Global (G), survives CR3 reloads.
    pub global: bool,
    /// No-Execute (XD).
    pub no_execute: bool,
    /// Page Attribute Table selector bit.
    pub pat: bool,
    #[bits(1)]
    __reserved: u8,
}

impl MappingFlags {
    /// Kernel read/write data.
    #[inline]
    #[must_use]
    pub const fn kernel_rw() -> Self {
        Self::new().with_writable(true)
    }

    /// Kernel read-only, executable text.
    #[inline]
    #[must_use]
    pub const fn kernel_rx() -> Self {
        Self::new()
    }

    /// Kernel MMIO: read/write, uncached, no-execute.
    #[inline]
    #[must_use]
    pub const fn mmio() -> Self {
        Self::new()
            .with_writable(true)
            .with_cache_disable(true)
            .with_write_through(true)
            .with_no_execute(true)
    }
}

/// Leaf size used to cover a mapping request.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Granularity {
    /// 4 KiB PTE leaves.
    #[default]
    Page4K,
    /// 2 MiB PDE leaves (`PS=1`).
    Huge2M,
}

impl Granularity {
    /// Bytes covered by one leaf.
    #[inline]
    #[must_use]
    pub const fn bytes(self) -> u64 {
        match self {
            Self::Page4K => 4096,
            Self::Huge2M => 2 * 1024 * 1024,
        }
    }

    /// `Huge2M` if `huge`, else `Page4K`.
    #[inline]
    #[must_use]
    pub const fn from_huge(huge: bool) -> Self {
        if huge { Self::Huge2M } else { Self::Page4K }
    }
}
