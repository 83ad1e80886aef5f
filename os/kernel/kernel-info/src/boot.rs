//! # Boot Information

/// Firmware classification of a physical memory region.
///
/// The numeric values follow the BIOS E820 type codes where one exists.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    /// Usable RAM, not claimed by anything.
    Free = 1,
    /// Reserved by firmware or chipset.
    Reserved = 2,
    /// ACPI tables; reclaimable once they have been parsed.
    AcpiReclaimable = 3,
    /// ACPI non-volatile storage.
    AcpiNvs = 4,
    /// Memory reported as faulty.
    Unusable = 5,
    /// Persistent (non-volatile) memory.
    Persistent = 7,
    /// Firmware runtime services code or data.
    FirmwareRuntime = 0x100,
    /// Memory-mapped I/O.
    Mmio = 0x101,
}

impl MemoryKind {
    /// Only [`Free`](Self::Free) regions become usable ranges.
    #[inline]
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }
}

/// One entry of the raw firmware memory map.
///
/// Entries may be unsorted, overlapping or zero-length.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryDescriptor {
    /// First physical byte of the region.
    pub base: u64,
    /// Length of the region in bytes.
    pub limit: u64,
    /// Firmware classification.
    pub kind: MemoryKind,
}

impl MemoryDescriptor {
    #[inline]
    #[must_use]
    pub const fn new(base: u64, limit: u64, kind: MemoryKind) -> Self {
        Self { base, limit, kind }
    }

    /// Exclusive end of the region, saturating at the top of the address space.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base.saturating_add(self.limit)
    }
}

/// A contiguous span of physical memory confirmed free after normalization.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UsableRange {
    /// First physical byte.
    pub base: u64,
    /// Length in bytes.
    pub limit: u64,
}

impl UsableRange {
    #[inline]
    #[must_use]
    pub const fn new(base: u64, limit: u64) -> Self {
        Self { base, limit }
    }

    /// Exclusive end, saturating at the top of the address space.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base.saturating_add(self.limit)
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.end()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.limit == 0
    }
}

/// Raw UEFI memory map as copied out of `ExitBootServices`.
#[repr(C)]
#[derive(Clone)]
pub struct MemoryMapInfo {
    /// Pointer to the raw UEFI memory map buffer (array of `EFI_MEMORY_DESCRIPTOR` bytes).
    pub mmap_ptr: u64,

    /// Length of the memory map buffer in **bytes**.
    pub mmap_len: u64,

    /// Size of a single memory descriptor in bytes (`EFI_MEMORY_DESCRIPTOR_VERSION` dependent).
    pub mmap_desc_size: u64,

    /// Descriptor version (from UEFI).
    pub mmap_desc_version: u32,
}

/// What the physical memory core hands to the kernel once paging is built.
#[repr(C)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KernelHandoff {
    /// Physical address of the first [`UsableRange`] in the published table.
    pub usable_ranges_ptr: u64,

    /// Number of entries at `usable_ranges_ptr`.
    pub usable_ranges_len: u64,

    /// Physical address of the PML4; loaded into CR3.
    pub pml4_phys: u64,

    /// Virtual address of the kernel entry point.
    pub entry_va: u64,

    /// Virtual address of the top of the kernel stack.
    pub stack_top_va: u64,

    /// Base of the higher-half direct map.
    pub hhdm_base: u64,
}
