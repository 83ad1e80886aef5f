//! The kernel's memory context.

use kernel_alloc::{BuddyAllocator, BuddyError, BuddyStats};
use kernel_info::boot::{KernelHandoff, UsableRange};
use kernel_info::memory::MAX_USABLE_RANGES;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use kernel_vmem::address_space::RootPage;
use kernel_vmem::{
    AddressSpace, BuildMappingError, Granularity, MappingFlags, MappingRequest, MappingStats,
    PhysMapper,
};
use log::{debug, info};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryManagerError {
    #[error(transparent)]
    Buddy(#[from] BuddyError),
    #[error(transparent)]
    Mapping(#[from] BuildMappingError),
    #[error("handoff lists {0} usable ranges, more than the table holds")]
    TooManyRanges(u64),
    #[error("root table {0} is not page aligned")]
    MisalignedRoot(PhysicalAddress),
}

/// Owns the buddy allocator and the active root page table.
///
/// Constructed once, early in the kernel, and passed explicitly to whoever
/// needs physical memory or new mappings. Page-table frames for
/// [`build_mapping`](Self::build_mapping) come from the same buddy
/// allocator.
pub struct MemoryManager<M: PhysMapper + Clone> {
    mapper: M,
    buddy: BuddyAllocator<M>,
    root: RootPage,
}

impl<M: PhysMapper + Clone> MemoryManager<M> {
    /// Initialize the buddy allocator over `ranges` and adopt `root`.
    ///
    /// # Errors
    /// Whatever [`BuddyAllocator::new`] rejects.
    pub fn new(
        mapper: M,
        ranges: &[UsableRange],
        root: RootPage,
    ) -> Result<Self, MemoryManagerError> {
        let buddy = BuddyAllocator::new(mapper.clone(), ranges)?;
        let stats = buddy.stats();
        info!(
            "pmm: {} ranges, {:#x} bytes free, {:#x} bytes of headers, root at {}",
            ranges.len(),
            stats.free_bytes,
            stats.header_bytes,
            root.base()
        );
        Ok(Self {
            mapper,
            buddy,
            root,
        })
    }

    /// Build the manager from what the loader published.
    ///
    /// # Safety
    /// `handoff` must come from the loader's boot setup: its range table
    /// must be readable through `mapper`, and the ranges must not be in use.
    ///
    /// # Errors
    /// - [`MemoryManagerError::TooManyRanges`] on a corrupt range count.
    /// - [`MemoryManagerError::MisalignedRoot`] on a corrupt root address.
    /// - Anything [`new`](Self::new) rejects.
    pub unsafe fn from_handoff(
        mapper: M,
        handoff: &KernelHandoff,
    ) -> Result<Self, MemoryManagerError> {
        let len = usize::try_from(handoff.usable_ranges_len)
            .ok()
            .filter(|&n| n <= MAX_USABLE_RANGES)
            .ok_or(MemoryManagerError::TooManyRanges(handoff.usable_ranges_len))?;
        let root_pa = PhysicalAddress::new(handoff.pml4_phys);
        let root = PhysicalPage::<Size4K>::try_from_addr(root_pa)
            .ok_or(MemoryManagerError::MisalignedRoot(root_pa))?;

        let mut ranges = [UsableRange::default(); MAX_USABLE_RANGES];
        let table = PhysicalAddress::new(handoff.usable_ranges_ptr);
        for (i, slot) in ranges[..len].iter_mut().enumerate() {
            let at = table + (i * size_of::<UsableRange>()) as u64;
            // SAFETY: the caller guarantees the published table is readable.
            *slot = unsafe { *mapper.phys_to_mut::<UsableRange>(at) };
        }
        debug!("pmm: adopting {len} ranges from handoff table at {table}");
        Self::new(mapper, &ranges[..len], root)
    }

    /// Allocate a block of at least `size` bytes.
    ///
    /// # Errors
    /// See [`BuddyAllocator::allocate`].
    #[inline]
    pub fn allocate(&mut self, size: u64) -> Result<PhysicalAddress, MemoryManagerError> {
        Ok(self.buddy.allocate(size)?)
    }

    /// Return a block handed out by [`allocate`](Self::allocate).
    ///
    /// # Errors
    /// See [`BuddyAllocator::free`].
    #[inline]
    pub fn free(&mut self, addr: PhysicalAddress, size: u64) -> Result<(), MemoryManagerError> {
        Ok(self.buddy.free(addr, size)?)
    }

    /// Map `size` bytes at `virt` to `phys` in the root table.
    ///
    /// `huge` selects 2 MiB leaves; the PAT bit is taken from `flags`.
    ///
    /// # Errors
    /// See [`AddressSpace::build_mapping`].
    pub fn build_mapping(
        &mut self,
        phys: PhysicalAddress,
        virt: VirtualAddress,
        size: u64,
        flags: MappingFlags,
        huge: bool,
    ) -> Result<MappingStats, MemoryManagerError> {
        let req = MappingRequest::new(phys, virt, size, flags)
            .with_granularity(Granularity::from_huge(huge));
        let aspace = AddressSpace::from_root(&self.mapper, self.root);
        let stats = aspace.build_mapping(&mut self.buddy, &req)?;
        debug!(
            "pmm: mapped {virt} -> {phys} ({:#x} bytes, {} new tables)",
            stats.bytes, stats.tables_allocated
        );
        Ok(stats)
    }

    /// Physical address `va` maps to in the root table.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.address_space().translate(va)
    }

    /// Borrow the root table as an [`AddressSpace`].
    #[inline]
    #[must_use]
    pub const fn address_space(&self) -> AddressSpace<'_, M> {
        AddressSpace::from_root(&self.mapper, self.root)
    }

    #[inline]
    #[must_use]
    pub const fn root(&self) -> RootPage {
        self.root
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> BuddyStats {
        self.buddy.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_vmem::sim::SimulatedRam;

    const RANGE: UsableRange = UsableRange::new(0x10_0000, 0x4_0000);
    const ROOT: u64 = 0x14_0000;
    const TABLE: u64 = 0x14_1000;

    fn ram() -> SimulatedRam {
        SimulatedRam::covering(RANGE.base, TABLE + 0x1000)
    }

    fn root() -> RootPage {
        PhysicalPage::from_addr(PhysicalAddress::new(ROOT))
    }

    #[test]
    fn allocate_and_free_round_trip() {
        let ram = ram();
        let mut mm = MemoryManager::new(&ram, &[RANGE], root()).expect("manager");
        let before = mm.stats().free_bytes;

        let a = mm.allocate(0x3000).expect("alloc");
        assert!(RANGE.contains(a.as_u64()));
        assert!(a.is_aligned::<Size4K>());
        assert_eq!(mm.stats().free_bytes, before - 0x4000);

        mm.free(a, 0x3000).expect("free");
        assert_eq!(mm.stats().free_bytes, before);
    }

    #[test]
    fn mapping_tables_come_from_the_buddy() {
        let ram = ram();
        let mut mm = MemoryManager::new(&ram, &[RANGE], root()).expect("manager");
        let before = mm.stats().free_bytes;

        let frame = mm.allocate(0x1000).expect("frame");
        let va = VirtualAddress::new(0xffff_c000_0000_0000);
        let stats = mm
            .build_mapping(frame, va, 0x1000, MappingFlags::kernel_rw(), false)
            .expect("map");

        assert_eq!(stats.leaves, 1);
        assert_eq!(stats.tables_allocated, 3);
        assert_eq!(mm.stats().free_bytes, before - 4 * 0x1000);
        assert_eq!(mm.translate(va + 0x123), Some(frame + 0x123));
        assert_eq!(mm.translate(va + 0x1000), None);
    }

    #[test]
    fn bad_mapping_arguments_are_reported() {
        let ram = ram();
        let mut mm = MemoryManager::new(&ram, &[RANGE], root()).expect("manager");
        let err = mm
            .build_mapping(
                PhysicalAddress::new(0x1000),
                VirtualAddress::new(0x20_0000),
                0x20_0000,
                MappingFlags::kernel_rw(),
                true,
            )
            .unwrap_err();
        assert_eq!(
            err,
            MemoryManagerError::Mapping(BuildMappingError::MisalignedPhysical(
                PhysicalAddress::new(0x1000)
            ))
        );
    }

    #[test]
    fn from_handoff_reads_the_published_table() {
        let ram = ram();
        unsafe { *ram.phys_to_mut::<UsableRange>(PhysicalAddress::new(TABLE)) = RANGE };
        let handoff = KernelHandoff {
            usable_ranges_ptr: TABLE,
            usable_ranges_len: 1,
            pml4_phys: ROOT,
            ..KernelHandoff::default()
        };

        let mut mm = unsafe { MemoryManager::from_handoff(&ram, &handoff) }.expect("manager");
        assert_eq!(mm.root().base().as_u64(), ROOT);
        let a = mm.allocate(0x1000).expect("alloc");
        assert!(RANGE.contains(a.as_u64()));
    }

    #[test]
    fn from_handoff_rejects_corrupt_values() {
        let ram = ram();
        let handoff = KernelHandoff {
            usable_ranges_ptr: TABLE,
            usable_ranges_len: MAX_USABLE_RANGES as u64 + 1,
            pml4_phys: ROOT,
            ..KernelHandoff::default()
        };
        let err = unsafe { MemoryManager::from_handoff(&ram, &handoff) }.err();
        assert_eq!(
            err,
            Some(MemoryManagerError::TooManyRanges(MAX_USABLE_RANGES as u64 + 1))
        );

        let handoff = KernelHandoff {
            usable_ranges_len: 0,
            pml4_phys: ROOT + 8,
            ..handoff
        };
        let err = unsafe { MemoryManager::from_handoff(&ram, &handoff) }.err();
        assert_eq!(
            err,
            Some(MemoryManagerError::MisalignedRoot(PhysicalAddress::new(ROOT + 8)))
        );
    }
}
