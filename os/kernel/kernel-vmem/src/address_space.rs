//! # Address Space (x86-64, PML4-rooted)
//!
//! Builds and inspects a **single** virtual address space: a tree rooted at
//! a PML4 frame, with intermediate tables allocated on demand from a
//! caller-supplied [`FrameAlloc`].
//!
//! ## Highlights
//!
//! - [`AddressSpace::build_mapping`] maps a physically contiguous range at
//!   4 KiB or 2 MiB granularity.
//! - [`AddressSpace::translate`] walks a VA to its PA (handles huge pages).
//! - [`AddressSpace::activate`] loads CR3 with this space's root.
//!
//! ## Design
//!
//! - Non-leaf entries are always `present | writable`, plus `user` when the
//!   leaf is user-accessible. Leaf flags come from the [`MappingRequest`].
//! - Existing intermediate tables are reused, so overlapping requests never
//!   tear down translations installed by an earlier call.
//! - Tables are accessed one entry at a time through the [`PhysMapper`];
//!   no reference to a table outlives a single read or write.
//!
//! ## Safety
//!
//! - Mutating active mappings requires appropriate **TLB maintenance** (e.g.,
//!   `invlpg` per page or CR3 reload).
//! - The provided `PhysMapper` must yield **writable** pointers to table frames.

use crate::flags::{Granularity, MappingFlags};
use crate::page_table::{
    EntryKind, PageTable, Pde2M, Pte4K, TableEntry, TableLevel, split_indices,
};
use crate::{FrameAlloc, PhysMapper};
use kernel_memory_addresses::{
    PhysicalAddress, PhysicalPage, Size2M, Size4K, VirtualAddress, align_up,
};
use log::{debug, trace};

/// Highest physical address bit supported by 4-level paging entries.
const MAX_PHYS_BITS: u32 = 52;

/// The PML4 root page for an [`AddressSpace`].
pub type RootPage = PhysicalPage<Size4K>;

/// A request to map `size` bytes of physical memory at `phys` to `virt`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MappingRequest {
    pub phys: PhysicalAddress,
    pub virt: VirtualAddress,
    /// Length in bytes; rounded up to the granularity.
    pub size: u64,
    pub flags: MappingFlags,
    pub granularity: Granularity,
}

impl MappingRequest {
    /// 4 KiB mapping request.
    #[inline]
    #[must_use]
    pub const fn new(
        phys: PhysicalAddress,
        virt: VirtualAddress,
        size: u64,
        flags: MappingFlags,
    ) -> Self {
        Self {
            phys,
            virt,
            size,
            flags,
            granularity: Granularity::Page4K,
        }
    }

    /// Same request at a different granularity.
    #[inline]
    #[must_use]
    pub const fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }
}

/// What a successful [`AddressSpace::build_mapping`] did.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct MappingStats {
    /// Leaf entries written.
    pub leaves: u64,
    /// Fresh intermediate tables taken from the allocator.
    pub tables_allocated: u64,
    /// Bytes covered, after rounding to the granularity.
    pub bytes: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildMappingError {
    #[error("mapping size is zero")]
    ZeroSize,
    #[error("physical address {0} is not aligned to the mapping granularity")]
    MisalignedPhysical(PhysicalAddress),
    #[error("virtual address {0} is not aligned to the mapping granularity")]
    MisalignedVirtual(VirtualAddress),
    #[error("mapping range overflows the address space")]
    AddressOverflow,
    #[error("virtual range is not canonical")]
    NonCanonical,
    #[error("out of memory allocating a {0} table")]
    OutOfMemory(TableLevel),
    #[error("{0} conflicts with an existing huge page mapping")]
    HugePageConflict(VirtualAddress),
}

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: RootPage,
    mapper: &'m M,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Wrap an existing PML4 frame.
    #[inline]
    pub const fn from_root(mapper: &'m M, root: RootPage) -> Self {
        Self { root, mapper }
    }

    /// Allocate and zero a fresh PML4.
    ///
    /// # Errors
    /// [`BuildMappingError::OutOfMemory`] if `alloc` has no frame left.
    pub fn new<A: FrameAlloc>(mapper: &'m M, alloc: &mut A) -> Result<Self, BuildMappingError> {
        let root = alloc
            .alloc_4k()
            .ok_or(BuildMappingError::OutOfMemory(TableLevel::Pml4))?;
        let this = Self::from_root(mapper, root);
        this.zero_table(root);
        debug!("allocated PML4 at {}", root.base());
        Ok(this)
    }

    /// Load CR3 with this address space's root.
    ///
    /// # Safety
    /// You must ensure the CPU paging state (CR0/CR4/EFER) and code/data mappings
    /// are consistent with the target space. Consider reloading CR3 or issuing
    /// `invlpg` after changes to active mappings.
    #[cfg(target_arch = "x86_64")]
    #[inline]
    pub unsafe fn activate(&self) {
        let cr3 = self.root.base().as_u64();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }

    /// Physical page of the PML4.
    #[inline]
    #[must_use]
    pub const fn root_page(&self) -> RootPage {
        self.root
    }

    /// Map `req.size` bytes from `req.phys` to `req.virt`.
    ///
    /// Both addresses must be aligned to `req.granularity`; the size is
    /// rounded up to it. Missing intermediate tables are taken from `alloc`
    /// and zeroed; present ones are reused and only ever gain permissions.
    /// Existing leaves in the range are overwritten.
    ///
    /// Argument errors are detected before anything is written. An
    /// [`OutOfMemory`](BuildMappingError::OutOfMemory) or
    /// [`HugePageConflict`](BuildMappingError::HugePageConflict) error
    /// leaves the leaves written so far in place.
    ///
    /// # Errors
    /// See [`BuildMappingError`].
    pub fn build_mapping<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        req: &MappingRequest,
    ) -> Result<MappingStats, BuildMappingError> {
        let size = Self::validate(req)?;
        debug!(
            "map {} -> {} ({size:#x} bytes, {:?}, {:?})",
            req.virt, req.phys, req.granularity, req.flags
        );

        let step = req.granularity.bytes();
        let user = req.flags.user();
        let first = req.virt;
        let last = VirtualAddress::new(first.as_u64() + (size - 1));
        let (s4, s3, s2, s1) = split_indices(first);
        let (e4, e3, e2, e1) = split_indices(last);

        let mut stats = MappingStats {
            bytes: size,
            ..MappingStats::default()
        };
        let mut pa = req.phys.as_u64();
        let va_at = |pa: u64| VirtualAddress::new(first.as_u64() + (pa - req.phys.as_u64()));

        // Only the first and last index of each level are clamped by the
        // range; everything between spans the whole table.
        for i4 in s4.as_usize()..=e4.as_usize() {
            let (f4, l4) = (i4 == s4.as_usize(), i4 == e4.as_usize());
            let pdpt = self.ensure_table(
                alloc,
                self.root,
                TableLevel::Pml4,
                i4,
                user,
                va_at(pa),
                &mut stats,
            )?;

            let lo3 = if f4 { s3.as_usize() } else { 0 };
            let hi3 = if l4 { e3.as_usize() } else { 511 };
            for i3 in lo3..=hi3 {
                let (f3, l3) = (f4 && i3 == s3.as_usize(), l4 && i3 == e3.as_usize());
                let pd = self.ensure_table(
                    alloc,
                    pdpt,
                    TableLevel::Pdpt,
                    i3,
                    user,
                    va_at(pa),
                    &mut stats,
                )?;

                let lo2 = if f3 { s2.as_usize() } else { 0 };
                let hi2 = if l3 { e2.as_usize() } else { 511 };
                for i2 in lo2..=hi2 {
                    let (f2, l2) = (f3 && i2 == s2.as_usize(), l3 && i2 == e2.as_usize());

                    if req.granularity == Granularity::Huge2M {
                        if let EntryKind::Table(_) = self.read(pd).kind(TableLevel::Pd, i2) {
                            return Err(BuildMappingError::HugePageConflict(va_at(pa)));
                        }
                        let frame = PhysicalPage::<Size2M>::from_addr(PhysicalAddress::new(pa));
                        self.write(pd, i2, Pde2M::leaf(frame, req.flags).into_bits());
                        stats.leaves += 1;
                        pa += step;
                        continue;
                    }

                    let pt = self.ensure_table(
                        alloc,
                        pd,
                        TableLevel::Pd,
                        i2,
                        user,
                        va_at(pa),
                        &mut stats,
                    )?;
                    let lo1 = if f2 { s1.as_usize() } else { 0 };
                    let hi1 = if l2 { e1.as_usize() } else { 511 };
                    for i1 in lo1..=hi1 {
                        let frame = PhysicalPage::<Size4K>::from_addr(PhysicalAddress::new(pa));
                        self.write(pt, i1, Pte4K::leaf(frame, req.flags).into_bits());
                        stats.leaves += 1;
                        pa += step;
                    }
                }
            }
        }

        trace!(
            "mapped {} leaves, {} new tables",
            stats.leaves, stats.tables_allocated
        );
        Ok(stats)
    }

    /// Translate a VA to a PA by walking the tables.
    ///
    /// Returns `None` if any level along the walk is not present.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let (i4, i3, i2, i1) = split_indices(va);
        let v = va.as_u64();

        let EntryKind::Table(pdpt) = self.read(self.root).kind(TableLevel::Pml4, i4.as_usize())
        else {
            return None;
        };
        let pd = match self.read(pdpt).kind(TableLevel::Pdpt, i3.as_usize()) {
            EntryKind::Table(pd) => pd,
            EntryKind::Leaf1G(base) => {
                return Some(PhysicalAddress::new(base.as_u64() + (v & ((1 << 30) - 1))));
            }
            _ => return None,
        };
        let pt = match self.read(pd).kind(TableLevel::Pd, i2.as_usize()) {
            EntryKind::Table(pt) => pt,
            EntryKind::Leaf2M(base) => {
                return Some(PhysicalAddress::new(base.as_u64() + (v & ((1 << 21) - 1))));
            }
            _ => return None,
        };
        match self.read(pt).kind(TableLevel::Pt, i1.as_usize()) {
            EntryKind::Leaf4K(base) => Some(PhysicalAddress::new(base.as_u64() + (v & 0xFFF))),
            _ => None,
        }
    }

    /// Raw entry at `index` of the table in `page`; for inspection and tests.
    #[must_use]
    pub fn entry(&self, page: PhysicalPage<Size4K>, index: usize) -> u64 {
        self.read(page).get(index)
    }

    /// Check a request and return its size rounded to the granularity.
    fn validate(req: &MappingRequest) -> Result<u64, BuildMappingError> {
        if req.size == 0 {
            return Err(BuildMappingError::ZeroSize);
        }
        let step = req.granularity.bytes();
        let aligned = match req.granularity {
            Granularity::Page4K => (req.phys.is_aligned::<Size4K>(), req.virt.is_aligned::<Size4K>()),
            Granularity::Huge2M => (req.phys.is_aligned::<Size2M>(), req.virt.is_aligned::<Size2M>()),
        };
        if !aligned.0 {
            return Err(BuildMappingError::MisalignedPhysical(req.phys));
        }
        if !aligned.1 {
            return Err(BuildMappingError::MisalignedVirtual(req.virt));
        }
        let size = align_up(req.size, step).ok_or(BuildMappingError::AddressOverflow)?;

        let phys_end = req
            .phys
            .checked_add(size)
            .ok_or(BuildMappingError::AddressOverflow)?;
        if phys_end.as_u64() > 1 << MAX_PHYS_BITS {
            return Err(BuildMappingError::AddressOverflow);
        }

        let last = req
            .virt
            .checked_add(size - 1)
            .ok_or(BuildMappingError::AddressOverflow)?;
        // Both ends canonical and in the same half: no hole in between.
        if !req.virt.is_canonical()
            || !last.is_canonical()
            || (req.virt.as_u64() ^ last.as_u64()) >> 47 != 0
        {
            return Err(BuildMappingError::NonCanonical);
        }
        Ok(size)
    }

    /// Return the table referenced by `table[index]`, installing a fresh
    /// zeroed one if the slot is empty.
    #[allow(clippy::too_many_arguments)]
    fn ensure_table<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        table: PhysicalPage<Size4K>,
        level: TableLevel,
        index: usize,
        user: bool,
        va: VirtualAddress,
        stats: &mut MappingStats,
    ) -> Result<PhysicalPage<Size4K>, BuildMappingError> {
        let raw = self.read(table).get(index);
        match EntryKind::decode(level, raw) {
            EntryKind::Empty => {
                let child = level.next().unwrap_or(level);
                let next = alloc
                    .alloc_4k()
                    .ok_or(BuildMappingError::OutOfMemory(child))?;
                self.zero_table(next);
                self.write(table, index, TableEntry::link(next, user).into_bits());
                stats.tables_allocated += 1;
                trace!("new {child} at {} ({level}[{index}])", next.base());
                Ok(next)
            }
            EntryKind::Table(next) => {
                let entry = TableEntry::from_bits(raw);
                if !entry.writable() || (user && !entry.user()) {
                    let widened = entry.with_writable(true).with_user(entry.user() || user);
                    self.write(table, index, widened.into_bits());
                }
                Ok(next)
            }
            EntryKind::Leaf1G(_) | EntryKind::Leaf2M(_) | EntryKind::Leaf4K(_) => {
                Err(BuildMappingError::HugePageConflict(va))
            }
        }
    }

    fn read(&self, page: PhysicalPage<Size4K>) -> &PageTable {
        // SAFETY: `page` is a table frame of this address space; the mapper
        // yields a valid, 4 KiB-aligned pointer to it and the returned shared
        // borrow is dropped before the next write.
        unsafe { &*self.mapper.phys_to_ptr(page.base()).cast::<PageTable>() }
    }

    fn write(&self, page: PhysicalPage<Size4K>, index: usize, raw: u64) {
        // SAFETY: as in `read`; the exclusive borrow lives for this call only.
        let table = unsafe { self.mapper.phys_to_mut::<PageTable>(page.base()) };
        table.set(index, raw);
    }

    fn zero_table(&self, page: PhysicalPage<Size4K>) {
        // SAFETY: `page` was just handed out by the frame allocator and is
        // not yet linked anywhere.
        unsafe { self.mapper.zero(page.base(), 4096) };
    }
}
