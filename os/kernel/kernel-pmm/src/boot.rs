//! Loader-side memory setup: from firmware descriptors to a kernel handoff.

use kernel_alloc::buddy::is_manageable;
use kernel_alloc::{BootstrapAllocator, BootstrapError};
use kernel_info::boot::{KernelHandoff, MemoryDescriptor, UsableRange};
use kernel_info::memory::{
    HHDM_BASE, HUGE_PAGE_SIZE, IDENTITY_LOW_BYTES, KERNEL_BASE, KERNEL_STACK_SIZE,
    MAX_USABLE_RANGES, PAGE_SIZE,
};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress, align_down, align_up};
use kernel_mmap::{NormalizeError, RangeTableError, UsableRanges, normalize};
use kernel_vmem::{
    AddressSpace, BuildMappingError, FrameAlloc, Granularity, MappingFlags, MappingRequest,
    PhysMapper,
};
use log::{debug, info, warn};

/// Sizes and mapping policy for [`boot_memory_setup`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BootLayout {
    /// Bytes reserved for the kernel image, mapped at `KERNEL_BASE`.
    pub kernel_image_bytes: u64,
    /// Offset of the entry point inside the image.
    pub entry_offset: u64,
    /// Kernel stack size; a guard page below it stays unmapped.
    pub stack_bytes: u64,
    /// Low memory identity-mapped so the loader survives the CR3 switch.
    pub identity_low_bytes: u64,
    /// Use 2 MiB pages for HHDM ranges whose ends are both 2 MiB aligned.
    pub hhdm_huge_pages: bool,
}

impl BootLayout {
    #[must_use]
    pub const fn new(kernel_image_bytes: u64, entry_offset: u64) -> Self {
        Self {
            kernel_image_bytes,
            entry_offset,
            stack_bytes: KERNEL_STACK_SIZE,
            identity_low_bytes: IDENTITY_LOW_BYTES,
            hhdm_huge_pages: true,
        }
    }

    #[must_use]
    pub const fn with_stack_bytes(mut self, stack_bytes: u64) -> Self {
        self.stack_bytes = stack_bytes;
        self
    }

    #[must_use]
    pub const fn with_identity_low_bytes(mut self, bytes: u64) -> Self {
        self.identity_low_bytes = bytes;
        self
    }

    #[must_use]
    pub const fn with_hhdm_huge_pages(mut self, enabled: bool) -> Self {
        self.hhdm_huge_pages = enabled;
        self
    }

    /// Virtual base of the stack: after the image and one guard page.
    const fn stack_base_va(&self) -> u64 {
        let image = match align_up(self.kernel_image_bytes, PAGE_SIZE) {
            Some(v) => v,
            None => self.kernel_image_bytes,
        };
        KERNEL_BASE + image + PAGE_SIZE
    }
}

/// Result of [`boot_memory_setup`].
#[derive(Debug)]
pub struct BootMemory {
    /// What gets passed to the kernel entry point.
    pub handoff: KernelHandoff,
    /// The published usable ranges; bootstrap allocations already removed.
    pub usable: UsableRanges,
    /// Physical base of the kernel image span (zeroed, to be filled by the loader).
    pub kernel_phys: PhysicalAddress,
    /// Physical base of the kernel stack.
    pub stack_phys: PhysicalAddress,
    /// Everything below this address was consumed by the bootstrap allocator.
    pub bootstrap_end: PhysicalAddress,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootSetupError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error(transparent)]
    Mapping(#[from] BuildMappingError),
    #[error(transparent)]
    RangeTable(#[from] RangeTableError),
    #[error("kernel entry offset {0:#x} lies outside the image")]
    EntryOutsideImage(u64),
    #[error("{0} does not translate to the expected physical address")]
    Translation(VirtualAddress),
}

/// Turn the firmware memory map into page tables and a [`KernelHandoff`].
///
/// Steps:
/// 1. Normalize `descriptors` (sorted in place).
/// 2. Bump-allocate the PML4, the published range table, the kernel image
///    and the stack.
/// 3. Identity-map low memory, map the image at `KERNEL_BASE` and the stack
///    above it, and map every usable range into the HHDM.
/// 4. Drop everything the bootstrap allocator consumed, and ranges too
///    small to manage, from the published ranges.
///
/// `mapper` must reach physical memory as it is mapped *now* (identity in
/// the loader).
///
/// # Errors
/// Any failure is fatal to the boot; see [`BootSetupError`].
pub fn boot_memory_setup<M: PhysMapper>(
    descriptors: &mut [MemoryDescriptor],
    layout: &BootLayout,
    mapper: M,
) -> Result<BootMemory, BootSetupError> {
    if layout.entry_offset >= layout.kernel_image_bytes {
        return Err(BootSetupError::EntryOutsideImage(layout.entry_offset));
    }
    let ranges = normalize(descriptors)?;

    let mut boot = BootstrapAllocator::new(ranges.as_slice(), &mapper, PhysicalAddress::zero());
    let aspace = AddressSpace::new(&mapper, &mut boot)?;
    let table_bytes = (MAX_USABLE_RANGES * size_of::<UsableRange>()) as u64;
    let table_phys = boot.allocate(table_bytes, true)?;
    let kernel_phys = boot.allocate(layout.kernel_image_bytes, true)?;
    let stack_phys = boot.allocate(layout.stack_bytes, true)?;
    info!(
        "boot: PML4 at {}, kernel image at {kernel_phys}, stack at {stack_phys}",
        aspace.root_page().base()
    );

    if layout.identity_low_bytes > 0 {
        let granularity = if layout.identity_low_bytes.is_multiple_of(HUGE_PAGE_SIZE) {
            Granularity::Huge2M
        } else {
            Granularity::Page4K
        };
        map(
            &aspace,
            &mut boot,
            MappingRequest::new(
                PhysicalAddress::zero(),
                VirtualAddress::new(0),
                layout.identity_low_bytes,
                MappingFlags::kernel_rw(),
            )
            .with_granularity(granularity),
        )?;
    }

    map(
        &aspace,
        &mut boot,
        MappingRequest::new(
            kernel_phys,
            VirtualAddress::new(KERNEL_BASE),
            layout.kernel_image_bytes,
            MappingFlags::kernel_rw().with_global(true),
        ),
    )?;

    let stack_va = layout.stack_base_va();
    map(
        &aspace,
        &mut boot,
        MappingRequest::new(
            stack_phys,
            VirtualAddress::new(stack_va),
            layout.stack_bytes,
            MappingFlags::kernel_rw()
                .with_global(true)
                .with_no_execute(true),
        ),
    )?;

    for r in &ranges {
        let base = align_down(r.base, PAGE_SIZE);
        let end = align_up(r.end(), PAGE_SIZE).ok_or(BuildMappingError::AddressOverflow)?;
        let huge = layout.hhdm_huge_pages
            && base.is_multiple_of(HUGE_PAGE_SIZE)
            && end.is_multiple_of(HUGE_PAGE_SIZE);
        map(
            &aspace,
            &mut boot,
            MappingRequest::new(
                PhysicalAddress::new(base),
                VirtualAddress::new(HHDM_BASE + base),
                end - base,
                MappingFlags::kernel_rw().with_no_execute(true),
            )
            .with_granularity(Granularity::from_huge(huge)),
        )?;
    }

    let bootstrap_end = boot.cursor();
    let usable = publishable(&ranges, bootstrap_end)?;
    for (i, r) in usable.iter().enumerate() {
        let at = table_phys + (i * size_of::<UsableRange>()) as u64;
        // SAFETY: `table_phys` is a zeroed bootstrap allocation sized for
        // `MAX_USABLE_RANGES` entries, page aligned, and referenced nowhere else.
        unsafe { *mapper.phys_to_mut::<UsableRange>(at) = *r };
    }

    let entry_va = VirtualAddress::new(KERNEL_BASE + layout.entry_offset);
    if aspace.translate(entry_va) != Some(kernel_phys + layout.entry_offset) {
        return Err(BootSetupError::Translation(entry_va));
    }

    let handoff = KernelHandoff {
        usable_ranges_ptr: table_phys.as_u64(),
        usable_ranges_len: usable.len() as u64,
        pml4_phys: aspace.root_page().base().as_u64(),
        entry_va: entry_va.as_u64(),
        stack_top_va: stack_va + align_up(layout.stack_bytes, PAGE_SIZE).unwrap_or(0),
        hhdm_base: HHDM_BASE,
    };
    info!(
        "boot: handoff ready, {} usable ranges ({:#x} bytes), bootstrap used up to {bootstrap_end}",
        usable.len(),
        usable.total_bytes()
    );
    Ok(BootMemory {
        handoff,
        usable,
        kernel_phys,
        stack_phys,
        bootstrap_end,
    })
}

fn map<M: PhysMapper, A: FrameAlloc>(
    aspace: &AddressSpace<'_, M>,
    alloc: &mut A,
    req: MappingRequest,
) -> Result<(), BootSetupError> {
    let stats = aspace.build_mapping(alloc, &req)?;
    debug!(
        "boot: mapped {} -> {}: {} leaves, {} new tables",
        req.virt, req.phys, stats.leaves, stats.tables_allocated
    );
    Ok(())
}

/// Usable ranges minus bootstrap consumption, without ranges the buddy
/// allocator could not manage.
fn publishable(
    ranges: &UsableRanges,
    bootstrap_end: PhysicalAddress,
) -> Result<UsableRanges, RangeTableError> {
    let mut out = UsableRanges::new();
    for r in &ranges.exclude_below(bootstrap_end.as_u64()) {
        if is_manageable(r) {
            out.push(*r)?;
        } else {
            warn!("boot: dropping unmanageable range {:#x}+{:#x}", r.base, r.limit);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_sits_above_image_and_guard() {
        let layout = BootLayout::new(0x1_2345, 0x100);
        assert_eq!(layout.stack_base_va(), KERNEL_BASE + 0x1_3000 + 0x1000);
    }

    #[test]
    fn publishable_drops_consumed_and_tiny_ranges() {
        let ranges = UsableRanges::from_sorted(&[
            UsableRange::new(0x1000, 0x9_F000),
            UsableRange::new(0x10_0000, 0x10_0000),
            UsableRange::new(0x30_0000, 0x1000),
        ])
        .expect("ranges");
        let out = publishable(&ranges, PhysicalAddress::new(0x10_4000)).expect("table");
        assert_eq!(out.as_slice(), &[UsableRange::new(0x10_4000, 0xF_C000)]);
    }
}
