//! # UEFI Memory Map Adapter
//!
//! Converts UEFI memory descriptors into [`MemoryDescriptor`]s, either one by
//! one while boot services are alive, or by walking the raw map buffer that
//! the loader copied out of `ExitBootServices` (see [`MemoryMapInfo`]).

use kernel_info::boot::{MemoryDescriptor, MemoryKind, MemoryMapInfo};
use kernel_info::memory::PAGE_SIZE;
use uefi::mem::memory_map::{MemoryDescriptor as UefiDescriptor, MemoryType};

/// Map a UEFI memory type to a [`MemoryKind`].
///
/// Boot services and loader memory is free once boot services have exited;
/// the kernel image and its handoff data are reserved separately by the
/// bootstrap allocator, not by the map.
#[must_use]
pub fn kind_from_uefi(ty: MemoryType) -> MemoryKind {
    match ty {
        MemoryType::CONVENTIONAL
        | MemoryType::BOOT_SERVICES_CODE
        | MemoryType::BOOT_SERVICES_DATA
        | MemoryType::LOADER_CODE
        | MemoryType::LOADER_DATA => MemoryKind::Free,
        MemoryType::ACPI_RECLAIM => MemoryKind::AcpiReclaimable,
        MemoryType::ACPI_NON_VOLATILE => MemoryKind::AcpiNvs,
        MemoryType::UNUSABLE => MemoryKind::Unusable,
        MemoryType::PERSISTENT_MEMORY => MemoryKind::Persistent,
        MemoryType::RUNTIME_SERVICES_CODE | MemoryType::RUNTIME_SERVICES_DATA => {
            MemoryKind::FirmwareRuntime
        }
        MemoryType::MMIO | MemoryType::MMIO_PORT_SPACE => MemoryKind::Mmio,
        _ => MemoryKind::Reserved,
    }
}

/// Convert a single UEFI descriptor.
#[must_use]
pub fn from_uefi(desc: &UefiDescriptor) -> MemoryDescriptor {
    MemoryDescriptor::new(
        desc.phys_start,
        desc.page_count.saturating_mul(PAGE_SIZE),
        kind_from_uefi(desc.ty),
    )
}

/// Walk a raw UEFI memory map buffer.
///
/// Descriptors are `mmap_desc_size` bytes apart, which may be larger than
/// `size_of::<UefiDescriptor>()`; each one is read unaligned.
///
/// # Safety
/// `info.mmap_ptr .. info.mmap_ptr + info.mmap_len` must be readable and
/// contain descriptors as produced by the firmware, for the lifetime of the
/// returned iterator.
pub unsafe fn descriptors_from_raw(info: &MemoryMapInfo) -> impl Iterator<Item = MemoryDescriptor> {
    let base = info.mmap_ptr;
    let stride = info.mmap_desc_size;
    let count = if stride == 0 { 0 } else { info.mmap_len / stride };

    (0..count).map(move |i| {
        let at = (base + i * stride) as *const UefiDescriptor;
        // SAFETY: the caller guarantees the buffer covers `count` descriptors.
        let desc = unsafe { at.read_unaligned() };
        from_uefi(&desc)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_services_memory_is_free() {
        assert_eq!(kind_from_uefi(MemoryType::CONVENTIONAL), MemoryKind::Free);
        assert_eq!(kind_from_uefi(MemoryType::BOOT_SERVICES_DATA), MemoryKind::Free);
        assert_eq!(
            kind_from_uefi(MemoryType::RUNTIME_SERVICES_CODE),
            MemoryKind::FirmwareRuntime
        );
        assert_eq!(kind_from_uefi(MemoryType::RESERVED), MemoryKind::Reserved);
    }

    #[test]
    fn raw_map_is_walked_with_descriptor_stride() {
        let stride = size_of::<UefiDescriptor>() + 8;
        let mut buf = [0u8; 256];
        let descs = [
            UefiDescriptor {
                ty: MemoryType::CONVENTIONAL,
                phys_start: 0x10_0000,
                page_count: 16,
                ..UefiDescriptor::default()
            },
            UefiDescriptor {
                ty: MemoryType::ACPI_NON_VOLATILE,
                phys_start: 0x20_0000,
                page_count: 1,
                ..UefiDescriptor::default()
            },
        ];
        for (i, d) in descs.iter().enumerate() {
            let at = buf[i * stride..].as_mut_ptr().cast::<UefiDescriptor>();
            unsafe { at.write_unaligned(*d) };
        }

        let info = MemoryMapInfo {
            mmap_ptr: buf.as_ptr() as u64,
            mmap_len: (2 * stride) as u64,
            mmap_desc_size: stride as u64,
            mmap_desc_version: 1,
        };
        let mut it = unsafe { descriptors_from_raw(&info) };
        assert_eq!(
            it.next(),
            Some(MemoryDescriptor::new(0x10_0000, 0x1_0000, MemoryKind::Free))
        );
        assert_eq!(
            it.next(),
            Some(MemoryDescriptor::new(0x20_0000, 0x1000, MemoryKind::AcpiNvs))
        );
        assert_eq!(it.next(), None);
    }
}
