//! # BIOS E820 Memory Map Entries
//!
//! Layout of one `INT 15h, AX=E820h` result, as written by the real-mode
//! boot stage, and its conversion into a [`MemoryDescriptor`].

use kernel_info::boot::{MemoryDescriptor, MemoryKind};

/// One raw E820 entry (20 bytes; the optional ACPI 3.0 attribute dword is
/// not used).
#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct E820Entry {
    pub base: u64,
    pub length: u64,
    pub kind: u32,
}

impl E820Entry {
    /// Convert into the firmware-agnostic descriptor shape.
    #[must_use]
    pub const fn to_descriptor(self) -> MemoryDescriptor {
        MemoryDescriptor::new(self.base, self.length, kind_from_e820(self.kind))
    }
}

/// Map an E820 type code to a [`MemoryKind`].
///
/// Unknown codes are treated as reserved, as ACPI requires for E820.
#[must_use]
pub const fn kind_from_e820(code: u32) -> MemoryKind {
    match code {
        1 => MemoryKind::Free,
        3 => MemoryKind::AcpiReclaimable,
        4 => MemoryKind::AcpiNvs,
        5 => MemoryKind::Unusable,
        7 => MemoryKind::Persistent,
        _ => MemoryKind::Reserved,
    }
}
