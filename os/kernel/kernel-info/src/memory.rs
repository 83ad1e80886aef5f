//! # Memory Layout

/// System page size (bytes).
pub const PAGE_SIZE: u64 = 4096;

/// `log2(PAGE_SIZE)`.
pub const PAGE_SHIFT: u32 = 12;

/// Size of a huge (PD leaf) page.
pub const HUGE_PAGE_SIZE: u64 = 2 * 1024 * 1024;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything mapped at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Where the kernel executes (VMA).
pub const KERNEL_BASE: u64 = 0xffff_ffff_8000_0000;

/// Keep a tiny identity map so the paging switch code remains executable
/// right after CR3 reload.
pub const IDENTITY_LOW_BYTES: u64 = 0x20_0000; // 2 MiB

/// Highest physical address (exclusive) the bootstrap allocator may hand out.
///
/// The legacy boot path still runs with 32-bit pointers when it builds the
/// first page tables.
pub const BOOTSTRAP_CEILING: u64 = 1 << 32;

/// Capacity of the normalized usable-range table.
pub const MAX_USABLE_RANGES: usize = 128;

/// The size of the kernel stack in debug builds.
#[cfg(debug_assertions)]
pub const KERNEL_STACK_SIZE: u64 = 64 * 1024;

/// The size of the kernel stack in release builds.
#[cfg(not(debug_assertions))]
pub const KERNEL_STACK_SIZE: u64 = 32 * 1024;

const _: () = {
    assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
    assert!(HUGE_PAGE_SIZE.is_multiple_of(PAGE_SIZE));
    assert!(KERNEL_STACK_SIZE.is_multiple_of(PAGE_SIZE));
    assert!(IDENTITY_LOW_BYTES.is_multiple_of(HUGE_PAGE_SIZE));
    assert!(KERNEL_BASE > HHDM_BASE);
    assert!(BOOTSTRAP_CEILING.is_multiple_of(PAGE_SIZE));
};
