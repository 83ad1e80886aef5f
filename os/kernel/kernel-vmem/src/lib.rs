//! # Virtual Memory Support
//!
//! x86-64 4-level page table construction for the boot-to-kernel handoff.
//!
//! ## What you get
//! - An [`AddressSpace`] describing a `PML4` root page table, with
//!   [`build_mapping`](AddressSpace::build_mapping) and
//!   [`translate`](AddressSpace::translate).
//! - Typed page-table entries ([`page_table`]) built on `bitfield-struct`.
//! - [`MappingFlags`] for the leaf permission and cache bits.
//! - A tiny allocator/mapper interface ([`FrameAlloc`], [`PhysMapper`]).
//!
//! ## x86-64 Virtual Address → Physical Address Walk
//!
//! Each 48-bit virtual address is divided into five fields:
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  PML4 |  PDPT |   PD  |   PT  | Offset |
//! ```
//!
//! The CPU uses these fields as **indices** into four levels of page tables,
//! each level containing 512 (2⁹) entries of 8 bytes (64 bits) each.
//!
//! ```text
//!  PML4  →  PDPT  →  PD  →  PT  →  Physical Page
//!   │        │        │        │
//!   │        │        │        └───► PTE   (Page Table Entry)  → maps 4 KiB page
//!   │        │        └────────────► PDE   (Page Directory Entry) → PS=1 → 2 MiB page
//!   │        └─────────────────────► PDPTE (Page Directory Pointer Table Entry)
//!   └──────────────────────────────► PML4E (Page Map Level 4 Entry)
//! ```
//!
//! | Level | Table name | Entry name | Description |
//! |:------|:-----------|:-----------|:------------|
//! | 4 | **PML4** | **PML4E** | Top-level table; referenced by CR3. |
//! | 3 | **PDPT** | **PDPTE** | Each entry points to a PD. |
//! | 2 | **PD**   | **PDE**   | Points to a PT, or maps a 2 MiB page when `PS=1`. |
//! | 1 | **PT**   | **PTE**   | Each entry maps a 4 KiB page. |
//!
//! A **leaf entry** directly maps physical memory; a **non-leaf entry** points
//! to the next lower table level and continues the walk. Intermediate tables
//! are allocated lazily the first time a range needs them and are never
//! freed by this crate.

#![cfg_attr(not(any(test, feature = "sim")), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

pub mod address_space;
mod flags;
pub mod page_table;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use crate::address_space::{AddressSpace, BuildMappingError, MappingRequest, MappingStats};
pub use crate::flags::{Granularity, MappingFlags};
pub use crate::page_table::{PageTable, TableLevel};
pub use kernel_memory_addresses as addresses;

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// Minimal frame allocator used to obtain **physical** 4 KiB frames
/// for page tables.
///
/// The implementation decides where frames come from (bootstrap bump
/// allocator, buddy allocator, firmware). Frames need not be zeroed; the
/// page table builder clears every table it installs.
///
/// Returns `None` on out-of-memory.
pub trait FrameAlloc {
    /// Allocate one 4 KiB *physical* frame. Must return page-aligned frames.
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;
}

impl<A: FrameAlloc + ?Sized> FrameAlloc for &mut A {
    #[inline]
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        (**self).alloc_4k()
    }
}

/// Converts physical addresses to *temporarily* usable pointers in the current
/// virtual address space (e.g., via identity map or a higher-half direct map, HHDM).
///
/// Typical patterns:
/// - **Loader**: identity-maps low memory; returns direct pointers.
/// - **Kernel**: uses HHDM; adds a constant offset before returning a pointer.
/// - **Tests**: offsets into a host buffer ([`sim::SimulatedRam`]).
pub trait PhysMapper {
    /// Pointer through which the byte at physical address `at` can be accessed.
    ///
    /// Computing the pointer is safe; dereferencing it is not.
    fn phys_to_ptr(&self, at: PhysicalAddress) -> *mut u8;

    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// - `at` must be mapped as writable for `size_of::<T>()` bytes.
    /// - The bytes at `at` must be a valid `T`, suitably aligned.
    /// - No other reference to those bytes may be live for `'a`.
    #[inline]
    unsafe fn phys_to_mut<'a, T>(&self, at: PhysicalAddress) -> &'a mut T {
        unsafe { &mut *self.phys_to_ptr(at).cast::<T>() }
    }

    /// Fill `len` bytes starting at `at` with zeros.
    ///
    /// # Safety
    /// `at .. at + len` must be mapped writable and not referenced elsewhere.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn zero(&self, at: PhysicalAddress, len: u64) {
        unsafe { core::ptr::write_bytes(self.phys_to_ptr(at), 0, len as usize) };
    }
}

impl<M: PhysMapper + ?Sized> PhysMapper for &M {
    #[inline]
    fn phys_to_ptr(&self, at: PhysicalAddress) -> *mut u8 {
        (**self).phys_to_ptr(at)
    }
}
