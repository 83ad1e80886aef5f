//! # Physical Memory Manager
//!
//! Ties the memory core together for the boot-to-kernel handoff:
//!
//! 1. [`boot_memory_setup`] runs in the loader. It normalizes the firmware
//!    memory map, bump-allocates the root page table, kernel image and
//!    stack, builds the initial mappings and publishes a
//!    [`KernelHandoff`](kernel_info::boot::KernelHandoff).
//! 2. [`MemoryManager`] runs in the kernel. It is the single context object
//!    that owns the buddy allocator and the root table; every allocation,
//!    free and new mapping goes through it.
//!
//! ```text
//!  firmware map ─► normalize ─► bootstrap ─► page tables ─► handoff
//!                                                  │
//!                      MemoryManager::from_handoff ◄┘
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use kernel_alloc::phys_mapper::{HhdmPhysMapper, IdentityPhysMapper};
//! use kernel_mmap::{MemoryDescriptor, MemoryKind};
//! use kernel_pmm::{BootLayout, MemoryManager, boot_memory_setup};
//!
//! // Loader: low memory is still identity-mapped by firmware.
//! let mut map = [MemoryDescriptor::new(0x10_0000, 0x3FF0_0000, MemoryKind::Free)];
//! let layout = BootLayout::new(0x20_0000, 0x1000);
//! let boot = boot_memory_setup(&mut map, &layout, IdentityPhysMapper)?;
//!
//! // Kernel: CR3 now holds `boot.handoff.pml4_phys`.
//! let mut mm = unsafe { MemoryManager::from_handoff(HhdmPhysMapper, &boot.handoff) }?;
//! let frame = mm.allocate(0x4000)?;
//! mm.free(frame, 0x4000)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod boot;
mod manager;

pub use crate::boot::{BootLayout, BootMemory, BootSetupError, boot_memory_setup};
pub use crate::manager::{MemoryManager, MemoryManagerError};
