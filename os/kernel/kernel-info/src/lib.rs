//! # Boot Handoff and Memory Layout
//!
//! Shared definitions between the firmware-facing boot stage and the kernel's
//! physical memory management core.
//!
//! ### Boot Information ([`boot`])
//! * **Input**: [`MemoryDescriptor`](boot::MemoryDescriptor)s as reported by
//!   firmware (BIOS E820 or UEFI), tagged with a [`MemoryKind`](boot::MemoryKind).
//! * **Output**: [`UsableRange`](boot::UsableRange)s and the
//!   [`KernelHandoff`](boot::KernelHandoff) record passed to the kernel entry.
//!
//! ### Memory Layout ([`memory`])
//! Compile-time constants for page sizes, the higher-half layout and the
//! bootstrap allocation ceiling.
//!
//! ```text
//! Virtual Address Space Layout (64-bit):
//!
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │  Identity map (low memory)      │
//! IDENTITY_LOW_BYTES    ├─────────────────────────────────┤
//!                       │         (unmapped)              │
//! HHDM_BASE             ├─────────────────────────────────┤ 0xffff_8880_0000_0000
//!                       │   Higher Half Direct Mapping    │
//! KERNEL_BASE           ├─────────────────────────────────┤ 0xffff_ffff_8000_0000
//!                       │   Kernel image, then stack      │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! All ABI structures are `#[repr(C)]` with fixed-size integers.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
