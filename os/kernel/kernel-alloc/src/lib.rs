//! # Physical Memory Allocation
//!
//! The two allocators of the boot-to-kernel memory path, plus the
//! [`PhysMapper`](kernel_vmem::PhysMapper) strategies they run under.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                Buddy allocator ([`buddy`])          │
//! │    • Power-of-two blocks, split and coalesce        │
//! │    • Metadata in a header inside each range         │
//! └─────────────────▲───────────────────────────────────┘
//!                   │ ranges minus bootstrap consumption
//! ┌─────────────────┴───────────────────────────────────┐
//! │           Bootstrap allocator ([`bootstrap`])       │
//! │    • Page-granular bump, never frees                │
//! │    • First page tables, kernel image, stack         │
//! └─────────────────▲───────────────────────────────────┘
//!                   │ normalized usable ranges
//!            (firmware memory map)
//! ```
//!
//! Both implement [`FrameAlloc`](kernel_vmem::FrameAlloc), so either can
//! supply intermediate page tables to
//! [`AddressSpace::build_mapping`](kernel_vmem::AddressSpace::build_mapping).
//!
//! ## Concurrency
//!
//! None of this is reentrant or locked. Allocators are plain values owned by
//! a single context and mutated through `&mut self`; sharing one across
//! execution contexts needs a lock around every call.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod bootstrap;
pub mod buddy;
pub mod phys_mapper;

pub use crate::bootstrap::{BootstrapAllocator, BootstrapError, bump_allocate};
pub use crate::buddy::{BuddyAllocator, BuddyError, BuddyStats, Level};
