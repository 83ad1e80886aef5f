//! # Firmware Memory Map Normalization
//!
//! Turns the raw, firmware-supplied list of [`MemoryDescriptor`]s into an
//! ascending, non-overlapping table of [`UsableRange`]s.
//!
//! Firmware maps are adversarial input: entries arrive unsorted, may overlap
//! each other, may be zero-length, and free regions may have reserved holes
//! punched into them by later entries. [`normalize`] resolves all of that
//! deterministically:
//!
//! ```text
//!  raw:      [ Free 0x100000..0x110000 ]           [ Free 0x200000..0x204000 ]
//!                      [R 0x108000..0x109000]
//!
//!  usable:   [0x100000..0x108000] [0x109000..0x110000] [0x200000..0x204000]
//! ```
//!
//! The result lives in a fixed-capacity [`UsableRanges`] table so that it can
//! be produced before any allocator exists.
//!
//! ## Firmware adapters
//!
//! - [`e820`]: BIOS `INT 15h, AX=E820h` entries.
//! - `uefi` (feature `uefi`): UEFI `EFI_MEMORY_DESCRIPTOR`s.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod e820;
mod normalize;
mod ranges;
#[cfg(feature = "uefi")]
pub mod uefi;

pub use kernel_info::boot::{MemoryDescriptor, MemoryKind, UsableRange};
pub use normalize::{NormalizeError, normalize};
pub use ranges::{RangeTableError, UsableRanges};
