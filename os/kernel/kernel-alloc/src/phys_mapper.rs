//! # `PhysMapper` implementations
//!
//! Page tables and buddy headers are reached through a [`PhysMapper`], whose
//! strategy depends on where the code runs:
//!
//! - [`IdentityPhysMapper`]: the loader, while low memory is identity-mapped
//!   by firmware.
//! - [`HhdmPhysMapper`]: the kernel, where every physical address is mapped at
//!   `HHDM_BASE + pa`.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::phys_mapper::HhdmPhysMapper;
//! use kernel_info::memory::HHDM_BASE;
//! use kernel_memory_addresses::PhysicalAddress;
//! use kernel_vmem::PhysMapper;
//!
//! let ptr = HhdmPhysMapper.phys_to_ptr(PhysicalAddress::new(0x1234_0000));
//! assert_eq!(ptr as u64, HHDM_BASE + 0x1234_0000);
//! ```

use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] for kernels with a higher-half direct map (HHDM).
///
/// # Safety
/// Dereferencing the returned pointers requires the HHDM to be present and
/// to cover the referenced physical range.
#[derive(Debug, Copy, Clone, Default)]
pub struct HhdmPhysMapper;

impl PhysMapper for HhdmPhysMapper {
    #[inline]
    fn phys_to_ptr(&self, at: PhysicalAddress) -> *mut u8 {
        HHDM_BASE.wrapping_add(at.as_u64()) as *mut u8
    }
}

/// [`PhysMapper`] for identity-mapped physical memory (pointer == address).
///
/// # Safety
/// Dereferencing the returned pointers requires the referenced physical
/// range to be identity-mapped in the current address space.
#[derive(Debug, Copy, Clone, Default)]
pub struct IdentityPhysMapper;

impl PhysMapper for IdentityPhysMapper {
    #[inline]
    fn phys_to_ptr(&self, at: PhysicalAddress) -> *mut u8 {
        at.as_u64() as *mut u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_identity() {
        let p = IdentityPhysMapper.phys_to_ptr(PhysicalAddress::new(0xB8000));
        assert_eq!(p as u64, 0xB8000);
    }

    #[test]
    fn hhdm_adds_offset() {
        let p = HhdmPhysMapper.phys_to_ptr(PhysicalAddress::new(0x1000));
        assert_eq!(p as u64, 0xffff_8880_0000_1000);
    }
}
