//! Host-memory "physical RAM" for tests.
//!
//! [`SimulatedRam`] owns a run of 4 KiB-aligned frames that stand in for the
//! physical range `base .. base + frames * 4096`, and implements
//! [`PhysMapper`] over it. [`FrameBump`] hands out its frames in order, the
//! way a loader's bump allocator would.
//!
//! Enabled for this crate's own tests and, through the `sim` feature, for the
//! tests of dependent crates.

use crate::{FrameAlloc, PhysMapper};
use core::cell::Cell;
use core::ptr::NonNull;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// A 4 KiB-aligned raw frame.
#[repr(C, align(4096))]
struct Aligned4K([u8; 4096]);

/// A tiny in-memory "RAM" addressed by simulated physical addresses.
pub struct SimulatedRam {
    base: u64,
    frames: NonNull<Aligned4K>,
    count: usize,
    next: Cell<u64>,
}

impl SimulatedRam {
    /// `frames` zeroed 4 KiB frames starting at physical `base`.
    ///
    /// # Panics
    /// If `base` is not 4 KiB-aligned.
    #[must_use]
    pub fn new(base: u64, frames: usize) -> Self {
        assert_eq!(base & 0xFFF, 0, "simulated RAM base must be page aligned");
        let storage: Box<[Aligned4K]> = (0..frames).map(|_| Aligned4K([0; 4096])).collect();
        let raw = Box::into_raw(storage);
        Self {
            base,
            // SAFETY: `Box::into_raw` never returns null.
            frames: unsafe { NonNull::new_unchecked(raw.cast::<Aligned4K>()) },
            count: frames,
            next: Cell::new(base),
        }
    }

    /// Large enough to hold `start .. end`, rounded out to whole frames.
    #[must_use]
    pub fn covering(start: u64, end: u64) -> Self {
        let base = start & !0xFFF;
        let frames = usize::try_from((end - base).div_ceil(4096)).unwrap_or(usize::MAX);
        Self::new(base, frames)
    }

    /// First simulated physical address.
    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// One past the last simulated physical address.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base + (self.count as u64) * 4096
    }

    /// Frame allocator handing out this RAM's frames in ascending order.
    #[must_use]
    pub const fn frame_bump(&self) -> FrameBump<'_> {
        FrameBump { ram: self }
    }

    /// Frames handed out through [`frame_bump`](Self::frame_bump) so far.
    #[must_use]
    pub fn frames_used(&self) -> u64 {
        (self.next.get() - self.base) / 4096
    }

    /// Read a `u64` at a simulated physical address.
    #[must_use]
    pub fn read_u64(&self, at: u64) -> u64 {
        // SAFETY: `phys_to_ptr` bounds-checks; unaligned reads are allowed.
        unsafe { self.phys_to_ptr(PhysicalAddress::new(at)).cast::<u64>().read_unaligned() }
    }

    /// Fill `len` bytes at `at` with `byte`.
    pub fn fill(&self, at: u64, len: u64, byte: u8) {
        assert!(at + len <= self.end(), "fill beyond simulated RAM");
        let ptr = self.phys_to_ptr(PhysicalAddress::new(at));
        // SAFETY: range checked above.
        unsafe { core::ptr::write_bytes(ptr, byte, usize::try_from(len).unwrap_or(0)) };
    }
}

impl PhysMapper for SimulatedRam {
    /// # Panics
    /// If `at` lies outside the simulated range.
    #[allow(clippy::cast_possible_truncation)]
    fn phys_to_ptr(&self, at: PhysicalAddress) -> *mut u8 {
        let pa = at.as_u64();
        assert!(
            pa >= self.base && pa < self.end(),
            "{at} outside simulated RAM {:#x}..{:#x}",
            self.base,
            self.end()
        );
        // SAFETY: in bounds of the owned allocation.
        unsafe { self.frames.as_ptr().cast::<u8>().add((pa - self.base) as usize) }
    }
}

impl Drop for SimulatedRam {
    fn drop(&mut self) {
        let slice = core::ptr::slice_from_raw_parts_mut(self.frames.as_ptr(), self.count);
        // SAFETY: created by `Box::into_raw` in `new` with the same length.
        drop(unsafe { Box::from_raw(slice) });
    }
}

/// Bump allocator over a [`SimulatedRam`].
pub struct FrameBump<'a> {
    ram: &'a SimulatedRam,
}

impl FrameAlloc for FrameBump<'_> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        let next = self.ram.next.get();
        if next + 4096 > self.ram.end() {
            return None;
        }
        self.ram.next.set(next + 4096);
        Some(PhysicalPage::from_addr(PhysicalAddress::new(next)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_handed_out_in_order() {
        let ram = SimulatedRam::new(0x1000, 2);
        let mut bump = ram.frame_bump();
        assert_eq!(bump.alloc_4k().map(|p| p.base().as_u64()), Some(0x1000));
        assert_eq!(bump.alloc_4k().map(|p| p.base().as_u64()), Some(0x2000));
        assert_eq!(bump.alloc_4k(), None);
        assert_eq!(ram.frames_used(), 2);
    }

    #[test]
    fn writes_are_visible_through_the_mapper() {
        let ram = SimulatedRam::new(0x10_0000, 1);
        ram.fill(0x10_0008, 8, 0xAB);
        assert_eq!(ram.read_u64(0x10_0008), 0xABAB_ABAB_ABAB_ABAB);
        unsafe { ram.zero(PhysicalAddress::new(0x10_0008), 8) };
        assert_eq!(ram.read_u64(0x10_0008), 0);
    }

    #[test]
    #[should_panic(expected = "outside simulated RAM")]
    fn out_of_range_access_panics() {
        let ram = SimulatedRam::new(0x10_0000, 1);
        let _ = ram.phys_to_ptr(PhysicalAddress::new(0x10_1000));
    }
}
