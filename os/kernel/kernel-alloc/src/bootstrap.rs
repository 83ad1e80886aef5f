//! # Bootstrap-Only Frame Allocator
//!
//! A page-granular bump allocator over the normalized usable ranges. It is
//! the only allocator available before the buddy allocator is built: the
//! loader uses it for the first page tables and to reserve the kernel image
//! and stack.
//!
//! ## WARNING
//!
//! - It never frees. Everything below the final [`cursor`](BootstrapAllocator::cursor)
//!   must be withheld from the buddy allocator (see `UsableRanges::exclude_below`).
//! - Exhaustion is fatal to the boot sequence; callers must not retry.

use kernel_info::boot::UsableRange;
use kernel_info::memory::{BOOTSTRAP_CEILING, PAGE_SIZE};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, align_down, align_up};
use kernel_vmem::{FrameAlloc, PhysMapper};
use log::{error, trace};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    #[error("bootstrap allocation of zero bytes")]
    ZeroSize,
    #[error("no usable range below the bootstrap ceiling has {0:#x} bytes left")]
    Exhausted(u64),
}

/// Allocate `size` bytes (rounded up to a page) from the first range at or
/// after `start` that has room below `ceiling`.
///
/// Returns the address **one past** the allocated span; the span itself
/// starts at `end - align_up(size, PAGE_SIZE)`. Feed the returned value back
/// as the next `start` to keep allocating monotonically. With `zero`, the
/// span is cleared through `mapper`.
///
/// Physical page 0 is never handed out, even when a range starts there.
///
/// # Errors
/// - [`BootstrapError::ZeroSize`] if `size` is zero.
/// - [`BootstrapError::Exhausted`] if no range can satisfy the request.
pub fn bump_allocate<M: PhysMapper>(
    ranges: &[UsableRange],
    mapper: &M,
    start: PhysicalAddress,
    size: u64,
    zero: bool,
    ceiling: u64,
) -> Result<PhysicalAddress, BootstrapError> {
    if size == 0 {
        return Err(BootstrapError::ZeroSize);
    }
    let size = align_up(size, PAGE_SIZE).ok_or(BootstrapError::Exhausted(size))?;
    let start = align_up(start.as_u64().max(PAGE_SIZE), PAGE_SIZE)
        .ok_or(BootstrapError::Exhausted(size))?;
    let ceiling = align_down(ceiling, PAGE_SIZE);

    for range in ranges {
        let Some(lo) = align_up(range.base.max(start), PAGE_SIZE) else {
            continue;
        };
        let hi = align_down(range.end().min(ceiling), PAGE_SIZE);
        if lo >= hi || hi - lo < size {
            continue;
        }

        if zero {
            // SAFETY: the span lies inside a usable range the caller owns.
            unsafe { mapper.zero(PhysicalAddress::new(lo), size) };
        }
        trace!("bootstrap: {size:#x} bytes at {lo:#x}");
        return Ok(PhysicalAddress::new(lo + size));
    }

    error!("bootstrap allocator exhausted: {size:#x} bytes from {start:#x} below {ceiling:#x}");
    Err(BootstrapError::Exhausted(size))
}

/// Cursor-carrying wrapper around [`bump_allocate`].
///
/// Implements [`FrameAlloc`] so it can back page-table construction before
/// the buddy allocator exists.
pub struct BootstrapAllocator<'r, M: PhysMapper> {
    ranges: &'r [UsableRange],
    mapper: M,
    cursor: PhysicalAddress,
    ceiling: u64,
}

impl<'r, M: PhysMapper> BootstrapAllocator<'r, M> {
    /// Start allocating at `start`, below [`BOOTSTRAP_CEILING`].
    pub const fn new(ranges: &'r [UsableRange], mapper: M, start: PhysicalAddress) -> Self {
        Self {
            ranges,
            mapper,
            cursor: start,
            ceiling: BOOTSTRAP_CEILING,
        }
    }

    /// Replace the allocation ceiling.
    #[must_use]
    pub const fn with_ceiling(mut self, ceiling: u64) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Everything below this address may have been handed out.
    #[inline]
    #[must_use]
    pub const fn cursor(&self) -> PhysicalAddress {
        self.cursor
    }

    /// Allocate `size` bytes and return the **start** of the span.
    ///
    /// # Errors
    /// See [`bump_allocate`].
    pub fn allocate(&mut self, size: u64, zero: bool) -> Result<PhysicalAddress, BootstrapError> {
        let end = bump_allocate(self.ranges, &self.mapper, self.cursor, size, zero, self.ceiling)?;
        self.cursor = end;
        // `bump_allocate` already rounded; this cannot underflow.
        let rounded = align_up(size, PAGE_SIZE).unwrap_or(size);
        Ok(PhysicalAddress::new(end.as_u64() - rounded))
    }
}

impl<M: PhysMapper> FrameAlloc for BootstrapAllocator<'_, M> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.allocate(PAGE_SIZE, false)
            .ok()
            .map(PhysicalPage::from_addr)
    }
}
