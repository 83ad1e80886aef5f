//! # Buddy Allocator
//!
//! Power-of-two physical block allocator over the normalized usable ranges.
//!
//! ## Layout
//!
//! Every managed range starts with a reserved header holding one 64-byte
//! node slot per data page. A free block's metadata lives in the
//! slot derived from its own address, so describing memory never needs
//! memory from elsewhere:
//!
//! ```text
//! base                data                                       end
//! ┌───────────────────┬──────────┬───────┬────────────────┬───────┐
//! │ header (nodes)    │ 4K block │ 8K    │ 16K block      │  ...  │
//! └───────────────────┴──────────┴───────┴────────────────┴───────┘
//!   slot(A) = header + (A - data) / SCALING_FACTOR
//! ```
//!
//! Each node sits on two doubly linked lists:
//! - the **size list** of its level (one global list per level, LIFO), used
//!   to find a block to hand out;
//! - the **position list** of its region (ascending addresses), used to find
//!   the spatial neighbours a freed block may coalesce with.
//!
//! Blocks are absolutely aligned: a block of level `L` starts at a multiple
//! of `2^L`, and its buddy is the block at `addr ^ 2^L`.
//!
//! ## Failure model
//!
//! Every public operation validates its input before touching any node; a
//! returned error means nothing changed.

mod arena;
mod level;
mod region;
mod stats;

pub use crate::buddy::arena::{NODE_SIZE, SCALING_FACTOR};
pub use crate::buddy::level::Level;
pub use crate::buddy::stats::BuddyStats;

use crate::buddy::arena::{NONE, Node};
use crate::buddy::region::Region;
use kernel_info::boot::UsableRange;
use kernel_info::memory::{MAX_USABLE_RANGES, PAGE_SIZE};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::{FrameAlloc, PhysMapper};
use log::{debug, info, trace, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuddyError {
    #[error("zero-sized request")]
    ZeroSize,
    #[error("request of {0:#x} bytes exceeds the largest block")]
    TooLarge(u64),
    #[error("no free block for {0:#x} bytes")]
    OutOfMemory(u64),
    #[error("{0} is not inside any managed range")]
    UnknownAddress(PhysicalAddress),
    #[error("{0} lies in a reserved header area")]
    InReservedHeader(PhysicalAddress),
    #[error("{0} is not aligned to its block size")]
    Misaligned(PhysicalAddress),
    #[error("{0} is already free")]
    AlreadyFree(PhysicalAddress),
    #[error("usable range at {0:#x} is too small to manage")]
    DegenerateRange(u64),
    #[error("more usable ranges than the allocator can track")]
    TooManyRanges,
    #[error("invalid level for divide or merge")]
    InvalidLevel,
}

/// `true` if `range` would survive [`BuddyAllocator::new`].
#[must_use]
pub fn is_manageable(range: &UsableRange) -> bool {
    Region::plan(range).is_ok()
}

/// Buddy allocator over up to [`MAX_USABLE_RANGES`] ranges.
///
/// `M` gives access to the header areas; in the kernel that is the HHDM
/// mapper, in the loader the identity mapper.
pub struct BuddyAllocator<M: PhysMapper> {
    mapper: M,
    regions: [Region; MAX_USABLE_RANGES],
    region_count: usize,
    size_heads: [u64; Level::COUNT],
    free_blocks: [u64; Level::COUNT],
    max_level: Level,
}

impl<M: PhysMapper> BuddyAllocator<M> {
    /// Reserve and zero a header in every range, then file the rest of each
    /// range as the largest aligned free blocks that fit.
    ///
    /// `ranges` must be sorted and disjoint, as produced by the normalizer.
    ///
    /// # Errors
    /// - [`BuddyError::TooManyRanges`] above [`MAX_USABLE_RANGES`].
    /// - [`BuddyError::DegenerateRange`] if a range is too small to hold its
    ///   own header plus at least as much data.
    pub fn new(mapper: M, ranges: &[UsableRange]) -> Result<Self, BuddyError> {
        if ranges.len() > MAX_USABLE_RANGES {
            return Err(BuddyError::TooManyRanges);
        }
        debug_assert!(ranges.windows(2).all(|w| w[0].end() <= w[1].base));

        let mut this = Self {
            mapper,
            regions: [Region::EMPTY; MAX_USABLE_RANGES],
            region_count: 0,
            size_heads: [NONE; Level::COUNT],
            free_blocks: [0; Level::COUNT],
            max_level: Level::MIN,
        };

        // Plan everything first so a bad range leaves no header zeroed.
        for (slot, range) in this.regions.iter_mut().zip(ranges) {
            *slot = Region::plan(range)?;
        }
        this.region_count = ranges.len();

        for r in 0..this.region_count {
            let region = this.regions[r];
            // SAFETY: the header lies inside a usable range handed to us.
            unsafe {
                this.mapper
                    .zero(PhysicalAddress::new(region.base), region.header_bytes());
            }

            let mut prev = NONE;
            let mut blocks = 0_u64;
            for (block, level) in region.carve() {
                this.push_block(block, level, prev, NONE);
                this.max_level = this.max_level.max(level);
                prev = block;
                blocks += 1;
            }
            debug!(
                "buddy: region {:#x}..{:#x}, header {:#x} bytes, {blocks} blocks",
                region.base,
                region.end,
                region.header_bytes()
            );
        }

        let stats = this.stats();
        info!(
            "buddy: {} regions, {:#x} bytes free, {:#x} header bytes, largest block {:?}",
            this.region_count, stats.free_bytes, stats.header_bytes, this.max_level
        );
        Ok(this)
    }

    /// Hand out a block of at least `size` bytes.
    ///
    /// Pops the most recently filed block of the matching level, dividing a
    /// larger block first if that level is empty.
    ///
    /// # Errors
    /// - [`BuddyError::ZeroSize`] for `size == 0`.
    /// - [`BuddyError::TooLarge`] above the largest level any range holds.
    /// - [`BuddyError::OutOfMemory`] if no block at or above the level is free.
    pub fn allocate(&mut self, size: u64) -> Result<PhysicalAddress, BuddyError> {
        if size == 0 {
            return Err(BuddyError::ZeroSize);
        }
        let level = Level::for_size(size)
            .filter(|l| *l <= self.max_level)
            .ok_or(BuddyError::TooLarge(size))?;

        if self.head(level) == NONE {
            let mut from = level;
            loop {
                from = match from.up() {
                    Some(up) if up <= self.max_level => up,
                    _ => return Err(BuddyError::OutOfMemory(size)),
                };
                if self.head(from) != NONE {
                    break;
                }
            }
            self.divide(self.head(from), from, level)?;
        }

        let block = self.pop_block(level).ok_or(BuddyError::OutOfMemory(size))?;
        trace!("buddy: allocate {size:#x} -> {block:#x} ({level:?})");
        Ok(PhysicalAddress::new(block))
    }

    /// Return the block at `addr` that was allocated for `size` bytes, and
    /// coalesce it with its buddies where possible.
    ///
    /// # Errors
    /// - [`BuddyError::ZeroSize`] / [`BuddyError::TooLarge`] for bad sizes.
    /// - [`BuddyError::UnknownAddress`] if the block is not inside a range.
    /// - [`BuddyError::InReservedHeader`] if `addr` is in a header.
    /// - [`BuddyError::Misaligned`] if `addr` is not aligned to the block size.
    /// - [`BuddyError::AlreadyFree`] if any part of the block is free.
    pub fn free(&mut self, addr: PhysicalAddress, size: u64) -> Result<(), BuddyError> {
        if size == 0 {
            return Err(BuddyError::ZeroSize);
        }
        let level = Level::for_size(size).ok_or(BuddyError::TooLarge(size))?;
        let a = addr.as_u64();

        let r = self
            .region_index(a)
            .ok_or(BuddyError::UnknownAddress(addr))?;
        let region = self.regions[r];
        if a < region.data {
            return Err(BuddyError::InReservedHeader(addr));
        }
        if a & (level.bytes() - 1) != 0 {
            return Err(BuddyError::Misaligned(addr));
        }
        if a.checked_add(level.bytes()).is_none_or(|end| end > region.end) {
            return Err(BuddyError::UnknownAddress(addr));
        }
        let slot = region.slot_of(a).ok_or(BuddyError::Misaligned(addr))?;
        if region.arena.read(&self.mapper, slot).is_live() {
            warn!("buddy: double free of {addr}");
            return Err(BuddyError::AlreadyFree(addr));
        }

        let (prev, next) = self.neighbours(r, a);
        let overlaps_prev = prev != NONE && self.node(prev).end() > a;
        let overlaps_next = next != NONE && a + level.bytes() > next;
        if overlaps_prev || overlaps_next {
            warn!("buddy: free of {addr} overlaps a free block");
            return Err(BuddyError::AlreadyFree(addr));
        }

        trace!("buddy: free {addr} ({level:?})");
        self.push_block(a, level, prev, next);
        self.merge(a, level);
        Ok(())
    }

    /// Current accounting snapshot.
    #[must_use]
    pub fn stats(&self) -> BuddyStats {
        let regions = &self.regions[..self.region_count];
        let free_bytes = (0..Level::COUNT)
            .map(|i| self.free_blocks[i] << (usize::from(Level::MIN.get()) + i))
            .sum();
        BuddyStats {
            managed_bytes: regions.iter().map(Region::managed_bytes).sum(),
            header_bytes: regions.iter().map(Region::header_bytes).sum(),
            free_bytes,
            free_blocks: self.free_blocks,
        }
    }

    /// Largest level any range provides.
    #[inline]
    pub const fn max_level(&self) -> Level {
        self.max_level
    }

    /// `true` if `addr` lies inside a managed range (header included).
    #[must_use]
    pub fn manages(&self, addr: PhysicalAddress) -> bool {
        self.region_index(addr.as_u64()).is_some()
    }

    /// Split the free block at `block` (of `level`) down to `target`.
    ///
    /// The result is one block of each level `target + 1 .. level` plus two
    /// of `target`, filed at increasing addresses in place of the original
    /// in the position list.
    fn divide(&mut self, block: u64, level: Level, target: Level) -> Result<(), BuddyError> {
        if target >= level || level > self.max_level {
            return Err(BuddyError::InvalidLevel);
        }
        let node = self.node(block);
        if !node.is_live() || node.level() != Some(level) {
            return Err(BuddyError::InvalidLevel);
        }

        let original = self.unlink(block);
        let next = original.pos_next;
        let mut prev = original.pos_prev;

        self.push_block(block, target, prev, next);
        prev = block;
        let mut at = block + target.bytes();
        let mut l = target;
        while l < level {
            self.push_block(at, l, prev, next);
            prev = at;
            at += l.bytes();
            match l.up() {
                Some(up) => l = up,
                None => break,
            }
        }
        trace!("buddy: divide {block:#x} {level:?} -> {target:?}");
        Ok(())
    }

    /// Coalesce the free block at `block` with its buddy for as long as the
    /// buddy is a free position neighbour of the same level.
    ///
    /// Both the previous and the next neighbour are checked at every step.
    fn merge(&mut self, mut block: u64, mut level: Level) {
        while let Some(up) = level.up() {
            let node = self.node(block);
            let buddy = block ^ level.bytes();
            if node.pos_prev != buddy && node.pos_next != buddy {
                break;
            }
            if self.node(buddy).level() != Some(level) {
                break;
            }

            let (low, high) = (block.min(buddy), block.max(buddy));
            let outer_prev = self.node(low).pos_prev;
            let outer_next = self.node(high).pos_next;
            self.unlink(low);
            self.unlink(high);
            self.push_block(low, up, outer_prev, outer_next);
            trace!("buddy: merge {low:#x} + {high:#x} -> {up:?}");

            block = low;
            level = up;
        }
    }

    /// File a free block on its level's size list (at the head) and between
    /// `pos_prev` and `pos_next` on its region's position list.
    fn push_block(&mut self, block: u64, level: Level, pos_prev: u64, pos_next: u64) {
        let head = self.size_heads[level.index()];
        self.set_node(block, Node::new(block, level, pos_prev, pos_next, head));
        if head != NONE {
            self.update(head, |n| n.size_prev = block);
        }
        self.size_heads[level.index()] = block;
        self.free_blocks[level.index()] += 1;

        if pos_prev == NONE {
            if let Some(r) = self.region_index(block) {
                self.regions[r].pos_head = block;
            }
        } else {
            self.update(pos_prev, |n| n.pos_next = block);
        }
        if pos_next != NONE {
            self.update(pos_next, |n| n.pos_prev = block);
        }
    }

    /// Remove the head of `level`'s size list.
    fn pop_block(&mut self, level: Level) -> Option<u64> {
        let head = self.head(level);
        if head == NONE {
            return None;
        }
        self.unlink(head);
        Some(head)
    }

    /// Take `block` off both lists and clear its slot.
    fn unlink(&mut self, block: u64) -> Node {
        let node = self.node(block);
        let Some(level) = node.level() else {
            debug_assert!(false, "unlink of non-free block {block:#x}");
            return node;
        };

        if node.size_prev == NONE {
            self.size_heads[level.index()] = node.size_next;
        } else {
            self.update(node.size_prev, |n| n.size_next = node.size_next);
        }
        if node.size_next != NONE {
            self.update(node.size_next, |n| n.size_prev = node.size_prev);
        }

        if node.pos_prev == NONE {
            if let Some(r) = self.region_index(block) {
                self.regions[r].pos_head = node.pos_next;
            }
        } else {
            self.update(node.pos_prev, |n| n.pos_next = node.pos_next);
        }
        if node.pos_next != NONE {
            self.update(node.pos_next, |n| n.pos_prev = node.pos_prev);
        }

        self.clear_node(block);
        self.free_blocks[level.index()] -= 1;
        node
    }

    /// Free blocks immediately before and after `addr` in region `r`.
    ///
    /// Probes slots at doubling distances first; the nearest live node found
    /// that way is then walked along the position list to the exact splice
    /// point. Without a hit the walk starts at the region's lowest block.
    fn neighbours(&self, r: usize, addr: u64) -> (u64, u64) {
        let region = self.regions[r];
        let Some(slot) = region.slot_of(addr) else {
            return (NONE, region.pos_head);
        };
        let idx = slot.get();
        let live = |i: u64| {
            region
                .arena
                .checked(i)
                .filter(|s| region.arena.read(&self.mapper, *s).is_live())
                .map(|s| region.block_of(s))
        };

        let mut hit = None;
        let mut stride = 1_u64;
        while hit.is_none() && (stride <= idx || idx + stride < region.arena.slots()) {
            hit = idx
                .checked_sub(stride)
                .and_then(live)
                .or_else(|| live(idx + stride));
            stride <<= 1;
        }

        let (mut prev, mut next) = match hit {
            Some(b) if b < addr => (b, self.node(b).pos_next),
            Some(b) => (self.node(b).pos_prev, b),
            None => (NONE, region.pos_head),
        };
        while next != NONE && next < addr {
            prev = next;
            next = self.node(next).pos_next;
        }
        while prev != NONE && prev > addr {
            next = prev;
            prev = self.node(prev).pos_prev;
        }
        (prev, next)
    }

    #[inline]
    const fn head(&self, level: Level) -> u64 {
        self.size_heads[level.index()]
    }

    fn region_index(&self, addr: u64) -> Option<usize> {
        let regions = &self.regions[..self.region_count];
        let i = regions.partition_point(|r| r.end <= addr);
        regions.get(i).filter(|r| r.contains(addr)).map(|_| i)
    }

    fn node(&self, block: u64) -> Node {
        match self.locate(block) {
            Some((region, slot)) => region.arena.read(&self.mapper, slot),
            None => Node::default(),
        }
    }

    fn set_node(&self, block: u64, node: Node) {
        if let Some((region, slot)) = self.locate(block) {
            region.arena.write(&self.mapper, slot, node);
        }
    }

    fn clear_node(&self, block: u64) {
        if let Some((region, slot)) = self.locate(block) {
            region.arena.clear(&self.mapper, slot);
        }
    }

    fn update(&self, block: u64, f: impl FnOnce(&mut Node)) {
        if let Some((region, slot)) = self.locate(block) {
            region.arena.update(&self.mapper, slot, f);
        }
    }

    fn locate(&self, block: u64) -> Option<(Region, arena::SlotIndex)> {
        let region = self.regions[self.region_index(block)?];
        let slot = region.slot_of(block);
        debug_assert!(slot.is_some(), "no slot for block {block:#x}");
        Some((region, slot?))
    }
}

impl<M: PhysMapper> FrameAlloc for BuddyAllocator<M> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.allocate(PAGE_SIZE).ok().map(PhysicalPage::from_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_vmem::sim::SimulatedRam;

    /// One header page plus 64 KiB of data at 0x10_1000.
    fn sixteen_pages() -> (SimulatedRam, [UsableRange; 1]) {
        let range = UsableRange::new(0x10_0000, 0x1_1000);
        (SimulatedRam::covering(range.base, range.end()), [range])
    }

    fn level(bits: u8) -> Level {
        Level::new(bits).expect("level")
    }

    #[test]
    fn sixteen_pages_then_exhausted() {
        let (ram, ranges) = sixteen_pages();
        let mut buddy = BuddyAllocator::new(&ram, &ranges).expect("init");

        let mut seen = Vec::new();
        for _ in 0..16 {
            let a = buddy.allocate(4096).expect("page").as_u64();
            assert!((0x10_1000..0x11_1000).contains(&a));
            assert!(!seen.contains(&a));
            seen.push(a);
        }
        assert_eq!(buddy.allocate(4096), Err(BuddyError::OutOfMemory(4096)));
        assert_eq!(buddy.stats().free_bytes, 0);
    }

    #[test]
    fn initialization_files_carved_blocks() {
        let (ram, ranges) = sixteen_pages();
        let buddy = BuddyAllocator::new(&ram, &ranges).expect("init");
        let stats = buddy.stats();
        assert_eq!(stats.managed_bytes, 0x1_1000);
        assert_eq!(stats.header_bytes, 0x1000);
        assert_eq!(stats.free_bytes, 0x1_0000);
        assert_eq!(stats.free_blocks_at(level(12)), 2);
        assert_eq!(stats.free_blocks_at(level(13)), 1);
        assert_eq!(stats.free_blocks_at(level(14)), 1);
        assert_eq!(stats.free_blocks_at(level(15)), 1);
        assert_eq!(buddy.max_level(), level(15));
    }

    #[test]
    fn header_is_zeroed_on_init() {
        let (ram, ranges) = sixteen_pages();
        ram.fill(0x10_0000, 0x1000, 0xFF);
        let buddy = BuddyAllocator::new(&ram, &ranges).expect("init");
        // Slot 2 (0x10_3000) is inside the 8K block at 0x10_2000: empty.
        assert_eq!(ram.read_u64(0x10_0000 + 2 * NODE_SIZE + 8), 0);
        drop(buddy);
    }

    #[test]
    fn free_then_allocate_reuses_the_same_block() {
        let (ram, ranges) = sixteen_pages();
        let mut buddy = BuddyAllocator::new(&ram, &ranges).expect("init");
        let a = buddy.allocate(0x2000).expect("alloc");
        buddy.free(a, 0x2000).expect("free");
        assert_eq!(buddy.allocate(0x2000), Ok(a));
    }

    #[test]
    fn divide_yields_a_descending_chain() {
        let (ram, ranges) = sixteen_pages();
        let mut buddy = BuddyAllocator::new(&ram, &ranges).expect("init");
        buddy
            .divide(0x10_8000, level(15), level(12))
            .expect("divide");
        let stats = buddy.stats();
        // 2 carved + 2 from the split at L12, 1 carved + 1 split at L13, ...
        assert_eq!(stats.free_blocks_at(level(12)), 4);
        assert_eq!(stats.free_blocks_at(level(13)), 2);
        assert_eq!(stats.free_blocks_at(level(14)), 2);
        assert_eq!(stats.free_blocks_at(level(15)), 0);
        assert_eq!(stats.free_bytes, 0x1_0000);

        assert_eq!(
            buddy.divide(0x10_8000, level(12), level(12)),
            Err(BuddyError::InvalidLevel)
        );
        assert_eq!(
            buddy.divide(0x10_1000, level(13), level(12)),
            Err(BuddyError::InvalidLevel),
            "level mismatch"
        );
    }

    /// Free blocks of the first region in position-list order, checking the
    /// back links on the way.
    fn positions<M: PhysMapper>(buddy: &BuddyAllocator<M>) -> Vec<u64> {
        let mut at = buddy.regions[0].pos_head;
        let mut prev = NONE;
        let mut order = Vec::new();
        while at != NONE {
            assert_eq!(buddy.node(at).pos_prev, prev, "back link of {at:#x}");
            order.push(at);
            prev = at;
            at = buddy.node(at).pos_next;
        }
        order
    }

    #[test]
    fn position_list_stays_sorted_through_divide() {
        let (ram, ranges) = sixteen_pages();
        let mut buddy = BuddyAllocator::new(&ram, &ranges).expect("init");
        buddy.divide(0x10_4000, level(14), level(12)).expect("divide");

        assert_eq!(
            positions(&buddy),
            [0x10_1000, 0x10_2000, 0x10_4000, 0x10_5000, 0x10_6000, 0x10_8000, 0x11_0000]
        );
    }

    #[test]
    fn free_splices_past_the_first_neighbour_found() {
        let (ram, ranges) = sixteen_pages();
        let mut buddy = BuddyAllocator::new(&ram, &ranges).expect("init");
        for _ in 0..16 {
            buddy.allocate(4096).expect("page");
        }

        // None of these pages is the buddy of another.
        for at in [0x10_5000, 0x10_6000, 0x10_D000] {
            buddy.free(PhysicalAddress::new(at), 4096).expect("free");
        }
        // Four slots below 0x10_9000 is 0x10_5000; the splice point is after
        // 0x10_6000, three slots below.
        buddy.free(PhysicalAddress::new(0x10_9000), 4096).expect("free");

        assert_eq!(positions(&buddy), [0x10_5000, 0x10_6000, 0x10_9000, 0x10_D000]);
        assert_eq!(buddy.stats().free_blocks_at(level(12)), 4);
    }

    #[test]
    fn buddies_coalesce_in_either_order() {
        for reverse in [false, true] {
            let (ram, ranges) = sixteen_pages();
            let mut buddy = BuddyAllocator::new(&ram, &ranges).expect("init");

            // Take every page, then return the two halves of 0x10_8000..0x10_A000.
            let taken: Vec<_> = (0..16)
                .map(|_| buddy.allocate(4096).expect("page").as_u64())
                .collect();
            let a = 0x10_8000;
            let b = 0x10_9000;
            assert!(taken.contains(&a) && taken.contains(&b));

            let (first, second) = if reverse { (b, a) } else { (a, b) };
            buddy.free(PhysicalAddress::new(first), 4096).expect("free");
            buddy.free(PhysicalAddress::new(second), 4096).expect("free");

            let stats = buddy.stats();
            assert_eq!(stats.free_blocks_at(level(12)), 0);
            assert_eq!(stats.free_blocks_at(level(13)), 1);
            assert_eq!(stats.free_bytes, 0x2000);
            // The parent is served without dividing anything larger.
            assert_eq!(buddy.allocate(0x2000), Ok(PhysicalAddress::new(a)));
        }
    }

    #[test]
    fn freeing_everything_restores_the_initial_shape() {
        let (ram, ranges) = sixteen_pages();
        let mut buddy = BuddyAllocator::new(&ram, &ranges).expect("init");
        let before = buddy.stats();

        let pages: Vec<_> = (0..16).map(|_| buddy.allocate(4096).expect("page")).collect();
        for p in pages.iter().rev() {
            buddy.free(*p, 4096).expect("free");
        }
        assert_eq!(buddy.stats(), before);
    }

    #[test]
    fn merge_stops_at_non_buddy_neighbours() {
        let (ram, ranges) = sixteen_pages();
        let mut buddy = BuddyAllocator::new(&ram, &ranges).expect("init");
        // 0x10_1000 (L12) and 0x10_2000 (L13) are adjacent but not buddies.
        let a = buddy.allocate(4096).expect("page");
        assert_eq!(a, PhysicalAddress::new(0x11_0000), "LIFO: last carved page");
        let b = buddy.allocate(4096).expect("page");
        assert_eq!(b, PhysicalAddress::new(0x10_1000));
        buddy.free(b, 4096).expect("free");
        let stats = buddy.stats();
        assert_eq!(stats.free_blocks_at(level(12)), 1);
        assert_eq!(stats.free_blocks_at(level(13)), 1);
    }

    #[test]
    fn invalid_frees_are_rejected_without_change() {
        let (ram, ranges) = sixteen_pages();
        let mut buddy = BuddyAllocator::new(&ram, &ranges).expect("init");
        let a = buddy.allocate(0x2000).expect("alloc");
        let before = buddy.stats();

        assert_eq!(buddy.free(a, 0), Err(BuddyError::ZeroSize));
        assert_eq!(
            buddy.free(PhysicalAddress::new(0x50_0000), 4096),
            Err(BuddyError::UnknownAddress(PhysicalAddress::new(0x50_0000)))
        );
        assert_eq!(
            buddy.free(PhysicalAddress::new(0x10_0000), 4096),
            Err(BuddyError::InReservedHeader(PhysicalAddress::new(0x10_0000)))
        );
        assert_eq!(
            buddy.free(a + 0x1000, 0x2000),
            Err(BuddyError::Misaligned(a + 0x1000))
        );
        assert_eq!(
            buddy.free(PhysicalAddress::new(0x10_4000), 0x4000),
            Err(BuddyError::AlreadyFree(PhysicalAddress::new(0x10_4000)))
        );
        assert_eq!(
            buddy.free(PhysicalAddress::new(0x10_5000), 4096),
            Err(BuddyError::AlreadyFree(PhysicalAddress::new(0x10_5000))),
            "inside a larger free block"
        );
        assert_eq!(buddy.stats(), before);

        buddy.free(a, 0x2000).expect("free");
        assert_eq!(buddy.free(a, 0x2000), Err(BuddyError::AlreadyFree(a)));
    }

    #[test]
    fn size_limits() {
        let (ram, ranges) = sixteen_pages();
        let mut buddy = BuddyAllocator::new(&ram, &ranges).expect("init");
        assert_eq!(buddy.allocate(0), Err(BuddyError::ZeroSize));
        assert_eq!(buddy.allocate(0x1_0000), Err(BuddyError::TooLarge(0x1_0000)));
        assert_eq!(buddy.allocate(0x8000), Ok(PhysicalAddress::new(0x10_8000)));
        assert_eq!(buddy.allocate(0x8000), Err(BuddyError::OutOfMemory(0x8000)));
    }

    #[test]
    fn degenerate_and_oversized_inputs() {
        let ram = SimulatedRam::new(0x10_0000, 4);
        assert_eq!(
            BuddyAllocator::new(&ram, &[UsableRange::new(0x10_0000, 0x1000)]).err(),
            Some(BuddyError::DegenerateRange(0x10_0000))
        );
        assert!(!is_manageable(&UsableRange::new(0x10_0000, 0x1000)));
        let many = [UsableRange::default(); MAX_USABLE_RANGES + 1];
        assert_eq!(
            BuddyAllocator::new(&ram, &many).err(),
            Some(BuddyError::TooManyRanges)
        );
    }

    #[test]
    fn serves_as_frame_allocator() {
        let (ram, ranges) = sixteen_pages();
        let mut buddy = BuddyAllocator::new(&ram, &ranges).expect("init");
        let page = buddy.alloc_4k().expect("frame");
        assert!(buddy.manages(page.base()));
        assert_eq!(buddy.stats().allocated_bytes(), 4096);
    }
}
