//! Free-block metadata stored inside each range's reserved header.
//!
//! The header is an array of fixed-size [`Node`] slots, one per page of the
//! data area that follows it. The node of a free block starting `O` bytes
//! into the data area lives in slot `O / PAGE_SIZE`, i.e. at byte
//! `O / SCALING_FACTOR` of the header. A slot whose `level` is zero is
//! empty.

use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{PhysicalAddress, align_up};
use kernel_vmem::PhysMapper;

use crate::buddy::Level;

/// Link value meaning "no node".
pub(crate) const NONE: u64 = u64::MAX;

/// Size of one metadata slot.
pub const NODE_SIZE: u64 = 64;

/// Data bytes described by one header byte.
pub const SCALING_FACTOR: u64 = PAGE_SIZE / NODE_SIZE;

/// Metadata of one free block.
///
/// Links are block addresses; [`NONE`] terminates a list.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub(crate) struct Node {
    pub block: u64,
    pub level: u64,
    /// Previous free block by address, same region.
    pub pos_prev: u64,
    /// Next free block by address, same region.
    pub pos_next: u64,
    /// Previous node in this level's free list.
    pub size_prev: u64,
    /// Next node in this level's free list.
    pub size_next: u64,
    _reserved: [u64; 2],
}

const _: () = assert!(size_of::<Node>() as u64 == NODE_SIZE);

impl Node {
    pub fn new(block: u64, level: Level, pos_prev: u64, pos_next: u64, size_next: u64) -> Self {
        Self {
            block,
            level: u64::from(level.get()),
            pos_prev,
            pos_next,
            size_prev: NONE,
            size_next,
            _reserved: [0; 2],
        }
    }

    #[inline]
    pub const fn is_live(&self) -> bool {
        self.level != 0
    }

    #[inline]
    pub fn level(&self) -> Option<Level> {
        u8::try_from(self.level).ok().and_then(Level::new)
    }

    /// Exclusive end of the described block.
    #[inline]
    pub fn end(&self) -> u64 {
        self.level()
            .map_or(self.block, |l| self.block.saturating_add(l.bytes()))
    }
}

/// Index of a slot known to be inside its arena.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct SlotIndex(u64);

impl SlotIndex {
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// The slot array at the start of one usable range.
#[derive(Debug, Copy, Clone, Default)]
pub(crate) struct HeaderArena {
    start: u64,
    slots: u64,
}

impl HeaderArena {
    pub const fn new(start: u64, slots: u64) -> Self {
        Self { start, slots }
    }

    /// Header bytes reserved for a range of `limit` bytes.
    pub const fn bytes_for(limit: u64) -> Option<u64> {
        align_up(limit.div_ceil(SCALING_FACTOR), PAGE_SIZE)
    }

    #[inline]
    pub const fn slots(&self) -> u64 {
        self.slots
    }

    /// Slot for the block `offset` bytes into the data area.
    #[inline]
    pub const fn slot_for_offset(&self, offset: u64) -> Option<SlotIndex> {
        if offset % PAGE_SIZE != 0 {
            return None;
        }
        self.checked(offset / PAGE_SIZE)
    }

    /// Bounds-checked slot index.
    #[inline]
    pub const fn checked(&self, index: u64) -> Option<SlotIndex> {
        if index < self.slots {
            Some(SlotIndex(index))
        } else {
            None
        }
    }

    pub fn read<M: PhysMapper>(&self, mapper: &M, slot: SlotIndex) -> Node {
        self.access(mapper, slot, |n| *n)
    }

    pub fn write<M: PhysMapper>(&self, mapper: &M, slot: SlotIndex, node: Node) {
        self.access(mapper, slot, |n| *n = node);
    }

    pub fn update<M: PhysMapper>(&self, mapper: &M, slot: SlotIndex, f: impl FnOnce(&mut Node)) {
        self.access(mapper, slot, f);
    }

    pub fn clear<M: PhysMapper>(&self, mapper: &M, slot: SlotIndex) {
        self.write(mapper, slot, Node::default());
    }

    fn access<M: PhysMapper, R>(
        &self,
        mapper: &M,
        slot: SlotIndex,
        f: impl FnOnce(&mut Node) -> R,
    ) -> R {
        let at = PhysicalAddress::new(self.start + slot.0 * NODE_SIZE);
        // SAFETY: `SlotIndex` is only created below `self.slots`, so `at` lies
        // in the header, which is reserved for nodes, zero-initialized and
        // 64-byte aligned. The borrow ends before this function returns.
        let node = unsafe { mapper.phys_to_mut::<Node>(at) };
        f(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_vmem::sim::SimulatedRam;

    #[test]
    fn header_size_rounds_to_pages() {
        assert_eq!(HeaderArena::bytes_for(0x1_0000), Some(0x1000));
        // One header page describes 64 pages of range.
        assert_eq!(HeaderArena::bytes_for(0x4_0000), Some(0x1000));
        assert_eq!(HeaderArena::bytes_for(0x4_0001), Some(0x2000));
    }

    #[test]
    fn slots_are_bounds_checked() {
        let arena = HeaderArena::new(0x1000, 4);
        assert_eq!(arena.slot_for_offset(0x3000).map(SlotIndex::get), Some(3));
        assert_eq!(arena.slot_for_offset(0x4000), None);
        assert_eq!(arena.slot_for_offset(0x800), None);
    }

    #[test]
    fn nodes_land_at_offset_over_scaling_factor() {
        let ram = SimulatedRam::new(0x1000, 1);
        let arena = HeaderArena::new(0x1000, 64);
        let slot = arena.slot_for_offset(0x5000).expect("slot");
        let node = Node::new(0xAB_5000, Level::MIN, NONE, NONE, NONE);
        arena.write(&ram, slot, node);

        assert_eq!(ram.read_u64(0x1000 + 0x5000 / SCALING_FACTOR), 0xAB_5000);
        assert_eq!(arena.read(&ram, slot), node);
        assert!(arena.read(&ram, slot).is_live());

        arena.clear(&ram, slot);
        assert!(!arena.read(&ram, slot).is_live());
    }
}
