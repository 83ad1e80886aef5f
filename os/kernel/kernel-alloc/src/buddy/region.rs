//! One managed usable range: reserved header followed by the data area.

use kernel_info::boot::UsableRange;
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{align_down, align_up};

use crate::buddy::arena::{HeaderArena, NONE, SlotIndex};
use crate::buddy::{BuddyError, Level};

/// Layout and position-list head of one range.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Region {
    /// First byte (page-aligned); the header starts here.
    pub base: u64,
    /// Exclusive end (page-aligned).
    pub end: u64,
    /// First allocatable byte, right after the header.
    pub data: u64,
    pub arena: HeaderArena,
    /// Lowest free block in this region, or [`NONE`].
    pub pos_head: u64,
}

impl Region {
    pub const EMPTY: Self = Self {
        base: 0,
        end: 0,
        data: 0,
        arena: HeaderArena::new(0, 0),
        pos_head: NONE,
    };

    /// Lay out `range`: trim it to whole pages and reserve its header.
    ///
    /// Fails with [`BuddyError::DegenerateRange`] if nothing is left, or if
    /// less than half of the trimmed range remains for data.
    pub fn plan(range: &UsableRange) -> Result<Self, BuddyError> {
        let degenerate = BuddyError::DegenerateRange(range.base);
        let base = align_up(range.base, PAGE_SIZE).ok_or(degenerate)?;
        let end = align_down(range.end(), PAGE_SIZE);
        if end <= base {
            return Err(degenerate);
        }

        let limit = end - base;
        let header = HeaderArena::bytes_for(limit).ok_or(degenerate)?;
        let data_len = limit.saturating_sub(header);
        if data_len == 0 || data_len < limit / 2 {
            return Err(degenerate);
        }

        Ok(Self {
            base,
            end,
            data: base + header,
            arena: HeaderArena::new(base, data_len / PAGE_SIZE),
            pos_head: NONE,
        })
    }

    #[inline]
    pub const fn header_bytes(&self) -> u64 {
        self.data - self.base
    }

    #[inline]
    pub const fn managed_bytes(&self) -> u64 {
        self.end - self.base
    }

    #[inline]
    pub const fn contains(&self, addr: u64) -> bool {
        self.base <= addr && addr < self.end
    }

    /// Metadata slot of the block starting at `block`.
    #[inline]
    pub const fn slot_of(&self, block: u64) -> Option<SlotIndex> {
        if block < self.data {
            return None;
        }
        self.arena.slot_for_offset(block - self.data)
    }

    /// Block address described by `slot`.
    #[inline]
    pub const fn block_of(&self, slot: SlotIndex) -> u64 {
        self.data + slot.get() * PAGE_SIZE
    }

    /// Split the data area into the largest absolutely aligned
    /// power-of-two blocks, in ascending address order.
    pub fn carve(&self) -> impl Iterator<Item = (u64, Level)> + use<> {
        let end = self.end;
        let mut cur = self.data;
        core::iter::from_fn(move || {
            let remaining = end.checked_sub(cur)?;
            let fit = Level::floor_of(remaining)?;
            let align = if cur == 0 {
                Level::MAX
            } else {
                Level::floor_of(1 << cur.trailing_zeros())?
            };
            let level = fit.min(align);
            let block = cur;
            cur += level.bytes();
            Some((block, level))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_trims_and_reserves_header() {
        let r = Region::plan(&UsableRange::new(0x10_0800, 0x1_1000)).expect("plan");
        assert_eq!(r.base, 0x10_1000);
        assert_eq!(r.end, 0x11_1000);
        assert_eq!(r.header_bytes(), 0x1000);
        assert_eq!(r.data, 0x10_2000);
        assert_eq!(r.arena.slots(), 15);
    }

    #[test]
    fn single_page_range_is_degenerate() {
        assert_eq!(
            Region::plan(&UsableRange::new(0x10_0000, 0x1000)).err(),
            Some(BuddyError::DegenerateRange(0x10_0000))
        );
        assert!(Region::plan(&UsableRange::new(0x10_0800, 0x1000)).is_err());
        assert!(Region::plan(&UsableRange::new(0x10_0000, 0x2000)).is_ok());
    }

    #[test]
    fn carve_uses_largest_aligned_blocks() {
        let r = Region::plan(&UsableRange::new(0x10_0000, 0x1_1000)).expect("plan");
        let blocks = levels(&r);
        assert_eq!(
            blocks,
            &[
                (0x10_1000, 12),
                (0x10_2000, 13),
                (0x10_4000, 14),
                (0x10_8000, 15),
                (0x11_0000, 12),
            ]
        );
    }

    #[test]
    fn carve_at_zero_takes_the_largest_fit() {
        let r = Region {
            data: 0,
            end: 0x30_0000,
            ..Region::EMPTY
        };
        let blocks = levels(&r);
        assert_eq!(blocks, &[(0, 21), (0x20_0000, 20)]);
    }

    fn levels(r: &Region) -> Vec<(u64, u8)> {
        r.carve().map(|(a, l)| (a, l.get())).collect()
    }
}
