//! Allocator accounting.

use crate::buddy::Level;

/// Snapshot of a [`BuddyAllocator`](crate::buddy::BuddyAllocator).
///
/// For a closed system, `free_bytes + live allocations + header_bytes ==
/// managed_bytes` at all times.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BuddyStats {
    /// Bytes of all page-trimmed ranges, headers included.
    pub managed_bytes: u64,
    /// Bytes reserved for metadata headers.
    pub header_bytes: u64,
    /// Bytes in free blocks.
    pub free_bytes: u64,
    /// Free blocks per level, indexed from [`Level::MIN`].
    pub free_blocks: [u64; Level::COUNT],
}

impl BuddyStats {
    /// Free blocks of exactly `level`.
    #[must_use]
    pub const fn free_blocks_at(&self, level: Level) -> u64 {
        self.free_blocks[level.index()]
    }

    /// Bytes currently handed out.
    #[must_use]
    pub const fn allocated_bytes(&self) -> u64 {
        self.managed_bytes - self.header_bytes - self.free_bytes
    }
}
