use crate::ranges::{RangeTableError, UsableRanges};
use kernel_info::boot::{MemoryDescriptor, UsableRange};
use log::{debug, error, info, trace};

/// Error returned by [`normalize`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// The map contained no free memory at all; there is nothing to boot into.
    #[error("memory map contains no usable memory")]
    NoUsableMemory,
    /// The usable ranges do not fit the table.
    #[error(transparent)]
    RangeTable(#[from] RangeTableError),
}

/// Normalize a raw firmware memory map into sorted, disjoint usable ranges.
///
/// The input is sorted in place (stable, by base address). Then a single
/// left-to-right sweep tracks the end of free coverage seen so far:
///
/// 1. Each free entry has its start clipped up to that end; an entry that
///    ends at or before it is contained in an earlier one and dropped.
/// 2. Every non-free entry overlapping the remaining span cuts it; the parts
///    in front of and behind the cut survive.
/// 3. Surviving non-empty spans are appended, touching spans merged.
///
/// Non-free memory therefore always wins over free memory, regardless of
/// the order the firmware reported them in. Running the function on its own
/// output yields the same ranges.
///
/// # Errors
/// - [`NormalizeError::NoUsableMemory`] if no free byte survives.
/// - [`NormalizeError::RangeTable`] if the result does not fit the table.
pub fn normalize(entries: &mut [MemoryDescriptor]) -> Result<UsableRanges, NormalizeError> {
    sort_by_base(entries);

    let mut out = UsableRanges::new();
    let mut min_start = 0u64;

    for e in entries.iter().filter(|e| e.kind.is_free()) {
        let start = e.base.max(min_start);
        let end = e.end();
        if end <= start {
            trace!("dropping free entry {:#x}+{:#x}: already covered", e.base, e.limit);
            continue;
        }
        min_start = end;
        carve_reserved(entries, start, end, &mut out)?;
    }

    if out.is_empty() {
        error!("memory map with {} entries has no usable memory", entries.len());
        return Err(NormalizeError::NoUsableMemory);
    }

    for r in &out {
        debug!("usable: {:#014x}..{:#014x} ({} KiB)", r.base, r.end(), r.limit / 1024);
    }
    info!(
        "memory map normalized: {} raw entries -> {} usable ranges, {} KiB",
        entries.len(),
        out.len(),
        out.total_bytes() / 1024
    );
    Ok(out)
}

/// Emit `[start, end)` minus every non-free entry overlapping it.
///
/// `entries` must be sorted by base.
fn carve_reserved(
    entries: &[MemoryDescriptor],
    start: u64,
    end: u64,
    out: &mut UsableRanges,
) -> Result<(), RangeTableError> {
    let mut cursor = start;
    for r in entries.iter().filter(|r| !r.kind.is_free() && r.limit != 0) {
        if r.base >= end {
            break;
        }
        if r.end() <= cursor {
            continue;
        }
        if r.base > cursor {
            out.push(UsableRange::new(cursor, r.base - cursor))?;
        }
        trace!("carving {:?} at {:#x}+{:#x}", r.kind, r.base, r.limit);
        cursor = cursor.max(r.end());
        if cursor >= end {
            return Ok(());
        }
    }
    out.push(UsableRange::new(cursor, end - cursor))
}

/// Stable insertion sort by base address.
///
/// Firmware maps have a few dozen entries, and this runs before any allocator
/// exists.
fn sort_by_base(entries: &mut [MemoryDescriptor]) {
    for i in 1..entries.len() {
        let mut j = i;
        while j > 0 && entries[j - 1].base > entries[j].base {
            entries.swap(j - 1, j);
            j -= 1;
        }
    }
}
