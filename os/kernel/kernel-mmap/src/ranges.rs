use kernel_info::boot::UsableRange;
use kernel_info::memory::MAX_USABLE_RANGES;

/// Rejection of an entry pushed into a [`UsableRanges`] table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeTableError {
    /// No room for another entry.
    #[error("usable range table is full")]
    Full,
    /// The entry at this base starts before the end of the last one.
    #[error("usable range at {0:#x} overlaps or precedes the previous one")]
    Unordered(u64),
}

/// Fixed-capacity, allocation-free table of [`UsableRange`]s.
///
/// ### Invariants
/// - Entries are sorted ascending by `base`.
/// - Entries are pairwise non-overlapping and non-empty.
///
/// Both invariants are upheld by [`push`](Self::push), which only accepts
/// entries that start at or after the end of the last one. Entries that touch
/// the previous one are merged into it.
#[derive(Clone)]
pub struct UsableRanges {
    entries: [UsableRange; MAX_USABLE_RANGES],
    len: usize,
}

impl UsableRanges {
    /// An empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [UsableRange::new(0, 0); MAX_USABLE_RANGES],
            len: 0,
        }
    }

    /// Build a table from already-normalized ranges.
    ///
    /// # Errors
    /// - [`RangeTableError::Full`] if the input does not fit into the table.
    /// - [`RangeTableError::Unordered`] if the input is not sorted and disjoint.
    pub fn from_sorted(ranges: &[UsableRange]) -> Result<Self, RangeTableError> {
        let mut table = Self::new();
        for r in ranges {
            table.push(*r)?;
        }
        Ok(table)
    }

    /// Append a range, merging it into the last entry when they touch.
    ///
    /// Empty ranges are ignored.
    ///
    /// The table is left unchanged on error.
    ///
    /// # Errors
    /// - [`RangeTableError::Unordered`] if `range` starts before the end of
    ///   the last entry.
    /// - [`RangeTableError::Full`] if a new entry is needed and the table is
    ///   full.
    pub fn push(&mut self, range: UsableRange) -> Result<(), RangeTableError> {
        if range.is_empty() {
            return Ok(());
        }

        if let Some(last) = self.entries[..self.len].last_mut() {
            if range.base < last.end() {
                return Err(RangeTableError::Unordered(range.base));
            }
            if range.base == last.end() {
                last.limit += range.limit;
                return Ok(());
            }
        }

        if self.len == MAX_USABLE_RANGES {
            return Err(RangeTableError::Full);
        }
        self.entries[self.len] = range;
        self.len += 1;
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[UsableRange] {
        &self.entries[..self.len]
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn iter(&self) -> core::slice::Iter<'_, UsableRange> {
        self.as_slice().iter()
    }

    /// Sum of all range lengths.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.iter().map(|r| r.limit).sum()
    }

    /// Index of the range containing `addr`, if any.
    #[must_use]
    pub fn find(&self, addr: u64) -> Option<usize> {
        let ranges = self.as_slice();
        let idx = ranges.partition_point(|r| r.end() <= addr);
        ranges
            .get(idx)
            .filter(|r| r.contains(addr))
            .map(|_| idx)
    }

    /// A copy of this table with everything below `addr` removed.
    ///
    /// Ranges entirely below `addr` disappear; a range straddling it is
    /// shortened to start at `addr`.
    #[must_use]
    pub fn exclude_below(&self, addr: u64) -> Self {
        let mut out = Self::new();
        for r in self.iter() {
            if r.end() <= addr {
                continue;
            }
            let base = r.base.max(addr);
            out.entries[out.len] = UsableRange::new(base, r.end() - base);
            out.len += 1;
        }
        out
    }
}

impl Default for UsableRanges {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for UsableRanges {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a UsableRanges {
    type Item = &'a UsableRange;
    type IntoIter = core::slice::Iter<'a, UsableRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_merges_touching_ranges() {
        let mut t = UsableRanges::new();
        t.push(UsableRange::new(0x1000, 0x1000)).unwrap();
        t.push(UsableRange::new(0x2000, 0x1000)).unwrap();
        t.push(UsableRange::new(0x8000, 0x1000)).unwrap();
        t.push(UsableRange::new(0x9000, 0)).unwrap();
        assert_eq!(
            t.as_slice(),
            &[UsableRange::new(0x1000, 0x2000), UsableRange::new(0x8000, 0x1000)]
        );
        assert_eq!(t.total_bytes(), 0x3000);
    }

    #[test]
    fn push_rejects_overlap() {
        let mut t = UsableRanges::new();
        t.push(UsableRange::new(0x1000, 0x2000)).unwrap();
        assert_eq!(
            t.push(UsableRange::new(0x2000, 0x1000)),
            Err(RangeTableError::Unordered(0x2000))
        );
        assert_eq!(t.as_slice(), &[UsableRange::new(0x1000, 0x2000)]);
    }

    #[test]
    fn from_sorted_rejects_unsorted_input() {
        let err = UsableRanges::from_sorted(&[
            UsableRange::new(0x8000, 0x1000),
            UsableRange::new(0x1000, 0x1000),
        ])
        .err();
        assert_eq!(err, Some(RangeTableError::Unordered(0x1000)));
    }

    #[test]
    fn push_reports_full_table() {
        let mut t = UsableRanges::new();
        for i in 0..MAX_USABLE_RANGES as u64 {
            t.push(UsableRange::new(i * 0x2000, 0x1000)).unwrap();
        }
        let next = UsableRange::new(MAX_USABLE_RANGES as u64 * 0x2000, 0x1000);
        assert_eq!(t.push(next), Err(RangeTableError::Full));
    }

    #[test]
    fn find_uses_half_open_bounds() {
        let t = UsableRanges::from_sorted(&[
            UsableRange::new(0x1000, 0x1000),
            UsableRange::new(0x4000, 0x2000),
        ])
        .unwrap();
        assert_eq!(t.find(0x0fff), None);
        assert_eq!(t.find(0x1000), Some(0));
        assert_eq!(t.find(0x2000), None);
        assert_eq!(t.find(0x5fff), Some(1));
        assert_eq!(t.find(0x6000), None);
    }

    #[test]
    fn exclude_below_trims_and_drops() {
        let t = UsableRanges::from_sorted(&[
            UsableRange::new(0x1000, 0x1000),
            UsableRange::new(0x4000, 0x4000),
            UsableRange::new(0x10000, 0x1000),
        ])
        .unwrap();
        let rest = t.exclude_below(0x6000);
        assert_eq!(
            rest.as_slice(),
            &[UsableRange::new(0x6000, 0x2000), UsableRange::new(0x10000, 0x1000)]
        );
    }
}
