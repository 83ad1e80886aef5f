//! Block size classes.

use core::fmt;

/// Base-2 logarithm of a block size, in `[Level::MIN, Level::MAX]`.
///
/// ### Example
/// ```rust
/// # use kernel_alloc::buddy::Level;
/// assert_eq!(Level::for_size(1), Some(Level::MIN));
/// assert_eq!(Level::for_size(4097).map(Level::bytes), Some(8192));
/// assert_eq!(Level::floor_of(0x9000).map(Level::bytes), Some(0x8000));
/// ```
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Level(u8);

impl Level {
    /// One page (4 KiB).
    pub const MIN: Self = Self(12);
    /// Largest representable block (2^63 bytes).
    pub const MAX: Self = Self(63);
    /// Number of levels between `MIN` and `MAX`, inclusive.
    pub const COUNT: usize = (Self::MAX.0 - Self::MIN.0) as usize + 1;

    /// `Some` if `v` is within `[MIN, MAX]`.
    #[inline]
    #[must_use]
    pub const fn new(v: u8) -> Option<Self> {
        if v >= Self::MIN.0 && v <= Self::MAX.0 {
            Some(Self(v))
        } else {
            None
        }
    }

    /// Smallest level whose block holds `size` bytes.
    ///
    /// `None` for zero or for sizes above `2^63`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn for_size(size: u64) -> Option<Self> {
        if size == 0 {
            return None;
        }
        let log2 = (64 - (size - 1).leading_zeros()) as u8;
        if log2 < Self::MIN.0 {
            Some(Self::MIN)
        } else {
            Self::new(log2)
        }
    }

    /// Largest level whose block fits in `bytes`; `None` below one page.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn floor_of(bytes: u64) -> Option<Self> {
        if bytes == 0 {
            return None;
        }
        Self::new(63 - bytes.leading_zeros() as u8)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Block size in bytes.
    #[inline]
    #[must_use]
    pub const fn bytes(self) -> u64 {
        1 << self.0
    }

    /// The next larger level, `None` at `MAX`.
    #[inline]
    #[must_use]
    pub const fn up(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }

    /// Position in per-level tables.
    #[inline]
    pub(crate) const fn index(self) -> usize {
        (self.0 - Self::MIN.0) as usize
    }
}

impl fmt::Debug for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}
