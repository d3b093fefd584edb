//! User Virtual Addresses
//!
//! Type-safe wrapper for addresses in a process's address space. Syscall
//! pointer arguments arrive as raw words and become `UserAddr` before the
//! kernel translates them; they are never dereferenced directly.
//!
//! # User Region
//! ```text
//! 0x0000_0000 ┌──────────────────────┐
//!             │ unmapped (null page  │
//!             │ and low guard)       │
//! USER_START  ├──────────────────────┤
//!             │ program segments     │
//!             │ ...                  │
//!             │ user stack           │
//! USER_END    └──────────────────────┘
//! ```

use core::fmt;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;
/// Bits to shift for page number
pub const PAGE_SHIFT: usize = 12;

/// Start of user-accessible memory
pub const USER_START: usize = 0x0040_0000;
/// End of user-accessible memory (exclusive)
pub const USER_END: usize = 0x8000_0000;

/// A virtual address in a user address space.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct UserAddr(usize);

impl UserAddr {
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Align the address down to the nearest page boundary.
    #[inline]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Align the address up to the nearest page boundary.
    ///
    /// Returns None if rounding up overflows.
    #[inline]
    pub const fn align_up(self) -> Option<Self> {
        match self.0.checked_add(PAGE_MASK) {
            Some(v) => Some(Self(v & !PAGE_MASK)),
            None => None,
        }
    }

    /// Get the page offset (lowest 12 bits).
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    /// Add an offset, failing on overflow.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Check that `[self, self + len)` lies inside `[start, end)`.
    #[inline]
    pub const fn range_within(self, len: usize, start: usize, end: usize) -> bool {
        match self.0.checked_add(len) {
            Some(last) => self.0 >= start && last <= end,
            None => false,
        }
    }
}

impl fmt::Debug for UserAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserAddr({:#010x})", self.0)
    }
}

impl fmt::Display for UserAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Round `len` up to a whole number of pages.
#[inline]
pub const fn page_round_up(len: usize) -> Option<usize> {
    match len.checked_add(PAGE_MASK) {
        Some(v) => Some(v & !PAGE_MASK),
        None => None,
    }
}
