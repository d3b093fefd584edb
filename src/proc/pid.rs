//! Pid Allocator
//!
//! Hands out process identifiers using a bitmap.
//!
//! # Design
//! - Each bit in the bitmap represents one Pid
//! - Bit = 0: Pid is free
//! - Bit = 1: Pid is held by a live or unreaped process
//! - Pid 0 and `WAIT_ANY` are permanently reserved
//! - Allocation resumes after the most recently allocated Pid, so a freed
//!   Pid is reused only after the rest of the range has been tried

use core::fmt;

use crate::abi::types::Pid;

/// Size of the bitmap in bytes; one bit for every 16-bit value.
const BITMAP_SIZE: usize = (u16::MAX as usize + 1) / 8;

/// Errors from Pid allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidError {
    /// Every Pid in range is in use.
    Exhausted,
    /// The Pid was not allocated.
    NotAllocated,
}

impl fmt::Display for PidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "no free pid"),
            Self::NotAllocated => write!(f, "pid not allocated"),
        }
    }
}

/// Bitmap Pid allocator.
pub struct PidAllocator {
    /// Bitmap tracking allocated Pids (1 = allocated, 0 = free).
    bitmap: [u8; BITMAP_SIZE],
    /// Highest Pid this allocator hands out.
    limit: u16,
    /// Pid where the next search starts.
    next: u16,
    /// Number of free Pids remaining.
    free_count: usize,
}

impl PidAllocator {
    /// Create an allocator for Pids `1..=limit`.
    ///
    /// `limit` is clamped to `Pid::MAX`.
    pub fn new(limit: u16) -> Self {
        let limit = limit.clamp(1, Pid::MAX);
        Self {
            bitmap: [0; BITMAP_SIZE],
            limit,
            next: 1,
            free_count: limit as usize,
        }
    }

    #[inline]
    fn set_bit(&mut self, raw: u16, allocated: bool) {
        let byte_idx = raw as usize / 8;
        let bit_idx = raw as usize % 8;
        if allocated {
            self.bitmap[byte_idx] |= 1 << bit_idx;
        } else {
            self.bitmap[byte_idx] &= !(1 << bit_idx);
        }
    }

    #[inline]
    fn bit(&self, raw: u16) -> bool {
        (self.bitmap[raw as usize / 8] >> (raw as usize % 8)) & 1 == 1
    }

    /// Check if a Pid is currently allocated.
    #[inline]
    pub fn is_allocated(&self, pid: Pid) -> bool {
        self.bit(pid.as_u16())
    }

    /// Allocate the next free Pid.
    pub fn alloc(&mut self) -> Result<Pid, PidError> {
        if self.free_count == 0 {
            return Err(PidError::Exhausted);
        }

        let mut raw = self.next;
        for _ in 0..self.limit {
            if !self.bit(raw) {
                self.set_bit(raw, true);
                self.free_count -= 1;
                self.next = if raw == self.limit { 1 } else { raw + 1 };
                return Pid::new(raw).ok_or(PidError::Exhausted);
            }
            raw = if raw == self.limit { 1 } else { raw + 1 };
        }

        Err(PidError::Exhausted)
    }

    /// Release a Pid for reuse.
    pub fn free(&mut self, pid: Pid) -> Result<(), PidError> {
        if pid.as_u16() > self.limit || !self.is_allocated(pid) {
            return Err(PidError::NotAllocated);
        }
        self.set_bit(pid.as_u16(), false);
        self.free_count += 1;
        Ok(())
    }
}

impl fmt::Debug for PidAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PidAllocator")
            .field("limit", &self.limit)
            .field("next", &self.next)
            .field("free", &self.free_count)
            .finish()
    }
}
