//! Zeroization of Discarded User Memory
//!
//! When a process exits or replaces its image, the memory it owned is
//! cleared before it goes back to the allocator so no program data
//! survives into a later allocation.
//!
//! # Design
//! - `Zeroize` trait for buffers that can be cleared
//! - Volatile writes prevent the compiler from eliding the clear

use alloc::vec::Vec;
use core::ptr;
use core::sync::atomic::{compiler_fence, Ordering};

/// Trait for types that can be securely zeroed.
pub trait Zeroize {
    /// Overwrite this value with zeros.
    ///
    /// This operation is guaranteed to not be optimized away.
    fn zeroize(&mut self);
}

impl Zeroize for [u8] {
    fn zeroize(&mut self) {
        // SAFETY: We have a valid mutable reference to the slice
        unsafe {
            volatile_set_memory(self.as_mut_ptr(), 0, self.len());
        }
        compiler_fence(Ordering::SeqCst);
    }
}

impl Zeroize for Vec<u8> {
    fn zeroize(&mut self) {
        self.as_mut_slice().zeroize();
    }
}

/// Volatile memset that cannot be optimized away.
///
/// # Safety
/// - `dst` must be valid for writes of `count` bytes
#[inline]
unsafe fn volatile_set_memory(dst: *mut u8, val: u8, count: usize) {
    for i in 0..count {
        // SAFETY: Caller guarantees dst is valid for count bytes
        unsafe {
            ptr::write_volatile(dst.add(i), val);
        }
    }
}
