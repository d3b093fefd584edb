//! Kernel Configuration
//!
//! Limits the syscall layer enforces. Defaults are compile-time constants;
//! a kernel overrides them with the `with_*` setters before boot.

use crate::mm::address::{PAGE_SIZE, USER_END, USER_START};

/// Default number of process-table slots (live plus unreaped).
pub const DEFAULT_MAX_PROCESSES: usize = 64;

/// Default user stack size (16 pages).
pub const DEFAULT_USER_STACK_SIZE: usize = 16 * PAGE_SIZE;

/// Default limit on memory a single program image may occupy.
pub const DEFAULT_MAX_IMAGE_MEMORY: usize = 4 * 1024 * 1024;

/// Tunable kernel limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Process-table capacity; `fork` fails with `EAGAIN` beyond it.
    pub max_processes: usize,
    /// Size of the stack mapped for every new image.
    pub user_stack_size: usize,
    /// Bytes of segment memory an image may map.
    pub max_image_memory: usize,
    /// Lowest user virtual address.
    pub user_start: usize,
    /// One past the highest user virtual address.
    pub user_end: usize,
}

impl KernelConfig {
    pub const fn default_config() -> Self {
        Self {
            max_processes: DEFAULT_MAX_PROCESSES,
            user_stack_size: DEFAULT_USER_STACK_SIZE,
            max_image_memory: DEFAULT_MAX_IMAGE_MEMORY,
            user_start: USER_START,
            user_end: USER_END,
        }
    }

    pub const fn with_max_processes(mut self, max: usize) -> Self {
        self.max_processes = max;
        self
    }

    pub const fn with_user_stack_size(mut self, size: usize) -> Self {
        self.user_stack_size = size;
        self
    }

    pub const fn with_max_image_memory(mut self, bytes: usize) -> Self {
        self.max_image_memory = bytes;
        self
    }

    /// Set the `[start, end)` user window every new address space covers.
    pub const fn with_user_window(mut self, start: usize, end: usize) -> Self {
        self.user_start = start;
        self.user_end = end;
        self
    }

    /// Top of the user stack; the stack occupies the last
    /// `user_stack_size` bytes of the user region.
    #[inline]
    pub const fn stack_top(&self) -> usize {
        self.user_end
    }

    /// Lowest address of the user stack.
    #[inline]
    pub const fn stack_base(&self) -> usize {
        self.user_end - self.user_stack_size
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::default_config()
    }
}
