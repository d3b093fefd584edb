//! Program Image Loading
//!
//! `execve` and `Kernel::spawn` hand raw image bytes to an `ImageLoader`,
//! which either rejects them or builds a complete address space. The
//! calling process is only modified after the loader succeeds.

pub mod elf;

use crate::abi::errno::SyscallError;
use crate::config::KernelConfig;
use crate::mm::address::UserAddr;
use crate::mm::space::AddressSpace;

pub use elf::{ElfError, ElfLoader};

/// A program ready to run.
#[derive(Debug)]
pub struct LoadedImage {
    /// First instruction.
    pub entry: UserAddr,
    /// Initial stack pointer.
    pub stack_top: UserAddr,
    /// Segments and stack.
    pub space: AddressSpace,
}

/// Validates executable images and installs them into fresh address spaces.
pub trait ImageLoader: Send {
    /// Build a new address space for `image`.
    ///
    /// Errors are reported as the errno `execve` returns.
    fn load(&self, image: &[u8], config: &KernelConfig) -> Result<LoadedImage, SyscallError>;
}
