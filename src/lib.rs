//! PantherOS Syscall ABI
//!
//! The contract between user programs and the PantherOS kernel, and the
//! kernel-side layer that enforces it.
//!
//! # Calls
//! - exit, fork, waitpid, execve: process lifecycle
//! - read: descriptor I/O with partial transfers
//! - nanosleep, scheduler_yield: timing and cooperative scheduling
//!
//! # Layout
//! - `abi`: numbers, wire types, errno values, user-side wrappers
//! - `trap`: saved registers and the AArch64 `svc` convention
//! - `syscall`: argument validation and the handlers
//! - `kernel`: process table, scheduler, clock, and loader wired together
//!
//! # Security Features
//! - User pointers are translated through the caller's address space,
//!   never dereferenced
//! - A failed call leaves the caller unchanged
//! - Discarded user memory is zeroized

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod abi;
pub mod config;
pub mod io;
pub mod kernel;
pub mod loader;
pub mod mm;
pub mod proc;
pub mod sched;
pub mod syscall;
pub mod trap;

#[cfg(test)]
mod testing;

pub use abi::{ExitStatus, Fd, ForkRole, Pid, SyscallError, Timespec, WaitOptions, WaitTarget};
pub use config::KernelConfig;
pub use kernel::{Kernel, KernelError, TrapOutcome};
