//! Syscall ABI
//!
//! The contract between user programs and the kernel: call numbers, the
//! types that cross the boundary, error encoding, and typed user-side
//! wrappers.
//!
//! # Calls
//! - 0: exit(code) - terminate the calling process
//! - 1: fork() - duplicate the calling process
//! - 2: read(fd, buf, count) - read from a file descriptor
//! - 3: waitpid(pid, stat, options) - wait for and reap a child
//! - 4: execve(elf_bytes, byte_count) - replace the program image
//! - 5: nanosleep(duration, remainder) - sleep
//! - 6: scheduler_yield() - give up the CPU

pub mod errno;
pub mod numbers;
pub mod types;
pub mod user;

pub use errno::{ErrorKind, SyscallError, SyscallResult};
pub use numbers::Sysno;
pub use types::{
    ExitStatus, Fd, ForkRole, Pid, Timespec, WaitOptions, WaitTarget, NANOS_PER_SEC, WAIT_ANY,
};
pub use user::{RawSyscall, Syscalls, WaitStatus};
