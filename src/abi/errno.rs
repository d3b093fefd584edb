//! Syscall Error Codes
//!
//! Errors travel back to user space as negative return values, so each
//! variant's discriminant is the negated errno. Values follow Linux.

use core::fmt;

/// System call error codes
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// Interrupted before completion
    Eintr = -4,
    /// Executable image is malformed or unsupported
    Enoexec = -8,
    /// Bad file descriptor
    Ebadf = -9,
    /// No qualifying child process
    Echild = -10,
    /// Resource temporarily exhausted
    Eagain = -11,
    /// Out of memory
    Enomem = -12,
    /// Bad address (invalid pointer)
    Efault = -14,
    /// Invalid argument
    Einval = -22,
    /// Invalid system call number
    Enosys = -38,
}

/// Broad classes of failure, independent of the exact errno.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No process slot, Pid, or memory was available.
    ResourceExhausted,
    /// An argument named something that does not exist or is malformed.
    InvalidArgument,
    /// A pointer argument did not reference mapped user memory.
    BadAddress,
    /// A blocking call was woken before it finished.
    Interrupted,
    /// The call number is not part of the ABI.
    Unsupported,
}

impl SyscallError {
    /// Classify this error.
    pub const fn kind(self) -> ErrorKind {
        match self {
            Self::Eagain | Self::Enomem => ErrorKind::ResourceExhausted,
            Self::Einval | Self::Echild | Self::Ebadf | Self::Enoexec => {
                ErrorKind::InvalidArgument
            }
            Self::Efault => ErrorKind::BadAddress,
            Self::Eintr => ErrorKind::Interrupted,
            Self::Enosys => ErrorKind::Unsupported,
        }
    }

    /// Value placed in the return register.
    #[inline]
    pub const fn to_return(self) -> i64 {
        self as i64
    }

    /// Decode a raw return value.
    ///
    /// Returns None for non-negative values and for errno values this ABI
    /// never produces.
    pub const fn from_return(ret: i64) -> Option<Self> {
        Some(match ret {
            -4 => Self::Eintr,
            -8 => Self::Enoexec,
            -9 => Self::Ebadf,
            -10 => Self::Echild,
            -11 => Self::Eagain,
            -12 => Self::Enomem,
            -14 => Self::Efault,
            -22 => Self::Einval,
            -38 => Self::Enosys,
            _ => return None,
        })
    }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eintr => write!(f, "interrupted system call"),
            Self::Enoexec => write!(f, "exec format error"),
            Self::Ebadf => write!(f, "bad file descriptor"),
            Self::Echild => write!(f, "no child processes"),
            Self::Eagain => write!(f, "resource temporarily unavailable"),
            Self::Enomem => write!(f, "out of memory"),
            Self::Efault => write!(f, "bad address"),
            Self::Einval => write!(f, "invalid argument"),
            Self::Enosys => write!(f, "function not implemented"),
        }
    }
}

/// Raw return values the kernel can produce for a syscall.
pub type SyscallResult<T> = Result<T, SyscallError>;
