//! Types Crossing the Syscall Boundary
//!
//! Every type here has a fixed width and layout that both sides of the
//! privilege boundary agree on. Changing any of them is an ABI break.
//!
//! # Layout
//! ```text
//! Pid        u16   (0 reserved, 0xFFFF = wait for any child)
//! Fd         u32
//! ExitStatus i32   (Unix wait encoding)
//! Timespec   { tv_sec: i64, tv_nsec: i64 }  16 bytes, align 8
//! ```

use core::fmt;

use bitflags::bitflags;

/// A process identifier.
///
/// Zero is never a valid live Pid, and `u16::MAX` is reserved for the
/// "any child" wait target, so every `Pid` holds a value in `1..=MAX`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Pid(u16);

impl Pid {
    /// Largest allocatable Pid.
    pub const MAX: u16 = u16::MAX - 1;

    /// Create a Pid from its wire value.
    ///
    /// Returns None for the reserved values 0 and `0xFFFF`.
    #[inline]
    pub const fn new(raw: u16) -> Option<Self> {
        if raw == 0 || raw > Self::MAX {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Get the wire value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wire value of the "any child" wait target (`-1` truncated to 16 bits).
pub const WAIT_ANY: u16 = u16::MAX;

/// Which children a `waitpid` call is interested in.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WaitTarget {
    /// Any child of the caller.
    Any,
    /// Exactly this child.
    Child(Pid),
}

impl WaitTarget {
    /// Decode the `pid` argument of `waitpid`.
    ///
    /// Zero has no meaning in this ABI and is rejected.
    pub const fn from_raw(raw: u16) -> Option<Self> {
        if raw == WAIT_ANY {
            return Some(Self::Any);
        }
        match Pid::new(raw) {
            Some(pid) => Some(Self::Child(pid)),
            None => None,
        }
    }

    /// Encode as the `pid` argument of `waitpid`.
    pub const fn to_raw(self) -> u16 {
        match self {
            Self::Any => WAIT_ANY,
            Self::Child(pid) => pid.as_u16(),
        }
    }

    /// Check whether `pid` satisfies this target.
    #[inline]
    pub fn matches(self, pid: Pid) -> bool {
        match self {
            Self::Any => true,
            Self::Child(want) => want == pid,
        }
    }
}

bitflags! {
    /// `options` argument of `waitpid`.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct WaitOptions: i32 {
        /// Return 0 instead of blocking when no child has terminated.
        const WNOHANG = 1;
    }
}

/// A file descriptor, scoped to its owning process.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct Fd(u32);

impl Fd {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Termination status reported by `waitpid`.
///
/// Uses the classic Unix wait encoding:
/// - normal exit: `(code & 0xff) << 8`
/// - killed by a signal or fault: `signal & 0x7f`
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ExitStatus(i32);

impl ExitStatus {
    /// Status of a process that called `exit(code)`.
    ///
    /// Only the low eight bits of `code` survive.
    #[inline]
    pub const fn exited(code: usize) -> Self {
        Self(((code & 0xff) as i32) << 8)
    }

    /// Status of a process terminated by `signal`.
    #[inline]
    pub const fn signaled(signal: u8) -> Self {
        Self((signal & 0x7f) as i32)
    }

    #[inline]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Exit code if the process exited normally.
    pub const fn code(self) -> Option<u8> {
        if self.0 & 0x7f == 0 {
            Some(((self.0 >> 8) & 0xff) as u8)
        } else {
            None
        }
    }

    /// Terminating signal if the process did not exit normally.
    pub const fn signal(self) -> Option<u8> {
        let sig = self.0 & 0x7f;
        if sig == 0 {
            None
        } else {
            Some(sig as u8)
        }
    }
}

impl fmt::Debug for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code(), self.signal()) {
            (Some(code), _) => write!(f, "ExitStatus(exited {})", code),
            (_, Some(sig)) => write!(f, "ExitStatus(signal {})", sig),
            _ => write!(f, "ExitStatus({:#x})", self.0),
        }
    }
}

/// Nanoseconds per second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A non-negative duration, as laid out in user memory.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[repr(C)]
pub struct Timespec {
    pub tv_sec: i64,
    pub tv_nsec: i64,
}

const _: () = assert!(core::mem::size_of::<Timespec>() == 16);
const _: () = assert!(core::mem::align_of::<Timespec>() == 8);

impl Timespec {
    /// Size in bytes of the wire representation.
    pub const SIZE: usize = 16;

    pub const ZERO: Self = Self { tv_sec: 0, tv_nsec: 0 };

    pub const fn new(secs: u32, nanos: u32) -> Self {
        Self {
            tv_sec: secs as i64,
            tv_nsec: nanos as i64,
        }
    }

    /// Build a normalized timespec from a nanosecond count.
    pub const fn from_nanos(nanos: u64) -> Self {
        Self {
            tv_sec: (nanos / NANOS_PER_SEC) as i64,
            tv_nsec: (nanos % NANOS_PER_SEC) as i64,
        }
    }

    /// Check the non-negative, normalized invariant.
    pub const fn is_valid(&self) -> bool {
        self.tv_sec >= 0 && self.tv_nsec >= 0 && (self.tv_nsec as u64) < NANOS_PER_SEC
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.tv_sec == 0 && self.tv_nsec == 0
    }

    /// Total length in nanoseconds, saturating.
    ///
    /// Returns None if the value is not valid.
    pub fn as_nanos(&self) -> Option<u64> {
        if !self.is_valid() {
            return None;
        }
        Some(
            (self.tv_sec as u64)
                .saturating_mul(NANOS_PER_SEC)
                .saturating_add(self.tv_nsec as u64),
        )
    }

    /// Encode in native byte order.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..8].copy_from_slice(&self.tv_sec.to_ne_bytes());
        out[8..].copy_from_slice(&self.tv_nsec.to_ne_bytes());
        out
    }

    /// Decode from native byte order. No validation is performed.
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let mut sec = [0u8; 8];
        let mut nsec = [0u8; 8];
        sec.copy_from_slice(&bytes[..8]);
        nsec.copy_from_slice(&bytes[8..]);
        Self {
            tv_sec: i64::from_ne_bytes(sec),
            tv_nsec: i64::from_ne_bytes(nsec),
        }
    }
}

/// Which side of a `fork` the caller is on.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ForkRole {
    /// The original process; holds the new child's Pid.
    Parent(Pid),
    /// The newly created process.
    Child,
}
