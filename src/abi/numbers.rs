//! System Call Numbers
//!
//! Stable numeric identifiers for every entry point. These are part of the
//! ABI: a number is never reassigned.

pub const SYS_EXIT: usize = 0;
pub const SYS_FORK: usize = 1;
pub const SYS_READ: usize = 2;
pub const SYS_WAITPID: usize = 3;
pub const SYS_EXECVE: usize = 4;
pub const SYS_NANOSLEEP: usize = 5;
pub const SYS_SCHEDULER_YIELD: usize = 6;

/// The set of calls the ABI defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Sysno {
    Exit = SYS_EXIT,
    Fork = SYS_FORK,
    Read = SYS_READ,
    Waitpid = SYS_WAITPID,
    Execve = SYS_EXECVE,
    Nanosleep = SYS_NANOSLEEP,
    SchedulerYield = SYS_SCHEDULER_YIELD,
}

impl Sysno {
    /// Every call, in number order.
    pub const ALL: [Sysno; 7] = [
        Sysno::Exit,
        Sysno::Fork,
        Sysno::Read,
        Sysno::Waitpid,
        Sysno::Execve,
        Sysno::Nanosleep,
        Sysno::SchedulerYield,
    ];

    /// Look up a call by number. Unknown numbers yield None.
    pub const fn from_number(number: usize) -> Option<Self> {
        match number {
            SYS_EXIT => Some(Self::Exit),
            SYS_FORK => Some(Self::Fork),
            SYS_READ => Some(Self::Read),
            SYS_WAITPID => Some(Self::Waitpid),
            SYS_EXECVE => Some(Self::Execve),
            SYS_NANOSLEEP => Some(Self::Nanosleep),
            SYS_SCHEDULER_YIELD => Some(Self::SchedulerYield),
            _ => None,
        }
    }

    #[inline]
    pub const fn number(self) -> usize {
        self as usize
    }

    /// Name used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Exit => "exit",
            Self::Fork => "fork",
            Self::Read => "read",
            Self::Waitpid => "waitpid",
            Self::Execve => "execve",
            Self::Nanosleep => "nanosleep",
            Self::SchedulerYield => "scheduler_yield",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_are_dense_and_stable() {
        for (i, call) in Sysno::ALL.iter().enumerate() {
            assert_eq!(call.number(), i);
            assert_eq!(Sysno::from_number(i), Some(*call));
        }
        assert_eq!(Sysno::from_number(7), None);
        assert_eq!(Sysno::from_number(usize::MAX), None);
    }
}
