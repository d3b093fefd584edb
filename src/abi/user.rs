//! User-Side Syscall Wrappers
//!
//! Typed entry points for user programs. Each wrapper marshals its
//! arguments into the five argument words, issues the trap through a
//! [`RawSyscall`] implementation, and decodes the raw return value:
//! - negative values are `-errno`
//! - `fork` returns 0 in the child and the child's Pid in the parent
//! - `waitpid` returns 0 when `WNOHANG` found nothing to reap

use super::errno::{SyscallError, SyscallResult};
use super::numbers::Sysno;
use super::types::{ExitStatus, Fd, ForkRole, Pid, Timespec, WaitOptions, WaitTarget};

/// The mechanism that carries a call across the privilege boundary.
pub trait RawSyscall {
    /// Issue system call `number` with `args` and return the raw result.
    ///
    /// # Safety
    /// Any pointer passed in `args` must be valid for the access the call
    /// performs on it, for the whole duration of the call.
    unsafe fn syscall(&mut self, number: usize, args: [usize; 5]) -> i64;
}

/// Outcome of a successful `waitpid`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WaitStatus {
    /// A child terminated and has been reaped.
    Exited { pid: Pid, status: ExitStatus },
    /// `WNOHANG` was set and no qualifying child has terminated yet.
    StillAlive,
}

/// Split a raw return value into success and error.
fn check(ret: i64) -> SyscallResult<u64> {
    if ret < 0 {
        Err(SyscallError::from_return(ret).unwrap_or(SyscallError::Einval))
    } else {
        Ok(ret as u64)
    }
}

fn pid_from(ret: u64) -> SyscallResult<Pid> {
    u16::try_from(ret)
        .ok()
        .and_then(Pid::new)
        .ok_or(SyscallError::Einval)
}

/// Typed front end over a [`RawSyscall`] implementation.
#[derive(Debug)]
pub struct Syscalls<T: RawSyscall> {
    raw: T,
}

impl<T: RawSyscall> Syscalls<T> {
    pub fn new(raw: T) -> Self {
        Self { raw }
    }

    pub fn into_inner(self) -> T {
        self.raw
    }

    /// Terminate the calling process. Never returns.
    ///
    /// A waiting parent sees only the low eight bits of `code`, so
    /// `exit(256)` is reported as a clean exit with code 0.
    pub fn exit(&mut self, code: usize) -> ! {
        // SAFETY: no pointer arguments
        unsafe {
            self.raw.syscall(Sysno::Exit.number(), [code, 0, 0, 0, 0]);
        }
        loop {
            core::hint::spin_loop();
        }
    }

    /// Duplicate the calling process.
    pub fn fork(&mut self) -> SyscallResult<ForkRole> {
        // SAFETY: no pointer arguments
        let ret = check(unsafe { self.raw.syscall(Sysno::Fork.number(), [0; 5]) })?;
        if ret == 0 {
            Ok(ForkRole::Child)
        } else {
            pid_from(ret).map(ForkRole::Parent)
        }
    }

    /// Read up to `buf.len()` bytes from `fd`.
    ///
    /// A short count is not an error. Zero means end of file, or an empty
    /// `buf`.
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> SyscallResult<usize> {
        let args = [fd.as_u32() as usize, buf.as_mut_ptr() as usize, buf.len(), 0, 0];
        // SAFETY: buf is writable for buf.len() bytes and outlives the call
        let ret = check(unsafe { self.raw.syscall(Sysno::Read.number(), args) })?;
        Ok(ret as usize)
    }

    /// Wait for a child to terminate and reap it.
    pub fn waitpid(&mut self, target: WaitTarget, options: WaitOptions) -> SyscallResult<WaitStatus> {
        let mut stat: i32 = 0;
        let args = [
            target.to_raw() as usize,
            &mut stat as *mut i32 as usize,
            options.bits() as usize,
            0,
            0,
        ];
        // SAFETY: stat is a live local for the duration of the call
        let ret = check(unsafe { self.raw.syscall(Sysno::Waitpid.number(), args) })?;
        if ret == 0 {
            return Ok(WaitStatus::StillAlive);
        }
        Ok(WaitStatus::Exited {
            pid: pid_from(ret)?,
            status: ExitStatus::from_raw(stat),
        })
    }

    /// Replace the calling program with `image`.
    ///
    /// Returns only if the replacement failed; the caller keeps running its
    /// current program.
    pub fn execve(&mut self, image: &[u8]) -> SyscallError {
        let args = [image.as_ptr() as usize, image.len(), 0, 0, 0];
        // SAFETY: image is readable for image.len() bytes
        let ret = unsafe { self.raw.syscall(Sysno::Execve.number(), args) };
        match check(ret) {
            Err(err) => err,
            // A zero return here means the kernel did not replace the image
            Ok(_) => SyscallError::Enoexec,
        }
    }

    /// Sleep for at least `duration`.
    ///
    /// On `Eintr`, `remainder` (if given) holds the unslept time.
    pub fn nanosleep(&mut self, duration: &Timespec, remainder: Option<&mut Timespec>) -> SyscallResult<()> {
        let rem_ptr = match remainder {
            Some(rem) => rem as *mut Timespec as usize,
            None => 0,
        };
        let args = [duration as *const Timespec as usize, rem_ptr, 0, 0, 0];
        // SAFETY: both pointers reference live Timespec values or are null
        check(unsafe { self.raw.syscall(Sysno::Nanosleep.number(), args) })?;
        Ok(())
    }

    /// Give up the rest of the current quantum.
    pub fn scheduler_yield(&mut self) -> SyscallResult<()> {
        // SAFETY: no pointer arguments
        check(unsafe { self.raw.syscall(Sysno::SchedulerYield.number(), [0; 5]) })?;
        Ok(())
    }
}

/// Trap into the kernel with `svc #0`.
///
/// Convention: number in x8, arguments in x0-x4, result in x0.
#[cfg(target_arch = "aarch64")]
#[derive(Debug, Default)]
pub struct Svc;

#[cfg(target_arch = "aarch64")]
impl RawSyscall for Svc {
    unsafe fn syscall(&mut self, number: usize, args: [usize; 5]) -> i64 {
        let ret: u64;
        // SAFETY: the caller upholds the pointer contract; the kernel
        // preserves every register except x0
        unsafe {
            core::arch::asm!(
                "svc #0",
                inlateout("x0") args[0] as u64 => ret,
                in("x1") args[1],
                in("x2") args[2],
                in("x3") args[3],
                in("x4") args[4],
                in("x8") number,
                options(nostack)
            );
        }
        ret as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// Records every trap and answers from a script.
    #[derive(Default)]
    struct ScriptedTrap {
        calls: Vec<(usize, [usize; 5])>,
        replies: VecDeque<i64>,
        status_to_write: Option<i32>,
    }

    impl ScriptedTrap {
        fn replying(replies: &[i64]) -> Self {
            Self {
                replies: replies.iter().copied().collect(),
                ..Self::default()
            }
        }
    }

    impl RawSyscall for ScriptedTrap {
        unsafe fn syscall(&mut self, number: usize, args: [usize; 5]) -> i64 {
            self.calls.push((number, args));
            if number == Sysno::Waitpid.number() && args[1] != 0 {
                if let Some(status) = self.status_to_write {
                    // SAFETY: the wrapper passes a pointer to a live i32
                    unsafe { *(args[1] as *mut i32) = status };
                }
            }
            self.replies.pop_front().unwrap_or(0)
        }
    }

    #[test]
    fn test_fork_roles() {
        let mut sys = Syscalls::new(ScriptedTrap::replying(&[5, 0, -11]));
        assert_eq!(sys.fork(), Ok(ForkRole::Parent(Pid::new(5).unwrap())));
        assert_eq!(sys.fork(), Ok(ForkRole::Child));
        assert_eq!(sys.fork(), Err(SyscallError::Eagain));
        let trap = sys.into_inner();
        assert!(trap.calls.iter().all(|(n, _)| *n == Sysno::Fork.number()));
    }

    #[test]
    fn test_read_marshalling() {
        let mut sys = Syscalls::new(ScriptedTrap::replying(&[3, -9]));
        let mut buf = [0u8; 8];
        assert_eq!(sys.read(Fd::new(4), &mut buf), Ok(3));
        assert_eq!(sys.read(Fd::new(99), &mut buf), Err(SyscallError::Ebadf));
        let trap = sys.into_inner();
        let (number, args) = trap.calls[0];
        assert_eq!(number, Sysno::Read.number());
        assert_eq!(args[0], 4);
        assert_eq!(args[1], buf.as_ptr() as usize);
        assert_eq!(args[2], 8);
    }

    #[test]
    fn test_waitpid_decoding() {
        let mut trap = ScriptedTrap::replying(&[9, 0, -10]);
        trap.status_to_write = Some(ExitStatus::exited(3).raw());
        let mut sys = Syscalls::new(trap);

        let child = Pid::new(9).unwrap();
        assert_eq!(
            sys.waitpid(WaitTarget::Child(child), WaitOptions::empty()),
            Ok(WaitStatus::Exited { pid: child, status: ExitStatus::exited(3) })
        );
        assert_eq!(
            sys.waitpid(WaitTarget::Any, WaitOptions::WNOHANG),
            Ok(WaitStatus::StillAlive)
        );
        assert_eq!(
            sys.waitpid(WaitTarget::Any, WaitOptions::empty()),
            Err(SyscallError::Echild)
        );

        let trap = sys.into_inner();
        assert_eq!(trap.calls[0].1[0], 9);
        assert_eq!(trap.calls[1].1[0], 0xFFFF);
        assert_eq!(trap.calls[1].1[2], 1);
    }

    #[test]
    fn test_execve_only_returns_errors() {
        let mut sys = Syscalls::new(ScriptedTrap::replying(&[-8]));
        assert_eq!(sys.execve(b"not an elf"), SyscallError::Enoexec);
    }

    #[test]
    fn test_nanosleep_passes_null_remainder() {
        let mut sys = Syscalls::new(ScriptedTrap::replying(&[0, -4]));
        let duration = Timespec::new(1, 0);
        assert_eq!(sys.nanosleep(&duration, None), Ok(()));
        let mut rem = Timespec::ZERO;
        assert_eq!(sys.nanosleep(&duration, Some(&mut rem)), Err(SyscallError::Eintr));
        let trap = sys.into_inner();
        assert_eq!(trap.calls[0].1[1], 0);
        assert_ne!(trap.calls[1].1[1], 0);
    }

    #[test]
    fn test_unknown_errno_maps_to_einval() {
        let mut sys = Syscalls::new(ScriptedTrap::replying(&[-1]));
        assert_eq!(sys.scheduler_yield(), Err(SyscallError::Einval));
    }
}
