//! System Call Handler
//!
//! Dispatches system calls and implements the individual handlers.
//!
//! Handlers never touch scheduling state directly. Each one returns a
//! [`Flow`] telling the kernel what happens to the caller next. Calls that
//! cannot finish yet return `Flow::Block` with everything needed to finish
//! them later; the kernel re-runs [`poll_blocked`] when it schedules.
//!
//! # Security Considerations
//! - Unknown syscall numbers return ENOSYS
//! - Parameters are validated before any state changes
//! - A call that fails leaves the caller as it was

use alloc::vec;
use core::task::Poll;

use log::{debug, trace};

use super::validate;
use super::{SyscallError, SyscallResult};
use crate::abi::numbers::Sysno;
use crate::abi::types::{ExitStatus, Fd, Pid, Timespec, WaitOptions, WaitTarget};
use crate::config::KernelConfig;
use crate::io::file::ReadOutcome;
use crate::loader::ImageLoader;
use crate::mm::address::{UserAddr, PAGE_SIZE};
use crate::proc::process::{BlockedOn, Process};
use crate::proc::table::ProcessTable;
use crate::sched::{Clock, Scheduler};
use crate::trap::{TrapFrame, ARG_REGS};

/// Largest single transfer `read` makes; longer requests come back short.
pub const READ_CHUNK: usize = 16 * PAGE_SIZE;

/// What happens to the calling process after a handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Resume the caller with this value in the return register.
    Return(i64),
    /// Suspend the caller until the condition holds.
    Block(BlockedOn),
    /// The caller stays runnable but gives up the CPU; returns 0.
    Yield,
    /// The caller has terminated.
    Exit,
    /// The caller now runs a new image starting at `entry`.
    Exec { entry: UserAddr },
}

/// The kernel state a handler may touch, borrowed for one call.
pub struct SyscallContext<'a> {
    /// The calling process.
    pub pid: Pid,
    pub table: &'a mut ProcessTable,
    pub sched: &'a mut dyn Scheduler,
    pub clock: &'a Clock,
    pub loader: &'a dyn ImageLoader,
    pub config: &'a KernelConfig,
}

impl SyscallContext<'_> {
    fn caller(&self) -> SyscallResult<&Process> {
        self.table.get(self.pid).ok_or(SyscallError::Einval)
    }

    fn caller_mut(&mut self) -> SyscallResult<&mut Process> {
        self.table.get_mut(self.pid).ok_or(SyscallError::Einval)
    }
}

/// Dispatch a system call
///
/// # Arguments
/// * `ctx` - Kernel state, with the caller's Pid
/// * `number` - System call number (from x8)
/// * `args` - Arguments (x0-x5)
///
/// # Security
/// - Unknown syscall numbers are rejected with ENOSYS
/// - Each handler validates its own arguments
pub fn dispatch(ctx: &mut SyscallContext<'_>, number: usize, args: [usize; ARG_REGS]) -> Flow {
    let Some(sysno) = Sysno::from_number(number) else {
        debug!(target: "syscall", "{}: unknown syscall {}", ctx.pid, number);
        return Flow::Return(SyscallError::Enosys.to_return());
    };
    trace!(
        target: "syscall",
        "{}: {}({:#x}, {:#x}, {:#x})",
        ctx.pid,
        sysno.name(),
        args[0],
        args[1],
        args[2]
    );

    let result = match sysno {
        Sysno::Exit => sys_exit(ctx, args[0]),
        Sysno::Fork => sys_fork(ctx),
        Sysno::Read => sys_read(ctx, args[0], args[1], args[2]),
        Sysno::Waitpid => sys_waitpid(ctx, args[0], args[1], args[2]),
        Sysno::Execve => sys_execve(ctx, args[0], args[1]),
        Sysno::Nanosleep => sys_nanosleep(ctx, args[0], args[1]),
        Sysno::SchedulerYield => Ok(Flow::Yield),
    };

    result.unwrap_or_else(|err| {
        debug!(target: "syscall", "{}: {} failed: {}", ctx.pid, sysno.name(), err);
        Flow::Return(err.to_return())
    })
}

/// Exit system call
///
/// Only the low byte of `code` is kept in the status.
fn sys_exit(ctx: &mut SyscallContext<'_>, code: usize) -> SyscallResult<Flow> {
    ctx.table.terminate(ctx.pid, ExitStatus::exited(code))?;
    Ok(Flow::Exit)
}

/// Fork system call
///
/// The child is queued immediately; it sees 0, the parent sees its Pid.
fn sys_fork(ctx: &mut SyscallContext<'_>) -> SyscallResult<Flow> {
    let child = ctx.table.fork(ctx.pid)?;
    ctx.sched.push(child);
    Ok(Flow::Return(i64::from(child.as_u16())))
}

/// Read system call
///
/// # Returns
/// Bytes transferred (possibly fewer than `count`, never more than
/// `READ_CHUNK`), 0 at end of file
///
/// # Security
/// - The descriptor must be open in the caller's table
/// - The whole buffer must be mapped writable before anything is consumed
fn sys_read(ctx: &mut SyscallContext<'_>, fd: usize, buf: usize, count: usize) -> SyscallResult<Flow> {
    if count == 0 {
        return Ok(Flow::Return(0));
    }
    let fd = u32::try_from(fd).map(Fd::new).map_err(|_| SyscallError::Ebadf)?;
    let proc = ctx.caller()?;
    proc.fds().lookup(fd)?;
    let space = proc.space().ok_or(SyscallError::Efault)?;
    validate::validate_user_write(space, buf, count)?;

    let buf = UserAddr::new(buf);
    Ok(match poll_read(ctx.caller_mut()?, fd, buf, count) {
        Poll::Ready(ret) => Flow::Return(ret),
        Poll::Pending => Flow::Block(BlockedOn::Read { fd, buf, count }),
    })
}

/// Try once to read into the caller's buffer.
fn poll_read(proc: &mut Process, fd: Fd, buf: UserAddr, count: usize) -> Poll<i64> {
    let file = match proc.fds().lookup(fd) {
        Ok(file) => file.clone(),
        Err(err) => return Poll::Ready(SyscallError::from(err).to_return()),
    };
    if !file.poll_readable() {
        return Poll::Pending;
    }
    let Some(space) = proc.space_mut() else {
        return Poll::Ready(SyscallError::Efault.to_return());
    };
    // Re-check so no data is consumed into a buffer that cannot take it
    let dst = match validate::validate_user_write(space, buf.as_usize(), count) {
        Ok(dst) => dst,
        Err(err) => return Poll::Ready(err.to_return()),
    };

    let mut bounce = vec![0u8; count.min(READ_CHUNK)];
    match file.read(&mut bounce) {
        ReadOutcome::Data(n) => match dst.write(space, &bounce[..n]) {
            Ok(()) => Poll::Ready(n as i64),
            Err(err) => Poll::Ready(err.to_return()),
        },
        ReadOutcome::EndOfFile => Poll::Ready(0),
        ReadOutcome::WouldBlock => Poll::Pending,
    }
}

/// Waitpid system call
///
/// # Arguments
/// * `pid` - Child Pid, or `WAIT_ANY`; the low 16 bits are used
/// * `stat` - Optional `int32_t` status output
/// * `options` - `WNOHANG` or 0; the low 32 bits are used
///
/// # Returns
/// The reaped child's Pid, or 0 if `WNOHANG` found nothing to reap
fn sys_waitpid(ctx: &mut SyscallContext<'_>, pid: usize, stat: usize, options: usize) -> SyscallResult<Flow> {
    let target = WaitTarget::from_raw(pid as u16).ok_or(SyscallError::Einval)?;
    let options = WaitOptions::from_bits(options as u32 as i32).ok_or(SyscallError::Einval)?;

    let space = ctx.caller()?.space().ok_or(SyscallError::Efault)?;
    // Checked before anything is reaped
    validate::validate_optional_write(space, stat, core::mem::size_of::<i32>())?;

    let stat = UserAddr::new(stat);
    Ok(match poll_wait(ctx.table, ctx.pid, target, stat) {
        Poll::Ready(ret) => Flow::Return(ret),
        Poll::Pending if options.contains(WaitOptions::WNOHANG) => Flow::Return(0),
        Poll::Pending => Flow::Block(BlockedOn::Child { target, stat }),
    })
}

/// Reap a terminated child matching `target`, if there is one.
fn poll_wait(table: &mut ProcessTable, parent: Pid, target: WaitTarget, stat: UserAddr) -> Poll<i64> {
    let child = match table.find_zombie_child(parent, target) {
        Ok(Some(child)) => child,
        Ok(None) => return Poll::Pending,
        Err(err) => return Poll::Ready(err.to_return()),
    };
    let Some(status) = table.get(child).and_then(Process::exit_status) else {
        return Poll::Ready(SyscallError::Echild.to_return());
    };

    if !stat.is_null() {
        let written = match table.get_mut(parent).and_then(Process::space_mut) {
            Some(space) => validate::write_status(space, stat, status),
            None => Err(SyscallError::Efault),
        };
        if let Err(err) = written {
            return Poll::Ready(err.to_return());
        }
    }

    match table.reap(parent, child) {
        Ok(_) => Poll::Ready(i64::from(child.as_u16())),
        Err(err) => Poll::Ready(err.to_return()),
    }
}

/// Execve system call
///
/// The image is copied into the kernel and loaded into a fresh address
/// space. Only then is the caller's image replaced; descriptors survive.
///
/// # Security
/// - Images larger than the configured image memory are refused with ENOMEM
/// - On any failure the caller's memory and registers are untouched
fn sys_execve(ctx: &mut SyscallContext<'_>, image: usize, len: usize) -> SyscallResult<Flow> {
    if len > ctx.config.max_image_memory {
        return Err(SyscallError::Enomem);
    }
    let space = ctx.caller()?.space().ok_or(SyscallError::Efault)?;
    let image = validate::validate_user_read(space, image, len)?.read_all(space)?;

    let loaded = ctx.loader.load(&image, ctx.config)?;
    let entry = loaded.entry;

    let proc = ctx.caller_mut()?;
    // The old regions zeroize themselves as they drop
    proc.space = Some(loaded.space);
    proc.frame = TrapFrame::for_entry(entry.as_usize(), loaded.stack_top.as_usize());
    debug!(target: "syscall", "{}: execve entry {}", ctx.pid, entry);
    Ok(Flow::Exec { entry })
}

/// Nanosleep system call
///
/// # Returns
/// 0 once the duration has elapsed, EINTR if woken early (with the unslept
/// time in `remainder`)
fn sys_nanosleep(ctx: &mut SyscallContext<'_>, duration: usize, remainder: usize) -> SyscallResult<Flow> {
    let space = ctx.caller()?.space().ok_or(SyscallError::Efault)?;
    let duration = validate::read_timespec(space, duration)?;
    let nanos = duration.as_nanos().ok_or(SyscallError::Einval)?;
    if nanos == 0 {
        return Ok(Flow::Return(0));
    }
    validate::validate_optional_write(space, remainder, Timespec::SIZE)?;

    Ok(Flow::Block(BlockedOn::Sleep {
        deadline: ctx.clock.deadline_after(nanos),
        remainder: UserAddr::new(remainder),
    }))
}

fn poll_sleep(proc: &mut Process, clock: &Clock, deadline: u64, remainder: UserAddr, interrupted: bool) -> Poll<i64> {
    // A sleep that ran its full length completes even if an interrupt is pending
    if clock.has_passed(deadline) {
        return Poll::Ready(0);
    }
    if interrupted {
        if !remainder.is_null() {
            let left = clock.remaining(deadline);
            let written = match proc.space_mut() {
                Some(space) => validate::write_timespec(space, remainder, &left),
                None => Err(SyscallError::Efault),
            };
            if let Err(err) = written {
                return Poll::Ready(err.to_return());
            }
        }
        return Poll::Ready(SyscallError::Eintr.to_return());
    }
    Poll::Pending
}

/// Try to finish the call `pid` is blocked in.
///
/// A pending interrupt ends the call with EINTR; a sleep also reports
/// the time it had left.
pub fn poll_blocked(ctx: &mut SyscallContext<'_>, on: BlockedOn) -> Poll<i64> {
    let Some(proc) = ctx.table.get_mut(ctx.pid) else {
        return Poll::Ready(SyscallError::Einval.to_return());
    };
    let interrupted = core::mem::take(&mut proc.interrupted);

    match on {
        BlockedOn::Sleep { deadline, remainder } => {
            poll_sleep(proc, ctx.clock, deadline, remainder, interrupted)
        }
        _ if interrupted => Poll::Ready(SyscallError::Eintr.to_return()),
        BlockedOn::Read { fd, buf, count } => poll_read(proc, fd, buf, count),
        BlockedOn::Child { target, stat } => poll_wait(ctx.table, ctx.pid, target, stat),
    }
}
