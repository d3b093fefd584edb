//! Kernel Core
//!
//! Owns the process table, ready queue, clock, and image loader, and runs
//! traps for whichever process is current.
//!
//! # Trap Flow
//! 1. The trap entry saves the user registers and calls [`Kernel::trap`]
//! 2. SVC traps are dispatched to the syscall layer
//! 3. Aborts from user mode kill the process with `SIGSEGV`
//! 4. The outcome says whether to resume the current process or to call
//!    [`Kernel::schedule`] and switch
//!
//! Blocked processes are woken by `schedule`, which re-polls the condition
//! each one is waiting on and writes the result into its saved frame.

use alloc::boxed::Box;
use core::fmt;
use core::task::Poll;

use log::{debug, info, warn};

use crate::abi::errno::SyscallError;
use crate::abi::types::{ExitStatus, Fd, Pid};
use crate::config::KernelConfig;
use crate::io::fd::{FdError, FdTable};
use crate::io::file::FileRef;
use crate::loader::{ElfLoader, ImageLoader};
use crate::mm::address::UserAddr;
use crate::proc::process::{Process, ProcessState};
use crate::proc::table::ProcessTable;
use crate::sched::{Clock, FifoScheduler, Scheduler};
use crate::syscall::{self, Flow, SyscallContext};
use crate::trap::{ExceptionClass, TrapFrame, ARG_REGS};

/// Illegal instruction.
pub const SIGILL: u8 = 4;
/// Killed.
pub const SIGKILL: u8 = 9;
/// Invalid memory access.
pub const SIGSEGV: u8 = 11;

/// What the trap entry should do after [`Kernel::trap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    /// Return to the same process; the value is already in x0.
    Resume(i64),
    /// The process stays runnable but wants to give up the CPU.
    Yield,
    /// The process is waiting; schedule another.
    Block,
    /// The process now runs a new image from `entry`.
    Exec { entry: UserAddr },
    /// The process is gone; schedule another.
    Exit,
}

/// Errors from kernel control operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No process is running.
    Idle,
    /// No such process.
    NoSuchProcess(Pid),
    /// The process is not blocked in a syscall.
    NotBlocked(Pid),
    /// The process has already terminated.
    Terminated(Pid),
    /// Creating a process failed.
    Spawn(SyscallError),
    /// Installing a descriptor failed.
    Descriptor(FdError),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "no current process"),
            Self::NoSuchProcess(pid) => write!(f, "no such process: {}", pid),
            Self::NotBlocked(pid) => write!(f, "process {} is not blocked", pid),
            Self::Terminated(pid) => write!(f, "process {} has terminated", pid),
            Self::Spawn(err) => write!(f, "spawn failed: {}", err),
            Self::Descriptor(err) => write!(f, "descriptor: {}", err),
        }
    }
}

impl From<FdError> for KernelError {
    fn from(err: FdError) -> Self {
        KernelError::Descriptor(err)
    }
}

/// The kernel.
pub struct Kernel {
    config: KernelConfig,
    table: ProcessTable,
    sched: Box<dyn Scheduler>,
    clock: Clock,
    loader: Box<dyn ImageLoader>,
    current: Option<Pid>,
}

impl Kernel {
    /// A kernel loading ELF images with a FIFO ready queue.
    pub fn new(config: KernelConfig) -> Self {
        Self::with_loader(config, Box::new(ElfLoader))
    }

    pub fn with_loader(config: KernelConfig, loader: Box<dyn ImageLoader>) -> Self {
        Self {
            config,
            table: ProcessTable::new(config.max_processes),
            sched: Box::new(FifoScheduler::new()),
            clock: Clock::new(),
            loader,
            current: None,
        }
    }

    /// Replace the ready-queue policy. Only valid before any process exists.
    pub fn with_scheduler(mut self, sched: Box<dyn Scheduler>) -> Self {
        self.sched = sched;
        self
    }

    #[inline]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    #[inline]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// The process on the CPU, if any.
    #[inline]
    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    #[inline]
    pub fn process(&self, pid: Pid) -> Option<&Process> {
        self.table.get(pid)
    }

    #[inline]
    pub fn process_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        self.table.get_mut(pid)
    }

    #[inline]
    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    /// Load `image` into a new parentless process and queue it.
    pub fn spawn(&mut self, image: &[u8]) -> Result<Pid, KernelError> {
        let loaded = self
            .loader
            .load(image, &self.config)
            .map_err(KernelError::Spawn)?;
        let frame = TrapFrame::for_entry(loaded.entry.as_usize(), loaded.stack_top.as_usize());
        let pid = self
            .table
            .create(None, loaded.space, frame, FdTable::new())
            .map_err(KernelError::Spawn)?;
        self.sched.push(pid);
        info!(target: "kernel", "spawned {} at {}", pid, loaded.entry);
        Ok(pid)
    }

    /// Install `file` in the lowest free descriptor of `pid`.
    pub fn open(&mut self, pid: Pid, file: FileRef) -> Result<Fd, KernelError> {
        let proc = self.live_mut(pid)?;
        Ok(proc.fds_mut().install(file)?)
    }

    /// Wake blocked processes whose condition holds, then pick the next
    /// process to run.
    ///
    /// A process still running when this is called is preempted and goes
    /// to the back of the queue. Returns the new current process.
    pub fn schedule(&mut self) -> Option<Pid> {
        self.wake_blocked();

        if let Some(pid) = self.current.take() {
            if let Some(proc) = self.table.get_mut(pid) {
                if proc.state == ProcessState::Running {
                    proc.state = ProcessState::Ready;
                    self.sched.push(pid);
                }
            }
        }

        while let Some(pid) = self.sched.pop() {
            let Some(proc) = self.table.get_mut(pid) else {
                continue;
            };
            if proc.state != ProcessState::Ready {
                continue;
            }
            proc.state = ProcessState::Running;
            self.current = Some(pid);
            return Some(pid);
        }
        None
    }

    /// Handle a trap taken by the current process.
    ///
    /// `frame` is the register state saved at entry. It becomes the
    /// process's saved frame, and the process resumes from it (with the
    /// syscall result in x0) unless the outcome says otherwise.
    pub fn trap(&mut self, frame: TrapFrame) -> Result<TrapOutcome, KernelError> {
        let pid = self.current.ok_or(KernelError::Idle)?;
        let proc = self
            .table
            .get_mut(pid)
            .ok_or(KernelError::NoSuchProcess(pid))?;
        proc.frame = frame;

        match frame.exception_class() {
            ExceptionClass::SvcAarch64 => {
                let mut args = [0usize; ARG_REGS];
                for (n, arg) in args.iter_mut().enumerate() {
                    *arg = frame.arg(n);
                }
                let mut ctx = SyscallContext {
                    pid,
                    table: &mut self.table,
                    sched: self.sched.as_mut(),
                    clock: &self.clock,
                    loader: self.loader.as_ref(),
                    config: &self.config,
                };
                let flow = syscall::dispatch(&mut ctx, frame.syscall_number(), args);
                Ok(self.finish(pid, flow))
            }
            ExceptionClass::InstructionAbortLowerEl | ExceptionClass::DataAbortLowerEl => {
                warn!(
                    target: "kernel",
                    "{}: fault at {:#x} (pc {:#x})",
                    pid,
                    frame.far,
                    frame.elr
                );
                self.kill(pid, SIGSEGV)?;
                Ok(TrapOutcome::Exit)
            }
            class => {
                warn!(target: "kernel", "{}: unhandled exception {:?}", pid, class);
                self.kill(pid, SIGILL)?;
                Ok(TrapOutcome::Exit)
            }
        }
    }

    /// Issue syscall `number` from the current process, as if it had
    /// loaded the registers and executed `svc #0`.
    pub fn syscall(&mut self, number: usize, args: [usize; ARG_REGS]) -> Result<TrapOutcome, KernelError> {
        let pid = self.current.ok_or(KernelError::Idle)?;
        let mut frame = *self
            .table
            .get(pid)
            .ok_or(KernelError::NoSuchProcess(pid))?
            .frame();
        frame.load_syscall(number, args);
        self.trap(frame)
    }

    /// Apply a handler's verdict to the caller.
    fn finish(&mut self, pid: Pid, flow: Flow) -> TrapOutcome {
        match flow {
            Flow::Return(ret) => {
                if let Some(proc) = self.table.get_mut(pid) {
                    proc.frame.set_return(ret);
                }
                TrapOutcome::Resume(ret)
            }
            Flow::Yield => {
                if let Some(proc) = self.table.get_mut(pid) {
                    proc.frame.set_return(0);
                    proc.state = ProcessState::Ready;
                }
                self.sched.push(pid);
                self.current = None;
                TrapOutcome::Yield
            }
            Flow::Block(on) => {
                if let Some(proc) = self.table.get_mut(pid) {
                    proc.state = ProcessState::Blocked(on);
                }
                self.current = None;
                TrapOutcome::Block
            }
            Flow::Exit => {
                self.current = None;
                TrapOutcome::Exit
            }
            Flow::Exec { entry } => TrapOutcome::Exec { entry },
        }
    }

    /// Re-poll every blocked process and ready the ones that can finish.
    fn wake_blocked(&mut self) {
        for pid in self.table.blocked() {
            self.wake(pid);
        }
    }

    /// Try to finish the call `pid` is blocked in. Returns whether it did.
    fn wake(&mut self, pid: Pid) -> bool {
        let Some(on) = self.table.get(pid).and_then(Process::blocked_on) else {
            return false;
        };
        let mut ctx = SyscallContext {
            pid,
            table: &mut self.table,
            sched: self.sched.as_mut(),
            clock: &self.clock,
            loader: self.loader.as_ref(),
            config: &self.config,
        };
        let Poll::Ready(ret) = syscall::poll_blocked(&mut ctx, on) else {
            return false;
        };

        if let Some(proc) = self.table.get_mut(pid) {
            proc.frame.set_return(ret);
            proc.state = ProcessState::Ready;
        }
        self.sched.push(pid);
        debug!(target: "kernel", "{}: woke with {}", pid, ret);
        true
    }

    /// Move the clock forward by `nanos`.
    ///
    /// Sleepers whose deadline passed are woken at the next `schedule`.
    pub fn advance_clock(&mut self, nanos: u64) {
        self.clock.advance(nanos);
    }

    /// End the call `pid` is blocked in with `EINTR`.
    ///
    /// An interrupted sleep reports the time it had left. A sleep whose
    /// deadline has already passed completes normally instead.
    pub fn interrupt(&mut self, pid: Pid) -> Result<(), KernelError> {
        let proc = self
            .table
            .get_mut(pid)
            .ok_or(KernelError::NoSuchProcess(pid))?;
        if proc.blocked_on().is_none() {
            return Err(KernelError::NotBlocked(pid));
        }
        proc.interrupted = true;
        self.wake(pid);
        Ok(())
    }

    /// Terminate `pid` as if by `signal`.
    pub fn kill(&mut self, pid: Pid, signal: u8) -> Result<(), KernelError> {
        self.live_mut(pid)?;
        self.table
            .terminate(pid, ExitStatus::signaled(signal))
            .map_err(|_| KernelError::Terminated(pid))?;
        self.sched.remove(pid);
        if self.current == Some(pid) {
            self.current = None;
        }
        info!(target: "kernel", "{}: killed by signal {}", pid, signal);
        Ok(())
    }

    fn live_mut(&mut self, pid: Pid) -> Result<&mut Process, KernelError> {
        let proc = self
            .table
            .get_mut(pid)
            .ok_or(KernelError::NoSuchProcess(pid))?;
        if proc.is_zombie() {
            return Err(KernelError::Terminated(pid));
        }
        Ok(proc)
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("processes", &self.table.len())
            .field("ready", &self.sched.len())
            .field("current", &self.current)
            .field("clock", &self.clock.now())
            .finish()
    }
}
