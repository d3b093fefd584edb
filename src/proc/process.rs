//! Process Records
//!
//! One record per live or unreaped process: identity, family links,
//! scheduling state, saved registers, memory, and descriptors.
//!
//! # States
//! ```text
//!            fork                 exit / kill            waitpid (parent)
//!  (none) ───────► Ready ◄──► Running ──────► Zombie ─────────────────► (reaped)
//!                    ▲           │
//!                    └─ wake ── Blocked
//! ```

use alloc::vec::Vec;

use crate::abi::types::{ExitStatus, Fd, Pid, WaitTarget};
use crate::io::fd::FdTable;
use crate::mm::address::UserAddr;
use crate::mm::space::AddressSpace;
use crate::trap::TrapFrame;

/// What a blocked process is waiting for, and what it needs to finish the
/// call once woken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedOn {
    /// `waitpid` with no terminated qualifying child yet.
    Child { target: WaitTarget, stat: UserAddr },
    /// `read` on an object with no data yet.
    Read { fd: Fd, buf: UserAddr, count: usize },
    /// `nanosleep` until the clock reaches `deadline` (nanoseconds).
    Sleep { deadline: u64, remainder: UserAddr },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Runnable, waiting in the ready queue.
    Ready,
    /// Currently on the CPU.
    Running,
    /// Suspended inside a syscall.
    Blocked(BlockedOn),
    /// Terminated, status not yet collected by the parent.
    Zombie(ExitStatus),
}

/// A process.
#[derive(Debug)]
pub struct Process {
    pid: Pid,
    parent: Option<Pid>,
    pub(crate) children: Vec<Pid>,
    pub(crate) state: ProcessState,
    pub(crate) frame: TrapFrame,
    /// Released at exit.
    pub(crate) space: Option<AddressSpace>,
    pub(crate) fds: FdTable,
    /// Set when a blocked call must end early with `EINTR`.
    pub(crate) interrupted: bool,
}

impl Process {
    pub(crate) fn new(
        pid: Pid,
        parent: Option<Pid>,
        space: AddressSpace,
        frame: TrapFrame,
        fds: FdTable,
    ) -> Self {
        Self {
            pid,
            parent,
            children: Vec::new(),
            state: ProcessState::Ready,
            frame,
            space: Some(space),
            fds,
            interrupted: false,
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn parent(&self) -> Option<Pid> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<Pid>) {
        self.parent = parent;
    }

    /// Children that are live or unreaped.
    #[inline]
    pub fn children(&self) -> &[Pid] {
        &self.children
    }

    #[inline]
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Termination status, if the process is a zombie.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self.state {
            ProcessState::Zombie(status) => Some(status),
            _ => None,
        }
    }

    #[inline]
    pub fn is_zombie(&self) -> bool {
        matches!(self.state, ProcessState::Zombie(_))
    }

    /// What the process is blocked on, if anything.
    pub fn blocked_on(&self) -> Option<BlockedOn> {
        match self.state {
            ProcessState::Blocked(on) => Some(on),
            _ => None,
        }
    }

    /// Saved user registers.
    #[inline]
    pub fn frame(&self) -> &TrapFrame {
        &self.frame
    }

    /// The process's memory; None once it has exited.
    #[inline]
    pub fn space(&self) -> Option<&AddressSpace> {
        self.space.as_ref()
    }

    #[inline]
    pub fn space_mut(&mut self) -> Option<&mut AddressSpace> {
        self.space.as_mut()
    }

    #[inline]
    pub fn fds(&self) -> &FdTable {
        &self.fds
    }

    #[inline]
    pub fn fds_mut(&mut self) -> &mut FdTable {
        &mut self.fds
    }
}
