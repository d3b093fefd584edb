//! Process Table
//!
//! Owns every process record and the Pid allocator. All lifecycle
//! transitions (create, fork, terminate, reap) go through here so Pid
//! bookkeeping and parent/child links stay consistent.
//!
//! # Invariants
//! - A Pid is in the table iff it is allocated
//! - A Pid is freed only when its record is reaped
//! - Every child listed by a parent names that parent back
//! - A zombie without a parent is reaped at once

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use log::debug;

use crate::abi::errno::{SyscallError, SyscallResult};
use crate::abi::types::{ExitStatus, Pid, WaitTarget};
use crate::io::fd::FdTable;
use crate::mm::space::AddressSpace;
use crate::trap::TrapFrame;

use super::pid::{PidAllocator, PidError};
use super::process::{Process, ProcessState};

impl From<PidError> for SyscallError {
    fn from(err: PidError) -> Self {
        match err {
            PidError::Exhausted => SyscallError::Eagain,
            PidError::NotAllocated => SyscallError::Echild,
        }
    }
}

/// The set of live and unreaped processes.
#[derive(Debug)]
pub struct ProcessTable {
    procs: BTreeMap<Pid, Process>,
    pids: PidAllocator,
    capacity: usize,
}

impl ProcessTable {
    /// Create a table holding at most `capacity` processes.
    pub fn new(capacity: usize) -> Self {
        let limit = u16::try_from(capacity).unwrap_or(Pid::MAX);
        Self {
            procs: BTreeMap::new(),
            pids: PidAllocator::new(limit),
            capacity,
        }
    }

    /// Number of live and unreaped processes.
    #[inline]
    pub fn len(&self) -> usize {
        self.procs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn get(&self, pid: Pid) -> Option<&Process> {
        self.procs.get(&pid)
    }

    #[inline]
    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        self.procs.get_mut(&pid)
    }

    #[inline]
    pub fn contains(&self, pid: Pid) -> bool {
        self.procs.contains_key(&pid)
    }

    /// Pids of every process in the table, ascending.
    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.procs.keys().copied()
    }

    /// Insert a new Ready process.
    ///
    /// Fails with `EAGAIN` when the table is full or no Pid is free.
    pub fn create(
        &mut self,
        parent: Option<Pid>,
        space: AddressSpace,
        frame: TrapFrame,
        fds: FdTable,
    ) -> SyscallResult<Pid> {
        if self.procs.len() >= self.capacity {
            debug!(target: "proc", "create: table full ({} slots)", self.capacity);
            return Err(SyscallError::Eagain);
        }
        if let Some(ppid) = parent {
            if !self.contains(ppid) {
                return Err(SyscallError::Einval);
            }
        }

        let pid = self.pids.alloc()?;
        self.procs
            .insert(pid, Process::new(pid, parent, space, frame, fds));
        if let Some(parent) = parent.and_then(|ppid| self.procs.get_mut(&ppid)) {
            parent.children.push(pid);
        }
        Ok(pid)
    }

    /// Duplicate `parent`: memory, descriptors, and registers.
    ///
    /// The child's return register holds 0; the caller writes the child's
    /// Pid into the parent's frame.
    pub fn fork(&mut self, parent: Pid) -> SyscallResult<Pid> {
        let proc = self.procs.get(&parent).ok_or(SyscallError::Einval)?;
        let space = proc.space.clone().ok_or(SyscallError::Einval)?;
        let fds = proc.fds.clone();
        let mut frame = proc.frame;
        frame.set_return(0);

        let child = self.create(Some(parent), space, frame, fds)?;
        debug!(target: "proc", "fork: {} -> {}", parent, child);
        Ok(child)
    }

    /// Terminate `pid` with `status`.
    ///
    /// Memory and descriptors are released immediately. Children become
    /// orphans; those already terminated are reaped. If `pid` itself has
    /// no parent it is reaped too. Returns the parent to notify, if any.
    pub fn terminate(&mut self, pid: Pid, status: ExitStatus) -> SyscallResult<Option<Pid>> {
        let proc = self.procs.get_mut(&pid).ok_or(SyscallError::Einval)?;
        if proc.is_zombie() {
            return Err(SyscallError::Einval);
        }

        proc.state = ProcessState::Zombie(status);
        proc.space = None;
        proc.fds.close_all();
        proc.interrupted = false;
        let parent = proc.parent();
        let children = core::mem::take(&mut proc.children);
        debug!(target: "proc", "exit: {} status {:?}", pid, status);

        for child in children {
            let zombie = match self.procs.get_mut(&child) {
                Some(c) => {
                    c.set_parent(None);
                    c.is_zombie()
                }
                None => false,
            };
            if zombie {
                self.remove(child);
            }
        }

        if parent.is_none() {
            self.remove(pid);
        }
        Ok(parent)
    }

    /// Find a terminated child of `parent` matching `target`.
    ///
    /// Returns `ECHILD` if no child matches at all, `Ok(None)` if matching
    /// children exist but none has terminated.
    pub fn find_zombie_child(&self, parent: Pid, target: WaitTarget) -> SyscallResult<Option<Pid>> {
        let proc = self.procs.get(&parent).ok_or(SyscallError::Echild)?;
        let mut matched = false;
        for &child in proc.children.iter().filter(|&&c| target.matches(c)) {
            matched = true;
            if self.procs.get(&child).is_some_and(Process::is_zombie) {
                return Ok(Some(child));
            }
        }
        if matched {
            Ok(None)
        } else {
            Err(SyscallError::Echild)
        }
    }

    /// Collect the status of terminated child `child` of `parent` and free
    /// its Pid.
    pub fn reap(&mut self, parent: Pid, child: Pid) -> SyscallResult<ExitStatus> {
        let status = self
            .procs
            .get(&child)
            .filter(|c| c.parent() == Some(parent))
            .and_then(Process::exit_status)
            .ok_or(SyscallError::Echild)?;

        if let Some(p) = self.procs.get_mut(&parent) {
            p.children.retain(|&c| c != child);
        }
        self.remove(child);
        debug!(target: "proc", "reap: {} collected {} ({:?})", parent, child, status);
        Ok(status)
    }

    /// Drop a record and release its Pid.
    fn remove(&mut self, pid: Pid) {
        if self.procs.remove(&pid).is_some() {
            if let Err(err) = self.pids.free(pid) {
                debug!(target: "proc", "free {}: {}", pid, err);
            }
        }
    }

    /// Pids of processes currently blocked.
    pub fn blocked(&self) -> Vec<Pid> {
        self.procs
            .values()
            .filter(|p| p.blocked_on().is_some())
            .map(Process::pid)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::address::{UserAddr, PAGE_SIZE, USER_END, USER_START};
    use crate::mm::space::RegionFlags;

    fn space() -> AddressSpace {
        let mut s = AddressSpace::new(USER_START, USER_END);
        s.map(
            UserAddr::new(USER_START),
            PAGE_SIZE,
            RegionFlags::READ | RegionFlags::WRITE,
        )
        .unwrap();
        s
    }

    fn table_with_init(capacity: usize) -> (ProcessTable, Pid) {
        let mut table = ProcessTable::new(capacity);
        let init = table
            .create(None, space(), TrapFrame::default(), FdTable::new())
            .unwrap();
        (table, init)
    }

    #[test]
    fn test_fork_links_parent_and_child() {
        let (mut table, init) = table_with_init(8);
        let child = table.fork(init).unwrap();
        assert_eq!(table.get(child).unwrap().parent(), Some(init));
        assert_eq!(table.get(init).unwrap().children(), &[child]);
        assert_eq!(table.get(child).unwrap().frame().return_value(), 0);
    }

    #[test]
    fn test_fork_fails_when_full() {
        let (mut table, init) = table_with_init(2);
        table.fork(init).unwrap();
        assert_eq!(table.fork(init), Err(SyscallError::Eagain));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_reap_exactly_once() {
        let (mut table, init) = table_with_init(8);
        let child = table.fork(init).unwrap();
        assert_eq!(table.find_zombie_child(init, WaitTarget::Child(child)), Ok(None));

        table.terminate(child, ExitStatus::exited(7)).unwrap();
        assert_eq!(
            table.find_zombie_child(init, WaitTarget::Any),
            Ok(Some(child))
        );
        assert_eq!(table.reap(init, child), Ok(ExitStatus::exited(7)));
        assert_eq!(table.reap(init, child), Err(SyscallError::Echild));
        assert_eq!(
            table.find_zombie_child(init, WaitTarget::Child(child)),
            Err(SyscallError::Echild)
        );
        assert!(!table.contains(child));
    }

    #[test]
    fn test_exit_releases_resources() {
        let (mut table, init) = table_with_init(8);
        let child = table.fork(init).unwrap();
        table.terminate(child, ExitStatus::exited(0)).unwrap();
        let zombie = table.get(child).unwrap();
        assert!(zombie.space().is_none());
        assert_eq!(zombie.fds().open_count(), 0);
        assert_eq!(table.terminate(child, ExitStatus::exited(1)), Err(SyscallError::Einval));
    }

    #[test]
    fn test_orphans_are_reaped_without_parent() {
        let (mut table, init) = table_with_init(8);
        let child = table.fork(init).unwrap();
        let grandchild = table.fork(child).unwrap();
        let dead_grandchild = table.fork(child).unwrap();
        table.terminate(dead_grandchild, ExitStatus::exited(0)).unwrap();

        table.terminate(child, ExitStatus::exited(0)).unwrap();
        // The zombie grandchild had nobody left to wait for it
        assert!(!table.contains(dead_grandchild));
        assert_eq!(table.get(grandchild).unwrap().parent(), None);

        table.terminate(grandchild, ExitStatus::exited(0)).unwrap();
        assert!(!table.contains(grandchild));
        // The child itself still waits for init
        assert!(table.get(child).unwrap().is_zombie());
    }

    #[test]
    fn test_pid_reused_only_after_reap() {
        let (mut table, init) = table_with_init(3);
        let a = table.fork(init).unwrap();
        let b = table.fork(init).unwrap();
        table.terminate(a, ExitStatus::exited(0)).unwrap();
        // a is a zombie: still holds its slot and Pid
        assert_eq!(table.fork(init), Err(SyscallError::Eagain));

        table.reap(init, a).unwrap();
        let c = table.fork(init).unwrap();
        assert_eq!(c, a);
        assert_ne!(c, b);
    }

    #[test]
    fn test_parentless_process_is_reaped_at_exit() {
        let (mut table, init) = table_with_init(4);
        assert_eq!(table.terminate(init, ExitStatus::exited(0)), Ok(None));
        assert!(table.is_empty());
    }
}
