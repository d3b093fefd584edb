//! First-in first-out ready queue.

use alloc::collections::VecDeque;

use super::Scheduler;
use crate::abi::types::Pid;

/// Runs processes in the order they became ready.
#[derive(Debug, Default)]
pub struct FifoScheduler {
    queue: VecDeque<Pid>,
}

impl FifoScheduler {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Queued Pids, front first.
    pub fn iter(&self) -> impl Iterator<Item = Pid> + '_ {
        self.queue.iter().copied()
    }
}

impl Scheduler for FifoScheduler {
    fn push(&mut self, pid: Pid) {
        if !self.queue.contains(&pid) {
            self.queue.push_back(pid);
        }
    }

    fn pop(&mut self) -> Option<Pid> {
        self.queue.pop_front()
    }

    fn remove(&mut self, pid: Pid) -> bool {
        match self.queue.iter().position(|&p| p == pid) {
            Some(idx) => {
                self.queue.remove(idx);
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}
