//! Scheduling
//!
//! The ready queue and the monotonic clock sleepers are measured against.
//! Policy sits behind the `Scheduler` trait; the kernel only needs to push
//! runnable processes and pop the next one.

pub mod clock;
pub mod fifo;

pub use clock::Clock;
pub use fifo::FifoScheduler;

use crate::abi::types::Pid;

/// A ready queue.
pub trait Scheduler: Send {
    /// Make `pid` runnable. Queuing a Pid twice has no effect.
    fn push(&mut self, pid: Pid);

    /// Take the next process to run.
    fn pop(&mut self) -> Option<Pid>;

    /// Drop `pid` from the queue, e.g. when it is killed while ready.
    fn remove(&mut self, pid: Pid) -> bool;

    /// Number of queued processes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
