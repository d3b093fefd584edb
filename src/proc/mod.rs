//! Process Management
//!
//! Pid allocation, process records, and the table that owns them.

pub mod pid;
pub mod process;
pub mod table;

pub use pid::{PidAllocator, PidError};
pub use process::{BlockedOn, Process, ProcessState};
pub use table::ProcessTable;
