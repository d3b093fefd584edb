//! Descriptor-Based I/O
//!
//! Per-process descriptor tables and the file objects they reference.
//! Reads transfer at most the requested count and may transfer less.

pub mod fd;
pub mod file;

pub use fd::{FdError, FdTable, MAX_FDS};
pub use file::{FileObject, FileRef, MemFile, ReadOutcome, StreamBuffer};
