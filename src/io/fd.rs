//! Descriptor Table
//!
//! Each process owns a descriptor table: a fixed array of slots, each
//! either empty or holding a shared handle to a file object.
//!
//! # Design
//! - Fixed-size array of `MAX_FDS` slots addressed by `Fd`
//! - New descriptors take the lowest free slot
//! - Cloning the table (on `fork`) shares the underlying objects

use core::fmt;

use crate::abi::types::Fd;

use super::file::FileRef;

/// Number of slots in a descriptor table.
pub const MAX_FDS: usize = 64;

/// Error type for descriptor table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdError {
    /// The descriptor is out of range or not open.
    BadDescriptor,
    /// The slot is already occupied.
    SlotOccupied,
    /// Every slot is in use.
    TableFull,
}

impl fmt::Display for FdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadDescriptor => write!(f, "bad file descriptor"),
            Self::SlotOccupied => write!(f, "descriptor already open"),
            Self::TableFull => write!(f, "descriptor table full"),
        }
    }
}

/// Descriptor table for a process.
#[derive(Clone)]
pub struct FdTable {
    slots: [Option<FileRef>; MAX_FDS],
}

impl FdTable {
    /// Create a table with every slot empty.
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// Look up the object behind `fd`.
    #[inline]
    pub fn lookup(&self, fd: Fd) -> Result<&FileRef, FdError> {
        self.slots
            .get(fd.index())
            .and_then(Option::as_ref)
            .ok_or(FdError::BadDescriptor)
    }

    /// Place `file` at a specific descriptor.
    ///
    /// Fails if the slot is already occupied.
    pub fn insert(&mut self, fd: Fd, file: FileRef) -> Result<(), FdError> {
        let slot = self.slots.get_mut(fd.index()).ok_or(FdError::BadDescriptor)?;
        if slot.is_some() {
            return Err(FdError::SlotOccupied);
        }
        *slot = Some(file);
        Ok(())
    }

    /// Place `file` in the lowest free slot and return its descriptor.
    pub fn install(&mut self, file: FileRef) -> Result<Fd, FdError> {
        let fd = self.find_free().ok_or(FdError::TableFull)?;
        self.slots[fd.index()] = Some(file);
        Ok(fd)
    }

    /// Close a descriptor, returning its object.
    pub fn close(&mut self, fd: Fd) -> Result<FileRef, FdError> {
        self.slots
            .get_mut(fd.index())
            .and_then(Option::take)
            .ok_or(FdError::BadDescriptor)
    }

    /// Close every descriptor.
    pub fn close_all(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }

    /// Find the lowest free slot.
    pub fn find_free(&self) -> Option<Fd> {
        self.slots
            .iter()
            .position(Option::is_none)
            .map(|i| Fd::new(i as u32))
    }

    /// Number of open descriptors.
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FdTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_map();
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(file) = slot {
                list.entry(&i, &file.name());
            }
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::file::{MemFile, StreamBuffer};
    use alloc::sync::Arc;

    fn mem(bytes: &[u8]) -> FileRef {
        Arc::new(MemFile::from_bytes(bytes))
    }

    #[test]
    fn test_install_takes_lowest_free_slot() {
        let mut fds = FdTable::new();
        assert_eq!(fds.install(mem(b"a")), Ok(Fd::new(0)));
        assert_eq!(fds.install(mem(b"b")), Ok(Fd::new(1)));
        fds.close(Fd::new(0)).unwrap();
        assert_eq!(fds.install(mem(b"c")), Ok(Fd::new(0)));
        assert_eq!(fds.open_count(), 2);
    }

    #[test]
    fn test_lookup_rejects_closed_and_out_of_range() {
        let mut fds = FdTable::new();
        assert!(matches!(fds.lookup(Fd::new(0)), Err(FdError::BadDescriptor)));
        assert!(matches!(fds.lookup(Fd::new(u32::MAX)), Err(FdError::BadDescriptor)));
        fds.insert(Fd::new(5), Arc::new(StreamBuffer::new())).unwrap();
        assert_eq!(fds.lookup(Fd::new(5)).map(|f| f.name()), Ok("stream"));
        assert!(matches!(
            fds.insert(Fd::new(5), mem(b"")),
            Err(FdError::SlotOccupied)
        ));
    }

    #[test]
    fn test_table_full() {
        let mut fds = FdTable::new();
        for _ in 0..MAX_FDS {
            fds.install(mem(b"")).unwrap();
        }
        assert!(matches!(fds.install(mem(b"")), Err(FdError::TableFull)));
        fds.close_all();
        assert_eq!(fds.open_count(), 0);
    }

    #[test]
    fn test_clone_shares_objects() {
        let mut fds = FdTable::new();
        let fd = fds.install(mem(b"")).unwrap();
        let copy = fds.clone();
        let a = fds.lookup(fd).unwrap();
        let b = copy.lookup(fd).unwrap();
        assert!(Arc::ptr_eq(a, b));
    }
}
