//! System Call Input Validation
//!
//! Every pointer a syscall receives is a user virtual address. It is
//! checked here and then translated through the caller's `AddressSpace`;
//! the kernel never dereferences it directly.
//!
//! # Checks
//! - Null pointers are rejected unless the argument is optional
//! - `ptr + len` must not overflow
//! - The range must lie in the user window
//! - The range must be mapped with the needed permission
//! - Data is copied into kernel memory before it is used

use alloc::vec;
use alloc::vec::Vec;

use super::SyscallError;
use crate::abi::types::{ExitStatus, Timespec};
use crate::io::fd::FdError;
use crate::mm::address::UserAddr;
use crate::mm::space::{AddressSpace, MapError, RegionFlags};

impl From<MapError> for SyscallError {
    fn from(_: MapError) -> Self {
        SyscallError::Efault
    }
}

impl From<FdError> for SyscallError {
    fn from(err: FdError) -> Self {
        match err {
            FdError::BadDescriptor | FdError::SlotOccupied => SyscallError::Ebadf,
            FdError::TableFull => SyscallError::Eagain,
        }
    }
}

/// A user range that passed validation for one kind of access.
///
/// Holding one does not pin the mapping; the copy helpers re-check it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSlice {
    addr: UserAddr,
    len: usize,
}

impl UserSlice {
    /// Copy the range into a new kernel buffer.
    pub fn read_all(&self, space: &AddressSpace) -> Result<Vec<u8>, SyscallError> {
        let mut out = vec![0u8; self.len];
        space.copy_in(self.addr, &mut out)?;
        Ok(out)
    }

    /// Copy `src` to the start of the range. `src` must fit.
    pub fn write(&self, space: &mut AddressSpace, src: &[u8]) -> Result<(), SyscallError> {
        if src.len() > self.len {
            return Err(SyscallError::Efault);
        }
        space.copy_out(self.addr, src)?;
        Ok(())
    }
}

/// Null, overflow, and window checks ahead of the mapping lookup.
fn check_bounds(space: &AddressSpace, ptr: usize, len: usize) -> Result<UserSlice, SyscallError> {
    let addr = UserAddr::new(ptr);

    // Zero-length ranges are valid anywhere
    if len == 0 {
        return Ok(UserSlice { addr, len });
    }

    if addr.is_null() {
        return Err(SyscallError::Efault);
    }

    // Covers overflow and the user window
    let (start, end) = space.window();
    if !addr.range_within(len, start, end) {
        return Err(SyscallError::Efault);
    }

    Ok(UserSlice { addr, len })
}

/// Validate a user buffer the kernel will read from.
pub fn validate_user_read(space: &AddressSpace, ptr: usize, len: usize) -> Result<UserSlice, SyscallError> {
    let slice = check_bounds(space, ptr, len)?;
    space.check(slice.addr, len, RegionFlags::READ)?;
    Ok(slice)
}

/// Validate a user buffer the kernel will write to.
pub fn validate_user_write(space: &AddressSpace, ptr: usize, len: usize) -> Result<UserSlice, SyscallError> {
    let slice = check_bounds(space, ptr, len)?;
    space.check(slice.addr, len, RegionFlags::WRITE)?;
    Ok(slice)
}

/// Validate an optional output pointer; null means "not requested".
pub fn validate_optional_write(
    space: &AddressSpace,
    ptr: usize,
    len: usize,
) -> Result<Option<UserSlice>, SyscallError> {
    if ptr == 0 {
        return Ok(None);
    }
    validate_user_write(space, ptr, len).map(Some)
}

/// Copy a `Timespec` in from user memory.
pub fn read_timespec(space: &AddressSpace, ptr: usize) -> Result<Timespec, SyscallError> {
    let slice = validate_user_read(space, ptr, Timespec::SIZE)?;
    let mut bytes = [0u8; Timespec::SIZE];
    space.copy_in(slice.addr, &mut bytes)?;
    Ok(Timespec::from_bytes(&bytes))
}

/// Copy a `Timespec` out to user memory.
pub fn write_timespec(space: &mut AddressSpace, addr: UserAddr, value: &Timespec) -> Result<(), SyscallError> {
    space.copy_out(addr, &value.to_bytes())?;
    Ok(())
}

/// Store a wait status (`int32_t`, native byte order).
pub fn write_status(space: &mut AddressSpace, addr: UserAddr, status: ExitStatus) -> Result<(), SyscallError> {
    space.copy_out(addr, &status.raw().to_ne_bytes())?;
    Ok(())
}
