//! System Call Interface
//!
//! The kernel side of the ABI: decode the call, validate its arguments
//! against the caller's address space, run the handler.
//!
//! # Security Model
//! - Whitelist approach: only the seven ABI calls are accepted
//! - All parameters are validated before use
//! - Invalid inputs return errors, never panic

mod handler;
pub mod validate;

pub use crate::abi::errno::{SyscallError, SyscallResult};
pub use handler::{dispatch, poll_blocked, Flow, SyscallContext, READ_CHUNK};
pub use validate::UserSlice;
