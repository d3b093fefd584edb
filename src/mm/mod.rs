//! Memory management for user processes
//!
//! Provides:
//! - User virtual address types and the user window
//! - Per-process address spaces with permission-checked copy in/out
//! - Zeroization of memory released by exit or exec
//!
//! # Security Principles
//! - User pointers are translated, never dereferenced
//! - A faulting copy has no partial effect
//! - Released memory is cleared

pub mod address;
pub mod space;
pub mod zeroize;

pub use address::{UserAddr, PAGE_SIZE, USER_END, USER_START};
pub use space::{AddressSpace, MapError, Region, RegionFlags};
pub use zeroize::Zeroize;
