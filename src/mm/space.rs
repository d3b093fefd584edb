//! User Address Spaces
//!
//! An address space is a sorted set of non-overlapping, page-aligned
//! regions. Each region owns its backing memory. The kernel reaches user
//! memory only through `check`, `copy_in` and `copy_out`, which translate
//! user addresses region by region and enforce region permissions.
//!
//! # Properties
//! - Regions never overlap and never leave the user window
//! - Cloning an address space deep-copies every region (used by `fork`)
//! - Dropped regions are zeroized

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use bitflags::bitflags;

use super::address::{page_round_up, UserAddr};
use super::zeroize::Zeroize;

bitflags! {
    /// Access permissions of a user region.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct RegionFlags: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

/// Errors from mapping or translating user memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// Base address is not page-aligned.
    Unaligned,
    /// Range falls outside the user window or overflows.
    OutOfRange,
    /// Range overlaps an existing region.
    Overlap,
    /// Range is not fully mapped.
    NotMapped,
    /// Region lacks the requested permission.
    PermissionDenied,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unaligned => write!(f, "address not page-aligned"),
            Self::OutOfRange => write!(f, "range outside user window"),
            Self::Overlap => write!(f, "range overlaps existing mapping"),
            Self::NotMapped => write!(f, "range not mapped"),
            Self::PermissionDenied => write!(f, "permission denied"),
        }
    }
}

/// A contiguous mapping with its own backing memory.
#[derive(Clone)]
pub struct Region {
    base: UserAddr,
    flags: RegionFlags,
    data: Vec<u8>,
}

impl Region {
    #[inline]
    pub fn base(&self) -> UserAddr {
        self.base
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn flags(&self) -> RegionFlags {
        self.flags
    }

    /// One past the last address of the region.
    #[inline]
    pub fn end(&self) -> usize {
        self.base.as_usize() + self.data.len()
    }

    #[inline]
    fn contains(&self, addr: usize) -> bool {
        addr >= self.base.as_usize() && addr < self.end()
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Region({}..{:#010x}, {:?})",
            self.base,
            self.end(),
            self.flags
        )
    }
}

/// The memory visible to one process.
#[derive(Clone, Debug)]
pub struct AddressSpace {
    regions: Vec<Region>,
    window_start: usize,
    window_end: usize,
}

impl AddressSpace {
    /// Create an empty address space covering `[window_start, window_end)`.
    pub fn new(window_start: usize, window_end: usize) -> Self {
        Self {
            regions: Vec::new(),
            window_start,
            window_end,
        }
    }

    /// Map `len` bytes (rounded up to whole pages) of zeroed memory at `base`.
    pub fn map(&mut self, base: UserAddr, len: usize, flags: RegionFlags) -> Result<(), MapError> {
        if !base.is_aligned() {
            return Err(MapError::Unaligned);
        }
        let len = page_round_up(len).ok_or(MapError::OutOfRange)?;
        if len == 0 {
            return Err(MapError::OutOfRange);
        }
        let end = base.checked_add(len).ok_or(MapError::OutOfRange)?;
        if base.as_usize() < self.window_start || end.as_usize() > self.window_end {
            return Err(MapError::OutOfRange);
        }

        // Regions are sorted; find the insertion point and check neighbours
        let idx = self
            .regions
            .partition_point(|r| r.base.as_usize() < base.as_usize());
        if idx > 0 && self.regions[idx - 1].end() > base.as_usize() {
            return Err(MapError::Overlap);
        }
        if idx < self.regions.len() && self.regions[idx].base.as_usize() < end.as_usize() {
            return Err(MapError::Overlap);
        }

        self.regions.insert(
            idx,
            Region {
                base,
                flags,
                data: vec![0; len],
            },
        );
        Ok(())
    }

    /// The `[start, end)` window this space may map into.
    #[inline]
    pub fn window(&self) -> (usize, usize) {
        (self.window_start, self.window_end)
    }

    /// Iterate over the mapped regions in address order.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    /// Total bytes mapped.
    pub fn mapped_bytes(&self) -> usize {
        self.regions.iter().map(Region::len).sum()
    }

    fn region_index(&self, addr: usize) -> Option<usize> {
        let idx = self.regions.partition_point(|r| r.base.as_usize() <= addr);
        if idx == 0 {
            return None;
        }
        if self.regions[idx - 1].contains(addr) {
            Some(idx - 1)
        } else {
            None
        }
    }

    /// Check that `[addr, addr + len)` is mapped with at least `need`.
    ///
    /// A zero-length range is always accepted.
    pub fn check(&self, addr: UserAddr, len: usize, need: RegionFlags) -> Result<(), MapError> {
        self.walk(addr, len, need, |_, _, _| {})
    }

    /// Copy user memory at `addr` into `dst`.
    pub fn copy_in(&self, addr: UserAddr, dst: &mut [u8]) -> Result<(), MapError> {
        // Validate the whole range first so a fault leaves dst untouched
        self.check(addr, dst.len(), RegionFlags::READ)?;
        let mut done = 0;
        self.walk(addr, dst.len(), RegionFlags::READ, |region, offset, chunk| {
            dst[done..done + chunk].copy_from_slice(&region.data[offset..offset + chunk]);
            done += chunk;
        })
    }

    /// Copy `src` into user memory at `addr`.
    ///
    /// Nothing is written unless the whole range is mapped writable.
    pub fn copy_out(&mut self, addr: UserAddr, src: &[u8]) -> Result<(), MapError> {
        self.check(addr, src.len(), RegionFlags::WRITE)?;
        self.write_unchecked(addr, src)
    }

    /// Write `src` at `addr` ignoring the WRITE permission.
    ///
    /// Used by the loader to fill read-only segments.
    pub fn write_unchecked(&mut self, addr: UserAddr, src: &[u8]) -> Result<(), MapError> {
        let mut cursor = addr.as_usize();
        let mut done = 0;
        while done < src.len() {
            let idx = self.region_index(cursor).ok_or(MapError::NotMapped)?;
            let region = &mut self.regions[idx];
            let offset = cursor - region.base.as_usize();
            let chunk = (region.len() - offset).min(src.len() - done);
            region.data[offset..offset + chunk].copy_from_slice(&src[done..done + chunk]);
            done += chunk;
            cursor += chunk;
        }
        Ok(())
    }

    /// Visit each region-sized piece of a range, checking permissions.
    fn walk<F>(&self, addr: UserAddr, len: usize, need: RegionFlags, mut visit: F) -> Result<(), MapError>
    where
        F: FnMut(&Region, usize, usize),
    {
        if len == 0 {
            return Ok(());
        }
        let end = addr.checked_add(len).ok_or(MapError::OutOfRange)?.as_usize();
        let mut cursor = addr.as_usize();
        while cursor < end {
            let idx = self.region_index(cursor).ok_or(MapError::NotMapped)?;
            let region = &self.regions[idx];
            if !region.flags.contains(need) {
                return Err(MapError::PermissionDenied);
            }
            let offset = cursor - region.base.as_usize();
            let chunk = (region.end() - cursor).min(end - cursor);
            visit(region, offset, chunk);
            cursor += chunk;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::address::{PAGE_SIZE, USER_END, USER_START};

    fn space() -> AddressSpace {
        AddressSpace::new(USER_START, USER_END)
    }

    const RW: RegionFlags = RegionFlags::READ.union(RegionFlags::WRITE);

    #[test]
    fn test_map_rejects_bad_ranges() {
        let mut s = space();
        assert_eq!(s.map(UserAddr::new(USER_START + 1), 10, RW), Err(MapError::Unaligned));
        assert_eq!(s.map(UserAddr::new(0), PAGE_SIZE, RW), Err(MapError::OutOfRange));
        assert_eq!(s.map(UserAddr::new(USER_END), PAGE_SIZE, RW), Err(MapError::OutOfRange));
        assert_eq!(s.map(UserAddr::new(USER_START), 0, RW), Err(MapError::OutOfRange));
    }

    #[test]
    fn test_map_rejects_overlap() {
        let mut s = space();
        s.map(UserAddr::new(USER_START + PAGE_SIZE), 2 * PAGE_SIZE, RW).unwrap();
        assert_eq!(
            s.map(UserAddr::new(USER_START), 2 * PAGE_SIZE, RW),
            Err(MapError::Overlap)
        );
        assert_eq!(
            s.map(UserAddr::new(USER_START + 2 * PAGE_SIZE), PAGE_SIZE, RW),
            Err(MapError::Overlap)
        );
        s.map(UserAddr::new(USER_START), PAGE_SIZE, RW).unwrap();
        s.map(UserAddr::new(USER_START + 3 * PAGE_SIZE), PAGE_SIZE, RW).unwrap();
        assert_eq!(s.mapped_bytes(), 4 * PAGE_SIZE);
    }

    #[test]
    fn test_copy_across_adjacent_regions() {
        let mut s = space();
        s.map(UserAddr::new(USER_START), PAGE_SIZE, RW).unwrap();
        s.map(UserAddr::new(USER_START + PAGE_SIZE), PAGE_SIZE, RW).unwrap();

        let at = UserAddr::new(USER_START + PAGE_SIZE - 2);
        s.copy_out(at, b"abcd").unwrap();
        let mut back = [0u8; 4];
        s.copy_in(at, &mut back).unwrap();
        assert_eq!(&back, b"abcd");
    }

    #[test]
    fn test_permissions_are_enforced() {
        let mut s = space();
        s.map(UserAddr::new(USER_START), PAGE_SIZE, RegionFlags::READ).unwrap();
        let at = UserAddr::new(USER_START);
        assert_eq!(s.copy_out(at, b"x"), Err(MapError::PermissionDenied));
        s.write_unchecked(at, b"x").unwrap();
        let mut back = [0u8; 1];
        s.copy_in(at, &mut back).unwrap();
        assert_eq!(&back, b"x");
    }

    #[test]
    fn test_partial_mapping_is_a_fault_without_side_effects() {
        let mut s = space();
        s.map(UserAddr::new(USER_START), PAGE_SIZE, RW).unwrap();
        let at = UserAddr::new(USER_START + PAGE_SIZE - 1);
        assert_eq!(s.copy_out(at, b"ab"), Err(MapError::NotMapped));
        let mut back = [0u8; 1];
        s.copy_in(at, &mut back).unwrap();
        assert_eq!(back[0], 0);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut parent = space();
        parent.map(UserAddr::new(USER_START), PAGE_SIZE, RW).unwrap();
        parent.copy_out(UserAddr::new(USER_START), b"old").unwrap();

        let mut child = parent.clone();
        child.copy_out(UserAddr::new(USER_START), b"new").unwrap();

        let mut back = [0u8; 3];
        parent.copy_in(UserAddr::new(USER_START), &mut back).unwrap();
        assert_eq!(&back, b"old");
    }
}
