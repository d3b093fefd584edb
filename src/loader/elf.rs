//! ELF Image Validation and Loading
//!
//! Accepts statically linked little-endian ELF64 executables for AArch64.
//! Only the file header and `PT_LOAD` program headers are consulted;
//! section headers are ignored.
//!
//! # Checks
//! 1. Header fits, magic/class/endianness/version match
//! 2. `e_type == ET_EXEC` and `e_machine == EM_AARCH64`
//! 3. Program header table lies inside the image
//! 4. Every loadable segment: `filesz <= memsz`, file range in bounds,
//!    page range inside the user window, no overlap with other segments
//!    or the stack
//! 5. The entry point lies in an executable segment
//! 6. Mapped memory stays under the configured limit

use alloc::vec::Vec;
use core::fmt;

use log::debug;

use crate::abi::errno::SyscallError;
use crate::config::KernelConfig;
use crate::mm::address::{page_round_up, UserAddr};
use crate::mm::space::{AddressSpace, MapError, RegionFlags};

use super::{ImageLoader, LoadedImage};

pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
pub const ELFCLASS64: u8 = 2;
pub const ELFDATA2LSB: u8 = 1;
pub const EV_CURRENT: u8 = 1;
pub const ET_EXEC: u16 = 2;
pub const EM_AARCH64: u16 = 183;
pub const PT_LOAD: u32 = 1;

pub const PF_X: u32 = 1;
pub const PF_W: u32 = 2;
pub const PF_R: u32 = 4;

/// Size of the ELF64 file header.
pub const EHDR_SIZE: usize = 64;
/// Size of one ELF64 program header.
pub const PHDR_SIZE: usize = 56;

/// Reasons an image is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfError {
    /// A header or table runs past the end of the image.
    Truncated,
    /// Missing `\x7fELF` magic.
    BadMagic,
    /// Not a 64-bit little-endian version-1 file.
    UnsupportedFormat,
    /// Not an executable (`ET_EXEC`).
    NotExecutable,
    /// Built for another architecture.
    WrongMachine,
    /// Program header entry size is not `PHDR_SIZE`.
    BadProgramHeader,
    /// No `PT_LOAD` segment with memory.
    NoLoadableSegments,
    /// `p_filesz > p_memsz`, or the file range is out of bounds.
    BadSegment,
    /// A segment leaves the user window.
    SegmentOutOfRange,
    /// Two segments, or a segment and the stack, share a page.
    SegmentOverlap,
    /// Entry point is not inside an executable segment.
    BadEntry,
    /// Segments need more memory than allowed.
    TooLarge,
}

impl fmt::Display for ElfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "image truncated"),
            Self::BadMagic => write!(f, "bad ELF magic"),
            Self::UnsupportedFormat => write!(f, "unsupported ELF class, data encoding or version"),
            Self::NotExecutable => write!(f, "not an executable"),
            Self::WrongMachine => write!(f, "wrong machine type"),
            Self::BadProgramHeader => write!(f, "bad program header size"),
            Self::NoLoadableSegments => write!(f, "no loadable segments"),
            Self::BadSegment => write!(f, "malformed segment"),
            Self::SegmentOutOfRange => write!(f, "segment outside user memory"),
            Self::SegmentOverlap => write!(f, "overlapping segments"),
            Self::BadEntry => write!(f, "entry point not executable"),
            Self::TooLarge => write!(f, "image too large"),
        }
    }
}

impl From<ElfError> for SyscallError {
    fn from(err: ElfError) -> Self {
        match err {
            ElfError::TooLarge => SyscallError::Enomem,
            _ => SyscallError::Enoexec,
        }
    }
}

fn bytes_at<const N: usize>(image: &[u8], off: usize) -> Result<[u8; N], ElfError> {
    let end = off.checked_add(N).ok_or(ElfError::Truncated)?;
    let slice = image.get(off..end).ok_or(ElfError::Truncated)?;
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    Ok(out)
}

fn u16_at(image: &[u8], off: usize) -> Result<u16, ElfError> {
    bytes_at::<2>(image, off).map(u16::from_le_bytes)
}

fn u32_at(image: &[u8], off: usize) -> Result<u32, ElfError> {
    bytes_at::<4>(image, off).map(u32::from_le_bytes)
}

fn u64_at(image: &[u8], off: usize) -> Result<u64, ElfError> {
    bytes_at::<8>(image, off).map(u64::from_le_bytes)
}

fn to_usize(v: u64) -> Result<usize, ElfError> {
    usize::try_from(v).map_err(|_| ElfError::SegmentOutOfRange)
}

/// The parts of the ELF64 file header the loader uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub entry: u64,
    pub phoff: u64,
    pub phentsize: u16,
    pub phnum: u16,
}

impl FileHeader {
    /// Parse and validate the file header.
    pub fn parse(image: &[u8]) -> Result<Self, ElfError> {
        if image.len() < EHDR_SIZE {
            return Err(ElfError::Truncated);
        }
        if image[..4] != ELF_MAGIC {
            return Err(ElfError::BadMagic);
        }
        if image[4] != ELFCLASS64 || image[5] != ELFDATA2LSB || image[6] != EV_CURRENT {
            return Err(ElfError::UnsupportedFormat);
        }
        if u16_at(image, 16)? != ET_EXEC {
            return Err(ElfError::NotExecutable);
        }
        if u16_at(image, 18)? != EM_AARCH64 {
            return Err(ElfError::WrongMachine);
        }

        let header = Self {
            entry: u64_at(image, 24)?,
            phoff: u64_at(image, 32)?,
            phentsize: u16_at(image, 54)?,
            phnum: u16_at(image, 56)?,
        };

        if header.phentsize as usize != PHDR_SIZE {
            return Err(ElfError::BadProgramHeader);
        }
        let table_len = header.phnum as usize * PHDR_SIZE;
        let table_end = to_usize(header.phoff)
            .map_err(|_| ElfError::Truncated)?
            .checked_add(table_len)
            .ok_or(ElfError::Truncated)?;
        if table_end > image.len() {
            return Err(ElfError::Truncated);
        }

        Ok(header)
    }
}

/// One ELF64 program header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    pub p_type: u32,
    pub flags: u32,
    pub offset: u64,
    pub vaddr: u64,
    pub filesz: u64,
    pub memsz: u64,
}

impl ProgramHeader {
    pub fn parse(image: &[u8], at: usize) -> Result<Self, ElfError> {
        Ok(Self {
            p_type: u32_at(image, at)?,
            flags: u32_at(image, at + 4)?,
            offset: u64_at(image, at + 8)?,
            vaddr: u64_at(image, at + 16)?,
            filesz: u64_at(image, at + 32)?,
            memsz: u64_at(image, at + 40)?,
        })
    }

    /// Region permissions for this segment.
    pub fn region_flags(&self) -> RegionFlags {
        let mut flags = RegionFlags::empty();
        if self.flags & PF_R != 0 {
            flags |= RegionFlags::READ;
        }
        if self.flags & PF_W != 0 {
            flags |= RegionFlags::WRITE;
        }
        if self.flags & PF_X != 0 {
            flags |= RegionFlags::EXEC;
        }
        flags
    }
}

/// A validated loadable segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Page-aligned start of the mapping.
    pub page_start: usize,
    /// Page-aligned end of the mapping.
    pub page_end: usize,
    pub vaddr: usize,
    pub file_offset: usize,
    pub filesz: usize,
    pub flags: RegionFlags,
}

/// Validate every loadable segment of `image` against `config`.
///
/// Returns the entry point and the segments sorted by address.
pub fn validate(image: &[u8], config: &KernelConfig) -> Result<(usize, Vec<Segment>), ElfError> {
    let header = FileHeader::parse(image)?;
    let phoff = to_usize(header.phoff).map_err(|_| ElfError::Truncated)?;

    let mut segments: Vec<Segment> = Vec::new();
    for i in 0..header.phnum as usize {
        let ph = ProgramHeader::parse(image, phoff + i * PHDR_SIZE)?;
        if ph.p_type != PT_LOAD || ph.memsz == 0 {
            continue;
        }
        if ph.filesz > ph.memsz {
            return Err(ElfError::BadSegment);
        }

        let file_offset = to_usize(ph.offset).map_err(|_| ElfError::BadSegment)?;
        let filesz = to_usize(ph.filesz).map_err(|_| ElfError::BadSegment)?;
        let file_end = file_offset.checked_add(filesz).ok_or(ElfError::BadSegment)?;
        if file_end > image.len() {
            return Err(ElfError::BadSegment);
        }

        let vaddr = to_usize(ph.vaddr)?;
        let memsz = to_usize(ph.memsz)?;
        let vend = vaddr.checked_add(memsz).ok_or(ElfError::SegmentOutOfRange)?;
        let page_start = UserAddr::new(vaddr).align_down().as_usize();
        let page_end = page_round_up(vend).ok_or(ElfError::SegmentOutOfRange)?;
        if page_start < config.user_start || page_end > config.stack_base() {
            // Segments may not reach into the stack either
            return Err(if page_end > config.user_end || page_start < config.user_start {
                ElfError::SegmentOutOfRange
            } else {
                ElfError::SegmentOverlap
            });
        }

        segments.push(Segment {
            page_start,
            page_end,
            vaddr,
            file_offset,
            filesz,
            flags: ph.region_flags(),
        });
    }

    if segments.is_empty() {
        return Err(ElfError::NoLoadableSegments);
    }

    segments.sort_by_key(|s| s.page_start);
    if segments.windows(2).any(|w| w[0].page_end > w[1].page_start) {
        return Err(ElfError::SegmentOverlap);
    }

    let total: usize = segments.iter().map(|s| s.page_end - s.page_start).sum();
    if total > config.max_image_memory {
        return Err(ElfError::TooLarge);
    }

    let entry = to_usize(header.entry).map_err(|_| ElfError::BadEntry)?;
    let entry_ok = segments.iter().any(|s| {
        s.flags.contains(RegionFlags::EXEC) && entry >= s.vaddr && entry < s.page_end
    });
    if !entry_ok {
        return Err(ElfError::BadEntry);
    }

    Ok((entry, segments))
}

fn map_err(err: MapError) -> ElfError {
    match err {
        MapError::Overlap => ElfError::SegmentOverlap,
        _ => ElfError::SegmentOutOfRange,
    }
}

/// Build a fresh address space for `image`: its segments plus a stack.
pub fn load(image: &[u8], config: &KernelConfig) -> Result<LoadedImage, ElfError> {
    let (entry, segments) = validate(image, config)?;

    let mut space = AddressSpace::new(config.user_start, config.user_end);
    for seg in &segments {
        let base = UserAddr::new(seg.page_start);
        space
            .map(base, seg.page_end - seg.page_start, seg.flags)
            .map_err(map_err)?;
        let data = &image[seg.file_offset..seg.file_offset + seg.filesz];
        space
            .write_unchecked(UserAddr::new(seg.vaddr), data)
            .map_err(map_err)?;
    }
    space
        .map(
            UserAddr::new(config.stack_base()),
            config.user_stack_size,
            RegionFlags::READ | RegionFlags::WRITE,
        )
        .map_err(map_err)?;

    Ok(LoadedImage {
        entry: UserAddr::new(entry),
        stack_top: UserAddr::new(config.stack_top()),
        space,
    })
}

/// Loader for ELF64 AArch64 executables.
#[derive(Debug, Default, Clone, Copy)]
pub struct ElfLoader;

impl ImageLoader for ElfLoader {
    fn load(&self, image: &[u8], config: &KernelConfig) -> Result<LoadedImage, SyscallError> {
        load(image, config).map_err(|err| {
            debug!(target: "loader", "rejected image ({} bytes): {}", image.len(), err);
            SyscallError::from(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::address::PAGE_SIZE;
    use crate::testing::{tiny_program, ElfBuilder, TEXT_BASE};

    fn config() -> KernelConfig {
        KernelConfig::default_config()
    }

    #[test]
    fn test_loads_tiny_program() {
        let image = tiny_program();
        let loaded = load(&image, &config()).unwrap();
        assert_eq!(loaded.entry.as_usize(), TEXT_BASE);
        assert_eq!(loaded.stack_top.as_usize(), config().stack_top());

        let mut text = [0u8; 4];
        loaded.space.copy_in(UserAddr::new(TEXT_BASE), &mut text).unwrap();
        assert_eq!(&text, &crate::testing::TEXT[..4]);
        // text is read-only
        assert!(loaded
            .space
            .check(UserAddr::new(TEXT_BASE), 1, RegionFlags::WRITE)
            .is_err());
    }

    #[test]
    fn test_bss_is_zeroed() {
        let image = ElfBuilder::new(TEXT_BASE)
            .segment(TEXT_BASE, &[0xAA; 8], 8, PF_R | PF_X)
            .segment(TEXT_BASE + PAGE_SIZE, &[1, 2], 64, PF_R | PF_W)
            .build();
        let loaded = load(&image, &config()).unwrap();
        let mut data = [0xFFu8; 4];
        loaded
            .space
            .copy_in(UserAddr::new(TEXT_BASE + PAGE_SIZE), &mut data)
            .unwrap();
        assert_eq!(data, [1, 2, 0, 0]);
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(load(b"", &config()).err(), Some(ElfError::Truncated));
        assert_eq!(load(&[0u8; 64], &config()).err(), Some(ElfError::BadMagic));
    }

    #[test]
    fn test_rejects_wrong_machine_and_type() {
        let mut image = tiny_program();
        image[18] = 3;
        assert_eq!(load(&image, &config()).err(), Some(ElfError::WrongMachine));

        let mut image = tiny_program();
        image[16] = 3; // ET_DYN
        assert_eq!(load(&image, &config()).err(), Some(ElfError::NotExecutable));
    }

    #[test]
    fn test_rejects_truncated_segment() {
        let mut image = tiny_program();
        image.truncate(image.len() - 1);
        assert_eq!(load(&image, &config()).err(), Some(ElfError::BadSegment));
    }

    #[test]
    fn test_rejects_kernel_addresses_and_overlap() {
        let image = ElfBuilder::new(0x10)
            .segment(0x0, &[0; 4], 4, PF_R | PF_X)
            .build();
        assert_eq!(load(&image, &config()).err(), Some(ElfError::SegmentOutOfRange));

        let image = ElfBuilder::new(TEXT_BASE)
            .segment(TEXT_BASE, &[0; 4], 4, PF_R | PF_X)
            .segment(TEXT_BASE + 16, &[0; 4], 4, PF_R | PF_W)
            .build();
        assert_eq!(load(&image, &config()).err(), Some(ElfError::SegmentOverlap));
    }

    #[test]
    fn test_rejects_entry_outside_text() {
        let image = ElfBuilder::new(TEXT_BASE + 8 * PAGE_SIZE)
            .segment(TEXT_BASE, &[0; 4], 4, PF_R | PF_X)
            .build();
        assert_eq!(load(&image, &config()).err(), Some(ElfError::BadEntry));
    }

    #[test]
    fn test_memory_limit_maps_to_enomem() {
        let small = config().with_max_image_memory(PAGE_SIZE);
        let image = ElfBuilder::new(TEXT_BASE)
            .segment(TEXT_BASE, &[0; 4], 2 * PAGE_SIZE as u64, PF_R | PF_X)
            .build();
        let err = load(&image, &small).err().unwrap();
        assert_eq!(err, ElfError::TooLarge);
        assert_eq!(SyscallError::from(err), SyscallError::Enomem);
        assert_eq!(SyscallError::from(ElfError::BadMagic), SyscallError::Enoexec);
    }
}
