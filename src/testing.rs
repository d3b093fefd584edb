//! Test fixtures: synthetic ELF64 images.

use alloc::vec::Vec;

use crate::loader::elf::{EHDR_SIZE, EM_AARCH64, ET_EXEC, PF_R, PF_W, PF_X, PHDR_SIZE, PT_LOAD};
use crate::mm::address::{PAGE_SIZE, USER_START};

/// Load address of the text segment in the fixture programs.
pub const TEXT_BASE: usize = USER_START;

/// Placeholder instructions for the fixture programs.
pub const TEXT: [u8; 16] = [
    0x00, 0x00, 0x80, 0xd2, 0x08, 0x00, 0x80, 0xd2, 0x01, 0x00, 0x00, 0xd4, 0x00, 0x00, 0x00,
    0x14,
];

struct SegmentSpec {
    vaddr: usize,
    data: Vec<u8>,
    memsz: u64,
    flags: u32,
}

/// Assembles minimal ELF64 executables.
pub struct ElfBuilder {
    entry: usize,
    segments: Vec<SegmentSpec>,
}

impl ElfBuilder {
    pub fn new(entry: usize) -> Self {
        Self {
            entry,
            segments: Vec::new(),
        }
    }

    pub fn segment(mut self, vaddr: usize, data: &[u8], memsz: u64, flags: u32) -> Self {
        self.segments.push(SegmentSpec {
            vaddr,
            data: data.to_vec(),
            memsz,
            flags,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let phnum = self.segments.len();
        let data_start = EHDR_SIZE + phnum * PHDR_SIZE;

        let mut out = Vec::new();
        out.extend_from_slice(&[0x7F, b'E', b'L', b'F', 2, 1, 1, 0]);
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&ET_EXEC.to_le_bytes());
        out.extend_from_slice(&EM_AARCH64.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&(self.entry as u64).to_le_bytes());
        out.extend_from_slice(&(EHDR_SIZE as u64).to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
        out.extend_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
        out.extend_from_slice(&(phnum as u16).to_le_bytes());
        out.extend_from_slice(&[0u8; 6]);
        assert_eq!(out.len(), EHDR_SIZE);

        let mut offset = data_start;
        for seg in &self.segments {
            out.extend_from_slice(&PT_LOAD.to_le_bytes());
            out.extend_from_slice(&seg.flags.to_le_bytes());
            out.extend_from_slice(&(offset as u64).to_le_bytes());
            out.extend_from_slice(&(seg.vaddr as u64).to_le_bytes());
            out.extend_from_slice(&(seg.vaddr as u64).to_le_bytes());
            out.extend_from_slice(&(seg.data.len() as u64).to_le_bytes());
            out.extend_from_slice(&seg.memsz.to_le_bytes());
            out.extend_from_slice(&(PAGE_SIZE as u64).to_le_bytes());
            offset += seg.data.len();
        }
        assert_eq!(out.len(), data_start);

        for seg in &self.segments {
            out.extend_from_slice(&seg.data);
        }
        out
    }
}

/// A one-segment program whose entry is `TEXT_BASE`.
pub fn tiny_program() -> Vec<u8> {
    ElfBuilder::new(TEXT_BASE)
        .segment(TEXT_BASE, &TEXT, TEXT.len() as u64, PF_R | PF_X)
        .build()
}

/// A two-segment program with a different entry point and a data page.
pub fn other_program() -> Vec<u8> {
    let base = TEXT_BASE + 16 * PAGE_SIZE;
    ElfBuilder::new(base + 4)
        .segment(base, &TEXT, TEXT.len() as u64, PF_R | PF_X)
        .segment(base + PAGE_SIZE, b"data", 4, PF_R | PF_W)
        .build()
}
