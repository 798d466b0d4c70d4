//! ELF32 executable parsing.
//!
//! The Executable and Linkable Format is the on-disk shape of a user
//! program: a file header locating a table of program headers, each
//! describing a segment of the file and how it should appear in memory. The
//! loader only consumes program headers; section headers are a link-time
//! artifact it never looks at.
//!
//! Parsing is defensive throughout. Executables come off a filesystem a
//! user can write to, so every field the loader later trusts is checked
//! here: the identification bytes (32-bit, little-endian, version 1), the
//! object type, the machine, and the program-header geometry.

use alloc::vec::Vec;
use minos::KernelError;
use minos::fs::File;

/// Size in bytes of an ELF32 file header.
pub const ELF_HEADER_SIZE: usize = 52;

/// Size in bytes of an ELF32 program header.
pub const PHDR_SIZE: usize = 32;

/// Upper bound on `e_phnum` this kernel accepts.
pub const PHDR_MAX: u16 = 1024;

/// `e_type` of an executable object file.
pub const ET_EXEC: u16 = 2;

/// `e_machine` of Intel 80386.
pub const EM_386: u16 = 3;

fn le16(raw: &[u8], ofs: usize) -> u16 {
    u16::from_le_bytes([raw[ofs], raw[ofs + 1]])
}

fn le32(raw: &[u8], ofs: usize) -> u32 {
    u32::from_le_bytes([raw[ofs], raw[ofs + 1], raw[ofs + 2], raw[ofs + 3]])
}

/// A validated ELF32 file header.
#[derive(Clone, Copy, Debug)]
pub struct ElfHeader {
    /// Object file type.
    pub e_type: u16,
    /// Target instruction set architecture.
    pub e_machine: u16,
    /// ELF version.
    pub e_version: u32,
    /// Virtual address of the entry point.
    pub e_entry: u32,
    /// File offset of the program header table.
    pub e_phoff: u32,
    /// File offset of the section header table.
    pub e_shoff: u32,
    /// Processor-specific flags.
    pub e_flags: u32,
    /// Size of this header.
    pub e_ehsize: u16,
    /// Size of one program header table entry.
    pub e_phentsize: u16,
    /// Number of program header table entries.
    pub e_phnum: u16,
    /// Size of one section header table entry.
    pub e_shentsize: u16,
    /// Number of section header table entries.
    pub e_shnum: u16,
    /// Section name string table index.
    pub e_shstrndx: u16,
}

impl ElfHeader {
    /// Parses and validates a file header.
    ///
    /// Accepts exactly the executables this kernel can run: little-endian
    /// 32-bit `ET_EXEC` images for the 80386 with ordinary program-header
    /// geometry. Anything else is [`KernelError::NoExec`].
    pub fn parse(raw: &[u8; ELF_HEADER_SIZE]) -> Result<ElfHeader, KernelError> {
        // e_ident: magic, 32-bit class, little-endian data, version 1.
        if raw[..7] != [0x7f, b'E', b'L', b'F', 1, 1, 1] {
            return Err(KernelError::NoExec);
        }
        let header = ElfHeader {
            e_type: le16(raw, 16),
            e_machine: le16(raw, 18),
            e_version: le32(raw, 20),
            e_entry: le32(raw, 24),
            e_phoff: le32(raw, 28),
            e_shoff: le32(raw, 32),
            e_flags: le32(raw, 36),
            e_ehsize: le16(raw, 40),
            e_phentsize: le16(raw, 42),
            e_phnum: le16(raw, 44),
            e_shentsize: le16(raw, 46),
            e_shnum: le16(raw, 48),
            e_shstrndx: le16(raw, 50),
        };
        if header.e_type != ET_EXEC
            || header.e_machine != EM_386
            || header.e_version != 1
            || header.e_phentsize as usize != PHDR_SIZE
            || header.e_phnum > PHDR_MAX
        {
            return Err(KernelError::NoExec);
        }
        Ok(header)
    }
}

/// ELF program header type.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SegmentType {
    /// Unused entry.
    Null,
    /// Loadable segment.
    Load,
    /// Dynamic linking information.
    Dynamic,
    /// Interpreter path (dynamically linked executables).
    Interp,
    /// Auxiliary information.
    Note,
    /// Reserved.
    Shlib,
    /// The program header table itself.
    Phdr,
    /// GNU stack-permission marker.
    Stack,
    /// Anything else; ignored by the loader.
    Other(u32),
}

impl From<u32> for SegmentType {
    fn from(raw: u32) -> SegmentType {
        match raw {
            0 => SegmentType::Null,
            1 => SegmentType::Load,
            2 => SegmentType::Dynamic,
            3 => SegmentType::Interp,
            4 => SegmentType::Note,
            5 => SegmentType::Shlib,
            6 => SegmentType::Phdr,
            0x6474_e551 => SegmentType::Stack,
            other => SegmentType::Other(other),
        }
    }
}

bitflags::bitflags! {
    /// Segment permission flags (`p_flags`).
    pub struct SegmentFlags: u32 {
        /// Segment is executable.
        const EXECUTABLE = 1 << 0;
        /// Segment is writable.
        const WRITABLE = 1 << 1;
        /// Segment is readable.
        const READABLE = 1 << 2;
    }
}

/// An ELF32 program header.
#[derive(Clone, Copy, Debug)]
pub struct Phdr {
    /// Segment type.
    pub p_type: SegmentType,
    /// Offset in the file where the segment starts.
    pub p_offset: u32,
    /// Virtual address where the segment should be mapped.
    pub p_vaddr: u32,
    /// Physical address; unused.
    pub p_paddr: u32,
    /// Size of the segment in the file.
    pub p_filesz: u32,
    /// Size of the segment in memory.
    pub p_memsz: u32,
    /// Segment permissions.
    pub p_flags: SegmentFlags,
    /// Required alignment.
    pub p_align: u32,
}

impl Phdr {
    /// Decodes one program header table entry.
    pub fn parse(raw: &[u8; PHDR_SIZE]) -> Phdr {
        Phdr {
            p_type: SegmentType::from(le32(raw, 0)),
            p_offset: le32(raw, 4),
            p_vaddr: le32(raw, 8),
            p_paddr: le32(raw, 12),
            p_filesz: le32(raw, 16),
            p_memsz: le32(raw, 20),
            p_flags: SegmentFlags::from_bits_truncate(le32(raw, 24)),
            p_align: le32(raw, 28),
        }
    }
}

/// An ELF executable with its program header table read and decoded.
pub struct Elf {
    /// The validated file header.
    pub header: ElfHeader,
    phdrs: Vec<Phdr>,
}

impl Elf {
    /// Reads and validates an ELF image from `file`.
    ///
    /// Fails with [`KernelError::NoExec`] if the header is malformed or the
    /// program header table runs past the end of the file.
    pub fn from_file(file: &mut File) -> Result<Elf, KernelError> {
        let mut raw = [0u8; ELF_HEADER_SIZE];
        file.seek(0);
        if file.read(&mut raw)? != ELF_HEADER_SIZE {
            return Err(KernelError::NoExec);
        }
        let header = ElfHeader::parse(&raw)?;

        let mut phdrs = Vec::with_capacity(header.e_phnum as usize);
        let mut ofs = header.e_phoff as usize;
        for _ in 0..header.e_phnum {
            if ofs > file.len() {
                return Err(KernelError::NoExec);
            }
            file.seek(ofs);
            let mut raw = [0u8; PHDR_SIZE];
            if file.read(&mut raw)? != PHDR_SIZE {
                return Err(KernelError::NoExec);
            }
            phdrs.push(Phdr::parse(&raw));
            ofs += PHDR_SIZE;
        }
        Ok(Elf { header, phdrs })
    }

    /// The decoded program headers, in file order.
    pub fn phdrs(&self) -> &[Phdr] {
        &self.phdrs
    }
}
