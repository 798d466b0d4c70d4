//! ELF32 image fixtures.
//!
//! Builds executable images byte by byte so tests can produce both
//! well-formed programs and precisely malformed ones. Layout follows the
//! loader's contract: file header at offset 0, program header table right
//! behind it, segment data placed so each segment's file offset is
//! congruent to its virtual address modulo the page size.

/// `p_type` of a loadable segment.
pub const PT_LOAD: u32 = 1;
/// `p_type` of dynamic linking information.
pub const PT_DYNAMIC: u32 = 2;
/// `p_type` of an interpreter request.
pub const PT_INTERP: u32 = 3;
/// `p_type` of an auxiliary note.
pub const PT_NOTE: u32 = 4;

/// Readable segment flag.
pub const PF_R: u32 = 4;
/// Writable segment flag.
pub const PF_W: u32 = 2;
/// Executable segment flag.
pub const PF_X: u32 = 1;

/// Conventional link base of test executables.
pub const BASE_VADDR: u32 = 0x0804_8000;

/// Entry point used by [`minimal_exe`].
pub const DEFAULT_ENTRY: u32 = BASE_VADDR + 0x80;

const EHDR_SIZE: usize = 52;
const PHDR_SIZE: usize = 32;

struct Segment {
    p_type: u32,
    vaddr: u32,
    data: Vec<u8>,
    memsz: u32,
    flags: u32,
}

/// Builder of ELF32 executable images.
pub struct ImageBuilder {
    entry: u32,
    segments: Vec<Segment>,
}

impl ImageBuilder {
    /// Starts an image whose entry point is `entry`.
    pub fn new(entry: u32) -> ImageBuilder {
        ImageBuilder {
            entry,
            segments: Vec::new(),
        }
    }

    /// Adds a `PT_LOAD` segment.
    pub fn segment(self, vaddr: u32, data: &[u8], memsz: u32, flags: u32) -> ImageBuilder {
        self.segment_of_type(PT_LOAD, vaddr, data, memsz, flags)
    }

    /// Adds a segment of an arbitrary type.
    pub fn segment_of_type(
        mut self,
        p_type: u32,
        vaddr: u32,
        data: &[u8],
        memsz: u32,
        flags: u32,
    ) -> ImageBuilder {
        self.segments.push(Segment {
            p_type,
            vaddr,
            data: data.to_vec(),
            memsz,
            flags,
        });
        self
    }

    /// Serializes the image.
    pub fn build(self) -> Vec<u8> {
        let phnum = self.segments.len();
        let mut offsets = Vec::with_capacity(phnum);
        let mut off = (EHDR_SIZE + PHDR_SIZE * phnum) as u32;
        for segment in &self.segments {
            let want = segment.vaddr & 0xfff;
            let cur = off & 0xfff;
            let p_offset = if cur <= want {
                off - cur + want
            } else {
                (off & !0xfff) + 0x1000 + want
            };
            offsets.push(p_offset);
            off = p_offset + segment.data.len() as u32;
        }

        let mut image = vec![0u8; off as usize];
        image[..7].copy_from_slice(&[0x7f, b'E', b'L', b'F', 1, 1, 1]);
        put16(&mut image, 16, 2); // ET_EXEC
        put16(&mut image, 18, 3); // EM_386
        put32(&mut image, 20, 1);
        put32(&mut image, 24, self.entry);
        put32(&mut image, 28, EHDR_SIZE as u32);
        put16(&mut image, 40, EHDR_SIZE as u16);
        put16(&mut image, 42, PHDR_SIZE as u16);
        put16(&mut image, 44, phnum as u16);

        for (i, (segment, p_offset)) in self.segments.iter().zip(&offsets).enumerate() {
            let base = EHDR_SIZE + PHDR_SIZE * i;
            put32(&mut image, base, segment.p_type);
            put32(&mut image, base + 4, *p_offset);
            put32(&mut image, base + 8, segment.vaddr);
            put32(&mut image, base + 12, segment.vaddr);
            put32(&mut image, base + 16, segment.data.len() as u32);
            put32(&mut image, base + 20, segment.memsz);
            put32(&mut image, base + 24, segment.flags);
            put32(&mut image, base + 28, 0x1000);
            image[*p_offset as usize..*p_offset as usize + segment.data.len()]
                .copy_from_slice(&segment.data);
        }
        image
    }
}

fn put16(image: &mut [u8], ofs: usize, value: u16) {
    image[ofs..ofs + 2].copy_from_slice(&value.to_le_bytes());
}

fn put32(image: &mut [u8], ofs: usize, value: u32) {
    image[ofs..ofs + 4].copy_from_slice(&value.to_le_bytes());
}

/// A small, valid executable: one read-execute text segment.
pub fn minimal_exe() -> Vec<u8> {
    ImageBuilder::new(DEFAULT_ENTRY)
        .segment(BASE_VADDR, &[0x90; 0x100], 0x100, PF_R | PF_X)
        .build()
}
