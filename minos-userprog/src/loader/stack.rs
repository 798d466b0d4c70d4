//! Initial user stack construction.
//!
//! A new process gets a single zero-filled page mapped directly below
//! `PHYS_BASE`, and its command line laid out on it the way the System V
//! i386 convention wants `main`'s world to look:
//!
//! 1. each argument string, NUL-terminated, pushed in command-line order;
//! 2. padding down to a 4-byte boundary (the page's zero fill is the pad);
//! 3. the `argv[argc] = NULL` sentinel;
//! 4. the argv pointers, `argv[argc - 1]` down to `argv[0]`;
//! 5. the address of `argv[0]`;
//! 6. `argc`;
//! 7. a zero fake return address.
//!
//! The resulting stack pointer is the process's initial `esp`. All pushes
//! are bounds-checked against the stack page, so an over-long command line
//! fails the load instead of writing below the page (or wrapping into
//! kernel space).

use crate::addrspace::AddressSpace;
use minos::KernelError;
use minos::addressing::{PGSIZE, PHYS_BASE, Va};
use minos::mm::Page;

/// A utility for constructing a user-space stack image.
///
/// Pushes grow the stack downward from `PHYS_BASE` within the one stack
/// page. The builder writes through the process's address space, so the
/// bytes it lays down are exactly what the process observes at its first
/// instruction.
pub struct StackBuilder<'a> {
    aspace: &'a mut AddressSpace,
    sp: u32,
    base: u32,
}

impl<'a> StackBuilder<'a> {
    /// Maps the zero-filled stack page and positions the stack pointer at
    /// `PHYS_BASE`.
    pub fn new(aspace: &'a mut AddressSpace) -> Result<StackBuilder<'a>, KernelError> {
        let base = PHYS_BASE - PGSIZE as u32;
        aspace.install_page(Va::new(base), Page::new(), true)?;
        Ok(StackBuilder {
            aspace,
            sp: PHYS_BASE,
            base,
        })
    }

    /// Returns the current stack pointer.
    pub fn sp(&self) -> u32 {
        self.sp
    }

    /// Pushes a byte array, returning its address.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<u32, KernelError> {
        let len = bytes.len() as u32;
        match self.sp.checked_sub(len) {
            Some(sp) if sp >= self.base => {
                self.sp = sp;
                self.aspace.write_bytes(Va::new(sp), bytes)?;
                Ok(sp)
            }
            _ => Err(KernelError::NoMemory),
        }
    }

    /// Pushes a 4-byte little-endian word, returning its address.
    pub fn push_u32(&mut self, value: u32) -> Result<u32, KernelError> {
        self.push_bytes(&value.to_le_bytes())
    }

    /// Pushes a NUL-terminated string, returning the address of its first
    /// byte.
    pub fn push_str(&mut self, s: &str) -> Result<u32, KernelError> {
        // The terminator itself is the page's zero fill; just make room.
        self.push_bytes(&[0])?;
        self.push_bytes(s.as_bytes())
    }

    /// Aligns the stack pointer down to a multiple of `align` (a power of
    /// two). The skipped bytes keep the page's zero fill.
    pub fn align(&mut self, align: u32) {
        self.sp &= !(align - 1);
    }

    /// Consumes the builder, returning the final stack pointer.
    pub fn finish(self) -> u32 {
        self.sp
    }
}

/// Lays out the argument image for `cmdline` and returns the initial `esp`.
pub(super) fn build_user_stack(
    aspace: &mut AddressSpace,
    cmdline: &str,
) -> Result<u32, KernelError> {
    let mut builder = StackBuilder::new(aspace)?;

    let mut argv = alloc::vec::Vec::new();
    for arg in cmdline.split_ascii_whitespace() {
        argv.push(builder.push_str(arg)?);
    }

    builder.align(4);
    builder.push_u32(0)?; // argv[argc]
    for &arg in argv.iter().rev() {
        builder.push_u32(arg)?;
    }
    let argv_base = builder.sp();
    builder.push_u32(argv_base)?;
    builder.push_u32(argv.len() as u32)?;
    builder.push_u32(0)?; // fake return address

    Ok(builder.finish())
}
