//! Safe access to user-space memory.
//!
//! The kernel must not believe user input. Any address a system call hands
//! us may be null, unmapped, out of range, or pointed into the kernel; the
//! helpers here check before every dereference that the address is a real
//! user virtual address mapped in the *calling* process's page directory:
//!
//! ```text
//! addr != 0  ∧  addr >= USER_BASE  ∧  addr < PHYS_BASE  ∧  mapped(addr)
//! ```
//!
//! Buffers are checked byte by byte over their whole extent before any copy
//! is made, and strings are walked byte by byte until their terminator,
//! with a length bound so a missing terminator cannot take the kernel on an
//! unbounded tour. All failures are [`KernelError::BadAddress`] (or
//! [`KernelError::NameTooLong`] for runaway strings), which the dispatcher
//! converts into the death of the offending process.

use crate::addrspace::AddressSpace;
use alloc::string::String;
use alloc::vec::Vec;
use minos::KernelError;
use minos::addressing::{PHYS_BASE, USER_BASE, Va};

/// Checks that the single byte at `va` is a valid user address of the
/// given address space.
pub fn check_byte(aspace: &AddressSpace, va: Va) -> Result<(), KernelError> {
    let addr = va.into_u32();
    if addr == 0 || addr < USER_BASE || addr >= PHYS_BASE || !aspace.is_mapped(va) {
        return Err(KernelError::BadAddress);
    }
    Ok(())
}

/// Checks every byte of the `len`-byte region starting at `va`.
pub fn check_range(aspace: &AddressSpace, va: Va, len: usize) -> Result<(), KernelError> {
    let base = va.into_u32();
    for i in 0..len {
        check_byte(aspace, Va::new(base.wrapping_add(i as u32)))?;
    }
    Ok(())
}

/// Reads a little-endian word from user memory.
pub fn read_u32(aspace: &AddressSpace, va: Va) -> Result<u32, KernelError> {
    check_range(aspace, va, 4)?;
    let mut raw = [0u8; 4];
    aspace.read_bytes(va, &mut raw)?;
    Ok(u32::from_le_bytes(raw))
}

/// Copies `buf.len()` bytes out of user memory, validating the whole
/// region first.
pub fn read_bytes(aspace: &AddressSpace, va: Va, buf: &mut [u8]) -> Result<(), KernelError> {
    check_range(aspace, va, buf.len())?;
    aspace.read_bytes(va, buf)
}

/// Copies `bytes` into user memory, validating the whole region first.
pub fn write_bytes(
    aspace: &mut AddressSpace,
    va: Va,
    bytes: &[u8],
) -> Result<(), KernelError> {
    check_range(aspace, va, bytes.len())?;
    aspace.write_bytes(va, bytes)
}

/// Reads a NUL-terminated string from user memory.
///
/// Every byte is validated before it is read. Strings of `max` bytes or
/// more (not counting the terminator) fail with
/// [`KernelError::NameTooLong`].
pub fn read_cstr(aspace: &AddressSpace, va: Va, max: usize) -> Result<String, KernelError> {
    let mut bytes = Vec::new();
    let mut addr = va.into_u32();
    loop {
        let va = Va::new(addr);
        check_byte(aspace, va)?;
        let mut b = [0u8; 1];
        aspace.read_bytes(va, &mut b)?;
        if b[0] == 0 {
            break;
        }
        bytes.push(b[0]);
        if bytes.len() >= max {
            return Err(KernelError::NameTooLong);
        }
        addr = addr.wrapping_add(1);
    }
    String::from_utf8(bytes).map_err(|_| KernelError::InvalidArgument)
}
