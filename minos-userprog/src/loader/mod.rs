//! ELF loading.
//!
//! [`load`] takes a process and its command line and builds the memory
//! image the program expects at its first instruction: a fresh address
//! space, every `PT_LOAD` segment of the executable mapped with the right
//! permissions, the `.bss` tail zero-filled, and the argument stack from
//! [`stack`] in place. On success it returns the entry point and initial
//! stack pointer as a prepared [`Frame`].
//!
//! The executable file is opened here, write-denied, and attached to the
//! process, which keeps the on-disk image immutable for as long as the
//! process lives. The filesystem lock is held across the whole walk of the
//! file since the filesystem is not reentrant.
//!
//! Failure leaves the partial address space on the process; the caller's
//! exit path tears it down with the usual ordering. Any loadable segment
//! that fails validation aborts the load, as does the presence of any
//! dynamic-linking segment: this kernel runs statically linked executables
//! only.

pub mod elf;
pub mod stack;

use crate::addrspace::AddressSpace;
use crate::process::Process;
use crate::syscall::FILE_LOCK;
use elf::{Elf, Phdr, SegmentFlags, SegmentType};
use log::warn;
use minos::KernelError;
use minos::addressing::{PAGE_MASK, PGSIZE, Va, round_up_page};
use minos::fs::{File, FileSystem};
use minos::mm::Page;
use minos::syscall::Frame;

/// Loads the executable named by the first token of `cmdline` into `proc`.
///
/// On success the process owns its activated address space and the
/// write-denied executable handle, and the returned frame carries the ELF
/// entry point in `eip` and the initial stack pointer in `esp`.
pub fn load(proc: &mut Process, cmdline: &str) -> Result<Frame, KernelError> {
    let exe = cmdline
        .split_ascii_whitespace()
        .next()
        .ok_or(KernelError::InvalidArgument)?;

    let aspace = AddressSpace::new();
    aspace.activate();
    proc.set_pagedir(aspace);

    let fs_guard = FILE_LOCK.lock();
    let mut file = match FileSystem::open(exe) {
        Ok(file) => file,
        Err(e) => {
            warn!("load: {}: open failed", exe);
            return Err(e);
        }
    };
    file.deny_write();

    let image = Elf::from_file(&mut file).inspect_err(|_| {
        warn!("load: {}: error loading executable", exe);
    })?;
    for phdr in image.phdrs() {
        match phdr.p_type {
            SegmentType::Load => load_segment(proc, &mut file, phdr)?,
            // No dynamic linking.
            SegmentType::Dynamic | SegmentType::Interp | SegmentType::Shlib => {
                return Err(KernelError::NoExec);
            }
            _ => {}
        }
    }

    let pagedir = proc.pagedir_mut().ok_or(KernelError::NoMemory)?;
    let esp = stack::build_user_stack(pagedir, cmdline)?;
    drop(fs_guard);

    // The handle stays open, and write-denied, until process exit.
    proc.set_exe_file(file);

    let mut frame = Frame::zeroed();
    frame.eip = image.header.e_entry;
    frame.esp = esp;
    Ok(frame)
}

/// Checks whether `phdr` describes a valid, loadable segment.
fn segment_valid(phdr: &Phdr, file_len: usize) -> bool {
    // p_offset and p_vaddr must have the same page offset.
    if phdr.p_offset as usize & PAGE_MASK != phdr.p_vaddr as usize & PAGE_MASK {
        return false;
    }
    // p_offset must point within the file.
    if phdr.p_offset as usize > file_len {
        return false;
    }
    // The in-memory size must cover the file contents, and be non-empty.
    if phdr.p_memsz < phdr.p_filesz || phdr.p_memsz == 0 {
        return false;
    }
    // The region must start and end in user space, without wrapping.
    let Some(end) = phdr.p_vaddr.checked_add(phdr.p_memsz) else {
        return false;
    };
    if !Va::new(phdr.p_vaddr).is_user() || !Va::new(end).is_user() {
        return false;
    }
    // Page 0 stays unmapped so that a user null dereference faults instead
    // of quietly working.
    if phdr.p_vaddr < PGSIZE as u32 {
        return false;
    }
    true
}

/// Validates `phdr` and maps its pages into `proc`'s address space.
fn load_segment(proc: &mut Process, file: &mut File, phdr: &Phdr) -> Result<(), KernelError> {
    if !segment_valid(phdr, file.len()) {
        return Err(KernelError::NoExec);
    }
    let writable = phdr.p_flags.contains(SegmentFlags::WRITABLE);
    let file_page = phdr.p_offset & !(PAGE_MASK as u32);
    let mem_page = phdr.p_vaddr & !(PAGE_MASK as u32);
    let page_offset = phdr.p_vaddr as usize & PAGE_MASK;

    // Bytes that come from the file versus the zero-filled tail, both
    // measured from the start of the first page of the segment.
    let (mut read_bytes, mut zero_bytes) = if phdr.p_filesz > 0 {
        let read = page_offset + phdr.p_filesz as usize;
        (read, round_up_page(page_offset + phdr.p_memsz as usize) - read)
    } else {
        (0, round_up_page(page_offset + phdr.p_memsz as usize))
    };
    debug_assert_eq!((read_bytes + zero_bytes) % PGSIZE, 0);

    let pagedir = proc.pagedir_mut().ok_or(KernelError::NoMemory)?;
    file.seek(file_page as usize);
    let mut upage = mem_page;
    while read_bytes > 0 || zero_bytes > 0 {
        let page_read = read_bytes.min(PGSIZE);
        let page_zero = PGSIZE - page_read;

        // Frames come out of the allocator zero-filled, so only the file
        // bytes need copying in.
        let mut frame = Page::new();
        if page_read > 0 && file.read(&mut frame.inner_mut()[..page_read])? != page_read {
            return Err(KernelError::NoExec);
        }
        pagedir.install_page(Va::new(upage), frame, writable)?;

        read_bytes -= page_read;
        zero_bytes -= page_zero;
        upage = upage.wrapping_add(PGSIZE as u32);
    }
    Ok(())
}
