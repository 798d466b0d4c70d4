//! # MinOS kernel facilities.
//!
//! MinOS is a small educational operating system kernel. This crate carries
//! the kernel-wide facilities that the rest of the system builds on: error
//! reporting, user-space addressing, page-frame allocation, synchronization
//! primitives, the filesystem and console abstractions, thread creation, and
//! the task interface through which interrupt plumbing reaches a running
//! process.
//!
//! The hardware-facing ends of these facilities (the scheduler, the disk
//! driver, the interrupt-return stub, the power controller) live outside this
//! crate and plug in through registration points: [`thread::set_spawner`],
//! [`fs::FileSystem::register`], [`teletype::register`] and
//! [`power::register`]. Everything above those seams is ordinary portable
//! Rust, which is also what makes the kernel's subsystems testable on a
//! hosted target.
#![no_std]
#![deny(missing_docs, rustdoc::broken_intra_doc_links)]

extern crate alloc;

pub mod addressing;
pub mod fs;
pub mod logger;
pub mod mm;
pub mod power;
pub mod sync;
pub mod syscall;
pub mod task;
pub mod teletype;
pub mod thread;

/// Enum representing errors that can occur during a kernel operation.
///
/// Each variant corresponds to a specific failure a kernel operation can
/// report. Kernel code propagates these with the `?` operator; the syscall
/// layer decides how a given error surfaces to user space (a `-1` or `0`
/// return value, or termination of the offending process).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No such file or directory.
    NoSuchEntry,
    /// I/O error in a device or filesystem driver.
    IOError,
    /// Not a runnable executable (malformed or unsupported ELF).
    NoExec,
    /// Bad file descriptor.
    BadFileDescriptor,
    /// Out of memory, or a resource could not be created.
    NoMemory,
    /// Bad user-space address.
    BadAddress,
    /// Device or resource busy.
    Busy,
    /// File already exists.
    FileExist,
    /// Invalid argument.
    InvalidArgument,
    /// Too many open files in one process.
    TooManyOpenFile,
    /// Path or command line too long.
    NameTooLong,
    /// Invalid system call number.
    NoSuchSyscall,
}
