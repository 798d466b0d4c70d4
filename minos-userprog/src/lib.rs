//! # The MinOS user-process subsystem.
//!
//! This crate turns the kernel's thread primitive into user **processes**:
//! it loads statically linked 32-bit ELF executables into fresh address
//! spaces, builds their System V i386 argument stacks, mediates the system
//! calls they issue through the software-interrupt gate, and coordinates
//! parents and children across `exec`, `exit` and `wait`.
//!
//! The pieces, bottom up:
//!
//! - [`addrspace`] owns the per-process page directory and is the single
//!   path by which the kernel touches user memory.
//! - [`loader`] parses and maps ELF executables and lays out the initial
//!   user stack.
//! - [`process`] is the process lifecycle: spawn, the parent/child load
//!   handshake, exit with its strict teardown ordering, and wait.
//! - [`syscall`] decodes syscall requests from the untrusted user stack,
//!   validates every user pointer against the caller's address space, and
//!   implements the thirteen system calls over [`file_table`] and the
//!   filesystem.
//!
//! The kernel proper hooks in at two points: it delivers syscall and
//! page-fault events through the [`minos::task::Task`] impl on
//! [`Process`], and it registers the user-mode entry routine (the
//! interrupt-return path) with [`process::set_user_mode_entry`].
#![no_std]
#![deny(unsafe_code, rustdoc::broken_intra_doc_links)]

extern crate alloc;

pub mod addrspace;
pub mod file_table;
pub mod loader;
pub mod process;
pub mod syscall;

pub use process::{Process, STILL_ALIVE};
pub use syscall::SyscallNumber;
