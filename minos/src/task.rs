//! Task trait for interacting with a user process.
//!
//! A **task** is the kernel-side state a thread runs on behalf of. The
//! interrupt plumbing delivers user-mode events (system calls, page faults)
//! to the current thread's task through this trait, and the task answers
//! with a [`Control`] telling the platform whether the thread keeps running
//! user code or dies.

use crate::addressing::Va;
use crate::syscall::Frame;

/// What the thread hosting a task should do after an event is handled.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Control {
    /// Return to user mode and keep executing.
    Resume,
    /// The task is finished (or was terminated); the thread must not return
    /// to user mode.
    Exit,
}

/// Represents a task executed by a thread.
pub trait Task {
    /// Handles a system call triggered by the user program.
    ///
    /// `frame` holds the saved user register state; implementations decode
    /// the request from it and store the return value back into its `eax`.
    fn syscall(&mut self, frame: &mut Frame) -> Control;

    /// Handles a page fault at `fault_addr`.
    ///
    /// `user` is `true` when the fault was raised in user mode. A fault in
    /// kernel mode is a kernel bug.
    fn page_fault(&mut self, fault_addr: Va, user: bool) -> Control {
        if user {
            Control::Exit
        } else {
            panic!("unexpected kernel page fault at {:?}", fault_addr);
        }
    }
}
