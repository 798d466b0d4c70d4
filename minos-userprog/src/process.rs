//! Process lifecycle and parent/child coordination.
//!
//! A **process** is one user program bound to one kernel thread: a name, an
//! address space, the write-denied handle on its own executable, a file
//! descriptor table, and its children's records.
//!
//! Parent and child run on unsynchronized schedules, so their coordination
//! flows through a [`ChildEntry`] shared between them and two one-shot
//! semaphores on it:
//!
//! - the **load semaphore** is upped by the child once its executable has
//!   loaded (or failed to); the parent's `exec` blocks on it so it can
//!   report the child's pid or `-1` truthfully;
//! - the **exit semaphore** is upped by the child on its way out; the
//!   parent's [`Process::wait`] blocks on it when the child is still
//!   alive.
//!
//! Both sides reach the entry through an `Arc`, never through owning
//! pointers at each other, so either side may exit first without leaving
//! the other dangling. The child writes its fields before the
//! corresponding `up`, which is what makes the parent's post-`down` reads
//! well ordered.
//!
//! Exit runs a strict teardown sequence (see [`Process::exit`]); the page
//! directory in particular must be detached and the base directory
//! activated *before* the directory is destroyed, or a timer interrupt
//! could reactivate freed tables.

use crate::addrspace::AddressSpace;
use crate::file_table::FileTable;
use crate::loader;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::collections::BTreeMap;
use crossbeam_utils::atomic::AtomicCell;
use log::debug;
use minos::addressing::PGSIZE;
use minos::fs::File;
use minos::sync::Semaphore;
use minos::syscall::{FLAG_IF, FLAG_MBS, Frame};
use minos::task::Control;
use minos::teletype;
use minos::thread::{ThreadBuilder, Tid};
use minos::KernelError;

/// Exit-status sentinel of a child that has not exited yet.
pub const STILL_ALIVE: i32 = i32::MIN;

/// The routine that drops a freshly loaded process into user mode.
///
/// On hardware this is the interrupt-return stub: it consumes the prepared
/// frame and never comes back. It is registered once at boot with
/// [`set_user_mode_entry`].
pub type UserModeEntry = fn(Process, Frame);

static USER_MODE_ENTRY: spin::Once<UserModeEntry> = spin::Once::new();

/// Registers the user-mode entry routine. Effective once.
pub fn set_user_mode_entry(entry: UserModeEntry) {
    USER_MODE_ENTRY.call_once(|| entry);
}

/// The record a parent keeps per child, shared with the child itself.
pub struct ChildEntry {
    pid: Tid,
    load_success: AtomicCell<bool>,
    exit_status: AtomicCell<i32>,
    load_sema: Semaphore,
    exit_sema: Semaphore,
}

impl ChildEntry {
    fn new(pid: Tid) -> ChildEntry {
        ChildEntry {
            pid,
            load_success: AtomicCell::new(false),
            exit_status: AtomicCell::new(STILL_ALIVE),
            load_sema: Semaphore::new(0),
            exit_sema: Semaphore::new(0),
        }
    }

    /// The child's process id.
    pub fn pid(&self) -> Tid {
        self.pid
    }

    /// Blocks until the child has finished loading and reports whether the
    /// load succeeded.
    pub fn wait_for_load(&self) -> bool {
        self.load_sema.down();
        self.load_success.load()
    }

    /// The child's recorded exit status, or [`STILL_ALIVE`].
    pub fn exit_status(&self) -> i32 {
        self.exit_status.load()
    }
}

struct ChildSlot {
    entry: Arc<ChildEntry>,
    waited: bool,
}

/// A user process: one program, one thread, one address space.
pub struct Process {
    pid: Tid,
    name: String,
    pub(crate) pagedir: Option<AddressSpace>,
    exe_file: Option<File>,
    pub(crate) files: FileTable,
    children: BTreeMap<Tid, ChildSlot>,
    self_entry: Option<Arc<ChildEntry>>,
}

impl Process {
    /// Creates an empty process shell.
    ///
    /// The loader gives it an address space and an executable; the initial
    /// kernel task uses one of these bare, with no user state, to spawn
    /// and wait for the first user program.
    pub fn new(pid: Tid, name: &str) -> Process {
        Process {
            pid,
            name: name.to_string(),
            pagedir: None,
            exe_file: None,
            files: FileTable::new(),
            children: BTreeMap::new(),
            self_entry: None,
        }
    }

    /// The process id.
    pub fn pid(&self) -> Tid {
        self.pid
    }

    /// The process name: the first token of its command line.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The process's address space, if one has been set up.
    pub fn pagedir(&self) -> Option<&AddressSpace> {
        self.pagedir.as_ref()
    }

    /// Mutable access to the process's address space.
    pub fn pagedir_mut(&mut self) -> Option<&mut AddressSpace> {
        self.pagedir.as_mut()
    }

    pub(crate) fn set_pagedir(&mut self, aspace: AddressSpace) {
        self.pagedir = Some(aspace);
    }

    pub(crate) fn set_exe_file(&mut self, file: File) {
        self.exe_file = Some(file);
    }

    /// The shared record of child `pid`, if it is one of ours.
    pub fn child(&self, pid: Tid) -> Option<&Arc<ChildEntry>> {
        self.children.get(&pid).map(|slot| &slot.entry)
    }

    /// Spawns a thread running the user program named by `cmdline`.
    ///
    /// The command line is copied into kernel memory first, so the caller's
    /// buffer can go away (or be scribbled on) while the child is still
    /// loading. The child's record is created before the child runs.
    /// Returns the new process id; the caller learns whether the load
    /// succeeded by blocking on [`ChildEntry::wait_for_load`].
    pub fn execute(&mut self, cmdline: &str) -> Result<Tid, KernelError> {
        if cmdline.len() >= PGSIZE {
            return Err(KernelError::NameTooLong);
        }
        let name = cmdline
            .split_ascii_whitespace()
            .next()
            .ok_or(KernelError::InvalidArgument)?;
        let cmdline_copy = cmdline.to_string();

        let builder = ThreadBuilder::new(name);
        let pid = builder.tid();
        let entry = Arc::new(ChildEntry::new(pid));
        self.children.insert(
            pid,
            ChildSlot {
                entry: entry.clone(),
                waited: false,
            },
        );

        match builder.spawn(move || start_process(pid, cmdline_copy, entry)) {
            Ok(tid) => Ok(tid),
            Err(e) => {
                self.children.remove(&pid);
                Err(e)
            }
        }
    }

    /// Waits for child `pid` to exit and returns its exit status.
    ///
    /// Returns `-1` immediately if `pid` is not a live child record of this
    /// process or has already been waited on; each child's status can be
    /// observed at most once.
    pub fn wait(&mut self, pid: Tid) -> i32 {
        let Some(slot) = self.children.get_mut(&pid) else {
            return -1;
        };
        if slot.waited {
            return -1;
        }
        slot.waited = true;
        let entry = slot.entry.clone();
        if entry.exit_status() == STILL_ALIVE {
            entry.exit_sema.down();
        }
        entry.exit_status()
    }

    /// Records `status` in this process's child record on its parent.
    pub(crate) fn record_exit(&mut self, status: i32) {
        if let Some(entry) = &self.self_entry {
            entry.exit_status.store(status);
        }
    }

    /// Releases everything this process holds.
    ///
    /// The order is contractual: wake a waiting parent first, then drop the
    /// child records, close the open files, close the executable handle
    /// (which releases its write denial), sever the parent link, and only
    /// then tear down the address space. The directory is detached from
    /// the process and the base directory activated *before* the directory
    /// is destroyed, so no interrupt can reactivate freed tables.
    pub fn exit(&mut self) {
        debug!("{}: process exit", self.name);
        if let Some(entry) = &self.self_entry {
            entry.exit_sema.up();
        }
        self.children.clear();
        self.files.clear();
        self.exe_file = None;
        self.self_entry = None;
        if let Some(pagedir) = self.pagedir.take() {
            AddressSpace::activate_base();
            drop(pagedir);
        }
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        // Safety net for processes dropped outside the exit path: never
        // destroy a directory that is still active.
        if let Some(pagedir) = self.pagedir.take() {
            if AddressSpace::active_asid() == pagedir.asid() {
                AddressSpace::activate_base();
            }
            drop(pagedir);
        }
    }
}

/// Terminates `proc` with `status`: the exit line, the status record, the
/// teardown.
///
/// This is the single funnel for every way a process ends once it has
/// entered user mode: a voluntary `exit`, a rejected syscall argument, a
/// fault. The console line is part of the kernel's observable contract.
pub fn terminate(proc: &mut Process, status: i32) -> Control {
    let line = alloc::format!("{}: exit({})\n", proc.name(), status);
    teletype::putbuf(line.as_bytes());
    proc.record_exit(status);
    proc.exit();
    Control::Exit
}

/// Entry of the child thread: load, handshake, drop into user mode.
fn start_process(pid: Tid, cmdline: String, entry: Arc<ChildEntry>) {
    let name = cmdline.split_ascii_whitespace().next().unwrap_or("");
    let mut proc = Process::new(pid, name);
    proc.self_entry = Some(entry.clone());

    match loader::load(&mut proc, &cmdline) {
        Ok(mut frame) => {
            frame.eflags = FLAG_IF | FLAG_MBS;
            // The record must be written before the parent is released.
            entry.load_success.store(true);
            entry.load_sema.up();
            match USER_MODE_ENTRY.get() {
                Some(enter) => enter(proc, frame),
                None => {
                    // Boot misconfiguration; treat like a kill.
                    log::error!("no user-mode entry registered");
                    proc.record_exit(-1);
                    proc.exit();
                }
            }
        }
        Err(_) => {
            // The parent's exec observes the failure; a process that never
            // reached user mode exits silently with a kill status.
            entry.load_success.store(false);
            proc.record_exit(-1);
            entry.load_sema.up();
            proc.exit();
        }
    }
}
