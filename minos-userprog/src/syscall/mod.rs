//! System call dispatch and the thirteen system calls.
//!
//! User programs trap into the kernel with their request laid out on their
//! own stack: the syscall number at `esp`, arguments in the words above it.
//! Nothing about that layout can be trusted. The dispatcher validates
//! `esp` itself, then the last byte of the argument region (addresses grow
//! monotonically, so the two endpoints cover it), then reads number and
//! arguments through [`uaccess`]; any failure along the way, and any
//! pointer or buffer argument that fails its own byte-wise validation,
//! terminates the offending process with exit status `-1`.
//!
//! Two system-wide locks serialize the shared backends: [`FILE_LOCK`]
//! protects every filesystem call (the filesystem is not reentrant) and
//! `SYS_LOCK` serializes console input so concurrent readers do not
//! interleave bytes. Writing to standard output and reading standard input
//! take only their own lock, never the filesystem's. Lock guards are RAII,
//! so no early return can leak a lock.
//!
//! Error policy, per call, follows the kernel's user contract: soft
//! failures surface as `-1` (or `false`/`0` for the boolean calls); bad
//! addresses, unknown descriptors on `read`/`write`/`close`, writes to
//! standard input, and unknown syscall numbers kill the caller.

pub mod uaccess;

use crate::process::{Process, terminate};
use minos::KernelError;
use minos::addressing::{PGSIZE, Va};
use minos::fs::FileSystem;
use minos::power;
use minos::sync::Mutex;
use minos::syscall::Frame;
use minos::task::{Control, Task};
use minos::teletype;
use minos::thread;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Descriptor of standard input.
pub const STDIN_FILENO: i32 = 0;

/// Descriptor of standard output.
pub const STDOUT_FILENO: i32 = 1;

/// Serializes every call into the filesystem.
pub(crate) static FILE_LOCK: Mutex<()> = Mutex::new(());

/// Serializes console input.
static SYS_LOCK: Mutex<()> = Mutex::new(());

/// Represents system call numbers of the user ABI.
#[derive(Clone, Copy, PartialEq, Eq, Debug, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum SyscallNumber {
    /// Power off the machine.
    Halt = 0,
    /// Terminate the calling process with a status.
    Exit = 1,
    /// Spawn a process from a command line.
    Exec = 2,
    /// Wait for a child and collect its exit status.
    Wait = 3,
    /// Create a file with an initial size.
    Create = 4,
    /// Remove a file.
    Remove = 5,
    /// Open a file.
    Open = 6,
    /// Size of an open file.
    Filesize = 7,
    /// Read from a descriptor.
    Read = 8,
    /// Write to a descriptor.
    Write = 9,
    /// Set the position of an open file.
    Seek = 10,
    /// Report the position of an open file.
    Tell = 11,
    /// Close a descriptor.
    Close = 12,
}

impl SyscallNumber {
    /// Number of 4-byte arguments the call takes on the user stack.
    fn arg_count(self) -> usize {
        match self {
            SyscallNumber::Halt => 0,
            SyscallNumber::Exit
            | SyscallNumber::Wait
            | SyscallNumber::Remove
            | SyscallNumber::Open
            | SyscallNumber::Filesize
            | SyscallNumber::Exec
            | SyscallNumber::Tell
            | SyscallNumber::Close => 1,
            SyscallNumber::Create | SyscallNumber::Seek => 2,
            SyscallNumber::Read | SyscallNumber::Write => 3,
        }
    }
}

/// Pulls the syscall number and arguments off the untrusted user stack.
fn decode(proc: &Process, frame: &Frame) -> Result<(SyscallNumber, [u32; 3]), KernelError> {
    let aspace = proc.pagedir().ok_or(KernelError::BadAddress)?;
    let esp = frame.esp;

    // The number's own word first.
    uaccess::check_byte(aspace, Va::new(esp))?;
    let number = uaccess::read_u32(aspace, Va::new(esp))?;
    let number = SyscallNumber::try_from(number).map_err(|_| KernelError::NoSuchSyscall)?;

    // One check at the far end of the argument region covers the rest.
    let argc = number.arg_count();
    let mut args = [0u32; 3];
    if argc > 0 {
        let last = esp.wrapping_add((argc as u32 + 1) * 4 - 1);
        uaccess::check_byte(aspace, Va::new(last))?;
        for (i, arg) in args.iter_mut().enumerate().take(argc) {
            *arg = uaccess::read_u32(aspace, Va::new(esp.wrapping_add(4 * (i as u32 + 1))))?;
        }
    }
    Ok((number, args))
}

impl Task for Process {
    /// Handles a system call trapped from user mode.
    ///
    /// Decodes the request, dispatches it, and stores the return value in
    /// the frame's `eax`. Returns [`Control::Exit`] when the call ends the
    /// process, voluntarily or otherwise.
    fn syscall(&mut self, frame: &mut Frame) -> Control {
        let (number, args) = match decode(self, frame) {
            Ok(decoded) => decoded,
            Err(_) => return terminate(self, -1),
        };
        match number {
            SyscallNumber::Halt => {
                power::off();
                Control::Exit
            }
            SyscallNumber::Exit => terminate(self, args[0] as i32),
            _ => match self.dispatch(number, &args) {
                Ok(value) => {
                    frame.eax = value as u32;
                    Control::Resume
                }
                Err(_) => terminate(self, -1),
            },
        }
    }

    /// A faulting user access ends the process; a faulting kernel access is
    /// a kernel bug.
    fn page_fault(&mut self, fault_addr: Va, user: bool) -> Control {
        if user {
            terminate(self, -1)
        } else {
            panic!("unexpected kernel page fault at {:?}", fault_addr);
        }
    }
}

impl Process {
    /// Runs one decoded system call.
    ///
    /// `Ok` values are what lands in `eax`; `Err` kills the caller.
    fn dispatch(&mut self, number: SyscallNumber, args: &[u32; 3]) -> Result<i32, KernelError> {
        match number {
            SyscallNumber::Exec => self.sys_exec(args[0]),
            SyscallNumber::Wait => Ok(self.wait(args[0] as i32)),
            SyscallNumber::Create => self.sys_create(args[0], args[1]),
            SyscallNumber::Remove => self.sys_remove(args[0]),
            SyscallNumber::Open => self.sys_open(args[0]),
            SyscallNumber::Filesize => self.sys_filesize(args[0] as i32),
            SyscallNumber::Read => self.sys_read(args[0] as i32, args[1], args[2]),
            SyscallNumber::Write => self.sys_write(args[0] as i32, args[1], args[2]),
            SyscallNumber::Seek => self.sys_seek(args[0] as i32, args[1]),
            SyscallNumber::Tell => self.sys_tell(args[0] as i32),
            SyscallNumber::Close => self.sys_close(args[0] as i32),
            SyscallNumber::Halt | SyscallNumber::Exit => unreachable!("handled before dispatch"),
        }
    }

    fn read_user_cstr(&self, uva: u32) -> Result<alloc::string::String, KernelError> {
        let aspace = self.pagedir().ok_or(KernelError::BadAddress)?;
        uaccess::read_cstr(aspace, Va::new(uva), PGSIZE)
    }

    /// `exec(cmd)`: spawn a process and report its pid once it has loaded,
    /// or `-1` if it could not be spawned or failed to load.
    fn sys_exec(&mut self, cmd_uva: u32) -> Result<i32, KernelError> {
        let cmdline = self.read_user_cstr(cmd_uva)?;
        let Ok(pid) = self.execute(&cmdline) else {
            return Ok(-1);
        };
        let Some(entry) = self.child(pid) else {
            return Ok(-1);
        };
        let entry = entry.clone();
        if entry.wait_for_load() { Ok(pid) } else { Ok(-1) }
    }

    /// `create(path, size)`: make a file; `true` on success.
    fn sys_create(&mut self, path_uva: u32, size: u32) -> Result<i32, KernelError> {
        let path = self.read_user_cstr(path_uva)?;
        let _fs = FILE_LOCK.lock();
        Ok(FileSystem::create(&path, size as usize).is_ok() as i32)
    }

    /// `remove(path)`: unlink a file; `true` on success.
    fn sys_remove(&mut self, path_uva: u32) -> Result<i32, KernelError> {
        let path = self.read_user_cstr(path_uva)?;
        let _fs = FILE_LOCK.lock();
        Ok(FileSystem::remove(&path).is_ok() as i32)
    }

    /// `open(path)`: open a file and install it in the descriptor table.
    fn sys_open(&mut self, path_uva: u32) -> Result<i32, KernelError> {
        let path = self.read_user_cstr(path_uva)?;
        let file = {
            let _fs = FILE_LOCK.lock();
            FileSystem::open(&path)
        };
        match file {
            Ok(file) => match self.files.install(file) {
                Ok(fd) => Ok(fd),
                Err(_) => Ok(-1),
            },
            Err(_) => Ok(-1),
        }
    }

    /// `filesize(fd)`: length of an open file, `-1` for an unknown fd.
    fn sys_filesize(&mut self, fd: i32) -> Result<i32, KernelError> {
        match self.files.get_mut(fd) {
            Some(file) => {
                let _fs = FILE_LOCK.lock();
                Ok(file.len() as i32)
            }
            None => Ok(-1),
        }
    }

    /// `read(fd, buf, n)`: from the keyboard for standard input, from the
    /// filesystem otherwise. Reading standard output yields 0.
    fn sys_read(&mut self, fd: i32, buf_uva: u32, len: u32) -> Result<i32, KernelError> {
        let len = len as usize;
        {
            let aspace = self.pagedir.as_ref().ok_or(KernelError::BadAddress)?;
            uaccess::check_range(aspace, Va::new(buf_uva), len)?;
        }
        if fd == STDOUT_FILENO {
            return Ok(0);
        }
        if fd == STDIN_FILENO {
            let _input = SYS_LOCK.lock();
            let aspace = self.pagedir.as_mut().ok_or(KernelError::BadAddress)?;
            for i in 0..len {
                let byte = loop {
                    match teletype::read_byte() {
                        Some(byte) => break byte,
                        None => thread::yield_now(),
                    }
                };
                aspace.write_bytes(Va::new(buf_uva.wrapping_add(i as u32)), &[byte])?;
            }
            return Ok(len as i32);
        }
        let Some(file) = self.files.get_mut(fd) else {
            return Err(KernelError::BadFileDescriptor);
        };
        let mut kbuf = alloc::vec![0u8; len];
        let read = {
            let _fs = FILE_LOCK.lock();
            match file.read(&mut kbuf) {
                Ok(read) => read,
                Err(_) => return Ok(-1),
            }
        };
        let aspace = self.pagedir.as_mut().ok_or(KernelError::BadAddress)?;
        aspace.write_bytes(Va::new(buf_uva), &kbuf[..read])?;
        Ok(read as i32)
    }

    /// `write(fd, buf, n)`: to the console for standard output, to the
    /// filesystem otherwise. Writing standard input kills the caller.
    fn sys_write(&mut self, fd: i32, buf_uva: u32, len: u32) -> Result<i32, KernelError> {
        if fd == STDIN_FILENO {
            return Err(KernelError::BadFileDescriptor);
        }
        let len = len as usize;
        let mut kbuf = alloc::vec![0u8; len];
        {
            let aspace = self.pagedir.as_ref().ok_or(KernelError::BadAddress)?;
            uaccess::read_bytes(aspace, Va::new(buf_uva), &mut kbuf)?;
        }
        if fd == STDOUT_FILENO {
            teletype::putbuf(&kbuf);
            return Ok(len as i32);
        }
        let Some(file) = self.files.get_mut(fd) else {
            return Err(KernelError::BadFileDescriptor);
        };
        let _fs = FILE_LOCK.lock();
        match file.write(&kbuf) {
            Ok(written) => Ok(written as i32),
            Err(_) => Ok(-1),
        }
    }

    /// `seek(fd, pos)`: set the file position. Unknown fds are ignored.
    fn sys_seek(&mut self, fd: i32, pos: u32) -> Result<i32, KernelError> {
        if let Some(file) = self.files.get_mut(fd) {
            let _fs = FILE_LOCK.lock();
            file.seek(pos as usize);
        }
        Ok(0)
    }

    /// `tell(fd)`: the file position, `-1` for an unknown fd.
    fn sys_tell(&mut self, fd: i32) -> Result<i32, KernelError> {
        match self.files.get_mut(fd) {
            Some(file) => {
                let _fs = FILE_LOCK.lock();
                Ok(file.tell() as i32)
            }
            None => Ok(-1),
        }
    }

    /// `close(fd)`: close and forget a descriptor. Unknown fds kill the
    /// caller.
    fn sys_close(&mut self, fd: i32) -> Result<i32, KernelError> {
        let _fs = FILE_LOCK.lock();
        let file = self.files.remove(fd).ok_or(KernelError::BadFileDescriptor)?;
        drop(file);
        Ok(0)
    }
}
