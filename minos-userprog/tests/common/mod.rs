//! Hosted platform for driving the user-process subsystem.
//!
//! Stands in for the machine: threads come from the host, the console is a
//! capture buffer, "user programs" are Rust bodies looked up by executable
//! name when a loaded process would drop into user mode. A program body
//! issues real system calls through the real dispatcher, with the number
//! and arguments written to its real user stack, so everything from the
//! trap boundary down is exercised exactly as on hardware.
//!
//! Tests are serialized by [`session`], which also swaps in a fresh
//! filesystem and clears the captured console.
#![allow(dead_code)]

pub mod image;

use minos::KernelError;
use minos::addressing::{PGSIZE, PHYS_BASE, Va};
use minos::syscall::Frame;
use minos::task::{Control, Task};
use minos::teletype::Teletype;
use minos::thread::ThreadSpawner;
use minos_userprog::process::{self, Process};
use minos_userprog::syscall::SyscallNumber;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Thread facility backed by host threads.

static FAIL_NEXT_SPAWN: AtomicBool = AtomicBool::new(false);

struct HostThreads;

static HOST_THREADS: HostThreads = HostThreads;

impl ThreadSpawner for HostThreads {
    fn spawn(
        &self,
        name: &str,
        body: Box<dyn FnOnce() + Send + 'static>,
    ) -> Result<(), KernelError> {
        if FAIL_NEXT_SPAWN.swap(false, Ordering::SeqCst) {
            return Err(KernelError::NoMemory);
        }
        std::thread::Builder::new()
            .name(name.into())
            .spawn(move || body())
            .map(|_| ())
            .map_err(|_| KernelError::NoMemory)
    }

    fn yield_now(&self) {
        std::thread::yield_now();
    }
}

/// Makes the next thread spawn fail, as if the kernel were out of memory.
pub fn fail_next_spawn() {
    FAIL_NEXT_SPAWN.store(true, Ordering::SeqCst);
}

// ---------------------------------------------------------------------------
// Capturing console and power switch.

static CONSOLE_BUF: Mutex<Vec<u8>> = Mutex::new(Vec::new());
static POWERED_OFF: AtomicBool = AtomicBool::new(false);

struct CaptureTty;

impl Teletype for CaptureTty {
    fn write(&mut self, data: &[u8]) -> Result<usize, KernelError> {
        CONSOLE_BUF.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn read(&mut self, _data: &mut [u8]) -> Result<usize, KernelError> {
        Ok(0)
    }
}

/// Everything written to the console so far in this session.
pub fn console_output() -> String {
    String::from_utf8_lossy(&CONSOLE_BUF.lock().unwrap()).into_owned()
}

/// Whether some program has powered the machine off.
pub fn powered_off() -> bool {
    POWERED_OFF.load(Ordering::SeqCst)
}

fn power_hook() {
    POWERED_OFF.store(true, Ordering::SeqCst);
}

// ---------------------------------------------------------------------------
// User programs.

/// The body of a simulated user program. Its return value becomes the
/// process exit status unless the body already exited (or was killed).
pub type ProgramBody = fn(&mut UserContext) -> i32;

static PROGRAMS: Mutex<BTreeMap<String, ProgramBody>> = Mutex::new(BTreeMap::new());

/// A running user program's view of itself: its process, its register
/// frame, and helpers to act like user code.
pub struct UserContext {
    proc: Process,
    frame: Frame,
    alive: bool,
    scratch: u32,
}

impl UserContext {
    /// The initial stack pointer, as user code would see it in `%esp`.
    pub fn esp(&self) -> u32 {
        self.frame.esp
    }

    /// Whether the process is still alive (not exited, not killed).
    pub fn alive(&self) -> bool {
        self.alive
    }

    /// Issues a system call exactly as the trap gate would deliver it: the
    /// number and arguments are stored on the user stack and the saved
    /// `esp` points at them. Returns the value left in `eax`.
    pub fn syscall(&mut self, number: SyscallNumber, args: &[u32]) -> i32 {
        self.syscall_nr(u32::from(number), args)
    }

    /// Like [`UserContext::syscall`], with a raw (possibly invalid)
    /// syscall number.
    pub fn syscall_nr(&mut self, number: u32, args: &[u32]) -> i32 {
        if !self.alive {
            return -1;
        }
        let mut words = vec![number];
        words.extend_from_slice(args);
        let esp = self.frame.esp - 4 * words.len() as u32;
        {
            let aspace = self.proc.pagedir_mut().expect("live process has no pagedir");
            for (i, word) in words.iter().enumerate() {
                aspace
                    .write_bytes(Va::new(esp + 4 * i as u32), &word.to_le_bytes())
                    .expect("user stack must be writable");
            }
        }
        self.raw_syscall_at(esp)
    }

    /// Issues a system call with `esp` pointing wherever the caller says,
    /// bypassing the argument setup. This is how tests hand the kernel a
    /// hostile stack pointer.
    pub fn raw_syscall_at(&mut self, esp: u32) -> i32 {
        if !self.alive {
            return -1;
        }
        let saved_esp = self.frame.esp;
        self.frame.esp = esp;
        let control = self.proc.syscall(&mut self.frame);
        self.frame.esp = saved_esp;
        if control == Control::Exit {
            self.alive = false;
        }
        self.frame.eax as i32
    }

    /// Reports a page fault at `addr` to the process, as the fault handler
    /// would.
    pub fn page_fault(&mut self, addr: u32) {
        if self.proc.page_fault(Va::new(addr), true) == Control::Exit {
            self.alive = false;
        }
    }

    /// Copies bytes into the program's user memory at a scratch address
    /// and returns that address. Scratch grows upward from the bottom of
    /// the stack page, far below the argument image.
    pub fn place_bytes(&mut self, bytes: &[u8]) -> u32 {
        let addr = self.scratch;
        self.scratch += bytes.len() as u32;
        assert!(self.scratch < self.frame.esp - 64, "scratch ran into the stack");
        self.proc
            .pagedir_mut()
            .expect("live process has no pagedir")
            .write_bytes(Va::new(addr), bytes)
            .expect("scratch write failed");
        addr
    }

    /// Places a NUL-terminated string in user memory.
    pub fn place_cstr(&mut self, s: &str) -> u32 {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.place_bytes(&bytes)
    }

    /// Reads user memory, panicking if it is unmapped.
    pub fn read_user(&self, addr: u32, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.proc
            .pagedir()
            .expect("live process has no pagedir")
            .read_bytes(Va::new(addr), &mut buf)
            .expect("user read failed");
        buf
    }

    /// Reads one little-endian word of user memory.
    pub fn read_user_u32(&self, addr: u32) -> u32 {
        let raw = self.read_user(addr, 4);
        u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
    }

    /// Reads a NUL-terminated string out of user memory.
    pub fn read_user_cstr(&self, addr: u32) -> String {
        let mut out = Vec::new();
        let mut addr = addr;
        loop {
            let b = self.read_user(addr, 1)[0];
            if b == 0 {
                break;
            }
            out.push(b);
            addr += 1;
        }
        String::from_utf8(out).expect("user string not utf-8")
    }
}

/// The registered user-mode entry: looks up the program body by process
/// name and runs it in place of real user code.
fn user_mode_entry(proc: Process, frame: Frame) {
    let body = PROGRAMS.lock().unwrap().get(proc.name()).copied();
    let mut ctx = UserContext {
        proc,
        frame,
        alive: true,
        scratch: PHYS_BASE - PGSIZE as u32,
    };
    let status = match body {
        Some(body) => body(&mut ctx),
        None => 0,
    };
    if ctx.alive {
        ctx.syscall(SyscallNumber::Exit, &[status as u32]);
    }
}

// ---------------------------------------------------------------------------
// Sessions.

static INIT: Once = Once::new();
static SESSION: Mutex<()> = Mutex::new(());

/// One test's exclusive hold on the platform.
pub struct Session {
    _guard: MutexGuard<'static, ()>,
    /// The filesystem registered for this session.
    pub fs: Arc<memfs::MemFs>,
}

/// Claims the platform: installs the hosted facilities (first caller
/// only), serializes against other tests, and starts from a clean
/// filesystem, console, and input queue.
pub fn session() -> Session {
    INIT.call_once(|| {
        minos::thread::set_spawner(&HOST_THREADS);
        minos::teletype::register(Box::new(CaptureTty));
        minos::power::register(power_hook);
        process::set_user_mode_entry(user_mode_entry);
    });
    let guard = SESSION.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    CONSOLE_BUF.lock().unwrap().clear();
    POWERED_OFF.store(false, Ordering::SeqCst);
    PROGRAMS.lock().unwrap().clear();
    while minos::teletype::read_byte().is_some() {}
    let fs = Arc::new(memfs::MemFs::new());
    minos::fs::FileSystem::register(fs.clone());
    Session { _guard: guard, fs }
}

impl Session {
    /// Registers a user program body under an executable name.
    pub fn register_program(&self, name: &str, body: ProgramBody) {
        PROGRAMS.lock().unwrap().insert(name.into(), body);
    }

    /// Installs a runnable executable image and its program body.
    pub fn install_program(&self, name: &str, body: ProgramBody) {
        self.fs.install(name, &image::minimal_exe());
        self.register_program(name, body);
    }

    /// Spawns `cmdline` from the initial kernel task and waits for it,
    /// returning its exit status.
    pub fn run(&self, cmdline: &str) -> i32 {
        let mut main = Process::new(0, "main");
        match main.execute(cmdline) {
            Ok(pid) => main.wait(pid),
            Err(_) => -1,
        }
    }

    /// Waits until `cond` holds, panicking after a few seconds.
    pub fn wait_until(&self, what: &str, cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            std::thread::yield_now();
        }
    }
}
