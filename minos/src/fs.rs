//! Filesystem abstraction.
//!
//! The on-disk filesystem is a separate crate that implements the traits in
//! [`traits`] and registers itself at boot with [`FileSystem::register`].
//! Kernel code then opens, creates and removes files through the static
//! methods on [`FileSystem`].
//!
//! An open file is a [`File`]: a handle owning a position and, optionally, a
//! write-denial on the underlying inode. The denial is released when the
//! handle is dropped, so "denied while this handle is open" is a lifetime
//! property rather than a bookkeeping obligation. This is how a process
//! keeps its own executable image immutable: the loader asserts denial on
//! the executable's handle and the process holds that handle until it exits.
//!
//! The underlying filesystem is not reentrant; callers serialize access
//! with a system-wide lock (owned by the syscall layer).

/// Defines traits for filesystem operations.
pub mod traits {
    use crate::KernelError;
    use alloc::sync::Arc;

    /// Trait representing a filesystem.
    pub trait FileSystem: Send + Sync {
        /// Creates `path` as an empty file of `size` zero bytes.
        ///
        /// Fails with [`KernelError::FileExist`] if the name is taken.
        fn create(&self, path: &str, size: usize) -> Result<(), KernelError>;

        /// Opens `path`.
        ///
        /// Fails with [`KernelError::NoSuchEntry`] if there is no such file.
        fn open(&self, path: &str) -> Result<Arc<dyn Inode>, KernelError>;

        /// Removes `path` from the namespace.
        ///
        /// Handles already open on the file keep working; only the name
        /// goes away.
        fn remove(&self, path: &str) -> Result<(), KernelError>;
    }

    /// Trait representing the data of one file.
    pub trait Inode: Send + Sync {
        /// Returns the size of the file in bytes.
        fn len(&self) -> usize;

        /// Reads into `buf` starting at byte `ofs`.
        ///
        /// Returns the number of bytes read, which is short only at end of
        /// file. A disk-backed implementation reports a failed transfer as
        /// [`KernelError::IOError`].
        fn read_at(&self, ofs: usize, buf: &mut [u8]) -> Result<usize, KernelError>;

        /// Writes `buf` starting at byte `ofs`.
        ///
        /// Returns the number of bytes written: short at end of file (files
        /// do not grow past their created size), and zero while writes are
        /// denied.
        fn write_at(&self, ofs: usize, buf: &[u8]) -> Result<usize, KernelError>;

        /// Asserts write denial on this file.
        ///
        /// Denials nest; writes fail until every denial is released.
        fn deny_write(&self);

        /// Releases one write denial.
        fn allow_write(&self);
    }
}

use crate::KernelError;
use alloc::sync::Arc;

static FILESYS: spin::Mutex<Option<Arc<dyn traits::FileSystem>>> = spin::Mutex::new(None);

/// The global filesystem registration point.
pub struct FileSystem {
    _p: (),
}

impl FileSystem {
    /// Registers the system filesystem, replacing any previous one.
    ///
    /// Called once at boot, after the disk driver is up.
    pub fn register(fs: Arc<dyn traits::FileSystem>) {
        *FILESYS.lock() = Some(fs);
    }

    /// Creates `path` with an initial size of `size` bytes.
    pub fn create(path: &str, size: usize) -> Result<(), KernelError> {
        Self::with(|fs| fs.create(path, size))?
    }

    /// Opens `path` and returns a fresh handle positioned at byte 0.
    pub fn open(path: &str) -> Result<File, KernelError> {
        let inode = Self::with(|fs| fs.open(path))??;
        Ok(File::new(inode))
    }

    /// Removes `path`.
    pub fn remove(path: &str) -> Result<(), KernelError> {
        Self::with(|fs| fs.remove(path))?
    }

    fn with<R>(f: impl FnOnce(&dyn traits::FileSystem) -> R) -> Result<R, KernelError> {
        let fs = FILESYS.lock();
        match fs.as_ref() {
            Some(fs) => Ok(f(fs.as_ref())),
            None => Err(KernelError::NoSuchEntry),
        }
    }
}

/// An open file: an inode plus a position and an optional write denial.
///
/// Each handle is independent; two processes holding handles on the same
/// file advance their positions separately.
pub struct File {
    inode: Arc<dyn traits::Inode>,
    pos: usize,
    writes_denied: bool,
}

impl File {
    /// Wraps `inode` in a handle positioned at byte 0.
    pub fn new(inode: Arc<dyn traits::Inode>) -> File {
        File {
            inode,
            pos: 0,
            writes_denied: false,
        }
    }

    /// Returns the size of the file in bytes.
    pub fn len(&self) -> usize {
        self.inode.len()
    }

    /// Returns `true` if the file is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads from the current position, advancing it by the bytes read.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, KernelError> {
        let n = self.inode.read_at(self.pos, buf)?;
        self.pos += n;
        Ok(n)
    }

    /// Writes at the current position, advancing it by the bytes written.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, KernelError> {
        let n = self.inode.write_at(self.pos, buf)?;
        self.pos += n;
        Ok(n)
    }

    /// Moves the position to `pos` bytes from the start of the file.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Returns the current position.
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Asserts write denial on the underlying inode until this handle is
    /// dropped (or [`File::allow_write`] is called).
    pub fn deny_write(&mut self) {
        if !self.writes_denied {
            self.writes_denied = true;
            self.inode.deny_write();
        }
    }

    /// Releases this handle's write denial early.
    pub fn allow_write(&mut self) {
        if self.writes_denied {
            self.writes_denied = false;
            self.inode.allow_write();
        }
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if self.writes_denied {
            self.inode.allow_write();
        }
    }
}
