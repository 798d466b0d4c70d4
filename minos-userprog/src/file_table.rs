//! Per-process file descriptor table.
//!
//! Descriptors are process-local integers handed out from 2 upward; 0 and 1
//! are standard input and output and never appear in the table. Allocation
//! is strictly monotonic: a number, once closed, is never reissued by the
//! same process, so a stale descriptor held after `close` can only ever
//! name nothing.

use alloc::collections::BTreeMap;
use minos::KernelError;
use minos::fs::File;

/// First descriptor number handed out to an opened file.
pub const FD_FIRST: i32 = 2;

/// Most files one process may hold open at once.
pub const FD_LIMIT: usize = 1024;

/// The open-files state of one process.
pub struct FileTable {
    files: BTreeMap<i32, File>,
    next_fd: i32,
}

impl FileTable {
    /// Creates an empty table.
    pub fn new() -> FileTable {
        FileTable {
            files: BTreeMap::new(),
            next_fd: FD_FIRST,
        }
    }

    /// Installs `file` and returns its new descriptor.
    ///
    /// Fails with [`KernelError::TooManyOpenFile`] once [`FD_LIMIT`] files
    /// are open.
    pub fn install(&mut self, file: File) -> Result<i32, KernelError> {
        if self.files.len() >= FD_LIMIT {
            return Err(KernelError::TooManyOpenFile);
        }
        let fd = self.next_fd;
        self.next_fd += 1;
        self.files.insert(fd, file);
        Ok(fd)
    }

    /// Looks up an open file.
    pub fn get_mut(&mut self, fd: i32) -> Option<&mut File> {
        self.files.get_mut(&fd)
    }

    /// Removes `fd` from the table, returning its file.
    pub fn remove(&mut self, fd: i32) -> Option<File> {
        self.files.remove(&fd)
    }

    /// Closes every open file.
    pub fn clear(&mut self) {
        self.files.clear();
    }

    /// Number of files currently open.
    pub fn open_count(&self) -> usize {
        self.files.len()
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use minos::fs::traits::Inode;

    struct NullInode;

    impl Inode for NullInode {
        fn len(&self) -> usize {
            0
        }
        fn read_at(&self, _: usize, _: &mut [u8]) -> Result<usize, KernelError> {
            Ok(0)
        }
        fn write_at(&self, _: usize, _: &[u8]) -> Result<usize, KernelError> {
            Ok(0)
        }
        fn deny_write(&self) {}
        fn allow_write(&self) {}
    }

    fn file() -> File {
        File::new(Arc::new(NullInode))
    }

    #[test]
    fn descriptors_start_at_two_and_never_repeat() {
        let mut table = FileTable::new();
        let a = table.install(file()).unwrap();
        let b = table.install(file()).unwrap();
        assert_eq!(a, FD_FIRST);
        assert_eq!(b, FD_FIRST + 1);
        assert!(table.remove(a).is_some());
        let c = table.install(file()).unwrap();
        assert_eq!(c, FD_FIRST + 2, "closed descriptors must not be reissued");
        assert!(table.get_mut(a).is_none());
    }

    #[test]
    fn table_caps_open_files() {
        let mut table = FileTable::new();
        for _ in 0..FD_LIMIT {
            table.install(file()).unwrap();
        }
        assert_eq!(table.install(file()).err(), Some(KernelError::TooManyOpenFile));
    }
}
