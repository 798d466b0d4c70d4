//! An in-memory filesystem for MinOS.
//!
//! `MemFs` implements the kernel's filesystem traits over a flat, RAM-backed
//! namespace. It mirrors the semantics of the simple disk filesystem it
//! stands in for:
//!
//! - files have the size given at [`create`](minos::fs::traits::FileSystem::create)
//!   time and never grow, so writes past end of file are short;
//! - removing a file unlinks the name while leaving already-open handles
//!   fully usable;
//! - write denial is counted per inode, and a denied write reports zero
//!   bytes written rather than an error.
//!
//! Besides backing boot images, it is what the kernel's test harnesses
//! register before driving user programs.
#![no_std]
#![deny(unsafe_code)]

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use minos::KernelError;
use minos::fs::traits::{FileSystem, Inode};
use spin::Mutex;

/// A flat, RAM-backed filesystem.
pub struct MemFs {
    files: Mutex<BTreeMap<String, Arc<MemInode>>>,
}

struct MemInode {
    data: Mutex<Vec<u8>>,
    deny_write: AtomicUsize,
}

impl MemFs {
    /// Creates an empty filesystem.
    pub fn new() -> MemFs {
        MemFs {
            files: Mutex::new(BTreeMap::new()),
        }
    }

    /// Installs `path` with the given contents, replacing any existing file.
    ///
    /// This is the image-loading path: it is how executables get onto the
    /// filesystem before the first process runs.
    pub fn install(&self, path: &str, contents: &[u8]) {
        self.files.lock().insert(
            String::from(path),
            Arc::new(MemInode {
                data: Mutex::new(contents.to_vec()),
                deny_write: AtomicUsize::new(0),
            }),
        );
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MemFs {
    fn create(&self, path: &str, size: usize) -> Result<(), KernelError> {
        let mut files = self.files.lock();
        if files.contains_key(path) {
            return Err(KernelError::FileExist);
        }
        files.insert(
            String::from(path),
            Arc::new(MemInode {
                data: Mutex::new(vec![0; size]),
                deny_write: AtomicUsize::new(0),
            }),
        );
        Ok(())
    }

    fn open(&self, path: &str) -> Result<Arc<dyn Inode>, KernelError> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .map(|inode| inode as Arc<dyn Inode>)
            .ok_or(KernelError::NoSuchEntry)
    }

    fn remove(&self, path: &str) -> Result<(), KernelError> {
        self.files
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or(KernelError::NoSuchEntry)
    }
}

impl Inode for MemInode {
    fn len(&self) -> usize {
        self.data.lock().len()
    }

    fn read_at(&self, ofs: usize, buf: &mut [u8]) -> Result<usize, KernelError> {
        let data = self.data.lock();
        if ofs >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - ofs);
        buf[..n].copy_from_slice(&data[ofs..ofs + n]);
        Ok(n)
    }

    fn write_at(&self, ofs: usize, buf: &[u8]) -> Result<usize, KernelError> {
        if self.deny_write.load(Ordering::SeqCst) > 0 {
            return Ok(0);
        }
        let mut data = self.data.lock();
        if ofs >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - ofs);
        data[ofs..ofs + n].copy_from_slice(&buf[..n]);
        Ok(n)
    }

    fn deny_write(&self) {
        self.deny_write.fetch_add(1, Ordering::SeqCst);
    }

    fn allow_write(&self) {
        self.deny_write.fetch_sub(1, Ordering::SeqCst);
    }
}
