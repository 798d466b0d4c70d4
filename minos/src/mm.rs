//! Memory management: user-pool page frames.
//!
//! The core abstraction is the [`Page`], an owning handle to a single
//! zero-filled frame from the user pool. Allocation is tied to Rust's
//! ownership system: a frame is allocated by creating a [`Page`] and freed
//! when the instance is dropped. Handing a [`Page`] to an address space
//! transfers the frame into it, so a mapped frame lives exactly as long as
//! the mapping.
//!
//! The pool keeps a count of live frames, readable with
//! [`user_pool_in_use`]. The count returning to its previous level after a
//! process exits is the observable form of "no frame leaked".

use crate::addressing::PGSIZE;
use alloc::boxed::Box;
use core::sync::atomic::{AtomicUsize, Ordering};

static USER_POOL_IN_USE: AtomicUsize = AtomicUsize::new(0);

/// Number of user-pool frames currently allocated and not yet freed.
pub fn user_pool_in_use() -> usize {
    USER_POOL_IN_USE.load(Ordering::SeqCst)
}

/// An owning handle to a zero-filled user-pool page frame.
///
/// The kernel reads and writes the frame through [`Page::inner`] and
/// [`Page::inner_mut`]; a user process sees the same frame at whatever user
/// virtual address the frame gets installed under.
pub struct Page {
    frame: Box<[u8; PGSIZE]>,
}

impl Page {
    /// Allocates a new zero-filled frame from the user pool.
    pub fn new() -> Page {
        USER_POOL_IN_USE.fetch_add(1, Ordering::SeqCst);
        Page {
            frame: Box::new([0; PGSIZE]),
        }
    }

    /// Returns the contents of the frame.
    pub fn inner(&self) -> &[u8; PGSIZE] {
        &self.frame
    }

    /// Returns the contents of the frame, mutably.
    pub fn inner_mut(&mut self) -> &mut [u8; PGSIZE] {
        &mut self.frame
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        USER_POOL_IN_USE.fetch_sub(1, Ordering::SeqCst);
    }
}
