//! Counting semaphore.
//!
//! A semaphore maintains a count of available permits. [`Semaphore::down`]
//! consumes a permit, waiting until one is available; [`Semaphore::up`]
//! releases one and lets a waiter proceed.
//!
//! Beyond guarding finite resources, a semaphore initialized to zero is the
//! kernel's event-signaling device: the producer performs a one-shot `up`
//! when the event has happened, the consumer blocks in `down` until it has.
//! The process layer uses exactly this shape for its load and exit
//! handshakes between parent and child.
//!
//! An `up` synchronizes with the `down` that consumes its permit, so writes
//! made before the `up` are visible after the `down` returns.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Counting semaphore.
pub struct Semaphore {
    permits: AtomicUsize,
}

impl Semaphore {
    /// Creates a semaphore with `permits` initial permits.
    pub const fn new(permits: usize) -> Semaphore {
        Semaphore {
            permits: AtomicUsize::new(permits),
        }
    }

    /// Acquires a permit, waiting until one is available.
    ///
    /// Waiting yields the processor between attempts rather than holding it,
    /// so a waiter cannot starve the thread it is waiting for.
    pub fn down(&self) {
        loop {
            if self.try_down() {
                return;
            }
            crate::thread::yield_now();
        }
    }

    /// Attempts to acquire a permit without waiting.
    ///
    /// Returns `true` if a permit was taken.
    pub fn try_down(&self) -> bool {
        let mut current = self.permits.load(Ordering::Acquire);
        while current > 0 {
            match self.permits.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
        false
    }

    /// Releases a permit, waking one waiter if any.
    pub fn up(&self) {
        self.permits.fetch_add(1, Ordering::Release);
    }
}
