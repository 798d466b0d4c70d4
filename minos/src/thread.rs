//! Thread creation.
//!
//! The kernel's scheduling primitive is external to this crate: whoever
//! boots the system registers a [`ThreadSpawner`] once with [`set_spawner`],
//! and from then on kernel code creates threads through [`ThreadBuilder`].
//! Thread ids are allocated here so they are unique across the system
//! regardless of who actually runs the threads.

use crate::KernelError;
use alloc::boxed::Box;
use alloc::string::String;
use core::sync::atomic::{AtomicI32, Ordering};

/// A thread identifier.
pub type Tid = i32;

/// Sentinel returned when a thread cannot be created.
pub const TID_ERROR: Tid = -1;

/// The facility that actually runs threads.
///
/// Implemented by the scheduler on real hardware and by a host-thread shim
/// under test.
pub trait ThreadSpawner: Sync {
    /// Starts a new thread named `name` running `body`.
    fn spawn(
        &self,
        name: &str,
        body: Box<dyn FnOnce() + Send + 'static>,
    ) -> Result<(), KernelError>;

    /// Gives up the processor to let another thread run.
    fn yield_now(&self) {}
}

static SPAWNER: spin::Once<&'static dyn ThreadSpawner> = spin::Once::new();
static NEXT_TID: AtomicI32 = AtomicI32::new(1);

/// Registers the system-wide thread facility. Effective once.
pub fn set_spawner(spawner: &'static dyn ThreadSpawner) {
    SPAWNER.call_once(|| spawner);
}

/// Yields the processor.
///
/// Falls back to a spin hint before a spawner is registered, which only
/// happens during early boot.
pub fn yield_now() {
    match SPAWNER.get() {
        Some(spawner) => spawner.yield_now(),
        None => core::hint::spin_loop(),
    }
}

/// Builder for a new kernel thread.
///
/// Allocates the thread id up front so callers can record it before the
/// thread runs.
pub struct ThreadBuilder {
    name: String,
    tid: Tid,
}

impl ThreadBuilder {
    /// Creates a builder for a thread named `name` and reserves its id.
    pub fn new(name: impl Into<String>) -> ThreadBuilder {
        ThreadBuilder {
            name: name.into(),
            tid: NEXT_TID.fetch_add(1, Ordering::SeqCst),
        }
    }

    /// The id the spawned thread will have.
    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// Spawns the thread.
    ///
    /// Returns the thread id, or an error if the thread cannot be created
    /// (no spawner registered, or the facility is out of resources).
    pub fn spawn<F>(self, body: F) -> Result<Tid, KernelError>
    where
        F: FnOnce() + Send + 'static,
    {
        let spawner = SPAWNER.get().ok_or(KernelError::NoMemory)?;
        spawner.spawn(&self.name, Box::new(body))?;
        Ok(self.tid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tids_are_unique_and_reserved_before_spawn() {
        let a = ThreadBuilder::new("a");
        let b = ThreadBuilder::new("b");
        assert_ne!(a.tid(), b.tid());
        assert_ne!(a.tid(), TID_ERROR);
    }
}
