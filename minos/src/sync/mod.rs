//! Synchronization primitives.
//!
//! Two primitives are provided on top of the raw atomics: the counting
//! [`Semaphore`] and the sleeping [`Mutex`]. Short kernel-internal critical
//! sections use spinlocks (the `spin` crate) directly; these two are the
//! primitives kernel subsystems hand out across blocking operations.

pub mod mutex;
pub mod semaphore;

pub use mutex::{Mutex, MutexGuard};
pub use semaphore::Semaphore;
