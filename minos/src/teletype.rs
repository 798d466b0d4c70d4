//! A teletype (TTY) interface for character-based I/O.
//!
//! This module provides the [`Teletype`] trait, an interface for reading
//! from and writing to a character device, and the system console built on
//! it. The concrete device (a serial port, a video console, a capture
//! buffer under test) is registered once at boot with [`register`].
//!
//! Console output goes through [`putbuf`], which writes the whole buffer
//! under the console lock, so output from concurrent threads never
//! interleaves within one call. Keyboard input arrives out of interrupt
//! context through [`feed_input`] and is buffered in a lock-free queue until
//! a reader drains it with [`read_byte`].

use crate::KernelError;
use alloc::boxed::Box;
use crossbeam_queue::SegQueue;

/// The `Teletype` trait represents a generic character-based input/output
/// device.
pub trait Teletype: Send {
    /// Writes data to the teletype.
    ///
    /// Returns the number of bytes successfully written.
    fn write(&mut self, data: &[u8]) -> Result<usize, KernelError>;

    /// Reads data from the teletype.
    ///
    /// Returns the number of bytes successfully read; zero means no input
    /// is pending.
    fn read(&mut self, data: &mut [u8]) -> Result<usize, KernelError>;
}

static CONSOLE: spin::Mutex<Option<Box<dyn Teletype>>> = spin::Mutex::new(None);
static INPUT: SegQueue<u8> = SegQueue::new();

/// Registers the system console, replacing any previous device.
pub fn register(tty: Box<dyn Teletype>) {
    *CONSOLE.lock() = Some(tty);
}

/// Writes `data` to the console in one uninterrupted call.
///
/// Output is dropped if no console has been registered.
pub fn putbuf(data: &[u8]) {
    let mut console = CONSOLE.lock();
    if let Some(tty) = console.as_mut() {
        let _ = tty.write(data);
    }
}

/// Queues keyboard bytes for later [`read_byte`] calls.
///
/// Called by the keyboard driver from interrupt context.
pub fn feed_input(data: &[u8]) {
    for &b in data {
        INPUT.push(b);
    }
}

/// Takes one byte of pending input, if any.
///
/// Drains the interrupt-fed queue first, then polls the console device.
pub fn read_byte() -> Option<u8> {
    if let Some(b) = INPUT.pop() {
        return Some(b);
    }
    let mut console = CONSOLE.lock();
    if let Some(tty) = console.as_mut() {
        let mut buf = [0u8; 1];
        if let Ok(1) = tty.read(&mut buf) {
            return Some(buf[0]);
        }
    }
    None
}
