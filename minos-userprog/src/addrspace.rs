//! Per-process address spaces.
//!
//! An [`AddressSpace`] is the page directory of one process: the set of
//! mappings from user pages to the frames that back them. Frames are owned
//! by the directory; [`AddressSpace::install_page`] transfers a frame in,
//! and dropping the directory releases every frame it still holds. The
//! hardware details of the two-level table live below this crate; what this
//! module keeps is the contract the rest of the subsystem depends on.
//!
//! One directory is *active* at a time on the processor. [`activate`]
//! switches to a process directory (and on hardware refreshes the task
//! state segment so interrupts land on the right kernel stack);
//! [`activate_base`] switches back to the kernel's base directory. A
//! directory must never be destroyed while active: the exit path swaps to
//! the base directory first, and the drop check here enforces it.
//!
//! [`activate`]: AddressSpace::activate
//! [`activate_base`]: AddressSpace::activate_base

use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicUsize, Ordering};
use minos::KernelError;
use minos::addressing::{PAGE_MASK, PGSIZE, Va};
use minos::mm::Page;

/// Identifier of the kernel's base directory, active when no process
/// directory is.
pub const KERNEL_ASID: usize = 0;

static NEXT_ASID: AtomicUsize = AtomicUsize::new(1);
static ACTIVE_ASID: AtomicUsize = AtomicUsize::new(KERNEL_ASID);

struct Mapping {
    frame: Page,
    writable: bool,
}

/// A process's page directory and the frames it owns.
pub struct AddressSpace {
    asid: usize,
    pages: BTreeMap<u32, Mapping>,
}

impl AddressSpace {
    /// Creates an empty address space.
    pub fn new() -> AddressSpace {
        AddressSpace {
            asid: NEXT_ASID.fetch_add(1, Ordering::SeqCst),
            pages: BTreeMap::new(),
        }
    }

    /// Returns this space's identifier.
    pub fn asid(&self) -> usize {
        self.asid
    }

    /// Adds a mapping from user page `upage` to `frame`.
    ///
    /// `upage` must be page-aligned. On success the frame is owned by the
    /// address space; on failure (the page is already mapped) the frame is
    /// released before returning.
    pub fn install_page(
        &mut self,
        upage: Va,
        frame: Page,
        writable: bool,
    ) -> Result<(), KernelError> {
        debug_assert_eq!(upage.page_offset(), 0, "upage must be page-aligned");
        if self.pages.contains_key(&upage.into_u32()) {
            return Err(KernelError::Busy);
        }
        self.pages.insert(upage.into_u32(), Mapping { frame, writable });
        Ok(())
    }

    /// Returns `true` if `va` lies on a mapped page.
    pub fn is_mapped(&self, va: Va) -> bool {
        self.pages.contains_key(&va.page_base().into_u32())
    }

    /// Returns whether the page holding `va` is user-writable, or `None`
    /// if it is unmapped.
    pub fn is_writable(&self, va: Va) -> Option<bool> {
        self.pages
            .get(&va.page_base().into_u32())
            .map(|m| m.writable)
    }

    /// Copies `buf.len()` bytes out of user memory starting at `va`.
    ///
    /// Fails with [`KernelError::BadAddress`] if any touched page is
    /// unmapped; the buffer contents are unspecified on failure.
    pub fn read_bytes(&self, va: Va, buf: &mut [u8]) -> Result<(), KernelError> {
        let mut addr = va.into_u32();
        let mut done = 0;
        while done < buf.len() {
            let ofs = addr as usize & PAGE_MASK;
            let n = (PGSIZE - ofs).min(buf.len() - done);
            let mapping = self
                .pages
                .get(&(addr & !(PAGE_MASK as u32)))
                .ok_or(KernelError::BadAddress)?;
            buf[done..done + n].copy_from_slice(&mapping.frame.inner()[ofs..ofs + n]);
            done += n;
            addr = addr.wrapping_add(n as u32);
        }
        Ok(())
    }

    /// Copies `bytes` into user memory starting at `va`.
    ///
    /// This is a kernel-initiated store: like the processor with write
    /// protection disabled in supervisor mode, it ignores the user-write
    /// bit. Callers enforcing user-level semantics check permissions first.
    pub fn write_bytes(&mut self, va: Va, bytes: &[u8]) -> Result<(), KernelError> {
        let mut addr = va.into_u32();
        let mut done = 0;
        while done < bytes.len() {
            let ofs = addr as usize & PAGE_MASK;
            let n = (PGSIZE - ofs).min(bytes.len() - done);
            let mapping = self
                .pages
                .get_mut(&(addr & !(PAGE_MASK as u32)))
                .ok_or(KernelError::BadAddress)?;
            mapping.frame.inner_mut()[ofs..ofs + n].copy_from_slice(&bytes[done..done + n]);
            done += n;
            addr = addr.wrapping_add(n as u32);
        }
        Ok(())
    }

    /// Makes this the active address space.
    ///
    /// Called when a process starts and at every context switch; on
    /// hardware this loads the directory into the MMU and refreshes the
    /// TSS for the current thread's kernel stack.
    pub fn activate(&self) {
        ACTIVE_ASID.store(self.asid, Ordering::SeqCst);
    }

    /// Makes the kernel's base directory active.
    pub fn activate_base() {
        ACTIVE_ASID.store(KERNEL_ASID, Ordering::SeqCst);
    }

    /// Returns the identifier of the active address space.
    pub fn active_asid() -> usize {
        ACTIVE_ASID.load(Ordering::SeqCst)
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        // Freeing the active directory would leave the processor walking
        // freed tables; the exit path must activate the base directory
        // first.
        debug_assert_ne!(
            Self::active_asid(),
            self.asid,
            "destroying the active address space"
        );
    }
}
