//! Reset marker kept in a RAM section that the runtime does not zero on startup.
//!
//! The section name follows the `.uninit` convention of `cortex-m-rt`, whose linker script keeps
//! `.uninit.*` out of both `.bss` and `.data`. The word therefore keeps its value over a warm
//! reset, and holds garbage after a power-on reset.

use core::mem::MaybeUninit;

use crate::decision::ResetMarker;

#[unsafe(link_section = ".uninit.tagboot.RESET_MARKER")]
static mut RESET_MARKER: MaybeUninit<u32> = MaybeUninit::uninit();

/// Handle to the no-init reset marker word.
pub struct NoInitMarker {
    _private: (),
}

impl NoInitMarker {
    /// # Safety
    /// At most one handle may exist at a time, and nothing else may access the marker word.
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl ResetMarker for NoInitMarker {
    fn read(&self) -> u32 {
        // Any bit pattern is a valid `u32`.
        unsafe { core::ptr::read_volatile((&raw const RESET_MARKER).cast::<u32>()) }
    }

    fn write(&mut self, value: u32) {
        unsafe { core::ptr::write_volatile((&raw mut RESET_MARKER).cast::<u32>(), value) }
    }
}
