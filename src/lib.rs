//! Decision core of a microcontroller bootloader that chain-loads multiboot-style images.
//!
//! On every reset the bootloader either stays resident, to receive new firmware, or picks one of
//! the modules registered at build time, validates the header embedded in it and jumps to it.
//!
//! * [`registry`]: the compile-time table of modules.
//! * [`header`]: locating and decoding the tagged image header.
//! * [`validate`]: cross-module checks, producing a [`validate::CertifiedImage`].
//! * [`decision`]: the reset-cause and double-tap state machine.
//! * [`boot`]: the control transfer.
#![no_std]

pub(crate) mod fmt;

pub mod boot;
pub mod decision;
pub mod flash;
pub mod header;
pub mod loader;
pub mod memory;
pub mod registry;
pub mod state;
pub mod validate;

#[cfg(test)]
extern crate std;

#[cfg(test)]
mod mock;

/// What caused the processor to come out of reset.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ResetCause {
    /// Power-on or brown-out; RAM contents are undefined.
    PowerOn,
    /// External pin, watchdog or software reset; RAM contents survive.
    Warm,
}

/// Status shown to the operator, rendered by the board (e.g. as an LED color).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    /// About to hand control to an image.
    Leave,
    /// Asked to boot, but no module passed validation.
    NoImage,
}

/// The parts of a concrete board the boot decision depends on.
#[allow(async_fn_in_trait)]
pub trait Board {
    fn reset_cause(&self) -> ResetCause;

    /// Free-running tick counter, allowed to wrap.
    fn ticks(&self) -> u32;

    /// Whether the USB stack has been enumerated by a host.
    fn is_usb_enumerated(&self) -> bool;

    fn signal_status(&mut self, status: Status);

    async fn delay_ms(&mut self, ms: u32);
}

/// Build-time configuration of the bootloader.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Config {
    /// Start of the first application, whose reset vector is sanity checked on every reset.
    pub app_start: u32,
    /// Last valid flash address.
    pub flash_end: u32,
    /// Alignment required for a module's vector table: a power of two, at least 128.
    pub vector_table_align: u32,
    /// Open a window after a warm reset in which a second reset enters the bootloader.
    pub double_tap: bool,
    /// After a warm reset, wait up to `quick_boot_horizon` ticks, or until USB enumerates, before
    /// booting.
    pub quick_boot: bool,
    /// Length of the double-tap window.
    pub settle_delay_ms: u32,
    /// Length of the quick-boot window, in ticks.
    pub quick_boot_horizon: u32,
}

impl Config {
    pub const fn new(app_start: u32, flash_end: u32) -> Self {
        Self {
            app_start,
            flash_end,
            vector_table_align: validate::MIN_VECTOR_TABLE_ALIGN,
            double_tap: true,
            quick_boot: false,
            settle_delay_ms: 500,
            quick_boot_horizon: 50,
        }
    }
}
