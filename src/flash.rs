//! Write access to module regions for the firmware-receive side of the bootloader.
//!
//! Whatever receives new firmware (mass storage, CDC, a monitor) only gets to erase and write
//! regions that are registered as boot modules, so it can never overwrite the bootloader itself.

use embedded_storage_async::nor_flash::NorFlash;

use crate::{fmt::warn, memory::MemorySpace, registry::BootModules};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WriteError<E> {
    /// The target region is not exactly the region of a registered module.
    NotRegistered,
    /// The write does not fit inside the target region, or the region is outside the flash.
    OutOfBounds,
    Flash(E),
}

/// Guards a NOR flash so only registered module regions are erased and written.
pub struct RegionWriter<'a, F: NorFlash> {
    flash: F,
    /// Address at which offset 0 of `flash` is mapped.
    flash_base: u32,
    registry: BootModules<'a>,
}

impl<'a, F: NorFlash> RegionWriter<'a, F> {
    pub fn new(flash: F, flash_base: u32, registry: BootModules<'a>) -> Self {
        Self {
            flash,
            flash_base,
            registry,
        }
    }

    /// Flash offset of `len` bytes at `offset` into `region`.
    fn flash_offset(
        &self,
        region: &MemorySpace,
        offset: u32,
        len: usize,
    ) -> Result<u32, WriteError<F::Error>> {
        if self.registry.find_region(region).is_none() {
            warn!("refusing access to unregistered region {}", region);
            return Err(WriteError::NotRegistered);
        }

        let end = offset
            .checked_add(u32::try_from(len).map_err(|_| WriteError::OutOfBounds)?)
            .ok_or(WriteError::OutOfBounds)?;
        if end > region.length() {
            return Err(WriteError::OutOfBounds);
        }

        let start = region
            .start
            .checked_sub(self.flash_base)
            .ok_or(WriteError::OutOfBounds)?;
        if start as usize + region.length() as usize > self.flash.capacity() {
            return Err(WriteError::OutOfBounds);
        }

        Ok(start + offset)
    }

    /// Erase a whole module region.
    pub async fn erase(&mut self, region: &MemorySpace) -> Result<(), WriteError<F::Error>> {
        let from = self.flash_offset(region, 0, region.length() as usize)?;
        let to = from + region.length();

        self.flash.erase(from, to).await.map_err(WriteError::Flash)
    }

    /// Write `bytes` at `offset` into a module region.
    pub async fn write(
        &mut self,
        region: &MemorySpace,
        offset: u32,
        bytes: &[u8],
    ) -> Result<(), WriteError<F::Error>> {
        let at = self.flash_offset(region, offset, bytes.len())?;

        self.flash.write(at, bytes).await.map_err(WriteError::Flash)
    }

    pub fn release(self) -> F {
        self.flash
    }
}
