#[cfg(all(feature = "cortex_m", target_arch = "arm"))]
pub mod cortex_m;

use crate::{fmt::info, validate::CertifiedImage};

/// Architecture-specific control transfer into an image, given its vector table.
pub trait Boot {
    /// Address of the vector table of the image to run.
    ///
    /// # Safety
    /// `vector_table` must point to the vector table of an image that has been validated.
    unsafe fn boot(vector_table: *const u32) -> !;
}

/// Hand the processor over to `image`. Never returns.
///
/// Only a [`CertifiedImage`] is accepted, so unvalidated flash contents cannot reach the jump.
pub fn launch<B: Boot>(image: CertifiedImage<'_>) -> ! {
    info!(
        "booting {=str} at {=u32:#x}",
        image.entry().module_name,
        image.vector_table()
    );

    // SAFETY: a certified image has passed header scan, overlap, alignment and entry checks.
    unsafe { B::boot(image.vector_table() as usize as *const u32) }
}
