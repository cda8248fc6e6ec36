use cortex_m::peripheral::SCB;

use crate::{boot::Boot, validate::MIN_VECTOR_TABLE_ALIGN};

/// Bits of VTOR holding the table offset.
pub const VTOR_TBLOFF_MASK: u32 = !(MIN_VECTOR_TABLE_ALIGN - 1);

/// Bootload mechanism for Cortex-M without support for TrustZone.
///
/// Points VTOR at the image's vector table, then lets `cortex_m::asm::bootload` load the main
/// stack pointer and branch to the reset handler.
pub struct CortexM;

impl Boot for CortexM {
    unsafe fn boot(vector_table: *const u32) -> ! {
        let base = vector_table as usize as u32;

        unsafe { (*SCB::PTR).vtor.write(base & VTOR_TBLOFF_MASK) };

        cortex_m::asm::dsb();
        cortex_m::asm::isb();

        unsafe { cortex_m::asm::bootload(vector_table) }
    }
}
