//! Glue between the boot decision, module validation and the control transfer.

use crate::{
    Board, Config, Status,
    boot::{self, Boot},
    decision::{self, Decision, ResetMarker, StayReason},
    fmt::info,
    memory::MemoryView,
    registry::BootModules,
    state::BootRecord,
    validate::{self, CertifiedImage},
};

/// What to do after this reset.
#[derive(Debug)]
pub enum Launch<'a> {
    Boot(CertifiedImage<'a>),
    Stay(StayReason),
}

/// Decide, and when booting, validate every module.
///
/// Signals [`Status::Leave`] when an image is about to be booted, [`Status::NoImage`] when the
/// decision was to boot but nothing passed validation.
pub async fn prepare<'a, B: Board, M: ResetMarker>(
    config: &Config,
    registry: &BootModules<'a>,
    flash: &MemoryView<'a>,
    board: &mut B,
    marker: &mut M,
) -> (Launch<'a>, BootRecord) {
    if let Decision::StayInBootloader(reason) =
        decision::decide(config, flash, board, marker).await
    {
        info!("staying in bootloader: {}", reason);
        return (Launch::Stay(reason), BootRecord::stayed(reason));
    }

    let report = validate::validate_all(registry, flash, config);
    let record = BootRecord::from_report(&report);

    match report.certify() {
        Some(image) => {
            board.signal_status(Status::Leave);
            (Launch::Boot(image), record)
        }
        None => {
            board.signal_status(Status::NoImage);
            (Launch::Stay(StayReason::NoValidImage), record)
        }
    }
}

/// Run the whole start-up sequence, returning only when the bootloader should keep control.
pub async fn start<T: Boot, B: Board, M: ResetMarker>(
    config: &Config,
    registry: &BootModules<'_>,
    flash: &MemoryView<'_>,
    board: &mut B,
    marker: &mut M,
) -> (StayReason, BootRecord) {
    match prepare(config, registry, flash, board, marker).await {
        (Launch::Boot(image), _) => boot::launch::<T>(image),
        (Launch::Stay(reason), record) => (reason, record),
    }
}
