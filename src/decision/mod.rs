//! Deciding on every reset whether to stay in the bootloader or boot an application.
//!
//! The decision hinges on the reset cause and on a marker word that survives a warm reset:
//!
//! * A power-on reset always attempts the application.
//! * A warm reset with [`MAGIC`] in the marker is the second tap of a double tap, or a request by
//!   the application, and stays in the bootloader.
//! * Any other warm reset arms the marker for a short window, so a second reset within that window
//!   lands in the bootloader.
//!
//! No matter what, an application whose reset vector points outside of flash is never booted.

#[cfg(feature = "cortex_m")]
pub mod marker;

use crate::{
    Board, Config, ResetCause,
    fmt::{debug, info, warn},
    memory::MemoryView,
};

/// Stay in the bootloader on the next warm reset.
pub const MAGIC: u32 = 0xf016_69ef;

/// A quick-boot window is running; the next warm reset boots the application right away.
pub const MAGIC_QUICK_BOOT: u32 = 0xf026_69ef;

/// Word in memory that survives a warm reset, but not a power-on reset.
pub trait ResetMarker {
    fn read(&self) -> u32;

    /// Store `value` with a single word-sized write.
    fn write(&mut self, value: u32);

    fn clear(&mut self) {
        self.write(0);
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BootDecisionError {
    /// The reset handler of the application lies outside of `[app_start, flash_end]`.
    InvalidApplicationVector,
}

/// Why the bootloader keeps control.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum StayReason {
    InvalidApplicationVector,
    DoubleTap,
    /// No registered module passed validation.
    NoValidImage,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
    EvaluatingResetCause,
    /// Waiting for either USB enumeration or the tick counter passing `horizon`.
    ArmedQuickBoot { horizon: u32 },
    StayInBootloader(StayReason),
    ProceedToBoot,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Decision {
    StayInBootloader(StayReason),
    ProceedToBoot,
}

/// Sanity check of the application reset handler, found at `app_start + 4`.
pub fn check_application_vector(
    flash: &MemoryView<'_>,
    config: &Config,
) -> Result<u32, BootDecisionError> {
    let vector = config
        .app_start
        .checked_add(4)
        .and_then(|addr| flash.read_u32_at(addr))
        .ok_or(BootDecisionError::InvalidApplicationVector)?;

    if vector < config.app_start || vector > config.flash_end {
        return Err(BootDecisionError::InvalidApplicationVector);
    }

    Ok(vector)
}

/// State machine run once per reset.
pub struct DecisionMachine<'a, B: Board, M: ResetMarker> {
    config: &'a Config,
    board: &'a mut B,
    marker: &'a mut M,
    application_vector: Result<u32, BootDecisionError>,
    state: State,
}

impl<'a, B: Board, M: ResetMarker> DecisionMachine<'a, B, M> {
    pub fn new(
        config: &'a Config,
        board: &'a mut B,
        marker: &'a mut M,
        application_vector: Result<u32, BootDecisionError>,
    ) -> Self {
        Self {
            config,
            board,
            marker,
            application_vector,
            state: State::EvaluatingResetCause,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Perform a single transition, returning the new state.
    ///
    /// Terminal states are returned unchanged.
    pub async fn step(&mut self) -> State {
        let next = match self.state {
            State::EvaluatingResetCause => self.evaluate().await,
            State::ArmedQuickBoot { horizon } => self.poll_quick_boot(horizon).await,
            terminal => terminal,
        };

        if next != self.state {
            debug!("decision: {} -> {}", self.state, next);
        }
        self.state = next;
        next
    }

    /// Run until a terminal state is reached.
    pub async fn run(mut self) -> Decision {
        loop {
            match self.step().await {
                State::StayInBootloader(reason) => return Decision::StayInBootloader(reason),
                State::ProceedToBoot => return Decision::ProceedToBoot,
                _ => {}
            }
        }
    }

    async fn evaluate(&mut self) -> State {
        // Read exactly once; everything below depends on this value only.
        let marker = self.marker.read();
        let cause = self.board.reset_cause();

        debug!("reset cause {}, marker {=u32:#x}", cause, marker);

        if cause == ResetCause::PowerOn {
            self.marker.clear();
        }

        if let Err(error) = self.application_vector {
            warn!("application vector: {}", error);
            return State::StayInBootloader(StayReason::InvalidApplicationVector);
        }

        if cause == ResetCause::PowerOn {
            return State::ProceedToBoot;
        }

        if marker == MAGIC {
            self.marker.clear();
            info!("double tap, staying in bootloader");
            return State::StayInBootloader(StayReason::DoubleTap);
        }

        if self.config.quick_boot && marker != MAGIC_QUICK_BOOT {
            self.marker.write(MAGIC_QUICK_BOOT);
            let horizon = self
                .board
                .ticks()
                .wrapping_add(self.config.quick_boot_horizon);
            return State::ArmedQuickBoot { horizon };
        }

        if self.config.double_tap && marker != MAGIC_QUICK_BOOT {
            // A reset during this delay will find the marker set.
            self.marker.write(MAGIC);
            self.board.delay_ms(self.config.settle_delay_ms).await;
        }

        self.marker.clear();
        State::ProceedToBoot
    }

    async fn poll_quick_boot(&mut self, horizon: u32) -> State {
        // Whichever comes first, USB enumeration or the horizon, ends the window.
        let usb = self.board.is_usb_enumerated();
        if usb || self.board.ticks().wrapping_sub(horizon) as i32 >= 0 {
            if usb {
                info!("usb enumerated, leaving quick-boot window");
            }
            self.marker.clear();
            return State::ProceedToBoot;
        }

        self.board.delay_ms(1).await;
        State::ArmedQuickBoot { horizon }
    }
}

/// Run the decision state machine for this reset.
pub async fn decide<B: Board, M: ResetMarker>(
    config: &Config,
    flash: &MemoryView<'_>,
    board: &mut B,
    marker: &mut M,
) -> Decision {
    let application_vector = check_application_vector(flash, config);
    DecisionMachine::new(config, board, marker, application_vector)
        .run()
        .await
}
