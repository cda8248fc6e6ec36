//! Summary of the last boot decision, kept for the monitor to report on.

use serde::{Deserialize, Serialize};

use crate::{
    decision::StayReason,
    registry::MAX_MODULES,
    validate::{ModuleError, ModuleStatus, ValidationReport},
};

#[cfg(feature = "simple_state")]
pub mod simple;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Outcome {
    /// Control was handed to the module with this id.
    Booted { module: u32 },
    Stayed(StayReason),
}

/// Record of a single boot decision.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct BootRecord {
    pub outcome: Outcome,

    /// Why each module was rejected, indexed by module id.
    ///
    /// All `None` when validation never ran, for example after a double tap.
    pub rejected: [Option<ModuleError>; MAX_MODULES],
}

impl BootRecord {
    pub const fn stayed(reason: StayReason) -> Self {
        Self {
            outcome: Outcome::Stayed(reason),
            rejected: [None; MAX_MODULES],
        }
    }

    pub fn from_report(report: &ValidationReport<'_>) -> Self {
        let mut rejected = [None; MAX_MODULES];
        for image in report.modules() {
            if let (ModuleStatus::Invalid(error), Some(slot)) =
                (image.status, rejected.get_mut(image.entry.id as usize))
            {
                *slot = Some(error);
            }
        }

        let outcome = match report.chosen() {
            Some(image) => Outcome::Booted {
                module: image.entry.id,
            },
            None => Outcome::Stayed(StayReason::NoValidImage),
        };

        Self { outcome, rejected }
    }

    /// Number of modules that failed validation.
    pub fn rejected_count(&self) -> usize {
        self.rejected.iter().filter(|r| r.is_some()).count()
    }

    pub const fn max_serialized_size() -> usize {
        // Outcome plus one optional error per module, each a handful of varint bytes.
        64
    }
}
