//! Profile module for optosigma-shot.
//!
//! Static descriptions of controllers and stages: a closed catalog of known
//! models plus a custom variant carrying the same fields.

mod controller;
mod stage;
pub mod units;

pub use controller::{ControllerModel, ControllerProfile, ControllerSpec, Grammar, MAX_BAUD_RATES};
pub use stage::{StageModel, StageProfile, StageSpec, DEFAULT_DIVISION, SUPPORTED_DIVISIONS};

// Re-export unit types at profile level
pub use units::{Pulses, Speed, SpeedRanges, SpeedTier, StageKind, Unit};

/// Copy a name into a bounded string, truncating at capacity.
pub(crate) fn bounded<const N: usize>(name: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in name.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
