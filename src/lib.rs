//! # optosigma-shot
//!
//! Serial protocol core for OptoSigma SHOT-series stage controllers.
//!
//! ## Features
//!
//! - **Profiles**: closed catalogs of controllers and stages, plus custom
//!   profiles with the same fields
//! - **Pure codec**: request frames and replies are plain bytes, testable
//!   against literal fixtures
//! - **Per-axis state machine**: Idle, CommandSent, Acked, Moving, Nacked,
//!   Faulted
//! - **Bounded waits**: status polling through embedded-hal 1.0 `DelayNs`,
//!   capped by a motion timeout
//! - **no_std compatible**: the core works without the standard library
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use optosigma_shot::{ControllerModel, SerialSettings, Session, StageModel, Unit};
//! use optosigma_shot::transport::{SerialConnector, StdDelay};
//!
//! let mut session = Session::new(ControllerModel::Shot302Gs, SerialConnector::new(), StdDelay)?;
//! session.append_stage(StageModel::Sgsp46_500)?;
//! session.append_stage(StageModel::Sgsp60Yaw)?;
//! session.connect(&SerialSettings::new("/dev/ttyUSB0"))?;
//!
//! session.move_axis(0, 12.5, Unit::Millimeters)?;
//! session.home(1)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): TOML configuration loading and the simulated controller
//! - `serialport`: real serial ports through the `serialport` crate
//! - `defmt`: `defmt::Format` on the public enums for embedded targets

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow large error types - necessary for no_std with heapless strings
#![allow(clippy::result_large_err)]

// Core modules
pub mod codec;
pub mod config;
pub mod error;
pub mod profile;
pub mod session;
pub mod transport;

/// Maximum number of axes any controller profile may declare.
pub const MAX_AXES: usize = 8;

// Re-exports for ergonomic API
pub use codec::{Codec, Direction, Excitation, ResponseOutcome, Selector, StatusReport};
pub use config::{validate_config, SerialSettings, SessionConfig};
pub use error::{Error, Result};
pub use profile::{
    ControllerModel, ControllerProfile, ControllerSpec, StageModel, StageProfile, StageSpec,
};
pub use session::{state, Axis, MotionState, Session, SessionBuilder};

// Configuration loading (std only)
#[cfg(feature = "std")]
pub use config::{load_config, parse_config};

// Unit types
pub use profile::units::{Pulses, Speed, SpeedTier, StageKind, Unit};
