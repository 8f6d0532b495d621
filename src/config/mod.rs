//! Configuration module for optosigma-shot.
//!
//! Provides the session configuration (controller, stages, serial settings)
//! loaded from TOML files (with `std` feature) or built in code.

mod serial;
mod session;
#[cfg(feature = "std")]
mod loader;
mod validation;

pub use serial::SerialSettings;
pub use session::SessionConfig;
pub use validation::validate_config;

#[cfg(feature = "std")]
pub use loader::{load_config, parse_config};
