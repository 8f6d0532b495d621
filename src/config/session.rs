//! Session configuration - root configuration structure.

use heapless::Vec;
use serde::Deserialize;

use super::serial::SerialSettings;
use crate::profile::{ControllerProfile, StageProfile};
use crate::MAX_AXES;

/// Root configuration structure from TOML.
///
/// ```toml
/// controller = "SHOT-302GS"
/// stages = ["SGSP46-500", "SGSP-60YAW"]
///
/// [serial]
/// port = "/dev/ttyUSB0"
/// baud_rate = 38400
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionConfig {
    /// Controller model name, or a table describing a custom controller.
    pub controller: ControllerProfile,

    /// Stages in axis order.
    #[serde(default)]
    pub stages: Vec<StageProfile, MAX_AXES>,

    /// Connection settings.
    pub serial: SerialSettings,
}

impl SessionConfig {
    /// Stage names in axis order.
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.name())
    }
}
