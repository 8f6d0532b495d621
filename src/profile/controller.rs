//! Controller profiles: known SHOT-series models plus custom controllers.

use core::fmt;

use heapless::{String, Vec};
use serde::{Deserialize, Deserializer};

use super::stage::{normalize, UnknownName};
use super::units::SpeedRanges;
use crate::error::ConfigError;
use crate::MAX_AXES;

/// Maximum number of baud rates a controller profile may list.
pub const MAX_BAUD_RATES: usize = 8;

/// Response grammar and fixed tokens of a controller dialect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Grammar {
    /// Frame terminator appended to requests and ending every response.
    pub terminator: String<4>,
    /// Acknowledgement token.
    pub ack: String<8>,
    /// Rejection token, optionally followed by `,<code>`.
    pub nack: String<8>,
    /// Status query returning positions and flags.
    pub status_query: String<8>,
    /// Short query returning only the busy/ready token.
    pub ready_query: String<8>,
    /// Token reported while any axis is moving.
    pub busy: String<4>,
    /// Token reported when all axes are at rest.
    pub ready: String<4>,
    /// Axis selector addressing every axis at once.
    pub all_axes: char,
    /// Whether commands are answered with the ACK/NACK token.
    ///
    /// With the COMM/ACK switch set to SUB the controller answers queries
    /// only, and commands are written without reading a reply.
    pub command_replies: bool,
}

impl Grammar {
    /// Grammar of the SHOT controller family.
    pub fn shot() -> Self {
        Self {
            terminator: token("\r\n"),
            ack: token("OK"),
            nack: token("NG"),
            status_query: token("Q:"),
            ready_query: token("!:"),
            busy: token("B"),
            ready: token("R"),
            all_axes: 'W',
            command_replies: true,
        }
    }

    /// Check that no token is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tokens = [
            self.terminator.as_str(),
            self.ack.as_str(),
            self.nack.as_str(),
            self.status_query.as_str(),
            self.ready_query.as_str(),
            self.busy.as_str(),
            self.ready.as_str(),
        ];
        if tokens.iter().any(|t| t.is_empty()) || !self.all_axes.is_ascii_alphabetic() {
            return Err(ConfigError::EmptyToken);
        }
        Ok(())
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::shot()
    }
}

fn token<const N: usize>(s: &str) -> String<N> {
    String::try_from(s).unwrap_or_default()
}

/// Fully resolved description of a controller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ControllerSpec {
    /// Model identifier (max 32 chars).
    pub name: String<32>,

    /// Number of axes the controller drives.
    pub axis_count: u8,

    /// Baud rate used when the connect settings name none.
    pub baud_rate: u32,

    /// Baud rates the controller accepts. Empty means only `baud_rate`.
    #[serde(default)]
    pub supported_baud_rates: Vec<u32, MAX_BAUD_RATES>,

    /// Command and response grammar.
    #[serde(default)]
    pub grammar: Grammar,

    /// Whether several axes may start from one `W` frame.
    #[serde(default = "default_true")]
    pub combined_moves: bool,

    /// Whether the home-speed (`V:`) command exists.
    #[serde(default)]
    pub home_speed: bool,

    /// Ranges of the speed parameters.
    #[serde(default)]
    pub speed_ranges: SpeedRanges,
}

fn default_true() -> bool {
    true
}

impl ControllerSpec {
    /// Check axis count, baud rates, grammar, and speed ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.axis_count < 1 || self.axis_count as usize > MAX_AXES {
            return Err(ConfigError::InvalidAxisCount(self.axis_count));
        }
        if !self.supports_baud_rate(self.baud_rate) {
            return Err(ConfigError::UnsupportedBaudRate(self.baud_rate));
        }
        self.grammar.validate()?;
        self.speed_ranges.validate()
    }

    /// Check if a baud rate is accepted.
    pub fn supports_baud_rate(&self, baud: u32) -> bool {
        if self.supported_baud_rates.is_empty() {
            baud == self.baud_rate
        } else {
            self.supported_baud_rates.contains(&baud)
        }
    }

    /// Axis count as usize.
    #[inline]
    pub fn axes(&self) -> usize {
        self.axis_count as usize
    }
}

/// Known controller models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerModel {
    /// Two-axis SHOT-302GS.
    Shot302Gs,
    /// Four-axis SHOT-304GS.
    Shot304Gs,
    /// Two-axis SHOT-702.
    Shot702,
}

impl ControllerModel {
    /// Every catalog model.
    pub const ALL: [ControllerModel; 3] = [
        ControllerModel::Shot302Gs,
        ControllerModel::Shot304Gs,
        ControllerModel::Shot702,
    ];

    /// Catalog name, e.g. `"SHOT-702"`.
    pub const fn name(self) -> &'static str {
        match self {
            ControllerModel::Shot302Gs => "SHOT-302GS",
            ControllerModel::Shot304Gs => "SHOT-304GS",
            ControllerModel::Shot702 => "SHOT-702",
        }
    }

    /// Look up a model by name, ignoring case and separators.
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = normalize(name);
        Self::ALL
            .iter()
            .copied()
            .find(|m| normalize(m.name()) == wanted)
    }

    /// Resolve to a full spec.
    pub fn spec(self) -> ControllerSpec {
        let (axis_count, baud_rate, rates, home_speed): (u8, u32, &[u32], bool) = match self {
            ControllerModel::Shot302Gs => (2, 9600, &[4800, 9600, 19200, 38400], false),
            ControllerModel::Shot304Gs => (4, 9600, &[4800, 9600, 19200, 38400], false),
            ControllerModel::Shot702 => (2, 38400, &[38400], true),
        };
        ControllerSpec {
            name: super::bounded(self.name()),
            axis_count,
            baud_rate,
            supported_baud_rates: Vec::from_slice(rates).unwrap_or_default(),
            grammar: Grammar::shot(),
            combined_moves: true,
            home_speed,
            speed_ranges: SpeedRanges::SHOT,
        }
    }
}

impl fmt::Display for ControllerModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl<'de> Deserialize<'de> for ControllerModel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::<32>::deserialize(deserializer)?;
        ControllerModel::from_name(&name)
            .ok_or_else(|| serde::de::Error::custom(UnknownName(name.as_str())))
    }
}

/// Controller a session drives: a catalog model or a custom description.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ControllerProfile {
    /// Catalog model, by name.
    Known(ControllerModel),
    /// Caller-supplied controller.
    Custom(ControllerSpec),
}

impl ControllerProfile {
    /// Resolve and validate into a spec.
    ///
    /// # Errors
    ///
    /// Returns an error if a custom spec fails validation.
    pub fn resolve(&self) -> Result<ControllerSpec, ConfigError> {
        let spec = match self {
            ControllerProfile::Known(model) => model.spec(),
            ControllerProfile::Custom(spec) => spec.clone(),
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Profile name.
    pub fn name(&self) -> &str {
        match self {
            ControllerProfile::Known(model) => model.name(),
            ControllerProfile::Custom(spec) => spec.name.as_str(),
        }
    }
}

impl From<ControllerModel> for ControllerProfile {
    fn from(model: ControllerModel) -> Self {
        ControllerProfile::Known(model)
    }
}

impl From<ControllerSpec> for ControllerProfile {
    fn from(spec: ControllerSpec) -> Self {
        ControllerProfile::Custom(spec)
    }
}
