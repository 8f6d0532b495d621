//! Stage profiles: the catalog of known stage models plus custom stages.

use core::fmt;

use heapless::String;
use serde::{Deserialize, Deserializer};

use super::units::{Pulses, SpeedTier, StageKind, MAX_PULSES};
use crate::error::ConfigError;

/// Micro-step division the controllers ship with.
///
/// Stage resolutions and travel limits are stated for this division and
/// scaled to the division an axis actually runs at.
pub const DEFAULT_DIVISION: u16 = 2;

/// Micro-step divisions the SHOT controllers accept.
pub const SUPPORTED_DIVISIONS: [u16; 15] =
    [1, 2, 4, 5, 8, 10, 20, 25, 40, 50, 80, 100, 125, 200, 250];

/// Travel of gonio stages either side of the origin, in degrees.
const GONIO_TRAVEL_DEG: f64 = 20.0;

/// Fully resolved description of a stage.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StageSpec {
    /// Model identifier (max 32 chars).
    pub name: String<32>,

    /// Linear, rotation, or gonio.
    pub kind: StageKind,

    /// Pulses per millimeter (linear) or per degree (rotation, gonio), at
    /// [`DEFAULT_DIVISION`].
    pub pulses_per_unit: f64,

    /// Lowest reachable position in pulses, at [`DEFAULT_DIVISION`].
    pub min_travel: Pulses,

    /// Highest reachable position in pulses, at [`DEFAULT_DIVISION`].
    pub max_travel: Pulses,

    /// Speed applied before the first move on an axis.
    #[serde(default)]
    pub default_speed: SpeedTier,
}

impl StageSpec {
    /// Create and validate a stage spec.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolution is not positive or the travel range
    /// is empty.
    pub fn new(
        name: &str,
        kind: StageKind,
        pulses_per_unit: f64,
        min_travel: Pulses,
        max_travel: Pulses,
        default_speed: SpeedTier,
    ) -> Result<Self, ConfigError> {
        let spec = Self {
            name: super::bounded(name),
            kind,
            pulses_per_unit,
            min_travel,
            max_travel,
            default_speed,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Check resolution and travel limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // NaN fails this comparison too
        if !(self.pulses_per_unit > 0.0) || !self.pulses_per_unit.is_finite() {
            return Err(ConfigError::InvalidResolution(self.pulses_per_unit));
        }
        if self.min_travel >= self.max_travel {
            return Err(ConfigError::InvalidTravel {
                min: self.min_travel.0,
                max: self.max_travel.0,
            });
        }
        Ok(())
    }

    /// Check if a position lies within the travel limits.
    #[inline]
    pub fn contains(&self, position: Pulses) -> bool {
        position >= self.min_travel && position <= self.max_travel
    }

    /// Convert a position to millimeters or degrees.
    #[inline]
    pub fn to_physical(&self, position: Pulses) -> f64 {
        position.to_physical(self.pulses_per_unit)
    }

    /// Pulses per millimeter or degree at a micro-step division.
    #[inline]
    pub fn pulses_per_unit_at(&self, division: u16) -> f64 {
        self.pulses_per_unit * f64::from(division) / f64::from(DEFAULT_DIVISION)
    }

    /// Travel limits `(min, max)` in pulses at a micro-step division.
    ///
    /// Scaled limits are capped to the controller position register.
    pub fn travel_at(&self, division: u16) -> (Pulses, Pulses) {
        let scale = |p: Pulses| {
            let scaled = p.0.saturating_mul(i64::from(division)) / i64::from(DEFAULT_DIVISION);
            Pulses(scaled.clamp(-MAX_PULSES, MAX_PULSES))
        };
        (scale(self.min_travel), scale(self.max_travel))
    }
}

/// Known stage models.
///
/// OSMS models share dimensions and resolution with the SGSP model of the
/// same size and are accepted as aliases by [`StageModel::from_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum StageModel {
    // Linear translation stages
    Sgsp15_10,
    Sgsp20_20,
    Sgsp20_35,
    Sgsp20_85,
    Sgsp26_50,
    Sgsp26_100,
    Sgsp26_150,
    Sgsp26_200,
    Sgsp33_50,
    Sgsp33_100,
    Sgsp33_200,
    Sgsp46_300,
    Sgsp46_400,
    Sgsp46_500,
    Sgsp46_800,
    Sgsp65_1200,
    Sgsp65_1500,
    Hst50,
    Hst100,
    Hst200,
    Hps60_20,
    Tamm40_10,
    // Rotation stages
    Sgsp40Yaw,
    Sgsp60Yaw,
    Sgsp80Yaw,
    Sgsp120Yaw,
    Sgsp160Yaw,
    Hst120Yaw,
    // Gonio stages
    Sgsp60A75,
    Sgsp60A100,
    Sgsp60A130,
}

/// Catalog row: name, kind, full-step resolution (um or millidegree per
/// pulse), stroke in mm (linear only), default speed.
struct Entry(&'static str, StageKind, u32, u32, SpeedTier);

impl StageModel {
    /// Every catalog model.
    pub const ALL: [StageModel; 31] = [
        StageModel::Sgsp15_10,
        StageModel::Sgsp20_20,
        StageModel::Sgsp20_35,
        StageModel::Sgsp20_85,
        StageModel::Sgsp26_50,
        StageModel::Sgsp26_100,
        StageModel::Sgsp26_150,
        StageModel::Sgsp26_200,
        StageModel::Sgsp33_50,
        StageModel::Sgsp33_100,
        StageModel::Sgsp33_200,
        StageModel::Sgsp46_300,
        StageModel::Sgsp46_400,
        StageModel::Sgsp46_500,
        StageModel::Sgsp46_800,
        StageModel::Sgsp65_1200,
        StageModel::Sgsp65_1500,
        StageModel::Hst50,
        StageModel::Hst100,
        StageModel::Hst200,
        StageModel::Hps60_20,
        StageModel::Tamm40_10,
        StageModel::Sgsp40Yaw,
        StageModel::Sgsp60Yaw,
        StageModel::Sgsp80Yaw,
        StageModel::Sgsp120Yaw,
        StageModel::Sgsp160Yaw,
        StageModel::Hst120Yaw,
        StageModel::Sgsp60A75,
        StageModel::Sgsp60A100,
        StageModel::Sgsp60A130,
    ];

    const fn entry(self) -> Entry {
        use SpeedTier::{High, Low, Medium};
        use StageKind::{Gonio, Linear, Rotation};
        match self {
            StageModel::Sgsp15_10 => Entry("SGSP15-10", Linear, 2, 10, Low),
            StageModel::Sgsp20_20 => Entry("SGSP20-20", Linear, 2, 20, Low),
            StageModel::Sgsp20_35 => Entry("SGSP20-35", Linear, 2, 35, Low),
            StageModel::Sgsp20_85 => Entry("SGSP20-85", Linear, 2, 85, Medium),
            StageModel::Sgsp26_50 => Entry("SGSP26-50", Linear, 4, 50, Medium),
            StageModel::Sgsp26_100 => Entry("SGSP26-100", Linear, 4, 100, Medium),
            StageModel::Sgsp26_150 => Entry("SGSP26-150", Linear, 4, 150, Medium),
            StageModel::Sgsp26_200 => Entry("SGSP26-200", Linear, 4, 200, Medium),
            StageModel::Sgsp33_50 => Entry("SGSP33-50", Linear, 12, 50, Medium),
            StageModel::Sgsp33_100 => Entry("SGSP33-100", Linear, 12, 100, Medium),
            StageModel::Sgsp33_200 => Entry("SGSP33-200", Linear, 12, 200, Medium),
            StageModel::Sgsp46_300 => Entry("SGSP46-300", Linear, 20, 300, High),
            StageModel::Sgsp46_400 => Entry("SGSP46-400", Linear, 20, 400, High),
            StageModel::Sgsp46_500 => Entry("SGSP46-500", Linear, 20, 500, High),
            StageModel::Sgsp46_800 => Entry("SGSP46-800", Linear, 20, 800, High),
            StageModel::Sgsp65_1200 => Entry("SGSP65-1200", Linear, 50, 1200, High),
            StageModel::Sgsp65_1500 => Entry("SGSP65-1500", Linear, 50, 1500, High),
            StageModel::Hst50 => Entry("HST-50", Linear, 4, 50, Medium),
            StageModel::Hst100 => Entry("HST-100", Linear, 4, 100, Medium),
            StageModel::Hst200 => Entry("HST-200", Linear, 4, 200, Medium),
            StageModel::Hps60_20 => Entry("HPS60-20", Linear, 2, 20, Low),
            StageModel::Tamm40_10 => Entry("TAMM40-10", Linear, 2, 10, Low),
            StageModel::Sgsp40Yaw => Entry("SGSP-40YAW", Rotation, 5, 0, Medium),
            StageModel::Sgsp60Yaw => Entry("SGSP-60YAW", Rotation, 5, 0, Medium),
            StageModel::Sgsp80Yaw => Entry("SGSP-80YAW", Rotation, 5, 0, Medium),
            StageModel::Sgsp120Yaw => Entry("SGSP-120YAW", Rotation, 5, 0, Medium),
            StageModel::Sgsp160Yaw => Entry("SGSP-160YAW", Rotation, 5, 0, Medium),
            StageModel::Hst120Yaw => Entry("HST-120YAW", Rotation, 5, 0, Medium),
            StageModel::Sgsp60A75 => Entry("SGSP-60A75", Gonio, 2, 0, Low),
            StageModel::Sgsp60A100 => Entry("SGSP-60A100", Gonio, 1, 0, Low),
            StageModel::Sgsp60A130 => Entry("SGSP-60A130", Gonio, 1, 0, Low),
        }
    }

    /// Catalog name, e.g. `"SGSP46-800"`.
    pub const fn name(self) -> &'static str {
        self.entry().0
    }

    /// Stage kind.
    pub const fn kind(self) -> StageKind {
        self.entry().1
    }

    /// Full-step resolution in micrometers (linear) or millidegrees per pulse.
    pub const fn full_step_resolution(self) -> u32 {
        self.entry().2
    }

    /// Pulses per millimeter or degree at [`DEFAULT_DIVISION`].
    pub fn pulses_per_unit(self) -> f64 {
        1000.0 * DEFAULT_DIVISION as f64 / self.full_step_resolution() as f64
    }

    /// Look up a model by catalog name.
    ///
    /// Matching ignores ASCII case, `-`/`_` separators, and accepts the OSMS
    /// prefix in place of SGSP for linear stages.
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = normalize(name);
        let alias = wanted.starts_with("OSMS");
        let key = if alias {
            let mut s: String<32> = String::new();
            s.push_str("SGSP").ok()?;
            s.push_str(&wanted[4..]).ok()?;
            s
        } else {
            wanted
        };
        Self::ALL
            .iter()
            .copied()
            .find(|m| normalize(m.name()) == key)
            .filter(|m| !alias || m.kind() == StageKind::Linear)
    }

    /// Resolve to a full spec.
    pub fn spec(self) -> StageSpec {
        let Entry(name, kind, _, stroke_mm, tier) = self.entry();
        let ppu = self.pulses_per_unit();
        let half = match kind {
            StageKind::Linear => libm::round(stroke_mm as f64 / 2.0 * ppu) as i64,
            StageKind::Rotation => MAX_PULSES,
            StageKind::Gonio => libm::round(GONIO_TRAVEL_DEG * ppu) as i64,
        };
        StageSpec {
            name: super::bounded(name),
            kind,
            pulses_per_unit: ppu,
            min_travel: Pulses(-half),
            max_travel: Pulses(half),
            default_speed: tier,
        }
    }
}

impl fmt::Display for StageModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl<'de> Deserialize<'de> for StageModel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::<32>::deserialize(deserializer)?;
        StageModel::from_name(&name).ok_or_else(|| {
            serde::de::Error::custom(UnknownName(name.as_str()))
        })
    }
}

/// Display helper for unknown model names in serde errors.
pub(crate) struct UnknownName<'a>(pub &'a str);

impl fmt::Display for UnknownName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown model '{}'", self.0)
    }
}

/// Upper-case a model name and drop separators.
pub(crate) fn normalize(name: &str) -> String<32> {
    let mut out = String::new();
    for c in name.chars().filter(|c| *c != '-' && *c != '_' && *c != ' ') {
        if out.push(c.to_ascii_uppercase()).is_err() {
            break;
        }
    }
    out
}

/// Stage bound to an axis: a catalog model or a custom description.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StageProfile {
    /// Catalog model, by name.
    Known(StageModel),
    /// Caller-supplied stage.
    Custom(StageSpec),
}

impl StageProfile {
    /// Resolve and validate into a spec.
    ///
    /// # Errors
    ///
    /// Returns an error if a custom spec fails validation.
    pub fn resolve(&self) -> Result<StageSpec, ConfigError> {
        match self {
            StageProfile::Known(model) => Ok(model.spec()),
            StageProfile::Custom(spec) => {
                spec.validate()?;
                Ok(spec.clone())
            }
        }
    }

    /// Profile name.
    pub fn name(&self) -> &str {
        match self {
            StageProfile::Known(model) => model.name(),
            StageProfile::Custom(spec) => spec.name.as_str(),
        }
    }
}

impl From<StageModel> for StageProfile {
    fn from(model: StageModel) -> Self {
        StageProfile::Known(model)
    }
}

impl From<StageSpec> for StageProfile {
    fn from(spec: StageSpec) -> Self {
        StageProfile::Custom(spec)
    }
}
