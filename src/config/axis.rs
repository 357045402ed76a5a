//! Axis configuration from TOML.

use heapless::String;
use serde::Deserialize;

use super::limits::SoftLimits;
use super::units::{MeasurePerSec, MeasurePerSecSq, Microsteps};

/// Step pin waveform synthesized by a step/direction driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepWaveform {
    /// Alternate set/clear on successive timer ticks. Halves the usable
    /// frequency per tick but tolerates slow driver inputs.
    #[default]
    Square,
    /// Set then immediately clear on each tick.
    Pulse,
}

/// Complete axis configuration from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct AxisConfig {
    /// Human-readable name (max 32 chars).
    pub name: String<32>,

    /// Axis number, 1..=9 (1/2 = RA/Dec or Az/Alt, 3 = rotator, 4+ = focusers).
    pub axis_number: u8,

    /// Steps per measure (per radian for rotary axes, per micron for linear).
    pub steps_per_measure: f32,

    /// Invert the direction sense of the axis.
    #[serde(default)]
    pub reverse: bool,

    /// Optional soft limits in measures.
    #[serde(default)]
    pub limits: Option<SoftLimits>,

    /// Backlash amount in steps.
    #[serde(default)]
    pub backlash_steps: u32,

    /// Rate used while taking up backlash, measures/sec.
    #[serde(default = "default_backlash_frequency", rename = "backlash_frequency_per_sec")]
    pub backlash_frequency: MeasurePerSec,

    /// Minimum slew frequency, measures/sec.
    #[serde(default, rename = "frequency_min_per_sec")]
    pub frequency_min: MeasurePerSec,

    /// Maximum frequency the axis will ever be driven at, measures/sec.
    /// Defaults to the slew frequency.
    #[serde(default, rename = "frequency_max_per_sec")]
    pub frequency_max: Option<MeasurePerSec>,

    /// Default slew frequency, measures/sec.
    #[serde(rename = "frequency_slew_per_sec")]
    pub frequency_slew: MeasurePerSec,

    /// Slew acceleration, measures/sec².
    #[serde(rename = "acceleration_per_sec2")]
    pub acceleration: MeasurePerSecSq,

    /// Emergency deceleration, measures/sec². Defaults to (and is clamped
    /// to at least) twice the slew acceleration.
    #[serde(default, rename = "abort_acceleration_per_sec2")]
    pub abort_acceleration: Option<MeasurePerSecSq>,

    /// Step/direction driver settings. Absent for servo axes.
    #[serde(default)]
    pub stepdir: Option<StepDirConfig>,
}

fn default_backlash_frequency() -> MeasurePerSec {
    MeasurePerSec(0.0)
}

/// Step/direction driver settings for one axis.
#[derive(Debug, Clone, Deserialize)]
pub struct StepDirConfig {
    /// Microstep divisor while tracking (fine).
    pub microsteps: Microsteps,

    /// Microstep divisor while slewing (coarse). Defaults to the tracking
    /// divisor, which disables mode switching.
    #[serde(default)]
    pub microsteps_slewing: Option<Microsteps>,

    /// Step pin waveform.
    #[serde(default)]
    pub waveform: StepWaveform,
}

impl StepDirConfig {
    /// Microstep ratio between tracking and slewing modes.
    ///
    /// Both divisors are powers of two, so the ratio is always integral.
    pub fn microstep_ratio(&self) -> u16 {
        let slewing = self.microsteps_slewing.unwrap_or(self.microsteps);
        self.microsteps.value() / slewing.value().max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_microstep_ratio() {
        let config = StepDirConfig {
            microsteps: Microsteps::SIXTEENTH,
            microsteps_slewing: Some(Microsteps::HALF),
            waveform: StepWaveform::Square,
        };
        assert_eq!(config.microstep_ratio(), 8);
    }

    #[test]
    fn test_microstep_ratio_defaults_to_one() {
        let config = StepDirConfig {
            microsteps: Microsteps::SIXTEENTH,
            microsteps_slewing: None,
            waveform: StepWaveform::Pulse,
        };
        assert_eq!(config.microstep_ratio(), 1);
    }
}
