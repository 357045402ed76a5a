//! Configuration validation.

use crate::error::{ConfigError, Error, Result};

use super::axis::AxisConfig;
use super::system::SystemConfig;

/// Validate a complete system configuration.
///
/// # Errors
///
/// Returns the first `ConfigError` found.
pub fn validate_config(config: &SystemConfig) -> Result<()> {
    for (_, axis) in config.axes.iter() {
        validate_axis(axis)?;
    }

    // Axis numbers identify physical degrees of freedom; no sharing.
    for (i, (_, a)) in config.axes.iter().enumerate() {
        for (_, b) in config.axes.iter().skip(i + 1) {
            if a.axis_number == b.axis_number {
                return Err(Error::Config(ConfigError::DuplicateAxisNumber(
                    a.axis_number,
                )));
            }
        }
    }

    Ok(())
}

/// Validate a single axis configuration.
pub fn validate_axis(axis: &AxisConfig) -> Result<()> {
    if axis.axis_number < 1 || axis.axis_number > 9 {
        return Err(Error::Config(ConfigError::InvalidAxisNumber(
            axis.axis_number,
        )));
    }

    if !(axis.steps_per_measure > 0.0) {
        return Err(Error::Config(ConfigError::InvalidStepsPerMeasure(
            axis.steps_per_measure,
        )));
    }

    if !(axis.frequency_slew.value() > 0.0) {
        return Err(Error::Config(ConfigError::InvalidSlewFrequency(
            axis.frequency_slew.value(),
        )));
    }

    if !(axis.acceleration.value() > 0.0) {
        return Err(Error::Config(ConfigError::InvalidAcceleration(
            axis.acceleration.value(),
        )));
    }

    if let Some(limits) = &axis.limits {
        if !limits.is_valid() {
            return Err(Error::Config(ConfigError::InvalidSoftLimits {
                min: limits.min.value(),
                max: limits.max.value(),
            }));
        }
    }

    if let Some(stepdir) = &axis.stepdir {
        if let Some(slewing) = stepdir.microsteps_slewing {
            if slewing.value() > stepdir.microsteps.value() {
                return Err(Error::Config(ConfigError::InvalidSlewingMicrosteps {
                    tracking: stepdir.microsteps.value(),
                    slewing: slewing.value(),
                }));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::units::{MeasurePerSec, MeasurePerSecSq, Microsteps};
    use crate::config::{StepDirConfig, StepWaveform};

    fn valid_axis() -> AxisConfig {
        AxisConfig {
            name: heapless::String::try_from("ra").unwrap(),
            axis_number: 1,
            steps_per_measure: 11378.0,
            reverse: false,
            limits: None,
            backlash_steps: 0,
            backlash_frequency: MeasurePerSec(0.05),
            frequency_min: MeasurePerSec(0.0),
            frequency_max: None,
            frequency_slew: MeasurePerSec(0.5),
            acceleration: MeasurePerSecSq(0.5),
            abort_acceleration: None,
            stepdir: None,
        }
    }

    #[test]
    fn test_valid_axis() {
        assert!(validate_axis(&valid_axis()).is_ok());
    }

    #[test]
    fn test_axis_number_range() {
        let mut axis = valid_axis();
        axis.axis_number = 0;
        assert!(validate_axis(&axis).is_err());
        axis.axis_number = 10;
        assert!(validate_axis(&axis).is_err());
        axis.axis_number = 9;
        assert!(validate_axis(&axis).is_ok());
    }

    #[test]
    fn test_steps_per_measure_positive() {
        let mut axis = valid_axis();
        axis.steps_per_measure = 0.0;
        assert!(validate_axis(&axis).is_err());
        axis.steps_per_measure = -10.0;
        assert!(validate_axis(&axis).is_err());
    }

    #[test]
    fn test_slewing_microsteps_not_finer_than_tracking() {
        let mut axis = valid_axis();
        axis.stepdir = Some(StepDirConfig {
            microsteps: Microsteps::HALF,
            microsteps_slewing: Some(Microsteps::SIXTEENTH),
            waveform: StepWaveform::Square,
        });
        assert!(validate_axis(&axis).is_err());
    }
}
