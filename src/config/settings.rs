//! Derived axis settings computed from configuration.

use super::axis::AxisConfig;
use super::limits::SoftLimits;
use super::units::{Measure, Steps};

/// Runtime axis parameters computed once at initialization.
#[derive(Debug, Clone)]
pub struct AxisSettings {
    /// Axis number, 1..=9.
    pub axis_number: u8,

    /// Steps per measure (radian or micron).
    pub steps_per_measure: f32,

    /// Invert the direction sense of the axis.
    pub reverse: bool,

    /// Soft limits in measures (if configured).
    pub limits: Option<SoftLimits>,

    /// Backlash amount in steps.
    pub backlash_steps: u32,

    /// Rate while taking up backlash, measures/sec.
    pub backlash_frequency: f32,

    /// Minimum slew frequency, measures/sec.
    pub frequency_min: f32,

    /// Maximum frequency, measures/sec.
    pub frequency_max: f32,

    /// Default slew frequency, measures/sec.
    pub frequency_slew: f32,

    /// Slew acceleration, measures/sec².
    pub acceleration: f32,

    /// Emergency deceleration, measures/sec²; at least 2× `acceleration`.
    pub abort_acceleration: f32,
}

impl AxisSettings {
    /// Compute runtime settings from an axis configuration.
    pub fn from_config(config: &AxisConfig) -> Self {
        let acceleration = config.acceleration.value();
        // The emergency ramp must out-brake the normal one.
        let abort_acceleration = config
            .abort_acceleration
            .map(|a| a.value())
            .unwrap_or(0.0)
            .max(2.0 * acceleration);
        let frequency_slew = config.frequency_slew.value();
        let frequency_max = config
            .frequency_max
            .map(|f| f.value())
            .unwrap_or(frequency_slew);

        Self {
            axis_number: config.axis_number,
            steps_per_measure: config.steps_per_measure,
            reverse: config.reverse,
            limits: config.limits.clone(),
            backlash_steps: config.backlash_steps,
            backlash_frequency: config.backlash_frequency.value(),
            frequency_min: config.frequency_min.value(),
            frequency_max,
            frequency_slew,
            acceleration,
            abort_acceleration,
        }
    }

    /// Convert measures to steps.
    #[inline]
    pub fn measure_to_steps(&self, measure: Measure) -> Steps {
        Steps::from_measure(measure, self.steps_per_measure)
    }

    /// Convert steps to measures.
    #[inline]
    pub fn steps_to_measure(&self, steps: Steps) -> Measure {
        steps.to_measure(self.steps_per_measure)
    }

    /// Convert measures/sec to steps/sec.
    #[inline]
    pub fn frequency_to_steps(&self, measures_per_sec: f32) -> f32 {
        measures_per_sec * self.steps_per_measure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::units::{MeasurePerSec, MeasurePerSecSq};

    fn make_test_config() -> AxisConfig {
        AxisConfig {
            name: heapless::String::try_from("test").unwrap(),
            axis_number: 1,
            steps_per_measure: 12800.0,
            reverse: false,
            limits: None,
            backlash_steps: 0,
            backlash_frequency: MeasurePerSec(0.05),
            frequency_min: MeasurePerSec(0.0),
            frequency_max: None,
            frequency_slew: MeasurePerSec(2.0),
            acceleration: MeasurePerSecSq(1.0),
            abort_acceleration: None,
            stepdir: None,
        }
    }

    #[test]
    fn test_abort_defaults_to_twice_acceleration() {
        let settings = AxisSettings::from_config(&make_test_config());
        assert_eq!(settings.abort_acceleration, 2.0);
    }

    #[test]
    fn test_abort_clamped_to_twice_acceleration() {
        let mut config = make_test_config();
        config.abort_acceleration = Some(MeasurePerSecSq(1.5));
        let settings = AxisSettings::from_config(&config);
        assert_eq!(settings.abort_acceleration, 2.0);

        config.abort_acceleration = Some(MeasurePerSecSq(5.0));
        let settings = AxisSettings::from_config(&config);
        assert_eq!(settings.abort_acceleration, 5.0);
    }

    #[test]
    fn test_frequency_max_defaults_to_slew() {
        let settings = AxisSettings::from_config(&make_test_config());
        assert_eq!(settings.frequency_max, 2.0);
    }

    #[test]
    fn test_measure_conversions() {
        let settings = AxisSettings::from_config(&make_test_config());
        assert_eq!(settings.measure_to_steps(Measure(1.0)).value(), 12800);
        assert!((settings.frequency_to_steps(2.0) - 25600.0).abs() < 0.01);
    }
}
