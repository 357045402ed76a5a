//! Motor drivers.
//!
//! Two driver variants share one contract: step/direction pulse generation
//! ([`StepDirDriver`]) and PID-controlled servo power ([`ServoDriver`]).
//! Both convert a signed steps-per-second frequency into motion of the
//! shared step counters; the step routine is the ISR body the scheduler (or
//! a delegated hardware timer) invokes.

mod position;
mod servo;
mod stepdir;

pub use position::{MotionCounters, SharedCounters};
pub use servo::{Encoder, ServoDriver, ServoGains};
pub use stepdir::{MicrostepModeControl, StepDirDriver};

use crate::scheduler::SubMicros;

/// Direction of axis travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Not moving.
    #[default]
    None,
    /// Toward increasing step counts.
    Forward,
    /// Toward decreasing step counts.
    Reverse,
}

impl Direction {
    /// Step sign for this direction.
    #[inline]
    pub fn sign(self) -> i64 {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => -1,
            Direction::None => 0,
        }
    }
}

/// Status of one driver output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputStatus {
    /// Open load detected.
    pub open_load: bool,
    /// Short to ground detected.
    pub short_to_ground: bool,
}

/// Driver fault/status working copy.
///
/// Populated from whatever the driver hardware reports (fault pin, SPI
/// status registers); this crate only holds the in-memory copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverStatus {
    /// Status of output A.
    pub output_a: OutputStatus,
    /// Status of output B.
    pub output_b: OutputStatus,
    /// Over-temperature shutdown.
    pub over_temperature: bool,
    /// Over-temperature pre-warning.
    pub over_temperature_warning: bool,
    /// Motor standstill detected.
    pub standstill: bool,
    /// Hard fault; any active motion is aborted through the deceleration
    /// path, never instantaneously.
    pub fault: bool,
}

/// Common contract over the step/dir and servo driver variants.
pub trait MotorDriver {
    /// Power the motor output on or off.
    fn power(&mut self, enabled: bool);

    /// Whether the motor output is powered.
    fn is_powered(&self) -> bool;

    /// Command a signed frequency in steps/second.
    ///
    /// Frequencies implying a step period outside the representable timing
    /// range are treated as stopped (frequency forced to 0).
    fn set_frequency_steps(&mut self, frequency: f32);

    /// The commanded frequency in steps/second.
    fn frequency_steps(&self) -> f32;

    /// Step-task period realizing the commanded frequency; zero when
    /// stopped.
    fn step_period(&self) -> SubMicros;

    /// Driver fault/status report.
    fn status(&self) -> DriverStatus;

    /// Set the backlash amount in steps.
    fn set_backlash_steps(&mut self, steps: u32);

    /// The backlash amount in steps.
    fn backlash_steps(&self) -> u32;

    /// Set the minimum step rate while taking up backlash, steps/second.
    fn set_backlash_frequency_steps(&mut self, frequency: f32);

    /// Whether backlash is currently being taken up.
    fn in_backlash(&self) -> bool;

    /// Atomic snapshot of the motion counters.
    fn counters(&self) -> MotionCounters;

    /// Overwrite the committed motor position (sync/park restore).
    fn set_motor_steps(&mut self, steps: i64);

    /// Set the target position in steps.
    fn set_target_steps(&mut self, steps: i64);

    /// When synchronized, the target advances automatically at the
    /// commanded frequency (tracking).
    fn set_synchronized(&mut self, synchronized: bool);

    /// Housekeeping at the axis poll cadence (microstep mode switching).
    fn poll(&mut self);

    /// The step routine: one ISR invocation advances the motor/backlash
    /// counters (and pins, for step/dir hardware) by one tick.
    fn step(&mut self);
}
