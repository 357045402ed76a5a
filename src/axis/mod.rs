//! Axis motion orchestration.
//!
//! An [`Axis`] pairs a motor driver with optional home/limit sensors and
//! runs the slow control loop: acceleration ramps, soft-limit and fault
//! guards, homing sequences, and keeping the step-task period in sync with
//! the commanded frequency. The poll method is meant to run as a repeating
//! scheduler task at roughly 20 ms.

mod sense;

pub use sense::{LimitSense, NoSense, PinSense};

use libm::fabsf;

use crate::config::units::{Measure, MeasurePerSec, MeasurePerSecSq, Steps};
use crate::config::AxisSettings;
use crate::driver::{Direction, DriverStatus, MotorDriver};
use crate::error::{MotionError, Result};
use crate::scheduler::{HardwareTimers, Scheduler, SubMicros, TaskHandle};

/// Axis poll cadence in milliseconds.
pub const POLL_PERIOD_MS: u32 = 20;

const POLL_HZ: f32 = 1000.0 / POLL_PERIOD_MS as f32;

/// Sink for step-task period updates.
///
/// The axis does not own its scheduler; poll receives the timer through
/// this trait so the step task can be retimed without a circular borrow.
pub trait StepTimer {
    /// Reprogram the period of the given step task. Returns false when the
    /// handle is stale.
    fn set_step_period(&mut self, handle: TaskHandle, period: SubMicros) -> bool;
}

impl<C, H: HardwareTimers> StepTimer for Scheduler<C, H> {
    fn set_step_period(&mut self, handle: TaskHandle, period: SubMicros) -> bool {
        self.set_period_sub_micros(handle, period)
    }
}

/// Active automatic rate profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AutoRate {
    /// No automatic rate change.
    #[default]
    None,
    /// Accelerate toward the slew rate, forward.
    ByTimeForward,
    /// Accelerate toward the slew rate, reverse.
    ByTimeReverse,
    /// Rate follows the remaining distance to the target.
    ByDistance,
    /// Decelerate to a stop at the normal rate.
    ByTimeEnd,
    /// Decelerate to a stop at the abort rate.
    ByTimeAbort,
}

/// Homing sequence stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HomingStage {
    /// Not homing.
    #[default]
    None,
    /// First approach at the slew rate.
    Fast,
    /// Second approach at a quarter of the slew rate.
    Slow,
    /// Final approach at a sixteenth of the slew rate.
    Fine,
}

impl HomingStage {
    fn rate_divisor(self) -> f32 {
        match self {
            HomingStage::Fast => 1.0,
            HomingStage::Slow => 4.0,
            HomingStage::Fine => 16.0,
            HomingStage::None => 1.0,
        }
    }
}

/// One mount axis: driver, sensors, ramps and guards.
pub struct Axis<D, S = NoSense>
where
    D: MotorDriver,
    S: LimitSense,
{
    driver: D,
    sense: S,
    settings: AxisSettings,

    enabled: bool,
    tracking: bool,
    limits_enabled: bool,

    /// Base (tracking) frequency, measures/sec.
    freq_base: f32,
    freq_min: f32,
    freq_max: f32,
    freq_slew: f32,
    /// Normal ramp rate, measures/sec².
    slew_accel: f32,
    /// Emergency ramp rate, measures/sec², at least twice `slew_accel`.
    abort_accel: f32,

    /// Current ramp frequency, measures/sec, signed.
    freq: f32,
    /// Ramp ceiling for the active time-based slew.
    ramp_goal: f32,
    auto_rate: AutoRate,

    homing_stage: HomingStage,
    /// Home sensor state when the current stage started.
    home_origin: bool,

    /// By-distance profile: distance over which to taper, measures.
    slew_distance: f32,

    step_task: Option<TaskHandle>,
    last_freq_steps: f32,
    last_period: SubMicros,
}

impl<D, S> Axis<D, S>
where
    D: MotorDriver,
    S: LimitSense,
{
    /// Create an axis, pushing backlash settings into the driver.
    pub fn new(mut driver: D, settings: AxisSettings, sense: S) -> Self {
        driver.set_backlash_steps(settings.backlash_steps);
        driver.set_backlash_frequency_steps(settings.frequency_to_steps(settings.backlash_frequency));
        Self {
            enabled: false,
            tracking: false,
            limits_enabled: settings.limits.is_some(),
            freq_base: 0.0,
            freq_min: settings.frequency_min,
            freq_max: settings.frequency_max,
            freq_slew: settings.frequency_slew,
            slew_accel: settings.acceleration,
            abort_accel: settings.abort_acceleration,
            freq: 0.0,
            ramp_goal: 0.0,
            auto_rate: AutoRate::None,
            homing_stage: HomingStage::None,
            home_origin: false,
            slew_distance: 0.0,
            step_task: None,
            last_freq_steps: 0.0,
            last_period: SubMicros::ZERO,
            driver,
            sense,
            settings,
        }
    }

    /// The settings this axis was built from.
    pub fn settings(&self) -> &AxisSettings {
        &self.settings
    }

    /// Borrow the driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutably borrow the driver (step routines are invoked through this).
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Power the axis on or off. Powering off stops any slew immediately
    /// at the driver; the ramp state is cleared.
    pub fn enable(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.driver.power(enabled);
        if !enabled {
            self.freq = 0.0;
            self.auto_rate = AutoRate::None;
            self.homing_stage = HomingStage::None;
        }
    }

    /// Whether the axis is powered.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable sidereal-style tracking at the base frequency.
    /// While tracking, the driver target advances automatically.
    pub fn set_tracking(&mut self, tracking: bool) {
        self.tracking = tracking;
        self.driver.set_synchronized(tracking);
    }

    /// Whether tracking is enabled.
    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Enable or disable soft-limit checking.
    pub fn set_limits_enabled(&mut self, enabled: bool) {
        self.limits_enabled = enabled;
    }

    /// Set the base (tracking) frequency.
    pub fn set_frequency_base(&mut self, frequency: MeasurePerSec) {
        self.freq_base = frequency.value();
    }

    /// Set the minimum slew frequency.
    pub fn set_frequency_min(&mut self, frequency: MeasurePerSec) {
        self.freq_min = fabsf(frequency.value());
    }

    /// Set the maximum composite frequency.
    pub fn set_frequency_max(&mut self, frequency: MeasurePerSec) {
        self.freq_max = fabsf(frequency.value());
    }

    /// Set the slew frequency used by automatic slews.
    pub fn set_frequency_slew(&mut self, frequency: MeasurePerSec) {
        self.freq_slew = fabsf(frequency.value());
    }

    /// Set the normal acceleration rate. The abort rate is raised if
    /// needed so it stays at least twice this.
    pub fn set_slew_acceleration_rate(&mut self, rate: MeasurePerSecSq) {
        let rate = fabsf(rate.value());
        if rate > 0.0 {
            self.slew_accel = rate;
            self.abort_accel = self.abort_accel.max(2.0 * rate);
        }
    }

    /// Set the emergency deceleration rate, clamped to at least twice the
    /// normal acceleration.
    pub fn set_slew_acceleration_rate_abort(&mut self, rate: MeasurePerSecSq) {
        self.abort_accel = fabsf(rate.value()).max(2.0 * self.slew_accel);
    }

    /// Normal acceleration rate, measures/sec².
    pub fn slew_acceleration_rate(&self) -> MeasurePerSecSq {
        MeasurePerSecSq(self.slew_accel)
    }

    /// Emergency deceleration rate, measures/sec².
    pub fn slew_acceleration_rate_abort(&self) -> MeasurePerSecSq {
        MeasurePerSecSq(self.abort_accel)
    }

    /// Current ramp frequency (excluding the tracking base), measures/sec.
    pub fn frequency(&self) -> MeasurePerSec {
        MeasurePerSec(self.freq)
    }

    fn to_measure(&self, steps: i64) -> Measure {
        let m = self.settings.steps_to_measure(Steps(steps));
        if self.settings.reverse {
            Measure(-m.value())
        } else {
            m
        }
    }

    fn to_steps(&self, measure: Measure) -> i64 {
        let m = if self.settings.reverse {
            Measure(-measure.value())
        } else {
            measure
        };
        self.settings.measure_to_steps(m).value()
    }

    /// Overwrite the current position (sync, park restore).
    pub fn set_instrument_coordinate(&mut self, coordinate: Measure) {
        let steps = self.to_steps(coordinate);
        self.driver.set_motor_steps(steps);
    }

    /// Current position in measures.
    pub fn instrument_coordinate(&self) -> Measure {
        self.to_measure(self.driver.counters().motor_steps)
    }

    /// Current position in steps.
    pub fn instrument_coordinate_steps(&self) -> Steps {
        Steps(self.driver.counters().motor_steps)
    }

    /// Set the target position in measures.
    pub fn set_target_coordinate(&mut self, coordinate: Measure) {
        let steps = self.to_steps(coordinate);
        self.driver.set_target_steps(steps);
    }

    /// Target position in measures.
    pub fn target_coordinate(&self) -> Measure {
        self.to_measure(self.driver.counters().target_steps)
    }

    /// Set the target position in steps.
    pub fn set_target_coordinate_steps(&mut self, steps: Steps) {
        self.driver.set_target_steps(steps.value());
    }

    /// Target position in steps.
    pub fn target_coordinate_steps(&self) -> Steps {
        Steps(self.driver.counters().target_steps)
    }

    /// Signed distance to the target in steps.
    pub fn target_distance_steps(&self) -> Steps {
        Steps(self.driver.counters().target_distance())
    }

    /// Signed distance to the target in measures.
    pub fn target_distance(&self) -> Measure {
        self.to_measure(self.driver.counters().target_distance())
    }

    /// Whether the position is within one step of the target.
    pub fn near_target(&self) -> bool {
        self.driver.counters().target_distance().abs() <= 1
    }

    /// Set the backlash amount in steps.
    pub fn set_backlash_steps(&mut self, steps: u32) {
        self.driver.set_backlash_steps(steps);
    }

    /// The backlash amount in steps.
    pub fn backlash_steps(&self) -> u32 {
        self.driver.backlash_steps()
    }

    /// Driver status report.
    pub fn status(&self) -> DriverStatus {
        self.driver.status()
    }

    /// Attach the scheduler task that runs the driver step routine; poll
    /// retimes it whenever the step period changes.
    pub fn attach_step_task(&mut self, handle: TaskHandle) {
        self.step_task = Some(handle);
    }

    /// The attached step task, if any.
    pub fn step_task(&self) -> Option<TaskHandle> {
        self.step_task
    }

    /// Whether an automatic slew or stop ramp is active.
    pub fn auto_slew_active(&self) -> bool {
        self.auto_rate != AutoRate::None
    }

    /// Whether a homing sequence is in progress.
    pub fn is_homing(&self) -> bool {
        self.homing_stage != HomingStage::None
    }

    /// Check whether motion in `direction` is currently blocked by a
    /// fault, a limit-sense input, or a soft limit.
    pub fn motion_error(&mut self, direction: Direction) -> bool {
        self.motion_error_check(direction).is_err()
    }

    fn motion_error_check(&mut self, direction: Direction) -> Result<()> {
        if self.driver.status().fault {
            return Err(MotionError::DriverFault.into());
        }
        match direction {
            Direction::Forward => {
                if self.sense.limit_max() {
                    return Err(MotionError::LimitSense.into());
                }
                if self.limits_enabled {
                    if let Some(limits) = &self.settings.limits {
                        let position = self.to_measure(self.driver.counters().motor_steps);
                        if limits.exceeded_max(position) {
                            return Err(MotionError::LimitExceeded {
                                position: position.value(),
                                limit: limits.max.value(),
                            }
                            .into());
                        }
                    }
                }
            }
            Direction::Reverse => {
                if self.sense.limit_min() {
                    return Err(MotionError::LimitSense.into());
                }
                if self.limits_enabled {
                    if let Some(limits) = &self.settings.limits {
                        let position = self.to_measure(self.driver.counters().motor_steps);
                        if limits.exceeded_min(position) {
                            return Err(MotionError::LimitExceeded {
                                position: position.value(),
                                limit: limits.min.value(),
                            }
                            .into());
                        }
                    }
                }
            }
            Direction::None => {}
        }
        Ok(())
    }

    /// Start a time-based automatic slew. Rejected when the direction is
    /// blocked or a homing sequence is running; the active rate profile is
    /// untouched on rejection.
    pub fn auto_slew(&mut self, direction: Direction) -> Result<()> {
        if direction == Direction::None {
            return Err(MotionError::InvalidDirection.into());
        }
        if self.is_homing() {
            return Err(MotionError::SlewInProgress.into());
        }
        self.motion_error_check(direction)?;
        self.ramp_goal = self.freq_slew;
        self.auto_rate = match direction {
            Direction::Forward => AutoRate::ByTimeForward,
            _ => AutoRate::ByTimeReverse,
        };
        Ok(())
    }

    /// Start a distance-based slew toward the current target. `distance`
    /// is the taper distance: the rate falls off linearly inside it.
    pub fn auto_slew_rate_by_distance(&mut self, distance: Measure) -> Result<()> {
        if !(distance.value() > 0.0) {
            return Err(MotionError::InvalidDistance(distance.value()).into());
        }
        if self.is_homing() {
            return Err(MotionError::SlewInProgress.into());
        }
        let toward = if self.driver.counters().target_distance() >= 0 {
            Direction::Forward
        } else {
            Direction::Reverse
        };
        self.motion_error_check(toward)?;
        self.slew_distance = distance.value();
        self.auto_rate = AutoRate::ByDistance;
        Ok(())
    }

    /// Cancel a distance-based slew immediately (no deceleration ramp; the
    /// distance profile has already shed most of the rate near the target).
    pub fn auto_slew_rate_by_distance_stop(&mut self) {
        if self.auto_rate == AutoRate::ByDistance {
            self.auto_rate = AutoRate::None;
            self.freq = 0.0;
        }
    }

    /// Start the homing sequence: fast, slow, then fine approaches, each
    /// stopping on a home-sensor edge.
    pub fn auto_slew_home(&mut self) -> Result<()> {
        if self.sense.home().is_none() {
            return Err(MotionError::HomeSenseMissing.into());
        }
        if self.auto_slew_active() {
            return Err(MotionError::SlewInProgress.into());
        }
        self.homing_stage = HomingStage::Fast;
        self.start_home_stage();
        Ok(())
    }

    fn start_home_stage(&mut self) {
        let Some(state) = self.sense.home() else {
            self.homing_stage = HomingStage::None;
            return;
        };
        self.home_origin = state;
        // Approach the sensor when off it, back off when on it.
        self.ramp_goal = self.freq_slew / self.homing_stage.rate_divisor();
        self.auto_rate = if state {
            AutoRate::ByTimeReverse
        } else {
            AutoRate::ByTimeForward
        };
    }

    fn advance_home_stage(&mut self) {
        match self.homing_stage {
            HomingStage::Fast => {
                self.homing_stage = HomingStage::Slow;
                self.start_home_stage();
            }
            HomingStage::Slow => {
                self.homing_stage = HomingStage::Fine;
                self.start_home_stage();
            }
            HomingStage::Fine => {
                self.homing_stage = HomingStage::None;
            }
            HomingStage::None => {}
        }
    }

    /// Decelerate to a stop at the normal rate.
    pub fn auto_slew_stop(&mut self) {
        if matches!(
            self.auto_rate,
            AutoRate::ByTimeForward | AutoRate::ByTimeReverse | AutoRate::ByDistance
        ) {
            self.auto_rate = AutoRate::ByTimeEnd;
        }
    }

    /// Decelerate to a stop at the abort rate. Cancels homing.
    pub fn auto_slew_abort(&mut self) {
        if self.auto_rate != AutoRate::None {
            self.auto_rate = AutoRate::ByTimeAbort;
        }
    }

    fn slew_direction(&self) -> Direction {
        match self.auto_rate {
            AutoRate::ByTimeForward => Direction::Forward,
            AutoRate::ByTimeReverse => Direction::Reverse,
            AutoRate::ByDistance => {
                if self.driver.counters().target_distance() >= 0 {
                    Direction::Forward
                } else {
                    Direction::Reverse
                }
            }
            _ => Direction::None,
        }
    }

    /// One pass of the axis control loop.
    pub fn poll<T: StepTimer>(&mut self, timer: &mut T) {
        // Homing: a sensor edge ends the current stage.
        if self.is_homing()
            && matches!(
                self.auto_rate,
                AutoRate::ByTimeForward | AutoRate::ByTimeReverse
            )
        {
            if let Some(state) = self.sense.home() {
                if state != self.home_origin {
                    self.auto_slew_stop();
                }
            }
        }

        // Faults and limits end an active slew through the abort ramp.
        let direction = self.slew_direction();
        if direction != Direction::None && self.motion_error(direction) {
            self.auto_slew_abort();
        }

        let slew_inc = self.slew_accel / POLL_HZ;
        let abort_inc = self.abort_accel / POLL_HZ;
        match self.auto_rate {
            AutoRate::None => {}
            AutoRate::ByTimeForward => {
                self.freq = (self.freq + slew_inc).min(self.ramp_goal);
            }
            AutoRate::ByTimeReverse => {
                self.freq = (self.freq - slew_inc).max(-self.ramp_goal);
            }
            AutoRate::ByDistance => {
                let distance_steps = self.driver.counters().target_distance();
                if distance_steps.abs() <= 1 {
                    self.freq = 0.0;
                    self.auto_rate = AutoRate::None;
                } else {
                    let distance = fabsf(self.to_measure(distance_steps).value());
                    let mut f = distance / self.slew_distance * self.freq_slew;
                    let floor = self.settings.backlash_frequency.max(self.freq_min);
                    f = f.clamp(floor.min(self.freq_slew), self.freq_slew);
                    self.freq = if distance_steps >= 0 { f } else { -f };
                }
            }
            AutoRate::ByTimeEnd => {
                self.ramp_to_zero(slew_inc);
                if self.freq == 0.0 {
                    self.auto_rate = AutoRate::None;
                    self.advance_home_stage();
                }
            }
            AutoRate::ByTimeAbort => {
                self.ramp_to_zero(abort_inc);
                if self.freq == 0.0 {
                    self.auto_rate = AutoRate::None;
                    self.homing_stage = HomingStage::None;
                }
            }
        }

        // Composite rate: ramp plus tracking base, clamped, reversed if
        // the axis direction sense is inverted.
        let mut f = if self.enabled {
            self.freq + if self.tracking { self.freq_base } else { 0.0 }
        } else {
            0.0
        };
        f = f.clamp(-self.freq_max, self.freq_max);
        if self.settings.reverse {
            f = -f;
        }
        let freq_steps = self.settings.frequency_to_steps(f);
        if freq_steps != self.last_freq_steps {
            self.driver.set_frequency_steps(freq_steps);
            self.last_freq_steps = freq_steps;
        }

        self.driver.poll();

        let period = self.driver.step_period();
        if period != self.last_period {
            if let Some(handle) = self.step_task {
                let _ = timer.set_step_period(handle, period);
            }
            self.last_period = period;
        }
    }

    fn ramp_to_zero(&mut self, increment: f32) {
        if self.freq > 0.0 {
            self.freq = (self.freq - increment).max(0.0);
        } else {
            self.freq = (self.freq + increment).min(0.0);
        }
    }
}
