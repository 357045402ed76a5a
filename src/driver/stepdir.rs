//! Step/direction pulse driver.
//!
//! Generates step pulses through GPIO in either a square waveform (two
//! ticks per step, pin toggled each tick) or a pulse waveform (one tick per
//! step, rising and falling edge in the same tick). When a slewing
//! microstep mode is configured, the driver switches to the coarser mode
//! above a frequency threshold, pausing the step stream at a
//! microstep-ratio boundary so the mode change never lands mid-cycle.

use embedded_hal::digital::OutputPin;
use libm::{fabsf, roundf};

use crate::config::{StepDirConfig, StepWaveform};
use crate::scheduler::{SubMicros, TICKS_PER_MICRO};

use super::position::{MotionCounters, SharedCounters};
use super::{Direction, DriverStatus, MotorDriver};

/// Microstep mode switch sequencing.
///
/// `Tracking` and `Slewing` are the steady states; the rest sequence the
/// hand-off between the step routine (which pauses at a ratio boundary) and
/// the poll loop (which reconfigures the mode and swaps the step routine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MicrostepModeControl {
    /// Tracking microstep mode, bidirectional stepping.
    Tracking,
    /// Poll has restored the tracking mode; settle one cycle.
    TrackingReady,
    /// A switch to the slewing mode is requested; the step routine pauses
    /// at the next ratio boundary.
    SlewingRequest,
    /// The step routine is paused at a ratio boundary.
    SlewingPause,
    /// Poll has reconfigured the slewing mode; swap to the fast routine.
    SlewingReady,
    /// Slewing microstep mode, unidirectional fast stepping.
    Slewing,
}

/// Which step routine the timer tick dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepRoutine {
    /// Full-featured: targeting, backlash, mode-switch pausing.
    Bidirectional,
    /// Slewing fast path, forward only.
    FastForward,
    /// Slewing fast path, reverse only.
    FastReverse,
}

/// Step/direction motor driver over three GPIO outputs.
///
/// The enable pin is optional; when absent the motor is assumed always
/// powered.
pub struct StepDirDriver<STEP, DIR, EN>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
{
    step_pin: STEP,
    dir_pin: DIR,
    enable_pin: Option<EN>,
    enable_active_low: bool,

    counters: SharedCounters,
    waveform: StepWaveform,
    microstep_ratio: u32,
    mode: MicrostepModeControl,
    routine: StepRoutine,
    /// Committed steps per pulse: 1 tracking, `microstep_ratio` slewing.
    step_size: u32,

    frequency: f32,
    period: SubMicros,
    backlash_amount: u32,
    /// Minimum pulse rate while taking up backlash, steps/second.
    backlash_frequency: f32,
    /// Nominal-to-actual timer rate ratio; scales every computed period.
    calibration: f32,

    synchronized: bool,
    powered: bool,
    /// Square waveform only: the next tick is the trailing (low) half.
    low_half: bool,
    status: DriverStatus,
}

impl<STEP, DIR, EN> StepDirDriver<STEP, DIR, EN>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
{
    /// Create a driver from its pins and step/dir configuration.
    pub fn new(step_pin: STEP, dir_pin: DIR, enable_pin: Option<EN>, config: &StepDirConfig) -> Self {
        Self {
            step_pin,
            dir_pin,
            enable_pin,
            enable_active_low: true,
            counters: SharedCounters::new(),
            waveform: config.waveform,
            microstep_ratio: u32::from(config.microstep_ratio()),
            mode: MicrostepModeControl::Tracking,
            routine: StepRoutine::Bidirectional,
            step_size: 1,
            frequency: 0.0,
            period: SubMicros::ZERO,
            backlash_amount: 0,
            backlash_frequency: 0.0,
            calibration: 1.0,
            synchronized: false,
            powered: false,
            low_half: false,
            status: DriverStatus::default(),
        }
    }

    /// Set the enable pin polarity (default active low).
    pub fn set_enable_active_low(&mut self, active_low: bool) {
        self.enable_active_low = active_low;
    }

    /// Set the timing calibration ratio (nominal rate / measured rate).
    pub fn set_calibration(&mut self, ratio: f32) {
        if ratio > 0.0 {
            self.calibration = ratio;
            self.recompute_period();
        }
    }

    /// Record a status report from the driver hardware.
    pub fn update_status(&mut self, status: DriverStatus) {
        self.status = status;
    }

    /// Current microstep mode switch state.
    pub fn mode(&self) -> MicrostepModeControl {
        self.mode
    }

    /// Frequency above which the slewing microstep mode engages.
    fn switch_threshold(&self) -> f32 {
        self.backlash_frequency * 1.2
    }

    fn recompute_period(&mut self) {
        let mut f = fabsf(self.frequency);
        if f > 0.0 && self.counters.snapshot().in_backlash(self.backlash_amount) {
            f = f.max(self.backlash_frequency);
        }
        // Pulse rate: each pulse commits step_size steps while slewing.
        let pulse_hz = f / self.step_size as f32;
        if pulse_hz <= 0.0 {
            self.period = SubMicros::ZERO;
            return;
        }
        let period_us = match self.waveform {
            StepWaveform::Square => 500_000.0 / pulse_hz,
            StepWaveform::Pulse => 1_000_000.0 / pulse_hz,
        };
        let ticks = roundf(period_us * TICKS_PER_MICRO as f32 * self.calibration);
        if ticks < SubMicros::MIN_TIMER_PERIOD.0 as f32 || ticks > SubMicros::MAX_TIMER_PERIOD.0 as f32 {
            self.frequency = 0.0;
            self.period = SubMicros::ZERO;
        } else {
            self.period = SubMicros(ticks as u32);
        }
    }

    fn write_direction(&mut self, direction: Direction) {
        let forward = direction == Direction::Forward;
        let _ = if forward {
            self.dir_pin.set_high()
        } else {
            self.dir_pin.set_low()
        };
    }

    fn pulse(&mut self) {
        match self.waveform {
            StepWaveform::Square => {
                let _ = self.step_pin.set_high();
                self.low_half = true;
            }
            StepWaveform::Pulse => {
                let _ = self.step_pin.set_high();
                let _ = self.step_pin.set_low();
            }
        }
    }

    /// Square waveform: handle the trailing half of a step cycle. Returns
    /// true when this tick was consumed by it.
    fn finish_square_half(&mut self) -> bool {
        if self.waveform == StepWaveform::Square && self.low_half {
            let _ = self.step_pin.set_low();
            self.low_half = false;
            true
        } else {
            false
        }
    }

    fn step_bidirectional(&mut self) {
        if self.finish_square_half() {
            return;
        }
        // Paused waiting for the poll loop to finish the mode switch.
        if matches!(
            self.mode,
            MicrostepModeControl::SlewingPause | MicrostepModeControl::SlewingReady
        ) {
            return;
        }

        let tracking_sign: i64 = if self.frequency > 0.0 {
            1
        } else if self.frequency < 0.0 {
            -1
        } else {
            0
        };
        let backlash_amount = self.backlash_amount;
        let synchronized = self.synchronized;
        let switch_requested = self.mode == MicrostepModeControl::SlewingRequest;
        let ratio = i64::from(self.microstep_ratio);

        let mut pulsed = Direction::None;
        let mut aligned_pause = false;
        self.counters.with(|c| {
            if synchronized && tracking_sign != 0 && !c.in_backlash(backlash_amount) {
                c.target_steps += tracking_sign;
            }
            if switch_requested && c.physical_steps() % ratio == 0 {
                aligned_pause = true;
                return;
            }
            let desired = if c.motor_steps < c.target_steps {
                Direction::Forward
            } else if c.motor_steps > c.target_steps {
                Direction::Reverse
            } else {
                Direction::None
            };
            c.direction = desired;
            if desired == Direction::None {
                return;
            }
            c.apply_step(desired, backlash_amount, 1);
            pulsed = desired;
        });

        if aligned_pause {
            self.mode = MicrostepModeControl::SlewingPause;
            return;
        }
        if pulsed == Direction::None {
            return;
        }
        self.write_direction(pulsed);
        self.pulse();
    }

    fn step_fast(&mut self, direction: Direction) {
        if self.finish_square_half() {
            return;
        }
        let size = self.step_size;
        let backlash_amount = self.backlash_amount;
        self.counters.with(|c| {
            c.direction = direction;
            c.apply_step(direction, backlash_amount, size);
        });
        self.pulse();
    }
}

impl<STEP, DIR, EN> MotorDriver for StepDirDriver<STEP, DIR, EN>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
{
    fn power(&mut self, enabled: bool) {
        self.powered = enabled;
        if let Some(pin) = self.enable_pin.as_mut() {
            let drive_low = enabled == self.enable_active_low;
            let _ = if drive_low { pin.set_low() } else { pin.set_high() };
        }
    }

    fn is_powered(&self) -> bool {
        self.powered
    }

    fn set_frequency_steps(&mut self, frequency: f32) {
        self.frequency = frequency;
        self.recompute_period();
    }

    fn frequency_steps(&self) -> f32 {
        self.frequency
    }

    fn step_period(&self) -> SubMicros {
        self.period
    }

    fn status(&self) -> DriverStatus {
        self.status
    }

    fn set_backlash_steps(&mut self, steps: u32) {
        self.backlash_amount = steps;
    }

    fn backlash_steps(&self) -> u32 {
        self.backlash_amount
    }

    fn set_backlash_frequency_steps(&mut self, frequency: f32) {
        self.backlash_frequency = fabsf(frequency);
        self.recompute_period();
    }

    fn in_backlash(&self) -> bool {
        self.counters.snapshot().in_backlash(self.backlash_amount)
    }

    fn counters(&self) -> MotionCounters {
        self.counters.snapshot()
    }

    fn set_motor_steps(&mut self, steps: i64) {
        self.counters.with(|c| c.motor_steps = steps);
    }

    fn set_target_steps(&mut self, steps: i64) {
        self.counters.with(|c| c.target_steps = steps);
    }

    fn set_synchronized(&mut self, synchronized: bool) {
        self.synchronized = synchronized;
    }

    fn poll(&mut self) {
        // The backlash-rate floor depends on whether the step routine is
        // currently inside the backlash band, which changes between polls.
        self.recompute_period();
        if self.microstep_ratio <= 1 {
            return;
        }
        let threshold = self.switch_threshold();
        if threshold <= 0.0 {
            return;
        }
        let f = fabsf(self.frequency);
        match self.mode {
            MicrostepModeControl::Tracking => {
                if f > threshold {
                    self.mode = MicrostepModeControl::SlewingRequest;
                }
            }
            MicrostepModeControl::TrackingReady => {
                self.mode = MicrostepModeControl::Tracking;
            }
            MicrostepModeControl::SlewingRequest => {
                // The step routine pauses at the next ratio boundary. If
                // the rate dropped back below the threshold first, cancel.
                if f <= threshold {
                    self.mode = MicrostepModeControl::Tracking;
                }
            }
            MicrostepModeControl::SlewingPause => {
                // The stream is paused on a boundary; the electrical
                // microstep mode change belongs here.
                self.step_size = self.microstep_ratio;
                self.recompute_period();
                self.mode = MicrostepModeControl::SlewingReady;
            }
            MicrostepModeControl::SlewingReady => {
                let direction = if self.frequency >= 0.0 {
                    Direction::Forward
                } else {
                    Direction::Reverse
                };
                self.write_direction(direction);
                self.routine = if direction == Direction::Forward {
                    StepRoutine::FastForward
                } else {
                    StepRoutine::FastReverse
                };
                self.mode = MicrostepModeControl::Slewing;
            }
            MicrostepModeControl::Slewing => {
                if f <= threshold {
                    self.routine = StepRoutine::Bidirectional;
                    self.step_size = 1;
                    self.recompute_period();
                    self.mode = MicrostepModeControl::TrackingReady;
                }
            }
        }
    }

    fn step(&mut self) {
        if !self.powered {
            return;
        }
        match self.routine {
            StepRoutine::Bidirectional => self.step_bidirectional(),
            StepRoutine::FastForward => self.step_fast(Direction::Forward),
            StepRoutine::FastReverse => self.step_fast(Direction::Reverse),
        }
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTransaction};

    use crate::config::units::Microsteps;

    use super::*;

    fn pulse_config() -> StepDirConfig {
        StepDirConfig {
            microsteps: Microsteps::SIXTEENTH,
            microsteps_slewing: None,
            waveform: StepWaveform::Pulse,
        }
    }

    fn slewing_config() -> StepDirConfig {
        StepDirConfig {
            microsteps: Microsteps::SIXTEENTH,
            microsteps_slewing: Some(Microsteps::HALF),
            waveform: StepWaveform::Pulse,
        }
    }

    fn driver_from(
        config: &StepDirConfig,
        step: Vec<PinTransaction>,
        dir: Vec<PinTransaction>,
    ) -> StepDirDriver<PinMock, PinMock, PinMock> {
        let mut d = StepDirDriver::new(PinMock::new(&step), PinMock::new(&dir), None, config);
        d.powered = true;
        d
    }

    fn done(d: StepDirDriver<PinMock, PinMock, PinMock>) {
        let StepDirDriver {
            mut step_pin,
            mut dir_pin,
            ..
        } = d;
        step_pin.done();
        dir_pin.done();
    }

    #[test]
    fn test_pulse_step_toward_target() {
        let step = vec![
            PinTransaction::set(State::High),
            PinTransaction::set(State::Low),
        ];
        let dir = vec![PinTransaction::set(State::High)];
        let mut d = driver_from(&pulse_config(), step, dir);
        d.set_target_steps(3);
        d.step();
        assert_eq!(d.counters().motor_steps, 1);
        done(d);
    }

    #[test]
    fn test_square_waveform_two_ticks_per_step() {
        let config = StepDirConfig {
            waveform: StepWaveform::Square,
            ..pulse_config()
        };
        let step = vec![
            PinTransaction::set(State::High),
            PinTransaction::set(State::Low),
        ];
        let dir = vec![PinTransaction::set(State::High)];
        let mut d = driver_from(&config, step, dir);
        d.set_target_steps(10);
        d.step();
        assert_eq!(d.counters().motor_steps, 1);
        // Trailing half: pin drops, no position change.
        d.step();
        assert_eq!(d.counters().motor_steps, 1);
        done(d);
    }

    #[test]
    fn test_no_step_when_on_target() {
        let mut d = driver_from(&pulse_config(), vec![], vec![]);
        d.step();
        assert_eq!(d.counters().motor_steps, 0);
        done(d);
    }

    #[test]
    fn test_unpowered_driver_does_not_step() {
        let mut d = driver_from(&pulse_config(), vec![], vec![]);
        d.powered = false;
        d.set_target_steps(5);
        d.step();
        assert_eq!(d.counters().motor_steps, 0);
        done(d);
    }

    #[test]
    fn test_backlash_consumed_before_position_moves() {
        let step: Vec<_> = (0..8)
            .flat_map(|_| {
                [
                    PinTransaction::set(State::High),
                    PinTransaction::set(State::Low),
                ]
            })
            .collect();
        let dir: Vec<_> = (0..8).map(|_| PinTransaction::set(State::High)).collect();
        let mut d = driver_from(&pulse_config(), step, dir);
        d.set_backlash_steps(5);
        d.set_target_steps(3);
        for _ in 0..8 {
            d.step();
        }
        let c = d.counters();
        assert_eq!(c.backlash_steps, 5);
        assert_eq!(c.motor_steps, 3);
        done(d);
    }

    #[test]
    fn test_synchronized_advances_target() {
        let step = vec![
            PinTransaction::set(State::High),
            PinTransaction::set(State::Low),
        ];
        let dir = vec![PinTransaction::set(State::High)];
        let mut d = driver_from(&pulse_config(), step, dir);
        d.set_synchronized(true);
        d.set_frequency_steps(100.0);
        d.step();
        let c = d.counters();
        assert_eq!(c.target_steps, 1);
        assert_eq!(c.motor_steps, 1);
        done(d);
    }

    #[test]
    fn test_period_from_frequency() {
        let mut d = driver_from(&pulse_config(), vec![], vec![]);
        // 10 kHz pulse waveform: 100 us per step.
        d.set_frequency_steps(10_000.0);
        assert_eq!(d.step_period(), SubMicros(1600));
        d.set_frequency_steps(0.0);
        assert_eq!(d.step_period(), SubMicros::ZERO);
        done(d);
    }

    #[test]
    fn test_square_period_is_half() {
        let config = StepDirConfig {
            waveform: StepWaveform::Square,
            ..pulse_config()
        };
        let mut d = driver_from(&config, vec![], vec![]);
        d.set_frequency_steps(10_000.0);
        assert_eq!(d.step_period(), SubMicros(800));
        done(d);
    }

    #[test]
    fn test_calibration_scales_period() {
        let mut d = driver_from(&pulse_config(), vec![], vec![]);
        d.set_calibration(1.01);
        d.set_frequency_steps(10_000.0);
        assert_eq!(d.step_period(), SubMicros(1616));
        done(d);
    }

    #[test]
    fn test_out_of_range_frequency_stops() {
        let mut d = driver_from(&pulse_config(), vec![], vec![]);
        // 16 MHz steps implies a period below the minimum.
        d.set_frequency_steps(16_000_000.0);
        assert_eq!(d.frequency_steps(), 0.0);
        assert_eq!(d.step_period(), SubMicros::ZERO);
        done(d);
    }

    #[test]
    fn test_mode_switch_waits_for_ratio_boundary() {
        // Ratio 8: the pause may only happen with physical position on a
        // multiple of 8. Ten pulses total: eight tracking, two fast.
        let step: Vec<_> = (0..10)
            .flat_map(|_| {
                [
                    PinTransaction::set(State::High),
                    PinTransaction::set(State::Low),
                ]
            })
            .collect();
        // Eight tracking dir writes plus one when slewing engages.
        let dir: Vec<_> = (0..9).map(|_| PinTransaction::set(State::High)).collect();
        let mut d = driver_from(&slewing_config(), step, dir);
        assert_eq!(slewing_config().microstep_ratio(), 8);
        d.set_backlash_frequency_steps(100.0);
        d.set_target_steps(1000);
        // Three steps in tracking mode; position now 3.
        for _ in 0..3 {
            d.step();
        }
        // Request the switch.
        d.set_frequency_steps(5000.0);
        d.poll();
        assert_eq!(d.mode(), MicrostepModeControl::SlewingRequest);
        // Steps continue until position hits 8; the tick after that pauses.
        for _ in 0..6 {
            d.step();
        }
        assert_eq!(d.counters().motor_steps, 8);
        assert_eq!(d.mode(), MicrostepModeControl::SlewingPause);
        // Paused: further ticks do nothing.
        d.step();
        assert_eq!(d.counters().motor_steps, 8);
        // Poll completes the switch.
        d.poll();
        assert_eq!(d.mode(), MicrostepModeControl::SlewingReady);
        d.step();
        assert_eq!(d.counters().motor_steps, 8);
        d.poll();
        assert_eq!(d.mode(), MicrostepModeControl::Slewing);
        // Fast routine commits 8 steps per pulse. One dir write happens at
        // the SlewingReady transition, then pulses only.
        d.step();
        d.step();
        assert_eq!(d.counters().motor_steps, 24);
        done(d);
    }

    #[test]
    fn test_backlash_floor_follows_backlash_state() {
        let step: Vec<_> = (0..3)
            .flat_map(|_| {
                [
                    PinTransaction::set(State::High),
                    PinTransaction::set(State::Low),
                ]
            })
            .collect();
        let dir: Vec<_> = (0..3).map(|_| PinTransaction::set(State::High)).collect();
        let mut d = driver_from(&pulse_config(), step, dir);
        d.set_backlash_steps(2);
        d.set_backlash_frequency_steps(1000.0);
        d.set_target_steps(10);
        d.set_frequency_steps(100.0);
        // Idle, no backlash being taken up: the commanded rate stands.
        assert_eq!(d.step_period(), SubMicros(160_000));

        // First step enters the backlash band; the next poll floors the
        // rate at 1 kHz.
        d.step();
        d.poll();
        assert_eq!(d.step_period(), SubMicros(16_000));

        // Backlash filled and the motor moving again: the floor lifts.
        d.step();
        d.step();
        d.poll();
        assert_eq!(d.step_period(), SubMicros(160_000));
        done(d);
    }

    #[test]
    fn test_fast_routine_drains_residual_backlash() {
        // Eight tracking pulses fill the slack, two fast pulses follow.
        let step: Vec<_> = (0..10)
            .flat_map(|_| {
                [
                    PinTransaction::set(State::High),
                    PinTransaction::set(State::Low),
                ]
            })
            .collect();
        // Eight tracking dir writes plus one when slewing engages.
        let mut dir: Vec<_> = (0..8).map(|_| PinTransaction::set(State::High)).collect();
        dir.push(PinTransaction::set(State::Low));
        let mut d = driver_from(&slewing_config(), step, dir);
        d.set_backlash_steps(5);
        d.set_backlash_frequency_steps(100.0);
        d.set_target_steps(3);
        // Fill the slack and reach the target: physical position 8, on a
        // ratio boundary.
        for _ in 0..8 {
            d.step();
        }
        let c = d.counters();
        assert_eq!((c.motor_steps, c.backlash_steps), (3, 5));

        // Reverse slew: the next tick pauses on the boundary, then the
        // fast routine engages.
        d.set_frequency_steps(-5000.0);
        d.poll();
        d.step();
        d.poll();
        d.poll();
        assert_eq!(d.mode(), MicrostepModeControl::Slewing);

        // First fast pulse drains all 5 slack counts and commits the
        // remaining 3; physical position moves by exactly 8 per pulse.
        d.step();
        let c = d.counters();
        assert_eq!((c.motor_steps, c.backlash_steps), (0, 0));
        assert_eq!(c.physical_steps(), 0);
        d.step();
        assert_eq!(d.counters().physical_steps(), -8);
        done(d);
    }

    #[test]
    fn test_mode_switch_back_to_tracking() {
        // One dir write when the fast routine engages.
        let dir = vec![PinTransaction::set(State::High)];
        let mut d = driver_from(&slewing_config(), vec![], dir);
        d.set_backlash_frequency_steps(100.0);
        d.set_frequency_steps(5000.0);
        d.poll();
        // Boundary is position 0, so the very next step pauses.
        d.step();
        d.poll();
        d.poll();
        assert_eq!(d.mode(), MicrostepModeControl::Slewing);
        d.set_frequency_steps(50.0);
        d.poll();
        assert_eq!(d.mode(), MicrostepModeControl::TrackingReady);
        d.poll();
        assert_eq!(d.mode(), MicrostepModeControl::Tracking);
        done(d);
    }

    #[test]
    fn test_slewing_period_accounts_for_step_size() {
        let mut d = driver_from(&slewing_config(), vec![], vec![]);
        d.set_backlash_frequency_steps(100.0);
        d.set_frequency_steps(8000.0);
        d.poll();
        d.step();
        d.poll();
        // Step size 8: 1 kHz pulse rate, 1000 us period.
        assert_eq!(d.step_period(), SubMicros(16_000));
        done(d);
    }
}
