//! Servo motor driver.
//!
//! The step routine advances the same motor/backlash counters as the
//! step/dir driver but moves no pins; a separate PID control task compares
//! the counted position against an encoder and drives the motor through a
//! PWM magnitude plus a direction line.

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use libm::{fabsf, roundf};
use pid::Pid;

use crate::scheduler::{SubMicros, TICKS_PER_MICRO};

use super::position::{MotionCounters, SharedCounters};
use super::{Direction, DriverStatus, MotorDriver};

/// Position feedback source for the servo control loop.
pub trait Encoder {
    /// Current encoder count in steps.
    fn count(&mut self) -> i64;
}

/// PID gains for the servo position loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoGains {
    /// Proportional gain.
    pub p: f32,
    /// Integral gain.
    pub i: f32,
    /// Derivative gain.
    pub d: f32,
}

/// Servo motor driver: encoder feedback, PWM power, direction line.
pub struct ServoDriver<ENC, PWM, DIR>
where
    ENC: Encoder,
    PWM: SetDutyCycle,
    DIR: OutputPin,
{
    encoder: ENC,
    pwm: PWM,
    dir_pin: DIR,

    counters: SharedCounters,
    position: Pid<f32>,
    gains: ServoGains,
    /// Full-scale control output magnitude.
    analog_range: f32,

    frequency: f32,
    period: SubMicros,
    backlash_amount: u32,
    backlash_frequency: f32,

    synchronized: bool,
    powered: bool,
    status: DriverStatus,
}

impl<ENC, PWM, DIR> ServoDriver<ENC, PWM, DIR>
where
    ENC: Encoder,
    PWM: SetDutyCycle,
    DIR: OutputPin,
{
    /// Create a servo driver. `analog_range` is the full-scale control
    /// output; the PID output is clamped to it and mapped onto the PWM
    /// duty range.
    pub fn new(encoder: ENC, pwm: PWM, dir_pin: DIR, gains: ServoGains, analog_range: f32) -> Self {
        Self {
            encoder,
            pwm,
            dir_pin,
            counters: SharedCounters::new(),
            position: Self::make_pid(gains, analog_range),
            gains,
            analog_range,
            frequency: 0.0,
            period: SubMicros::ZERO,
            backlash_amount: 0,
            backlash_frequency: 0.0,
            synchronized: false,
            powered: false,
            status: DriverStatus::default(),
        }
    }

    fn make_pid(gains: ServoGains, range: f32) -> Pid<f32> {
        *Pid::new(0.0, range)
            .p(gains.p, range)
            .i(gains.i, range)
            .d(gains.d, range)
    }

    /// Record a status report from the motor controller hardware.
    pub fn update_status(&mut self, status: DriverStatus) {
        self.status = status;
    }

    /// Discard accumulated integral state (mode change, after a park).
    pub fn reset_control(&mut self) {
        self.position = Self::make_pid(self.gains, self.analog_range);
    }

    /// One pass of the position control loop. Registered as a repeating
    /// scheduler task at a fixed cadence (a few milliseconds); the step
    /// routine only moves counters, this is what moves the motor.
    pub fn poll_control(&mut self) {
        if !self.powered {
            self.drive(0.0);
            return;
        }
        let c = self.counters.snapshot();
        // Track the physical position: committed steps plus taken-up
        // backlash.
        self.position.setpoint = c.physical_steps() as f32;
        let measured = self.encoder.count() as f32;
        let power = self.position.next_control_output(measured).output;
        self.drive(power);
    }

    fn drive(&mut self, power: f32) {
        let _ = if power >= 0.0 {
            self.dir_pin.set_high()
        } else {
            self.dir_pin.set_low()
        };
        let magnitude = if self.analog_range > 0.0 {
            (fabsf(power) / self.analog_range).min(1.0)
        } else {
            0.0
        };
        let max_duty = self.pwm.max_duty_cycle();
        let duty = roundf(magnitude * max_duty as f32) as u16;
        let _ = self.pwm.set_duty_cycle(duty.min(max_duty));
    }

    fn recompute_period(&mut self) {
        let mut f = fabsf(self.frequency);
        if f > 0.0 && self.counters.snapshot().in_backlash(self.backlash_amount) {
            f = f.max(self.backlash_frequency);
        }
        if f <= 0.0 {
            self.period = SubMicros::ZERO;
            return;
        }
        let ticks = roundf(1_000_000.0 / f * TICKS_PER_MICRO as f32);
        if ticks < SubMicros::MIN_TIMER_PERIOD.0 as f32 || ticks > SubMicros::MAX_TIMER_PERIOD.0 as f32 {
            self.frequency = 0.0;
            self.period = SubMicros::ZERO;
        } else {
            self.period = SubMicros(ticks as u32);
        }
    }
}

impl<ENC, PWM, DIR> MotorDriver for ServoDriver<ENC, PWM, DIR>
where
    ENC: Encoder,
    PWM: SetDutyCycle,
    DIR: OutputPin,
{
    fn power(&mut self, enabled: bool) {
        self.powered = enabled;
        if !enabled {
            self.drive(0.0);
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
        // No microstep modes here; keep the backlash-rate floor in step
        // with the backlash state. Control runs in poll_control.
        self.recompute_period();
    }

    fn step(&mut self) {
        if !self.powered {
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
        self.counters.with(|c| {
            if synchronized && tracking_sign != 0 && !c.in_backlash(backlash_amount) {
                c.target_steps += tracking_sign;
            }
            let desired = if c.motor_steps < c.target_steps {
                Direction::Forward
            } else if c.motor_steps > c.target_steps {
                Direction::Reverse
            } else {
                Direction::None
            };
            c.direction = desired;
            c.apply_step(desired, backlash_amount, 1);
        });
    }
}
