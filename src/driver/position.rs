//! Motion counters shared between the step routine and the control loop.
//!
//! The step routine runs at interrupt priority; the axis control loop reads
//! positions at its own cadence. All multi-field access goes through a
//! critical section so a reader never observes a half-updated position.

use core::cell::RefCell;

use critical_section::Mutex;

use super::Direction;

/// The position state a driver advances one step at a time.
///
/// The physical shaft position is `motor_steps + backlash_steps`: on a
/// direction reversal the backlash counter drains (or fills) before the
/// committed motor position moves, hiding gear slack from the coordinate
/// math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotionCounters {
    /// Committed motor position in steps.
    pub motor_steps: i64,
    /// Target position in steps.
    pub target_steps: i64,
    /// Backlash taken up, in `0..=amount`.
    pub backlash_steps: u32,
    /// Direction of the most recent step decision.
    pub direction: Direction,
}

impl MotionCounters {
    /// Physical shaft position in steps.
    #[inline]
    pub fn physical_steps(&self) -> i64 {
        self.motor_steps + i64::from(self.backlash_steps)
    }

    /// Signed distance from the committed position to the target.
    #[inline]
    pub fn target_distance(&self) -> i64 {
        self.target_steps - self.motor_steps
    }

    /// Whether travel in the current direction still has backlash to take
    /// up before the committed position moves.
    #[inline]
    pub fn in_backlash(&self, backlash_amount: u32) -> bool {
        match self.direction {
            Direction::Forward => self.backlash_steps < backlash_amount,
            Direction::Reverse => self.backlash_steps > 0,
            Direction::None => false,
        }
    }

    /// Advance `step_size` physical steps toward `direction`, consuming
    /// backlash first. `step_size` is the committed-position increment per
    /// pulse (greater than one while slewing at a reduced microstep mode);
    /// a pulse that straddles the end of the backlash band splits between
    /// the backlash counter and the motor position, so the physical
    /// position always moves by exactly `step_size`.
    pub fn apply_step(&mut self, direction: Direction, backlash_amount: u32, step_size: u32) {
        match direction {
            Direction::Forward => {
                let fill = step_size.min(backlash_amount.saturating_sub(self.backlash_steps));
                self.backlash_steps += fill;
                self.motor_steps += i64::from(step_size - fill);
            }
            Direction::Reverse => {
                let drain = step_size.min(self.backlash_steps);
                self.backlash_steps -= drain;
                self.motor_steps -= i64::from(step_size - drain);
            }
            Direction::None => {}
        }
    }
}

/// Interior-mutable [`MotionCounters`] cell guarded by a critical section.
pub struct SharedCounters {
    inner: Mutex<RefCell<MotionCounters>>,
}

impl SharedCounters {
    /// Create a zeroed counter cell.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(MotionCounters {
                motor_steps: 0,
                target_steps: 0,
                backlash_steps: 0,
                direction: Direction::None,
            })),
        }
    }

    /// Consistent snapshot of all counters.
    pub fn snapshot(&self) -> MotionCounters {
        critical_section::with(|cs| *self.inner.borrow_ref(cs))
    }

    /// Run `f` with exclusive access to the counters.
    pub fn with<R>(&self, f: impl FnOnce(&mut MotionCounters) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }
}

impl Default for SharedCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backlash_fills_before_motor_moves() {
        let mut c = MotionCounters::default();
        c.direction = Direction::Forward;
        for _ in 0..5 {
            c.apply_step(Direction::Forward, 5, 1);
        }
        assert_eq!(c.motor_steps, 0);
        assert_eq!(c.backlash_steps, 5);

        c.apply_step(Direction::Forward, 5, 1);
        assert_eq!(c.motor_steps, 1);
        assert_eq!(c.backlash_steps, 5);
    }

    #[test]
    fn test_backlash_drains_on_reversal() {
        let mut c = MotionCounters {
            motor_steps: 100,
            target_steps: 0,
            backlash_steps: 3,
            direction: Direction::Reverse,
        };
        c.apply_step(Direction::Reverse, 3, 1);
        c.apply_step(Direction::Reverse, 3, 1);
        c.apply_step(Direction::Reverse, 3, 1);
        assert_eq!(c.motor_steps, 100);
        assert_eq!(c.backlash_steps, 0);

        c.apply_step(Direction::Reverse, 3, 1);
        assert_eq!(c.motor_steps, 99);
    }

    #[test]
    fn test_backlash_counter_stays_in_range() {
        let mut c = MotionCounters::default();
        for _ in 0..20 {
            c.apply_step(Direction::Forward, 4, 1);
            assert!(c.backlash_steps <= 4);
        }
        for _ in 0..20 {
            c.apply_step(Direction::Reverse, 4, 1);
            assert!(c.backlash_steps <= 4);
        }
    }

    #[test]
    fn test_large_steps_split_across_backlash() {
        let mut c = MotionCounters::default();
        // An 8-step pulse with 5 counts of slack: the slack fills and the
        // remaining 3 steps commit, physical position still moves by 8.
        c.apply_step(Direction::Forward, 5, 8);
        assert_eq!(c.backlash_steps, 5);
        assert_eq!(c.motor_steps, 3);
        assert_eq!(c.physical_steps(), 8);

        c.apply_step(Direction::Reverse, 5, 8);
        assert_eq!(c.backlash_steps, 0);
        assert_eq!(c.motor_steps, 0);
        assert_eq!(c.physical_steps(), 0);
    }

    #[test]
    fn test_physical_position_includes_backlash() {
        let c = MotionCounters {
            motor_steps: 10,
            target_steps: 0,
            backlash_steps: 2,
            direction: Direction::Forward,
        };
        assert_eq!(c.physical_steps(), 12);
    }

    #[test]
    fn test_in_backlash_depends_on_direction() {
        let mut c = MotionCounters {
            motor_steps: 0,
            target_steps: 0,
            backlash_steps: 2,
            direction: Direction::Forward,
        };
        assert!(c.in_backlash(5));
        c.backlash_steps = 5;
        assert!(!c.in_backlash(5));
        c.direction = Direction::Reverse;
        assert!(c.in_backlash(5));
        c.backlash_steps = 0;
        assert!(!c.in_backlash(5));
    }

    #[test]
    fn test_shared_snapshot_roundtrip() {
        let shared = SharedCounters::new();
        shared.with(|c| {
            c.motor_steps = 42;
            c.target_steps = 100;
        });
        let snap = shared.snapshot();
        assert_eq!(snap.motor_steps, 42);
        assert_eq!(snap.target_distance(), 58);
    }
}
