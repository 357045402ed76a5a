//! Scheduler time representation and hardware timer abstraction.
//!
//! Periods are carried in sub-microsecond ticks (1/16 µs), fine enough to
//! express sidereal-rate step periods without accumulating rounding error.

use libm::roundf;

/// Sub-microsecond ticks per microsecond.
pub const TICKS_PER_MICRO: u32 = 16;

/// Sub-microsecond ticks per millisecond.
pub const TICKS_PER_MILLI: u32 = 16_000;

/// A period expressed in sub-microsecond ticks (1/16 µs).
///
/// A zero period means "idle": the owning task is registered but never due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubMicros(pub u32);

impl SubMicros {
    /// Idle period.
    pub const ZERO: Self = Self(0);

    /// Shortest period a hardware timer can realize (0.25 µs).
    pub const MIN_TIMER_PERIOD: Self = Self(4);

    /// Longest period a hardware timer can realize (~134 s).
    pub const MAX_TIMER_PERIOD: Self = Self(i32::MAX as u32);

    /// Create from whole microseconds. `None` on overflow.
    #[inline]
    pub const fn from_micros(micros: u32) -> Option<Self> {
        match micros.checked_mul(TICKS_PER_MICRO) {
            Some(ticks) => Some(Self(ticks)),
            None => None,
        }
    }

    /// Create from whole milliseconds. `None` on overflow.
    #[inline]
    pub const fn from_millis(millis: u32) -> Option<Self> {
        match millis.checked_mul(TICKS_PER_MILLI) {
            Some(ticks) => Some(Self(ticks)),
            None => None,
        }
    }

    /// Period realizing `hz` cycles per second, rounded to the nearest tick.
    ///
    /// Returns `None` when the frequency implies a period outside the
    /// representable range.
    pub fn from_frequency(hz: f32) -> Option<Self> {
        if !(hz > 0.0) {
            return None;
        }
        let ticks = roundf(16_000_000.0 / hz);
        if ticks < 1.0 || ticks > u32::MAX as f32 {
            return None;
        }
        Some(Self(ticks as u32))
    }

    /// Whole microseconds (truncating).
    #[inline]
    pub const fn as_micros(self) -> u32 {
        self.0 / TICKS_PER_MICRO
    }

    /// Whole milliseconds (truncating).
    #[inline]
    pub const fn as_millis(self) -> u32 {
        self.0 / TICKS_PER_MILLI
    }

    /// Raw tick count.
    #[inline]
    pub const fn ticks(self) -> u32 {
        self.0
    }

    /// Whether this is the idle period.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Whether a hardware timer can realize this period.
    #[inline]
    pub const fn in_timer_range(self) -> bool {
        self.0 >= Self::MIN_TIMER_PERIOD.0 && self.0 <= Self::MAX_TIMER_PERIOD.0
    }
}

/// Unit a task period was specified in, preserved for round-trip reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeriodUnit {
    /// Milliseconds.
    #[default]
    Millis,
    /// Microseconds.
    Micros,
    /// Sub-microsecond ticks (1/16 µs).
    SubMicros,
}

impl PeriodUnit {
    /// Convert a canonical tick count into this unit.
    #[inline]
    pub const fn from_ticks(self, period: SubMicros) -> u32 {
        match self {
            PeriodUnit::Millis => period.as_millis(),
            PeriodUnit::Micros => period.as_micros(),
            PeriodUnit::SubMicros => period.ticks(),
        }
    }
}

/// Delegated hardware step timers.
///
/// The scheduler reprograms bound timers through this trait; the timer ISR
/// on the firmware side calls back into
/// [`Scheduler::run_hardware_timer`](crate::scheduler::Scheduler::run_hardware_timer).
/// A zero period stops the timer from firing without releasing it.
pub trait HardwareTimers {
    /// Number of timer slots available for delegation.
    fn timer_count(&self) -> u8;

    /// Claim `timer` and start it at `period` with the given interrupt
    /// priority. Returns `false` if the timer cannot be claimed.
    fn arm(&mut self, timer: u8, period: SubMicros, hw_priority: u8) -> bool;

    /// Reprogram a claimed timer. Takes effect on the next timer cycle.
    fn set_period(&mut self, timer: u8, period: SubMicros);

    /// Stop and release a claimed timer.
    fn disarm(&mut self, timer: u8);
}

/// A [`HardwareTimers`] implementation with no timers.
///
/// Every hardware timer request degrades gracefully to cooperative polling.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTimers;

impl HardwareTimers for NoTimers {
    fn timer_count(&self) -> u8 {
        0
    }

    fn arm(&mut self, _timer: u8, _period: SubMicros, _hw_priority: u8) -> bool {
        false
    }

    fn set_period(&mut self, _timer: u8, _period: SubMicros) {}

    fn disarm(&mut self, _timer: u8) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_micros_conversions() {
        let p = SubMicros::from_micros(100).unwrap();
        assert_eq!(p.ticks(), 1600);
        assert_eq!(p.as_micros(), 100);

        let p = SubMicros::from_millis(20).unwrap();
        assert_eq!(p.ticks(), 320_000);
        assert_eq!(p.as_millis(), 20);
    }

    #[test]
    fn test_from_frequency() {
        // 1 kHz -> 1000 µs -> 16000 ticks
        let p = SubMicros::from_frequency(1000.0).unwrap();
        assert_eq!(p.ticks(), 16_000);

        assert!(SubMicros::from_frequency(0.0).is_none());
        assert!(SubMicros::from_frequency(-5.0).is_none());
    }

    #[test]
    fn test_timer_range() {
        assert!(!SubMicros::ZERO.in_timer_range());
        assert!(!SubMicros(3).in_timer_range());
        assert!(SubMicros(4).in_timer_range());
        assert!(SubMicros(i32::MAX as u32).in_timer_range());
        assert!(!SubMicros(i32::MAX as u32 + 1).in_timer_range());
    }

    #[test]
    fn test_period_unit_round_trip() {
        let p = SubMicros(1600);
        assert_eq!(PeriodUnit::SubMicros.from_ticks(p), 1600);
        assert_eq!(PeriodUnit::Micros.from_ticks(p), 100);
    }
}
