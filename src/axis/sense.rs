//! Home and limit sense inputs.

use embedded_hal::digital::InputPin;

/// Home/limit sensor readings for one axis.
pub trait LimitSense {
    /// Home sensor state, or `None` when the axis has no home sensor.
    fn home(&mut self) -> Option<bool>;

    /// Whether the minimum-direction limit switch is asserted.
    fn limit_min(&mut self) -> bool;

    /// Whether the maximum-direction limit switch is asserted.
    fn limit_max(&mut self) -> bool;
}

/// An axis with no sensors wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSense;

impl LimitSense for NoSense {
    fn home(&mut self) -> Option<bool> {
        None
    }

    fn limit_min(&mut self) -> bool {
        false
    }

    fn limit_max(&mut self) -> bool {
        false
    }
}

/// GPIO-backed sensors. Any of the three inputs may be absent; a pin read
/// error reads as not asserted.
pub struct PinSense<H, MIN, MAX>
where
    H: InputPin,
    MIN: InputPin,
    MAX: InputPin,
{
    home_pin: Option<H>,
    min_pin: Option<MIN>,
    max_pin: Option<MAX>,
    active_high: bool,
}

impl<H, MIN, MAX> PinSense<H, MIN, MAX>
where
    H: InputPin,
    MIN: InputPin,
    MAX: InputPin,
{
    /// Create a sense block from optional pins. `active_high` selects the
    /// asserted level for all three inputs.
    pub fn new(home_pin: Option<H>, min_pin: Option<MIN>, max_pin: Option<MAX>, active_high: bool) -> Self {
        Self {
            home_pin,
            min_pin,
            max_pin,
            active_high,
        }
    }
}

impl<H, MIN, MAX> LimitSense for PinSense<H, MIN, MAX>
where
    H: InputPin,
    MIN: InputPin,
    MAX: InputPin,
{
    fn home(&mut self) -> Option<bool> {
        let active_high = self.active_high;
        self.home_pin
            .as_mut()
            .map(|p| p.is_high().unwrap_or(false) == active_high)
    }

    fn limit_min(&mut self) -> bool {
        let active_high = self.active_high;
        self.min_pin
            .as_mut()
            .map(|p| p.is_high().unwrap_or(false) == active_high)
            .unwrap_or(false)
    }

    fn limit_max(&mut self) -> bool {
        let active_high = self.active_high;
        self.max_pin
            .as_mut()
            .map(|p| p.is_high().unwrap_or(false) == active_high)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTransaction};

    use super::*;

    #[test]
    fn test_no_sense_reads_inactive() {
        let mut s = NoSense;
        assert_eq!(s.home(), None);
        assert!(!s.limit_min());
        assert!(!s.limit_max());
    }

    #[test]
    fn test_pin_sense_active_high() {
        let home = PinMock::new(&[PinTransaction::get(State::High)]);
        let mut s: PinSense<PinMock, PinMock, PinMock> = PinSense::new(Some(home), None, None, true);
        assert_eq!(s.home(), Some(true));
        assert!(!s.limit_min());
        let PinSense { home_pin, .. } = s;
        home_pin.unwrap().done();
    }

    #[test]
    fn test_pin_sense_active_low() {
        let max = PinMock::new(&[PinTransaction::get(State::High)]);
        let mut s: PinSense<PinMock, PinMock, PinMock> = PinSense::new(None, None, Some(max), false);
        assert!(!s.limit_max());
        let PinSense { max_pin, .. } = s;
        max_pin.unwrap().done();
    }
}
