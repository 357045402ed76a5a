//! Soft limit configuration and types.

use serde::Deserialize;

use super::units::Measure;

/// Soft limits in measures (from configuration).
///
/// Limits are self-healing: a violation blocks further motion in that
/// direction but clears as soon as the position re-enters range.
#[derive(Debug, Clone, Deserialize)]
pub struct SoftLimits {
    /// Minimum allowed position in measures.
    #[serde(rename = "min_measure")]
    pub min: Measure,

    /// Maximum allowed position in measures.
    #[serde(rename = "max_measure")]
    pub max: Measure,
}

impl SoftLimits {
    /// Create new soft limits.
    pub fn new(min: Measure, max: Measure) -> Self {
        Self { min, max }
    }

    /// Check if limits are valid (min < max).
    pub fn is_valid(&self) -> bool {
        self.min.0 < self.max.0
    }

    /// Check if a position is within limits.
    pub fn contains(&self, position: Measure) -> bool {
        position.0 >= self.min.0 && position.0 <= self.max.0
    }

    /// Whether travel past `position` in the positive direction is blocked.
    pub fn exceeded_max(&self, position: Measure) -> bool {
        position.0 > self.max.0
    }

    /// Whether travel past `position` in the negative direction is blocked.
    pub fn exceeded_min(&self, position: Measure) -> bool {
        position.0 < self.min.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains() {
        let limits = SoftLimits::new(Measure(-1.6), Measure(1.6));

        assert!(limits.contains(Measure(0.0)));
        assert!(limits.contains(Measure(1.6)));
        assert!(limits.contains(Measure(-1.6)));
        assert!(!limits.contains(Measure(1.61)));
        assert!(!limits.contains(Measure(-1.61)));
    }

    #[test]
    fn test_directional_checks() {
        let limits = SoftLimits::new(Measure(-1.6), Measure(1.6));

        assert!(limits.exceeded_max(Measure(1.7)));
        assert!(!limits.exceeded_max(Measure(1.5)));
        assert!(limits.exceeded_min(Measure(-1.7)));
        assert!(!limits.exceeded_min(Measure(0.0)));
    }
}
