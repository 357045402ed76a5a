//! Error types for mount-motion.
//!
//! Configuration problems surface as [`ConfigError`]; runtime motion guards
//! (limits, faults) as [`MotionError`]. Scheduler capacity exhaustion and
//! hardware-timer unavailability are not errors; they are reported through
//! `Option`/`bool` returns and degrade gracefully.

use core::fmt;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all mount-motion operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration parsing or validation error
    Config(ConfigError),
    /// Motion request rejected
    Motion(MotionError),
}

/// Configuration-related errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to parse TOML configuration
    ParseError(heapless::String<128>),
    /// Invalid microstep value (must be power of 2: 1, 2, 4, 8, 16, 32, 64, 128, 256)
    InvalidMicrosteps(u16),
    /// Slewing microsteps must be coarser than (or equal to) tracking microsteps
    InvalidSlewingMicrosteps {
        /// Tracking microstep divisor
        tracking: u16,
        /// Slewing microstep divisor
        slewing: u16,
    },
    /// Axis name not found in configuration
    AxisNotFound(heapless::String<32>),
    /// Axis number outside 1..=9
    InvalidAxisNumber(u8),
    /// Two axes share the same axis number
    DuplicateAxisNumber(u8),
    /// Steps per measure must be > 0
    InvalidStepsPerMeasure(f32),
    /// Slew frequency must be > 0
    InvalidSlewFrequency(f32),
    /// Acceleration must be > 0
    InvalidAcceleration(f32),
    /// Invalid soft limits (min must be < max)
    InvalidSoftLimits {
        /// Minimum limit value
        min: f32,
        /// Maximum limit value
        max: f32,
    },
    /// File I/O error (std only)
    #[cfg(feature = "std")]
    IoError(heapless::String<128>),
}

/// Motion request errors.
///
/// These reject a new command; they never stop motion already in progress
/// (faults and limit hits decelerate through the abort ramp instead).
#[derive(Debug, Clone, PartialEq)]
pub enum MotionError {
    /// Position exceeds a soft limit in the direction of travel
    LimitExceeded {
        /// Current or requested position in measures
        position: f32,
        /// Limit that was exceeded (min or max) in measures
        limit: f32,
    },
    /// A hardware limit-sense input is asserted in the direction of travel
    LimitSense,
    /// The motor driver reports a hard fault
    DriverFault,
    /// A slew or homing operation is already active
    SlewInProgress,
    /// Homing requires a home sensor, none is configured
    HomeSenseMissing,
    /// The requested direction is not a travel direction
    InvalidDirection,
    /// A by-distance slew needs a positive deceleration distance
    InvalidDistance(f32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Motion(e) => write!(f, "Motion error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::InvalidMicrosteps(v) => {
                write!(
                    f,
                    "Invalid microsteps: {}. Valid values: 1, 2, 4, 8, 16, 32, 64, 128, 256",
                    v
                )
            }
            ConfigError::InvalidSlewingMicrosteps { tracking, slewing } => {
                write!(
                    f,
                    "Slewing microsteps {} must not exceed tracking microsteps {}",
                    slewing, tracking
                )
            }
            ConfigError::AxisNotFound(name) => write!(f, "Axis '{}' not found", name),
            ConfigError::InvalidAxisNumber(n) => {
                write!(f, "Invalid axis number: {}. Must be 1-9", n)
            }
            ConfigError::DuplicateAxisNumber(n) => write!(f, "Duplicate axis number: {}", n),
            ConfigError::InvalidStepsPerMeasure(v) => {
                write!(f, "Invalid steps per measure: {}. Must be > 0", v)
            }
            ConfigError::InvalidSlewFrequency(v) => {
                write!(f, "Invalid slew frequency: {}. Must be > 0", v)
            }
            ConfigError::InvalidAcceleration(v) => {
                write!(f, "Invalid acceleration: {}. Must be > 0", v)
            }
            ConfigError::InvalidSoftLimits { min, max } => {
                write!(f, "Invalid soft limits: min ({}) must be < max ({})", min, max)
            }
            #[cfg(feature = "std")]
            ConfigError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for MotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionError::LimitExceeded { position, limit } => {
                write!(f, "Position {} exceeds limit {}", position, limit)
            }
            MotionError::LimitSense => write!(f, "Limit sense input asserted"),
            MotionError::DriverFault => write!(f, "Motor driver fault"),
            MotionError::SlewInProgress => write!(f, "A slew is already in progress"),
            MotionError::HomeSenseMissing => write!(f, "No home sensor configured"),
            MotionError::InvalidDirection => write!(f, "Not a travel direction"),
            MotionError::InvalidDistance(d) => {
                write!(f, "Invalid deceleration distance: {}. Must be > 0", d)
            }
        }
    }
}

// Conversion impls
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<MotionError> for Error {
    fn from(e: MotionError) -> Self {
        Error::Motion(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl std::error::Error for MotionError {}
