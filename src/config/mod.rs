//! Configuration module for mount-motion.
//!
//! Provides types for loading and validating per-axis motion configurations
//! from TOML files (with `std` feature) or pre-parsed data.

mod axis;
mod limits;
#[cfg(feature = "std")]
mod loader;
mod settings;
mod system;
pub mod units;
mod validation;

pub use axis::{AxisConfig, StepDirConfig, StepWaveform};
pub use limits::SoftLimits;
pub use settings::AxisSettings;
pub use system::SystemConfig;
pub use validation::{validate_axis, validate_config};

#[cfg(feature = "std")]
pub use loader::{load_config, parse_config};

// Re-export unit types at config level
pub use units::{Measure, MeasurePerSec, MeasurePerSecSq, Microsteps, Steps};
