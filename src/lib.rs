//! # mount-motion
//!
//! Task scheduling and axis motion control for telescope mount firmware,
//! built on embedded-hal 1.0.
//!
//! ## Features
//!
//! - **Cooperative scheduler**: Up to 8 repeating or one-shot tasks with
//!   strict priorities and sub-microsecond periods
//! - **Hardware timer delegation**: Step tasks can be bound to dedicated
//!   hardware timers for jitter-free pulse trains
//! - **Step/dir and servo drivers**: One `MotorDriver` contract over GPIO
//!   pulse generation and PID-driven servo power
//! - **Backlash compensation**: Gear slack is taken up before the tracked
//!   position moves
//! - **Axis orchestration**: Acceleration ramps, soft limits, homing, and
//!   tracking composed over any driver
//! - **Configuration-driven**: Per-axis parameters from TOML files
//! - **no_std compatible**: Core library works without the standard library
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mount_motion::{Axis, AxisSettings, NoSense, Scheduler, StepDirDriver};
//!
//! // Load per-axis configuration from TOML
//! let config = mount_motion::load_config("mount.toml")?;
//! let axis_config = config.axis("ra").unwrap();
//! let settings = AxisSettings::from_config(axis_config);
//!
//! // Build a step/dir driver from embedded-hal pins
//! let driver = StepDirDriver::new(step_pin, dir_pin, Some(enable_pin),
//!     axis_config.stepdir.as_ref().unwrap());
//! let mut axis = Axis::new(driver, settings, NoSense);
//!
//! // Register the control loop and step task with the scheduler, then
//! // call scheduler.yield_now(now, &mut ctx) from the main loop.
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): Enables file I/O and TOML parsing
//! - `alloc`: Enables heap allocation for no_std with allocator
//! - `defmt`: Enables defmt logging for embedded targets

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow large error types - necessary for no_std with heapless strings
#![allow(clippy::result_large_err)]

#[cfg(feature = "alloc")]
extern crate alloc;

// Core modules
pub mod axis;
pub mod config;
pub mod driver;
pub mod error;
pub mod scheduler;

// Re-exports for ergonomic API
pub use axis::{Axis, AutoRate, HomingStage, LimitSense, NoSense, PinSense, StepTimer};
pub use config::{validate_config, AxisConfig, AxisSettings, StepDirConfig, StepWaveform, SystemConfig};
pub use driver::{
    Direction, DriverStatus, Encoder, MotionCounters, MotorDriver, ServoDriver, ServoGains,
    StepDirDriver,
};
pub use error::{Error, Result};
pub use scheduler::{
    HardwareTimers, MissedTickPolicy, NoTimers, Scheduler, SubMicros, TaskHandle, PRIORITY_MIN,
    TASKS_MAX,
};

// Configuration loading (std only)
#[cfg(feature = "std")]
pub use config::{load_config, parse_config};

// Unit types
pub use config::units::{Measure, MeasurePerSec, MeasurePerSecSq, Microsteps, Steps};
