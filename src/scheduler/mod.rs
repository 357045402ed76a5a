//! Real-time task scheduling.
//!
//! A fixed-capacity registry of periodic callbacks, each assignable to
//! either cooperative polling ([`Scheduler::yield_now`]) or a delegated
//! hardware timer, with priority-ordered dispatch and runtime period
//! mutation.

mod registry;
mod task;
mod time;

pub use registry::Scheduler;
pub use task::{MissedTickPolicy, TaskFn, TaskHandle, PRIORITY_MIN, TASKS_MAX};
pub use time::{
    HardwareTimers, NoTimers, PeriodUnit, SubMicros, TICKS_PER_MICRO, TICKS_PER_MILLI,
};
