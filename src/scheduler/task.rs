//! Task descriptors for the scheduler arena.

use heapless::String;

use super::registry::Scheduler;
use super::time::{HardwareTimers, PeriodUnit, SubMicros};

/// Maximum number of tasks the scheduler can hold.
pub const TASKS_MAX: usize = 8;

/// Lowest (numerically largest) task priority.
pub const PRIORITY_MIN: u8 = 7;

/// Opaque handle to a registered task.
///
/// Handles are small nonzero integers; slot reuse after removal recycles
/// them, so a stale handle may address a different task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskHandle(pub(crate) u8);

impl TaskHandle {
    pub(crate) fn index(self) -> usize {
        self.0 as usize - 1
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u8 + 1)
    }
}

/// Task callback.
///
/// Callbacks receive the user context and the scheduler itself, so a task
/// may adjust periods or yield again from inside its own body; the running
/// flag prevents self re-entry.
pub type TaskFn<C, H> = fn(&mut C, &mut Scheduler<C, H>);

/// What to do when a task's due time has already passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MissedTickPolicy {
    /// Run once, then reschedule from the current time (missed ticks are
    /// dropped; no catch-up burst).
    #[default]
    Skip,
    /// Keep the original cadence; every missed tick is executed late.
    Queue,
}

/// One scheduler arena slot.
pub(crate) struct Task<C, H: HardwareTimers> {
    pub name: String<8>,
    pub callback: TaskFn<C, H>,
    /// Canonical period; zero = idle.
    pub period: SubMicros,
    /// Period change staged until the next cycle.
    pub staged_period: Option<SubMicros>,
    /// Unit of the last period mutation, for round-trip reads.
    pub period_unit: PeriodUnit,
    /// Total lifetime in milliseconds; zero = unlimited.
    pub duration_ms: u32,
    pub repeat: bool,
    /// 0 (highest) ..= 7 (lowest).
    pub priority: u8,
    /// Bound hardware timer slot, if delegated.
    pub hw_timer: Option<u8>,
    /// Reentrancy guard; set while the callback executes.
    pub running: bool,
    pub missed_tick: MissedTickPolicy,
    /// Registration time, sub-micro ticks.
    pub started_at: u64,
    /// Next due time, sub-micro ticks.
    pub next_due: u64,
}

impl<C, H: HardwareTimers> Task<C, H> {
    /// Apply a staged period change and rebase the due time on `now`.
    pub fn apply_staged_period(&mut self, now: u64) {
        if let Some(period) = self.staged_period.take() {
            self.period = period;
            self.next_due = now + period.ticks() as u64;
        }
    }

    /// The period as last requested (staged change included).
    pub fn effective_period(&self) -> SubMicros {
        self.staged_period.unwrap_or(self.period)
    }

    /// Whether the task's total lifetime has elapsed.
    pub fn expired(&self, now: u64) -> bool {
        self.duration_ms > 0
            && now.saturating_sub(self.started_at)
                >= self.duration_ms as u64 * super::time::TICKS_PER_MILLI as u64
    }
}
