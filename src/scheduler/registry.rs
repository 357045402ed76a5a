//! Fixed-arena priority scheduler.
//!
//! Tasks live in a fixed-size arena owned exclusively by the scheduler and
//! are addressed through [`TaskHandle`]s. Dispatch is cooperative: each
//! [`Scheduler::yield_now`] call executes at most one due task, scanning
//! priority levels from highest (0) to lowest (7). Tasks bound to a hardware
//! timer are never dispatched cooperatively; the firmware's timer ISR enters
//! through [`Scheduler::run_hardware_timer`] instead.

use heapless::String;

use super::task::{MissedTickPolicy, Task, TaskFn, TaskHandle, PRIORITY_MIN, TASKS_MAX};
use super::time::{HardwareTimers, PeriodUnit, SubMicros};

/// Priority-ordered registry of periodic tasks.
///
/// Generic over the user context `C` handed to every callback and the
/// hardware timer backend `H`.
pub struct Scheduler<C, H: HardwareTimers> {
    tasks: [Option<Task<C, H>>; TASKS_MAX],
    hw: H,
    /// Last time handed to `yield_now`, sub-micro ticks.
    now: u64,
}

impl<C, H: HardwareTimers> Scheduler<C, H> {
    /// Create an empty scheduler over the given hardware timer backend.
    pub fn new(hw: H) -> Self {
        Self {
            tasks: core::array::from_fn(|_| None),
            hw,
            now: 0,
        }
    }

    /// The time of the most recent `yield_now` call, in sub-micro ticks.
    #[inline]
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_some()).count()
    }

    /// Whether a handle currently addresses a task.
    pub fn contains(&self, handle: TaskHandle) -> bool {
        self.task(handle).is_some()
    }

    /// The hardware timer backend.
    pub fn timers(&self) -> &H {
        &self.hw
    }

    /// Register a periodic task.
    ///
    /// A zero `period_ms` registers the task idle; a zero `duration_ms`
    /// means unlimited lifetime. Returns `None` when the arena is full or
    /// `priority` is out of range; callers must treat a full arena as the
    /// feature being absent, not as a fatal error.
    pub fn add(
        &mut self,
        period_ms: u32,
        duration_ms: u32,
        repeat: bool,
        priority: u8,
        callback: TaskFn<C, H>,
        name: &str,
    ) -> Option<TaskHandle> {
        if priority > PRIORITY_MIN {
            return None;
        }
        let period = SubMicros::from_millis(period_ms)?;
        let slot = self.tasks.iter().position(|t| t.is_none())?;

        let mut short_name: String<8> = String::new();
        for c in name.chars().take(8) {
            let _ = short_name.push(c);
        }

        self.tasks[slot] = Some(Task {
            name: short_name,
            callback,
            period,
            staged_period: None,
            period_unit: PeriodUnit::Millis,
            duration_ms,
            repeat,
            priority,
            hw_timer: None,
            running: false,
            missed_tick: MissedTickPolicy::default(),
            started_at: self.now,
            next_due: self.now + period.ticks() as u64,
        });
        Some(TaskHandle::from_index(slot))
    }

    /// Remove a task.
    ///
    /// Refused while the task's callback is executing. Releases any bound
    /// hardware timer.
    pub fn remove(&mut self, handle: TaskHandle) -> bool {
        let index = handle.index();
        let timer = match self.tasks.get(index).and_then(|t| t.as_ref()) {
            Some(task) if !task.running => task.hw_timer,
            _ => return false,
        };
        if let Some(timer) = timer {
            self.hw.disarm(timer);
        }
        self.tasks[index] = None;
        true
    }

    /// Set a task's period in milliseconds. Takes effect on the next cycle.
    pub fn set_period(&mut self, handle: TaskHandle, period_ms: u32) -> bool {
        let period = SubMicros::from_millis(period_ms).unwrap_or(SubMicros::ZERO);
        self.set_period_ticks(handle, period, PeriodUnit::Millis)
    }

    /// Set a task's period in microseconds. Takes effect on the next cycle.
    pub fn set_period_micros(&mut self, handle: TaskHandle, period_us: u32) -> bool {
        let period = SubMicros::from_micros(period_us).unwrap_or(SubMicros::ZERO);
        self.set_period_ticks(handle, period, PeriodUnit::Micros)
    }

    /// Set a task's period in sub-micro ticks. Takes effect on the next
    /// cycle; hardware-bound tasks are reprogrammed directly.
    pub fn set_period_sub_micros(&mut self, handle: TaskHandle, period: SubMicros) -> bool {
        self.set_period_ticks(handle, period, PeriodUnit::SubMicros)
    }

    /// Set a task's period from a frequency in Hz.
    ///
    /// An unrepresentable frequency disables the task (period forced to 0).
    pub fn set_frequency(&mut self, handle: TaskHandle, hz: f32) -> bool {
        let period = SubMicros::from_frequency(hz).unwrap_or(SubMicros::ZERO);
        self.set_period_ticks(handle, period, PeriodUnit::SubMicros)
    }

    fn set_period_ticks(
        &mut self,
        handle: TaskHandle,
        period: SubMicros,
        unit: PeriodUnit,
    ) -> bool {
        let Some(task) = self.tasks.get_mut(handle.index()).and_then(|t| t.as_mut()) else {
            return false;
        };
        task.period_unit = unit;
        match task.hw_timer {
            Some(timer) => {
                // A period the timer cannot realize disables the task rather
                // than leaving the timer in an inconsistent state.
                let realized = if period.is_zero() || period.in_timer_range() {
                    period
                } else {
                    SubMicros::ZERO
                };
                task.period = realized;
                task.staged_period = None;
                self.hw.set_period(timer, realized);
            }
            None => {
                task.staged_period = Some(period);
            }
        }
        true
    }

    /// Read back a task's period in the requested unit.
    pub fn period(&self, handle: TaskHandle, unit: PeriodUnit) -> Option<u32> {
        self.task(handle)
            .map(|task| unit.from_ticks(task.effective_period()))
    }

    /// The unit the task's period was last specified in.
    pub fn period_unit(&self, handle: TaskHandle) -> Option<PeriodUnit> {
        self.task(handle).map(|task| task.period_unit)
    }

    /// Swap the function invoked by the task.
    ///
    /// Takes effect on the task's next invocation.
    pub fn set_callback(&mut self, handle: TaskHandle, callback: TaskFn<C, H>) -> bool {
        match self.task_mut(handle) {
            Some(task) => {
                task.callback = callback;
                true
            }
            None => false,
        }
    }

    /// Change a task's priority (0 highest, 7 lowest).
    ///
    /// Hardware-bound tasks must stay at priority 0.
    pub fn set_priority(&mut self, handle: TaskHandle, priority: u8) -> bool {
        if priority > PRIORITY_MIN {
            return false;
        }
        match self.task_mut(handle) {
            Some(task) => {
                if task.hw_timer.is_some() && priority != 0 {
                    return false;
                }
                task.priority = priority;
                true
            }
            None => false,
        }
    }

    /// Select how the task handles a due time that has already passed.
    pub fn set_missed_tick_policy(&mut self, handle: TaskHandle, policy: MissedTickPolicy) -> bool {
        match self.task_mut(handle) {
            Some(task) => {
                task.missed_tick = policy;
                true
            }
            None => false,
        }
    }

    /// Diagnostic task name.
    pub fn task_name(&self, handle: TaskHandle) -> Option<&str> {
        self.task(handle).map(|task| task.name.as_str())
    }

    /// Delegate a task to a hardware timer.
    ///
    /// Succeeds only for a repeating, priority-0 task and a free timer slot;
    /// on success the task's period is thereafter realized by direct timer
    /// reprogramming. On failure the task stays on the cooperative path:
    /// a graceful degradation, not an error.
    pub fn request_hardware_timer(
        &mut self,
        handle: TaskHandle,
        timer: u8,
        hw_priority: u8,
    ) -> bool {
        if timer >= self.hw.timer_count() {
            return false;
        }
        if self
            .tasks
            .iter()
            .flatten()
            .any(|task| task.hw_timer == Some(timer))
        {
            return false;
        }
        let period = match self.task(handle) {
            Some(task) if task.repeat && task.priority == 0 && task.hw_timer.is_none() => {
                task.effective_period()
            }
            _ => return false,
        };
        if !period.is_zero() && !period.in_timer_range() {
            return false;
        }
        if !self.hw.arm(timer, period, hw_priority) {
            return false;
        }
        if let Some(task) = self.task_mut(handle) {
            task.hw_timer = Some(timer);
            task.period = period;
            task.staged_period = None;
        }
        true
    }

    /// The cooperative scheduling primitive.
    ///
    /// Scans priority levels 0..=7 and, within a level, tasks in
    /// registration order; executes at most one due, non-running,
    /// non-hardware task, then returns `true`. Tasks re-entered through a
    /// nested `yield_now` from their own callback are skipped via the
    /// running flag. `now` is the current time in sub-micro ticks.
    pub fn yield_now(&mut self, now: u64, ctx: &mut C) -> bool {
        self.now = now;
        for priority in 0..=PRIORITY_MIN {
            for index in 0..TASKS_MAX {
                let mut expired = false;
                let mut due: Option<TaskFn<C, H>> = None;

                if let Some(task) = self.tasks[index].as_mut() {
                    if task.priority != priority || task.hw_timer.is_some() || task.running {
                        continue;
                    }
                    task.apply_staged_period(now);
                    if task.expired(now) {
                        expired = true;
                    } else if !task.period.is_zero() && now >= task.next_due {
                        match task.missed_tick {
                            // Late execution does not cause a catch-up burst.
                            MissedTickPolicy::Skip => {
                                task.next_due = now + task.period.ticks() as u64;
                            }
                            MissedTickPolicy::Queue => {
                                task.next_due += task.period.ticks() as u64;
                            }
                        }
                        task.running = true;
                        due = Some(task.callback);
                    }
                } else {
                    continue;
                }

                if expired {
                    self.tasks[index] = None;
                    continue;
                }
                if let Some(callback) = due {
                    callback(ctx, self);
                    let mut remove = false;
                    if let Some(task) = self.tasks[index].as_mut() {
                        task.running = false;
                        remove = !task.repeat || task.expired(self.now);
                    }
                    if remove {
                        self.remove(TaskHandle::from_index(index));
                    }
                    return true;
                }
            }
        }
        false
    }

    /// ISR entry point for a delegated hardware timer.
    ///
    /// Invokes the callback of the task bound to `timer`. Returns `false`
    /// when no runnable task is bound.
    pub fn run_hardware_timer(&mut self, timer: u8, ctx: &mut C) -> bool {
        let mut found: Option<(usize, TaskFn<C, H>)> = None;
        for (index, slot) in self.tasks.iter().enumerate() {
            if let Some(task) = slot {
                if task.hw_timer == Some(timer) && !task.running && !task.period.is_zero() {
                    found = Some((index, task.callback));
                    break;
                }
            }
        }
        let Some((index, callback)) = found else {
            return false;
        };
        if let Some(task) = self.tasks[index].as_mut() {
            task.running = true;
        }
        callback(ctx, self);
        if let Some(task) = self.tasks[index].as_mut() {
            task.running = false;
        }
        true
    }

    fn task(&self, handle: TaskHandle) -> Option<&Task<C, H>> {
        self.tasks.get(handle.index()).and_then(|t| t.as_ref())
    }

    fn task_mut(&mut self, handle: TaskHandle) -> Option<&mut Task<C, H>> {
        self.tasks.get_mut(handle.index()).and_then(|t| t.as_mut())
    }
}
