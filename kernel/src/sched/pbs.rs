//! Priority-based scheduling
//!
//! Each process has a static priority (lower runs first) adjusted by a
//! niceness derived from how much of its recent time it spent asleep:
//!
//! ```text
//! niceness = sleep * scale / (sleep + run)
//! effective = clamp(priority - niceness + bias, 0, max)
//! ```
//!
//! Ties go to the process scheduled fewer times, then the older one, then the
//! lower pid. A running process is never preempted by the clock.

use core::fmt;

use pcore_api::Ticks;

use super::{ProcRef, SchedPolicy, pick_min};
use crate::config::{PbsConfig, SchedulerKind};
use crate::process::{Proc, ProcInner, ProcTable, SchedInfo};

pub struct Priority {
    config: PbsConfig,
}

impl Priority {
    pub const fn new(config: PbsConfig) -> Self {
        Self { config }
    }

    pub fn effective(&self, info: &SchedInfo) -> u32 {
        let dp = info.priority as i64 - info.niceness as i64 + self.config.bias;
        dp.clamp(0, self.config.max_priority as i64) as u32
    }

    fn renice(&self, info: &mut SchedInfo) {
        let total = info.sleep_ticks + info.run_ticks;
        info.niceness = if total == 0 {
            0
        } else {
            (info.sleep_ticks * self.config.niceness_scale / total) as u32
        };
    }

    /// Closes the running interval that began at the last dispatch.
    fn stop_running(&self, info: &mut SchedInfo, now: Ticks) {
        info.run_ticks = now.saturating_sub(info.last_tick);
        info.last_tick = now;
        self.renice(info);
    }
}

impl SchedPolicy for Priority {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Priority
    }

    fn init(&self, inner: &mut ProcInner) {
        inner.sched = SchedInfo {
            priority: self.config.default_priority,
            niceness: self.config.default_niceness,
            ..SchedInfo::default()
        };
    }

    fn select_next<'a>(&self, table: &'a ProcTable) -> Option<ProcRef<'a>> {
        pick_min(table, |inner| {
            (self.effective(&inner.sched), inner.sched.nscheduled, inner.ctime, inner.pid)
        })
    }

    fn on_dispatch(&self, inner: &mut ProcInner, now: Ticks) {
        inner.sched.last_tick = now;
        inner.sched.nscheduled += 1;
    }

    fn on_yield(&self, inner: &mut ProcInner, now: Ticks) {
        self.stop_running(&mut inner.sched, now);
    }

    fn on_block(&self, inner: &mut ProcInner, now: Ticks) {
        self.stop_running(&mut inner.sched, now);
    }

    fn on_unblock(&self, inner: &mut ProcInner, now: Ticks) {
        let info = &mut inner.sched;
        info.sleep_ticks = now.saturating_sub(info.last_tick);
        info.last_tick = now;
        self.renice(info);
    }

    fn on_timer(&self, _current: &Proc, _table: &ProcTable) -> bool {
        false
    }

    fn set_priority(&self, inner: &mut ProcInner, priority: u32) -> Option<u32> {
        let old = inner.sched.priority;
        inner.sched.priority = priority;
        inner.sched.niceness = self.config.default_niceness;
        Some(old)
    }

    fn describe(&self, inner: &ProcInner, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, "{} {} ", inner.sched.priority, inner.sched.niceness)
    }
}
