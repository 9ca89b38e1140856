//! Multi-level feedback queues
//!
//! Queue `q` runs processes for `2^q` ticks at a time; using a whole quantum
//! demotes a process one queue. A process left RUNNABLE for
//! `aging_threshold` ticks is promoted one queue. Within a queue the process
//! that has waited longest runs first.

use core::fmt;

use pcore_api::Ticks;

use super::{ProcRef, SchedPolicy, pick_min};
use crate::config::{MlfqConfig, SchedulerKind};
use crate::process::{Proc, ProcInner, ProcState, ProcTable, SchedInfo};

pub struct Mlfq {
    config: MlfqConfig,
}

impl Mlfq {
    pub const fn new(config: MlfqConfig) -> Self {
        Self { config }
    }

    /// Ticks a process may run per dispatch at `queue`.
    pub const fn quantum(queue: usize) -> u32 {
        1 << queue
    }

    fn lowest(&self) -> usize {
        self.config.queues - 1
    }
}

impl SchedPolicy for Mlfq {
    fn name(&self) -> &'static str {
        "mlfq"
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Mlfq
    }

    fn select_next<'a>(&self, table: &'a ProcTable) -> Option<ProcRef<'a>> {
        pick_min(table, |inner| (inner.sched.queue, inner.sched.intime, inner.pid))
    }

    fn on_admit(&self, inner: &mut ProcInner, _parent: Option<&SchedInfo>, now: Ticks) {
        let info = &mut inner.sched;
        info.queue = 0;
        info.intime = now;
        info.waittime = 0;
        info.ticks_used = 0;
    }

    fn on_dispatch(&self, inner: &mut ProcInner, _now: Ticks) {
        inner.sched.ticks_used = 0;
        inner.sched.waittime = 0;
    }

    fn on_yield(&self, inner: &mut ProcInner, now: Ticks) {
        let pid = inner.pid;
        let info = &mut inner.sched;
        if info.queue < self.lowest() && info.ticks_used >= Self::quantum(info.queue) {
            info.queue += 1;
            log::trace!("mlfq: pid {} demoted to queue {}", pid, info.queue);
        }
        info.intime = now;
        info.ticks_used = 0;
    }

    fn on_unblock(&self, inner: &mut ProcInner, now: Ticks) {
        let info = &mut inner.sched;
        info.ticks_used = 0;
        info.intime = now;
        info.waittime = 0;
    }

    fn on_tick(&self, inner: &mut ProcInner) {
        let pid = inner.pid;
        let info = &mut inner.sched;
        info.waittime += 1;
        if info.waittime >= self.config.aging_threshold {
            info.waittime = 0;
            if info.queue > 0 {
                info.queue -= 1;
                log::trace!("mlfq: pid {} aged up to queue {}", pid, info.queue);
            }
        }
    }

    fn on_timer(&self, current: &Proc, table: &ProcTable) -> bool {
        let queue = {
            let mut inner = current.inner.lock();
            inner.sched.ticks_used += 1;
            if inner.sched.ticks_used >= Self::quantum(inner.sched.queue) {
                return true;
            }
            inner.sched.queue
        };

        table.iter().filter(|p| p.index != current.index).any(|p| {
            let inner = p.inner.lock();
            inner.state == ProcState::Runnable && inner.sched.queue < queue
        })
    }

    fn describe(&self, inner: &ProcInner, out: &mut dyn fmt::Write) -> fmt::Result {
        let info = &inner.sched;
        write!(out, "{} {} {} {} ", info.queue, info.intime, info.waittime, info.ticks_used)
    }
}
