//! First come, first served: the oldest RUNNABLE process runs until it
//! blocks or exits

use core::fmt;

use super::{ProcRef, SchedPolicy, pick_min};
use crate::config::SchedulerKind;
use crate::process::{Proc, ProcInner, ProcTable};

pub struct Fcfs;

impl SchedPolicy for Fcfs {
    fn name(&self) -> &'static str {
        "fcfs"
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Fcfs
    }

    fn select_next<'a>(&self, table: &'a ProcTable) -> Option<ProcRef<'a>> {
        pick_min(table, |inner| (inner.ctime, inner.pid))
    }

    fn on_timer(&self, _current: &Proc, _table: &ProcTable) -> bool {
        false
    }

    fn describe(&self, inner: &ProcInner, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, "{} ", inner.ctime)
    }
}
