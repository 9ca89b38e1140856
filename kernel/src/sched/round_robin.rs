//! Round-robin: every RUNNABLE process in turn, one tick each

use core::sync::atomic::{AtomicUsize, Ordering};

use super::{ProcRef, SchedPolicy};
use crate::config::SchedulerKind;
use crate::process::{Proc, ProcState, ProcTable};

pub struct RoundRobin {
    rr_cursor: AtomicUsize,
}

impl RoundRobin {
    pub const fn new() -> Self {
        Self {
            rr_cursor: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedPolicy for RoundRobin {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::RoundRobin
    }

    fn select_next<'a>(&self, table: &'a ProcTable) -> Option<ProcRef<'a>> {
        let n = table.len();
        if n == 0 {
            return None;
        }
        let start = self.rr_cursor.load(Ordering::Relaxed);
        for i in 0..n {
            let slot = (start + i) % n;
            let proc = &table[slot];
            let inner = proc.inner.lock();
            if inner.state == ProcState::Runnable {
                self.rr_cursor.store(slot + 1, Ordering::Relaxed);
                return Some(ProcRef { proc, inner });
            }
        }
        None
    }

    fn on_timer(&self, _current: &Proc, _table: &ProcTable) -> bool {
        true
    }
}
