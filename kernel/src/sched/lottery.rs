//! Lottery scheduling
//!
//! Each dispatch draws a winning ticket uniformly from the tickets held by
//! RUNNABLE processes. A process inherits its parent's ticket count at fork.

use core::fmt;
use core::sync::atomic::{AtomicI64, Ordering};

use pcore_api::Ticks;

use super::rand::ParkMiller;
use super::{ProcRef, SchedPolicy};
use crate::config::{LotteryConfig, SchedulerKind};
use crate::process::{Proc, ProcInner, ProcState, ProcTable, SchedInfo};

pub struct Lottery {
    config: LotteryConfig,
    /// Tickets held by RUNNABLE processes.
    total: AtomicI64,
    rng: ParkMiller,
}

impl Lottery {
    pub const fn new(config: LotteryConfig) -> Self {
        Self {
            config,
            total: AtomicI64::new(0),
            rng: ParkMiller::new(config.seed),
        }
    }

    /// Tickets currently in the draw.
    pub fn outstanding(&self) -> i64 {
        self.total.load(Ordering::Relaxed)
    }

    /// A winning ticket in `1..=total`, or `None` with no tickets out.
    pub fn draw(&self, total: i64) -> Option<i64> {
        if total <= 0 {
            return None;
        }
        Some((self.rng.next() % total as u64) as i64 + 1)
    }

    fn enter(&self, inner: &ProcInner) {
        self.total.fetch_add(inner.sched.tickets as i64, Ordering::Relaxed);
    }
}

impl SchedPolicy for Lottery {
    fn name(&self) -> &'static str {
        "lottery"
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Lottery
    }

    fn select_next<'a>(&self, table: &'a ProcTable) -> Option<ProcRef<'a>> {
        let winner = self.draw(self.outstanding())?;
        let mut counted = 0i64;
        for proc in table.iter() {
            let inner = proc.inner.lock();
            if inner.state != ProcState::Runnable {
                continue;
            }
            counted += inner.sched.tickets as i64;
            if counted >= winner {
                return Some(ProcRef { proc, inner });
            }
        }
        None
    }

    fn on_admit(&self, inner: &mut ProcInner, parent: Option<&SchedInfo>, _now: Ticks) {
        inner.sched.tickets = parent.map_or(self.config.init_tickets, |p| p.tickets);
        self.enter(inner);
    }

    fn on_dispatch(&self, inner: &mut ProcInner, _now: Ticks) {
        self.total.fetch_sub(inner.sched.tickets as i64, Ordering::Relaxed);
    }

    fn on_yield(&self, inner: &mut ProcInner, _now: Ticks) {
        self.enter(inner);
    }

    fn on_unblock(&self, inner: &mut ProcInner, _now: Ticks) {
        self.enter(inner);
    }

    fn on_timer(&self, _current: &Proc, _table: &ProcTable) -> bool {
        true
    }

    fn set_tickets(&self, inner: &mut ProcInner, tickets: u32) -> bool {
        // Only the running process sets its own tickets, and it is not in
        // the draw.
        inner.sched.tickets = tickets;
        true
    }

    fn describe(&self, inner: &ProcInner, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, "{} ", inner.sched.tickets)
    }
}
