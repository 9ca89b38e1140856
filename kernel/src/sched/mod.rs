//! Scheduling policies
//!
//! A policy owns the choice of which RUNNABLE process a hart dispatches next
//! and the per-process bookkeeping that choice depends on. The process core
//! reports every state transition through the `on_*` hooks, always with the
//! process lock held, so a policy never has to take locks for the process it
//! is told about.
//!
//! Exactly one policy is active, chosen at boot by [`SchedulerKind`].

use alloc::boxed::Box;
use core::fmt;

use pcore_api::Ticks;

use crate::config::{KernelConfig, SchedulerKind};
use crate::process::{Proc, ProcInner, ProcState, ProcTable, SchedInfo};
use crate::sync::SpinLockGuard;

mod fcfs;
pub mod lottery;
mod mlfq;
mod pbs;
pub mod rand;
mod round_robin;

pub use fcfs::Fcfs;
pub use lottery::Lottery;
pub use mlfq::Mlfq;
pub use pbs::Priority;
pub use round_robin::RoundRobin;

/// A RUNNABLE process chosen for dispatch, still locked.
pub struct ProcRef<'a> {
    pub proc: &'a Proc,
    pub inner: SpinLockGuard<'a, ProcInner>,
}

pub trait SchedPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> SchedulerKind;

    /// Resets the policy fields of a freshly claimed or freed slot.
    fn init(&self, inner: &mut ProcInner) {
        inner.sched = SchedInfo::default();
    }

    /// Picks the next process to dispatch and returns it locked and still
    /// RUNNABLE. `None` leaves the hart idle until the next interrupt.
    fn select_next<'a>(&self, table: &'a ProcTable) -> Option<ProcRef<'a>>;

    /// A process became RUNNABLE for the first time. `parent` is the
    /// forking parent's bookkeeping, `None` for the first process.
    fn on_admit(&self, _inner: &mut ProcInner, _parent: Option<&SchedInfo>, _now: Ticks) {}

    /// The process is about to run.
    fn on_dispatch(&self, _inner: &mut ProcInner, _now: Ticks) {}

    /// The process gave up the CPU and is RUNNABLE again.
    fn on_yield(&self, _inner: &mut ProcInner, _now: Ticks) {}

    /// The process is going to sleep.
    fn on_block(&self, _inner: &mut ProcInner, _now: Ticks) {}

    /// A sleeping process was woken or killed and is RUNNABLE.
    fn on_unblock(&self, _inner: &mut ProcInner, _now: Ticks) {}

    /// One clock tick passed while the process waited RUNNABLE.
    fn on_tick(&self, _inner: &mut ProcInner) {}

    /// A timer interrupt arrived while `current` was running. Returns
    /// whether it should give up the CPU. Called without any process lock.
    fn on_timer(&self, current: &Proc, table: &ProcTable) -> bool;

    /// Sets the static priority. Returns the old one, or `None` if the
    /// policy has no priorities.
    fn set_priority(&self, _inner: &mut ProcInner, _priority: u32) -> Option<u32> {
        None
    }

    /// Sets the ticket count. Returns `false` if the policy has no tickets.
    fn set_tickets(&self, _inner: &mut ProcInner, _tickets: u32) -> bool {
        false
    }

    /// Policy columns for the debug listing, each followed by a space.
    fn describe(&self, _inner: &ProcInner, _out: &mut dyn fmt::Write) -> fmt::Result {
        Ok(())
    }
}

/// Builds the policy the configuration names.
pub fn build(config: &KernelConfig) -> Box<dyn SchedPolicy> {
    match config.policy {
        SchedulerKind::RoundRobin => Box::new(RoundRobin::new()),
        SchedulerKind::Fcfs => Box::new(Fcfs),
        SchedulerKind::Priority => Box::new(Priority::new(config.pbs)),
        SchedulerKind::Lottery => Box::new(Lottery::new(config.lottery)),
        SchedulerKind::Mlfq => Box::new(Mlfq::new(config.mlfq)),
    }
}

/// The RUNNABLE process with the smallest `key`.
///
/// Scans with one lock held at a time, then relocks the winner. If it was
/// taken meanwhile the scan starts over.
pub(crate) fn pick_min<'a, K, F>(table: &'a ProcTable, key: F) -> Option<ProcRef<'a>>
where
    K: Ord,
    F: Fn(&ProcInner) -> K,
{
    loop {
        let mut best: Option<(K, usize)> = None;
        for p in table.iter() {
            let inner = p.inner.lock();
            if inner.state != ProcState::Runnable {
                continue;
            }
            let k = key(&inner);
            if best.as_ref().is_none_or(|(b, _)| k < *b) {
                best = Some((k, p.index));
            }
        }

        let (_, slot) = best?;
        let proc = &table[slot];
        let inner = proc.inner.lock();
        if inner.state == ProcState::Runnable {
            return Some(ProcRef { proc, inner });
        }
    }
}
