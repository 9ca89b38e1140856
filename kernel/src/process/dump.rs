//! Process inspection

use core::fmt::{self, Write};

use pcore_api::{Pid, Ticks};

use super::proc::{ProcState, SchedInfo};
use crate::kernel::Kernel;

/// A consistent snapshot of one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcInfo {
    pub pid: Pid,
    pub state: ProcState,
    pub name: heapless::String<16>,
    pub parent: Option<Pid>,
    pub killed: bool,
    pub ctime: Ticks,
    pub rtime: Ticks,
    pub etime: Ticks,
    pub sched: SchedInfo,
}

impl Kernel {
    /// Snapshot of the live process `pid`.
    pub fn proc_info(&self, pid: Pid) -> Option<ProcInfo> {
        let parents = self.wait_lock.lock();
        let p = self.procs.iter().find(|p| {
            let inner = p.inner.lock();
            inner.state != ProcState::Unused && inner.pid == pid
        })?;
        let parent = parents[p.index].map(|slot| self.procs[slot].inner.lock().pid);

        let inner = p.inner.lock();
        if inner.state == ProcState::Unused || inner.pid != pid {
            return None;
        }
        Some(ProcInfo {
            pid: inner.pid,
            state: inner.state,
            name: unsafe { p.data() }.name.clone(),
            parent,
            killed: inner.killed,
            ctime: inner.ctime,
            rtime: inner.rtime,
            etime: inner.etime,
            sched: inner.sched,
        })
    }

    /// Number of slots in use.
    pub fn proc_count(&self) -> usize {
        self.procs
            .iter()
            .filter(|p| p.inner.lock().state != ProcState::Unused)
            .count()
    }

    /// Writes one line per live process: pid, the policy's columns, state
    /// and name. Takes no locks, so a wedged kernel can still be inspected;
    /// the listing may be torn.
    pub fn procdump(&self, out: &mut dyn Write) -> fmt::Result {
        writeln!(out)?;
        for p in self.procs.iter() {
            let inner = unsafe { p.inner.get_unchecked() };
            if inner.state == ProcState::Unused {
                continue;
            }
            let name = unsafe { &p.data().name };
            write!(out, "{} ", inner.pid)?;
            self.policy.describe(inner, out)?;
            writeln!(out, "{} {}", inner.state.as_str(), name)?;
        }
        Ok(())
    }
}
