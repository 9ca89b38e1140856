//! Process table
//!
//! A fixed array of slots created at boot. A slot is claimed by scanning for
//! an UNUSED entry under its lock and returned to UNUSED only when its parent
//! reaps it.

use alloc::boxed::Box;
use core::ops::Index;
use core::slice;

use pcore_api::memory::{PteFlags, TRAMPOLINE, TRAPFRAME, VmProvider};
use pcore_api::{Error, KernelError, Pid, Result};
use pcore_mm::{PAGE_SIZE, PageBox};

use super::lifecycle::fork_ret;
use super::proc::{Alarm, Proc, ProcInner, ProcMemory, ProcState, TrapFrame, UserSpace};
use crate::kernel::Kernel;
use crate::sync::SpinLockGuard;

pub struct ProcTable {
    procs: Box<[Proc]>,
}

impl ProcTable {
    pub fn new(nproc: usize, vm: &dyn VmProvider) -> Self {
        Self {
            procs: (0..nproc).map(|slot| Proc::new(slot, vm.kstack(slot))).collect(),
        }
    }

    pub fn iter(&self) -> slice::Iter<'_, Proc> {
        self.procs.iter()
    }

    pub fn get(&self, slot: usize) -> Option<&Proc> {
        self.procs.get(slot)
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }
}

impl Index<usize> for ProcTable {
    type Output = Proc;

    fn index(&self, slot: usize) -> &Proc {
        &self.procs[slot]
    }
}

impl<'a> IntoIterator for &'a ProcTable {
    type Item = &'a Proc;
    type IntoIter = slice::Iter<'a, Proc>;

    fn into_iter(self) -> Self::IntoIter {
        self.procs.iter()
    }
}

impl Kernel {
    fn allocpid(&self) -> Pid {
        let mut next = self.pid_lock.lock();
        let pid = *next;
        *next += 1;
        pid
    }

    /// Claims an UNUSED slot and gives it a pid, a trap frame, an empty user
    /// page table and a kernel context that starts in [`fork_ret`].
    ///
    /// Returns with the new process's lock held and its state USED.
    pub(crate) fn allocproc(&self) -> Result<(&Proc, SpinLockGuard<'_, ProcInner>)> {
        for p in self.procs.iter() {
            let mut inner = p.inner.lock();
            if inner.state != ProcState::Unused {
                continue;
            }

            inner.pid = self.allocpid();
            inner.state = ProcState::Used;
            inner.ctime = self.now();
            inner.rtime = 0;
            inner.etime = 0;
            self.policy.init(&mut inner);

            let data = unsafe { p.data() };
            match self.proc_memory() {
                Ok(mem) => data.mem = Some(mem),
                Err(e) => {
                    self.freeproc(p, &mut inner);
                    return Err(e);
                }
            }
            data.alarm = Alarm::default();
            data.trace_mask = 0;
            data.context.prepare(fork_ret, data.kstack + PAGE_SIZE, self as *const Kernel as usize);

            return Ok((p, inner));
        }
        Err(Error::Kernel(KernelError::ProcessLimit))
    }

    /// Trap frames and a user page table with only the trampoline and the
    /// trap frame mapped.
    fn proc_memory(&self) -> Result<ProcMemory> {
        let trapframe = PageBox::new(self.kmem, TrapFrame::default())?;
        let trapcopy = PageBox::new(self.kmem, TrapFrame::default())?;
        let mut uvm = UserSpace::new(self.platform.vm.create()?, self.kmem);
        uvm.pt.map(TRAMPOLINE, self.platform.vm.trampoline(), PteFlags::R | PteFlags::X)?;
        uvm.pt.map(TRAPFRAME, trapframe.pa(), PteFlags::R | PteFlags::W)?;
        Ok(ProcMemory { uvm, trapframe, trapcopy })
    }

    /// Releases everything a slot owns and marks it UNUSED.
    /// The caller holds the slot's lock.
    pub(crate) fn freeproc(&self, p: &Proc, inner: &mut ProcInner) {
        let data = unsafe { p.data() };
        data.mem = None;
        data.name.clear();
        data.trace_mask = 0;
        data.alarm = Alarm::default();

        inner.pid = 0;
        inner.chan = None;
        inner.killed = false;
        inner.xstate = 0;
        inner.state = ProcState::Unused;
        self.policy.init(inner);
    }
}
