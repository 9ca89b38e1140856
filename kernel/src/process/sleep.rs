//! Sleep, wakeup and the switch back to the dispatch loop

use super::proc::{Channel, Proc, ProcInner, ProcState};
use crate::arch;
use crate::cpu::Cpu;
use crate::kernel::Kernel;
use crate::sync::{SpinLock, SpinLockGuard};

impl Kernel {
    /// Switches from the current process to this hart's dispatch loop and
    /// returns once the process is dispatched again, possibly on another hart.
    ///
    /// The caller holds only the process lock and has already changed the
    /// process out of RUNNING.
    pub(crate) fn sched<'a>(&self, p: &Proc, inner: SpinLockGuard<'a, ProcInner>) -> SpinLockGuard<'a, ProcInner> {
        let cpu = self.sched_check(p, &inner);
        let intena = arch::intena();
        unsafe { arch::swtch(&mut p.data().context, &(*cpu).context) };
        arch::set_intena(intena);
        inner
    }

    /// The last switch away from a ZOMBIE. Its kernel stack is never resumed;
    /// the dispatch loop releases the process lock.
    pub(crate) fn sched_exit(&self, p: &Proc, inner: SpinLockGuard<'_, ProcInner>) -> ! {
        let cpu = self.sched_check(p, &inner);
        if inner.state != ProcState::Zombie {
            panic!("sched_exit not zombie");
        }
        core::mem::forget(inner);
        unsafe { arch::swtch_exit(&mut p.data().context, &(*cpu).context) }
    }

    fn sched_check(&self, p: &Proc, inner: &ProcInner) -> *mut Cpu {
        if !p.inner.holding() {
            panic!("sched p->lock");
        }
        if arch::noff() != 1 {
            panic!("sched locks");
        }
        if inner.state == ProcState::Running {
            panic!("sched running");
        }
        if arch::intr_get() {
            panic!("sched interruptible");
        }

        match self.cpus.mycpu() {
            Some(cpu) => cpu,
            None => panic!("sched: not on a hart"),
        }
    }

    /// Gives up the CPU for one scheduling round.
    pub fn yield_now(&self) {
        let p = self.current();
        let mut inner = p.inner.lock();
        inner.state = ProcState::Runnable;
        self.policy.on_yield(&mut inner, self.now());
        drop(self.sched(p, inner));
    }

    /// Atomically releases `guard` and sleeps on `chan`; the lock is
    /// reacquired before returning.
    ///
    /// Holding the process lock across the release means a wakeup issued
    /// after `guard` is dropped cannot run until the process is SLEEPING.
    pub fn sleep<'a, T: ?Sized>(&self, chan: Channel, guard: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T> {
        let p = self.current();
        let mut inner = p.inner.lock();
        let lk = SpinLock::unlock(guard);

        inner.chan = Some(chan);
        inner.state = ProcState::Sleeping;
        self.policy.on_block(&mut inner, self.now());

        let mut inner = self.sched(p, inner);
        inner.chan = None;
        drop(inner);

        lk.lock()
    }

    /// Makes every process sleeping on `chan` RUNNABLE. Must be called
    /// without any process lock held.
    pub fn wakeup(&self, chan: Channel) {
        let me = self.myproc().map(|p| p.index);
        let now = self.now();
        for p in self.procs.iter() {
            if Some(p.index) == me {
                continue;
            }
            let mut inner = p.inner.lock();
            if inner.state == ProcState::Sleeping && inner.chan == Some(chan) {
                inner.state = ProcState::Runnable;
                inner.chan = None;
                self.policy.on_unblock(&mut inner, now);
            }
        }
    }
}
