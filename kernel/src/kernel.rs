//! The kernel instance
//!
//! [`Kernel::boot`] assembles the process table, the scheduling policy and
//! the collaborators the platform supplies, creates the first process, and
//! returns a `'static` handle. Each hart then enters [`Kernel::start_hart`]
//! and never leaves the dispatch loop until [`Kernel::halt`].

use alloc::boxed::Box;
use alloc::vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use pcore_api::memory::{Pte, VmProvider};
use pcore_api::{FileSystem, Pid, Result, Ticks, VirtAddr};
use pcore_mm::{PageAllocator, uvm};

use crate::arch;
use crate::config::KernelConfig;
use crate::cpu::Cpus;
use crate::process::{Proc, ProcState, ProcTable, TrapFrame};
use crate::sched::{self, SchedPolicy};
use crate::sync::{SpinLock, pop_off, push_off};

/// Leaves the kernel for user space in the current process.
pub trait UserReturn: Send + Sync {
    /// Restores the user state in the current process's trap frame and runs
    /// it. Every later entry comes back through [`Kernel::user_trap`].
    fn user_return(&self, kernel: &'static Kernel) -> !;
}

/// What the kernel needs from the machine and the rest of the system.
pub struct Platform {
    pub vm: Box<dyn VmProvider>,
    pub fs: Box<dyn FileSystem>,
    pub user: Box<dyn UserReturn>,
}

pub struct Kernel {
    pub config: KernelConfig,
    pub procs: ProcTable,
    /// Parent slot of every slot. Also orders parent/child updates against
    /// wakeups in `wait`.
    pub(crate) wait_lock: SpinLock<Box<[Option<usize>]>>,
    pub(crate) pid_lock: SpinLock<Pid>,
    pub(crate) tickslock: SpinLock<()>,
    pub(crate) ticks: AtomicU64,
    pub(crate) initproc: spin::Once<usize>,
    pub(crate) cpus: Cpus,
    pub(crate) policy: Box<dyn SchedPolicy>,
    pub kmem: &'static PageAllocator,
    pub(crate) platform: Platform,
    halted: AtomicBool,
    /// File-system initialization, run by the first process to start.
    pub(crate) first: spin::Once<()>,
}

impl Kernel {
    /// Builds the kernel and makes `initcode` the first RUNNABLE process.
    pub fn boot(
        config: KernelConfig,
        kmem: &'static PageAllocator,
        platform: Platform,
        initcode: &[u8],
    ) -> Result<&'static Kernel> {
        config.validate()?;

        let kernel: &'static Kernel = Box::leak(Box::new(Kernel {
            procs: ProcTable::new(config.nproc, platform.vm.as_ref()),
            wait_lock: SpinLock::new(vec![None; config.nproc].into_boxed_slice(), "wait_lock"),
            pid_lock: SpinLock::new(1, "nextpid"),
            tickslock: SpinLock::new((), "time"),
            ticks: AtomicU64::new(0),
            initproc: spin::Once::new(),
            cpus: Cpus::new(config.ncpu),
            policy: sched::build(&config),
            kmem,
            platform,
            halted: AtomicBool::new(false),
            first: spin::Once::new(),
            config,
        }));

        log::info!(
            "pcore: {} slots, {} harts, {} scheduler, {} free pages",
            kernel.config.nproc,
            kernel.config.ncpu,
            kernel.policy.name(),
            kmem.free_pages()
        );

        kernel.userinit(initcode)?;
        Ok(kernel)
    }

    /// Runs the dispatch loop on hart `id`. Returns after [`Kernel::halt`].
    pub fn start_hart(&'static self, id: usize) {
        arch::init_hart(id);
        log::debug!("hart {} starting", id);
        self.scheduler();
    }

    /// Per-hart dispatch loop.
    ///
    /// Picks a process with the policy, switches to it, and picks again once
    /// it switches back. The chosen process's lock is held across the switch
    /// in both directions.
    fn scheduler(&self) {
        let cpu = match self.cpus.mycpu() {
            Some(cpu) => cpu,
            None => panic!("scheduler: hart {} not configured", arch::cpu_id()),
        };
        unsafe { (*cpu).proc = None };

        while !self.halted.load(Ordering::Acquire) {
            // Let devices interrupt an idle hart.
            arch::intr_on();

            match self.policy.select_next(&self.procs) {
                Some(mut next) => {
                    self.policy.on_dispatch(&mut next.inner, self.now());
                    next.inner.state = ProcState::Running;
                    unsafe {
                        (*cpu).proc = Some(next.proc.index);
                        arch::swtch(&mut (*cpu).context, &next.proc.data().context);
                        (*cpu).proc = None;
                    }
                    if next.inner.state == ProcState::Running {
                        panic!("sched running");
                    }
                }
                None => {
                    if let Some(irq) = arch::wait_for_interrupt() {
                        arch::intr_off();
                        self.kernel_trap(irq);
                    }
                }
            }
        }

        arch::intr_off();
        log::debug!("hart {} halted", arch::cpu_id());
    }

    /// Makes every dispatch loop return at its next iteration.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Clock ticks since boot.
    pub fn now(&self) -> Ticks {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn policy(&self) -> &dyn SchedPolicy {
        self.policy.as_ref()
    }

    /// The process running on this hart, if any.
    pub fn myproc(&self) -> Option<&Proc> {
        push_off();
        let slot = self.cpus.mycpu().and_then(|cpu| unsafe { (*cpu).proc });
        pop_off();
        slot.map(|slot| &self.procs[slot])
    }

    pub(crate) fn current(&self) -> &Proc {
        match self.myproc() {
            Some(p) => p,
            None => panic!("no current process"),
        }
    }

    pub fn getpid(&self) -> Pid {
        self.current().inner.lock().pid
    }

    /// Runs `f` on the current process's trap frame.
    pub fn with_trapframe<R>(&self, f: impl FnOnce(&mut TrapFrame) -> R) -> R {
        let mem = unsafe { self.current().data() }.memory();
        f(&mut mem.trapframe)
    }

    /// The current process's mapping of `va`.
    pub fn user_pte(&self, va: VirtAddr) -> Option<Pte> {
        let mem = unsafe { self.current().data() }.memory();
        mem.uvm.pt.walk(va).copied()
    }

    /// Size of the current process's user image.
    pub fn user_size(&self) -> usize {
        unsafe { self.current().data() }.memory().uvm.sz
    }

    /// Copies `src` into the current process's memory at `dstva`.
    pub fn copy_out(&self, dstva: VirtAddr, src: &[u8]) -> Result<()> {
        let mem = unsafe { self.current().data() }.memory();
        uvm::copy_out(self.kmem, mem.uvm.pt.as_mut(), dstva, src)
    }

    /// Copies from the current process's memory at `srcva` into `dst`.
    pub fn copy_in(&self, dst: &mut [u8], srcva: VirtAddr) -> Result<()> {
        let mem = unsafe { self.current().data() }.memory();
        uvm::copy_in(mem.uvm.pt.as_mut(), dst, srcva)
    }

    pub fn free_pages(&self) -> usize {
        self.kmem.free_pages()
    }
}
