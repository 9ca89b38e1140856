//! Trap handling
//!
//! The kernel side of traps: system-call entry, page faults, device
//! interrupts and the clock. Saving and restoring user registers is the
//! platform's job; by the time [`Kernel::user_trap`] runs the current
//! process's trap frame holds the user state.

use core::sync::atomic::Ordering;

use pcore_api::memory::{MAXVA, PteFlags};
use pcore_api::{Pid, VirtAddr};
use pcore_mm::{PAGE_SIZE, cow, page_round_down};

pub use crate::arch::Interrupt;
use crate::arch;
use crate::kernel::Kernel;
use crate::process::{Channel, Proc, ProcState};

/// Why the current process entered the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCause {
    /// `ecall` from user mode.
    Syscall,
    Interrupt(Interrupt),
    /// Load, store or instruction page fault at `addr`.
    PageFault { addr: VirtAddr },
    Unknown { scause: usize, stval: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Device {
    None,
    Other,
    Timer,
}

fn pid_of(p: &Proc) -> Pid {
    p.inner.lock().pid
}

impl Kernel {
    /// Handles a trap taken from user mode by the current process.
    pub fn user_trap(&self, cause: TrapCause) {
        arch::intr_off();
        let p = self.current();

        let mut which = Device::None;
        match cause {
            TrapCause::Syscall => {
                if self.killed(p) {
                    self.exit(-1);
                }
                // Return past the ecall.
                self.with_trapframe(|tf| tf.epc += 4);
                arch::intr_on();
                self.syscall();
            }
            TrapCause::Interrupt(irq) => which = self.devintr(irq),
            TrapCause::PageFault { addr } => self.page_fault(p, addr),
            TrapCause::Unknown { scause, stval } => {
                let epc = self.with_trapframe(|tf| tf.epc);
                log::warn!(
                    "usertrap(): unexpected scause {:#x} pid={} sepc={:#x} stval={:#x}",
                    scause,
                    pid_of(p),
                    epc,
                    stval
                );
                self.setkilled(p);
            }
        }

        if self.killed(p) {
            self.exit(-1);
        }

        if which == Device::Timer {
            self.alarm_tick(p);
            if self.policy.on_timer(p, &self.procs) {
                self.yield_now();
            }
        }

        arch::intr_off();
    }

    /// Handles an interrupt taken in kernel mode, either by a process
    /// running kernel code or by an idle dispatch loop.
    pub fn kernel_trap(&self, irq: Interrupt) {
        if self.devintr(irq) != Device::Timer {
            return;
        }
        if let Some(p) = self.myproc() {
            let running = p.inner.lock().state == ProcState::Running;
            if running && self.policy.on_timer(p, &self.procs) {
                self.yield_now();
            }
        }
    }

    fn devintr(&self, irq: Interrupt) -> Device {
        match irq {
            Interrupt::Timer => {
                if arch::cpu_id() == 0 {
                    self.clock_intr();
                }
                Device::Timer
            }
            Interrupt::External(irq) => {
                log::warn!("unexpected interrupt irq={}", irq);
                Device::Other
            }
        }
    }

    /// Advances the clock one tick and charges it to every process.
    pub fn clock_intr(&self) {
        let ticks = self.tickslock.lock();
        self.ticks.fetch_add(1, Ordering::Relaxed);

        for p in self.procs.iter() {
            let mut inner = p.inner.lock();
            match inner.state {
                ProcState::Running => inner.rtime += 1,
                ProcState::Runnable => self.policy.on_tick(&mut inner),
                _ => {}
            }
        }

        self.wakeup(Channel::of(&self.ticks));
        drop(ticks);
    }

    fn page_fault(&self, p: &Proc, va: VirtAddr) {
        let mem = unsafe { p.data() }.memory();

        let sp = mem.trapframe.sp;
        let in_guard = sp >= PAGE_SIZE && {
            let top = page_round_down(sp);
            (top - PAGE_SIZE..top).contains(&va)
        };
        if va >= MAXVA || in_guard {
            log::warn!("usertrap(): pid {} fault at {:#x} outside user memory", pid_of(p), va);
            self.setkilled(p);
            return;
        }

        let pte = mem.uvm.pt.walk(page_round_down(va)).copied();
        match pte {
            Some(pte) if pte.is_valid() && pte.flags().contains(PteFlags::U) => {
                if !pte.flags().contains(PteFlags::C) {
                    log::warn!("usertrap(): pid {} write to read-only page {:#x}", pid_of(p), va);
                    self.setkilled(p);
                    return;
                }
                match cow::resolve_fault(self.kmem, mem.uvm.pt.as_mut(), va) {
                    Ok(_) => arch::flush_tlb(),
                    Err(e) => {
                        log::warn!("usertrap(): pid {} copy-on-write at {:#x} failed: {}", pid_of(p), va, e);
                        self.setkilled(p);
                    }
                }
            }
            _ => {
                log::warn!("usertrap(): pid {} fault at unmapped {:#x}", pid_of(p), va);
                self.setkilled(p);
            }
        }
    }

    /// Counts a user timer tick and, when the alarm is due, diverts the
    /// process to its handler.
    fn alarm_tick(&self, p: &Proc) {
        let data = unsafe { p.data() };
        let alarm = &mut data.alarm;
        alarm.ticks += 1;
        let due = alarm.armed && alarm.interval > 0 && alarm.ticks - alarm.since == alarm.interval;
        if !due {
            return;
        }
        alarm.armed = false;
        let handler = alarm.handler;

        let mem = data.memory();
        *mem.trapcopy = *mem.trapframe;
        mem.trapframe.epc = handler;
    }
}
