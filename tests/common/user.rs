//! User mode on the host
//!
//! A user program is a Rust closure registered at a fake text address. When
//! the kernel returns to user space, [`SimUser`] looks up the program at the
//! trap frame's `epc` and runs it on the process's kernel thread. The program
//! "executes instructions" by calling [`syscall`], [`tick`] and the memory
//! helpers, which enter the kernel exactly as the corresponding traps would.
//! A program that returns exits with status 0.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use pcore_api::memory::{MAXVA, PteFlags};
use pcore_kernel::syscall::SysNum;
use pcore_kernel::{Interrupt, Kernel, KstackExit, TrapCause, UserReturn};
use pcore_mm::{PAGE_SIZE, page_round_down};

pub type Program = Arc<dyn Fn(&'static Kernel) + Send + Sync>;

/// Distance between program addresses.
const TEXT_STRIDE: usize = 0x1000;

static PROGRAMS: spin::Mutex<Vec<Program>> = spin::Mutex::new(Vec::new());

/// Registers a user program and returns its entry address.
pub fn program(f: impl Fn(&'static Kernel) + Send + Sync + 'static) -> usize {
    let mut programs = PROGRAMS.lock();
    programs.push(Arc::new(f));
    programs.len() * TEXT_STRIDE
}

fn lookup(addr: usize) -> Option<Program> {
    if addr == 0 || addr % TEXT_STRIDE != 0 {
        return None;
    }
    PROGRAMS.lock().get(addr / TEXT_STRIDE - 1).cloned()
}

/// Enters the kernel with system call `num`. Returns the value left in `a0`.
pub fn syscall(k: &Kernel, num: SysNum, args: &[usize]) -> isize {
    k.with_trapframe(|tf| {
        tf.a7 = num as usize;
        let regs = [&mut tf.a0, &mut tf.a1, &mut tf.a2, &mut tf.a3, &mut tf.a4, &mut tf.a5];
        for (reg, &arg) in regs.into_iter().zip(args.iter().chain(std::iter::repeat(&0))) {
            *reg = arg;
        }
    });
    k.user_trap(TrapCause::Syscall);
    k.with_trapframe(|tf| tf.a0 as isize)
}

/// Forks a child that runs `f`. Returns the child's pid, or -1.
pub fn fork_into(k: &Kernel, f: impl Fn(&'static Kernel) + Send + Sync + 'static) -> isize {
    let entry = program(f);
    // The child resumes just past the ecall.
    k.with_trapframe(|tf| tf.epc = entry - 4);
    syscall(k, SysNum::Fork, &[])
}

/// Takes a timer interrupt in user mode. If the kernel diverts the process
/// to an alarm handler, the handler runs before this returns.
pub fn tick(k: &'static Kernel) {
    let before = k.with_trapframe(|tf| tf.epc);
    k.user_trap(TrapCause::Interrupt(Interrupt::Timer));
    let after = k.with_trapframe(|tf| tf.epc);
    if after != before {
        match lookup(after) {
            Some(handler) => handler(k),
            None => panic!("alarm handler at {:#x} is not a program", after),
        }
    }
}

/// Stores `bytes` at user address `va`, taking a page fault first on any
/// page the process may not write. Does not return if the fault kills the
/// process.
pub fn user_write(k: &'static Kernel, va: usize, bytes: &[u8]) {
    let mut page = page_round_down(va);
    while page < va + bytes.len() {
        let writable = page < MAXVA
            && k.user_pte(page)
                .is_some_and(|pte| pte.is_valid() && pte.flags().contains(PteFlags::U | PteFlags::W));
        if !writable {
            k.user_trap(TrapCause::PageFault { addr: page.max(va) });
        }
        page += PAGE_SIZE;
    }
    if let Err(e) = k.copy_out(va, bytes) {
        panic!("store to {:#x} after fault handling: {}", va, e);
    }
}

/// Loads `len` bytes from user address `va`.
pub fn user_read(k: &Kernel, va: usize, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    if let Err(e) = k.copy_in(&mut buf, va) {
        panic!("load from {:#x}: {}", va, e);
    }
    buf
}

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic".to_string()
    }
}

/// The return-to-user path of a simulated machine.
pub(crate) struct SimUser {
    /// Runs as the first process.
    pub init: Program,
    /// Panics raised by user programs.
    pub failures: Arc<Mutex<Vec<String>>>,
}

impl SimUser {
    fn run(&self, k: &'static Kernel, prog: &Program) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(|| prog(k))) {
            Ok(()) => true,
            // The program exited; its kernel stack is being torn down.
            Err(payload) if payload.is::<KstackExit>() => panic::resume_unwind(payload),
            Err(payload) => {
                let msg = panic_message(payload);
                log::error!("pid {}: user program panicked: {}", k.getpid(), msg);
                self.failures.lock().unwrap_or_else(|e| e.into_inner()).push(msg);
                false
            }
        }
    }

    /// What init does once its program is done: reap orphans forever.
    fn init_loop(k: &'static Kernel) -> ! {
        loop {
            if syscall(k, SysNum::Wait, &[0]) < 0 {
                syscall(k, SysNum::Sleep, &[1]);
            }
        }
    }
}

impl UserReturn for SimUser {
    fn user_return(&self, k: &'static Kernel) -> ! {
        let epc = k.with_trapframe(|tf| tf.epc);
        if epc == 0 {
            self.run(k, &self.init);
            Self::init_loop(k);
        }

        let status = match lookup(epc) {
            Some(prog) => {
                if self.run(k, &prog) {
                    0
                } else {
                    -1
                }
            }
            None => {
                log::warn!("pid {}: no program at {:#x}", k.getpid(), epc);
                -1
            }
        };
        syscall(k, SysNum::Exit, &[status as usize]);
        panic!("exit returned");
    }
}
