// Per-CPU state
//
// One Cpu per hart that runs a dispatch loop. A hart only ever touches its
// own slot, with interrupts off, so the slots need no lock.

use alloc::boxed::Box;
use core::cell::UnsafeCell;

use crate::arch::{self, Context};

pub struct Cpu {
    /// Process table slot running on this hart, if any.
    pub proc: Option<usize>,
    /// Saved registers of this hart's dispatch loop.
    pub context: Context,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            proc: None,
            context: Context::new(),
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Cpus {
    cpus: Box<[UnsafeCell<Cpu>]>,
}

unsafe impl Sync for Cpus {}

impl Cpus {
    pub fn new(ncpu: usize) -> Self {
        Self {
            cpus: (0..ncpu).map(|_| UnsafeCell::new(Cpu::new())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    /// The current hart's slot, or `None` on a thread that is not one of
    /// the configured harts. Interrupts must be off, and the pointer is only
    /// meaningful until the caller next gives up the hart.
    pub fn mycpu(&self) -> Option<*mut Cpu> {
        self.cpus.get(arch::cpu_id()).map(|cell| cell.get())
    }
}
