//! PCore Kernel
//!
//! The process-management core of a small teaching kernel.
//!
//! # Architecture
//!
//! - **Process table** (`process`): fixed-capacity slots, the lifecycle state
//!   machine (allocate, fork, exit, wait, kill) and sleep/wakeup
//! - **Scheduling** (`sched`): one [`sched::SchedPolicy`] chosen at boot from
//!   round-robin, arrival order, dynamic priority, lottery and multi-level
//!   feedback queues, driven by the per-CPU dispatch loop
//! - **Traps** (`trap`, `syscall`): the kernel side of user traps, clock
//!   accounting and the process system calls
//! - **Memory**: physical pages and copy-on-write come from `pcore-mm`
//!
//! # Usage
//!
//! ```no_run
//! use pcore_kernel::{Kernel, KernelConfig, Platform};
//! # fn platform() -> Platform { unimplemented!() }
//! # fn kmem() -> &'static pcore_mm::PageAllocator { unimplemented!() }
//!
//! let kernel = Kernel::boot(KernelConfig::default(), kmem(), platform(), &[0x73, 0, 0, 0]).unwrap();
//! kernel.start_hart(0);
//! ```
//!
//! # Features
//!
//! - `baremetal`: riscv64 hart backend. Without it, harts and kernel stacks
//!   are host threads.

#![no_std]

#[cfg(not(all(feature = "baremetal", target_arch = "riscv64")))]
extern crate std;

extern crate alloc;

mod arch;
pub mod config;
pub mod cpu;
pub mod kernel;
pub mod process;
pub mod sched;
pub mod sync;
pub mod syscall;
pub mod trap;

#[cfg(not(all(feature = "baremetal", target_arch = "riscv64")))]
pub use crate::arch::KstackExit;
pub use crate::config::{KernelConfig, SchedulerKind};
pub use crate::kernel::{Kernel, Platform, UserReturn};
pub use crate::process::{Channel, ProcInfo, ProcState, TrapFrame};
pub use crate::trap::{Interrupt, TrapCause};
pub use pcore_api::{Error, KernelError, Pid, Result};
