//! Process control block

use alloc::boxed::Box;

use pcore_api::memory::{PageTable, TRAMPOLINE, TRAPFRAME};
use pcore_api::{FileRef, InodeRef, Pid, Ticks, VirtAddr};
use pcore_mm::{PAGE_SIZE, PageAllocator, PageBox, uvm};
use core::cell::UnsafeCell;

use crate::arch::Context;
use crate::config::NOFILE;
use crate::sync::SpinLock;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Used,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

impl ProcState {
    /// Fixed-width name used by the debug listing.
    pub const fn as_str(self) -> &'static str {
        match self {
            ProcState::Unused => "unused",
            ProcState::Used => "used",
            ProcState::Sleeping => "sleep ",
            ProcState::Runnable => "runble",
            ProcState::Running => "run   ",
            ProcState::Zombie => "zombie",
        }
    }
}

/// Opaque token matching a sleeper to the event that wakes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel(usize);

impl Channel {
    /// The channel named by the address of `obj`.
    pub fn of<T: ?Sized>(obj: &T) -> Self {
        Channel(obj as *const T as *const () as usize)
    }

    pub const fn from_raw(token: usize) -> Self {
        Channel(token)
    }
}

/// Policy bookkeeping. Every policy reads only its own fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedInfo {
    // dynamic priority
    pub priority: u32,
    pub niceness: u32,
    pub nscheduled: u32,
    /// Tick of the last dispatch, sleep or wakeup.
    pub last_tick: Ticks,
    pub run_ticks: Ticks,
    pub sleep_ticks: Ticks,

    // lottery
    pub tickets: u32,

    // feedback queues
    pub queue: usize,
    pub ticks_used: u32,
    /// Tick at which the process last became RUNNABLE.
    pub intime: Ticks,
    pub waittime: Ticks,
}

/// Fields protected by the process lock.
#[derive(Debug)]
pub struct ProcInner {
    pub state: ProcState,
    pub pid: Pid,
    /// Set only while SLEEPING.
    pub chan: Option<Channel>,
    pub killed: bool,
    pub xstate: i32,
    pub ctime: Ticks,
    pub rtime: Ticks,
    pub etime: Ticks,
    pub sched: SchedInfo,
}

impl ProcInner {
    pub const fn new() -> Self {
        Self {
            state: ProcState::Unused,
            pid: 0,
            chan: None,
            killed: false,
            xstate: 0,
            ctime: 0,
            rtime: 0,
            etime: 0,
            sched: SchedInfo {
                priority: 0,
                niceness: 0,
                nscheduled: 0,
                last_tick: 0,
                run_ticks: 0,
                sleep_ticks: 0,
                tickets: 0,
                queue: 0,
                ticks_used: 0,
                intime: 0,
                waittime: 0,
            },
        }
    }
}

/// Saved user registers, one page per process.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapFrame {
    pub kernel_satp: usize,
    pub kernel_sp: usize,
    pub kernel_trap: usize,
    pub epc: usize,
    pub kernel_hartid: usize,
    pub ra: usize,
    pub sp: usize,
    pub gp: usize,
    pub tp: usize,
    pub t0: usize,
    pub t1: usize,
    pub t2: usize,
    pub s0: usize,
    pub s1: usize,
    pub a0: usize,
    pub a1: usize,
    pub a2: usize,
    pub a3: usize,
    pub a4: usize,
    pub a5: usize,
    pub a6: usize,
    pub a7: usize,
    pub s2: usize,
    pub s3: usize,
    pub s4: usize,
    pub s5: usize,
    pub s6: usize,
    pub s7: usize,
    pub s8: usize,
    pub s9: usize,
    pub s10: usize,
    pub s11: usize,
    pub t3: usize,
    pub t4: usize,
    pub t5: usize,
    pub t6: usize,
}

static_assertions::const_assert!(core::mem::size_of::<TrapFrame>() <= PAGE_SIZE);

/// A user page table and the user image below `sz`.
///
/// Dropping it removes the trampoline and trap-frame mappings, which it does
/// not own, and releases every user page.
pub struct UserSpace {
    pub pt: Box<dyn PageTable>,
    pub sz: usize,
    kmem: &'static PageAllocator,
}

impl UserSpace {
    pub fn new(pt: Box<dyn PageTable>, kmem: &'static PageAllocator) -> Self {
        Self { pt, sz: 0, kmem }
    }
}

impl Drop for UserSpace {
    fn drop(&mut self) {
        self.pt.unmap(TRAMPOLINE);
        self.pt.unmap(TRAPFRAME);
        uvm::free_user(self.kmem, self.pt.as_mut(), self.sz);
    }
}

/// Everything a live process owns in memory, released together on reap.
pub struct ProcMemory {
    pub uvm: UserSpace,
    pub trapframe: PageBox<TrapFrame>,
    /// Copy of the trap frame taken when an alarm handler is entered.
    pub trapcopy: PageBox<TrapFrame>,
}

/// Periodic user alarm state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Alarm {
    pub armed: bool,
    pub interval: u64,
    /// Timer traps taken in user mode.
    pub ticks: u64,
    /// Value of `ticks` when the alarm was last armed.
    pub since: u64,
    pub handler: VirtAddr,
}

/// Fields private to the process itself, or to whoever holds its lock while
/// it is not running.
pub struct ProcData {
    pub kstack: VirtAddr,
    pub mem: Option<ProcMemory>,
    pub context: Context,
    pub ofile: [Option<FileRef>; NOFILE],
    pub cwd: Option<InodeRef>,
    pub name: heapless::String<16>,
    pub trace_mask: u32,
    pub alarm: Alarm,
}

impl ProcData {
    pub fn new(kstack: VirtAddr) -> Self {
        Self {
            kstack,
            mem: None,
            context: Context::new(),
            ofile: [const { None }; NOFILE],
            cwd: None,
            name: heapless::String::new(),
            trace_mask: 0,
            alarm: Alarm::default(),
        }
    }

    pub fn memory(&mut self) -> &mut ProcMemory {
        match self.mem.as_mut() {
            Some(mem) => mem,
            None => panic!("process has no address space"),
        }
    }

    pub fn set_name(&mut self, name: &str) {
        self.name.clear();
        for c in name.chars() {
            if self.name.push(c).is_err() {
                break;
            }
        }
    }
}

pub struct Proc {
    /// Slot index; stable for the life of the table.
    pub index: usize,
    pub inner: SpinLock<ProcInner>,
    data: UnsafeCell<ProcData>,
}

unsafe impl Sync for Proc {}

impl Proc {
    pub fn new(index: usize, kstack: VirtAddr) -> Self {
        Self {
            index,
            inner: SpinLock::new(ProcInner::new(), "proc"),
            data: UnsafeCell::new(ProcData::new(kstack)),
        }
    }

    /// # Safety
    ///
    /// Only the process itself, or a holder of its lock while it is not
    /// running (allocation, fork setup, reaping), may touch the data.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn data(&self) -> &mut ProcData {
        unsafe { &mut *self.data.get() }
    }
}
