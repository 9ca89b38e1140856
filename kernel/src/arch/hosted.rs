//! Host-thread hart backend
//!
//! Every hart runs its dispatch loop on its own thread, and every process
//! kernel stack is a thread started on its first dispatch. A switch passes
//! the hart id to the thread owning the target context through that
//! context's baton, then parks until some hart is passed back. An exiting
//! process's final switch unwinds its thread instead of parking it.
//!
//! The interrupt-enable bit and the nesting state live in thread-locals. At
//! every switch both sides hold exactly one spin lock with interrupts off, so
//! the thread that owns a hart always sees that hart's state.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use super::Interrupt;

/// Ids handed to threads that are not harts, so lock ownership still works.
const ANON_BASE: usize = 1 << 20;
static NEXT_ANON: AtomicUsize = AtomicUsize::new(ANON_BASE);

const IDLE_PARK: Duration = Duration::from_micros(100);

struct HartLocal {
    id: Cell<usize>,
    noff: Cell<i32>,
    intena: Cell<bool>,
    sie: Cell<bool>,
}

std::thread_local! {
    static HART: HartLocal = const {
        HartLocal {
            id: Cell::new(usize::MAX),
            noff: Cell::new(0),
            intena: Cell::new(false),
            sie: Cell::new(false),
        }
    };
}

pub fn cpu_id() -> usize {
    HART.with(|h| {
        if h.id.get() == usize::MAX {
            h.id.set(NEXT_ANON.fetch_add(1, Ordering::Relaxed));
        }
        h.id.get()
    })
}

pub fn init_hart(id: usize) {
    HART.with(|h| {
        h.id.set(id);
        h.noff.set(0);
        h.intena.set(false);
        h.sie.set(false);
    });
}

pub fn intr_on() {
    HART.with(|h| h.sie.set(true));
}

pub fn intr_off() {
    HART.with(|h| h.sie.set(false));
}

pub fn intr_get() -> bool {
    HART.with(|h| h.sie.get())
}

pub fn noff() -> i32 {
    HART.with(|h| h.noff.get())
}

pub fn set_noff(n: i32) {
    HART.with(|h| h.noff.set(n));
}

pub fn intena() -> bool {
    HART.with(|h| h.intena.get())
}

pub fn set_intena(on: bool) {
    HART.with(|h| h.intena.set(on));
}

pub fn relax() {
    thread::yield_now();
}

/// There is no interrupt controller on the host: an idle hart parks briefly
/// and then reports a timer interrupt for the caller to handle.
pub fn wait_for_interrupt() -> Option<Interrupt> {
    thread::sleep(IDLE_PARK);
    Some(Interrupt::Timer)
}

pub fn flush_tlb() {}

struct Baton {
    hart: Mutex<Option<usize>>,
    cv: Condvar,
}

impl Baton {
    fn new() -> Arc<Self> {
        Arc::new(Self { hart: Mutex::new(None), cv: Condvar::new() })
    }

    fn pass(&self, hart: usize) {
        let mut slot = self.hart.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(hart);
        self.cv.notify_one();
    }

    fn take(&self) -> usize {
        let mut slot = self.hart.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(hart) = slot.take() {
                return hart;
            }
            slot = self.cv.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Unwind payload that ends a kernel-stack thread after its final switch.
/// Anything that catches unwinds on a kernel stack must let it through.
pub struct KstackExit;

/// A kernel stack that is not running.
pub struct Context {
    entry: Option<extern "C-unwind" fn(usize) -> !>,
    sp: usize,
    arg: usize,
    fresh: AtomicBool,
    baton: Arc<Baton>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            entry: None,
            sp: 0,
            arg: 0,
            fresh: AtomicBool::new(false),
            baton: Baton::new(),
        }
    }

    /// Arranges for the first switch to this context to call `entry(arg)` on
    /// a new thread. The previous incarnation's thread has already ended in
    /// [`swtch_exit`].
    pub fn prepare(&mut self, entry: extern "C-unwind" fn(usize) -> !, stack_top: usize, arg: usize) {
        self.entry = Some(entry);
        self.sp = stack_top;
        self.arg = arg;
        self.baton = Baton::new();
        self.fresh.store(true, Ordering::Release);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Passes `hart` to the thread owning `new`, starting it if `new` is fresh.
fn resume(new: &Context, hart: usize) {
    if !new.fresh.swap(false, Ordering::AcqRel) {
        new.baton.pass(hart);
        return;
    }

    let entry = match new.entry {
        Some(entry) => entry,
        None => panic!("swtch: fresh context without entry"),
    };
    let arg = new.arg;
    let spawned = thread::Builder::new()
        .name(std::format!("kstack@{:#x}", new.sp))
        .spawn(move || {
            HART.with(|h| {
                h.id.set(hart);
                h.noff.set(1);
                h.intena.set(true);
                h.sie.set(false);
            });
            let ended = panic::catch_unwind(AssertUnwindSafe(|| {
                entry(arg);
            }));
            if let Err(payload) = ended {
                if !payload.is::<KstackExit>() {
                    panic::resume_unwind(payload);
                }
            }
        });
    if let Err(e) = spawned {
        panic!("swtch: cannot start kernel stack: {}", e);
    }
}

/// Hands the current hart to `new` and parks until a hart is handed back to `old`.
///
/// # Safety
///
/// `new` must have been prepared or saved by a previous switch, and the
/// caller must hold exactly the locks the resumed stack expects to release.
pub unsafe fn swtch(old: *mut Context, new: *const Context) {
    let hart = cpu_id();
    let (old, new) = unsafe { (&*old, &*new) };
    let wake = Arc::clone(&old.baton);

    resume(new, hart);

    let hart = wake.take();
    HART.with(|h| h.id.set(hart));
}

/// Hands the current hart to `new` for the last time and ends the calling
/// kernel-stack thread by unwinding it with [`KstackExit`].
///
/// # Safety
///
/// As for [`swtch`]. Nothing may switch to `old` again before it is
/// prepared afresh, and the caller must have forgotten the guards the
/// resumed stack releases.
pub unsafe fn swtch_exit(_old: *mut Context, new: *const Context) -> ! {
    let hart = cpu_id();
    resume(unsafe { &*new }, hart);

    // The hart belongs to another thread now.
    HART.with(|h| {
        h.id.set(usize::MAX);
        h.noff.set(0);
        h.sie.set(false);
    });

    #[cfg(panic = "unwind")]
    panic::resume_unwind(std::boxed::Box::new(KstackExit));

    #[cfg(not(panic = "unwind"))]
    loop {
        thread::park();
    }
}
