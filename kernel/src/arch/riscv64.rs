//! riscv64 supervisor-mode hart backend

use core::arch::{asm, global_asm};
use core::cell::UnsafeCell;

use super::{Interrupt, MAX_HARTS};

const SSTATUS_SIE: usize = 1 << 1;

/// Hart id, kept in `tp` by the boot code.
#[inline]
pub fn cpu_id() -> usize {
    let id: usize;
    unsafe { asm!("mv {}, tp", out(reg) id) };
    id
}

pub fn init_hart(id: usize) {
    unsafe { asm!("mv tp, {}", in(reg) id) };
}

#[inline]
pub fn intr_on() {
    unsafe { asm!("csrs sstatus, {}", in(reg) SSTATUS_SIE) };
}

#[inline]
pub fn intr_off() {
    unsafe { asm!("csrc sstatus, {}", in(reg) SSTATUS_SIE) };
}

#[inline]
pub fn intr_get() -> bool {
    let sstatus: usize;
    unsafe { asm!("csrr {}, sstatus", out(reg) sstatus) };
    sstatus & SSTATUS_SIE != 0
}

struct HartState {
    noff: i32,
    intena: bool,
}

struct Harts([UnsafeCell<HartState>; MAX_HARTS]);

// Each slot is only touched by its own hart with interrupts off.
unsafe impl Sync for Harts {}

static HARTS: Harts = Harts([const { UnsafeCell::new(HartState { noff: 0, intena: false }) }; MAX_HARTS]);

fn hart() -> &'static mut HartState {
    unsafe { &mut *HARTS.0[cpu_id()].get() }
}

pub fn noff() -> i32 {
    hart().noff
}

pub fn set_noff(n: i32) {
    hart().noff = n;
}

pub fn intena() -> bool {
    hart().intena
}

pub fn set_intena(on: bool) {
    hart().intena = on;
}

#[inline]
pub fn relax() {
    core::hint::spin_loop();
}

/// Idles until an interrupt arrives. The trap vector has already handled it
/// by the time this returns.
pub fn wait_for_interrupt() -> Option<Interrupt> {
    unsafe { asm!("wfi") };
    None
}

pub fn flush_tlb() {
    unsafe { asm!("sfence.vma zero, zero") };
}

/// Callee-saved registers of a kernel stack that is not running.
#[repr(C)]
#[derive(Debug, Default)]
pub struct Context {
    pub ra: usize,
    pub sp: usize,
    pub s: [usize; 12],
}

static_assertions::const_assert_eq!(core::mem::size_of::<Context>(), 14 * 8);

impl Context {
    pub const fn new() -> Self {
        Self { ra: 0, sp: 0, s: [0; 12] }
    }

    /// Arranges for the first switch to this context to call `entry(arg)` on
    /// the stack ending at `stack_top`.
    pub fn prepare(&mut self, entry: extern "C-unwind" fn(usize) -> !, stack_top: usize, arg: usize) {
        *self = Self::new();
        self.ra = kthread_start as usize;
        self.sp = stack_top;
        self.s[1] = entry as usize;
        self.s[2] = arg;
    }
}

global_asm!(r#"
.section .text
.globl swtch
.align 2
swtch:
    sd ra, 0(a0)
    sd sp, 8(a0)
    sd s0, 16(a0)
    sd s1, 24(a0)
    sd s2, 32(a0)
    sd s3, 40(a0)
    sd s4, 48(a0)
    sd s5, 56(a0)
    sd s6, 64(a0)
    sd s7, 72(a0)
    sd s8, 80(a0)
    sd s9, 88(a0)
    sd s10, 96(a0)
    sd s11, 104(a0)

    ld ra, 0(a1)
    ld sp, 8(a1)
    ld s0, 16(a1)
    ld s1, 24(a1)
    ld s2, 32(a1)
    ld s3, 40(a1)
    ld s4, 48(a1)
    ld s5, 56(a1)
    ld s6, 64(a1)
    ld s7, 72(a1)
    ld s8, 80(a1)
    ld s9, 88(a1)
    ld s10, 96(a1)
    ld s11, 104(a1)
    ret

.globl kthread_start
.align 2
kthread_start:
    mv a0, s2
    jr s1
"#);

unsafe extern "C" {
    #[link_name = "swtch"]
    fn swtch_asm(old: *mut Context, new: *const Context);
    fn kthread_start();
}

/// Saves the current registers in `old` and resumes `new`.
///
/// # Safety
///
/// `new` must have been prepared or saved by a previous switch, and the
/// caller must hold exactly the locks the resumed stack expects to release.
pub unsafe fn swtch(old: *mut Context, new: *const Context) {
    unsafe { swtch_asm(old, new) };
}

/// Final switch away from an exiting process's kernel stack.
///
/// # Safety
///
/// As for [`swtch`]; nothing may switch to `old` again before it is
/// prepared afresh.
pub unsafe fn swtch_exit(old: *mut Context, new: *const Context) -> ! {
    unsafe { swtch_asm(old, new) };
    panic!("zombie exit");
}
