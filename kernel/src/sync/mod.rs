// Kernel spin locks
//
// Acquiring a SpinLock disables interrupts on the current hart until the
// matching release, so an interrupt handler can never spin on a lock its
// own hart already holds.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::arch;

// ============================================================================
// Interrupt nesting
// ============================================================================

/// Disables interrupts, remembering whether they were on at the outermost level.
///
/// push_off/pop_off are matched: it takes two pop_off()s to undo two
/// push_off()s, and interrupts stay off if they were off to begin with.
pub fn push_off() {
    let old = arch::intr_get();
    arch::intr_off();
    let depth = arch::noff();
    if depth == 0 {
        arch::set_intena(old);
    }
    arch::set_noff(depth + 1);
}

pub fn pop_off() {
    if arch::intr_get() {
        panic!("pop_off - interruptible");
    }
    let depth = arch::noff();
    if depth < 1 {
        panic!("pop_off");
    }
    arch::set_noff(depth - 1);
    if depth == 1 && arch::intena() {
        arch::intr_on();
    }
}

// ============================================================================
// SpinLock
// ============================================================================

pub struct SpinLock<T: ?Sized> {
    locked: AtomicBool,
    // Holding hart + 1, or 0.
    cpu: AtomicUsize,
    name: &'static str,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(data: T, name: &'static str) -> Self {
        Self {
            locked: AtomicBool::new(false),
            cpu: AtomicUsize::new(0),
            name,
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SpinLock<T> {
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        push_off();
        if self.holding() {
            panic!("acquire {}", self.name);
        }

        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            arch::relax();
        }
        self.cpu.store(arch::cpu_id() + 1, Ordering::Relaxed);

        SpinLockGuard { lock: self }
    }

    /// Whether the current hart holds this lock. Interrupts must be off.
    pub fn holding(&self) -> bool {
        self.locked.load(Ordering::Relaxed) && self.cpu.load(Ordering::Relaxed) == arch::cpu_id() + 1
    }

    /// Releases the guard and hands back the lock so it can be taken again.
    pub fn unlock(guard: SpinLockGuard<'_, T>) -> &SpinLock<T> {
        let lock = guard.lock;
        drop(guard);
        lock
    }

    /// Releases a lock whose guard lives on another kernel stack.
    ///
    /// # Safety
    ///
    /// The current hart must hold the lock, and the guard that acquired it
    /// must never be dropped.
    pub unsafe fn force_unlock(&self) {
        self.release();
    }

    /// Access without locking, for best-effort diagnostics.
    ///
    /// # Safety
    ///
    /// The caller accepts torn reads of data other harts may be mutating,
    /// and must not write through the result.
    pub unsafe fn get_unchecked(&self) -> &T {
        unsafe { &*self.data.get() }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn release(&self) {
        if !self.holding() {
            panic!("release {}", self.name);
        }
        self.cpu.store(0, Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
        pop_off();
    }
}

pub struct SpinLockGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
