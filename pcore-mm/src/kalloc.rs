//! Reference-counted physical page allocator
//!
//! Every page in the managed range has a [`PageDesc`] holding its reference
//! count behind its own lock. A page with count 0 sits on the free list; a
//! page with count n > 0 is mapped into n address spaces (or owned by n
//! kernel handles). The free-list lock and the per-page locks are never held
//! at the same time.

use core::marker::PhantomData;
use core::mem::size_of;
use core::ops::{Deref, DerefMut};
use core::ptr;

use pcore_api::{Error, PhysAddr, Result};
use spin::Mutex;

use crate::physical::{PAGE_SIZE, is_page_aligned, page_round_up};

/// Fill pattern written over freshly allocated pages.
pub const ALLOC_FILL: u8 = 0x05;
/// Fill pattern written over released pages.
pub const FREE_FILL: u8 = 0x01;

/// Per-page descriptor: the reference count and the lock that guards it.
pub struct PageDesc {
    rc: Mutex<i32>,
}

impl PageDesc {
    const fn new() -> Self {
        Self { rc: Mutex::new(0) }
    }
}

/// Intrusive free-list node, stored in the first word of each free page.
#[repr(C)]
struct Run {
    next: PhysAddr,
}

struct FreeList {
    head: PhysAddr,
    nfree: usize,
}

pub struct PageAllocator {
    base: PhysAddr,
    end: PhysAddr,
    descs: &'static [PageDesc],
    free: Mutex<FreeList>,
}

impl PageAllocator {
    /// Takes ownership of the physical range `[start, end)`.
    ///
    /// The descriptor table is carved from the front of the range; every
    /// remaining whole page is born with count 1 and immediately released.
    ///
    /// # Safety
    ///
    /// The range must be unused, writable memory that stays valid for the
    /// rest of the program, and must not be handed to any other allocator.
    pub unsafe fn new(start: PhysAddr, end: PhysAddr) -> Self {
        let start = page_round_up(start);
        let span = end.saturating_sub(start);
        let mut npages = span / (PAGE_SIZE + size_of::<PageDesc>());
        let base = page_round_up(start + npages * size_of::<PageDesc>());
        npages = npages.min(end.saturating_sub(base) / PAGE_SIZE);

        let table = start as *mut PageDesc;
        for i in 0..npages {
            unsafe { table.add(i).write(PageDesc::new()) };
        }
        let descs = unsafe { core::slice::from_raw_parts(table, npages) };

        let kmem = Self {
            base,
            end: base + npages * PAGE_SIZE,
            descs,
            free: Mutex::new(FreeList { head: 0, nfree: 0 }),
        };
        for i in 0..npages {
            let pa = base + i * PAGE_SIZE;
            kmem.retain(pa);
            kmem.release(pa);
        }

        #[cfg(feature = "log")]
        log::debug!("kalloc: {} pages at {:#x}..{:#x}", npages, kmem.base, kmem.end);

        kmem
    }

    fn desc(&self, pa: PhysAddr) -> &PageDesc {
        &self.descs[(pa - self.base) / PAGE_SIZE]
    }

    fn owns(&self, pa: PhysAddr) -> bool {
        is_page_aligned(pa) && pa >= self.base && pa < self.end
    }

    /// Allocates one page with reference count 1, filled with [`ALLOC_FILL`].
    pub fn alloc(&self) -> Result<PhysAddr> {
        let pa = {
            let mut free = self.free.lock();
            if free.head == 0 {
                return Err(Error::OutOfMemory);
            }
            let pa = free.head;
            free.head = unsafe { (pa as *const Run).read().next };
            free.nfree -= 1;
            pa
        };

        {
            let mut rc = self.desc(pa).rc.lock();
            assert!(*rc == 0, "kalloc: free page {:#x} has count {}", pa, *rc);
            *rc = 1;
        }

        unsafe { ptr::write_bytes(pa as *mut u8, ALLOC_FILL, PAGE_SIZE) };
        Ok(pa)
    }

    /// Adds a reference to an allocated page.
    pub fn retain(&self, pa: PhysAddr) {
        if !self.owns(pa) {
            panic!("kalloc: retain of foreign page {:#x}", pa);
        }
        let mut rc = self.desc(pa).rc.lock();
        if *rc < 0 {
            panic!("kalloc: retain of page {:#x} with negative count", pa);
        }
        *rc += 1;
    }

    /// Drops a reference; the last one returns the page to the free list.
    pub fn release(&self, pa: PhysAddr) {
        if !self.owns(pa) {
            panic!("kfree: bad page {:#x}", pa);
        }

        let last = {
            let mut rc = self.desc(pa).rc.lock();
            if *rc <= 0 {
                panic!("kfree: page {:#x} already free", pa);
            }
            *rc -= 1;
            *rc == 0
        };
        if !last {
            return;
        }

        unsafe { ptr::write_bytes(pa as *mut u8, FREE_FILL, PAGE_SIZE) };

        let mut free = self.free.lock();
        unsafe { (pa as *mut Run).write(Run { next: free.head }) };
        free.head = pa;
        free.nfree += 1;
    }

    /// Current reference count of `pa`.
    pub fn refcount(&self, pa: PhysAddr) -> i32 {
        if !self.owns(pa) {
            panic!("kalloc: refcount of foreign page {:#x}", pa);
        }
        *self.desc(pa).rc.lock()
    }

    pub fn free_pages(&self) -> usize {
        self.free.lock().nfree
    }

    pub fn total_pages(&self) -> usize {
        self.descs.len()
    }

    /// Managed page range.
    pub fn range(&self) -> (PhysAddr, PhysAddr) {
        (self.base, self.end)
    }
}

/// An owning handle to one allocator page holding a `T`.
///
/// Dropping the handle drops the value and releases the page.
pub struct PageBox<T> {
    pa: PhysAddr,
    kmem: &'static PageAllocator,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for PageBox<T> {}
unsafe impl<T: Sync> Sync for PageBox<T> {}

impl<T> PageBox<T> {
    pub fn new(kmem: &'static PageAllocator, value: T) -> Result<Self> {
        const { assert!(size_of::<T>() <= PAGE_SIZE) };
        let pa = kmem.alloc()?;
        unsafe { (pa as *mut T).write(value) };
        Ok(Self { pa, kmem, _marker: PhantomData })
    }

    pub fn pa(&self) -> PhysAddr {
        self.pa
    }
}

impl<T> Deref for PageBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*(self.pa as *const T) }
    }
}

impl<T> DerefMut for PageBox<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *(self.pa as *mut T) }
    }
}

impl<T> Drop for PageBox<T> {
    fn drop(&mut self) {
        unsafe { ptr::drop_in_place(self.pa as *mut T) };
        self.kmem.release(self.pa);
    }
}

static_assertions::const_assert!(size_of::<Run>() <= PAGE_SIZE);
