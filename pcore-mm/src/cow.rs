//! Copy-on-write sharing
//!
//! At fork the child maps the parent's pages instead of copying them. Both
//! mappings lose write permission and gain the `C` marker, and the page gains
//! one reference. A later write fault on a `C` mapping takes a private copy,
//! or simply restores write permission if nobody else holds the page.

use core::ptr;

use pcore_api::memory::{PageTable, Pte, PteFlags};
use pcore_api::{Error, KernelError, Result, VirtAddr};

use crate::kalloc::PageAllocator;
use crate::physical::{PAGE_SIZE, page_round_down};
use crate::uvm;

/// How a copy-on-write fault was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CowFault {
    /// The page was shared; the faulting mapping now points at a private copy.
    Copied,
    /// The page was no longer shared; write permission was restored in place.
    Upgraded,
}

/// Shares the first `sz` bytes of `old` into `new`.
///
/// On failure the mappings already added to `new` are removed and their
/// references dropped. Pages already marked in `old` stay marked; their
/// next write fault upgrades them in place.
pub fn share_range(kmem: &PageAllocator, old: &mut dyn PageTable, new: &mut dyn PageTable, sz: usize) -> Result<()> {
    for va in (0..sz).step_by(PAGE_SIZE) {
        let pte = match old.walk(va) {
            Some(pte) if pte.is_valid() => pte,
            Some(_) => panic!("uvmcopy: page not present"),
            None => panic!("uvmcopy: pte should exist"),
        };

        let pa = pte.pa();
        let mut flags = pte.flags();
        if flags.contains(PteFlags::W) {
            flags = (flags - PteFlags::W) | PteFlags::C;
            *pte = Pte::new(pa, flags);
        }

        if let Err(e) = new.map(va, pa, flags - PteFlags::V) {
            uvm::free_range(kmem, new, 0, va / PAGE_SIZE, true);
            return Err(e);
        }
        kmem.retain(pa);
    }
    Ok(())
}

/// Resolves a write fault at `va` on a copy-on-write mapping.
///
/// Fails if `va` is not mapped copy-on-write or no page is available for the
/// copy; the caller kills the faulting process in either case.
pub fn resolve_fault(kmem: &PageAllocator, pt: &mut dyn PageTable, va: VirtAddr) -> Result<CowFault> {
    let va = page_round_down(va);
    let pte = match pt.walk(va) {
        Some(pte) if pte.is_valid() && pte.flags().contains(PteFlags::C) => pte,
        _ => return Err(Error::Kernel(KernelError::BadAddress)),
    };

    let pa = pte.pa();
    let flags = (pte.flags() | PteFlags::W) - PteFlags::C;

    if kmem.refcount(pa) == 1 {
        *pte = Pte::new(pa, flags);
        return Ok(CowFault::Upgraded);
    }

    let copy = kmem.alloc()?;
    unsafe { ptr::copy_nonoverlapping(pa as *const u8, copy as *mut u8, PAGE_SIZE) };
    *pte = Pte::new(copy, flags);
    kmem.release(pa);
    Ok(CowFault::Copied)
}
