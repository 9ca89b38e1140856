//! User address-space helpers
//!
//! These operate on any [`PageTable`] and take leaf pages from the
//! [`PageAllocator`]. Every leaf mapping holds exactly one reference on its
//! page, so unmapping with `release` set drops that reference.

use core::ptr;

use pcore_api::memory::{MAXVA, PageTable, Pte, PteFlags};
use pcore_api::{Error, KernelError, PhysAddr, Result, VirtAddr};

use crate::cow;
use crate::kalloc::PageAllocator;
use crate::physical::{PAGE_SIZE, is_page_aligned, page_round_down, page_round_up};

/// Maps a single page of `code` at virtual address 0 for the first process.
pub fn first(kmem: &PageAllocator, pt: &mut dyn PageTable, code: &[u8]) -> Result<()> {
    assert!(code.len() < PAGE_SIZE, "uvmfirst: more than a page");
    let pa = kmem.alloc()?;
    unsafe {
        ptr::write_bytes(pa as *mut u8, 0, PAGE_SIZE);
        ptr::copy_nonoverlapping(code.as_ptr(), pa as *mut u8, code.len());
    }
    let perm = PteFlags::R | PteFlags::W | PteFlags::X | PteFlags::U;
    if let Err(e) = pt.map(0, pa, perm) {
        kmem.release(pa);
        return Err(e);
    }
    Ok(())
}

/// Grows the user image from `oldsz` to `newsz` with zeroed pages.
/// Returns the new size; on failure everything added here is undone.
pub fn alloc_range(
    kmem: &PageAllocator,
    pt: &mut dyn PageTable,
    oldsz: usize,
    newsz: usize,
    xperm: PteFlags,
) -> Result<usize> {
    if newsz < oldsz {
        return Ok(oldsz);
    }

    let mut a = page_round_up(oldsz);
    while a < newsz {
        let pa = match kmem.alloc() {
            Ok(pa) => pa,
            Err(e) => {
                dealloc_range(kmem, pt, a, oldsz);
                return Err(e);
            }
        };
        unsafe { ptr::write_bytes(pa as *mut u8, 0, PAGE_SIZE) };
        if let Err(e) = pt.map(a, pa, PteFlags::R | PteFlags::U | xperm) {
            kmem.release(pa);
            dealloc_range(kmem, pt, a, oldsz);
            return Err(e);
        }
        a += PAGE_SIZE;
    }
    Ok(newsz)
}

/// Shrinks the user image from `oldsz` to `newsz`. Returns the new size.
pub fn dealloc_range(kmem: &PageAllocator, pt: &mut dyn PageTable, oldsz: usize, newsz: usize) -> usize {
    if newsz >= oldsz {
        return oldsz;
    }

    if page_round_up(newsz) < page_round_up(oldsz) {
        let npages = (page_round_up(oldsz) - page_round_up(newsz)) / PAGE_SIZE;
        free_range(kmem, pt, page_round_up(newsz), npages, true);
    }
    newsz
}

/// Removes `npages` mappings starting at `va`, which must all exist.
/// With `release` set, drops each mapping's page reference.
pub fn free_range(kmem: &PageAllocator, pt: &mut dyn PageTable, va: VirtAddr, npages: usize, release: bool) {
    if !is_page_aligned(va) {
        panic!("uvmunmap: not aligned");
    }

    for a in (va..va + npages * PAGE_SIZE).step_by(PAGE_SIZE) {
        let pte = match pt.unmap(a) {
            Some(pte) if pte.is_valid() => pte,
            _ => panic!("uvmunmap: {:#x} not mapped", a),
        };
        if pte.flags() == PteFlags::V {
            panic!("uvmunmap: not a leaf");
        }
        if release {
            kmem.release(pte.pa());
        }
    }
}

/// Releases every user page below `sz`.
pub fn free_user(kmem: &PageAllocator, pt: &mut dyn PageTable, sz: usize) {
    if sz > 0 {
        free_range(kmem, pt, 0, page_round_up(sz) / PAGE_SIZE, true);
    }
}

/// Translates a user virtual address to the physical page backing it.
pub fn translate(pt: &mut dyn PageTable, va: VirtAddr) -> Option<PhysAddr> {
    if va >= MAXVA {
        return None;
    }
    let pte = *pt.walk(va)?;
    if !pte.is_valid() || !pte.flags().contains(PteFlags::U) {
        return None;
    }
    Some(pte.pa())
}

/// Marks the page holding `va` inaccessible to user mode (the stack guard).
pub fn clear_user(pt: &mut dyn PageTable, va: VirtAddr) {
    match pt.walk(va) {
        Some(pte) => *pte = pte.with_flags(pte.flags() - PteFlags::U),
        None => panic!("uvmclear"),
    }
}

/// Copies `src` to user address `dstva`.
///
/// Destination pages still shared copy-on-write are given a private copy
/// first; read-only pages that are not copy-on-write are an error.
pub fn copy_out(kmem: &PageAllocator, pt: &mut dyn PageTable, dstva: VirtAddr, src: &[u8]) -> Result<()> {
    let mut dstva = dstva;
    let mut src = src;
    while !src.is_empty() {
        let va0 = page_round_down(dstva);
        if va0 >= MAXVA {
            return Err(Error::Kernel(KernelError::BadAddress));
        }
        let pte: Pte = match pt.walk(va0) {
            Some(pte) if pte.is_valid() && pte.flags().contains(PteFlags::U) => *pte,
            _ => return Err(Error::Kernel(KernelError::BadAddress)),
        };
        if !pte.flags().contains(PteFlags::W) {
            if !pte.flags().contains(PteFlags::C) {
                return Err(Error::Kernel(KernelError::BadAddress));
            }
            cow::resolve_fault(kmem, pt, va0)?;
        }
        let pa0 = translate(pt, va0).ok_or(Error::Kernel(KernelError::BadAddress))?;

        let off = dstva - va0;
        let n = (PAGE_SIZE - off).min(src.len());
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), (pa0 + off) as *mut u8, n) };

        src = &src[n..];
        dstva = va0 + PAGE_SIZE;
    }
    Ok(())
}

/// Copies from user address `srcva` into `dst`.
pub fn copy_in(pt: &mut dyn PageTable, dst: &mut [u8], srcva: VirtAddr) -> Result<()> {
    let mut srcva = srcva;
    let mut done = 0;
    while done < dst.len() {
        let va0 = page_round_down(srcva);
        let pa0 = translate(pt, va0).ok_or(Error::Kernel(KernelError::BadAddress))?;

        let off = srcva - va0;
        let n = (PAGE_SIZE - off).min(dst.len() - done);
        unsafe { ptr::copy_nonoverlapping((pa0 + off) as *const u8, dst[done..].as_mut_ptr(), n) };

        done += n;
        srcva = va0 + PAGE_SIZE;
    }
    Ok(())
}
