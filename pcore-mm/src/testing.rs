//! Host-side fixtures for the unit tests.

extern crate std;

use std::alloc::{Layout, alloc_zeroed};
use std::boxed::Box;

use hashbrown::HashMap;
use pcore_api::memory::{PageTable, Pte, PteFlags};
use pcore_api::{Error, PhysAddr, Result, VirtAddr};

use crate::kalloc::PageAllocator;
use crate::physical::PAGE_SIZE;

pub fn arena(pages: usize) -> &'static PageAllocator {
    let size = (pages + 1) * PAGE_SIZE;
    let layout = Layout::from_size_align(size, PAGE_SIZE).unwrap();
    let start = unsafe { alloc_zeroed(layout) } as usize;
    Box::leak(Box::new(unsafe { PageAllocator::new(start, start + size) }))
}

#[derive(Default)]
pub struct MapTable {
    leaves: HashMap<VirtAddr, Pte>,
}

impl PageTable for MapTable {
    fn walk(&mut self, va: VirtAddr) -> Option<&mut Pte> {
        self.leaves.get_mut(&(va & !(PAGE_SIZE - 1)))
    }

    fn map(&mut self, va: VirtAddr, pa: PhysAddr, flags: PteFlags) -> Result<()> {
        let slot = self.leaves.entry(va).or_default();
        if slot.is_valid() {
            return Err(Error::InvalidArgument("remap"));
        }
        *slot = Pte::new(pa, flags | PteFlags::V);
        Ok(())
    }

    fn unmap(&mut self, va: VirtAddr) -> Option<Pte> {
        self.leaves.remove(&va)
    }
}

pub fn read_byte(pa: PhysAddr, off: usize) -> u8 {
    unsafe { *((pa + off) as *const u8) }
}
