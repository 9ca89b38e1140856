//! Page-table entry encoding and address-space collaborator interfaces

use alloc::boxed::Box;

use bitflags::bitflags;

use super::layout::PAGE_SHIFT;
use crate::core::types::{PhysAddr, VirtAddr};
use crate::error::Result;

bitflags! {
    /// Sv39 page-table entry flags, plus the software copy-on-write marker.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: usize {
        const V = 1 << 0;
        const R = 1 << 1;
        const W = 1 << 2;
        const X = 1 << 3;
        const U = 1 << 4;
        const G = 1 << 5;
        const A = 1 << 6;
        const D = 1 << 7;
        /// Shared copy-on-write mapping (RSW bit).
        const C = 1 << 8;
    }
}

const FLAG_BITS: usize = 10;

/// A leaf page-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Pte(pub usize);

impl Pte {
    pub const fn new(pa: PhysAddr, flags: PteFlags) -> Self {
        Self(((pa >> PAGE_SHIFT) << FLAG_BITS) | flags.bits())
    }

    /// Physical address of the mapped page.
    pub const fn pa(self) -> PhysAddr {
        (self.0 >> FLAG_BITS) << PAGE_SHIFT
    }

    pub const fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0 & ((1 << FLAG_BITS) - 1))
    }

    pub const fn is_valid(self) -> bool {
        self.0 & PteFlags::V.bits() != 0
    }

    /// Same page, different permissions.
    pub const fn with_flags(self, flags: PteFlags) -> Self {
        Self::new(self.pa(), flags)
    }
}

/// A user page table.
///
/// Implementations own the interior nodes; leaf pages are owned by the
/// physical page allocator and only referenced from here.
pub trait PageTable: Send {
    /// Returns the leaf entry for `va`, if one has been created.
    fn walk(&mut self, va: VirtAddr) -> Option<&mut Pte>;

    /// Installs a valid leaf mapping of one page. Fails if `va` is already mapped
    /// or the interior nodes cannot be allocated.
    fn map(&mut self, va: VirtAddr, pa: PhysAddr, flags: PteFlags) -> Result<()>;

    /// Removes the leaf mapping for `va` and returns the old entry.
    /// Does not release the mapped page.
    fn unmap(&mut self, va: VirtAddr) -> Option<Pte>;
}

/// Creates address spaces and reports the fixed kernel pages every one of them maps.
pub trait VmProvider: Send + Sync {
    /// A fresh, empty user page table.
    fn create(&self) -> Result<Box<dyn PageTable>>;

    /// Physical page holding the user/kernel trap trampoline.
    fn trampoline(&self) -> PhysAddr;

    /// Lowest address of the one-page kernel stack reserved for process slot `slot`.
    fn kstack(&self, slot: usize) -> VirtAddr;
}
