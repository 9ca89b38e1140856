//! User address-space layout (Sv39)

/// Page size (4KB)
pub const PAGE_SIZE: usize = 4096;
/// Page shift (log2 of PAGE_SIZE)
pub const PAGE_SHIFT: usize = 12;

/// One beyond the highest possible virtual address.
///
/// MAXVA is one bit less than the Sv39 maximum, to avoid having to
/// sign-extend virtual addresses that have the high bit set.
pub const MAXVA: usize = 1 << (9 + 9 + 9 + 12 - 1);

/// The trampoline page, mapped at the highest user virtual address.
pub const TRAMPOLINE: usize = MAXVA - PAGE_SIZE;

/// The trap frame page, just below the trampoline.
pub const TRAPFRAME: usize = TRAMPOLINE - PAGE_SIZE;

/// Align address down to page boundary
#[inline]
pub const fn page_round_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

/// Align address up to page boundary
#[inline]
pub const fn page_round_up(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

static_assertions::const_assert!(TRAPFRAME % PAGE_SIZE == 0);
