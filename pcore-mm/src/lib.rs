//! PCore Memory Management
//!
//! Physical page ownership for the process core:
//!
//! - [`kalloc`]: the reference-counted page allocator and [`PageBox`], an
//!   owning handle to one kernel page
//! - [`uvm`]: growing, shrinking, tearing down and copying user address spaces
//! - [`cow`]: copy-on-write sharing at fork time and write-fault resolution

#![no_std]

#[cfg(feature = "std")]
extern crate std;

pub use pcore_api::{Error, Result};

pub mod physical;
pub mod kalloc;
pub mod uvm;
pub mod cow;

pub use physical::{PAGE_SIZE, PAGE_SHIFT, page_round_up, page_round_down, addr_to_pfn, pfn_to_addr};
pub use kalloc::{PageAllocator, PageBox, ALLOC_FILL, FREE_FILL};
pub use cow::CowFault;

#[cfg(test)]
mod testing;
