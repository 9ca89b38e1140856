//! PCore API - Core types and collaborator interfaces
//!
//! This crate provides the types shared by every layer of the process-management
//! core and the interfaces of the collaborators it consumes but does not own.
//!
//! # Architecture
//!
//! - **Core**: process identifiers, addresses and kernel error codes
//! - **Error**: the common error type and `Result` alias
//! - **Memory**: page-table entry encoding, address-space layout and the
//!   page-table/address-space collaborator traits
//! - **Fs**: the file-system collaborator trait and its opaque handles
//!
//! # Usage
//!
//! ```rust
//! use pcore_api::memory::{Pte, PteFlags};
//!
//! let pte = Pte::new(0x8000_1000, PteFlags::V | PteFlags::R | PteFlags::U);
//! assert_eq!(pte.pa(), 0x8000_1000);
//! assert!(pte.flags().contains(PteFlags::U));
//! ```

#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

// Core modules
pub mod core;
pub mod error;
pub mod memory;
pub mod fs;

// Re-export commonly used types
pub use crate::core::types::*;
pub use crate::error::{Error, Result};
pub use crate::fs::interface::{FileRef, FileSystem, InodeRef};
pub use crate::memory::interface::{PageTable, VmProvider};
