//! Core types used throughout the process-management core

use core::fmt;

/// Process identifier type
pub type Pid = u32;

/// Physical address type
pub type PhysAddr = usize;

/// Virtual address type
pub type VirtAddr = usize;

/// Clock ticks since boot
pub type Ticks = u64;

/// Represents a kernel error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Operation not permitted
    PermissionDenied,
    /// Invalid argument
    InvalidArgument,
    /// Not enough memory
    OutOfMemory,
    /// No such process
    NoProcess,
    /// No child processes
    NoChildren,
    /// Process table is full
    ProcessLimit,
    /// Bad user address
    BadAddress,
    /// Interrupted by a kill request
    Interrupted,
    /// No free file descriptor
    TooManyFiles,
    /// Operation not supported by the active configuration
    NotSupported,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::PermissionDenied => write!(f, "Operation not permitted"),
            KernelError::InvalidArgument => write!(f, "Invalid argument"),
            KernelError::OutOfMemory => write!(f, "Not enough memory"),
            KernelError::NoProcess => write!(f, "No such process"),
            KernelError::NoChildren => write!(f, "No child processes"),
            KernelError::ProcessLimit => write!(f, "Process table full"),
            KernelError::BadAddress => write!(f, "Bad address"),
            KernelError::Interrupted => write!(f, "Interrupted"),
            KernelError::TooManyFiles => write!(f, "Too many open files"),
            KernelError::NotSupported => write!(f, "Operation not supported"),
        }
    }
}
