//! Error handling module for the process-management core

use core::fmt;

use crate::core::types::KernelError;

/// Common error type used throughout the process-management core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Kernel error
    Kernel(KernelError),
    /// Out of memory
    OutOfMemory,
    /// Invalid argument
    InvalidArgument(&'static str),
    /// Not supported
    NotSupported(&'static str),
    /// Configuration error
    ConfigError(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Kernel(err) => write!(f, "Kernel error: {}", err),
            Error::OutOfMemory => write!(f, "Out of memory"),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::NotSupported(msg) => write!(f, "Not supported: {}", msg),
            Error::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl From<KernelError> for Error {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::OutOfMemory => Error::OutOfMemory,
            other => Error::Kernel(other),
        }
    }
}

impl Error {
    /// Value handed back to user space for a failed system call.
    pub const fn errno(&self) -> isize {
        -1
    }

    /// The kernel error code this error corresponds to.
    pub const fn kind(&self) -> KernelError {
        match self {
            Error::Kernel(err) => *err,
            Error::OutOfMemory => KernelError::OutOfMemory,
            Error::InvalidArgument(_) | Error::ConfigError(_) => KernelError::InvalidArgument,
            Error::NotSupported(_) => KernelError::NotSupported,
        }
    }
}

/// Result type for operations that can fail
pub type Result<T> = core::result::Result<T, Error>;

/// Creates an out-of-memory error
pub fn out_of_memory() -> Error {
    Error::OutOfMemory
}

/// Creates an invalid argument error
pub fn invalid_argument(msg: &'static str) -> Error {
    Error::InvalidArgument(msg)
}

/// Creates a not supported error
pub fn not_supported(msg: &'static str) -> Error {
    Error::NotSupported(msg)
}

/// Creates a configuration error
pub fn config_error(msg: &'static str) -> Error {
    Error::ConfigError(msg)
}

/// Creates an error from a kernel error code
pub fn kernel_error(err: KernelError) -> Error {
    Error::from(err)
}
