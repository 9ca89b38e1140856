//! Architecture abstraction layer
//!
//! Hart identity, the interrupt-enable bit, per-hart interrupt nesting
//! state, and the callee-saved register switch between kernel stacks.
//!
//! With the `baremetal` feature on riscv64 these are CSR and assembly
//! operations. Everywhere else each hart and each process kernel stack is a
//! host thread, and [`swtch`] hands the hart from one thread to another.

/// Maximum number of harts the per-hart state is sized for.
pub const MAX_HARTS: usize = 8;

/// An interrupt source as reported by the interrupt controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Supervisor timer interrupt.
    Timer,
    /// External device interrupt with its IRQ number.
    External(u32),
}

#[cfg(all(feature = "baremetal", target_arch = "riscv64"))]
mod riscv64;
#[cfg(all(feature = "baremetal", target_arch = "riscv64"))]
pub use riscv64::*;

#[cfg(not(all(feature = "baremetal", target_arch = "riscv64")))]
mod hosted;
#[cfg(not(all(feature = "baremetal", target_arch = "riscv64")))]
pub use hosted::*;
