//! Memory management abstractions

pub mod interface;
pub mod layout;

pub use interface::*;
pub use layout::*;
