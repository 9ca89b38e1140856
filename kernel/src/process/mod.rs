//! Process management
//!
//! - `proc`: the process control block and the resources a slot owns
//! - `table`: the fixed-capacity table, slot allocation and reclamation
//! - `lifecycle`: first process, fork, exit, wait, kill and memory growth
//! - `sleep`: channel-based blocking, yield and the switch back to the
//!   dispatch loop
//! - `dump`: the locked per-process snapshot and the lock-free debug listing

mod dump;
mod lifecycle;
mod proc;
mod sleep;
mod table;

pub use dump::ProcInfo;
pub use lifecycle::{Reaped, fork_ret};
pub use proc::{Alarm, Channel, Proc, ProcData, ProcInner, ProcMemory, ProcState, SchedInfo, TrapFrame, UserSpace};
pub use table::ProcTable;
