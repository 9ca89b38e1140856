//! Whole-kernel scenarios on the host simulator

mod cow;
mod lifecycle;
mod sched;

use pcore_kernel::Kernel;
use pcore_kernel::syscall::SysNum;

use crate::common::{syscall, user_read};

/// Scratch user address inside the first process's page.
pub(crate) const SCRATCH: usize = 0x800;

/// `wait` with the status copied to [`SCRATCH`]. Returns (pid, status).
pub(crate) fn wait_status(k: &'static Kernel) -> (isize, i32) {
    let pid = syscall(k, SysNum::Wait, &[SCRATCH]);
    let raw = user_read(k, SCRATCH, 4);
    (pid, i32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]))
}
