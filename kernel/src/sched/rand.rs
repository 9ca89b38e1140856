//! Park-Miller minimal standard generator
//!
//! x' = 16807 * x mod (2^31 - 1), computed with Schrage's method so no
//! intermediate leaves 32 bits.

use core::sync::atomic::{AtomicU64, Ordering};

const MODULUS: i64 = 0x7fff_ffff;
const MULTIPLIER: i64 = 16807;
const Q: i64 = 127773;
const R: i64 = 2836;

/// One step from `state`. Returns the new state, in `[0, 0x7ffffffd]`.
pub const fn step(state: u64) -> u64 {
    // Into [1, 0x7ffffffe].
    let mut x = (state % 0x7fff_fffe) as i64 + 1;
    let hi = x / Q;
    let lo = x % Q;
    x = MULTIPLIER * lo - R * hi;
    if x < 0 {
        x += MODULUS;
    }
    (x - 1) as u64
}

/// Shared generator state.
pub struct ParkMiller {
    state: AtomicU64,
}

impl ParkMiller {
    pub const fn new(seed: u64) -> Self {
        Self {
            state: AtomicU64::new(seed),
        }
    }

    pub fn next(&self) -> u64 {
        let mut cur = self.state.load(Ordering::Relaxed);
        loop {
            let next = step(cur);
            match self
                .state
                .compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => cur = actual,
            }
        }
    }
}
