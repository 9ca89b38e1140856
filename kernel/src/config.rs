//! Kernel configuration
//!
//! Everything that shapes the process core is fixed when the kernel boots:
//! table capacity, the number of harts, the scheduling policy and its tuning.

use pcore_api::error::{Result, config_error};

use crate::arch::MAX_HARTS;

/// Maximum number of harts that can run a dispatch loop.
pub const MAX_CPUS: usize = MAX_HARTS;

/// Open files per process.
pub const NOFILE: usize = 16;

/// Which scheduling policy the dispatch loops use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerKind {
    /// Rotate through RUNNABLE processes, preempting on every tick.
    #[default]
    RoundRobin,
    /// Oldest process first, never preempted.
    Fcfs,
    /// Static priority adjusted by sleep/run niceness, never preempted.
    Priority,
    /// Random draw weighted by tickets.
    Lottery,
    /// Multi-level feedback queues with aging.
    Mlfq,
}

/// Dynamic-priority tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PbsConfig {
    pub default_priority: u32,
    pub default_niceness: u32,
    pub niceness_scale: u64,
    pub bias: i64,
    pub max_priority: u32,
}

impl Default for PbsConfig {
    fn default() -> Self {
        Self {
            default_priority: 60,
            default_niceness: 5,
            niceness_scale: 10,
            bias: 5,
            max_priority: 100,
        }
    }
}

/// Feedback-queue tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MlfqConfig {
    /// Number of queues; queue `q` has a quantum of `2^q` ticks.
    pub queues: usize,
    /// RUNNABLE ticks without being scheduled before promotion.
    pub aging_threshold: u64,
}

impl Default for MlfqConfig {
    fn default() -> Self {
        Self {
            queues: 5,
            aging_threshold: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotteryConfig {
    pub seed: u64,
    /// Tickets held by the first process; forked children inherit their parent's.
    pub init_tickets: u32,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            init_tickets: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Process table slots.
    pub nproc: usize,
    /// Harts that run a dispatch loop.
    pub ncpu: usize,
    pub policy: SchedulerKind,
    pub pbs: PbsConfig,
    pub mlfq: MlfqConfig,
    pub lottery: LotteryConfig,
    /// Device handed to file-system initialization on the first dispatch.
    pub root_dev: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            nproc: 64,
            ncpu: MAX_CPUS,
            policy: SchedulerKind::default(),
            pbs: PbsConfig::default(),
            mlfq: MlfqConfig::default(),
            lottery: LotteryConfig::default(),
            root_dev: 1,
        }
    }
}

impl KernelConfig {
    /// Single-hart configuration, handy for deterministic runs.
    pub fn uniprocessor() -> Self {
        Self {
            ncpu: 1,
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, policy: SchedulerKind) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cpus(mut self, ncpu: usize) -> Self {
        self.ncpu = ncpu;
        self
    }

    pub fn with_procs(mut self, nproc: usize) -> Self {
        self.nproc = nproc;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.nproc == 0 {
            return Err(config_error("nproc must be at least 1"));
        }
        if self.ncpu == 0 || self.ncpu > MAX_CPUS {
            return Err(config_error("ncpu out of range"));
        }
        if self.mlfq.queues == 0 || self.mlfq.queues > 16 {
            return Err(config_error("mlfq queue count out of range"));
        }
        if self.pbs.default_priority > self.pbs.max_priority {
            return Err(config_error("default priority above maximum"));
        }
        if self.pbs.niceness_scale == 0 {
            return Err(config_error("niceness scale must be positive"));
        }
        Ok(())
    }
}
