//! System call dispatcher
//!
//! The number is in `a7` and arguments in `a0..a5`; the result goes back in
//! `a0`. Failures return -1.

use core::fmt;

use pcore_api::{Error, KernelError, Pid, Result};

use crate::kernel::Kernel;
use crate::process::{Channel, ProcState};

/// System call numbers
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysNum {
    Fork = 1,
    Exit = 2,
    Wait = 3,
    Kill = 6,
    Getpid = 11,
    Sbrk = 12,
    Sleep = 13,
    Uptime = 14,
    Trace = 22,
    Sigalarm = 23,
    Sigreturn = 24,
    Waitx = 25,
    SetPriority = 26,
    Settickets = 27,
}

impl TryFrom<usize> for SysNum {
    type Error = ();

    fn try_from(n: usize) -> core::result::Result<Self, Self::Error> {
        match n {
            1 => Ok(SysNum::Fork),
            2 => Ok(SysNum::Exit),
            3 => Ok(SysNum::Wait),
            6 => Ok(SysNum::Kill),
            11 => Ok(SysNum::Getpid),
            12 => Ok(SysNum::Sbrk),
            13 => Ok(SysNum::Sleep),
            14 => Ok(SysNum::Uptime),
            22 => Ok(SysNum::Trace),
            23 => Ok(SysNum::Sigalarm),
            24 => Ok(SysNum::Sigreturn),
            25 => Ok(SysNum::Waitx),
            26 => Ok(SysNum::SetPriority),
            27 => Ok(SysNum::Settickets),
            _ => Err(()),
        }
    }
}

impl SysNum {
    pub const fn name(self) -> &'static str {
        match self {
            SysNum::Fork => "fork",
            SysNum::Exit => "exit",
            SysNum::Wait => "wait",
            SysNum::Kill => "kill",
            SysNum::Getpid => "getpid",
            SysNum::Sbrk => "sbrk",
            SysNum::Sleep => "sleep",
            SysNum::Uptime => "uptime",
            SysNum::Trace => "trace",
            SysNum::Sigalarm => "sigalarm",
            SysNum::Sigreturn => "sigreturn",
            SysNum::Waitx => "waitx",
            SysNum::SetPriority => "set_priority",
            SysNum::Settickets => "settickets",
        }
    }

    /// Arguments shown in a trace line.
    pub const fn nargs(self) -> usize {
        match self {
            SysNum::Fork | SysNum::Getpid | SysNum::Uptime | SysNum::Sigreturn => 0,
            SysNum::Exit
            | SysNum::Wait
            | SysNum::Kill
            | SysNum::Sbrk
            | SysNum::Sleep
            | SysNum::Trace
            | SysNum::Settickets => 1,
            SysNum::Sigalarm | SysNum::SetPriority => 2,
            SysNum::Waitx => 3,
        }
    }
}

/// Trace rendering of raw argument registers, as signed integers.
struct Args<'a>(&'a [usize]);

impl fmt::Display for Args<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, a) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", *a as isize)?;
        }
        Ok(())
    }
}

fn ret(r: Result<isize>) -> isize {
    r.unwrap_or_else(|e| e.errno())
}

impl Kernel {
    /// Runs the system call named by the current trap frame.
    pub fn syscall(&self) {
        let p = self.current();
        let (num, args) = self.with_trapframe(|tf| (tf.a7, [tf.a0, tf.a1, tf.a2, tf.a3, tf.a4, tf.a5]));
        let pid = p.inner.lock().pid;

        let sys = match SysNum::try_from(num) {
            Ok(sys) => sys,
            Err(()) => {
                let name = unsafe { &p.data().name };
                log::warn!("{} {}: unknown sys call {}", pid, name, num);
                self.with_trapframe(|tf| tf.a0 = usize::MAX);
                return;
            }
        };

        let r = self.dispatch(sys, &args);
        self.with_trapframe(|tf| tf.a0 = r as usize);

        let mask = unsafe { p.data() }.trace_mask;
        if mask & (1 << num) != 0 {
            log::debug!("{}: syscall {} ({}) -> {}", pid, sys.name(), Args(&args[..sys.nargs()]), r);
        }
    }

    fn dispatch(&self, sys: SysNum, args: &[usize; 6]) -> isize {
        match sys {
            SysNum::Fork => ret(self.fork().map(|pid| pid as isize)),
            SysNum::Exit => self.exit(args[0] as i32),
            SysNum::Wait => ret(self.wait(args[0]).map(|r| r.pid as isize)),
            SysNum::Kill => ret(self.kill(args[0] as Pid).map(|()| 0)),
            SysNum::Getpid => self.getpid() as isize,
            SysNum::Sbrk => ret(self.growproc(args[0] as isize).map(|sz| sz as isize)),
            SysNum::Sleep => ret(self.sys_sleep(args[0] as i32 as i64).map(|()| 0)),
            SysNum::Uptime => self.now() as isize,
            SysNum::Trace => {
                unsafe { self.current().data() }.trace_mask = args[0] as u32;
                0
            }
            SysNum::Sigalarm => {
                self.sigalarm(args[0] as i32 as i64, args[1]);
                0
            }
            SysNum::Sigreturn => self.sigreturn() as isize,
            SysNum::Waitx => ret(self.sys_waitx(args[0], args[1], args[2])),
            SysNum::SetPriority => ret(
                self.set_priority(args[1] as Pid, args[0] as i32 as i64)
                    .map(|old| old as isize),
            ),
            SysNum::Settickets => ret(self.set_tickets(args[0] as i32 as i64).map(|()| 0)),
        }
    }

    /// Sleeps the current process for `n` clock ticks.
    fn sys_sleep(&self, n: i64) -> Result<()> {
        let p = self.current();
        let mut guard = self.tickslock.lock();
        let start = self.now();
        while ((self.now() - start) as i64) < n {
            if self.killed(p) {
                return Err(Error::Kernel(KernelError::Interrupted));
            }
            guard = self.sleep(Channel::of(&self.ticks), guard);
        }
        drop(guard);
        Ok(())
    }

    fn sys_waitx(&self, addr: usize, wtime_addr: usize, rtime_addr: usize) -> Result<isize> {
        let reaped = self.wait(addr)?;
        self.copy_out(wtime_addr, &(reaped.wtime as u32).to_ne_bytes())?;
        self.copy_out(rtime_addr, &(reaped.rtime as u32).to_ne_bytes())?;
        Ok(reaped.pid as isize)
    }

    /// Arms the alarm to divert the current process to `handler` every `n`
    /// of its timer ticks. `n <= 0` disarms it.
    pub fn sigalarm(&self, n: i64, handler: usize) {
        let p = self.current();
        let _guard = p.inner.lock();
        let alarm = &mut unsafe { p.data() }.alarm;
        alarm.armed = n > 0;
        alarm.interval = n.max(0) as u64;
        alarm.since = alarm.ticks;
        alarm.handler = handler;
    }

    /// Returns from an alarm handler to the interrupted user state.
    /// Yields the restored `a0`.
    pub fn sigreturn(&self) -> usize {
        let p = self.current();
        let _guard = p.inner.lock();
        let data = unsafe { p.data() };

        let alarm = &mut data.alarm;
        alarm.armed = alarm.interval > 0;
        alarm.since = alarm.ticks;

        let mem = data.memory();
        let live = *mem.trapframe;
        let mut saved = *mem.trapcopy;
        saved.kernel_satp = live.kernel_satp;
        saved.kernel_sp = live.kernel_sp;
        saved.kernel_trap = live.kernel_trap;
        saved.kernel_hartid = live.kernel_hartid;
        *mem.trapframe = saved;
        saved.a0
    }

    /// Sets the static priority of `pid` and returns the old one. The caller
    /// yields if the priority went down.
    pub fn set_priority(&self, pid: Pid, priority: i64) -> Result<u32> {
        if !(0..=self.config.pbs.max_priority as i64).contains(&priority) {
            return Err(Error::InvalidArgument("priority out of range"));
        }
        let priority = priority as u32;

        let mut old = None;
        for p in self.procs.iter() {
            let mut inner = p.inner.lock();
            let live = matches!(inner.state, ProcState::Sleeping | ProcState::Running | ProcState::Runnable);
            if live && inner.pid == pid {
                old = Some(
                    self.policy
                        .set_priority(&mut inner, priority)
                        .ok_or(Error::NotSupported("policy has no priorities"))?,
                );
                break;
            }
        }

        let old = old.ok_or(Error::Kernel(KernelError::NoProcess))?;
        if priority < old && self.myproc().is_some() {
            self.yield_now();
        }
        Ok(old)
    }

    /// Sets the current process's lottery tickets.
    pub fn set_tickets(&self, n: i64) -> Result<()> {
        let tickets = u32::try_from(n).map_err(|_| Error::InvalidArgument("negative ticket count"))?;
        let p = self.current();
        let mut inner = p.inner.lock();
        if self.policy.set_tickets(&mut inner, tickets) {
            Ok(())
        } else {
            Err(Error::NotSupported("policy has no tickets"))
        }
    }
}
