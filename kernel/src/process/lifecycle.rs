//! Process lifecycle: the first process, fork, exit, wait and kill

use pcore_api::memory::{PteFlags, TRAPFRAME};
use pcore_api::{Error, FileRef, KernelError, Pid, Result, Ticks, VirtAddr};
use pcore_mm::{PAGE_SIZE, cow, uvm};

use super::proc::{Channel, Proc, ProcState};
use crate::arch;
use crate::config::NOFILE;
use crate::kernel::Kernel;

/// A reaped child, as reported by `wait`/`waitx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaped {
    pub pid: Pid,
    pub status: i32,
    pub rtime: Ticks,
    pub wtime: Ticks,
}

/// First code every new kernel context runs, still holding the process lock
/// taken by the dispatch loop.
pub extern "C-unwind" fn fork_ret(arg: usize) -> ! {
    let kernel = unsafe { &*(arg as *const Kernel) };
    let p = kernel.current();
    unsafe { p.inner.force_unlock() };

    // File-system setup sleeps, so it cannot run from the boot path.
    kernel.first.call_once(|| kernel.platform.fs.init(kernel.config.root_dev));

    kernel.platform.user.user_return(kernel)
}

impl Kernel {
    /// Creates the first user process running `initcode` at address 0.
    pub(crate) fn userinit(&self, initcode: &[u8]) -> Result<()> {
        if initcode.len() >= PAGE_SIZE {
            return Err(Error::InvalidArgument("initcode larger than a page"));
        }

        let (p, mut inner) = self.allocproc()?;
        let data = unsafe { p.data() };

        let mem = data.memory();
        if let Err(e) = uvm::first(self.kmem, mem.uvm.pt.as_mut(), initcode) {
            self.freeproc(p, &mut inner);
            return Err(e);
        }
        mem.uvm.sz = PAGE_SIZE;
        mem.trapframe.epc = 0;
        mem.trapframe.sp = PAGE_SIZE;

        data.set_name("initcode");
        data.cwd = self.platform.fs.namei("/");

        inner.state = ProcState::Runnable;
        self.policy.on_admit(&mut inner, None, self.now());
        self.initproc.call_once(|| p.index);

        log::info!("init process pid {} in slot {}", inner.pid, p.index);
        Ok(())
    }

    /// Creates a child of the current process sharing its memory
    /// copy-on-write. Returns the child's pid; the child sees 0.
    pub fn fork(&self) -> Result<Pid> {
        let p = self.current();
        let (ppid, inherited) = {
            let inner = p.inner.lock();
            (inner.pid, inner.sched)
        };

        let (np, mut ninner) = self.allocproc()?;
        let pdata = unsafe { p.data() };
        let ndata = unsafe { np.data() };

        {
            let pmem = pdata.memory();
            let nmem = ndata.memory();
            let sz = pmem.uvm.sz;
            if let Err(e) = cow::share_range(self.kmem, pmem.uvm.pt.as_mut(), nmem.uvm.pt.as_mut(), sz) {
                log::error!("fork: cannot share {:#x} bytes: {}", sz, e);
                self.freeproc(np, &mut ninner);
                return Err(e);
            }
            // The parent's writable entries just became read-only.
            arch::flush_tlb();
            nmem.uvm.sz = sz;

            *nmem.trapframe = *pmem.trapframe;
            nmem.trapframe.a0 = 0;
        }

        let fs = &self.platform.fs;
        for (dst, src) in ndata.ofile.iter_mut().zip(pdata.ofile.iter()) {
            *dst = src.as_ref().map(|f| fs.dup(f));
        }
        ndata.cwd = pdata.cwd.as_ref().map(|c| fs.idup(c));
        ndata.name = pdata.name.clone();
        ndata.trace_mask = pdata.trace_mask;

        let pid = ninner.pid;
        drop(ninner);

        self.wait_lock.lock()[np.index] = Some(p.index);

        let mut ninner = np.inner.lock();
        ninner.state = ProcState::Runnable;
        self.policy.on_admit(&mut ninner, Some(&inherited), self.now());

        log::trace!("fork: {} -> {}", ppid, pid);
        Ok(pid)
    }

    /// Hands every child of `p` to init. Caller holds `wait_lock`.
    fn reparent(&self, p: &Proc, parents: &mut [Option<usize>]) {
        let init = self.init_slot();
        for parent in parents.iter_mut() {
            if *parent == Some(p.index) {
                *parent = Some(init);
                self.wakeup(Channel::of(&self.procs[init]));
            }
        }
    }

    /// Terminates the current process. It stays a ZOMBIE until its parent
    /// reaps it.
    pub fn exit(&self, status: i32) -> ! {
        let p = self.current();
        if p.index == self.init_slot() {
            panic!("init exiting");
        }

        let data = unsafe { p.data() };
        let fs = &self.platform.fs;
        for slot in data.ofile.iter_mut() {
            if let Some(f) = slot.take() {
                fs.close(f);
            }
        }
        if let Some(cwd) = data.cwd.take() {
            fs.begin_op();
            fs.iput(cwd);
            fs.end_op();
        }

        let mut parents = self.wait_lock.lock();
        self.reparent(p, &mut parents);

        // The parent might be sleeping in wait().
        if let Some(parent) = parents[p.index] {
            self.wakeup(Channel::of(&self.procs[parent]));
        }

        let mut inner = p.inner.lock();
        inner.xstate = status;
        inner.state = ProcState::Zombie;
        inner.etime = self.now();
        log::debug!("pid {} exited with status {}", inner.pid, status);

        drop(parents);

        self.sched_exit(p, inner)
    }

    /// Waits for a child to exit and reaps it. If `addr` is non-zero the
    /// child's exit status is copied there.
    pub fn wait(&self, addr: VirtAddr) -> Result<Reaped> {
        let p = self.current();
        let mut parents = self.wait_lock.lock();

        loop {
            let mut havekids = false;
            for pp in self.procs.iter() {
                if parents[pp.index] != Some(p.index) {
                    continue;
                }

                let mut inner = pp.inner.lock();
                havekids = true;
                if inner.state != ProcState::Zombie {
                    continue;
                }

                if addr != 0 {
                    let mem = unsafe { p.data() }.memory();
                    uvm::copy_out(self.kmem, mem.uvm.pt.as_mut(), addr, &inner.xstate.to_ne_bytes())?;
                }
                let reaped = Reaped {
                    pid: inner.pid,
                    status: inner.xstate,
                    rtime: inner.rtime,
                    wtime: inner.etime.saturating_sub(inner.ctime).saturating_sub(inner.rtime),
                };
                self.freeproc(pp, &mut inner);
                parents[pp.index] = None;
                return Ok(reaped);
            }

            if !havekids {
                return Err(Error::Kernel(KernelError::NoChildren));
            }
            if self.killed(p) {
                return Err(Error::Kernel(KernelError::Interrupted));
            }

            parents = self.sleep(Channel::of(p), parents);
        }
    }

    /// Marks the process `pid` killed; it exits at its next return to user
    /// space. A sleeping target is made RUNNABLE so it gets there.
    pub fn kill(&self, pid: Pid) -> Result<()> {
        for p in self.procs.iter() {
            let mut inner = p.inner.lock();
            if inner.state == ProcState::Unused || inner.pid != pid {
                continue;
            }
            inner.killed = true;
            if inner.state == ProcState::Sleeping {
                inner.state = ProcState::Runnable;
                inner.chan = None;
                self.policy.on_unblock(&mut inner, self.now());
            }
            log::debug!("kill: pid {}", pid);
            return Ok(());
        }
        Err(Error::Kernel(KernelError::NoProcess))
    }

    pub fn setkilled(&self, p: &Proc) {
        p.inner.lock().killed = true;
    }

    pub fn killed(&self, p: &Proc) -> bool {
        p.inner.lock().killed
    }

    /// Grows or shrinks the current process's memory by `n` bytes.
    /// Returns the previous size.
    pub fn growproc(&self, n: isize) -> Result<usize> {
        let p = self.current();
        let mem = unsafe { p.data() }.memory();
        let sz = mem.uvm.sz;

        let newsz = if n > 0 {
            let target = sz
                .checked_add(n.unsigned_abs())
                .filter(|&t| t <= TRAPFRAME)
                .ok_or(Error::OutOfMemory)?;
            uvm::alloc_range(self.kmem, mem.uvm.pt.as_mut(), sz, target, PteFlags::W)?
        } else if n < 0 {
            let target = sz
                .checked_sub(n.unsigned_abs())
                .ok_or(Error::InvalidArgument("shrink below zero"))?;
            let newsz = uvm::dealloc_range(self.kmem, mem.uvm.pt.as_mut(), sz, target);
            arch::flush_tlb();
            newsz
        } else {
            sz
        };

        mem.uvm.sz = newsz;
        Ok(sz)
    }

    /// Installs `file` in the lowest free descriptor slot of the current
    /// process. The file is closed if the table is full.
    pub fn fd_alloc(&self, file: FileRef) -> Result<usize> {
        let data = unsafe { self.current().data() };
        match data.ofile.iter().position(Option::is_none) {
            Some(fd) => {
                data.ofile[fd] = Some(file);
                Ok(fd)
            }
            None => {
                self.platform.fs.close(file);
                log::warn!("fd_alloc: all {} descriptors in use", NOFILE);
                Err(Error::Kernel(KernelError::TooManyFiles))
            }
        }
    }

    pub(crate) fn init_slot(&self) -> usize {
        match self.initproc.get() {
            Some(&slot) => slot,
            None => panic!("no init process"),
        }
    }
}
