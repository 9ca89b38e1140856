use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicIsize, Ordering};

use pcore_kernel::syscall::SysNum;
use pcore_kernel::{Error, Kernel, KernelConfig, SchedulerKind};
use pcore_mm::PAGE_SIZE;

use super::wait_status;
use crate::common::{Machine, SimFs, arena, fork_into, idle_platform, syscall, user_read, user_write};

#[test]
fn test_first_process_runs() {
    let fs = SimFs::new();
    let (pid, name) = Machine::run_with_fs(KernelConfig::uniprocessor(), fs.clone(), |k| {
        let pid = syscall(k, SysNum::Getpid, &[]);
        let info = k.proc_info(pid as u32).unwrap();
        (pid, info.name.as_str().to_string())
    });
    assert_eq!(pid, 1);
    assert_eq!(name, "initcode");
    assert_eq!(fs.init_count(), 1);
    assert_eq!(fs.root_refs(), 1);
}

#[test]
fn test_boot_rejects_bad_config() {
    let config = KernelConfig::default().with_cpus(0);
    assert!(matches!(
        Kernel::boot(config, arena(8), idle_platform(), &[0x73]),
        Err(Error::ConfigError(_))
    ));
    let big = vec![0u8; PAGE_SIZE];
    assert!(Kernel::boot(KernelConfig::uniprocessor(), arena(8), idle_platform(), &big).is_err());
}

#[test]
fn test_fork_and_reap_many() {
    const CHILDREN: usize = 10;
    let (statuses, count, leaked) = Machine::run(KernelConfig::uniprocessor(), |k| {
        let before = k.free_pages();
        for i in 0..CHILDREN {
            let pid = fork_into(k, move |k| {
                syscall(k, SysNum::Exit, &[i]);
            });
            assert!(pid > 1);
        }
        let mut statuses = BTreeSet::new();
        for _ in 0..CHILDREN {
            let (pid, status) = wait_status(k);
            assert!(pid > 1);
            statuses.insert(status);
        }
        assert_eq!(syscall(k, SysNum::Wait, &[0]), -1);
        (statuses, k.proc_count(), before - k.free_pages())
    });
    assert_eq!(statuses, (0..CHILDREN as i32).collect());
    assert_eq!(count, 1);
    assert_eq!(leaked, 0);
}

#[test]
fn test_fork_returns_zero_in_child() {
    let child_a0 = Arc::new(AtomicIsize::new(-2));
    let seen = child_a0.clone();
    Machine::run(KernelConfig::uniprocessor(), move |k| {
        let seen = seen.clone();
        let pid = fork_into(k, move |k| {
            seen.store(k.with_trapframe(|tf| tf.a0) as isize, Ordering::SeqCst);
        });
        let (reaped, status) = wait_status(k);
        assert_eq!(reaped, pid);
        assert_eq!(status, 0);
    });
    assert_eq!(child_a0.load(Ordering::SeqCst), 0);
}

#[test]
fn test_orphans_are_reparented_to_init() {
    let (middle, grandchild, parent_after, status) = Machine::run(KernelConfig::uniprocessor(), |k| {
        let grandchild = Arc::new(AtomicIsize::new(0));
        let g = grandchild.clone();
        let middle = fork_into(k, move |k| {
            let pid = fork_into(k, |k| {
                syscall(k, SysNum::Sleep, &[5]);
                syscall(k, SysNum::Exit, &[7]);
            });
            g.store(pid, Ordering::SeqCst);
        });

        let (reaped, status) = wait_status(k);
        assert_eq!(reaped, middle);
        assert_eq!(status, 0);

        let grandchild = grandchild.load(Ordering::SeqCst);
        let parent_after = k.proc_info(grandchild as u32).and_then(|info| info.parent);
        let (reaped, status) = wait_status(k);
        assert_eq!(reaped, grandchild);
        (middle, grandchild, parent_after, status)
    });
    assert!(grandchild > middle);
    assert_eq!(parent_after, Some(1));
    assert_eq!(status, 7);
}

#[test]
fn test_kill_sleeping_child_exits_minus_one() {
    let (status, killed_unknown) = Machine::run(KernelConfig::uniprocessor(), |k| {
        let pid = fork_into(k, |k| {
            syscall(k, SysNum::Sleep, &[1_000_000]);
            panic!("slept through kill");
        });
        // Let the child reach its sleep.
        syscall(k, SysNum::Sleep, &[2]);

        assert_eq!(syscall(k, SysNum::Kill, &[pid as usize]), 0);
        let (reaped, status) = wait_status(k);
        assert_eq!(reaped, pid);
        (status, syscall(k, SysNum::Kill, &[pid as usize]))
    });
    assert_eq!(status, -1);
    assert_eq!(killed_unknown, -1);
}

#[test]
fn test_fork_duplicates_and_exit_closes_files() {
    let fs = SimFs::new();
    let probe = fs.clone();
    Machine::run_with_fs(KernelConfig::uniprocessor(), fs.clone(), move |k| {
        let file = probe.open();
        let id = file.0;
        assert_eq!(k.fd_alloc(file).unwrap(), 0);

        let inner = probe.clone();
        let pid = fork_into(k, move |_| {
            assert_eq!(inner.file_refs(id), 2);
            assert_eq!(inner.root_refs(), 2);
        });
        let (reaped, status) = wait_status(k);
        assert_eq!(reaped, pid);
        assert_eq!(status, 0);
        assert_eq!(probe.file_refs(id), 1);
        assert_eq!(probe.root_refs(), 1);
    });
    assert!(fs.transactions() >= 1);
}

#[test]
fn test_fd_table_full_closes_file() {
    let fs = SimFs::new();
    let probe = fs.clone();
    Machine::run_with_fs(KernelConfig::uniprocessor(), fs, move |k| {
        for fd in 0..pcore_kernel::config::NOFILE {
            assert_eq!(k.fd_alloc(probe.open()).unwrap(), fd);
        }
        let extra = probe.open();
        let id = extra.0;
        assert!(k.fd_alloc(extra).is_err());
        assert_eq!(probe.file_refs(id), 0);
    });
}

#[test]
fn test_sbrk_grows_and_shrinks() {
    Machine::run(KernelConfig::uniprocessor(), |k| {
        let pid = fork_into(k, |k| {
            let old = syscall(k, SysNum::Sbrk, &[2 * PAGE_SIZE]);
            assert_eq!(old as usize, PAGE_SIZE);
            assert_eq!(k.user_size(), 3 * PAGE_SIZE);

            user_write(k, PAGE_SIZE + 16, b"heap");
            assert_eq!(user_read(k, PAGE_SIZE + 16, 4), b"heap");
            assert_eq!(user_read(k, 2 * PAGE_SIZE, 8), [0u8; 8]);

            let shrink = -(PAGE_SIZE as isize);
            assert_eq!(syscall(k, SysNum::Sbrk, &[shrink as usize]) as usize, 3 * PAGE_SIZE);
            assert!(k.user_pte(2 * PAGE_SIZE).is_none());

            // Touching the released page kills the process.
            user_write(k, 2 * PAGE_SIZE, b"x");
            panic!("survived a fault on unmapped memory");
        });
        let (reaped, status) = wait_status(k);
        assert_eq!(reaped, pid);
        assert_eq!(status, -1);
    });
}

#[test]
fn test_wait_without_children_fails() {
    let r = Machine::run(KernelConfig::uniprocessor().with_policy(SchedulerKind::Fcfs), |k| {
        syscall(k, SysNum::Wait, &[0])
    });
    assert_eq!(r, -1);
}

#[test]
fn test_process_table_limit() {
    let (forked, failed) = Machine::run(KernelConfig::uniprocessor().with_procs(4), |k| {
        let mut forked = Vec::new();
        let mut failed = 0;
        for _ in 0..5 {
            let pid = fork_into(k, |k| {
                syscall(k, SysNum::Sleep, &[1]);
            });
            if pid < 0 {
                failed += 1;
            } else {
                forked.push(pid);
            }
        }
        for _ in &forked {
            wait_status(k);
        }
        (forked.len(), failed)
    });
    assert_eq!(forked, 3);
    assert_eq!(failed, 2);
}

#[test]
fn test_slots_are_reused_across_many_exits() {
    const ROUNDS: usize = 200;
    let reaped = Machine::run(KernelConfig::uniprocessor().with_procs(2), |k| {
        (0..ROUNDS)
            .filter(|&i| {
                let pid = fork_into(k, move |k| {
                    syscall(k, SysNum::Exit, &[i % 100]);
                });
                wait_status(k) == (pid, (i % 100) as i32)
            })
            .count()
    });
    assert_eq!(reaped, ROUNDS);
}
