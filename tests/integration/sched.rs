use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use pcore_kernel::syscall::SysNum;
use pcore_kernel::{KernelConfig, SchedulerKind};

use super::wait_status;
use crate::common::{Machine, fork_into, syscall, tick};

fn config(policy: SchedulerKind) -> KernelConfig {
    KernelConfig::uniprocessor().with_policy(policy)
}

#[test]
fn test_fcfs_runs_in_arrival_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let seen = order.clone();
    let forked = Machine::run(config(SchedulerKind::Fcfs), move |k| {
        let mut forked = Vec::new();
        for _ in 0..4 {
            let seen = seen.clone();
            forked.push(fork_into(k, move |k| {
                // Not preempted, so the tick must not hand the hart over.
                tick(k);
                seen.lock().unwrap().push(syscall(k, SysNum::Getpid, &[]));
            }));
        }
        for _ in 0..4 {
            wait_status(k);
        }
        forked
    });
    assert_eq!(*order.lock().unwrap(), forked);
}

#[test]
fn test_set_priority_returns_old_and_yields() {
    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    Machine::run(config(SchedulerKind::Priority), move |k| {
        let child_flag = flag.clone();
        let pid = fork_into(k, move |_| child_flag.store(true, Ordering::SeqCst));
        assert_eq!(syscall(k, SysNum::SetPriority, &[40, pid as usize]), 60);
        // The child now outranks us and ran to completion.
        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(wait_status(k), (pid, 0));
    });
    assert!(ran.load(Ordering::SeqCst));
}

#[test]
fn test_set_priority_rejects_bad_input() {
    let (range, missing, raised) = Machine::run(config(SchedulerKind::Priority), |k| {
        let me = syscall(k, SysNum::Getpid, &[]) as usize;
        let range = syscall(k, SysNum::SetPriority, &[101, me]);
        let missing = syscall(k, SysNum::SetPriority, &[50, 4242]);
        let raised = syscall(k, SysNum::SetPriority, &[70, me]);
        (range, missing, raised)
    });
    assert_eq!(range, -1);
    assert_eq!(missing, -1);
    assert_eq!(raised, 60);
}

#[test]
fn test_set_priority_needs_priority_policy() {
    let r = Machine::run(KernelConfig::uniprocessor(), |k| {
        let me = syscall(k, SysNum::Getpid, &[]) as usize;
        syscall(k, SysNum::SetPriority, &[10, me])
    });
    assert_eq!(r, -1);
}

#[test]
fn test_settickets_and_inheritance() {
    Machine::run(config(SchedulerKind::Lottery), |k| {
        assert_eq!(syscall(k, SysNum::Settickets, &[5]), 0);
        let me = syscall(k, SysNum::Getpid, &[]) as u32;
        assert_eq!(k.proc_info(me).unwrap().sched.tickets, 5);
        assert_eq!(syscall(k, SysNum::Settickets, &[usize::MAX]), -1);

        let pid = fork_into(k, |k| {
            let me = syscall(k, SysNum::Getpid, &[]) as u32;
            assert_eq!(k.proc_info(me).unwrap().sched.tickets, 5);
        });
        assert_eq!(wait_status(k), (pid, 0));
    });
}

#[test]
fn test_settickets_needs_lottery() {
    let r = Machine::run(KernelConfig::uniprocessor(), |k| syscall(k, SysNum::Settickets, &[5]));
    assert_eq!(r, -1);
}

#[test]
fn test_mlfq_demotes_after_full_quantum() {
    let queues = Machine::run(config(SchedulerKind::Mlfq), |k| {
        let queues = Arc::new(Mutex::new(Vec::new()));
        let seen = queues.clone();
        fork_into(k, move |k| {
            let me = syscall(k, SysNum::Getpid, &[]) as u32;
            seen.lock().unwrap().push(k.proc_info(me).unwrap().sched.queue);
            // One tick in queue 0, then two in queue 1.
            for _ in 0..3 {
                tick(k);
                seen.lock().unwrap().push(k.proc_info(me).unwrap().sched.queue);
            }
        });
        wait_status(k);
        queues.lock().unwrap().clone()
    });
    assert_eq!(queues, vec![0, 1, 1, 2]);
}

#[test]
fn test_lottery_runs_everyone() {
    let done = Machine::run(config(SchedulerKind::Lottery).with_cpus(2), |k| {
        for _ in 0..6 {
            fork_into(k, |k| {
                for _ in 0..5 {
                    syscall(k, SysNum::Sleep, &[1]);
                }
            });
        }
        (0..6).filter(|_| wait_status(k).1 == 0).count()
    });
    assert_eq!(done, 6);
}
