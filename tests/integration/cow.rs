use pcore_api::memory::PteFlags;
use pcore_kernel::KernelConfig;
use pcore_kernel::syscall::SysNum;
use pcore_mm::PAGE_SIZE;

use super::wait_status;
use crate::common::{Machine, fork_into, syscall, user_read, user_write};

/// First heap page; clear of the stack guard below the initial `sp`.
const HEAP: usize = PAGE_SIZE;

#[test]
fn test_fork_shares_then_copies_on_write() {
    Machine::run(KernelConfig::uniprocessor(), |k| {
        syscall(k, SysNum::Sbrk, &[PAGE_SIZE]);
        user_write(k, HEAP, b"original");
        let before = k.free_pages();

        let shared = k.user_pte(HEAP).unwrap().pa();
        let pid = fork_into(k, move |k| {
            let pte = k.user_pte(HEAP).unwrap();
            assert!(pte.flags().contains(PteFlags::C));
            assert_eq!(user_read(k, HEAP, 8), b"original");

            // The parent already took its copy, so this one upgrades in place.
            assert_eq!(k.kmem.refcount(pte.pa()), 1);
            user_write(k, HEAP, b"child!!!");
            let after = k.user_pte(HEAP).unwrap();
            assert_eq!(after.pa(), pte.pa());
            assert!(after.flags().contains(PteFlags::W));
            assert!(!after.flags().contains(PteFlags::C));
        });

        // Nothing has run in the child yet on a single hart.
        let pte = k.user_pte(HEAP).unwrap();
        assert_eq!(pte.pa(), shared);
        assert!(!pte.flags().contains(PteFlags::W));
        assert!(pte.flags().contains(PteFlags::C));
        assert_eq!(k.kmem.refcount(shared), 2);

        user_write(k, HEAP, b"parent!!");
        let copied = k.user_pte(HEAP).unwrap();
        assert_ne!(copied.pa(), shared);
        assert!(copied.flags().contains(PteFlags::W));
        assert_eq!(k.kmem.refcount(shared), 1);

        let (reaped, status) = wait_status(k);
        assert_eq!(reaped, pid);
        assert_eq!(status, 0);
        assert_eq!(user_read(k, HEAP, 8), b"parent!!");
        // The child's exit freed the original, leaving only the copy.
        assert_eq!(k.free_pages(), before);
    });
}

#[test]
fn test_exit_drops_shared_references() {
    Machine::run(KernelConfig::uniprocessor(), |k| {
        syscall(k, SysNum::Sbrk, &[2 * PAGE_SIZE]);
        user_write(k, HEAP, b"a");
        let first = k.user_pte(HEAP).unwrap().pa();

        let pid = fork_into(k, move |k| {
            assert_eq!(k.user_pte(HEAP).unwrap().pa(), first);
            assert_eq!(user_read(k, HEAP, 1), b"a");
        });
        let (reaped, status) = wait_status(k);
        assert_eq!(reaped, pid);
        assert_eq!(status, 0);

        // The child is gone, so the next write fault upgrades in place.
        user_write(k, HEAP, b"b");
        assert_eq!(k.user_pte(HEAP).unwrap().pa(), first);
    });
}

#[test]
fn test_fault_in_guard_page_kills() {
    Machine::run(KernelConfig::uniprocessor(), |k| {
        let pid = fork_into(k, |k| {
            let sp = k.with_trapframe(|tf| tf.sp);
            // The page below the stack pointer's page is the guard.
            user_write(k, sp - PAGE_SIZE, b"x");
            panic!("survived a stack overflow");
        });
        let (reaped, status) = wait_status(k);
        assert_eq!(reaped, pid);
        assert_eq!(status, -1);
    });
}

#[test]
fn test_fault_above_address_space_kills() {
    Machine::run(KernelConfig::uniprocessor(), |k| {
        let pid = fork_into(k, |k| {
            user_write(k, pcore_api::memory::MAXVA + PAGE_SIZE, b"x");
            panic!("survived a wild store");
        });
        let (_, status) = wait_status(k);
        assert!(pid > 0);
        assert_eq!(status, -1);
    });
}

#[test]
fn test_copy_out_resolves_shared_destination() {
    Machine::run(KernelConfig::uniprocessor(), |k| {
        syscall(k, SysNum::Sbrk, &[PAGE_SIZE]);
        user_write(k, HEAP, b"zz");
        let pid = fork_into(k, |k| {
            let before = k.user_pte(HEAP).unwrap();
            assert!(before.flags().contains(PteFlags::C));
            k.copy_out(HEAP, b"yy").unwrap();
            let after = k.user_pte(HEAP).unwrap();
            assert!(after.flags().contains(PteFlags::W));
            assert_ne!(after.pa(), before.pa());
        });
        let (reaped, status) = wait_status(k);
        assert_eq!(reaped, pid);
        assert_eq!(status, 0);
        assert_eq!(user_read(k, HEAP, 2), b"zz");
    });
}
