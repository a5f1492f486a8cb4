use kernel_sync::SpinLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::{panic, thread};

#[test]
fn guard_releases_on_drop() {
    let l = SpinLock::new(0_u32);

    {
        let mut g = l.lock();
        *g = 41;
        assert!(l.is_locked());
    }
    assert!(!l.is_locked());

    let mut g = l.lock();
    *g += 1;
    assert_eq!(*g, 42);
}

#[test]
fn try_lock_fails_while_held() {
    let l = SpinLock::new(1u8);

    let g1 = l.try_lock();
    assert!(g1.is_some());
    assert!(l.try_lock().is_none());

    drop(g1);
    assert!(l.try_lock().is_some());
}

#[test]
fn with_lock_returns_closure_result() {
    let l = SpinLock::new(vec![1u64, 2]);
    let sum = l.with_lock(|v| {
        v.push(3);
        v.iter().sum::<u64>()
    });
    assert_eq!(sum, 6);
    assert!(!l.is_locked());
}

#[test]
fn exclusive_access_without_locking() {
    let mut l = SpinLock::new(String::from("kmm"));
    l.get_mut().push_str("+kheap");
    assert_eq!(l.into_inner(), "kmm+kheap");
}

#[test]
fn contended_updates_are_serialized() {
    let threads = 8;
    let iters = 2_000;

    let lock = Arc::new(SpinLock::new((0usize, 0usize)));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let in_cs = Arc::clone(&in_cs);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..iters {
                    lock.with_lock(|(allocated, freed)| {
                        let prev = in_cs.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(prev, 0, "mutual exclusion violated");
                        *allocated += 1;
                        *freed += 1;
                        in_cs.fetch_sub(1, Ordering::SeqCst);
                    });
                    thread::yield_now();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let (allocated, freed) = lock.with_lock(|v| *v);
    assert_eq!(allocated, threads * iters);
    assert_eq!(allocated, freed);
}

#[test]
fn lock_is_released_on_panic() {
    let l = SpinLock::new(0u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 7;
            panic!("allocator bug");
        });
    }));
    assert!(res.is_err());
    assert_eq!(l.with_lock(|v| *v), 7);
}

#[test]
fn spinlock_is_send_and_sync_for_send_t() {
    fn takes_sync<S: Sync>(_s: &S) {}
    fn takes_send<S: Send>(_s: S) {}
    takes_sync(&SpinLock::new(0u8));
    takes_send(SpinLock::new(vec![0u8; 4]));
}
