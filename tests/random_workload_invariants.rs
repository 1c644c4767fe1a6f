//! Randomized multi-threaded workload exercising the public surface,
//! checking the externally observable invariants: writers never overlap
//! with another holder, and every wrapper status is one of the documented
//! three values.

use rand::Rng;
use ranklock::{DataManager, LockMode, LockSubsystemBuilder, WrapperStatus};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct Counter {
    writers_inside: AtomicI64,
    max_concurrent_writers: AtomicI64,
}

#[test]
fn no_two_threads_hold_a_write_lock_on_the_same_object_concurrently() {
    let tracker = LockSubsystemBuilder::new().build().unwrap();
    let manager: Arc<DataManager<u32, Counter>> = Arc::new(DataManager::new(tracker));
    const OBJECT_COUNT: u32 = 8;
    for id in 0..OBJECT_COUNT {
        manager.insert(id, Counter::default());
    }

    let threads = 6;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut rng = rand::rng();
                for _ in 0..200 {
                    let id = rng.random_range(0..OBJECT_COUNT);
                    let mode = if rng.random_bool(0.5) { LockMode::Read } else { LockMode::Write };
                    let wrapper = manager.access(&id, mode);
                    match wrapper.status() {
                        WrapperStatus::Success if mode == LockMode::Write => {
                            let before = wrapper.writers_inside.fetch_add(1, Ordering::SeqCst) + 1;
                            wrapper
                                .max_concurrent_writers
                                .fetch_max(before, Ordering::SeqCst);
                            thread::yield_now();
                            wrapper.writers_inside.fetch_sub(1, Ordering::SeqCst);
                        }
                        WrapperStatus::Success | WrapperStatus::Busy | WrapperStatus::DataAbsent => {}
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    for id in 0..OBJECT_COUNT {
        let wrapper = manager.access(&id, LockMode::Read);
        assert!(wrapper.is_live());
        assert_eq!(
            wrapper.max_concurrent_writers.load(Ordering::SeqCst),
            1,
            "object {id} was written by more than one thread at once, or never written"
        );
    }
}

#[test]
fn reordering_never_leaves_a_thread_stuck_under_load() {
    let tracker = LockSubsystemBuilder::new().build().unwrap();
    let manager: Arc<DataManager<u32, i32>> = Arc::new(DataManager::new(tracker));
    for id in 0..5 {
        manager.insert(id, 0);
    }

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for _ in 0..50 {
                    let order: Vec<u32> = if worker % 2 == 0 { vec![0, 1, 2, 3, 4] } else { vec![4, 3, 2, 1, 0] };
                    for id in order {
                        let mut w = manager.access(&id, LockMode::Write);
                        if w.is_live() {
                            *w += 1;
                        }
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    thread::sleep(Duration::from_millis(50));
}
