//! Demonstration workload: several worker threads hammering a small
//! population of records, some sequential multi-record accesses to
//! exercise ordering/reorder, and `Busy` accesses deferred onto the
//! record's own queue. Grounded in `Source/example.cpp`'s
//! `CPersonManager` demo.

use rand::Rng;
use ranklock::{DataManager, LockMode, LockSubsystemBuilder};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
struct Person {
    age: u32,
    touched: u32,
}

const RECORD_COUNT: u32 = 100;
const WORKER_COUNT: usize = 5;
const RUN_DURATION: Duration = Duration::from_secs(2);

fn main() {
    let tracker = LockSubsystemBuilder::new()
        .build()
        .expect("failed to build lock subsystem");
    let manager: Arc<DataManager<u32, Person>> = Arc::new(DataManager::new(tracker));
    for id in 1..=RECORD_COUNT {
        manager.insert(id, Person::default());
    }

    let successes = Arc::new(AtomicU32::new(0));
    let busies = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..WORKER_COUNT)
        .map(|worker_id| {
            let manager = Arc::clone(&manager);
            let successes = Arc::clone(&successes);
            let busies = Arc::clone(&busies);
            thread::spawn(move || worker_loop(worker_id, &manager, &successes, &busies))
        })
        .collect();

    thread::sleep(RUN_DURATION);
    for handle in handles {
        let _ = handle.join();
    }

    let mut total_age = 0u64;
    for id in 1..=RECORD_COUNT {
        let wrapper = manager.access(&id, LockMode::Read);
        if wrapper.is_live() {
            total_age += u64::from(wrapper.age);
        }
    }

    println!(
        "successes={}, busy={}, total_age={total_age}",
        successes.load(Ordering::Relaxed),
        busies.load(Ordering::Relaxed)
    );
}

fn worker_loop(
    worker_id: usize,
    manager: &DataManager<u32, Person>,
    successes: &AtomicU32,
    busies: &AtomicU32,
) {
    let start = std::time::Instant::now();
    let mut rng = rand::rng();
    while start.elapsed() < RUN_DURATION {
        // Two workers race on the same two low-numbered records in
        // opposite order, to exercise reorder-on-violation.
        let (first, second) = if worker_id % 2 == 0 { (1, 2) } else { (2, 1) };
        access_and_bump(manager, first, successes, busies);
        access_and_bump(manager, second, successes, busies);

        let id = rng.random_range(1..=RECORD_COUNT);
        let mode = if rng.random_bool(0.5) { LockMode::Read } else { LockMode::Write };
        let wrapper = manager.access_or_defer(&id, mode, worker_id, move |worker_id| {
            eprintln!("deferred bump for record {id} by worker {worker_id}");
        });
        match wrapper.status() {
            ranklock::WrapperStatus::Success => {
                successes.fetch_add(1, Ordering::Relaxed);
            }
            ranklock::WrapperStatus::Busy => {
                busies.fetch_add(1, Ordering::Relaxed);
            }
            ranklock::WrapperStatus::DataAbsent => {}
        }

        thread::sleep(Duration::from_millis(1));
    }
}

fn access_and_bump(manager: &DataManager<u32, Person>, id: u32, successes: &AtomicU32, busies: &AtomicU32) {
    let mut wrapper = manager.access(&id, LockMode::Write);
    match wrapper.status() {
        ranklock::WrapperStatus::Success => {
            wrapper.touched += 1;
            successes.fetch_add(1, Ordering::Relaxed);
        }
        ranklock::WrapperStatus::Busy => {
            busies.fetch_add(1, Ordering::Relaxed);
        }
        ranklock::WrapperStatus::DataAbsent => {}
    }
}
