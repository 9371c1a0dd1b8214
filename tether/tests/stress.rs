//! Stress tests: arbitrary multithreaded clone/drop/demote/promote traffic
//! against a single object must destroy it exactly once, and concurrent
//! copies must be counted exactly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rand::Rng;
use tether::Ptr;

struct Counted {
    drops: Arc<AtomicUsize>,
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_copies_are_counted_exactly() {
    // N threads each take M copies with no drops; the observed strong count
    // is exactly the original plus N * M.
    const THREADS: usize = 8;
    const COPIES: usize = 64;

    let origin = Ptr::new(0u64);
    let start = Arc::new(Barrier::new(THREADS + 1));
    let done = Arc::new(Barrier::new(THREADS + 1));
    let stop = Arc::new(Barrier::new(THREADS + 1));

    let mut handles = Vec::new();
    for _ in 0..THREADS {
        let origin = origin.clone();
        let start = start.clone();
        let done = done.clone();
        let stop = stop.clone();
        handles.push(thread::spawn(move || {
            let mut copies = Vec::with_capacity(COPIES);
            start.wait();
            for _ in 0..COPIES {
                copies.push(origin.clone());
            }
            done.wait();
            // Hold the copies until the main thread has observed the count.
            stop.wait();
            drop(copies);
        }));
    }

    start.wait();
    done.wait();
    // 1 origin + THREADS per-thread handles + THREADS * COPIES copies.
    assert_eq!(origin.strong_count(), 1 + THREADS + THREADS * COPIES);
    stop.wait();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(origin.strong_count(), 1);
}

#[test]
#[cfg_attr(miri, ignore)]
fn churn_destroys_exactly_once() {
    // Random clone/drop/downgrade/promote/observe traffic from many threads.
    const THREADS: usize = 8;
    const OPS: usize = 20_000;

    let drops = Arc::new(AtomicUsize::new(0));
    let origin = Ptr::new(Counted {
        drops: drops.clone(),
    });
    let barrier = Arc::new(Barrier::new(THREADS));

    let mut handles = Vec::new();
    for _ in 0..THREADS {
        let origin = origin.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            let mut rng = rand::rng();
            let mut pool: Vec<Ptr<Counted>> = vec![origin];
            barrier.wait();

            for _ in 0..OPS {
                // Nothing may die while this thread still holds a strong
                // reference in its pool.
                match rng.random_range(0..5usize) {
                    0 => {
                        let pick = rng.random_range(0..pool.len());
                        let copy = pool[pick].clone();
                        pool.push(copy);
                    }
                    1 => {
                        if pool.len() > 1 {
                            let pick = rng.random_range(0..pool.len());
                            pool.swap_remove(pick);
                        }
                    }
                    2 => {
                        let pick = rng.random_range(0..pool.len());
                        let weak = pool[pick].downgrade();
                        if !weak.is_null() {
                            assert!(weak.promote().is_some());
                        }
                    }
                    3 => {
                        let pick = rng.random_range(0..pool.len());
                        let mut edge: Ptr<Counted> = Ptr::null();
                        edge.observe(&pool[pick]);
                        if let Some(promoted) = edge.promote() {
                            assert_eq!(promoted.drops.load(Ordering::SeqCst), 0);
                        }
                    }
                    _ => {
                        let pick = rng.random_range(0..pool.len());
                        assert!(!pool[pick].expired());
                    }
                }
            }
        }));
    }

    drop(origin);
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
#[cfg_attr(miri, ignore)]
fn many_objects_under_weak_pressure() {
    // Per-object: one owner thread drops the strong reference while a
    // watcher thread promotes through a weak handle. Every object dies
    // exactly once, no promotion ever yields a dead object.
    const OBJECTS: usize = 200;

    for round in 0..OBJECTS {
        let drops = Arc::new(AtomicUsize::new(0));
        let strong = Ptr::new(Counted {
            drops: drops.clone(),
        });
        let weak = strong.downgrade();
        let barrier = Arc::new(Barrier::new(2));

        let watcher = {
            let weak = weak.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                while let Some(promoted) = weak.promote() {
                    assert_eq!(promoted.drops.load(Ordering::SeqCst), 0);
                }
            })
        };

        barrier.wait();
        drop(strong);
        watcher.join().unwrap();

        assert_eq!(drops.load(Ordering::SeqCst), 1, "round {round}");
        assert!(weak.expired());
    }
}
