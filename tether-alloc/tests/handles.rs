//! Adapter contract tests: the raw pointer stays valid until the table
//! entry and every adopted reference are released; stale ids are safe.

use std::sync::{Arc, Barrier};
use std::thread;

use tether_alloc::{adopt, alloc_array, alloc_bytes, alloc_one, alloc_zeroed, ffi, free, RawAlloc};

// ============================================================================
// Basic allocation
// ============================================================================

#[test]
fn alloc_and_free_round_trip() {
    let handle = alloc_bytes(64);
    assert!(!handle.is_failure());
    assert!(!handle.raw.is_null());
    assert_ne!(handle.id, 0);

    assert!(free(handle.id));
    assert!(!free(handle.id));
}

#[test]
fn ids_are_never_reused() {
    let a = alloc_bytes(8);
    let b = alloc_bytes(8);
    assert_ne!(a.id, b.id);

    free(a.id);
    let c = alloc_bytes(8);
    assert_ne!(c.id, a.id);

    free(b.id);
    free(c.id);
}

#[test]
fn zeroed_allocation_is_observably_zero() {
    let handle = alloc_zeroed(16, 4);
    let keeper = adopt(handle.id).unwrap();
    assert_eq!(keeper.len(), 64);

    // SAFETY: keeper pins the allocation; the region is initialized (zeroed).
    let bytes = unsafe { std::slice::from_raw_parts(handle.raw, keeper.len()) };
    assert!(bytes.iter().all(|&b| b == 0));

    free(handle.id);
}

#[test]
fn writes_through_the_raw_pointer_stick() {
    let handle = alloc_zeroed(1, 8);
    // SAFETY: the allocation is live (not yet freed) and 8 bytes long.
    unsafe {
        handle.raw.write(0xAB);
        assert_eq!(handle.raw.read(), 0xAB);
    }
    free(handle.id);
}

#[test]
fn typed_forms_size_the_region() {
    let one = alloc_one::<u64>();
    let keeper = adopt(one.id).unwrap();
    assert_eq!(keeper.len(), 8);
    free(one.id);

    let array = alloc_array::<u32>(10);
    let keeper = adopt(array.id).unwrap();
    assert_eq!(keeper.len(), 40);
    free(array.id);
}

#[test]
fn allocations_are_malloc_aligned() {
    let handle = alloc_bytes(1);
    assert_eq!(handle.raw as usize % 16, 0);
    free(handle.id);
}

#[test]
fn overflowing_array_fails_instead_of_truncating() {
    let handle = alloc_zeroed(usize::MAX, 2);
    assert!(handle.is_failure());
    assert!(handle.raw.is_null());
}

#[test]
fn zero_size_allocation_is_a_valid_handle() {
    let handle = alloc_bytes(0);
    assert!(!handle.is_failure());
    let keeper = adopt(handle.id).unwrap();
    assert!(keeper.is_empty());
    assert!(free(handle.id));
}

// ============================================================================
// Lifetime across adopt/free
// ============================================================================

#[test]
fn adopted_reference_outlives_the_explicit_free() {
    let handle = alloc_zeroed(1, 32);
    let keeper = adopt(handle.id).unwrap();
    assert_eq!(keeper.strong_count(), 2);

    assert!(free(handle.id));

    // The table reference is gone but the adopted one still pins the bytes.
    assert_eq!(keeper.strong_count(), 1);
    // SAFETY: keeper holds the allocation alive.
    let bytes = unsafe { std::slice::from_raw_parts(handle.raw, keeper.len()) };
    assert!(bytes.iter().all(|&b| b == 0));

    // Once freed, the id can no longer be adopted.
    assert!(adopt(handle.id).is_none());
}

#[test]
fn adopt_of_unknown_id_is_none() {
    assert!(adopt(u64::MAX).is_none());
    assert!(adopt(0).is_none());
}

// ============================================================================
// C entry points
// ============================================================================

#[test]
fn ffi_surface_matches_the_rust_one() {
    let handle: RawAlloc = ffi::tether_malloc(24);
    assert!(!handle.is_failure());

    let zeroed = ffi::tether_calloc(3, 8);
    let keeper = adopt(zeroed.id).unwrap();
    assert_eq!(keeper.len(), 24);

    assert!(ffi::tether_free(handle.id));
    assert!(ffi::tether_free(zeroed.id));
    assert!(!ffi::tether_free(zeroed.id));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_adopt_and_free_is_safe() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 500;

    for _ in 0..ROUNDS {
        let handle = alloc_zeroed(1, 16);
        let barrier = Arc::new(Barrier::new(THREADS + 1));

        let mut workers = Vec::new();
        for _ in 0..THREADS {
            let barrier = barrier.clone();
            let id = handle.id;
            workers.push(thread::spawn(move || {
                barrier.wait();
                if let Some(keeper) = adopt(id) {
                    // An adopted reference always sees live bytes.
                    assert_eq!(keeper.len(), 16);
                }
            }));
        }

        barrier.wait();
        assert!(free(handle.id));

        for worker in workers {
            worker.join().unwrap();
        }
        // Whatever the interleaving, the free happened exactly once and
        // every successful adopt observed a live allocation.
        assert!(!free(handle.id));
    }
}
