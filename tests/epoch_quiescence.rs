//! After every thread releases its reservation, the epoch minimum must
//! read back as "no thread holds one", and the retire stack must drain
//! completely on the next retiring operation.

use std::sync::Arc;
use std::thread;

use nebula_lockfree::EpochManager;

#[test]
fn epoch_minimum_is_all_ones_once_every_thread_releases() {
    let mgr = Arc::new(EpochManager::new());
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let mgr = mgr.clone();
            thread::spawn(move || {
                let slot = mgr.acquire().unwrap();
                mgr.release(slot);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(mgr.min_epoch(), u64::MAX);
}

#[test]
fn retire_stack_drains_after_all_reservations_release() {
    use nebula_lockfree::LinkedSet;

    let set = LinkedSet::<u32>::with_capacity(4).unwrap();
    for i in 0..4 {
        set.insert(i);
    }
    for i in 0..4 {
        assert!(set.remove(&i));
    }
    // No concurrent reservation is outstanding at this point, so the next
    // operation must be able to reclaim every retired node and still have
    // room for a fresh insert.
    for i in 0..4 {
        set.insert(i);
    }
    for i in 0..4 {
        assert!(set.search(&i));
    }
}
