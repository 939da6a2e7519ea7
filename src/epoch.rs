//! Epoch-based reclamation (EBR).
//!
//! Every mutating operation on [`crate::pool::MemoryPool`]'s clients
//! ([`crate::linked_set::LinkedSet`], [`crate::hash_map::LockFreeHashMap`])
//! pins a global epoch for its duration by holding a reservation slot. A
//! retired node is only returned to its pool once the minimum reservation
//! across all threads has moved strictly past the node's retirement epoch —
//! see `min_epoch` below for the full argument.

use core::cell::Cell;

use crate::error::LockFreeError;
use crate::loom_shim::{AtomicU64, Ordering};

/// Fixed width of the reservation table. A compile-time tuning knob: the
/// only user-visible one besides pool and bucket sizes.
pub const MAX_THREADS: usize = 128;

/// Sentinel meaning "no reservation held". `u64::MAX` can never collide with
/// a real epoch because `next_epoch` would have to wrap a 64-bit counter
/// first.
const NO_RESERVATION: u64 = u64::MAX;

thread_local! {
    /// A per-OS-thread affinity hint: the reservation slot this thread was
    /// last handed, by *any* [`EpochManager`] it has called into. Trying
    /// this index first turns `acquire` from an `O(MAX_THREADS)` scan into
    /// an `O(1)` CAS on the common path. The hint is just an index: reusing
    /// it against a different manager instance is always safe, merely
    /// sometimes a miss.
    static SLOT_HINT: Cell<Option<usize>> = Cell::new(None);
}

/// Issues monotonic epochs and tracks the minimum epoch any thread still
/// has reserved.
#[derive(Debug)]
pub struct EpochManager {
    global_epoch: AtomicU64,
    reservations: [AtomicU64; MAX_THREADS],
}

impl Default for EpochManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EpochManager {
    /// Builds a manager with every reservation slot free.
    pub fn new() -> Self {
        Self {
            global_epoch: AtomicU64::new(0),
            reservations: core::array::from_fn(|_| AtomicU64::new(NO_RESERVATION)),
        }
    }

    /// Atomically increments the global counter and returns the epoch that
    /// was current just before the increment (the epoch assigned to the
    /// caller).
    pub fn next_epoch(&self) -> u64 {
        self.global_epoch.fetch_add(1, Ordering::AcqRel)
    }

    /// Reserves a slot pinned at a freshly minted epoch and returns its
    /// index. Fails only when every one of the `MAX_THREADS` slots is
    /// already held — a fixed-size capacity error, not a runtime wait.
    pub fn acquire(&self) -> Result<usize, LockFreeError> {
        let epoch = self.next_epoch();

        if let Some(hint) = SLOT_HINT.with(Cell::get) {
            if self.try_claim(hint, epoch) {
                return Ok(hint);
            }
        }

        for slot in 0..MAX_THREADS {
            if self.try_claim(slot, epoch) {
                SLOT_HINT.with(|cell| cell.set(Some(slot)));
                return Ok(slot);
            }
        }

        tracing::error!(
            target: "nebula_lockfree::epoch",
            max_threads = MAX_THREADS,
            "reservation table exhausted"
        );
        Err(LockFreeError::ReservationTableFull { max_threads: MAX_THREADS })
    }

    fn try_claim(&self, slot: usize, epoch: u64) -> bool {
        self.reservations[slot]
            .compare_exchange(NO_RESERVATION, epoch, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Releases a reservation acquired by [`Self::acquire`].
    pub fn release(&self, slot: usize) {
        self.reservations[slot].store(NO_RESERVATION, Ordering::Release);
    }

    /// Scans the reservation table and returns the smallest epoch any
    /// thread currently holds, or `u64::MAX` if no thread holds one. Not a
    /// linearisable snapshot: a stale (too-large) read is harmless, it only
    /// makes reclamation conservative.
    pub fn min_epoch(&self) -> u64 {
        let mut min = NO_RESERVATION;
        for slot in &self.reservations {
            let value = slot.load(Ordering::Acquire);
            if value < min {
                min = value;
            }
        }
        min
    }
}

/// RAII guard returned by [`EpochManager::acquire`]-equivalent helpers on
/// the higher-level structures; releases the reservation on drop so a
/// panicking operation can never leak a slot.
pub(crate) struct EpochGuard<'a> {
    manager: &'a EpochManager,
    slot: usize,
}

impl<'a> EpochGuard<'a> {
    pub(crate) fn acquire(manager: &'a EpochManager) -> Result<Self, LockFreeError> {
        let slot = manager.acquire()?;
        Ok(Self { manager, slot })
    }
}

impl Drop for EpochGuard<'_> {
    fn drop(&mut self) {
        self.manager.release(self.slot);
    }
}
