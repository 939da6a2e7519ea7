//! Bounded, ABA-safe freelist memory pool.
//!
//! A [`MemoryPool`] pre-allocates a fixed number of slots and hands them out
//! through a lock-free singly-linked freelist. The classic CAS-on-a-pointer
//! ABA hazard is closed by packing a 16-bit version counter alongside the
//! free-list head in one 64-bit word (`VersionedTop`), so a thread that
//! reads `top`, gets preempted, and finds the same slot back at the head
//! later still fails its CAS because the version moved.
//!
//! Slots are addressed by index rather than raw pointer — a slot's
//! identity is "equivalently its index" — which keeps this module entirely
//! safe-Rust-adjacent (one `unsafe` block per accessor, no pointer
//! arithmetic) while matching the source's packed-pointer layout bit for
//! bit.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;

use crate::config::PoolConfig;
use crate::error::LockFreeError;
use crate::loom_shim::{AtomicBool, AtomicU64, Ordering};

/// Low 48 bits of `top` hold the slot index (offset by one so index 0 is
/// representable); the high 16 bits hold the version.
const INDEX_MASK: u64 = 0x0000_ffff_ffff_ffff;
const VERSION_SHIFT: u32 = 48;

static_assertions::const_assert_eq!(VERSION_SHIFT, 48);
static_assertions::const_assert_eq!(INDEX_MASK, (1u64 << VERSION_SHIFT) - 1);

/// `top`'s index field, unbiased: `None` once unpacked.
const NIL: u64 = 0;

fn pack(index: Option<u32>, version: u16) -> u64 {
    let idx_field = index.map_or(0u64, |i| u64::from(i) + 1);
    debug_assert!(idx_field <= INDEX_MASK, "pool index overflowed the 48-bit field");
    ((version as u64) << VERSION_SHIFT) | (idx_field & INDEX_MASK)
}

fn unpack_index(top: u64) -> Option<u32> {
    let field = top & INDEX_MASK;
    if field == NIL {
        None
    } else {
        Some((field - 1) as u32)
    }
}

fn unpack_version(top: u64) -> u16 {
    (top >> VERSION_SHIFT) as u16
}

struct Slot<T> {
    data: UnsafeCell<MaybeUninit<T>>,
    /// Freelist link, valid only while the slot is free. Never touched
    /// concurrently by more than one thread: a thread only reads or writes
    /// a free slot's `next` after winning (or while attempting) the CAS
    /// that gives it ownership of that slot.
    next: UnsafeCell<Option<u32>>,
}

// SAFETY: access to `data` and `next` is externally synchronized by the
// pool's `top` CAS and `allocated` bitmap; see the invariants documented on
// each method below.
unsafe impl<T: Send> Sync for Slot<T> {}

/// A bounded slab of `capacity` fixed-address slots, recycled through a
/// versioned lock-free freelist.
pub struct MemoryPool<T> {
    slots: Box<[Slot<T>]>,
    allocated: Box<[AtomicBool]>,
    top: AtomicU64,
    capacity: usize,
}

// SAFETY: `MemoryPool` only ever exposes `T` through `&T`/`&mut T` borrows
// gated by the allocated bitmap and caller-held ownership of an index;
// concurrent access across threads is the whole point, so we require `T:
// Send` and forward `Sync`/`Send` to the pool itself.
unsafe impl<T: Send> Send for MemoryPool<T> {}
unsafe impl<T: Send> Sync for MemoryPool<T> {}

impl<T> MemoryPool<T> {
    /// Builds a pool of the given capacity with every slot pre-linked into
    /// the freelist, `top` pointing at slot 0.
    pub fn new(capacity: usize) -> Result<Self, LockFreeError> {
        let config = PoolConfig::new(capacity)?;
        Ok(Self::with_config(config))
    }

    /// Builds a pool from an already-validated [`PoolConfig`].
    pub fn with_config(config: PoolConfig) -> Self {
        let capacity = config.capacity;
        let slots: Box<[Slot<T>]> = (0..capacity)
            .map(|i| Slot {
                data: UnsafeCell::new(MaybeUninit::uninit()),
                next: UnsafeCell::new(if i + 1 < capacity { Some((i + 1) as u32) } else { None }),
            })
            .collect();
        let allocated: Box<[AtomicBool]> = (0..capacity).map(|_| AtomicBool::new(false)).collect();

        Self { slots, allocated, top: AtomicU64::new(pack(Some(0), 0)), capacity }
    }

    /// Fixed slot count this pool was constructed with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Takes the head of the freelist, writes `value` into it, and returns
    /// its index. Returns `None` (non-fatal) when the pool is
    /// exhausted; callers that cannot proceed without a node convert that
    /// into [`LockFreeError::PoolExhausted`].
    pub fn allocate(&self, value: T) -> Option<u32> {
        let index = loop {
            let top = self.top.load(Ordering::Acquire);
            let head = unpack_index(top)?;
            // SAFETY: `head` is the current freelist head; only the thread
            // that wins this CAS round gets to treat it as owned, and
            // nobody else can be mutating its `next` concurrently (the slot
            // is free, so no other thread holds it as data either).
            let next = unsafe { *self.slots[head as usize].next.get() };
            let new_top = pack(next, unpack_version(top).wrapping_add(1));
            if self
                .top
                .compare_exchange_weak(top, new_top, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break head;
            }
        };

        // SAFETY: we just won exclusive ownership of `index` off the
        // freelist; nothing else can write `data` until we `deallocate`.
        unsafe {
            (*self.slots[index as usize].data.get()).write(value);
        }
        self.allocated[index as usize].store(true, Ordering::Release);
        tracing::trace!(target: "nebula_lockfree::pool", index, "allocated slot");
        Some(index)
    }

    /// Returns `index` to the freelist and gives back the value that was in
    /// it. Silently rejects (`None`) an out-of-range index or one that is
    /// already free — an idempotent double-free protection.
    pub fn deallocate(&self, index: u32) -> Option<T> {
        let idx = index as usize;
        if idx >= self.capacity {
            tracing::debug!(target: "nebula_lockfree::pool", index, "deallocate of foreign index rejected");
            return None;
        }
        if self.allocated[idx]
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            tracing::debug!(target: "nebula_lockfree::pool", index, "double-free rejected");
            return None;
        }

        // SAFETY: the CAS above proved we are the sole thread transitioning
        // this slot from allocated to free; the caller is giving up their
        // only handle to it.
        let value = unsafe { (*self.slots[idx].data.get()).assume_init_read() };

        loop {
            let top = self.top.load(Ordering::Acquire);
            // SAFETY: the slot is ours (just taken out of `allocated`) until
            // the CAS below publishes it back onto the freelist.
            unsafe {
                *self.slots[idx].next.get() = unpack_index(top);
            }
            let new_top = pack(Some(index), unpack_version(top).wrapping_add(1));
            if self
                .top
                .compare_exchange_weak(top, new_top, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
        tracing::trace!(target: "nebula_lockfree::pool", index, "deallocated slot");
        Some(value)
    }

    /// Borrows the value currently held at `index`.
    ///
    /// # Safety
    /// `index` must currently be allocated (returned by `allocate` and not
    /// yet passed to `deallocate`), and the caller's epoch reservation must
    /// still be held so the slot cannot be concurrently reclaimed and
    /// reused out from under the borrow.
    pub unsafe fn get(&self, index: u32) -> &T {
        (*self.slots[index as usize].data.get()).assume_init_ref()
    }

    /// Mutably borrows the value currently held at `index`.
    ///
    /// # Safety
    /// Same contract as [`Self::get`], plus the caller must guarantee no
    /// other live borrow of this slot exists for the duration of the
    /// `&mut T`.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, index: u32) -> &mut T {
        (*self.slots[index as usize].data.get()).assume_init_mut()
    }
}

impl<T> Drop for MemoryPool<T> {
    fn drop(&mut self) {
        for (idx, flag) in self.allocated.iter().enumerate() {
            if *flag.get_mut() {
                // SAFETY: `allocated[idx]` is still true, so the last owner
                // never deallocated it; we are the sole owner now (`&mut
                // self`), so it is safe to drop the value in place.
                unsafe {
                    (*self.slots[idx].data.get()).assume_init_drop();
                }
            }
        }
    }
}
