//! Bounded MPMC ring buffer.
//!
//! Each slot carries its own sequence number rather than relying on a
//! single shared "buffer is full" flag, so producers and consumers only
//! contend on the slot they are actually touching. No epoch manager
//! is involved: slots are reused in place, never freed, so there is nothing
//! to reclaim.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;

use crate::config::RingBufferConfig;
use crate::error::LockFreeError;
use crate::loom_shim::{AtomicU32, Ordering};

struct Slot<T> {
    data: UnsafeCell<MaybeUninit<T>>,
    seq: AtomicU32,
}

// SAFETY: `data` is only ever written by the producer that won the slot's
// sequence-number handshake and only ever read by the consumer that later
// wins the matching handshake; see `enqueue`/`dequeue`.
unsafe impl<T: Send> Sync for Slot<T> {}

/// A bounded, lock-free multi-producer multi-consumer FIFO of a
/// power-of-two capacity.
pub struct RingBuffer<T> {
    slots: Box<[Slot<T>]>,
    mask: u32,
    enqueue_pos: AtomicU32,
    dequeue_pos: AtomicU32,
}

// SAFETY: see the note on `Slot`; ownership of a given element transfers
// cleanly from producer to consumer via the sequence-number protocol.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Builds a buffer of the given power-of-two capacity.
    pub fn new(capacity: u32) -> Result<Self, LockFreeError> {
        Ok(Self::with_config(RingBufferConfig::new(capacity)?))
    }

    /// Builds a buffer from an already-validated [`RingBufferConfig`].
    pub fn with_config(config: RingBufferConfig) -> Self {
        let capacity = config.capacity;
        let slots: Box<[Slot<T>]> = (0..capacity)
            .map(|i| Slot { data: UnsafeCell::new(MaybeUninit::uninit()), seq: AtomicU32::new(i) })
            .collect();
        Self {
            slots,
            mask: capacity - 1,
            enqueue_pos: AtomicU32::new(0),
            dequeue_pos: AtomicU32::new(0),
        }
    }

    /// Slot count. Always a power of two.
    pub fn capacity(&self) -> u32 {
        self.mask + 1
    }

    /// Attempts to enqueue `value`. Returns `false` (non-fatal) if the
    /// buffer is full.
    pub fn enqueue(&self, value: T) -> bool {
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[(pos & self.mask) as usize];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos) as i32;
            if diff == 0 {
                if self
                    .enqueue_pos
                    .compare_exchange_weak(pos, pos.wrapping_add(1), Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    // SAFETY: `seq == pos` proves this slot is empty and we
                    // just won the exclusive right to fill it.
                    unsafe {
                        (*slot.data.get()).write(value);
                    }
                    slot.seq.store(pos.wrapping_add(1), Ordering::Release);
                    tracing::trace!(target: "nebula_lockfree::ring", pos, "enqueued");
                    return true;
                }
            } else if diff < 0 {
                tracing::debug!(target: "nebula_lockfree::ring", pos, "enqueue rejected, buffer full");
                return false;
            } else {
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// Attempts to dequeue the oldest enqueued value. Returns `None`
    /// (non-fatal) if the buffer is empty.
    pub fn dequeue(&self) -> Option<T> {
        let mut pos = self.dequeue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[(pos & self.mask) as usize];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos.wrapping_add(1)) as i32;
            if diff == 0 {
                if self
                    .dequeue_pos
                    .compare_exchange_weak(pos, pos.wrapping_add(1), Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    // SAFETY: `seq == pos + 1` proves this slot is full and
                    // we just won the exclusive right to drain it.
                    let value = unsafe { (*slot.data.get()).assume_init_read() };
                    slot.seq.store(pos.wrapping_add(self.capacity()).wrapping_add(1), Ordering::Release);
                    tracing::trace!(target: "nebula_lockfree::ring", pos, "dequeued");
                    return Some(value);
                }
            } else if diff < 0 {
                tracing::debug!(target: "nebula_lockfree::ring", pos, "dequeue rejected, buffer empty");
                return None;
            } else {
                pos = self.dequeue_pos.load(Ordering::Relaxed);
            }
        }
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        // Drain whatever is still queued so `T`'s destructor runs exactly
        // once per live element.
        while self.dequeue().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_must_be_a_power_of_two() {
        assert!(RingBuffer::<u32>::new(3).is_err());
        assert!(RingBuffer::<u32>::new(4).is_ok());
    }

    #[test]
    fn fills_drains_and_wraps() {
        let ring: RingBuffer<u32> = RingBuffer::new(4).unwrap();
        assert!(ring.enqueue(1));
        assert!(ring.enqueue(2));
        assert!(ring.enqueue(3));
        assert!(ring.enqueue(4));
        assert!(!ring.enqueue(5));

        assert_eq!(ring.dequeue(), Some(1));
        assert!(ring.enqueue(5));

        assert_eq!(ring.dequeue(), Some(2));
        assert_eq!(ring.dequeue(), Some(3));
        assert_eq!(ring.dequeue(), Some(4));
        assert_eq!(ring.dequeue(), Some(5));
        assert_eq!(ring.dequeue(), None);
    }

    #[test]
    fn drop_runs_destructors_for_queued_elements() {
        use std::sync::Arc;
        let ring: RingBuffer<Arc<()>> = RingBuffer::new(4).unwrap();
        let sentinel = Arc::new(());
        ring.enqueue(sentinel.clone());
        ring.enqueue(sentinel.clone());
        assert_eq!(Arc::strong_count(&sentinel), 3);
        drop(ring);
        assert_eq!(Arc::strong_count(&sentinel), 1);
    }
}
