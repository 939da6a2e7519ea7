//! Sorted singly-linked set/map with epoch-reclaimed logical+physical
//! delete.
//!
//! [`LinkedList`] is the shared engine: a singly-linked chain of
//! [`ListNode`]s with Harris/Michael-style two-phase deletion (a node is
//! first logically marked, then physically unlinked, either by the remover
//! or by a later traverser that helps) and a `changing` flag that
//! serialises in-place value updates. [`LinkedSet`] is a thin `V = ()`
//! specialisation of it for the standalone value-set interface;
//! [`crate::hash_map::LockFreeHashMap`] uses `LinkedList<K, V>` directly as
//! its bucket type, making the hash map a thin striping layer over the
//! linked set.
//!
//! Every public operation follows the same four-step wrapper: drain the
//! retire stack, acquire an epoch reservation, do the work, release.

use core::cell::UnsafeCell;

use crate::epoch::{EpochGuard, EpochManager};
use crate::error::LockFreeError;
use crate::loom_shim::{Arc, AtomicBool, AtomicU32, Ordering};
use crate::pool::MemoryPool;
use crate::stack::Stack;

const TAG_MASK: u32 = 0b11;
/// Bit 0: this node is tombstoned, future searchers must ignore it.
const MARK_DELETED: u32 = 0b01;
/// Bit 1: an unlinker is mid-way and owns the right to mutate `prev.next`.
const MARK_UNLINKING: u32 = 0b10;

fn decode(raw: u32) -> (Option<u32>, u32) {
    let tag = raw & TAG_MASK;
    let field = raw >> 2;
    (if field == 0 { None } else { Some(field - 1) }, tag)
}

fn encode(next: Option<u32>, tag: u32) -> u32 {
    let field = next.map_or(0, |i| i + 1);
    (field << 2) | (tag & TAG_MASK)
}

/// A (node pointer, epoch) pair pushed onto a list's retire stack the
/// moment a node is physically unlinked.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetiredNode {
    index: u32,
    epoch: u64,
}

/// One slab entry: a key/value pair, a `next` link whose low two bits carry
/// this node's own deletion tags, and a `changing` flag that guards
/// in-place value mutation.
///
/// Fields are private; the type is public only because it appears in the
/// signature of [`LinkedSet::new`], and [`crate::hash_map::LockFreeHashMap`]
/// shares the same pool type with callers who build their own shared
/// resources.
pub struct ListNode<K, V> {
    key: K,
    value: UnsafeCell<V>,
    changing: AtomicBool,
    next: AtomicU32,
}

impl<K, V> ListNode<K, V> {
    fn into_value(self) -> V {
        self.value.into_inner()
    }
}

/// Shared engine behind [`LinkedSet`] and the hash map's buckets.
pub(crate) struct LinkedList<K, V> {
    head: AtomicU32,
    pool: Arc<MemoryPool<ListNode<K, V>>>,
    retire_stack: Arc<Stack<RetiredNode>>,
    epoch: Arc<EpochManager>,
}

impl<K, V> LinkedList<K, V> {
    pub(crate) fn new(
        pool: Arc<MemoryPool<ListNode<K, V>>>,
        retire_stack: Arc<Stack<RetiredNode>>,
        epoch: Arc<EpochManager>,
    ) -> Self {
        Self { head: AtomicU32::new(encode(None, 0)), pool, retire_stack, epoch }
    }

    fn prev_ref(&self, prev_idx: Option<u32>) -> &AtomicU32 {
        match prev_idx {
            None => &self.head,
            // SAFETY: `prev_idx` only ever names a node this call's own
            // traversal just confirmed live, and the epoch reservation
            // held for the whole operation keeps it allocated until then.
            Some(i) => unsafe { &self.pool.get(i).next },
        }
    }

    /// Drains reclaimable entries off the retire stack, per the four-step
    /// wrapper's first step. Stops at the first non-reclaimable entry and
    /// pushes it back so retirement order is preserved.
    fn drain_retired(&self) {
        let min = self.epoch.min_epoch();
        while let Some(retired) = self.retire_stack.pop() {
            if retired.epoch < min {
                self.pool.deallocate(retired.index);
            } else {
                self.retire_stack.push(retired);
                break;
            }
        }
    }

    /// Attempts the physical unlink of a node already observed logically
    /// deleted. Returns whether this call performed the unlink; `false`
    /// covers both "not marked yet" and "another thread is already
    /// unlinking it".
    fn help_unlink(&self, prev_idx: Option<u32>, node_idx: u32) -> bool {
        // SAFETY: held epoch reservation keeps `node_idx` allocated.
        let node = unsafe { self.pool.get(node_idx) };
        let current = node.next.load(Ordering::Acquire);
        let (next_idx, tag) = decode(current);
        if tag & MARK_DELETED == 0 || tag & MARK_UNLINKING != 0 {
            return false;
        }

        let reserved = encode(next_idx, tag | MARK_UNLINKING);
        if node.next.compare_exchange(current, reserved, Ordering::AcqRel, Ordering::Acquire).is_err()
        {
            return false;
        }

        let prev_atomic = self.prev_ref(prev_idx);
        let expected = encode(Some(node_idx), 0);
        let skip_node = encode(next_idx, 0);
        if prev_atomic.compare_exchange(expected, skip_node, Ordering::AcqRel, Ordering::Acquire).is_ok()
        {
            let epoch = self.epoch.next_epoch();
            self.retire_stack.push(RetiredNode { index: node_idx, epoch });
            tracing::trace!(target: "nebula_lockfree::linked_set", node_idx, epoch, "retired node");
            true
        } else {
            // Undo the reservation; no one else can touch these bits while
            // we hold MARK_UNLINKING, so a plain store is enough.
            node.next.store(current, Ordering::Release);
            false
        }
    }

    /// Walks the chain looking for `key`, helping unlink any tombstoned
    /// node it passes. Returns `(last live predecessor, matching node)`.
    fn find(&self, key: &K) -> (Option<u32>, Option<u32>)
    where
        K: PartialEq,
    {
        let mut prev_idx: Option<u32> = None;
        loop {
            let (cur_idx, _) = decode(self.prev_ref(prev_idx).load(Ordering::Acquire));
            let Some(cur_idx) = cur_idx else {
                return (prev_idx, None);
            };
            // SAFETY: held epoch reservation keeps `cur_idx` allocated.
            let cur_node = unsafe { self.pool.get(cur_idx) };
            let (_, cur_tag) = decode(cur_node.next.load(Ordering::Acquire));
            if cur_tag & MARK_DELETED != 0 {
                self.help_unlink(prev_idx, cur_idx);
                continue;
            }
            if cur_node.key == *key {
                return (prev_idx, Some(cur_idx));
            }
            prev_idx = Some(cur_idx);
        }
    }

    fn read_value(&self, node: &ListNode<K, V>) -> V
    where
        V: Clone,
    {
        while node
            .changing
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        // SAFETY: we hold `changing` exclusively.
        let value = unsafe { (*node.value.get()).clone() };
        node.changing.store(false, Ordering::Release);
        value
    }

    fn write_value(&self, node: &ListNode<K, V>, value: V) {
        while node
            .changing
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        // SAFETY: we hold `changing` exclusively.
        unsafe {
            *node.value.get() = value;
        }
        node.changing.store(false, Ordering::Release);
    }

    /// Update-or-insert: if a live node with this key exists, its value is
    /// replaced under `changing`; otherwise a new node is linked at the
    /// tail. The node built for a possible insert is discarded (never
    /// linked) the moment an existing key is found, so a racing pair of
    /// inserts for the same key can never leave two live nodes for it.
    ///
    /// Aborts the process if the reservation table or the backing pool is
    /// exhausted — this call cannot make progress without either.
    pub(crate) fn insert(&self, key: K, value: V)
    where
        K: PartialEq,
    {
        self.drain_retired();
        let _guard = EpochGuard::acquire(&self.epoch).unwrap_or_else(|e| e.abort());

        let capacity = self.pool.capacity();
        let new_idx = self
            .pool
            .allocate(ListNode {
                key,
                value: UnsafeCell::new(value),
                changing: AtomicBool::new(false),
                next: AtomicU32::new(encode(None, 0)),
            })
            .unwrap_or_else(|| LockFreeError::PoolExhausted { capacity }.abort());

        loop {
            // SAFETY: `new_idx` was just allocated by us and is not yet
            // visible to any other thread.
            let key_ref = unsafe { &self.pool.get(new_idx).key };
            let (prev_idx, found_idx) = self.find(key_ref);

            if let Some(found) = found_idx {
                // SAFETY: held epoch reservation keeps `found` allocated.
                let existing = unsafe { self.pool.get(found) };
                let built = self.pool.deallocate(new_idx).expect("new_idx was just allocated");
                self.write_value(existing, built.into_value());
                return;
            }

            let tail = self.prev_ref(prev_idx);
            let expected = encode(None, 0);
            let desired = encode(Some(new_idx), 0);
            if tail.compare_exchange(expected, desired, Ordering::AcqRel, Ordering::Acquire).is_ok()
            {
                tracing::trace!(target: "nebula_lockfree::linked_set", new_idx, "inserted node");
                return;
            }
            // Lost the race for the tail slot; retraverse and retry.
        }
    }

    /// Returns a clone of the live value for `key`, if any.
    pub(crate) fn search(&self, key: &K) -> Option<V>
    where
        K: PartialEq,
        V: Clone,
    {
        self.drain_retired();
        let _guard = EpochGuard::acquire(&self.epoch).unwrap_or_else(|e| e.abort());
        let (_, found) = self.find(key);
        // SAFETY: held epoch reservation keeps `found` allocated.
        found.map(|idx| self.read_value(unsafe { self.pool.get(idx) }))
    }

    /// Logically deletes the live node for `key`, then immediately attempts
    /// to help physically unlink it. Returns whether this call is the one
    /// that performed the logical delete (an idempotent no-op on a key that
    /// is already absent or already marked by a racing remover).
    pub(crate) fn remove(&self, key: &K) -> bool
    where
        K: PartialEq,
    {
        self.drain_retired();
        let _guard = EpochGuard::acquire(&self.epoch).unwrap_or_else(|e| e.abort());

        let (prev_idx, found_idx) = self.find(key);
        let Some(node_idx) = found_idx else {
            return false;
        };
        // SAFETY: held epoch reservation keeps `node_idx` allocated.
        let node = unsafe { self.pool.get(node_idx) };

        let marked_by_us = loop {
            let current = node.next.load(Ordering::Acquire);
            let (next_idx, tag) = decode(current);
            if tag & MARK_DELETED != 0 {
                break false;
            }
            let marked = encode(next_idx, tag | MARK_DELETED);
            if node.next.compare_exchange(current, marked, Ordering::AcqRel, Ordering::Acquire).is_ok()
            {
                break true;
            }
        };

        self.help_unlink(prev_idx, node_idx);
        tracing::trace!(target: "nebula_lockfree::linked_set", node_idx, marked_by_us, "remove");
        marked_by_us
    }
}

impl<K, V> Drop for LinkedList<K, V> {
    fn drop(&mut self) {
        // No concurrent operation can exist once we have `&mut self`: free
        // everything still parked in the retire queue regardless of epoch.
        while let Some(retired) = self.retire_stack.pop() {
            self.pool.deallocate(retired.index);
        }
        let mut raw = self.head.load(Ordering::Acquire);
        loop {
            let (idx, _) = decode(raw);
            let Some(idx) = idx else { break };
            // SAFETY: single-threaded teardown.
            raw = unsafe { self.pool.get(idx).next.load(Ordering::Acquire) };
            self.pool.deallocate(idx);
        }
    }
}

/// Standalone membership set: `value present <=> exists unmarked node n
/// with n.data == value`. A `V = ()` specialisation of [`LinkedList`].
pub struct LinkedSet<T> {
    inner: LinkedList<T, ()>,
}

impl<T: PartialEq> LinkedSet<T> {
    /// Builds a set sharing caller-provided resources, used when a set is
    /// one bucket among several sharing a pool/retire-stack/epoch-manager
    /// triple (as in the hash map).
    pub fn new(
        pool: Arc<MemoryPool<ListNode<T, ()>>>,
        retire_stack: Arc<Stack<RetiredNode>>,
        epoch: Arc<EpochManager>,
    ) -> Self {
        Self { inner: LinkedList::new(pool, retire_stack, epoch) }
    }

    /// Convenience constructor that builds its own pool, retire stack, and
    /// epoch manager sized for standalone use. The retire stack never holds
    /// more entries than the pool has slots, so it is sized identically.
    pub fn with_capacity(capacity: usize) -> Result<Self, LockFreeError> {
        let pool = Arc::new(MemoryPool::new(capacity)?);
        let retire_stack = Arc::new(Stack::new(capacity)?);
        let epoch = Arc::new(EpochManager::new());
        Ok(Self::new(pool, retire_stack, epoch))
    }

    /// Inserts `value` if absent. A second insert of an equal value is a
    /// no-op: at most one live node ever exists per value.
    pub fn insert(&self, value: T) {
        self.inner.insert(value, ())
    }

    /// Whether a live node equal to `value` exists.
    pub fn search(&self, value: &T) -> bool {
        self.inner.search(value).is_some()
    }

    /// Removes `value` if present. A second `remove` of the same value is
    /// a no-op.
    pub fn remove(&self, value: &T) -> bool {
        self.inner.remove(value)
    }
}
