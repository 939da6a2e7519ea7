//! Treiber stack.
//!
//! Backed by a dedicated [`MemoryPool`] of stack nodes and closes the ABA
//! hazard on its own `top` the same way the pool closes it on its
//! freelist: a 48-bit index packed with a 16-bit version in one `u64` CAS
//! word. LIFO only — this is used exclusively as the retire queue for
//! [`crate::linked_set::LinkedSet`], where ordering among retired nodes
//! does not matter.

use crate::config::PoolConfig;
use crate::error::LockFreeError;
use crate::loom_shim::{AtomicU64, Ordering};
use crate::pool::MemoryPool;

const INDEX_MASK: u64 = 0x0000_ffff_ffff_ffff;
const VERSION_SHIFT: u32 = 48;

static_assertions::const_assert_eq!(VERSION_SHIFT, 48);
static_assertions::const_assert_eq!(INDEX_MASK, (1u64 << VERSION_SHIFT) - 1);

fn pack(index: Option<u32>, version: u16) -> u64 {
    let idx_field = index.map_or(0u64, |i| u64::from(i) + 1);
    ((version as u64) << VERSION_SHIFT) | (idx_field & INDEX_MASK)
}

fn unpack_index(top: u64) -> Option<u32> {
    let field = top & INDEX_MASK;
    if field == 0 {
        None
    } else {
        Some((field - 1) as u32)
    }
}

fn unpack_version(top: u64) -> u16 {
    (top >> VERSION_SHIFT) as u16
}

struct StackNode<T> {
    value: T,
    next: Option<u32>,
}

/// A bounded, lock-free LIFO stack.
pub struct Stack<T> {
    top: AtomicU64,
    pool: MemoryPool<StackNode<T>>,
}

impl<T> Stack<T> {
    /// Builds a stack whose backing pool has room for `capacity` nodes.
    pub fn new(capacity: usize) -> Result<Self, LockFreeError> {
        Ok(Self::with_config(PoolConfig::new(capacity)?))
    }

    /// Builds a stack from an already-validated [`PoolConfig`].
    pub fn with_config(config: PoolConfig) -> Self {
        Self { top: AtomicU64::new(pack(None, 0)), pool: MemoryPool::with_config(config) }
    }

    /// Backing pool capacity.
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Pushes `value`. A stack push that cannot allocate a node is one of
    /// fatal capacity error — the backing pool is mis-sized — so
    /// exhaustion aborts the process rather than returning a value the
    /// caller could silently ignore.
    pub fn push(&self, value: T) {
        let capacity = self.pool.capacity();
        let index = self
            .pool
            .allocate(StackNode { value, next: None })
            .unwrap_or_else(|| LockFreeError::PoolExhausted { capacity }.abort());

        loop {
            let top = self.top.load(Ordering::Acquire);
            // SAFETY: we exclusively own `index`, nobody else observes it
            // until the CAS below links it into the stack.
            unsafe {
                self.pool.get_mut(index).next = unpack_index(top);
            }
            let new_top = pack(Some(index), unpack_version(top).wrapping_add(1));
            if self
                .top
                .compare_exchange_weak(top, new_top, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                tracing::trace!(target: "nebula_lockfree::stack", "pushed");
                return;
            }
        }
    }

    /// Pops the most recently pushed value, or `None` if empty.
    pub fn pop(&self) -> Option<T> {
        let index = loop {
            let top = self.top.load(Ordering::Acquire);
            let head = unpack_index(top)?;
            // SAFETY: `head` is the current stack top; winning the CAS
            // below is what gives us the right to treat it as owned.
            let next = unsafe { self.pool.get(head).next };
            let new_top = pack(next, unpack_version(top).wrapping_add(1));
            if self
                .top
                .compare_exchange_weak(top, new_top, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break head;
            }
        };

        let node = self.pool.deallocate(index).expect("popped index was allocated");
        tracing::trace!(target: "nebula_lockfree::stack", "popped");
        Some(node.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let stack: Stack<u32> = Stack::new(4).unwrap();
        stack.push(1);
        stack.push(2);
        stack.push(3);
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    #[should_panic(expected = "memory pool of capacity 1 exhausted")]
    fn push_aborts_once_pool_is_exhausted() {
        let stack: Stack<u32> = Stack::new(1).unwrap();
        stack.push(1);
        stack.push(2);
    }

    #[test]
    fn interleaved_push_pop() {
        let stack: Stack<u32> = Stack::new(2).unwrap();
        stack.push(1);
        assert_eq!(stack.pop(), Some(1));
        stack.push(2);
        stack.push(3);
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
    }
}

#[cfg(all(test, loom))]
mod loom_tests {
    use super::*;
    use crate::loom_shim::{thread, Arc};

    #[test]
    fn concurrent_push_pop_preserves_node_count() {
        loom::model(|| {
            let stack = Arc::new(Stack::<u32>::new(4).unwrap());
            let producer = {
                let stack = stack.clone();
                thread::spawn(move || {
                    stack.push(1);
                    stack.push(2);
                })
            };
            let consumer = {
                let stack = stack.clone();
                thread::spawn(move || {
                    let mut popped = 0;
                    while popped < 1 {
                        if stack.pop().is_some() {
                            popped += 1;
                        }
                    }
                })
            };
            producer.join().unwrap();
            consumer.join().unwrap();
            while stack.pop().is_some() {}
        });
    }
}
