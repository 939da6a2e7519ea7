//! # Nebula Lock-Free
//!
//! Epoch-reclaimed lock-free data structures: a versioned-freelist memory
//! pool, a Treiber stack, an MPMC ring buffer, a logically/physically
//! deleting linked set, and a striped hash map built on top of it.
//!
//! All reclamation goes through one [`epoch::EpochManager`] per data
//! structure that needs it; see that module for the scheme. Capacity is
//! fixed at construction everywhere in this crate — none of these grow.

pub mod config;
pub mod epoch;
pub mod error;
pub mod hash_map;
pub mod linked_set;
pub mod pool;
pub mod ring;
pub mod stack;

pub(crate) mod loom_shim;

pub use config::{HashMapConfig, PoolConfig, RingBufferConfig};
pub use epoch::EpochManager;
pub use error::{LockFreeError, LockFreeResult};
pub use hash_map::LockFreeHashMap;
pub use linked_set::LinkedSet;
pub use pool::MemoryPool;
pub use ring::RingBuffer;
pub use stack::Stack;
