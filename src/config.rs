//! Construction-time configuration for each primitive.
//!
//! These are plain validated data, not a file/env layer: per the crate's
//! non-goal on configuration-as-an-external-IO-feature, there is no
//! deserialization here. They exist for the same reason
//! `nebula_memory::pool::PoolConfig` does — bundling the handful of knobs a
//! constructor accepts into one named, documented place instead of a long
//! positional argument list.

use crate::error::LockFreeError;

/// Configuration for a [`MemoryPool`](crate::pool::MemoryPool).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Fixed number of slots pre-allocated by the pool. Capacity never
    /// changes after construction (no dynamic resizing, per the crate's
    /// non-goals).
    pub capacity: usize,
}

impl PoolConfig {
    /// Validates `capacity`. A pool of capacity zero can never hand out a
    /// slot, which is never useful, so it is rejected rather than silently
    /// accepted.
    pub fn new(capacity: usize) -> Result<Self, LockFreeError> {
        if capacity == 0 {
            return Err(LockFreeError::InvalidCapacity {
                what: "MemoryPool",
                reason: "capacity must be non-zero",
            });
        }
        Ok(Self { capacity })
    }
}

/// Configuration for a [`RingBuffer`](crate::ring::RingBuffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingBufferConfig {
    /// Number of slots. Must be a power of two so index masking
    /// (`pos & (capacity - 1)`) replaces a modulo.
    pub capacity: u32,
}

impl RingBufferConfig {
    /// Validates that `capacity` is a non-zero power of two.
    pub fn new(capacity: u32) -> Result<Self, LockFreeError> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(LockFreeError::InvalidCapacity {
                what: "RingBuffer",
                reason: "capacity must be a non-zero power of two",
            });
        }
        Ok(Self { capacity })
    }
}

/// Configuration for a [`LockFreeHashMap`](crate::hash_map::LockFreeHashMap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashMapConfig {
    /// Number of buckets (fixed array of linked sets). Never resized.
    pub buckets: usize,
    /// Backing pool capacity as a multiple of `buckets`. The design ratio
    /// default is 3, which comfortably covers the common case of a few
    /// live entries per bucket plus a handful of in-flight retired nodes.
    pub pool_capacity_factor: usize,
}

impl HashMapConfig {
    /// Builds a config using the design's default pool-capacity ratio (3x
    /// the bucket count).
    pub fn new(buckets: usize) -> Result<Self, LockFreeError> {
        Self::with_factor(buckets, 3)
    }

    /// Builds a config with an explicit pool-capacity multiplier, for
    /// callers who expect heavier per-bucket occupancy than the default
    /// ratio assumes.
    pub fn with_factor(buckets: usize, pool_capacity_factor: usize) -> Result<Self, LockFreeError> {
        if buckets == 0 {
            return Err(LockFreeError::InvalidCapacity {
                what: "HashMap",
                reason: "bucket count must be non-zero",
            });
        }
        if pool_capacity_factor == 0 {
            return Err(LockFreeError::InvalidCapacity {
                what: "HashMap",
                reason: "pool_capacity_factor must be non-zero",
            });
        }
        Ok(Self { buckets, pool_capacity_factor })
    }

    /// Total pool capacity implied by `buckets * pool_capacity_factor`.
    pub fn pool_capacity(&self) -> usize {
        self.buckets * self.pool_capacity_factor
    }
}
