//! Error types for `nebula-lockfree`.
//!
//! The three failure kinds a caller can observe mirror the ones `MemoryError`
//! distinguishes in `nebula-memory`: a constructor-time misconfiguration, a
//! fatal capacity exhaustion that the crate cannot recover from internally,
//! and benign non-fatal rejections that the data structures already surface
//! through their own return types (`Option`, `bool`) rather than `Result`.
//! This enum exists for the first two; see the module docs on `pool`,
//! `ring`, and `epoch` for where `None` / `false` are the right signal
//! instead.

use thiserror::Error;

/// Errors raised by `nebula-lockfree` constructors and by call sites that
/// cannot proceed without a resource the core refused to hand out.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockFreeError {
    /// A constructor argument failed validation before any atomic state was
    /// touched (ring buffer capacity not a power of two, a zero capacity).
    #[error("invalid capacity for {what}: {reason}")]
    InvalidCapacity {
        /// Name of the component being constructed.
        what: &'static str,
        /// Human-readable explanation of what was wrong with the value.
        reason: &'static str,
    },

    /// The epoch manager's reservation table has no free slot. Per the
    /// design this is a fixed-size, fail-fast condition: the caller
    /// over-subscribed `MAX_THREADS` concurrent operations.
    #[error("epoch reservation table exhausted (MAX_THREADS = {max_threads})")]
    ReservationTableFull {
        /// The compile-time reservation table width that was exceeded.
        max_threads: usize,
    },

    /// A call site needed a node from the pool to make progress (a stack
    /// push, a list insert) and the pool had none to give.
    #[error("memory pool of capacity {capacity} exhausted")]
    PoolExhausted {
        /// The pool's fixed capacity.
        capacity: usize,
    },
}

/// Convenience alias used throughout the crate.
pub type LockFreeResult<T> = Result<T, LockFreeError>;

impl LockFreeError {
    /// Logs at `error!` and aborts the process. This is the contract for
    /// the two fatal-capacity kinds: a full reservation table, or a
    /// pool exhausted during an operation that cannot proceed without a
    /// node (a list insert, a stack push). The system is mis-sized; the
    /// call sites that hit this (`LinkedSet`, `HashMap`, `Stack::push`)
    /// abort rather than degrade silently.
    pub(crate) fn abort(self) -> ! {
        tracing::error!(error = %self, "fatal capacity error, aborting");
        panic!("{self}");
    }
}
