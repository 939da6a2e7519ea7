//! Swaps the atomics this crate touches for loom's model-checked
//! equivalents when built with `--cfg loom` (activated by the `loom`
//! feature). Every other module reaches atomics, `Arc`, and thread spawn
//! through here instead of `core::sync` / `std::sync` directly.

cfg_if::cfg_if! {
    if #[cfg(loom)] {
        pub(crate) use loom::sync::atomic::{AtomicU64, AtomicU32, AtomicBool, Ordering};
        pub(crate) use loom::sync::Arc;
        pub(crate) use loom::thread;
    } else {
        pub(crate) use core::sync::atomic::{AtomicU64, AtomicU32, AtomicBool, Ordering};
        pub(crate) use std::sync::Arc;
        pub(crate) use std::thread;
    }
}
