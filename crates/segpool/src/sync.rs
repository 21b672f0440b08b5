//! Synchronization primitive shim.
//!
//! Under `cfg(loom)` the atomics, fences and spin hints come from `loom`, so
//! the model checker can explore every interleaving of the free-list
//! protocol. Otherwise they come from `std`.
//!
//! Every file in the crate imports atomics through this module. A direct
//! `use std::sync::atomic::*` bypasses loom's scheduler and silently weakens
//! the model tests.

pub(crate) mod atomic {
    #[cfg(loom)]
    pub(crate) use loom::sync::atomic::{AtomicU64, AtomicUsize, Ordering, fence};

    #[cfg(not(loom))]
    pub(crate) use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering, fence};
}

pub(crate) mod hint {
    #[cfg(loom)]
    pub(crate) use loom::hint::spin_loop;

    #[cfg(not(loom))]
    pub(crate) use std::hint::spin_loop;
}

/// Model-test threads and shared ownership
#[cfg(all(test, loom))]
pub(crate) use loom::{sync::Arc, thread};
