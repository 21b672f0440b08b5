//! # segpool
//!
//! Fixed-capacity, lock-free memory pool with segregated free lists.
//!
//! Many threads allocate and free small, bounded-size blocks from one
//! pre-allocated arena without calling the global allocator and without
//! blocking locks:
//! - One lock-free free list per size class
//! - Requests round up to the smallest class that fits
//! - An empty class is refilled by splitting one chunk of a larger class
//! - Freed chunks go back to their class list; chunks are never merged
//!
//! ## Quick Start
//!
//! ```rust
//! use segpool::prelude::*;
//!
//! fn main() -> MemoryResult<()> {
//!     let classes = SizeClasses::new(vec![64, 256, 1024])?;
//!     let pool = SegregatedPool::new(PoolConfig::new(classes, 4096))?;
//!
//!     let ptr = pool.allocate(48)?;
//!     // SAFETY: `ptr` came from this pool and is returned exactly once.
//!     unsafe { pool.deallocate(ptr, 48)? };
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured events through `tracing`
//!
//! ## Architecture
//!
//! - [`arena`]: the backing buffer, addressed by chunk offsets
//! - [`free_list`]: the per-class head word and its push/lock/unlock protocol
//! - [`pool`]: allocate, split and deallocate on top of the lists
//! - [`traits`]: a `Layout`-based adapter over the pool

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod arena;
pub mod config;
pub mod error;
pub mod free_list;
pub mod pool;
pub mod size_class;
pub mod stats;
pub(crate) mod sync;
pub mod traits;
pub mod utils;

#[cfg(all(test, loom))]
mod loom_tests;

pub use crate::arena::{Arena, ChunkOffset};
pub use crate::config::{ErrorPolicy, PoolConfig};
pub use crate::error::{MemoryError, MemoryResult, Result};
pub use crate::free_list::{HeadState, LINK_SIZE};
pub use crate::pool::SegregatedPool;
pub use crate::size_class::{SizeClass, SizeClasses};
pub use crate::stats::PoolStats;
pub use crate::traits::Allocator;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::config::{ErrorPolicy, PoolConfig};
    pub use crate::error::{MemoryError, MemoryResult};
    pub use crate::free_list::HeadState;
    pub use crate::pool::SegregatedPool;
    pub use crate::size_class::{SizeClass, SizeClasses};
    pub use crate::stats::PoolStats;
    pub use crate::traits::Allocator;
}
