//! Segregated free-list pool
//!
//! # Safety
//!
//! The pool hands out raw chunks of one shared arena to any number of
//! threads:
//! - One lock-free [`FreeList`] per size class, all carving from the same
//!   [`Arena`]
//! - Chunk ownership moves between the lists and callers only through the
//!   head-word CAS protocol (see [`crate::free_list`])
//! - Free chunks embed their successor offset in their first word
//!
//! ## Invariants
//!
//! - A chunk is either on exactly one free list or owned by one caller
//! - Chunks never migrate to a larger class; a split is permanent
//! - Every chunk start is aligned to [`SegregatedPool::chunk_align`]
//! - The arena outlives every chunk handed out (callers must not use chunks
//!   after the pool is dropped)

use core::ptr::NonNull;

#[cfg(feature = "logging")]
use tracing::{error, info, trace};

use crate::arena::{Arena, ChunkOffset};
use crate::config::{ErrorPolicy, PoolConfig};
use crate::error::{MemoryError, MemoryResult};
use crate::free_list::{FreeList, HeadState, PopOutcome};
use crate::size_class::{SizeClass, SizeClasses};
use crate::stats::{PoolStats, StatsCounters};
use crate::sync::hint;
use crate::utils::{Backoff, is_aligned, power_of_two_factor};

/// Lock-free segregated free-list pool
///
/// Serves requests up to the largest size class from a fixed arena. The
/// arena is initially cut into largest-class chunks; a request for a smaller
/// class splits one larger chunk into pieces of that class and keeps the
/// spare pieces on the smaller list for later requests.
///
/// # Memory Layout
/// ```text
/// arena:  [    1024    ][    1024    ][    1024    ][    1024    ]
/// after allocate(64):
///         [64][64]..[64][    1024    ][    1024    ][    1024    ]
///          ^    \_ 15 chunks on the 64-byte list
///          returned
/// ```
#[derive(Debug)]
pub struct SegregatedPool {
    arena: Arena,
    classes: SizeClasses,
    lists: Box<[FreeList]>,
    chunk_align: usize,
    config: PoolConfig,
    stats: StatsCounters,
}

impl SegregatedPool {
    /// Create a pool from a validated configuration
    ///
    /// # Errors
    /// - `InvalidConfig` if the configuration fails [`PoolConfig::validate`]
    /// - `AllocationFailed` if the arena cannot be obtained
    pub fn new(config: PoolConfig) -> MemoryResult<Self> {
        config.validate()?;

        let classes = config.size_classes.clone();
        let chunk_count = config.chunk_count();
        let arena = Arena::new(config.usable_arena_size(), config.arena_align)?;
        let lists = (0..classes.len()).map(|_| FreeList::new()).collect();

        let chunk_align = classes
            .as_slice()
            .iter()
            .map(|&size| power_of_two_factor(size))
            .min()
            .unwrap_or(arena.align())
            .min(arena.align());

        let pool = Self {
            arena,
            classes,
            lists,
            chunk_align,
            config,
            stats: StatsCounters::new(),
        };
        pool.partition(chunk_count);

        #[cfg(feature = "logging")]
        info!(
            capacity = pool.capacity(),
            chunks = chunk_count,
            classes = ?pool.classes.as_slice(),
            chunk_align = pool.chunk_align,
            "Segregated pool initialized"
        );

        Ok(pool)
    }

    /// Pool with the default configuration
    pub fn with_defaults() -> MemoryResult<Self> {
        Self::new(PoolConfig::default())
    }

    /// Pool with explicit size classes and arena size, defaults elsewhere
    pub fn with_classes(size_classes: Vec<usize>, arena_size: usize) -> MemoryResult<Self> {
        Self::new(PoolConfig::new(SizeClasses::new(size_classes)?, arena_size))
    }

    /// Creates a pool with production config - optimized for performance
    pub fn production(size_classes: SizeClasses, arena_size: usize) -> MemoryResult<Self> {
        Self::new(
            PoolConfig::production()
                .with_size_classes(size_classes)
                .with_arena_size(arena_size),
        )
    }

    /// Creates a pool with debug config - optimized for debugging
    pub fn debug(size_classes: SizeClasses, arena_size: usize) -> MemoryResult<Self> {
        Self::new(
            PoolConfig::debug()
                .with_size_classes(size_classes)
                .with_arena_size(arena_size),
        )
    }

    /// Cut the arena into largest-class chunks and push them as one chain
    fn partition(&self, chunk_count: usize) {
        let largest = self.classes.largest();
        let chunk_size = self.classes.size_of(largest);
        let head = ChunkOffset::new(0);
        let tail = ChunkOffset::new((chunk_count - 1) * chunk_size);

        for i in 0..chunk_count - 1 {
            let chunk = ChunkOffset::new(i * chunk_size);
            // SAFETY: the pool is not shared yet; every chunk is ours.
            unsafe { self.arena.write_link(chunk, chunk.add(chunk_size).get()) };
        }

        // SAFETY: chain of largest-class chunks, linked above, owned by us.
        unsafe {
            self.lists[largest.index()].push_chain(&self.arena, head, tail, chunk_count, false);
        }
    }

    /// Allocate a chunk of at least `size` bytes
    ///
    /// The chunk comes from the smallest class that fits, splitting a larger
    /// chunk when that class is empty. Its contents are unspecified.
    ///
    /// # Errors
    /// - `RequestedSizeTooLarge` if `size` exceeds the largest class
    /// - `PoolExhausted` if every candidate list stayed empty for
    ///   `max_probe_attempts` scans
    ///
    /// Under [`ErrorPolicy::Abort`] these abort the process instead.
    pub fn allocate(&self, size: usize) -> MemoryResult<NonNull<u8>> {
        let result = self.try_allocate(size);
        self.enforce(result, None)
    }

    fn try_allocate(&self, size: usize) -> MemoryResult<NonNull<u8>> {
        let Some(wanted) = self.classes.class_for(size) else {
            return Err(MemoryError::requested_size_too_large(
                size,
                self.classes.max_size(),
            ));
        };

        let mut backoff = Backoff::new();
        let mut attempts = 0;
        let mut contended = 0;

        let (class, chunk) = loop {
            let Some(candidate) = self.first_non_empty(wanted) else {
                attempts += 1;
                if attempts >= self.config.max_probe_attempts {
                    self.record(|stats| {
                        stats.record_contention(contended);
                        stats.record_exhausted();
                    });
                    return Err(MemoryError::pool_exhausted(size, attempts));
                }
                hint::spin_loop();
                continue;
            };

            match self.lists[candidate.index()].try_pop(&self.arena, candidate.index())? {
                PopOutcome::Popped(chunk) => break (candidate, chunk),
                PopOutcome::Empty | PopOutcome::Contended => {
                    contended += 1;
                    if self.config.use_backoff {
                        backoff.spin();
                    } else {
                        hint::spin_loop();
                    }
                }
            }
        };

        if class != wanted {
            self.split(chunk, class, wanted);
        }

        if let Some(pattern) = self.config.alloc_pattern {
            // SAFETY: the chunk was just removed from its list and is ours.
            unsafe {
                self.arena
                    .fill(chunk, self.classes.size_of(wanted), pattern);
            }
        }

        self.record(|stats| {
            stats.record_contention(contended);
            stats.record_allocation();
        });

        #[cfg(feature = "logging")]
        trace!(
            size,
            wanted = %wanted,
            served = %class,
            offset = %chunk,
            "Allocated chunk"
        );

        Ok(self.arena.chunk_ptr(chunk))
    }

    /// Smallest class at or above `from` whose list is not observed empty
    fn first_non_empty(&self, from: SizeClass) -> Option<SizeClass> {
        self.classes
            .upward_from(from)
            .find(|class| self.lists[class.index()].load() != HeadState::Empty)
    }

    /// Keep the first `wanted`-sized piece of `chunk` and free the rest
    ///
    /// Bytes past the last whole piece stay unused when the class sizes do
    /// not divide evenly.
    fn split(&self, chunk: ChunkOffset, from: SizeClass, wanted: SizeClass) {
        let piece = self.classes.size_of(wanted);
        let pieces = self.classes.size_of(from) / piece;

        if pieces > 1 {
            let head = chunk.add(piece);
            let tail = chunk.add((pieces - 1) * piece);

            for i in 1..pieces - 1 {
                let sub = chunk.add(i * piece);
                // SAFETY: the whole parent chunk is owned by this thread.
                unsafe { self.arena.write_link(sub, sub.add(piece).get()) };
            }

            // SAFETY: pieces 1..n-1 are linked above, sized for `wanted` and
            // owned by this thread until published.
            let contended = unsafe {
                self.lists[wanted.index()].push_chain(
                    &self.arena,
                    head,
                    tail,
                    pieces - 1,
                    self.config.use_backoff,
                )
            };
            self.record(|stats| stats.record_contention(contended));
        }

        #[cfg(feature = "logging")]
        trace!(
            offset = %chunk,
            from = %from,
            to = %wanted,
            pieces,
            "Split chunk"
        );

        self.record(StatsCounters::record_split);
    }

    /// Return a chunk to the pool
    ///
    /// `size` must map to the same class as the size passed to
    /// [`allocate`](Self::allocate); passing the original size always does.
    ///
    /// # Errors
    /// - `InvalidSize` if `size` exceeds the largest class
    /// - `AddressOutOfRange` if the chunk does not lie inside the arena
    /// - `MisalignedAddress` if `ptr` is not on the chunk grid
    ///
    /// The last two are only checked with `validate_addresses`. Under
    /// [`ErrorPolicy::Abort`] every error aborts the process instead.
    ///
    /// # Safety
    /// - `ptr` must have been returned by `allocate` on this pool
    /// - `ptr` must not have been deallocated since
    /// - The chunk must not be accessed after this call
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) -> MemoryResult<()> {
        // SAFETY: forwarded caller contract.
        let result = unsafe { self.try_deallocate(ptr, size) };
        self.enforce(result, Some(ptr.as_ptr() as usize))
    }

    unsafe fn try_deallocate(&self, ptr: NonNull<u8>, size: usize) -> MemoryResult<()> {
        let Some(class) = self.classes.class_for(size) else {
            return Err(MemoryError::invalid_size(size, self.classes.max_size()));
        };
        let chunk_size = self.classes.size_of(class);
        let address = ptr.as_ptr() as usize;

        if self.config.validate_addresses {
            if !self.arena.contains_range(address, chunk_size) {
                return Err(MemoryError::address_out_of_range(
                    address,
                    chunk_size,
                    self.arena.start(),
                    self.arena.end(),
                ));
            }
            if !is_aligned(address - self.arena.start(), self.chunk_align) {
                return Err(MemoryError::misaligned_address(address, self.chunk_align));
            }
        }

        let chunk = self.arena.offset_of(ptr);

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: caller returns ownership of the whole chunk.
            unsafe { self.arena.fill(chunk, chunk_size, pattern) };
        }

        // SAFETY: a single chunk of `class`, owned by the caller until the
        // push publishes it.
        let contended = unsafe {
            self.lists[class.index()].push_chain(
                &self.arena,
                chunk,
                chunk,
                1,
                self.config.use_backoff,
            )
        };

        self.record(|stats| {
            stats.record_contention(contended);
            stats.record_deallocation();
        });

        Ok(())
    }

    /// Apply the error policy to an operation result
    #[inline]
    pub(crate) fn enforce<T>(
        &self,
        result: MemoryResult<T>,
        address: Option<usize>,
    ) -> MemoryResult<T> {
        match result {
            Err(err) if err.is_fatal() || self.config.error_policy == ErrorPolicy::Abort => {
                self.abort(&err, address)
            }
            other => other,
        }
    }

    #[cold]
    #[inline(never)]
    fn abort(&self, err: &MemoryError, address: Option<usize>) -> ! {
        #[cfg(feature = "logging")]
        match address {
            Some(address) => error!(
                code = err.code(),
                address = format_args!("{address:#x}"),
                arena_start = format_args!("{:#x}", self.arena.start()),
                "Segregated pool aborting: {err}"
            ),
            None => error!(
                code = err.code(),
                arena_start = format_args!("{:#x}", self.arena.start()),
                "Segregated pool aborting: {err}"
            ),
        }

        match address {
            Some(address) => eprintln!("segpool: {} at {address:#x}: {err}", err.code()),
            None => eprintln!("segpool: {}: {err}", err.code()),
        }
        std::process::abort()
    }

    #[inline]
    fn record(&self, update: impl FnOnce(&StatsCounters)) {
        if self.config.track_stats {
            update(&self.stats);
        }
    }

    /// Size-class table
    pub fn size_classes(&self) -> &SizeClasses {
        &self.classes
    }

    /// Class that serves (and takes back) requests of `size` bytes
    pub fn class_for(&self, size: usize) -> Option<SizeClass> {
        self.classes.class_for(size)
    }

    /// Alignment guaranteed for every chunk start
    pub fn chunk_align(&self) -> usize {
        self.chunk_align
    }

    /// Usable arena bytes
    pub fn capacity(&self) -> usize {
        self.arena.len()
    }

    /// The backing arena
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Active configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Checks if a pointer belongs to this pool
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.arena.contains_range(ptr as usize, 1)
    }

    /// Observed head state of `class`'s list
    ///
    /// # Panics
    /// If `class` does not come from this pool's table.
    pub fn free_list_state(&self, class: SizeClass) -> HeadState {
        self.lists[class.index()].load()
    }

    /// Free chunks on `class`'s list (upper-bound estimate while contended)
    ///
    /// # Panics
    /// If `class` does not come from this pool's table.
    pub fn free_chunks(&self, class: SizeClass) -> usize {
        self.lists[class.index()].free_chunks()
    }

    /// Current statistics
    pub fn stats(&self) -> PoolStats {
        let free_chunks: Vec<usize> = self.lists.iter().map(FreeList::free_chunks).collect();
        let free_bytes = free_chunks
            .iter()
            .zip(self.classes.as_slice())
            .map(|(count, size)| count * size)
            .sum();

        let mut stats = PoolStats {
            free_chunks,
            free_bytes,
            capacity: self.capacity(),
            ..PoolStats::default()
        };
        self.stats.snapshot_into(&mut stats);
        stats
    }

    #[cfg(test)]
    pub(crate) fn list(&self, class: SizeClass) -> &FreeList {
        &self.lists[class.index()]
    }
}
