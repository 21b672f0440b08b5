//! Backing arena
//!
//! # Safety
//!
//! The arena owns one zeroed, aligned allocation obtained from the global
//! allocator. Chunks are addressed by [`ChunkOffset`] rather than by raw
//! pointer; pointers are only materialized at the public API boundary.
//!
//! ## Invariants
//!
//! - `base` is aligned to `align` and valid for `len` bytes until drop
//! - Link words are only read or written at chunk starts, which are
//!   multiples of the link word size (enforced by size-class validation)
//! - The arena never moves or resizes

use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;

use crate::error::{MemoryError, MemoryResult};
use crate::free_list::LINK_SIZE;

/// Byte offset of a chunk from the arena base
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkOffset(usize);

impl ChunkOffset {
    /// Wrap a raw byte offset
    #[inline(always)]
    pub const fn new(offset: usize) -> Self {
        Self(offset)
    }

    /// Raw byte offset
    #[inline(always)]
    pub const fn get(self) -> usize {
        self.0
    }

    /// Offset `bytes` further into the arena
    #[inline(always)]
    pub const fn add(self, bytes: usize) -> Self {
        Self(self.0 + bytes)
    }
}

impl fmt::Display for ChunkOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{:#x}", self.0)
    }
}

/// Contiguous buffer the pool carves chunks from
pub struct Arena {
    base: NonNull<u8>,
    layout: Layout,
}

impl Arena {
    /// Allocate a zeroed arena of `len` bytes aligned to `align`
    pub fn new(len: usize, align: usize) -> MemoryResult<Self> {
        if len == 0 {
            return Err(MemoryError::invalid_config("arena size must be non-zero"));
        }
        if align < LINK_SIZE {
            return Err(MemoryError::InvalidConfig {
                reason: format!("arena alignment {align} is smaller than a link word"),
            });
        }

        // Offsets must stay clear of the head-word sentinels.
        if len >= usize::MAX - 1 {
            return Err(MemoryError::invalid_config("arena size too large"));
        }

        let layout = Layout::from_size_align(len, align)
            .map_err(|_| MemoryError::invalid_layout("arena size/alignment"))?;

        // SAFETY: layout has non-zero size (checked above).
        let raw = unsafe { std::alloc::alloc_zeroed(layout) };
        let base = NonNull::new(raw).ok_or_else(|| MemoryError::allocation_failed(len, align))?;

        Ok(Self { base, layout })
    }

    /// First address of the arena
    #[inline]
    pub fn start(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// One past the last address of the arena
    #[inline]
    pub fn end(&self) -> usize {
        self.start() + self.layout.size()
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    /// Always false: construction rejects empty arenas
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    /// Alignment of the arena base
    #[inline]
    pub fn align(&self) -> usize {
        self.layout.align()
    }

    /// Whether `[address, address + len)` lies entirely inside the arena
    #[inline]
    pub fn contains_range(&self, address: usize, len: usize) -> bool {
        address >= self.start()
            && address
                .checked_add(len)
                .is_some_and(|range_end| range_end <= self.end())
    }

    /// Pointer to the chunk at `offset`
    #[inline]
    pub fn chunk_ptr(&self, offset: ChunkOffset) -> NonNull<u8> {
        debug_assert!(offset.0 < self.len());
        // SAFETY: offset is inside the allocation, so the result is in bounds
        // and non-null.
        unsafe { self.base.add(offset.0) }
    }

    /// Offset of an address that lies inside the arena
    #[inline]
    pub fn offset_of(&self, ptr: NonNull<u8>) -> ChunkOffset {
        let address = ptr.as_ptr() as usize;
        debug_assert!(address >= self.start() && address < self.end());
        ChunkOffset(address - self.start())
    }

    /// Read the link word of a free chunk
    ///
    /// # Safety
    ///
    /// The caller must have exclusive removal rights over the chunk: it is
    /// the head of a list the caller has locked, or the caller owns it.
    #[inline]
    pub(crate) unsafe fn read_link(&self, offset: ChunkOffset) -> usize {
        debug_assert!(offset.0 + LINK_SIZE <= self.len());
        debug_assert!(offset.0 % LINK_SIZE == 0);
        // SAFETY: in bounds and word aligned (arena base is at least word
        // aligned and chunk offsets are word multiples); exclusivity is the
        // caller's contract.
        unsafe { self.chunk_ptr(offset).cast::<usize>().as_ptr().read() }
    }

    /// Write the link word of a chunk
    ///
    /// # Safety
    ///
    /// The caller must own the chunk; it must not be reachable from any
    /// free list and must not be held by a live allocation.
    #[inline]
    pub(crate) unsafe fn write_link(&self, offset: ChunkOffset, link: usize) {
        debug_assert!(offset.0 + LINK_SIZE <= self.len());
        debug_assert!(offset.0 % LINK_SIZE == 0);
        // SAFETY: see `read_link`.
        unsafe { self.chunk_ptr(offset).cast::<usize>().as_ptr().write(link) }
    }

    /// Fill `len` bytes of the chunk at `offset` with `pattern`
    ///
    /// # Safety
    ///
    /// Same ownership requirement as [`Arena::write_link`], for the whole
    /// range.
    #[inline]
    pub(crate) unsafe fn fill(&self, offset: ChunkOffset, len: usize, pattern: u8) {
        debug_assert!(offset.0 + len <= self.len());
        // SAFETY: range is inside the allocation and owned by the caller.
        unsafe { core::ptr::write_bytes(self.chunk_ptr(offset).as_ptr(), pattern, len) }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: base was allocated in `new` with exactly this layout.
        unsafe { std::alloc::dealloc(self.base.as_ptr(), self.layout) }
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("start", &format_args!("{:#x}", self.start()))
            .field("len", &self.len())
            .field("align", &self.align())
            .finish()
    }
}

// SAFETY: Arena is Send because it uniquely owns its allocation; the raw
// base pointer is never shared with thread-local state.
unsafe impl Send for Arena {}

// SAFETY: Arena is Sync because it exposes no safe mutation. Every write to
// arena memory goes through an `unsafe` method whose contract requires
// exclusive ownership of the target chunk, and ownership is transferred
// between threads only through the free-list CAS protocol (AcqRel).
unsafe impl Sync for Arena {}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn test_arena_alignment_and_bounds() {
        let arena = Arena::new(4096, 64).unwrap();
        assert_eq!(arena.start() % 64, 0);
        assert_eq!(arena.len(), 4096);
        assert_eq!(arena.end() - arena.start(), 4096);

        assert!(arena.contains_range(arena.start(), 4096));
        assert!(arena.contains_range(arena.start() + 4032, 64));
        assert!(!arena.contains_range(arena.start() + 4033, 64));
        assert!(!arena.contains_range(arena.start() - 1, 1));
        assert!(!arena.contains_range(usize::MAX - 4, 64));
    }

    #[test]
    fn test_offset_round_trip() {
        let arena = Arena::new(1024, 16).unwrap();
        let offset = ChunkOffset::new(256);
        let ptr = arena.chunk_ptr(offset);
        assert_eq!(arena.offset_of(ptr), offset);
        assert_eq!(offset.add(64).get(), 320);
    }

    #[test]
    fn test_link_read_write() {
        let arena = Arena::new(1024, 64).unwrap();
        let offset = ChunkOffset::new(128);
        unsafe {
            assert_eq!(arena.read_link(offset), 0);
            arena.write_link(offset, 512);
            assert_eq!(arena.read_link(offset), 512);
            arena.fill(offset, 64, 0xAB);
            assert_eq!(*arena.chunk_ptr(offset.add(63)).as_ptr(), 0xAB);
        }
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(Arena::new(0, 64).is_err());
        assert!(Arena::new(1024, 1).is_err());
        assert!(Arena::new(1024, 48).is_err());
    }
}
