//! Layout-based allocator interface
//!
//! # Safety
//!
//! [`Allocator`] is an unsafe trait: implementors promise that
//! - returned pointers are valid for reads and writes of the returned length
//! - returned pointers are aligned to the requested layout
//! - a block is never handed out twice before it is deallocated
//!
//! The pool implementation maps a layout to the class serving
//! `layout.size()` and refuses alignments its chunk grid cannot guarantee.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::{MemoryError, MemoryResult};
use crate::pool::SegregatedPool;

/// Allocator driven by [`Layout`]s
///
/// # Safety Requirements
///
/// Implementors must ensure that:
/// - Returned pointers are valid until deallocated
/// - Memory is aligned according to the layout
/// - `usable_size` never exceeds the block actually reserved
pub unsafe trait Allocator {
    /// Allocates memory with the given layout
    ///
    /// Zero-size layouts return a dangling, well-aligned pointer.
    ///
    /// # Errors
    /// - Returns error if memory cannot be allocated
    /// - Returns error for layouts the allocator cannot serve
    fn allocate(&self, layout: Layout) -> MemoryResult<NonNull<[u8]>>;

    /// Deallocates memory at the given pointer with the specified layout
    ///
    /// # Safety
    /// - `ptr` must have been allocated by this allocator
    /// - `layout` must match the original allocation layout
    /// - After this call, `ptr` becomes invalid and must not be used
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> MemoryResult<()>;

    /// Bytes actually reserved for `layout`
    fn usable_size(&self, layout: Layout) -> usize {
        layout.size()
    }

    /// Resize an allocation
    ///
    /// Returns the same pointer when both layouts reserve the same block
    /// and the alignment does not get stricter; otherwise allocates, copies
    /// and frees the old block.
    ///
    /// # Safety
    /// - `ptr` must have been allocated by this allocator with `old_layout`
    /// - On success the old pointer is invalid unless it is returned again
    /// - On failure `ptr` remains valid with `old_layout`
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> MemoryResult<NonNull<[u8]>> {
        if new_layout.align() <= old_layout.align()
            && self.usable_size(new_layout) == self.usable_size(old_layout)
        {
            return Ok(NonNull::slice_from_raw_parts(ptr, new_layout.size()));
        }

        let new_ptr = self.allocate(new_layout)?;

        // SAFETY: distinct blocks; both valid for at least the copied length.
        unsafe {
            core::ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                new_ptr.cast::<u8>().as_ptr(),
                old_layout.size().min(new_layout.size()),
            );
        }

        // SAFETY: contents moved; the old block is ours to return.
        unsafe { self.deallocate(ptr, old_layout)? };
        Ok(new_ptr)
    }
}

/// Well-aligned dangling pointer for zero-size layouts
#[inline]
fn dangling(layout: Layout) -> MemoryResult<NonNull<[u8]>> {
    let ptr = NonNull::new(core::ptr::without_provenance_mut::<u8>(layout.align()))
        .ok_or_else(|| MemoryError::invalid_layout("zero alignment"))?;
    Ok(NonNull::slice_from_raw_parts(ptr, 0))
}

// SAFETY: chunks come from the pool's lock-free lists, so each is handed out
// once until returned; alignment is checked against `chunk_align` before
// allocating, and `usable_size` is the chunk size of the serving class.
unsafe impl Allocator for SegregatedPool {
    fn allocate(&self, layout: Layout) -> MemoryResult<NonNull<[u8]>> {
        if layout.align() > self.chunk_align() {
            let err = MemoryError::InvalidLayout {
                reason: format!(
                    "alignment {} exceeds the pool's chunk alignment {}",
                    layout.align(),
                    self.chunk_align()
                ),
            };
            return self.enforce(Err(err), None);
        }

        if layout.size() == 0 {
            return dangling(layout);
        }

        let ptr = SegregatedPool::allocate(self, layout.size())?;
        Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> MemoryResult<()> {
        if layout.size() == 0 {
            return Ok(());
        }

        // SAFETY: forwarded caller contract.
        unsafe { SegregatedPool::deallocate(self, ptr, layout.size()) }
    }

    fn usable_size(&self, layout: Layout) -> usize {
        if layout.size() == 0 {
            return 0;
        }
        self.class_for(layout.size())
            .map_or(layout.size(), |class| self.size_classes().size_of(class))
    }
}
