//! Lock-free free list for one size class
//!
//! # Safety
//!
//! The list head is a single atomic word holding a tagged [`HeadState`]:
//!
//! ```text
//!   usize::MAX      -> Empty
//!   usize::MAX - 1  -> Locked      (removal in progress)
//!   anything else   -> Available(offset of the first free chunk)
//! ```
//!
//! Free chunks store the offset of their successor in their first word; the
//! tail stores [`NULL_LINK`].
//!
//! ## Protocol
//!
//! - Push: read head, spin while `Locked`, write the observed head into the
//!   tail's link, release fence, CAS head from observed to new chain head.
//!   `Locked` is never used as the expected value.
//! - Pop: CAS head from `Available(x)` to `Locked`; read `x`'s link; CAS
//!   head from `Locked` to the link. Nobody else can change a `Locked`
//!   head, so the second CAS cannot fail on a healthy list.
//!
//! Reading the link only while holding the lock removes the ABA hazard of a
//! plain Treiber stack: if `x` was popped and pushed back in between, the
//! lock CAS succeeds against a genuinely current head whose link was
//! published before it became visible.

use crate::arena::{Arena, ChunkOffset};
use crate::error::{MemoryError, MemoryResult};
use crate::sync::atomic::{AtomicUsize, Ordering, fence};
use crate::sync::hint;
use crate::utils::Backoff;

/// Size of the link word embedded in every free chunk
pub const LINK_SIZE: usize = size_of::<usize>();

const EMPTY_WORD: usize = usize::MAX;
const LOCKED_WORD: usize = usize::MAX - 1;

/// Link value terminating a chain
pub(crate) const NULL_LINK: usize = EMPTY_WORD;

/// Observed state of a free-list head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadState {
    /// No free chunk in this class
    Empty,
    /// First free chunk of the chain
    Available(ChunkOffset),
    /// Another thread is removing the head
    Locked,
}

impl HeadState {
    #[inline(always)]
    const fn encode(self) -> usize {
        match self {
            Self::Empty => EMPTY_WORD,
            Self::Locked => LOCKED_WORD,
            Self::Available(offset) => offset.get(),
        }
    }

    #[inline(always)]
    const fn decode(word: usize) -> Self {
        match word {
            EMPTY_WORD => Self::Empty,
            LOCKED_WORD => Self::Locked,
            offset => Self::Available(ChunkOffset::new(offset)),
        }
    }
}

/// Result of one removal attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PopOutcome {
    /// The chunk now belongs to the caller
    Popped(ChunkOffset),
    /// The list was empty when observed
    Empty,
    /// The list was locked or changed under us
    Contended,
}

/// Free list of one size class
#[derive(Debug)]
pub(crate) struct FreeList {
    head: AtomicUsize,
    /// Upper-bound estimate of the chain length. Incremented before a push
    /// publishes and decremented after a pop completes, so it never drops
    /// below the true length.
    free_chunks: AtomicUsize,
}

impl FreeList {
    pub(crate) fn new() -> Self {
        Self {
            head: AtomicUsize::new(EMPTY_WORD),
            free_chunks: AtomicUsize::new(0),
        }
    }

    /// Current head state
    #[inline]
    pub(crate) fn load(&self) -> HeadState {
        HeadState::decode(self.head.load(Ordering::Acquire))
    }

    /// Estimated number of free chunks
    #[inline]
    pub(crate) fn free_chunks(&self) -> usize {
        self.free_chunks.load(Ordering::Relaxed)
    }

    /// Atomically prepend the chain `head..=tail` of `count` chunks
    ///
    /// Retries until it succeeds. Spins without a CAS while the list is
    /// locked. Returns the number of CAS races lost along the way.
    ///
    /// # Safety
    ///
    /// Every chunk of the chain must belong to this list's size class and be
    /// exclusively owned by the caller. Links from `head` to `tail` must
    /// already be written; the tail's link is overwritten here.
    pub(crate) unsafe fn push_chain(
        &self,
        arena: &Arena,
        head: ChunkOffset,
        tail: ChunkOffset,
        count: usize,
        use_backoff: bool,
    ) -> usize {
        let new_head = HeadState::Available(head).encode();
        let mut backoff = Backoff::new();
        let mut contended = 0;

        self.free_chunks.fetch_add(count, Ordering::Relaxed);

        loop {
            let observed = self.head.load(Ordering::Acquire);

            if observed == LOCKED_WORD {
                hint::spin_loop();
                continue;
            }

            // SAFETY: the tail is owned by the caller and not yet published.
            unsafe { arena.write_link(tail, observed) };

            fence(Ordering::Release);

            if self
                .head
                .compare_exchange_weak(observed, new_head, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return contended;
            }

            contended += 1;
            if use_backoff {
                backoff.spin();
            }
        }
    }

    /// Try to take the head chunk
    ///
    /// On success the chunk's link word is cleared and the chunk is owned by
    /// the caller. An `Err` means the unlock CAS failed: the list can no
    /// longer be trusted.
    pub(crate) fn try_pop(&self, arena: &Arena, class_index: usize) -> MemoryResult<PopOutcome> {
        let observed = self.head.load(Ordering::Acquire);

        let chunk = match HeadState::decode(observed) {
            HeadState::Empty => return Ok(PopOutcome::Empty),
            HeadState::Locked => return Ok(PopOutcome::Contended),
            HeadState::Available(chunk) => chunk,
        };

        if self
            .head
            .compare_exchange(observed, LOCKED_WORD, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(PopOutcome::Contended);
        }

        // SAFETY: we hold the list lock and `chunk` is its head; its link was
        // published before the head CAS that made it visible.
        let next = unsafe { arena.read_link(chunk) };

        fence(Ordering::Release);

        if let Err(found) =
            self.head
                .compare_exchange(LOCKED_WORD, next, Ordering::AcqRel, Ordering::Acquire)
        {
            return Err(MemoryError::unlock_failure(class_index, found));
        }

        self.free_chunks.fetch_sub(1, Ordering::Relaxed);

        // SAFETY: the chunk is off the list and owned by us.
        unsafe { arena.write_link(chunk, NULL_LINK) };

        Ok(PopOutcome::Popped(chunk))
    }

    /// Force the head word; test-only hook for invariant-violation paths
    #[cfg(test)]
    pub(crate) fn store_raw(&self, state: HeadState) {
        self.head.store(state.encode(), Ordering::Release);
    }
}
