//! Owned arena spans
//!
//! Design: A block owns its pages exclusively for as long as it lives and
//! borrows the arena, so the region cannot be torn down underneath it.
//! Dropping the block returns the pages (RAII, no explicit free).

use core::mem::ManuallyDrop;
use core::slice;

use super::{Allocation, PageArena};
use crate::backend::{MemoryBackend, OsMemory};

/// Page-aligned span of arena memory
pub struct ArenaBlock<'a, B: MemoryBackend = OsMemory> {
    arena: &'a PageArena<B>,
    allocation: Allocation,
}

impl<'a, B: MemoryBackend> ArenaBlock<'a, B> {
    pub(super) fn new(arena: &'a PageArena<B>, allocation: Allocation) -> Self {
        Self { arena, allocation }
    }

    /// Byte offset from the arena base
    #[inline]
    pub fn offset(&self) -> usize {
        self.allocation.first_page as usize * self.arena.geometry().page_size()
    }

    /// Rounded length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.allocation.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocation.size == 0
    }

    #[inline]
    pub fn first_page(&self) -> u32 {
        self.allocation.first_page
    }

    #[inline]
    pub fn pages(&self) -> u32 {
        self.allocation.pages
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.allocation.ptr.as_ptr()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // Safety: the pages are inside the live region and owned by this block
        unsafe { slice::from_raw_parts(self.allocation.ptr.as_ptr(), self.allocation.size) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // Safety: as above, and &mut self makes the access unique
        unsafe { slice::from_raw_parts_mut(self.allocation.ptr.as_ptr(), self.allocation.size) }
    }

    /// Detach the pages from the block without freeing them
    ///
    /// The caller becomes responsible for [`PageArena::free_allocation`].
    pub fn into_raw(self) -> Allocation {
        let block = ManuallyDrop::new(self);
        block.allocation
    }
}

impl<B: MemoryBackend> Drop for ArenaBlock<'_, B> {
    fn drop(&mut self) {
        self.arena
            .release_pages(self.allocation.first_page, self.allocation.pages);
    }
}

impl<B: MemoryBackend> core::fmt::Debug for ArenaBlock<'_, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArenaBlock")
            .field("offset", &self.offset())
            .field("len", &self.len())
            .field("pages", &self.pages())
            .finish()
    }
}

// Safety: the block is the sole owner of its pages, like a Box<[u8]>
unsafe impl<B: MemoryBackend> Send for ArenaBlock<'_, B> {}
unsafe impl<B: MemoryBackend> Sync for ArenaBlock<'_, B> {}
