//! Page geometry - size/page arithmetic shared by allocate and free
//!
//! Design: Pure, lock-free, and the only place sizes are rounded to pages,
//! so allocation and deallocation can never disagree on rounding. Every
//! step that could overflow is checked before it is performed.

use crate::error::ArenaError;

/// Immutable page layout of an arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageGeometry {
    size: usize,
    page_size: usize,
    num_pages: u32,
}

impl PageGeometry {
    /// Geometry of a torn-down arena; every query on it fails
    pub const POISONED: Self = Self {
        size: 0,
        page_size: 0,
        num_pages: 0,
    };

    pub(crate) const fn new(size: usize, page_size: usize, num_pages: u32) -> Self {
        Self {
            size,
            page_size,
            num_pages,
        }
    }

    /// Total reserved bytes, including any tail smaller than a page
    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    pub const fn num_pages(&self) -> u32 {
        self.num_pages
    }

    #[inline]
    pub const fn is_poisoned(&self) -> bool {
        self.page_size == 0 || self.num_pages == 0
    }

    /// Round `size` up to whole pages
    ///
    /// Returns `(page_count, rounded_byte_size)`.
    pub fn pages_for_size(&self, size: usize) -> Result<(u32, usize), ArenaError> {
        if self.is_poisoned() {
            return Err(ArenaError::Uninitialized);
        }
        if size == 0 {
            return Err(ArenaError::ZeroSize);
        }
        if size > usize::MAX - (self.page_size - 1) {
            return Err(ArenaError::Overflow { size });
        }

        let pages = size.div_ceil(self.page_size);
        let too_large = ArenaError::TooLarge {
            pages,
            num_pages: self.num_pages,
        };
        let page_count = match u32::try_from(pages) {
            Ok(n) if n <= self.num_pages => n,
            _ => return Err(too_large),
        };

        let rounded = pages
            .checked_mul(self.page_size)
            .ok_or(ArenaError::Overflow { size })?;

        Ok((page_count, rounded))
    }

    /// Byte offset of page `page` from the arena base
    #[inline]
    pub(crate) fn page_offset(&self, page: u32) -> usize {
        // page < num_pages and num_pages * page_size <= size, so this cannot overflow
        page as usize * self.page_size
    }

    /// Map a freed `(offset, size)` pair to `(first_page, page_count)`
    ///
    /// `offset` must already be known to lie inside the arena.
    pub(crate) fn locate(&self, offset: usize, size: usize) -> Result<(u32, u32), ArenaError> {
        if offset % self.page_size != 0 {
            return Err(ArenaError::Misaligned {
                offset,
                page_size: self.page_size,
            });
        }

        let (pages, _) = self.pages_for_size(size)?;

        let first = offset / self.page_size;
        let first = match u32::try_from(first) {
            Ok(first) if first < self.num_pages && pages <= self.num_pages - first => first,
            _ => {
                return Err(ArenaError::RangeOutOfBounds {
                    first: u32::try_from(first).unwrap_or(u32::MAX),
                    pages,
                    num_pages: self.num_pages,
                })
            }
        };

        Ok((first, pages))
    }
}
