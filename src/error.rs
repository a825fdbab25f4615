//! Arena errors - one taxonomy for every failure the allocator reports
//!
//! Design: All failures are local and returned to the caller. Nothing panics,
//! nothing retries. Corruption signals are also logged at the point of detection.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors returned by arena operations
#[derive(Debug, Error)]
pub enum ArenaError {
    /// Arena was torn down (or never initialized)
    #[error("arena is not initialized")]
    Uninitialized,

    /// Zero-byte request or zero-byte arena
    #[error("size must be greater than zero")]
    ZeroSize,

    /// Configuration rejected before any memory was reserved
    #[error("invalid arena configuration: {reason}")]
    InvalidConfig { reason: &'static str },

    /// Page rounding of `size` would overflow `usize`
    #[error("size {size} overflows page rounding")]
    Overflow { size: usize },

    /// Request needs more pages than the arena holds
    #[error("request needs {pages} pages, arena has {num_pages}")]
    TooLarge { pages: usize, num_pages: u32 },

    /// No free run is large enough
    #[error("arena exhausted: need {pages} contiguous pages, largest free run is {largest_free}")]
    Exhausted { pages: u32, largest_free: u32 },

    /// Pointer does not belong to the arena
    #[error("pointer {addr:#x} is outside the arena")]
    OutOfRange { addr: usize },

    /// Pointer is inside the arena but not on a page boundary
    #[error("offset {offset} is not a multiple of page size {page_size}")]
    Misaligned { offset: usize, page_size: usize },

    /// Freed range runs past the last page
    #[error("pages [{first}, {first}+{pages}) exceed arena of {num_pages} pages")]
    RangeOutOfBounds { first: u32, pages: u32, num_pages: u32 },

    /// Freed range overlaps a run that is already free
    #[error("pages [{first}, {first}+{pages}) overlap free run [{run_start}, {run_start}+{run_len})")]
    Overlap {
        first: u32,
        pages: u32,
        run_start: u32,
        run_len: u32,
    },

    /// Free-run table storage could not be allocated
    #[error("couldn't allocate free run list for {num_pages} pages")]
    FreeListAlloc { num_pages: u32 },

    /// Platform memory reservation failed
    #[error("memory backend failure: {0}")]
    Backend(#[from] BackendError),
}

impl ArenaError {
    /// Misuse or corruption signal (bad pointer, double free)
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::OutOfRange { .. }
                | Self::Misaligned { .. }
                | Self::RangeOutOfBounds { .. }
                | Self::Overlap { .. }
        )
    }

    /// Ordinary out-of-space condition; callers may evict and retry
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let overlap = ArenaError::Overlap { first: 0, pages: 1, run_start: 0, run_len: 4 };
        assert!(overlap.is_corruption());
        assert!(!overlap.is_exhaustion());

        let full = ArenaError::Exhausted { pages: 3, largest_free: 2 };
        assert!(full.is_exhaustion());
        assert!(!full.is_corruption());

        assert!(!ArenaError::ZeroSize.is_corruption());
    }

    #[test]
    fn messages_carry_context() {
        let err = ArenaError::Misaligned { offset: 100, page_size: 65536 };
        assert_eq!(err.to_string(), "offset 100 is not a multiple of page size 65536");

        let err = ArenaError::TooLarge { pages: 17, num_pages: 16 };
        assert_eq!(err.to_string(), "request needs 17 pages, arena has 16");
    }
}
