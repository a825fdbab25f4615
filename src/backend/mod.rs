//! Platform memory backend - one reservation per arena
//!
//! Design: The arena asks the backend for a single zero-initialized, read/write,
//! contiguous block at construction and hands it back at teardown. No backend
//! call ever happens per sub-allocation.
//!
//! Platforms:
//! - `unix.rs` - anonymous private mapping (mmap/munmap)
//! - `windows.rs` - committed reservation (VirtualAlloc/VirtualFree)

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

use core::ptr::NonNull;
use std::io;

use thiserror::Error;

/// Source of the arena's backing memory
///
/// Implementations must return memory that is zero-initialized, contiguous and
/// address-stable until released.
pub trait MemoryBackend: Send + Sync {
    /// Reserve and commit `size` bytes
    fn reserve(&self, size: usize) -> Result<NonNull<u8>, BackendError>;

    /// Return a block obtained from [`MemoryBackend::reserve`]
    ///
    /// # Safety
    ///
    /// `ptr` and `size` must come from a single successful `reserve` call on this
    /// backend, the block must not have been released already, and nothing may
    /// access the block afterwards.
    unsafe fn release(&self, ptr: NonNull<u8>, size: usize);
}

/// Backend failure
#[derive(Debug, Error)]
pub enum BackendError {
    /// The OS refused the reservation
    #[error("couldn't reserve {size} bytes: {source}")]
    Reserve {
        size: usize,
        #[source]
        source: io::Error,
    },
}

/// Virtual memory straight from the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct OsMemory;

impl MemoryBackend for OsMemory {
    fn reserve(&self, size: usize) -> Result<NonNull<u8>, BackendError> {
        #[cfg(unix)]
        let ptr = unix::map(size);
        #[cfg(windows)]
        let ptr = windows::map(size);

        ptr.map_err(|source| BackendError::Reserve { size, source })
    }

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) {
        #[cfg(unix)]
        unix::unmap(ptr, size);
        #[cfg(windows)]
        windows::unmap(ptr, size);
    }
}
