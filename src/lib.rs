//! Page Arena - page-granular virtual memory arena for cache buffers
//!
//! One large block of virtual memory is reserved up front and split into
//! fixed-size pages. Sub-allocations are page runs chosen by best fit from a
//! sorted, coalescing free list; freeing puts the run back and merges it with
//! its neighbours. The operating system is only involved at creation and
//! teardown.
//!
//! ```no_run
//! use page_arena::PageArena;
//!
//! let arena = PageArena::new(64 << 20)?;
//! let mut tile = arena.alloc_block(70_000)?;
//! assert_eq!(tile.len(), 2 * 65536);
//! tile.as_mut_slice().fill(0x7f);
//! drop(tile); // pages go back to the arena
//! # Ok::<(), page_arena::ArenaError>(())
//! ```

pub mod arena;
pub mod backend;
pub mod config;
pub mod error;
pub mod ffi;
pub mod logging;

// Re-export core types
pub use arena::{
    Allocation, ArenaBlock, ArenaStats, FreeRun, FreeRunTable, PageArena, PageGeometry, RunInvariant,
};
pub use backend::{BackendError, MemoryBackend, OsMemory};
pub use config::{ArenaConfig, DEFAULT_PAGE_SIZE};
pub use error::ArenaError;
