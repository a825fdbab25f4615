//! Page arena - page-granular sub-allocation from one virtual memory block
//!
//! Design: Reserve a large contiguous region once, then carve page runs out of
//! it with a best-fit, coalescing free list:
//! 1. `geometry.rs` - size to page rounding (pure, overflow checked)
//! 2. `runs.rs` - sorted free-run table (best fit, ordered insert, merge)
//! 3. `block.rs` - owned spans that hand their pages back on drop
//!
//! The backend is touched exactly twice: once at construction, once at
//! teardown. Every allocation is pointer arithmetic on the base address.
//! A single mutex guards the free-run table; geometry and base are immutable
//! and read without locking.

mod block;
mod geometry;
mod runs;


pub use block::ArenaBlock;
pub use geometry::PageGeometry;
pub use runs::{FreeRun, FreeRunTable, RunInvariant};

use core::ptr::NonNull;

use parking_lot::Mutex;
use tracing::instrument;

use crate::backend::{MemoryBackend, OsMemory};
use crate::config::ArenaConfig;
use crate::error::ArenaError;
use crate::logging;

/// Raw page-aligned allocation handed out by [`PageArena::allocate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Start of the allocation
    pub ptr: NonNull<u8>,
    /// Rounded size in bytes (whole pages)
    pub size: usize,
    /// First page index from the arena base
    pub first_page: u32,
    /// Number of pages
    pub pages: u32,
}

// Safety: an Allocation is an address and a length; dereferencing it is the
// caller's unsafe business
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

/// Free-page statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    pub page_size: usize,
    pub num_pages: u32,
    pub free_pages: u32,
    pub largest_free_run: u32,
    /// Number of free runs (fragmentation)
    pub free_runs: usize,
}

impl ArenaStats {
    #[inline]
    pub fn allocated_pages(&self) -> u32 {
        self.num_pages - self.free_pages
    }

    #[inline]
    pub fn free_bytes(&self) -> usize {
        self.free_pages as usize * self.page_size
    }

    /// Allocated fraction of the arena, 0.0 to 1.0
    pub fn utilization(&self) -> f64 {
        if self.num_pages == 0 {
            return 0.0;
        }
        f64::from(self.allocated_pages()) / f64::from(self.num_pages)
    }

    /// Whether a request of `size` bytes could succeed right now
    pub fn can_fit(&self, size: usize) -> bool {
        if self.page_size == 0 || size == 0 {
            return false;
        }
        let pages = size / self.page_size + usize::from(size % self.page_size != 0);
        pages <= self.largest_free_run as usize
    }
}

/// Fixed-capacity page arena over one reserved memory block
pub struct PageArena<B: MemoryBackend = OsMemory> {
    base: Option<NonNull<u8>>,
    geometry: PageGeometry,
    free_runs: Mutex<FreeRunTable>,
    backend: B,
}

// Safety: base is only turned into references through ArenaBlock, whose pages
// are exclusively owned; all shared mutable state is behind the mutex
unsafe impl<B: MemoryBackend> Send for PageArena<B> {}
unsafe impl<B: MemoryBackend> Sync for PageArena<B> {}

impl PageArena<OsMemory> {
    /// Reserve `total_size` bytes with the default page size
    pub fn new(total_size: usize) -> Result<Self, ArenaError> {
        Self::with_config(ArenaConfig::new(total_size))
    }

    pub fn with_config(config: ArenaConfig) -> Result<Self, ArenaError> {
        Self::with_backend(config, OsMemory)
    }
}

impl<B: MemoryBackend> PageArena<B> {
    /// Reserve the arena's memory from `backend`
    ///
    /// Either returns a fully usable arena or fails holding no resources.
    pub fn with_backend(config: ArenaConfig, backend: B) -> Result<Self, ArenaError> {
        let geometry = config.validate()?;

        let base = backend.reserve(geometry.size()).map_err(|err| {
            logging::log_backend_failure(&err);
            ArenaError::from(err)
        })?;

        let table = match FreeRunTable::try_new(geometry.num_pages()) {
            Ok(table) => table,
            Err(_) => {
                unsafe { backend.release(base, geometry.size()) };
                let err = ArenaError::FreeListAlloc {
                    num_pages: geometry.num_pages(),
                };
                logging::log_arena_error(&err);
                return Err(err);
            }
        };

        logging::log_arena_init(base.as_ptr(), geometry.size(), geometry.page_size(), geometry.num_pages());

        Ok(Self {
            base: Some(base),
            geometry,
            free_runs: Mutex::new(table),
            backend,
        })
    }

    /// Release the backing memory and poison the arena
    ///
    /// Idempotent. Later calls on the arena fail with `Uninitialized`, `free`
    /// becomes a no-op and `contains` returns false.
    pub fn teardown(&mut self) {
        let Some(base) = self.base.take() else {
            return;
        };

        let table = core::mem::take(self.free_runs.get_mut());
        let (free, _) = table.stats();
        drop(table);

        let size = self.geometry.size();
        let outstanding = self.geometry.num_pages() - free;
        self.geometry = PageGeometry::POISONED;

        // Safety: base/size came from reserve in with_backend and base has been
        // taken, so nothing reaches the region after this
        unsafe { self.backend.release(base, size) };

        logging::log_arena_teardown(size, outstanding);
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.base.is_some()
    }

    #[inline]
    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    /// Base address, `None` after teardown
    #[inline]
    pub fn base(&self) -> Option<NonNull<u8>> {
        self.base
    }

    /// Round `size` to whole pages: `(page_count, rounded_bytes)`
    #[inline]
    pub fn pages_for_size(&self, size: usize) -> Result<(u32, usize), ArenaError> {
        self.geometry.pages_for_size(size)
    }

    /// Allocate at least `size` bytes as whole pages
    ///
    /// On failure nothing is modified. `Exhausted` is the ordinary out-of-space
    /// case; other errors describe an impossible request.
    #[instrument(level = "trace", target = "page_arena", skip(self))]
    pub fn allocate(&self, size: usize) -> Result<Allocation, ArenaError> {
        let base = self.base.ok_or(ArenaError::Uninitialized)?;
        let (pages, rounded) = self.geometry.pages_for_size(size)?;

        let first = {
            let mut runs = self.free_runs.lock();
            match runs.take(pages) {
                Some(first) => first,
                None => {
                    let (_, largest_free) = runs.stats();
                    drop(runs);
                    logging::log_exhausted(pages, largest_free);
                    return Err(ArenaError::Exhausted { pages, largest_free });
                }
            }
        };

        // Safety: first + pages <= num_pages, so the offset stays inside the region
        let ptr = unsafe { NonNull::new_unchecked(base.as_ptr().add(self.geometry.page_offset(first))) };
        logging::log_allocation(ptr.as_ptr(), first, pages);

        Ok(Allocation {
            ptr,
            size: rounded,
            first_page: first,
            pages,
        })
    }

    /// Allocate an owned span that returns its pages when dropped
    pub fn alloc_block(&self, size: usize) -> Result<ArenaBlock<'_, B>, ArenaError> {
        let allocation = self.allocate(size)?;
        Ok(ArenaBlock::new(self, allocation))
    }

    /// Return `size` bytes at `ptr` to the arena
    ///
    /// A null pointer, zero size or torn-down arena is a silent no-op. Pointers
    /// outside the arena, misaligned pointers, bad sizes and ranges overlapping
    /// free pages (double free) are logged and rejected with the free list left
    /// untouched.
    ///
    /// # Safety
    ///
    /// On success the pages may be handed out again immediately. The caller
    /// must not access `[ptr, ptr + size)` afterwards, and must not free pages
    /// owned by a live [`ArenaBlock`].
    #[instrument(level = "trace", target = "page_arena", skip(self, ptr), fields(address = ptr as usize))]
    pub unsafe fn free(&self, ptr: *const u8, size: usize) -> Result<(), ArenaError> {
        let Some(base) = self.base else {
            return Ok(());
        };
        if ptr.is_null() || size == 0 || self.geometry.is_poisoned() {
            return Ok(());
        }

        let addr = ptr as usize;
        let start = base.as_ptr() as usize;
        if addr < start || addr - start >= self.geometry.size() {
            return Err(self.reject(ArenaError::OutOfRange { addr }, addr, size));
        }

        let (first, pages) = self
            .geometry
            .locate(addr - start, size)
            .map_err(|err| self.reject(err, addr, size))?;

        let given = self.free_runs.lock().give(first, pages);
        given.map_err(|err| self.reject(err, addr, size))?;

        logging::log_deallocation(ptr, first, pages);
        Ok(())
    }

    /// Free a raw [`Allocation`]
    ///
    /// # Safety
    ///
    /// Same contract as [`PageArena::free`].
    #[inline]
    pub unsafe fn free_allocation(&self, allocation: Allocation) -> Result<(), ArenaError> {
        self.free(allocation.ptr.as_ptr(), allocation.size)
    }

    /// Give back pages of a block; the range is known valid
    pub(crate) fn release_pages(&self, first: u32, pages: u32) {
        let given = self.free_runs.lock().give(first, pages);
        if let Err(err) = given {
            logging::log_arena_error(&err);
        }
    }

    fn reject(&self, err: ArenaError, addr: usize, size: usize) -> ArenaError {
        logging::log_free_rejected(&err, addr, size);
        err
    }

    /// `(total_free_pages, largest_free_run_pages)`
    pub fn stats(&self) -> (u32, u32) {
        self.free_runs.lock().stats()
    }

    /// Consistent snapshot of free-page statistics
    pub fn detailed_stats(&self) -> ArenaStats {
        let runs = self.free_runs.lock();
        let (free_pages, largest_free_run) = runs.stats();
        ArenaStats {
            page_size: self.geometry.page_size(),
            num_pages: self.geometry.num_pages(),
            free_pages,
            largest_free_run,
            free_runs: runs.len(),
        }
    }

    /// Copy of the current free-run table
    pub fn free_runs(&self) -> Vec<FreeRun> {
        self.free_runs.lock().runs().to_vec()
    }

    /// Check free-run table invariants
    pub fn check_invariants(&self) -> Result<(), RunInvariant> {
        self.free_runs.lock().check_invariants()
    }

    /// Whether `ptr` points into the reserved region (lock-free)
    #[inline]
    pub fn contains(&self, ptr: *const u8) -> bool {
        let Some(base) = self.base else {
            return false;
        };
        let start = base.as_ptr() as usize;
        let addr = ptr as usize;
        addr >= start && addr - start < self.geometry.size()
    }
}

impl<B: MemoryBackend> Drop for PageArena<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<B: MemoryBackend> core::fmt::Debug for PageArena<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageArena")
            .field("base", &self.base)
            .field("geometry", &self.geometry)
            .field("free_runs", &*self.free_runs.lock())
            .finish()
    }
}
