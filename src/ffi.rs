//! C FFI - stable ABI for hosts that link the arena as a static library
//!
//! Design: Opaque `PageArena` handle, errors reported as null/false returns
//! (details go to the logging sink). Null handles are accepted everywhere and
//! treated as an uninitialized arena.

use core::ptr;

use crate::arena::PageArena;
use crate::logging;

/// Reserve an arena of `total_size` bytes
///
/// Returns null on failure; no memory is held in that case.
#[no_mangle]
pub extern "C" fn page_arena_init(total_size: usize) -> *mut PageArena {
    match PageArena::new(total_size) {
        Ok(arena) => Box::into_raw(Box::new(arena)),
        Err(err) => {
            logging::log_arena_error(&err);
            ptr::null_mut()
        }
    }
}

/// Release the arena's memory, keeping the (poisoned) handle valid
///
/// Idempotent. The handle must still be passed to [`page_arena_destroy`].
///
/// # Safety
/// - `arena` is null or a live handle from [`page_arena_init`]
/// - no other thread is using the arena
#[no_mangle]
pub unsafe extern "C" fn page_arena_cleanup(arena: *mut PageArena) {
    if let Some(arena) = arena.as_mut() {
        arena.teardown();
    }
}

/// Tear down the arena if needed and free the handle
///
/// # Safety
/// - `arena` is null or a live handle from [`page_arena_init`]
/// - the handle is not used afterwards
#[no_mangle]
pub unsafe extern "C" fn page_arena_destroy(arena: *mut PageArena) {
    if !arena.is_null() {
        drop(Box::from_raw(arena));
    }
}

/// Allocate `size` bytes; the page-rounded size is written to `out_size`
///
/// # Safety
/// - `arena` is null or a live handle
/// - `out_size` is null or writable
#[no_mangle]
pub unsafe extern "C" fn page_arena_alloc(arena: *const PageArena, size: usize, out_size: *mut usize) -> *mut u8 {
    let Some(arena) = arena.as_ref() else {
        return ptr::null_mut();
    };
    if out_size.is_null() {
        return ptr::null_mut();
    }

    match arena.allocate(size) {
        Ok(allocation) => {
            out_size.write(allocation.size);
            allocation.ptr.as_ptr()
        }
        Err(_) => ptr::null_mut(),
    }
}

/// Return `size` bytes at `ptr` to the arena
///
/// Invalid frees are logged and ignored.
///
/// # Safety
/// - `arena` is null or a live handle
/// - the range is not accessed after a successful free
#[no_mangle]
pub unsafe extern "C" fn page_arena_free(arena: *const PageArena, ptr: *mut u8, size: usize) {
    if let Some(arena) = arena.as_ref() {
        // Rejections are already logged by the arena
        let _ = arena.free(ptr, size);
    }
}

/// Free-page statistics; both outputs are zero for a null or torn-down arena
///
/// # Safety
/// - `arena` is null or a live handle
/// - each output is null or writable
#[no_mangle]
pub unsafe extern "C" fn page_arena_stats(
    arena: *const PageArena,
    out_total_free_pages: *mut u32,
    out_largest_free_run_pages: *mut u32,
) {
    let (total, largest) = arena.as_ref().map_or((0, 0), PageArena::stats);

    if !out_total_free_pages.is_null() {
        out_total_free_pages.write(total);
    }
    if !out_largest_free_run_pages.is_null() {
        out_largest_free_run_pages.write(largest);
    }
}

/// Whether `ptr` lies inside the arena's reserved region
///
/// # Safety
/// - `arena` is null or a live handle
#[no_mangle]
pub unsafe extern "C" fn page_arena_ptr_in(arena: *const PageArena, ptr: *const u8) -> bool {
    arena.as_ref().map_or(false, |arena| !ptr.is_null() && arena.contains(ptr))
}

/// Round `size` to pages without allocating
///
/// # Safety
/// - `arena` is null or a live handle
/// - `out_pages` is writable; `out_size` is null or writable
#[no_mangle]
pub unsafe extern "C" fn page_arena_calc(
    arena: *const PageArena,
    size: usize,
    out_pages: *mut u32,
    out_size: *mut usize,
) -> bool {
    let Some(arena) = arena.as_ref() else {
        return false;
    };
    if out_pages.is_null() {
        return false;
    }

    match arena.pages_for_size(size) {
        Ok((pages, rounded)) => {
            out_pages.write(pages);
            if !out_size.is_null() {
                out_size.write(rounded);
            }
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: usize = 65536;

    #[test]
    fn c_lifecycle() {
        unsafe {
            let arena = page_arena_init(16 * PAGE);
            assert!(!arena.is_null());

            let mut size = 0usize;
            let ptr = page_arena_alloc(arena, 70_000, &mut size);
            assert!(!ptr.is_null());
            assert_eq!(size, 2 * PAGE);
            assert!(page_arena_ptr_in(arena, ptr));

            let (mut total, mut largest) = (0u32, 0u32);
            page_arena_stats(arena, &mut total, &mut largest);
            assert_eq!((total, largest), (14, 14));

            page_arena_free(arena, ptr, size);
            page_arena_stats(arena, &mut total, &mut largest);
            assert_eq!((total, largest), (16, 16));

            page_arena_cleanup(arena);
            page_arena_cleanup(arena);
            assert!(!page_arena_ptr_in(arena, ptr));
            page_arena_stats(arena, &mut total, &mut largest);
            assert_eq!((total, largest), (0, 0));

            page_arena_destroy(arena);
        }
    }

    #[test]
    fn calc_matches_allocation_rounding() {
        unsafe {
            let arena = page_arena_init(16 * PAGE);
            let mut pages = 0u32;
            let mut rounded = 0usize;

            assert!(page_arena_calc(arena, PAGE + 1, &mut pages, &mut rounded));
            assert_eq!((pages, rounded), (2, 2 * PAGE));
            assert!(page_arena_calc(arena, 1, &mut pages, ptr::null_mut()));
            assert_eq!(pages, 1);
            assert!(!page_arena_calc(arena, 17 * PAGE, &mut pages, &mut rounded));
            assert!(!page_arena_calc(arena, 0, &mut pages, &mut rounded));

            page_arena_destroy(arena);
        }
    }

    #[test]
    fn null_handles_are_tolerated() {
        unsafe {
            let mut size = 0usize;
            assert!(page_arena_alloc(ptr::null(), 10, &mut size).is_null());
            page_arena_free(ptr::null(), ptr::null_mut(), 10);
            assert!(!page_arena_ptr_in(ptr::null(), ptr::null()));
            page_arena_cleanup(ptr::null_mut());
            page_arena_destroy(ptr::null_mut());

            let mut total = 7u32;
            page_arena_stats(ptr::null(), &mut total, ptr::null_mut());
            assert_eq!(total, 0);
        }
        assert!(page_arena_init(0).is_null());
    }
}
