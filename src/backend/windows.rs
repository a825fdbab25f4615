//! Committed reservations

use core::ptr::{self, NonNull};
use std::io;

use winapi::um::memoryapi::{VirtualAlloc, VirtualFree};
use winapi::um::winnt::{MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE};

pub(super) fn map(size: usize) -> io::Result<NonNull<u8>> {
    // Committed pages are zero-filled on first touch
    let addr = unsafe { VirtualAlloc(ptr::null_mut(), size, MEM_RESERVE | MEM_COMMIT, PAGE_READWRITE) };

    NonNull::new(addr.cast::<u8>()).ok_or_else(io::Error::last_os_error)
}

pub(super) unsafe fn unmap(ptr: NonNull<u8>, _size: usize) {
    // MEM_RELEASE requires a zero size and releases the whole reservation
    if VirtualFree(ptr.as_ptr().cast(), 0, MEM_RELEASE) == 0 {
        tracing::warn!(
            target: "page_arena",
            error = %io::Error::last_os_error(),
            "VirtualFree failed"
        );
    }
}
