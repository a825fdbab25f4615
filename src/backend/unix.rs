//! Anonymous private mappings

use core::ptr::{self, NonNull};
use std::io;

pub(super) fn map(size: usize) -> io::Result<NonNull<u8>> {
    // Anonymous mappings are zero-filled by the kernel
    let addr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if addr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }

    NonNull::new(addr.cast::<u8>()).ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))
}

pub(super) unsafe fn unmap(ptr: NonNull<u8>, size: usize) {
    if libc::munmap(ptr.as_ptr().cast(), size) != 0 {
        tracing::warn!(
            target: "page_arena",
            error = %io::Error::last_os_error(),
            size,
            "munmap failed"
        );
    }
}
