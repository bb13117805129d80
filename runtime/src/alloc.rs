//! Reference-counted allocator backing 4-D array creation.
//!
//! Contract with emitted code: byte count in RDI, usable pointer back in
//! RAX. Each block carries a 16-byte header `{refcount, size}` in front
//! of the usable region; retain/release manipulate the count and free at
//! zero.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::sync::atomic::{AtomicU64, Ordering};

const HEADER_SIZE: usize = 16;
const BLOCK_ALIGN: usize = 16;

#[repr(C)]
struct BlockHeader {
    refs: AtomicU64,
    size: u64,
}

fn layout_for(total: usize) -> Layout {
    // Total size is header + payload; both 16-aligned.
    Layout::from_size_align(total, BLOCK_ALIGN).expect("block layout")
}

/// Allocate `bytes` of zeroed, refcounted memory. Returns null when the
/// allocator fails or `bytes` overflows the header addition.
pub fn rc_alloc(bytes: u64) -> *mut u8 {
    let Some(total) = (bytes as usize).checked_add(HEADER_SIZE) else {
        return std::ptr::null_mut();
    };
    // SAFETY: layout has non-zero size (header included).
    let raw = unsafe { alloc_zeroed(layout_for(total)) };
    if raw.is_null() {
        return raw;
    }
    // SAFETY: raw points to at least HEADER_SIZE writable bytes.
    unsafe {
        let header = raw as *mut BlockHeader;
        (*header).refs = AtomicU64::new(1);
        (*header).size = bytes;
        raw.add(HEADER_SIZE)
    }
}

/// Increment a block's refcount.
///
/// # Safety
/// `ptr` must be a pointer previously returned by [`rc_alloc`] and not
/// yet freed.
pub unsafe fn rc_retain(ptr: *mut u8) {
    let header = ptr.sub(HEADER_SIZE) as *const BlockHeader;
    (*header).refs.fetch_add(1, Ordering::Relaxed);
}

/// Decrement a block's refcount, freeing it when the count hits zero.
///
/// # Safety
/// As for [`rc_retain`].
pub unsafe fn rc_release(ptr: *mut u8) {
    let raw = ptr.sub(HEADER_SIZE);
    let header = raw as *const BlockHeader;
    if (*header).refs.fetch_sub(1, Ordering::AcqRel) == 1 {
        let total = (*header).size as usize + HEADER_SIZE;
        dealloc(raw, layout_for(total));
    }
}
