use std::num::NonZero;
use std::ptr::NonNull;

use crate::RawHeap;

/// A [`RawHeap`] backed by the C runtime heap.
///
/// This is the general-purpose variant: blocks come straight from
/// `malloc`/`realloc`/`free`, bypassing whatever allocator the Rust side of the
/// process has registered. Use [`GlobalHeap`][crate::GlobalHeap] instead when
/// the registered global allocator should observe the traffic.
///
/// # Examples
///
/// ```rust
/// use std::num::NonZero;
///
/// use raw_heap::{RawHeap, SystemHeap};
///
/// let heap = SystemHeap;
/// let block = heap.allocate(NonZero::new(16).unwrap()).expect("out of memory");
///
/// // SAFETY: Freshly allocated above, valid for 16 bytes.
/// unsafe { block.as_ptr().write_bytes(0xAB, 16) };
///
/// // SAFETY: The block came from this heap and is not used again.
/// unsafe { heap.deallocate(block) };
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemHeap;

// SAFETY: malloc-family blocks satisfy every RawHeap guarantee: they are valid
// until freed, aligned to at least max_align_t (which MAX_ALIGN documents), and
// realloc preserves contents up to the smaller of the two sizes.
unsafe impl RawHeap for SystemHeap {
    fn allocate(&self, bytes: NonZero<usize>) -> Option<NonNull<u8>> {
        // SAFETY: malloc has no preconditions; a null return is mapped to None.
        NonNull::new(unsafe { libc::malloc(bytes.get()) }.cast::<u8>())
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        // SAFETY: The caller guarantees ptr came from this heap and is unused afterwards.
        unsafe { libc::free(ptr.as_ptr().cast()) };
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        new_bytes: NonZero<usize>,
    ) -> Option<NonNull<u8>> {
        // SAFETY: The caller guarantees ptr came from this heap; realloc either
        // returns a replacement block or null while leaving the original intact.
        NonNull::new(unsafe { libc::realloc(ptr.as_ptr().cast(), new_bytes.get()) }.cast::<u8>())
    }
}
