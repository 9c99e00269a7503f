use std::alloc::Layout;
use std::num::NonZero;
use std::ptr::NonNull;

use crate::{MAX_ALIGN, RawHeap};

/// A [`RawHeap`] that routes through the registered Rust global allocator.
///
/// Every block carries a small private header recording its payload size,
/// because [`std::alloc`] demands the original layout when freeing while the
/// [`RawHeap`] contract frees by bare pointer. The header occupies
/// [`MAX_ALIGN`] bytes so the payload keeps the full alignment guarantee.
///
/// This is the variant to use when the process has installed a
/// `#[global_allocator]` that should observe container traffic; it is also the
/// default heap parameter of the container types built on this package.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalHeap;

/// Bytes reserved in front of every payload for the size record.
///
/// Equal to [`MAX_ALIGN`] so the payload address stays maximally aligned.
const HEADER_BYTES: usize = MAX_ALIGN;

impl GlobalHeap {
    fn layout_for(total_bytes: usize) -> Layout {
        Layout::from_size_align(total_bytes, MAX_ALIGN)
            .expect("block size rounded up past isize::MAX, which no real allocation reaches")
    }

    /// Total block size for a payload, header included.
    fn total_bytes(payload_bytes: usize) -> usize {
        payload_bytes
            .checked_add(HEADER_BYTES)
            .expect("payload size within a header of usize::MAX, which no real allocation reaches")
    }
}

// SAFETY: Blocks come from the global allocator with MAX_ALIGN alignment and are
// valid until freed; the header bookkeeping reconstructs the exact layout used
// at allocation time, and realloc preserves contents including the header.
unsafe impl RawHeap for GlobalHeap {
    fn allocate(&self, bytes: NonZero<usize>) -> Option<NonNull<u8>> {
        let total = Self::total_bytes(bytes.get());

        // SAFETY: The layout is non-zero-sized (header alone is MAX_ALIGN bytes).
        let base = NonNull::new(unsafe { std::alloc::alloc(Self::layout_for(total)) })?;

        // SAFETY: The block is at least HEADER_BYTES long and MAX_ALIGN aligned,
        // so the size record fits at its start.
        unsafe { base.cast::<usize>().write(bytes.get()) };

        // SAFETY: HEADER_BYTES is within the block we just allocated.
        Some(unsafe { base.add(HEADER_BYTES) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        // SAFETY: The caller guarantees ptr is a payload pointer from this heap,
        // so the header sits HEADER_BYTES before it.
        let base = unsafe { ptr.sub(HEADER_BYTES) };

        // SAFETY: The header was written at allocation time and is still valid.
        let payload_bytes = unsafe { base.cast::<usize>().read() };

        // SAFETY: base/layout match the original allocation exactly.
        unsafe { std::alloc::dealloc(base.as_ptr(), Self::layout_for(Self::total_bytes(payload_bytes))) };
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        new_bytes: NonZero<usize>,
    ) -> Option<NonNull<u8>> {
        // SAFETY: The caller guarantees ptr is a payload pointer from this heap.
        let base = unsafe { ptr.sub(HEADER_BYTES) };

        // SAFETY: The header was written at allocation time and is still valid.
        let old_payload_bytes = unsafe { base.cast::<usize>().read() };

        let old_layout = Self::layout_for(Self::total_bytes(old_payload_bytes));
        let new_total = Self::total_bytes(new_bytes.get());

        // SAFETY: base/old_layout match the original allocation; new_total is
        // non-zero. On failure the original block is left intact, which is what
        // the RawHeap contract requires.
        let new_base =
            NonNull::new(unsafe { std::alloc::realloc(base.as_ptr(), old_layout, new_total) })?;

        // SAFETY: The resized block starts with the (relocated) header slot.
        unsafe { new_base.cast::<usize>().write(new_bytes.get()) };

        // SAFETY: HEADER_BYTES is within the resized block.
        Some(unsafe { new_base.add(HEADER_BYTES) })
    }
}
