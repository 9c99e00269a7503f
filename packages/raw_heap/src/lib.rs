//! Injectable raw heap capability for containers that manage their own storage.
//!
//! This package defines [`RawHeap`], a minimal allocator interface expressed over
//! plain byte counts, plus two interchangeable implementations:
//!
//! - [`SystemHeap`] - delegates to the C runtime heap (`malloc`/`realloc`/`free`).
//! - [`GlobalHeap`] - routes through the registered Rust global allocator, so a
//!   `#[global_allocator]` (a tracking allocator, for example) observes every block.
//!
//! Unlike [`std::alloc::GlobalAlloc`], a [`RawHeap`] frees and reallocates by bare
//! pointer without being handed the original layout, which is what container code
//! that only remembers a pointer actually needs.
//!
//! # Examples
//!
//! ```rust
//! use std::num::NonZero;
//!
//! use raw_heap::{RawHeap, SystemHeap};
//!
//! let heap = SystemHeap;
//!
//! let block = heap.allocate(NonZero::new(64).unwrap()).expect("out of memory");
//!
//! // SAFETY: The block was just allocated from this heap and is not used afterwards.
//! unsafe { heap.deallocate(block) };
//! ```

mod global;
mod system;

pub use global::GlobalHeap;
pub use system::SystemHeap;

use std::num::NonZero;
use std::ptr::NonNull;

/// The alignment every [`RawHeap`] implementation guarantees for its blocks.
///
/// This is the classic `malloc` promise: sufficient for every fundamental type.
/// Callers placing types with stricter alignment requirements must not use a
/// [`RawHeap`] for them.
pub const MAX_ALIGN: usize = 16;

/// A heap that hands out raw byte blocks, identified by bare pointers.
///
/// Implementations are expected to be cheap to copy (typically zero-sized) so
/// container types can embed one by value.
///
/// # Safety
///
/// Implementations must guarantee that every pointer returned by
/// [`allocate()`](Self::allocate) or [`reallocate()`](Self::reallocate):
///
/// - refers to a block of at least the requested number of bytes,
/// - is aligned to at least [`MAX_ALIGN`],
/// - remains valid until passed to [`deallocate()`](Self::deallocate) or
///   [`reallocate()`](Self::reallocate) on the same heap,
/// - after `reallocate`, preserves the block contents up to the minimum of the
///   old and new sizes.
pub unsafe trait RawHeap {
    /// Allocates a block of at least `bytes` bytes.
    ///
    /// Returns `None` if the underlying heap is exhausted.
    fn allocate(&self, bytes: NonZero<usize>) -> Option<NonNull<u8>>;

    /// Releases a block previously obtained from this heap.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate()`](Self::allocate) or
    /// [`reallocate()`](Self::reallocate) on this heap and must not be used
    /// again after this call.
    unsafe fn deallocate(&self, ptr: NonNull<u8>);

    /// Resizes a block previously obtained from this heap, preserving contents
    /// up to the minimum of the old and new sizes.
    ///
    /// Returns `None` if the underlying heap is exhausted, in which case the
    /// original block remains valid and unchanged.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate()`](Self::allocate) or
    /// [`reallocate()`](Self::reallocate) on this heap. On success the original
    /// pointer must not be used again; the returned pointer replaces it.
    unsafe fn reallocate(&self, ptr: NonNull<u8>, new_bytes: NonZero<usize>)
    -> Option<NonNull<u8>>;
}
