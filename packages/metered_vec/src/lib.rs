//! A quota-metered growable buffer over an injectable raw heap.
//!
//! [`MeteredVec`] is a contiguous 1-D container with two distinguishing habits:
//!
//! - **Every allocation is accounted.** The container charges a shared
//!   [`mem_quota::MemoryQuota`] ledger before touching the heap and hands the
//!   charge back if the heap refuses, so a failed growth leaves both the
//!   container and the ledger exactly as they were.
//! - **Storage is owned or borrowed.** An owned container manages its block
//!   through a [`raw_heap::RawHeap`]; a borrowed one wraps storage somebody
//!   else controls (typically a host-runtime value) and refuses every
//!   operation that would reallocate, free or abandon that storage.
//!
//! A third habit follows from the first two: every slot up to `capacity()` is
//! kept initialized. Growth default-constructs the new slots, [`clear()`][
//! MeteredVec::clear] only moves the length fence, and destructors for vacated
//! slots run at [`trim()`][MeteredVec::trim] or drop. This is why the growth
//! paths ask for `T: Default`.
//!
//! # Examples
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use mem_quota::MemoryQuota;
//! use metered_vec::MeteredVec;
//!
//! let quota = Rc::new(MemoryQuota::new());
//!
//! let mut values = MeteredVec::new(Rc::clone(&quota));
//! for i in 0..10_u64 {
//!     values.push(i)?;
//! }
//!
//! assert_eq!(values.len(), 10);
//! assert_eq!(quota.used_bytes(), values.capacity() * size_of::<u64>());
//!
//! values.trim()?;
//! assert_eq!(values.capacity(), 10);
//! assert_eq!(quota.used_bytes(), 10 * size_of::<u64>());
//! # Ok::<(), metered_vec::Error>(())
//! ```

mod error;
mod tenure;
mod vec;

pub use error::{Error, Result};
pub use tenure::Tenure;
pub use vec::MeteredVec;
