//! A quota-metered row-major 2-D buffer over an injectable raw heap.
//!
//! [`MeteredGrid`] is the two-dimensional sibling of
//! [`metered_vec::MeteredVec`]: one contiguous block holding `rows * cols`
//! elements row by row, charged against the same shared
//! [`mem_quota::MemoryQuota`] ledger and carrying the same owned-versus-
//! borrowed storage distinction.
//!
//! Two growth regimes coexist:
//!
//! - [`reserve()`](MeteredGrid::reserve) and full
//!   [`resize()`](MeteredGrid::resize) treat the grid as a block of elements
//!   and **discard existing contents** when they reallocate - the layout of a
//!   reshaped grid has nothing in common with the old one.
//! - [`reserve_rows()`](MeteredGrid::reserve_rows),
//!   [`push_row()`](MeteredGrid::push_row) and friends grow by whole rows
//!   with the column count fixed, **preserving contents**, along a dedicated
//!   row ladder.
//!
//! Rows are handed out as plain slices ([`row()`](MeteredGrid::row),
//! [`row_mut()`](MeteredGrid::row_mut)), so the borrow checker retires a row
//! handle before the next mutating call can invalidate it.
//!
//! # Examples
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use mem_quota::MemoryQuota;
//! use metered_grid::MeteredGrid;
//!
//! let quota = Rc::new(MemoryQuota::new());
//!
//! let mut grid = MeteredGrid::with_dims(Rc::clone(&quota), 0, 3)?;
//! grid.push_row(&[1_i32, 2, 3])?;
//! grid.push_row(&[4, 5, 6])?;
//!
//! assert_eq!(grid.rows(), 2);
//! assert_eq!(grid.row(1), &[4, 5, 6]);
//! assert_eq!(grid[(0, 2)], 3);
//! # Ok::<(), metered_grid::Error>(())
//! ```

mod grid;

pub use grid::MeteredGrid;
// The containers share one error taxonomy and one storage-tenure notion.
pub use metered_vec::{Error, Result, Tenure};
