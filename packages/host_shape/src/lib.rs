//! Shape and element-kind classification for opaque host-runtime values.
//!
//! Container packages that can wrap externally supplied buffers need to answer
//! two questions before trusting one: *is this value the kind and shape my
//! element type expects* and *how many elements does it hold*. This package
//! answers both without allocating or touching any global state.
//!
//! The pieces:
//!
//! - [`HostValue`] is the capability trait an opaque host value implements:
//!   it reports its element kind ([`HostClass`]), its dimension extents, and
//!   a pointer to its payload.
//! - [`HostScalar`] maps native scalar types (`i8` through `u64`, `f32`,
//!   `f64`) to the [`HostClass`] a matching host value must report.
//! - The check functions ([`check_scalar`], [`check_vector`],
//!   [`check_matrix`], [`check_nested_vector`]) validate a value against an
//!   expected element type. An absent or empty value is vacuously valid, so
//!   callers can treat "nothing supplied" as "zero elements" without a
//!   separate code path.
//! - [`element_count`] and [`extent`] report sizes, again yielding zero for
//!   absent or empty values.
//! - [`HostArray`] is a ready-made [`HostValue`] over a native slice, for
//!   callers bridging in-process buffers and for tests.
//!
//! # Examples
//!
//! ```rust
//! use host_shape::{HostArray, check_vector, check_matrix, element_count};
//!
//! let samples = [1.0_f64, 2.0, 3.0];
//! let value = HostArray::column(&samples);
//!
//! assert!(check_vector::<f64, _>(Some(&value)));
//! assert!(!check_vector::<i32, _>(Some(&value)));
//! assert_eq!(element_count(Some(&value)), 3);
//!
//! // A column is also a (3 x 1) matrix.
//! assert!(check_matrix::<f64, _>(Some(&value)));
//!
//! // Absent values are vacuously valid and empty.
//! assert!(check_vector::<f64, HostArray<'_, f64>>(None));
//! assert_eq!(element_count::<HostArray<'_, f64>>(None), 0);
//! ```

mod array;
mod class;
mod value;

pub use array::HostArray;
pub use class::{HostClass, HostScalar, is_scalar_class};
pub use value::{
    HostValue, check_matrix, check_nested_vector, check_scalar, check_vector, element_count,
    extent,
};
