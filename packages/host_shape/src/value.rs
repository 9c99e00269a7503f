use crate::{HostClass, HostScalar};

/// An opaque value handed over by the host runtime.
///
/// The trait is the read-only surface the check and size functions need: the
/// element kind, the dimension extents, and a pointer to the payload. Values
/// with [`HostClass::Cell`] additionally expose their elements, which are
/// themselves host values.
///
/// # Safety
///
/// Implementations guarantee that while the value is borrowed:
///
/// - [`data_ptr()`][Self::data_ptr] points to [`element_count()`][element_count]
///   contiguous, initialized elements of the kind [`class()`][Self::class]
///   reports (it may be null only when the value is empty);
/// - [`dims()`][Self::dims] and [`class()`][Self::class] are stable and
///   consistent with the payload;
/// - [`cell()`][Self::cell] returns `Some` only for in-range indices of a
///   [`HostClass::Cell`] value.
///
/// Container code upholds its own memory safety on the strength of these
/// guarantees when it wraps the payload without copying.
pub unsafe trait HostValue {
    /// The element kind of the payload.
    fn class(&self) -> HostClass;

    /// The dimension extents, outermost first.
    fn dims(&self) -> &[usize];

    /// Whether the value holds no elements.
    fn is_empty(&self) -> bool;

    /// The payload pointer; null only when the value is empty.
    fn data_ptr(&self) -> *const u8;

    /// The element at `index` of a [`HostClass::Cell`] value.
    ///
    /// Returns `None` for out-of-range indices, for non-cell values, and for
    /// cell slots the host left unset.
    fn cell(&self, index: usize) -> Option<&dyn HostValue>;
}

/// Whether `value` can supply a single scalar of type `T`.
///
/// Absent and empty values are vacuously valid; otherwise only the element
/// kind is checked, so a multi-element value of the right kind passes and the
/// caller decides which element to take.
#[must_use]
pub fn check_scalar<T: HostScalar, V: HostValue + ?Sized>(value: Option<&V>) -> bool {
    let Some(value) = value else { return true };

    value.is_empty() || value.class() == T::CLASS
}

/// Whether `value` is a one-dimensional run of `T`: a two-dimensional value
/// with a unit extent on one side and a matching element kind.
///
/// Absent and empty values are vacuously valid.
#[must_use]
pub fn check_vector<T: HostScalar, V: HostValue + ?Sized>(value: Option<&V>) -> bool {
    let Some(value) = value else { return true };

    if value.is_empty() {
        return true;
    }

    let dims = value.dims();

    dims.len() == 2 && (dims[0] == 1 || dims[1] == 1) && value.class() == T::CLASS
}

/// Whether `value` is a two-dimensional run of `T` of any shape.
///
/// Absent and empty values are vacuously valid.
#[must_use]
pub fn check_matrix<T: HostScalar, V: HostValue + ?Sized>(value: Option<&V>) -> bool {
    let Some(value) = value else { return true };

    value.is_empty() || (value.dims().len() == 2 && value.class() == T::CLASS)
}

/// Whether `value` is a cell value whose every element passes
/// [`check_vector`] for `T`.
///
/// Absent and empty values are vacuously valid, as are unset cell slots; a
/// non-empty value of any other kind is invalid.
#[must_use]
pub fn check_nested_vector<T: HostScalar, V: HostValue + ?Sized>(value: Option<&V>) -> bool {
    let Some(value) = value else { return true };

    if value.is_empty() {
        return true;
    }

    if value.class() != HostClass::Cell {
        return false;
    }

    (0..element_count(Some(value))).all(|i| check_vector::<T, dyn HostValue>(value.cell(i)))
}

/// The number of elements `value` holds; zero for absent or empty values.
///
/// For cell values this counts cells, not the elements inside them.
#[must_use]
pub fn element_count<V: HostValue + ?Sized>(value: Option<&V>) -> usize {
    let Some(value) = value else { return 0 };

    if value.is_empty() {
        return 0;
    }

    value.dims().iter().product()
}

/// The extent of `value` along `dimension`; zero for absent or empty values
/// and for any `dimension` past the second.
///
/// The value is assumed to have already passed [`check_matrix`]; the result
/// for other shapes is unspecified (but never undefined behavior).
#[must_use]
pub fn extent<V: HostValue + ?Sized>(value: Option<&V>, dimension: usize) -> usize {
    let Some(value) = value else { return 0 };

    if value.is_empty() || dimension >= 2 {
        return 0;
    }

    value.dims().get(dimension).copied().unwrap_or(0)
}
