use crate::{HostClass, HostScalar, HostValue};

/// A [`HostValue`] over a native slice with explicit dimensions.
///
/// This is the bridge for in-process buffers: anything already shaped as a
/// Rust slice can be presented to the check functions, or wrapped by a
/// container's adoption constructor, without copying.
///
/// # Examples
///
/// ```rust
/// use host_shape::{HostArray, check_vector, check_matrix};
///
/// let data = [1_i32, 2, 3, 4, 5, 6];
///
/// assert!(check_vector::<i32, _>(Some(&HostArray::column(&data))));
/// assert!(check_matrix::<i32, _>(Some(&HostArray::with_dims(&data, 2, 3))));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct HostArray<'a, T: HostScalar> {
    data: &'a [T],
    dims: [usize; 2],
}

impl<'a, T: HostScalar> HostArray<'a, T> {
    /// Presents `data` as a column: `data.len()` rows of one element each.
    #[must_use]
    pub fn column(data: &'a [T]) -> Self {
        Self {
            data,
            dims: [data.len(), usize::from(!data.is_empty())],
        }
    }

    /// Presents `data` as a single row.
    #[must_use]
    pub fn row(data: &'a [T]) -> Self {
        Self {
            data,
            dims: [usize::from(!data.is_empty()), data.len()],
        }
    }

    /// Presents `data` as a `rows` by `cols` value, rows stored contiguously.
    ///
    /// # Panics
    ///
    /// Panics if `rows * cols` does not equal `data.len()`.
    #[must_use]
    pub fn with_dims(data: &'a [T], rows: usize, cols: usize) -> Self {
        assert_eq!(
            rows.checked_mul(cols)
                .expect("dimension product overflows usize"),
            data.len(),
            "dimensions must account for every element of the slice"
        );

        Self {
            data,
            dims: [rows, cols],
        }
    }

    /// The wrapped slice.
    #[must_use]
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }
}

// SAFETY: The payload is the wrapped slice: element_count initialized values
// of T, whose class T::CLASS reports by the HostScalar contract. The dims are
// checked against the slice length at construction and never change.
unsafe impl<T: HostScalar> HostValue for HostArray<'_, T> {
    fn class(&self) -> HostClass {
        T::CLASS
    }

    fn dims(&self) -> &[usize] {
        &self.dims
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn data_ptr(&self) -> *const u8 {
        self.data.as_ptr().cast()
    }

    fn cell(&self, _index: usize) -> Option<&dyn HostValue> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element_count;

    #[test]
    fn column_and_row_report_unit_extents() {
        let data = [1_u16, 2, 3];

        assert_eq!(HostArray::column(&data).dims(), &[3, 1]);
        assert_eq!(HostArray::row(&data).dims(), &[1, 3]);
    }

    #[test]
    fn empty_slice_reports_zero_extents() {
        let value = HostArray::<f32>::column(&[]);

        assert_eq!(value.dims(), &[0, 0]);
        assert!(value.is_empty());
        assert_eq!(element_count(Some(&value)), 0);
    }

    #[test]
    fn payload_pointer_is_the_slice() {
        let data = [7_i64, 8];
        let value = HostArray::column(&data);

        assert_eq!(value.data_ptr(), data.as_ptr().cast());
        assert_eq!(value.as_slice(), &data);
    }

    #[test]
    #[should_panic(expected = "dimensions must account for every element")]
    fn mismatched_dims_panic() {
        let data = [1_u8, 2, 3];

        drop(HostArray::with_dims(&data, 2, 2));
    }

    #[test]
    fn cell_access_is_absent() {
        let data = [1.0_f64];
        let value = HostArray::column(&data);

        assert!(value.cell(0).is_none());
    }

    static_assertions::assert_impl_all!(HostArray<'static, f64>: Send, Sync, Copy);
}
