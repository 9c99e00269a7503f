use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::num::NonZero;
use std::ops::{Index, IndexMut};
use std::ptr::{self, NonNull};
use std::rc::Rc;
use std::slice;

use host_shape::{HostScalar, HostValue, check_matrix, extent};
use mem_quota::MemoryQuota;
use raw_heap::{GlobalHeap, MAX_ALIGN, RawHeap};

use crate::{Error, Result, Tenure};

/// A quota-metered row-major 2-D buffer of `T` over the heap capability `A`.
///
/// One contiguous block holds `rows() * cols()` elements row by row, with up
/// to `capacity()` initialized slots behind them. The storage rules are the
/// ones of [`metered_vec::MeteredVec`]: owned storage is charged to the
/// shared [`MemoryQuota`] ledger and kept fully initialized; borrowed storage
/// permits element access but refuses every reallocation, free or ownership
/// change with [`Error::ExternalMemoryViolation`].
///
/// Whole-block growth ([`reserve()`](Self::reserve), a growing
/// [`resize()`](Self::resize)) discards contents; whole-row growth
/// ([`reserve_rows()`](Self::reserve_rows), [`push_row()`](Self::push_row))
/// preserves them.
pub struct MeteredGrid<T, A: RawHeap = GlobalHeap> {
    tenure: Tenure,

    /// Start of the storage block; `None` exactly when `capacity == 0`.
    ptr: Option<NonNull<T>>,

    rows: usize,

    cols: usize,

    /// Number of initialized element slots; `rows * cols <= capacity`.
    capacity: usize,

    quota: Rc<MemoryQuota>,

    alloc: A,

    /// The container logically owns instances of `T`.
    _marker: PhantomData<T>,
}

impl<T> MeteredGrid<T, GlobalHeap> {
    /// Creates an empty grid on the default heap.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or requires alignment above [`MAX_ALIGN`].
    #[must_use]
    pub fn new(quota: Rc<MemoryQuota>) -> Self {
        Self::new_in(quota, GlobalHeap)
    }

    /// Creates a `rows` by `cols` grid of default-constructed elements.
    ///
    /// A zero-element shape (such as `0 x 3`) allocates nothing but keeps the
    /// column count, which is what [`push_row()`](Self::push_row) needs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryExhausted`] if the quota or the heap refuses.
    pub fn with_dims(quota: Rc<MemoryQuota>, rows: usize, cols: usize) -> Result<Self>
    where
        T: Default,
    {
        Self::with_dims_in(quota, rows, cols, GlobalHeap)
    }

    /// Creates a `rows` by `cols` grid filled with clones of `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryExhausted`] if the quota or the heap refuses.
    pub fn with_fill(quota: Rc<MemoryQuota>, rows: usize, cols: usize, value: &T) -> Result<Self>
    where
        T: Clone,
    {
        Self::with_fill_in(quota, rows, cols, value, GlobalHeap)
    }

    /// Wraps existing row-major storage without copying or charging the
    /// quota; see [`MeteredVec::from_raw_parts`] for the ownership split.
    ///
    /// [`MeteredVec::from_raw_parts`]: metered_vec::MeteredVec::from_raw_parts
    ///
    /// # Safety
    ///
    /// `ptr` must point to `rows * cols` initialized elements of `T`, valid
    /// for reads and writes for the life of the grid. If `self_manage` is
    /// true the block must have come from [`GlobalHeap`] and nothing else may
    /// free it; if false the caller keeps it alive for as long as the view is
    /// used.
    pub unsafe fn from_raw_parts(
        quota: Rc<MemoryQuota>,
        ptr: NonNull<T>,
        rows: usize,
        cols: usize,
        self_manage: bool,
    ) -> Self {
        // SAFETY: Contract forwarded to the caller.
        unsafe { Self::from_raw_parts_in(quota, ptr, rows, cols, self_manage, GlobalHeap) }
    }

    /// Wraps the payload of a validated host value as a borrowed view, with
    /// the shape taken from the value's extents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the value is not a 2-D run of `T`
    /// under [`host_shape::check_matrix`].
    ///
    /// # Safety
    ///
    /// The host payload must remain valid, and must not be written through
    /// any other path, for as long as the returned grid is used.
    pub unsafe fn adopt_host<V>(quota: Rc<MemoryQuota>, value: &V) -> Result<Self>
    where
        T: HostScalar,
        V: HostValue + ?Sized,
    {
        if !check_matrix::<T, V>(Some(value)) {
            return Err(Error::InvalidInput);
        }

        let rows = extent(Some(value), 0);
        let cols = extent(Some(value), 1);
        let mut wrapped = Self::new(quota);

        if rows > 0 && cols > 0 {
            let payload = NonNull::new(value.data_ptr().cast::<T>().cast_mut())
                .expect("a non-empty host value reports a non-null payload pointer");

            // SAFETY: The HostValue contract guarantees rows * cols
            // initialized elements of the class T reports; the caller keeps
            // the payload alive and unaliased per our own contract.
            unsafe { wrapped.adopt_raw(payload, rows, cols, false) };
        }

        Ok(wrapped)
    }
}

impl<T, A: RawHeap> MeteredGrid<T, A> {
    /// Creates an empty grid on the given heap.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or requires alignment above [`MAX_ALIGN`].
    #[must_use]
    pub fn new_in(quota: Rc<MemoryQuota>, alloc: A) -> Self {
        assert!(
            size_of::<T>() != 0,
            "zero-sized element types have no bytes to meter and cannot be stored"
        );
        assert!(
            align_of::<T>() <= MAX_ALIGN,
            "element alignment exceeds the alignment the heap guarantees"
        );

        Self {
            tenure: Tenure::Owned,
            ptr: None,
            rows: 0,
            cols: 0,
            capacity: 0,
            quota,
            alloc,
            _marker: PhantomData,
        }
    }

    /// Creates a `rows` by `cols` grid of default-constructed elements on the
    /// given heap.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryExhausted`] if the quota or the heap refuses.
    pub fn with_dims_in(quota: Rc<MemoryQuota>, rows: usize, cols: usize, alloc: A) -> Result<Self>
    where
        T: Default,
    {
        Self::filled_in(quota, rows, cols, alloc, |_| T::default())
    }

    /// Creates a `rows` by `cols` grid filled with clones of `value` on the
    /// given heap.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryExhausted`] if the quota or the heap refuses.
    pub fn with_fill_in(
        quota: Rc<MemoryQuota>,
        rows: usize,
        cols: usize,
        value: &T,
        alloc: A,
    ) -> Result<Self>
    where
        T: Clone,
    {
        Self::filled_in(quota, rows, cols, alloc, |_| value.clone())
    }

    /// See [`MeteredGrid::from_raw_parts`].
    ///
    /// # Safety
    ///
    /// As for [`MeteredGrid::from_raw_parts`], with the block originating
    /// from `alloc` when `self_manage` is true.
    pub unsafe fn from_raw_parts_in(
        quota: Rc<MemoryQuota>,
        ptr: NonNull<T>,
        rows: usize,
        cols: usize,
        self_manage: bool,
        alloc: A,
    ) -> Self {
        let mut wrapped = Self::new_in(quota, alloc);

        // SAFETY: Contract forwarded to the caller.
        unsafe { wrapped.adopt_raw(ptr, rows, cols, self_manage) };

        wrapped
    }

    /// Replaces the grid's storage with existing external storage, freeing
    /// whatever it held before. No copying, no quota charge.
    ///
    /// A zero-element shape keeps the dimensions but wraps no storage.
    ///
    /// # Safety
    ///
    /// As for [`MeteredGrid::from_raw_parts`].
    pub unsafe fn adopt_raw(&mut self, ptr: NonNull<T>, rows: usize, cols: usize, self_manage: bool) {
        self.free_storage();

        self.rows = rows;
        self.cols = cols;

        let elements = rows.wrapping_mul(cols);
        if elements > 0 {
            self.ptr = Some(ptr);
            self.capacity = elements;
            self.tenure = if self_manage {
                Tenure::Owned
            } else {
                Tenure::Borrowed
            };
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of initialized element slots the storage holds.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the grid holds no elements (it may still hold capacity).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.element_len() == 0
    }

    /// Whether the grid holds no storage at all.
    #[must_use]
    pub fn is_unallocated(&self) -> bool {
        self.ptr.is_none()
    }

    /// Whether the storage is borrowed from someone else.
    #[must_use]
    pub fn is_borrowed(&self) -> bool {
        self.tenure == Tenure::Borrowed
    }

    /// The ledger this grid charges.
    #[must_use]
    pub fn quota(&self) -> &Rc<MemoryQuota> {
        &self.quota
    }

    /// All elements in row-major order.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        match self.ptr {
            // SAFETY: Slots [0, rows * cols) are initialized and live while
            // &self is.
            Some(block) => unsafe { slice::from_raw_parts(block.as_ptr(), self.element_len()) },
            None => &[],
        }
    }

    /// All elements in row-major order, mutably.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.element_len();
        match self.ptr {
            // SAFETY: Slots [0, rows * cols) are initialized and exclusively
            // ours while &mut self is live.
            Some(block) => unsafe { slice::from_raw_parts_mut(block.as_ptr(), len) },
            None => &mut [],
        }
    }

    /// Iterates over the elements in row-major order.
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Iterates over the elements in row-major order, mutably.
    pub fn iter_mut(&mut self) -> slice::IterMut<'_, T> {
        self.as_mut_slice().iter_mut()
    }

    /// The row at `index` as a slice.
    ///
    /// # Panics
    ///
    /// Panics if `index >= rows()`.
    #[must_use]
    pub fn row(&self, index: usize) -> &[T] {
        assert!(
            index < self.rows,
            "row {index} is out of bounds of a grid with {rows} rows",
            rows = self.rows
        );

        &self.as_slice()[index * self.cols..(index + 1) * self.cols]
    }

    /// The row at `index` as a mutable slice.
    ///
    /// # Panics
    ///
    /// Panics if `index >= rows()`.
    #[must_use]
    pub fn row_mut(&mut self, index: usize) -> &mut [T] {
        assert!(
            index < self.rows,
            "row {index} is out of bounds of a grid with {rows} rows",
            rows = self.rows
        );

        let cols = self.cols;
        &mut self.as_mut_slice()[index * cols..(index + 1) * cols]
    }

    /// The final row, if any.
    #[must_use]
    pub fn last_row(&self) -> Option<&[T]> {
        if self.rows == 0 {
            None
        } else {
            Some(self.row(self.rows - 1))
        }
    }

    /// The final row, mutably, if any.
    #[must_use]
    pub fn last_row_mut(&mut self) -> Option<&mut [T]> {
        if self.rows == 0 {
            None
        } else {
            Some(self.row_mut(self.rows - 1))
        }
    }

    /// The element at `(row, col)`, if in bounds.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if row < self.rows && col < self.cols {
            self.as_slice().get(row * self.cols + col)
        } else {
            None
        }
    }

    /// The element at `(row, col)`, mutably, if in bounds.
    #[must_use]
    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut T> {
        if row < self.rows && col < self.cols {
            let position = row * self.cols + col;
            self.as_mut_slice().get_mut(position)
        } else {
            None
        }
    }

    /// Ensures the capacity is at least `capacity` element slots,
    /// **discarding all contents and dimensions** if it reallocates: the
    /// fresh block is wholly default-constructed and the shape resets to
    /// `0 x 0`. Smaller requests are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] on borrowed storage or
    /// [`Error::MemoryExhausted`] if the quota or heap refuses.
    pub fn reserve(&mut self, capacity: usize) -> Result<()>
    where
        T: Default,
    {
        if self.is_borrowed() {
            return Err(Error::ExternalMemoryViolation);
        }

        if capacity > self.capacity {
            self.free_storage();

            let block = Self::allocate_block(&self.quota, &self.alloc, capacity)?;
            for i in 0..capacity {
                // SAFETY: Slot i is within the fresh block and not yet
                // initialized.
                unsafe { block.add(i).write(T::default()) };
            }
            self.ptr = Some(block);
            self.capacity = capacity;
        }
        Ok(())
    }

    /// Reshapes the grid to `rows` by `cols`, **discarding contents** if the
    /// element count outgrows the capacity (see [`reserve()`](Self::reserve)).
    /// Within capacity the block is merely reinterpreted: elements keep their
    /// row-major positions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] on borrowed storage (any
    /// resize) or [`Error::MemoryExhausted`] if the quota or heap refuses.
    pub fn resize(&mut self, rows: usize, cols: usize) -> Result<()>
    where
        T: Default,
    {
        if self.is_borrowed() {
            return Err(Error::ExternalMemoryViolation);
        }

        let elements = rows.checked_mul(cols).ok_or(Error::MemoryExhausted)?;
        if elements > self.capacity {
            self.reserve(elements)?;
        }

        self.rows = rows;
        self.cols = cols;
        Ok(())
    }

    /// [`resize()`](Self::resize), then assigns clones of `value` into the
    /// linear range the resize exposed (slots past the old `rows * cols`).
    ///
    /// # Errors
    ///
    /// As for [`resize()`](Self::resize).
    pub fn resize_fill(&mut self, rows: usize, cols: usize, value: &T) -> Result<()>
    where
        T: Clone + Default,
    {
        let prev = self.element_len();
        self.resize(rows, cols)?;

        let new = self.element_len();
        for slot in &mut self.as_mut_slice()[prev.min(new)..] {
            *slot = value.clone();
        }
        Ok(())
    }

    /// Grows the storage to hold `n_rows` whole rows at the current column
    /// count, **preserving contents** and default-constructing the new tail.
    /// Smaller requests are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] on borrowed storage or
    /// [`Error::MemoryExhausted`] if the quota or heap refuses.
    pub fn reserve_rows(&mut self, n_rows: usize) -> Result<()>
    where
        T: Default,
    {
        if self.is_borrowed() {
            return Err(Error::ExternalMemoryViolation);
        }

        let new_capacity = n_rows.checked_mul(self.cols).ok_or(Error::MemoryExhausted)?;
        if new_capacity <= self.capacity {
            return Ok(());
        }

        let total_bytes = new_capacity
            .checked_mul(size_of::<T>())
            .ok_or(Error::MemoryExhausted)?;

        // Cannot overflow because these bytes back a live allocation.
        let current_bytes = self.capacity.wrapping_mul(size_of::<T>());

        // Cannot underflow because new_capacity > capacity.
        let extra_bytes = total_bytes.wrapping_sub(current_bytes);

        if self.quota.charge(extra_bytes).is_err() {
            return Err(Error::MemoryExhausted);
        }

        let total_bytes = NonZero::new(total_bytes)
            .expect("new capacity is nonzero and T is not zero-sized, so the byte count is nonzero");

        let block = match self.ptr {
            // SAFETY: The block came from self.alloc; on failure it stays
            // valid, so handing the charge back restores the exact prior state.
            Some(block) => unsafe { self.alloc.reallocate(block.cast(), total_bytes) },
            None => self.alloc.allocate(total_bytes),
        };

        let Some(block) = block else {
            self.quota.release(extra_bytes);
            return Err(Error::MemoryExhausted);
        };

        let block = block.cast::<T>();
        for i in self.capacity..new_capacity {
            // SAFETY: Slot i is within the resized block and not yet
            // initialized (reallocation preserved only the old capacity).
            unsafe { block.add(i).write(T::default()) };
        }

        self.ptr = Some(block);
        self.capacity = new_capacity;
        Ok(())
    }

    /// Sets the row count to `n_rows`, growing by whole rows (contents
    /// preserved) if the element count outgrows the capacity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] on borrowed storage (any
    /// row resize) or [`Error::MemoryExhausted`] if the quota or heap
    /// refuses.
    pub fn resize_rows(&mut self, n_rows: usize) -> Result<()>
    where
        T: Default,
    {
        if self.is_borrowed() {
            return Err(Error::ExternalMemoryViolation);
        }

        let elements = n_rows.checked_mul(self.cols).ok_or(Error::MemoryExhausted)?;
        if elements > self.capacity {
            self.reserve_rows(n_rows)?;
        }

        self.rows = n_rows;
        Ok(())
    }

    /// [`resize_rows()`](Self::resize_rows), then assigns a copy of `row`
    /// into every newly exposed row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConstViewViolation`] - before any mutation - if
    /// `row.len() != cols()`; otherwise as for
    /// [`resize_rows()`](Self::resize_rows).
    pub fn resize_rows_fill(&mut self, n_rows: usize, row: &[T]) -> Result<()>
    where
        T: Clone + Default,
    {
        if row.len() != self.cols {
            return Err(Error::ConstViewViolation);
        }

        let prev_rows = self.rows;
        self.resize_rows(n_rows)?;

        for index in prev_rows.min(n_rows)..n_rows {
            self.row_mut(index).clone_from_slice(row);
        }
        Ok(())
    }

    /// Appends `row` as the new last row, growing the storage along the row
    /// ladder when full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConstViewViolation`] - before any mutation - if
    /// `row.len() != cols()`; [`Error::ExternalMemoryViolation`] if growth is
    /// needed on borrowed storage; [`Error::MemoryExhausted`] if the quota or
    /// heap refuses. Appending into spare row capacity never reallocates.
    pub fn push_row(&mut self, row: &[T]) -> Result<()>
    where
        T: Clone + Default,
    {
        if row.len() != self.cols {
            return Err(Error::ConstViewViolation);
        }

        let needed = self
            .rows
            .checked_add(1)
            .and_then(|rows| rows.checked_mul(self.cols))
            .ok_or(Error::MemoryExhausted)?;

        if needed > self.capacity {
            let target = self.row_ladder(self.rows.max(1), needed)?;
            self.reserve_rows(target)?;
        }

        // Cannot overflow because the capacity accommodates the new row.
        self.rows = self.rows.wrapping_add(1);

        if self.cols > 0 {
            self.row_mut(self.rows - 1).clone_from_slice(row);
        }
        Ok(())
    }

    /// Extends the grid by `additional` default-valued rows, running the row
    /// ladder from the current whole-row capacity when growth is needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] if growth is needed on
    /// borrowed storage, or [`Error::MemoryExhausted`] if the quota or heap
    /// refuses.
    pub fn grow_rows(&mut self, additional: usize) -> Result<()>
    where
        T: Default,
    {
        let new_rows = self
            .rows
            .checked_add(additional)
            .ok_or(Error::MemoryExhausted)?;
        let needed = new_rows.checked_mul(self.cols).ok_or(Error::MemoryExhausted)?;

        if needed > self.capacity {
            // needed > 0 implies cols > 0 here.
            let whole_rows = self.capacity / self.cols;
            let target = self.row_ladder(whole_rows.max(1), needed)?;
            self.reserve_rows(target)?;
        }

        self.rows = new_rows;
        Ok(())
    }

    /// Assigns a copy of `items` over the elements starting at `(row, col)`
    /// in linear row-major order, never changing the shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConstViewViolation`] if the copy would reach past the
    /// final element.
    pub fn copy_from_slice_at(&mut self, row: usize, col: usize, items: &[T]) -> Result<()>
    where
        T: Clone,
    {
        let position = row
            .checked_mul(self.cols)
            .and_then(|offset| offset.checked_add(col))
            .ok_or(Error::ConstViewViolation)?;
        let end = position
            .checked_add(items.len())
            .ok_or(Error::ConstViewViolation)?;

        if end > self.element_len() {
            return Err(Error::ConstViewViolation);
        }

        self.as_mut_slice()[position..end].clone_from_slice(items);
        Ok(())
    }

    /// Copies the contents and shape of `other` into this grid.
    ///
    /// Owned storage is reused when the capacity suffices and replaced by an
    /// exact-sized block otherwise. Borrowed storage accepts the copy only
    /// when the element counts match, in which case the shape is
    /// reinterpreted in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] for a count-changing copy
    /// into borrowed storage, or [`Error::MemoryExhausted`] if the
    /// replacement block cannot be obtained.
    pub fn assign(&mut self, other: &Self) -> Result<()>
    where
        T: Clone,
    {
        let src_count = other.element_len();

        if self.is_borrowed() {
            if src_count != self.element_len() {
                return Err(Error::ExternalMemoryViolation);
            }
            self.storage_mut()[..src_count].clone_from_slice(other.as_slice());
        } else if src_count <= self.capacity {
            self.storage_mut()[..src_count].clone_from_slice(other.as_slice());
        } else {
            // Outgrown: swap the whole block for an exact-sized one.
            self.free_storage();
            let block = Self::allocate_block(&self.quota, &self.alloc, src_count)?;
            for (i, item) in other.as_slice().iter().enumerate() {
                // SAFETY: Slot i is within the fresh block and not yet
                // initialized.
                unsafe { block.add(i).write(item.clone()) };
            }
            self.ptr = Some(block);
            self.capacity = src_count;
        }

        self.rows = other.rows;
        self.cols = other.cols;
        Ok(())
    }

    /// Copies the contents of `other` element-wise, without ever changing
    /// this grid's shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConstViewViolation`] if the shapes differ.
    pub fn overwrite_from(&mut self, other: &Self) -> Result<()>
    where
        T: Clone,
    {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(Error::ConstViewViolation);
        }

        self.as_mut_slice().clone_from_slice(other.as_slice());
        Ok(())
    }

    /// Deep-copies this grid into a new owning one on the same ledger and
    /// heap, with `capacity == rows * cols`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryExhausted`] if the quota or heap refuses.
    pub fn try_clone(&self) -> Result<Self>
    where
        T: Clone,
        A: Clone,
    {
        let mut clone = Self::new_in(Rc::clone(&self.quota), self.alloc.clone());
        let count = self.element_len();

        if count > 0 {
            let block = Self::allocate_block(&clone.quota, &clone.alloc, count)?;
            for (i, item) in self.as_slice().iter().enumerate() {
                // SAFETY: Slot i is within the fresh block and not yet
                // initialized.
                unsafe { block.add(i).write(item.clone()) };
            }
            clone.ptr = Some(block);
            clone.capacity = count;
        }

        clone.rows = self.rows;
        clone.cols = self.cols;
        Ok(clone)
    }

    /// Moves the storage of `source` into this grid, freeing whatever this
    /// one held. `source` is left empty, borrowed and pointing nowhere.
    pub fn take_from(&mut self, source: &mut Self)
    where
        A: Clone,
    {
        self.free_storage();

        self.tenure = source.tenure;
        self.ptr = source.ptr.take();
        self.rows = mem::replace(&mut source.rows, 0);
        self.cols = mem::replace(&mut source.cols, 0);
        self.capacity = mem::replace(&mut source.capacity, 0);
        self.quota = Rc::clone(&source.quota);
        self.alloc = source.alloc.clone();

        source.tenure = Tenure::Borrowed;
    }

    /// Exchanges the complete state of two grids in O(1).
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Configures `target` as a borrowed view over this grid's storage,
    /// freeing whatever `target` held. Sharing an unallocated grid leaves
    /// `target` owned and empty.
    ///
    /// # Safety
    ///
    /// The view aliases this grid's storage with no lifetime tie: the caller
    /// must not use `target` after this grid reallocates, frees or drops its
    /// storage, and must not touch elements through both grids concurrently.
    pub unsafe fn share_with(&self, target: &mut Self) {
        target.free_storage();

        if let Some(block) = self.ptr {
            target.ptr = Some(block);
            target.rows = self.rows;
            target.cols = self.cols;
            target.capacity = self.capacity;
            target.tenure = Tenure::Borrowed;
        }
    }

    /// Hands the storage block to the caller and resets the grid to
    /// owned-empty. Returns `None` on borrowed storage, which keeps its
    /// owner.
    ///
    /// The block holds `capacity()` initialized elements and its bytes stay
    /// charged to the ledger, exactly as for
    /// [`MeteredVec::release`](metered_vec::MeteredVec::release).
    pub fn release(&mut self) -> Option<NonNull<T>> {
        if self.is_borrowed() {
            return None;
        }

        let block = self.ptr.take();
        self.rows = 0;
        self.cols = 0;
        self.capacity = 0;
        block
    }

    /// Sets the row count to zero; the column count, contents and capacity
    /// stay put.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] on borrowed storage.
    pub fn clear(&mut self) -> Result<()> {
        if self.is_borrowed() {
            return Err(Error::ExternalMemoryViolation);
        }

        self.rows = 0;
        Ok(())
    }

    /// Shrinks the storage to exactly `rows * cols` slots, running
    /// destructors for the vacated slack and returning its bytes to the
    /// ledger. A trim of an empty grid frees the block entirely.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] on borrowed storage, or
    /// [`Error::MemoryExhausted`] if the heap cannot shrink the block in
    /// place (the bookkeeping stays coherent, as for
    /// [`MeteredVec::trim`](metered_vec::MeteredVec::trim)).
    pub fn trim(&mut self) -> Result<()> {
        if self.is_borrowed() {
            return Err(Error::ExternalMemoryViolation);
        }

        let Some(block) = self.ptr else {
            return Ok(());
        };

        let used = self.element_len();

        // Cannot underflow because rows * cols <= capacity.
        let vacated = self.capacity.wrapping_sub(used);

        // SAFETY: Slots [used, capacity) are initialized and unreachable from
        // here on.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                block.as_ptr().add(used),
                vacated,
            ));
        }

        // Cannot overflow because these bytes back a live allocation.
        self.quota.release(vacated.wrapping_mul(size_of::<T>()));

        if used == 0 {
            // SAFETY: The block came from self.alloc and is not used again.
            unsafe { self.alloc.deallocate(block.cast()) };
            self.ptr = None;
            self.capacity = 0;
            return Ok(());
        }

        self.capacity = used;

        let remaining = NonZero::new(used.wrapping_mul(size_of::<T>()))
            .expect("the element count is nonzero and T is not zero-sized, so the byte count is nonzero");

        // SAFETY: The block came from self.alloc; on success the old pointer
        // is replaced, on failure it remains valid (merely oversized).
        match unsafe { self.alloc.reallocate(block.cast(), remaining) } {
            Some(resized) => {
                self.ptr = Some(resized.cast());
                Ok(())
            }
            None => Err(Error::MemoryExhausted),
        }
    }

    /// Current element count; the invariant `rows * cols <= capacity` keeps
    /// the product in range.
    fn element_len(&self) -> usize {
        self.rows.wrapping_mul(self.cols)
    }

    /// Runs the row ladder from `seed` until the whole-row capacity strictly
    /// exceeds `needed` elements.
    fn row_ladder(&self, seed: usize, needed: usize) -> Result<usize> {
        let mut target = seed;
        while target
            .checked_mul(self.cols)
            .ok_or(Error::MemoryExhausted)?
            <= needed
        {
            target = target
                .checked_add((target >> 2) + (target >> 4) + 1)
                .ok_or(Error::MemoryExhausted)?;
        }
        Ok(target)
    }

    /// Charges the ledger for `elements` slots and allocates them from
    /// `alloc`, handing the charge back if the heap refuses.
    fn allocate_block(quota: &MemoryQuota, alloc: &A, elements: usize) -> Result<NonNull<T>> {
        debug_assert!(elements > 0);

        let bytes = elements
            .checked_mul(size_of::<T>())
            .ok_or(Error::MemoryExhausted)?;
        let bytes = NonZero::new(bytes)
            .expect("element count is nonzero and T is not zero-sized, so the byte count is nonzero");

        if quota.charge(bytes.get()).is_err() {
            return Err(Error::MemoryExhausted);
        }

        let Some(block) = alloc.allocate(bytes) else {
            quota.release(bytes.get());
            return Err(Error::MemoryExhausted);
        };

        Ok(block.cast())
    }

    /// Runs every slot's destructor, frees owned storage, releases its bytes
    /// and resets to an owned, zero-shaped grid. Borrowed storage is merely
    /// forgotten.
    fn free_storage(&mut self) {
        if self.tenure == Tenure::Owned {
            if let Some(block) = self.ptr {
                // SAFETY: Every slot in [0, capacity) is initialized and
                // unreachable from here on.
                unsafe {
                    ptr::drop_in_place(ptr::slice_from_raw_parts_mut(block.as_ptr(), self.capacity));
                }

                // SAFETY: The block came from self.alloc and is not used again.
                unsafe { self.alloc.deallocate(block.cast()) };

                // Cannot overflow because these bytes back a live allocation.
                self.quota.release(self.capacity.wrapping_mul(size_of::<T>()));
            }
        }

        self.ptr = None;
        self.rows = 0;
        self.cols = 0;
        self.capacity = 0;
        self.tenure = Tenure::Owned;
    }

    /// All `capacity` initialized slots as a mutable slice.
    fn storage_mut(&mut self) -> &mut [T] {
        match self.ptr {
            // SAFETY: Slots [0, capacity) are initialized and exclusively
            // ours while &mut self is live.
            Some(block) => unsafe { slice::from_raw_parts_mut(block.as_ptr(), self.capacity) },
            None => &mut [],
        }
    }

    /// Creates an owning grid whose `rows * cols` slots are produced by
    /// `fill`; the dimensions are kept even when the element count is zero.
    fn filled_in(
        quota: Rc<MemoryQuota>,
        rows: usize,
        cols: usize,
        alloc: A,
        mut fill: impl FnMut(usize) -> T,
    ) -> Result<Self> {
        let mut grid = Self::new_in(quota, alloc);
        let elements = rows.checked_mul(cols).ok_or(Error::MemoryExhausted)?;

        if elements > 0 {
            let block = Self::allocate_block(&grid.quota, &grid.alloc, elements)?;
            for i in 0..elements {
                // SAFETY: Slot i is within the fresh block and not yet
                // initialized.
                unsafe { block.add(i).write(fill(i)) };
            }
            grid.ptr = Some(block);
            grid.capacity = elements;
        }

        grid.rows = rows;
        grid.cols = cols;
        Ok(grid)
    }
}

impl<T, A: RawHeap> Drop for MeteredGrid<T, A> {
    fn drop(&mut self) {
        self.free_storage();
    }
}

impl<T, A: RawHeap> Index<(usize, usize)> for MeteredGrid<T, A> {
    type Output = T;

    fn index(&self, (row, col): (usize, usize)) -> &T {
        self.get(row, col).unwrap_or_else(|| {
            panic!(
                "position ({row}, {col}) is out of bounds of a {rows} x {cols} grid",
                rows = self.rows,
                cols = self.cols
            )
        })
    }
}

impl<T, A: RawHeap> IndexMut<(usize, usize)> for MeteredGrid<T, A> {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut T {
        let (rows, cols) = (self.rows, self.cols);
        self.get_mut(row, col).unwrap_or_else(|| {
            panic!("position ({row}, {col}) is out of bounds of a {rows} x {cols} grid")
        })
    }
}

impl<'g, T, A: RawHeap> IntoIterator for &'g MeteredGrid<T, A> {
    type Item = &'g T;
    type IntoIter = slice::Iter<'g, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'g, T, A: RawHeap> IntoIterator for &'g mut MeteredGrid<T, A> {
    type Item = &'g mut T;
    type IntoIter = slice::IterMut<'g, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T, A: RawHeap> fmt::Debug for MeteredGrid<T, A> {
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeteredGrid")
            .field("tenure", &self.tenure)
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("capacity", &self.capacity)
            .finish()
    }
}
