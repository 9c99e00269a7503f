use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::num::NonZero;
use std::ops::{Index, IndexMut};
use std::ptr::{self, NonNull};
use std::rc::Rc;
use std::slice;

use host_shape::{HostScalar, HostValue, check_vector, element_count};
use mem_quota::MemoryQuota;
use raw_heap::{GlobalHeap, MAX_ALIGN, RawHeap};

use crate::{Error, Result, Tenure};

/// The seed capacity of the growth ladder.
const FIRST_CAPACITY: usize = 4;

/// A quota-metered growable buffer of `T` over the heap capability `A`.
///
/// Storage is either owned (allocated from `A`, accounted against the shared
/// [`MemoryQuota`] ledger) or borrowed (wrapped around external storage, see
/// [`Tenure`]). Borrowed storage supports element reads and writes and even
/// length changes within the existing capacity, but every operation that would
/// reallocate, free or claim the block fails with
/// [`Error::ExternalMemoryViolation`].
///
/// Every slot in `[0, capacity())` is kept initialized: growth
/// default-constructs new slots, shrinking only moves the length fence, and
/// destructors for the vacated slots run at [`trim()`](Self::trim) or drop.
///
/// # Examples
///
/// ```rust
/// use std::rc::Rc;
///
/// use mem_quota::MemoryQuota;
/// use metered_vec::MeteredVec;
///
/// let quota = Rc::new(MemoryQuota::new());
///
/// let mut values = MeteredVec::from_slice(quota, &[1_i32, 2, 3])?;
/// values.push(4)?;
///
/// assert_eq!(values.as_slice(), &[1, 2, 3, 4]);
/// # Ok::<(), metered_vec::Error>(())
/// ```
pub struct MeteredVec<T, A: RawHeap = GlobalHeap> {
    tenure: Tenure,

    /// Start of the storage block; `None` exactly when `capacity == 0`.
    ptr: Option<NonNull<T>>,

    /// Number of elements logically in the container; `len <= capacity`.
    len: usize,

    /// Number of initialized slots the block holds.
    capacity: usize,

    quota: Rc<MemoryQuota>,

    alloc: A,

    /// The container logically owns instances of `T`.
    _marker: PhantomData<T>,
}

impl<T> MeteredVec<T, GlobalHeap> {
    /// Creates an empty container on the default heap.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or requires alignment above
    /// [`MAX_ALIGN`].
    #[must_use]
    pub fn new(quota: Rc<MemoryQuota>) -> Self {
        Self::new_in(quota, GlobalHeap)
    }

    /// Creates a container of `len` default-constructed elements, with
    /// `len == capacity`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryExhausted`] if the quota or the heap refuses.
    pub fn with_len(quota: Rc<MemoryQuota>, len: usize) -> Result<Self>
    where
        T: Default,
    {
        Self::with_len_in(quota, len, GlobalHeap)
    }

    /// Creates a container of `len` clones of `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryExhausted`] if the quota or the heap refuses.
    pub fn with_fill(quota: Rc<MemoryQuota>, len: usize, value: &T) -> Result<Self>
    where
        T: Clone,
    {
        Self::with_fill_in(quota, len, value, GlobalHeap)
    }

    /// Creates an owning container holding a copy of `items`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryExhausted`] if the quota or the heap refuses.
    pub fn from_slice(quota: Rc<MemoryQuota>, items: &[T]) -> Result<Self>
    where
        T: Clone,
    {
        Self::from_slice_in(quota, items, GlobalHeap)
    }

    /// Wraps existing storage without copying or charging the quota.
    ///
    /// With `self_manage == false` the result is a borrowed view; with
    /// `self_manage == true` the container takes ownership and will free the
    /// block through the heap when dropped (releasing `len * size_of::<T>()`
    /// bytes to the ledger, which never dipped for them - the ledger
    /// saturates at zero).
    ///
    /// # Safety
    ///
    /// `ptr` must point to `len` initialized elements of `T`, aligned to at
    /// least their natural alignment, valid for reads and writes for the life
    /// of the container. If `self_manage` is true the block must have been
    /// allocated from [`GlobalHeap`] and nothing else may free it. If false,
    /// the caller keeps the storage alive for as long as the view is used.
    pub unsafe fn from_raw_parts(
        quota: Rc<MemoryQuota>,
        ptr: NonNull<T>,
        len: usize,
        self_manage: bool,
    ) -> Self {
        // SAFETY: Contract forwarded to the caller.
        unsafe { Self::from_raw_parts_in(quota, ptr, len, self_manage, GlobalHeap) }
    }

    /// Wraps the payload of a validated host value as a borrowed view.
    ///
    /// The value must classify as a 1-D run of `T` under
    /// [`host_shape::check_vector`]; absent shape or kind yields
    /// [`Error::InvalidInput`]. Empty values produce an empty owned container.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the value fails shape validation.
    ///
    /// # Safety
    ///
    /// The host payload must remain valid, and must not be written through
    /// any other path, for as long as the returned container is used.
    pub unsafe fn adopt_host<V>(quota: Rc<MemoryQuota>, value: &V) -> Result<Self>
    where
        T: HostScalar,
        V: HostValue + ?Sized,
    {
        if !check_vector::<T, V>(Some(value)) {
            return Err(Error::InvalidInput);
        }

        let count = element_count(Some(value));
        let mut wrapped = Self::new(quota);

        if count > 0 {
            let payload = NonNull::new(value.data_ptr().cast::<T>().cast_mut())
                .expect("a non-empty host value reports a non-null payload pointer");

            // SAFETY: The HostValue contract guarantees `count` initialized
            // elements of the class T reports; the caller keeps the payload
            // alive and unaliased per our own contract.
            unsafe { wrapped.adopt_raw(payload, count, false) };
        }

        Ok(wrapped)
    }
}

impl<T, A: RawHeap> MeteredVec<T, A> {
    /// Creates an empty container on the given heap.
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
            len: 0,
            capacity: 0,
            quota,
            alloc,
            _marker: PhantomData,
        }
    }

    /// Creates a container of `len` default-constructed elements on the given
    /// heap.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryExhausted`] if the quota or the heap refuses.
    pub fn with_len_in(quota: Rc<MemoryQuota>, len: usize, alloc: A) -> Result<Self>
    where
        T: Default,
    {
        Self::filled_in(quota, len, alloc, |_| T::default())
    }

    /// Creates a container of `len` clones of `value` on the given heap.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryExhausted`] if the quota or the heap refuses.
    pub fn with_fill_in(quota: Rc<MemoryQuota>, len: usize, value: &T, alloc: A) -> Result<Self>
    where
        T: Clone,
    {
        Self::filled_in(quota, len, alloc, |_| value.clone())
    }

    /// Creates an owning copy of `items` on the given heap.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryExhausted`] if the quota or the heap refuses.
    pub fn from_slice_in(quota: Rc<MemoryQuota>, items: &[T], alloc: A) -> Result<Self>
    where
        T: Clone,
    {
        Self::filled_in(quota, items.len(), alloc, |i| items[i].clone())
    }

    /// See [`MeteredVec::from_raw_parts`].
    ///
    /// # Safety
    ///
    /// As for [`MeteredVec::from_raw_parts`], with the block originating from
    /// `alloc` when `self_manage` is true.
    pub unsafe fn from_raw_parts_in(
        quota: Rc<MemoryQuota>,
        ptr: NonNull<T>,
        len: usize,
        self_manage: bool,
        alloc: A,
    ) -> Self {
        let mut wrapped = Self::new_in(quota, alloc);

        // SAFETY: Contract forwarded to the caller.
        unsafe { wrapped.adopt_raw(ptr, len, self_manage) };

        wrapped
    }

    /// Replaces the container's storage with existing external storage,
    /// freeing whatever it held before. No copying, no quota charge.
    ///
    /// Adopting zero elements leaves the container owned and empty; `ptr` is
    /// ignored in that case.
    ///
    /// # Safety
    ///
    /// As for [`MeteredVec::from_raw_parts`].
    pub unsafe fn adopt_raw(&mut self, ptr: NonNull<T>, len: usize, self_manage: bool) {
        self.free_storage();

        if len > 0 {
            self.ptr = Some(ptr);
            self.len = len;
            self.capacity = len;
            self.tenure = if self_manage {
                Tenure::Owned
            } else {
                Tenure::Borrowed
            };
        }
    }

    /// Number of elements in the container.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Number of initialized slots the storage holds.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the container holds no elements (it may still hold capacity).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the container holds no storage at all.
    #[must_use]
    pub fn is_unallocated(&self) -> bool {
        self.ptr.is_none()
    }

    /// Whether the storage is borrowed from someone else.
    #[must_use]
    pub fn is_borrowed(&self) -> bool {
        self.tenure == Tenure::Borrowed
    }

    /// The ledger this container charges.
    #[must_use]
    pub fn quota(&self) -> &Rc<MemoryQuota> {
        &self.quota
    }

    /// The elements as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        match self.ptr {
            // SAFETY: Slots [0, len) are initialized and live while &self is.
            Some(ptr) => unsafe { slice::from_raw_parts(ptr.as_ptr(), self.len) },
            None => &[],
        }
    }

    /// The elements as a mutable slice.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match self.ptr {
            // SAFETY: Slots [0, len) are initialized and exclusively ours
            // while &mut self is live.
            Some(ptr) => unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), self.len) },
            None => &mut [],
        }
    }

    /// The element at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    /// The element at `index`, mutably, if any.
    #[must_use]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.as_mut_slice().get_mut(index)
    }

    /// The final element, if any.
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.as_slice().last()
    }

    /// The final element, mutably, if any.
    #[must_use]
    pub fn last_mut(&mut self) -> Option<&mut T> {
        self.as_mut_slice().last_mut()
    }

    /// Iterates over the elements.
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Iterates over the elements mutably.
    pub fn iter_mut(&mut self) -> slice::IterMut<'_, T> {
        self.as_mut_slice().iter_mut()
    }

    /// Appends an element, growing the storage along the capacity ladder when
    /// full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] if growth is needed on
    /// borrowed storage, or [`Error::MemoryExhausted`] if the quota or heap
    /// refuses the growth. Appending into spare capacity never fails, even on
    /// borrowed storage.
    pub fn push(&mut self, value: T) -> Result<()>
    where
        T: Default,
    {
        if self.len == self.capacity {
            if self.is_borrowed() {
                return Err(Error::ExternalMemoryViolation);
            }

            let next = Self::next_capacity(self.capacity).ok_or(Error::MemoryExhausted)?;
            self.grow_storage(next)?;
        }

        // SAFETY: len < capacity, so the slot is within the storage block.
        let mut slot = unsafe { self.data_ptr().add(self.len) };

        // SAFETY: The slot is initialized and exclusively ours while &mut self
        // is live; assignment runs the displaced value's destructor.
        unsafe { *slot.as_mut() = value };

        // Cannot overflow because len < capacity <= isize::MAX elements.
        self.len = self.len.wrapping_add(1);
        Ok(())
    }

    /// Extends the container by `additional` default-valued elements, running
    /// the capacity ladder until the capacity strictly exceeds the new length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] if growth is needed on
    /// borrowed storage, or [`Error::MemoryExhausted`] if the quota or heap
    /// refuses.
    pub fn grow_by(&mut self, additional: usize) -> Result<()>
    where
        T: Default,
    {
        let new_len = self
            .len
            .checked_add(additional)
            .ok_or(Error::MemoryExhausted)?;

        if new_len > self.capacity {
            if self.is_borrowed() {
                return Err(Error::ExternalMemoryViolation);
            }

            let mut target = if self.capacity == 0 {
                FIRST_CAPACITY
            } else {
                self.capacity
            };
            while target <= new_len {
                target = target
                    .checked_add((target >> 1) + 1)
                    .ok_or(Error::MemoryExhausted)?;
            }
            self.grow_storage(target)?;
        }

        self.len = new_len;
        Ok(())
    }

    /// Ensures the capacity is at least `capacity`, reallocating to exactly
    /// that many slots and default-constructing the new ones.
    ///
    /// Smaller requests are no-ops; [`trim()`](Self::trim) is the way down.
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
            self.grow_storage(capacity)?;
        }
        Ok(())
    }

    /// Sets the length to `len`, growing the storage to exactly `len` slots
    /// if it does not fit.
    ///
    /// Shrinking never frees: the vacated slots stay initialized until
    /// [`trim()`](Self::trim).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] on borrowed storage (any
    /// resize, even a shrink) or [`Error::MemoryExhausted`] if the quota or
    /// heap refuses.
    pub fn resize(&mut self, len: usize) -> Result<()>
    where
        T: Default,
    {
        if self.is_borrowed() {
            return Err(Error::ExternalMemoryViolation);
        }

        if len > self.capacity {
            self.grow_storage(len)?;
        }
        self.len = len;
        Ok(())
    }

    /// [`resize()`](Self::resize), then assigns clones of `value` into every
    /// newly exposed slot.
    ///
    /// # Errors
    ///
    /// As for [`resize()`](Self::resize).
    pub fn resize_fill(&mut self, len: usize, value: &T) -> Result<()>
    where
        T: Clone + Default,
    {
        let prev = self.len;
        self.resize(len)?;

        for slot in &mut self.as_mut_slice()[prev.min(len)..] {
            *slot = value.clone();
        }
        Ok(())
    }

    /// Inserts a copy of `items` at `position`, shifting the suffix forward.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] on borrowed storage or
    /// [`Error::MemoryExhausted`] if the quota or heap refuses the growth.
    ///
    /// # Panics
    ///
    /// Panics if `position > len()`.
    pub fn insert_from_slice(&mut self, position: usize, items: &[T]) -> Result<()>
    where
        T: Clone + Default,
    {
        assert!(
            position <= self.len,
            "insertion position {position} is past the end of a container of length {len}",
            len = self.len
        );

        let inserted = items.len();
        let new_len = self
            .len
            .checked_add(inserted)
            .ok_or(Error::MemoryExhausted)?;
        self.resize(new_len)?;

        if inserted > 0 {
            let storage = self.storage_mut();

            // Shift everything from the insertion point through the physical
            // end of the storage; the slack beyond len holds default values,
            // so dragging it along is harmless.
            for i in ((position + inserted)..storage.len()).rev() {
                storage.swap(i, i - inserted);
            }

            for (slot, item) in storage[position..position + inserted].iter_mut().zip(items) {
                *slot = item.clone();
            }
        }
        Ok(())
    }

    /// Inserts the elements of `items` at `position`, single pass, without
    /// knowing their count up front: the suffix is staged in a temporary
    /// owning container on the same ledger, the new elements are appended,
    /// then the suffix is appended back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] on borrowed storage or
    /// [`Error::MemoryExhausted`] if the quota or heap refuses at any step.
    ///
    /// # Panics
    ///
    /// Panics if `position > len()`.
    pub fn insert_from_iter<I>(&mut self, position: usize, items: I) -> Result<()>
    where
        T: Default,
        A: Clone,
        I: IntoIterator<Item = T>,
    {
        assert!(
            position <= self.len,
            "insertion position {position} is past the end of a container of length {len}",
            len = self.len
        );

        if self.is_borrowed() {
            return Err(Error::ExternalMemoryViolation);
        }

        let mut staged = Self::new_in(Rc::clone(&self.quota), self.alloc.clone());
        for slot in &mut self.as_mut_slice()[position..] {
            staged.push(mem::take(slot))?;
        }

        self.len = position;

        for item in items {
            self.push(item)?;
        }
        for slot in staged.as_mut_slice() {
            // Move the staged element back; the stage is dropped whole after.
            let item = mem::take(slot);
            self.push(item)?;
        }
        Ok(())
    }

    /// Removes the elements in `[begin, end)`, shifting the rest backward.
    ///
    /// An inverted range removes nothing; a range past the end is clamped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] on borrowed storage.
    pub fn erase(&mut self, begin: usize, end: usize) -> Result<()> {
        if self.is_borrowed() {
            return Err(Error::ExternalMemoryViolation);
        }

        let removed = end.saturating_sub(begin);
        if removed > 0 && self.ptr.is_some() {
            let storage = self.storage_mut();

            // Drag everything after the erased range backward through the
            // physical end; the values parked beyond len are unobservable.
            for i in begin..storage.len().saturating_sub(removed) {
                storage.swap(i, i + removed);
            }
        }

        self.len = self.len.saturating_sub(removed.min(self.len));
        Ok(())
    }

    /// Removes and returns the final element, or `T::default()` if the
    /// container is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] on borrowed storage.
    pub fn pop(&mut self) -> Result<T>
    where
        T: Default,
    {
        if self.is_borrowed() {
            return Err(Error::ExternalMemoryViolation);
        }

        if self.len == 0 {
            return Ok(T::default());
        }

        // Cannot underflow because len > 0.
        self.len = self.len.wrapping_sub(1);

        // SAFETY: len was a nonzero length a moment ago, so the slot at the
        // decremented len is within the storage block.
        let mut slot = unsafe { self.data_ptr().add(self.len) };

        // SAFETY: The slot is initialized and now sits in the slack; taking
        // it leaves a default behind, keeping every capacity slot valid.
        Ok(mem::take(unsafe { slot.as_mut() }))
    }

    /// Sets the length to zero without freeing or destroying anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] on borrowed storage.
    pub fn clear(&mut self) -> Result<()> {
        if self.is_borrowed() {
            return Err(Error::ExternalMemoryViolation);
        }

        self.len = 0;
        Ok(())
    }

    /// Shrinks the storage to exactly `len()` slots, running destructors for
    /// the vacated slack and returning its bytes to the ledger. A trim to
    /// zero frees the block entirely.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] on borrowed storage.
    /// Returns [`Error::MemoryExhausted`] if the heap cannot shrink the block
    /// in place; the container then keeps the larger physical block but its
    /// bookkeeping (and the ledger) already reflect the trimmed size, so the
    /// state remains coherent.
    pub fn trim(&mut self) -> Result<()> {
        if self.is_borrowed() {
            return Err(Error::ExternalMemoryViolation);
        }

        let Some(block) = self.ptr else {
            return Ok(());
        };

        // Cannot underflow because len <= capacity.
        let vacated = self.capacity.wrapping_sub(self.len);

        // SAFETY: Slots [len, capacity) are initialized and unreachable from
        // here on.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                block.as_ptr().add(self.len),
                vacated,
            ));
        }

        // Cannot overflow because these bytes back a live allocation.
        self.quota.release(vacated.wrapping_mul(size_of::<T>()));

        if self.len == 0 {
            // SAFETY: The block came from self.alloc and is not used again.
            unsafe { self.alloc.deallocate(block.cast()) };
            self.ptr = None;
            self.capacity = 0;
            return Ok(());
        }

        self.capacity = self.len;

        let remaining = NonZero::new(self.len.wrapping_mul(size_of::<T>()))
            .expect("len is nonzero and T is not zero-sized, so the byte count is nonzero");

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

    /// Copies the contents of `other` into this container.
    ///
    /// Owned storage is reused when the capacity suffices and replaced by an
    /// exact-sized block otherwise. Borrowed storage accepts the copy only
    /// when the lengths already match.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalMemoryViolation`] for a length-changing copy
    /// into borrowed storage, or [`Error::MemoryExhausted`] if the
    /// replacement block cannot be obtained.
    pub fn assign(&mut self, other: &Self) -> Result<()>
    where
        T: Clone,
    {
        let src_len = other.len;

        if self.is_borrowed() {
            if src_len != self.len {
                return Err(Error::ExternalMemoryViolation);
            }
            self.as_mut_slice().clone_from_slice(other.as_slice());
            return Ok(());
        }

        if src_len <= self.capacity {
            self.storage_mut()[..src_len].clone_from_slice(other.as_slice());
            self.len = src_len;
            return Ok(());
        }

        // Outgrown: swap the whole block for an exact-sized one.
        self.free_storage();
        let block = Self::allocate_block(&self.quota, &self.alloc, src_len)?;
        for (i, item) in other.as_slice().iter().enumerate() {
            // SAFETY: Slot i is within the fresh block and not yet initialized.
            unsafe { block.add(i).write(item.clone()) };
        }
        self.ptr = Some(block);
        self.len = src_len;
        self.capacity = src_len;
        Ok(())
    }

    /// Copies the contents of `other` element-wise, without ever changing
    /// this container's shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConstViewViolation`] if the lengths differ.
    pub fn overwrite_from(&mut self, other: &Self) -> Result<()>
    where
        T: Clone,
    {
        if self.len != other.len {
            return Err(Error::ConstViewViolation);
        }

        self.as_mut_slice().clone_from_slice(other.as_slice());
        Ok(())
    }

    /// Deep-copies this container into a new owning one on the same ledger
    /// and heap, with `capacity == len`.
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

        if self.len > 0 {
            let block = Self::allocate_block(&clone.quota, &clone.alloc, self.len)?;
            for (i, item) in self.as_slice().iter().enumerate() {
                // SAFETY: Slot i is within the fresh block and not yet
                // initialized.
                unsafe { block.add(i).write(item.clone()) };
            }
            clone.ptr = Some(block);
            clone.len = self.len;
            clone.capacity = self.len;
        }

        Ok(clone)
    }

    /// Moves the storage of `source` into this container, freeing whatever
    /// this one held. `source` is left empty, borrowed and pointing nowhere,
    /// so it can only be revived by assigning or adopting fresh storage.
    pub fn take_from(&mut self, source: &mut Self)
    where
        A: Clone,
    {
        self.free_storage();

        self.tenure = source.tenure;
        self.ptr = source.ptr.take();
        self.len = mem::replace(&mut source.len, 0);
        self.capacity = mem::replace(&mut source.capacity, 0);
        self.quota = Rc::clone(&source.quota);
        self.alloc = source.alloc.clone();

        source.tenure = Tenure::Borrowed;
    }

    /// Exchanges the complete state of two containers in O(1).
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Configures `target` as a borrowed view over this container's storage,
    /// freeing whatever `target` held. Sharing an unallocated container
    /// leaves `target` owned and empty.
    ///
    /// # Safety
    ///
    /// The view aliases this container's storage with no lifetime tie: the
    /// caller must not use `target` after this container reallocates, frees
    /// or drops its storage, and must not touch elements through both
    /// containers concurrently.
    pub unsafe fn share_with(&self, target: &mut Self) {
        target.free_storage();

        if let Some(block) = self.ptr {
            target.ptr = Some(block);
            target.len = self.len;
            target.capacity = self.capacity;
            target.tenure = Tenure::Borrowed;
        }
    }

    /// Hands the storage block to the caller and resets the container to
    /// owned-empty. Returns `None` on borrowed storage, which keeps its
    /// owner.
    ///
    /// The block holds `capacity()` initialized elements and its bytes stay
    /// charged to the ledger; the caller owns both the block (free it through
    /// the same heap) and the charge (the account settles at close).
    pub fn release(&mut self) -> Option<NonNull<T>> {
        if self.is_borrowed() {
            return None;
        }

        let block = self.ptr.take();
        self.len = 0;
        self.capacity = 0;
        block
    }

    /// Assigns a copy of `items` over the elements starting at `position`,
    /// never changing the shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConstViewViolation`] if the copy would reach past
    /// `len()`.
    pub fn copy_from_slice_at(&mut self, position: usize, items: &[T]) -> Result<()>
    where
        T: Clone,
    {
        let end = position
            .checked_add(items.len())
            .ok_or(Error::ConstViewViolation)?;
        if end > self.len {
            return Err(Error::ConstViewViolation);
        }

        self.as_mut_slice()[position..end].clone_from_slice(items);
        Ok(())
    }

    /// The next rung of the capacity ladder, or `None` on overflow.
    fn next_capacity(capacity: usize) -> Option<usize> {
        if capacity == 0 {
            Some(FIRST_CAPACITY)
        } else {
            capacity.checked_add((capacity >> 1) + 1)
        }
    }

    /// Reallocates owned storage to exactly `new_capacity` slots, charging
    /// the ledger for the delta and default-constructing the new tail.
    fn grow_storage(&mut self, new_capacity: usize) -> Result<()>
    where
        T: Default,
    {
        debug_assert!(self.tenure == Tenure::Owned);
        debug_assert!(new_capacity > self.capacity);

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
    /// and resets to owned-empty. Borrowed storage is merely forgotten.
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
        self.len = 0;
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

    fn data_ptr(&self) -> NonNull<T> {
        self.ptr
            .expect("storage exists because capacity is nonzero")
    }

    /// Creates an owning container of `len` slots produced by `fill`.
    fn filled_in(
        quota: Rc<MemoryQuota>,
        len: usize,
        alloc: A,
        mut fill: impl FnMut(usize) -> T,
    ) -> Result<Self> {
        let mut vec = Self::new_in(quota, alloc);

        if len > 0 {
            let block = Self::allocate_block(&vec.quota, &vec.alloc, len)?;
            for i in 0..len {
                // SAFETY: Slot i is within the fresh block and not yet
                // initialized.
                unsafe { block.add(i).write(fill(i)) };
            }
            vec.ptr = Some(block);
            vec.len = len;
            vec.capacity = len;
        }

        Ok(vec)
    }
}

impl<T, A: RawHeap> Drop for MeteredVec<T, A> {
    fn drop(&mut self) {
        self.free_storage();
    }
}

impl<T, A: RawHeap> Index<usize> for MeteredVec<T, A> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        assert!(
            index < self.len,
            "index {index} is out of bounds of a container of length {len}",
            len = self.len
        );
        &self.as_slice()[index]
    }
}

impl<T, A: RawHeap> IndexMut<usize> for MeteredVec<T, A> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        assert!(
            index < self.len,
            "index {index} is out of bounds of a container of length {len}",
            len = self.len
        );
        &mut self.as_mut_slice()[index]
    }
}

impl<'v, T, A: RawHeap> IntoIterator for &'v MeteredVec<T, A> {
    type Item = &'v T;
    type IntoIter = slice::Iter<'v, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'v, T, A: RawHeap> IntoIterator for &'v mut MeteredVec<T, A> {
    type Item = &'v mut T;
    type IntoIter = slice::IterMut<'v, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T, A: RawHeap> fmt::Debug for MeteredVec<T, A> {
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeteredVec")
            .field("tenure", &self.tenure)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use raw_heap::SystemHeap;

    use super::*;

    fn quota() -> Rc<MemoryQuota> {
        Rc::new(MemoryQuota::new())
    }

    #[test]
    fn new_is_empty_and_unallocated() {
        let vec = MeteredVec::<u32>::new(quota());

        assert_eq!(vec.len(), 0);
        assert_eq!(vec.capacity(), 0);
        assert!(vec.is_empty());
        assert!(vec.is_unallocated());
        assert!(!vec.is_borrowed());
    }

    #[test]
    fn with_len_constructs_defaults_and_charges_exactly() {
        let quota = quota();
        let vec = MeteredVec::<u64>::with_len(Rc::clone(&quota), 5).unwrap();

        assert_eq!(vec.len(), 5);
        assert_eq!(vec.capacity(), 5);
        assert_eq!(vec.as_slice(), &[0, 0, 0, 0, 0]);
        assert_eq!(quota.used_bytes(), 5 * size_of::<u64>());
    }

    #[test]
    fn with_fill_clones_the_value() {
        let vec = MeteredVec::with_fill(quota(), 3, &7_i32).unwrap();

        assert_eq!(vec.as_slice(), &[7, 7, 7]);
    }

    #[test]
    fn from_slice_copies() {
        let vec = MeteredVec::from_slice(quota(), &[1_u8, 2, 3]).unwrap();

        assert_eq!(vec.as_slice(), &[1, 2, 3]);
        assert_eq!(vec.capacity(), 3);
    }

    #[test]
    fn push_climbs_the_capacity_ladder() {
        let mut vec = MeteredVec::<u32>::new(quota());
        let mut observed = Vec::new();

        for i in 0..12_u32 {
            vec.push(i).unwrap();
            if observed.last() != Some(&vec.capacity()) {
                observed.push(vec.capacity());
            }
        }

        // 4, then cap + cap/2 + 1 at every full rung.
        assert_eq!(observed, [4, 7, 11, 17]);
        assert_eq!(vec.len(), 12);
        assert_eq!(
            vec.as_slice(),
            &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]
        );
    }

    #[test]
    fn push_charges_the_ledger_for_capacity_not_length() {
        let quota = quota();
        let mut vec = MeteredVec::<u64>::new(Rc::clone(&quota));

        vec.push(1).unwrap();

        assert_eq!(quota.used_bytes(), vec.capacity() * size_of::<u64>());
    }

    #[test]
    fn exhausted_quota_fails_push_without_mutation() {
        let quota = quota();
        let _key = quota.open_account(4 * size_of::<u32>()).unwrap();

        let mut vec = MeteredVec::<u32>::new(Rc::clone(&quota));
        for i in 0..4 {
            vec.push(i).unwrap();
        }

        let used_before = quota.used_bytes();
        assert_eq!(vec.push(4), Err(Error::MemoryExhausted));
        assert_eq!(vec.len(), 4);
        assert_eq!(vec.capacity(), 4);
        assert_eq!(quota.used_bytes(), used_before);
    }

    #[test]
    fn grow_by_runs_the_ladder_past_the_new_length() {
        let mut vec = MeteredVec::<u16>::new(quota());

        vec.grow_by(4).unwrap();

        // The ladder runs until capacity strictly exceeds the length.
        assert_eq!(vec.len(), 4);
        assert_eq!(vec.capacity(), 7);

        vec.grow_by(2).unwrap();
        assert_eq!(vec.len(), 6);
        assert_eq!(vec.capacity(), 7);
    }

    #[test]
    fn reserve_is_exact_and_ignores_smaller_requests() {
        let mut vec = MeteredVec::<u32>::new(quota());

        vec.reserve(10).unwrap();
        assert_eq!(vec.capacity(), 10);
        assert_eq!(vec.len(), 0);

        vec.reserve(5).unwrap();
        assert_eq!(vec.capacity(), 10);
    }

    #[test]
    fn resize_grows_exactly_and_shrinks_lazily() {
        let mut vec = MeteredVec::<u32>::new(quota());

        vec.resize(9).unwrap();
        assert_eq!(vec.len(), 9);
        assert_eq!(vec.capacity(), 9);

        vec.resize(3).unwrap();
        assert_eq!(vec.len(), 3);
        assert_eq!(vec.capacity(), 9);
    }

    #[test]
    fn resize_fill_touches_only_the_new_range() {
        let mut vec = MeteredVec::from_slice(quota(), &[1_i32, 2]).unwrap();

        vec.resize_fill(5, &9).unwrap();

        assert_eq!(vec.as_slice(), &[1, 2, 9, 9, 9]);
    }

    #[test]
    fn trim_releases_the_slack_and_shrinks_to_len() {
        let quota = quota();
        let mut vec = MeteredVec::<u64>::new(Rc::clone(&quota));
        for i in 0..5 {
            vec.push(i).unwrap();
        }
        assert_eq!(vec.capacity(), 7);

        vec.trim().unwrap();

        assert_eq!(vec.len(), 5);
        assert_eq!(vec.capacity(), 5);
        assert_eq!(quota.used_bytes(), 5 * size_of::<u64>());
        assert_eq!(vec.as_slice(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn trim_to_zero_frees_the_block() {
        let quota = quota();
        let mut vec = MeteredVec::<u32>::with_len(Rc::clone(&quota), 8).unwrap();

        vec.clear().unwrap();
        vec.trim().unwrap();

        assert!(vec.is_unallocated());
        assert_eq!(quota.used_bytes(), 0);
    }

    #[test]
    fn clear_keeps_the_capacity() {
        let mut vec = MeteredVec::from_slice(quota(), &[1_u8, 2, 3]).unwrap();

        vec.clear().unwrap();

        assert_eq!(vec.len(), 0);
        assert_eq!(vec.capacity(), 3);
    }

    #[test]
    fn erase_removes_a_middle_range() {
        let mut vec = MeteredVec::from_slice(quota(), &[0_i32, 1, 2, 3, 4, 5]).unwrap();

        vec.erase(1, 4).unwrap();

        assert_eq!(vec.as_slice(), &[0, 4, 5]);
    }

    #[test]
    fn erase_ignores_inverted_ranges() {
        let mut vec = MeteredVec::from_slice(quota(), &[0_i32, 1, 2]).unwrap();

        vec.erase(2, 1).unwrap();

        assert_eq!(vec.as_slice(), &[0, 1, 2]);
    }

    #[test]
    fn pop_returns_the_last_element_or_a_default() {
        let mut vec = MeteredVec::from_slice(quota(), &[5_i32, 6]).unwrap();

        assert_eq!(vec.pop().unwrap(), 6);
        assert_eq!(vec.pop().unwrap(), 5);
        assert_eq!(vec.pop().unwrap(), 0);
        assert_eq!(vec.len(), 0);
    }

    #[test]
    fn insert_from_slice_shifts_the_suffix() {
        let mut vec = MeteredVec::from_slice(quota(), &[1_i32, 2, 5, 6]).unwrap();

        vec.insert_from_slice(2, &[3, 4]).unwrap();

        assert_eq!(vec.as_slice(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn insert_from_slice_at_the_end_appends() {
        let mut vec = MeteredVec::from_slice(quota(), &[1_i32, 2]).unwrap();

        vec.insert_from_slice(2, &[3, 4]).unwrap();

        assert_eq!(vec.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn insert_from_iter_preserves_the_suffix() {
        let mut vec = MeteredVec::from_slice(quota(), &[1_i32, 2, 7, 8]).unwrap();

        vec.insert_from_iter(2, [3, 4, 5, 6]).unwrap();

        assert_eq!(vec.as_slice(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    #[should_panic(expected = "past the end")]
    fn insert_past_the_end_panics() {
        let mut vec = MeteredVec::from_slice(quota(), &[1_i32]).unwrap();

        let _ = vec.insert_from_slice(2, &[9]);
    }

    #[test]
    fn copy_from_slice_at_assigns_in_place() {
        let mut vec = MeteredVec::from_slice(quota(), &[0_u8; 5]).unwrap();

        vec.copy_from_slice_at(1, &[1, 2, 3]).unwrap();

        assert_eq!(vec.as_slice(), &[0, 1, 2, 3, 0]);
    }

    #[test]
    fn copy_from_slice_at_refuses_to_reach_past_the_end() {
        let mut vec = MeteredVec::from_slice(quota(), &[0_u8; 3]).unwrap();

        assert_eq!(
            vec.copy_from_slice_at(2, &[1, 2]),
            Err(Error::ConstViewViolation)
        );
        assert_eq!(vec.as_slice(), &[0, 0, 0]);
    }

    #[test]
    fn assign_reuses_sufficient_capacity() {
        let quota = quota();
        let mut dst = MeteredVec::<i32>::with_len(Rc::clone(&quota), 10).unwrap();
        let src = MeteredVec::from_slice(Rc::clone(&quota), &[1, 2, 3]).unwrap();

        dst.assign(&src).unwrap();

        assert_eq!(dst.as_slice(), &[1, 2, 3]);
        assert_eq!(dst.capacity(), 10);
    }

    #[test]
    fn assign_replaces_outgrown_storage_exactly() {
        let quota = quota();
        let mut dst = MeteredVec::from_slice(Rc::clone(&quota), &[1_i32]).unwrap();
        let src = MeteredVec::from_slice(Rc::clone(&quota), &[1, 2, 3, 4, 5]).unwrap();

        dst.assign(&src).unwrap();

        assert_eq!(dst.as_slice(), &[1, 2, 3, 4, 5]);
        assert_eq!(dst.capacity(), 5);
        assert_eq!(quota.used_bytes(), 10 * size_of::<i32>());
    }

    #[test]
    fn overwrite_from_requires_matching_lengths() {
        let quota = quota();
        let mut dst = MeteredVec::from_slice(Rc::clone(&quota), &[0_i32, 0]).unwrap();
        let src = MeteredVec::from_slice(Rc::clone(&quota), &[1, 2]).unwrap();
        let longer = MeteredVec::from_slice(Rc::clone(&quota), &[1, 2, 3]).unwrap();

        dst.overwrite_from(&src).unwrap();
        assert_eq!(dst.as_slice(), &[1, 2]);

        assert_eq!(dst.overwrite_from(&longer), Err(Error::ConstViewViolation));
    }

    #[test]
    fn try_clone_is_deep_and_tight() {
        let quota = quota();
        let mut vec = MeteredVec::<i32>::new(Rc::clone(&quota));
        for i in 0..5 {
            vec.push(i).unwrap();
        }

        let clone = vec.try_clone().unwrap();

        assert_eq!(clone.as_slice(), vec.as_slice());
        assert_eq!(clone.capacity(), 5);

        vec[0] = 99;
        assert_eq!(clone[0], 0);
    }

    #[test]
    fn take_from_steals_storage_and_inerts_the_source() {
        let quota = quota();
        let mut src = MeteredVec::from_slice(Rc::clone(&quota), &[1_i32, 2, 3]).unwrap();
        let mut dst = MeteredVec::<i32>::new(Rc::clone(&quota));

        dst.take_from(&mut src);

        assert_eq!(dst.as_slice(), &[1, 2, 3]);
        assert!(src.is_unallocated());
        assert!(src.is_borrowed());
        assert_eq!(src.len(), 0);

        // One storage block total; nothing was copied or double-charged.
        assert_eq!(quota.used_bytes(), 3 * size_of::<i32>());
    }

    #[test]
    fn swap_exchanges_everything() {
        let quota = quota();
        let mut a = MeteredVec::from_slice(Rc::clone(&quota), &[1_i32]).unwrap();
        let mut b = MeteredVec::from_slice(Rc::clone(&quota), &[2, 3]).unwrap();

        a.swap(&mut b);

        assert_eq!(a.as_slice(), &[2, 3]);
        assert_eq!(b.as_slice(), &[1]);
    }

    #[test]
    fn share_with_creates_a_borrowed_view() {
        let quota = quota();
        let owner = MeteredVec::from_slice(Rc::clone(&quota), &[1_i32, 2, 3]).unwrap();
        let mut view = MeteredVec::<i32>::new(Rc::clone(&quota));

        // SAFETY: The view is dropped before the owner and the two are not
        // accessed concurrently.
        unsafe { owner.share_with(&mut view) };

        assert!(view.is_borrowed());
        assert_eq!(view.as_slice(), &[1, 2, 3]);

        view[1] = 9;
        assert_eq!(owner.as_slice(), &[1, 9, 3]);
    }

    #[test]
    fn sharing_an_unallocated_container_leaves_the_target_owned() {
        let quota = quota();
        let owner = MeteredVec::<i32>::new(Rc::clone(&quota));
        let mut view = MeteredVec::from_slice(Rc::clone(&quota), &[5]).unwrap();

        // SAFETY: Nothing is shared; the target is simply emptied.
        unsafe { owner.share_with(&mut view) };

        assert!(!view.is_borrowed());
        assert!(view.is_unallocated());
    }

    #[test]
    fn views_permit_element_writes_but_refuse_shape_changes() {
        let quota = quota();
        let mut backing = [10_i32, 20, 30];
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();

        // SAFETY: The view borrows the stack array and dies in this scope.
        let mut view =
            unsafe { MeteredVec::from_raw_parts(Rc::clone(&quota), ptr, backing.len(), false) };

        view[0] = 11;
        assert_eq!(view.as_slice(), &[11, 20, 30]);

        assert_eq!(view.push(40), Err(Error::ExternalMemoryViolation));
        assert_eq!(view.reserve(10), Err(Error::ExternalMemoryViolation));
        assert_eq!(view.resize(2), Err(Error::ExternalMemoryViolation));
        assert_eq!(view.trim(), Err(Error::ExternalMemoryViolation));
        assert_eq!(view.clear(), Err(Error::ExternalMemoryViolation));
        assert_eq!(view.pop(), Err(Error::ExternalMemoryViolation));
        assert_eq!(view.erase(0, 1), Err(Error::ExternalMemoryViolation));
        assert!(view.release().is_none());

        // None of it charged the ledger.
        assert_eq!(quota.used_bytes(), 0);
    }

    #[test]
    fn view_push_within_spare_capacity_succeeds() {
        let quota = quota();
        let mut owner = MeteredVec::<i32>::new(Rc::clone(&quota));
        owner.push(1).unwrap();
        assert!(owner.capacity() > owner.len());

        let mut view = MeteredVec::<i32>::new(Rc::clone(&quota));
        // SAFETY: The view is dropped before the owner; the owner is not
        // touched while the view is in use.
        unsafe { owner.share_with(&mut view) };

        view.push(2).unwrap();
        assert_eq!(view.as_slice(), &[1, 2]);
    }

    #[test]
    fn assign_into_a_matching_view_copies_elements() {
        let quota = quota();
        let mut backing = [0_i32, 0];
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();
        let src = MeteredVec::from_slice(Rc::clone(&quota), &[7, 8]).unwrap();
        let longer = MeteredVec::from_slice(Rc::clone(&quota), &[1, 2, 3]).unwrap();

        // SAFETY: The view borrows the stack array and dies in this scope.
        let mut view = unsafe { MeteredVec::from_raw_parts(Rc::clone(&quota), ptr, 2, false) };

        view.assign(&src).unwrap();
        assert_eq!(view.as_slice(), &[7, 8]);

        assert_eq!(view.assign(&longer), Err(Error::ExternalMemoryViolation));
    }

    #[test]
    fn release_hands_over_the_block_and_its_charge() {
        let quota = quota();
        let mut vec = MeteredVec::<u32>::with_len(Rc::clone(&quota), 4).unwrap();

        let block = vec.release().expect("owned storage must be releasable");

        assert!(vec.is_unallocated());
        assert_eq!(vec.len(), 0);

        // The charge travels with the block.
        assert_eq!(quota.used_bytes(), 4 * size_of::<u32>());

        // SAFETY: We now own the block; it came from the default heap.
        unsafe { GlobalHeap.deallocate(block.cast()) };
    }

    #[test]
    fn self_managed_wrap_frees_through_the_heap_on_drop() {
        let quota = quota();
        let heap = SystemHeap;
        let bytes = NonZero::new(4 * size_of::<u32>()).unwrap();
        let block = heap.allocate(bytes).unwrap().cast::<u32>();
        for i in 0..4 {
            // SAFETY: Slot i is within the fresh block.
            unsafe { block.add(i).write(u32::try_from(i).unwrap()) };
        }

        // SAFETY: The block holds 4 initialized u32 from this heap and the
        // container becomes its sole owner.
        let vec = unsafe {
            MeteredVec::from_raw_parts_in(Rc::clone(&quota), block, 4, true, heap)
        };

        assert!(!vec.is_borrowed());
        assert_eq!(vec.as_slice(), &[0, 1, 2, 3]);

        // Dropping frees via SystemHeap; the ledger saturates at zero.
        drop(vec);
        assert_eq!(quota.used_bytes(), 0);
    }

    #[test]
    fn adopt_host_wraps_a_validated_vector() {
        let quota = quota();
        let samples = [1.5_f64, 2.5, 3.5];
        let value = host_shape::HostArray::column(&samples);

        // SAFETY: `samples` outlives the view and is not written elsewhere.
        let adopted =
            unsafe { MeteredVec::<f64>::adopt_host(Rc::clone(&quota), &value) }.unwrap();

        assert!(adopted.is_borrowed());
        assert_eq!(adopted.as_slice(), &samples);
        assert_eq!(quota.used_bytes(), 0);
    }

    #[test]
    fn adopt_host_rejects_kind_and_shape_mismatches() {
        let quota = quota();
        let samples = [1.5_f64, 2.5, 3.5, 4.5];

        let wrong_kind = host_shape::HostArray::column(&samples);
        // SAFETY: Rejected before any wrapping happens.
        let result = unsafe { MeteredVec::<f32>::adopt_host(Rc::clone(&quota), &wrong_kind) };
        assert_eq!(result.unwrap_err(), Error::InvalidInput);

        let wrong_shape = host_shape::HostArray::with_dims(&samples, 2, 2);
        // SAFETY: Rejected before any wrapping happens.
        let result = unsafe { MeteredVec::<f64>::adopt_host(Rc::clone(&quota), &wrong_shape) };
        assert_eq!(result.unwrap_err(), Error::InvalidInput);
    }

    #[test]
    fn drop_returns_every_charged_byte() {
        let quota = quota();

        {
            let mut vec = MeteredVec::<u64>::new(Rc::clone(&quota));
            for i in 0..100 {
                vec.push(i).unwrap();
            }
            assert!(quota.used_bytes() > 0);
        }

        assert_eq!(quota.used_bytes(), 0);
    }

    #[test]
    fn drop_runs_destructors_for_the_slack_too() {
        let quota = quota();

        {
            let mut vec = MeteredVec::<String>::new(Rc::clone(&quota));
            vec.push("hello".to_string()).unwrap();
            vec.push("world".to_string()).unwrap();
            vec.clear().unwrap();
            // The strings now sit in the slack; drop must still free them.
        }

        assert_eq!(quota.used_bytes(), 0);
    }

    #[test]
    #[should_panic(expected = "zero-sized element types")]
    fn zero_sized_elements_are_rejected() {
        drop(MeteredVec::<()>::new(quota()));
    }

    #[test]
    #[should_panic(expected = "alignment exceeds")]
    fn overaligned_elements_are_rejected() {
        #[derive(Default)]
        #[repr(align(32))]
        struct Wide([u8; 32]);

        drop(MeteredVec::<Wide>::new(quota()));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn indexing_past_len_panics() {
        let vec = MeteredVec::from_slice(quota(), &[1_i32]).unwrap();

        let _ = vec[1];
    }

    // The container carries an Rc ledger handle and is single-threaded.
    static_assertions::assert_not_impl_any!(MeteredVec<u32>: Send, Sync);
    static_assertions::assert_impl_all!(Error: Send, Sync, Copy);
}
