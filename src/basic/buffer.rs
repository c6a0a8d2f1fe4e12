//! Aligned record storage and the raw scatter/gather entry points.

use std::alloc::{Layout, alloc, dealloc};
use std::ptr::NonNull;

use tracing::debug;

use super::attribute::{AttributeType, TypedAttribute};
use super::error::DataError;
use super::meta_data::{Idx, MetaAttribute, MetaComponent};

/// One contiguous block holding `len` records of one component.
///
/// Memory is released on drop; the buffer is the only owner.
#[derive(Debug)]
pub struct Buffer {
    component: &'static MetaComponent,
    data: NonNull<u8>,
    layout: Layout,
    len: Idx,
}

// The buffer exclusively owns its allocation.
unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

impl Buffer {
    /// Allocates storage for `len` records.
    ///
    /// The alignment is `max(component.alignment, pointer size)` and the byte size is
    /// rounded up to it.
    pub fn create(component: &'static MetaComponent, len: Idx) -> Result<Self, DataError> {
        let alloc_error = || DataError::Allocation {
            component: component.name.to_string(),
            count: len,
        };
        let count = usize::try_from(len).map_err(|_| alloc_error())?;
        let bytes = component
            .size
            .checked_mul(count)
            .ok_or_else(alloc_error)?
            .max(1);
        let align = component.alignment.max(align_of::<usize>());
        let layout = Layout::from_size_align(bytes, align)
            .map_err(|_| alloc_error())?
            .pad_to_align();
        let data = NonNull::new(unsafe { alloc(layout) }).ok_or_else(alloc_error)?;
        debug!(
            component = component.name,
            len,
            bytes = layout.size(),
            "buffer allocated"
        );
        Ok(Self {
            component,
            data,
            layout,
            len,
        })
    }

    pub fn component(&self) -> &'static MetaComponent {
        self.component
    }

    pub fn len(&self) -> Idx {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data.as_ptr()
    }

    pub(crate) fn non_null(&self) -> NonNull<u8> {
        self.data
    }

    pub(crate) fn check_range(&self, offset: Idx, count: Idx) -> Result<(), DataError> {
        if offset < 0 || count < 0 || offset.checked_add(count).is_none_or(|end| end > self.len) {
            return Err(DataError::InsufficientCapacity {
                component: self.component.name.to_string(),
                capacity: self.len,
                required: offset.max(0).saturating_add(count.max(0)),
            });
        }
        Ok(())
    }

    fn typed<T: AttributeType>(&self, attribute: &str) -> Result<TypedAttribute<'static, T>, DataError> {
        TypedAttribute::new(self.component.get_attribute(attribute)?)
    }

    /// Sets every attribute of records `[offset, offset + count)` to its missing sentinel.
    pub fn fill_missing(&mut self, offset: Idx, count: Idx) -> Result<(), DataError> {
        self.check_range(offset, count)?;
        unsafe { fill_missing(self.component, self.as_mut_ptr(), offset, count) };
        Ok(())
    }

    /// Writes `values` tightly packed into records starting at `offset`.
    pub fn set_values<T: AttributeType>(
        &mut self,
        attribute: &str,
        offset: Idx,
        values: &[T],
    ) -> Result<(), DataError> {
        let typed = self.typed::<T>(attribute)?;
        let count = values.len() as Idx;
        self.check_range(offset, count)?;
        unsafe {
            typed.scatter(
                self.as_mut_ptr(),
                values.as_ptr() as *const u8,
                offset,
                count,
                -1,
            )
        }
    }

    /// Writes one `value` into every record of `[offset, offset + count)`.
    pub fn broadcast<T: AttributeType>(
        &mut self,
        attribute: &str,
        offset: Idx,
        count: Idx,
        value: T,
    ) -> Result<(), DataError> {
        let typed = self.typed::<T>(attribute)?;
        self.check_range(offset, count)?;
        unsafe {
            typed.scatter(
                self.as_mut_ptr(),
                &value as *const T as *const u8,
                offset,
                count,
                0,
            )
        }
    }

    /// Reads records `[offset, offset + count)` of one attribute.
    pub fn values<T: AttributeType>(
        &self,
        attribute: &str,
        offset: Idx,
        count: Idx,
    ) -> Result<Vec<T>, DataError> {
        let typed = self.typed::<T>(attribute)?;
        self.check_range(offset, count)?;
        let mut out = vec![T::missing(); count as usize];
        unsafe {
            typed.gather(
                self.as_ptr(),
                out.as_mut_ptr() as *mut u8,
                offset,
                count,
                -1,
            )?
        };
        Ok(out)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe { dealloc(self.data.as_ptr(), self.layout) };
    }
}

/// Sets every attribute of `count` records starting at `offset` to its missing sentinel.
///
/// # Safety
/// `ptr` must point to at least `offset + count` writable records of `component`.
pub unsafe fn fill_missing(component: &MetaComponent, ptr: *mut u8, offset: Idx, count: Idx) {
    for attribute in &component.attributes {
        unsafe { attribute.accessor().fill_missing(ptr, offset, count) };
    }
}

/// Strided scatter from `src_ptr` into records `[offset, offset + count)` at `buffer_ptr`.
///
/// `stride` is in bytes: `-1` is the natural attribute size, `0` broadcasts one value.
///
/// # Safety
/// Capacity of both sides is the caller's responsibility.
pub unsafe fn set_attribute(
    attribute: &MetaAttribute,
    buffer_ptr: *mut u8,
    src_ptr: *const u8,
    offset: Idx,
    count: Idx,
    stride: Idx,
) -> Result<(), DataError> {
    unsafe {
        attribute
            .accessor()
            .scatter(buffer_ptr, src_ptr, offset, count, stride)
    }
}

/// Strided gather from records `[offset, offset + count)` at `buffer_ptr` into `dst_ptr`.
///
/// # Safety
/// Capacity of both sides is the caller's responsibility.
pub unsafe fn get_attribute(
    attribute: &MetaAttribute,
    buffer_ptr: *const u8,
    dst_ptr: *mut u8,
    offset: Idx,
    count: Idx,
    stride: Idx,
) -> Result<(), DataError> {
    unsafe {
        attribute
            .accessor()
            .gather(buffer_ptr, dst_ptr, offset, count, stride)
    }
}
