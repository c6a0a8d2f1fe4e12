use std::marker::PhantomData;
use std::ptr;

use derive_more::Display;
use num_derive::FromPrimitive;
use num_traits::{Bounded, FromPrimitive};

use super::error::DataError;
use super::meta_data::{Idx, MetaAttribute, RealValueAsym};

/// Scalar kind of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromPrimitive)]
#[repr(i8)]
pub enum CType {
    Int32 = 0,
    Int8 = 1,
    Double = 2,
    Double3 = 3,
}

impl CType {
    pub fn from_raw(raw: i64) -> Option<Self> {
        Self::from_i64(raw)
    }

    pub fn size(self) -> usize {
        match self {
            CType::Int32 => size_of::<i32>(),
            CType::Int8 => size_of::<i8>(),
            CType::Double => size_of::<f64>(),
            CType::Double3 => size_of::<RealValueAsym>(),
        }
    }
}

/// Rust types that can be stored in an attribute.
pub trait AttributeType: Copy + Send + Sync + 'static {
    const CTYPE: CType;

    /// The sentinel meaning "not provided".
    fn missing() -> Self;

    fn is_missing(&self) -> bool;
}

macro_rules! impl_integral_attribute {
    ($($ty:ty => $ctype:ident),* $(,)?) => {
        $(
            impl AttributeType for $ty {
                const CTYPE: CType = CType::$ctype;

                fn missing() -> Self {
                    <$ty as Bounded>::min_value()
                }

                fn is_missing(&self) -> bool {
                    *self == Self::missing()
                }
            }
        )*
    };
}

impl_integral_attribute!(i32 => Int32, i8 => Int8);

impl AttributeType for f64 {
    const CTYPE: CType = CType::Double;

    fn missing() -> Self {
        f64::NAN
    }

    fn is_missing(&self) -> bool {
        self.is_nan()
    }
}

impl AttributeType for RealValueAsym {
    const CTYPE: CType = CType::Double3;

    fn missing() -> Self {
        RealValueAsym::from_element(f64::NAN)
    }

    /// Missing only when every phase is missing.
    fn is_missing(&self) -> bool {
        self.iter().all(|x| x.is_nan())
    }
}

/// Resolves a byte stride: `-1` is tightly packed, `0` broadcasts, other negatives are invalid.
fn effective_stride<T>(stride: Idx) -> Result<isize, DataError> {
    match stride {
        -1 => Ok(size_of::<T>() as isize),
        s if s >= 0 => Ok(s as isize),
        s => Err(DataError::InvalidStride { stride: s }),
    }
}

/// An attribute whose scalar kind is known at compile time.
#[derive(Debug)]
pub struct TypedAttribute<'m, T> {
    attribute: &'m MetaAttribute,
    _marker: PhantomData<T>,
}

impl<T> Clone for TypedAttribute<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for TypedAttribute<'_, T> {}

impl<'m, T: AttributeType> TypedAttribute<'m, T> {
    pub fn new(attribute: &'m MetaAttribute) -> Result<Self, DataError> {
        if attribute.ctype != T::CTYPE {
            return Err(DataError::AttributeTypeMismatch {
                component: attribute.component.to_string(),
                attribute: attribute.name.to_string(),
                actual: attribute.ctype,
                requested: T::CTYPE,
            });
        }
        Ok(Self {
            attribute,
            _marker: PhantomData,
        })
    }

    pub fn meta(&self) -> &'m MetaAttribute {
        self.attribute
    }

    #[inline]
    unsafe fn field_ptr(&self, buffer: *const u8, idx: Idx) -> *const u8 {
        unsafe {
            buffer
                .offset(idx as isize * self.attribute.component_size as isize)
                .add(self.attribute.offset)
        }
    }

    /// Copies `count` values from `src` into records `[offset, offset + count)` of a row buffer.
    ///
    /// # Safety
    /// `buffer` must hold at least `offset + count` records of the owning component and
    /// `src` must be readable at every visited stride position.
    pub unsafe fn scatter(
        &self,
        buffer: *mut u8,
        src: *const u8,
        offset: Idx,
        count: Idx,
        stride: Idx,
    ) -> Result<(), DataError> {
        let stride = effective_stride::<T>(stride)?;
        for i in 0..count.max(0) {
            unsafe {
                let value = ptr::read_unaligned(src.offset(i as isize * stride) as *const T);
                let dst = self.field_ptr(buffer, offset + i) as *mut T;
                ptr::write_unaligned(dst, value);
            }
        }
        Ok(())
    }

    /// Copies records `[offset, offset + count)` of a row buffer into `dst`.
    ///
    /// # Safety
    /// Mirror of [`TypedAttribute::scatter`].
    pub unsafe fn gather(
        &self,
        buffer: *const u8,
        dst: *mut u8,
        offset: Idx,
        count: Idx,
        stride: Idx,
    ) -> Result<(), DataError> {
        let stride = effective_stride::<T>(stride)?;
        for i in 0..count.max(0) {
            unsafe {
                let value = ptr::read_unaligned(self.field_ptr(buffer, offset + i) as *const T);
                ptr::write_unaligned(dst.offset(i as isize * stride) as *mut T, value);
            }
        }
        Ok(())
    }

    /// # Safety
    /// `buffer` must hold at least `offset + count` records.
    pub unsafe fn fill_missing(&self, buffer: *mut u8, offset: Idx, count: Idx) {
        let missing = T::missing();
        for i in 0..count.max(0) {
            unsafe {
                ptr::write_unaligned(self.field_ptr(buffer, offset + i) as *mut T, missing);
            }
        }
    }

    /// # Safety
    /// `column` must hold at least `offset + count` values of `T`.
    pub unsafe fn fill_missing_column(&self, column: *mut u8, offset: Idx, count: Idx) {
        let missing = T::missing();
        for i in offset..offset + count.max(0) {
            unsafe { ptr::write_unaligned((column as *mut T).offset(i as isize), missing) };
        }
    }
}

/// Closed dispatch over the scalar kinds, resolved once per attribute lookup.
#[derive(Debug, Clone, Copy)]
pub enum AttributeAccessor<'m> {
    Int32(TypedAttribute<'m, i32>),
    Int8(TypedAttribute<'m, i8>),
    Double(TypedAttribute<'m, f64>),
    Double3(TypedAttribute<'m, RealValueAsym>),
}

macro_rules! dispatch {
    ($self:expr, $typed:ident => $body:expr) => {
        match $self {
            AttributeAccessor::Int32($typed) => $body,
            AttributeAccessor::Int8($typed) => $body,
            AttributeAccessor::Double($typed) => $body,
            AttributeAccessor::Double3($typed) => $body,
        }
    };
}

impl<'m> AttributeAccessor<'m> {
    pub fn new(attribute: &'m MetaAttribute) -> Self {
        fn typed<T>(attribute: &MetaAttribute) -> TypedAttribute<'_, T> {
            TypedAttribute {
                attribute,
                _marker: PhantomData,
            }
        }
        match attribute.ctype {
            CType::Int32 => Self::Int32(typed(attribute)),
            CType::Int8 => Self::Int8(typed(attribute)),
            CType::Double => Self::Double(typed(attribute)),
            CType::Double3 => Self::Double3(typed(attribute)),
        }
    }

    /// # Safety
    /// See [`TypedAttribute::scatter`].
    pub unsafe fn scatter(
        &self,
        buffer: *mut u8,
        src: *const u8,
        offset: Idx,
        count: Idx,
        stride: Idx,
    ) -> Result<(), DataError> {
        dispatch!(self, typed => unsafe { typed.scatter(buffer, src, offset, count, stride) })
    }

    /// # Safety
    /// See [`TypedAttribute::gather`].
    pub unsafe fn gather(
        &self,
        buffer: *const u8,
        dst: *mut u8,
        offset: Idx,
        count: Idx,
        stride: Idx,
    ) -> Result<(), DataError> {
        dispatch!(self, typed => unsafe { typed.gather(buffer, dst, offset, count, stride) })
    }

    /// # Safety
    /// See [`TypedAttribute::fill_missing`].
    pub unsafe fn fill_missing(&self, buffer: *mut u8, offset: Idx, count: Idx) {
        dispatch!(self, typed => unsafe { typed.fill_missing(buffer, offset, count) })
    }

    /// # Safety
    /// See [`TypedAttribute::fill_missing_column`].
    pub unsafe fn fill_missing_column(&self, column: *mut u8, offset: Idx, count: Idx) {
        dispatch!(self, typed => unsafe { typed.fill_missing_column(column, offset, count) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::meta_data::{meta_data, schema::INPUT};

    #[test]
    fn test_missing_sentinels() {
        assert_eq!(<i32 as AttributeType>::missing(), i32::MIN);
        assert_eq!(<i8 as AttributeType>::missing(), i8::MIN);
        assert!(<f64 as AttributeType>::missing().is_nan());
        assert!(RealValueAsym::missing().is_missing());
        assert!(!RealValueAsym::new(f64::NAN, 1.0, f64::NAN).is_missing());
        assert!(!0i32.is_missing());
    }

    #[test]
    fn test_ctype_from_raw() {
        assert_eq!(CType::from_raw(2), Some(CType::Double));
        assert_eq!(CType::from_raw(4), None);
        assert_eq!(CType::Double3.size(), 24);
    }

    #[test]
    fn test_typed_attribute_checks_ctype() {
        let u_rated = meta_data()
            .get_attribute(INPUT, "node", "u_rated")
            .unwrap();
        assert!(TypedAttribute::<f64>::new(u_rated).is_ok());
        let err = TypedAttribute::<i32>::new(u_rated).unwrap_err();
        assert!(err.to_string().contains("node.u_rated"));
        assert!(matches!(u_rated.accessor(), AttributeAccessor::Double(_)));
    }

    #[test]
    fn test_invalid_stride() {
        let id = meta_data().get_attribute(INPUT, "node", "id").unwrap();
        let mut record = [0u8; 16];
        let src = 1i32;
        let res = unsafe {
            id.accessor()
                .scatter(record.as_mut_ptr(), &src as *const i32 as *const u8, 0, 1, -2)
        };
        assert_eq!(res, Err(DataError::InvalidStride { stride: -2 }));
    }
}
