use std::borrow::Cow;
use std::ptr::{self, NonNull};

use crate::basic::attribute::{AttributeType, CType, TypedAttribute};
use crate::basic::buffer;
use crate::basic::error::DataError;
use crate::basic::meta_data::{Idx, MetaAttribute, MetaComponent};

/// Per-scenario element count of a component.
#[derive(Debug, Clone, PartialEq)]
pub enum Cardinality<'a> {
    /// Every scenario holds the same number of elements.
    Uniform(Idx),
    /// Scenario `i` holds elements `[indptr[i], indptr[i + 1])`.
    Ragged(Cow<'a, [Idx]>),
}

/// A row buffer handed to a dataset.
#[derive(Debug, Clone, Copy)]
pub struct RowData {
    pub(crate) component: &'static MetaComponent,
    pub(crate) data: NonNull<u8>,
    pub(crate) len: Idx,
}

/// One attribute column handed to a dataset.
#[derive(Debug, Clone, Copy)]
pub struct ColumnData {
    pub(crate) ctype: CType,
    pub(crate) data: NonNull<u8>,
    pub(crate) len: Idx,
}

/// A registered attribute column.
#[derive(Debug, Clone, Copy)]
pub struct AttributeColumn {
    pub(crate) attribute: &'static MetaAttribute,
    pub(crate) data: NonNull<u8>,
}

impl AttributeColumn {
    pub fn attribute(&self) -> &'static MetaAttribute {
        self.attribute
    }
}

/// Checks `indptr` against a batch of `batch_size` scenarios holding `total` elements.
pub fn validate_indptr(
    component: &str,
    indptr: &[Idx],
    batch_size: Idx,
    total: Idx,
) -> Result<(), DataError> {
    let invalid = |reason: String| DataError::InvalidIndptr {
        component: component.to_string(),
        reason,
    };
    if indptr.len() as Idx != batch_size + 1 {
        return Err(invalid(format!(
            "length {} does not match batch size {} + 1",
            indptr.len(),
            batch_size
        )));
    }
    if indptr[0] != 0 {
        return Err(invalid(format!("first entry is {}, expected 0", indptr[0])));
    }
    if let Some(pos) = indptr.windows(2).position(|w| w[0] > w[1]) {
        return Err(invalid(format!("decreasing at position {}", pos + 1)));
    }
    let last = indptr[indptr.len() - 1];
    if last != total {
        return Err(invalid(format!(
            "last entry is {}, expected total elements {}",
            last, total
        )));
    }
    Ok(())
}

/// Layout of one component inside one dataset.
///
/// Either a single row buffer or a set of attribute columns is attached, never both.
#[derive(Debug, Clone)]
pub struct ComponentSlice<'a> {
    component: &'static MetaComponent,
    cardinality: Cardinality<'a>,
    total_elements: Idx,
    data: Option<NonNull<u8>>,
    columns: Vec<AttributeColumn>,
    indications: Option<Vec<&'static MetaAttribute>>,
}

impl<'a> ComponentSlice<'a> {
    pub(crate) fn new(
        component: &'static MetaComponent,
        cardinality: Cardinality<'a>,
        total_elements: Idx,
        batch_size: Idx,
    ) -> Result<Self, DataError> {
        match &cardinality {
            Cardinality::Uniform(per_scenario) => {
                if *per_scenario < 0 {
                    return Err(DataError::ShapeMismatch {
                        component: component.name.to_string(),
                        reason: format!("negative elements per scenario {}", per_scenario),
                    });
                }
                if per_scenario.checked_mul(batch_size) != Some(total_elements) {
                    return Err(DataError::ShapeMismatch {
                        component: component.name.to_string(),
                        reason: format!(
                            "total elements {} != batch size {} x {} per scenario",
                            total_elements, batch_size, per_scenario
                        ),
                    });
                }
            }
            Cardinality::Ragged(indptr) => {
                validate_indptr(component.name, indptr, batch_size, total_elements)?
            }
        }
        Ok(Self {
            component,
            cardinality,
            total_elements,
            data: None,
            columns: Vec::new(),
            indications: None,
        })
    }

    pub fn name(&self) -> &'static str {
        self.component.name
    }

    pub fn component(&self) -> &'static MetaComponent {
        self.component
    }

    pub fn cardinality(&self) -> &Cardinality<'a> {
        &self.cardinality
    }

    pub fn is_uniform(&self) -> bool {
        matches!(self.cardinality, Cardinality::Uniform(_))
    }

    /// Elements per scenario, `-1` for ragged components.
    pub fn elements_per_scenario(&self) -> Idx {
        match self.cardinality {
            Cardinality::Uniform(n) => n,
            Cardinality::Ragged(_) => -1,
        }
    }

    pub fn total_elements(&self) -> Idx {
        self.total_elements
    }

    pub fn indptr(&self) -> Option<&[Idx]> {
        match &self.cardinality {
            Cardinality::Uniform(_) => None,
            Cardinality::Ragged(indptr) => Some(indptr),
        }
    }

    /// `true` when no row buffer is attached.
    pub fn is_columnar(&self) -> bool {
        self.data.is_none()
    }

    pub fn has_row_buffer(&self) -> bool {
        self.data.is_some()
    }

    pub fn columns(&self) -> &[AttributeColumn] {
        &self.columns
    }

    pub fn column(&self, attribute: &str) -> Option<&AttributeColumn> {
        self.columns.iter().find(|c| c.attribute.name == attribute)
    }

    pub fn attribute_indications(&self) -> Option<&[&'static MetaAttribute]> {
        self.indications.as_deref()
    }

    pub(crate) fn set_indications(&mut self, indications: Option<Vec<&'static MetaAttribute>>) {
        self.indications = indications;
    }

    /// Element range `(start, count)` of `scenario`; `scenario` must be below the batch size.
    pub(crate) fn scenario_range(&self, scenario: Idx) -> (Idx, Idx) {
        match &self.cardinality {
            Cardinality::Uniform(n) => (scenario * n, *n),
            Cardinality::Ragged(indptr) => {
                let i = scenario as usize;
                (indptr[i], indptr[i + 1] - indptr[i])
            }
        }
    }

    pub(crate) fn set_row(&mut self, row: RowData) -> Result<(), DataError> {
        if !ptr::eq(row.component, self.component) && row.component != self.component {
            return Err(DataError::ComponentMismatch {
                expected: self.component.name.to_string(),
                actual: row.component.name.to_string(),
            });
        }
        if !self.columns.is_empty() {
            return Err(DataError::MixedLayout {
                component: self.name().to_string(),
            });
        }
        if row.len < self.total_elements {
            return Err(DataError::InsufficientCapacity {
                component: self.name().to_string(),
                capacity: row.len,
                required: self.total_elements,
            });
        }
        self.data = Some(row.data);
        Ok(())
    }

    pub(crate) fn add_column(&mut self, attribute: &str, column: ColumnData) -> Result<(), DataError> {
        if self.data.is_some() {
            return Err(DataError::MixedLayout {
                component: self.name().to_string(),
            });
        }
        let meta = self.component.get_attribute(attribute)?;
        if meta.ctype != column.ctype {
            return Err(DataError::AttributeTypeMismatch {
                component: self.name().to_string(),
                attribute: meta.name.to_string(),
                actual: meta.ctype,
                requested: column.ctype,
            });
        }
        if self.column(attribute).is_some() {
            return Err(DataError::DuplicateAttributeBuffer {
                component: self.name().to_string(),
                attribute: meta.name.to_string(),
            });
        }
        if column.len < self.total_elements {
            return Err(DataError::InsufficientCapacity {
                component: format!("{}.{}", self.name(), meta.name),
                capacity: column.len,
                required: self.total_elements,
            });
        }
        self.columns.push(AttributeColumn {
            attribute: meta,
            data: column.data,
        });
        Ok(())
    }

    /// Uniform view over elements `[start, start + count)`.
    pub(crate) fn view(&self, start: Idx, count: Idx) -> ComponentSlice<'_> {
        let data = self
            .data
            .map(|p| unsafe { p.add(start as usize * self.component.size) });
        let columns = self
            .columns
            .iter()
            .map(|c| AttributeColumn {
                attribute: c.attribute,
                data: unsafe { c.data.add(start as usize * c.attribute.size) },
            })
            .collect();
        ComponentSlice {
            component: self.component,
            cardinality: Cardinality::Uniform(count),
            total_elements: count,
            data,
            columns,
            indications: self.indications.clone(),
        }
    }

    fn typed<T: AttributeType>(&self, attribute: &str) -> Result<TypedAttribute<'static, T>, DataError> {
        TypedAttribute::new(self.component.get_attribute(attribute)?)
    }

    /// Reads one attribute of every element; unregistered columns read as missing.
    pub(crate) fn read<T: AttributeType>(&self, attribute: &str) -> Result<Vec<T>, DataError> {
        let typed = self.typed::<T>(attribute)?;
        let n = self.total_elements;
        let mut out = vec![T::missing(); n as usize];
        if let Some(data) = self.data {
            unsafe { typed.gather(data.as_ptr(), out.as_mut_ptr() as *mut u8, 0, n, -1)? };
        } else if let Some(column) = self.column(attribute) {
            let src = column.data.as_ptr() as *const T;
            for (i, value) in out.iter_mut().enumerate() {
                *value = unsafe { ptr::read_unaligned(src.add(i)) };
            }
        }
        Ok(out)
    }

    /// Writes one attribute of every element; unregistered columns are skipped.
    ///
    /// # Safety
    /// The attached storage must be writable.
    pub(crate) unsafe fn write<T: AttributeType>(
        &self,
        attribute: &str,
        values: &[T],
    ) -> Result<(), DataError> {
        let typed = self.typed::<T>(attribute)?;
        if values.len() as Idx != self.total_elements {
            return Err(DataError::ShapeMismatch {
                component: self.name().to_string(),
                reason: format!(
                    "{} values for attribute '{}', {} elements",
                    values.len(),
                    attribute,
                    self.total_elements
                ),
            });
        }
        if let Some(data) = self.data {
            unsafe {
                typed.scatter(
                    data.as_ptr(),
                    values.as_ptr() as *const u8,
                    0,
                    self.total_elements,
                    -1,
                )?
            };
        } else if let Some(column) = self.column(attribute) {
            let dst = column.data.as_ptr() as *mut T;
            for (i, value) in values.iter().enumerate() {
                unsafe { ptr::write_unaligned(dst.add(i), *value) };
            }
        }
        Ok(())
    }

    /// # Safety
    /// The attached storage must be writable.
    pub(crate) unsafe fn fill_missing(&self) {
        if let Some(data) = self.data {
            unsafe { buffer::fill_missing(self.component, data.as_ptr(), 0, self.total_elements) };
        } else {
            for column in &self.columns {
                unsafe {
                    column
                        .attribute
                        .accessor()
                        .fill_missing_column(column.data.as_ptr(), 0, self.total_elements)
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_validate_indptr() {
        assert!(validate_indptr("load", &[0, 2, 3, 4], 3, 4).is_ok());
        assert!(validate_indptr("load", &[0, 2, 3, 4], 2, 4).is_err());
        assert!(validate_indptr("load", &[1, 2, 3, 4], 3, 4).is_err());
        assert!(validate_indptr("load", &[0, 3, 2, 4], 3, 4).is_err());
        let err = validate_indptr("load", &[0, 2, 3, 5], 3, 4).unwrap_err();
        assert!(err.to_string().contains("load"));
    }

    proptest! {
        #[test]
        fn prop_valid_indptr_partitions_total(counts in prop::collection::vec(0i64..5, 1..20)) {
            let mut indptr = vec![0];
            for c in &counts {
                indptr.push(indptr.last().unwrap() + c);
            }
            let total: Idx = counts.iter().sum();
            let batch_size = counts.len() as Idx;
            prop_assert!(validate_indptr("load", &indptr, batch_size, total).is_ok());
            let covered: Idx = indptr.windows(2).map(|w| w[1] - w[0]).sum();
            prop_assert_eq!(covered, total);
        }

        #[test]
        fn prop_decreasing_indptr_is_rejected(
            counts in prop::collection::vec(1i64..5, 2..20),
            at in any::<prop::sample::Index>(),
        ) {
            let mut indptr = vec![0];
            for c in &counts {
                indptr.push(indptr.last().unwrap() + c);
            }
            let total = *indptr.last().unwrap();
            // break monotonicity at an interior position
            let i = 1 + at.index(indptr.len() - 2);
            indptr[i] = indptr[i + 1] + 1;
            prop_assert!(validate_indptr("load", &indptr, counts.len() as Idx, total).is_err());
        }
    }
}
