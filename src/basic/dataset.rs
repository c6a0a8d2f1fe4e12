//! Capability-typed views over caller-owned component buffers.
//!
//! A [`Dataset`] never owns element data. It records, per component, how many elements each
//! scenario holds and where the row buffer or attribute columns live. The capability marker
//! decides what may be done through it:
//!
//! * [`Const`]: read-only input or update data, may be chained into cartesian axes.
//! * [`Mutable`]: calculation output, written per scenario.
//! * [`Writable`]: produced by a deserializer, shape fixed, buffers attached by the caller.

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use derive_more::Display;
use tracing::debug;

use super::attribute::AttributeType;
use super::buffer::Buffer;
use super::error::DataError;
use super::meta_data::{Idx, MetaAttribute, MetaComponent, MetaDataset, meta_data};

mod component;
mod info;

pub use component::{
    AttributeColumn, Cardinality, ColumnData, ComponentSlice, RowData, validate_indptr,
};
pub use info::{ComponentInfo, DatasetInfo};

static NEXT_DATASET_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a dataset, shared by its clones and views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("#{_0}")]
pub struct DatasetId(u64);

impl DatasetId {
    fn next() -> Self {
        DatasetId(NEXT_DATASET_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

mod sealed {
    pub trait Sealed {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DatasetKind {
    Const,
    Mutable,
    Writable,
}

pub trait Capability: sealed::Sealed + Send + Sync + 'static {
    const KIND: DatasetKind;
}

/// Capabilities that may write element data.
pub trait WriteAccess: Capability {}

/// Capabilities whose components are declared by the caller.
pub trait CallerBuilt: Capability {}

#[derive(Debug, Clone, Copy, Default)]
pub struct Const;
#[derive(Debug, Clone, Copy, Default)]
pub struct Mutable;
#[derive(Debug, Clone, Copy, Default)]
pub struct Writable;

impl sealed::Sealed for Const {}
impl sealed::Sealed for Mutable {}
impl sealed::Sealed for Writable {}

impl Capability for Const {
    const KIND: DatasetKind = DatasetKind::Const;
}
impl Capability for Mutable {
    const KIND: DatasetKind = DatasetKind::Mutable;
}
impl Capability for Writable {
    const KIND: DatasetKind = DatasetKind::Writable;
}

impl WriteAccess for Mutable {}
impl WriteAccess for Writable {}
impl CallerBuilt for Const {}
impl CallerBuilt for Mutable {}

pub type ConstDataset<'a> = Dataset<'a, Const>;
pub type MutableDataset<'a> = Dataset<'a, Mutable>;
pub type WritableDataset<'a> = Dataset<'a, Writable>;

/// A row buffer a dataset of capability `C` may borrow for `'a`.
///
/// Shared borrows only feed [`Const`] datasets.
pub trait RowSource<'a, C: Capability> {
    fn into_row(self) -> RowData;
}

impl<'a> RowSource<'a, Const> for &'a Buffer {
    fn into_row(self) -> RowData {
        RowData {
            component: self.component(),
            data: self.non_null(),
            len: self.len(),
        }
    }
}

impl<'a, C: Capability> RowSource<'a, C> for &'a mut Buffer {
    fn into_row(self) -> RowData {
        RowData {
            component: self.component(),
            data: self.non_null(),
            len: self.len(),
        }
    }
}

/// An attribute column a dataset of capability `C` may borrow for `'a`.
pub trait ColumnSource<'a, C: Capability> {
    fn into_column(self) -> ColumnData;
}

impl<'a, T: AttributeType> ColumnSource<'a, Const> for &'a [T] {
    fn into_column(self) -> ColumnData {
        ColumnData {
            ctype: T::CTYPE,
            data: NonNull::from(self).cast(),
            len: self.len() as Idx,
        }
    }
}

impl<'a, T: AttributeType, C: Capability> ColumnSource<'a, C> for &'a mut [T] {
    fn into_column(self) -> ColumnData {
        ColumnData {
            ctype: T::CTYPE,
            len: self.len() as Idx,
            data: NonNull::from(self).cast(),
        }
    }
}

/// Schema-bound description of caller-owned component data.
#[derive(Debug)]
pub struct Dataset<'a, C: Capability> {
    id: DatasetId,
    meta: &'static MetaDataset,
    is_batch: bool,
    batch_size: Idx,
    components: Vec<ComponentSlice<'a>>,
    next: Option<&'a Dataset<'a, Const>>,
    _capability: PhantomData<C>,
}

// Element data is only reached through the borrows recorded at construction; writes need
// `&mut self` or go through disjoint scenario views.
unsafe impl<C: Capability> Send for Dataset<'_, C> {}
unsafe impl<C: Capability> Sync for Dataset<'_, C> {}

impl<'a, C: Capability> Dataset<'a, C> {
    fn create(is_batch: bool, batch_size: Idx, dataset_name: &str) -> Result<Self, DataError> {
        let meta = meta_data().get_dataset(dataset_name)?;
        if batch_size < 1 {
            return Err(DataError::InvalidBatchSize {
                batch_size,
                reason: "at least one scenario is required".into(),
            });
        }
        if !is_batch && batch_size != 1 {
            return Err(DataError::InvalidBatchSize {
                batch_size,
                reason: "a single dataset holds exactly one scenario".into(),
            });
        }
        let id = DatasetId::next();
        debug!(%id, dataset = meta.name, kind = %C::KIND, is_batch, batch_size, "dataset created");
        Ok(Self {
            id,
            meta,
            is_batch,
            batch_size,
            components: Vec::new(),
            next: None,
            _capability: PhantomData,
        })
    }

    pub fn id(&self) -> DatasetId {
        self.id
    }

    pub fn kind(&self) -> DatasetKind {
        C::KIND
    }

    pub fn name(&self) -> &'static str {
        self.meta.name
    }

    pub fn meta(&self) -> &'static MetaDataset {
        self.meta
    }

    pub fn is_batch(&self) -> bool {
        self.is_batch
    }

    pub fn batch_size(&self) -> Idx {
        self.batch_size
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> &[ComponentSlice<'a>] {
        &self.components
    }

    pub fn get_component(&self, name: &str) -> Option<&ComponentSlice<'a>> {
        self.components.iter().find(|c| c.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_component(name).is_some()
    }

    pub fn info(&self) -> DatasetInfo {
        DatasetInfo {
            name: self.meta.name,
            is_batch: self.is_batch,
            batch_size: self.batch_size,
            components: self.components.iter().map(ComponentInfo::from_slice).collect(),
        }
    }

    fn slice(&self, name: &str) -> Result<&ComponentSlice<'a>, DataError> {
        self.get_component(name)
            .ok_or_else(|| self.unknown_component(name))
    }

    fn slice_mut(&mut self, name: &str) -> Result<&mut ComponentSlice<'a>, DataError> {
        let dataset = self.meta.name;
        self.components
            .iter_mut()
            .find(|c| c.name() == name)
            .ok_or_else(|| DataError::UnknownComponent {
                dataset: dataset.to_string(),
                component: name.to_string(),
            })
    }

    fn unknown_component(&self, name: &str) -> DataError {
        DataError::UnknownComponent {
            dataset: self.meta.name.to_string(),
            component: name.to_string(),
        }
    }

    fn component_meta(&self, name: &str) -> Result<&'static MetaComponent, DataError> {
        let meta: &'static MetaDataset = self.meta;
        meta.get_component(name)
    }

    fn push_slice(
        &mut self,
        name: &str,
        cardinality: Cardinality<'a>,
        total_elements: Idx,
        row: Option<RowData>,
    ) -> Result<&mut ComponentSlice<'a>, DataError> {
        let component = self.component_meta(name)?;
        if self.contains(name) {
            return Err(DataError::DuplicateComponent {
                component: name.to_string(),
            });
        }
        let mut slice = ComponentSlice::new(component, cardinality, total_elements, self.batch_size)?;
        if let Some(row) = row {
            slice.set_row(row)?;
        }
        debug!(
            dataset = self.meta.name,
            component = component.name,
            total_elements,
            uniform = slice.is_uniform(),
            row = slice.has_row_buffer(),
            "component added"
        );
        self.components.push(slice);
        let last = self.components.len() - 1;
        Ok(&mut self.components[last])
    }

    /// Reads one attribute of every element of `component`, in element order.
    pub fn attribute_values<T: AttributeType>(
        &self,
        component: &str,
        attribute: &str,
    ) -> Result<Vec<T>, DataError> {
        self.slice(component)?.read(attribute)
    }

    fn check_scenario(&self, scenario: Idx) -> Result<(), DataError> {
        if scenario < 0 || scenario >= self.batch_size {
            return Err(DataError::ScenarioOutOfRange {
                index: scenario,
                batch_size: self.batch_size,
            });
        }
        Ok(())
    }

    fn scenario_components(&self, scenario: Idx) -> Result<Vec<ComponentSlice<'_>>, DataError> {
        self.check_scenario(scenario)?;
        Ok(self
            .components
            .iter()
            .map(|slice| {
                let (start, count) = slice.scenario_range(scenario);
                slice.view(start, count)
            })
            .collect())
    }

    /// Read-only single-scenario view of scenario `scenario`.
    pub fn scenario(&self, scenario: Idx) -> Result<ConstDataset<'_>, DataError> {
        let components = self.scenario_components(scenario)?;
        Ok(Dataset {
            id: self.id,
            meta: self.meta,
            is_batch: false,
            batch_size: 1,
            components,
            next: None,
            _capability: PhantomData,
        })
    }
}

impl<'a, C: CallerBuilt> Dataset<'a, C> {
    /// Creates an empty dataset of schema `dataset_name`.
    pub fn new(is_batch: bool, batch_size: Idx, dataset_name: &str) -> Result<Self, DataError> {
        Self::create(is_batch, batch_size, dataset_name)
    }

    /// Adds a component with `elements_per_scenario` elements in every scenario, backed by a
    /// row buffer.
    pub fn add_uniform<R: RowSource<'a, C>>(
        &mut self,
        name: &str,
        elements_per_scenario: Idx,
        total_elements: Idx,
        buffer: R,
    ) -> Result<(), DataError> {
        self.push_slice(
            name,
            Cardinality::Uniform(elements_per_scenario),
            total_elements,
            Some(buffer.into_row()),
        )?;
        Ok(())
    }

    /// Uniform component whose columns are registered with [`Dataset::add_attribute_buffer`].
    pub fn add_uniform_columnar(
        &mut self,
        name: &str,
        elements_per_scenario: Idx,
        total_elements: Idx,
    ) -> Result<(), DataError> {
        self.push_slice(
            name,
            Cardinality::Uniform(elements_per_scenario),
            total_elements,
            None,
        )?;
        Ok(())
    }

    /// Adds a component whose scenario `i` spans `[indptr[i], indptr[i + 1])`.
    pub fn add_ragged<R: RowSource<'a, C>>(
        &mut self,
        name: &str,
        total_elements: Idx,
        indptr: &'a [Idx],
        buffer: R,
    ) -> Result<(), DataError> {
        self.push_slice(
            name,
            Cardinality::Ragged(indptr.into()),
            total_elements,
            Some(buffer.into_row()),
        )?;
        Ok(())
    }

    pub fn add_ragged_columnar(
        &mut self,
        name: &str,
        total_elements: Idx,
        indptr: &'a [Idx],
    ) -> Result<(), DataError> {
        self.push_slice(name, Cardinality::Ragged(indptr.into()), total_elements, None)?;
        Ok(())
    }

    /// Registers one attribute column of a columnar component.
    pub fn add_attribute_buffer<S: ColumnSource<'a, C>>(
        &mut self,
        component: &str,
        attribute: &str,
        column: S,
    ) -> Result<(), DataError> {
        self.slice_mut(component)?
            .add_column(attribute, column.into_column())
    }

    /// Pointer-level [`Dataset::add_uniform`] and [`Dataset::add_ragged`]; a null `data`
    /// declares a columnar component.
    ///
    /// # Safety
    /// A non-null `data` must point to `total_elements` records of the component, valid
    /// for `'a`, and writable when `C` has write access.
    pub unsafe fn add_buffer_raw(
        &mut self,
        name: &str,
        elements_per_scenario: Idx,
        total_elements: Idx,
        indptr: Option<&'a [Idx]>,
        data: *const u8,
    ) -> Result<(), DataError> {
        let cardinality = match (elements_per_scenario, indptr) {
            (n, None) if n >= 0 => Cardinality::Uniform(n),
            (-1, Some(indptr)) => Cardinality::Ragged(indptr.into()),
            (n, _) => {
                return Err(DataError::InvalidArgument {
                    reason: format!(
                        "component '{}': elements per scenario {} needs {}",
                        name,
                        n,
                        if n < 0 { "an indptr" } else { "no indptr" }
                    ),
                });
            }
        };
        let component = self.component_meta(name)?;
        let row = NonNull::new(data.cast_mut()).map(|data| RowData {
            component,
            data,
            len: total_elements,
        });
        self.push_slice(name, cardinality, total_elements, row)?;
        Ok(())
    }

    /// Pointer-level [`Dataset::add_attribute_buffer`].
    ///
    /// # Safety
    /// `data` must point to `total_elements` values of the attribute type, valid for `'a`.
    pub unsafe fn add_attribute_buffer_raw(
        &mut self,
        component: &str,
        attribute: &str,
        data: *const u8,
    ) -> Result<(), DataError> {
        let slice = self.slice_mut(component)?;
        let meta = slice.component().get_attribute(attribute)?;
        let data = NonNull::new(data.cast_mut()).ok_or_else(|| DataError::NullPointer {
            what: format!("attribute buffer '{}.{}'", component, attribute),
        })?;
        let column = ColumnData {
            ctype: meta.ctype,
            data,
            len: slice.total_elements(),
        };
        slice.add_column(attribute, column)
    }
}

impl<'a, C: WriteAccess> Dataset<'a, C> {
    /// Writes one attribute of every element of `component`.
    pub fn set_attribute_values<T: AttributeType>(
        &mut self,
        component: &str,
        attribute: &str,
        values: &[T],
    ) -> Result<(), DataError> {
        let slice = self.slice(component)?;
        unsafe { slice.write(attribute, values) }
    }

    /// Sets every registered attribute of `component` to missing.
    pub fn fill_missing(&mut self, component: &str) -> Result<(), DataError> {
        let slice = self.slice(component)?;
        unsafe { slice.fill_missing() };
        Ok(())
    }

    pub fn fill_all_missing(&mut self) {
        for slice in &self.components {
            unsafe { slice.fill_missing() };
        }
    }

    /// Read-only view with the same identity.
    pub fn as_const(&self) -> ConstDataset<'_> {
        Dataset {
            id: self.id,
            meta: self.meta,
            is_batch: self.is_batch,
            batch_size: self.batch_size,
            components: self.components.clone(),
            next: self.next,
            _capability: PhantomData,
        }
    }
}

impl<'a> Dataset<'a, Mutable> {
    /// Writable view of one scenario.
    pub fn scenario_mut(&mut self, scenario: Idx) -> Result<MutableDataset<'_>, DataError> {
        unsafe { self.scenario_view_mut(scenario) }
    }

    /// # Safety
    /// No two live views may cover the same scenario, and no other writer may touch the
    /// underlying storage while a view is alive.
    pub(crate) unsafe fn scenario_view_mut(
        &self,
        scenario: Idx,
    ) -> Result<MutableDataset<'_>, DataError> {
        let components = self.scenario_components(scenario)?;
        Ok(Dataset {
            id: self.id,
            meta: self.meta,
            is_batch: false,
            batch_size: 1,
            components,
            next: None,
            _capability: PhantomData,
        })
    }
}

impl<'a> Dataset<'a, Writable> {
    pub(crate) fn new_writable(
        is_batch: bool,
        batch_size: Idx,
        dataset_name: &str,
    ) -> Result<Self, DataError> {
        Self::create(is_batch, batch_size, dataset_name)
    }

    /// Declares a component discovered in a payload; buffers are attached later.
    pub(crate) fn add_component_info(
        &mut self,
        name: &str,
        cardinality: Cardinality<'a>,
        total_elements: Idx,
        indications: Option<Vec<&'static MetaAttribute>>,
    ) -> Result<(), DataError> {
        let slice = self.push_slice(name, cardinality, total_elements, None)?;
        slice.set_indications(indications);
        Ok(())
    }

    /// Attaches a row buffer to a declared component.
    pub fn set_buffer<R: RowSource<'a, Writable>>(
        &mut self,
        component: &str,
        buffer: R,
    ) -> Result<(), DataError> {
        self.slice_mut(component)?.set_row(buffer.into_row())
    }

    /// Attaches one attribute column to a declared component; attributes left without a
    /// column are skipped when parsing.
    pub fn set_attribute_buffer<S: ColumnSource<'a, Writable>>(
        &mut self,
        component: &str,
        attribute: &str,
        column: S,
    ) -> Result<(), DataError> {
        self.slice_mut(component)?
            .add_column(attribute, column.into_column())
    }
}

impl<'a> Dataset<'a, Const> {
    /// Makes `next` the following cartesian axis of this dataset.
    ///
    /// Fails when this dataset is reachable from `next`, which covers `next` being a
    /// clone of this dataset.
    pub fn set_next_cartesian_product_dimension(
        &mut self,
        next: &'a ConstDataset<'a>,
    ) -> Result<(), DataError> {
        if next.meta.name != self.meta.name {
            return Err(DataError::InvalidArgument {
                reason: format!(
                    "cartesian axis of dataset '{}' cannot be a '{}' dataset",
                    self.meta.name, next.meta.name
                ),
            });
        }
        let mut cursor = Some(next);
        while let Some(axis) = cursor {
            if axis.id == self.id {
                return Err(DataError::CyclicAxis { dataset: self.id });
            }
            cursor = axis.next;
        }
        debug!(dataset = %self.id, next = %next.id, "cartesian axis linked");
        self.next = Some(next);
        Ok(())
    }

    pub fn next_cartesian_product_dimension(&self) -> Option<&'a ConstDataset<'a>> {
        self.next
    }

    /// This dataset followed by every linked axis.
    pub fn cartesian_axes(&self) -> Vec<&ConstDataset<'a>> {
        let mut axes = vec![self];
        let mut cursor = self.next;
        while let Some(axis) = cursor {
            if axes.iter().any(|a| a.id == axis.id) {
                break;
            }
            axes.push(axis);
            cursor = axis.next;
        }
        axes
    }

    /// Product of the batch sizes along the axis chain.
    pub fn total_scenarios(&self) -> Result<Idx, DataError> {
        self.cartesian_axes().iter().try_fold(1 as Idx, |total, axis| {
            total
                .checked_mul(axis.batch_size)
                .ok_or(DataError::InvalidBatchSize {
                    batch_size: axis.batch_size,
                    reason: "total number of cartesian scenarios overflows".into(),
                })
        })
    }
}

impl Clone for Dataset<'_, Const> {
    fn clone(&self) -> Self {
        Dataset {
            id: self.id,
            meta: self.meta,
            is_batch: self.is_batch,
            batch_size: self.batch_size,
            components: self.components.clone(),
            next: self.next,
            _capability: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::meta_data::schema::{INPUT, SYM_OUTPUT, UPDATE};

    fn buffer(dataset: &str, component: &str, len: Idx) -> Buffer {
        let meta = meta_data().get_component(dataset, component).unwrap();
        let mut buffer = Buffer::create(meta, len).unwrap();
        buffer.fill_missing(0, len).unwrap();
        buffer
    }

    #[test]
    fn test_uniform_and_ragged_shapes() {
        let source = buffer(UPDATE, "source", 3);
        let load = buffer(UPDATE, "sym_load", 4);
        let indptr = [0, 2, 3, 4];

        let mut dataset = ConstDataset::new(true, 3, UPDATE).unwrap();
        dataset.add_uniform("source", 1, 3, &source).unwrap();
        dataset.add_ragged("sym_load", 4, &indptr, &load).unwrap();
        let info = dataset.info();
        assert_eq!(info.n_components(), 2);
        assert_eq!(info.elements_per_scenario(1), Some(-1));

        let mut dataset = ConstDataset::new(true, 2, UPDATE).unwrap();
        assert!(matches!(
            dataset.add_uniform("source", 1, 3, &source),
            Err(DataError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            dataset.add_ragged("sym_load", 4, &indptr, &load),
            Err(DataError::InvalidIndptr { .. })
        ));
    }

    #[test]
    fn test_uniform_shape_product_overflow() {
        let mut dataset = ConstDataset::new(true, 4, UPDATE).unwrap();
        assert!(matches!(
            dataset.add_uniform_columnar("source", 1 << 62, 0),
            Err(DataError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            unsafe { dataset.add_buffer_raw("source", Idx::MAX, 4, None, std::ptr::null()) },
            Err(DataError::ShapeMismatch { .. })
        ));
        assert_eq!(dataset.n_components(), 0);
    }

    #[test]
    fn test_construction_errors() {
        assert!(matches!(
            ConstDataset::new(false, 2, INPUT),
            Err(DataError::InvalidBatchSize { .. })
        ));
        assert!(matches!(
            ConstDataset::new(true, 1, "no_such"),
            Err(DataError::UnknownDataset { .. })
        ));

        let nodes = buffer(INPUT, "node", 2);
        let lines = buffer(INPUT, "line", 2);
        let line_ids = [1i32, 2];
        let mut dataset = ConstDataset::new(false, 1, INPUT).unwrap();
        assert!(matches!(
            dataset.add_uniform("line", 2, 2, &nodes),
            Err(DataError::ComponentMismatch { .. })
        ));
        assert!(matches!(
            dataset.add_uniform("node", 3, 3, &nodes),
            Err(DataError::InsufficientCapacity { .. })
        ));
        dataset.add_uniform("node", 2, 2, &nodes).unwrap();
        assert!(matches!(
            dataset.add_uniform("node", 2, 2, &nodes),
            Err(DataError::DuplicateComponent { .. })
        ));
        dataset.add_uniform("line", 2, 2, &lines).unwrap();
        assert!(matches!(
            dataset.add_attribute_buffer("line", "id", &line_ids[..]),
            Err(DataError::MixedLayout { .. })
        ));
    }

    #[test]
    fn test_columnar_component() {
        let ids = [1i32, 2, 3];
        let u_rated = [10.0f64, 10.0, 0.4];
        let mut dataset = ConstDataset::new(false, 1, INPUT).unwrap();
        dataset.add_uniform_columnar("node", 3, 3).unwrap();
        dataset.add_attribute_buffer("node", "id", &ids[..]).unwrap();
        assert!(matches!(
            dataset.add_attribute_buffer("node", "id", &ids[..]),
            Err(DataError::DuplicateAttributeBuffer { .. })
        ));
        assert!(matches!(
            dataset.add_attribute_buffer("node", "u_rated", &ids[..]),
            Err(DataError::AttributeTypeMismatch { .. })
        ));
        dataset
            .add_attribute_buffer("node", "u_rated", &u_rated[..])
            .unwrap();
        assert_eq!(dataset.attribute_values::<i32>("node", "id").unwrap(), ids);
        assert_eq!(
            dataset.attribute_values::<f64>("node", "u_rated").unwrap(),
            u_rated
        );
    }

    #[test]
    fn test_scenario_views() {
        let mut load = buffer(UPDATE, "sym_load", 4);
        load.set_values("id", 0, &[10i32, 11, 12, 13]).unwrap();
        let indptr = [0, 2, 3, 4];
        let mut dataset = ConstDataset::new(true, 3, UPDATE).unwrap();
        dataset.add_ragged("sym_load", 4, &indptr, &load).unwrap();

        let first = dataset.scenario(0).unwrap();
        assert!(!first.is_batch());
        assert_eq!(first.id(), dataset.id());
        assert_eq!(first.attribute_values::<i32>("sym_load", "id").unwrap(), [10, 11]);
        let last = dataset.scenario(2).unwrap();
        assert_eq!(last.attribute_values::<i32>("sym_load", "id").unwrap(), [13]);
        for scenario in [3, -1, Idx::MAX] {
            assert!(matches!(
                dataset.scenario(scenario),
                Err(DataError::ScenarioOutOfRange { .. })
            ));
        }
    }

    #[test]
    fn test_mutable_scenario_write() {
        let mut nodes = buffer(SYM_OUTPUT, "node", 4);
        {
            let mut output = MutableDataset::new(true, 2, SYM_OUTPUT).unwrap();
            output.add_uniform("node", 2, 4, &mut nodes).unwrap();
            let mut second = output.scenario_mut(1).unwrap();
            second
                .set_attribute_values("node", "u_pu", &[1.0, 0.98])
                .unwrap();
            assert!(matches!(
                second.set_attribute_values("node", "u_pu", &[1.0]),
                Err(DataError::ShapeMismatch { .. })
            ));
        }
        let u = nodes.values::<f64>("u_pu", 0, 4).unwrap();
        assert!(u[0].is_nan() && u[1].is_nan());
        assert_eq!(&u[2..], &[1.0, 0.98]);
    }

    #[test]
    fn test_cartesian_chain() {
        let a_buf = buffer(UPDATE, "source", 2);
        let b_buf = buffer(UPDATE, "source", 3);
        let c_buf = buffer(UPDATE, "source", 4);
        let mut c = ConstDataset::new(true, 4, UPDATE).unwrap();
        c.add_uniform("source", 1, 4, &c_buf).unwrap();
        let mut b = ConstDataset::new(true, 3, UPDATE).unwrap();
        b.add_uniform("source", 1, 3, &b_buf).unwrap();
        b.set_next_cartesian_product_dimension(&c).unwrap();
        let mut a = ConstDataset::new(true, 2, UPDATE).unwrap();
        a.add_uniform("source", 1, 2, &a_buf).unwrap();
        a.set_next_cartesian_product_dimension(&b).unwrap();
        assert_eq!(a.total_scenarios(), Ok(24));
        assert_eq!(a.cartesian_axes().len(), 3);

        // a clone shares identity
        let b_alias = b.clone();
        let mut b2 = b.clone();
        assert!(matches!(
            b2.set_next_cartesian_product_dimension(&b_alias),
            Err(DataError::CyclicAxis { .. })
        ));
        let input = ConstDataset::new(false, 1, INPUT).unwrap();
        assert!(matches!(
            b2.set_next_cartesian_product_dimension(&input),
            Err(DataError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_total_scenarios_overflow() {
        let b = ConstDataset::new(true, 1 << 40, UPDATE).unwrap();
        let mut a = ConstDataset::new(true, 1 << 40, UPDATE).unwrap();
        a.set_next_cartesian_product_dimension(&b).unwrap();
        assert!(matches!(
            a.total_scenarios(),
            Err(DataError::InvalidBatchSize { .. })
        ));
    }

    #[test]
    fn test_transitive_cycle_is_rejected() {
        let mut a = ConstDataset::new(true, 2, UPDATE).unwrap();
        let a_alias = a.clone();
        let mut b = ConstDataset::new(true, 3, UPDATE).unwrap();
        b.set_next_cartesian_product_dimension(&a_alias).unwrap();
        assert_eq!(b.total_scenarios(), Ok(6));
        assert!(matches!(
            a.set_next_cartesian_product_dimension(&b),
            Err(DataError::CyclicAxis { .. })
        ));
    }
}
