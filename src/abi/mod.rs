//! Opaque-id resource table for foreign callers.
//!
//! Handles, buffers and dataset descriptions live as entities of a `bevy_ecs` [`World`].
//! Callers only ever see [`ResourceId`]s. Datasets are stored as owned descriptions and
//! turned into borrowed [`Dataset`] views for the duration of one operation, so a destroyed
//! buffer is reported instead of dereferenced.
//!
//! Every operation taking a handle id clears that handle first and records at most one
//! error in it.

use std::collections::HashMap;
use std::ptr::{self, NonNull};

use bevy_ecs::prelude::*;
use derive_more::Display;
use tracing::{debug, warn};

use crate::basic::buffer::{Buffer, get_attribute, set_attribute};
use crate::basic::dataset::{
    CallerBuilt, Const, ConstDataset, Dataset, DatasetId, DatasetInfo, DatasetKind, Mutable,
    MutableDataset,
};
use crate::basic::error::{CalculationInfo, DataError, PgmError};
use crate::basic::handle::Handle;
use crate::basic::meta_data::{Idx, meta_data};
use crate::batch::{CalculationEngine, CalculationOptions, calculate_cartesian};

/// Opaque id handed to foreign callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("resource {_0}")]
pub struct ResourceId(u64);

impl ResourceId {
    pub fn from_raw(raw: u64) -> Self {
        ResourceId(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Component, Debug, Default)]
struct HandleSlot(Handle);

#[derive(Component, Debug)]
struct BufferSlot(Buffer);

/// Caller-provided column pointer.
#[derive(Debug, Clone, Copy)]
struct RawColumn(NonNull<u8>);

// Validity and thread safety of foreign pointers are the caller's contract.
unsafe impl Send for RawColumn {}
unsafe impl Sync for RawColumn {}

#[derive(Debug, Clone)]
struct ComponentRecord {
    name: String,
    elements_per_scenario: Idx,
    total_elements: Idx,
    indptr: Option<Vec<Idx>>,
    row: Option<Entity>,
    columns: Vec<(String, RawColumn)>,
}

#[derive(Component, Debug, Clone)]
struct DatasetRecord {
    id: DatasetId,
    kind: DatasetKind,
    name: &'static str,
    is_batch: bool,
    batch_size: Idx,
    components: Vec<ComponentRecord>,
}

/// Successor cartesian axis of a const dataset.
#[derive(Component, Debug, Clone, Copy)]
struct NextAxis(Entity);

/// Typed storage behind opaque ids.
#[derive(Default)]
pub struct ResourceTable {
    world: World,
    ids: HashMap<ResourceId, Entity>,
    next_id: u64,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, entity: Entity) -> ResourceId {
        self.next_id += 1;
        let id = ResourceId(self.next_id);
        self.ids.insert(id, entity);
        id
    }

    fn entity(&self, id: ResourceId) -> Result<Entity, DataError> {
        self.ids
            .get(&id)
            .copied()
            .ok_or(DataError::UnknownResource { id: id.0 })
    }

    fn get<T: Component>(&self, id: ResourceId) -> Result<&T, DataError> {
        self.world
            .get::<T>(self.entity(id)?)
            .ok_or(DataError::UnknownResource { id: id.0 })
    }

    fn get_mut<T: Component<Mutability = bevy_ecs::component::Mutable>>(
        &mut self,
        id: ResourceId,
    ) -> Result<Mut<'_, T>, DataError> {
        let entity = self.entity(id)?;
        self.world
            .get_mut::<T>(entity)
            .ok_or(DataError::UnknownResource { id: id.0 })
    }

    fn remove<T: Component>(&mut self, id: ResourceId) -> bool {
        let Ok(entity) = self.entity(id) else {
            return false;
        };
        if self.world.get::<T>(entity).is_none() {
            return false;
        }
        self.ids.remove(&id);
        self.world.despawn(entity);
        debug!(%id, "resource destroyed");
        true
    }

    /// Runs `op` against the handle `handle`; `None` when the handle is unknown or `op` failed.
    fn with_handle<T, E: Into<PgmError>>(
        &mut self,
        handle: ResourceId,
        op: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Option<T> {
        let Ok(mut slot) = self.get_mut::<HandleSlot>(handle) else {
            warn!(%handle, "operation on an unknown handle");
            return None;
        };
        let mut current = std::mem::take(&mut slot.0);
        let result = current.call(|| op(self));
        if let Ok(mut slot) = self.get_mut::<HandleSlot>(handle) {
            slot.0 = current;
        }
        result
    }

    pub fn create_handle(&mut self) -> ResourceId {
        let entity = self.world.spawn(HandleSlot::default()).id();
        self.insert(entity)
    }

    pub fn destroy_handle(&mut self, handle: ResourceId) -> bool {
        self.remove::<HandleSlot>(handle)
    }

    pub fn handle(&self, handle: ResourceId) -> Option<&Handle> {
        self.get::<HandleSlot>(handle).ok().map(|slot| &slot.0)
    }

    pub fn create_buffer(
        &mut self,
        handle: ResourceId,
        dataset: &str,
        component: &str,
        size: Idx,
    ) -> Option<ResourceId> {
        self.with_handle(handle, |table| {
            let component = meta_data().get_component(dataset, component)?;
            let buffer = Buffer::create(component, size)?;
            let entity = table.world.spawn(BufferSlot(buffer)).id();
            Ok::<_, DataError>(table.insert(entity))
        })
    }

    pub fn destroy_buffer(&mut self, buffer: ResourceId) -> bool {
        self.remove::<BufferSlot>(buffer)
    }

    pub fn buffer(&self, buffer: ResourceId) -> Option<&Buffer> {
        self.get::<BufferSlot>(buffer).ok().map(|slot| &slot.0)
    }

    pub fn buffer_fill_missing(
        &mut self,
        handle: ResourceId,
        buffer: ResourceId,
        offset: Idx,
        count: Idx,
    ) -> Option<()> {
        self.with_handle(handle, |table| {
            table.get_mut::<BufferSlot>(buffer)?.0.fill_missing(offset, count)
        })
    }

    /// Strided scatter of `count` values from `src` into the records of a table buffer.
    ///
    /// # Safety
    /// `src` must be readable at every visited stride position.
    pub unsafe fn buffer_set_attribute(
        &mut self,
        handle: ResourceId,
        buffer: ResourceId,
        attribute: &str,
        src: *const u8,
        offset: Idx,
        count: Idx,
        stride: Idx,
    ) -> Option<()> {
        self.with_handle(handle, |table| {
            let mut slot = table.get_mut::<BufferSlot>(buffer)?;
            let target = &mut slot.0;
            target.check_range(offset, count)?;
            let meta = target.component().get_attribute(attribute)?;
            unsafe { set_attribute(meta, target.as_mut_ptr(), src, offset, count, stride) }
        })
    }

    /// Strided gather of `count` values from the records of a table buffer into `dst`.
    ///
    /// # Safety
    /// `dst` must be writable at every visited stride position.
    pub unsafe fn buffer_get_attribute(
        &mut self,
        handle: ResourceId,
        buffer: ResourceId,
        attribute: &str,
        dst: *mut u8,
        offset: Idx,
        count: Idx,
        stride: Idx,
    ) -> Option<()> {
        self.with_handle(handle, |table| {
            let source = &table.get::<BufferSlot>(buffer)?.0;
            source.check_range(offset, count)?;
            let meta = source.component().get_attribute(attribute)?;
            unsafe { get_attribute(meta, source.as_ptr(), dst, offset, count, stride) }
        })
    }

    /// Creates an empty const or mutable dataset description.
    pub fn create_dataset(
        &mut self,
        handle: ResourceId,
        kind: DatasetKind,
        dataset: &str,
        is_batch: bool,
        batch_size: Idx,
    ) -> Option<ResourceId> {
        self.with_handle(handle, |table| {
            if kind == DatasetKind::Writable {
                return Err(DataError::InvalidArgument {
                    reason: "writable datasets are created by a deserializer".into(),
                });
            }
            // validates the name and batch size
            let probe = ConstDataset::new(is_batch, batch_size, dataset)?;
            let record = DatasetRecord {
                id: probe.id(),
                kind,
                name: probe.name(),
                is_batch,
                batch_size,
                components: Vec::new(),
            };
            let entity = table.world.spawn(record).id();
            Ok(table.insert(entity))
        })
    }

    pub fn destroy_dataset(&mut self, dataset: ResourceId) -> bool {
        self.remove::<DatasetRecord>(dataset)
    }

    /// Adds a component backed by a table buffer, or columnar when `buffer` is `None`.
    pub fn dataset_add_buffer(
        &mut self,
        handle: ResourceId,
        dataset: ResourceId,
        component: &str,
        elements_per_scenario: Idx,
        total_elements: Idx,
        indptr: Option<&[Idx]>,
        buffer: Option<ResourceId>,
    ) -> Option<()> {
        self.with_handle(handle, |table| {
            let row = buffer.map(|id| table.entity(id)).transpose()?;
            table.update_record(dataset, |record| {
                record.components.push(ComponentRecord {
                    name: component.to_string(),
                    elements_per_scenario,
                    total_elements,
                    indptr: indptr.map(<[Idx]>::to_vec),
                    row,
                    columns: Vec::new(),
                });
                Ok(())
            })
        })
    }

    /// Registers a caller-owned attribute column.
    ///
    /// # Safety
    /// `data` must hold `total_elements` values of the attribute for as long as the
    /// dataset is used.
    pub unsafe fn dataset_add_attribute_buffer(
        &mut self,
        handle: ResourceId,
        dataset: ResourceId,
        component: &str,
        attribute: &str,
        data: *mut u8,
    ) -> Option<()> {
        self.with_handle(handle, |table| {
            let data = NonNull::new(data).ok_or_else(|| DataError::NullPointer {
                what: format!("attribute buffer '{}.{}'", component, attribute),
            })?;
            table.update_record(dataset, |record| {
                let dataset = record.name;
                let slice = record
                    .components
                    .iter_mut()
                    .find(|c| c.name == component)
                    .ok_or_else(|| DataError::UnknownComponent {
                        dataset: dataset.to_string(),
                        component: component.to_string(),
                    })?;
                slice.columns.push((attribute.to_string(), RawColumn(data)));
                Ok(())
            })
        })
    }

    pub fn dataset_info(&mut self, handle: ResourceId, dataset: ResourceId) -> Option<DatasetInfo> {
        self.with_handle(handle, |table| {
            let record = table.get::<DatasetRecord>(dataset)?;
            Ok::<_, DataError>(table.materialize::<Const>(record)?.info())
        })
    }

    /// Links `next` as the following cartesian axis of `dataset`.
    pub fn dataset_set_next_cartesian_product_dimension(
        &mut self,
        handle: ResourceId,
        dataset: ResourceId,
        next: ResourceId,
    ) -> Option<()> {
        self.with_handle(handle, |table| {
            let entity = table.entity(dataset)?;
            let record = table.const_record(dataset)?;
            let next_record = table.const_record(next)?;
            if record.name != next_record.name {
                return Err(DataError::InvalidArgument {
                    reason: format!(
                        "cartesian axis of dataset '{}' cannot be a '{}' dataset",
                        record.name, next_record.name
                    ),
                });
            }
            let next_entity = table.entity(next)?;
            let mut cursor = Some(next_entity);
            while let Some(axis) = cursor {
                if axis == entity {
                    return Err(DataError::CyclicAxis { dataset: record.id });
                }
                cursor = table.world.get::<NextAxis>(axis).map(|n| n.0);
            }
            table.world.entity_mut(entity).insert(NextAxis(next_entity));
            Ok(())
        })
    }

    /// Runs a calculation writing into the mutable dataset `output`.
    ///
    /// On success the statistics are also recorded in the handle.
    pub fn calculate<E: CalculationEngine>(
        &mut self,
        handle: ResourceId,
        engine: &E,
        options: &CalculationOptions,
        output: ResourceId,
        update: Option<ResourceId>,
    ) -> Option<CalculationInfo> {
        let info = self.with_handle(handle, |table| table.run_calculation(engine, options, output, update))?;
        if let Ok(mut slot) = self.get_mut::<HandleSlot>(handle) {
            slot.0.record_statistics(info.clone());
        }
        Some(info)
    }

    fn run_calculation<E: CalculationEngine>(
        &self,
        engine: &E,
        options: &CalculationOptions,
        output: ResourceId,
        update: Option<ResourceId>,
    ) -> Result<CalculationInfo, PgmError> {
        let output_record = self.get::<DatasetRecord>(output)?;
        if output_record.kind != DatasetKind::Mutable {
            return Err(DataError::InvalidArgument {
                reason: format!("{} is not a mutable dataset", output),
            }
            .into());
        }
        let mut output_dataset: MutableDataset<'_> = self.materialize(output_record)?;
        let axes = match update {
            None => Vec::new(),
            Some(update) => self
                .axis_records(update)?
                .into_iter()
                .map(|record| self.materialize::<Const>(record))
                .collect::<Result<Vec<_>, _>>()?,
        };
        if axes.is_empty() {
            return crate::batch::calculate(engine, options, &mut output_dataset, None);
        }
        calculate_cartesian(engine, options, &mut output_dataset, axes.iter().collect())
    }

    fn update_record(
        &mut self,
        dataset: ResourceId,
        change: impl FnOnce(&mut DatasetRecord) -> Result<(), DataError>,
    ) -> Result<(), DataError> {
        let mut record = self.get::<DatasetRecord>(dataset)?.clone();
        change(&mut record)?;
        // build a throwaway view to run every shape check
        match record.kind {
            DatasetKind::Mutable => {
                self.materialize::<Mutable>(&record)?;
            }
            _ => {
                self.materialize::<Const>(&record)?;
            }
        }
        *self.get_mut::<DatasetRecord>(dataset)? = record;
        Ok(())
    }

    fn const_record(&self, dataset: ResourceId) -> Result<&DatasetRecord, DataError> {
        let record = self.get::<DatasetRecord>(dataset)?;
        if record.kind != DatasetKind::Const {
            return Err(DataError::InvalidArgument {
                reason: format!("{} is not a const dataset", dataset),
            });
        }
        Ok(record)
    }

    /// `update` followed by every linked axis.
    fn axis_records(&self, update: ResourceId) -> Result<Vec<&DatasetRecord>, DataError> {
        let mut records = vec![self.const_record(update)?];
        let mut cursor = self.world.get::<NextAxis>(self.entity(update)?).map(|n| n.0);
        while let Some(entity) = cursor {
            let record = self
                .world
                .get::<DatasetRecord>(entity)
                .ok_or(DataError::NullPointer {
                    what: "destroyed cartesian axis".into(),
                })?;
            records.push(record);
            cursor = self.world.get::<NextAxis>(entity).map(|n| n.0);
        }
        Ok(records)
    }

    fn materialize<'r, C: CallerBuilt>(&'r self, record: &'r DatasetRecord) -> Result<Dataset<'r, C>, DataError> {
        let mut dataset = Dataset::<C>::new(record.is_batch, record.batch_size, record.name)?;
        for component in &record.components {
            let data = match component.row {
                None => ptr::null(),
                Some(entity) => {
                    let buffer = &self
                        .world
                        .get::<BufferSlot>(entity)
                        .ok_or_else(|| DataError::NullPointer {
                            what: format!("destroyed buffer of component '{}'", component.name),
                        })?
                        .0;
                    buffer.check_range(0, component.total_elements)?;
                    buffer.as_ptr()
                }
            };
            unsafe {
                dataset.add_buffer_raw(
                    &component.name,
                    component.elements_per_scenario,
                    component.total_elements,
                    component.indptr.as_deref(),
                    data,
                )?;
                for (attribute, column) in &component.columns {
                    dataset.add_attribute_buffer_raw(&component.name, attribute, column.0.as_ptr())?;
                }
            }
        }
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::handle::ErrorCode;
    use crate::basic::meta_data::schema::{INPUT, UPDATE};

    #[test]
    fn test_handle_lifecycle() {
        let mut table = ResourceTable::new();
        let handle = table.create_handle();
        assert!(table.create_buffer(handle, INPUT, "no_such", 3).is_none());
        let h = table.handle(handle).unwrap();
        assert_eq!(h.error_code(), ErrorCode::RegularError);
        assert!(h.error_message().contains("no_such"));

        let buffer = table.create_buffer(handle, INPUT, "node", 3).unwrap();
        assert_eq!(table.handle(handle).unwrap().error_code(), ErrorCode::NoError);
        assert!(!table.destroy_handle(buffer));
        assert!(table.destroy_buffer(buffer));
        assert!(!table.destroy_buffer(buffer));
        assert!(table.destroy_handle(handle));
        assert!(table.create_buffer(handle, INPUT, "node", 3).is_none());
    }

    #[test]
    fn test_buffer_attribute_access() {
        let mut table = ResourceTable::new();
        let handle = table.create_handle();
        let buffer = table.create_buffer(handle, INPUT, "node", 2).unwrap();
        table.buffer_fill_missing(handle, buffer, 0, 2).unwrap();
        let ids = [3i32, 4];
        let mut u = [0.0f64; 2];
        unsafe {
            table
                .buffer_set_attribute(handle, buffer, "id", ids.as_ptr() as *const u8, 0, 2, -1)
                .unwrap();
            table
                .buffer_get_attribute(handle, buffer, "u_rated", u.as_mut_ptr() as *mut u8, 0, 2, -1)
                .unwrap();
            assert!(table
                .buffer_set_attribute(handle, buffer, "id", ids.as_ptr() as *const u8, 1, 2, -1)
                .is_none());
        }
        assert!(u.iter().all(|x| x.is_nan()));
        assert_eq!(table.buffer(buffer).unwrap().values::<i32>("id", 0, 2).unwrap(), vec![3, 4]);
    }

    #[test]
    fn test_dataset_shape_checks() {
        let mut table = ResourceTable::new();
        let handle = table.create_handle();
        let buffer = table.create_buffer(handle, UPDATE, "source", 3).unwrap();
        let dataset = table
            .create_dataset(handle, DatasetKind::Const, UPDATE, true, 2)
            .unwrap();
        assert!(table
            .dataset_add_buffer(handle, dataset, "source", 1, 3, None, Some(buffer))
            .is_none());
        assert!(table.handle(handle).unwrap().error_message().contains("source"));
        table
            .dataset_add_buffer(handle, dataset, "source", 1, 2, None, Some(buffer))
            .unwrap();
        let info = table.dataset_info(handle, dataset).unwrap();
        assert_eq!(info.n_components(), 1);

        table.destroy_buffer(buffer);
        assert!(table.dataset_info(handle, dataset).is_none());
    }

    #[test]
    fn test_cartesian_links_reject_cycles() {
        let mut table = ResourceTable::new();
        let handle = table.create_handle();
        let a = table.create_dataset(handle, DatasetKind::Const, UPDATE, true, 2).unwrap();
        let b = table.create_dataset(handle, DatasetKind::Const, UPDATE, true, 3).unwrap();
        assert!(table.dataset_set_next_cartesian_product_dimension(handle, a, a).is_none());
        assert_eq!(table.handle(handle).unwrap().error_code(), ErrorCode::RegularError);
        table.dataset_set_next_cartesian_product_dimension(handle, a, b).unwrap();
        assert!(table.dataset_set_next_cartesian_product_dimension(handle, b, a).is_none());
        let expected = DataError::CyclicAxis {
            dataset: table.get::<DatasetRecord>(b).unwrap().id,
        };
        assert_eq!(table.handle(handle).unwrap().error_message(), expected.to_string());
        assert_eq!(table.axis_records(a).unwrap().len(), 2);
    }

    #[test]
    fn test_out_of_range_offsets_are_regular_errors() {
        let mut table = ResourceTable::new();
        let handle = table.create_handle();
        let buffer = table.create_buffer(handle, INPUT, "node", 2).unwrap();
        assert!(table.buffer_fill_missing(handle, buffer, Idx::MAX, 1).is_none());
        assert_eq!(table.handle(handle).unwrap().error_code(), ErrorCode::RegularError);

        let id = 7i32;
        let mut u = 0.0f64;
        unsafe {
            assert!(table
                .buffer_set_attribute(handle, buffer, "id", &id as *const i32 as *const u8, Idx::MAX, 1, 0)
                .is_none());
            assert_eq!(table.handle(handle).unwrap().error_code(), ErrorCode::RegularError);
            assert!(table
                .buffer_get_attribute(handle, buffer, "u_rated", &mut u as *mut f64 as *mut u8, 1, Idx::MAX, -1)
                .is_none());
        }
        assert_eq!(table.handle(handle).unwrap().error_code(), ErrorCode::RegularError);
    }
}
