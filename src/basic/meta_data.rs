//! Read-only reflection over datasets, components and attributes.
//!
//! The registry is built once on first access and handed out as `&'static MetaData`;
//! every reference obtained through it lives for the rest of the process.

use std::sync::LazyLock;

use tracing::debug;

use super::attribute::{AttributeAccessor, AttributeType, CType};
use super::error::DataError;

pub mod schema;

/// Index type used for element counts, offsets and index pointers.
pub type Idx = i64;
/// Element id type.
pub type ID = i32;
/// Small integral type used for status flags and enumerations.
pub type IntS = i8;
/// Three-phase real value.
pub type RealValueAsym = nalgebra::Vector3<f64>;

/// Describes one scalar field inside a fixed-layout record.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaAttribute {
    pub name: &'static str,
    pub ctype: CType,
    /// Byte offset inside the record.
    pub offset: usize,
    /// Byte size of the scalar.
    pub size: usize,
    /// Name of the owning component.
    pub component: &'static str,
    /// Byte size of the owning record.
    pub component_size: usize,
}

impl MetaAttribute {
    pub fn new<T: AttributeType>(name: &'static str, offset: usize) -> Self {
        Self {
            name,
            ctype: T::CTYPE,
            offset,
            size: size_of::<T>(),
            component: "",
            component_size: 0,
        }
    }

    /// Resolves the scalar kind once into a typed accessor.
    pub fn accessor(&self) -> AttributeAccessor<'_> {
        AttributeAccessor::new(self)
    }
}

/// Describes one record layout.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaComponent {
    pub name: &'static str,
    pub size: usize,
    pub alignment: usize,
    pub attributes: Vec<MetaAttribute>,
}

impl MetaComponent {
    pub fn n_attributes(&self) -> usize {
        self.attributes.len()
    }

    pub fn get_attribute(&self, name: &str) -> Result<&MetaAttribute, DataError> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| DataError::UnknownAttribute {
                component: self.name.to_string(),
                attribute: name.to_string(),
            })
    }

    pub fn attribute_by_index(&self, idx: usize) -> Option<&MetaAttribute> {
        self.attributes.get(idx)
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }
}

/// Implemented by `#[repr(C)]` record structs through `#[derive(ComponentLayout)]`.
pub trait ComponentLayout: Sized {
    fn attributes() -> Vec<MetaAttribute>;

    fn meta(name: &'static str) -> MetaComponent {
        let size = size_of::<Self>();
        let attributes = Self::attributes()
            .into_iter()
            .map(|a| MetaAttribute {
                component: name,
                component_size: size,
                ..a
            })
            .collect();
        MetaComponent {
            name,
            size,
            alignment: align_of::<Self>(),
            attributes,
        }
    }
}

/// A named group of components, e.g. `input` or `sym_output`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaDataset {
    pub name: &'static str,
    pub components: Vec<MetaComponent>,
}

impl MetaDataset {
    pub fn new(name: &'static str, components: Vec<MetaComponent>) -> Self {
        Self { name, components }
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub fn get_component(&self, name: &str) -> Result<&MetaComponent, DataError> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| DataError::UnknownComponent {
                dataset: self.name.to_string(),
                component: name.to_string(),
            })
    }

    pub fn component_by_index(&self, idx: usize) -> Option<&MetaComponent> {
        self.components.get(idx)
    }

    pub fn component_index(&self, name: &str) -> Option<usize> {
        self.components.iter().position(|c| c.name == name)
    }
}

/// The whole schema.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaData {
    pub datasets: Vec<MetaDataset>,
}

impl MetaData {
    pub fn n_datasets(&self) -> usize {
        self.datasets.len()
    }

    pub fn get_dataset(&self, name: &str) -> Result<&MetaDataset, DataError> {
        self.datasets
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| DataError::UnknownDataset {
                name: name.to_string(),
            })
    }

    pub fn dataset_by_index(&self, idx: usize) -> Option<&MetaDataset> {
        self.datasets.get(idx)
    }

    pub fn get_component(&self, dataset: &str, component: &str) -> Result<&MetaComponent, DataError> {
        self.get_dataset(dataset)?.get_component(component)
    }

    pub fn get_attribute(
        &self,
        dataset: &str,
        component: &str,
        attribute: &str,
    ) -> Result<&MetaAttribute, DataError> {
        self.get_component(dataset, component)?.get_attribute(attribute)
    }
}

static META_DATA: LazyLock<MetaData> = LazyLock::new(|| {
    let meta = schema::build_meta_data();
    debug!(n_datasets = meta.n_datasets(), "meta data registry initialized");
    meta
});

/// The process-wide schema registry.
pub fn meta_data() -> &'static MetaData {
    &META_DATA
}

#[cfg(test)]
mod tests {
    use super::schema::*;
    use super::*;

    #[test]
    fn test_node_layout() {
        let node = meta_data().get_component(INPUT, "node").unwrap();
        assert_eq!(node.size, 16);
        assert_eq!(node.alignment, 8);
        let id = node.get_attribute("id").unwrap();
        assert_eq!((id.ctype, id.offset, id.size), (CType::Int32, 0, 4));
        let u_rated = node.get_attribute("u_rated").unwrap();
        assert_eq!((u_rated.ctype, u_rated.offset, u_rated.size), (CType::Double, 8, 8));
        assert_eq!(u_rated.component, "node");
        assert_eq!(u_rated.component_size, 16);
    }

    #[test]
    fn test_raw_identifier_is_stripped() {
        let load = meta_data().get_component(INPUT, "sym_load").unwrap();
        assert!(load.get_attribute("type").is_ok());
        let asym = meta_data().get_component(INPUT, "asym_load").unwrap();
        let p = asym.get_attribute("p_specified").unwrap();
        assert_eq!(p.ctype, CType::Double3);
        assert_eq!(p.size, 24);
    }

    #[test]
    fn test_lookup_errors() {
        let meta = meta_data();
        assert!(matches!(
            meta.get_dataset("no_such"),
            Err(DataError::UnknownDataset { .. })
        ));
        assert!(matches!(
            meta.get_component(UPDATE, "node"),
            Err(DataError::UnknownComponent { .. })
        ));
        assert!(matches!(
            meta.get_attribute(INPUT, "node", "u"),
            Err(DataError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn test_lookup_by_index() {
        let meta = meta_data();
        for i in 0..meta.n_datasets() {
            let dataset = meta.dataset_by_index(i).unwrap();
            assert_eq!(meta.get_dataset(dataset.name).unwrap(), dataset);
            for j in 0..dataset.n_components() {
                let component = dataset.component_by_index(j).unwrap();
                assert_eq!(dataset.component_index(component.name), Some(j));
                // offsets are strictly increasing in declaration order
                let offsets: Vec<_> = component.attributes.iter().map(|a| a.offset).collect();
                assert!(offsets.windows(2).all(|w| w[0] < w[1]));
            }
        }
        assert!(meta.dataset_by_index(meta.n_datasets()).is_none());
    }
}
