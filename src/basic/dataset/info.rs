use std::fmt;

use tabled::{Table, Tabled, settings::Style};

use super::component::ComponentSlice;
use crate::basic::meta_data::Idx;

/// Shape of one component inside a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentInfo {
    pub name: &'static str,
    /// `-1` when ragged.
    pub elements_per_scenario: Idx,
    pub total_elements: Idx,
    pub attribute_indications: Option<Vec<&'static str>>,
}

impl ComponentInfo {
    pub(crate) fn from_slice(slice: &ComponentSlice<'_>) -> Self {
        Self {
            name: slice.name(),
            elements_per_scenario: slice.elements_per_scenario(),
            total_elements: slice.total_elements(),
            attribute_indications: slice
                .attribute_indications()
                .map(|attrs| attrs.iter().map(|a| a.name).collect()),
        }
    }

    pub fn has_attribute_indications(&self) -> bool {
        self.attribute_indications.is_some()
    }

    pub fn n_attribute_indications(&self) -> usize {
        self.attribute_indications.as_ref().map_or(0, Vec::len)
    }
}

/// Read-only introspection of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetInfo {
    pub name: &'static str,
    pub is_batch: bool,
    pub batch_size: Idx,
    pub components: Vec<ComponentInfo>,
}

#[derive(Tabled)]
struct ComponentRow {
    component: &'static str,
    per_scenario: String,
    total: Idx,
    indications: String,
}

impl DatasetInfo {
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub fn component_name(&self, idx: usize) -> Option<&'static str> {
        self.components.get(idx).map(|c| c.name)
    }

    pub fn component(&self, name: &str) -> Option<&ComponentInfo> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn elements_per_scenario(&self, idx: usize) -> Option<Idx> {
        self.components.get(idx).map(|c| c.elements_per_scenario)
    }

    pub fn total_elements(&self, idx: usize) -> Option<Idx> {
        self.components.get(idx).map(|c| c.total_elements)
    }

    pub fn has_attribute_indications(&self, idx: usize) -> Option<bool> {
        self.components
            .get(idx)
            .map(ComponentInfo::has_attribute_indications)
    }

    pub fn attribute_indications(&self, idx: usize) -> Option<&[&'static str]> {
        self.components
            .get(idx)
            .and_then(|c| c.attribute_indications.as_deref())
    }

    /// Markdown table with one row per component.
    pub fn to_table(&self) -> String {
        let rows = self.components.iter().map(|c| ComponentRow {
            component: c.name,
            per_scenario: match c.elements_per_scenario {
                -1 => "ragged".to_string(),
                n => n.to_string(),
            },
            total: c.total_elements,
            indications: c
                .attribute_indications
                .as_ref()
                .map_or_else(|| "-".to_string(), |attrs| attrs.join(", ")),
        });
        Table::new(rows).with(Style::markdown()).to_string()
    }
}

impl fmt::Display for DatasetInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "dataset '{}' (batch: {}, scenarios: {})",
            self.name, self.is_batch, self.batch_size
        )?;
        write!(f, "{}", self.to_table())
    }
}
