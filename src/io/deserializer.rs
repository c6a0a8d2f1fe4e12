//! Payload to [`WritableDataset`].
//!
//! Parsing happens in two steps. Construction reads the envelope and declares every
//! component with its shape, so the caller can inspect [`Deserializer::info`] and attach row
//! or columnar buffers. [`Deserializer::parse_to_buffer`] then writes the values.

use std::borrow::Cow;
use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::debug;

use super::format::{PAYLOAD_VERSION, SerializationError, SerializationFormat, payload_error};
use super::value::JsonScalar;
use crate::basic::attribute::CType;
use crate::basic::dataset::{Cardinality, DatasetInfo, WritableDataset};
use crate::basic::meta_data::{Idx, MetaAttribute, MetaComponent, RealValueAsym, meta_data};

/// Records of one component, per scenario.
#[derive(Debug)]
struct ComponentPayload {
    component: &'static MetaComponent,
    /// Attribute order of positional records.
    header: Option<Vec<&'static MetaAttribute>>,
    /// Every attribute appearing in the payload, in schema order.
    present: Vec<&'static MetaAttribute>,
    scenarios: Vec<Vec<Value>>,
}

impl ComponentPayload {
    fn counts(&self) -> impl Iterator<Item = Idx> + '_ {
        self.scenarios.iter().map(|records| records.len() as Idx)
    }

    fn cardinality(&self) -> (Cardinality<'static>, Idx) {
        let mut counts = self.counts();
        let first = counts.next().unwrap_or(0);
        if counts.all(|n| n == first) {
            let total = first * self.scenarios.len() as Idx;
            return (Cardinality::Uniform(first), total);
        }
        let mut indptr = Vec::with_capacity(self.scenarios.len() + 1);
        indptr.push(0);
        for n in self.counts() {
            indptr.push(indptr[indptr.len() - 1] + n);
        }
        let total = indptr[indptr.len() - 1];
        (Cardinality::Ragged(Cow::Owned(indptr)), total)
    }

    fn records(&self) -> impl Iterator<Item = (usize, usize, &Value)> + '_ {
        self.scenarios.iter().enumerate().flat_map(|(scenario, records)| {
            records
                .iter()
                .enumerate()
                .map(move |(element, record)| (scenario, element, record))
        })
    }

    fn position(&self, scenario: usize, element: usize) -> String {
        format!(
            "scenario {}, component '{}', element {}",
            scenario, self.component.name, element
        )
    }

    /// Value of `attribute` in `record`, `None` when absent.
    fn field<'v>(&self, record: &'v Value, attribute: &MetaAttribute) -> Option<&'v Value> {
        match record {
            Value::Object(map) => map.get(attribute.name),
            Value::Array(values) => self
                .header
                .as_ref()?
                .iter()
                .position(|a| a.name == attribute.name)
                .and_then(|i| values.get(i)),
            _ => None,
        }
    }

    fn column<T: JsonScalar>(&self, attribute: &MetaAttribute) -> Result<Vec<T>, SerializationError> {
        self.records()
            .map(|(scenario, element, record)| match self.field(record, attribute) {
                None => Ok(T::missing()),
                Some(value) => T::from_json(value).ok_or_else(|| {
                    payload_error(
                        self.position(scenario, element),
                        format!(
                            "attribute '{}' expects {}, got {}",
                            attribute.name, attribute.ctype, value
                        ),
                    )
                }),
            })
            .collect()
    }
}

fn as_object<'v>(value: &'v Value, position: &str) -> Result<&'v Map<String, Value>, SerializationError> {
    value
        .as_object()
        .ok_or_else(|| payload_error(position, "expected an object"))
}

/// Parses a json payload into a [`WritableDataset`] whose buffers are chosen by the caller.
#[derive(Debug)]
pub struct Deserializer<'a> {
    dataset: WritableDataset<'a>,
    components: Vec<ComponentPayload>,
}

impl<'a> Deserializer<'a> {
    /// Reads `data` encoded as `format`.
    pub fn new(data: &str, format: SerializationFormat) -> Result<Self, SerializationError> {
        match format {
            SerializationFormat::Json => Self::from_json(data),
            format => Err(SerializationError::UnsupportedFormat { format }),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, SerializationError> {
        let root: Value = serde_json::from_str(text)?;
        let root = as_object(&root, "root")?;

        match root.get("version") {
            Some(Value::String(v)) if v == PAYLOAD_VERSION => {}
            Some(Value::String(v)) => return Err(SerializationError::Version { version: v.clone() }),
            _ => return Err(payload_error("root", "missing string field 'version'")),
        }
        let dataset_name = root
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| payload_error("root", "missing string field 'type'"))?;
        let is_batch = root
            .get("is_batch")
            .and_then(Value::as_bool)
            .ok_or_else(|| payload_error("root", "missing boolean field 'is_batch'"))?;
        let meta = meta_data().get_dataset(dataset_name)?;

        let mut headers = Vec::new();
        if let Some(attributes) = root.get("attributes") {
            for (component, names) in as_object(attributes, "attributes")? {
                let component = meta.get_component(component)?;
                let position = format!("attributes of '{}'", component.name);
                let names = names
                    .as_array()
                    .ok_or_else(|| payload_error(position.as_str(), "expected a list of names"))?;
                let attrs = names
                    .iter()
                    .map(|name| -> Result<&'static MetaAttribute, SerializationError> {
                        let name = name
                            .as_str()
                            .ok_or_else(|| payload_error(position.as_str(), "expected a name"))?;
                        Ok(component.get_attribute(name)?)
                    })
                    .collect::<Result<Vec<_>, SerializationError>>()?;
                headers.push((component.name, attrs));
            }
        }

        let data = root
            .get("data")
            .ok_or_else(|| payload_error("root", "missing field 'data'"))?;
        let scenarios: Vec<&Map<String, Value>> = match (is_batch, data) {
            (false, Value::Object(map)) => vec![map],
            (true, Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| as_object(item, &format!("scenario {}", i)))
                .collect::<Result<_, _>>()?,
            (false, _) => return Err(payload_error("data", "a single dataset expects an object")),
            (true, _) => return Err(payload_error("data", "a batch dataset expects a list")),
        };
        for (i, scenario) in scenarios.iter().enumerate() {
            for name in scenario.keys() {
                meta.get_component(name).map_err(|error| {
                    payload_error(format!("scenario {}", i), error.to_string())
                })?;
            }
        }

        let mut components = Vec::new();
        for component in &meta.components {
            let header = headers
                .iter()
                .find(|(name, _)| *name == component.name)
                .map(|(_, attrs)| attrs.clone());
            if header.is_none() && !scenarios.iter().any(|s| s.contains_key(component.name)) {
                continue;
            }
            components.push(Self::read_component(component, header, &scenarios)?);
        }

        let batch_size = if is_batch { scenarios.len() as Idx } else { 1 };
        let mut dataset = WritableDataset::new_writable(is_batch, batch_size, meta.name)?;
        for payload in &components {
            let (cardinality, total) = payload.cardinality();
            let indications = payload.header.as_ref().map(|_| payload.present.clone());
            dataset.add_component_info(payload.component.name, cardinality, total, indications)?;
        }
        debug!(
            dataset = meta.name,
            is_batch,
            batch_size,
            n_components = components.len(),
            "payload read"
        );
        Ok(Self {
            dataset,
            components,
        })
    }

    fn read_component(
        component: &'static MetaComponent,
        header: Option<Vec<&'static MetaAttribute>>,
        scenarios: &[&Map<String, Value>],
    ) -> Result<ComponentPayload, SerializationError> {
        let mut present: BTreeSet<usize> = header
            .iter()
            .flatten()
            .filter_map(|a| component.attribute_index(a.name))
            .collect();
        let mut records = Vec::with_capacity(scenarios.len());
        for (i, scenario) in scenarios.iter().enumerate() {
            let items = match scenario.get(component.name) {
                None => Vec::new(),
                Some(Value::Array(items)) => items.clone(),
                Some(_) => {
                    return Err(payload_error(
                        format!("scenario {}, component '{}'", i, component.name),
                        "expected a list of records",
                    ));
                }
            };
            for (j, item) in items.iter().enumerate() {
                let position = || format!("scenario {}, component '{}', element {}", i, component.name, j);
                match item {
                    Value::Object(map) => {
                        for key in map.keys() {
                            let idx = component.attribute_index(key).ok_or_else(|| {
                                payload_error(position(), format!("unknown attribute '{}'", key))
                            })?;
                            present.insert(idx);
                        }
                    }
                    Value::Array(values) => {
                        let expected = header.as_ref().map_or(0, Vec::len);
                        if header.is_none() || values.len() != expected {
                            return Err(payload_error(
                                position(),
                                format!(
                                    "positional record holds {} values, the attribute header lists {}",
                                    values.len(),
                                    expected
                                ),
                            ));
                        }
                    }
                    _ => return Err(payload_error(position(), "expected an object or a list")),
                }
            }
            records.push(items);
        }
        Ok(ComponentPayload {
            component,
            header,
            present: present
                .into_iter()
                .filter_map(|idx| component.attribute_by_index(idx))
                .collect(),
            scenarios: records,
        })
    }

    pub fn info(&self) -> DatasetInfo {
        self.dataset.info()
    }

    pub fn dataset(&self) -> &WritableDataset<'a> {
        &self.dataset
    }

    /// The dataset to attach buffers to.
    pub fn dataset_mut(&mut self) -> &mut WritableDataset<'a> {
        &mut self.dataset
    }

    /// Writes every present value into the attached buffers.
    ///
    /// Attached storage is set to missing first. Attributes without a registered column are
    /// skipped.
    pub fn parse_to_buffer(&mut self) -> Result<(), SerializationError> {
        for payload in &self.components {
            let name = payload.component.name;
            self.dataset.fill_missing(name)?;
            for attribute in &payload.present {
                match attribute.ctype {
                    CType::Int32 => {
                        let values = payload.column::<i32>(attribute)?;
                        self.dataset.set_attribute_values(name, attribute.name, &values)?
                    }
                    CType::Int8 => {
                        let values = payload.column::<i8>(attribute)?;
                        self.dataset.set_attribute_values(name, attribute.name, &values)?
                    }
                    CType::Double => {
                        let values = payload.column::<f64>(attribute)?;
                        self.dataset.set_attribute_values(name, attribute.name, &values)?
                    }
                    CType::Double3 => {
                        let values = payload.column::<RealValueAsym>(attribute)?;
                        self.dataset.set_attribute_values(name, attribute.name, &values)?
                    }
                }
            }
        }
        debug!(dataset = self.dataset.name(), "payload parsed into buffers");
        Ok(())
    }
}
