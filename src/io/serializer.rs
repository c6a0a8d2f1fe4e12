use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use tracing::debug;

use super::format::{PAYLOAD_VERSION, SerializationError, SerializationFormat};
use super::value::JsonScalar;
use crate::basic::attribute::CType;
use crate::basic::dataset::{ComponentSlice, ConstDataset};
use crate::basic::error::DataError;
use crate::basic::meta_data::{Idx, MetaAttribute, RealValueAsym};

/// Per-element json values of one attribute; `None` marks a missing value.
type JsonColumn = Vec<Option<Value>>;

fn json_column<T: JsonScalar>(
    dataset: &ConstDataset<'_>,
    component: &str,
    attribute: &MetaAttribute,
) -> Result<JsonColumn, DataError> {
    Ok(dataset
        .attribute_values::<T>(component, attribute.name)?
        .iter()
        .map(T::to_json)
        .collect())
}

/// Renders a fully populated [`ConstDataset`].
#[derive(Debug)]
pub struct Serializer<'d, 'a> {
    dataset: &'d ConstDataset<'a>,
}

impl<'d, 'a> Serializer<'d, 'a> {
    pub fn new(dataset: &'d ConstDataset<'a>) -> Self {
        Self { dataset }
    }

    /// Encodes the dataset.
    ///
    /// With `use_compact_list` records are positional lists ordered by the `attributes`
    /// header, otherwise objects holding the present attributes. A negative `indent` gives
    /// the most compact text.
    pub fn serialize(
        &self,
        format: SerializationFormat,
        use_compact_list: bool,
        indent: i64,
    ) -> Result<String, SerializationError> {
        match format {
            SerializationFormat::Json => {}
            format => return Err(SerializationError::UnsupportedFormat { format }),
        }
        let value = self.to_value(use_compact_list)?;
        let text = if indent < 0 {
            serde_json::to_string(&value)?
        } else {
            let indent = b" ".repeat(indent as usize);
            let mut out = Vec::new();
            let mut ser = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(&indent));
            value.serialize(&mut ser)?;
            String::from_utf8(out).map_err(|e| SerializationError::Json {
                message: e.to_string(),
            })?
        };
        debug!(dataset = self.dataset.name(), bytes = text.len(), "dataset serialized");
        Ok(text)
    }

    /// Format given by its raw id.
    pub fn serialize_raw(
        &self,
        format: i64,
        use_compact_list: bool,
        indent: i64,
    ) -> Result<String, SerializationError> {
        self.serialize(SerializationFormat::from_raw(format)?, use_compact_list, indent)
    }

    fn columns(&self, slice: &ComponentSlice<'_>) -> Result<Vec<(&'static MetaAttribute, JsonColumn)>, DataError> {
        let name = slice.name();
        slice
            .component()
            .attributes
            .iter()
            .map(|attribute| -> Result<(&'static MetaAttribute, JsonColumn), DataError> {
                let column = match attribute.ctype {
                    CType::Int32 => json_column::<i32>(self.dataset, name, attribute)?,
                    CType::Int8 => json_column::<i8>(self.dataset, name, attribute)?,
                    CType::Double => json_column::<f64>(self.dataset, name, attribute)?,
                    CType::Double3 => json_column::<RealValueAsym>(self.dataset, name, attribute)?,
                };
                Ok((attribute, column))
            })
            // attributes missing everywhere are left out
            .filter(|res| !matches!(res, Ok((_, column)) if column.iter().all(Option::is_none)))
            .collect()
    }

    fn to_value(&self, use_compact_list: bool) -> Result<Value, SerializationError> {
        let dataset = self.dataset;
        let mut header = Map::new();
        let mut scenarios: Vec<Map<String, Value>> = vec![Map::new(); dataset.batch_size() as usize];

        for slice in dataset.components() {
            let columns = self.columns(slice)?;
            if use_compact_list {
                header.insert(
                    slice.name().to_string(),
                    Value::Array(columns.iter().map(|(a, _)| Value::from(a.name)).collect()),
                );
            }
            for (scenario, records) in scenarios.iter_mut().enumerate() {
                let (start, count) = slice.scenario_range(scenario as Idx);
                if count == 0 {
                    continue;
                }
                let rows = (start..start + count)
                    .map(|element| {
                        let cells = columns.iter().map(|(a, column)| (a, &column[element as usize]));
                        if use_compact_list {
                            Value::Array(cells.map(|(_, v)| v.clone().unwrap_or(Value::Null)).collect())
                        } else {
                            Value::Object(
                                cells
                                    .filter_map(|(a, v)| v.clone().map(|v| (a.name.to_string(), v)))
                                    .collect(),
                            )
                        }
                    })
                    .collect();
                records.insert(slice.name().to_string(), Value::Array(rows));
            }
        }

        let data = if dataset.is_batch() {
            Value::Array(scenarios.into_iter().map(Value::Object).collect())
        } else {
            scenarios.into_iter().next().map_or(Value::Object(Map::new()), Value::Object)
        };
        let mut root = Map::new();
        root.insert("version".into(), Value::from(PAYLOAD_VERSION));
        root.insert("type".into(), Value::from(dataset.name()));
        root.insert("is_batch".into(), Value::from(dataset.is_batch()));
        root.insert("attributes".into(), Value::Object(header));
        root.insert("data".into(), data);
        Ok(Value::Object(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::buffer::Buffer;
    use crate::basic::meta_data::{
        meta_data,
        schema::{INPUT, UPDATE},
    };
    use crate::io::Deserializer;
    use serde_json::json;

    fn node_buffer() -> Buffer {
        let meta = meta_data().get_component(INPUT, "node").unwrap();
        let mut nodes = Buffer::create(meta, 2).unwrap();
        nodes.fill_missing(0, 2).unwrap();
        nodes.set_values("id", 0, &[1, 2]).unwrap();
        nodes.set_values("u_rated", 0, &[10.0e3]).unwrap();
        nodes
    }

    #[test]
    fn test_object_records_omit_missing() {
        let nodes = node_buffer();
        let mut dataset = ConstDataset::new(false, 1, INPUT).unwrap();
        dataset.add_uniform("node", 2, 2, &nodes).unwrap();
        let text = Serializer::new(&dataset)
            .serialize(SerializationFormat::Json, false, -1)
            .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["version"], json!("1.0"));
        assert_eq!(value["attributes"], json!({}));
        assert_eq!(
            value["data"]["node"],
            json!([{"id": 1, "u_rated": 10.0e3}, {"id": 2}])
        );
    }

    #[test]
    fn test_compact_list_round_trip() {
        let nodes = node_buffer();
        let mut dataset = ConstDataset::new(false, 1, INPUT).unwrap();
        dataset.add_uniform("node", 2, 2, &nodes).unwrap();
        let text = Serializer::new(&dataset)
            .serialize(SerializationFormat::Json, true, 2)
            .unwrap();
        assert!(text.contains('\n'));
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["attributes"]["node"], json!(["id", "u_rated"]));
        assert_eq!(value["data"]["node"][1], json!([2, null]));

        let meta = meta_data().get_component(INPUT, "node").unwrap();
        let mut copy = Buffer::create(meta, 2).unwrap();
        {
            let mut deserializer = Deserializer::from_json(&text).unwrap();
            deserializer.dataset_mut().set_buffer("node", &mut copy).unwrap();
            deserializer.parse_to_buffer().unwrap();
        }
        assert_eq!(copy.values::<i32>("id", 0, 2).unwrap(), vec![1, 2]);
        assert!(copy.values::<f64>("u_rated", 1, 1).unwrap()[0].is_nan());
    }

    #[test]
    fn test_ragged_batch_layout() {
        let meta = meta_data().get_component(UPDATE, "sym_load").unwrap();
        let mut loads = Buffer::create(meta, 3).unwrap();
        loads.fill_missing(0, 3).unwrap();
        loads.set_values("id", 0, &[4, 5, 4]).unwrap();
        let indptr = [0, 2, 2, 3];
        let mut dataset = ConstDataset::new(true, 3, UPDATE).unwrap();
        dataset.add_ragged("sym_load", 3, &indptr, &loads).unwrap();
        let text = Serializer::new(&dataset)
            .serialize(SerializationFormat::Json, false, -1)
            .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value["data"],
            json!([
                {"sym_load": [{"id": 4}, {"id": 5}]},
                {},
                {"sym_load": [{"id": 4}]}
            ])
        );
    }

    #[test]
    fn test_unsupported_formats() {
        let dataset = ConstDataset::new(false, 1, INPUT).unwrap();
        let serializer = Serializer::new(&dataset);
        assert!(matches!(
            serializer.serialize(SerializationFormat::MsgPack, false, -1),
            Err(SerializationError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            serializer.serialize_raw(5, false, -1),
            Err(SerializationError::UnknownFormat { format: 5 })
        ));
    }
}
