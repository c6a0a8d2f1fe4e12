use std::collections::HashSet;

use crate::basic::dataset::ConstDataset;
use crate::basic::error::DataError;
use crate::basic::meta_data::Idx;

/// Flattened index over a chain of cartesian axes.
///
/// Scenarios are numbered row-major: the last axis varies fastest.
#[derive(Debug)]
pub struct CartesianProduct<'d, 'a> {
    axes: Vec<&'d ConstDataset<'a>>,
    strides: Vec<Idx>,
    total: Idx,
}

impl<'d, 'a> CartesianProduct<'d, 'a> {
    /// Walks the axis chain starting at `first`, rejecting any dataset seen twice.
    pub fn from_dataset(first: &'d ConstDataset<'a>) -> Result<Self, DataError> {
        let mut axes = vec![first];
        let mut seen = HashSet::from([first.id()]);
        let mut cursor = first.next_cartesian_product_dimension();
        while let Some(axis) = cursor {
            if !seen.insert(axis.id()) {
                return Err(DataError::CyclicAxis { dataset: axis.id() });
            }
            axes.push(axis);
            cursor = axis.next_cartesian_product_dimension();
        }
        Self::new(axes)
    }

    /// Explicit axes, first axis slowest. A dataset may appear only once.
    pub fn new(axes: Vec<&'d ConstDataset<'a>>) -> Result<Self, DataError> {
        let mut seen = HashSet::new();
        if let Some(axis) = axes.iter().find(|axis| !seen.insert(axis.id())) {
            return Err(DataError::CyclicAxis { dataset: axis.id() });
        }
        let mut strides = vec![1; axes.len()];
        let mut total: Idx = 1;
        for (i, axis) in axes.iter().enumerate().rev() {
            strides[i] = total;
            total = total
                .checked_mul(axis.batch_size())
                .ok_or_else(|| DataError::InvalidBatchSize {
                    batch_size: axis.batch_size(),
                    reason: "cartesian product overflows the scenario index".into(),
                })?;
        }
        Ok(Self {
            axes,
            strides,
            total,
        })
    }

    pub fn total(&self) -> Idx {
        self.total
    }

    pub fn n_axes(&self) -> usize {
        self.axes.len()
    }

    pub fn axes(&self) -> &[&'d ConstDataset<'a>] {
        &self.axes
    }

    /// Per-axis scenario index of flattened scenario `scenario`.
    pub fn axis_indices(&self, scenario: Idx) -> Vec<Idx> {
        self.axes
            .iter()
            .zip(&self.strides)
            .map(|(axis, stride)| (scenario / stride) % axis.batch_size())
            .collect()
    }

    /// The single-scenario views making up flattened scenario `scenario`, in axis order.
    pub fn scenario_update(&self, scenario: Idx) -> Result<ScenarioUpdate<'d>, DataError> {
        if scenario < 0 || scenario >= self.total {
            return Err(DataError::ScenarioOutOfRange {
                index: scenario,
                batch_size: self.total,
            });
        }
        let datasets = self
            .axes
            .iter()
            .zip(self.axis_indices(scenario))
            .map(|(&axis, idx)| axis.scenario(idx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ScenarioUpdate {
            index: scenario,
            datasets,
        })
    }
}

/// Update data applied on top of the base model for one scenario.
///
/// Later datasets are applied after earlier ones.
#[derive(Debug, Default)]
pub struct ScenarioUpdate<'d> {
    index: Idx,
    datasets: Vec<ConstDataset<'d>>,
}

impl<'d> ScenarioUpdate<'d> {
    /// No update, used by single calculations.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn index(&self) -> Idx {
        self.index
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn datasets(&self) -> &[ConstDataset<'d>] {
        &self.datasets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::buffer::Buffer;
    use crate::basic::meta_data::{meta_data, schema::UPDATE};

    fn source_buffer(ids: &[i32]) -> Buffer {
        let meta = meta_data().get_component(UPDATE, "source").unwrap();
        let mut buffer = Buffer::create(meta, ids.len() as Idx).unwrap();
        buffer.fill_missing(0, ids.len() as Idx).unwrap();
        buffer.set_values("id", 0, ids).unwrap();
        buffer
    }

    #[test]
    fn test_row_major_indices() {
        let a_buf = source_buffer(&[0, 1]);
        let b_buf = source_buffer(&[10, 11, 12]);
        let mut b = ConstDataset::new(true, 3, UPDATE).unwrap();
        b.add_uniform("source", 1, 3, &b_buf).unwrap();
        let mut a = ConstDataset::new(true, 2, UPDATE).unwrap();
        a.add_uniform("source", 1, 2, &a_buf).unwrap();
        a.set_next_cartesian_product_dimension(&b).unwrap();

        let product = CartesianProduct::from_dataset(&a).unwrap();
        assert_eq!(product.total(), 6);
        assert_eq!(product.axis_indices(0), vec![0, 0]);
        assert_eq!(product.axis_indices(2), vec![0, 2]);
        assert_eq!(product.axis_indices(4), vec![1, 1]);

        let update = product.scenario_update(5).unwrap();
        assert_eq!(update.index(), 5);
        let ids: Vec<i32> = update
            .datasets()
            .iter()
            .flat_map(|d| d.attribute_values::<i32>("source", "id").unwrap())
            .collect();
        assert_eq!(ids, vec![1, 12]);
        assert!(product.scenario_update(6).is_err());
    }

    #[test]
    fn test_explicit_axes() {
        let a = ConstDataset::new(true, 2, UPDATE).unwrap();
        let b = ConstDataset::new(true, 5, UPDATE).unwrap();
        let product = CartesianProduct::new(vec![&a, &b]).unwrap();
        assert_eq!(product.total(), 10);
        assert_eq!(product.axis_indices(7), vec![1, 2]);

        let alias = a.clone();
        assert!(matches!(
            CartesianProduct::new(vec![&a, &b, &alias]),
            Err(DataError::CyclicAxis { .. })
        ));
    }
}
