//! Error taxonomy shared by every operation.
//!
//! [`DataError`] covers contract violations detectable from shape or schema alone and
//! always aborts the whole call. [`BatchFailure`] isolates individual scenarios.
//! [`SerializationError`](crate::io::SerializationError) is raised at the codec boundary.

use std::collections::BTreeMap;
use std::fmt;

use derive_more::{Display, Error, From};

use super::attribute::CType;
use super::dataset::DatasetId;
use super::meta_data::{ID, Idx};
use crate::io::SerializationError;

/// Opaque calculation statistics, keyed by name.
pub type CalculationInfo = BTreeMap<String, f64>;

/// Adds every entry of `other` into `info`.
pub fn merge_calculation_info(info: &mut CalculationInfo, other: &CalculationInfo) {
    for (key, value) in other {
        *info.entry(key.clone()).or_insert(0.0) += value;
    }
}

/// Failure reported by the calculation engine for one scenario.
#[derive(Debug, Clone, PartialEq, Display, Error)]
pub enum CalculationError {
    #[display("the id {id} cannot be found in component '{component}'")]
    IdNotFound { component: String, id: ID },
    #[display("iteration failed to converge after {iterations} iterations, max deviation {deviation}")]
    NotConverged { iterations: Idx, deviation: f64 },
    #[display("{message}")]
    Engine { message: String },
    #[display("{error}")]
    Data { error: DataError },
}

impl From<DataError> for CalculationError {
    fn from(error: DataError) -> Self {
        CalculationError::Data { error }
    }
}

/// Whole-call failures.
#[derive(Debug, Clone, PartialEq, Display, Error)]
pub enum DataError {
    #[display("unknown dataset '{name}'")]
    UnknownDataset { name: String },
    #[display("unknown component '{component}' in dataset '{dataset}'")]
    UnknownComponent { dataset: String, component: String },
    #[display("unknown attribute '{attribute}' in component '{component}'")]
    UnknownAttribute { component: String, attribute: String },
    #[display("attribute '{component}.{attribute}' has type {actual}, requested {requested}")]
    AttributeTypeMismatch {
        component: String,
        attribute: String,
        actual: CType,
        requested: CType,
    },
    #[display("component '{component}' is already present in the dataset")]
    DuplicateComponent { component: String },
    #[display("attribute buffer '{component}.{attribute}' is already registered")]
    DuplicateAttributeBuffer { component: String, attribute: String },
    #[display("component '{component}' has a row buffer, attribute buffers cannot be added")]
    MixedLayout { component: String },
    #[display("shape mismatch for component '{component}': {reason}")]
    ShapeMismatch { component: String, reason: String },
    #[display("invalid indptr for component '{component}': {reason}")]
    InvalidIndptr { component: String, reason: String },
    #[display("invalid batch size {batch_size}: {reason}")]
    InvalidBatchSize { batch_size: Idx, reason: String },
    #[display("buffer for '{component}' holds {capacity} elements, {required} required")]
    InsufficientCapacity {
        component: String,
        capacity: Idx,
        required: Idx,
    },
    #[display("buffer is bound to component '{actual}', expected '{expected}'")]
    ComponentMismatch { expected: String, actual: String },
    #[display("cannot allocate {count} elements of component '{component}'")]
    Allocation { component: String, count: Idx },
    #[display("invalid stride {stride}")]
    InvalidStride { stride: Idx },
    #[display("cartesian product dimension would form a cycle through dataset {dataset}")]
    CyclicAxis { dataset: DatasetId },
    #[display("scenario {index} is out of range for batch size {batch_size}")]
    ScenarioOutOfRange { index: Idx, batch_size: Idx },
    #[display("null pointer for {what}")]
    NullPointer { what: String },
    #[display("unknown resource id {id}")]
    UnknownResource { id: u64 },
    #[display("{reason}")]
    InvalidArgument { reason: String },
    #[display("calculation failed: {message}")]
    Calculation { message: String },
}

/// Per-scenario failures of a batch calculation.
///
/// Scenarios not listed in `failures` produced complete output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchFailure {
    /// Ascending scenario index with its message.
    pub failures: Vec<(Idx, String)>,
    pub info: CalculationInfo,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} scenario(s) failed in the batch calculation",
            self.failures.len()
        )?;
        for (idx, msg) in &self.failures {
            write!(f, "\n  scenario {}: {}", idx, msg)?;
        }
        Ok(())
    }
}
impl std::error::Error for BatchFailure {}

/// The umbrella error of every public operation.
#[derive(Debug, Clone, PartialEq, From)]
pub enum PgmError {
    Regular(DataError),
    Batch(BatchFailure),
    Serialization(SerializationError),
}

impl fmt::Display for PgmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgmError::Regular(err) => write!(f, "{}", err),
            PgmError::Batch(err) => write!(f, "{}", err),
            PgmError::Serialization(err) => write!(f, "serialization error: {}", err),
        }
    }
}
impl std::error::Error for PgmError {}
