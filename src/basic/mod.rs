pub mod attribute;
pub mod buffer;
pub mod dataset;
pub mod error;
pub mod handle;
pub mod meta_data;

pub use attribute::{AttributeAccessor, AttributeType, CType, TypedAttribute};
pub use buffer::Buffer;
pub use dataset::{
    ConstDataset, Dataset, DatasetId, DatasetInfo, MutableDataset, WritableDataset,
};
pub use error::{BatchFailure, CalculationError, CalculationInfo, DataError, PgmError};
pub use handle::{ErrorCode, Handle};
pub use meta_data::{Idx, IntS, RealValueAsym, ID, meta_data};
