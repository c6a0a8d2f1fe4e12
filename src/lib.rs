pub mod abi;
pub mod basic;
pub mod batch;
pub mod io;
pub mod prelude {
    use crate::basic;
    pub use basic::*;

    pub use crate::abi::{ResourceId, ResourceTable};
    pub use crate::basic::dataset::{Const, DatasetKind, Mutable, Writable};
    pub use crate::batch::{
        CalculationEngine, CalculationOptions, CalculationType, ScenarioUpdate, Threading,
        calculate,
    };
    pub use crate::io::{Deserializer, SerializationError, SerializationFormat, Serializer};
}
