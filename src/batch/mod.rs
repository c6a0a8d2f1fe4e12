pub mod cartesian;
pub mod coordinator;
pub mod options;

pub use cartesian::{CartesianProduct, ScenarioUpdate};
pub use coordinator::{CalculationEngine, calculate, calculate_cartesian};
pub use options::{CalculationOptions, CalculationType, Threading};
