use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::basic::error::DataError;
use crate::basic::meta_data::schema::{ASYM_OUTPUT, SC_OUTPUT, SYM_OUTPUT};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationType {
    #[default]
    #[display("power_flow")]
    PowerFlow,
    #[display("state_estimation")]
    StateEstimation,
    #[display("short_circuit")]
    ShortCircuit,
}

/// How batch scenarios are scheduled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Threading {
    /// Every scenario on the calling thread.
    #[default]
    Sequential,
    /// The global rayon pool, sized to the hardware.
    HardwareDefault,
    /// A dedicated pool of `n` threads.
    Fixed(usize),
}

impl Threading {
    /// `-1` sequential, `0` hardware default, `n > 0` a pool of `n` threads.
    pub fn from_directive(directive: i64) -> Result<Self, DataError> {
        match directive {
            -1 => Ok(Threading::Sequential),
            0 => Ok(Threading::HardwareDefault),
            n if n > 0 => Ok(Threading::Fixed(n as usize)),
            n => Err(DataError::InvalidArgument {
                reason: format!("invalid threading directive {}", n),
            }),
        }
    }

    pub fn directive(self) -> i64 {
        match self {
            Threading::Sequential => -1,
            Threading::HardwareDefault => 0,
            Threading::Fixed(n) => n as i64,
        }
    }
}

/// Options of one calculation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculationOptions {
    pub calculation_type: CalculationType,
    pub symmetric: bool,
    pub threading: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_tolerance: Option<f64>,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            calculation_type: CalculationType::PowerFlow,
            symmetric: true,
            threading: -1,
            max_iterations: None,
            error_tolerance: None,
        }
    }
}

impl CalculationOptions {
    pub fn from_json_str(json: &str) -> Result<Self, DataError> {
        serde_json::from_str(json).map_err(|e| DataError::InvalidArgument {
            reason: format!("invalid calculation options: {}", e),
        })
    }

    pub fn threading(&self) -> Result<Threading, DataError> {
        Threading::from_directive(self.threading)
    }

    /// Name of the dataset results must be written to.
    pub fn output_dataset_name(&self) -> &'static str {
        match (self.calculation_type, self.symmetric) {
            (CalculationType::ShortCircuit, _) => SC_OUTPUT,
            (_, true) => SYM_OUTPUT,
            (_, false) => ASYM_OUTPUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threading_directive() {
        assert_eq!(Threading::from_directive(-1).unwrap(), Threading::Sequential);
        assert_eq!(Threading::from_directive(0).unwrap(), Threading::HardwareDefault);
        assert_eq!(Threading::from_directive(4).unwrap(), Threading::Fixed(4));
        assert!(Threading::from_directive(-2).is_err());
        assert_eq!(Threading::Fixed(3).directive(), 3);
    }

    #[test]
    fn test_options_from_json() {
        let options = CalculationOptions::from_json_str(
            r#"{"calculation_type": "short_circuit", "threading": 2, "max_iterations": 20}"#,
        )
        .unwrap();
        assert_eq!(options.calculation_type, CalculationType::ShortCircuit);
        assert!(options.symmetric);
        assert_eq!(options.threading().unwrap(), Threading::Fixed(2));
        assert_eq!(options.max_iterations, Some(20));
        assert_eq!(options.output_dataset_name(), "sc_output");

        let options = CalculationOptions::from_json_str(r#"{"symmetric": false}"#).unwrap();
        assert_eq!(options.output_dataset_name(), "asym_output");
        assert!(CalculationOptions::from_json_str(r#"{"calculation_type": 3}"#).is_err());
    }

    #[test]
    fn test_options_serialize_skips_unset() {
        let text = serde_json::to_string(&CalculationOptions::default()).unwrap();
        assert!(!text.contains("max_iterations"));
        assert!(text.contains("\"power_flow\""));
    }
}
