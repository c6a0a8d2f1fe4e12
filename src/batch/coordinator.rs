//! Drives an external calculation engine over every scenario of a batch.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::cartesian::{CartesianProduct, ScenarioUpdate};
use super::options::{CalculationOptions, Threading};
use crate::basic::dataset::{ConstDataset, MutableDataset};
use crate::basic::error::{
    BatchFailure, CalculationError, CalculationInfo, DataError, PgmError, merge_calculation_info,
};
use crate::basic::meta_data::Idx;

/// The model side of a calculation.
///
/// The engine owns the system built from the input dataset. Each call applies `update` to a
/// private copy of that system and writes results into `output`, which holds exactly one
/// scenario.
pub trait CalculationEngine: Sync {
    fn calculate(
        &self,
        options: &CalculationOptions,
        update: &ScenarioUpdate<'_>,
        output: &mut MutableDataset<'_>,
    ) -> Result<CalculationInfo, CalculationError>;
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "calculation panicked".to_string())
}

fn check_output(options: &CalculationOptions, output: &MutableDataset<'_>) -> Result<(), DataError> {
    let expected = options.output_dataset_name();
    if output.name() != expected {
        return Err(DataError::InvalidArgument {
            reason: format!(
                "{} calculation writes '{}', got output dataset '{}'",
                options.calculation_type,
                expected,
                output.name()
            ),
        });
    }
    Ok(())
}

/// Runs one calculation.
///
/// Without `update` the output must hold a single scenario and any engine failure is a
/// regular error. With `update`, its cartesian closure defines the scenarios, the output must
/// hold exactly that many, and engine failures are isolated per scenario.
pub fn calculate<E: CalculationEngine>(
    engine: &E,
    options: &CalculationOptions,
    output: &mut MutableDataset<'_>,
    update: Option<&ConstDataset<'_>>,
) -> Result<CalculationInfo, PgmError> {
    let threading = options.threading()?;
    check_output(options, output)?;
    match update {
        None => calculate_single(engine, options, output),
        Some(update) => {
            let product = CartesianProduct::from_dataset(update)?;
            calculate_batch(engine, options, threading, output, &product)
        }
    }
}

/// Runs a batch over explicit cartesian axes, first axis slowest.
pub fn calculate_cartesian<E: CalculationEngine>(
    engine: &E,
    options: &CalculationOptions,
    output: &mut MutableDataset<'_>,
    axes: Vec<&ConstDataset<'_>>,
) -> Result<CalculationInfo, PgmError> {
    let threading = options.threading()?;
    check_output(options, output)?;
    let product = CartesianProduct::new(axes)?;
    calculate_batch(engine, options, threading, output, &product)
}

fn calculate_single<E: CalculationEngine>(
    engine: &E,
    options: &CalculationOptions,
    output: &mut MutableDataset<'_>,
) -> Result<CalculationInfo, PgmError> {
    if output.batch_size() != 1 {
        return Err(DataError::InvalidBatchSize {
            batch_size: output.batch_size(),
            reason: "a calculation without update data produces one scenario".into(),
        }
        .into());
    }
    debug!(calculation = %options.calculation_type, "single calculation");
    let mut view = output.scenario_mut(0)?;
    engine
        .calculate(options, &ScenarioUpdate::empty(), &mut view)
        .map_err(|err| match err {
            CalculationError::Data { error } => PgmError::Regular(error),
            err => PgmError::Regular(DataError::Calculation {
                message: err.to_string(),
            }),
        })
}

fn calculate_batch<E: CalculationEngine>(
    engine: &E,
    options: &CalculationOptions,
    threading: Threading,
    output: &mut MutableDataset<'_>,
    product: &CartesianProduct<'_, '_>,
) -> Result<CalculationInfo, PgmError> {
    let n_scenarios = product.total();
    if output.batch_size() != n_scenarios {
        return Err(DataError::InvalidBatchSize {
            batch_size: output.batch_size(),
            reason: format!(
                "output must hold {} scenarios ({} cartesian axes)",
                n_scenarios,
                product.n_axes()
            ),
        }
        .into());
    }
    info!(
        n_scenarios,
        n_axes = product.n_axes(),
        threading = ?threading,
        calculation = %options.calculation_type,
        "batch calculation started"
    );

    // scenario views are disjoint, the exclusive borrow is held for the whole run
    let output: &MutableDataset<'_> = output;
    let run = |scenario: Idx| -> Result<CalculationInfo, String> {
        let update = product.scenario_update(scenario).map_err(|e| e.to_string())?;
        let mut view = unsafe { output.scenario_view_mut(scenario) }.map_err(|e| e.to_string())?;
        catch_unwind(AssertUnwindSafe(|| {
            engine.calculate(options, &update, &mut view)
        }))
        .map_err(panic_message)?
        .map_err(|e| e.to_string())
    };

    let results: Vec<Result<CalculationInfo, String>> = match threading {
        Threading::Sequential => (0..n_scenarios).map(run).collect(),
        Threading::HardwareDefault => (0..n_scenarios).into_par_iter().map(run).collect(),
        Threading::Fixed(n_threads) => {
            let pool = ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build()
                .map_err(|e| DataError::InvalidArgument {
                    reason: format!("cannot build a pool of {} threads: {}", n_threads, e),
                })?;
            pool.install(|| (0..n_scenarios).into_par_iter().map(run).collect())
        }
    };

    let mut stats = CalculationInfo::new();
    let mut failures = Vec::new();
    for (scenario, result) in (0..n_scenarios).zip(results) {
        match result {
            Ok(scenario_info) => merge_calculation_info(&mut stats, &scenario_info),
            Err(message) => {
                warn!(scenario, %message, "scenario failed");
                failures.push((scenario, message));
            }
        }
    }
    info!(n_scenarios, n_failed = failures.len(), "batch calculation finished");
    if failures.is_empty() {
        Ok(stats)
    } else {
        Err(BatchFailure {
            failures,
            info: stats,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::buffer::Buffer;
    use crate::basic::meta_data::{meta_data, schema::{SYM_OUTPUT, UPDATE}};

    /// Writes `p` of every source to the source output; a negative id fails.
    struct EchoEngine;

    impl CalculationEngine for EchoEngine {
        fn calculate(
            &self,
            _options: &CalculationOptions,
            update: &ScenarioUpdate<'_>,
            output: &mut MutableDataset<'_>,
        ) -> Result<CalculationInfo, CalculationError> {
            let mut p = 0.0;
            for dataset in update.datasets() {
                for id in dataset.attribute_values::<i32>("source", "id")? {
                    if id < 0 {
                        return Err(CalculationError::IdNotFound {
                            component: "source".into(),
                            id,
                        });
                    }
                    p += id as f64;
                }
            }
            output.set_attribute_values("source", "p", &[p])?;
            Ok(CalculationInfo::from([("scenarios".to_string(), 1.0)]))
        }
    }

    fn component_buffer(dataset: &str, component: &str, len: Idx) -> Buffer {
        let meta = meta_data().get_component(dataset, component).unwrap();
        let mut buffer = Buffer::create(meta, len).unwrap();
        buffer.fill_missing(0, len).unwrap();
        buffer
    }

    #[test]
    fn test_output_dataset_must_match_options() {
        let mut out_buf = component_buffer(SYM_OUTPUT, "source", 1);
        let mut output = MutableDataset::new(false, 1, SYM_OUTPUT).unwrap();
        output.add_uniform("source", 1, 1, &mut out_buf).unwrap();
        let options = CalculationOptions {
            symmetric: false,
            ..Default::default()
        };
        let err = calculate(&EchoEngine, &options, &mut output, None).unwrap_err();
        assert!(matches!(err, PgmError::Regular(DataError::InvalidArgument { .. })));
        assert!(calculate(&EchoEngine, &CalculationOptions::default(), &mut output, None).is_ok());
    }

    #[test]
    fn test_threading_modes_agree() {
        let mut src_buf = component_buffer(UPDATE, "source", 5);
        src_buf.set_values("id", 0, &[1, 2, -3, 4, 5]).unwrap();
        let mut update = ConstDataset::new(true, 5, UPDATE).unwrap();
        update.add_uniform("source", 1, 5, &src_buf).unwrap();

        for threading in [-1, 0, 2] {
            let mut out_buf = component_buffer(SYM_OUTPUT, "source", 5);
            let options = CalculationOptions {
                threading,
                ..Default::default()
            };
            let err = {
                let mut output = MutableDataset::new(true, 5, SYM_OUTPUT).unwrap();
                output.add_uniform("source", 1, 5, &mut out_buf).unwrap();
                calculate(&EchoEngine, &options, &mut output, Some(&update)).unwrap_err()
            };
            let failure = match err {
                PgmError::Batch(failure) => failure,
                other => panic!("expected a batch error, got {other}"),
            };
            assert_eq!(failure.failures.len(), 1);
            assert_eq!(failure.failures[0].0, 2);
            assert_eq!(failure.info["scenarios"], 4.0);
            let p = out_buf.values::<f64>("p", 0, 5).unwrap();
            assert_eq!(p[0], 1.0);
            assert_eq!(p[4], 5.0);
        }
    }

    #[test]
    fn test_output_size_must_match_scenarios() {
        let src_buf = component_buffer(UPDATE, "source", 3);
        let mut update = ConstDataset::new(true, 3, UPDATE).unwrap();
        update.add_uniform("source", 1, 3, &src_buf).unwrap();
        let mut out_buf = component_buffer(SYM_OUTPUT, "source", 2);
        let mut output = MutableDataset::new(true, 2, SYM_OUTPUT).unwrap();
        output.add_uniform("source", 1, 2, &mut out_buf).unwrap();
        let err = calculate(
            &EchoEngine,
            &CalculationOptions::default(),
            &mut output,
            Some(&update),
        )
        .unwrap_err();
        assert!(matches!(err, PgmError::Regular(DataError::InvalidBatchSize { .. })));
    }
}
