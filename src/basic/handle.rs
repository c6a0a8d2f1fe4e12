use derive_more::Display;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use tracing::debug;

use super::error::{BatchFailure, CalculationInfo, PgmError};
use super::meta_data::Idx;

/// Error code reported by a [`Handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, FromPrimitive)]
#[repr(i8)]
pub enum ErrorCode {
    #[default]
    NoError = 0,
    RegularError = 1,
    BatchError = 2,
    SerializationError = 3,
}

impl ErrorCode {
    pub fn from_raw(raw: i64) -> Option<Self> {
        Self::from_i64(raw)
    }
}

impl PgmError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PgmError::Regular(_) => ErrorCode::RegularError,
            PgmError::Batch(_) => ErrorCode::BatchError,
            PgmError::Serialization(_) => ErrorCode::SerializationError,
        }
    }
}

/// Per-session error sink.
///
/// Cleared at the start of every operation and populated at most once by it; the content
/// stays readable until the next operation on the same handle.
#[derive(Debug, Default)]
pub struct Handle {
    code: ErrorCode,
    message: String,
    failed_scenarios: Vec<Idx>,
    batch_errors: Vec<String>,
    statistics: Option<CalculationInfo>,
}

impl Handle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.code = ErrorCode::NoError;
        self.message.clear();
        self.failed_scenarios.clear();
        self.batch_errors.clear();
        self.statistics = None;
    }

    pub fn error_code(&self) -> ErrorCode {
        self.code
    }

    pub fn error_message(&self) -> &str {
        &self.message
    }

    pub fn n_failed_scenarios(&self) -> usize {
        self.failed_scenarios.len()
    }

    /// Failed scenario indices, ascending and unique.
    pub fn failed_scenarios(&self) -> &[Idx] {
        &self.failed_scenarios
    }

    /// Messages matching [`Handle::failed_scenarios`] one to one.
    pub fn batch_errors(&self) -> &[String] {
        &self.batch_errors
    }

    /// Statistics of the last calculation, if it got far enough to produce any.
    pub fn statistics(&self) -> Option<&CalculationInfo> {
        self.statistics.as_ref()
    }

    pub fn record_regular_error(&mut self, msg: impl Into<String>) {
        self.clear();
        self.code = ErrorCode::RegularError;
        self.message = msg.into();
        debug!(message = %self.message, "regular error recorded");
    }

    pub fn record_serialization_error(&mut self, msg: impl Into<String>) {
        self.clear();
        self.code = ErrorCode::SerializationError;
        self.message = msg.into();
        debug!(message = %self.message, "serialization error recorded");
    }

    /// Records per-scenario failures; the list is sorted by scenario index and the
    /// first message of a repeated index wins.
    pub fn record_batch_error(&mut self, failures: Vec<(Idx, String)>) {
        self.clear();
        let mut failures = failures;
        failures.sort_by_key(|(idx, _)| *idx);
        failures.dedup_by_key(|(idx, _)| *idx);
        self.code = ErrorCode::BatchError;
        self.message = format!(
            "There are errors in {} scenario(s) of the batch calculation.",
            failures.len()
        );
        let (indices, messages): (Vec<Idx>, Vec<String>) = failures.into_iter().unzip();
        self.failed_scenarios = indices;
        self.batch_errors = messages;
        debug!(n_failed = self.failed_scenarios.len(), "batch error recorded");
    }

    pub fn record_statistics(&mut self, info: CalculationInfo) {
        self.statistics = Some(info);
    }

    /// Records `err` under its taxonomy.
    pub fn record(&mut self, err: PgmError) {
        match err {
            PgmError::Regular(err) => self.record_regular_error(err.to_string()),
            PgmError::Serialization(err) => self.record_serialization_error(err.to_string()),
            PgmError::Batch(BatchFailure { failures, info }) => {
                self.record_batch_error(failures);
                self.record_statistics(info);
            }
        }
    }

    /// Runs one operation against this handle: clears it, runs `op`, records the error.
    pub fn call<T, E: Into<PgmError>>(&mut self, op: impl FnOnce() -> Result<T, E>) -> Option<T> {
        self.clear();
        match op() {
            Ok(value) => Some(value),
            Err(err) => {
                self.record(err.into());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::error::DataError;

    #[test]
    fn test_clear_is_idempotent() {
        let mut handle = Handle::new();
        handle.record_regular_error("boom");
        handle.clear();
        handle.clear();
        assert_eq!(handle.error_code(), ErrorCode::NoError);
        assert_eq!(handle.error_message(), "");
        assert!(handle.failed_scenarios().is_empty());
        assert!(handle.statistics().is_none());
    }

    #[test]
    fn test_batch_errors_are_sorted() {
        let mut handle = Handle::new();
        handle.record_batch_error(vec![
            (7, "seven".into()),
            (2, "two".into()),
            (7, "again".into()),
        ]);
        assert_eq!(handle.error_code(), ErrorCode::BatchError);
        assert_eq!(handle.failed_scenarios(), &[2, 7]);
        assert_eq!(handle.batch_errors(), &["two".to_string(), "seven".to_string()]);
    }

    #[test]
    fn test_call_clears_previous_error() {
        let mut handle = Handle::new();
        let res: Option<()> = handle.call(|| {
            Err(DataError::UnknownDataset {
                name: "nope".into(),
            })
        });
        assert!(res.is_none());
        assert_eq!(handle.error_code(), ErrorCode::RegularError);
        assert!(handle.error_message().contains("nope"));

        let res = handle.call(|| Ok::<_, PgmError>(42));
        assert_eq!(res, Some(42));
        assert_eq!(handle.error_code(), ErrorCode::NoError);
    }

    #[test]
    fn test_record_batch_failure_keeps_statistics() {
        let mut handle = Handle::new();
        handle.record(PgmError::Batch(BatchFailure {
            failures: vec![(1, "bad id".into())],
            info: CalculationInfo::from([("iterations".to_string(), 3.0)]),
        }));
        assert_eq!(handle.n_failed_scenarios(), 1);
        assert_eq!(handle.statistics().unwrap()["iterations"], 3.0);
    }

    #[test]
    fn test_error_code_from_raw() {
        assert_eq!(ErrorCode::from_raw(3), Some(ErrorCode::SerializationError));
        assert_eq!(ErrorCode::from_raw(9), None);
    }
}
