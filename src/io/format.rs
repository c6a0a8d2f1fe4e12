use derive_more::{Display, Error};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::basic::error::DataError;

/// Version written into and required from every payload.
pub const PAYLOAD_VERSION: &str = "1.0";

/// Closed set of payload encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromPrimitive)]
#[repr(i8)]
pub enum SerializationFormat {
    Json = 0,
    MsgPack = 1,
}

impl SerializationFormat {
    pub fn from_raw(raw: i64) -> Result<Self, SerializationError> {
        Self::from_i64(raw).ok_or(SerializationError::UnknownFormat { format: raw })
    }
}

/// Failures at the codec boundary.
#[derive(Debug, Clone, PartialEq, Display, Error)]
pub enum SerializationError {
    #[display("malformed json: {message}")]
    Json { message: String },
    #[display("unknown serialization format {format}")]
    UnknownFormat { format: i64 },
    #[display("serialization format {format} is not supported")]
    UnsupportedFormat { format: SerializationFormat },
    #[display("payload version '{version}' is not supported, expected '1.0'")]
    Version { version: String },
    #[display("{position}: {reason}")]
    Payload { position: String, reason: String },
    #[display("{error}")]
    Dataset { error: DataError },
}

impl From<DataError> for SerializationError {
    fn from(error: DataError) -> Self {
        SerializationError::Dataset { error }
    }
}

impl From<serde_json::Error> for SerializationError {
    fn from(err: serde_json::Error) -> Self {
        SerializationError::Json {
            message: err.to_string(),
        }
    }
}

pub(crate) fn payload_error(position: impl Into<String>, reason: impl Into<String>) -> SerializationError {
    SerializationError::Payload {
        position: position.into(),
        reason: reason.into(),
    }
}
