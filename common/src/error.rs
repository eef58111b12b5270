use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::types::SensorAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Sensor,
    Event,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sensor => "sensor",
            Self::Event => "event",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "camelCase")]
pub enum SensorFault {
    #[error("bus timeout")]
    Timeout,
    #[error("CRC mismatch")]
    CrcMismatch,
    #[error("device not present")]
    NotPresent,
    #[error("reading is stale")]
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("access of {len} bytes at offset {offset} exceeds {size}-byte image")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
    #[error("I/O error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("no free {kind} slot (capacity {capacity})")]
    CapacityExceeded { kind: RecordKind, capacity: usize },

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: usize },

    #[error("sensor {address} read failed: {fault}")]
    SensorReadFailure {
        address: SensorAddress,
        fault: SensorFault,
    },

    #[error("persistent storage unavailable at offset {offset}: {source}")]
    StorageUnavailable {
        offset: usize,
        #[source]
        source: StorageError,
    },
}

impl CoreError {
    pub(crate) fn out_of_range(field: &'static str, value: impl Into<usize>) -> Self {
        Self::OutOfRange {
            field,
            value: value.into(),
        }
    }
}
